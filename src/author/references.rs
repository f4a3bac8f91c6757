//! Reference arcs and the default node

use serde::{Deserialize, Serialize};

use crate::author::{build_reference, require_node, InternalPath};
use crate::compose::Stage;
use crate::core::{Error, Result};
use crate::document::{Document, DocumentStore, NodePath, Reference};

/// Add a reference on an existing node. Adding an identical reference twice
/// is a no-op; the flag reports whether the list changed.
pub fn add_reference(
    doc: &mut Document,
    store: &dyn DocumentStore,
    node: &NodePath,
    asset: &str,
    internal: &InternalPath,
) -> Result<(Reference, bool)> {
    {
        let stage = Stage::compose(doc, store);
        require_node(&stage, node)?;
    }
    let origin = doc.origin().cloned();
    let reference = build_reference(store, origin.as_ref(), asset, internal)?;
    let added = doc
        .author(node)
        .map_err(|e| e.wrap(Error::ReferenceFailed))?
        .add_reference(reference.clone());
    Ok((reference, added))
}

/// Replace a node's reference list under the current edit target.
pub fn replace_references(
    doc: &mut Document,
    store: &dyn DocumentStore,
    node: &NodePath,
    entries: &[(String, InternalPath)],
) -> Result<Vec<Reference>> {
    let origin = doc.origin().cloned();
    let references = entries
        .iter()
        .map(|(asset, internal)| build_reference(store, origin.as_ref(), asset, internal))
        .collect::<Result<Vec<_>>>()?;
    let opinions = doc.author(node)?;
    opinions.references.clear();
    for reference in &references {
        opinions.add_reference(reference.clone());
    }
    Ok(opinions.references.clone())
}

/// One entry of [`add_references_batch`].
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceItem {
    #[serde(alias = "prim_path", alias = "node_path")]
    pub node_path: String,
    #[serde(alias = "asset", alias = "asset_path")]
    pub asset_path: String,
    #[serde(default, alias = "internal_path")]
    pub internal_path: InternalPath,
}

/// Per-item outcome of [`add_references_batch`].
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceOutcome {
    pub node_path: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub added: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<crate::author::batch_writer::ItemError>,
}

/// Add many references, recording each item's outcome independently.
pub fn add_references_batch(
    doc: &mut Document,
    store: &dyn DocumentStore,
    items: &[ReferenceItem],
) -> Vec<ReferenceOutcome> {
    items
        .iter()
        .map(|item| {
            let result = NodePath::parse(&item.node_path).and_then(|node| {
                add_reference(doc, store, &node, &item.asset_path, &item.internal_path)
            });
            match result {
                Ok((_, added)) => ReferenceOutcome {
                    node_path: item.node_path.clone(),
                    ok: true,
                    added: Some(added),
                    error: None,
                },
                Err(e) => {
                    log::warn!("Reference on {} failed: {}", item.node_path, e);
                    ReferenceOutcome {
                        node_path: item.node_path.clone(),
                        ok: false,
                        added: None,
                        error: Some((&e).into()),
                    }
                }
            }
        })
        .collect()
}

/// Nominate `node` as the document's default node.
pub fn set_default_node(doc: &mut Document, store: &dyn DocumentStore, node: &NodePath) -> Result<()> {
    {
        let stage = Stage::compose(doc, store);
        require_node(&stage, node)?;
    }
    doc.default_node = Some(node.clone());
    Ok(())
}
