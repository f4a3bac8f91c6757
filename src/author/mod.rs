//! Authoring operations over scene documents
//!
//! Every operation works on an in-memory [`Document`]; persisting is left to
//! the caller so that multi-step edits share one save.

pub mod transform_resolver;
pub mod transform_author;
pub mod variant_author;
pub mod assembler;
pub mod batch_writer;
pub mod references;
pub mod materials;
pub mod cameras;
pub mod bounds;
pub mod validate;
pub mod nodes;
pub mod export;

use serde::{Deserialize, Deserializer};

use crate::compose::{ComposedNode, Stage};
use crate::core::{Error, Result};
use crate::document::{DocumentOrigin, DocumentStore, NodePath, Reference};

pub use assembler::{compose_assembly, AssemblyAsset, AssemblyOptions, AssemblyReport};
pub use batch_writer::{apply_batch, AttrEdit, BatchItem, BatchItemOutcome};
pub use transform_author::{set_transform, CommonOps, TransformEdit, TransformReport};
pub use transform_resolver::{resolve_transform, ResolvedOp, ResolvedTransform};
pub use variant_author::{author_variants, VariantAuthorOptions, VariantDef, VariantReport};

/// How a reference picks the node inside its target document.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum InternalPath {
    /// Use the target's declared default node.
    #[default]
    DefaultNode,
    /// Reference the whole document, recording no internal path.
    WholeDocument,
    Explicit(NodePath),
}

impl InternalPath {
    /// Interpret an optional string: `None` is an explicit null, an empty
    /// string defers to the default node.
    pub fn from_option(raw: Option<&str>) -> Result<Self> {
        match raw.map(str::trim) {
            None => Ok(InternalPath::WholeDocument),
            Some("") => Ok(InternalPath::DefaultNode),
            Some(path) => Ok(InternalPath::Explicit(NodePath::parse(path)?)),
        }
    }
}

impl<'de> Deserialize<'de> for InternalPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        InternalPath::from_option(raw.as_deref()).map_err(serde::de::Error::custom)
    }
}

/// Compose-time existence check shared by every operation.
pub fn require_node<'s>(stage: &'s Stage<'_>, path: &NodePath) -> Result<ComposedNode<'s>> {
    stage
        .node(path)
        .ok_or_else(|| Error::not_found(format!("Node not found: {}", path)))
}

/// Build a reference to `asset` as seen from a document at `origin`. The
/// target is loaded to prove it exists; when its default node is wanted and
/// none is declared, the first root node stands in.
pub fn build_reference(
    store: &dyn DocumentStore,
    origin: Option<&DocumentOrigin>,
    asset: &str,
    internal: &InternalPath,
) -> Result<Reference> {
    if asset.trim().is_empty() {
        return Err(Error::invalid("Reference asset path is empty"));
    }
    let key = store.resolve_asset(origin, asset);
    let target = store.load_layer(&key).map_err(|e| match e {
        Error::NotFound(_) => {
            Error::not_found(format!("Referenced document not found: {}", key.display()))
        }
        other => other.wrap(Error::ReferenceFailed),
    })?;
    let internal_path = match internal {
        InternalPath::Explicit(path) => Some(path.clone()),
        InternalPath::WholeDocument => None,
        InternalPath::DefaultNode => target.default_node_path().cloned().or_else(|| {
            target
                .nodes
                .first()
                .and_then(|n| NodePath::root().child(&n.name).ok())
        }),
    };
    Ok(Reference::new(asset.trim(), internal_path))
}
