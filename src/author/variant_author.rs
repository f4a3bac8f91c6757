//! Variant set lifecycle: creation, default-state preservation, and
//! per-variant scoped authoring

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::author::transform_author::{set_transform, TransformEdit};
use crate::author::{build_reference, require_node, InternalPath};
use crate::compose::{ComposedVariantSet, Stage};
use crate::core::{Error, Result};
use crate::document::{is_valid_name, Document, DocumentStore, NodePath, TimeCode, Value};

/// Name of the variant synthesized to hold pre-existing references.
pub const DEFAULT_VARIANT: &str = "default";

/// What one variant should contain.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantDef {
    pub name: String,
    #[serde(default, alias = "asset", alias = "asset_path")]
    pub asset_path: Option<String>,
    #[serde(default, alias = "internal_path")]
    pub internal_path: InternalPath,
    #[serde(default, alias = "material", alias = "material_path")]
    pub material_path: Option<NodePath>,
    #[serde(default)]
    pub matrix: Option<Json>,
    #[serde(default)]
    pub ops: Option<Json>,
    #[serde(default)]
    pub attributes: BTreeMap<String, Json>,
}

impl VariantDef {
    fn transform(&self) -> Result<Option<TransformEdit>> {
        let matrix = self.matrix.as_ref().filter(|m| !m.is_null());
        let ops = self.ops.as_ref().filter(|o| !o.is_null());
        if matrix.is_none() && ops.is_none() {
            return Ok(None);
        }
        TransformEdit::from_params(matrix, ops).map(Some)
    }
}

/// Merge the mutually exclusive single-variant and variant-list forms.
pub fn variant_defs(single: Option<VariantDef>, list: Option<Vec<VariantDef>>) -> Result<Vec<VariantDef>> {
    match (single, list) {
        (Some(def), None) => Ok(vec![def]),
        (None, Some(defs)) if !defs.is_empty() => Ok(defs),
        (None, Some(_)) => Err(Error::invalid("'variants' must not be empty")),
        (Some(_), Some(_)) => Err(Error::invalid("Provide either 'variant' or 'variants', not both")),
        (None, None) => Err(Error::invalid("Provide either 'variant' or 'variants'")),
    }
}

#[derive(Clone, Debug, Default)]
pub struct VariantAuthorOptions {
    /// Clear direct opinions of every kind the definitions touch.
    pub clear_local: bool,
    /// Variant to leave selected.
    pub select: Option<String>,
    pub time: TimeCode,
}

/// Outcome of [`author_variants`].
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantReport {
    pub node_path: NodePath,
    pub variant_set: String,
    /// Variants authored this call, in order.
    pub authored: Vec<String>,
    /// Every variant now in the set.
    pub variants: Vec<String>,
    pub selection: String,
    pub default_created: bool,
}

/// Author `defs` into variant set `set` on `node`. Either every step lands
/// in memory or the document is left exactly as it was.
pub fn author_variants(
    doc: &mut Document,
    store: &dyn DocumentStore,
    node: &NodePath,
    set: &str,
    defs: &[VariantDef],
    options: &VariantAuthorOptions,
) -> Result<VariantReport> {
    let backup = doc.clone();
    let result = author_variants_in_place(doc, store, node, set, defs, options);
    if result.is_err() {
        *doc = backup;
    }
    result
}

fn validate(set: &str, defs: &[VariantDef], options: &VariantAuthorOptions) -> Result<()> {
    if !is_valid_name(set) {
        return Err(Error::invalid(format!("Invalid variant set name '{}'", set)));
    }
    if defs.is_empty() {
        return Err(Error::invalid("No variants to author"));
    }
    for def in defs {
        if def.name.trim().is_empty() {
            return Err(Error::invalid("Variant name must not be empty"));
        }
    }
    if let Some(select) = &options.select {
        if select.trim().is_empty() {
            return Err(Error::invalid("'select' must not be empty"));
        }
    }
    Ok(())
}

fn author_variants_in_place(
    doc: &mut Document,
    store: &dyn DocumentStore,
    node: &NodePath,
    set_name: &str,
    defs: &[VariantDef],
    options: &VariantAuthorOptions,
) -> Result<VariantReport> {
    validate(set_name, defs, options)?;
    let transforms = defs
        .iter()
        .map(VariantDef::transform)
        .collect::<Result<Vec<_>>>()?;

    {
        let stage = Stage::compose(doc, store);
        require_node(&stage, node)?;
        for def in defs {
            if let Some(material) = &def.material_path {
                if !stage.exists(material) {
                    return Err(Error::not_found(format!("Material not found: {}", material)));
                }
            }
        }
    }

    let origin = doc.origin().cloned();
    let snapshot = doc
        .node(node)
        .map(|spec| spec.opinions.references.clone())
        .unwrap_or_default();

    let spec = doc.override_node(node)?;
    let prior_selection = spec
        .variant_set(set_name)
        .and_then(|s| s.selection.clone());
    let (_, created) = spec.ensure_variant_set(set_name);

    let authors_reference = defs.iter().any(|d| d.asset_path.is_some());
    let defines_default = defs.iter().any(|d| d.name == DEFAULT_VARIANT);
    let default_created = created && authors_reference && !defines_default;
    if default_created {
        select_variant(doc, node, set_name, DEFAULT_VARIANT)?;
        let mut scope = doc.begin_variant_edit(node, set_name, DEFAULT_VARIANT)?;
        let opinions = scope.author(node)?;
        for reference in &snapshot {
            opinions.add_reference(reference.clone());
        }
        log::info!(
            "Moved {} existing reference(s) on {} into {}={}",
            snapshot.len(),
            node,
            set_name,
            DEFAULT_VARIANT
        );
    }

    if options.clear_local {
        clear_touched(doc, node, defs, &transforms);
    }

    for (def, transform) in defs.iter().zip(&transforms) {
        select_variant(doc, node, set_name, &def.name)?;
        let mut scope = doc.begin_variant_edit(node, set_name, &def.name)?;

        if let Some(asset) = &def.asset_path {
            let reference = build_reference(store, origin.as_ref(), asset, &def.internal_path)?;
            scope.author(node)?.add_reference(reference);
        }
        if let Some(material) = &def.material_path {
            scope
                .author(node)
                .map_err(|e| e.wrap(Error::BindFailed))?
                .material_binding = Some(material.clone());
        }
        if let Some(edit) = transform {
            set_transform(&mut scope, store, node, edit, options.time)?;
        }
        for (name, raw) in &def.attributes {
            let value = Value::from_json(raw)?;
            scope
                .author(node)?
                .set_attribute(name, value, options.time)
                .map_err(|e| e.wrap(Error::AttributeFailed))?;
        }
    }

    let spec = doc
        .node_mut(node)
        .ok_or_else(|| Error::not_found(format!("Node not found: {}", node)))?;
    let set = spec
        .variant_set_mut(set_name)
        .ok_or_else(|| Error::VariantFailed(format!("Variant set {} vanished", set_name)))?;

    let keeps_default = prior_selection.as_deref() == Some(DEFAULT_VARIANT)
        && set.has_variant(DEFAULT_VARIANT)
        && !defines_default;
    let selection = match &options.select {
        Some(select) => {
            if !set.has_variant(select) {
                return Err(Error::SelectionFailed(format!(
                    "No variant '{}' in {}",
                    select, set_name
                )));
            }
            select.clone()
        }
        None if default_created || keeps_default => DEFAULT_VARIANT.to_string(),
        None => defs
            .last()
            .map(|d| d.name.clone())
            .ok_or_else(|| Error::invalid("No variants to author"))?,
    };
    set.selection = Some(selection.clone());

    Ok(VariantReport {
        node_path: node.clone(),
        variant_set: set_name.to_string(),
        authored: defs.iter().map(|d| d.name.clone()).collect(),
        variants: set.variant_names(),
        selection,
        default_created,
    })
}

/// Add `variant` to the set if needed and make it the selection.
fn select_variant(doc: &mut Document, node: &NodePath, set: &str, variant: &str) -> Result<()> {
    let spec = doc.override_node(node)?;
    let (set, _) = spec.ensure_variant_set(set);
    set.add_variant(variant);
    set.selection = Some(variant.to_string());
    Ok(())
}

fn clear_touched(doc: &mut Document, node: &NodePath, defs: &[VariantDef], transforms: &[Option<TransformEdit>]) {
    let Some(spec) = doc.node_mut(node) else {
        return;
    };
    let opinions = &mut spec.opinions;
    if defs.iter().any(|d| d.asset_path.is_some()) {
        opinions.references.clear();
    }
    if defs.iter().any(|d| d.material_path.is_some()) {
        opinions.material_binding = None;
    }
    if transforms.iter().any(Option::is_some) {
        opinions.clear_transform();
    }
    for def in defs {
        for name in def.attributes.keys() {
            opinions.attributes.remove(name);
        }
    }
}

/// Variant sets on a composed node.
pub fn list_variants(stage: &Stage<'_>, node: &NodePath) -> Result<Vec<ComposedVariantSet>> {
    Ok(require_node(stage, node)?.variant_sets())
}

/// Author a selection for `set` on `node`. The set and variant must be
/// visible through composition.
pub fn set_variant_selection(
    doc: &mut Document,
    store: &dyn DocumentStore,
    node: &NodePath,
    set: &str,
    selection: &str,
) -> Result<()> {
    {
        let stage = Stage::compose(doc, store);
        let sets = require_node(&stage, node)?.variant_sets();
        let known = sets
            .iter()
            .find(|s| s.name == set)
            .ok_or_else(|| Error::SelectionFailed(format!("No variant set '{}' on {}", set, node)))?;
        if !known.variants.iter().any(|v| v == selection) {
            return Err(Error::SelectionFailed(format!(
                "Failed to set variant {}={}",
                set, selection
            )));
        }
    }
    let spec = doc.override_node(node)?;
    spec.ensure_variant_set(set).0.selection = Some(selection.to_string());
    Ok(())
}
