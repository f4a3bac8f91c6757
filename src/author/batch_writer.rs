//! Batched attribute edits with per-item outcomes
//!
//! Each item's attribute name is classified once into an [`AttrEdit`], then
//! dispatched. A failing item is recorded and the batch moves on.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::author::nodes::write_value;
use crate::author::{materials, references, require_node, set_transform, CommonOps, InternalPath, TransformEdit};
use crate::compose::Stage;
use crate::core::types::{DMat4, DVec3};
use crate::core::{Error, Result};
use crate::document::value::{matrix_from_json, vec3_from_json};
use crate::document::{Document, DocumentStore, NodePath, TimeCode, Value};

/// A classified attribute edit.
#[derive(Clone, Debug, PartialEq)]
pub enum AttrEdit {
    Translate(DVec3),
    Rotate(DVec3),
    /// `scale`, or `size` splatted from a scalar.
    Scale(DVec3),
    Matrix(DMat4),
    ReferenceList(Vec<(String, InternalPath)>),
    /// `None` clears the binding.
    MaterialBinding(Option<NodePath>),
    /// Variant set structure or selection, which batches do not author.
    VariantMeta(String),
    Plain { name: String, value: Value },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ReferenceEntry {
    Asset(String),
    Record {
        #[serde(alias = "assetPath", alias = "asset")]
        asset_path: String,
        #[serde(default, alias = "internalPath")]
        internal_path: InternalPath,
    },
}

impl AttrEdit {
    /// Classify `attr` and type `value` for it.
    pub fn classify(attr: &str, value: &Json) -> Result<Self> {
        let name = attr.trim();
        if name.is_empty() {
            return Err(Error::invalid("Attribute name is empty"));
        }
        let lowered = name.to_ascii_lowercase();
        let shorthand = lowered.strip_prefix("xformop:").unwrap_or(&lowered);
        let vec3 = |json: &Json| {
            vec3_from_json(json)
                .map_err(|_| Error::invalid(format!("'{}' needs a list of 3 numbers", name)))
        };

        Ok(match shorthand {
            "translate" => AttrEdit::Translate(vec3(value)?),
            "rotate" | "rotatexyz" => AttrEdit::Rotate(vec3(value)?),
            "scale" => AttrEdit::Scale(vec3(value)?),
            "size" => match value.as_f64() {
                Some(s) => AttrEdit::Scale(DVec3::splat(s)),
                None => AttrEdit::Scale(vec3(value)?),
            },
            "transform" | "matrix" => AttrEdit::Matrix(matrix_from_json(value)?),
            "references" => {
                let entries: Vec<ReferenceEntry> = serde_json::from_value(value.clone())
                    .map_err(|e| Error::invalid(format!("'references' must be a list: {}", e)))?;
                AttrEdit::ReferenceList(
                    entries
                        .into_iter()
                        .map(|entry| match entry {
                            ReferenceEntry::Asset(asset) => (asset, InternalPath::DefaultNode),
                            ReferenceEntry::Record {
                                asset_path,
                                internal_path,
                            } => (asset_path, internal_path),
                        })
                        .collect(),
                )
            }
            "material:binding" | "material" => match value {
                Json::Null => AttrEdit::MaterialBinding(None),
                Json::String(s) if s.trim().is_empty() => AttrEdit::MaterialBinding(None),
                Json::String(s) => AttrEdit::MaterialBinding(Some(NodePath::parse(s)?)),
                _ => return Err(Error::invalid("'material:binding' must be a node path or null")),
            },
            other if other.starts_with("variant") => AttrEdit::VariantMeta(name.to_string()),
            _ => {
                let mut typed = Value::from_json(value)?;
                if lowered.contains("color") {
                    if let Value::Double3(v) = typed {
                        typed = Value::Double3Array(vec![v]);
                    }
                }
                AttrEdit::Plain {
                    name: name.to_string(),
                    value: typed,
                }
            }
        })
    }
}

/// One batch entry.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItem {
    #[serde(alias = "prim_path", alias = "primPath", alias = "node_path")]
    pub node_path: String,
    #[serde(alias = "name", alias = "attribute")]
    pub attr: String,
    #[serde(default)]
    pub value: Json,
    #[serde(default)]
    pub time: TimeCode,
}

/// Wire form of a failed item's error.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ItemError {
    pub code: String,
    pub message: String,
}

impl From<&Error> for ItemError {
    fn from(e: &Error) -> Self {
        Self {
            code: e.code().to_string(),
            message: e.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemOutcome {
    pub node_path: String,
    pub attr: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ItemError>,
}

/// Apply every item in order. Persisting is left to the caller, once for
/// the whole batch.
pub fn apply_batch(doc: &mut Document, store: &dyn DocumentStore, items: &[BatchItem]) -> Vec<BatchItemOutcome> {
    items
        .iter()
        .map(|item| {
            let result = apply_item(doc, store, item);
            if let Err(e) = &result {
                log::warn!("Batch item {}.{} failed: {}", item.node_path, item.attr, e);
            }
            BatchItemOutcome {
                node_path: item.node_path.clone(),
                attr: item.attr.clone(),
                ok: result.is_ok(),
                error: result.err().as_ref().map(ItemError::from),
            }
        })
        .collect()
}

fn apply_item(doc: &mut Document, store: &dyn DocumentStore, item: &BatchItem) -> Result<()> {
    let node = NodePath::parse(&item.node_path)?;
    let edit = AttrEdit::classify(&item.attr, &item.value)?;
    let composed_kind = {
        let stage = Stage::compose(doc, store);
        let composed = require_node(&stage, &node)?;
        match &edit {
            AttrEdit::Plain { name, .. } => composed.attribute(name).map(|a| a.kind),
            _ => None,
        }
    };

    match edit {
        AttrEdit::Translate(v) => {
            let ops = CommonOps {
                translate: Some(v),
                ..CommonOps::default()
            };
            set_transform(doc, store, &node, &TransformEdit::Ops(ops), item.time).map(drop)
        }
        AttrEdit::Rotate(v) => {
            let ops = CommonOps {
                rotate: Some(v),
                ..CommonOps::default()
            };
            set_transform(doc, store, &node, &TransformEdit::Ops(ops), item.time).map(drop)
        }
        AttrEdit::Scale(v) => {
            let ops = CommonOps {
                scale: Some(v),
                ..CommonOps::default()
            };
            set_transform(doc, store, &node, &TransformEdit::Ops(ops), item.time).map(drop)
        }
        AttrEdit::Matrix(m) => {
            set_transform(doc, store, &node, &TransformEdit::Matrix(m), item.time).map(drop)
        }
        AttrEdit::ReferenceList(entries) => references::replace_references(doc, store, &node, &entries)
            .map(drop)
            .map_err(|e| e.wrap(Error::ReferenceFailed)),
        AttrEdit::MaterialBinding(Some(material)) => {
            materials::bind_material(doc, store, &node, &material)
        }
        AttrEdit::MaterialBinding(None) => materials::unbind_material(doc, store, &node).map(drop),
        AttrEdit::VariantMeta(name) => Err(Error::invalid(format!(
            "'{}' is variant metadata; use author_variants or set_variant_selection",
            name
        ))),
        AttrEdit::Plain { name, value } => write_value(doc, &node, &name, value, composed_kind, item.time)
            .map_err(|e| e.wrap(Error::AttributeFailed)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{MemoryStore, UpAxis};
    use serde_json::json;

    fn path(s: &str) -> NodePath {
        NodePath::parse(s).unwrap()
    }

    #[test]
    fn test_classification() {
        assert_eq!(
            AttrEdit::classify("xformOp:translate", &json!([1, 2, 3])).unwrap(),
            AttrEdit::Translate(DVec3::new(1.0, 2.0, 3.0))
        );
        assert_eq!(
            AttrEdit::classify("size", &json!(2)).unwrap(),
            AttrEdit::Scale(DVec3::splat(2.0))
        );
        assert!(matches!(
            AttrEdit::classify("variantSelection", &json!("red")).unwrap(),
            AttrEdit::VariantMeta(_)
        ));
        assert_eq!(
            AttrEdit::classify("primvars:displayColor", &json!([1, 0, 0])).unwrap(),
            AttrEdit::Plain {
                name: "primvars:displayColor".into(),
                value: Value::Double3Array(vec![[1.0, 0.0, 0.0]]),
            }
        );
        assert!(matches!(
            AttrEdit::classify("references", &json!(["a.sdoc", {"asset": "b.sdoc", "internal_path": null}])).unwrap(),
            AttrEdit::ReferenceList(list) if list[1].1 == InternalPath::WholeDocument
        ));
        assert_eq!(
            AttrEdit::classify("translate", &json!([1, 2])).unwrap_err().code(),
            "invalid_params"
        );
    }

    #[test]
    fn test_matrix_edit_keeps_order() {
        let mut doc = Document::new(UpAxis::Y, 1.0);
        let n = path("/N");
        doc.define_node(&n, Some("Xform")).unwrap();
        doc.author(&n).unwrap().xform_op_order =
            Some(vec!["xformOp:translate".into(), "xformOp:transform".into()]);
        let store = MemoryStore::new();
        let items: Vec<BatchItem> = serde_json::from_value(json!([{
            "prim_path": "/N",
            "attr": "xformOp:transform",
            "value": [[1, 0, 0, 0], [0, 1, 0, 0], [0, 0, 1, 0], [4, 5, 6, 1]]
        }]))
        .unwrap();
        let outcomes = apply_batch(&mut doc, &store, &items);
        assert!(outcomes[0].ok);
        assert_eq!(
            doc.node(&n).unwrap().opinions.xform_op_order.as_deref().unwrap().len(),
            2
        );
    }

    #[test]
    fn test_variant_meta_rejected() {
        let mut doc = Document::new(UpAxis::Y, 1.0);
        doc.define_node(&path("/N"), None).unwrap();
        let store = MemoryStore::new();
        let items: Vec<BatchItem> =
            serde_json::from_value(json!([{"prim_path": "/N", "attr": "variantSet", "value": "look"}]))
                .unwrap();
        let outcome = &apply_batch(&mut doc, &store, &items)[0];
        assert!(!outcome.ok);
        assert!(outcome.error.as_ref().unwrap().message.contains("author_variants"));
    }
}
