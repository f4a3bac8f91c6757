//! Node specs, opinions and variant sets

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::Result;
use crate::document::path::NodePath;
use crate::document::value::{Attribute, TimeCode, Value};

/// Whether a spec defines a node or only overrides one defined elsewhere.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Specifier {
    #[default]
    Def,
    Over,
}

/// A composition arc pulling another document's content into a node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reference {
    pub asset_path: String,
    /// Node inside the target; `None` targets the whole document through its
    /// default node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_path: Option<NodePath>,
}

impl Reference {
    pub fn new(asset_path: impl Into<String>, internal_path: Option<NodePath>) -> Self {
        Self {
            asset_path: asset_path.into(),
            internal_path,
        }
    }
}

/// The authorable content of a node at one site: its direct spec or a variant.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Opinions {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Attribute>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xform_op_order: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material_binding: Option<NodePath>,
}

impl Opinions {
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
            && self.xform_op_order.is_none()
            && self.references.is_empty()
            && self.material_binding.is_none()
    }

    /// Append a reference unless an equal one is already listed.
    pub fn add_reference(&mut self, reference: Reference) -> bool {
        if self.references.contains(&reference) {
            return false;
        }
        self.references.push(reference);
        true
    }

    /// Set `name` at `time`, creating the attribute typed from `value` if absent.
    pub fn set_attribute(&mut self, name: &str, value: Value, time: TimeCode) -> Result<()> {
        match self.attributes.get_mut(name) {
            Some(attr) => attr.set(value, time),
            None => {
                self.attributes
                    .insert(name.to_string(), Attribute::with_value(value, time));
                Ok(())
            }
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    /// Drop every `xformOp:*` attribute and the op order.
    pub fn clear_transform(&mut self) {
        self.attributes
            .retain(|name, _| !crate::document::xform::is_xform_op_attr(name));
        self.xform_op_order = None;
    }
}

/// One alternative inside a variant set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub name: String,
    #[serde(flatten)]
    pub opinions: Opinions,
}

/// A named switch over mutually exclusive variants.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VariantSet {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<String>,
    #[serde(default)]
    pub variants: Vec<Variant>,
}

impl VariantSet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            selection: None,
            variants: Vec::new(),
        }
    }

    pub fn has_variant(&self, name: &str) -> bool {
        self.variants.iter().any(|v| v.name == name)
    }

    /// Add `name` if not already present.
    pub fn add_variant(&mut self, name: &str) -> &mut Variant {
        let index = match self.variants.iter().position(|v| v.name == name) {
            Some(i) => i,
            None => {
                self.variants.push(Variant {
                    name: name.to_string(),
                    opinions: Opinions::default(),
                });
                self.variants.len() - 1
            }
        };
        &mut self.variants[index]
    }

    pub fn variant(&self, name: &str) -> Option<&Variant> {
        self.variants.iter().find(|v| v.name == name)
    }

    pub fn variant_mut(&mut self, name: &str) -> Option<&mut Variant> {
        self.variants.iter_mut().find(|v| v.name == name)
    }

    pub fn variant_names(&self) -> Vec<String> {
        self.variants.iter().map(|v| v.name.clone()).collect()
    }

    /// Opinions of the selected variant, if any.
    pub fn selected(&self) -> Option<&Opinions> {
        let selection = self.selection.as_deref()?;
        self.variant(selection).map(|v| &v.opinions)
    }
}

/// A node as authored in one document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSpec {
    pub name: String,
    #[serde(default)]
    pub specifier: Specifier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(flatten)]
    pub opinions: Opinions,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variant_sets: Vec<VariantSet>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeSpec>,
}

impl NodeSpec {
    pub fn new(name: impl Into<String>, specifier: Specifier) -> Self {
        Self {
            name: name.into(),
            specifier,
            type_name: None,
            opinions: Opinions::default(),
            variant_sets: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn child(&self, name: &str) -> Option<&NodeSpec> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut NodeSpec> {
        self.children.iter_mut().find(|c| c.name == name)
    }

    pub fn variant_set(&self, name: &str) -> Option<&VariantSet> {
        self.variant_sets.iter().find(|s| s.name == name)
    }

    pub fn variant_set_mut(&mut self, name: &str) -> Option<&mut VariantSet> {
        self.variant_sets.iter_mut().find(|s| s.name == name)
    }

    /// Get or create the variant set `name`; the flag reports creation.
    pub fn ensure_variant_set(&mut self, name: &str) -> (&mut VariantSet, bool) {
        match self.variant_sets.iter().position(|s| s.name == name) {
            Some(i) => (&mut self.variant_sets[i], false),
            None => {
                self.variant_sets.push(VariantSet::new(name));
                let last = self.variant_sets.len() - 1;
                (&mut self.variant_sets[last], true)
            }
        }
    }

    /// Number of specs in this subtree, including `self`.
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(NodeSpec::count).sum::<usize>()
    }
}
