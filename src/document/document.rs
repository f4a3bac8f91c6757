//! In-memory scene document and its authoring edit target

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};
use crate::document::node::{NodeSpec, Opinions, Specifier};
use crate::document::path::NodePath;

/// Format tag written at the top of every plain document.
pub const FORMAT_TAG: &str = "scenecomp";

/// Current on-disk version.
pub const FORMAT_VERSION: u32 = 1;

/// Declared up axis.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpAxis {
    Y,
    #[default]
    Z,
}

impl UpAxis {
    /// Parse `"Y"` / `"Z"`, case-insensitively.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim() {
            "Y" | "y" => Ok(UpAxis::Y),
            "Z" | "z" => Ok(UpAxis::Z),
            other => Err(Error::invalid(format!("upAxis must be Y or Z, got '{}'", other))),
        }
    }
}

impl fmt::Display for UpAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpAxis::Y => f.write_str("Y"),
            UpAxis::Z => f.write_str("Z"),
        }
    }
}

/// Where a document was loaded from.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum DocumentOrigin {
    File(PathBuf),
    /// A member of a packaged archive.
    Packaged { archive: PathBuf, member: String },
}

/// Where authoring calls currently write.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum EditTarget {
    #[default]
    Direct,
    Variant {
        node: NodePath,
        set: String,
        variant: String,
    },
}

/// A scene document: metadata plus a tree of node specs.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub format: String,
    pub version: u32,
    pub up_axis: UpAxis,
    pub meters_per_unit: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_node: Option<NodePath>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<f64>,
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
    #[serde(skip)]
    origin: Option<DocumentOrigin>,
    #[serde(skip)]
    edit_target: EditTarget,
}

impl Document {
    pub fn new(up_axis: UpAxis, meters_per_unit: f64) -> Self {
        Self {
            format: FORMAT_TAG.to_string(),
            version: FORMAT_VERSION,
            up_axis,
            meters_per_unit,
            default_node: None,
            start_time: None,
            end_time: None,
            nodes: Vec::new(),
            origin: None,
            edit_target: EditTarget::Direct,
        }
    }

    pub fn origin(&self) -> Option<&DocumentOrigin> {
        self.origin.as_ref()
    }

    pub fn set_origin(&mut self, origin: DocumentOrigin) {
        self.origin = Some(origin);
    }

    pub fn edit_target(&self) -> &EditTarget {
        &self.edit_target
    }

    /// Root node spec named `name`.
    pub fn root_node(&self, name: &str) -> Option<&NodeSpec> {
        self.nodes.iter().find(|n| n.name == name)
    }

    pub fn root_names(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.name.clone()).collect()
    }

    /// Direct spec at `path`, ignoring composition.
    pub fn node(&self, path: &NodePath) -> Option<&NodeSpec> {
        let mut parts = path.components();
        let mut current = self.root_node(parts.next()?)?;
        for part in parts {
            current = current.child(part)?;
        }
        Some(current)
    }

    pub fn node_mut(&mut self, path: &NodePath) -> Option<&mut NodeSpec> {
        let mut parts = path.components();
        let first = parts.next()?;
        let mut current = self.nodes.iter_mut().find(|n| n.name == first)?;
        for part in parts {
            current = current.child_mut(part)?;
        }
        Some(current)
    }

    /// Get or create the spec chain down to `path`. Missing specs get
    /// `specifier`.
    fn ensure_spec(&mut self, path: &NodePath, specifier: Specifier) -> Result<&mut NodeSpec> {
        let mut parts = path.components();
        let first = parts
            .next()
            .ok_or_else(|| Error::invalid("The pseudo-root cannot carry opinions"))?;
        let index = match self.nodes.iter().position(|n| n.name == first) {
            Some(i) => i,
            None => {
                self.nodes.push(NodeSpec::new(first, specifier));
                self.nodes.len() - 1
            }
        };
        let mut current = &mut self.nodes[index];
        for part in parts {
            let index = match current.children.iter().position(|c| c.name == part) {
                Some(i) => i,
                None => {
                    current.children.push(NodeSpec::new(part, specifier));
                    current.children.len() - 1
                }
            };
            current = &mut current.children[index];
        }
        Ok(current)
    }

    /// Define a node, creating typeless ancestors as needed. An existing
    /// spec is promoted to `def` and retyped when `type_name` is given.
    pub fn define_node(&mut self, path: &NodePath, type_name: Option<&str>) -> Result<&mut NodeSpec> {
        for prefix in path.prefixes() {
            if let Some(spec) = self.node_mut(&prefix) {
                spec.specifier = Specifier::Def;
            }
        }
        let spec = self.ensure_spec(path, Specifier::Def)?;
        spec.specifier = Specifier::Def;
        if let Some(type_name) = type_name {
            spec.type_name = Some(type_name.to_string());
        }
        Ok(spec)
    }

    /// Get or create an `over` spec chain down to `path`.
    pub fn override_node(&mut self, path: &NodePath) -> Result<&mut NodeSpec> {
        self.ensure_spec(path, Specifier::Over)
    }

    /// Remove the spec at `path` and its subtree.
    pub fn remove_node(&mut self, path: &NodePath) -> bool {
        let Some(parent) = path.parent() else {
            return false;
        };
        let name = path.name();
        let siblings = if parent.is_root() {
            &mut self.nodes
        } else {
            match self.node_mut(&parent) {
                Some(spec) => &mut spec.children,
                None => return false,
            }
        };
        let before = siblings.len();
        siblings.retain(|n| n.name != name);
        siblings.len() != before
    }

    /// Remove every root node. Returns how many were removed.
    pub fn clear_root_nodes(&mut self) -> usize {
        let count = self.nodes.len();
        self.nodes.clear();
        count
    }

    /// Default node path, if declared and present.
    pub fn default_node_path(&self) -> Option<&NodePath> {
        self.default_node.as_ref().filter(|p| self.node(p).is_some())
    }

    /// Opinions that authoring at `path` writes into under the current edit
    /// target. Direct targets create an `over` spec if none exists.
    pub fn author(&mut self, path: &NodePath) -> Result<&mut Opinions> {
        match self.edit_target.clone() {
            EditTarget::Direct => Ok(&mut self.override_node(path)?.opinions),
            EditTarget::Variant { node, set, variant } => {
                if &node != path {
                    return Err(Error::VariantFailed(format!(
                        "Cannot author {} inside the {}:{{{}={}}} edit scope",
                        path, node, set, variant
                    )));
                }
                let spec = self
                    .node_mut(&node)
                    .ok_or_else(|| Error::not_found(format!("Node not found: {}", node)))?;
                let variant_ref = spec
                    .variant_set_mut(&set)
                    .and_then(|s| s.variant_mut(&variant))
                    .ok_or_else(|| {
                        Error::VariantFailed(format!("Variant {}:{} not found on {}", set, variant, node))
                    })?;
                Ok(&mut variant_ref.opinions)
            }
        }
    }

    /// Redirect authoring at `node` into `set`'s `variant` until the returned
    /// scope is dropped.
    pub fn begin_variant_edit(
        &mut self,
        node: &NodePath,
        set: &str,
        variant: &str,
    ) -> Result<VariantEditScope<'_>> {
        let exists = self
            .node(node)
            .and_then(|spec| spec.variant_set(set))
            .is_some_and(|s| s.has_variant(variant));
        if !exists {
            return Err(Error::VariantFailed(format!(
                "Variant {}:{} not found on {}",
                set, variant, node
            )));
        }
        let previous = std::mem::replace(
            &mut self.edit_target,
            EditTarget::Variant {
                node: node.clone(),
                set: set.to_string(),
                variant: variant.to_string(),
            },
        );
        log::debug!("Editing {} inside {}={}", node, set, variant);
        Ok(VariantEditScope { doc: self, previous })
    }

    /// Number of node specs in the document.
    pub fn node_count(&self) -> usize {
        self.nodes.iter().map(NodeSpec::count).sum()
    }
}

/// Scope guard returned by [`Document::begin_variant_edit`]. Authoring through
/// it lands in the variant; dropping it restores the previous edit target.
pub struct VariantEditScope<'a> {
    doc: &'a mut Document,
    previous: EditTarget,
}

impl Deref for VariantEditScope<'_> {
    type Target = Document;

    fn deref(&self) -> &Document {
        &*self.doc
    }
}

impl DerefMut for VariantEditScope<'_> {
    fn deref_mut(&mut self) -> &mut Document {
        &mut *self.doc
    }
}

impl Drop for VariantEditScope<'_> {
    fn drop(&mut self) {
        self.doc.edit_target = std::mem::take(&mut self.previous);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::value::{TimeCode, Value};

    fn path(s: &str) -> NodePath {
        NodePath::parse(s).unwrap()
    }

    #[test]
    fn test_define_creates_ancestors() {
        let mut doc = Document::new(UpAxis::Y, 1.0);
        doc.define_node(&path("/World/Chair"), Some("Xform")).unwrap();
        assert_eq!(doc.node(&path("/World")).unwrap().specifier, Specifier::Def);
        assert_eq!(
            doc.node(&path("/World/Chair")).unwrap().type_name.as_deref(),
            Some("Xform")
        );
        assert_eq!(doc.node_count(), 2);
    }

    #[test]
    fn test_remove_node() {
        let mut doc = Document::new(UpAxis::Y, 1.0);
        doc.define_node(&path("/A/B"), None).unwrap();
        assert!(doc.remove_node(&path("/A/B")));
        assert!(!doc.remove_node(&path("/A/B")));
        assert!(doc.node(&path("/A")).is_some());
    }

    #[test]
    fn test_variant_scope_redirects_and_restores() {
        let mut doc = Document::new(UpAxis::Y, 1.0);
        let chair = path("/Chair");
        let spec = doc.define_node(&chair, None).unwrap();
        spec.ensure_variant_set("look").0.add_variant("red");

        {
            let mut scope = doc.begin_variant_edit(&chair, "look", "red").unwrap();
            scope
                .author(&chair)
                .unwrap()
                .set_attribute("color", Value::Double3([1.0, 0.0, 0.0]), TimeCode::Default)
                .unwrap();
            assert!(scope.author(&path("/Other")).is_err());
        }

        assert_eq!(doc.edit_target(), &EditTarget::Direct);
        let spec = doc.node(&chair).unwrap();
        assert!(spec.opinions.attributes.is_empty());
        let variant = spec.variant_set("look").unwrap().variant("red").unwrap();
        assert!(variant.opinions.attributes.contains_key("color"));
    }

    #[test]
    fn test_variant_scope_requires_variant() {
        let mut doc = Document::new(UpAxis::Y, 1.0);
        doc.define_node(&path("/Chair"), None).unwrap();
        assert!(doc.begin_variant_edit(&path("/Chair"), "look", "red").is_err());
    }

    #[test]
    fn test_author_creates_over() {
        let mut doc = Document::new(UpAxis::Y, 1.0);
        doc.author(&path("/Ref/Child")).unwrap();
        assert_eq!(doc.node(&path("/Ref/Child")).unwrap().specifier, Specifier::Over);
    }
}
