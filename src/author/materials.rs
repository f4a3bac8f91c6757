//! Material listing and binding

use serde::Serialize;

use crate::author::require_node;
use crate::compose::Stage;
use crate::core::{Error, Result};
use crate::document::{Document, DocumentStore, NodePath};

/// Type name that marks a node as a material.
pub const MATERIAL_TYPE: &str = "Material";

/// Composed paths of every material in the scene.
pub fn list_materials(stage: &Stage<'_>) -> Vec<NodePath> {
    stage
        .descendants(&NodePath::root(), None)
        .into_iter()
        .filter(|path| {
            stage
                .node(path)
                .is_some_and(|n| n.type_name() == Some(MATERIAL_TYPE))
        })
        .collect()
}

/// Check that `material` exists and is typed as a material.
pub fn require_material(stage: &Stage<'_>, material: &NodePath) -> Result<()> {
    let node = stage
        .node(material)
        .ok_or_else(|| Error::not_found(format!("Material not found: {}", material)))?;
    if node.type_name() != Some(MATERIAL_TYPE) {
        return Err(Error::invalid(format!(
            "{} is not a Material (type {})",
            material,
            node.type_name().unwrap_or("none")
        )));
    }
    Ok(())
}

/// Bind `material` to `node` under the document's current edit target.
pub fn bind_material(
    doc: &mut Document,
    store: &dyn DocumentStore,
    node: &NodePath,
    material: &NodePath,
) -> Result<()> {
    {
        let stage = Stage::compose(doc, store);
        require_node(&stage, node)?;
        require_material(&stage, material)?;
    }
    doc.author(node)
        .map_err(|e| e.wrap(Error::BindFailed))?
        .material_binding = Some(material.clone());
    log::debug!("Bound {} to {}", material, node);
    Ok(())
}

/// Clear the binding authored under the current edit target. Returns whether
/// one was present.
pub fn unbind_material(doc: &mut Document, store: &dyn DocumentStore, node: &NodePath) -> Result<bool> {
    {
        let stage = Stage::compose(doc, store);
        require_node(&stage, node)?;
    }
    let opinions = doc.author(node).map_err(|e| e.wrap(Error::BindFailed))?;
    Ok(opinions.material_binding.take().is_some())
}

/// Resolved binding of a node.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialBindingInfo {
    /// Bound material, inherited from the nearest bound ancestor when the
    /// node itself has none.
    pub material_path: Option<NodePath>,
    /// True if the node itself carries a binding opinion.
    pub binding_rel_exists: bool,
    /// The node's own binding targets, whether or not they resolve.
    pub binding_targets: Vec<NodePath>,
}

pub fn get_material_binding(stage: &Stage<'_>, node: &NodePath) -> Result<MaterialBindingInfo> {
    let composed = require_node(stage, node)?;
    let own = composed.material_binding();

    let mut material_path = None;
    for prefix in node.prefixes().iter().rev() {
        let target = if prefix == node {
            own.clone()
        } else {
            stage.node(prefix).and_then(|n| n.material_binding())
        };
        if let Some(target) = target {
            if stage.exists(&target) {
                material_path = Some(target);
            }
            break;
        }
    }

    Ok(MaterialBindingInfo {
        material_path,
        binding_rel_exists: own.is_some(),
        binding_targets: own.into_iter().collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{MemoryStore, UpAxis};

    fn path(s: &str) -> NodePath {
        NodePath::parse(s).unwrap()
    }

    fn scene() -> Document {
        let mut doc = Document::new(UpAxis::Y, 1.0);
        doc.define_node(&path("/World/Chair/Seat"), Some("Mesh")).unwrap();
        doc.define_node(&path("/Looks/Oak"), Some(MATERIAL_TYPE)).unwrap();
        doc.define_node(&path("/Looks/Notes"), Some("Scope")).unwrap();
        doc
    }

    #[test]
    fn test_list_materials() {
        let doc = scene();
        let store = MemoryStore::new();
        let stage = Stage::compose(&doc, &store);
        assert_eq!(list_materials(&stage), vec![path("/Looks/Oak")]);
    }

    #[test]
    fn test_bind_validates_material() {
        let mut doc = scene();
        let store = MemoryStore::new();
        let chair = path("/World/Chair");
        let err = bind_material(&mut doc, &store, &chair, &path("/Looks/Pine")).unwrap_err();
        assert_eq!(err.code(), "not_found");
        let err = bind_material(&mut doc, &store, &chair, &path("/Looks/Notes")).unwrap_err();
        assert_eq!(err.code(), "invalid_params");
        bind_material(&mut doc, &store, &chair, &path("/Looks/Oak")).unwrap();
    }

    #[test]
    fn test_binding_inherits_and_unbinds() {
        let mut doc = scene();
        let store = MemoryStore::new();
        bind_material(&mut doc, &store, &path("/World/Chair"), &path("/Looks/Oak")).unwrap();

        {
            let stage = Stage::compose(&doc, &store);
            let seat = get_material_binding(&stage, &path("/World/Chair/Seat")).unwrap();
            assert_eq!(seat.material_path, Some(path("/Looks/Oak")));
            assert!(!seat.binding_rel_exists);
        }

        assert!(unbind_material(&mut doc, &store, &path("/World/Chair")).unwrap());
        let stage = Stage::compose(&doc, &store);
        let chair = get_material_binding(&stage, &path("/World/Chair")).unwrap();
        assert_eq!(chair.material_path, None);
        assert!(chair.binding_targets.is_empty());
    }
}
