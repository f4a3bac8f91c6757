//! Baking a composed stage into a single self-contained document

use std::collections::BTreeMap;

use crate::compose::stage::{ComposedNode, Stage};
use crate::document::{Document, NodePath, NodeSpec, Opinions, Specifier};

impl Stage<'_> {
    /// Bake the composed scene into a reference-free, variant-free document.
    /// Stage metadata comes from the root document.
    pub fn flatten(&self) -> Document {
        let root = self.root();
        let mut out = Document::new(root.up_axis, root.meters_per_unit);
        out.default_node = root.default_node.clone();
        out.start_time = root.start_time;
        out.end_time = root.end_time;

        for name in self.root_children() {
            if let Ok(path) = NodePath::root().child(&name) {
                if let Some(spec) = self.flatten_node(&path) {
                    out.nodes.push(spec);
                }
            }
        }
        out
    }

    fn flatten_node(&self, path: &NodePath) -> Option<NodeSpec> {
        let node = self.node(path)?;
        let mut spec = NodeSpec::new(
            path.name(),
            if node.is_defined() {
                Specifier::Def
            } else {
                Specifier::Over
            },
        );
        spec.type_name = node.type_name().map(str::to_string);
        spec.opinions = baked_opinions(&node);

        for name in node.children() {
            if let Ok(child) = path.child(&name) {
                if let Some(child_spec) = self.flatten_node(&child) {
                    spec.children.push(child_spec);
                }
            }
        }
        Some(spec)
    }
}

fn baked_opinions(node: &ComposedNode<'_>) -> Opinions {
    let mut attributes = BTreeMap::new();
    for name in node.attribute_names() {
        if let Some(attr) = node.attribute(&name) {
            attributes.insert(name, attr.clone());
        }
    }
    Opinions {
        attributes,
        xform_op_order: node.xform_op_order().map(<[String]>::to_vec),
        references: Vec::new(),
        material_binding: node.material_binding(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{DocumentStore, MemoryStore, Reference, TimeCode, UpAxis, Value};
    use std::path::Path;

    #[test]
    fn test_flatten_inlines_reference() {
        let store = MemoryStore::new();
        let mut asset = Document::new(UpAxis::Z, 0.01);
        let model = NodePath::parse("/Model").unwrap();
        asset.define_node(&model, Some("Xform")).unwrap();
        asset
            .define_node(&NodePath::parse("/Model/Body").unwrap(), Some("Mesh"))
            .unwrap();
        asset
            .author(&model)
            .unwrap()
            .set_attribute("label", Value::String("car".into()), TimeCode::Default)
            .unwrap();
        asset.default_node = Some(model);
        store.save_document(&asset, Path::new("/car.sdoc")).unwrap();

        let mut scene = Document::new(UpAxis::Y, 1.0);
        let car = NodePath::parse("/Car").unwrap();
        scene.define_node(&car, None).unwrap();
        scene
            .author(&car)
            .unwrap()
            .add_reference(Reference::new("/car.sdoc", None));

        let flat = Stage::compose(&scene, &store).flatten();
        assert_eq!(flat.up_axis, UpAxis::Y);
        let car_spec = flat.node(&car).unwrap();
        assert!(car_spec.opinions.references.is_empty());
        assert_eq!(car_spec.type_name.as_deref(), Some("Xform"));
        assert!(car_spec.opinions.attributes.contains_key("label"));
        assert!(flat.node(&NodePath::parse("/Car/Body").unwrap()).is_some());
    }
}
