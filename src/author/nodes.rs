//! Node lifecycle, attribute access and document introspection

use serde::Serialize;
use serde_json::Value as Json;

use crate::author::require_node;
use crate::compose::Stage;
use crate::core::{Error, Result};
use crate::document::{
    Attribute, Document, DocumentStore, LayerKey, NodePath, Specifier, TimeCode, UpAxis, Value,
    ValueKind,
};

/// Create (or re-specify) a node. `def` defines missing ancestors too;
/// `over` only records an override chain.
pub fn create_node(
    doc: &mut Document,
    path: &NodePath,
    type_name: Option<&str>,
    specifier: Specifier,
) -> Result<()> {
    match specifier {
        Specifier::Def => {
            doc.define_node(path, type_name)?;
        }
        Specifier::Over => {
            let spec = doc.override_node(path)?;
            if let Some(type_name) = type_name {
                spec.type_name = Some(type_name.to_string());
            }
        }
    }
    log::debug!("Created {:?} {}", specifier, path);
    Ok(())
}

/// Remove the node's spec and subtree from the document.
pub fn delete_node(doc: &mut Document, path: &NodePath) -> Result<()> {
    if !doc.remove_node(path) {
        return Err(Error::not_found(format!("Node not found: {}", path)));
    }
    Ok(())
}

/// Composed paths under `root`, `root` itself first unless it is the
/// pseudo-root. `type_filter` keeps only nodes of that type.
pub fn list_nodes(
    stage: &Stage<'_>,
    root: &NodePath,
    depth: Option<usize>,
    type_filter: Option<&str>,
) -> Result<Vec<NodePath>> {
    let mut paths = Vec::new();
    if !root.is_root() {
        require_node(stage, root)?;
        paths.push(root.clone());
    }
    paths.extend(stage.descendants(root, depth));
    if let Some(filter) = type_filter {
        paths.retain(|p| stage.node(p).is_some_and(|n| n.type_name() == Some(filter)));
    }
    Ok(paths)
}

/// Composed description of one node.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    pub path: NodePath,
    pub type_name: Option<String>,
    pub specifier: Specifier,
    pub attributes: Vec<String>,
    pub relationships: Vec<String>,
    pub references: Vec<String>,
    pub variant_sets: Vec<String>,
    pub children: Vec<String>,
}

pub fn node_info(stage: &Stage<'_>, path: &NodePath) -> Result<NodeInfo> {
    let node = require_node(stage, path)?;
    let relationships = if node.material_binding().is_some() {
        vec!["material:binding".to_string()]
    } else {
        Vec::new()
    };
    Ok(NodeInfo {
        path: path.clone(),
        type_name: node.type_name().map(str::to_string),
        specifier: if node.is_defined() {
            Specifier::Def
        } else {
            Specifier::Over
        },
        attributes: node.attribute_names(),
        relationships,
        references: node
            .direct_references()
            .into_iter()
            .map(|r| r.asset_path)
            .collect(),
        variant_sets: node.variant_sets().into_iter().map(|s| s.name).collect(),
        children: node.children(),
    })
}

/// Composed value of `attr` at `time` as plain JSON.
pub fn get_attribute(stage: &Stage<'_>, path: &NodePath, attr: &str, time: TimeCode) -> Result<Json> {
    let node = require_node(stage, path)?;
    let attribute = node
        .attribute(attr)
        .ok_or_else(|| Error::not_found(format!("Attribute not found: {}.{}", path, attr)))?;
    Ok(attribute.get(time).map(Value::to_json).unwrap_or(Json::Null))
}

/// Set `attr` from JSON. A new local opinion takes the type of an attribute
/// already visible through composition, else it is typed from the value.
pub fn set_attribute(
    doc: &mut Document,
    store: &dyn DocumentStore,
    path: &NodePath,
    attr: &str,
    value: &Json,
    time: TimeCode,
) -> Result<()> {
    let value = Value::from_json(value)?;
    let composed_kind = {
        let stage = Stage::compose(doc, store);
        let node = require_node(&stage, path)?;
        node.attribute(attr).map(|a| a.kind)
    };
    write_value(doc, path, attr, value, composed_kind, time)
}

pub(crate) fn write_value(
    doc: &mut Document,
    path: &NodePath,
    attr: &str,
    value: Value,
    composed_kind: Option<ValueKind>,
    time: TimeCode,
) -> Result<()> {
    let opinions = doc.author(path).map_err(|e| e.wrap(Error::AttributeFailed))?;
    if let Some(kind) = composed_kind {
        opinions
            .attributes
            .entry(attr.to_string())
            .or_insert_with(|| Attribute::new(kind));
    }
    opinions.set_attribute(attr, value, time)
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRange {
    pub start: Option<f64>,
    pub end: Option<f64>,
}

/// Document-level overview.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSummary {
    /// Root layer first, then every loaded referenced document.
    pub layers: Vec<String>,
    pub root_nodes: Vec<String>,
    pub default_node: Option<NodePath>,
    pub time_codes: TimeRange,
    pub up_axis: UpAxis,
    pub meters_per_unit: f64,
    pub node_count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub composition_errors: Vec<String>,
}

pub fn summarize(stage: &Stage<'_>) -> DocumentSummary {
    let root = stage.root();
    let mut layers = vec![root
        .origin()
        .map(|o| LayerKey::for_origin(o).display())
        .unwrap_or_else(|| "<memory>".to_string())];
    layers.extend(stage.layer_keys().into_iter().map(|k| k.display()));
    DocumentSummary {
        layers,
        root_nodes: stage.root_children(),
        default_node: root.default_node.clone(),
        time_codes: TimeRange {
            start: root.start_time,
            end: root.end_time,
        },
        up_axis: root.up_axis,
        meters_per_unit: root.meters_per_unit,
        node_count: stage.descendants(&NodePath::root(), None).len(),
        composition_errors: stage.errors().to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::MemoryStore;
    use serde_json::json;

    fn path(s: &str) -> NodePath {
        NodePath::parse(s).unwrap()
    }

    fn scene() -> Document {
        let mut doc = Document::new(UpAxis::Z, 0.01);
        create_node(&mut doc, &path("/World/Table"), Some("Xform"), Specifier::Def).unwrap();
        create_node(&mut doc, &path("/World/Table/Top"), Some("Cube"), Specifier::Def).unwrap();
        create_node(&mut doc, &path("/World/Lamp"), Some("Sphere"), Specifier::Def).unwrap();
        doc
    }

    #[test]
    fn test_list_nodes_depth_and_filter() {
        let doc = scene();
        let store = MemoryStore::new();
        let stage = Stage::compose(&doc, &store);
        let world = path("/World");
        let shallow = list_nodes(&stage, &world, Some(1), None).unwrap();
        assert_eq!(shallow, vec![world.clone(), path("/World/Table"), path("/World/Lamp")]);
        let all = list_nodes(&stage, &NodePath::root(), None, None).unwrap();
        assert_eq!(all.len(), 4);
        let cubes = list_nodes(&stage, &NodePath::root(), None, Some("Cube")).unwrap();
        assert_eq!(cubes, vec![path("/World/Table/Top")]);
        assert!(list_nodes(&stage, &path("/Nope"), None, None).is_err());
    }

    #[test]
    fn test_attribute_round_trip_and_coercion() {
        let mut doc = scene();
        let store = MemoryStore::new();
        let lamp = path("/World/Lamp");
        set_attribute(&mut doc, &store, &lamp, "radius", &json!(2), TimeCode::Default).unwrap();
        assert_eq!(
            doc.node(&lamp).unwrap().opinions.attribute("radius").unwrap().kind,
            ValueKind::Int
        );
        set_attribute(&mut doc, &store, &lamp, "intensity", &json!(1.5), TimeCode::At(4.0)).unwrap();

        let stage = Stage::compose(&doc, &store);
        assert_eq!(get_attribute(&stage, &lamp, "radius", TimeCode::Default).unwrap(), json!(2));
        assert_eq!(
            get_attribute(&stage, &lamp, "intensity", TimeCode::At(10.0)).unwrap(),
            json!(1.5)
        );
        let err = get_attribute(&stage, &lamp, "missing", TimeCode::Default).unwrap_err();
        assert_eq!(err.code(), "not_found");
    }

    #[test]
    fn test_delete_and_info() {
        let mut doc = scene();
        let store = MemoryStore::new();
        delete_node(&mut doc, &path("/World/Lamp")).unwrap();
        assert_eq!(delete_node(&mut doc, &path("/World/Lamp")).unwrap_err().code(), "not_found");

        let stage = Stage::compose(&doc, &store);
        let info = node_info(&stage, &path("/World/Table")).unwrap();
        assert_eq!(info.type_name.as_deref(), Some("Xform"));
        assert_eq!(info.children, vec!["Top".to_string()]);

        let summary = summarize(&stage);
        assert_eq!(summary.root_nodes, vec!["World".to_string()]);
        assert_eq!(summary.node_count, 3);
        assert_eq!(summary.meters_per_unit, 0.01);
    }

    #[test]
    fn test_over_records_override() {
        let mut doc = Document::new(UpAxis::Y, 1.0);
        create_node(&mut doc, &path("/Ref/Part"), None, Specifier::Over).unwrap();
        assert_eq!(doc.node(&path("/Ref")).unwrap().specifier, Specifier::Over);
    }
}
