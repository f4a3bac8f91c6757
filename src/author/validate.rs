//! Structural checks over a composed document

use serde::Serialize;

use crate::author::materials::MATERIAL_TYPE;
use crate::compose::{ComposedNode, Stage};
use crate::document::xform::op_matrix;
use crate::document::{NodePath, TimeCode, XformOpName};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

/// One finding. `node_path` is absent for document-level issues.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub severity: Severity,
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_path: Option<NodePath>,
    pub message: String,
}

impl Issue {
    fn error(code: &'static str, node: Option<&NodePath>, message: String) -> Self {
        Self {
            severity: Severity::Error,
            code,
            node_path: node.cloned(),
            message,
        }
    }

    fn warning(code: &'static str, node: Option<&NodePath>, message: String) -> Self {
        Self {
            severity: Severity::Warning,
            code,
            node_path: node.cloned(),
            message,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub valid: bool,
    pub node_count: usize,
    pub issues: Vec<Issue>,
}

/// Size attributes that must be positive, per node type.
const POSITIVE_SIZES: &[(&str, &[&str])] = &[
    ("Cube", &["size"]),
    ("Sphere", &["radius"]),
    ("Cone", &["radius", "height"]),
    ("Cylinder", &["radius", "height"]),
];

/// Check composition, default node, op orders, bindings, variant selections
/// and geometric sizes. Only errors make the report invalid.
pub fn validate(stage: &Stage<'_>) -> ValidationReport {
    let mut issues: Vec<Issue> = stage
        .errors()
        .iter()
        .map(|e| Issue::error("composition", None, e.clone()))
        .collect();

    let root = stage.root();
    if let Some(default) = &root.default_node {
        if !stage.exists(default) {
            issues.push(Issue::error(
                "default_node_missing",
                None,
                format!("Default node {} does not exist", default),
            ));
        }
    }

    let paths = stage.descendants(&NodePath::root(), None);
    for path in &paths {
        let Some(node) = stage.node(path) else {
            continue;
        };
        check_node(stage, &node, path, &mut issues);
    }

    ValidationReport {
        valid: !issues.iter().any(|i| i.severity == Severity::Error),
        node_count: paths.len(),
        issues,
    }
}

fn check_node(stage: &Stage<'_>, node: &ComposedNode<'_>, path: &NodePath, issues: &mut Vec<Issue>) {
    if !node.is_defined() {
        issues.push(Issue::warning(
            "undefined_over",
            Some(path),
            format!("{} only has over opinions", path),
        ));
    }

    let order = node.xform_op_order().unwrap_or_default();
    for (i, name) in order.iter().enumerate() {
        if order[..i].contains(name) {
            issues.push(Issue::error(
                "duplicate_op",
                Some(path),
                format!("{} appears twice in the op order", name),
            ));
            continue;
        }
        let Some(op) = XformOpName::parse(name) else {
            issues.push(Issue::error(
                "unknown_op",
                Some(path),
                format!("{} is not a transform op", name),
            ));
            continue;
        };
        match node.value(name, TimeCode::Default) {
            None => issues.push(Issue::error(
                "op_without_value",
                Some(path),
                format!("{} is ordered but has no value", name),
            )),
            Some(value) if op_matrix(op.kind, value).is_none() => issues.push(Issue::error(
                "op_value_shape",
                Some(path),
                format!("{} holds a {:?} value", name, value.kind()),
            )),
            Some(_) => {}
        }
    }

    if let Some(target) = node.material_binding() {
        match stage.node(&target) {
            None => issues.push(Issue::error(
                "binding_target_missing",
                Some(path),
                format!("Bound material {} does not exist", target),
            )),
            Some(material) if material.type_name() != Some(MATERIAL_TYPE) => {
                issues.push(Issue::warning(
                    "binding_target_type",
                    Some(path),
                    format!("Bound node {} is not a Material", target),
                ))
            }
            Some(_) => {}
        }
    }

    for set in node.variant_sets() {
        if let Some(selection) = &set.selection {
            if !set.variants.contains(selection) {
                issues.push(Issue::error(
                    "variant_selection",
                    Some(path),
                    format!("Variant set {} selects missing variant {}", set.name, selection),
                ));
            }
        }
    }

    let sizes = POSITIVE_SIZES
        .iter()
        .find(|(type_name, _)| node.type_name() == Some(*type_name))
        .map(|(_, attrs)| *attrs)
        .unwrap_or_default();
    for attr in sizes {
        if let Some(v) = node.value(attr, TimeCode::Default).and_then(|v| v.as_f64()) {
            if v <= 0.0 {
                issues.push(Issue::error(
                    "non_positive_size",
                    Some(path),
                    format!("{} is {}", attr, v),
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Document, MemoryStore, Reference, UpAxis, Value};

    fn path(s: &str) -> NodePath {
        NodePath::parse(s).unwrap()
    }

    #[test]
    fn test_clean_document_is_valid() {
        let mut doc = Document::new(UpAxis::Y, 1.0);
        doc.define_node(&path("/World/Box"), Some("Cube")).unwrap();
        doc.define_node(&path("/Looks/Red"), Some(MATERIAL_TYPE)).unwrap();
        let box_opinions = doc.author(&path("/World/Box")).unwrap();
        box_opinions.material_binding = Some(path("/Looks/Red"));
        box_opinions
            .set_attribute("xformOp:translate", Value::Double3([1.0, 0.0, 0.0]), TimeCode::Default)
            .unwrap();
        box_opinions.xform_op_order = Some(vec!["xformOp:translate".into()]);
        doc.default_node = Some(path("/World"));

        let store = MemoryStore::new();
        let stage = Stage::compose(&doc, &store);
        let report = validate(&stage);
        assert!(report.valid, "{:?}", report.issues);
        assert!(report.issues.is_empty());
        assert_eq!(report.node_count, 4);
    }

    #[test]
    fn test_reports_structural_problems() {
        let mut doc = Document::new(UpAxis::Y, 1.0);
        let node = path("/World/Box");
        doc.define_node(&node, Some("Cube")).unwrap();
        doc.override_node(&path("/Loose")).unwrap();
        let opinions = doc.author(&node).unwrap();
        opinions
            .set_attribute("size", Value::Double(0.0), TimeCode::Default)
            .unwrap();
        opinions
            .set_attribute("xformOp:scale", Value::Double(2.0), TimeCode::Default)
            .unwrap();
        opinions.xform_op_order = Some(vec![
            "xformOp:translate".into(),
            "xformOp:scale".into(),
            "xformOp:scale".into(),
            "shear".into(),
        ]);
        opinions.material_binding = Some(path("/Looks/Gone"));
        opinions.add_reference(Reference::new("missing.sdoc", None));
        doc.default_node = Some(path("/Elsewhere"));

        let store = MemoryStore::new();
        let stage = Stage::compose(&doc, &store);
        let report = validate(&stage);
        assert!(!report.valid);

        let codes: Vec<&str> = report.issues.iter().map(|i| i.code).collect();
        for expected in [
            "composition",
            "default_node_missing",
            "undefined_over",
            "op_without_value",
            "op_value_shape",
            "duplicate_op",
            "unknown_op",
            "binding_target_missing",
            "non_positive_size",
        ] {
            assert!(codes.contains(&expected), "missing {} in {:?}", expected, codes);
        }
        let loose = report
            .issues
            .iter()
            .find(|i| i.code == "undefined_over")
            .unwrap();
        assert_eq!(loose.severity, Severity::Warning);
        assert_eq!(loose.node_path, Some(path("/Loose")));
    }
}
