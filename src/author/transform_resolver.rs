//! Local and world transform resolution

use serde_json::{json, Value as Json};

use crate::author::require_node;
use crate::compose::{ComposedNode, Stage};
use crate::core::types::DMat4;
use crate::core::Result;
use crate::document::xform::op_matrix;
use crate::document::{NodePath, TimeCode, Value, XformOpKind, XformOpName};
use crate::math::{is_identity, matrix};

/// One op from a node's ordered op list.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedOp {
    pub name: String,
    pub kind: Option<XformOpKind>,
    pub value: Option<Value>,
}

/// Result of [`resolve_transform`].
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedTransform {
    pub ops: Vec<ResolvedOp>,
    pub local: DMat4,
    pub world: DMat4,
}

impl ResolvedTransform {
    pub fn to_json(&self) -> Json {
        let ops: Vec<Json> = self
            .ops
            .iter()
            .map(|op| {
                json!({
                    "op": op.name,
                    "kind": op.kind.map(XformOpKind::label),
                    "value": op.value.as_ref().map(Value::to_json),
                })
            })
            .collect();
        json!({
            "ops": ops,
            "localMatrix": matrix::to_nested(&self.local),
            "worldMatrix": matrix::to_nested(&self.world),
        })
    }
}

/// Ordered ops of a composed node with their values at `time`.
pub fn ordered_ops(node: &ComposedNode<'_>, time: TimeCode) -> Vec<ResolvedOp> {
    node.xform_op_order()
        .unwrap_or_default()
        .iter()
        .map(|name| ResolvedOp {
            name: name.clone(),
            kind: XformOpName::parse(name).map(|op| op.kind),
            value: node.value(name, time).cloned(),
        })
        .collect()
}

/// Product of the ordered ops. Ops with unknown names or missing values
/// contribute nothing.
pub fn local_matrix(ops: &[ResolvedOp]) -> DMat4 {
    ops.iter().fold(DMat4::IDENTITY, |acc, op| {
        match (op.kind, &op.value) {
            (Some(kind), Some(value)) => match op_matrix(kind, value) {
                Some(m) => acc * m,
                None => {
                    log::debug!("Skipping {}: value has the wrong shape", op.name);
                    acc
                }
            },
            _ => acc,
        }
    })
}

fn transform_op_matrices(ops: &[ResolvedOp]) -> impl Iterator<Item = DMat4> + '_ {
    ops.iter()
        .filter(|op| op.kind == Some(XformOpKind::Transform))
        .filter_map(|op| op.value.as_ref().and_then(Value::as_matrix))
}

/// Resolve `path`'s ordered ops plus local and world matrices at `time`.
///
/// When the hierarchy product comes out identity, two fallbacks apply in
/// turn: the node's own non-identity transform op, then the parent-first
/// product of transform ops along the ancestor chain of nodes whose ordered
/// ops are transform ops only.
pub fn resolve_transform(stage: &Stage<'_>, path: &NodePath, time: TimeCode) -> Result<ResolvedTransform> {
    let node = require_node(stage, path)?;
    let ops = ordered_ops(&node, time);
    let local = local_matrix(&ops);

    let mut world = DMat4::IDENTITY;
    let mut chain_ops = Vec::new();
    for prefix in path.prefixes() {
        let ancestor_ops = if &prefix == path {
            ops.clone()
        } else {
            match stage.node(&prefix) {
                Some(ancestor) => ordered_ops(&ancestor, time),
                None => Vec::new(),
            }
        };
        world *= local_matrix(&ancestor_ops);
        chain_ops.push(ancestor_ops);
    }

    if is_identity(&world) {
        if let Some(m) = transform_op_matrices(&ops).find(|m| !is_identity(m)) {
            world = m;
        }
    }

    if is_identity(&world) {
        let mut acc = DMat4::IDENTITY;
        let mut any = false;
        for ancestor_ops in &chain_ops {
            let matrix_only = ancestor_ops
                .iter()
                .all(|op| op.kind == Some(XformOpKind::Transform));
            if !matrix_only {
                continue;
            }
            if let Some(m) = transform_op_matrices(ancestor_ops).next() {
                acc *= m;
                any |= !is_identity(&m);
            }
        }
        if any {
            world = acc;
        }
    }

    Ok(ResolvedTransform { ops, local, world })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::DVec3;
    use crate::document::{Document, MemoryStore, UpAxis};

    fn path(s: &str) -> NodePath {
        NodePath::parse(s).unwrap()
    }

    fn author_ops(doc: &mut Document, at: &str, ops: &[(&str, Value)]) {
        let p = path(at);
        doc.define_node(&p, Some("Xform")).unwrap();
        let opinions = doc.author(&p).unwrap();
        for (name, value) in ops {
            opinions
                .set_attribute(name, value.clone(), TimeCode::Default)
                .unwrap();
        }
        opinions.xform_op_order = Some(ops.iter().map(|(n, _)| n.to_string()).collect());
    }

    #[test]
    fn test_world_is_parent_times_local() {
        let mut doc = Document::new(UpAxis::Y, 1.0);
        author_ops(&mut doc, "/Parent", &[("xformOp:translate", Value::Double3([10.0, 0.0, 0.0]))]);
        author_ops(
            &mut doc,
            "/Parent/Child",
            &[
                ("xformOp:translate", Value::Double3([0.0, 1.0, 0.0])),
                ("xformOp:scale", Value::Double3([2.0, 2.0, 2.0])),
            ],
        );
        let store = MemoryStore::new();
        let stage = Stage::compose(&doc, &store);
        let resolved = resolve_transform(&stage, &path("/Parent/Child"), TimeCode::Default).unwrap();

        assert_eq!(resolved.ops.len(), 2);
        assert_eq!(resolved.local.w_axis.truncate(), DVec3::new(0.0, 1.0, 0.0));
        assert_eq!(resolved.world.w_axis.truncate(), DVec3::new(10.0, 1.0, 0.0));
        assert_eq!(resolved.world.x_axis.x, 2.0);
    }

    #[test]
    fn test_translate_then_rotate_order() {
        let mut doc = Document::new(UpAxis::Y, 1.0);
        author_ops(
            &mut doc,
            "/N",
            &[
                ("xformOp:translate", Value::Double3([1.0, 0.0, 0.0])),
                ("xformOp:rotateXYZ", Value::Double3([0.0, 0.0, 90.0])),
            ],
        );
        let store = MemoryStore::new();
        let stage = Stage::compose(&doc, &store);
        let resolved = resolve_transform(&stage, &path("/N"), TimeCode::Default).unwrap();
        // The point is rotated first, then translated.
        let p = resolved.world.transform_point3(DVec3::X);
        assert!((p - DVec3::new(1.0, 1.0, 0.0)).length() < 1e-9);
    }

    #[test]
    fn test_unordered_transform_attribute_ignored() {
        let mut doc = Document::new(UpAxis::Y, 1.0);
        let n = path("/N");
        doc.define_node(&n, None).unwrap();
        doc.author(&n)
            .unwrap()
            .set_attribute(
                "xformOp:translate",
                Value::Double3([5.0, 0.0, 0.0]),
                TimeCode::Default,
            )
            .unwrap();
        let store = MemoryStore::new();
        let stage = Stage::compose(&doc, &store);
        let resolved = resolve_transform(&stage, &n, TimeCode::Default).unwrap();
        assert!(resolved.ops.is_empty());
        assert!(is_identity(&resolved.world));
    }

    #[test]
    fn test_matrix_op_and_time_samples() {
        let mut doc = Document::new(UpAxis::Y, 1.0);
        let n = path("/N");
        doc.define_node(&n, None).unwrap();
        let opinions = doc.author(&n).unwrap();
        let m = DMat4::from_translation(DVec3::new(0.0, 0.0, 3.0));
        opinions
            .set_attribute("xformOp:transform", Value::from_matrix(&m), TimeCode::At(1.0))
            .unwrap();
        let m2 = DMat4::from_translation(DVec3::new(0.0, 0.0, 6.0));
        opinions
            .set_attribute("xformOp:transform", Value::from_matrix(&m2), TimeCode::At(2.0))
            .unwrap();
        opinions.xform_op_order = Some(vec!["xformOp:transform".into()]);

        let store = MemoryStore::new();
        let stage = Stage::compose(&doc, &store);
        let at_two = resolve_transform(&stage, &n, TimeCode::At(2.5)).unwrap();
        assert_eq!(at_two.world.w_axis.z, 6.0);
        let json = at_two.to_json();
        assert_eq!(json["worldMatrix"][3][2], 6.0);
        assert_eq!(json["ops"][0]["kind"], "transform");
    }

    #[test]
    fn test_cancelled_world_falls_back_to_transform_op() {
        let mut doc = Document::new(UpAxis::Y, 1.0);
        let lift = DMat4::from_translation(DVec3::new(0.0, 4.0, 0.0));
        author_ops(
            &mut doc,
            "/N",
            &[
                ("xformOp:transform", Value::from_matrix(&DMat4::IDENTITY)),
                ("xformOp:transform:lift", Value::from_matrix(&lift)),
                ("xformOp:translate", Value::Double3([0.0, -4.0, 0.0])),
            ],
        );
        let store = MemoryStore::new();
        let stage = Stage::compose(&doc, &store);
        let resolved = resolve_transform(&stage, &path("/N"), TimeCode::Default).unwrap();

        assert!(is_identity(&resolved.local));
        assert_eq!(resolved.world, lift);
    }

    #[test]
    fn test_cancelled_world_falls_back_to_matrix_only_ancestors() {
        let mut doc = Document::new(UpAxis::Y, 1.0);
        let shift = DMat4::from_translation(DVec3::new(2.0, 0.0, 0.0));
        author_ops(&mut doc, "/A", &[("xformOp:transform", Value::from_matrix(&shift))]);
        author_ops(&mut doc, "/A/B", &[("xformOp:translate", Value::Double3([-2.0, 0.0, 0.0]))]);
        author_ops(&mut doc, "/A/B/C", &[("xformOp:transform", Value::from_matrix(&DMat4::IDENTITY))]);
        let store = MemoryStore::new();
        let stage = Stage::compose(&doc, &store);
        let resolved = resolve_transform(&stage, &path("/A/B/C"), TimeCode::Default).unwrap();

        // /A/B mixes in a translate and is skipped.
        assert_eq!(resolved.world, shift);
    }

    #[test]
    fn test_identity_without_transform_ops_stays_identity() {
        let mut doc = Document::new(UpAxis::Y, 1.0);
        author_ops(
            &mut doc,
            "/N",
            &[
                ("xformOp:translate", Value::Double3([1.0, 0.0, 0.0])),
                ("xformOp:translate:back", Value::Double3([-1.0, 0.0, 0.0])),
            ],
        );
        let store = MemoryStore::new();
        let stage = Stage::compose(&doc, &store);
        let resolved = resolve_transform(&stage, &path("/N"), TimeCode::Default).unwrap();
        assert!(is_identity(&resolved.world));
    }

    #[test]
    fn test_missing_node() {
        let doc = Document::new(UpAxis::Y, 1.0);
        let store = MemoryStore::new();
        let stage = Stage::compose(&doc, &store);
        let err = resolve_transform(&stage, &path("/Ghost"), TimeCode::Default).unwrap_err();
        assert_eq!(err.code(), "not_found");
    }
}
