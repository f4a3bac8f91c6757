//! World-space bounding boxes from typed extents

use serde::Serialize;

use crate::author::{require_node, resolve_transform};
use crate::compose::{ComposedNode, Stage};
use crate::core::types::{DMat4, DVec3};
use crate::core::Result;
use crate::document::{NodePath, TimeCode, Value};

/// Axis-aligned box.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Aabb {
    pub min: DVec3,
    pub max: DVec3,
}

impl Aabb {
    pub fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    pub fn union(self, other: Aabb) -> Aabb {
        Aabb::new(self.min.min(other.min), self.max.max(other.max))
    }

    /// Box around the eight corners mapped through `m`.
    pub fn transformed(&self, m: &DMat4) -> Aabb {
        let mut out: Option<Aabb> = None;
        for i in 0..8 {
            let corner = DVec3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            );
            let p = m.transform_point3(corner);
            let point = Aabb::new(p, p);
            out = Some(out.map_or(point, |b| b.union(point)));
        }
        out.unwrap_or(*self)
    }
}

fn number(node: &ComposedNode<'_>, name: &str, time: TimeCode, fallback: f64) -> f64 {
    node.value(name, time)
        .and_then(Value::as_f64)
        .unwrap_or(fallback)
}

/// Extent of an axis-aligned solid of `radius` and `height` along `axis`.
fn axial_extent(node: &ComposedNode<'_>, time: TimeCode) -> Aabb {
    let radius = number(node, "radius", time, 1.0);
    let half = number(node, "height", time, 2.0) * 0.5;
    let axis = node
        .value("axis", time)
        .and_then(Value::as_str)
        .unwrap_or("Z");
    let half_size = match axis {
        "X" => DVec3::new(half, radius, radius),
        "Y" => DVec3::new(radius, half, radius),
        _ => DVec3::new(radius, radius, half),
    };
    Aabb::new(-half_size, half_size)
}

/// Local extent of one node: typed for the built-in solids, else its
/// authored `extent` pair.
pub fn local_extent(node: &ComposedNode<'_>, time: TimeCode) -> Option<Aabb> {
    match node.type_name() {
        Some("Cube") => {
            let half = DVec3::splat(number(node, "size", time, 2.0) * 0.5);
            Some(Aabb::new(-half, half))
        }
        Some("Sphere") => {
            let r = DVec3::splat(number(node, "radius", time, 1.0));
            Some(Aabb::new(-r, r))
        }
        Some("Cone") | Some("Cylinder") => Some(axial_extent(node, time)),
        _ => match node.value("extent", time) {
            Some(Value::Double3Array(pair)) if pair.len() == 2 => Some(Aabb::new(
                DVec3::from_array(pair[0]),
                DVec3::from_array(pair[1]),
            )),
            _ => None,
        },
    }
}

/// World-space box around `path` and its descendants, or `None` if nothing
/// under it has an extent.
pub fn get_bounds(stage: &Stage<'_>, path: &NodePath, time: TimeCode) -> Result<Option<Aabb>> {
    let mut subtree = Vec::new();
    if !path.is_root() {
        require_node(stage, path)?;
        subtree.push(path.clone());
    }
    subtree.extend(stage.descendants(path, None));

    let mut bounds: Option<Aabb> = None;
    for p in &subtree {
        let Some(node) = stage.node(p) else {
            continue;
        };
        let Some(extent) = local_extent(&node, time) else {
            continue;
        };
        let world = resolve_transform(stage, p, time)?.world;
        let placed = extent.transformed(&world);
        bounds = Some(bounds.map_or(placed, |b| b.union(placed)));
    }
    Ok(bounds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Document, MemoryStore, UpAxis};

    fn path(s: &str) -> NodePath {
        NodePath::parse(s).unwrap()
    }

    fn place(doc: &mut Document, at: &str, type_name: &str, ops: &[(&str, Value)]) {
        let p = path(at);
        doc.define_node(&p, Some(type_name)).unwrap();
        let opinions = doc.author(&p).unwrap();
        for (name, value) in ops {
            opinions
                .set_attribute(name, value.clone(), TimeCode::Default)
                .unwrap();
        }
        let order: Vec<String> = ops
            .iter()
            .map(|(n, _)| n.to_string())
            .filter(|n| n.starts_with("xformOp:"))
            .collect();
        if !order.is_empty() {
            opinions.xform_op_order = Some(order);
        }
    }

    #[test]
    fn test_scaled_cube_through_parent() {
        let mut doc = Document::new(UpAxis::Y, 1.0);
        place(&mut doc, "/World", "Xform", &[("xformOp:translate", Value::Double3([0.0, 5.0, 0.0]))]);
        place(
            &mut doc,
            "/World/Slab",
            "Cube",
            &[
                ("size", Value::Double(2.0)),
                ("xformOp:scale", Value::Double3([10.0, 10.0, 1.0])),
            ],
        );
        let store = MemoryStore::new();
        let stage = Stage::compose(&doc, &store);
        let b = get_bounds(&stage, &path("/World/Slab"), TimeCode::Default)
            .unwrap()
            .unwrap();
        assert_eq!(b.min, DVec3::new(-10.0, -5.0, -1.0));
        assert_eq!(b.max, DVec3::new(10.0, 15.0, 1.0));
    }

    #[test]
    fn test_union_over_subtree() {
        let mut doc = Document::new(UpAxis::Y, 1.0);
        place(&mut doc, "/Set", "Xform", &[]);
        place(&mut doc, "/Set/Ball", "Sphere", &[("radius", Value::Double(0.5))]);
        place(
            &mut doc,
            "/Set/Spike",
            "Cone",
            &[
                ("radius", Value::Double(1.0)),
                ("height", Value::Double(4.0)),
                ("axis", Value::Token("Y".into())),
                ("xformOp:translate", Value::Double3([3.0, 0.0, 0.0])),
            ],
        );
        place(&mut doc, "/Set/Empty", "Scope", &[]);
        let store = MemoryStore::new();
        let stage = Stage::compose(&doc, &store);

        let b = get_bounds(&stage, &path("/Set"), TimeCode::Default).unwrap().unwrap();
        assert_eq!(b.min, DVec3::new(-0.5, -2.0, -1.0));
        assert_eq!(b.max, DVec3::new(4.0, 2.0, 1.0));

        assert_eq!(get_bounds(&stage, &path("/Set/Empty"), TimeCode::Default).unwrap(), None);
        let err = get_bounds(&stage, &path("/Nope"), TimeCode::Default).unwrap_err();
        assert_eq!(err.code(), "not_found");
    }

    #[test]
    fn test_authored_extent() {
        let mut doc = Document::new(UpAxis::Y, 1.0);
        place(
            &mut doc,
            "/Mesh",
            "Mesh",
            &[("extent", Value::Double3Array(vec![[0.0, 0.0, 0.0], [1.0, 2.0, 3.0]]))],
        );
        let store = MemoryStore::new();
        let stage = Stage::compose(&doc, &store);
        let b = get_bounds(&stage, &NodePath::root(), TimeCode::Default).unwrap().unwrap();
        assert_eq!(b.max, DVec3::new(1.0, 2.0, 3.0));
    }
}
