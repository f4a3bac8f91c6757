//! Transform authoring: matrix edits and the common translate/rotate/scale
//! policy with type-specific scale redirection

use serde::Serialize;
use serde_json::Value as Json;

use crate::author::require_node;
use crate::compose::Stage;
use crate::core::types::{DMat4, DVec3};
use crate::core::{Error, Result};
use crate::document::value::{matrix_from_json, vec3_from_json};
use crate::document::{
    Document, DocumentStore, NodePath, TimeCode, Value, XformOpKind, XformOpName,
};

/// Values supplied for the common ops. Unset kinds are left alone.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CommonOps {
    pub translate: Option<DVec3>,
    /// XYZ Euler angles in degrees.
    pub rotate: Option<DVec3>,
    pub scale: Option<DVec3>,
}

impl CommonOps {
    pub fn is_empty(&self) -> bool {
        self.translate.is_none() && self.rotate.is_none() && self.scale.is_none()
    }

    /// Parse an op list. Entries are either `{op, value}` records or
    /// single-key objects such as `{"translate": [1, 2, 3]}`; a bare object
    /// mapping op names to values is accepted too.
    pub fn parse(json: &Json) -> Result<Self> {
        let mut ops = CommonOps::default();
        match json {
            Json::Array(entries) => {
                for entry in entries {
                    let object = entry
                        .as_object()
                        .ok_or_else(|| Error::invalid("Each op must be an object"))?;
                    let explicit = object
                        .get("op")
                        .or_else(|| object.get("opType"))
                        .and_then(Json::as_str);
                    match explicit {
                        Some(name) => {
                            let value = object.get("value").unwrap_or(&Json::Null);
                            ops.apply(name, value)?;
                        }
                        None => {
                            for (name, value) in object {
                                ops.apply(name, value)?;
                            }
                        }
                    }
                }
            }
            Json::Object(object) => {
                for (name, value) in object {
                    ops.apply(name, value)?;
                }
            }
            _ => return Err(Error::invalid("'ops' must be a list of op entries")),
        }
        Ok(ops)
    }

    fn apply(&mut self, name: &str, value: &Json) -> Result<()> {
        let lowered = name.trim().to_ascii_lowercase();
        let op = lowered.strip_prefix("xformop:").unwrap_or(&lowered);
        let slot = match op {
            "translate" | "t" => &mut self.translate,
            "rotatexyz" | "rotate" | "r" => &mut self.rotate,
            "scale" | "s" => &mut self.scale,
            other => return Err(Error::invalid(format!("Unsupported xform op: {}", other))),
        };
        *slot = Some(vec3_from_json(value).map_err(|_| {
            Error::invalid(format!("Op '{}' needs a list of 3 numbers", name))
        })?);
        Ok(())
    }
}

/// A transform edit: exactly one of a full matrix or common ops.
#[derive(Clone, Debug, PartialEq)]
pub enum TransformEdit {
    Matrix(DMat4),
    Ops(CommonOps),
}

impl TransformEdit {
    /// Build from the optional `matrix` / `ops` parameters. Null counts as
    /// absent; exactly one must remain.
    pub fn from_params(matrix: Option<&Json>, ops: Option<&Json>) -> Result<Self> {
        let matrix = matrix.filter(|m| !m.is_null());
        let ops = ops.filter(|o| !o.is_null());
        match (matrix, ops) {
            (Some(m), None) => Ok(TransformEdit::Matrix(matrix_from_json(m)?)),
            (None, Some(o)) => {
                let parsed = CommonOps::parse(o)?;
                if parsed.is_empty() {
                    return Err(Error::invalid("'ops' must set at least one op"));
                }
                Ok(TransformEdit::Ops(parsed))
            }
            (Some(_), Some(_)) => Err(Error::invalid("Provide either 'matrix' or 'ops', not both")),
            (None, None) => Err(Error::invalid("Provide either 'matrix' or 'ops'")),
        }
    }
}

/// What [`set_transform`] authored.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformReport {
    /// Op order authored this call, if it was rewritten.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub op_order: Option<Vec<String>>,
    /// Geometric size attributes that received a redirected scale.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub size_attributes: Vec<String>,
}

struct NodeFacts {
    type_name: Option<String>,
    has_references: bool,
    composed_scale: bool,
    order: Vec<String>,
}

fn gather_facts(doc: &Document, store: &dyn DocumentStore, path: &NodePath, time: TimeCode) -> Result<NodeFacts> {
    let stage = Stage::compose(doc, store);
    let node = require_node(&stage, path)?;
    let scale = XformOpName::new(XformOpKind::Scale).attr_name();
    Ok(NodeFacts {
        type_name: node.type_name().map(str::to_string),
        has_references: node.has_authored_references(),
        composed_scale: node.value(&scale, time).is_some(),
        order: node.xform_op_order().map(<[String]>::to_vec).unwrap_or_default(),
    })
}

/// Apply `edit` to the node at `path` under the document's current edit
/// target.
pub fn set_transform(
    doc: &mut Document,
    store: &dyn DocumentStore,
    path: &NodePath,
    edit: &TransformEdit,
    time: TimeCode,
) -> Result<TransformReport> {
    let facts = gather_facts(doc, store, path, time)?;
    match edit {
        TransformEdit::Matrix(m) => set_matrix(doc, path, m, time, facts.order),
        TransformEdit::Ops(ops) => set_common_ops(doc, path, ops, time, &facts),
    }
}

/// Write the matrix into the node's existing transform op, or append one.
fn set_matrix(
    doc: &mut Document,
    path: &NodePath,
    m: &DMat4,
    time: TimeCode,
    mut order: Vec<String>,
) -> Result<TransformReport> {
    let existing = order
        .iter()
        .find(|name| XformOpName::parse(name).is_some_and(|op| op.kind == XformOpKind::Transform))
        .cloned();
    let name = match existing {
        Some(name) => name,
        None => {
            let name = XformOpName::new(XformOpKind::Transform).attr_name();
            order.push(name.clone());
            name
        }
    };

    let opinions = doc.author(path)?;
    opinions
        .set_attribute(&name, Value::from_matrix(m), time)
        .map_err(|e| e.wrap(Error::AttributeFailed))?;
    opinions.xform_op_order = Some(order.clone());
    Ok(TransformReport {
        op_order: Some(order),
        size_attributes: Vec::new(),
    })
}

fn set_common_ops(
    doc: &mut Document,
    path: &NodePath,
    ops: &CommonOps,
    time: TimeCode,
    facts: &NodeFacts,
) -> Result<TransformReport> {
    let mut scale = ops.scale;
    let mut size_writes: Vec<(&str, f64)> = Vec::new();
    if let Some(s) = scale {
        match facts.type_name.as_deref() {
            Some("Sphere") => {
                size_writes.push(("radius", s.x * 0.5));
                scale = None;
            }
            Some("Cone") => {
                size_writes.push(("height", s.z));
                size_writes.push(("radius", s.x * 0.5));
                scale = None;
            }
            _ => {}
        }
    }

    let translate_name = XformOpName::new(XformOpKind::Translate).attr_name();
    let rotate_name = XformOpName::new(XformOpKind::RotateXYZ).attr_name();
    let scale_name = XformOpName::new(XformOpKind::Scale).attr_name();

    let opinions = doc.author(path)?;
    for (name, value) in &size_writes {
        opinions
            .set_attribute(name, Value::Double(*value), time)
            .map_err(|e| e.wrap(Error::AttributeFailed))?;
    }
    let writes = [
        (&translate_name, ops.translate),
        (&rotate_name, ops.rotate),
        (&scale_name, scale),
    ];
    for (name, value) in writes {
        if let Some(v) = value {
            opinions
                .set_attribute(name, Value::from_vec3(v), time)
                .map_err(|e| e.wrap(Error::AttributeFailed))?;
        }
    }

    // A scale that already resolves stays ordered: either inherited through
    // a reference or authored by an earlier edit.
    let keep_scale = scale.is_none()
        && facts.composed_scale
        && (facts.has_references || facts.order.contains(&scale_name));
    let mut order = Vec::new();
    if ops.translate.is_some() {
        order.push(translate_name);
    }
    if ops.rotate.is_some() {
        order.push(rotate_name);
    }
    if scale.is_some() || keep_scale {
        order.push(scale_name);
    }

    let op_order = if order.is_empty() {
        None
    } else {
        opinions.xform_op_order = Some(order.clone());
        Some(order)
    };
    Ok(TransformReport {
        op_order,
        size_attributes: size_writes.iter().map(|(n, _)| n.to_string()).collect(),
    })
}
