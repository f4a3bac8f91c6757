//! Transform op naming and evaluation

use std::fmt;

use crate::core::types::DMat4;
use crate::document::value::Value;
use crate::math::matrix;

const OP_PREFIX: &str = "xformOp:";

/// Kind of a transform op.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum XformOpKind {
    Translate,
    RotateXYZ,
    RotateX,
    RotateY,
    RotateZ,
    Scale,
    Transform,
}

impl XformOpKind {
    fn token(self) -> &'static str {
        match self {
            XformOpKind::Translate => "translate",
            XformOpKind::RotateXYZ => "rotateXYZ",
            XformOpKind::RotateX => "rotateX",
            XformOpKind::RotateY => "rotateY",
            XformOpKind::RotateZ => "rotateZ",
            XformOpKind::Scale => "scale",
            XformOpKind::Transform => "transform",
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        Some(match token {
            "translate" => XformOpKind::Translate,
            "rotateXYZ" => XformOpKind::RotateXYZ,
            "rotateX" => XformOpKind::RotateX,
            "rotateY" => XformOpKind::RotateY,
            "rotateZ" => XformOpKind::RotateZ,
            "scale" => XformOpKind::Scale,
            "transform" => XformOpKind::Transform,
            _ => return None,
        })
    }

    /// Short label used in resolved op listings.
    pub fn label(self) -> &'static str {
        self.token()
    }
}

/// A parsed `xformOp:<kind>[:<suffix>]` attribute name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct XformOpName {
    pub kind: XformOpKind,
    pub suffix: Option<String>,
}

impl XformOpName {
    pub fn new(kind: XformOpKind) -> Self {
        Self { kind, suffix: None }
    }

    pub fn with_suffix(kind: XformOpKind, suffix: &str) -> Self {
        Self {
            kind,
            suffix: Some(suffix.to_string()),
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        let rest = name.strip_prefix(OP_PREFIX)?;
        let (token, suffix) = match rest.split_once(':') {
            Some((token, suffix)) if !suffix.is_empty() => (token, Some(suffix.to_string())),
            Some(_) => return None,
            None => (rest, None),
        };
        Some(Self {
            kind: XformOpKind::from_token(token)?,
            suffix,
        })
    }

    pub fn attr_name(&self) -> String {
        match &self.suffix {
            Some(suffix) => format!("{}{}:{}", OP_PREFIX, self.kind.token(), suffix),
            None => format!("{}{}", OP_PREFIX, self.kind.token()),
        }
    }
}

impl fmt::Display for XformOpName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.attr_name())
    }
}

/// True if `name` looks like a transform op attribute.
pub fn is_xform_op_attr(name: &str) -> bool {
    name.starts_with(OP_PREFIX)
}

/// Matrix contributed by one op, or `None` if the value has the wrong shape.
pub fn op_matrix(kind: XformOpKind, value: &Value) -> Option<DMat4> {
    match kind {
        XformOpKind::Translate => value.as_vec3().map(DMat4::from_translation),
        XformOpKind::Scale => value.as_vec3().map(DMat4::from_scale),
        XformOpKind::RotateXYZ => value.as_vec3().map(matrix::rotation_xyz),
        XformOpKind::RotateX => value.as_f64().map(matrix::rotation_x),
        XformOpKind::RotateY => value
            .as_f64()
            .map(|d| DMat4::from_rotation_y(d.to_radians())),
        XformOpKind::RotateZ => value
            .as_f64()
            .map(|d| DMat4::from_rotation_z(d.to_radians())),
        XformOpKind::Transform => value.as_matrix(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::DVec3;

    #[test]
    fn test_parse_names() {
        let op = XformOpName::parse("xformOp:rotateX:upAxis").unwrap();
        assert_eq!(op.kind, XformOpKind::RotateX);
        assert_eq!(op.suffix.as_deref(), Some("upAxis"));
        assert_eq!(op.attr_name(), "xformOp:rotateX:upAxis");

        assert_eq!(
            XformOpName::parse("xformOp:translate").unwrap().kind,
            XformOpKind::Translate
        );
        assert!(XformOpName::parse("xformOp:shear").is_none());
        assert!(XformOpName::parse("translate").is_none());
    }

    #[test]
    fn test_op_matrix_shapes() {
        let t = op_matrix(XformOpKind::Translate, &Value::Double3([1.0, 2.0, 3.0])).unwrap();
        assert_eq!(t.w_axis.truncate(), DVec3::new(1.0, 2.0, 3.0));
        assert!(op_matrix(XformOpKind::Translate, &Value::Double(1.0)).is_none());
        let r = op_matrix(XformOpKind::RotateX, &Value::Int(-90)).unwrap();
        assert!((r.transform_vector3(DVec3::Z) - DVec3::Y).length() < 1e-9);
    }
}
