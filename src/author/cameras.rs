//! Camera listing and parameter authoring

use serde::{Deserialize, Serialize};

use crate::author::require_node;
use crate::compose::{ComposedNode, Stage};
use crate::core::{Error, Result};
use crate::document::{Document, DocumentStore, NodePath, TimeCode, Value};

/// Type name that marks a node as a camera.
pub const CAMERA_TYPE: &str = "Camera";

const FOCAL_LENGTH: &str = "focalLength";
const HORIZONTAL_APERTURE: &str = "horizontalAperture";
const VERTICAL_APERTURE: &str = "verticalAperture";
const CLIPPING_RANGE: &str = "clippingRange";
const PROJECTION: &str = "projection";

const PROJECTIONS: &[&str] = &["perspective", "orthographic"];

/// Composed camera parameters. Unauthored values read as the fallbacks a
/// freshly defined camera carries.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraInfo {
    pub focal_length: f64,
    pub horizontal_aperture: f64,
    pub vertical_aperture: f64,
    pub clipping_range: [f64; 2],
    pub projection: String,
}

impl Default for CameraInfo {
    fn default() -> Self {
        Self {
            focal_length: 50.0,
            horizontal_aperture: 20.955,
            vertical_aperture: 15.2908,
            clipping_range: [1.0, 1_000_000.0],
            projection: "perspective".to_string(),
        }
    }
}

/// Parameters to author. Absent fields are left alone.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CameraParams {
    #[serde(alias = "focal_length")]
    pub focal_length: Option<f64>,
    #[serde(alias = "horizontal_aperture")]
    pub horizontal_aperture: Option<f64>,
    #[serde(alias = "vertical_aperture")]
    pub vertical_aperture: Option<f64>,
    #[serde(alias = "clipping_range")]
    pub clipping_range: Option<[f64; 2]>,
    pub projection: Option<String>,
}

pub fn list_cameras(stage: &Stage<'_>) -> Vec<NodePath> {
    stage
        .descendants(&NodePath::root(), None)
        .into_iter()
        .filter(|path| {
            stage
                .node(path)
                .is_some_and(|n| n.type_name() == Some(CAMERA_TYPE))
        })
        .collect()
}

fn number(node: &ComposedNode<'_>, name: &str, time: TimeCode) -> Option<f64> {
    node.value(name, time).and_then(Value::as_f64)
}

pub fn get_camera(stage: &Stage<'_>, path: &NodePath, time: TimeCode) -> Result<CameraInfo> {
    let node = require_node(stage, path)?;
    if node.type_name() != Some(CAMERA_TYPE) {
        return Err(Error::invalid(format!(
            "{} is not a Camera (type {})",
            path,
            node.type_name().unwrap_or("none")
        )));
    }
    let fallback = CameraInfo::default();
    let clipping_range = match node.value(CLIPPING_RANGE, time) {
        Some(Value::DoubleArray(range)) if range.len() == 2 => [range[0], range[1]],
        _ => fallback.clipping_range,
    };
    Ok(CameraInfo {
        focal_length: number(&node, FOCAL_LENGTH, time).unwrap_or(fallback.focal_length),
        horizontal_aperture: number(&node, HORIZONTAL_APERTURE, time)
            .unwrap_or(fallback.horizontal_aperture),
        vertical_aperture: number(&node, VERTICAL_APERTURE, time)
            .unwrap_or(fallback.vertical_aperture),
        clipping_range,
        projection: node
            .value(PROJECTION, time)
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or(fallback.projection),
    })
}

/// Author `params` on the camera at `path`, defining it first if it does not
/// exist. Returns whether the camera was created.
pub fn set_camera(
    doc: &mut Document,
    store: &dyn DocumentStore,
    path: &NodePath,
    params: &CameraParams,
) -> Result<bool> {
    if let Some(projection) = &params.projection {
        if !PROJECTIONS.contains(&projection.as_str()) {
            return Err(Error::invalid(format!(
                "projection must be one of {:?}, got '{}'",
                PROJECTIONS, projection
            )));
        }
    }
    if let Some([near, far]) = params.clipping_range {
        if !(near > 0.0 && far > near) {
            return Err(Error::invalid(format!(
                "clippingRange must satisfy 0 < near < far, got [{}, {}]",
                near, far
            )));
        }
    }

    let exists = Stage::compose(doc, store).exists(path);
    if !exists {
        doc.define_node(path, Some(CAMERA_TYPE))?;
        log::debug!("Defined camera {}", path);
    }

    let mut writes: Vec<(&str, Value)> = Vec::new();
    let scalars = [
        (FOCAL_LENGTH, params.focal_length),
        (HORIZONTAL_APERTURE, params.horizontal_aperture),
        (VERTICAL_APERTURE, params.vertical_aperture),
    ];
    for (name, value) in scalars {
        if let Some(v) = value {
            writes.push((name, Value::Double(v)));
        }
    }
    if let Some(range) = params.clipping_range {
        writes.push((CLIPPING_RANGE, Value::DoubleArray(range.to_vec())));
    }
    if let Some(projection) = &params.projection {
        writes.push((PROJECTION, Value::Token(projection.clone())));
    }

    let opinions = doc.author(path).map_err(|e| e.wrap(Error::AttributeFailed))?;
    for (name, value) in writes {
        opinions
            .set_attribute(name, value, TimeCode::Default)
            .map_err(|e| e.wrap(Error::AttributeFailed))?;
    }
    Ok(!exists)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{MemoryStore, UpAxis};

    fn path(s: &str) -> NodePath {
        NodePath::parse(s).unwrap()
    }

    #[test]
    fn test_set_creates_and_reads_back() {
        let mut doc = Document::new(UpAxis::Y, 1.0);
        doc.define_node(&path("/World/Box"), Some("Cube")).unwrap();
        let store = MemoryStore::new();
        let cam = path("/World/Shot");
        let params = CameraParams {
            focal_length: Some(35.0),
            clipping_range: Some([0.1, 500.0]),
            ..CameraParams::default()
        };

        assert!(set_camera(&mut doc, &store, &cam, &params).unwrap());
        assert!(!set_camera(&mut doc, &store, &cam, &CameraParams::default()).unwrap());

        let stage = Stage::compose(&doc, &store);
        assert_eq!(list_cameras(&stage), vec![cam.clone()]);
        let info = get_camera(&stage, &cam, TimeCode::Default).unwrap();
        assert_eq!(info.focal_length, 35.0);
        assert_eq!(info.clipping_range, [0.1, 500.0]);
        assert_eq!(info.horizontal_aperture, CameraInfo::default().horizontal_aperture);
        assert_eq!(info.projection, "perspective");
    }

    #[test]
    fn test_rejects_bad_params_and_non_cameras() {
        let mut doc = Document::new(UpAxis::Y, 1.0);
        doc.define_node(&path("/Box"), Some("Cube")).unwrap();
        let store = MemoryStore::new();

        let params = CameraParams {
            projection: Some("fisheye".into()),
            ..CameraParams::default()
        };
        let err = set_camera(&mut doc, &store, &path("/Cam"), &params).unwrap_err();
        assert_eq!(err.code(), "invalid_params");
        assert!(doc.node(&path("/Cam")).is_none());

        let params = CameraParams {
            clipping_range: Some([10.0, 1.0]),
            ..CameraParams::default()
        };
        let err = set_camera(&mut doc, &store, &path("/Cam"), &params).unwrap_err();
        assert_eq!(err.code(), "invalid_params");

        let stage = Stage::compose(&doc, &store);
        let err = get_camera(&stage, &path("/Box"), TimeCode::Default).unwrap_err();
        assert_eq!(err.code(), "invalid_params");
        let err = get_camera(&stage, &path("/Nope"), TimeCode::Default).unwrap_err();
        assert_eq!(err.code(), "not_found");
    }
}
