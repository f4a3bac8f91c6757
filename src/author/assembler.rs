//! Multi-asset scene assembly through references
//!
//! An assembly document gathers assets under one container node. Packaged
//! assets can be flattened into plain siblings first, optionally converted
//! from Z-up to Y-up on the way.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::author::{build_reference, InternalPath};
use crate::compose::Stage;
use crate::core::{Config, Error, Result};
use crate::document::store::{is_package, DOCUMENT_EXTENSION};
use crate::document::{
    sanitize_name, Document, DocumentOrigin, DocumentStore, LayerKey, NodePath, TimeCode, UpAxis,
    Value, XformOpKind, XformOpName,
};

/// Suffix of the compensating rotation op injected by Z-up to Y-up conversion.
pub const UP_AXIS_OP_SUFFIX: &str = "upAxis";

/// Root node name preferred as the target of the compensating rotation.
const MODEL_NODE: &str = "model";

/// One asset to place in the assembly.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssemblyAsset {
    #[serde(alias = "asset", alias = "asset_path")]
    pub asset_path: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, alias = "internal_path")]
    pub internal_path: InternalPath,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AssemblyOptions {
    /// Container node path. The configured sentinel (or `None`) derives it
    /// from the output file name.
    #[serde(alias = "container_root")]
    pub container_root: Option<String>,
    pub flatten: bool,
    /// Target up axis; `None` leaves assets as they are.
    #[serde(alias = "up_axis")]
    pub up_axis: Option<UpAxis>,
    #[serde(alias = "setDefaultPrim", alias = "set_default")]
    pub set_default: bool,
    #[serde(alias = "skip_if_exists")]
    pub skip_if_exists: bool,
    #[serde(alias = "clear_existing")]
    pub clear_existing: bool,
}

impl Default for AssemblyOptions {
    fn default() -> Self {
        Self {
            container_root: None,
            flatten: true,
            up_axis: Some(UpAxis::Z),
            set_default: true,
            skip_if_exists: true,
            clear_existing: false,
        }
    }
}

/// What happened to a packaged asset's flattened sibling.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlattenOutcome {
    pub path: PathBuf,
    /// False when an existing sibling was reused.
    pub exported: bool,
    pub converted_up_axis: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetPlacement {
    pub asset_path: String,
    /// Node carrying the reference.
    pub node_path: NodePath,
    /// Asset path as authored on the reference.
    pub referenced_asset: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flattened: Option<FlattenOutcome>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssemblyReport {
    pub combined_path: PathBuf,
    pub container_root: NodePath,
    pub referenced_count: usize,
    pub placements: Vec<AssetPlacement>,
}

/// Build or extend the assembly document at `output` and persist it.
pub fn compose_assembly(
    store: &dyn DocumentStore,
    config: &Config,
    output: &Path,
    assets: &[AssemblyAsset],
    options: &AssemblyOptions,
) -> Result<AssemblyReport> {
    if output.as_os_str().is_empty() {
        return Err(Error::invalid("output_path is required"));
    }
    if assets.is_empty() {
        return Err(Error::invalid("assets must list at least one asset"));
    }
    if is_package(output) {
        return Err(Error::invalid(format!(
            "Assembly output must be a plain .{} document",
            DOCUMENT_EXTENSION
        )));
    }

    let mut doc = if store.exists(output) {
        store.load_document(output).map_err(|e| e.wrap(Error::OpenFailed))?
    } else {
        let mut doc = Document::new(
            options.up_axis.unwrap_or(config.default_up_axis),
            config.default_meters_per_unit,
        );
        doc.set_origin(DocumentOrigin::File(output.to_path_buf()));
        doc
    };

    if options.clear_existing {
        let removed = doc.clear_root_nodes();
        log::debug!("Cleared {} root node(s) from {}", removed, output.display());
    }

    let container = container_root(config, output, options.container_root.as_deref())?;
    doc.define_node(&container, Some("Xform"))?;

    let layout = assets.len() > 1;
    let mut placements = Vec::with_capacity(assets.len());
    for asset in assets {
        let placement = place_asset(&mut doc, store, config, &container, asset, options, layout)?;
        placements.push(placement);
    }

    if options.set_default {
        doc.default_node = Some(container.clone());
    }
    store.save_document(&doc, output)?;
    log::info!(
        "Composed {} asset(s) under {} in {}",
        placements.len(),
        container,
        output.display()
    );

    Ok(AssemblyReport {
        combined_path: output.to_path_buf(),
        container_root: container,
        referenced_count: placements.len(),
        placements,
    })
}

fn container_root(config: &Config, output: &Path, requested: Option<&str>) -> Result<NodePath> {
    let raw = requested.map(str::trim).unwrap_or(&config.container_root_sentinel);
    let path = if raw.is_empty() || raw == config.container_root_sentinel {
        let stem = output.file_stem().and_then(|s| s.to_str()).unwrap_or("Assembly");
        NodePath::root().child(&sanitize_name(stem))?
    } else {
        NodePath::parse(raw)?
    };
    if path.is_root() {
        return Err(Error::invalid("container_root cannot be the pseudo-root"));
    }
    Ok(path)
}

fn place_asset(
    doc: &mut Document,
    store: &dyn DocumentStore,
    config: &Config,
    container: &NodePath,
    asset: &AssemblyAsset,
    options: &AssemblyOptions,
    layout: bool,
) -> Result<AssetPlacement> {
    let asset_path = asset.asset_path.trim();
    if asset_path.is_empty() {
        return Err(Error::invalid("Asset entry has an empty asset_path"));
    }
    let source = match store.resolve_asset(doc.origin(), asset_path) {
        LayerKey::File(path) => path,
        LayerKey::Member { archive, .. } => archive,
    };

    let (referenced_asset, flattened) = if options.flatten && is_package(&source) {
        let outcome = flatten_package(store, config, &source, options)?;
        let file_name = outcome
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let relative = Path::new(asset_path).with_file_name(file_name);
        (relative.to_string_lossy().into_owned(), Some(outcome))
    } else {
        (asset_path.to_string(), None)
    };

    let origin = doc.origin().cloned();
    let reference = build_reference(store, origin.as_ref(), &referenced_asset, &asset.internal_path)?;

    let stem = Path::new(asset_path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Asset");
    let name = sanitize_name(asset.name.as_deref().unwrap_or(stem));
    let wrapper = container.child(&name)?;
    doc.define_node(&wrapper, Some("Xform"))?;

    let node_path = if layout {
        let inner = match &reference.internal_path {
            Some(internal) if !internal.is_root() => internal.name().to_string(),
            _ => declared_default_name(store, origin.as_ref(), &referenced_asset)
                .unwrap_or_else(|| sanitize_name(stem)),
        };
        let child = wrapper.child(&inner)?;
        doc.define_node(&child, Some("Xform"))?;
        child
    } else {
        wrapper
    };

    doc.author(&node_path)
        .map_err(|e| e.wrap(Error::ReferenceFailed))?
        .add_reference(reference);

    Ok(AssetPlacement {
        asset_path: asset_path.to_string(),
        node_path,
        referenced_asset,
        flattened,
    })
}

/// Name of the default node declared by the document behind `asset`.
fn declared_default_name(
    store: &dyn DocumentStore,
    origin: Option<&DocumentOrigin>,
    asset: &str,
) -> Option<String> {
    let target = store.load_layer(&store.resolve_asset(origin, asset)).ok()?;
    target
        .default_node_path()
        .filter(|p| !p.is_root())
        .map(|p| p.name().to_string())
}

/// Sibling path receiving the flattened copy of `package`.
pub fn flattened_sibling(config: &Config, package: &Path) -> PathBuf {
    let stem = package
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("asset");
    package.with_file_name(format!(
        "{}{}.{}",
        stem, config.flattened_suffix, DOCUMENT_EXTENSION
    ))
}

fn flatten_package(
    store: &dyn DocumentStore,
    config: &Config,
    package: &Path,
    options: &AssemblyOptions,
) -> Result<FlattenOutcome> {
    let target = flattened_sibling(config, package);

    if options.skip_if_exists && store.exists(&target) {
        let existing = store.load_document(&target).map_err(|e| e.wrap(Error::OpenFailed))?;
        if options.up_axis.is_none_or(|up| up == existing.up_axis) {
            log::debug!("Reusing flattened {}", target.display());
            return Ok(FlattenOutcome {
                path: target,
                exported: false,
                converted_up_axis: false,
            });
        }
        log::info!(
            "Re-exporting {}: up axis {} does not match",
            target.display(),
            existing.up_axis
        );
    }

    let source = store.load_document(package).map_err(|e| e.wrap(Error::OpenFailed))?;
    let mut flat = Stage::compose(&source, store).flatten();
    let mut converted = false;
    if let Some(up) = options.up_axis {
        if source.up_axis == UpAxis::Z && up == UpAxis::Y {
            convert_z_up_to_y_up(&mut flat)?;
            converted = true;
        }
        flat.up_axis = up;
    }
    store
        .save_document(&flat, &target)
        .map_err(|e| e.wrap(Error::ExportFailed))?;
    log::info!("Flattened {} -> {}", package.display(), target.display());

    Ok(FlattenOutcome {
        path: target,
        exported: true,
        converted_up_axis: converted,
    })
}

/// Prepend a -90 degree X rotation to the `model` root node, or to every
/// root node when there is none. Already converted nodes are left alone.
pub fn convert_z_up_to_y_up(doc: &mut Document) -> Result<()> {
    let roots: Vec<String> = if doc.root_node(MODEL_NODE).is_some() {
        vec![MODEL_NODE.to_string()]
    } else {
        doc.root_names()
    };
    let op = XformOpName::with_suffix(XformOpKind::RotateX, UP_AXIS_OP_SUFFIX).attr_name();

    for name in roots {
        let path = NodePath::root().child(&name)?;
        let opinions = doc.author(&path)?;
        let mut order = opinions.xform_op_order.clone().unwrap_or_default();
        if order.contains(&op) {
            continue;
        }
        opinions.set_attribute(&op, Value::Double(-90.0), TimeCode::Default)?;
        order.insert(0, op.clone());
        opinions.xform_op_order = Some(order);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::author::resolve_transform;
    use crate::core::types::DVec3;
    use crate::document::MemoryStore;

    fn path(s: &str) -> NodePath {
        NodePath::parse(s).unwrap()
    }

    fn asset(store: &MemoryStore, at: &str, root: &str) {
        let mut doc = Document::new(UpAxis::Z, 1.0);
        let node = path(root);
        doc.define_node(&node, Some("Xform")).unwrap();
        doc.default_node = Some(node);
        store.save_document(&doc, Path::new(at)).unwrap();
    }

    fn entry(asset_path: &str) -> AssemblyAsset {
        AssemblyAsset {
            asset_path: asset_path.to_string(),
            name: None,
            internal_path: InternalPath::DefaultNode,
        }
    }

    #[test]
    fn test_single_asset_references_container_child() {
        let store = MemoryStore::new();
        asset(&store, "/proj/props/crate.sdoc", "/Crate");
        let report = compose_assembly(
            &store,
            &Config::default(),
            Path::new("/proj/shot.sdoc"),
            &[entry("props/crate.sdoc")],
            &AssemblyOptions::default(),
        )
        .unwrap();

        assert_eq!(report.container_root, path("/shot"));
        assert_eq!(report.referenced_count, 1);
        assert_eq!(report.placements[0].node_path, path("/shot/crate"));

        let doc = store.load_document(Path::new("/proj/shot.sdoc")).unwrap();
        assert_eq!(doc.default_node, Some(path("/shot")));
        let stage = Stage::compose(&doc, &store);
        assert!(stage.errors().is_empty());
        assert!(stage.exists(&path("/shot/crate")));
    }

    #[test]
    fn test_layout_wraps_each_asset() {
        let store = MemoryStore::new();
        asset(&store, "/proj/a.sdoc", "/Chair");
        asset(&store, "/proj/b.sdoc", "/Table");
        let options = AssemblyOptions {
            container_root: Some("/Layout".into()),
            ..AssemblyOptions::default()
        };
        let report = compose_assembly(
            &store,
            &Config::default(),
            Path::new("/proj/room.sdoc"),
            &[entry("a.sdoc"), entry("b.sdoc")],
            &options,
        )
        .unwrap();
        assert_eq!(report.placements[0].node_path, path("/Layout/a/Chair"));
        assert_eq!(report.placements[1].node_path, path("/Layout/b/Table"));
    }

    #[test]
    fn test_whole_document_layout_child_uses_default_node_name() {
        let store = MemoryStore::new();
        asset(&store, "/proj/a.sdoc", "/Chair");
        asset(&store, "/proj/b.sdoc", "/Table");
        let mut whole = entry("b.sdoc");
        whole.internal_path = InternalPath::WholeDocument;
        let report = compose_assembly(
            &store,
            &Config::default(),
            Path::new("/proj/room.sdoc"),
            &[entry("a.sdoc"), whole],
            &AssemblyOptions::default(),
        )
        .unwrap();
        assert_eq!(report.placements[1].node_path, path("/room/b/Table"));

        let doc = store.load_document(Path::new("/proj/room.sdoc")).unwrap();
        let placed = doc.node(&path("/room/b/Table")).unwrap();
        assert_eq!(placed.opinions.references[0].internal_path, None);
    }

    #[test]
    fn test_clear_existing_removes_previous_roots() {
        let store = MemoryStore::new();
        asset(&store, "/proj/a.sdoc", "/Chair");
        let output = Path::new("/proj/shot.sdoc");
        let mut previous = Document::new(UpAxis::Y, 1.0);
        previous.define_node(&path("/Stale/Thing"), Some("Xform")).unwrap();
        store.save_document(&previous, output).unwrap();

        let kept = AssemblyOptions {
            container_root: Some("/Set".into()),
            ..AssemblyOptions::default()
        };
        compose_assembly(&store, &Config::default(), output, &[entry("a.sdoc")], &kept).unwrap();
        let doc = store.load_document(output).unwrap();
        assert_eq!(doc.root_names(), vec!["Stale".to_string(), "Set".to_string()]);

        let cleared = AssemblyOptions {
            container_root: Some("/Set".into()),
            clear_existing: true,
            ..AssemblyOptions::default()
        };
        compose_assembly(&store, &Config::default(), output, &[entry("a.sdoc")], &cleared).unwrap();
        let doc = store.load_document(output).unwrap();
        assert_eq!(doc.root_names(), vec!["Set".to_string()]);
        assert_eq!(doc.node(&path("/Set/a")).unwrap().opinions.references.len(), 1);
    }

    #[cfg(feature = "package")]
    #[test]
    fn test_up_axis_mismatch_forces_reexport() {
        use crate::author::export::export_package;

        let store = MemoryStore::new();
        asset(&store, "/proj/chair.sdoc", "/Chair");
        let source = store.load_document(Path::new("/proj/chair.sdoc")).unwrap();
        export_package(&source, &store, Path::new("/proj/chair.sdocz")).unwrap();
        let config = Config::default();
        let output = Path::new("/proj/shot.sdoc");
        let as_z = AssemblyOptions {
            up_axis: Some(UpAxis::Z),
            ..AssemblyOptions::default()
        };
        let as_y = AssemblyOptions {
            up_axis: Some(UpAxis::Y),
            ..AssemblyOptions::default()
        };

        let first = compose_assembly(&store, &config, output, &[entry("chair.sdocz")], &as_z).unwrap();
        let flat = first.placements[0].flattened.clone().unwrap();
        assert!(flat.exported);
        assert!(!flat.converted_up_axis);

        let reused = compose_assembly(&store, &config, output, &[entry("chair.sdocz")], &as_z).unwrap();
        assert!(!reused.placements[0].flattened.as_ref().unwrap().exported);

        let converted = compose_assembly(&store, &config, output, &[entry("chair.sdocz")], &as_y).unwrap();
        let flat = converted.placements[0].flattened.clone().unwrap();
        assert!(flat.exported);
        assert!(flat.converted_up_axis);
        let sibling = store.load_document(&flat.path).unwrap();
        assert_eq!(sibling.up_axis, UpAxis::Y);
    }

    #[test]
    fn test_rejects_empty_inputs() {
        let store = MemoryStore::new();
        let err = compose_assembly(
            &store,
            &Config::default(),
            Path::new("/proj/x.sdoc"),
            &[],
            &AssemblyOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.code(), "invalid_params");
    }

    #[test]
    fn test_z_up_conversion_prefers_model() {
        let mut doc = Document::new(UpAxis::Z, 1.0);
        doc.define_node(&path("/model"), Some("Xform")).unwrap();
        doc.define_node(&path("/Looks"), None).unwrap();
        convert_z_up_to_y_up(&mut doc).unwrap();
        convert_z_up_to_y_up(&mut doc).unwrap();

        let model = doc.node(&path("/model")).unwrap();
        assert_eq!(
            model.opinions.xform_op_order.as_deref(),
            Some(&["xformOp:rotateX:upAxis".to_string()][..])
        );
        assert!(doc.node(&path("/Looks")).unwrap().opinions.xform_op_order.is_none());

        let store = MemoryStore::new();
        let stage = Stage::compose(&doc, &store);
        let resolved = resolve_transform(&stage, &path("/model"), TimeCode::Default).unwrap();
        let up = resolved.world.transform_vector3(DVec3::Z);
        assert!((up - DVec3::Y).length() < 1e-9);
    }
}
