//! Request dispatch
//!
//! Every operation is a variant of the closed [`Call`] enum, decoded from
//! `{"method", "params"}` and dispatched exhaustively. Stateless calls take a
//! document `path`: they open it, apply the edit in memory and save once.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value as Json};

use scenecomp_protocol::{Request, RequestHandler, Response};

use crate::author::cameras::{self, CameraParams};
use crate::author::export::{export_document, export_package, ExportOptions};
use crate::author::references::{add_reference, add_references_batch, set_default_node, ReferenceItem};
use crate::author::variant_author::{list_variants, set_variant_selection, variant_defs};
use crate::author::{
    apply_batch, author_variants, bounds, compose_assembly, materials, nodes, resolve_transform,
    set_transform, validate, AssemblyAsset, AssemblyOptions, BatchItem, InternalPath,
    TransformEdit, VariantAuthorOptions, VariantDef,
};
use crate::compose::Stage;
use crate::core::{Config, Error, Result};
use crate::document::{Document, DocumentStore, FileStore, NodePath, Specifier, TimeCode, UpAxis};
use crate::session::Session;

/// Every operation the service answers.
#[derive(Debug, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum Call {
    OpenDocument {
        path: PathBuf,
    },
    CreateDocument {
        #[serde(default)]
        path: Option<PathBuf>,
        #[serde(default, alias = "upAxis")]
        up_axis: Option<UpAxis>,
        #[serde(default, alias = "metersPerUnit")]
        meters_per_unit: Option<f64>,
    },
    CloseDocument {
        handle: String,
    },
    ListOpenDocuments {},
    DocumentSummary {
        handle: String,
    },
    SaveDocument {
        handle: String,
        #[serde(default, alias = "outputPath")]
        output_path: Option<PathBuf>,
    },
    SummarizeFile {
        path: PathBuf,
    },
    ListNodes {
        path: PathBuf,
        #[serde(default)]
        root: Option<String>,
        #[serde(default)]
        depth: Option<usize>,
        #[serde(default, alias = "typeFilter")]
        type_filter: Option<String>,
    },
    NodeInfo {
        path: PathBuf,
        #[serde(alias = "prim_path")]
        node_path: String,
    },
    GetAttribute {
        path: PathBuf,
        #[serde(alias = "prim_path")]
        node_path: String,
        attr: String,
        #[serde(default)]
        time: TimeCode,
    },
    CreateNode {
        path: PathBuf,
        #[serde(alias = "prim_path")]
        node_path: String,
        #[serde(default, alias = "typeName")]
        type_name: Option<String>,
        #[serde(default)]
        specifier: Option<Specifier>,
    },
    DeleteNode {
        path: PathBuf,
        #[serde(alias = "prim_path")]
        node_path: String,
    },
    SetAttribute {
        path: PathBuf,
        #[serde(alias = "prim_path")]
        node_path: String,
        attr: String,
        value: Json,
        #[serde(default)]
        time: TimeCode,
    },
    BatchSetAttributes {
        path: PathBuf,
        items: Vec<BatchItem>,
    },
    GetTransform {
        path: PathBuf,
        #[serde(alias = "prim_path")]
        node_path: String,
        #[serde(default)]
        time: TimeCode,
    },
    SetTransform {
        path: PathBuf,
        #[serde(alias = "prim_path")]
        node_path: String,
        #[serde(default)]
        matrix: Option<Json>,
        #[serde(default, alias = "items")]
        ops: Option<Json>,
        #[serde(default)]
        time: TimeCode,
    },
    AddReference {
        path: PathBuf,
        #[serde(alias = "prim_path")]
        node_path: String,
        #[serde(alias = "asset")]
        asset_path: String,
        #[serde(default)]
        internal_path: InternalPath,
    },
    AddReferencesBatch {
        path: PathBuf,
        items: Vec<ReferenceItem>,
    },
    SetDefaultNode {
        path: PathBuf,
        #[serde(alias = "prim_path")]
        node_path: String,
    },
    ListVariants {
        path: PathBuf,
        #[serde(alias = "prim_path")]
        node_path: String,
    },
    SetVariantSelection {
        path: PathBuf,
        #[serde(alias = "prim_path")]
        node_path: String,
        #[serde(alias = "set")]
        variant_set: String,
        selection: String,
    },
    AuthorVariants {
        path: PathBuf,
        #[serde(alias = "prim_path")]
        node_path: String,
        #[serde(alias = "set")]
        variant_set: String,
        #[serde(default)]
        variant: Option<VariantDef>,
        #[serde(default)]
        variants: Option<Vec<VariantDef>>,
        #[serde(default, alias = "clearLocal")]
        clear_local: bool,
        #[serde(default)]
        select: Option<String>,
        #[serde(default)]
        time: TimeCode,
    },
    ListMaterials {
        path: PathBuf,
    },
    BindMaterial {
        path: PathBuf,
        #[serde(alias = "prim_path")]
        node_path: String,
        #[serde(alias = "material")]
        material_path: String,
    },
    UnbindMaterial {
        path: PathBuf,
        #[serde(alias = "prim_path")]
        node_path: String,
    },
    GetMaterialBinding {
        path: PathBuf,
        #[serde(alias = "prim_path")]
        node_path: String,
    },
    ListCameras {
        path: PathBuf,
    },
    GetCamera {
        path: PathBuf,
        #[serde(alias = "node_path", alias = "cameraPath")]
        camera_path: String,
        #[serde(default)]
        time: TimeCode,
    },
    SetCamera {
        path: PathBuf,
        #[serde(alias = "node_path", alias = "cameraPath")]
        camera_path: String,
        #[serde(default)]
        params: CameraParams,
    },
    GetBounds {
        path: PathBuf,
        #[serde(alias = "prim_path")]
        node_path: String,
        #[serde(default)]
        time: TimeCode,
    },
    ValidateDocument {
        path: PathBuf,
    },
    ExportDocument {
        path: PathBuf,
        #[serde(alias = "outputPath")]
        output_path: PathBuf,
        #[serde(default)]
        flatten: bool,
        #[serde(default = "default_true", alias = "skipIfExists")]
        skip_if_exists: bool,
    },
    ExportPackage {
        path: PathBuf,
        #[serde(alias = "outputPath")]
        output_path: PathBuf,
    },
    ComposeAssembly {
        #[serde(alias = "outputPath")]
        output_path: PathBuf,
        assets: Vec<AssemblyAsset>,
        #[serde(flatten)]
        options: AssemblyOptions,
    },
}

fn default_true() -> bool {
    true
}

impl Call {
    /// Wire names of every method, in declaration order.
    pub const METHODS: &'static [&'static str] = &[
        "open_document",
        "create_document",
        "close_document",
        "list_open_documents",
        "document_summary",
        "save_document",
        "summarize_file",
        "list_nodes",
        "node_info",
        "get_attribute",
        "create_node",
        "delete_node",
        "set_attribute",
        "batch_set_attributes",
        "get_transform",
        "set_transform",
        "add_reference",
        "add_references_batch",
        "set_default_node",
        "list_variants",
        "set_variant_selection",
        "author_variants",
        "list_materials",
        "bind_material",
        "unbind_material",
        "get_material_binding",
        "list_cameras",
        "get_camera",
        "set_camera",
        "get_bounds",
        "validate_document",
        "export_document",
        "export_package",
        "compose_assembly",
    ];

    /// Decode a `{method, params}` value. Unknown methods and malformed
    /// params are told apart.
    pub fn from_value(value: Json) -> Result<Self> {
        let method = value
            .get("method")
            .and_then(Json::as_str)
            .unwrap_or_default()
            .to_string();
        if !Self::METHODS.contains(&method.as_str()) {
            return Err(Error::UnknownMethod(method));
        }
        serde_json::from_value(value)
            .map_err(|e| Error::invalid(format!("Invalid params for {}: {}", method, e)))
    }
}

/// The request-at-a-time authoring service.
pub struct Service {
    config: Config,
    session: Session,
}

impl Service {
    pub fn new(config: Config, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            config,
            session: Session::new(store),
        }
    }

    /// Service over the local filesystem.
    pub fn with_file_store(config: Config) -> Self {
        Self::new(config, Arc::new(FileStore))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    fn store(&self) -> &dyn DocumentStore {
        self.session.store()
    }

    fn open(&self, path: &Path) -> Result<Document> {
        if path.as_os_str().is_empty() {
            return Err(Error::invalid("'path' is required"));
        }
        self.store()
            .load_document(path)
            .map_err(|e| e.wrap(Error::OpenFailed))
    }

    /// Compose the document at `path` and run a read-only query on it.
    fn inspect<T>(&self, path: &Path, query: impl FnOnce(&Stage<'_>) -> Result<T>) -> Result<T> {
        let doc = self.open(path)?;
        let stage = Stage::compose(&doc, self.store());
        query(&stage)
    }

    /// Open, edit in memory, save once. Nothing is saved if the edit fails.
    fn edit<T>(
        &self,
        path: &Path,
        apply: impl FnOnce(&mut Document, &dyn DocumentStore) -> Result<T>,
    ) -> Result<T> {
        let mut doc = self.open(path)?;
        let out = apply(&mut doc, self.store())?;
        self.store().save_document(&doc, path)?;
        Ok(out)
    }

    /// Run one call to completion.
    pub fn dispatch(&mut self, call: Call) -> Result<Json> {
        match call {
            Call::OpenDocument { path } => {
                let handle = self.session.open(&path)?;
                Ok(json!({ "handle": handle, "path": path }))
            }
            Call::CreateDocument {
                path,
                up_axis,
                meters_per_unit,
            } => {
                let handle = self.session.create(
                    up_axis.unwrap_or(self.config.default_up_axis),
                    meters_per_unit.unwrap_or(self.config.default_meters_per_unit),
                    path.as_deref(),
                )?;
                Ok(json!({ "handle": handle, "path": path }))
            }
            Call::CloseDocument { handle } => {
                self.session.close(&handle)?;
                Ok(json!({ "closed": handle }))
            }
            Call::ListOpenDocuments {} => Ok(json!({ "documents": self.session.list() })),
            Call::DocumentSummary { handle } => {
                let doc = self.session.get(&handle)?;
                let stage = Stage::compose(doc, self.session.store());
                Ok(serde_json::to_value(nodes::summarize(&stage))?)
            }
            Call::SaveDocument {
                handle,
                output_path,
            } => {
                let saved = self.session.save(&handle, output_path.as_deref())?;
                Ok(json!({ "handle": handle, "path": saved }))
            }
            Call::SummarizeFile { path } => self.inspect(&path, |stage| {
                Ok(serde_json::to_value(nodes::summarize(stage))?)
            }),
            Call::ListNodes {
                path,
                root,
                depth,
                type_filter,
            } => {
                let root = NodePath::parse(root.as_deref().unwrap_or("/"))?;
                self.inspect(&path, |stage| {
                    let found = nodes::list_nodes(stage, &root, Some(depth.unwrap_or(1)), type_filter.as_deref())?;
                    Ok(json!({ "nodePaths": found }))
                })
            }
            Call::NodeInfo { path, node_path } => {
                let node = NodePath::parse(&node_path)?;
                self.inspect(&path, |stage| Ok(serde_json::to_value(nodes::node_info(stage, &node)?)?))
            }
            Call::GetAttribute {
                path,
                node_path,
                attr,
                time,
            } => {
                let node = NodePath::parse(&node_path)?;
                self.inspect(&path, |stage| {
                    let value = nodes::get_attribute(stage, &node, &attr, time)?;
                    Ok(json!({ "nodePath": node, "attr": attr, "time": time, "value": value }))
                })
            }
            Call::CreateNode {
                path,
                node_path,
                type_name,
                specifier,
            } => {
                let node = NodePath::parse(&node_path)?;
                let specifier = specifier.unwrap_or_default();
                self.edit(&path, |doc, _| {
                    nodes::create_node(doc, &node, type_name.as_deref(), specifier)
                })?;
                Ok(json!({ "nodePath": node, "typeName": type_name, "specifier": specifier }))
            }
            Call::DeleteNode { path, node_path } => {
                let node = NodePath::parse(&node_path)?;
                self.edit(&path, |doc, _| nodes::delete_node(doc, &node))?;
                Ok(json!({ "deleted": node }))
            }
            Call::SetAttribute {
                path,
                node_path,
                attr,
                value,
                time,
            } => {
                let node = NodePath::parse(&node_path)?;
                self.edit(&path, |doc, store| {
                    nodes::set_attribute(doc, store, &node, &attr, &value, time)
                })?;
                Ok(json!({ "nodePath": node, "attr": attr, "time": time }))
            }
            Call::BatchSetAttributes { path, items } => {
                if items.is_empty() {
                    return Err(Error::invalid("'items' must not be empty"));
                }
                let outcomes = self.edit(&path, |doc, store| Ok(apply_batch(doc, store, &items)))?;
                let applied = outcomes.iter().filter(|o| o.ok).count();
                Ok(json!({
                    "applied": applied,
                    "failed": outcomes.len() - applied,
                    "results": outcomes,
                }))
            }
            Call::GetTransform {
                path,
                node_path,
                time,
            } => {
                let node = NodePath::parse(&node_path)?;
                self.inspect(&path, |stage| {
                    let mut out = resolve_transform(stage, &node, time)?.to_json();
                    out["nodePath"] = json!(node);
                    Ok(out)
                })
            }
            Call::SetTransform {
                path,
                node_path,
                matrix,
                ops,
                time,
            } => {
                let node = NodePath::parse(&node_path)?;
                let edit = TransformEdit::from_params(matrix.as_ref(), ops.as_ref())?;
                let report = self.edit(&path, |doc, store| set_transform(doc, store, &node, &edit, time))?;
                let mut out = serde_json::to_value(report)?;
                out["nodePath"] = json!(node);
                Ok(out)
            }
            Call::AddReference {
                path,
                node_path,
                asset_path,
                internal_path,
            } => {
                let node = NodePath::parse(&node_path)?;
                let (reference, added) = self.edit(&path, |doc, store| {
                    add_reference(doc, store, &node, &asset_path, &internal_path)
                })?;
                Ok(json!({ "nodePath": node, "reference": reference, "added": added }))
            }
            Call::AddReferencesBatch { path, items } => {
                if items.is_empty() {
                    return Err(Error::invalid("'items' must not be empty"));
                }
                let outcomes = self.edit(&path, |doc, store| Ok(add_references_batch(doc, store, &items)))?;
                let added = outcomes.iter().filter(|o| o.ok).count();
                Ok(json!({ "added": added, "results": outcomes }))
            }
            Call::SetDefaultNode { path, node_path } => {
                let node = NodePath::parse(&node_path)?;
                self.edit(&path, |doc, store| set_default_node(doc, store, &node))?;
                Ok(json!({ "defaultNode": node }))
            }
            Call::ListVariants { path, node_path } => {
                let node = NodePath::parse(&node_path)?;
                self.inspect(&path, |stage| {
                    Ok(json!({ "nodePath": node, "variantSets": list_variants(stage, &node)? }))
                })
            }
            Call::SetVariantSelection {
                path,
                node_path,
                variant_set,
                selection,
            } => {
                let node = NodePath::parse(&node_path)?;
                self.edit(&path, |doc, store| {
                    set_variant_selection(doc, store, &node, &variant_set, &selection)
                })?;
                Ok(json!({ "nodePath": node, "variantSet": variant_set, "selection": selection }))
            }
            Call::AuthorVariants {
                path,
                node_path,
                variant_set,
                variant,
                variants,
                clear_local,
                select,
                time,
            } => {
                let node = NodePath::parse(&node_path)?;
                let defs = variant_defs(variant, variants)?;
                let options = VariantAuthorOptions {
                    clear_local,
                    select,
                    time,
                };
                let report = self.edit(&path, |doc, store| {
                    author_variants(doc, store, &node, &variant_set, &defs, &options)
                })?;
                Ok(serde_json::to_value(report)?)
            }
            Call::ListMaterials { path } => self.inspect(&path, |stage| {
                Ok(json!({ "materials": materials::list_materials(stage) }))
            }),
            Call::BindMaterial {
                path,
                node_path,
                material_path,
            } => {
                let node = NodePath::parse(&node_path)?;
                let material = NodePath::parse(&material_path)?;
                self.edit(&path, |doc, store| materials::bind_material(doc, store, &node, &material))?;
                Ok(json!({ "nodePath": node, "materialPath": material }))
            }
            Call::UnbindMaterial { path, node_path } => {
                let node = NodePath::parse(&node_path)?;
                let removed = self.edit(&path, |doc, store| materials::unbind_material(doc, store, &node))?;
                Ok(json!({ "nodePath": node, "unbound": removed }))
            }
            Call::GetMaterialBinding { path, node_path } => {
                let node = NodePath::parse(&node_path)?;
                self.inspect(&path, |stage| {
                    Ok(serde_json::to_value(materials::get_material_binding(stage, &node)?)?)
                })
            }
            Call::ListCameras { path } => self.inspect(&path, |stage| {
                Ok(json!({ "cameras": cameras::list_cameras(stage) }))
            }),
            Call::GetCamera {
                path,
                camera_path,
                time,
            } => {
                let camera = NodePath::parse(&camera_path)?;
                self.inspect(&path, |stage| {
                    let info = cameras::get_camera(stage, &camera, time)?;
                    Ok(json!({ "cameraPath": camera, "camera": info }))
                })
            }
            Call::SetCamera {
                path,
                camera_path,
                params,
            } => {
                let camera = NodePath::parse(&camera_path)?;
                let created = self.edit(&path, |doc, store| cameras::set_camera(doc, store, &camera, &params))?;
                Ok(json!({ "cameraPath": camera, "created": created }))
            }
            Call::GetBounds {
                path,
                node_path,
                time,
            } => {
                let node = NodePath::parse(&node_path)?;
                self.inspect(&path, |stage| {
                    let found = bounds::get_bounds(stage, &node, time)?;
                    Ok(json!({
                        "nodePath": node,
                        "min": found.map(|b| b.min),
                        "max": found.map(|b| b.max),
                    }))
                })
            }
            Call::ValidateDocument { path } => self.inspect(&path, |stage| {
                Ok(serde_json::to_value(validate::validate(stage))?)
            }),
            Call::ExportDocument {
                path,
                output_path,
                flatten,
                skip_if_exists,
            } => {
                let doc = self.open(&path)?;
                let options = ExportOptions {
                    flatten,
                    skip_if_exists,
                };
                Ok(serde_json::to_value(export_document(&doc, self.store(), &output_path, &options)?)?)
            }
            Call::ExportPackage { path, output_path } => {
                let doc = self.open(&path)?;
                Ok(serde_json::to_value(export_package(&doc, self.store(), &output_path)?)?)
            }
            Call::ComposeAssembly {
                output_path,
                assets,
                options,
            } => {
                let report = compose_assembly(self.store(), &self.config, &output_path, &assets, &options)?;
                Ok(serde_json::to_value(report)?)
            }
        }
    }

    /// Decode and dispatch a raw `{method, params}` value.
    pub fn call(&mut self, value: Json) -> Result<Json> {
        let call = Call::from_value(value)?;
        self.dispatch(call)
    }
}

impl RequestHandler for Service {
    fn handle_request(&mut self, request: &Request) -> Response {
        match self.call(request.call_value()) {
            Ok(result) => Response::ok(result),
            Err(e) => {
                log::debug!("{} failed: {}", request.method, e);
                Response::error(e.code(), e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::MemoryStore;

    fn service() -> Service {
        Service::new(Config::default(), Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_every_method_name_decodes() {
        for method in Call::METHODS {
            let err = Call::from_value(json!({ "method": method, "params": {} }));
            if let Err(e) = err {
                assert_eq!(e.code(), "invalid_params", "{}", method);
            }
        }
    }

    #[test]
    fn test_unknown_method() {
        let err = service().call(json!({ "method": "render", "params": {} })).unwrap_err();
        assert_eq!(err.code(), "unknown_method");
    }

    #[test]
    fn test_session_flow() {
        let mut svc = service();
        let created = svc
            .call(json!({ "method": "create_document", "params": { "upAxis": "Y" } }))
            .unwrap();
        let handle = created["handle"].as_str().unwrap().to_string();
        let saved = svc
            .call(json!({
                "method": "save_document",
                "params": { "handle": handle, "outputPath": "/w/new.sdoc" }
            }))
            .unwrap();
        assert_eq!(saved["path"], "/w/new.sdoc");

        let created = svc
            .call(json!({
                "method": "create_node",
                "params": { "path": "/w/new.sdoc", "prim_path": "/World/Box", "typeName": "Cube" }
            }))
            .unwrap();
        assert_eq!(created["specifier"], "def");

        let listed = svc
            .call(json!({ "method": "list_nodes", "params": { "path": "/w/new.sdoc", "depth": 2 } }))
            .unwrap();
        let listed = listed["nodePaths"].as_array().unwrap();
        assert!(listed.contains(&json!("/World/Box")));

        let response = svc.handle_request(&Request {
            id: Some(json!(1)),
            method: "node_info".into(),
            params: json!({ "path": "/w/new.sdoc", "node_path": "/Nope" }),
        });
        assert!(!response.ok);
        assert_eq!(response.error.unwrap().code, "not_found");
    }
}
