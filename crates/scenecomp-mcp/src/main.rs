//! scenecomp-mcp - MCP server for scene document authoring
//!
//! Speaks MCP JSON-RPC over stdio and runs every tool call against an
//! in-process authoring service.

use serde_json::{json, Map, Value};
use std::io::{self, BufRead, Write};

use scenecomp::core::config::Config;
use scenecomp::service::Service;
use scenecomp_protocol::{Request, RequestHandler};

/// Argument keys accepted in place of the canonical ones.
const KEY_SYNONYMS: &[(&str, &str)] = &[
    ("prim_path", "node_path"),
    ("usd_path", "path"),
    ("file_path", "path"),
    ("stage_path", "path"),
    ("asset", "asset_path"),
    ("material", "material_path"),
    ("set", "variant_set"),
    ("set_default_prim", "set_default"),
];

fn snake_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for c in key.chars() {
        if c.is_ascii_uppercase() {
            out.push('_');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Rewrite top-level argument keys to the service's canonical names.
fn normalize_args(args: &Value) -> Value {
    let Some(map) = args.as_object() else {
        return json!({});
    };
    let mut out = Map::new();
    for (key, value) in map {
        let key = snake_case(key);
        let key = KEY_SYNONYMS
            .iter()
            .find(|(from, _)| *from == key)
            .map(|(_, to)| to.to_string())
            .unwrap_or(key);
        out.entry(key).or_insert_with(|| value.clone());
    }
    Value::Object(out)
}

fn string_prop(description: &str) -> Value {
    json!({ "type": "string", "description": description })
}

fn tool(name: &str, description: &str, properties: Value, required: &[&str]) -> Value {
    json!({
        "name": name,
        "description": description,
        "inputSchema": {
            "type": "object",
            "properties": properties,
            "required": required
        }
    })
}

/// Tool definitions for MCP
fn tool_definitions() -> Vec<Value> {
    let path = string_prop("Path to the scene document (.sdoc or .sdocz)");
    let node = string_prop("Absolute node path, e.g. /World/Chair");
    let time = json!({
        "type": ["number", "string"],
        "description": "Time code, or 'default'"
    });
    let handle = string_prop("Handle returned by open_document or create_document");

    vec![
        tool(
            "open_document",
            "Open a document and keep it in the session. Returns a handle.",
            json!({ "path": path }),
            &["path"],
        ),
        tool(
            "create_document",
            "Create an empty in-session document",
            json!({
                "path": string_prop("Optional path the document will be saved to"),
                "up_axis": { "type": "string", "enum": ["Y", "Z"] },
                "meters_per_unit": { "type": "number" }
            }),
            &[],
        ),
        tool(
            "close_document",
            "Close an open document without saving",
            json!({ "handle": handle }),
            &["handle"],
        ),
        tool(
            "list_open_documents",
            "List documents open in the session",
            json!({}),
            &[],
        ),
        tool(
            "document_summary",
            "Summarize an open document: layers, root nodes, default node, time range, up axis",
            json!({ "handle": handle }),
            &["handle"],
        ),
        tool(
            "save_document",
            "Save an open document, optionally to a new path",
            json!({ "handle": handle, "output_path": string_prop("Optional output path") }),
            &["handle"],
        ),
        tool(
            "summarize_file",
            "Summarize a document on disk without opening it in the session",
            json!({ "path": path }),
            &["path"],
        ),
        tool(
            "list_nodes",
            "List composed node paths under a root",
            json!({
                "path": path,
                "root": string_prop("Root node path (default /)"),
                "depth": { "type": "integer", "description": "Levels below root (default 1)" },
                "type_filter": string_prop("Keep only nodes of this type")
            }),
            &["path"],
        ),
        tool(
            "node_info",
            "Describe a composed node: type, attributes, references, variant sets, children",
            json!({ "path": path, "node_path": node }),
            &["path", "node_path"],
        ),
        tool(
            "get_attribute",
            "Read a composed attribute value",
            json!({ "path": path, "node_path": node, "attr": string_prop("Attribute name"), "time": time }),
            &["path", "node_path", "attr"],
        ),
        tool(
            "create_node",
            "Define or override a node",
            json!({
                "path": path,
                "node_path": node,
                "type_name": string_prop("Node type, e.g. Xform, Cube, Material"),
                "specifier": { "type": "string", "enum": ["def", "over"] }
            }),
            &["path", "node_path"],
        ),
        tool(
            "delete_node",
            "Remove a node spec and its subtree",
            json!({ "path": path, "node_path": node }),
            &["path", "node_path"],
        ),
        tool(
            "set_attribute",
            "Author an attribute value. The JSON value is typed on write.",
            json!({
                "path": path,
                "node_path": node,
                "attr": string_prop("Attribute name"),
                "value": { "description": "Value to author" },
                "time": time
            }),
            &["path", "node_path", "attr", "value"],
        ),
        tool(
            "batch_set_attributes",
            "Apply many attribute edits in one save. Transform names (translate, rotate, scale, size, transform) route through transform authoring. Each item reports its own outcome.",
            json!({
                "path": path,
                "items": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "node_path": { "type": "string" },
                            "attr": { "type": "string" },
                            "value": {},
                            "time": {}
                        },
                        "required": ["node_path", "attr"]
                    }
                }
            }),
            &["path", "items"],
        ),
        tool(
            "get_transform",
            "Resolve a node's effective transform ops and local/world matrices",
            json!({ "path": path, "node_path": node, "time": time }),
            &["path", "node_path"],
        ),
        tool(
            "set_transform",
            "Author a transform from a 4x4 matrix or from translate/rotate/scale ops",
            json!({
                "path": path,
                "node_path": node,
                "matrix": { "type": "array", "description": "Row-major 4x4, translation in the last row" },
                "ops": { "type": "object", "description": "{translate?, rotate?, scale?} as [x, y, z]" },
                "time": time
            }),
            &["path", "node_path"],
        ),
        tool(
            "add_reference",
            "Add a reference to another document. internal_path null references the whole document; omitted uses its default node.",
            json!({
                "path": path,
                "node_path": node,
                "asset_path": string_prop("Referenced document, relative to this one"),
                "internal_path": { "type": ["string", "null"] }
            }),
            &["path", "node_path", "asset_path"],
        ),
        tool(
            "add_references_batch",
            "Add several references in one save",
            json!({
                "path": path,
                "items": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "node_path": { "type": "string" },
                            "asset_path": { "type": "string" },
                            "internal_path": { "type": ["string", "null"] }
                        },
                        "required": ["node_path", "asset_path"]
                    }
                }
            }),
            &["path", "items"],
        ),
        tool(
            "set_default_node",
            "Nominate the document's default node",
            json!({ "path": path, "node_path": node }),
            &["path", "node_path"],
        ),
        tool(
            "list_variants",
            "List a node's variant sets, variants and selections",
            json!({ "path": path, "node_path": node }),
            &["path", "node_path"],
        ),
        tool(
            "set_variant_selection",
            "Select a variant in a variant set",
            json!({
                "path": path,
                "node_path": node,
                "variant_set": string_prop("Variant set name"),
                "selection": string_prop("Variant name")
            }),
            &["path", "node_path", "variant_set", "selection"],
        ),
        tool(
            "author_variants",
            "Author variants carrying references, transforms, material bindings and attributes. Existing local references are preserved in a 'default' variant.",
            json!({
                "path": path,
                "node_path": node,
                "variant_set": string_prop("Variant set name"),
                "variant": { "type": "object", "description": "A single variant definition" },
                "variants": { "type": "array", "description": "Variant definitions: {name, asset_path?, internal_path?, material_path?, matrix?, ops?, attributes?}" },
                "clear_local": { "type": "boolean", "description": "Clear direct opinions the variants author" },
                "select": string_prop("Variant to select afterwards"),
                "time": time
            }),
            &["path", "node_path", "variant_set"],
        ),
        tool(
            "list_materials",
            "List composed Material nodes",
            json!({ "path": path }),
            &["path"],
        ),
        tool(
            "bind_material",
            "Bind a material to a node",
            json!({ "path": path, "node_path": node, "material_path": string_prop("Material node path") }),
            &["path", "node_path", "material_path"],
        ),
        tool(
            "unbind_material",
            "Remove a node's material binding",
            json!({ "path": path, "node_path": node }),
            &["path", "node_path"],
        ),
        tool(
            "get_material_binding",
            "Resolve the material bound to a node, including inherited bindings",
            json!({ "path": path, "node_path": node }),
            &["path", "node_path"],
        ),
        tool(
            "list_cameras",
            "List composed Camera nodes",
            json!({ "path": path }),
            &["path"],
        ),
        tool(
            "get_camera",
            "Read a camera's focal length, apertures, clipping range and projection",
            json!({ "path": path, "camera_path": string_prop("Camera node path"), "time": time }),
            &["path", "camera_path"],
        ),
        tool(
            "set_camera",
            "Author camera parameters, defining the camera if it does not exist",
            json!({
                "path": path,
                "camera_path": string_prop("Camera node path"),
                "params": {
                    "type": "object",
                    "description": "{focalLength?, horizontalAperture?, verticalAperture?, clippingRange?: [near, far], projection?: perspective|orthographic}"
                }
            }),
            &["path", "camera_path"],
        ),
        tool(
            "get_bounds",
            "World-space bounding box of a node and its descendants",
            json!({ "path": path, "node_path": node, "time": time }),
            &["path", "node_path"],
        ),
        tool(
            "validate_document",
            "Check composition errors, op orders, bindings, variant selections and sizes",
            json!({ "path": path }),
            &["path"],
        ),
        tool(
            "export_document",
            "Export a document, optionally flattened",
            json!({
                "path": path,
                "output_path": string_prop("Output path"),
                "flatten": { "type": "boolean" },
                "skip_if_exists": { "type": "boolean" }
            }),
            &["path", "output_path"],
        ),
        tool(
            "export_package",
            "Bundle a document and its referenced documents into a .sdocz archive",
            json!({ "path": path, "output_path": string_prop("Output .sdocz path") }),
            &["path", "output_path"],
        ),
        tool(
            "compose_assembly",
            "Reference one or more assets into a combined document under a container node. Packaged assets are flattened to plain siblings first.",
            json!({
                "output_path": string_prop("Combined .sdoc path"),
                "assets": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "asset_path": { "type": "string" },
                            "name": { "type": "string" },
                            "internal_path": { "type": ["string", "null"] }
                        },
                        "required": ["asset_path"]
                    }
                },
                "container_root": string_prop("Container node path"),
                "flatten": { "type": "boolean" },
                "up_axis": { "type": "string", "enum": ["Y", "Z"] },
                "set_default": { "type": "boolean" },
                "skip_if_exists": { "type": "boolean" },
                "clear_existing": { "type": "boolean" }
            }),
            &["output_path", "assets"],
        ),
    ]
}

/// Handle a tool call
fn handle_tool_call(service: &mut Service, name: &str, args: &Value) -> Value {
    let request = Request {
        id: None,
        method: name.to_string(),
        params: normalize_args(args),
    };
    let response = service.handle_request(&request);

    match (response.result, response.error) {
        (Some(result), _) if response.ok => {
            let text = serde_json::to_string_pretty(&result).unwrap_or_else(|_| "{}".into());
            json!({
                "content": [{"type": "text", "text": text}]
            })
        }
        (_, Some(error)) => json!({
            "content": [{"type": "text", "text": format!("{}: {}", error.code, error.message)}],
            "isError": true
        }),
        _ => json!({
            "content": [{"type": "text", "text": format!("Tool {} returned no result", name)}],
            "isError": true
        }),
    }
}

/// Process a JSON-RPC request and return a response
fn process_request(service: &mut Service, request: &Value) -> Option<Value> {
    let id = request.get("id").cloned();
    let method = request
        .get("method")
        .and_then(|m| m.as_str())
        .unwrap_or("");

    let result = match method {
        "initialize" => {
            json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {
                    "tools": {}
                },
                "serverInfo": {
                    "name": "scenecomp-mcp",
                    "version": env!("CARGO_PKG_VERSION")
                }
            })
        }
        "notifications/initialized" => {
            return None;
        }
        "tools/list" => {
            json!({
                "tools": tool_definitions()
            })
        }
        "tools/call" => {
            let params = request.get("params").cloned().unwrap_or(json!({}));
            let tool_name = params
                .get("name")
                .and_then(|n| n.as_str())
                .unwrap_or("");
            let tool_args = params.get("arguments").cloned().unwrap_or(json!({}));
            handle_tool_call(service, tool_name, &tool_args)
        }
        "ping" => {
            json!({})
        }
        _ => {
            return Some(json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {
                    "code": -32601,
                    "message": format!("Method not found: {}", method)
                }
            }));
        }
    };

    Some(json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result
    }))
}

fn main() {
    scenecomp::core::logging::init();
    log::info!("scenecomp-mcp server starting");

    let mut service = Service::with_file_store(Config::discover(None));
    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut stdout_lock = stdout.lock();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                log::error!("stdin read error: {}", e);
                break;
            }
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let request: Value = match serde_json::from_str(trimmed) {
            Ok(v) => v,
            Err(e) => {
                log::error!("Invalid JSON: {}", e);
                let error_resp = json!({
                    "jsonrpc": "2.0",
                    "id": null,
                    "error": {
                        "code": -32700,
                        "message": format!("Parse error: {}", e)
                    }
                });
                let _ = writeln!(stdout_lock, "{}", error_resp);
                let _ = stdout_lock.flush();
                continue;
            }
        };

        if let Some(response) = process_request(&mut service, &request) {
            if let Err(e) = writeln!(stdout_lock, "{}", response) {
                log::error!("stdout write error: {}", e);
                break;
            }
            if let Err(e) = stdout_lock.flush() {
                log::error!("stdout flush error: {}", e);
                break;
            }
        }
    }

    log::info!("scenecomp-mcp server shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_args() {
        let args = normalize_args(&json!({
            "primPath": "/A",
            "usdPath": "scene.sdoc",
            "skipIfExists": false,
            "internalPath": null
        }));
        assert_eq!(args["node_path"], "/A");
        assert_eq!(args["path"], "scene.sdoc");
        assert_eq!(args["skip_if_exists"], false);
        assert!(args.get("internal_path").is_some_and(Value::is_null));
    }

    #[test]
    fn test_every_tool_is_a_service_method() {
        let names: Vec<String> = tool_definitions()
            .iter()
            .map(|t| t["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names.len(), scenecomp::service::Call::METHODS.len());
        for name in &names {
            assert!(scenecomp::service::Call::METHODS.contains(&name.as_str()), "{}", name);
        }
    }

    #[test]
    fn test_unknown_tool_is_error() {
        let mut service = Service::with_file_store(Config::default());
        let out = handle_tool_call(&mut service, "render_frame", &json!({}));
        assert_eq!(out["isError"], true);
        assert!(out["content"][0]["text"].as_str().unwrap().starts_with("unknown_method"));
    }
}
