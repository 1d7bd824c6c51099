//! The `tools/list` registry and `tools/call` dispatch table. Canonical
//! tool names map 1:1 onto `ArtifactService` operations; aliases resolve to
//! the same handler. Tool-level failures are returned as successful
//! JSON-RPC responses with `isError: true`, per the tool error taxonomy —
//! only malformed JSON-RPC envelopes or unknown methods become real
//! JSON-RPC errors.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Map, Value};

use ccsa_protocol::{ArtifactUri, ErrorKind};
use ccsa_store::{
    decode_todo_list, encode_todo_list, todo_name, validate_todo_list, Artifact, ArtifactKind,
    ArtifactService, SaveBlobParams, SaveTextParams, Selector, TodoItem, TODO_MIME,
};

const STRICT_SCHEMA_MESSAGE: &str =
    "Invalid arguments: expected {operation, artifact, todoList?, expectedPrevRef?}";

const TODO_TOP_KEYS: [&str; 4] = ["operation", "artifact", "todoList", "expectedPrevRef"];
const TODO_SELECTOR_KEYS: [&str; 2] = ["name", "ref"];
const TODO_ITEM_KEYS: [&str; 3] = ["id", "title", "status"];

/// Resolve a tool name (canonical or alias) to its canonical form.
pub fn canonical_tool_name(name: &str) -> Option<&'static str> {
    match name {
        "save_artifact_text" | "artifact.save_text" => Some("save_artifact_text"),
        "save_artifact_blob" | "artifact.save_blob" => Some("save_artifact_blob"),
        "resolve_artifact" | "artifact.resolve" => Some("resolve_artifact"),
        "get_artifact" | "artifact.get" => Some("get_artifact"),
        "get_artifact_list" | "artifact.list" => Some("get_artifact_list"),
        "delete_artifact" | "artifact.delete" | "deleteArtifact" => Some("delete_artifact"),
        "artifact_todo" | "artifact.todo" => Some("artifact_todo"),
        _ => None,
    }
}

pub fn list_tools() -> Value {
    json!({
        "tools": [
            {
                "name": "save_artifact_text",
                "description": "Save a named text artifact, creating a new version if the name already exists.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "name": {"type": "string"},
                        "text": {"type": "string"},
                        "mimeType": {"type": "string"},
                        "expectedPrevRef": {"type": "string"}
                    },
                    "required": ["name", "text"]
                }
            },
            {
                "name": "save_artifact_blob",
                "description": "Save a named binary artifact from base64-encoded data.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "name": {"type": "string"},
                        "data": {"type": "string", "description": "base64-encoded payload"},
                        "mimeType": {"type": "string"},
                        "filename": {"type": "string"},
                        "expectedPrevRef": {"type": "string"}
                    },
                    "required": ["name", "data", "mimeType"]
                }
            },
            {
                "name": "resolve_artifact",
                "description": "Resolve a name to its current ref.",
                "inputSchema": {
                    "type": "object",
                    "properties": {"name": {"type": "string"}},
                    "required": ["name"]
                }
            },
            {
                "name": "get_artifact",
                "description": "Fetch an artifact by ref or name, with a rendering mode.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "artifact": {"type": "object"},
                        "mode": {"type": "string", "enum": ["auto", "text", "resource", "image", "meta"]}
                    },
                    "required": ["artifact"]
                }
            },
            {
                "name": "get_artifact_list",
                "description": "List artifacts by name prefix.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "prefix": {"type": "string"},
                        "limit": {"type": "integer"}
                    }
                }
            },
            {
                "name": "delete_artifact",
                "description": "Delete an artifact by ref or name.",
                "inputSchema": {
                    "type": "object",
                    "properties": {"artifact": {"type": "object"}},
                    "required": ["artifact"]
                }
            },
            {
                "name": "artifact_todo",
                "description": "Read or write the JSON todo list attached to an artifact.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "operation": {"type": "string", "enum": ["read", "write"]},
                        "artifact": {"type": "object"},
                        "todoList": {"type": "array"},
                        "expectedPrevRef": {"type": "string"}
                    },
                    "required": ["operation", "artifact"]
                }
            }
        ]
    })
}

/// Dispatch an already-resolved canonical tool call, returning the full
/// `tools/call` result envelope (`content` + `isError`).
pub fn dispatch(service: &ArtifactService, canonical: &str, params: &Value) -> Value {
    let outcome = match canonical {
        "save_artifact_text" => handle_save_text(service, params),
        "save_artifact_blob" => handle_save_blob(service, params),
        "resolve_artifact" => handle_resolve(service, params),
        "get_artifact" => handle_get(service, params),
        "get_artifact_list" => handle_list(service, params),
        "delete_artifact" => handle_delete(service, params),
        "artifact_todo" => handle_todo(service, params),
        _ => Err(ErrorKind::Internal.tool_message(&format!("unregistered tool {canonical}"))),
    };
    match outcome {
        Ok(content) => success_envelope(content),
        Err(message) => error_envelope(message),
    }
}

fn success_envelope(content: Vec<Value>) -> Value {
    json!({"content": content, "isError": false})
}

fn error_envelope(message: String) -> Value {
    json!({"content": [text_block(message)], "isError": true})
}

fn text_block(text: String) -> Value {
    json!({"type": "text", "text": text})
}

fn meta_block(artifact: &Artifact) -> Result<Value, String> {
    let encoded = serde_json::to_string(artifact)
        .map_err(|e| ErrorKind::Internal.tool_message(&e.to_string()))?;
    Ok(text_block(encoded))
}

fn resource_link_block(artifact: &Artifact) -> Value {
    json!({
        "type": "resource_link",
        "uri": ArtifactUri::for_name(artifact.name.clone()).to_string(),
        "name": artifact.name,
        "mimeType": artifact.mime_type,
    })
}

fn is_text_like(mime: &str) -> bool {
    mime.starts_with("text/") || mime.ends_with("+json") || mime == "application/json"
}

fn resource_block(artifact: &Artifact, bytes: &[u8]) -> Value {
    let uri = ArtifactUri::for_name(artifact.name.clone()).to_string();
    if is_text_like(&artifact.mime_type) {
        json!({
            "type": "resource",
            "resource": {
                "uri": uri,
                "mimeType": artifact.mime_type,
                "text": String::from_utf8_lossy(bytes),
            }
        })
    } else {
        json!({
            "type": "resource",
            "resource": {
                "uri": uri,
                "mimeType": artifact.mime_type,
                "blob": STANDARD.encode(bytes),
            }
        })
    }
}

fn parse_selector(value: &Value) -> Result<Selector, String> {
    let obj = value
        .as_object()
        .ok_or_else(|| "artifact selector must be an object".to_string())?;
    let has_ref = obj.get("ref").map(|v| v.is_string()).unwrap_or(false);
    let has_name = obj.get("name").map(|v| v.is_string()).unwrap_or(false);
    match (has_ref, has_name) {
        (true, false) => Ok(Selector::Ref(obj["ref"].as_str().unwrap().to_string())),
        (false, true) => Ok(Selector::Name(obj["name"].as_str().unwrap().to_string())),
        _ => Err("exactly one of ref or name must be set".to_string()),
    }
}

fn invalid(detail: impl Into<String>) -> String {
    ErrorKind::InvalidInput.tool_message(&detail.into())
}

fn require_str<'a>(obj: &'a Map<String, Value>, key: &str) -> Result<&'a str, String> {
    obj.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| invalid(format!("{key} is required")))
}

fn handle_save_text(service: &ArtifactService, params: &Value) -> Result<Vec<Value>, String> {
    let obj = params.as_object().ok_or_else(|| invalid("params must be an object"))?;
    let name = require_str(obj, "name")?.to_string();
    let text = require_str(obj, "text")?.to_string();
    let mime_type = obj.get("mimeType").and_then(|v| v.as_str()).map(str::to_string);
    let expected_prev_ref = obj
        .get("expectedPrevRef")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    let artifact = service
        .save_text(SaveTextParams {
            name,
            text,
            mime_type,
            expected_prev_ref,
        })
        .map_err(|e| e.kind().tool_message(&e.detail()))?;
    Ok(vec![meta_block(&artifact)?, resource_link_block(&artifact)])
}

fn handle_save_blob(service: &ArtifactService, params: &Value) -> Result<Vec<Value>, String> {
    let obj = params.as_object().ok_or_else(|| invalid("params must be an object"))?;
    let name = require_str(obj, "name")?.to_string();
    let mime_type = require_str(obj, "mimeType")?.to_string();
    let data_b64 = require_str(obj, "data")?;
    let data = STANDARD
        .decode(data_b64)
        .map_err(|e| invalid(format!("data is not valid base64: {e}")))?;
    let filename = obj.get("filename").and_then(|v| v.as_str()).map(str::to_string);
    let expected_prev_ref = obj
        .get("expectedPrevRef")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    let artifact = service
        .save_blob(SaveBlobParams {
            name,
            data,
            mime_type,
            filename,
            expected_prev_ref,
        })
        .map_err(|e| e.kind().tool_message(&e.detail()))?;
    Ok(vec![meta_block(&artifact)?, resource_link_block(&artifact)])
}

fn handle_resolve(service: &ArtifactService, params: &Value) -> Result<Vec<Value>, String> {
    let obj = params.as_object().ok_or_else(|| invalid("params must be an object"))?;
    let name = require_str(obj, "name")?;
    let r = service
        .resolve(name)
        .map_err(|e| e.kind().tool_message(&e.detail()))?;
    Ok(vec![text_block(json!({"ref": r}).to_string())])
}

fn handle_get(service: &ArtifactService, params: &Value) -> Result<Vec<Value>, String> {
    let obj = params.as_object().ok_or_else(|| invalid("params must be an object"))?;
    let selector_value = obj
        .get("artifact")
        .ok_or_else(|| invalid("artifact selector is required"))?;
    let selector = parse_selector(selector_value).map_err(invalid)?;
    let mode = obj.get("mode").and_then(|v| v.as_str()).unwrap_or("auto");
    let (artifact, bytes) = service
        .get(selector)
        .map_err(|e| e.kind().tool_message(&e.detail()))?;
    render_get(&artifact, &bytes, mode)
}

fn render_get(artifact: &Artifact, bytes: &[u8], mode: &str) -> Result<Vec<Value>, String> {
    let effective = match mode {
        "meta" | "text" | "resource" | "image" => mode,
        _ => match artifact.kind {
            ArtifactKind::Text => "text",
            ArtifactKind::Image => "image",
            ArtifactKind::File => "resource",
        },
    };

    if effective == "meta" {
        return Ok(vec![meta_block(artifact)?]);
    }

    let mut content = vec![meta_block(artifact)?];
    match effective {
        "text" => content.push(text_block(String::from_utf8_lossy(bytes).to_string())),
        "image" => {
            if artifact.mime_type.starts_with("image/") {
                content.push(json!({
                    "type": "image",
                    "data": STANDARD.encode(bytes),
                    "mimeType": artifact.mime_type,
                }));
            } else {
                content.push(resource_block(artifact, bytes));
            }
        }
        _ => content.push(resource_block(artifact, bytes)),
    }
    content.push(resource_link_block(artifact));
    Ok(content)
}

fn handle_list(service: &ArtifactService, params: &Value) -> Result<Vec<Value>, String> {
    let prefix = params
        .as_object()
        .and_then(|o| o.get("prefix"))
        .and_then(|v| v.as_str())
        .unwrap_or("");
    let limit = params
        .as_object()
        .and_then(|o| o.get("limit"))
        .and_then(|v| v.as_i64())
        .unwrap_or(0);
    let artifacts = service
        .list(prefix, limit)
        .map_err(|e| e.kind().tool_message(&e.detail()))?;
    let encoded = serde_json::to_string(&artifacts)
        .map_err(|e| ErrorKind::Internal.tool_message(&e.to_string()))?;
    Ok(vec![text_block(encoded)])
}

fn handle_delete(service: &ArtifactService, params: &Value) -> Result<Vec<Value>, String> {
    let obj = params.as_object().ok_or_else(|| invalid("params must be an object"))?;
    let selector_value = obj
        .get("artifact")
        .ok_or_else(|| invalid("artifact selector is required"))?;
    let selector = parse_selector(selector_value).map_err(invalid)?;
    let artifact = service
        .delete(selector)
        .map_err(|e| e.kind().tool_message(&e.detail()))?;
    Ok(vec![meta_block(&artifact)?])
}

fn object_with_only(value: &Value, allowed: &[&str]) -> Option<Map<String, Value>> {
    let obj = value.as_object()?;
    if obj.keys().any(|k| !allowed.contains(&k.as_str())) {
        return None;
    }
    Some(obj.clone())
}

fn handle_todo(service: &ArtifactService, params: &Value) -> Result<Vec<Value>, String> {
    let top = object_with_only(params, &TODO_TOP_KEYS).ok_or_else(|| STRICT_SCHEMA_MESSAGE.to_string())?;

    let operation = top
        .get("operation")
        .and_then(|v| v.as_str())
        .ok_or_else(|| STRICT_SCHEMA_MESSAGE.to_string())?;

    let selector_value = top.get("artifact").ok_or_else(|| STRICT_SCHEMA_MESSAGE.to_string())?;
    object_with_only(selector_value, &TODO_SELECTOR_KEYS).ok_or_else(|| STRICT_SCHEMA_MESSAGE.to_string())?;
    let selector = parse_selector(selector_value).map_err(|_| STRICT_SCHEMA_MESSAGE.to_string())?;

    let base_name = match &selector {
        Selector::Name(n) => n.clone(),
        Selector::Ref(_) => {
            let (artifact, _) = service
                .get(selector.clone())
                .map_err(|e| e.kind().tool_message(&e.detail()))?;
            artifact.name
        }
    };
    let todo_artifact_name = todo_name(&base_name);

    match operation {
        "read" => handle_todo_read(service, &todo_artifact_name),
        "write" => handle_todo_write(service, &top, &todo_artifact_name),
        _ => Err(STRICT_SCHEMA_MESSAGE.to_string()),
    }
}

fn handle_todo_read(service: &ArtifactService, todo_artifact_name: &str) -> Result<Vec<Value>, String> {
    match service.get(Selector::Name(todo_artifact_name.to_string())) {
        Ok((artifact, bytes)) => {
            let items = decode_todo_list(&bytes).map_err(|e| e.kind().tool_message(&e.detail()))?;
            Ok(vec![text_block(
                json!({
                    "todoList": items,
                    "exists": true,
                    "name": artifact.name,
                    "ref": artifact.ref_,
                    "prevRef": artifact.prev_ref,
                    "uriByName": ArtifactUri::for_name(artifact.name.clone()).to_string(),
                    "uriByRef": ArtifactUri::for_ref(artifact.ref_.clone()).to_string(),
                })
                .to_string(),
            )])
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(vec![text_block(
            json!({
                "todoList": Vec::<TodoItem>::new(),
                "exists": false,
                "name": todo_artifact_name,
                "uriByName": ArtifactUri::for_name(todo_artifact_name.to_string()).to_string(),
            })
            .to_string(),
        )]),
        Err(e) => Err(e.kind().tool_message(&e.detail())),
    }
}

fn handle_todo_write(
    service: &ArtifactService,
    top: &Map<String, Value>,
    todo_artifact_name: &str,
) -> Result<Vec<Value>, String> {
    let raw_items = top
        .get("todoList")
        .and_then(|v| v.as_array())
        .ok_or_else(|| STRICT_SCHEMA_MESSAGE.to_string())?;

    let mut items = Vec::with_capacity(raw_items.len());
    for raw in raw_items {
        let item_obj = object_with_only(raw, &TODO_ITEM_KEYS).ok_or_else(|| STRICT_SCHEMA_MESSAGE.to_string())?;
        let item: TodoItem = serde_json::from_value(Value::Object(item_obj))
            .map_err(|_| STRICT_SCHEMA_MESSAGE.to_string())?;
        items.push(item);
    }
    validate_todo_list(&items).map_err(|e| e.kind().tool_message(&e.detail()))?;
    let encoded = encode_todo_list(&items).map_err(|e| e.kind().tool_message(&e.detail()))?;

    let expected_prev_ref = top
        .get("expectedPrevRef")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    let artifact = service
        .save_text(SaveTextParams {
            name: todo_artifact_name.to_string(),
            text: encoded,
            mime_type: Some(TODO_MIME.to_string()),
            expected_prev_ref,
        })
        .map_err(|e| e.kind().tool_message(&e.detail()))?;

    Ok(vec![text_block(
        json!({
            "todoList": items,
            "exists": true,
            "name": artifact.name,
            "ref": artifact.ref_,
            "prevRef": artifact.prev_ref,
            "uriByName": ArtifactUri::for_name(artifact.name.clone()).to_string(),
            "uriByRef": ArtifactUri::for_ref(artifact.ref_.clone()).to_string(),
        })
        .to_string(),
    )])
}
