//! Targeted edits to `settings.json` and `mcp.json`: parse as a generic JSON
//! tree, touch only the key the installer owns, and re-serialize so unknown
//! sibling keys survive bit-exact.

use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

use crate::atomic::write_atomic_text;
use crate::error::{InstallError, InstallResult};

pub const AGENT_FILES_LOCATIONS_KEY: &str = "chat.agentFilesLocations";
pub const SERVERS_KEY: &str = "servers";

/// Read a JSON file as an object tree; an absent file reads as `{}`.
pub fn read_json_object(path: &Path) -> InstallResult<Value> {
    match fs::read(path) {
        Ok(bytes) => {
            let value: Value = serde_json::from_slice(&bytes)?;
            if !value.is_object() {
                return Err(InstallError::InvalidInput(format!(
                    "{} is not a JSON object",
                    path.display()
                )));
            }
            Ok(value)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Ok(Value::Object(Map::new()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Pretty-print with two-space indentation and a trailing newline, written
/// atomically.
pub fn write_json_object(path: &Path, value: &Value) -> InstallResult<()> {
    let mut text = serde_json::to_string_pretty(value)?;
    text.push('\n');
    write_atomic_text(path, &text)
}

fn object_entry<'a>(root: &'a mut Value, key: &str) -> InstallResult<&'a mut Map<String, Value>> {
    let root_obj = root
        .as_object_mut()
        .ok_or_else(|| InstallError::Internal("root is not a JSON object".to_string()))?;
    let entry = root_obj
        .entry(key.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !entry.is_object() {
        *entry = Value::Object(Map::new());
    }
    Ok(entry.as_object_mut().expect("just normalized to object"))
}

/// Ensure `chat.agentFilesLocations[agentPath] = true`; remove
/// `previous_agent_path` from the same map if it names a different key.
/// Returns whether a new key was inserted (vs. already present).
pub fn set_agent_path(
    root: &mut Value,
    agent_path: &str,
    previous_agent_path: Option<&str>,
) -> InstallResult<bool> {
    let map = object_entry(root, AGENT_FILES_LOCATIONS_KEY)?;
    let added = !map.contains_key(agent_path);
    map.insert(agent_path.to_string(), Value::Bool(true));
    if let Some(prev) = previous_agent_path {
        if prev != agent_path {
            map.remove(prev);
        }
    }
    Ok(added)
}

/// Remove `agentPath` from `chat.agentFilesLocations`, tolerating a missing
/// file, key, or object shape.
pub fn remove_agent_path(root: &mut Value, agent_path: &str) {
    if let Some(map) = root
        .get_mut(AGENT_FILES_LOCATIONS_KEY)
        .and_then(|v| v.as_object_mut())
    {
        map.remove(agent_path);
    }
}

/// Capture the current value of `servers.<key>` for faithful restore,
/// before it gets overwritten.
pub fn capture_mcp_previous(root: &Value, key: &str) -> (bool, Option<String>) {
    match root.get(SERVERS_KEY).and_then(|s| s.get(key)) {
        Some(v) => (
            true,
            Some(serde_json::to_string(v).unwrap_or_default()),
        ),
        None => (false, None),
    }
}

/// Overwrite `servers.<key> = {command: commandPath}`.
pub fn set_mcp_server(root: &mut Value, key: &str, command_path: &str) -> InstallResult<()> {
    let map = object_entry(root, SERVERS_KEY)?;
    map.insert(
        key.to_string(),
        serde_json::json!({ "command": command_path }),
    );
    Ok(())
}

/// Restore `servers.<key>` to its previous raw value, or remove it if it had
/// no previous value. Tolerates a missing file or key.
pub fn restore_mcp_server(root: &mut Value, key: &str, had_previous: bool, previous: &Option<String>) {
    let Some(map) = root.get_mut(SERVERS_KEY).and_then(|v| v.as_object_mut()) else {
        return;
    };
    if had_previous {
        if let Some(raw) = previous {
            if let Ok(value) = serde_json::from_str::<Value>(raw) {
                map.insert(key.to_string(), value);
                return;
            }
        }
    }
    map.remove(key);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_agent_path_preserves_unknown_siblings() {
        let mut root = json!({
            "editor.fontSize": 12,
            "chat.agentFilesLocations": {"/old/path": true}
        });
        let added = set_agent_path(&mut root, "/new/path", Some("/old/path")).unwrap();
        assert!(added);
        assert_eq!(root["editor.fontSize"], 12);
        assert_eq!(root["chat.agentFilesLocations"]["/new/path"], true);
        assert!(root["chat.agentFilesLocations"].get("/old/path").is_none());
    }

    #[test]
    fn set_agent_path_on_absent_key_creates_object() {
        let mut root = json!({});
        let added = set_agent_path(&mut root, "/a", None).unwrap();
        assert!(added);
        assert_eq!(root["chat.agentFilesLocations"]["/a"], true);
    }

    #[test]
    fn remove_agent_path_tolerates_missing_key() {
        let mut root = json!({"other": 1});
        remove_agent_path(&mut root, "/a");
        assert_eq!(root, json!({"other": 1}));
    }

    #[test]
    fn mcp_capture_and_restore_round_trip() {
        let mut root = json!({
            "servers": {"existing": {"command": "/usr/bin/old"}}
        });
        let (had_previous, previous) = capture_mcp_previous(&root, "existing");
        assert!(had_previous);
        set_mcp_server(&mut root, "existing", "/usr/bin/new").unwrap();
        assert_eq!(root["servers"]["existing"]["command"], "/usr/bin/new");
        restore_mcp_server(&mut root, "existing", had_previous, &previous);
        assert_eq!(root["servers"]["existing"]["command"], "/usr/bin/old");
    }

    #[test]
    fn mcp_restore_removes_key_when_no_previous_value() {
        let mut root = json!({"servers": {}});
        set_mcp_server(&mut root, "new-server", "/usr/bin/x").unwrap();
        restore_mcp_server(&mut root, "new-server", false, &None);
        assert!(root["servers"].get("new-server").is_none());
    }
}
