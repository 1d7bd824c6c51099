//! The JSON todo-list document stored as the artifact `<baseName>/todo`.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{StoreError, StoreResult};

pub const TODO_MIME: &str = "application/json; charset=utf-8";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TodoStatus {
    NotStarted,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodoItem {
    pub id: i64,
    pub title: String,
    pub status: TodoStatus,
}

/// Validate a todo list: titles non-empty after trim, ids unique.
pub fn validate_todo_list(items: &[TodoItem]) -> StoreResult<()> {
    let mut seen = HashSet::new();
    for item in items {
        if item.title.trim().is_empty() {
            return Err(StoreError::InvalidInput(format!(
                "todo item {} has an empty title",
                item.id
            )));
        }
        if !seen.insert(item.id) {
            return Err(StoreError::InvalidInput(format!(
                "duplicate todo item id {}",
                item.id
            )));
        }
    }
    Ok(())
}

/// The derived artifact name for a base artifact name's todo list.
pub fn todo_name(base_name: &str) -> String {
    format!("{base_name}/todo")
}

pub fn encode_todo_list(items: &[TodoItem]) -> StoreResult<String> {
    serde_json::to_string(items).map_err(StoreError::from)
}

pub fn decode_todo_list(raw: &[u8]) -> StoreResult<Vec<TodoItem>> {
    serde_json::from_slice(raw)
        .map_err(|_| StoreError::Internal("invalid stored todo artifact".to_string()))
}
