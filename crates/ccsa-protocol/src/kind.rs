//! The abstract error taxonomy shared by the store and installer crates.
//!
//! Concrete error enums in each crate expose a `kind()` accessor returning
//! one of these variants, so call sites that only care about the category
//! (tool-result mapping, exit codes) don't need to match on every variant.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    Conflict,
    UnsupportedURI,
    AttestationFailed,
    Unsafe,
    Internal,
}

impl ErrorKind {
    /// The tool-result message prefix used by the MCP server when mapping a
    /// domain error to `isError: true` content, per the tool error taxonomy.
    pub fn tool_message(self, detail: &str) -> String {
        match self {
            ErrorKind::NotFound => "not found".to_string(),
            ErrorKind::Conflict => format!("conflict: {detail}"),
            ErrorKind::InvalidInput => format!("invalid input: {detail}"),
            _ => format!("internal error: {detail}"),
        }
    }
}
