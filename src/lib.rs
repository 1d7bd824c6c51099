//! `ccsubagents`: a content-addressed artifact store exposed over an MCP
//! stdio server, and a transactional installer for managed binaries, agent
//! files and editor config.

pub mod attestation;
pub mod github;
pub mod mcp;

pub use ccsa_installer as installer;
pub use ccsa_store as store;
