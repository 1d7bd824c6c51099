//! `ccsa-mcp`: the MCP stdio server entry point. Reads newline-delimited
//! JSON-RPC requests from stdin and writes responses to stdout; all
//! diagnostics go to stderr, since stdout is reserved for the wire protocol.

use std::io::{stdin, stdout, BufReader};
use std::path::PathBuf;
use std::process;

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let base_root = resolve_base_root();
    tracing::info!(root = %base_root.display(), "starting MCP stdio server");

    let reader = BufReader::new(stdin());
    let writer = stdout();
    if let Err(e) = ccsubagents::mcp::serve(reader, writer, base_root) {
        tracing::error!(error = %e, "MCP server terminated with an I/O error");
        process::exit(1);
    }
}

fn resolve_base_root() -> PathBuf {
    if let Some(dir) = std::env::var_os("LOCAL_ARTIFACT_STORE_DIR") {
        return PathBuf::from(dir);
    }
    let home = home_dir();
    home.join(".local/share/ccsubagents/store")
}

fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}
