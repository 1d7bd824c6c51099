//! The stdio JSON-RPC server: lifecycle state machine, sequential tool
//! dispatch, resource endpoints, and lazy per-session subspace resolution.
//!
//! Wire format is newline-delimited JSON-RPC 2.0 over stdin/stdout; stderr
//! carries diagnostics only. A dedicated reader thread parses each line and
//! either routes it as a correlated outbound response or forwards it to the
//! main dispatch loop, which processes requests and notifications one at a
//! time in arrival order — there is no per-request worker pool.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::{mpsc, Arc, RwLock};
use std::thread;

use serde_json::{json, Value};

use ccsa_protocol::{Message, RpcErrorObject, RpcNotification, RpcRequest, RpcResponse};
use ccsa_store::ArtifactService;

use crate::mcp::resources::{list_resources, read_resource};
use crate::mcp::subspace::SubspaceResolver;
use crate::mcp::tools::{canonical_tool_name, dispatch as dispatch_tool, list_tools};
use crate::mcp::transport::Outbound;

const PROTOCOL_VERSION: &str = "2024-11-05";
const SERVER_NAME: &str = "ccsubagents";

struct Session {
    outbound: Arc<Outbound>,
    resolver: SubspaceResolver,
    initialized: RwLock<bool>,
    roots_capability: RwLock<bool>,
}

impl Session {
    fn new(base_root: PathBuf, outbound: Arc<Outbound>) -> Self {
        Self {
            outbound,
            resolver: SubspaceResolver::new(base_root),
            initialized: RwLock::new(false),
            roots_capability: RwLock::new(false),
        }
    }

    fn service(&self, force: bool) -> Arc<ArtifactService> {
        let initialized = *self.initialized.read().unwrap();
        let roots_capability = *self.roots_capability.read().unwrap();
        self.resolver
            .service(force, initialized, roots_capability, &self.outbound)
    }

    fn handle_request(&self, req: RpcRequest) {
        let id = req.id.clone();
        let params = req.params.clone().unwrap_or(Value::Null);
        let response = match req.method.as_str() {
            "initialize" => RpcResponse::success(id, self.handle_initialize(&params)),
            "ping" => RpcResponse::success(id, json!({})),
            "tools/list" => RpcResponse::success(id, list_tools()),
            "tools/call" => RpcResponse::success(id, self.handle_tools_call(&params)),
            "resources/list" => match list_resources(&self.service(false)) {
                Ok(v) => RpcResponse::success(id, v),
                Err(message) => RpcResponse::failure(id, RpcErrorObject::internal(message)),
            },
            "resources/read" => self.handle_resources_read(id.clone(), &params),
            "resources/templates/list" => RpcResponse::success(id, json!({ "resourceTemplates": [] })),
            "prompts/list" => RpcResponse::success(id, json!({ "prompts": [] })),
            other => RpcResponse::failure(id, RpcErrorObject::method_not_found(other)),
        };
        if let Err(e) = self.outbound.write_response(&response) {
            tracing::error!(error = %e, "failed to write response");
        }
    }

    fn handle_notification(&self, note: RpcNotification) {
        match note.method.as_str() {
            "notifications/initialized" => {
                *self.initialized.write().unwrap() = true;
                self.service(false);
            }
            "notifications/roots/list_changed" => {
                self.service(true);
            }
            other => {
                tracing::debug!(method = other, "ignoring unrecognized notification");
            }
        }
    }

    fn handle_initialize(&self, params: &Value) -> Value {
        let roots_is_object = params
            .get("capabilities")
            .and_then(|c| c.get("roots"))
            .map(|r| r.is_object())
            .unwrap_or(false);
        *self.roots_capability.write().unwrap() = roots_is_object;

        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "serverInfo": { "name": SERVER_NAME, "version": env!("CARGO_PKG_VERSION") },
            "capabilities": {
                "tools": { "listChanged": false },
                "resources": { "subscribe": false, "listChanged": false },
            },
        })
    }

    fn handle_tools_call(&self, params: &Value) -> Value {
        let name = params.get("name").and_then(|v| v.as_str()).unwrap_or("");
        let Some(canonical) = canonical_tool_name(name) else {
            return json!({
                "content": [{ "type": "text", "text": format!("internal error: unknown tool {name}") }],
                "isError": true,
            });
        };
        let args = params.get("arguments").cloned().unwrap_or(Value::Null);
        let service = self.service(false);
        dispatch_tool(&service, canonical, &args)
    }

    fn handle_resources_read(&self, id: ccsa_protocol::RequestId, params: &Value) -> RpcResponse {
        let Some(uri) = params.get("uri").and_then(|v| v.as_str()) else {
            return RpcResponse::failure(
                id,
                RpcErrorObject::invalid_params("resources/read requires a string \"uri\""),
            );
        };
        let service = self.service(false);
        RpcResponse::success(id, read_resource(&service, uri))
    }
}

/// Run the server to completion: reads requests/notifications from `reader`
/// and writes responses to `writer` until stdin is exhausted. `base_root`
/// is the global store root the session subspace is computed beneath.
pub fn serve<R, W>(reader: R, writer: W, base_root: PathBuf) -> std::io::Result<()>
where
    R: BufRead + Send + 'static,
    W: Write + Send + 'static,
{
    let outbound = Arc::new(Outbound::new(Box::new(writer)));
    let (dispatch_tx, dispatch_rx) = mpsc::channel::<DispatchItem>();

    let reader_outbound = outbound.clone();
    let reader_handle = thread::spawn(move || pump_stdin(reader, reader_outbound, dispatch_tx));

    let session = Session::new(base_root, outbound);
    for item in dispatch_rx {
        match item {
            DispatchItem::Request(req) => session.handle_request(req),
            DispatchItem::Notification(note) => session.handle_notification(note),
        }
    }

    let _ = reader_handle.join();
    Ok(())
}

enum DispatchItem {
    Request(RpcRequest),
    Notification(RpcNotification),
}

/// The single reader task: consumes stdin lines one at a time, routing
/// correlated responses to pending outbound calls and forwarding
/// requests/notifications to the sequential dispatch loop.
fn pump_stdin<R: BufRead>(mut reader: R, outbound: Arc<Outbound>, dispatch_tx: mpsc::Sender<DispatchItem>) {
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) => return,
            Ok(_) => {}
            Err(e) => {
                tracing::error!(error = %e, "stdin read error");
                return;
            }
        }
        let trimmed = line.trim_end_matches(['\n', '\r']);
        if trimmed.is_empty() {
            continue;
        }
        let value: Value = match serde_json::from_str(trimmed) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed JSON-RPC line");
                continue;
            }
        };
        match Message::from_value(value) {
            Ok(Message::Response(resp)) => outbound.route_response(resp),
            Ok(Message::Request(req)) => {
                if dispatch_tx.send(DispatchItem::Request(req)).is_err() {
                    return;
                }
            }
            Ok(Message::Notification(note)) => {
                if dispatch_tx.send(DispatchItem::Notification(note)).is_err() {
                    return;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed JSON-RPC envelope");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccsa_protocol::RequestId;
    use std::io::Cursor;
    use std::time::Duration;
    use tempfile::tempdir;

    /// Drives `serve` over in-memory buffers and returns every response
    /// line written to the "stdout" side.
    fn run(input: &str, base_root: PathBuf) -> Vec<Value> {
        let reader = Cursor::new(input.as_bytes().to_vec());
        let output = Arc::new(std::sync::Mutex::new(Vec::<u8>::new()));
        struct SharedWriter(Arc<std::sync::Mutex<Vec<u8>>>);
        impl Write for SharedWriter {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.lock().unwrap().write(buf)
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }
        let writer = SharedWriter(output.clone());
        serve(reader, writer, base_root).unwrap();
        let bytes = output.lock().unwrap().clone();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .filter(|l| !l.is_empty())
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn initialize_then_tools_list_and_ping() {
        let dir = tempdir().unwrap();
        let input = concat!(
            "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"initialize\",\"params\":{\"capabilities\":{}}}\n",
            "{\"jsonrpc\":\"2.0\",\"method\":\"notifications/initialized\"}\n",
            "{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"ping\"}\n",
            "{\"jsonrpc\":\"2.0\",\"id\":3,\"method\":\"tools/list\"}\n",
        );
        let responses = run(input, dir.path().to_path_buf());
        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0]["id"], 1);
        assert!(responses[0]["result"]["capabilities"]["tools"].is_object());
        assert_eq!(responses[1]["id"], 2);
        assert_eq!(responses[2]["id"], 3);
        assert!(responses[2]["result"]["tools"].as_array().unwrap().len() >= 7);
    }

    #[test]
    fn unknown_method_is_a_jsonrpc_error() {
        let dir = tempdir().unwrap();
        let input = "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"bogus/method\"}\n";
        let responses = run(input, dir.path().to_path_buf());
        assert_eq!(responses[0]["error"]["code"], -32601);
    }

    #[test]
    fn tools_call_round_trips_an_artifact() {
        let dir = tempdir().unwrap();
        let input = concat!(
            "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"initialize\",\"params\":{\"capabilities\":{}}}\n",
            "{\"jsonrpc\":\"2.0\",\"method\":\"notifications/initialized\"}\n",
            "{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"tools/call\",\"params\":{\"name\":\"save_artifact_text\",\"arguments\":{\"name\":\"plan/a\",\"text\":\"hi\"}}}\n",
        );
        let responses = run(input, dir.path().to_path_buf());
        assert_eq!(responses[1]["result"]["isError"], false);
    }

    #[test]
    fn fallback_subspace_writes_directly_under_base_when_roots_capability_absent() {
        let dir = tempdir().unwrap();
        let base = dir.path().to_path_buf();
        let input = concat!(
            "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"initialize\",\"params\":{\"capabilities\":{\"roots\":true}}}\n",
            "{\"jsonrpc\":\"2.0\",\"method\":\"notifications/initialized\"}\n",
            "{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"tools/call\",\"params\":{\"name\":\"save_artifact_text\",\"arguments\":{\"name\":\"plan/a\",\"text\":\"hi\"}}}\n",
        );
        run(input, base.clone());
        assert!(base.join("names.json").exists());
    }

    /// A stdin stand-in fed by the test thread one line at a time, so the
    /// test can observe the server's outbound `roots/list` request before
    /// handing back its correlated response on the same stream — the
    /// actual duplex shape `serve()` drives, not a pre-baked transcript.
    struct ChannelReader {
        rx: mpsc::Receiver<Vec<u8>>,
        buf: Vec<u8>,
        pos: usize,
    }

    impl std::io::Read for ChannelReader {
        fn read(&mut self, out: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.buf.len() {
                match self.rx.recv() {
                    Ok(chunk) => {
                        self.buf = chunk;
                        self.pos = 0;
                    }
                    Err(_) => return Ok(0),
                }
            }
            let n = out.len().min(self.buf.len() - self.pos);
            out[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    #[test]
    fn roots_scoped_subspace_success_path_lands_under_hash_dir() {
        let dir = tempdir().unwrap();
        let base = dir.path().to_path_buf();

        let (line_tx, line_rx) = mpsc::channel::<Vec<u8>>();
        let reader = std::io::BufReader::new(ChannelReader {
            rx: line_rx,
            buf: Vec::new(),
            pos: 0,
        });

        let output = Arc::new(std::sync::Mutex::new(Vec::<u8>::new()));
        struct SharedWriter(Arc<std::sync::Mutex<Vec<u8>>>);
        impl Write for SharedWriter {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.lock().unwrap().write(buf)
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }
        let writer = SharedWriter(output.clone());

        let base_for_server = base.clone();
        let server = thread::spawn(move || serve(reader, writer, base_for_server).unwrap());

        let send_line = |line: &str| line_tx.send(format!("{line}\n").into_bytes()).unwrap();

        send_line(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"capabilities":{"roots":{}}}}"#);
        send_line(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#);

        // The `notifications/initialized` handler blocks resolving the
        // subspace, which issues an outbound `roots/list` call and waits for
        // its correlated response on this same stdin stream. Wait for that
        // outbound request to actually land before replying to it.
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        let roots_list_id = loop {
            let text = String::from_utf8(output.lock().unwrap().clone()).unwrap();
            if let Some(line) = text.lines().find(|l| l.contains("\"method\":\"roots/list\"")) {
                let v: Value = serde_json::from_str(line).unwrap();
                break v["id"].clone();
            }
            assert!(
                std::time::Instant::now() < deadline,
                "server never issued an outbound roots/list call"
            );
            thread::sleep(Duration::from_millis(5));
        };

        let roots_response = json!({
            "jsonrpc": "2.0",
            "id": roots_list_id,
            "result": {
                "roots": [
                    {"uri": "file:///repo/a"},
                    {"uri": "file://localhost/repo/b/../b"},
                ]
            }
        });
        send_line(&roots_response.to_string());

        send_line(r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"save_artifact_text","arguments":{"name":"plan/a","text":"hi"}}}"#);

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        loop {
            let text = String::from_utf8(output.lock().unwrap().clone()).unwrap();
            if text.lines().filter(|l| !l.is_empty()).count() >= 2 {
                break;
            }
            assert!(
                std::time::Instant::now() < deadline,
                "timed out waiting for the tools/call response"
            );
            thread::sleep(Duration::from_millis(5));
        }

        drop(line_tx);
        server.join().unwrap();

        let roots = crate::mcp::subspace::normalize_roots(&[
            "file:///repo/a".to_string(),
            "file://localhost/repo/b/../b".to_string(),
        ])
        .unwrap();
        let hash = crate::mcp::subspace::roots_hash(&roots);
        assert!(base.join(&hash).join("names.json").exists());
        assert!(!base.join("names.json").exists());
    }

    #[test]
    fn resources_read_unknown_uri_is_error_content_not_jsonrpc_error() {
        let dir = tempdir().unwrap();
        let input = "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"resources/read\",\"params\":{\"uri\":\"artifact://name/absent\"}}\n";
        let responses = run(input, dir.path().to_path_buf());
        assert!(responses[0]["result"].is_object());
        let text = responses[0]["result"]["contents"][0]["text"].as_str().unwrap();
        assert!(text.starts_with("error: "));
    }

    #[test]
    fn request_id_echoed_as_string_when_client_used_string_id() {
        let dir = tempdir().unwrap();
        let input = "{\"jsonrpc\":\"2.0\",\"id\":\"abc\",\"method\":\"ping\"}\n";
        let responses = run(input, dir.path().to_path_buf());
        assert_eq!(responses[0]["id"], "abc");
        let _ = RequestId::String("abc".to_string());
    }
}
