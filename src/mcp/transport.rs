//! Outbound JSON-RPC calls: the server issuing a request to the client
//! (`roots/list`) and waiting for the correlated response.
//!
//! A single write mutex guards the outbound line so a completed response
//! and a server-initiated call never interleave mid-line. Pending outbound
//! calls are tracked by auto-increment integer id in a small map; a
//! one-shot channel per call lets the caller block with a timeout while a
//! separate reader keeps pumping stdin and can route the matching response
//! in without itself blocking.

use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::mpsc;
use std::sync::Mutex;
use std::time::Duration;

use serde_json::Value;

use ccsa_protocol::{RequestId, RpcErrorObject, RpcRequest, RpcResponse};

#[derive(Debug, thiserror::Error)]
pub enum OutboundError {
    #[error("timed out waiting for a response")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("JSON-RPC error {code}: {message}")]
    Protocol { code: i64, message: String },
}

pub struct Outbound {
    writer: Mutex<Box<dyn Write + Send>>,
    pending: Mutex<HashMap<RequestId, mpsc::SyncSender<RpcResponse>>>,
    next_id: AtomicI64,
}

impl Outbound {
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(writer),
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    /// Write one JSON-RPC response line. The encode+write is one atomic
    /// unit with respect to other outbound writes (responses or calls).
    pub fn write_response(&self, response: &RpcResponse) -> std::io::Result<()> {
        self.write_line(response)
    }

    fn write_line<T: serde::Serialize>(&self, value: &T) -> std::io::Result<()> {
        let mut text = serde_json::to_string(value)?;
        text.push('\n');
        let mut w = self.writer.lock().unwrap();
        w.write_all(text.as_bytes())?;
        w.flush()
    }

    /// Issue a server-initiated call and block for a correlated response up
    /// to `timeout`. Cancellation (timeout) unregisters the pending entry;
    /// a response that arrives after that point is dropped by
    /// [`Outbound::route_response`].
    pub fn call(&self, method: &str, params: Option<Value>, timeout: Duration) -> Result<Value, OutboundError> {
        let id = RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = mpsc::sync_channel(1);
        self.pending.lock().unwrap().insert(id.clone(), tx);

        let request = RpcRequest::new(id.clone(), method, params);
        if let Err(e) = self.write_line(&request) {
            self.pending.lock().unwrap().remove(&id);
            return Err(OutboundError::Transport(e.to_string()));
        }

        match rx.recv_timeout(timeout) {
            Ok(response) => {
                if let Some(err) = response.error {
                    Err(OutboundError::Protocol {
                        code: err.code,
                        message: err.message,
                    })
                } else {
                    Ok(response.result.unwrap_or(Value::Null))
                }
            }
            Err(_) => {
                self.pending.lock().unwrap().remove(&id);
                Err(OutboundError::Timeout)
            }
        }
    }

    /// Route an inbound response to its pending call, if any. A response
    /// with no matching (or already-timed-out) pending entry is dropped.
    pub fn route_response(&self, response: RpcResponse) {
        let sender = self.pending.lock().unwrap().remove(&response.id);
        if let Some(sender) = sender {
            let _ = sender.send(response);
        }
    }
}

impl From<RpcErrorObject> for OutboundError {
    fn from(e: RpcErrorObject) -> Self {
        OutboundError::Protocol {
            code: e.code,
            message: e.message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn call_times_out_when_nothing_responds() {
        let outbound = Arc::new(Outbound::new(Box::new(Vec::new())));
        let err = outbound
            .call("roots/list", None, Duration::from_millis(20))
            .unwrap_err();
        assert!(matches!(err, OutboundError::Timeout));
    }

    #[test]
    fn call_resolves_when_response_is_routed() {
        let outbound = Arc::new(Outbound::new(Box::new(Vec::new())));
        let o = outbound.clone();
        let handle = thread::spawn(move || {
            o.call("roots/list", None, Duration::from_secs(1))
        });
        // Give the call a moment to register, then route a matching response.
        thread::sleep(Duration::from_millis(10));
        outbound.route_response(RpcResponse::success(
            RequestId::Number(1),
            serde_json::json!({"roots": []}),
        ));
        let result = handle.join().unwrap().unwrap();
        assert_eq!(result["roots"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn late_response_after_timeout_is_dropped_without_panicking() {
        let outbound = Outbound::new(Box::new(Vec::new()));
        let err = outbound
            .call("roots/list", None, Duration::from_millis(10))
            .unwrap_err();
        assert!(matches!(err, OutboundError::Timeout));
        // No pending entry remains; routing a stray response is a no-op.
        outbound.route_response(RpcResponse::success(RequestId::Number(1), Value::Null));
    }
}
