//! Wire-level types shared across the artifact store, the MCP server and
//! the installer: the JSON-RPC 2.0 envelope, the `artifact://` URI scheme,
//! and the abstract error taxonomy.

pub mod envelope;
pub mod kind;
pub mod uri;

pub use envelope::{
    Message, RequestId, RpcErrorObject, RpcNotification, RpcRequest, RpcResponse,
    INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR,
};
pub use kind::ErrorKind;
pub use uri::{ArtifactUri, UriError};
