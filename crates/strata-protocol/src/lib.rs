//! Wire protocol between the strata host and the evaluation engine.
//!
//! The engine runs as a sandboxed subprocess. Host and engine exchange
//! line-delimited JSON messages over the engine's stdin/stdout: the host
//! sends an `evaluate` request, the engine answers with zero or more
//! `read_resource` callbacks (each answered by a `resource_result`) and
//! finally a `result`. Binary resource payloads travel base64-encoded.

pub mod error;
pub mod framing;
pub mod message;

pub use error::ProtocolError;
pub use framing::{read_message, write_message};
pub use message::{
    EngineMessage, EvalDiagnostic, EvaluateRequest, EvaluateResult, HostMessage, ResourceRequest,
    ResourceResult,
};

/// Protocol version spoken by this implementation.
pub const PROTOCOL_VERSION: i32 = 1;
