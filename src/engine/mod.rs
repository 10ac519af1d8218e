//! Evaluator session.
//!
//! The evaluation engine is an external, sandboxed process. A session wires
//! the secret resource handlers to one evaluate request: the host sends the
//! request, answers the engine's `read_resource` callbacks through the
//! registered handlers, and collects the final result. Sessions hold the
//! engine subprocess as a scoped resource; dropping the transport tears the
//! process down on every exit path, error paths included.

mod transport;

pub use transport::{EngineTransport, ProcessTransport};

use std::collections::HashMap;
use std::path::Path;

use strata_protocol::{
    EngineMessage, EvalDiagnostic, EvaluateRequest, HostMessage, ProtocolError, ResourceRequest,
    ResourceResult, PROTOCOL_VERSION,
};

use crate::bridge::{BridgeError, ResourceUri, SecretHandler};

/// Errors raised while driving an engine session.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to start engine '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("engine protocol failure: {0}")]
    Protocol(#[from] ProtocolError),

    /// The engine reported a parse, type, or runtime error. The diagnostic
    /// passes through unmodified.
    #[error("evaluation failed: {0}")]
    Evaluation(EvalDiagnostic),

    /// A resource handler failed hard (decryption, archive corruption).
    #[error(transparent)]
    Resource(#[from] BridgeError),

    #[error("engine answered request '{actual}' while '{expected}' was in flight")]
    ResultMismatch { expected: String, actual: String },
}

/// One evaluator conversation with the resource bridge attached.
pub struct EngineSession<'a> {
    transport: Box<dyn EngineTransport>,
    handlers: HashMap<&'static str, SecretHandler<'a>>,
}

impl<'a> EngineSession<'a> {
    /// Create a session over the given transport with no handlers attached.
    pub fn new(transport: Box<dyn EngineTransport>) -> Self {
        Self {
            transport,
            handlers: HashMap::new(),
        }
    }

    /// Register a handler under its scheme. The scheme is also added to the
    /// allow-list sent with the evaluate request; the engine rejects
    /// resources outside it.
    pub fn with_handler(mut self, handler: SecretHandler<'a>) -> Self {
        self.handlers.insert(handler.scheme(), handler);
        self
    }

    /// Schemes the engine may request, sorted for a stable wire encoding.
    pub fn allowed_schemes(&self) -> Vec<String> {
        let mut schemes: Vec<String> = self.handlers.keys().map(|s| s.to_string()).collect();
        schemes.sort();
        schemes
    }

    /// Evaluate `expression` against `module`, answering resource callbacks
    /// until the engine produces a result.
    pub fn evaluate(
        &mut self,
        module: &Path,
        expression: &str,
        project_dir: Option<&Path>,
    ) -> Result<String, EngineError> {
        let request_id = uuid::Uuid::new_v4().to_string();
        self.transport
            .send(&HostMessage::Evaluate(EvaluateRequest {
                protocol_version: PROTOCOL_VERSION,
                request_id: request_id.clone(),
                module: module.display().to_string(),
                expression: expression.to_string(),
                project_dir: project_dir.map(|p| p.display().to_string()),
                allowed_schemes: self.allowed_schemes(),
            }))?;

        loop {
            match self.transport.recv()? {
                EngineMessage::ReadResource(request) => {
                    let answer = self.answer(&request)?;
                    self.transport.send(&HostMessage::ResourceResult(answer))?;
                }
                EngineMessage::Result(result) => {
                    if result.request_id != request_id {
                        return Err(EngineError::ResultMismatch {
                            expected: request_id,
                            actual: result.request_id,
                        });
                    }
                    return if result.ok {
                        Ok(result.output.unwrap_or_default())
                    } else {
                        Err(EngineError::Evaluation(result.error.unwrap_or_else(|| {
                            EvalDiagnostic::message("evaluation failed")
                        })))
                    };
                }
            }
        }
    }

    /// Resolve one resource callback.
    ///
    /// Malformed URIs and unregistered schemes are answered as failed
    /// resources and left to the engine's own error handling; a handler
    /// failure (decryption, archive read) aborts the session.
    fn answer(&self, request: &ResourceRequest) -> Result<ResourceResult, EngineError> {
        let uri = match ResourceUri::parse(&request.uri) {
            Ok(uri) => uri,
            Err(err) => return Ok(ResourceResult::failure(request.resource_id, err.to_string())),
        };
        let handler = match self.handlers.get(uri.scheme.as_str()) {
            Some(handler) => handler,
            None => {
                return Ok(ResourceResult::failure(
                    request.resource_id,
                    format!("no resource handler for scheme '{}'", uri.scheme),
                ))
            }
        };
        let bytes = handler.resolve(&uri)?;
        Ok(ResourceResult::success(request.resource_id, &bytes))
    }
}
