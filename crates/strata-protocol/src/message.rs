//! Protocol message types.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ProtocolError;

/// Messages sent by the host to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "msg", rename_all = "snake_case")]
pub enum HostMessage {
    Evaluate(EvaluateRequest),
    ResourceResult(ResourceResult),
}

/// Messages sent by the engine to the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "msg", rename_all = "snake_case")]
pub enum EngineMessage {
    ReadResource(ResourceRequest),
    Result(EvaluateResult),
}

/// Request to evaluate an expression against a module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluateRequest {
    /// Protocol version spoken by the host.
    pub protocol_version: i32,
    /// Host-chosen ID echoed in the final result.
    pub request_id: String,
    /// Absolute path of the module file.
    pub module: String,
    /// Expression to evaluate against the module.
    pub expression: String,
    /// Project scope directory; absent in standalone mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_dir: Option<String>,
    /// Resource schemes the engine may request. Anything else is rejected
    /// engine-side.
    pub allowed_schemes: Vec<String>,
}

/// Engine callback asking the host to resolve a resource URI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRequest {
    /// Engine-chosen ID correlating the host's answer.
    pub resource_id: u64,
    /// The requested `scheme://path#fragment` URI.
    pub uri: String,
}

/// Host answer to a [`ResourceRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceResult {
    /// Echoed from the request.
    pub resource_id: u64,
    /// Whether the resource resolved.
    pub ok: bool,
    /// Base64-encoded payload (present when ok=true).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    /// Single-line failure message (present when ok=false).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResourceResult {
    /// Build a success answer carrying `bytes`.
    pub fn success(resource_id: u64, bytes: &[u8]) -> Self {
        Self {
            resource_id,
            ok: true,
            data: Some(BASE64.encode(bytes)),
            error: None,
        }
    }

    /// Build a failure answer.
    pub fn failure(resource_id: u64, message: impl Into<String>) -> Self {
        Self {
            resource_id,
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }

    /// Decode the payload, if any.
    pub fn data_bytes(&self) -> Result<Option<Vec<u8>>, ProtocolError> {
        match &self.data {
            None => Ok(None),
            Some(encoded) => BASE64
                .decode(encoded)
                .map(Some)
                .map_err(|e| ProtocolError::Encoding(e.to_string())),
        }
    }
}

/// Final outcome of an evaluate request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluateResult {
    /// Echoed from the request.
    pub request_id: String,
    /// Whether evaluation succeeded.
    pub ok: bool,
    /// Rendered output text (present when ok=true).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Engine diagnostic (present when ok=false).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<EvalDiagnostic>,
}

impl EvaluateResult {
    /// Build a success result.
    pub fn success(request_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            ok: true,
            output: Some(output.into()),
            error: None,
        }
    }

    /// Build a failure result.
    pub fn failure(request_id: impl Into<String>, error: EvalDiagnostic) -> Self {
        Self {
            request_id: request_id.into(),
            ok: false,
            output: None,
            error: Some(error),
        }
    }
}

/// Engine-side diagnostic, passed through to the operator unmodified.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalDiagnostic {
    /// Engine error message.
    pub message: String,
    /// Source line, when the engine reports one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    /// Source column, when the engine reports one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
}

impl EvalDiagnostic {
    /// Diagnostic with a message and no source position.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: None,
            column: None,
        }
    }
}

impl fmt::Display for EvalDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.line, self.column) {
            (Some(line), Some(column)) => {
                write!(f, "{} (line {}, column {})", self.message, line, column)
            }
            (Some(line), None) => write!(f, "{} (line {})", self.message, line),
            _ => write!(f, "{}", self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_message_tag() {
        let msg = HostMessage::Evaluate(EvaluateRequest {
            protocol_version: 1,
            request_id: "r-1".to_string(),
            module: "/m.cfg".to_string(),
            expression: "output.text".to_string(),
            project_dir: None,
            allowed_schemes: vec!["secret".to_string()],
        });

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["msg"], "evaluate");
        assert_eq!(json["expression"], "output.text");
        assert!(json.get("project_dir").is_none());
    }

    #[test]
    fn test_engine_message_round_trip() {
        let json = r#"{"msg":"read_resource","resource_id":7,"uri":"secret:///a/b"}"#;
        let msg: EngineMessage = serde_json::from_str(json).unwrap();

        match msg {
            EngineMessage::ReadResource(req) => {
                assert_eq!(req.resource_id, 7);
                assert_eq!(req.uri, "secret:///a/b");
            }
            other => panic!("expected read_resource, got {:?}", other),
        }
    }

    #[test]
    fn test_resource_result_payload_round_trip() {
        let result = ResourceResult::success(3, b"top secret bytes");
        assert!(result.ok);
        assert_eq!(
            result.data_bytes().unwrap().unwrap(),
            b"top secret bytes".to_vec()
        );
    }

    #[test]
    fn test_resource_failure_has_no_data() {
        let result = ResourceResult::failure(4, "decryption failed");
        assert!(!result.ok);
        assert_eq!(result.data_bytes().unwrap(), None);
        assert_eq!(result.error.as_deref(), Some("decryption failed"));
    }

    #[test]
    fn test_diagnostic_display() {
        let diag = EvalDiagnostic {
            message: "unexpected token".to_string(),
            line: Some(12),
            column: Some(4),
        };
        assert_eq!(diag.to_string(), "unexpected token (line 12, column 4)");
        assert_eq!(
            EvalDiagnostic::message("boom").to_string(),
            "boom"
        );
    }
}
