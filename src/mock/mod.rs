//! In-process engine mock and plaintext decryptor.
//!
//! `MockEngine` implements the engine side of the wire protocol as a
//! turn-based state machine, so sessions exercise the full callback loop
//! without spawning a subprocess. It backs the test suites and the
//! `--engine mock` escape hatch for environments without an engine binary.
//!
//! Module semantics are deliberately tiny: the module file's text is the
//! output, with every `{{ scheme://... }}` directive replaced by the bytes
//! of that resource, requested through the regular `read_resource`
//! callbacks. Directives whose scheme is not in the request's allow-list
//! fail evaluation, the way the real engine rejects them.

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::Path;

use regex_lite::Regex;

use strata_protocol::{
    EngineMessage, EvalDiagnostic, EvaluateResult, HostMessage, ProtocolError, ResourceRequest,
};

use crate::engine::EngineTransport;
use crate::secrets::{ContentHint, DecryptError, Decryptor};

/// Decryptor that treats every file as already decrypted.
///
/// Lets fixtures stand in for encrypted material: the "decrypted" payload is
/// simply the file's contents.
pub struct StaticDecryptor;

impl Decryptor for StaticDecryptor {
    fn decrypt(&self, path: &Path, _hint: ContentHint) -> Result<Vec<u8>, DecryptError> {
        fs::read(path).map_err(|source| DecryptError::Read {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// One queued resource callback.
#[derive(Debug)]
struct PendingResource {
    id: u64,
    placeholder: String,
    uri: String,
}

/// Engine-side state machine for one evaluate conversation.
#[derive(Debug, Default)]
pub struct MockEngine {
    request_id: Option<String>,
    template: String,
    project_dir: Option<String>,
    pending: VecDeque<PendingResource>,
    awaiting: HashMap<u64, String>,
    substitutions: Vec<(String, String)>,
    failure: Option<EvalDiagnostic>,
    next_id: u64,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Project directory of the last evaluate request, if any.
    pub fn project_dir(&self) -> Option<&str> {
        self.project_dir.as_deref()
    }

    fn accept(&mut self, message: &HostMessage) -> Result<(), ProtocolError> {
        match message {
            HostMessage::Evaluate(request) => {
                self.request_id = Some(request.request_id.clone());
                self.project_dir = request.project_dir.clone();
                match fs::read_to_string(&request.module) {
                    Ok(text) => {
                        self.template = text;
                        self.scan_directives(&request.allowed_schemes);
                    }
                    Err(err) => {
                        self.failure = Some(EvalDiagnostic::message(format!(
                            "cannot read module '{}': {}",
                            request.module, err
                        )));
                    }
                }
                Ok(())
            }
            HostMessage::ResourceResult(result) => {
                let placeholder = self.awaiting.remove(&result.resource_id);
                if !result.ok {
                    self.failure = Some(EvalDiagnostic::message(
                        result
                            .error
                            .clone()
                            .unwrap_or_else(|| "resource read failed".to_string()),
                    ));
                    return Ok(());
                }
                let bytes = result.data_bytes()?.unwrap_or_default();
                if let Some(placeholder) = placeholder {
                    self.substitutions
                        .push((placeholder, String::from_utf8_lossy(&bytes).into_owned()));
                }
                Ok(())
            }
        }
    }

    fn next_message(&mut self) -> Result<EngineMessage, ProtocolError> {
        let request_id = match &self.request_id {
            Some(id) => id.clone(),
            None => return Err(ProtocolError::Disconnected),
        };

        if let Some(diag) = self.failure.take() {
            return Ok(EngineMessage::Result(EvaluateResult::failure(
                request_id, diag,
            )));
        }

        if let Some(resource) = self.pending.pop_front() {
            self.awaiting.insert(resource.id, resource.placeholder);
            return Ok(EngineMessage::ReadResource(ResourceRequest {
                resource_id: resource.id,
                uri: resource.uri,
            }));
        }

        let mut output = self.template.clone();
        for (placeholder, text) in &self.substitutions {
            output = output.replace(placeholder, text);
        }
        Ok(EngineMessage::Result(EvaluateResult::success(
            request_id, output,
        )))
    }

    fn scan_directives(&mut self, allowed_schemes: &[String]) {
        let pattern = Regex::new(r"\{\{\s*([^}\s]+)\s*\}\}").expect("directive pattern");
        let template = self.template.clone();
        let mut seen: Vec<String> = Vec::new();
        for captures in pattern.captures_iter(&template) {
            let placeholder = captures.get(0).map(|m| m.as_str()).unwrap_or_default();
            let uri = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
            if seen.iter().any(|s| s == placeholder) {
                continue;
            }
            seen.push(placeholder.to_string());

            let scheme = match uri.split_once("://") {
                Some((scheme, _)) if !scheme.is_empty() => scheme,
                _ => {
                    self.failure = Some(EvalDiagnostic::message(format!(
                        "invalid resource reference '{}'",
                        uri
                    )));
                    return;
                }
            };
            if !allowed_schemes.iter().any(|s| s == scheme) {
                self.failure = Some(EvalDiagnostic::message(format!(
                    "resource scheme '{}' is not allowed",
                    scheme
                )));
                return;
            }

            self.next_id += 1;
            self.pending.push_back(PendingResource {
                id: self.next_id,
                placeholder: placeholder.to_string(),
                uri: uri.to_string(),
            });
        }
    }
}

/// Transport connecting a session directly to a [`MockEngine`].
#[derive(Debug, Default)]
pub struct MockTransport {
    engine: MockEngine,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing engine (e.g. one preconfigured by a test).
    pub fn with_engine(engine: MockEngine) -> Self {
        Self { engine }
    }

    /// The underlying engine, for test inspection.
    pub fn engine(&self) -> &MockEngine {
        &self.engine
    }
}

impl EngineTransport for MockTransport {
    fn send(&mut self, message: &HostMessage) -> Result<(), ProtocolError> {
        self.engine.accept(message)
    }

    fn recv(&mut self) -> Result<EngineMessage, ProtocolError> {
        self.engine.next_message()
    }
}
