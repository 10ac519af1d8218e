//! Engine transport layer.
//!
//! Abstracts the engine connection so sessions can be driven against a real
//! subprocess or an in-process mock.

use std::io::{BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use strata_protocol::{read_message, write_message, EngineMessage, HostMessage, ProtocolError};

use super::EngineError;

/// Bidirectional message channel to an evaluation engine.
pub trait EngineTransport {
    /// Send one message to the engine.
    fn send(&mut self, message: &HostMessage) -> Result<(), ProtocolError>;

    /// Receive the engine's next message, blocking until one arrives.
    fn recv(&mut self) -> Result<EngineMessage, ProtocolError>;
}

/// Transport over a spawned engine subprocess.
///
/// Messages travel as line-delimited JSON on the child's stdin/stdout; the
/// child's stderr passes through to the operator. The child is killed and
/// reaped when the transport drops, so an abandoned or failed session never
/// leaks the engine sandbox.
pub struct ProcessTransport {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl ProcessTransport {
    /// Spawn `program` with `args` and attach to its stdio.
    pub fn spawn(program: &str, args: &[String]) -> Result<Self, EngineError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| EngineError::Spawn {
                program: program.to_string(),
                source,
            })?;

        let stdin = child.stdin.take().ok_or_else(|| EngineError::Spawn {
            program: program.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "no stdin handle"),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| EngineError::Spawn {
            program: program.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "no stdout handle"),
        })?;

        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }
}

impl EngineTransport for ProcessTransport {
    fn send(&mut self, message: &HostMessage) -> Result<(), ProtocolError> {
        write_message(&mut self.stdin, message)?;
        self.stdin.flush()?;
        Ok(())
    }

    fn recv(&mut self) -> Result<EngineMessage, ProtocolError> {
        read_message(&mut self.stdout)
    }
}

impl Drop for ProcessTransport {
    fn drop(&mut self) {
        // Best effort: the child may already have exited.
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
