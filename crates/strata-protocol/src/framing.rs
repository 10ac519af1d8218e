//! Line-delimited JSON framing.
//!
//! One message per line. Works over any `Write`/`BufRead` pair so the same
//! helpers serve the subprocess transport and in-memory test streams.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{BufRead, Write};

use crate::error::ProtocolError;

/// Serialize `message` and write it as a single line.
pub fn write_message<W: Write, T: Serialize>(
    writer: &mut W,
    message: &T,
) -> Result<(), ProtocolError> {
    let json = serde_json::to_string(message)?;
    writeln!(writer, "{}", json)?;
    writer.flush()?;
    Ok(())
}

/// Read one line and parse it as a message.
///
/// EOF before a complete line means the peer went away
/// ([`ProtocolError::Disconnected`]).
pub fn read_message<R: BufRead, T: DeserializeOwned>(reader: &mut R) -> Result<T, ProtocolError> {
    let mut line = String::new();
    let read = reader.read_line(&mut line)?;
    if read == 0 {
        return Err(ProtocolError::Disconnected);
    }
    Ok(serde_json::from_str(line.trim_end())?)
}
