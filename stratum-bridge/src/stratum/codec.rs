//! Newline framing shared by both transports.
//!
//! One logical message is one JSON object followed by `\n`. A single
//! WebSocket frame may carry several of them, so inbound payloads are
//! re-split here before parsing.

use serde::Serialize;

use crate::error::BridgeResult;

/// Split a payload into message lines.
///
/// Empty and whitespace-only fragments are dropped; order is preserved.
pub fn split_lines(payload: &str) -> impl Iterator<Item = &str> {
    payload.split('\n').filter(|line| !line.trim().is_empty())
}

/// Serialize a message and append the terminating newline.
pub fn encode_line<T: Serialize + ?Sized>(msg: &T) -> BridgeResult<String> {
    let mut line = serde_json::to_string(msg)?;
    line.push('\n');
    Ok(line)
}
