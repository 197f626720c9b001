//! Wire format for isolation-channel responses.
//!
//! A worker sends exactly one framed message: `<action>,<payload>`
//! followed by [`FRAME_DELIMITER`]. The payload is base64, so neither the
//! comma after the action nor the delimiter (newlines and underscores,
//! both outside the base64 alphabet) can collide with it. Messages carry
//! no length prefix; readers scan for the delimiter.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::error::{Error, Result};

/// Marks the end of a single channel message.
pub const FRAME_DELIMITER: &[u8] = b"\n__REFIT_FRAME_END_DELIMITER__\n";

/// Throw payload used when a worker dies with nothing better to report.
pub const UNKNOWN_ERROR: &str = "Unknown Error";

/// A worker's one-shot response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelMessage {
    /// The callable produced content.
    Return(String),

    /// The callable completed with nothing to return.
    Void,

    /// The callable failed or panicked; carries the message.
    Throw(String),
}

impl ChannelMessage {
    /// Encode this message as a delimited frame ready to write.
    pub fn encode(&self) -> Vec<u8> {
        let mut frame = Vec::new();
        match self {
            ChannelMessage::Return(content) => {
                frame.extend_from_slice(b"return,");
                frame.extend_from_slice(STANDARD.encode(content).as_bytes());
            }
            ChannelMessage::Void => {
                frame.extend_from_slice(b"void,null");
            }
            ChannelMessage::Throw(message) => {
                frame.extend_from_slice(b"throw,");
                frame.extend_from_slice(STANDARD.encode(message).as_bytes());
            }
        }
        frame.extend_from_slice(FRAME_DELIMITER);
        frame
    }

    /// Decode a complete frame (delimiter already stripped).
    ///
    /// Any unknown action, undecodable payload or malformed frame is a
    /// protocol violation and fails with a channel error.
    pub fn decode(frame: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(frame)
            .map_err(|e| Error::Channel(format!("channel frame is not UTF-8: {}", e)))?;
        let Some((action, payload)) = text.split_once(',') else {
            return Err(Error::Channel(format!(
                "malformed channel frame: {:?}",
                text
            )));
        };
        match action {
            "return" => Ok(ChannelMessage::Return(decode_payload(payload)?)),
            "void" => Ok(ChannelMessage::Void),
            "throw" => Ok(ChannelMessage::Throw(decode_payload(payload)?)),
            other => Err(Error::Channel(format!(
                "invalid channel action: {:?}",
                other
            ))),
        }
    }
}

/// Bytes of `buffer` up to the first delimiter, if one has arrived.
pub fn split_frame(buffer: &[u8]) -> Option<&[u8]> {
    buffer
        .windows(FRAME_DELIMITER.len())
        .position(|window| window == FRAME_DELIMITER)
        .map(|at| &buffer[..at])
}

fn decode_payload(payload: &str) -> Result<String> {
    let bytes = STANDARD
        .decode(payload)
        .map_err(|e| Error::Channel(format!("undecodable channel payload: {}", e)))?;
    String::from_utf8(bytes)
        .map_err(|e| Error::Channel(format!("channel payload is not UTF-8: {}", e)))
}
