//! Binary CBOR frame codec for XRPC subscriptions (§4.3).
//!
//! A frame is two concatenated CBOR items: a header, then a body. This
//! mirrors the two-stage "decode one CBOR item, track the cursor position,
//! treat the remainder as the next item" technique used for subscription
//! event headers elsewhere in this lineage of code, generalized from a
//! header-only read to a full header+body pair that also rejects a third
//! trailing item.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use smol_str::SmolStr;

/// The header of a frame: `op = 1` for a message, `op = -1` for an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameHeader {
    pub op: i8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub t: Option<SmolStr>,
}

/// The body of an error frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// A parsed subscription frame (§3 "Frame").
#[derive(Debug, Clone)]
pub enum Frame {
    Message { t: Option<SmolStr>, body: Value },
    Error(FrameErrorBody),
}

#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum FrameError {
    #[error("Missing frame body")]
    MissingBody,
    #[error("Too many CBOR data items in frame")]
    TooManyItems,
    #[error("Invalid frame header")]
    InvalidHeader,
    #[error("Invalid error frame body")]
    InvalidErrorBody,
    #[error("CBOR decode error: {0}")]
    Decode(String),
    #[error("CBOR encode error: {0}")]
    Encode(String),
}

impl Frame {
    /// Decode a frame from the two concatenated CBOR items a subscription
    /// message carries on the wire (§4.3).
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        let mut cursor = std::io::Cursor::new(bytes);

        let header: FrameHeader = ciborium::de::from_reader(&mut cursor)
            .map_err(|_| FrameError::InvalidHeader)?;
        if header.op != 1 && header.op != -1 {
            return Err(FrameError::InvalidHeader);
        }

        let header_end = cursor.position() as usize;
        if header_end == bytes.len() {
            return Err(FrameError::MissingBody);
        }

        let rest = &bytes[header_end..];
        let mut body_cursor = std::io::Cursor::new(rest);
        let body: Value = ciborium::de::from_reader(&mut body_cursor)
            .map_err(|e| FrameError::Decode(e.to_string()))?;
        let body_end = body_cursor.position() as usize;

        if body_end != rest.len() {
            // a third CBOR item follows: reject, but first make sure it's
            // actually parseable garbage and not truncated input (a
            // truncation would have failed the body decode above already).
            let trailing = &rest[body_end..];
            let mut trailing_cursor = std::io::Cursor::new(trailing);
            let extra: Result<ciborium::value::Value, _> =
                ciborium::de::from_reader(&mut trailing_cursor);
            if extra.is_ok() {
                return Err(FrameError::TooManyItems);
            }
            return Err(FrameError::Decode(
                "trailing bytes after frame body".into(),
            ));
        }

        if header.op == -1 {
            let error_body: FrameErrorBody =
                serde_json::from_value(body).map_err(|_| FrameError::InvalidErrorBody)?;
            Ok(Frame::Error(error_body))
        } else {
            Ok(Frame::Message { t: header.t, body })
        }
    }

    /// Serialize a frame back into its two-CBOR-item wire form.
    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        let mut out = Vec::new();
        match self {
            Frame::Message { t, body } => {
                let header = FrameHeader {
                    op: 1,
                    t: t.clone(),
                };
                ciborium::ser::into_writer(&header, &mut out)
                    .map_err(|e| FrameError::Encode(e.to_string()))?;
                ciborium::ser::into_writer(body, &mut out)
                    .map_err(|e| FrameError::Encode(e.to_string()))?;
            }
            Frame::Error(err_body) => {
                let header = FrameHeader { op: -1, t: None };
                ciborium::ser::into_writer(&header, &mut out)
                    .map_err(|e| FrameError::Encode(e.to_string()))?;
                let body = serde_json::to_value(err_body).expect("FrameErrorBody always serializes");
                ciborium::ser::into_writer(&body, &mut out)
                    .map_err(|e| FrameError::Encode(e.to_string()))?;
            }
        }
        Ok(out)
    }

    pub fn message(t: Option<impl Into<SmolStr>>, body: Value) -> Self {
        Frame::Message {
            t: t.map(Into::into),
            body,
        }
    }

    pub fn error(error: impl Into<String>, message: Option<impl Into<String>>) -> Self {
        Frame::Error(FrameErrorBody {
            error: error.into(),
            message: message.map(Into::into),
        })
    }
}
