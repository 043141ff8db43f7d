//! Wallbox wire protocol - request framing and response parsing
//!
//! Requests travel host -> charger as framed JSON:
//!
//! ```text
//! "EaE" | len (1 byte) | {"met":..,"par":..,"id":..} | checksum (1 byte)
//! ```
//!
//! where the checksum is the sum of every preceding byte modulo 256.
//! Responses travel charger -> host as bare JSON (`{"id":..,"r":..}`) split
//! across any number of notifications, with no framing at all; a response
//! is complete once the accumulated bytes parse.

pub mod assembler;
pub mod ble;
pub mod methods;
pub mod status;

pub use assembler::InboundAssembler;
pub use methods::{Method, UnknownMethod};
pub use status::ChargerStatus;

use serde_json::Value as JsonValue;

/// Frame preamble
pub const MAGIC: &[u8; 3] = b"EaE";

/// Magic plus the length byte
pub const HEADER_LEN: usize = 4;

/// The length byte caps the JSON payload
pub const MAX_PAYLOAD_LEN: usize = u8::MAX as usize;

/// Request ids are drawn from this range
pub const MIN_REQUEST_ID: u16 = 1;
pub const MAX_REQUEST_ID: u16 = 999;

#[derive(thiserror::Error, Debug)]
pub enum FrameError {
    #[error("payload is {0} bytes, a frame carries at most 255")]
    PayloadTooLarge(usize),
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame too short ({0} bytes)")]
    TooShort(usize),
    #[error("frame does not start with EaE")]
    BadMagic,
    #[error("length byte says {declared} payload bytes, frame carries {actual}")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("checksum mismatch: trailer 0x{actual:02x}, computed 0x{expected:02x}")]
    ChecksumMismatch { expected: u8, actual: u8 },
}

/// Request as serialized into the frame payload. Field order is the wire
/// key order.
#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, PartialEq)]
pub struct Request {
    #[serde(rename = "met")]
    pub method: String,
    #[serde(rename = "par", default)]
    pub parameter: JsonValue,
    pub id: u16,
}

impl Request {
    pub fn new(method: &str, parameter: JsonValue, id: u16) -> Self {
        Self { method: method.to_string(), parameter, id }
    }

    pub fn to_frame(&self) -> Result<Vec<u8>, FrameError> {
        encode(self)
    }
}

/// A complete response pulled out of the notification stream
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedResponse {
    pub id: i64,
    /// The `r` field; `Null` for acknowledgement-only replies
    pub value: JsonValue,
}

/// Outcome of trying to read a response out of accumulated bytes
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Response(ParsedResponse),
    /// Not valid JSON yet, more bytes are needed
    Incomplete,
    /// Valid JSON that is not a response (no integer `id`); appending more
    /// bytes can never turn it into one
    Unusable,
}

/// Sum of all bytes modulo 256
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Encode a request into a complete outbound frame
pub fn encode(request: &Request) -> Result<Vec<u8>, FrameError> {
    let payload = serde_json::to_vec(request)?;
    let len = u8::try_from(payload.len()).map_err(|_| FrameError::PayloadTooLarge(payload.len()))?;

    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len() + 1);
    buf.extend_from_slice(MAGIC);
    buf.push(len);
    buf.extend_from_slice(&payload);
    buf.push(checksum(&buf));
    Ok(buf)
}

/// Check that the trailing byte matches the checksum of the rest
pub fn verify_frame(frame: &[u8]) -> bool {
    match frame.split_last() {
        Some((trailer, body)) => checksum(body) == *trailer,
        None => false,
    }
}

/// Parse an outbound frame back into its request, validating magic, length
/// and checksum
pub fn decode_frame(frame: &[u8]) -> Result<Request, FrameError> {
    if frame.len() < HEADER_LEN + 1 {
        return Err(FrameError::TooShort(frame.len()));
    }
    if &frame[..MAGIC.len()] != MAGIC {
        return Err(FrameError::BadMagic);
    }

    let declared = frame[3] as usize;
    let actual = frame.len() - HEADER_LEN - 1;
    if declared != actual {
        return Err(FrameError::LengthMismatch { declared, actual });
    }

    let (trailer, body) = (frame[frame.len() - 1], &frame[..frame.len() - 1]);
    let expected = checksum(body);
    if expected != trailer {
        return Err(FrameError::ChecksumMismatch { expected, actual: trailer });
    }

    Ok(serde_json::from_slice(&frame[HEADER_LEN..HEADER_LEN + declared])?)
}

/// Classify accumulated inbound bytes
pub fn decode_response(buffer: &[u8]) -> Decoded {
    let value: JsonValue = match serde_json::from_slice(buffer) {
        Ok(v) => v,
        // chunk boundaries are arbitrary, a parse error only means "not yet"
        Err(_) => return Decoded::Incomplete,
    };

    let JsonValue::Object(mut map) = value else {
        return Decoded::Unusable;
    };
    match map.get("id").and_then(JsonValue::as_i64) {
        Some(id) => Decoded::Response(ParsedResponse {
            id,
            value: map.remove("r").unwrap_or(JsonValue::Null),
        }),
        None => Decoded::Unusable,
    }
}

/// Try to read one response out of `buffer`; `None` means "not yet"
pub fn try_decode(buffer: &[u8]) -> Option<ParsedResponse> {
    match decode_response(buffer) {
        Decoded::Response(response) => Some(response),
        Decoded::Incomplete | Decoded::Unusable => None,
    }
}
