use std::time::Duration;

use wallbox_proto::FrameError;

/// Failures of the link to the charger
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("bluetooth: {0}")]
    Ble(#[from] btleplug::Error),
    #[error("no Bluetooth adapter found")]
    NoAdapter,
    #[error("charger {0} not found")]
    DeviceNotFound(String),
    #[error("characteristic {0} not found")]
    CharacteristicNotFound(uuid::Uuid),
    #[error("write timed out after {0:?}")]
    WriteTimeout(Duration),
    #[error("link closed")]
    Closed,
}

/// Why a request to the charger did not produce a result
///
/// None of these are fatal: the connection loop keeps reconnecting on its
/// own and callers decide whether to retry.
#[derive(thiserror::Error, Debug)]
pub enum ProtocolError {
    #[error("not connected to the charger")]
    NotConnected,
    #[error("could not encode request: {0}")]
    Encoding(#[from] FrameError),
    #[error("sending request failed: {0}")]
    SendFailed(#[source] TransportError),
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("unknown status code {0}")]
    UnknownStatus(i64),
    #[error("malformed reply to {method}: {reply}")]
    MalformedReply { method: &'static str, reply: serde_json::Value },
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}
