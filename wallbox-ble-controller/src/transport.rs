//! Transport seam between the protocol engine and a BLE stack
//!
//! A [`Connector`] knows how to reach one fixed charger. Each successful
//! [`Connector::connect`] yields a [`Session`]: a [`Link`] for writing
//! frames plus the stream of notification chunks from the TX
//! characteristic. The chunk stream ending is the disconnect signal.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::TransportError;

/// An open connection to the charger
#[async_trait]
pub trait Link: Send + Sync {
    /// Write one frame to the RX characteristic
    async fn write(&self, frame: &[u8], with_response: bool) -> Result<(), TransportError>;

    /// Whether the underlying stack still considers the link up
    fn is_connected(&self) -> bool;

    /// Optional pairing/bonding step, run once right after connecting.
    /// Failure is tolerated by the caller.
    async fn pair(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError>;
}

/// A connected link and its inbound notification chunks
pub struct Session {
    pub link: Arc<dyn Link>,
    pub notifications: mpsc::Receiver<Vec<u8>>,
}

/// Opens sessions to one charger
#[async_trait]
pub trait Connector: Send + Sync {
    /// The charger this connector targets, for logs
    fn target(&self) -> &str;

    async fn connect(&self) -> Result<Session, TransportError>;
}
