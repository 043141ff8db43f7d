//! Wallbox BLE Controller
//!
//! Protocol engine for Wallbox chargers over their BLE UART service: keeps
//! a connection alive, sends framed requests and matches the replies.
//!
//! # Example
//!
//! ```ignore
//! use wallbox_ble_controller::{EngineConfig, ProtocolEngine, ble::BtleConnector};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = EngineConfig::default();
//!     let connector = BtleConnector::new("WB123456", config.scan_timeout());
//!     let engine = ProtocolEngine::start(connector, &config);
//!     engine.wait_ready().await?;
//!
//!     let report = engine.get_status().await?;
//!     println!("{} ({} A)", report.status, report.charge_current.unwrap_or(0));
//!
//!     engine.set_locked(true).await?;
//!     engine.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod ble;
pub mod config;
pub mod connection;
pub mod correlator;
pub mod engine;
mod error;
pub mod poller;
pub mod transport;

#[cfg(test)]
mod testing;

pub use config::EngineConfig;
pub use connection::{ConnectionManager, ConnectionState};
pub use engine::{ChargerSnapshot, ProtocolEngine, StatusReport};
pub use error::{ProtocolError, TransportError};
pub use poller::spawn_poller;
pub use wallbox_proto::{ChargerStatus, Method};
