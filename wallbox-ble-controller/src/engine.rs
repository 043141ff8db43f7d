//! Protocol engine
//!
//! Composition root: owns the connection loop and the correlator and turns
//! raw replies into typed values. It also keeps a snapshot of the last
//! fetched values for consumers that only read state.

use std::sync::Arc;

use log::*;
use serde_json::{Value as JsonValue, json};
use tokio::sync::watch;
use wallbox_proto::{ChargerStatus, InboundAssembler, Method};

use crate::ProtocolError;
use crate::config::EngineConfig;
use crate::connection::{ConnectionManager, ConnectionState};
use crate::correlator::RequestCorrelator;
use crate::transport::Connector;

/// Lowest charging current the charger accepts, in amps
pub const MIN_CHARGE_CURRENT: u32 = 6;

const LOCKED: i64 = ChargerStatus::Locked as i64;
const CHARGING: i64 = ChargerStatus::Charging as i64;
const PAUSED: i64 = ChargerStatus::Paused as i64;

/// Typed reply to `get_status`
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct StatusReport {
    pub status: ChargerStatus,
    pub code: i64,
    /// Current the charger is configured to deliver, in amps
    pub charge_current: Option<u32>,
    /// The full reply, which carries many more fields than the above
    pub raw: JsonValue,
}

/// Last values fetched from the charger
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct ChargerSnapshot {
    /// Raw status code, kept even when it is not in the status table
    pub status_code: Option<i64>,
    pub charge_current: Option<u32>,
    pub max_charge_current: Option<u32>,
    /// Whether the last refresh succeeded
    pub last_update_ok: bool,
}

impl ChargerSnapshot {
    pub fn status(&self) -> Option<ChargerStatus> {
        self.status_code.and_then(ChargerStatus::from_code)
    }

    pub fn locked(&self) -> bool {
        self.status_code == Some(LOCKED)
    }

    pub fn charging(&self) -> bool {
        self.status_code == Some(CHARGING)
    }

    /// Charging can only be started or stopped while charging or paused
    pub fn charging_controllable(&self) -> bool {
        matches!(self.status_code, Some(CHARGING | PAUSED))
    }
}

pub struct ProtocolEngine {
    connection: Arc<ConnectionManager>,
    correlator: RequestCorrelator,
    snapshot: watch::Sender<ChargerSnapshot>,
}

impl ProtocolEngine {
    /// Start connecting to the charger behind `connector`. Returns at once;
    /// use [`wait_ready`](Self::wait_ready) to wait for the link.
    pub fn start<C>(connector: C, config: &EngineConfig) -> Self
    where
        C: Connector + 'static,
    {
        let (connection, chunks) = ConnectionManager::spawn(connector, config.reconnect_delay());
        let connection = Arc::new(connection);
        let correlator = RequestCorrelator::new(
            connection.clone(),
            chunks,
            InboundAssembler::with_limit(config.max_inbound_buffer),
            config.write_timeout(),
            config.response_timeout(),
        );
        let (snapshot, _) = watch::channel(ChargerSnapshot::default());

        Self { connection, correlator, snapshot }
    }

    pub fn is_ready(&self) -> bool {
        self.connection.is_ready()
    }

    pub async fn wait_ready(&self) -> Result<(), ProtocolError> {
        self.connection.wait_ready().await
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.connection.watch_state()
    }

    /// Send any command from the method table
    pub async fn command(&self, method: Method, parameter: JsonValue) -> Result<JsonValue, ProtocolError> {
        self.correlator.execute(method.opcode(), parameter).await
    }

    pub async fn get_status(&self) -> Result<StatusReport, ProtocolError> {
        let raw = self.command(Method::GetStatus, JsonValue::Null).await?;

        let code = raw
            .get("st")
            .and_then(JsonValue::as_i64)
            .ok_or_else(|| malformed(Method::GetStatus, &raw))?;
        let charge_current = raw.get("cur").and_then(as_amps);

        self.snapshot.send_modify(|s| {
            s.status_code = Some(code);
            if charge_current.is_some() {
                s.charge_current = charge_current;
            }
        });

        let status = ChargerStatus::from_code(code).ok_or(ProtocolError::UnknownStatus(code))?;
        Ok(StatusReport { status, code, charge_current, raw })
    }

    pub async fn set_locked(&self, locked: bool) -> Result<(), ProtocolError> {
        self.command(Method::Lock, json!(u8::from(locked))).await?;
        info!("Charger {}", if locked { "locked" } else { "unlocked" });
        Ok(())
    }

    /// Maximum current the installation allows, in amps
    pub async fn get_max_current(&self) -> Result<u32, ProtocolError> {
        let raw = self.command(Method::GetMaxAvailableCurrent, JsonValue::Null).await?;
        let amps = as_amps(&raw).ok_or_else(|| malformed(Method::GetMaxAvailableCurrent, &raw))?;
        self.snapshot.send_modify(|s| s.max_charge_current = Some(amps));
        Ok(amps)
    }

    /// Set the charging current. Must be at least [`MIN_CHARGE_CURRENT`]
    /// and, once known, no more than the maximum available current.
    pub async fn set_max_current(&self, amps: u32) -> Result<(), ProtocolError> {
        if amps < MIN_CHARGE_CURRENT {
            return Err(ProtocolError::InvalidParameter(format!(
                "{amps} A is below the minimum of {MIN_CHARGE_CURRENT} A"
            )));
        }
        let max = self.snapshot.borrow().max_charge_current;
        if let Some(max) = max.filter(|max| amps > *max) {
            return Err(ProtocolError::InvalidParameter(format!(
                "{amps} A exceeds the maximum available {max} A"
            )));
        }

        self.command(Method::SetMaxChargingCurrent, json!(amps)).await?;
        self.snapshot.send_modify(|s| s.charge_current = Some(amps));
        Ok(())
    }

    pub async fn set_charging(&self, charging: bool) -> Result<(), ProtocolError> {
        self.command(Method::StartStopCharging, json!(u8::from(charging))).await?;
        Ok(())
    }

    /// Fetch status and maximum current, updating the snapshot
    pub async fn refresh(&self) -> Result<ChargerSnapshot, ProtocolError> {
        let result = async {
            self.get_status().await?;
            self.get_max_current().await
        }
        .await;

        let ok = result.is_ok();
        self.snapshot.send_modify(|s| s.last_update_ok = ok);
        result.map(|_| self.snapshot())
    }

    pub fn snapshot(&self) -> ChargerSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn watch_snapshot(&self) -> watch::Receiver<ChargerSnapshot> {
        self.snapshot.subscribe()
    }

    /// Ready and the last refresh succeeded
    pub fn available(&self) -> bool {
        self.is_ready() && self.snapshot.borrow().last_update_ok
    }

    pub async fn shutdown(&self) {
        self.connection.shutdown().await;
    }
}

fn as_amps(value: &JsonValue) -> Option<u32> {
    value
        .as_u64()
        .or_else(|| value.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
        .and_then(|v| u32::try_from(v).ok())
}

fn malformed(method: Method, reply: &JsonValue) -> ProtocolError {
    ProtocolError::MalformedReply { method: method.opcode(), reply: reply.clone() }
}
