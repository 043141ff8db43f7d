//! Connection lifecycle for one charger
//!
//! A background task owns the transport: it connects, forwards inbound
//! chunks, notices the link going away and reconnects after a fixed delay,
//! forever. Everyone else sees the connection only through
//! [`ConnectionManager`], which publishes the current state and offers
//! `send`, never the raw link.
//!
//! Notification chunks travel over a bounded queue and may be dropped when
//! it is full. Link loss is never queued: it is part of the published state,
//! and every connection gets a new session number so a waiter can tell its
//! own link went away even if a reconnect already happened.

use std::sync::Arc;
use std::time::Duration;

use log::*;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;

use crate::transport::{Connector, Link, Session};
use crate::{ProtocolError, TransportError};

/// Inbound chunks are dropped (with a log line) once this many are queued
const INBOUND_QUEUE: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

#[derive(Clone)]
struct Slot {
    state: ConnectionState,
    link: Option<Arc<dyn Link>>,
    session: u64,
}

impl Slot {
    fn ready_link(&self) -> Option<&Arc<dyn Link>> {
        match (&self.state, &self.link) {
            (ConnectionState::Connected, Some(link)) if link.is_connected() => Some(link),
            _ => None,
        }
    }
}

pub struct ConnectionManager {
    slot: watch::Receiver<Slot>,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    /// Start the connection loop. Must be called from within a tokio
    /// runtime. The returned receiver carries the inbound notification
    /// chunks; it is the only subscription point.
    pub fn spawn<C>(connector: C, reconnect_delay: Duration) -> (Self, mpsc::Receiver<Vec<u8>>)
    where
        C: Connector + 'static,
    {
        let initial = Slot { state: ConnectionState::Disconnected, link: None, session: 0 };
        let (slot_tx, slot_rx) = watch::channel(initial);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (events_tx, events_rx) = mpsc::channel(INBOUND_QUEUE);

        let worker = Worker {
            connector,
            slot: slot_tx,
            chunks: events_tx,
            shutdown: shutdown_rx,
            reconnect_delay,
            session: 0,
        };
        let task = tokio::spawn(worker.run());

        let manager = Self {
            slot: slot_rx,
            shutdown: shutdown_tx,
            task: Mutex::new(Some(task)),
        };
        (manager, events_rx)
    }

    pub fn state(&self) -> ConnectionState {
        self.slot.borrow().state
    }

    /// Connected, and the transport agrees
    pub fn is_ready(&self) -> bool {
        self.slot.borrow().ready_link().is_some()
    }

    /// Number of the current session, if ready
    pub fn session(&self) -> Option<u64> {
        let slot = self.slot.borrow();
        slot.ready_link().map(|_| slot.session)
    }

    /// Resolves once `session` is no longer the connected session, or the
    /// manager is gone
    pub async fn lost(&self, session: u64) {
        let mut slot = self.slot.clone();
        let _ = slot
            .wait_for(|s| s.session != session || s.state != ConnectionState::Connected)
            .await;
    }

    /// Wait until the connection is ready. Fails only once the manager
    /// has shut down.
    pub async fn wait_ready(&self) -> Result<(), ProtocolError> {
        let mut slot = self.slot.clone();
        slot.wait_for(|s| s.ready_link().is_some())
            .await
            .map(|_| ())
            .map_err(|_| ProtocolError::NotConnected)
    }

    /// State transitions, for observers
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        let mut slot = self.slot.clone();
        let (tx, rx) = watch::channel(slot.borrow_and_update().state);
        tokio::spawn(async move {
            while slot.changed().await.is_ok() {
                let state = slot.borrow_and_update().state;
                if tx.send(state).is_err() {
                    break;
                }
            }
        });
        rx
    }

    /// Write a frame to the charger, bounded by `timeout`
    pub async fn send(&self, frame: &[u8], timeout: Duration) -> Result<(), ProtocolError> {
        let link = self
            .slot
            .borrow()
            .ready_link()
            .cloned()
            .ok_or(ProtocolError::NotConnected)?;

        match tokio::time::timeout(timeout, link.write(frame, true)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ProtocolError::SendFailed(e)),
            Err(_) => Err(ProtocolError::SendFailed(TransportError::WriteTimeout(timeout))),
        }
    }

    /// Stop the connection loop and disconnect
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);
        if let Some(task) = self.task.lock().await.take() {
            if let Err(e) = task.await {
                warn!("Connection task ended abnormally: {e}");
            }
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    // an error means the manager is gone, which is a stop as well
    let _ = shutdown.wait_for(|stop| *stop).await;
}

struct Worker<C> {
    connector: C,
    slot: watch::Sender<Slot>,
    chunks: mpsc::Sender<Vec<u8>>,
    shutdown: watch::Receiver<bool>,
    reconnect_delay: Duration,
    /// Bumped on every successful connect
    session: u64,
}

impl<C: Connector> Worker<C> {
    async fn run(mut self) {
        loop {
            self.set(ConnectionState::Connecting, None);
            info!("Connecting to {}...", self.connector.target());

            let attempt = tokio::select! {
                attempt = self.connector.connect() => attempt,
                _ = stopped(&mut self.shutdown) => {
                    self.set(ConnectionState::Disconnected, None);
                    return;
                }
            };

            match attempt {
                Ok(session) => {
                    if !self.serve(session).await {
                        return;
                    }
                }
                Err(e) => {
                    debug!("Connection attempt failed: {e}");
                    self.set(ConnectionState::Disconnected, None);
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.reconnect_delay) => {}
                _ = stopped(&mut self.shutdown) => return,
            }
        }
    }

    /// Run one connected session. Returns false when shutting down.
    async fn serve(&mut self, session: Session) -> bool {
        let Session { link, mut notifications } = session;

        if let Err(e) = link.pair().await {
            warn!("Pairing failed, continuing without it: {e}");
        }

        self.session += 1;
        self.set(ConnectionState::Connected, Some(link.clone()));
        info!("Connected to {}", self.connector.target());

        loop {
            tokio::select! {
                chunk = notifications.recv() => match chunk {
                    Some(chunk) => self.forward(chunk),
                    None => break,
                },
                _ = stopped(&mut self.shutdown) => {
                    self.set(ConnectionState::Disconnecting, Some(link.clone()));
                    if let Err(e) = link.disconnect().await {
                        debug!("Disconnect failed: {e}");
                    }
                    self.set(ConnectionState::Disconnected, None);
                    return false;
                }
            }
        }

        self.set(ConnectionState::Disconnected, None);
        info!("Disconnected from {}", self.connector.target());
        true
    }

    fn set(&self, state: ConnectionState, link: Option<Arc<dyn Link>>) {
        self.slot.send_replace(Slot { state, link, session: self.session });
    }

    fn forward(&self, chunk: Vec<u8>) {
        if let Err(mpsc::error::TrySendError::Full(chunk)) = self.chunks.try_send(chunk) {
            debug!("Inbound queue full, dropping {} bytes", chunk.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeCharger;

    const RECONNECT: Duration = Duration::from_millis(20);

    #[tokio::test]
    async fn connects_and_becomes_ready() {
        let charger = FakeCharger::new();
        let (manager, _events) = ConnectionManager::spawn(charger.connector(), RECONNECT);

        tokio::time::timeout(Duration::from_secs(1), manager.wait_ready())
            .await
            .unwrap()
            .unwrap();
        assert!(manager.is_ready());
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert_eq!(charger.connects(), 1);
    }

    #[tokio::test]
    async fn not_ready_while_unreachable() {
        let charger = FakeCharger::new();
        charger.set_reachable(false);
        let (manager, _events) = ConnectionManager::spawn(charger.connector(), RECONNECT);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!manager.is_ready());
        assert!(matches!(
            manager.send(b"EaE", Duration::from_secs(1)).await,
            Err(ProtocolError::NotConnected)
        ));
        // keeps retrying
        assert!(charger.attempts() >= 2);
    }

    #[tokio::test]
    async fn reconnects_after_loss() {
        let charger = FakeCharger::new();
        let (manager, _events) = ConnectionManager::spawn(charger.connector(), RECONNECT);
        manager.wait_ready().await.unwrap();
        let first = manager.session().unwrap();

        charger.drop_link();
        tokio::time::timeout(Duration::from_secs(1), manager.lost(first))
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(1), async {
            while charger.connects() < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        manager.wait_ready().await.unwrap();
        assert!(manager.is_ready());
        assert!(manager.session().unwrap() > first);
    }

    #[tokio::test]
    async fn forwards_notifications() {
        let charger = FakeCharger::new();
        let (manager, mut events) = ConnectionManager::spawn(charger.connector(), RECONNECT);
        manager.wait_ready().await.unwrap();

        charger.notify(b"{\"id\":1".to_vec()).await;
        assert_eq!(events.recv().await, Some(b"{\"id\":1".to_vec()));
    }

    #[tokio::test]
    async fn link_reporting_down_is_not_ready() {
        let charger = FakeCharger::new();
        let (manager, _events) = ConnectionManager::spawn(charger.connector(), RECONNECT);
        manager.wait_ready().await.unwrap();

        charger.set_link_up(false);
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert!(!manager.is_ready());
    }

    #[tokio::test]
    async fn shutdown_disconnects() {
        let charger = FakeCharger::new();
        let (manager, _events) = ConnectionManager::spawn(charger.connector(), RECONNECT);
        manager.wait_ready().await.unwrap();

        manager.shutdown().await;
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(!manager.is_ready());
        assert_eq!(charger.disconnects(), 1);
    }

    #[tokio::test]
    async fn pairing_failure_still_connects() {
        let charger = FakeCharger::new();
        charger.fail_pair(true);
        let (manager, _events) = ConnectionManager::spawn(charger.connector(), RECONNECT);

        tokio::time::timeout(Duration::from_secs(1), manager.wait_ready())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert_eq!(charger.pair_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_every_reconnect_delay() {
        let charger = FakeCharger::new();
        charger.set_reachable(false);
        let (_manager, _events) = ConnectionManager::spawn(charger.connector(), Duration::from_secs(1));

        // attempts at 0, 1, 2 and 3 seconds
        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(charger.attempts(), 4);
    }

    #[tokio::test]
    async fn loss_is_reported_with_a_full_queue() {
        let charger = FakeCharger::new();
        let (manager, _events) = ConnectionManager::spawn(charger.connector(), RECONNECT);
        manager.wait_ready().await.unwrap();
        let session = manager.session().unwrap();

        // nobody reads the queue, so it overflows
        for _ in 0..INBOUND_QUEUE + 44 {
            charger.notify(b"x".to_vec()).await;
        }
        charger.drop_link();

        tokio::time::timeout(Duration::from_secs(1), manager.lost(session))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn state_transitions_are_observable() {
        let charger = FakeCharger::new();
        charger.set_reachable(false);
        let (manager, _events) = ConnectionManager::spawn(charger.connector(), RECONNECT);
        let mut states = manager.watch_state();

        charger.set_reachable(true);
        tokio::time::timeout(Duration::from_secs(1), states.wait_for(|s| *s == ConnectionState::Connected))
            .await
            .unwrap()
            .unwrap();
    }
}
