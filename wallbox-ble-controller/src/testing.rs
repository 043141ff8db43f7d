//! Simulated charger for tests
//!
//! Decodes the real frames written by the engine and answers through the
//! notification channel, optionally split into small chunks.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use wallbox_proto::{Request, decode_frame};

use crate::TransportError;
use crate::transport::{Connector, Link, Session};

type Responder = Box<dyn Fn(&Request) -> Vec<Vec<u8>> + Send + Sync>;

struct SessionHandle {
    notify: mpsc::Sender<Vec<u8>>,
    up: Arc<AtomicBool>,
}

struct Inner {
    reachable: AtomicBool,
    attempts: AtomicUsize,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
    fail_writes: AtomicBool,
    fail_pair: AtomicBool,
    pair_attempts: AtomicUsize,
    write_delay: Mutex<Option<Duration>>,
    session: Mutex<Option<SessionHandle>>,
    responder: Mutex<Responder>,
    requests: Mutex<Vec<Request>>,
}

#[derive(Clone)]
pub(crate) struct FakeCharger {
    inner: Arc<Inner>,
}

/// `{"id":<id>,"r":<value>}` as one chunk
pub(crate) fn reply(id: u16, value: serde_json::Value) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({"id": id, "r": value})).unwrap()
}

/// Split a document into notification-sized pieces
pub(crate) fn chunked(doc: Vec<u8>, size: usize) -> Vec<Vec<u8>> {
    doc.chunks(size).map(|c| c.to_vec()).collect()
}

impl FakeCharger {
    /// A reachable charger that acknowledges every request with `null`
    pub(crate) fn new() -> Self {
        let inner = Inner {
            reachable: AtomicBool::new(true),
            attempts: AtomicUsize::new(0),
            connects: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
            fail_writes: AtomicBool::new(false),
            fail_pair: AtomicBool::new(false),
            pair_attempts: AtomicUsize::new(0),
            write_delay: Mutex::new(None),
            session: Mutex::new(None),
            responder: Mutex::new(Box::new(|req: &Request| {
                vec![reply(req.id, serde_json::Value::Null)]
            })),
            requests: Mutex::new(Vec::new()),
        };
        Self { inner: Arc::new(inner) }
    }

    pub(crate) fn connector(&self) -> FakeConnector {
        FakeConnector { inner: self.inner.clone() }
    }

    pub(crate) fn respond_with<F>(&self, responder: F)
    where
        F: Fn(&Request) -> Vec<Vec<u8>> + Send + Sync + 'static,
    {
        *self.inner.responder.lock().unwrap() = Box::new(responder);
    }

    pub(crate) fn set_reachable(&self, reachable: bool) {
        self.inner.reachable.store(reachable, Ordering::SeqCst);
    }

    pub(crate) fn set_link_up(&self, up: bool) {
        if let Some(session) = self.inner.session.lock().unwrap().as_ref() {
            session.up.store(up, Ordering::SeqCst);
        }
    }

    pub(crate) fn fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make the pairing step after connecting fail
    pub(crate) fn fail_pair(&self, fail: bool) {
        self.inner.fail_pair.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn set_write_delay(&self, delay: Duration) {
        *self.inner.write_delay.lock().unwrap() = Some(delay);
    }

    /// Simulate the charger going out of range
    pub(crate) fn drop_link(&self) {
        if let Some(session) = self.inner.session.lock().unwrap().take() {
            session.up.store(false, Ordering::SeqCst);
        }
    }

    /// Push an unsolicited notification
    pub(crate) async fn notify(&self, chunk: Vec<u8>) {
        let sender = self.sender();
        if let Some(sender) = sender {
            sender.send(chunk).await.unwrap();
        }
    }

    pub(crate) fn requests(&self) -> Vec<Request> {
        self.inner.requests.lock().unwrap().clone()
    }

    pub(crate) fn attempts(&self) -> usize {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    pub(crate) fn pair_attempts(&self) -> usize {
        self.inner.pair_attempts.load(Ordering::SeqCst)
    }

    pub(crate) fn connects(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    pub(crate) fn disconnects(&self) -> usize {
        self.inner.disconnects.load(Ordering::SeqCst)
    }

    fn sender(&self) -> Option<mpsc::Sender<Vec<u8>>> {
        self.inner.session.lock().unwrap().as_ref().map(|s| s.notify.clone())
    }
}

pub(crate) struct FakeConnector {
    inner: Arc<Inner>,
}

#[async_trait]
impl Connector for FakeConnector {
    fn target(&self) -> &str {
        "fake charger"
    }

    async fn connect(&self) -> Result<Session, TransportError> {
        self.inner.attempts.fetch_add(1, Ordering::SeqCst);
        if !self.inner.reachable.load(Ordering::SeqCst) {
            return Err(TransportError::DeviceNotFound("fake charger".to_string()));
        }

        let (notify, notifications) = mpsc::channel(64);
        let up = Arc::new(AtomicBool::new(true));
        *self.inner.session.lock().unwrap() = Some(SessionHandle { notify, up: up.clone() });
        self.inner.connects.fetch_add(1, Ordering::SeqCst);

        let link = FakeLink { charger: FakeCharger { inner: self.inner.clone() }, up };
        Ok(Session { link: Arc::new(link), notifications })
    }
}

struct FakeLink {
    charger: FakeCharger,
    up: Arc<AtomicBool>,
}

#[async_trait]
impl Link for FakeLink {
    async fn write(&self, frame: &[u8], _with_response: bool) -> Result<(), TransportError> {
        let inner = &self.charger.inner;
        let delay = *inner.write_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if inner.fail_writes.load(Ordering::SeqCst) || !self.up.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }

        let request = decode_frame(frame).expect("engine wrote an invalid frame");
        let replies = (inner.responder.lock().unwrap())(&request);
        inner.requests.lock().unwrap().push(request);

        if let Some(sender) = self.charger.sender() {
            for chunk in replies {
                let _ = sender.send(chunk).await;
            }
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.up.load(Ordering::SeqCst)
    }

    async fn pair(&self) -> Result<(), TransportError> {
        let inner = &self.charger.inner;
        inner.pair_attempts.fetch_add(1, Ordering::SeqCst);
        if inner.fail_pair.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.charger.inner.disconnects.fetch_add(1, Ordering::SeqCst);
        self.charger.drop_link();
        Ok(())
    }
}
