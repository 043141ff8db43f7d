//! Request/response correlation
//!
//! Turns one request into an awaited response over the shared link. Only
//! one request is in flight at a time: the inbound chunk queue and the
//! reassembly buffer live behind one async mutex, and holding it is what
//! entitles a caller to reset the buffer and read responses.

use std::sync::Arc;
use std::time::Duration;

use log::*;
use rand::Rng;
use serde_json::Value as JsonValue;
use tokio::sync::{Mutex, mpsc};
use tokio::time::Instant;
use wallbox_proto::{InboundAssembler, MAX_REQUEST_ID, MIN_REQUEST_ID, Request};

use crate::ProtocolError;
use crate::connection::ConnectionManager;

struct Inbox {
    chunks: mpsc::Receiver<Vec<u8>>,
    assembler: InboundAssembler,
}

impl Inbox {
    /// Throw away whatever arrived since the last request
    fn clear(&mut self) {
        let mut dropped = 0;
        while self.chunks.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            debug!("Discarded {dropped} stale inbound chunks");
        }
        self.assembler.reset();
    }
}

pub struct RequestCorrelator {
    connection: Arc<ConnectionManager>,
    inbox: Mutex<Inbox>,
    write_timeout: Duration,
    response_timeout: Duration,
}

impl RequestCorrelator {
    pub fn new(
        connection: Arc<ConnectionManager>,
        chunks: mpsc::Receiver<Vec<u8>>,
        assembler: InboundAssembler,
        write_timeout: Duration,
        response_timeout: Duration,
    ) -> Self {
        Self {
            connection,
            inbox: Mutex::new(Inbox { chunks, assembler }),
            write_timeout,
            response_timeout,
        }
    }

    /// Send `opcode` with `parameter` and wait for the matching reply's `r`
    /// value (`Null` for plain acknowledgements)
    pub async fn execute(&self, opcode: &str, parameter: JsonValue) -> Result<JsonValue, ProtocolError> {
        if !self.connection.is_ready() {
            return Err(ProtocolError::NotConnected);
        }

        let mut inbox = self.inbox.lock().await;
        let session = self.connection.session().ok_or(ProtocolError::NotConnected)?;

        let id = rand::thread_rng().gen_range(MIN_REQUEST_ID..=MAX_REQUEST_ID);
        inbox.clear();

        let frame = Request::new(opcode, parameter, id).to_frame()?;
        debug!("-> {opcode} id={id} ({} bytes)", frame.len());
        self.connection.send(&frame, self.write_timeout).await?;

        let deadline = Instant::now() + self.response_timeout;
        let mut lost = std::pin::pin!(self.connection.lost(session));
        loop {
            let chunk = tokio::select! {
                chunk = inbox.chunks.recv() => chunk,
                _ = &mut lost => None,
                _ = tokio::time::sleep_until(deadline) => {
                    debug!("No response to {opcode} id={id}");
                    return Err(ProtocolError::Timeout(self.response_timeout));
                }
            };
            let Some(chunk) = chunk else {
                debug!("Link lost while waiting for {opcode} id={id}");
                return Err(ProtocolError::NotConnected);
            };

            let Some(response) = inbox.assembler.on_chunk(&chunk) else {
                continue;
            };
            if response.id == i64::from(id) {
                debug!("<- {opcode} id={id}: {}", response.value);
                return Ok(response.value);
            }
            debug!("Ignoring response id={} while waiting for {id}", response.id);
        }
    }
}
