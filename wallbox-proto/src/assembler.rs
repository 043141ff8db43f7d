//! Response reassembly
//!
//! Notifications carry arbitrary slices of a response document. The
//! assembler appends them to one buffer until the buffer parses as a
//! response, then hands the response out and starts over.

use log::*;

use crate::{Decoded, ParsedResponse, decode_response};

/// Default cap on buffered bytes before the buffer is thrown away
pub const DEFAULT_BUFFER_LIMIT: usize = 4096;

#[derive(Debug)]
pub struct InboundAssembler {
    buffer: Vec<u8>,
    limit: usize,
}

impl Default for InboundAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl InboundAssembler {
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_BUFFER_LIMIT)
    }

    pub fn with_limit(limit: usize) -> Self {
        Self { buffer: Vec::new(), limit }
    }

    /// Append a notification chunk; returns a response once one is complete
    pub fn on_chunk(&mut self, chunk: &[u8]) -> Option<ParsedResponse> {
        self.buffer.extend_from_slice(chunk);

        match decode_response(&self.buffer) {
            Decoded::Response(response) => {
                self.buffer.clear();
                Some(response)
            }
            Decoded::Unusable => {
                warn!(
                    "Dropping {} bytes of JSON without a response id",
                    self.buffer.len()
                );
                self.buffer.clear();
                None
            }
            Decoded::Incomplete => {
                if self.buffer.len() > self.limit {
                    warn!(
                        "Inbound buffer exceeded {} bytes without a complete response, dropping it",
                        self.limit
                    );
                    self.buffer.clear();
                }
                None
            }
        }
    }

    /// Discard anything buffered so far
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Number of bytes waiting for the rest of a document
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}
