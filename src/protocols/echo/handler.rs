//! Echo session: answers every batch with the synthetic headers.

use super::headers::{HEADERS_LEN, SYNTHETIC_HEADERS};
use crate::runtime::Outbox;
use crate::traffic::OperatorLog;
use bytes::{Bytes, BytesMut};
use std::rc::Rc;
use tracing::{debug, info};

/// Build the response to one batch.
///
/// The response always starts with the header blob. A batch at least as
/// long as the blob is assumed to begin with headers of its own, so its
/// first `HEADERS_LEN` bytes are replaced; shorter batches are answered
/// with the blob alone.
pub fn echo_response(batch: &[u8]) -> Bytes {
    let body = batch.get(HEADERS_LEN..).unwrap_or_default();
    let mut out = BytesMut::with_capacity(HEADERS_LEN + body.len());
    out.extend_from_slice(&SYNTHETIC_HEADERS);
    out.extend_from_slice(body);
    out.freeze()
}

/// Where the echo session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoState {
    /// Not wired to a pipe yet.
    Idle,
    /// Read loop armed, nothing received yet.
    AwaitingFirstRead,
    /// At least one batch has been answered.
    EchoCycle,
}

/// Per-pipe echo state, driven by the reactor's data handler.
pub struct EchoSession {
    state: EchoState,
    log: Rc<dyn OperatorLog>,
    batches: u64,
}

impl EchoSession {
    pub fn new(log: Rc<dyn OperatorLog>) -> Self {
        Self {
            state: EchoState::Idle,
            log,
            batches: 0,
        }
    }

    pub fn state(&self) -> EchoState {
        self.state
    }

    pub fn batches(&self) -> u64 {
        self.batches
    }

    /// Mark the read loop as armed.
    pub fn start(&mut self) {
        if self.state == EchoState::Idle {
            self.state = EchoState::AwaitingFirstRead;
        }
    }

    /// Log a received batch and queue its echo.
    pub fn on_batch(&mut self, out: &mut Outbox, data: Bytes) {
        self.log
            .traffic(&format!("Received {} bytes", data.len()), &data);

        if self.state != EchoState::EchoCycle {
            info!(len = data.len(), "First batch received");
            self.state = EchoState::EchoCycle;
        }
        self.batches += 1;

        let response = echo_response(&data);
        debug!(received = data.len(), echoed = response.len(), "Echoing batch");
        out.reply(response);
    }
}
