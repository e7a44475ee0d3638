//! Duplex endpoint state machine.
//!
//! Each endpoint tracks its read side (idle, one read pending, halted) and
//! its write side (idle, one write in flight, halted) along with its
//! buffers and data handler. It never performs I/O itself: it issues
//! requests to its I/O task and is told about the results through the
//! `on_*_complete` methods, which the reactor calls as completions arrive.

use super::buffer::{InboundBuffer, OutboundQueue};
use super::completion::EndpointId;
use super::driver::IoRequests;
use crate::error::PipeError;
use crate::transport;
use bytes::Bytes;
use slab::Slab;
use std::io;
use tracing::{debug, trace, warn};

/// Callback receiving every batch of newly arrived bytes.
///
/// Writes are queued on the [`Outbox`] and applied by the reactor once the
/// handler returns.
pub type DataHandler = Box<dyn FnMut(&mut Outbox, Bytes)>;

/// What the reactor does when I/O on an endpoint fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Stop the event loop and return the error.
    Fatal,
    /// Log the error and halt only the failed side of the endpoint.
    HaltLoop,
}

/// Read side of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadState {
    /// No read outstanding.
    Idle,
    /// Exactly one read outstanding.
    Pending,
    /// Reading stopped after an error.
    Halted,
}

/// Write side of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteState {
    /// No write outstanding.
    Idle,
    /// One write covering the first `len` queued bytes is outstanding.
    InFlight { len: usize },
    /// Writing stopped after an error; new bytes are dropped.
    Halted,
}

/// Outcome of a successful read completion.
#[derive(Debug, PartialEq, Eq)]
pub enum ReadEvent {
    /// Everything accumulated so far, ready for the handler.
    Data(Bytes),
    /// Nothing to deliver (no peer yet); the read should be re-armed.
    Rearm,
}

/// Traffic counters, for logging.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EndpointStats {
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub batches: u64,
}

/// One pipe connection's read/write state machine.
pub struct Endpoint {
    name: String,
    policy: ErrorPolicy,
    read_chunk: usize,
    read_state: ReadState,
    write_state: WriteState,
    inbound: InboundBuffer,
    outbound: OutboundQueue,
    handler: Option<DataHandler>,
    io: IoRequests,
    stats: EndpointStats,
}

impl Endpoint {
    pub(crate) fn new(name: String, policy: ErrorPolicy, read_chunk: usize, io: IoRequests) -> Self {
        Self {
            name,
            policy,
            read_chunk,
            read_state: ReadState::Idle,
            write_state: WriteState::Idle,
            inbound: InboundBuffer::with_capacity(read_chunk),
            outbound: OutboundQueue::new(),
            handler: None,
            io,
            stats: EndpointStats::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> ErrorPolicy {
        self.policy
    }

    pub fn read_state(&self) -> ReadState {
        self.read_state
    }

    pub fn write_state(&self) -> WriteState {
        self.write_state
    }

    pub fn stats(&self) -> EndpointStats {
        self.stats
    }

    /// Bytes accepted by `write` and not yet confirmed.
    pub fn queued(&self) -> usize {
        self.outbound.len()
    }

    /// Whether an operation is outstanding on either side.
    pub fn has_pending_io(&self) -> bool {
        self.read_state == ReadState::Pending || matches!(self.write_state, WriteState::InFlight { .. })
    }

    pub(crate) fn set_handler(&mut self, handler: DataHandler) {
        self.handler = Some(handler);
    }

    pub(crate) fn take_handler(&mut self) -> Option<DataHandler> {
        self.handler.take()
    }

    pub(crate) fn restore_handler(&mut self, handler: DataHandler) {
        // A handler installed while the old one was running wins.
        if self.handler.is_none() {
            self.handler = Some(handler);
        }
    }

    /// Arm one read unless one is already pending or reading has halted.
    ///
    /// Returns whether a read is pending afterwards.
    pub fn start_reading(&mut self) -> bool {
        match self.read_state {
            ReadState::Pending => true,
            ReadState::Halted => false,
            ReadState::Idle => {
                if self.io.read_some(self.read_chunk) {
                    self.read_state = ReadState::Pending;
                    true
                } else {
                    warn!(endpoint = %self.name, "I/O task gone, halting reads");
                    self.read_state = ReadState::Halted;
                    false
                }
            }
        }
    }

    /// Queue `data` for the peer and start a write if none is in flight.
    pub fn write(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        if self.write_state == WriteState::Halted {
            trace!(endpoint = %self.name, len = data.len(), "Writes halted, dropping data");
            return;
        }
        self.outbound.push(data);
        self.issue_write();
    }

    fn issue_write(&mut self) {
        if self.write_state != WriteState::Idle || self.outbound.is_empty() {
            return;
        }

        let request = self.outbound.pending();
        let len = request.len();
        if self.io.write_some(request) {
            self.write_state = WriteState::InFlight { len };
        } else {
            warn!(endpoint = %self.name, "I/O task gone, halting writes");
            self.write_state = WriteState::Halted;
        }
    }

    /// Handle the result of the pending read.
    ///
    /// The endpoint is left idle on success so that the caller can run the
    /// handler before re-arming. On error the read side is halted.
    pub fn on_read_complete(&mut self, result: io::Result<Bytes>) -> Result<ReadEvent, PipeError> {
        if self.read_state != ReadState::Pending {
            warn!(endpoint = %self.name, state = ?self.read_state, "Read completion without a pending read");
        }
        self.read_state = ReadState::Idle;

        match result {
            Ok(chunk) if chunk.is_empty() => Err(self.read_failed(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "peer closed the pipe",
            ))),
            Ok(chunk) => {
                self.stats.bytes_read += chunk.len() as u64;
                self.stats.batches += 1;
                self.inbound.commit(&chunk);
                Ok(ReadEvent::Data(self.inbound.take()))
            }
            Err(e) if transport::is_peer_pending(&e) => {
                trace!(endpoint = %self.name, "No peer yet, re-arming read");
                Ok(ReadEvent::Rearm)
            }
            Err(e) => Err(self.read_failed(e)),
        }
    }

    fn read_failed(&mut self, source: io::Error) -> PipeError {
        self.read_state = ReadState::Halted;
        PipeError::Read {
            endpoint: self.name.clone(),
            source,
        }
    }

    /// Handle the result of the in-flight write.
    pub fn on_write_complete(&mut self, result: io::Result<usize>) -> Result<(), PipeError> {
        let requested = match self.write_state {
            WriteState::InFlight { len } => len,
            state => {
                warn!(endpoint = %self.name, ?state, "Write completion without a write in flight");
                0
            }
        };

        match result {
            Ok(0) if requested > 0 => Err(self.write_failed(io::Error::new(
                io::ErrorKind::WriteZero,
                "pipe accepted no bytes",
            ))),
            Ok(n) => {
                let consumed = self.outbound.consume(n);
                self.stats.bytes_written += consumed as u64;
                self.write_state = WriteState::Idle;
                if consumed < requested {
                    debug!(endpoint = %self.name, consumed, requested, "Partial write");
                }
                self.issue_write();
                Ok(())
            }
            Err(e) => Err(self.write_failed(e)),
        }
    }

    fn write_failed(&mut self, source: io::Error) -> PipeError {
        self.write_state = WriteState::Halted;
        PipeError::Write {
            endpoint: self.name.clone(),
            source,
        }
    }
}

/// Writes queued by a data handler.
///
/// Handlers never reach into endpoints directly; the reactor applies these
/// writes after the handler returns, through the normal `write` path.
#[derive(Debug)]
pub struct Outbox {
    source: EndpointId,
    writes: Vec<(EndpointId, Bytes)>,
}

impl Outbox {
    pub(crate) fn new(source: EndpointId) -> Self {
        Self {
            source,
            writes: Vec::new(),
        }
    }

    /// Endpoint whose data is being handled.
    pub fn source(&self) -> EndpointId {
        self.source
    }

    /// Queue bytes back to the endpoint the data came from.
    pub fn reply(&mut self, data: impl Into<Bytes>) {
        let source = self.source;
        self.send(source, data);
    }

    /// Queue bytes to any endpoint.
    pub fn send(&mut self, to: EndpointId, data: impl Into<Bytes>) {
        self.writes.push((to, data.into()));
    }

    pub(crate) fn into_writes(self) -> Vec<(EndpointId, Bytes)> {
        self.writes
    }
}

/// Registry of endpoints using slab allocation.
pub struct EndpointRegistry {
    endpoints: Slab<Endpoint>,
    max_endpoints: usize,
}

impl EndpointRegistry {
    /// Create a new registry with specified maximum capacity.
    pub fn new(max_endpoints: usize) -> Self {
        Self {
            endpoints: Slab::with_capacity(max_endpoints),
            max_endpoints,
        }
    }

    /// Insert the endpoint built by `build` for its freshly assigned id.
    ///
    /// Returns `None` if the registry is at capacity.
    pub(crate) fn insert_with(
        &mut self,
        build: impl FnOnce(EndpointId) -> Endpoint,
    ) -> Option<EndpointId> {
        if self.endpoints.len() >= self.max_endpoints {
            return None;
        }
        let entry = self.endpoints.vacant_entry();
        let id = EndpointId(entry.key());
        entry.insert(build(id));
        Some(id)
    }

    pub fn get(&self, id: EndpointId) -> Option<&Endpoint> {
        self.endpoints.get(id.0)
    }

    pub fn get_mut(&mut self, id: EndpointId) -> Option<&mut Endpoint> {
        self.endpoints.get_mut(id.0)
    }

    /// Number of registered endpoints.
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Maximum number of endpoints allowed.
    pub fn capacity(&self) -> usize {
        self.max_endpoints
    }

    pub fn iter(&self) -> impl Iterator<Item = (EndpointId, &Endpoint)> {
        self.endpoints.iter().map(|(key, ep)| (EndpointId(key), ep))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn endpoint(policy: ErrorPolicy) -> (Endpoint, UnboundedReceiver<usize>, UnboundedReceiver<Bytes>) {
        let (io, reads, writes) = IoRequests::detached();
        (Endpoint::new("test".to_string(), policy, 4096, io), reads, writes)
    }

    #[test]
    fn test_start_reading_arms_once() {
        let (mut ep, mut reads, _writes) = endpoint(ErrorPolicy::Fatal);

        assert!(ep.start_reading());
        assert!(ep.start_reading());
        assert_eq!(ep.read_state(), ReadState::Pending);

        assert_eq!(reads.try_recv().unwrap(), 4096);
        assert!(reads.try_recv().is_err());
    }

    #[test]
    fn test_read_completion_delivers_and_rearms() {
        let (mut ep, mut reads, _writes) = endpoint(ErrorPolicy::Fatal);
        ep.start_reading();
        reads.try_recv().unwrap();

        let event = ep.on_read_complete(Ok(Bytes::from_static(b"\x01\x02\x03"))).unwrap();
        assert_eq!(event, ReadEvent::Data(Bytes::from_static(b"\x01\x02\x03")));
        assert_eq!(ep.read_state(), ReadState::Idle);

        // Exactly one new read after re-arming
        assert!(ep.start_reading());
        assert_eq!(reads.try_recv().unwrap(), 4096);
        assert!(reads.try_recv().is_err());

        assert_eq!(ep.stats().bytes_read, 3);
        assert_eq!(ep.stats().batches, 1);
    }

    #[test]
    fn test_peer_pending_rearms() {
        let (mut ep, _reads, _writes) = endpoint(ErrorPolicy::Fatal);
        ep.start_reading();

        let event = ep
            .on_read_complete(Err(io::Error::from(io::ErrorKind::NotConnected)))
            .unwrap();
        assert_eq!(event, ReadEvent::Rearm);
        assert!(ep.start_reading());
    }

    #[test]
    fn test_end_of_stream_halts_reads() {
        let (mut ep, mut reads, _writes) = endpoint(ErrorPolicy::HaltLoop);
        ep.start_reading();
        reads.try_recv().unwrap();

        let err = ep.on_read_complete(Ok(Bytes::new())).unwrap_err();
        assert!(matches!(err, PipeError::Read { .. }));
        assert_eq!(ep.read_state(), ReadState::Halted);

        assert!(!ep.start_reading());
        assert!(reads.try_recv().is_err());
    }

    #[test]
    fn test_single_write_in_flight() {
        let (mut ep, _reads, mut writes) = endpoint(ErrorPolicy::Fatal);

        ep.write(b"abc");
        ep.write(b"de");
        assert_eq!(ep.write_state(), WriteState::InFlight { len: 3 });
        assert_eq!(&writes.try_recv().unwrap()[..], b"abc");
        assert!(writes.try_recv().is_err());

        // Completion drains the queue with the next write
        ep.on_write_complete(Ok(3)).unwrap();
        assert_eq!(ep.write_state(), WriteState::InFlight { len: 2 });
        assert_eq!(&writes.try_recv().unwrap()[..], b"de");

        ep.on_write_complete(Ok(2)).unwrap();
        assert_eq!(ep.write_state(), WriteState::Idle);
        assert!(writes.try_recv().is_err());
        assert_eq!(ep.stats().bytes_written, 5);
        assert!(!ep.has_pending_io());
    }

    #[test]
    fn test_partial_write_reissues_remainder() {
        let (mut ep, _reads, mut writes) = endpoint(ErrorPolicy::Fatal);

        ep.write(b"abc");
        ep.write(b"de");
        writes.try_recv().unwrap();

        ep.on_write_complete(Ok(1)).unwrap();
        assert_eq!(&writes.try_recv().unwrap()[..], b"bc");
        assert_eq!(ep.write_state(), WriteState::InFlight { len: 2 });
        assert_eq!(ep.queued(), 4);

        // Bytes queued behind the request follow once it is confirmed
        ep.on_write_complete(Ok(2)).unwrap();
        assert_eq!(&writes.try_recv().unwrap()[..], b"de");
    }

    #[test]
    fn test_write_error_halts_writes() {
        let (mut ep, _reads, mut writes) = endpoint(ErrorPolicy::HaltLoop);

        ep.write(b"abc");
        writes.try_recv().unwrap();

        let err = ep
            .on_write_complete(Err(io::Error::from(io::ErrorKind::BrokenPipe)))
            .unwrap_err();
        assert!(matches!(err, PipeError::Write { .. }));
        assert_eq!(ep.write_state(), WriteState::Halted);

        ep.write(b"more");
        assert!(writes.try_recv().is_err());

        // Reading is unaffected
        assert!(ep.start_reading());
    }

    #[test]
    fn test_zero_byte_write_is_error() {
        let (mut ep, _reads, _writes) = endpoint(ErrorPolicy::Fatal);
        ep.write(b"abc");
        assert!(ep.on_write_complete(Ok(0)).is_err());
    }

    #[test]
    fn test_outbox() {
        let mut outbox = Outbox::new(EndpointId(1));
        outbox.reply(Bytes::from_static(b"a"));
        outbox.send(EndpointId(0), b"b".to_vec());

        assert_eq!(outbox.source(), EndpointId(1));
        let writes = outbox.into_writes();
        assert_eq!(writes[0], (EndpointId(1), Bytes::from_static(b"a")));
        assert_eq!(writes[1], (EndpointId(0), Bytes::from_static(b"b")));
    }

    #[test]
    fn test_registry_capacity() {
        let mut registry = EndpointRegistry::new(2);

        let build = |id: EndpointId| {
            let (io, _, _) = IoRequests::detached();
            Endpoint::new(format!("ep-{}", id.0), ErrorPolicy::Fatal, 4096, io)
        };

        let a = registry.insert_with(build).unwrap();
        let e = registry.insert_with(build).unwrap();
        assert!(registry.insert_with(build).is_none());

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.capacity(), 2);
        assert_eq!(registry.get(a).unwrap().name(), "ep-0");
        assert_eq!(registry.get(e).unwrap().name(), "ep-1");
    }
}
