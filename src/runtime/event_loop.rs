//! Single-threaded completion dispatcher.
//!
//! Completion-based model: endpoints and timers issue operations, each of
//! which later posts one `Completion` to the reactor's channel. `run`
//! takes completions one at a time and drives the matching state machine,
//! so exactly one callback executes at any moment and handlers never run
//! concurrently with each other.
//!
//! The loop ends when it is stopped through a `ReactorHandle`, when an
//! endpoint with `ErrorPolicy::Fatal` fails, or when nothing is pending
//! any more (no read, write or armed timer left to complete).

use super::completion::{Completion, EndpointId, TimerId};
use super::driver;
use super::endpoint::{Endpoint, EndpointRegistry, ErrorPolicy, Outbox, ReadEvent};
use super::timer::{self, Timer, TimerState};
use crate::config::PipeSettings;
use crate::error::PipeError;
use crate::transport::Pipe;
use bytes::Bytes;
use slab::Slab;
use std::io;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

/// Reactor sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReactorConfig {
    /// Maximum bytes requested by one read.
    pub read_chunk_size: usize,
    /// Maximum number of endpoints.
    pub max_endpoints: usize,
}

impl Default for ReactorConfig {
    fn default() -> Self {
        Self {
            read_chunk_size: 4096,
            max_endpoints: 2,
        }
    }
}

impl From<&PipeSettings> for ReactorConfig {
    fn from(settings: &PipeSettings) -> Self {
        Self {
            read_chunk_size: settings.read_chunk_size,
            ..Self::default()
        }
    }
}

/// Cloneable handle for stopping a running reactor.
#[derive(Debug, Clone)]
pub struct ReactorHandle {
    completions: mpsc::UnboundedSender<Completion>,
}

impl ReactorHandle {
    /// Make `run` return `Ok(())` after the current callback.
    pub fn stop(&self) {
        let _ = self.completions.send(Completion::Stop);
    }
}

/// The event loop owning every endpoint, timer and pending operation.
pub struct Reactor {
    endpoints: EndpointRegistry,
    timers: Slab<Timer>,
    read_chunk: usize,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
}

impl Reactor {
    pub fn new(config: ReactorConfig) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self {
            endpoints: EndpointRegistry::new(config.max_endpoints),
            timers: Slab::new(),
            read_chunk: config.read_chunk_size,
            completions_tx,
            completions_rx,
        }
    }

    pub fn handle(&self) -> ReactorHandle {
        ReactorHandle {
            completions: self.completions_tx.clone(),
        }
    }

    pub fn endpoint(&self, id: EndpointId) -> Option<&Endpoint> {
        self.endpoints.get(id)
    }

    /// Register `pipe` and spawn its I/O task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn add_endpoint(
        &mut self,
        name: impl Into<String>,
        pipe: Pipe,
        policy: ErrorPolicy,
    ) -> Result<EndpointId, PipeError> {
        let name = name.into();
        let read_chunk = self.read_chunk;
        let completions = self.completions_tx.clone();

        let id = self
            .endpoints
            .insert_with(|id| {
                let io = driver::spawn(id, pipe, completions);
                Endpoint::new(name, policy, read_chunk, io)
            })
            .ok_or(PipeError::EndpointLimit(self.endpoints.capacity()))?;

        debug!(endpoint = %id, ?policy, "Endpoint registered");
        Ok(id)
    }

    /// Install the handler receiving every batch read from `id`.
    pub fn set_data_handler<F>(&mut self, id: EndpointId, handler: F)
    where
        F: FnMut(&mut Outbox, Bytes) + 'static,
    {
        match self.endpoints.get_mut(id) {
            Some(endpoint) => endpoint.set_handler(Box::new(handler)),
            None => warn!(endpoint = %id, "Handler for unknown endpoint ignored"),
        }
    }

    /// Arm the read loop of `id`.
    pub fn start_reading(&mut self, id: EndpointId) -> bool {
        self.endpoints
            .get_mut(id)
            .map(Endpoint::start_reading)
            .unwrap_or(false)
    }

    /// Queue `data` on `id` through its single-writer gate.
    pub fn write(&mut self, id: EndpointId, data: &[u8]) {
        match self.endpoints.get_mut(id) {
            Some(endpoint) => endpoint.write(data),
            None => warn!(endpoint = %id, len = data.len(), "Write to unknown endpoint dropped"),
        }
    }

    /// Arm a timer calling `callback` after `period`, and every `period`
    /// after that when `repeat` is set.
    pub fn add_timer<F>(&mut self, period: Duration, repeat: bool, callback: F) -> TimerId
    where
        F: FnMut() + 'static,
    {
        let id = TimerId(self.timers.insert(Timer::new(period, repeat, Box::new(callback))));
        timer::arm(id, period, self.completions_tx.clone());
        debug!(?period, repeat, "Timer armed");
        id
    }

    /// Cancel a timer. Its callback will not run again.
    pub fn cancel_timer(&mut self, id: TimerId) {
        if let Some(timer) = self.timers.get_mut(id.0) {
            timer.state = TimerState::Cancelled;
        }
    }

    pub fn timer_state(&self, id: TimerId) -> Option<TimerState> {
        self.timers.get(id.0).map(|timer| timer.state)
    }

    /// Operations that will still post a completion.
    pub fn pending_operations(&self) -> usize {
        let io = self
            .endpoints
            .iter()
            .filter(|(_, endpoint)| endpoint.has_pending_io())
            .count();
        let timers = self
            .timers
            .iter()
            .filter(|(_, timer)| timer.state == TimerState::Armed)
            .count();
        io + timers
    }

    /// Dispatch completions until stopped, idle, or a fatal error.
    pub async fn run(&mut self) -> Result<(), PipeError> {
        debug!(endpoints = self.endpoints.len(), "Event loop running");

        let result = loop {
            if self.pending_operations() == 0 {
                info!("No pending operations, event loop finished");
                break Ok(());
            }

            let Some(completion) = self.completions_rx.recv().await else {
                break Ok(());
            };
            trace!(op = completion.op_name(), "Dispatching completion");

            let step = match completion {
                Completion::Read { endpoint, result } => self.complete_read(endpoint, result),
                Completion::Write { endpoint, result } => self.complete_write(endpoint, result),
                Completion::Timer { timer } => {
                    self.fire_timer(timer);
                    Ok(())
                }
                Completion::Stop => {
                    info!("Event loop stopped");
                    break Ok(());
                }
            };

            if let Err(e) = step {
                break Err(e);
            }
        };

        for (id, endpoint) in self.endpoints.iter() {
            let stats = endpoint.stats();
            debug!(
                endpoint = %id,
                name = endpoint.name(),
                bytes_read = stats.bytes_read,
                bytes_written = stats.bytes_written,
                batches = stats.batches,
                "Endpoint totals"
            );
        }

        result
    }

    fn complete_read(&mut self, id: EndpointId, result: io::Result<Bytes>) -> Result<(), PipeError> {
        let Some(endpoint) = self.endpoints.get_mut(id) else {
            warn!(endpoint = %id, "Read completion for unknown endpoint");
            return Ok(());
        };

        match endpoint.on_read_complete(result) {
            Ok(ReadEvent::Data(data)) => {
                trace!(endpoint = endpoint.name(), len = data.len(), "Batch received");
                self.deliver(id, data);
                self.start_reading(id);
                Ok(())
            }
            Ok(ReadEvent::Rearm) => {
                self.start_reading(id);
                Ok(())
            }
            Err(e) => self.handle_failure(id, e),
        }
    }

    fn complete_write(&mut self, id: EndpointId, result: io::Result<usize>) -> Result<(), PipeError> {
        let Some(endpoint) = self.endpoints.get_mut(id) else {
            warn!(endpoint = %id, "Write completion for unknown endpoint");
            return Ok(());
        };

        match endpoint.on_write_complete(result) {
            Ok(()) => Ok(()),
            Err(e) => self.handle_failure(id, e),
        }
    }

    /// Run the handler of `id` and apply the writes it queued.
    fn deliver(&mut self, id: EndpointId, data: Bytes) {
        let Some(mut handler) = self.endpoints.get_mut(id).and_then(|ep| ep.take_handler()) else {
            return;
        };

        let mut outbox = Outbox::new(id);
        handler(&mut outbox, data);

        if let Some(endpoint) = self.endpoints.get_mut(id) {
            endpoint.restore_handler(handler);
        }
        for (to, bytes) in outbox.into_writes() {
            self.write(to, &bytes);
        }
    }

    fn handle_failure(&mut self, id: EndpointId, err: PipeError) -> Result<(), PipeError> {
        let policy = self
            .endpoints
            .get(id)
            .map(Endpoint::policy)
            .unwrap_or(ErrorPolicy::Fatal);

        match policy {
            ErrorPolicy::Fatal => {
                debug!(endpoint = %id, error = %err, "Fatal endpoint error");
                Err(err)
            }
            ErrorPolicy::HaltLoop => {
                error!(endpoint = %id, error = %err, "I/O loop halted");
                Ok(())
            }
        }
    }

    fn fire_timer(&mut self, id: TimerId) {
        let completions = self.completions_tx.clone();
        let Some(timer) = self.timers.get_mut(id.0) else {
            return;
        };
        if timer.state != TimerState::Armed {
            return;
        }

        timer.state = TimerState::Fired;
        (timer.callback)();

        if timer.repeat {
            timer.state = TimerState::Armed;
            timer::arm(id, timer.period, completions);
        }
    }
}
