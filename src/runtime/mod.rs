//! Asynchronous duplex pipe engine.
//!
//! Completion-based I/O on a single thread:
//! - `Reactor`: dispatches completions to endpoints and timers
//! - `Endpoint`: read/write state machine with a single-writer gate
//! - I/O tasks: one per endpoint, the only code touching the pipe
//!
//! Shared abstractions:
//! - `InboundBuffer` / `OutboundQueue`: per-endpoint byte buffers
//! - `Completion`: operation results tagged with their owner's id

mod buffer;
mod completion;
mod driver;
mod endpoint;
mod event_loop;
mod timer;

pub use buffer::{InboundBuffer, OutboundQueue};
pub use completion::{Completion, EndpointId, TimerId};
pub use endpoint::{
    DataHandler, Endpoint, EndpointRegistry, EndpointStats, ErrorPolicy, Outbox, ReadEvent,
    ReadState, WriteState,
};
pub use event_loop::{Reactor, ReactorConfig, ReactorHandle};
pub use timer::TimerState;
