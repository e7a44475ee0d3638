//! Diagnostic tools for duplex pipes between an agent and an extension.
//!
//! The crate is split into:
//! - `transport`: creating and opening pipes on each platform
//! - `runtime`: the single-threaded completion reactor driving endpoints and timers
//! - `protocols`: the echo and relay applications
//! - `traffic`: operator-facing hex dumps and heartbeat markers
//! - `config` / `logging`: command line, TOML settings and tracing setup

pub mod config;
pub mod error;
pub mod logging;
pub mod protocols;
pub mod runtime;
pub mod traffic;
pub mod transport;

pub use error::{PipeError, Result};
