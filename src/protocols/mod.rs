//! Pipe diagnostic applications built on the runtime.
//!
//! - `echo`: answers every batch with a synthetic header blob
//! - `relay`: forwards bytes between an agent and an extension, logging both directions

pub mod echo;
pub mod relay;
