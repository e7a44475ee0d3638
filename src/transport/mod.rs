//! Platform-specific pipe transport.
//!
//! - Unix: Unix domain socket at the given path
//! - Windows: named pipe (`\\.\pipe\<name>`)
//!
//! Both expose the same two ways of obtaining a pipe: create one and wait
//! for a single peer (`create_listening`), or open one somebody else is
//! already listening on (`open_existing`).

#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

#[cfg(unix)]
use unix as imp;
#[cfg(windows)]
use windows as imp;

pub use imp::PipeServer;

use crate::config::PipeSettings;
use crate::error::{PipeError, Result};
use std::io;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

/// A connected, duplex byte stream.
pub trait PipeStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> PipeStream for T {}

/// Type-erased pipe stream owned by one endpoint.
pub type BoxedStream = Box<dyn PipeStream>;

/// A pipe handed to the reactor, possibly still waiting for its peer.
pub enum Pipe {
    /// Connected and ready for I/O.
    Connected(BoxedStream),
    /// Created and listening; the peer has not connected yet.
    Listening(PipeServer),
}

impl Pipe {
    /// Wrap an already connected stream.
    pub fn from_stream<S: PipeStream + 'static>(stream: S) -> Self {
        Pipe::Connected(Box::new(stream))
    }

    /// Whether the pipe still has to wait for a peer.
    pub fn is_listening(&self) -> bool {
        matches!(self, Pipe::Listening(_))
    }

    /// Wait for the peer if needed and return the connected stream.
    pub async fn into_stream(self) -> io::Result<BoxedStream> {
        match self {
            Pipe::Connected(stream) => Ok(stream),
            Pipe::Listening(server) => server.accept().await,
        }
    }
}

/// Create the single instance of pipe `name` and start listening on it.
///
/// Fails if another instance of the same name already exists.
pub fn create_listening(name: &str, settings: &PipeSettings) -> Result<Pipe> {
    let server = imp::create(name, settings.buffer_size).map_err(|source| PipeError::Create {
        name: name.to_string(),
        source,
    })?;
    debug!(pipe = name, buffer_size = settings.buffer_size, "Pipe created");
    Ok(Pipe::Listening(server))
}

/// Open pipe `name`, which must already exist and be listening.
pub async fn open_existing(name: &str, settings: &PipeSettings) -> Result<Pipe> {
    let stream = imp::open(name, settings.buffer_size)
        .await
        .map_err(|source| PipeError::Open {
            name: name.to_string(),
            source,
        })?;
    debug!(pipe = name, "Pipe opened");
    Ok(Pipe::Connected(stream))
}

/// `ERROR_PIPE_LISTENING`: the server end is up but no client has connected.
#[cfg(windows)]
const ERROR_PIPE_LISTENING: i32 = 536;

/// Whether `err` only means "listening, no peer connected yet".
pub fn is_peer_pending(err: &io::Error) -> bool {
    #[cfg(windows)]
    if err.raw_os_error() == Some(ERROR_PIPE_LISTENING) {
        return true;
    }
    err.kind() == io::ErrorKind::NotConnected
}
