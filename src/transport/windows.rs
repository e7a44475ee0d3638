//! Windows named pipe backend.

use super::BoxedStream;
use std::io;
use tokio::net::windows::named_pipe::{ClientOptions, NamedPipeServer, PipeMode, ServerOptions};
use tracing::debug;

/// Single named pipe instance waiting for its client.
pub struct PipeServer {
    server: NamedPipeServer,
}

impl PipeServer {
    /// Wait for the client to connect.
    pub async fn accept(self) -> io::Result<BoxedStream> {
        self.server.connect().await?;
        debug!("Peer connected");
        Ok(Box::new(self.server))
    }
}

pub(super) fn create(name: &str, buffer_size: usize) -> io::Result<PipeServer> {
    let buffer_size = u32::try_from(buffer_size).unwrap_or(u32::MAX);

    let server = ServerOptions::new()
        .first_pipe_instance(true)
        .max_instances(1)
        .pipe_mode(PipeMode::Byte)
        .in_buffer_size(buffer_size)
        .out_buffer_size(buffer_size)
        .create(name)?;

    Ok(PipeServer { server })
}

pub(super) async fn open(name: &str, _buffer_size: usize) -> io::Result<BoxedStream> {
    let client = ClientOptions::new().open(name)?;
    Ok(Box::new(client))
}
