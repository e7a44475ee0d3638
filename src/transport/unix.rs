//! Unix domain socket backend.

use super::BoxedStream;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{UnixListener, UnixStream};
use tracing::debug;

/// Listening socket waiting for its single peer.
pub struct PipeServer {
    listener: UnixListener,
    cleanup: SocketCleanup,
    buffer_size: usize,
}

/// Removes the socket file once the server side goes away.
struct SocketCleanup {
    path: PathBuf,
}

impl Drop for SocketCleanup {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

impl PipeServer {
    /// Accept one peer. The listener stays open, and the socket name stays
    /// taken, for as long as the returned stream lives.
    pub async fn accept(self) -> io::Result<BoxedStream> {
        let (stream, _addr) = self.listener.accept().await?;
        apply_buffer_size(&stream, self.buffer_size)?;
        debug!(path = %self.cleanup.path.display(), "Peer connected");

        Ok(Box::new(ServerStream {
            stream,
            _listener: self.listener,
            _cleanup: self.cleanup,
        }))
    }
}

pub(super) fn create(name: &str, buffer_size: usize) -> io::Result<PipeServer> {
    let path = Path::new(name);

    // Binding never replaces an existing file, live listener or not.
    let listener = UnixListener::bind(path).map_err(|e| {
        if e.kind() == io::ErrorKind::AddrInUse {
            io::Error::new(
                io::ErrorKind::AddrInUse,
                format!("an instance of this pipe already exists ({e})"),
            )
        } else {
            e
        }
    })?;

    Ok(PipeServer {
        listener,
        cleanup: SocketCleanup {
            path: path.to_path_buf(),
        },
        buffer_size,
    })
}

pub(super) async fn open(name: &str, buffer_size: usize) -> io::Result<BoxedStream> {
    let stream = UnixStream::connect(name).await?;
    apply_buffer_size(&stream, buffer_size)?;
    Ok(Box::new(stream))
}

fn apply_buffer_size(stream: &UnixStream, size: usize) -> io::Result<()> {
    let socket = socket2::SockRef::from(stream);
    socket.set_send_buffer_size(size)?;
    socket.set_recv_buffer_size(size)?;
    Ok(())
}

/// Accepted stream that keeps its listener alive.
struct ServerStream {
    stream: UnixStream,
    _listener: UnixListener,
    _cleanup: SocketCleanup,
}

impl AsyncRead for ServerStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for ServerStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.stream).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn socket_path(tag: &str) -> PathBuf {
        let path =
            std::env::temp_dir().join(format!("pipe-tools-{}-{}.sock", tag, std::process::id()));
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn test_create_accept_and_cleanup() {
        let path = socket_path("unix-accept");
        let name = path.to_str().unwrap().to_string();

        let server = create(&name, 4096).unwrap();
        assert!(path.exists());

        let mut client = open(&name, 4096).await.unwrap();
        let mut accepted = server.accept().await.unwrap();

        client.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        accepted.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        drop(accepted);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_second_instance_refused() {
        let path = socket_path("unix-second");
        let name = path.to_str().unwrap().to_string();

        let _first = create(&name, 4096).unwrap();
        let err = create(&name, 4096).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::AddrInUse);
    }

    #[tokio::test]
    async fn test_open_missing() {
        let path = socket_path("unix-missing");
        let err = open(path.to_str().unwrap(), 4096).await.err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
