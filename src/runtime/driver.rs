//! Per-endpoint I/O task.
//!
//! Each endpoint gets one task that owns its pipe. The task waits for the
//! peer when the pipe is still listening, then serves two independent
//! request queues: one read-some per read request and one write-some per
//! write request. Every request produces exactly one completion on the
//! reactor's channel. The endpoint state machine guarantees there is never
//! more than one request of each kind outstanding.

use super::completion::{Completion, EndpointId};
use crate::transport::Pipe;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Sending side of an endpoint's I/O request queues.
#[derive(Debug)]
pub(crate) struct IoRequests {
    read: mpsc::UnboundedSender<usize>,
    write: mpsc::UnboundedSender<Bytes>,
}

impl IoRequests {
    /// Ask for one read of at most `max_len` bytes.
    pub(crate) fn read_some(&self, max_len: usize) -> bool {
        self.read.send(max_len).is_ok()
    }

    /// Ask for one write of (a prefix of) `data`.
    pub(crate) fn write_some(&self, data: Bytes) -> bool {
        self.write.send(data).is_ok()
    }

    /// Request queues without a task behind them; the receivers stand in
    /// for the pipe.
    #[cfg(test)]
    pub(crate) fn detached() -> (
        Self,
        mpsc::UnboundedReceiver<usize>,
        mpsc::UnboundedReceiver<Bytes>,
    ) {
        let (read, read_rx) = mpsc::unbounded_channel();
        let (write, write_rx) = mpsc::unbounded_channel();
        (Self { read, write }, read_rx, write_rx)
    }
}

/// Spawn the I/O task for `pipe` on the current runtime.
pub(crate) fn spawn(
    endpoint: EndpointId,
    pipe: Pipe,
    completions: mpsc::UnboundedSender<Completion>,
) -> IoRequests {
    let (read, read_rx) = mpsc::unbounded_channel();
    let (write, write_rx) = mpsc::unbounded_channel();

    tokio::spawn(drive(endpoint, pipe, read_rx, write_rx, completions));

    IoRequests { read, write }
}

async fn drive(
    endpoint: EndpointId,
    pipe: Pipe,
    mut read_rx: mpsc::UnboundedReceiver<usize>,
    write_rx: mpsc::UnboundedReceiver<Bytes>,
    completions: mpsc::UnboundedSender<Completion>,
) {
    if pipe.is_listening() {
        debug!(%endpoint, "Waiting for peer to connect");
    }

    let stream = match pipe.into_stream().await {
        Ok(stream) => stream,
        Err(e) => {
            // Report the failure against the first read request so that it
            // reaches the endpoint like any other read error.
            if read_rx.recv().await.is_some() {
                let _ = completions.send(Completion::Read {
                    endpoint,
                    result: Err(e),
                });
            }
            return;
        }
    };

    let (reader, writer) = tokio::io::split(stream);
    tokio::join!(
        read_loop(endpoint, reader, read_rx, completions.clone()),
        write_loop(endpoint, writer, write_rx, completions),
    );
    trace!(%endpoint, "I/O task finished");
}

async fn read_loop<R: AsyncRead + Unpin>(
    endpoint: EndpointId,
    mut reader: R,
    mut requests: mpsc::UnboundedReceiver<usize>,
    completions: mpsc::UnboundedSender<Completion>,
) {
    while let Some(max_len) = requests.recv().await {
        let mut buf = BytesMut::zeroed(max_len);
        let result = reader.read(&mut buf).await.map(|n| {
            buf.truncate(n);
            buf.freeze()
        });

        if completions.send(Completion::Read { endpoint, result }).is_err() {
            break;
        }
    }
}

async fn write_loop<W: AsyncWrite + Unpin>(
    endpoint: EndpointId,
    mut writer: W,
    mut requests: mpsc::UnboundedReceiver<Bytes>,
    completions: mpsc::UnboundedSender<Completion>,
) {
    while let Some(data) = requests.recv().await {
        let result = match writer.write(&data).await {
            Ok(n) => writer.flush().await.map(|()| n),
            Err(e) => Err(e),
        };

        if completions.send(Completion::Write { endpoint, result }).is_err() {
            break;
        }
    }
}
