//! Echo tool.
//!
//! Stands in for the extension side of a pipe: it opens an existing pipe,
//! logs every batch it receives and answers with a synthetic header blob
//! followed by the batch's payload.
//!
//! ## Response format
//!
//! ```text
//! batch shorter than H:  <H-byte header blob>
//! batch of n >= H bytes: <H-byte header blob><batch[H..n]>
//! ```
//!
//! `H` is the length of the blob (Ethernet header plus agent header, 44
//! bytes). Batch boundaries are whatever one read happened to return.
//!
//! A read error stops the read loop but not the tool: the process keeps
//! running as long as the heartbeat timer is armed, and exits cleanly once
//! nothing is left pending.

pub mod handler;
pub mod headers;

pub use handler::{echo_response, EchoSession, EchoState};
pub use headers::{HEADERS_LEN, SYNTHETIC_HEADERS};

use crate::config::EchoConfig;
use crate::error::PipeError;
use crate::runtime::{Endpoint, EndpointId, ErrorPolicy, Outbox, Reactor, ReactorConfig, ReactorHandle};
use crate::traffic::OperatorLog;
use crate::transport::{self, Pipe};
use bytes::Bytes;
use std::rc::Rc;
use std::time::Duration;
use tracing::info;

/// The echo tool: one endpoint plus an optional heartbeat timer.
pub struct EchoTool {
    reactor: Reactor,
    endpoint: EndpointId,
    heartbeat: Option<Duration>,
    log: Rc<dyn OperatorLog>,
}

impl EchoTool {
    /// Open the configured pipe and wire up the echo session.
    pub async fn connect(config: &EchoConfig, log: Rc<dyn OperatorLog>) -> Result<Self, PipeError> {
        let pipe = transport::open_existing(&config.pipe, &config.settings).await?;
        info!(pipe = %config.pipe, "Connected to pipe");
        Self::with_pipe(
            pipe,
            &config.pipe,
            config.heartbeat,
            ReactorConfig::from(&config.settings),
            log,
        )
    }

    /// Wire the echo session onto an already obtained pipe.
    pub fn with_pipe(
        pipe: Pipe,
        name: &str,
        heartbeat: Option<Duration>,
        config: ReactorConfig,
        log: Rc<dyn OperatorLog>,
    ) -> Result<Self, PipeError> {
        let mut reactor = Reactor::new(ReactorConfig {
            max_endpoints: 1,
            ..config
        });
        let endpoint = reactor.add_endpoint(name, pipe, ErrorPolicy::HaltLoop)?;

        let mut session = EchoSession::new(Rc::clone(&log));
        session.start();
        reactor.set_data_handler(endpoint, move |out: &mut Outbox, data: Bytes| {
            session.on_batch(out, data)
        });

        Ok(Self {
            reactor,
            endpoint,
            heartbeat,
            log,
        })
    }

    pub fn handle(&self) -> ReactorHandle {
        self.reactor.handle()
    }

    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.reactor.endpoint(self.endpoint)
    }

    /// Arm the heartbeat and the read loop, then run until stopped or idle.
    pub async fn run(mut self) -> Result<(), PipeError> {
        if let Some(period) = self.heartbeat {
            let log = Rc::clone(&self.log);
            self.reactor.add_timer(period, true, move || log.heartbeat());
        }
        self.reactor.start_reading(self.endpoint);

        info!(heartbeat = ?self.heartbeat, "Echo tool running");
        self.reactor.run().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traffic::MemoryLog;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_short_batch_answered_with_headers() {
        let (local, mut remote) = duplex(1024);
        let log = Rc::new(MemoryLog::new());
        let tool = EchoTool::with_pipe(
            Pipe::from_stream(local),
            "test",
            None,
            ReactorConfig::default(),
            log.clone(),
        )
        .unwrap();

        let batch: Vec<u8> = (1..=10).collect();
        let peer = async move {
            remote.write_all(&batch).await.unwrap();
            let mut response = [0u8; HEADERS_LEN];
            remote.read_exact(&mut response).await.unwrap();
            // Closing our end halts the read loop and the tool goes idle
            drop(remote);
            response
        };

        let (result, response) = tokio::join!(tool.run(), peer);
        result.unwrap();
        assert_eq!(response, SYNTHETIC_HEADERS);
        assert_eq!(
            log.lines(),
            vec!["Received 10 bytes: 01 02 03 04 05 06 07 08 09 0a".to_string()]
        );
    }

    #[tokio::test]
    async fn test_long_batch_keeps_payload() {
        let (local, mut remote) = duplex(1024);
        let tool = EchoTool::with_pipe(
            Pipe::from_stream(local),
            "test",
            None,
            ReactorConfig::default(),
            Rc::new(MemoryLog::new()),
        )
        .unwrap();
        let handle = tool.handle();

        let batch: Vec<u8> = (100..160).collect();
        let tail = batch[HEADERS_LEN..].to_vec();
        let peer = async move {
            remote.write_all(&batch).await.unwrap();
            let mut response = vec![0u8; 60];
            remote.read_exact(&mut response).await.unwrap();
            handle.stop();
            response
        };

        let (result, response) = tokio::join!(tool.run(), peer);
        result.unwrap();
        assert_eq!(&response[..HEADERS_LEN], &SYNTHETIC_HEADERS[..]);
        assert_eq!(&response[HEADERS_LEN..], &tail[..]);
    }

    #[tokio::test]
    async fn test_mock_pipe_read_then_eof() {
        let batch = [7u8; 10];
        let mock = tokio_test::io::Builder::new()
            .read(&batch)
            .write(&SYNTHETIC_HEADERS)
            .build();

        let log = Rc::new(MemoryLog::new());
        let tool = EchoTool::with_pipe(
            Pipe::from_stream(mock),
            "mock",
            None,
            ReactorConfig::default(),
            log.clone(),
        )
        .unwrap();

        // EOF after the echo halts reading; nothing else is pending
        tool.run().await.unwrap();
        assert_eq!(log.lines().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_repeats() {
        let (local, _remote) = duplex(64);
        let log = Rc::new(MemoryLog::new());
        let tool = EchoTool::with_pipe(
            Pipe::from_stream(local),
            "test",
            Some(Duration::from_millis(100)),
            ReactorConfig::default(),
            log.clone(),
        )
        .unwrap();
        let handle = tool.handle();

        let stopper = async move {
            tokio::time::sleep(Duration::from_millis(350)).await;
            handle.stop();
        };

        let (result, ()) = tokio::join!(tool.run(), stopper);
        result.unwrap();
        assert_eq!(log.heartbeats(), 3);
        assert!(log.lines().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_outlives_halted_read_loop() {
        let (local, remote) = duplex(64);
        drop(remote);
        let log = Rc::new(MemoryLog::new());
        let tool = EchoTool::with_pipe(
            Pipe::from_stream(local),
            "test",
            Some(Duration::from_millis(100)),
            ReactorConfig::default(),
            log.clone(),
        )
        .unwrap();
        let handle = tool.handle();

        let stopper = async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            handle.stop();
        };

        let (result, ()) = tokio::join!(tool.run(), stopper);
        result.unwrap();
        assert_eq!(log.heartbeats(), 2);
    }
}
