//! Relay tool.
//!
//! Sits between an agent and an extension. It creates the agent-facing
//! pipe `A` (the agent connects to it as if it were the extension), opens
//! the real extension's pipe `E`, and copies bytes in both directions:
//!
//! ```text
//! agent <==> A [relay] E <==> extension
//! ```
//!
//! Each direction is an independent read loop on its source endpoint that
//! writes, unmodified, to the other endpoint. Every batch is logged as
//! `[A --> E]: <hex>` or `[A <-- E]: <hex>`.
//!
//! Any read or write failure on either pipe is fatal: the event loop
//! stops and the error is returned from [`RelayTool::run`].

pub mod handler;

pub use handler::{forward, AGENT_TO_EXTENSION, EXTENSION_TO_AGENT};

use crate::config::RelayConfig;
use crate::error::PipeError;
use crate::runtime::{Endpoint, EndpointId, ErrorPolicy, Reactor, ReactorConfig, ReactorHandle};
use crate::traffic::OperatorLog;
use crate::transport::{self, Pipe};
use std::rc::Rc;
use tracing::info;

/// The relay tool: the agent-facing endpoint and the extension endpoint.
pub struct RelayTool {
    reactor: Reactor,
    agent: EndpointId,
    extension: EndpointId,
}

impl RelayTool {
    /// Create the agent-facing pipe, then open the extension's pipe.
    ///
    /// Nothing is read or written until [`run`](Self::run); the agent
    /// may connect at any time after this returns.
    pub async fn establish(config: &RelayConfig, log: Rc<dyn OperatorLog>) -> Result<Self, PipeError> {
        let agent = transport::create_listening(&config.agent_pipe, &config.settings)?;
        info!(pipe = %config.agent_pipe, "Agent pipe created");

        let extension = transport::open_existing(&config.extension_pipe, &config.settings).await?;
        info!(pipe = %config.extension_pipe, "Extension pipe opened");

        Self::from_pipes(agent, extension, ReactorConfig::from(&config.settings), log)
    }

    /// Wire forwarding between two already obtained pipes.
    pub fn from_pipes(
        agent: Pipe,
        extension: Pipe,
        config: ReactorConfig,
        log: Rc<dyn OperatorLog>,
    ) -> Result<Self, PipeError> {
        let mut reactor = Reactor::new(ReactorConfig {
            max_endpoints: 2,
            ..config
        });
        let a = reactor.add_endpoint("A", agent, ErrorPolicy::Fatal)?;
        let e = reactor.add_endpoint("E", extension, ErrorPolicy::Fatal)?;

        reactor.set_data_handler(a, forward(e, AGENT_TO_EXTENSION, Rc::clone(&log)));
        reactor.set_data_handler(e, forward(a, EXTENSION_TO_AGENT, log));

        Ok(Self {
            reactor,
            agent: a,
            extension: e,
        })
    }

    pub fn handle(&self) -> ReactorHandle {
        self.reactor.handle()
    }

    pub fn agent(&self) -> Option<&Endpoint> {
        self.reactor.endpoint(self.agent)
    }

    pub fn extension(&self) -> Option<&Endpoint> {
        self.reactor.endpoint(self.extension)
    }

    /// Arm both read loops and relay until stopped or a pipe fails.
    pub async fn run(mut self) -> Result<(), PipeError> {
        self.reactor.start_reading(self.agent);
        self.reactor.start_reading(self.extension);

        info!("Relay running");
        self.reactor.run().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traffic::MemoryLog;
    use bytes::Bytes;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_agent_to_extension() {
        let (a_local, mut agent) = duplex(1024);
        let (e_local, mut extension) = duplex(1024);
        let log = Rc::new(MemoryLog::new());
        let relay = RelayTool::from_pipes(
            Pipe::from_stream(a_local),
            Pipe::from_stream(e_local),
            ReactorConfig::default(),
            log.clone(),
        )
        .unwrap();
        let handle = relay.handle();

        let peers = async move {
            agent.write_all(&[0x01, 0x02, 0x03]).await.unwrap();
            let mut buf = [0u8; 3];
            extension.read_exact(&mut buf).await.unwrap();
            handle.stop();
            buf
        };

        let (result, received) = tokio::join!(relay.run(), peers);
        result.unwrap();
        assert_eq!(received, [0x01, 0x02, 0x03]);
        assert_eq!(log.lines(), vec!["[A --> E]: 01 02 03".to_string()]);
    }

    #[tokio::test]
    async fn test_directions_are_independent() {
        let (a_local, agent) = duplex(1024);
        let (e_local, extension) = duplex(1024);
        let log = Rc::new(MemoryLog::new());
        let relay = RelayTool::from_pipes(
            Pipe::from_stream(a_local),
            Pipe::from_stream(e_local),
            ReactorConfig::default(),
            log.clone(),
        )
        .unwrap();
        let handle = relay.handle();

        let peers = async move {
            let (mut agent_rd, mut agent_wr) = tokio::io::split(agent);
            let (mut ext_rd, mut ext_wr) = tokio::io::split(extension);

            // Extension speaks first and the agent never answers it
            ext_wr.write_all(b"from-extension").await.unwrap();
            let mut to_agent = [0u8; 14];
            agent_rd.read_exact(&mut to_agent).await.unwrap();

            agent_wr.write_all(b"from-agent").await.unwrap();
            let mut to_extension = [0u8; 10];
            ext_rd.read_exact(&mut to_extension).await.unwrap();

            handle.stop();
            (to_agent, to_extension)
        };

        let (result, (to_agent, to_extension)) = tokio::join!(relay.run(), peers);
        result.unwrap();
        assert_eq!(&to_agent, b"from-extension");
        assert_eq!(&to_extension, b"from-agent");

        let lines = log.lines();
        assert!(lines[0].starts_with("[A <-- E]: "));
        assert!(lines.last().unwrap().starts_with("[A --> E]: "));
    }

    #[tokio::test]
    async fn test_large_transfer_preserves_order() {
        let (a_local, agent) = duplex(256);
        let (e_local, extension) = duplex(256);
        let relay = RelayTool::from_pipes(
            Pipe::from_stream(a_local),
            Pipe::from_stream(e_local),
            ReactorConfig {
                read_chunk_size: 100,
                max_endpoints: 2,
            },
            Rc::new(MemoryLog::new()),
        )
        .unwrap();
        let handle = relay.handle();

        let sent: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        let expected = Bytes::from(sent.clone());
        let peers = async move {
            let (_agent_rd, mut agent_wr) = tokio::io::split(agent);
            let (mut ext_rd, _ext_wr) = tokio::io::split(extension);
            let writer = async move {
                agent_wr.write_all(&sent).await.unwrap();
                agent_wr
            };
            let reader = async move {
                let mut received = vec![0u8; 10_000];
                ext_rd.read_exact(&mut received).await.unwrap();
                received
            };
            let (_wr, received) = tokio::join!(writer, reader);
            handle.stop();
            received
        };

        let (result, received) = tokio::join!(relay.run(), peers);
        result.unwrap();
        assert_eq!(&received[..], &expected[..]);
    }

    #[tokio::test]
    async fn test_closed_pipe_is_fatal() {
        let (a_local, agent) = duplex(64);
        let (e_local, _extension) = duplex(64);
        drop(agent);

        let relay = RelayTool::from_pipes(
            Pipe::from_stream(a_local),
            Pipe::from_stream(e_local),
            ReactorConfig::default(),
            Rc::new(MemoryLog::new()),
        )
        .unwrap();

        let err = relay.run().await.unwrap_err();
        assert!(err.is_io());
        assert_eq!(
            err.to_string(),
            "[A] error while reading data: peer closed the pipe"
        );
    }
}
