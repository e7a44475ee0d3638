//! pipe-relay: man-in-the-middle between an agent and an extension
//!
//! Creates the pipe the agent connects to, opens the extension's pipe and
//! forwards bytes both ways, printing each batch as hex with its direction.
//!
//! Usage: `pipe-relay <agent_pipe> <extension_pipe>`

use pipe_tools::config::RelayConfig;
use pipe_tools::logging;
use pipe_tools::protocols::relay::RelayTool;
use pipe_tools::traffic::StdoutLog;
use pipe_tools::PipeError;
use std::process::ExitCode;
use std::rc::Rc;
use tracing::info;

fn main() -> ExitCode {
    let config = match RelayConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    logging::init(&config.log_level);

    info!(
        agent_pipe = %config.agent_pipe,
        extension_pipe = %config.extension_pipe,
        read_chunk_size = config.settings.read_chunk_size,
        buffer_size = config.settings.buffer_size,
        "Starting pipe-relay"
    );

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: RelayConfig) -> Result<(), PipeError> {
    let relay = RelayTool::establish(&config, Rc::new(StdoutLog)).await?;

    let handle = relay.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, stopping");
            handle.stop();
        }
    });

    relay.run().await
}
