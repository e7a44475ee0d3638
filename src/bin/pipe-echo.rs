//! pipe-echo: stand-in extension for exercising an agent's pipe
//!
//! Opens an existing pipe, prints every received batch as hex and answers
//! it with a synthetic header blob. With a non-zero timeout a `.` is
//! printed every period.
//!
//! Usage: `pipe-echo <pipe> [timeout_ms]`

use pipe_tools::config::EchoConfig;
use pipe_tools::logging;
use pipe_tools::protocols::echo::EchoTool;
use pipe_tools::traffic::StdoutLog;
use pipe_tools::PipeError;
use std::process::ExitCode;
use std::rc::Rc;
use tracing::info;

fn main() -> ExitCode {
    let config = match EchoConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    logging::init(&config.log_level);

    info!(
        pipe = %config.pipe,
        heartbeat = ?config.heartbeat,
        read_chunk_size = config.settings.read_chunk_size,
        buffer_size = config.settings.buffer_size,
        "Starting pipe-echo"
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

async fn run(config: EchoConfig) -> Result<(), PipeError> {
    let tool = EchoTool::connect(&config, Rc::new(StdoutLog)).await?;

    let handle = tool.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, stopping");
            handle.stop();
        }
    });

    tool.run().await
}
