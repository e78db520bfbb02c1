//! Newline-delimited JSON-RPC over stdin/stdout.
//!
//! Stdout is reserved for protocol frames; logging goes to stderr.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use gantry_dispatch::ProtocolDispatcher;
use gantry_tools::builtin::{DelayTool, EchoTool};
use gantry_tools::{TimeoutPolicy, ToolRegistry};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "gantryd")]
#[command(about = "Gantry stdio daemon")]
struct Cli {
    #[arg(long, default_value_t = 30)]
    fast_timeout_secs: u64,
    #[arg(long, default_value_t = 1200)]
    compute_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let cli = Cli::parse();

    let registry = Arc::new(ToolRegistry::new(TimeoutPolicy {
        fast: Duration::from_secs(cli.fast_timeout_secs),
        compute: Duration::from_secs(cli.compute_timeout_secs),
    }));
    registry.register(Arc::new(EchoTool));
    registry.register(Arc::new(DelayTool));

    let dispatcher = ProtocolDispatcher::new(registry);

    let stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(stdin).lines();

    info!("gantryd stdio server started");

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(frame) = dispatcher.handle_text(line).await {
            stdout.write_all(frame.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
    }

    info!("gantryd stdio server stopped");
    Ok(())
}
