mod config;
mod diagnostics;
mod host;

use anyhow::{Context, Result};
use clap::Parser;
use diagnostics::{handle_diagnostic_command, Cli, LogSettings};
use host::{Host, Output};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use config::Config;

/// Serialize every output line to stdout until all senders are gone
async fn write_output(mut rx: mpsc::UnboundedReceiver<Output>) {
    let mut stdout = tokio::io::stdout();

    while let Some(output) = rx.recv().await {
        let mut line = match serde_json::to_vec(&output) {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to serialize output: {}", e);
                continue;
            }
        };
        line.push(b'\n');

        if let Err(e) = stdout.write_all(&line).await {
            error!("Failed to write to stdout: {}", e);
            break;
        }
        if let Err(e) = stdout.flush().await {
            error!("Failed to flush stdout: {}", e);
            break;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Diagnostic commands don't start the host
    if let Some(command) = &cli.command {
        return handle_diagnostic_command(command, &cli);
    }

    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    diagnostics::init_logging(&LogSettings::resolve(&cli, &config.logging))
        .context("Failed to initialize logging")?;

    info!("Starting camera bridge daemon...");
    info!(
        "Orientation poll interval: {:?}",
        config.plugin.orientation_poll_interval()
    );
    info!(
        "Permission request code: {}",
        config.plugin.permission_request_code
    );

    let (tx, rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_output(rx));

    let host = Host::start(&config, tx)
        .await
        .context("Failed to start host")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if !line.is_empty() {
                        host.dispatch_line(line).await;
                    }
                }
                Ok(None) => {
                    info!("Stdin closed");
                    break;
                }
                Err(e) => {
                    error!("Failed to read stdin: {}", e);
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Received interrupt");
                break;
            }
        }
    }

    host.shutdown().await;
    drop(host);

    // In-flight calls hold senders; give them a moment to finish
    if tokio::time::timeout(Duration::from_secs(2), writer)
        .await
        .is_err()
    {
        warn!("Output writer did not drain in time");
    }

    info!("Camera bridge daemon stopped");
    Ok(())
}
