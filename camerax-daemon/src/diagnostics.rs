//! Command line and logging
//!
//! Logs go to stderr; stdout carries the host protocol.

use crate::config::{Config, LoggingConfig};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

/// Camera bridge daemon command-line interface
#[derive(Parser, Debug)]
#[command(name = "camerax-daemon")]
#[command(about = "Drive the camera session bridge over stdin/stdout", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(short, long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Enable JSON structured logging
    #[arg(long)]
    pub json_logs: bool,

    /// Hide timestamps in logs
    #[arg(long)]
    pub no_timestamps: bool,

    /// Diagnostic subcommand
    #[command(subcommand)]
    pub command: Option<DiagnosticCommand>,
}

/// Diagnostic commands
#[derive(Subcommand, Debug)]
pub enum DiagnosticCommand {
    /// Print the effective configuration as TOML
    DumpConfig,

    /// Print the path the configuration is loaded from
    ConfigPath,
}

/// Logging settings after applying command-line overrides
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: String,
    pub json: bool,
    pub timestamps: bool,
}

impl LogSettings {
    pub fn resolve(cli: &Cli, config: &LoggingConfig) -> Self {
        Self {
            level: cli.log_level.clone().unwrap_or_else(|| config.level.clone()),
            json: cli.json_logs || config.json,
            timestamps: config.timestamps && !cli.no_timestamps,
        }
    }
}

/// Initialize logging; `RUST_LOG` wins over the configured level
pub fn init_logging(settings: &LogSettings) -> Result<()> {
    let log_level = settings.level.parse::<Level>().with_context(|| {
        format!(
            "Invalid log level '{}'. Valid levels: error, warn, info, debug, trace",
            settings.level
        )
    })?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level.as_str()))
        .context("Failed to create log filter")?;

    let subscriber = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    match (settings.json, settings.timestamps) {
        (true, true) => subscriber.json().init(),
        (true, false) => subscriber.without_time().json().init(),
        (false, true) => subscriber.init(),
        (false, false) => subscriber.without_time().init(),
    }

    info!(
        "Logging initialized: level={}, json={}, timestamps={}",
        log_level, settings.json, settings.timestamps
    );

    Ok(())
}

/// Run a diagnostic subcommand
pub fn handle_diagnostic_command(command: &DiagnosticCommand, cli: &Cli) -> Result<()> {
    match command {
        DiagnosticCommand::DumpConfig => {
            let config = Config::load(cli.config.as_deref())?;
            let contents =
                toml::to_string_pretty(&config).context("Failed to serialize config")?;
            println!("{}", contents);
        }
        DiagnosticCommand::ConfigPath => {
            let path = cli.config.clone().unwrap_or_else(Config::default_path);
            println!("{}", path.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_config() {
        let cli = Cli::parse_from(["camerax-daemon", "--log-level", "debug", "--no-timestamps"]);
        let settings = LogSettings::resolve(&cli, &LoggingConfig::default());

        assert_eq!(settings.level, "debug");
        assert!(!settings.timestamps);
        assert!(!settings.json);
    }

    #[test]
    fn test_config_level_used_without_flag() {
        let cli = Cli::parse_from(["camerax-daemon"]);
        let config = LoggingConfig {
            level: "warn".to_string(),
            json: true,
            timestamps: true,
        };
        let settings = LogSettings::resolve(&cli, &config);

        assert_eq!(settings.level, "warn");
        assert!(settings.json);
        assert!(settings.timestamps);
    }

    #[test]
    fn test_invalid_level_rejected() {
        let settings = LogSettings {
            level: "loud".to_string(),
            json: false,
            timestamps: false,
        };
        assert!(init_logging(&settings).is_err());
    }

    #[test]
    fn test_subcommand_parsing() {
        let cli = Cli::parse_from(["camerax-daemon", "--config", "/tmp/c.toml", "dump-config"]);
        assert!(matches!(cli.command, Some(DiagnosticCommand::DumpConfig)));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
    }
}
