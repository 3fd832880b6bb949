//! Command line front end
//!
//! `wallbox [global options] <info|read|write|monitor|serve>`; exits 0 when
//! the last operation was Good.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use common::logging::{self, LogConfig};
use common::shutdown_token;
use gateway_core::{run_monitor, DataStatus, DatagramTransport, MonitorOptions, UdpSettings};
use serde_json::Value;
use tracing::{info, Level};

use crate::api;
use crate::config::{WallboxConfig, DEFAULT_CONFIG_FILE};
use crate::fields::Report;
use crate::gateway::WallboxGateway;

/// KEBA P30 wallbox gateway
#[derive(Parser, Debug)]
#[command(name = "wallbox", version, about, long_about = None)]
pub struct Cli {
    /// Wallbox address (overrides the config file)
    #[arg(long, global = true)]
    pub address: Option<String>,

    /// Wallbox UDP port
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Local UDP port (0 = any)
    #[arg(long, global = true)]
    pub local_port: Option<u16>,

    /// Timeout in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show connection settings and check reachability
    Info,

    /// Read reports
    Read {
        #[command(flatten)]
        selection: Selection,

        /// Single property to read
        #[arg(conflicts_with = "selection")]
        property: Option<String>,
    },

    /// Send a command (`CurrUser 16`, `Unlock true`, `Display "Hello"`)
    Write {
        property: String,
        value: String,
    },

    /// Read repeatedly until stopped
    Monitor {
        #[command(flatten)]
        selection: Selection,

        /// Single property to read
        #[arg(conflicts_with = "selection")]
        property: Option<String>,

        /// Number of reads (0 = until Ctrl+C)
        #[arg(long, default_value_t = 0)]
        repeat: u32,

        /// Seconds between reads
        #[arg(
            long,
            default_value_t = 10,
            value_parser = clap::value_parser!(u64).range(1..)
        )]
        interval: u64,
    },

    /// Run the REST API server
    Serve {
        #[arg(long)]
        bind: Option<String>,
    },
}

#[derive(Args, Debug, Clone, Default)]
#[group(id = "selection", multiple = false)]
pub struct Selection {
    /// All reports (default)
    #[arg(long)]
    pub data: bool,
    /// Product information
    #[arg(long)]
    pub report1: bool,
    /// State and settings
    #[arg(long)]
    pub report2: bool,
    /// Meter values
    #[arg(long)]
    pub report3: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    All,
    Report(Report),
    Property(String),
}

impl Selection {
    pub fn target(&self, property: Option<&str>) -> Target {
        let report = [
            (self.report1, Report::Report1),
            (self.report2, Report::Report2),
            (self.report3, Report::Report3),
        ]
        .into_iter()
        .find_map(|(set, report)| set.then_some(report));

        match (property, report) {
            (Some(name), _) => Target::Property(name.to_string()),
            (None, Some(report)) => Target::Report(report),
            (None, None) => Target::All,
        }
    }
}

impl Cli {
    pub fn apply_overrides(&self, settings: &mut UdpSettings) {
        if let Some(address) = &self.address {
            settings.address = address.clone();
        }
        if let Some(port) = self.port {
            settings.port = port;
        }
        if let Some(local_port) = self.local_port {
            settings.local_port = local_port;
        }
        if let Some(timeout) = self.timeout {
            settings.timeout_secs = timeout;
        }
    }
}

// ============================================================================
// Execution
// ============================================================================

pub async fn read_target<T: DatagramTransport>(
    gateway: &WallboxGateway<T>,
    target: &Target,
) -> DataStatus {
    match target {
        Target::All => gateway.read_all().await,
        Target::Report(report) => gateway.read_report(*report).await,
        Target::Property(name) => gateway.read_property(name).await,
    }
}

pub fn render_target<T: DatagramTransport>(gateway: &WallboxGateway<T>, target: &Target) -> Value {
    let data = gateway.data();
    let value = match target {
        Target::All => serde_json::to_value(&data),
        Target::Report(report) => data.report_json(*report),
        Target::Property(name) => Ok(serde_json::json!({
            name.as_str(): gateway.value(name).map(|v| v.to_json()),
        })),
    };
    value.unwrap_or_default()
}

fn print_status(status: &DataStatus) {
    if status.is_good() {
        println!("{}", status.name().green());
    } else if status.is_uncertain() {
        println!("{} {}", status.name().yellow(), status.explanation());
    } else {
        eprintln!("{} {}", status.name().red().bold(), status.explanation());
    }
}

fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(_) => println!("{}", value),
    }
}

fn exit_code(good: bool) -> ExitCode {
    if good {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Run one command line invocation
pub async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    let mut config = WallboxConfig::load(Some(&config_path))?;
    cli.apply_overrides(&mut config.device);
    config.device.validate()?;

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        config.logging.level.parse().unwrap_or(Level::INFO)
    };
    logging::init_with_config(LogConfig {
        service_name: "wallbox".to_string(),
        log_dir: config.logging.dir.as_ref().map(PathBuf::from),
        level,
        enable_json: config.logging.json,
        ansi: true,
    })
    .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    let gateway = Arc::new(WallboxGateway::new(config.device.clone())?);

    match cli.command {
        Commands::Info => {
            let settings = gateway.settings().await;
            println!("{}", "KEBA P30".bold().cyan());
            println!("  endpoint:   {}", settings.endpoint());
            println!("  local port: {}", settings.local_port);
            println!("  timeout:    {}s", settings.timeout_secs);
            let reachable = gateway.check_access().await;
            println!(
                "  access:     {}",
                if reachable { "ok".green() } else { "unreachable".red() }
            );
            if reachable && gateway.read_report1().await.is_good() {
                let product = gateway.report1_data();
                println!("  product:    {} ({})", product.product, product.serial);
                println!("  firmware:   {}", product.firmware);
            }
            Ok(exit_code(reachable))
        },
        Commands::Read {
            selection,
            property,
        } => {
            let target = selection.target(property.as_deref());
            let status = read_target(&gateway, &target).await;
            print_json(&render_target(&gateway, &target));
            print_status(&status);
            Ok(exit_code(status.is_good()))
        },
        Commands::Write { property, value } => {
            let status = gateway.write_property(&property, &value).await;
            print_json(&render_target(&gateway, &Target::Property(property)));
            print_status(&status);
            Ok(exit_code(status.is_good()))
        },
        Commands::Monitor {
            selection,
            property,
            repeat,
            interval,
        } => {
            let target = selection.target(property.as_deref());
            let options = MonitorOptions {
                repeat,
                interval: Duration::from_secs(interval),
            };
            let gw = gateway.as_ref();
            let target = &target;
            let summary = run_monitor(options, shutdown_token(), move |iteration| async move {
                let status = read_target(gw, target).await;
                println!("{} #{}", chrono::Local::now().format("%H:%M:%S"), iteration + 1);
                print_json(&render_target(gw, target));
                print_status(&status);
                status
            })
            .await;
            info!(
                "Monitor done: {} reads, {} failed",
                summary.iterations, summary.failures
            );
            Ok(exit_code(summary.last_status.is_some_and(|s| s.is_good())))
        },
        Commands::Serve { bind } => {
            let bind = bind.unwrap_or(config.api.bind_address);
            serve(gateway, &bind).await?;
            Ok(ExitCode::SUCCESS)
        },
    }
}

async fn serve<T: DatagramTransport + 'static>(
    gateway: Arc<WallboxGateway<T>>,
    bind: &str,
) -> anyhow::Result<()> {
    gateway.startup().await;

    let app = api::create_routes(gateway);
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!("Wallbox API listening on {}", listener.local_addr()?);

    let token = shutdown_token();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await?;
    info!("Wallbox API stopped");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_read_selection() {
        let cli = Cli::try_parse_from(["wallbox", "read", "--report3"]).unwrap();
        let Commands::Read { selection, property } = cli.command else {
            panic!("expected read");
        };
        assert_eq!(selection.target(property.as_deref()), Target::Report(Report::Report3));
        assert!(Cli::try_parse_from(["wallbox", "read", "--report1", "--report2"]).is_err());
    }

    #[test]
    fn test_write_and_overrides() {
        let cli = Cli::try_parse_from([
            "wallbox",
            "--address",
            "192.168.1.80",
            "--local-port",
            "0",
            "write",
            "CurrUser",
            "16",
        ])
        .unwrap();
        let mut settings = UdpSettings::default();
        cli.apply_overrides(&mut settings);
        assert_eq!(settings.address, "192.168.1.80");
        assert_eq!(settings.local_port, 0);
        assert_eq!(settings.port, 7090);
        let Commands::Write { property, value } = cli.command else {
            panic!("expected write");
        };
        assert_eq!((property.as_str(), value.as_str()), ("CurrUser", "16"));
    }

    #[test]
    fn test_property_excludes_selection_flags() {
        for command in ["read", "monitor"] {
            assert!(Cli::try_parse_from(["wallbox", command, "--report3", "Product"]).is_err());
            assert!(Cli::try_parse_from(["wallbox", command, "--data", "Product"]).is_err());
            assert!(Cli::try_parse_from(["wallbox", command, "Product"]).is_ok());
        }
    }

    #[test]
    fn test_monitor_interval_must_be_positive() {
        assert!(Cli::try_parse_from(["wallbox", "monitor", "--interval", "0"]).is_err());
        let cli = Cli::try_parse_from(["wallbox", "monitor", "--interval", "1"]).unwrap();
        assert!(matches!(cli.command, Commands::Monitor { interval: 1, .. }));
    }
}
