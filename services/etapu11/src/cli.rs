//! Command line front end
//!
//! `etapu11 [global options] <info|read|write|monitor|serve>`. The process
//! exit code is 0 when the last operation was Good, 1 otherwise.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use common::logging::{self, LogConfig};
use common::shutdown_token;
use gateway_core::{run_monitor, DataStatus, ModbusSettings, MonitorOptions, RegisterTransport};
use serde_json::Value;
use tracing::{info, Level};

use crate::api;
use crate::config::{EtaPU11Config, DEFAULT_CONFIG_FILE};
use crate::gateway::EtaPU11Gateway;
use crate::registers::{self, Subsystem};

/// ETA PU 11 pellet boiler gateway
#[derive(Parser, Debug)]
#[command(name = "etapu11", version, about, long_about = None)]
pub struct Cli {
    /// Device address (overrides the config file)
    #[arg(long, global = true)]
    pub address: Option<String>,

    /// Modbus/TCP port
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Modbus unit identifier
    #[arg(long, global = true)]
    pub slave_id: Option<u8>,

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

    /// Read data from the controller
    Read {
        #[command(flatten)]
        selection: Selection,

        /// Single property to read
        #[arg(conflicts_with = "selection")]
        property: Option<String>,
    },

    /// Write a property
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
        /// Bind address (overrides the config file)
        #[arg(long)]
        bind: Option<String>,
    },
}

/// Which data a read covers; at most one flag
#[derive(Args, Debug, Clone, Default)]
#[group(id = "selection", multiple = false)]
pub struct Selection {
    /// All data (default)
    #[arg(long)]
    pub data: bool,
    #[arg(long)]
    pub boiler: bool,
    #[arg(long)]
    pub hotwater: bool,
    #[arg(long)]
    pub heating: bool,
    #[arg(long)]
    pub storage: bool,
    #[arg(long)]
    pub system: bool,
    /// Block read of the whole register map
    #[arg(long)]
    pub block: bool,
}

/// Resolved read target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    All,
    Block,
    Subsystem(Subsystem),
    Property(String),
}

impl Selection {
    pub fn target(&self, property: Option<&str>) -> Target {
        let subsystem = [
            (self.boiler, Subsystem::Boiler),
            (self.hotwater, Subsystem::Hotwater),
            (self.heating, Subsystem::Heating),
            (self.storage, Subsystem::Storage),
            (self.system, Subsystem::System),
        ]
        .into_iter()
        .find_map(|(set, subsystem)| set.then_some(subsystem));

        match (property, subsystem) {
            (Some(name), _) => Target::Property(name.to_string()),
            (None, Some(subsystem)) => Target::Subsystem(subsystem),
            (None, None) if self.block => Target::Block,
            (None, None) => Target::All,
        }
    }
}

impl Cli {
    /// Replace device settings given on the command line
    pub fn apply_overrides(&self, settings: &mut ModbusSettings) {
        if let Some(address) = &self.address {
            settings.address = address.clone();
        }
        if let Some(port) = self.port {
            settings.port = port;
        }
        if let Some(slave_id) = self.slave_id {
            settings.slave_id = slave_id;
        }
        if let Some(timeout) = self.timeout {
            settings.timeout_secs = timeout;
        }
    }
}

// ============================================================================
// Execution
// ============================================================================

pub async fn read_target<T: RegisterTransport>(
    gateway: &EtaPU11Gateway<T>,
    target: &Target,
) -> DataStatus {
    match target {
        Target::All => gateway.read_all().await,
        Target::Block => gateway.read_block().await,
        Target::Subsystem(subsystem) => gateway.read_subsystem(*subsystem).await,
        Target::Property(name) => gateway.read_property(name).await,
    }
}

/// Current data for a target as JSON
pub fn render_target<T: RegisterTransport>(gateway: &EtaPU11Gateway<T>, target: &Target) -> Value {
    let data = gateway.data();
    let value = match target {
        Target::All | Target::Block => serde_json::to_value(&data),
        Target::Subsystem(subsystem) => data.subsystem_json(*subsystem),
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
    let mut config = EtaPU11Config::load(Some(&config_path))?;
    cli.apply_overrides(&mut config.device);
    config.device.validate()?;

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        config.logging.level.parse().unwrap_or(Level::INFO)
    };
    logging::init_with_config(LogConfig {
        service_name: "etapu11".to_string(),
        log_dir: config.logging.dir.as_ref().map(PathBuf::from),
        level,
        enable_json: config.logging.json,
        ansi: true,
    })
    .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    let gateway = Arc::new(EtaPU11Gateway::new(config.device.clone())?);

    match cli.command {
        Commands::Info => {
            let settings = gateway.settings().await;
            let registry = registers::registry()?;
            println!("{}", "ETA PU 11".bold().cyan());
            println!("  endpoint: {} (unit {})", settings.endpoint(), settings.slave_id);
            println!("  timeout:  {}s", settings.timeout_secs);
            println!(
                "  fields:   {} in {} groups",
                registry.len(),
                registry.groups().len()
            );
            let reachable = gateway.check_access().await;
            println!(
                "  access:   {}",
                if reachable { "ok".green() } else { "unreachable".red() }
            );
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

async fn serve<T: RegisterTransport + 'static>(
    gateway: Arc<EtaPU11Gateway<T>>,
    bind: &str,
) -> anyhow::Result<()> {
    gateway.startup().await;

    let app = api::create_routes(gateway);
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!("ETAPU11 API listening on {}", listener.local_addr()?);

    let token = shutdown_token();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await?;
    info!("ETAPU11 API stopped");
    Ok(())
}
