//! Logging setup for the gateway binaries
//!
//! Console output always; an optional daily rolling file next to it. The
//! filter sits behind a reload handle so the admin endpoint can change it
//! while a service runs.

use std::path::PathBuf;
use std::sync::OnceLock;

use parking_lot::Mutex;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::Writer, FmtContext, FormatEvent, FormatFields},
    layer::SubscriberExt,
    registry::LookupSpan,
    reload,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// `[LEVEL]` tag and its ANSI color
fn level_style(level: Level) -> (&'static str, &'static str) {
    match level {
        Level::TRACE => ("[TRACE]", "\x1b[35m"),
        Level::DEBUG => ("[DEBUG]", "\x1b[34m"),
        Level::INFO => ("[INFO]", "\x1b[32m"),
        Level::WARN => ("[WARN]", "\x1b[33m"),
        Level::ERROR => ("[ERROR]", "\x1b[31m"),
    }
}

/// `2025-12-02T00:50:44.809123Z [WARN] read_all: ETAPU11 ReadAll: BadTimeout`
struct GatewayFormat;

impl<S, N> FormatEvent<S, N> for GatewayFormat
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        write!(writer, "{} ", chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ"))?;

        let (tag, color) = level_style(*event.metadata().level());
        if writer.has_ansi_escapes() {
            write!(writer, "{color}{tag}\x1b[0m ")?;
        } else {
            write!(writer, "{tag} ")?;
        }

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, "{}: ", span.name())?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

type FilterHandle = reload::Handle<EnvFilter, tracing_subscriber::Registry>;

struct LoggingState {
    handle: FilterHandle,
    current: Mutex<String>,
    // Dropping this stops the file writer
    _file_guard: Option<WorkerGuard>,
}

static STATE: OnceLock<LoggingState> = OnceLock::new();

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Also the crate target that gets `debug` at the default level
    pub service_name: String,
    /// `None` logs to the console only
    pub log_dir: Option<PathBuf>,
    /// Used when `RUST_LOG` is unset
    pub level: Level,
    /// JSON lines in the log file
    pub enable_json: bool,
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "gateway".to_string(),
            log_dir: None,
            level: Level::INFO,
            enable_json: false,
            ansi: true,
        }
    }
}

/// Filter directive: `RUST_LOG` wins; at `info` the service crate itself
/// logs at `debug` so every operation status shows up.
fn filter_directive(config: &LogConfig, rust_log: Option<String>) -> String {
    match rust_log {
        Some(directive) if !directive.is_empty() => directive,
        _ if config.level == Level::INFO => format!(
            "info,{}=debug,gateway_core=info",
            config.service_name.replace('-', "_")
        ),
        _ => config.level.as_str().to_lowercase(),
    }
}

pub fn init_with_config(config: LogConfig) -> Result<(), Box<dyn std::error::Error>> {
    let directive = filter_directive(&config, std::env::var("RUST_LOG").ok());
    let (filter, handle) = reload::Layer::new(EnvFilter::try_new(&directive)?);

    let console = fmt::layer()
        .with_ansi(config.ansi)
        .event_format(GatewayFormat)
        .boxed();

    let mut file_guard = None;
    let file = match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender =
                tracing_appender::rolling::daily(dir, format!("{}.log", config.service_name));
            let (writer, guard) = tracing_appender::non_blocking(appender);
            file_guard = Some(guard);

            Some(if config.enable_json {
                fmt::layer().json().with_writer(writer).with_target(true).boxed()
            } else {
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .event_format(GatewayFormat)
                    .boxed()
            })
        },
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()?;

    let _ = STATE.set(LoggingState {
        handle,
        current: Mutex::new(directive),
        _file_guard: file_guard,
    });

    tracing::debug!("Logging: {} @ {:?}", config.service_name, config.log_dir);
    Ok(())
}

/// Console only at the given level
pub fn init(service_name: &str, level: &str) -> Result<(), Box<dyn std::error::Error>> {
    init_with_config(LogConfig {
        service_name: service_name.to_string(),
        level: level.parse().unwrap_or(Level::INFO),
        ..Default::default()
    })
}

/// Swap the filter at runtime
///
/// Accepts a plain level ("debug") or a full directive ("info,etapu11=trace").
pub fn set_log_level(level: &str) -> Result<(), String> {
    let state = STATE.get().ok_or("Logging not initialized")?;
    let filter =
        EnvFilter::try_new(level).map_err(|e| format!("Invalid log level '{}': {}", level, e))?;
    state
        .handle
        .reload(filter)
        .map_err(|e| format!("Failed to reload log filter: {}", e))?;
    *state.current.lock() = level.to_string();

    tracing::info!("Log level changed to: {}", level);
    Ok(())
}

pub fn get_log_level() -> String {
    STATE
        .get()
        .map(|state| state.current.lock().clone())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_tags() {
        assert_eq!(level_style(Level::INFO).0, "[INFO]");
        assert_eq!(level_style(Level::ERROR).0, "[ERROR]");
    }

    #[test]
    fn test_filter_directive() {
        let config = LogConfig {
            service_name: "etapu11".into(),
            ..Default::default()
        };
        assert_eq!(
            filter_directive(&config, None),
            "info,etapu11=debug,gateway_core=info"
        );
        assert_eq!(filter_directive(&config, Some("trace".into())), "trace");
        assert_eq!(
            filter_directive(&config, Some(String::new())),
            "info,etapu11=debug,gateway_core=info"
        );

        let quiet = LogConfig {
            level: Level::WARN,
            ..config
        };
        assert_eq!(filter_directive(&quiet, None), "warn");
    }

    #[test]
    fn test_set_log_level_before_init_fails() {
        if STATE.get().is_none() {
            assert!(set_log_level("debug").is_err());
            assert_eq!(get_log_level(), "unknown");
        }
    }
}
