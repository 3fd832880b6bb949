//! Repeated polling loop
//!
//! Runs one gateway operation at a fixed pace until the repeat count is
//! reached or the cancellation token fires. The token is owned by the caller;
//! nothing here is process wide.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::status::DataStatus;

/// Pacing of a monitor loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorOptions {
    /// Number of iterations; 0 runs until cancelled
    pub repeat: u32,
    /// Target time between iteration starts
    pub interval: Duration,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            repeat: 0,
            interval: Duration::from_secs(10),
        }
    }
}

/// Outcome of a finished monitor loop
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorSummary {
    pub iterations: u32,
    pub failures: u32,
    pub last_status: Option<DataStatus>,
    pub cancelled: bool,
}

/// Run `op` repeatedly
///
/// An iteration that takes longer than the interval is logged as a warning
/// and the next one starts immediately. Cancellation is honoured between
/// iterations; a running operation is allowed to finish.
pub async fn run_monitor<F, Fut>(
    options: MonitorOptions,
    token: CancellationToken,
    mut op: F,
) -> MonitorSummary
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = DataStatus>,
{
    let mut summary = MonitorSummary {
        iterations: 0,
        failures: 0,
        last_status: None,
        cancelled: false,
    };

    loop {
        if token.is_cancelled() {
            summary.cancelled = true;
            break;
        }

        let started = Instant::now();
        let status = op(summary.iterations).await;
        summary.iterations += 1;
        if status.is_not_good() {
            summary.failures += 1;
        }
        summary.last_status = Some(status);

        if options.repeat > 0 && summary.iterations >= options.repeat {
            break;
        }

        let elapsed = started.elapsed();
        if elapsed > options.interval {
            warn!(
                "Monitor iteration {} took {:?}, longer than the {:?} interval",
                summary.iterations, elapsed, options.interval
            );
            continue;
        }

        tokio::select! {
            _ = tokio::time::sleep(options.interval - elapsed) => {},
            _ = token.cancelled() => {
                summary.cancelled = true;
                break;
            },
        }
    }

    if summary.cancelled {
        info!("Monitor stopped after {} iterations", summary.iterations);
    } else {
        debug!("Monitor finished {} iterations", summary.iterations);
    }
    summary
}
