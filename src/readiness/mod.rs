//! Waiting for a freshly started container to answer.
//!
//! [`wait_until_ready`] runs a [`Probe`] until it succeeds, the deadline in
//! the [`ReadinessPolicy`] passes, or the cancellation token fires. Failed
//! attempts are expected while a service boots and are only logged at
//! `debug`. The delay between attempts doubles up to the policy's ceiling.

mod probe;

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub use probe::{HttpProbe, Probe, ProbeFuture, TcpProbe};

use crate::config::ReadinessConfig;
use crate::error::ReadinessError;

/// Timing for a readiness wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    /// Delay after the first failed attempt.
    pub initial_interval: Duration,
    /// Ceiling for the doubling delay.
    pub max_interval: Duration,
    /// Time after which the wait gives up.
    pub timeout: Duration,
}

impl ReadinessPolicy {
    /// Policy from the `[readiness]` configuration section.
    #[must_use]
    pub const fn from_config(config: &ReadinessConfig) -> Self {
        Self {
            initial_interval: config.interval(),
            max_interval: config.max_interval(),
            timeout: config.timeout(),
        }
    }
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self::from_config(&ReadinessConfig::default())
    }
}

/// Outcome of a successful wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadyReport {
    /// Attempts made, including the successful one.
    pub attempts: u32,
    /// Time from the first attempt to success.
    pub elapsed: Duration,
}

/// Probe until ready, timed out or cancelled.
///
/// No attempt is made after the first success or after cancellation.
///
/// # Errors
///
/// Returns `ReadinessError::Timeout` when the deadline passes and
/// `ReadinessError::Cancelled` when `cancel` fires first.
pub async fn wait_until_ready<P: Probe + ?Sized>(
    probe: &P,
    policy: &ReadinessPolicy,
    cancel: &CancellationToken,
) -> Result<ReadyReport, ReadinessError> {
    let started = Instant::now();
    let deadline = started + policy.timeout;
    let mut interval = policy.initial_interval;
    let mut attempts: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(cancelled(probe));
        }

        attempts = attempts.saturating_add(1);
        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(cancelled(probe)),
            outcome = tokio::time::timeout_at(deadline, probe.check()) => outcome,
        };

        match outcome {
            Ok(Ok(())) => {
                let elapsed = started.elapsed();
                info!(endpoint = probe.target(), attempts, ?elapsed, "ready");
                return Ok(ReadyReport { attempts, elapsed });
            }
            Ok(Err(reason)) => {
                debug!(endpoint = probe.target(), attempt = attempts, %reason, "not ready yet");
            }
            Err(_) => return Err(timed_out(probe, attempts, started)),
        }

        let wake = (Instant::now() + interval).min(deadline);
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(cancelled(probe)),
            () = tokio::time::sleep_until(wake) => {}
        }
        if Instant::now() >= deadline {
            return Err(timed_out(probe, attempts, started));
        }

        interval = interval.saturating_mul(2).min(policy.max_interval);
    }
}

fn cancelled<P: Probe + ?Sized>(probe: &P) -> ReadinessError {
    ReadinessError::Cancelled {
        target: probe.target().to_owned(),
    }
}

fn timed_out<P: Probe + ?Sized>(probe: &P, attempts: u32, started: Instant) -> ReadinessError {
    ReadinessError::Timeout {
        target: probe.target().to_owned(),
        attempts,
        elapsed: started.elapsed(),
    }
}
