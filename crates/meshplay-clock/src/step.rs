//! Fixed-step world scheduler.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// What to do when a step fires late.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StepPolicy {
    /// Skip the missed step(s) and resume from now.
    #[default]
    Skip,
    /// Fire missed steps back to back, at most `max_catchup` of them.
    CatchUp { max_catchup: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepConfig {
    /// Steps per second. 0 disables stepping.
    pub rate_hz: u32,
    pub policy: StepPolicy,
}

impl Default for StepConfig {
    fn default() -> Self {
        Self {
            rate_hz: 4,
            policy: StepPolicy::default(),
        }
    }
}

impl StepConfig {
    pub const MAX_RATE_HZ: u32 = 128;

    pub fn with_rate(rate_hz: u32) -> Self {
        Self {
            rate_hz,
            ..Default::default()
        }
    }

    /// Duration of one step, or `None` when stepping is disabled.
    pub fn step_duration(&self) -> Option<Duration> {
        match self.rate_hz.min(Self::MAX_RATE_HZ) {
            0 => None,
            hz => Some(Duration::from_secs_f64(1.0 / f64::from(hz))),
        }
    }
}

// ---------------------------------------------------------------------------
// Step info
// ---------------------------------------------------------------------------

/// Returned by [`StepScheduler::wait_for_step`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepInfo {
    /// Monotonically increasing step number, starting at 1.
    pub step: u64,
    /// `true` if the step fired more than 10% of a step late.
    pub overrun: bool,
    /// Steps dropped because of the overrun.
    pub skipped: u64,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Drives the world step loop of one peer.
///
/// Created paused: nothing moves until the game's start deadline fires
/// and the owner calls [`resume`](Self::resume). Meant to sit in a
/// `tokio::select!` next to the peer's other event sources:
///
/// ```ignore
/// tokio::select! {
///     Some(event) = events.recv() => { /* ... */ }
///     info = scheduler.wait_for_step() => controller.step(),
/// }
/// ```
pub struct StepScheduler {
    config: StepConfig,
    step_duration: Option<Duration>,
    step_count: u64,
    next_step: Option<Instant>,
    paused: bool,
    total_overruns: u64,
}

impl StepScheduler {
    pub fn new(config: StepConfig) -> Self {
        if config.rate_hz > StepConfig::MAX_RATE_HZ {
            warn!(
                rate = config.rate_hz,
                max = StepConfig::MAX_RATE_HZ,
                "step rate exceeds maximum, clamping"
            );
        }
        let step_duration = config.step_duration();
        debug!(rate_hz = config.rate_hz, policy = ?config.policy, "step scheduler created");
        Self {
            config,
            step_duration,
            step_count: 0,
            next_step: None,
            paused: true,
            total_overruns: 0,
        }
    }

    pub fn with_rate(rate_hz: u32) -> Self {
        Self::new(StepConfig::with_rate(rate_hz))
    }

    /// Waits for the next step.
    ///
    /// Pends forever while paused or when stepping is disabled, so the
    /// other `select!` branches keep running.
    pub async fn wait_for_step(&mut self) -> StepInfo {
        let (next, step) = match (self.next_step, self.step_duration) {
            (Some(next), Some(step)) if !self.paused => (next, step),
            _ => std::future::pending().await,
        };

        time::sleep_until(next).await;

        let now = Instant::now();
        self.step_count += 1;

        let late_by = now.saturating_duration_since(next);
        let overrun = late_by > step / 10;
        let behind = (late_by.as_nanos() / step.as_nanos()) as u64;
        let mut skipped = 0;

        self.next_step = Some(match self.config.policy {
            StepPolicy::Skip => {
                if overrun && behind > 0 {
                    skipped = behind;
                    warn!(step = self.step_count, skipped, "step overrun, skipping ahead");
                }
                now + step
            }
            StepPolicy::CatchUp { max_catchup } => {
                if behind <= u64::from(max_catchup) {
                    next + step
                } else {
                    skipped = behind - u64::from(max_catchup);
                    warn!(
                        step = self.step_count,
                        behind,
                        skipped,
                        "step overrun beyond catch-up cap"
                    );
                    now + step
                }
            }
        });

        if overrun {
            self.total_overruns += 1;
        }
        trace!(step = self.step_count, overrun, "step fired");

        StepInfo {
            step: self.step_count,
            overrun,
            skipped,
        }
    }

    /// Stops stepping. Idempotent.
    pub fn pause(&mut self) {
        if !self.paused {
            self.paused = true;
            debug!(step = self.step_count, "step scheduler paused");
        }
    }

    /// Starts (or restarts) stepping one step from now.
    pub fn resume(&mut self) {
        if self.paused {
            self.paused = false;
            self.next_step = self.step_duration.map(|d| Instant::now() + d);
            debug!(step = self.step_count, "step scheduler resumed");
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    pub fn total_overruns(&self) -> u64 {
        self.total_overruns
    }

    pub fn step_duration(&self) -> Option<Duration> {
        self.step_duration
    }
}
