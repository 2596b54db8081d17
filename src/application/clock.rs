use crate::error::RentalError;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_secs(60);

/// Engine tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    tick_period: Duration,
}

impl EngineConfig {
    /// One accrual tick per `tick_period` of wall-clock time. Must be non-zero.
    pub fn with_tick_period(tick_period: Duration) -> Result<Self, RentalError> {
        if tick_period.is_zero() {
            return Err(RentalError::ConfigError(
                "tick period must be greater than zero".to_string(),
            ));
        }
        Ok(Self { tick_period })
    }

    pub fn tick_period(&self) -> Duration {
        self.tick_period
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_period: DEFAULT_TICK_PERIOD,
        }
    }
}

/// A periodic task on the tokio runtime, aborted when dropped.
///
/// Ticks are scheduled on a fixed grid starting at `first_tick`; ticks missed
/// while the runtime was not polling (device sleep, a busy executor) are
/// delivered in a burst instead of being skipped.
pub(crate) struct AccrualClock {
    handle: JoinHandle<()>,
}

impl AccrualClock {
    /// Starts calling `on_tick` until it returns `false`.
    ///
    /// Returns `None` outside of a tokio runtime.
    pub(crate) fn spawn<F>(first_tick: Instant, period: Duration, mut on_tick: F) -> Option<Self>
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let runtime = Handle::try_current().ok()?;
        let handle = runtime.spawn(async move {
            let mut interval = time::interval_at(first_tick, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Burst);
            loop {
                interval.tick().await;
                if !on_tick() {
                    break;
                }
            }
        });
        Some(Self { handle })
    }
}

impl Drop for AccrualClock {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
