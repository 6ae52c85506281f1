use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};
use tracing::{debug, info};

pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(20_000);

/// Periodic liveness timer. Only ticks while started; responses are not
/// tracked.
#[derive(Debug, Default)]
pub struct HeartbeatScheduler {
    interval: Option<Interval>,
}

impl HeartbeatScheduler {
    /// (Re)starts the timer. The first tick is one full period away.
    pub fn start(&mut self, period: Duration) {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.interval = Some(interval);
        info!(interval_ms = period.as_millis() as u64, "heartbeat started");
    }

    pub fn stop(&mut self) {
        if self.interval.take().is_some() {
            debug!("heartbeat stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.interval.is_some()
    }

    /// Completes on the next tick; never completes while stopped.
    /// Cancel-safe, so it can sit in a `select!` loop.
    pub async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }
}
