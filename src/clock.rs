use std::time::Duration;

use hifitime::prelude::{Epoch, TimeScale};

/// Time source shared by the reconnect state machine, the gateway retry
/// path and the telemetry buffer. Injected so that none of them need real
/// timers under test.
#[async_trait::async_trait]
pub trait Clock: Send + Sync {
    /// Current [Epoch], expressed in [TimeScale::UTC]
    fn now(&self) -> Epoch;

    /// Suspends the calling task for `duration`
    async fn sleep(&self, duration: Duration);
}

/// [Clock] backed by the system time and the tokio timer.
#[derive(Debug, Default, Copy, Clone)]
pub struct SystemClock;

#[async_trait::async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Epoch {
        Epoch::now()
            .unwrap_or_default()
            .to_time_scale(TimeScale::UTC)
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
pub mod test {
    use super::Clock;
    use hifitime::prelude::{Duration as Span, Epoch};
    use std::{str::FromStr, sync::Mutex, time::Duration};

    /// [Clock] that never blocks: every sleep is recorded
    /// and advances the internal epoch by the requested amount.
    pub struct ManualClock {
        now: Mutex<Epoch>,
        sleeps: Mutex<Vec<Duration>>,
    }

    impl ManualClock {
        pub fn new() -> Self {
            Self {
                now: Mutex::new(Epoch::from_str("2024-06-01T00:00:00 UTC").unwrap()),
                sleeps: Mutex::new(Vec::new()),
            }
        }

        pub fn sleeps(&self) -> Vec<Duration> {
            self.sleeps.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl Clock for ManualClock {
        fn now(&self) -> Epoch {
            *self.now.lock().unwrap()
        }

        async fn sleep(&self, duration: Duration) {
            self.sleeps.lock().unwrap().push(duration);
            let mut now = self.now.lock().unwrap();
            *now += Span::from_milliseconds(duration.as_millis() as f64);
        }
    }
}
