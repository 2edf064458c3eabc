use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// What a tick callback wants the timer to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerStep {
    Continue,
    Stop,
}

/// Handle to a running per-room countdown.
///
/// The countdown runs as its own tokio task. Dropping the handle detaches the
/// task; `cancel` stops it at its next await point.
#[derive(Debug)]
pub struct PollTimer {
    generation: u64,
    task: JoinHandle<()>,
}

impl PollTimer {
    /// Starts ticking one `period` from now, invoking `on_tick` until it
    /// returns `TimerStep::Stop`.
    pub fn start<F, Fut>(period: Duration, generation: u64, mut on_tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = TimerStep> + Send + 'static,
    {
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if on_tick().await == TimerStep::Stop {
                    break;
                }
            }
        });

        Self { generation, task }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn cancel(&self) {
        self.task.abort();
    }

    #[cfg(test)]
    fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
