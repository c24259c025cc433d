use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Gate for work that should run less often than the sweep loop
pub struct TaskScheduler {
    interval: Duration,
    last_run: Mutex<Option<Instant>>,
}

impl TaskScheduler {
    /// The first `should_run` always returns true
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_run: Mutex::new(None),
        }
    }

    /// Check the interval and, if due, mark the task as run now
    pub fn should_run(&self) -> bool {
        let now = Instant::now();
        let mut last_run = self.last_run.lock();
        match *last_run {
            Some(previous) if now.duration_since(previous) < self.interval => false,
            _ => {
                *last_run = Some(now);
                true
            }
        }
    }

    pub fn reset(&self) {
        *self.last_run.lock() = None;
    }

    pub fn time_until_next_run(&self) -> Duration {
        match *self.last_run.lock() {
            Some(previous) => self.interval.saturating_sub(previous.elapsed()),
            None => Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_task_scheduler_should_run() {
        let scheduler = TaskScheduler::new(Duration::from_millis(100));

        assert!(scheduler.should_run());
        assert!(!scheduler.should_run());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(scheduler.should_run());
    }

    #[test]
    fn test_task_scheduler_reset() {
        let scheduler = TaskScheduler::new(Duration::from_secs(3600));

        assert!(scheduler.should_run());
        assert!(!scheduler.should_run());
        assert!(scheduler.time_until_next_run() > Duration::ZERO);

        scheduler.reset();
        assert_eq!(scheduler.time_until_next_run(), Duration::ZERO);
        assert!(scheduler.should_run());
    }
}
