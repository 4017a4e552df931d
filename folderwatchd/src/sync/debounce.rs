use std::time::Duration;

use tokio::time::Instant;

pub const DEFAULT_DRAIN_DELAY: Duration = Duration::from_secs(1);

/// Pending "drain the queue" request owned by the engine task.
///
/// At most one deadline exists; scheduling while one is pending keeps it.
#[derive(Debug, Clone)]
pub struct DrainTimer {
    delay: Duration,
    deadline: Option<Instant>,
}

impl DrainTimer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    pub fn schedule(&mut self) {
        if self.deadline.is_none() {
            self.deadline = Some(Instant::now() + self.delay);
        }
    }

    /// Pulls any pending deadline forward to now.
    pub fn schedule_now(&mut self) {
        self.deadline = Some(Instant::now());
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Clears and reports the deadline if it has passed.
    pub fn take_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

/// Resolves at `deadline`, or never when there is none.
pub async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}
