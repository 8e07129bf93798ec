//! Time source for the run-window controller and scheduler.
//!
//! Production code uses [`SystemClock`]; tests drive a [`ManualClock`] whose
//! `sleep_until` jumps the virtual time forward instead of waiting.

use std::sync::Mutex;

use chrono::{DateTime, Duration as ChronoDuration, Utc};

#[async_trait::async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Suspend until `deadline`. Returns immediately if it already passed.
    async fn sleep_until(&self, deadline: DateTime<Utc>);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait::async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep_until(&self, deadline: DateTime<Utc>) {
        let wait = deadline.signed_duration_since(Utc::now());
        if let Ok(d) = wait.to_std() {
            tokio::time::sleep(d).await;
        }
    }
}

/// Virtual clock. Never goes backwards.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: ChronoDuration) {
        let mut now = self.now.lock().expect("clock mutex poisoned");
        if by > ChronoDuration::zero() {
            *now += by;
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        let mut now = self.now.lock().expect("clock mutex poisoned");
        if at > *now {
            *now = at;
        }
    }
}

#[async_trait::async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock mutex poisoned")
    }

    async fn sleep_until(&self, deadline: DateTime<Utc>) {
        self.set(deadline);
        // Let other tasks observe the new time.
        tokio::task::yield_now().await;
    }
}
