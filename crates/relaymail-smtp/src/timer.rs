//! Cancellable single-shot deadlines for the connect and watchdog timers.

use std::time::Duration;
use tokio::time::{Instant, sleep_until};

/// A deadline on tokio's monotonic clock that can be armed, re-armed and
/// disarmed.
///
/// A disarmed deadline never expires, so it can sit in a `select!` arm
/// unconditionally.
#[derive(Debug, Clone, Copy, Default)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    /// Creates a disarmed deadline.
    #[must_use]
    pub const fn disarmed() -> Self {
        Self { at: None }
    }

    /// Arms (or re-arms) the deadline to fire `timeout` from now.
    ///
    /// A timeout too large for the clock to represent leaves the deadline
    /// disarmed, so it never fires.
    pub fn arm(&mut self, timeout: Duration) {
        self.at = Instant::now().checked_add(timeout);
    }

    /// Cancels the deadline.
    pub const fn disarm(&mut self) {
        self.at = None;
    }

    /// Returns true if the deadline is armed.
    #[must_use]
    pub const fn is_armed(&self) -> bool {
        self.at.is_some()
    }

    /// Completes when the deadline passes. Pending forever while disarmed.
    pub async fn expired(&self) {
        match self.at {
            Some(at) => sleep_until(at).await,
            None => std::future::pending().await,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    #[tokio::test(start_paused = true)]
    async fn fires_after_timeout() {
        let mut deadline = Deadline::disarmed();
        deadline.arm(Duration::from_secs(5));
        assert!(deadline.is_armed());

        let start = Instant::now();
        deadline.expired().await;
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn disarmed_never_fires() {
        let mut deadline = Deadline::disarmed();
        deadline.arm(Duration::from_secs(1));
        deadline.disarm();
        assert!(!deadline.is_armed());

        let result = timeout(Duration::from_secs(3600), deadline.expired()).await;
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn unrepresentable_timeout_never_fires() {
        let mut deadline = Deadline::disarmed();
        deadline.arm(Duration::MAX);
        assert!(!deadline.is_armed());

        let result = timeout(Duration::from_secs(3600), deadline.expired()).await;
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn rearm_pushes_deadline_back() {
        let mut deadline = Deadline::disarmed();
        deadline.arm(Duration::from_secs(2));
        tokio::time::advance(Duration::from_secs(1)).await;
        deadline.arm(Duration::from_secs(2));

        let start = Instant::now();
        deadline.expired().await;
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }
}
