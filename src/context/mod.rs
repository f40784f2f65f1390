use std::time::Duration;
use tokio::time::Instant;

use crate::config::Config;
use crate::fetch::HttpFetcher;
use crate::Result;

/// Wall-clock budget for a whole run. Stage timeouts are clamped to what is left.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    /// `None` when the budget is too large to represent as an `Instant`
    at: Option<Instant>,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now().checked_add(budget),
        }
    }

    pub fn remaining(&self) -> Duration {
        match self.at {
            Some(at) => at.saturating_duration_since(Instant::now()),
            None => Duration::MAX,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }

    /// The smaller of `timeout` and the time left
    pub fn clamp(&self, timeout: Duration) -> Duration {
        timeout.min(self.remaining())
    }
}

/// Everything a stage needs: configuration, the shared HTTP client and the run deadline.
pub struct RunContext {
    pub config: Config,
    pub http: HttpFetcher,
    pub deadline: Deadline,
}

impl RunContext {
    pub fn new(config: Config) -> Result<Self> {
        let http = HttpFetcher::new(&config.http)?;
        let deadline = Deadline::after(Duration::from_secs(config.run.deadline_secs));
        Ok(Self {
            config,
            http,
            deadline,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clamp_never_exceeds_remaining_budget() {
        let deadline = Deadline::after(Duration::from_millis(50));
        assert!(deadline.clamp(Duration::from_secs(60)) <= Duration::from_millis(50));
        assert_eq!(
            deadline.clamp(Duration::from_millis(1)),
            Duration::from_millis(1)
        );
    }

    #[test]
    fn huge_budgets_mean_no_deadline() {
        let deadline = Deadline::after(Duration::from_secs(u64::MAX));
        assert!(!deadline.is_expired());
        assert_eq!(deadline.clamp(Duration::from_secs(30)), Duration::from_secs(30));

        let mut config = Config::default();
        config.run.deadline_secs = u64::MAX;
        let ctx = RunContext::new(config).unwrap();
        assert!(!ctx.deadline.is_expired());
    }

    #[tokio::test]
    async fn expired_deadline_has_no_time_left() {
        let deadline = Deadline::after(Duration::ZERO);
        assert!(deadline.is_expired());
        assert_eq!(deadline.clamp(Duration::from_secs(5)), Duration::ZERO);
    }
}
