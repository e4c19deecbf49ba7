//! Session configuration and batch-size calibration.

use core::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Tunables for auto-mining.
///
/// Missing fields take their defaults when deserialized, so a host can pass a
/// partial object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Nonces per auto-mining batch.
    pub batch_size: u32,
    pub min_batch_size: u32,
    pub max_batch_size: u32,
    /// Wall-clock budget for one batch, in milliseconds.
    pub batch_budget_ms: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            batch_size: 100_000,
            min_batch_size: 1_000,
            max_batch_size: 4_000_000,
            batch_budget_ms: 50,
        }
    }
}

impl SessionConfig {
    /// Clamp inconsistent values: bounds are at least 1, `min <= max`, and
    /// the batch size lies within them.
    pub fn validated(self) -> Self {
        let min_batch_size = self.min_batch_size.max(1);
        let max_batch_size = self.max_batch_size.max(min_batch_size);
        SessionConfig {
            batch_size: self.batch_size.clamp(min_batch_size, max_batch_size),
            min_batch_size,
            max_batch_size,
            batch_budget_ms: self.batch_budget_ms.max(1),
        }
    }

    pub fn batch_budget(&self) -> Duration {
        Duration::from_millis(self.batch_budget_ms as u64)
    }
}

/// Adjusts the batch size so one batch fits the wall-clock budget.
#[derive(Debug, Clone)]
pub(crate) struct BatchSizer {
    config: SessionConfig,
    current: u32,
}

impl BatchSizer {
    pub(crate) fn new(config: SessionConfig) -> Self {
        let config = config.validated();
        BatchSizer {
            current: config.batch_size,
            config,
        }
    }

    pub(crate) fn current(&self) -> u32 {
        self.current
    }

    pub(crate) fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Halve after an over-budget batch, grow by a quarter after one that
    /// took less than half the budget.
    pub(crate) fn observe(&mut self, hashes: u64, elapsed: Duration) {
        if hashes == 0 {
            return;
        }
        let budget = self.config.batch_budget();
        let previous = self.current;

        if elapsed > budget {
            self.current = (self.current / 2).max(self.config.min_batch_size);
        } else if elapsed < budget / 2 {
            let grown = self.current.saturating_add((self.current / 4).max(1));
            self.current = grown.min(self.config.max_batch_size);
        }

        if self.current != previous {
            let elapsed_ms = elapsed.as_millis() as u64;
            debug!(previous, current = self.current, elapsed_ms, "Batch size adjusted");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validated_clamps() {
        let config = SessionConfig {
            batch_size: 10,
            min_batch_size: 0,
            max_batch_size: 5,
            batch_budget_ms: 0,
        }
        .validated();

        assert_eq!(config.min_batch_size, 1);
        assert_eq!(config.max_batch_size, 5);
        assert_eq!(config.batch_size, 5);
        assert_eq!(config.batch_budget_ms, 1);
    }

    #[test]
    fn test_partial_config_deserializes() {
        let config: SessionConfig = serde_json::from_str(r#"{"batch_size": 5000}"#).unwrap();
        assert_eq!(config.batch_size, 5000);
        assert_eq!(config.max_batch_size, SessionConfig::default().max_batch_size);
    }

    #[test]
    fn test_sizer_shrinks_when_over_budget() {
        let mut sizer = BatchSizer::new(SessionConfig::default());
        sizer.observe(100_000, Duration::from_millis(200));
        assert_eq!(sizer.current(), 50_000);

        for _ in 0..20 {
            sizer.observe(1, Duration::from_secs(1));
        }
        assert_eq!(sizer.current(), 1_000);
    }

    #[test]
    fn test_sizer_grows_when_fast() {
        let mut sizer = BatchSizer::new(SessionConfig::default());
        sizer.observe(100_000, Duration::from_millis(10));
        assert_eq!(sizer.current(), 125_000);

        for _ in 0..100 {
            sizer.observe(1, Duration::from_millis(1));
        }
        assert_eq!(sizer.current(), 4_000_000);
    }

    #[test]
    fn test_sizer_holds_within_band() {
        let mut sizer = BatchSizer::new(SessionConfig::default());
        sizer.observe(100_000, Duration::from_millis(40));
        assert_eq!(sizer.current(), 100_000);

        sizer.observe(0, Duration::from_secs(10));
        assert_eq!(sizer.current(), 100_000);
    }
}
