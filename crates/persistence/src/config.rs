use std::time::Duration;

/// Timing of the save pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Quiescence window after the last mutation before a save starts.
    pub debounce: Duration,
    /// Delay before the first retry of a transient failure.
    pub retry_delay: Duration,
    /// Upper bound of the doubling retry back-off.
    pub max_retry_delay: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(1000),
            retry_delay: Duration::from_secs(2),
            max_retry_delay: Duration::from_secs(30),
        }
    }
}

impl CoordinatorConfig {
    /// The retry delay that follows `previous`.
    pub fn next_retry_delay(&self, previous: Option<Duration>) -> Duration {
        match previous {
            None => self.retry_delay.min(self.max_retry_delay),
            Some(delay) => delay.saturating_mul(2).min(self.max_retry_delay),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_back_off_doubles_up_to_the_cap() {
        let config = CoordinatorConfig {
            retry_delay: Duration::from_secs(2),
            max_retry_delay: Duration::from_secs(10),
            ..CoordinatorConfig::default()
        };
        let first = config.next_retry_delay(None);
        let second = config.next_retry_delay(Some(first));
        let third = config.next_retry_delay(Some(second));
        let fourth = config.next_retry_delay(Some(third));
        assert_eq!(first, Duration::from_secs(2));
        assert_eq!(second, Duration::from_secs(4));
        assert_eq!(third, Duration::from_secs(8));
        assert_eq!(fourth, Duration::from_secs(10));
    }
}
