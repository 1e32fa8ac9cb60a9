use std::fmt;

/// Why the outputs are being held off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailSafeCause {
    LinkDown,
    RepeatedFailures(u32),
    StaleSensor,
}

impl FailSafeCause {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LinkDown => "LINK_DOWN",
            Self::RepeatedFailures(_) => "REPEATED_FAILURES",
            Self::StaleSensor => "STALE_SENSOR",
        }
    }
}

impl fmt::Display for FailSafeCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LinkDown => f.write_str("network link down"),
            Self::RepeatedFailures(n) => write!(f, "{n} consecutive network failures"),
            Self::StaleSensor => f.write_str("no plausible sensor reading"),
        }
    }
}

/// Tracks link state, consecutive network failures and sensor freshness.
#[derive(Debug, Clone)]
pub struct FailSafe {
    failure_threshold: u32,
    sensor_stale_timeout_ms: u64,
    consecutive_failures: u32,
    link_up: bool,
    last_good_sample_ms: Option<u64>,
}

impl FailSafe {
    pub fn new(failure_threshold: u32, sensor_stale_timeout_ms: u64) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            sensor_stale_timeout_ms,
            consecutive_failures: 0,
            link_up: true,
            last_good_sample_ms: None,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn link_up(&self) -> bool {
        self.link_up
    }

    pub fn set_link(&mut self, connected: bool) {
        self.link_up = connected;
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    pub fn record_failure(&mut self) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
    }

    pub fn record_good_sample(&mut self, now_ms: u64) {
        self.last_good_sample_ms = Some(now_ms);
    }

    pub fn is_sensor_data_valid(&self, now_ms: u64) -> bool {
        self.last_good_sample_ms
            .map(|last| now_ms.saturating_sub(last) < self.sensor_stale_timeout_ms)
            .unwrap_or(false)
    }

    /// The first applicable cause, if any. Link loss outranks counted failures.
    pub fn cause(&self, now_ms: u64) -> Option<FailSafeCause> {
        if !self.link_up {
            return Some(FailSafeCause::LinkDown);
        }
        if self.consecutive_failures >= self.failure_threshold {
            return Some(FailSafeCause::RepeatedFailures(self.consecutive_failures));
        }
        if !self.is_sensor_data_valid(now_ms) {
            return Some(FailSafeCause::StaleSensor);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_at_threshold_and_resets_on_success() {
        let mut failsafe = FailSafe::new(3, 30_000);
        failsafe.record_good_sample(0);

        failsafe.record_failure();
        failsafe.record_failure();
        assert_eq!(failsafe.cause(10), None);

        failsafe.record_failure();
        assert_eq!(failsafe.cause(10), Some(FailSafeCause::RepeatedFailures(3)));

        failsafe.record_success();
        assert_eq!(failsafe.cause(10), None);
        assert_eq!(failsafe.consecutive_failures(), 0);
    }

    #[test]
    fn link_loss_wins_over_other_causes() {
        let mut failsafe = FailSafe::new(1, 30_000);
        failsafe.record_failure();
        failsafe.set_link(false);

        assert_eq!(failsafe.cause(0), Some(FailSafeCause::LinkDown));

        failsafe.set_link(true);
        assert_eq!(failsafe.cause(0), Some(FailSafeCause::RepeatedFailures(1)));
    }

    #[test]
    fn stale_sensor_after_timeout() {
        let mut failsafe = FailSafe::new(3, 30_000);
        assert_eq!(failsafe.cause(0), Some(FailSafeCause::StaleSensor));

        failsafe.record_good_sample(1_000);
        assert_eq!(failsafe.cause(30_999), None);
        assert_eq!(failsafe.cause(31_000), Some(FailSafeCause::StaleSensor));
    }
}
