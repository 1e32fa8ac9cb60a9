/// Due-time tracker for one periodic activity. Each timer measures its period
/// from its own last firing, so slow activities never drag others into
/// lockstep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodicTimer {
    period_ms: u64,
    last_fired_ms: Option<u64>,
}

impl PeriodicTimer {
    /// Fires on the first check, then every `period_ms`.
    pub fn new(period_ms: u64) -> Self {
        Self {
            period_ms,
            last_fired_ms: None,
        }
    }

    pub fn last_fired_ms(&self) -> Option<u64> {
        self.last_fired_ms
    }

    pub fn is_due(&self, now_ms: u64) -> bool {
        self.last_fired_ms
            .map(|last| now_ms.saturating_sub(last) >= self.period_ms)
            .unwrap_or(true)
    }

    /// Check and, when due, record `now_ms` as the new firing time.
    pub fn due_since(&mut self, now_ms: u64) -> bool {
        if self.is_due(now_ms) {
            self.last_fired_ms = Some(now_ms);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_immediately_then_on_period() {
        let mut timer = PeriodicTimer::new(5_000);

        assert!(timer.due_since(100));
        assert!(!timer.due_since(100));
        assert!(!timer.due_since(5_099));
        assert!(timer.due_since(5_100));
        assert_eq!(timer.last_fired_ms(), Some(5_100));
    }

    #[test]
    fn late_check_reanchors_on_actual_fire_time() {
        let mut timer = PeriodicTimer::new(5_000);
        assert!(timer.due_since(0));

        // A long blocking call delayed this check; the next period counts from here.
        assert!(timer.due_since(12_345));
        assert!(!timer.due_since(17_344));
        assert!(timer.due_since(17_345));
    }

    #[test]
    fn is_due_does_not_consume() {
        let mut timer = PeriodicTimer::new(1_000);
        timer.due_since(0);

        assert!(timer.is_due(1_000));
        assert!(timer.is_due(1_000));
        assert_eq!(timer.last_fired_ms(), Some(0));
    }
}
