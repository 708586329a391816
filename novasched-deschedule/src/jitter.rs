use std::time::Duration;

use rand::Rng;

/// Capped exponential-ish poll back-off: `base * 2^attempt`, clamped to
/// `cap`, then jittered by +/-50% so a fleet of executors polling the same
/// compute API don't all wake in lockstep. Shaped after
/// `SchedulingQueue::push_backoff`'s `2^attempts` schedule, but capped
/// rather than left to grow unbounded — poll retries, unlike scheduling
/// retries, must not back off for minutes.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub base: Duration,
    pub cap: Duration,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap }
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let multiplier = 1u32 << attempt.min(20);
        let exp = self.base.saturating_mul(multiplier);
        let capped = exp.min(self.cap);
        jitter(capped)
    }
}

/// Scales a duration by a random factor in `[0.5, 1.5)`.
fn jitter(d: Duration) -> Duration {
    let factor = rand::rng().random_range(0.5..1.5);
    d.mul_f64(factor)
}

/// Jitters a fixed period (the descheduling and TTL workers' "every minute,
/// jittered" loop interval) by the same +/-50% factor.
pub fn jittered(period: Duration) -> Duration {
    jitter(period)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_never_exceeds_cap_jittered_ceiling() {
        let backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(10));
        for attempt in 0..20 {
            let d = backoff.delay(attempt);
            assert!(d <= Duration::from_secs(15), "attempt {attempt} produced {d:?}");
        }
    }

    #[test]
    fn delay_grows_with_attempt_before_capping() {
        let backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(60));
        assert!(backoff.delay(0) < Duration::from_secs(1));
    }
}
