/// Exponential backoff schedule for transient stream-transport failures.
///
/// Pure policy: it computes delays and the caller decides how to wait,
/// which keeps retry behavior unit-testable without sleeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    initial_ms: u64,
    cap_ms: u64,
    max_attempts: u32,
}

impl Backoff {
    pub fn new(initial_ms: u64, cap_ms: u64, max_attempts: u32) -> Self {
        Self {
            initial_ms,
            cap_ms: cap_ms.max(initial_ms),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Maximum attempts before the caller must surface a fatal error.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before retry number `attempt` (1-based: the delay after the
    /// first failure is `delay_for(1)`). `None` once attempts are spent.
    pub fn delay_for(&self, attempt: u32) -> Option<u64> {
        if attempt == 0 || attempt >= self.max_attempts {
            return None;
        }
        let exponent = attempt.saturating_sub(1).min(32);
        let delay = self
            .initial_ms
            .saturating_mul(1_u64.checked_shl(exponent).unwrap_or(u64::MAX));
        Some(delay.min(self.cap_ms))
    }
}
