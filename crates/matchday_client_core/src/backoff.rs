#![forbid(unsafe_code)]

use std::time::Duration;

use rand::Rng;

/// Exponential backoff policy for failed connect attempts.
///
/// One value is shared by all channels: base delay doubling per attempt,
/// capped at `cap`, giving up after `max_attempts`. Raw delays are
/// deterministic; jitter is applied separately when arming the timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
	pub base: Duration,
	pub cap: Duration,
	pub max_attempts: u32,
}

impl Default for BackoffPolicy {
	fn default() -> Self {
		Self {
			base: Duration::from_millis(500),
			cap: Duration::from_secs(30),
			max_attempts: 8,
		}
	}
}

impl BackoffPolicy {
	/// Raw delay before retry number `attempt` (1-based).
	///
	/// Returns `None` once the attempt budget is exhausted (or for
	/// attempt 0, which is not a retry).
	pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
		if attempt == 0 || attempt > self.max_attempts {
			return None;
		}

		let base_ms = self.base.as_millis() as u64;
		let cap_ms = self.cap.as_millis() as u64;
		let pow = 2u64.saturating_pow(attempt.saturating_sub(1).min(20));
		let delay_ms = base_ms.saturating_mul(pow).min(cap_ms);
		Some(Duration::from_millis(delay_ms))
	}
}

/// Spread a raw delay by up to ±10% so channels do not retry in lockstep.
pub fn jittered(delay: Duration) -> Duration {
	let delay_ms = delay.as_millis() as u64;
	let jitter_window = (delay_ms / 10).max(1);
	let mut rng = rand::rng();
	let jitter_offset = rng.random_range(0..=(jitter_window * 2));
	let final_ms = delay_ms.saturating_sub(jitter_window).saturating_add(jitter_offset);
	Duration::from_millis(final_ms)
}
