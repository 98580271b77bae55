// std
use std::sync::atomic::{AtomicU64, Ordering};

/// In-process refresh counters shared by every clone of an authorizer.
#[derive(Debug, Default)]
pub struct RefreshMetrics {
	attempts: AtomicU64,
	token_calls: AtomicU64,
	success: AtomicU64,
	failure: AtomicU64,
}
impl RefreshMetrics {
	/// Refreshes started, including ones satisfied by a concurrent writer.
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Refresh grants actually sent to a token endpoint.
	pub fn token_calls(&self) -> u64 {
		self.token_calls.load(Ordering::Relaxed)
	}

	/// Refreshes that produced a usable credential.
	pub fn successes(&self) -> u64 {
		self.success.load(Ordering::Relaxed)
	}

	/// Refreshes that returned an error.
	pub fn failures(&self) -> u64 {
		self.failure.load(Ordering::Relaxed)
	}

	pub(crate) fn record_attempt(&self) {
		self.attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_token_call(&self) {
		self.token_calls.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_success(&self) {
		self.success.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failure.fetch_add(1, Ordering::Relaxed);
	}
}
