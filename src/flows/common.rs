//! Helpers shared by the authorizer flows: singleflight guards and the refresh window.

// self
use crate::{
	_prelude::*,
	auth::{CredentialKey, ServiceCredential},
	flows::Authorizer,
	http::TokenHttpClient,
};

/// Whether `credential` should be refreshed at `now`.
///
/// Expired credentials always qualify. Live ones qualify once their remaining lifetime drops
/// inside `window` shortened by a per-key jitter, so keys sharing an expiry do not refresh in
/// lockstep.
pub fn should_refresh(credential: &ServiceCredential, now: OffsetDateTime, window: Duration) -> bool {
	if credential.is_expired_at(now) {
		return true;
	}

	let effective = effective_window(&credential.key, window);

	!effective.is_zero() && credential.expires_at - now <= effective
}

fn effective_window(key: &CredentialKey, window: Duration) -> Duration {
	let window_secs = window.whole_seconds();

	if window_secs <= 1 {
		return window.max(Duration::ZERO);
	}

	let mut hasher = DefaultHasher::new();

	key.hash(&mut hasher);

	// `window_secs` is positive here, so the modulus is at least 2.
	let jitter = hasher.finish() % window_secs.unsigned_abs();

	window - Duration::seconds(i64::try_from(jitter).unwrap_or(0))
}

/// Returns (creating on demand) the singleflight guard for `key`.
pub(crate) fn flow_guard<C>(authorizer: &Authorizer<C>, key: &CredentialKey) -> Arc<AsyncMutex<()>>
where
	C: ?Sized + TokenHttpClient,
{
	authorizer
		.flow_guards
		.lock()
		.entry(key.clone())
		.or_insert_with(|| Arc::new(AsyncMutex::new(())))
		.clone()
}
