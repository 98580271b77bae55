//! Short-lived memo of verified tokens so repeated calls in one session skip the crypto.

// crates.io
use sha2::{Digest, Sha256};
// self
use crate::{_prelude::*, auth::Principal};

const MAX_ENTRIES: usize = 4_096;

#[derive(Debug)]
struct Entry {
	principal: Principal,
	valid_until: OffsetDateTime,
}

/// Verified principals keyed by the SHA-256 of the raw token.
#[derive(Debug, Default)]
pub(crate) struct VerifiedCache(Mutex<HashMap<[u8; 32], Entry>>);
impl VerifiedCache {
	pub(crate) fn get(&self, token: &str, now: OffsetDateTime) -> Option<Principal> {
		let digest = fingerprint(token);
		let mut guard = self.0.lock();

		match guard.get(&digest) {
			Some(entry) if now < entry.valid_until => Some(entry.principal.clone()),
			Some(_) => {
				guard.remove(&digest);

				None
			},
			None => None,
		}
	}

	/// Remembers `principal` until its token expires or `ttl` passes, whichever comes first.
	pub(crate) fn insert(&self, token: &str, principal: Principal, now: OffsetDateTime, ttl: Duration) {
		let valid_until = principal.expires_at.min(now + ttl);

		if valid_until <= now {
			return;
		}

		let mut guard = self.0.lock();

		if guard.len() >= MAX_ENTRIES {
			guard.retain(|_, entry| now < entry.valid_until);
		}
		if guard.len() >= MAX_ENTRIES {
			guard.clear();
		}

		guard.insert(fingerprint(token), Entry { principal, valid_until });
	}

	pub(crate) fn clear(&self) {
		self.0.lock().clear();
	}
}

fn fingerprint(token: &str) -> [u8; 32] {
	Sha256::digest(token.as_bytes()).into()
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::auth::SubjectId;

	#[test]
	fn entries_expire_with_the_token() {
		let cache = VerifiedCache::default();
		let now = OffsetDateTime::now_utc();
		let principal = Principal::new(
			SubjectId::new("user-1").expect("Subject fixture should be valid."),
			"https://issuer.example.com",
			now + Duration::seconds(30),
		);

		cache.insert("token", principal.clone(), now, Duration::minutes(10));

		assert_eq!(cache.get("token", now), Some(principal));
		assert_eq!(cache.get("other", now), None);
		assert_eq!(cache.get("token", now + Duration::seconds(30)), None);
	}
}
