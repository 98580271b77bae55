//! Thread-safe in-memory [`CredentialStore`] for single-process deployments and tests.

// self
use crate::{
	_prelude::*,
	auth::{CredentialKey, PendingConsent, ServiceCredential},
	store::{CompareAndSwapOutcome, ConsentClaim, CredentialStore, StoreFuture},
};

#[derive(Debug)]
struct PendingSlot {
	consent: PendingConsent,
	redeemed: bool,
}

#[derive(Debug, Default)]
struct Inner {
	credentials: RwLock<HashMap<CredentialKey, ServiceCredential>>,
	pending: Mutex<HashMap<String, PendingSlot>>,
}

/// In-process store; clones share the same maps.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(Arc<Inner>);
impl MemoryStore {
	/// Number of credentials currently stored.
	pub fn credential_count(&self) -> usize {
		self.0.credentials.read().len()
	}

	/// Number of pending consents and redeemed markers currently stored.
	pub fn pending_count(&self) -> usize {
		self.0.pending.lock().len()
	}

	fn cas_now(
		&self,
		expected_version: Option<u64>,
		mut replacement: ServiceCredential,
	) -> CompareAndSwapOutcome {
		let mut guard = self.0.credentials.write();
		let current = guard.get(&replacement.key).map(|credential| credential.version);
		let next = match (current, expected_version) {
			(None, None) => 1,
			(Some(current), Some(expected)) if current == expected => current + 1,
			(None, Some(_)) => return CompareAndSwapOutcome::Missing,
			_ => return CompareAndSwapOutcome::VersionMismatch,
		};

		replacement.version = next;
		guard.insert(replacement.key.clone(), replacement);

		CompareAndSwapOutcome::Updated(next)
	}

	fn invalidate_now(&self, key: &CredentialKey, expected_version: Option<u64>) -> bool {
		let mut guard = self.0.credentials.write();
		let matches = match (guard.get(key), expected_version) {
			(Some(_), None) => true,
			(Some(credential), Some(expected)) => credential.version == expected,
			(None, _) => false,
		};

		if matches {
			guard.remove(key);
		}

		matches
	}

	fn claim_now(&self, state: &str, now: OffsetDateTime) -> ConsentClaim {
		let mut guard = self.0.pending.lock();
		let Some(slot) = guard.get_mut(state) else {
			return ConsentClaim::Missing;
		};

		if slot.redeemed {
			return ConsentClaim::AlreadyRedeemed;
		}
		if slot.consent.is_expired_at(now) {
			guard.remove(state);

			return ConsentClaim::Expired;
		}

		slot.redeemed = true;

		ConsentClaim::Claimed(slot.consent.clone())
	}

	fn purge_now(&self, now: OffsetDateTime) -> usize {
		let mut guard = self.0.pending.lock();
		let before = guard.len();

		guard.retain(|_, slot| !slot.consent.is_expired_at(now));

		before - guard.len()
	}
}
impl CredentialStore for MemoryStore {
	fn fetch<'a>(&'a self, key: &'a CredentialKey) -> StoreFuture<'a, Option<ServiceCredential>> {
		let found = self.0.credentials.read().get(key).cloned();

		Box::pin(async move { Ok(found) })
	}

	fn compare_and_swap(
		&self,
		expected_version: Option<u64>,
		replacement: ServiceCredential,
	) -> StoreFuture<'_, CompareAndSwapOutcome> {
		Box::pin(async move { Ok(self.cas_now(expected_version, replacement)) })
	}

	fn invalidate<'a>(
		&'a self,
		key: &'a CredentialKey,
		expected_version: Option<u64>,
	) -> StoreFuture<'a, bool> {
		Box::pin(async move { Ok(self.invalidate_now(key, expected_version)) })
	}

	fn put_pending(&self, consent: PendingConsent) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			self.0
				.pending
				.lock()
				.insert(consent.state.clone(), PendingSlot { consent, redeemed: false });

			Ok(())
		})
	}

	fn claim_pending<'a>(
		&'a self,
		state: &'a str,
		now: OffsetDateTime,
	) -> StoreFuture<'a, ConsentClaim> {
		Box::pin(async move { Ok(self.claim_now(state, now)) })
	}

	fn purge_expired(&self, now: OffsetDateTime) -> StoreFuture<'_, usize> {
		Box::pin(async move { Ok(self.purge_now(now)) })
	}
}
