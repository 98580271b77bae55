//! Storage contract for service credentials and pending consents, plus the in-memory backend.

pub mod memory;

pub use memory::MemoryStore;

// self
use crate::{
	_prelude::*,
	auth::{CredentialKey, PendingConsent, ServiceCredential},
};

/// Boxed future returned by [`CredentialStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Storage backend for per-(subject, service) credentials and pending consents.
///
/// Every mutation of a credential is a compare-and-swap on its store-assigned version, so two
/// writers racing on the same key cannot both win.
pub trait CredentialStore
where
	Self: Send + Sync,
{
	/// Fetches the credential stored under `key`.
	fn fetch<'a>(&'a self, key: &'a CredentialKey) -> StoreFuture<'a, Option<ServiceCredential>>;

	/// Writes `replacement` under its key if the stored version equals `expected_version`.
	///
	/// `None` means the slot must be empty. On success the store assigns and returns the new
	/// version.
	fn compare_and_swap(
		&self,
		expected_version: Option<u64>,
		replacement: ServiceCredential,
	) -> StoreFuture<'_, CompareAndSwapOutcome>;

	/// Removes the credential if its version equals `expected_version`; `None` removes it
	/// unconditionally. Returns whether a credential was removed.
	fn invalidate<'a>(
		&'a self,
		key: &'a CredentialKey,
		expected_version: Option<u64>,
	) -> StoreFuture<'a, bool>;

	/// Persists a pending consent keyed by its `state`.
	fn put_pending(&self, consent: PendingConsent) -> StoreFuture<'_, ()>;

	/// Atomically claims the pending consent for `state`.
	///
	/// A claimed consent stays behind as a redeemed marker until it expires, so a replayed
	/// `state` is told apart from an unknown one.
	fn claim_pending<'a>(
		&'a self,
		state: &'a str,
		now: OffsetDateTime,
	) -> StoreFuture<'a, ConsentClaim>;

	/// Drops pending consents and redeemed markers that expired at `now`; returns how many.
	fn purge_expired(&self, now: OffsetDateTime) -> StoreFuture<'_, usize>;
}

/// Result of a versioned compare-and-swap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareAndSwapOutcome {
	/// The write landed; carries the version assigned by the store.
	Updated(u64),
	/// A credential exists but its version differs from the expected one.
	VersionMismatch,
	/// A version was expected but no credential is stored.
	Missing,
}

/// Result of claiming a pending consent.
#[derive(Clone, Debug)]
pub enum ConsentClaim {
	/// First claim; the caller now owns the consent.
	Claimed(PendingConsent),
	/// The consent was already claimed.
	AlreadyRedeemed,
	/// The consent timed out before it was claimed; it has been dropped.
	Expired,
	/// No consent was ever recorded for the state (or it was purged).
	Missing,
}

/// Error type produced by [`CredentialStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// The credential or consent could not be (de)serialized by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
