//! Refresh token rotation under the per-key singleflight guard.
//!
//! A refresh sends `grant_type=refresh_token`, then writes the result with a compare-and-swap
//! against the version it read. Losing that race means another writer already refreshed, so
//! the stored credential is returned instead. A rejected refresh token invalidates the stored
//! credential (again version-checked) so a stale failure never clobbers a newer success.

mod metrics;

pub use metrics::RefreshMetrics;

// self
use crate::{
	_prelude::*,
	auth::{AccessToken, CredentialKey, Principal, ServiceCredential, ServiceId},
	error::ConfigError,
	flows::{Authorizer, common},
	http::TokenHttpClient,
	oauth::BasicFacade,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	service::{GrantType, ServiceDescriptor},
	store::CompareAndSwapOutcome,
};

impl<C> Authorizer<C>
where
	C: ?Sized + TokenHttpClient,
{
	/// Refreshes the stored credential now, regardless of its remaining lifetime.
	///
	/// Unlike [`Authorizer::get_token`] this never starts a consent flow: a missing credential or
	/// a rejected refresh token surfaces as [`Error::RefreshFailed`].
	pub async fn refresh(&self, principal: &Principal, service: &ServiceId) -> Result<AccessToken> {
		let descriptor = self.descriptor(service)?;

		if !descriptor.supports(GrantType::RefreshToken) {
			return Err(ConfigError::UnsupportedGrant {
				service: service.to_string(),
				grant: GrantType::RefreshToken.as_str(),
			}
			.into());
		}

		let key = CredentialKey::new(principal.subject.clone(), service.clone());
		let guard = common::flow_guard(self, &key);
		let _singleflight = guard.lock().await;
		let current = self
			.store
			.fetch(&key)
			.await?
			.ok_or_else(|| Error::RefreshFailed { reason: "no credential is stored".into() })?;

		self.refresh_locked(&descriptor, &current).await.map(|credential| credential.access())
	}

	/// Refreshes `current`; the caller must hold the key's flow guard.
	pub(crate) async fn refresh_locked(
		&self,
		descriptor: &ServiceDescriptor,
		current: &ServiceCredential,
	) -> Result<ServiceCredential> {
		const KIND: FlowKind = FlowKind::Refresh;

		let span = FlowSpan::new(KIND, "refresh_locked");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
		self.refresh_metrics.record_attempt();

		let result = span.instrument(self.rotate(descriptor, current)).await;

		if result.is_ok() {
			obs::record_flow_outcome(KIND, FlowOutcome::Success);
			self.refresh_metrics.record_success();
		} else {
			obs::record_flow_outcome(KIND, FlowOutcome::Failure);
			self.refresh_metrics.record_failure();
		}

		result
	}

	async fn rotate(
		&self,
		descriptor: &ServiceDescriptor,
		current: &ServiceCredential,
	) -> Result<ServiceCredential> {
		let facade =
			BasicFacade::from_descriptor(descriptor, self.http_client.as_ref(), self.strategy.as_ref())?;

		self.refresh_metrics.record_token_call();

		let mut updated = match facade.refresh(current).await {
			Ok(updated) => updated,
			Err(e) => {
				if e.requires_consent() {
					self.store.invalidate(&current.key, Some(current.version)).await?;
				}

				return Err(e);
			},
		};

		match self.store.compare_and_swap(Some(current.version), updated.clone()).await? {
			CompareAndSwapOutcome::Updated(version) => {
				updated.version = version;

				Ok(updated)
			},
			CompareAndSwapOutcome::VersionMismatch => self
				.store
				.fetch(&current.key)
				.await?
				.ok_or_else(|| Error::RefreshFailed {
					reason: "credential was removed during refresh".into(),
				}),
			CompareAndSwapOutcome::Missing =>
				Err(Error::RefreshFailed { reason: "credential was removed during refresh".into() }),
		}
	}
}
