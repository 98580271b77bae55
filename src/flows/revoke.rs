// self
use crate::{
	_prelude::*,
	auth::{CredentialKey, Principal, ServiceId},
	flows::{Authorizer, common},
	http::TokenHttpClient,
};

impl<C> Authorizer<C>
where
	C: ?Sized + TokenHttpClient,
{
	/// Deletes the stored credential for (`principal`, `service`); the next
	/// [`get_token`](Authorizer::get_token) starts a consent flow.
	///
	/// Returns whether a credential was removed. The provider is not contacted.
	pub async fn revoke(&self, principal: &Principal, service: &ServiceId) -> Result<bool> {
		self.descriptor(service)?;

		let key = CredentialKey::new(principal.subject.clone(), service.clone());
		let guard = common::flow_guard(self, &key);
		let _singleflight = guard.lock().await;
		let removed = self.store.invalidate(&key, None).await?;

		#[cfg(feature = "tracing")]
		if removed {
			tracing::info!(credential = %key, "credential revoked");
		}

		Ok(removed)
	}
}
