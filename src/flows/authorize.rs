//! `get_token`: hand back a usable access token or ask the user for consent.

// self
use crate::{
	_prelude::*,
	auth::{AccessToken, CredentialKey, Principal, ServiceId},
	flows::{Authorizer, common},
	http::TokenHttpClient,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	service::GrantType,
};

/// Why a consent flow was started.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentReason {
	/// No credential was stored for the pair.
	NoCredential,
	/// The credential expired and carries no refresh token.
	Expired,
	/// The provider rejected the refresh token.
	RefreshRejected,
}

/// Control-flow signal asking the end user to authorize a service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentRequest {
	/// Service awaiting consent.
	pub service: ServiceId,
	/// URL the user must open.
	pub authorization_url: Url,
	/// Opaque state the provider echoes back to the redirect URI.
	pub state: String,
	/// Instant after which the consent can no longer be completed.
	pub expires_at: OffsetDateTime,
	/// Why consent is needed.
	pub reason: ConsentReason,
}

/// Result of [`Authorizer::get_token`].
#[derive(Clone, Debug)]
pub enum TokenGrant {
	/// A live access token.
	Ready(AccessToken),
	/// The user must complete a consent flow first.
	ConsentRequired(ConsentRequest),
}
impl TokenGrant {
	/// Returns the access token, if one is ready.
	pub fn access_token(&self) -> Option<&AccessToken> {
		match self {
			Self::Ready(token) => Some(token),
			Self::ConsentRequired(_) => None,
		}
	}

	/// Returns the consent request, if consent is required.
	pub fn consent(&self) -> Option<&ConsentRequest> {
		match self {
			Self::Ready(_) => None,
			Self::ConsentRequired(request) => Some(request),
		}
	}
}

impl<C> Authorizer<C>
where
	C: ?Sized + TokenHttpClient,
{
	/// Ensures `principal` holds a valid access token for `service`.
	///
	/// A live credential is returned without any network call. An expired (or nearly expired)
	/// credential with a refresh token is refreshed. A missing credential, an expired one that
	/// cannot be refreshed, or a rejected refresh token starts a new consent flow and yields
	/// [`TokenGrant::ConsentRequired`].
	pub async fn get_token(&self, principal: &Principal, service: &ServiceId) -> Result<TokenGrant> {
		const KIND: FlowKind = FlowKind::GetToken;

		let span = FlowSpan::new(KIND, "get_token");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.resolve_token(principal, service)).await;

		obs::record_flow_outcome(KIND, match &result {
			Ok(TokenGrant::Ready(_)) => FlowOutcome::Success,
			Ok(TokenGrant::ConsentRequired(_)) => FlowOutcome::ConsentRequired,
			Err(_) => FlowOutcome::Failure,
		});

		result
	}

	async fn resolve_token(&self, principal: &Principal, service: &ServiceId) -> Result<TokenGrant> {
		let descriptor = self.descriptor(service)?;
		let key = CredentialKey::new(principal.subject.clone(), service.clone());
		let guard = common::flow_guard(self, &key);
		let _singleflight = guard.lock().await;
		let now = OffsetDateTime::now_utc();
		let Some(current) = self.store.fetch(&key).await? else {
			return self.begin_consent(&descriptor, key, ConsentReason::NoCredential, now).await;
		};

		if !common::should_refresh(&current, now, self.preemptive_window) {
			return Ok(TokenGrant::Ready(current.access()));
		}
		if !(current.can_refresh() && descriptor.supports(GrantType::RefreshToken)) {
			if !current.is_expired_at(now) {
				return Ok(TokenGrant::Ready(current.access()));
			}

			self.store.invalidate(&key, Some(current.version)).await?;

			return self.begin_consent(&descriptor, key, ConsentReason::Expired, now).await;
		}

		match self.refresh_locked(&descriptor, &current).await {
			Ok(updated) => Ok(TokenGrant::Ready(updated.access())),
			Err(e) if e.requires_consent() => {
				// The versioned invalidate misses when another writer already stored a newer
				// credential; that one wins over a fresh consent.
				let winner = self.store.fetch(&key).await?.filter(|winner| {
					winner.version != current.version && !winner.is_expired_at(now)
				});

				if let Some(winner) = winner {
					return Ok(TokenGrant::Ready(winner.access()));
				}

				#[cfg(feature = "tracing")]
				tracing::warn!(
					credential = %key,
					error = %e,
					"refresh token rejected, starting a new consent flow"
				);

				self.begin_consent(&descriptor, key, ConsentReason::RefreshRejected, now).await
			},
			// A still-live token beats a failed early refresh.
			Err(e) if matches!(e, Error::Transient(_) | Error::Transport(_))
				&& !current.is_expired_at(now) =>
				Ok(TokenGrant::Ready(current.access())),
			Err(e) => Err(e),
		}
	}
}
