//! Consent flows: authorization URL construction, pending-consent bookkeeping, and code
//! redemption.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, distr::Alphanumeric};
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	auth::{AccessToken, CredentialKey, PendingConsent, ServiceCredential, TokenSecret},
	flows::{Authorizer, ConsentReason, ConsentRequest, TokenGrant, common},
	http::TokenHttpClient,
	oauth::BasicFacade,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	service::ServiceDescriptor,
	store::{CompareAndSwapOutcome, ConsentClaim},
};

const STATE_LEN: usize = 32;
const PKCE_VERIFIER_LEN: usize = 64;
const STORE_ATTEMPTS: usize = 3;

/// PKCE challenge methods placed in authorization URLs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PkceCodeChallengeMethod {
	/// SHA-256 (RFC 7636 `S256`).
	S256,
}
impl PkceCodeChallengeMethod {
	/// RFC 7636 identifier.
	pub fn as_str(self) -> &'static str {
		match self {
			PkceCodeChallengeMethod::S256 => "S256",
		}
	}
}

struct PkcePair {
	verifier: TokenSecret,
	challenge: String,
	method: PkceCodeChallengeMethod,
}
impl PkcePair {
	fn generate() -> Self {
		let verifier = random_string(PKCE_VERIFIER_LEN);
		let challenge = pkce_challenge(&verifier);

		Self { verifier: TokenSecret::new(verifier), challenge, method: PkceCodeChallengeMethod::S256 }
	}
}

impl<C> Authorizer<C>
where
	C: ?Sized + TokenHttpClient,
{
	/// Redeems the authorization code returned to the redirect URI.
	///
	/// `state` must name a live pending consent. Unknown or timed-out states fail with
	/// [`Error::ConsentExpired`] and write nothing; a state that was already redeemed fails with
	/// [`Error::ExchangeFailed`], as does a code the provider rejects.
	pub async fn complete_consent(&self, state: &str, code: &str) -> Result<AccessToken> {
		const KIND: FlowKind = FlowKind::CompleteConsent;

		let span = FlowSpan::new(KIND, "complete_consent");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.redeem(state, code)).await;

		obs::record_flow_outcome(
			KIND,
			if result.is_ok() { FlowOutcome::Success } else { FlowOutcome::Failure },
		);

		result
	}

	/// Drops pending consents (and redeemed markers) whose TTL has passed.
	pub async fn purge_expired_consents(&self) -> Result<usize> {
		Ok(self.store.purge_expired(OffsetDateTime::now_utc()).await?)
	}

	pub(crate) async fn begin_consent(
		&self,
		descriptor: &ServiceDescriptor,
		key: CredentialKey,
		reason: ConsentReason,
		now: OffsetDateTime,
	) -> Result<TokenGrant> {
		let state = random_string(STATE_LEN);
		let pkce = descriptor.quirks.pkce.then(PkcePair::generate);
		let authorization_url = build_authorization_url(descriptor, &state, pkce.as_ref());
		let expires_at = now + self.consent_ttl;
		let service = key.service.clone();
		// Timed-out consents leave the store here so abandoned prompts cannot accumulate.
		let purged = self.store.purge_expired(now).await?;

		#[cfg(feature = "tracing")]
		tracing::debug!(purged, "swept timed-out pending consents");
		#[cfg(not(feature = "tracing"))]
		let _ = purged;

		self.store
			.put_pending(PendingConsent {
				key,
				state: state.clone(),
				redirect_uri: descriptor.redirect_uri.clone(),
				scopes: descriptor.scopes.clone(),
				pkce_verifier: pkce.map(|pair| pair.verifier),
				authorization_url: authorization_url.clone(),
				created_at: now,
				expires_at,
			})
			.await?;

		Ok(TokenGrant::ConsentRequired(ConsentRequest {
			service,
			authorization_url,
			state,
			expires_at,
			reason,
		}))
	}

	async fn redeem(&self, state: &str, code: &str) -> Result<AccessToken> {
		let now = OffsetDateTime::now_utc();
		let pending = match self.store.claim_pending(state, now).await? {
			ConsentClaim::Claimed(pending) => pending,
			ConsentClaim::AlreadyRedeemed =>
				return Err(Error::ExchangeFailed {
					reason: "authorization code already redeemed".into(),
				}),
			ConsentClaim::Expired | ConsentClaim::Missing => {
				#[cfg(feature = "tracing")]
				tracing::info!("consent state is unknown or expired");

				return Err(Error::ConsentExpired);
			},
		};
		let descriptor = self.descriptor(&pending.key.service)?;
		let facade =
			BasicFacade::from_descriptor(&descriptor, self.http_client.as_ref(), self.strategy.as_ref())?;
		let credential = facade
			.exchange_code(
				pending.key.clone(),
				code,
				pending.pkce_verifier.as_ref(),
				&pending.scopes,
				&pending.redirect_uri,
			)
			.await?;
		let guard = common::flow_guard(self, &pending.key);
		let _singleflight = guard.lock().await;

		self.store_granted(credential).await.map(|stored| stored.access())
	}

	/// Writes a freshly granted credential, replacing whatever is stored for the key.
	async fn store_granted(&self, mut credential: ServiceCredential) -> Result<ServiceCredential> {
		for _ in 0..STORE_ATTEMPTS {
			let expected = self.store.fetch(&credential.key).await?.map(|current| current.version);

			if let CompareAndSwapOutcome::Updated(version) =
				self.store.compare_and_swap(expected, credential.clone()).await?
			{
				credential.version = version;

				return Ok(credential);
			}
		}

		Err(crate::store::StoreError::Backend {
			message: format!("credential for {} kept changing during the write", credential.key),
		}
		.into())
	}
}

fn build_authorization_url(
	descriptor: &ServiceDescriptor,
	state: &str,
	pkce: Option<&PkcePair>,
) -> Url {
	let mut url = descriptor.endpoints.authorization.clone();
	let mut pairs = url.query_pairs_mut();

	pairs.append_pair("response_type", "code");
	pairs.append_pair("client_id", &descriptor.client_id);
	pairs.append_pair("redirect_uri", descriptor.redirect_uri.as_str());

	if let Some(scope) = descriptor.scopes.join(descriptor.quirks.scope_delimiter) {
		pairs.append_pair("scope", &scope);
	}

	pairs.append_pair("state", state);

	if let Some(pkce) = pkce {
		pairs.append_pair("code_challenge", &pkce.challenge);
		pairs.append_pair("code_challenge_method", pkce.method.as_str());
	}
	for (name, value) in &descriptor.authorize_params {
		pairs.append_pair(name, value);
	}

	drop(pairs);

	url
}

fn random_string(len: usize) -> String {
	rand::rng().sample_iter(Alphanumeric).take(len).map(char::from).collect()
}

fn pkce_challenge(verifier: &str) -> String {
	URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}
