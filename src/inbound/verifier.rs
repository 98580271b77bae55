//! JWT verification against a cached issuer key set.

// crates.io
use jsonwebtoken::{
	Algorithm, DecodingKey, Header, Validation,
	errors::ErrorKind,
	jwk::{Jwk, JwkSet},
};
// self
use crate::{
	_prelude::*,
	auth::{Principal, ScopeSet, SubjectId},
	error::{AuthError, ConfigError},
	inbound::{KeySetSource, cache::VerifiedCache},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

/// What a token must satisfy to be accepted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifierConfig {
	/// Required `iss` value.
	pub issuer: String,
	/// Value that `aud` (or a Cognito-style `client_id`) must carry.
	pub audience: String,
	/// Signing algorithms accepted in the JWT header.
	pub algorithms: Vec<Algorithm>,
	/// Clock skew tolerated on `exp` and `nbf`.
	pub leeway: Duration,
	/// How long a fetched key set is trusted before it is fetched again.
	pub key_cache_ttl: Duration,
	/// Minimum spacing between refetches triggered by an unknown `kid`.
	pub refetch_interval: Duration,
}
impl VerifierConfig {
	/// RS256-only config with a 60 s leeway and an hour-long key cache.
	pub fn new(issuer: impl Into<String>, audience: impl Into<String>) -> Self {
		Self {
			issuer: issuer.into(),
			audience: audience.into(),
			algorithms: vec![Algorithm::RS256],
			leeway: Duration::seconds(60),
			key_cache_ttl: Duration::hours(1),
			refetch_interval: Duration::seconds(30),
		}
	}

	/// Replaces the accepted algorithms.
	pub fn with_algorithms(mut self, algorithms: impl IntoIterator<Item = Algorithm>) -> Self {
		self.algorithms = algorithms.into_iter().collect();

		self
	}

	/// Replaces the clock-skew leeway.
	pub fn with_leeway(mut self, leeway: Duration) -> Self {
		self.leeway = leeway;

		self
	}

	/// Replaces the key cache TTL.
	pub fn with_key_cache_ttl(mut self, ttl: Duration) -> Self {
		self.key_cache_ttl = ttl;

		self
	}

	/// Replaces the minimum spacing between forced key refetches.
	pub fn with_refetch_interval(mut self, interval: Duration) -> Self {
		self.refetch_interval = interval;

		self
	}
}

#[derive(Debug)]
struct CachedKeys {
	keys: Arc<JwkSet>,
	fetched_at: OffsetDateTime,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
	One(String),
	Many(Vec<String>),
}
impl OneOrMany {
	fn contains(&self, value: &str) -> bool {
		match self {
			Self::One(single) => single == value,
			Self::Many(values) => values.iter().any(|candidate| candidate == value),
		}
	}
}

/// Inbound bearer token verifier.
///
/// Stateless per request apart from two caches: the issuer's key set (refreshed after
/// `key_cache_ttl`, or once early when a token names an unknown `kid`) and a memo of tokens
/// that already verified.
pub struct Verifier {
	config: VerifierConfig,
	source: Arc<dyn KeySetSource>,
	keys: RwLock<Option<CachedKeys>>,
	last_forced_refetch: Mutex<Option<OffsetDateTime>>,
	fetch_lock: AsyncMutex<()>,
	verified: VerifiedCache,
}
impl Verifier {
	/// Builds a verifier; fails when no algorithm is allowed.
	pub fn new(config: VerifierConfig, source: Arc<dyn KeySetSource>) -> Result<Self> {
		if config.algorithms.is_empty() {
			return Err(ConfigError::NoAllowedAlgorithms.into());
		}

		Ok(Self {
			config,
			source,
			keys: RwLock::new(None),
			last_forced_refetch: Mutex::new(None),
			fetch_lock: AsyncMutex::new(()),
			verified: VerifiedCache::default(),
		})
	}

	/// Active configuration.
	pub fn config(&self) -> &VerifierConfig {
		&self.config
	}

	/// Forgets cached keys and verified tokens.
	pub fn clear_caches(&self) {
		*self.keys.write() = None;
		self.verified.clear();
	}

	/// Verifies `token` and returns the caller's principal.
	///
	/// Token problems surface as [`Error::Auth`] with a generic message. Failing to load the key
	/// set surfaces as a transient or transport error instead, since the token itself was never
	/// judged.
	pub async fn verify(&self, token: &str) -> Result<Principal> {
		const KIND: FlowKind = FlowKind::Verify;

		let span = FlowSpan::new(KIND, "verify");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.verify_inner(token)).await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_e) => {
				#[cfg(feature = "tracing")]
				if let Error::Auth(kind) = _e {
					tracing::info!(reason = kind.as_str(), "bearer token rejected");
				}

				obs::record_flow_outcome(KIND, FlowOutcome::Failure);
			},
		}

		result
	}

	async fn verify_inner(&self, token: &str) -> Result<Principal> {
		let now = OffsetDateTime::now_utc();

		if let Some(principal) = self.verified.get(token, now) {
			return Ok(principal);
		}

		let header = jsonwebtoken::decode_header(token).map_err(|_| AuthError::Malformed)?;

		if !self.config.algorithms.contains(&header.alg) {
			return Err(AuthError::InvalidSignature.into());
		}

		let jwk = self.signing_key(&header).await?;
		let key = DecodingKey::from_jwk(&jwk).map_err(|_| AuthError::InvalidSignature)?;
		let claims = jsonwebtoken::decode::<BTreeMap<String, serde_json::Value>>(
			token,
			&key,
			&self.validation(header.alg),
		)
		.map_err(|e| map_decode_error(e.kind()))?
		.claims;
		let principal = self.principal_from_claims(claims)?;

		self.verified.insert(token, principal.clone(), now, self.config.key_cache_ttl);

		Ok(principal)
	}

	fn validation(&self, alg: Algorithm) -> Validation {
		let mut validation = Validation::new(alg);

		validation.leeway = self.config.leeway.whole_seconds().max(0).unsigned_abs();
		validation.validate_exp = true;
		validation.validate_nbf = true;
		// `aud` and `client_id` are checked together below.
		validation.validate_aud = false;
		validation.set_required_spec_claims(&["exp"]);

		validation
	}

	fn principal_from_claims(
		&self,
		mut claims: BTreeMap<String, serde_json::Value>,
	) -> Result<Principal, AuthError> {
		let issuer = claims.get("iss").and_then(|v| v.as_str()).ok_or(AuthError::IssuerUnknown)?;

		if issuer != self.config.issuer {
			return Err(AuthError::IssuerUnknown);
		}

		let audience_ok = match claims.get("aud") {
			Some(aud) => serde_json::from_value::<OneOrMany>(aud.clone())
				.map(|aud| aud.contains(&self.config.audience))
				.unwrap_or(false),
			None => claims.get("client_id").and_then(|v| v.as_str())
				== Some(self.config.audience.as_str()),
		};

		if !audience_ok {
			return Err(AuthError::AudienceMismatch);
		}

		let subject = claims
			.get("sub")
			.and_then(|v| v.as_str())
			.and_then(|sub| SubjectId::new(sub).ok())
			.ok_or(AuthError::Malformed)?;
		let expires_at = claims
			.get("exp")
			.and_then(|v| v.as_i64())
			.and_then(|exp| OffsetDateTime::from_unix_timestamp(exp).ok())
			.ok_or(AuthError::Malformed)?;
		let scopes = scopes_from_claims(&claims);
		let issuer = self.config.issuer.clone();

		for registered in ["iss", "sub", "exp"] {
			claims.remove(registered);
		}

		Ok(Principal::new(subject, issuer, expires_at).with_scopes(scopes).with_claims(claims))
	}

	async fn signing_key(&self, header: &Header) -> Result<Jwk> {
		let keys = self.key_set(false).await?;

		if let Some(jwk) = select_key(&keys, header.kid.as_deref()) {
			return Ok(jwk);
		}
		if header.kid.is_some() && self.may_force_refetch() {
			#[cfg(feature = "tracing")]
			tracing::info!(kid = header.kid.as_deref(), "unknown key id, refetching key set");

			let keys = self.key_set(true).await?;

			if let Some(jwk) = select_key(&keys, header.kid.as_deref()) {
				return Ok(jwk);
			}
		}

		Err(AuthError::InvalidSignature.into())
	}

	async fn key_set(&self, force: bool) -> Result<Arc<JwkSet>> {
		if let Some(keys) = self.fresh_keys().filter(|_| !force) {
			return Ok(keys);
		}

		let _fetching = self.fetch_lock.lock().await;

		// Another task may have fetched while this one waited.
		if let Some(keys) = self.fresh_keys().filter(|_| !force) {
			return Ok(keys);
		}

		let keys = Arc::new(self.source.fetch().await?);

		*self.keys.write() =
			Some(CachedKeys { keys: keys.clone(), fetched_at: OffsetDateTime::now_utc() });

		Ok(keys)
	}

	fn fresh_keys(&self) -> Option<Arc<JwkSet>> {
		let now = OffsetDateTime::now_utc();

		self.keys
			.read()
			.as_ref()
			.filter(|cached| now - cached.fetched_at < self.config.key_cache_ttl)
			.map(|cached| cached.keys.clone())
	}

	fn may_force_refetch(&self) -> bool {
		let now = OffsetDateTime::now_utc();
		let mut last = self.last_forced_refetch.lock();

		match *last {
			Some(at) if now - at < self.config.refetch_interval => false,
			_ => {
				*last = Some(now);

				true
			},
		}
	}
}
impl Debug for Verifier {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Verifier").field("config", &self.config).finish()
	}
}

fn select_key(keys: &JwkSet, kid: Option<&str>) -> Option<Jwk> {
	match kid {
		Some(kid) => keys.find(kid).cloned(),
		None => keys.keys.first().cloned(),
	}
}

fn scopes_from_claims(claims: &BTreeMap<String, serde_json::Value>) -> ScopeSet {
	let raw: Vec<&str> = match claims.get("scope").or_else(|| claims.get("scp")) {
		Some(serde_json::Value::String(value)) => value.split_whitespace().collect(),
		Some(serde_json::Value::Array(values)) =>
			values.iter().filter_map(|v| v.as_str()).flat_map(str::split_whitespace).collect(),
		_ => Vec::new(),
	};

	ScopeSet::new(raw).unwrap_or_default()
}

fn map_decode_error(kind: &ErrorKind) -> AuthError {
	match kind {
		ErrorKind::ExpiredSignature => AuthError::Expired,
		ErrorKind::ImmatureSignature => AuthError::NotYetValid,
		ErrorKind::InvalidSignature
		| ErrorKind::InvalidAlgorithm
		| ErrorKind::InvalidAlgorithmName
		| ErrorKind::InvalidKeyFormat
		| ErrorKind::InvalidRsaKey(_)
		| ErrorKind::InvalidEcdsaKey => AuthError::InvalidSignature,
		_ => AuthError::Malformed,
	}
}
