//! Outbound authorizer: per-(subject, service) tokens, refreshes, and consent flows.

pub mod authorize;
pub mod common;
pub mod consent;
pub mod refresh;

mod revoke;

pub use authorize::*;
pub use consent::*;
pub use refresh::*;

// self
use crate::{
	_prelude::*,
	auth::{CredentialKey, ServiceId},
	http::TokenHttpClient,
	service::{ProviderStrategy, ServiceDescriptor},
	store::CredentialStore,
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestHttpClient;

/// Authorizer specialized for the crate's reqwest transport.
#[cfg(feature = "reqwest")]
pub type ReqwestAuthorizer = Authorizer<ReqwestHttpClient>;

/// Resolves access tokens for verified principals against registered services.
///
/// The authorizer owns the transport, the credential store, the provider strategy, and the
/// service registry. Every read-modify-write on a (subject, service) credential runs under a
/// per-key async mutex, and every store write is a versioned compare-and-swap.
pub struct Authorizer<C>
where
	C: ?Sized + TokenHttpClient,
{
	/// Transport used for token endpoint calls.
	pub http_client: Arc<C>,
	/// Credential and pending-consent storage.
	pub store: Arc<dyn CredentialStore>,
	/// Provider error classification and request decoration.
	pub strategy: Arc<dyn ProviderStrategy>,
	/// Refresh counters shared by every clone.
	pub refresh_metrics: Arc<RefreshMetrics>,
	services: HashMap<ServiceId, Arc<ServiceDescriptor>>,
	consent_ttl: Duration,
	preemptive_window: Duration,
	flow_guards: Arc<Mutex<HashMap<CredentialKey, Arc<AsyncMutex<()>>>>>,
}
impl<C> Authorizer<C>
where
	C: ?Sized + TokenHttpClient,
{
	/// Pending consents older than this can no longer be completed.
	pub const DEFAULT_CONSENT_TTL: Duration = Duration::minutes(10);
	/// Credentials expiring within (a jittered share of) this window are refreshed early.
	pub const DEFAULT_PREEMPTIVE_WINDOW: Duration = Duration::seconds(60);

	/// Creates an authorizer on a caller-provided transport.
	pub fn with_http_client(
		store: Arc<dyn CredentialStore>,
		strategy: Arc<dyn ProviderStrategy>,
		http_client: impl Into<Arc<C>>,
	) -> Self {
		Self {
			http_client: http_client.into(),
			store,
			strategy,
			refresh_metrics: Default::default(),
			services: HashMap::new(),
			consent_ttl: Self::DEFAULT_CONSENT_TTL,
			preemptive_window: Self::DEFAULT_PREEMPTIVE_WINDOW,
			flow_guards: Default::default(),
		}
	}

	/// Registers (or replaces) a service descriptor.
	pub fn with_service(mut self, descriptor: ServiceDescriptor) -> Self {
		self.services.insert(descriptor.id.clone(), Arc::new(descriptor));

		self
	}

	/// Overrides how long a pending consent stays redeemable.
	pub fn with_consent_ttl(mut self, ttl: Duration) -> Self {
		self.consent_ttl = ttl;

		self
	}

	/// Overrides the preemptive refresh window; negative values disable early refreshes.
	pub fn with_preemptive_window(mut self, window: Duration) -> Self {
		self.preemptive_window = if window.is_negative() { Duration::ZERO } else { window };

		self
	}

	/// Current pending-consent TTL.
	pub fn consent_ttl(&self) -> Duration {
		self.consent_ttl
	}

	/// Looks up a registered service.
	pub fn descriptor(&self, service: &ServiceId) -> Result<Arc<ServiceDescriptor>> {
		self.services
			.get(service)
			.cloned()
			.ok_or_else(|| Error::UnknownService { service: service.clone() })
	}

	/// Identifiers of every registered service.
	pub fn services(&self) -> impl Iterator<Item = &ServiceId> {
		self.services.keys()
	}
}
#[cfg(feature = "reqwest")]
impl Authorizer<ReqwestHttpClient> {
	/// Creates an authorizer with its own reqwest transport (redirects disabled).
	pub fn new(
		store: Arc<dyn CredentialStore>,
		strategy: Arc<dyn ProviderStrategy>,
	) -> Result<Self> {
		Ok(Self::with_http_client(store, strategy, ReqwestHttpClient::without_redirects()?))
	}
}
impl<C> Clone for Authorizer<C>
where
	C: ?Sized + TokenHttpClient,
{
	fn clone(&self) -> Self {
		Self {
			http_client: self.http_client.clone(),
			store: self.store.clone(),
			strategy: self.strategy.clone(),
			refresh_metrics: self.refresh_metrics.clone(),
			services: self.services.clone(),
			consent_ttl: self.consent_ttl,
			preemptive_window: self.preemptive_window,
			flow_guards: self.flow_guards.clone(),
		}
	}
}
impl<C> Debug for Authorizer<C>
where
	C: ?Sized + TokenHttpClient,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Authorizer")
			.field("services", &self.services.keys().collect::<Vec<_>>())
			.field("consent_ttl", &self.consent_ttl)
			.field("preemptive_window", &self.preemptive_window)
			.finish()
	}
}
