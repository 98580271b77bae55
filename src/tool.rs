//! Tool invocation wrapper: resolve the caller's credential, then run the tool with it injected.
//!
//! A [`CredentialedTool`] names the service it needs and receives a live [`AccessToken`] as an
//! argument; it never sees the OAuth flow. When the authorizer asks for consent the tool is not
//! run at all and [`ToolOutcome::ConsentRequired`] carries the authorization URL back to the
//! agent, which must relay it and call the tool again once the user is done.

// crates.io
use serde_json::{Value, json};
// self
use crate::{
	_prelude::*,
	auth::{AccessToken, Principal, ServiceId},
	error::TransportError,
	flows::{Authorizer, ConsentRequest, TokenGrant},
	http::TokenHttpClient,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

/// Boxed future returned by [`CredentialedTool::call`].
pub type ToolFuture<'a> = Pin<Box<dyn Future<Output = Result<Value, ToolError>> + 'a + Send>>;

/// Failures surfaced by [`ToolInvoker`] and the tools it runs.
#[derive(Debug, ThisError)]
pub enum ToolError {
	/// Resolving the outbound credential failed.
	#[error(transparent)]
	Authorization(#[from] Error),
	/// No tool with this name is registered.
	#[error("Tool `{name}` is not registered.")]
	UnknownTool {
		/// Requested tool name.
		name: String,
	},
	/// Arguments do not match the tool's schema.
	#[error("Arguments for `{tool}` are invalid.")]
	InvalidArguments {
		/// Tool that rejected the arguments.
		tool: String,
		/// Path-aware parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// The tool's upstream could not be reached.
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// The tool's upstream answered with something the tool cannot use.
	#[error("Tool `{tool}` received an unusable response: {message}.")]
	Upstream {
		/// Tool that made the call.
		tool: String,
		/// Summary of the problem.
		message: String,
	},
}
impl ToolError {
	/// Parses `args` into the tool's argument type.
	pub fn parse_arguments<T>(tool: &str, args: Value) -> Result<T, Self>
	where
		T: for<'de> Deserialize<'de>,
	{
		serde_path_to_error::deserialize(args)
			.map_err(|source| Self::InvalidArguments { tool: tool.to_owned(), source })
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ToolError {
	fn from(e: ReqwestError) -> Self {
		Self::Transport(e.into())
	}
}

/// A callable that needs a per-user credential for one service.
pub trait CredentialedTool
where
	Self: Send + Sync,
{
	/// Name the agent uses to call the tool.
	fn name(&self) -> &str;

	/// Service whose access token must be injected.
	fn service(&self) -> &ServiceId;

	/// Runs the tool with a live token for [`CredentialedTool::service`].
	fn call(&self, args: Value, token: AccessToken) -> ToolFuture<'_>;
}

/// Result of a credentialed tool call.
#[derive(Clone, Debug)]
pub enum ToolOutcome {
	/// The tool ran; its result is passed through untouched.
	Completed(Value),
	/// The tool did not run because the user must authorize the service first.
	ConsentRequired {
		/// Tool that was short-circuited.
		tool: String,
		/// Consent the user must complete.
		request: ConsentRequest,
	},
}
impl ToolOutcome {
	/// Returns the consent request, if the call was short-circuited.
	pub fn consent(&self) -> Option<&ConsentRequest> {
		match self {
			Self::Completed(_) => None,
			Self::ConsentRequired { request, .. } => Some(request),
		}
	}

	/// Renders the JSON the agent loop relays to the model and the user.
	pub fn to_agent_json(&self) -> Value {
		match self {
			Self::Completed(value) => value.clone(),
			Self::ConsentRequired { tool, request } => json!({
				"auth_required": true,
				"message": format!("{} authentication is required for {tool}.", request.service),
				"authorization_url": request.authorization_url.as_str(),
			}),
		}
	}
}

/// Runs [`CredentialedTool`]s on behalf of verified principals.
pub struct ToolInvoker<C>
where
	C: ?Sized + TokenHttpClient,
{
	authorizer: Authorizer<C>,
	tools: BTreeMap<String, Arc<dyn CredentialedTool>>,
}
impl<C> ToolInvoker<C>
where
	C: ?Sized + TokenHttpClient,
{
	/// Wraps an authorizer with no registered tools.
	pub fn new(authorizer: Authorizer<C>) -> Self {
		Self { authorizer, tools: BTreeMap::new() }
	}

	/// Registers a tool under its own name, replacing any tool with that name.
	pub fn with_tool(mut self, tool: Arc<dyn CredentialedTool>) -> Self {
		self.tools.insert(tool.name().to_owned(), tool);

		self
	}

	/// Authorizer used to resolve tokens.
	pub fn authorizer(&self) -> &Authorizer<C> {
		&self.authorizer
	}

	/// Names of every registered tool.
	pub fn tool_names(&self) -> impl Iterator<Item = &str> {
		self.tools.keys().map(String::as_str)
	}

	/// Runs the registered tool called `name`.
	pub async fn invoke_named(
		&self,
		principal: &Principal,
		name: &str,
		args: Value,
	) -> Result<ToolOutcome, ToolError> {
		let tool = self
			.tools
			.get(name)
			.cloned()
			.ok_or_else(|| ToolError::UnknownTool { name: name.to_owned() })?;

		self.invoke(principal, tool.as_ref(), args).await
	}

	/// Resolves a token for `tool`'s service, then runs it.
	///
	/// The tool's own result or failure is returned unchanged. Every call may end in
	/// [`ToolOutcome::ConsentRequired`], so agents must be ready to retry after the user
	/// authorizes.
	pub async fn invoke(
		&self,
		principal: &Principal,
		tool: &dyn CredentialedTool,
		args: Value,
	) -> Result<ToolOutcome, ToolError> {
		const KIND: FlowKind = FlowKind::ToolCall;

		let span = FlowSpan::new(KIND, "invoke");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.run(principal, tool, args)).await;

		obs::record_flow_outcome(KIND, match &result {
			Ok(ToolOutcome::Completed(_)) => FlowOutcome::Success,
			Ok(ToolOutcome::ConsentRequired { .. }) => FlowOutcome::ConsentRequired,
			Err(_) => FlowOutcome::Failure,
		});

		result
	}

	async fn run(
		&self,
		principal: &Principal,
		tool: &dyn CredentialedTool,
		args: Value,
	) -> Result<ToolOutcome, ToolError> {
		match self.authorizer.get_token(principal, tool.service()).await? {
			TokenGrant::Ready(token) => tool.call(args, token).await.map(ToolOutcome::Completed),
			TokenGrant::ConsentRequired(request) => {
				#[cfg(feature = "tracing")]
				tracing::info!(
					tool = tool.name(),
					service = %request.service,
					"tool call deferred until the user grants consent"
				);

				Ok(ToolOutcome::ConsentRequired { tool: tool.name().to_owned(), request })
			},
		}
	}
}
impl<C> Clone for ToolInvoker<C>
where
	C: ?Sized + TokenHttpClient,
{
	fn clone(&self) -> Self {
		Self { authorizer: self.authorizer.clone(), tools: self.tools.clone() }
	}
}
impl<C> Debug for ToolInvoker<C>
where
	C: ?Sized + TokenHttpClient,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ToolInvoker")
			.field("authorizer", &self.authorizer)
			.field("tools", &self.tools.keys().collect::<Vec<_>>())
			.finish()
	}
}
