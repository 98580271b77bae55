//! Confluence Cloud tools that act as the end user through their Atlassian access token.
//!
//! Every call first resolves the user's Atlassian site through
//! `/oauth/token/accessible-resources`, then talks to the site's Confluence REST API through the
//! `api.atlassian.com` gateway. Non-success HTTP answers are reported to the agent as
//! `{"success": false, "error", "details"}` results rather than Rust errors.

mod page;
mod search;

pub use page::*;
pub use search::*;

// crates.io
use reqwest::RequestBuilder;
use serde_json::{Value, json};
// self
use crate::{
	_prelude::*,
	auth::{AccessToken, ServiceId},
	error::ConfigError,
	tool::{CredentialedTool, ToolError},
};

/// Gateway serving the Atlassian platform APIs.
pub const DEFAULT_API_BASE: &str = "https://api.atlassian.com";

const ACCESSIBLE_RESOURCES: &str = "accessible_resources";

/// Atlassian site the access token can reach.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct AccessibleResource {
	/// Cloud id used in gateway paths.
	pub id: String,
	/// Site display name.
	#[serde(default)]
	pub name: Option<String>,
	/// Site base URL, e.g. `https://acme.atlassian.net`.
	pub url: Url,
	/// Scopes granted on this site.
	#[serde(default)]
	pub scopes: Vec<String>,
}

/// Shared HTTP plumbing for the Confluence tools.
#[derive(Clone, Debug)]
pub struct ConfluenceClient {
	http: ReqwestClient,
	api_base: Url,
	service: ServiceId,
}
impl ConfluenceClient {
	/// Creates a client against a custom gateway base (useful for proxies and tests).
	pub fn new(http: ReqwestClient, service: ServiceId, api_base: Url) -> Self {
		Self { http, api_base, service }
	}

	/// Creates a client against [`DEFAULT_API_BASE`].
	pub fn atlassian(http: ReqwestClient, service: ServiceId) -> Result<Self, ConfigError> {
		let api_base = Url::parse(DEFAULT_API_BASE).map_err(|source| ConfigError::InvalidUrl { source })?;

		Ok(Self::new(http, service, api_base))
	}

	/// Service whose token the tools expect.
	pub fn service(&self) -> &ServiceId {
		&self.service
	}

	/// The three Confluence tools, ready to register with a
	/// [`ToolInvoker`](crate::tool::ToolInvoker).
	pub fn tools(&self) -> Vec<Arc<dyn CredentialedTool>> {
		vec![
			Arc::new(SearchConfluenceByText::new(self.clone())),
			Arc::new(GetConfluencePage::new(self.clone())),
			Arc::new(CreateConfluencePage::new(self.clone())),
		]
	}

	/// Lists the Atlassian sites the token can reach.
	pub async fn accessible_resources(
		&self,
		token: &AccessToken,
	) -> Result<Vec<AccessibleResource>, ToolError> {
		match self.fetch_accessible_resources(token).await? {
			ApiReply::Success(body) => parse_body(ACCESSIBLE_RESOURCES, &body),
			ApiReply::Failure { status, body } => Err(ToolError::Upstream {
				tool: ACCESSIBLE_RESOURCES.into(),
				message: format!("HTTP {status}: {body}"),
			}),
		}
	}

	async fn fetch_accessible_resources(&self, token: &AccessToken) -> Result<ApiReply, ToolError> {
		let url = self.endpoint(ACCESSIBLE_RESOURCES, &["oauth", "token", "accessible-resources"])?;

		self.send(ACCESSIBLE_RESOURCES, self.http.get(url), token).await
	}

	/// First site the token reaches. A rejected lookup (revoked token, missing scope) is reported
	/// to the agent as a failed tool result.
	async fn site(&self, tool: &str, token: &AccessToken) -> Result<AccessibleResource, CallError> {
		let resources: Vec<AccessibleResource> =
			match self.fetch_accessible_resources(token).await? {
				ApiReply::Success(body) => parse_body(ACCESSIBLE_RESOURCES, &body)?,
				ApiReply::Failure { status, body } =>
					return Err(CallError::Reported(failure(
						format!("Failed to resolve Atlassian site: {status}"),
						body,
					))),
			};
		let site = resources.into_iter().next().ok_or_else(|| {
			CallError::Reported(failure(
				"Atlassian cloud id is unavailable",
				"The access token cannot reach any Atlassian site.",
			))
		})?;

		#[cfg(feature = "tracing")]
		tracing::debug!(tool, cloud_id = %site.id, "resolved Atlassian site");
		#[cfg(not(feature = "tracing"))]
		let _ = tool;

		Ok(site)
	}

	fn wiki_endpoint(
		&self,
		tool: &str,
		cloud_id: &str,
		segments: &[&str],
	) -> Result<Url, ToolError> {
		let mut full = vec!["ex", "confluence", cloud_id, "wiki"];

		full.extend_from_slice(segments);

		self.endpoint(tool, &full)
	}

	fn endpoint(&self, tool: &str, segments: &[&str]) -> Result<Url, ToolError> {
		let mut url = self.api_base.clone();

		url.path_segments_mut()
			.map_err(|_| ToolError::Upstream {
				tool: tool.to_owned(),
				message: format!("API base {} cannot carry a path", self.api_base),
			})?
			.pop_if_empty()
			.extend(segments);

		Ok(url)
	}

	async fn send(
		&self,
		tool: &str,
		request: RequestBuilder,
		token: &AccessToken,
	) -> Result<ApiReply, ToolError> {
		let response = request
			.header(reqwest::header::AUTHORIZATION, token.bearer_header())
			.header(reqwest::header::ACCEPT, "application/json")
			.send()
			.await?;
		let status = response.status();
		let body = response.bytes().await?;

		if status.is_success() {
			return Ok(ApiReply::Success(body.to_vec()));
		}

		#[cfg(feature = "tracing")]
		tracing::warn!(tool, status = status.as_u16(), "Confluence request failed");
		#[cfg(not(feature = "tracing"))]
		let _ = tool;

		Ok(ApiReply::Failure {
			status: status.as_u16(),
			body: String::from_utf8_lossy(&body).into_owned(),
		})
	}
}

enum ApiReply {
	Success(Vec<u8>),
	Failure { status: u16, body: String },
}

/// Internal short-circuit: either a real failure or a result to hand back to the agent.
enum CallError {
	Tool(ToolError),
	Reported(Value),
}
impl From<ToolError> for CallError {
	fn from(e: ToolError) -> Self {
		Self::Tool(e)
	}
}

fn finish(result: Result<Value, CallError>) -> Result<Value, ToolError> {
	match result {
		Ok(value) | Err(CallError::Reported(value)) => Ok(value),
		Err(CallError::Tool(e)) => Err(e),
	}
}

fn failure(error: impl Into<String>, details: impl Into<String>) -> Value {
	json!({ "success": false, "error": error.into(), "details": details.into() })
}

fn parse_body<T>(tool: &str, body: &[u8]) -> Result<T, ToolError>
where
	T: for<'de> Deserialize<'de>,
{
	let mut deserializer = serde_json::Deserializer::from_slice(body);

	serde_path_to_error::deserialize(&mut deserializer).map_err(|e| ToolError::Upstream {
		tool: tool.to_owned(),
		message: format!("unexpected JSON at `{}`: {}", e.path(), e.inner()),
	})
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn client(base: &str) -> ConfluenceClient {
		ConfluenceClient::new(
			ReqwestClient::new(),
			ServiceId::new("atlassian").expect("Service id should be valid."),
			Url::parse(base).expect("Base URL should parse."),
		)
	}

	#[test]
	fn endpoints_percent_encode_untrusted_segments() {
		let url = client("https://api.atlassian.com")
			.wiki_endpoint("get_confluence_page", "cloud-1", &["api", "v2", "pages", "../admin?x=1"])
			.expect("Endpoint should build.");

		assert_eq!(
			url.as_str(),
			"https://api.atlassian.com/ex/confluence/cloud-1/wiki/api/v2/pages/..%2Fadmin%3Fx=1"
		);
	}

	#[test]
	fn endpoints_keep_a_base_path_prefix() {
		let url = client("https://proxy.example.com/atlassian/")
			.endpoint("accessible_resources", &["oauth", "token", "accessible-resources"])
			.expect("Endpoint should build.");

		assert_eq!(url.as_str(), "https://proxy.example.com/atlassian/oauth/token/accessible-resources");
	}

	#[test]
	fn reported_failures_become_results() {
		let reported = finish(Err(CallError::Reported(failure("Space not found: ENG", "none"))))
			.expect("Reported failures are tool results.");

		assert_eq!(reported["success"], Value::Bool(false));
		assert_eq!(reported["error"], "Space not found: ENG");
		assert!(finish(Err(CallError::Tool(ToolError::UnknownTool { name: "x".into() }))).is_err());
	}

	#[test]
	fn tools_share_the_client_service() {
		let names: Vec<_> =
			client("https://api.atlassian.com").tools().iter().map(|tool| tool.name().to_owned()).collect();

		assert_eq!(names, ["search_confluence_by_text", "get_confluence_page", "create_confluence_page"]);
	}
}
