// crates.io
use serde_json::{Value, json};
// self
use crate::{
	_prelude::*,
	auth::{AccessToken, ServiceId},
	confluence::{ApiReply, CallError, ConfluenceClient, failure, finish, parse_body},
	tool::{CredentialedTool, ToolError, ToolFuture},
};

const DEFAULT_LIMIT: u32 = 10;

#[derive(Debug, Deserialize)]
struct SearchArgs {
	search_text: String,
	#[serde(default = "default_limit")]
	limit: u32,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
	#[serde(rename = "totalSize", default)]
	total_size: u64,
	#[serde(default)]
	results: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
	id: String,
	title: String,
	#[serde(default)]
	space: Option<SpaceName>,
	#[serde(default)]
	excerpt: String,
	#[serde(rename = "_links")]
	links: WebLinks,
}

#[derive(Debug, Deserialize)]
struct SpaceName {
	name: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct WebLinks {
	pub(super) webui: String,
}

/// `search_confluence_by_text(search_text, limit = 10)`: CQL title/text search over pages.
#[derive(Clone, Debug)]
pub struct SearchConfluenceByText {
	client: ConfluenceClient,
}
impl SearchConfluenceByText {
	/// Tool name exposed to the agent.
	pub const NAME: &'static str = "search_confluence_by_text";

	/// Wraps a client.
	pub fn new(client: ConfluenceClient) -> Self {
		Self { client }
	}

	async fn run(&self, args: Value, token: AccessToken) -> Result<Value, CallError> {
		let args: SearchArgs = ToolError::parse_arguments(Self::NAME, args)?;
		let site = self.client.site(Self::NAME, &token).await?;
		let mut url = self.client.wiki_endpoint(
			Self::NAME,
			&site.id,
			&["rest", "api", "content", "search"],
		)?;

		url.query_pairs_mut()
			.append_pair("cql", &page_cql(&args.search_text))
			.append_pair("limit", &args.limit.to_string());

		let body = match self.client.send(Self::NAME, self.client.http.get(url), &token).await? {
			ApiReply::Success(body) => body,
			ApiReply::Failure { status, body } =>
				return Err(CallError::Reported(failure(
					format!("Failed to search pages: {status}"),
					body,
				))),
		};
		let response: SearchResponse = parse_body(Self::NAME, &body)?;
		let pages = response
			.results
			.into_iter()
			.map(|hit| {
				json!({
					"id": hit.id,
					"title": hit.title,
					"space": hit.space.map(|space| space.name).unwrap_or_else(|| "N/A".into()),
					"excerpt": hit.excerpt,
					"url": web_url(&site.url, &hit.links.webui),
				})
			})
			.collect::<Vec<_>>();

		Ok(json!({
			"success": true,
			"search_text": args.search_text,
			"total": response.total_size,
			"pages": pages,
		}))
	}
}
impl CredentialedTool for SearchConfluenceByText {
	fn name(&self) -> &str {
		Self::NAME
	}

	fn service(&self) -> &ServiceId {
		self.client.service()
	}

	fn call(&self, args: Value, token: AccessToken) -> ToolFuture<'_> {
		Box::pin(async move { finish(self.run(args, token).await) })
	}
}

fn default_limit() -> u32 {
	DEFAULT_LIMIT
}

/// Pages whose title or body contains `text`; quotes are escaped so the text stays one literal.
fn page_cql(text: &str) -> String {
	let literal = text.replace('\\', "\\\\").replace('\'', "\\'");

	format!("type=page AND (title~'{literal}' OR text~'{literal}')")
}

/// Browser URL of a page: site base, `/wiki`, then the API's relative `webui` link.
pub(super) fn web_url(site: &Url, webui: &str) -> String {
	format!("{}/wiki{webui}", site.as_str().trim_end_matches('/'))
}
