//! Loads a bridge configuration, asks for an Atlassian token on behalf of a fresh user, and prints
//! the consent prompt the agent would relay.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use serde_json::json;
use time::{Duration, OffsetDateTime};
// self
use delegated_auth_bridge::{
	auth::{Principal, SubjectId},
	config::BridgeConfig,
	confluence::ConfluenceClient,
	flows::ReqwestAuthorizer,
	reqwest::Client,
	service::DefaultProviderStrategy,
	store::MemoryStore,
	tool::ToolInvoker,
};

const CONFIG: &str = r#"{
	"inbound": {
		"issuer": "https://cognito-idp.us-east-1.amazonaws.com/us-east-1_Example",
		"audience": "demo-agent"
	},
	"services": [{
		"id": "atlassian",
		"client_id": "demo-client",
		"client_secret": "demo-secret",
		"authorization_endpoint": "https://auth.atlassian.com/authorize",
		"token_endpoint": "https://auth.atlassian.com/oauth/token",
		"redirect_uri": "https://agent.example.com/oauth/callback",
		"scopes": "read:confluence-content.all write:confluence-content offline_access",
		"scopes_env": "atlassian_scopes",
		"authorize_params": { "audience": "api.atlassian.com", "prompt": "consent" }
	}]
}"#;

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let config = BridgeConfig::from_json_str(CONFIG)?;
	let authorizer = config.apply(ReqwestAuthorizer::new(
		Arc::new(MemoryStore::default()),
		Arc::new(DefaultProviderStrategy),
	)?)?;
	let confluence = ConfluenceClient::atlassian(Client::new(), "atlassian".parse()?)?;
	let invoker = confluence
		.tools()
		.into_iter()
		.fold(ToolInvoker::new(authorizer), |invoker, tool| invoker.with_tool(tool));
	// In production the principal comes from `Verifier::verify` on the inbound bearer token.
	let principal = Principal::new(
		SubjectId::new("demo-user")?,
		config.inbound.issuer.as_str(),
		OffsetDateTime::now_utc() + Duration::hours(1),
	);
	let outcome = invoker
		.invoke_named(
			&principal,
			"search_confluence_by_text",
			json!({ "search_text": "roadmap", "limit": 5 }),
		)
		.await?;

	println!("Registered tools: {:?}.", invoker.tool_names().collect::<Vec<_>>());
	println!("{}", serde_json::to_string_pretty(&outcome.to_agent_json())?);

	if let Some(request) = outcome.consent() {
		println!("Redirect handler must call complete_consent with state `{}`.", request.state);
	}

	Ok(())
}
