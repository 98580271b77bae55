//! Spans and counters emitted by the verifier, authorizer, and tool wrapper.
//!
//! # Feature Flags
//!
//! - `tracing` (default) opens a `delegated_auth.flow` span per operation carrying the `flow` and
//!   `stage` fields.
//! - `metrics` increments `delegated_auth_flow_total`, labeled by `flow` and `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Operations observed by the bridge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Inbound bearer token verification.
	Verify,
	/// Access token lookup for a (principal, service) pair.
	GetToken,
	/// Refresh token grant.
	Refresh,
	/// Authorization code redemption after the consent redirect.
	CompleteConsent,
	/// Credentialed tool invocation.
	ToolCall,
}
impl FlowKind {
	/// Stable label for span and metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::Verify => "verify",
			FlowKind::GetToken => "get_token",
			FlowKind::Refresh => "refresh",
			FlowKind::CompleteConsent => "complete_consent",
			FlowKind::ToolCall => "tool_call",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded per operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Operation entered.
	Attempt,
	/// Operation completed.
	Success,
	/// Operation ended by asking the user for consent.
	ConsentRequired,
	/// Error returned to the caller.
	Failure,
}
impl FlowOutcome {
	/// Stable label for span and metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::ConsentRequired => "consent_required",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
