//! Target-service descriptors (data) and provider strategies (behavior).
//!
//! `descriptor` holds the static, validated configuration for one third-party service: client
//! credentials, HTTPS endpoints, redirect URI, requested scopes, and provider quirks.
//! `strategy` defines [`ProviderStrategy`], the HTTP-client-agnostic hook that classifies token
//! endpoint failures and may decorate outgoing token requests.

pub mod descriptor;
pub mod grant;
pub mod strategy;

pub use descriptor::*;
pub use grant::*;
pub use strategy::*;
