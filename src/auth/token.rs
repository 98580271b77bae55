//! Outbound token models.

pub mod credential;
pub mod secret;
