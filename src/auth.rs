//! Auth-domain identifiers, scope sets, principals, credentials, and pending consents.

pub mod consent;
pub mod id;
pub mod principal;
pub mod scope;
pub mod token;

pub use consent::*;
pub use id::*;
pub use principal::*;
pub use scope::*;
pub use token::{credential::*, secret::*};
