//! OAuth credential lifecycle
//!
//! Keeps a single OAuth client's access token valid for the life of the
//! process and hands out the authorized client handle.

pub mod credentials;
pub mod exchange;
pub mod manager;

pub use credentials::{merge, CredentialSet, CredentialStore, TokenGrant};
pub use exchange::{GoogleTokenEndpoint, TokenExchange, TokenInfo};
pub use manager::{AuthManager, REFRESH_MARGIN, RETRY_BACKOFF};
