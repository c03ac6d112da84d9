//! Google Workspace API module
//!
//! Contains the authorized client handle and the Gmail, Calendar and Chat
//! types it returns.

pub mod client;
pub mod types;
