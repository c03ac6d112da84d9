//! Google Workspace MCP Server Library
//!
//! A Model Context Protocol (MCP) server exposing Gmail, Calendar and Chat
//! operations. The [`auth`] module keeps the OAuth access token valid for the
//! life of the process so tool calls never wait on a refresh once running.

pub mod auth;
pub mod config;
pub mod error;
pub mod mcp;
pub mod workspace;

pub use auth::AuthManager;
pub use config::Config;
pub use error::{Result, WorkspaceMcpError};
