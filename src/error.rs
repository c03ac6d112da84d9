//! Error types for the Google Workspace MCP Server
//!
//! This module defines the error hierarchy for all operations in the server.

use thiserror::Error;

/// Main error type for the Google Workspace MCP Server
#[derive(Error, Debug)]
pub enum WorkspaceMcpError {
    /// OAuth authentication errors
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Workspace API errors
    #[error("Workspace API error: {0}")]
    Api(#[from] ApiError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// MCP protocol errors
    #[error("MCP protocol error: {0}")]
    Mcp(#[from] McpError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// OAuth authentication errors
///
/// Cloneable so a single refresh outcome can be handed to every caller
/// waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("No refresh token available")]
    MissingRefreshToken,

    #[error("Refresh token rejected: {message}")]
    InvalidGrant { message: String },

    #[error("Token endpoint returned {status}: {message}")]
    Endpoint { status: u16, message: String },

    #[error("Token endpoint unreachable: {message}")]
    Network { message: String },

    #[error("Invalid token response: {message}")]
    InvalidResponse { message: String },

    #[error("Token introspection failed: {message}")]
    Introspection { message: String },

    #[error("Refresh attempt was interrupted")]
    Interrupted,

    #[error("Auth manager has been destroyed")]
    Destroyed,
}

impl AuthError {
    /// Whether the scheduler's retry can be expected to fix this failure.
    ///
    /// A revoked refresh token or a torn-down manager will never recover on
    /// its own; a dropped connection or a 5xx usually does.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AuthError::Endpoint { .. }
                | AuthError::Network { .. }
                | AuthError::InvalidResponse { .. }
                | AuthError::Interrupted
        )
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            AuthError::InvalidResponse {
                message: err.to_string(),
            }
        } else {
            AuthError::Network {
                message: err.to_string(),
            }
        }
    }
}

/// Workspace API errors
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("API request failed: {message}")]
    RequestFailed { message: String },

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Invalid {kind} '{value}': must be a single path segment")]
    InvalidResourceName { kind: String, value: String },
}

/// Configuration errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variables: {}", vars.join(", "))]
    MissingEnvVars { vars: Vec<String> },

    #[error("Missing required OAuth2 client field: {field}")]
    MissingClientField { field: String },
}

/// MCP protocol errors
#[derive(Error, Debug)]
pub enum McpError {
    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },

    #[error("Invalid tool arguments: {message}")]
    InvalidArguments { message: String },
}

/// Result type alias for Workspace MCP operations
pub type Result<T> = std::result::Result<T, WorkspaceMcpError>;
