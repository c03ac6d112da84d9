//! Configuration management for the Google Workspace MCP Server
//!
//! Handles OAuth client identity, endpoint URLs and environment loading.

use crate::error::{ConfigError, Result};

/// Environment variables that must be present for the server to start
pub const REQUIRED_ENV_VARS: [&str; 4] = [
    "GOOGLE_CLIENT_ID",
    "GOOGLE_CLIENT_SECRET",
    "REDIRECT_URI",
    "GOOGLE_REFRESH_TOKEN",
];

/// Configuration for the Google Workspace MCP Server
#[derive(Debug, Clone)]
pub struct Config {
    /// OAuth client identity
    pub oauth: OAuthClientConfig,

    /// Refresh token minted by a prior consent flow
    pub refresh_token: Option<String>,

    /// Workspace API base URLs
    pub api: ApiEndpoints,
}

/// OAuth2 client identity and provider endpoints
#[derive(Debug, Clone)]
pub struct OAuthClientConfig {
    /// Client ID
    pub client_id: String,

    /// Client secret
    pub client_secret: String,

    /// Redirect URI registered for the client
    pub redirect_uri: String,

    /// Token endpoint (refresh grant)
    pub token_uri: String,

    /// Token introspection endpoint
    pub tokeninfo_uri: String,
}

impl OAuthClientConfig {
    /// Build a client config against Google's default endpoints
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            token_uri: google::TOKEN_URI.to_string(),
            tokeninfo_uri: google::TOKENINFO_URI.to_string(),
        }
    }

    /// Reject an identity with any empty field
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let fields = [
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("redirect_uri", &self.redirect_uri),
        ];

        for (field, value) in fields {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingClientField {
                    field: field.to_string(),
                });
            }
        }

        Ok(())
    }
}

/// Base URLs for the Workspace REST APIs
#[derive(Debug, Clone)]
pub struct ApiEndpoints {
    pub gmail: String,
    pub calendar: String,
    pub chat: String,
}

impl Default for ApiEndpoints {
    fn default() -> Self {
        Self {
            gmail: google::GMAIL_API_BASE_URL.to_string(),
            calendar: google::CALENDAR_API_BASE_URL.to_string(),
            chat: google::CHAT_API_BASE_URL.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    ///
    /// Every missing required variable is reported at once.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let missing: Vec<String> = REQUIRED_ENV_VARS
            .iter()
            .filter(|var| get(**var).is_none())
            .map(|var| var.to_string())
            .collect();

        if !missing.is_empty() {
            return Err(ConfigError::MissingEnvVars { vars: missing }.into());
        }

        let mut oauth = OAuthClientConfig::new(
            get("GOOGLE_CLIENT_ID").unwrap_or_default(),
            get("GOOGLE_CLIENT_SECRET").unwrap_or_default(),
            get("REDIRECT_URI").unwrap_or_default(),
        );
        if let Some(uri) = get("GOOGLE_TOKEN_URI") {
            oauth.token_uri = uri;
        }
        if let Some(uri) = get("GOOGLE_TOKENINFO_URI") {
            oauth.tokeninfo_uri = uri;
        }

        Ok(Self {
            oauth,
            refresh_token: get("GOOGLE_REFRESH_TOKEN"),
            api: ApiEndpoints::default(),
        })
    }
}

/// Google API constants
pub mod google {
    /// OAuth2 token endpoint
    pub const TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

    /// OAuth2 tokeninfo endpoint
    pub const TOKENINFO_URI: &str = "https://oauth2.googleapis.com/tokeninfo";

    /// Base URL for Gmail API
    pub const GMAIL_API_BASE_URL: &str = "https://gmail.googleapis.com/gmail/v1";

    /// Base URL for Calendar API
    pub const CALENDAR_API_BASE_URL: &str = "https://www.googleapis.com/calendar/v3";

    /// Base URL for Chat API
    pub const CHAT_API_BASE_URL: &str = "https://chat.googleapis.com/v1";

    /// User ID for the authenticated user
    pub const USER_ID: &str = "me";

    /// Scopes the refresh token is expected to carry
    pub const SCOPES: [&str; 6] = [
        "https://www.googleapis.com/auth/gmail.readonly",
        "https://www.googleapis.com/auth/gmail.modify",
        "https://www.googleapis.com/auth/calendar",
        "https://www.googleapis.com/auth/calendar.events",
        "https://www.googleapis.com/auth/chat.messages.readonly",
        "https://www.googleapis.com/auth/chat.messages.create",
    ];
}
