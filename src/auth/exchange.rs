//! Token exchange with the OAuth2 provider
//!
//! The manager only talks to the provider through [`TokenExchange`], which
//! keeps the refresh cycle testable without a network.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::auth::credentials::TokenGrant;
use crate::config::OAuthClientConfig;
use crate::error::AuthError;

/// Network timeout applied to every provider call
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of introspecting an access token
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TokenInfo {
    /// Space separated scopes granted to the token
    #[serde(default)]
    pub scope: String,

    /// Seconds until the token expires, as reported by the provider
    #[serde(default, deserialize_with = "de_opt_u64")]
    pub expires_in: Option<u64>,

    #[serde(default)]
    pub email: Option<String>,

    /// Client the token was issued to
    #[serde(default, alias = "aud")]
    pub audience: Option<String>,
}

impl TokenInfo {
    /// Scopes granted to the token
    pub fn scopes(&self) -> impl Iterator<Item = &str> {
        self.scope.split_whitespace()
    }
}

/// Capability to refresh and introspect OAuth2 tokens
#[async_trait]
pub trait TokenExchange: Send + Sync {
    /// Redeem a refresh token for a new access token
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, AuthError>;

    /// Ask the provider whether an access token is valid
    async fn introspect(&self, access_token: &str) -> Result<TokenInfo, AuthError>;
}

/// Token response from the OAuth token endpoint
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

/// Error body from the OAuth token endpoint
#[derive(Debug, Default, Deserialize)]
struct TokenErrorResponse {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Google's token and tokeninfo endpoints
pub struct GoogleTokenEndpoint {
    http_client: Client,
    oauth: OAuthClientConfig,
}

impl GoogleTokenEndpoint {
    /// Create an endpoint client for the given OAuth identity
    pub fn new(oauth: OAuthClientConfig) -> Result<Self, AuthError> {
        let http_client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(AuthError::from)?;

        Ok(Self { http_client, oauth })
    }

    fn classify_failure(status: StatusCode, body: &str) -> AuthError {
        let parsed: TokenErrorResponse = serde_json::from_str(body).unwrap_or_default();
        let message = match parsed.error_description {
            Some(desc) if !parsed.error.is_empty() => format!("{}: {}", parsed.error, desc),
            _ if !parsed.error.is_empty() => parsed.error.clone(),
            _ => body.to_string(),
        };

        if parsed.error == "invalid_grant"
            || status == StatusCode::BAD_REQUEST
            || status == StatusCode::UNAUTHORIZED
        {
            AuthError::InvalidGrant { message }
        } else {
            AuthError::Endpoint {
                status: status.as_u16(),
                message,
            }
        }
    }
}

#[async_trait]
impl TokenExchange for GoogleTokenEndpoint {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, AuthError> {
        let params = [
            ("client_id", self.oauth.client_id.as_str()),
            ("client_secret", self.oauth.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .http_client
            .post(&self.oauth.token_uri)
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::debug!(status = %status, "token endpoint rejected refresh");
            return Err(Self::classify_failure(status, &text));
        }

        let token_response: TokenResponse = response.json().await?;
        if token_response.access_token.is_empty() {
            return Err(AuthError::InvalidResponse {
                message: "response does not contain access_token".to_string(),
            });
        }

        let expiry = token_response
            .expires_in
            .map(|secs| expiry_after(Utc::now(), secs))
            .transpose()?;

        Ok(TokenGrant {
            access_token: token_response.access_token,
            expiry,
            refresh_token: token_response.refresh_token,
        })
    }

    async fn introspect(&self, access_token: &str) -> Result<TokenInfo, AuthError> {
        let response = self
            .http_client
            .get(&self.oauth.tokeninfo_uri)
            .query(&[("access_token", access_token)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AuthError::Introspection {
                message: format!("{}: {}", status, text),
            });
        }

        response.json().await.map_err(|e| AuthError::Introspection {
            message: e.to_string(),
        })
    }
}

/// Absolute expiry for a token valid `expires_in` seconds from `now`
fn expiry_after(now: DateTime<Utc>, expires_in: i64) -> Result<DateTime<Utc>, AuthError> {
    if expires_in <= 0 {
        return Err(AuthError::InvalidResponse {
            message: format!("expires_in must be positive, got {}", expires_in),
        });
    }

    TimeDelta::try_seconds(expires_in)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .ok_or_else(|| AuthError::InvalidResponse {
            message: format!("expires_in out of range: {}", expires_in),
        })
}

/// tokeninfo reports numbers as strings
fn de_opt_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumOrString {
        Num(u64),
        Str(String),
    }

    match Option::<NumOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumOrString::Num(n)) => Ok(Some(n)),
        Some(NumOrString::Str(s)) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}
