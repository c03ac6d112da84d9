//! Authorized Workspace API client
//!
//! The one client handle the auth manager hands out. It never owns a token
//! itself; every request reads the current bearer token from the credential
//! store, so renewals are picked up without replacing the handle.

use std::fmt;
use std::sync::Arc;

use chrono::{Duration, SecondsFormat, Utc};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::auth::credentials::CredentialStore;
use crate::config::{google::USER_ID, ApiEndpoints};
use crate::error::{ApiError, AuthError, Result, WorkspaceMcpError};
use crate::workspace::types::*;

/// Default look-ahead window for listing events
const EVENT_WINDOW_DAYS: i64 = 30;

/// Workspace API client
pub struct WorkspaceClient {
    /// HTTP client
    http_client: reqwest::Client,

    /// Shared credential store, kept current by the auth manager
    credentials: Arc<CredentialStore>,

    /// API base URLs
    api: ApiEndpoints,
}

impl fmt::Debug for WorkspaceClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkspaceClient")
            .field("api", &self.api)
            .finish_non_exhaustive()
    }
}

impl WorkspaceClient {
    /// Create a client bound to a credential store
    pub fn new(credentials: Arc<CredentialStore>, api: ApiEndpoints) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            credentials,
            api,
        }
    }

    /// Current access token
    pub fn access_token(&self) -> Option<String> {
        self.credentials.access_token()
    }

    fn bearer(&self) -> Result<String> {
        self.access_token().ok_or_else(|| {
            WorkspaceMcpError::Auth(AuthError::InvalidResponse {
                message: "no access token held".to_string(),
            })
        })
    }

    /// Send a request with the current bearer token and check its status
    async fn send(&self, request: RequestBuilder, resource: &str) -> Result<Response> {
        let token = self.bearer()?;
        let response = request.bearer_auth(&token).send().await?;

        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else if status == StatusCode::NOT_FOUND {
            Err(WorkspaceMcpError::Api(ApiError::NotFound {
                resource: resource.to_string(),
            }))
        } else {
            let text = response.text().await.unwrap_or_default();
            Err(WorkspaceMcpError::Api(ApiError::RequestFailed {
                message: format!("{} request failed ({}): {}", resource, status, text),
            }))
        }
    }

    /// GET a JSON resource
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
        resource: &str,
    ) -> Result<T> {
        let request = self.http_client.get(url).query(query);
        Ok(self.send(request, resource).await?.json().await?)
    }

    // ==================== Gmail ====================

    /// Get a message's headers and snippet
    pub async fn get_message(&self, message_id: &str) -> Result<Message> {
        let id = path_segment("message id", message_id)?;
        let url = format!("{}/users/{}/messages/{}", self.api.gmail, USER_ID, id);
        let query = [
            ("format", "metadata".to_string()),
            ("metadataHeaders", "From".to_string()),
            ("metadataHeaders", "Subject".to_string()),
        ];

        self.get_json(&url, &query, "message").await
    }

    /// List drafts
    pub async fn list_drafts(&self, params: &ListDraftsParams) -> Result<DraftList> {
        let url = format!("{}/users/{}/drafts", self.api.gmail, USER_ID);

        let mut query = vec![("maxResults", params.max_results.to_string())];
        if let Some(q) = params.query.as_ref().filter(|q| !q.is_empty()) {
            query.push(("q", q.clone()));
        }

        self.get_json(&url, &query, "drafts").await
    }

    /// Get a draft with its message headers and snippet
    pub async fn get_draft(&self, draft_id: &str) -> Result<Draft> {
        let id = path_segment("draft id", draft_id)?;
        let url = format!("{}/users/{}/drafts/{}", self.api.gmail, USER_ID, id);

        self.get_json(&url, &[("format", "metadata".to_string())], "draft")
            .await
    }

    /// Permanently delete a draft
    pub async fn delete_draft(&self, draft_id: &str) -> Result<()> {
        let id = path_segment("draft id", draft_id)?;
        let url = format!("{}/users/{}/drafts/{}", self.api.gmail, USER_ID, id);

        self.send(self.http_client.delete(&url), "draft").await?;
        Ok(())
    }

    /// List Gmail messages
    pub async fn list_messages(&self, params: &ListMessagesParams) -> Result<MessageList> {
        let url = format!("{}/users/{}/messages", self.api.gmail, USER_ID);

        let mut query = vec![("maxResults", params.max_results.to_string())];
        if let Some(q) = params.effective_query() {
            query.push(("q", q));
        }
        for label in &params.label_ids {
            query.push(("labelIds", label.clone()));
        }

        self.get_json(&url, &query, "messages").await
    }

    // ==================== Calendar ====================

    /// List events on the primary calendar, expanded and ordered by start
    pub async fn list_events(&self, params: &ListEventsParams) -> Result<EventList> {
        let url = format!("{}/calendars/primary/events", self.api.calendar);

        let now = Utc::now();
        let time_min = params
            .time_min
            .clone()
            .unwrap_or_else(|| now.to_rfc3339_opts(SecondsFormat::Secs, true));
        let time_max = params.time_max.clone().unwrap_or_else(|| {
            (now + Duration::days(EVENT_WINDOW_DAYS)).to_rfc3339_opts(SecondsFormat::Secs, true)
        });

        let mut query = vec![
            ("timeMin", time_min),
            ("timeMax", time_max),
            ("maxResults", params.max_results.to_string()),
            ("singleEvents", "true".to_string()),
            ("orderBy", "startTime".to_string()),
        ];
        if let Some(q) = params.query.as_ref().filter(|q| !q.is_empty()) {
            query.push(("q", q.clone()));
        }

        self.get_json(&url, &query, "events").await
    }

    /// Get one event from the primary calendar
    pub async fn get_event(&self, event_id: &str) -> Result<Event> {
        let id = path_segment("event id", event_id)?;
        let url = format!("{}/calendars/primary/events/{}", self.api.calendar, id);

        self.get_json(&url, &[], "event").await
    }

    /// List calendars on the user's calendar list
    pub async fn list_calendars(&self, params: &ListCalendarsParams) -> Result<CalendarList> {
        let url = format!("{}/users/{}/calendarList", self.api.calendar, USER_ID);
        let query = [
            ("maxResults", params.max_results.to_string()),
            ("showDeleted", params.show_deleted.to_string()),
        ];

        self.get_json(&url, &query, "calendars").await
    }

    // ==================== Chat ====================

    /// List messages in a Chat space
    pub async fn list_chat_messages(
        &self,
        params: &ListChatMessagesParams,
    ) -> Result<ChatMessageList> {
        let url = format!("{}/spaces/{}/messages", self.api.chat, chat_space(&params.space)?);

        let mut query = vec![("pageSize", params.max_results.to_string())];
        if let Some(token) = &params.page_token {
            query.push(("pageToken", token.clone()));
        }
        if let Some(filter) = &params.filter {
            query.push(("filter", filter.clone()));
        }

        self.get_json(&url, &query, "chat messages").await
    }

    /// Post a text message to a Chat space
    pub async fn send_chat_message(&self, params: &SendChatMessageParams) -> Result<ChatMessage> {
        let url = format!("{}/spaces/{}/messages", self.api.chat, chat_space(&params.space)?);

        let body = NewChatMessage {
            text: params.text.clone(),
            thread: params.thread_key.clone().map(|thread_key| ChatThread { thread_key }),
        };
        let mut request = self.http_client.post(&url).json(&body);
        if body.thread.is_some() {
            request = request.query(&[(
                "messageReplyOption",
                "REPLY_MESSAGE_FALLBACK_TO_NEW_THREAD",
            )]);
        }

        Ok(self.send(request, "chat space").await?.json().await?)
    }
}

fn path_segment<'a>(kind: &str, value: &'a str) -> Result<&'a str> {
    if is_path_segment(value) {
        Ok(value)
    } else {
        Err(invalid_name(kind, value))
    }
}

fn chat_space(space: &str) -> Result<&str> {
    space_id(space).ok_or_else(|| invalid_name("space", space))
}

fn invalid_name(kind: &str, value: &str) -> WorkspaceMcpError {
    WorkspaceMcpError::Api(ApiError::InvalidResourceName {
        kind: kind.to_string(),
        value: value.to_string(),
    })
}
