//! Workspace API type definitions
//!
//! These types mirror the Gmail, Calendar and Chat API resources the tools
//! read and write.

use serde::{Deserialize, Serialize};

// ==================== Gmail ====================

/// Message reference from a message list
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    /// Message ID
    pub id: String,

    /// Thread ID
    #[serde(default)]
    pub thread_id: String,
}

/// Response from messages.list
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageList {
    #[serde(default)]
    pub messages: Vec<MessageRef>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,

    #[serde(default)]
    pub result_size_estimate: u32,
}

/// Message header
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageHeader {
    pub name: String,
    pub value: String,
}

/// Top-level message part; only headers are requested
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessagePayload {
    #[serde(default)]
    pub headers: Vec<MessageHeader>,
}

/// Gmail message fetched in metadata format
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,

    #[serde(default)]
    pub thread_id: String,

    #[serde(default)]
    pub label_ids: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<MessagePayload>,
}

impl Message {
    /// First header named `name`, compared case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.payload
            .as_ref()?
            .headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }
}

/// Draft reference from a draft list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftRef {
    pub id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<MessageRef>,
}

/// Response from drafts.list
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftList {
    #[serde(default)]
    pub drafts: Vec<DraftRef>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

/// Draft with its message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Draft {
    pub id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
}

/// Parameters for listing drafts
#[derive(Debug, Clone, Default)]
pub struct ListDraftsParams {
    pub max_results: u32,
    pub query: Option<String>,
}

/// Parameters for listing Gmail messages
#[derive(Debug, Clone, Default)]
pub struct ListMessagesParams {
    pub max_results: u32,
    pub label_ids: Vec<String>,
    pub query: Option<String>,
    pub unread_only: bool,
}

impl ListMessagesParams {
    /// Search query sent to Gmail, folding in the unread filter
    pub fn effective_query(&self) -> Option<String> {
        let query = self.query.as_deref().map(str::trim).filter(|q| !q.is_empty());
        match (query, self.unread_only) {
            (Some(q), true) => Some(format!("{} is:unread", q)),
            (Some(q), false) => Some(q.to_string()),
            (None, true) => Some("is:unread".to_string()),
            (None, false) => None,
        }
    }
}

// ==================== Calendar ====================

/// Start or end of an event; all-day events only carry a date
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDateTime {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

impl EventDateTime {
    pub fn display(&self) -> &str {
        self.date_time
            .as_deref()
            .or(self.date.as_deref())
            .unwrap_or("unknown")
    }
}

/// Event attendee
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendee {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// `needsAction`, `declined`, `tentative` or `accepted`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_status: Option<String>,
}

/// Event creator or organizer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventPerson {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Calendar event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(default)]
    pub start: EventDateTime,

    #[serde(default)]
    pub end: EventDateTime,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attendees: Vec<Attendee>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator: Option<EventPerson>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub hangout_link: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurring_event_id: Option<String>,
}

/// Response from events.list
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventList {
    #[serde(default)]
    pub items: Vec<Event>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

/// Parameters for listing calendar events
#[derive(Debug, Clone, Default)]
pub struct ListEventsParams {
    pub max_results: u32,
    /// RFC 3339 lower bound, defaults to now
    pub time_min: Option<String>,
    /// RFC 3339 upper bound, defaults to 30 days after now
    pub time_max: Option<String>,
    pub query: Option<String>,
}

/// Entry in the user's calendar list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarListEntry {
    pub id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    #[serde(default)]
    pub primary: bool,
}

/// Response from calendarList.list
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarList {
    #[serde(default)]
    pub items: Vec<CalendarListEntry>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

/// Parameters for listing calendars
#[derive(Debug, Clone, Default)]
pub struct ListCalendarsParams {
    pub max_results: u32,
    pub show_deleted: bool,
}

// ==================== Chat ====================

/// Sender of a chat message
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatUser {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Resource name, `spaces/*/messages/*`
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_time: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<ChatUser>,
}

/// Response from spaces.messages.list
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageList {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

/// Parameters for listing chat messages
#[derive(Debug, Clone, Default)]
pub struct ListChatMessagesParams {
    /// Space name, e.g. `spaces/AAAA123`
    pub space: String,
    pub max_results: u32,
    pub page_token: Option<String>,
    pub filter: Option<String>,
}

/// Parameters for posting a chat message
#[derive(Debug, Clone, Default)]
pub struct SendChatMessageParams {
    /// Space name, e.g. `spaces/AAAA123`
    pub space: String,
    pub text: String,
    /// Reply into the thread with this key, creating it if needed
    pub thread_key: Option<String>,
}

/// Thread reference on an outgoing message
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatThread {
    pub thread_key: String,
}

/// Body of spaces.messages.create
#[derive(Debug, Clone, Serialize)]
pub struct NewChatMessage {
    pub text: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread: Option<ChatThread>,
}

// ==================== Resource names ====================

/// Whether `value` can be placed into a URL path as exactly one segment
pub fn is_path_segment(value: &str) -> bool {
    !value.is_empty()
        && value != "."
        && value != ".."
        && !value.contains(['/', '\\', '?', '#', '%'])
}

/// The `<id>` of a `spaces/<id>` resource name
pub fn space_id(space: &str) -> Option<&str> {
    space.strip_prefix("spaces/").filter(|id| is_path_segment(id))
}
