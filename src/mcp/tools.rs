//! MCP Tool definitions and handlers
//!
//! Defines all available tools and their implementations. Every call first
//! obtains the authorized client from the auth manager.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::AuthManager;
use crate::error::{ApiError, McpError, WorkspaceMcpError};
use crate::mcp::types::{CallToolResult, Tool};
use crate::workspace::client::WorkspaceClient;
use crate::workspace::types::{
    space_id, Event, ListCalendarsParams, ListChatMessagesParams, ListDraftsParams,
    ListEventsParams, ListMessagesParams, Message, SendChatMessageParams,
};

/// Default page size for Gmail and Chat listings
pub const LIST_MAX_RESULTS: u32 = 10;

/// Default page size for calendar listings
pub const CALENDAR_MAX_RESULTS: u32 = 25;

const LIST_EMAILS: &str = "list_emails";
const READ_EMAIL: &str = "read_email";
const LIST_DRAFTS: &str = "list_drafts";
const READ_DRAFT: &str = "read_draft";
const DELETE_DRAFT: &str = "delete_draft";
const LIST_EVENTS: &str = "list_events";
const READ_EVENT: &str = "read_event";
const LIST_CALENDARS: &str = "list_calendars";
const LIST_CHAT_MESSAGES: &str = "list_chat_messages";
const SEND_CHAT_MESSAGE: &str = "send_chat_message";

const TOOL_NAMES: [&str; 10] = [
    LIST_EMAILS,
    READ_EMAIL,
    LIST_DRAFTS,
    READ_DRAFT,
    DELETE_DRAFT,
    LIST_EVENTS,
    READ_EVENT,
    LIST_CALENDARS,
    LIST_CHAT_MESSAGES,
    SEND_CHAT_MESSAGE,
];

/// Tool handler
pub struct ToolHandler {
    auth: Arc<AuthManager>,
}

impl ToolHandler {
    /// Create a new tool handler
    pub fn new(auth: Arc<AuthManager>) -> Self {
        Self { auth }
    }

    /// List all available tools
    pub fn list_tools(&self) -> Vec<Tool> {
        vec![
            tool_def(LIST_EMAILS, "List Gmail messages", list_emails_schema()),
            tool_def(
                READ_EMAIL,
                "Read a specific Gmail message",
                id_schema("messageId", "ID of the message to read"),
            ),
            tool_def(LIST_DRAFTS, "List Gmail draft messages", list_drafts_schema()),
            tool_def(
                READ_DRAFT,
                "Get detailed information about a Gmail draft message",
                id_schema("draftId", "ID of the draft to read"),
            ),
            tool_def(
                DELETE_DRAFT,
                "Delete a Gmail draft message",
                id_schema("draftId", "ID of the draft to delete"),
            ),
            tool_def(LIST_EVENTS, "List upcoming calendar events", list_events_schema()),
            tool_def(
                READ_EVENT,
                "Get detailed information about a calendar event",
                id_schema("eventId", "ID of the event to read"),
            ),
            tool_def(LIST_CALENDARS, "List available Google calendars", list_calendars_schema()),
            tool_def(
                LIST_CHAT_MESSAGES,
                "List messages from a Google Chat space",
                list_chat_messages_schema(),
            ),
            tool_def(
                SEND_CHAT_MESSAGE,
                "Send a message to a Google Chat space",
                send_chat_message_schema(),
            ),
        ]
    }

    /// Call a tool by name
    pub async fn call_tool(&self, name: &str, args: Value) -> CallToolResult {
        if !TOOL_NAMES.contains(&name) {
            return CallToolResult::error(
                McpError::UnknownTool {
                    name: name.to_string(),
                }
                .to_string(),
            );
        }

        let client = match self.auth.client().await {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!(tool = name, error = %e, "No authorized client for tool call");
                return CallToolResult::error(format!("Authentication failed: {}", e));
            }
        };

        match name {
            LIST_EMAILS => handle_list_emails(&client, args).await,
            READ_EMAIL => handle_read_email(&client, args).await,
            LIST_DRAFTS => handle_list_drafts(&client, args).await,
            READ_DRAFT => handle_read_draft(&client, args).await,
            DELETE_DRAFT => handle_delete_draft(&client, args).await,
            LIST_EVENTS => handle_list_events(&client, args).await,
            READ_EVENT => handle_read_event(&client, args).await,
            LIST_CALENDARS => handle_list_calendars(&client, args).await,
            LIST_CHAT_MESSAGES => handle_list_chat_messages(&client, args).await,
            _ => handle_send_chat_message(&client, args).await,
        }
    }
}

// ==================== Tool Handlers ====================

fn parse_args<T: for<'de> Deserialize<'de>>(args: Value) -> Result<T, CallToolResult> {
    // Clients may send null instead of an empty object.
    let args = if args.is_null() { json!({}) } else { args };
    serde_json::from_value(args).map_err(|e| {
        CallToolResult::error(
            McpError::InvalidArguments {
                message: e.to_string(),
            }
            .to_string(),
        )
    })
}

async fn handle_list_emails(client: &WorkspaceClient, args: Value) -> CallToolResult {
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Args {
        max_results: Option<u32>,
        #[serde(default)]
        label_ids: Vec<String>,
        query: Option<String>,
        #[serde(default)]
        unread_only: bool,
    }

    let args: Args = match parse_args(args) {
        Ok(a) => a,
        Err(result) => return result,
    };

    let params = ListMessagesParams {
        max_results: args.max_results.unwrap_or(LIST_MAX_RESULTS),
        label_ids: args.label_ids,
        query: args.query,
        unread_only: args.unread_only,
    };

    match client.list_messages(&params).await {
        Ok(list) if list.messages.is_empty() => CallToolResult::text("No messages found"),
        Ok(list) => {
            let mut text = format!("Found {} messages:\n", list.messages.len());
            for (index, message) in list.messages.iter().enumerate() {
                text.push_str(&format!(
                    "{}. ID: {} (thread {})\n",
                    index + 1,
                    message.id,
                    message.thread_id
                ));
            }
            if let Some(token) = list.next_page_token {
                text.push_str(&format!("\nMore results available (page token: {})", token));
            }
            CallToolResult::text(text.trim_end())
        }
        Err(e) => CallToolResult::error(e.to_string()),
    }
}

fn format_message(message: &Message) -> String {
    format!(
        "From: {}\nSubject: {}\n\n{}",
        message.header("From").unwrap_or("Unknown"),
        message.header("Subject").unwrap_or("No Subject"),
        message.snippet.as_deref().unwrap_or("No content available"),
    )
}

async fn handle_read_email(client: &WorkspaceClient, args: Value) -> CallToolResult {
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Args {
        message_id: String,
    }

    let args: Args = match parse_args(args) {
        Ok(a) => a,
        Err(result) => return result,
    };

    match client.get_message(&args.message_id).await {
        Ok(message) => CallToolResult::text(format_message(&message)),
        Err(e) => CallToolResult::error(e.to_string()),
    }
}

async fn handle_list_drafts(client: &WorkspaceClient, args: Value) -> CallToolResult {
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Args {
        max_results: Option<u32>,
        query: Option<String>,
    }

    let args: Args = match parse_args(args) {
        Ok(a) => a,
        Err(result) => return result,
    };

    let params = ListDraftsParams {
        max_results: args.max_results.unwrap_or(LIST_MAX_RESULTS),
        query: args.query,
    };

    match client.list_drafts(&params).await {
        Ok(list) if list.drafts.is_empty() => CallToolResult::text("No drafts found"),
        Ok(list) => {
            let text = list
                .drafts
                .iter()
                .enumerate()
                .map(|(index, draft)| format!("{}. Draft ID: {}", index + 1, draft.id))
                .collect::<Vec<_>>()
                .join("\n");
            CallToolResult::text(text)
        }
        Err(e) => CallToolResult::error(e.to_string()),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DraftArgs {
    draft_id: String,
}

async fn handle_read_draft(client: &WorkspaceClient, args: Value) -> CallToolResult {
    let args: DraftArgs = match parse_args(args) {
        Ok(a) => a,
        Err(result) => return result,
    };

    match client.get_draft(&args.draft_id).await {
        Ok(draft) => {
            let body = draft
                .message
                .as_ref()
                .map(format_message)
                .unwrap_or_else(|| "No content available".to_string());
            CallToolResult::text(format!("Draft ID: {}\n{}", draft.id, body))
        }
        Err(e) => CallToolResult::error(e.to_string()),
    }
}

async fn handle_delete_draft(client: &WorkspaceClient, args: Value) -> CallToolResult {
    let args: DraftArgs = match parse_args(args) {
        Ok(a) => a,
        Err(result) => return result,
    };

    match client.delete_draft(&args.draft_id).await {
        Ok(()) => CallToolResult::text(format!("Draft {} deleted", args.draft_id)),
        Err(e) => CallToolResult::error(e.to_string()),
    }
}

async fn handle_list_events(client: &WorkspaceClient, args: Value) -> CallToolResult {
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Args {
        max_results: Option<u32>,
        time_min: Option<String>,
        time_max: Option<String>,
        query: Option<String>,
    }

    let args: Args = match parse_args(args) {
        Ok(a) => a,
        Err(result) => return result,
    };

    let params = ListEventsParams {
        max_results: args.max_results.unwrap_or(CALENDAR_MAX_RESULTS),
        time_min: args.time_min,
        time_max: args.time_max,
        query: args.query,
    };

    match client.list_events(&params).await {
        Ok(list) if list.items.is_empty() => CallToolResult::text("No upcoming events found"),
        Ok(list) => {
            let mut text = String::new();
            for (index, event) in list.items.iter().enumerate() {
                text.push_str(&format!(
                    "{}. {}\n   Event ID: {}\n   When: {} to {}\n   Status: {}\n",
                    index + 1,
                    event.summary.as_deref().unwrap_or("(No title)"),
                    event.id,
                    event.start.display(),
                    event.end.display(),
                    event.status.as_deref().unwrap_or("unspecified"),
                ));
                if !event.attendees.is_empty() {
                    text.push_str(&format!("   Attendees: {}\n", event.attendees.len()));
                }
                if event.recurring_event_id.is_some() {
                    text.push_str("   (Part of recurring series)\n");
                }
                text.push('\n');
            }
            CallToolResult::text(text.trim_end())
        }
        Err(e) => CallToolResult::error(e.to_string()),
    }
}

fn format_event_details(event: &Event) -> String {
    let mut lines = vec![
        format!("Event ID: {}", event.id),
        format!("Summary: {}", event.summary.as_deref().unwrap_or("(No title)")),
        format!("When: {} to {}", event.start.display(), event.end.display()),
        format!("Status: {}", event.status.as_deref().unwrap_or("unspecified")),
    ];
    if let Some(description) = &event.description {
        lines.push(format!("Description: {}", description));
    }
    if let Some(location) = &event.location {
        lines.push(format!("Location: {}", location));
    }
    if let Some(link) = &event.hangout_link {
        lines.push(format!("Meeting Link: {}", link));
    }
    if event.recurring_event_id.is_some() {
        lines.push("Part of recurring series".to_string());
    }
    if let Some(organizer) = event.creator.as_ref().and_then(|c| c.email.as_deref()) {
        lines.push(format!("Organizer: {}", organizer));
    }
    if !event.attendees.is_empty() {
        lines.push("Attendees:".to_string());
        for attendee in &event.attendees {
            let email = attendee.email.as_deref().unwrap_or("(unknown)");
            match &attendee.response_status {
                Some(status) => lines.push(format!("   - {} ({})", email, status)),
                None => lines.push(format!("   - {}", email)),
            }
        }
    }
    lines.join("\n")
}

async fn handle_read_event(client: &WorkspaceClient, args: Value) -> CallToolResult {
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Args {
        event_id: String,
    }

    let args: Args = match parse_args(args) {
        Ok(a) => a,
        Err(result) => return result,
    };

    match client.get_event(&args.event_id).await {
        Ok(event) => CallToolResult::text(format_event_details(&event)),
        Err(WorkspaceMcpError::Api(ApiError::NotFound { .. })) => CallToolResult::error(
            "Event not found. The event may have been deleted or you may not have access to it.",
        ),
        Err(e) => CallToolResult::error(e.to_string()),
    }
}

async fn handle_list_calendars(client: &WorkspaceClient, args: Value) -> CallToolResult {
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Args {
        max_results: Option<u32>,
        #[serde(default)]
        show_deleted: bool,
    }

    let args: Args = match parse_args(args) {
        Ok(a) => a,
        Err(result) => return result,
    };

    let params = ListCalendarsParams {
        max_results: args.max_results.unwrap_or(LIST_MAX_RESULTS),
        show_deleted: args.show_deleted,
    };

    match client.list_calendars(&params).await {
        Ok(list) if list.items.is_empty() => CallToolResult::text("No calendars found"),
        Ok(list) => {
            let text = list
                .items
                .iter()
                .map(|cal| {
                    format!(
                        "{}{} [{}]",
                        cal.summary.as_deref().unwrap_or("(Untitled)"),
                        if cal.primary { " (Primary)" } else { "" },
                        cal.id
                    )
                })
                .collect::<Vec<_>>()
                .join("\n");
            CallToolResult::text(text)
        }
        Err(e) => CallToolResult::error(e.to_string()),
    }
}

fn invalid_space(space: &str) -> CallToolResult {
    CallToolResult::error(
        McpError::InvalidArguments {
            message: format!("space must look like 'spaces/<id>', got '{}'", space),
        }
        .to_string(),
    )
}

async fn handle_list_chat_messages(client: &WorkspaceClient, args: Value) -> CallToolResult {
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Args {
        space: String,
        max_results: Option<u32>,
        page_token: Option<String>,
        filter: Option<String>,
    }

    let args: Args = match parse_args(args) {
        Ok(a) => a,
        Err(result) => return result,
    };

    if space_id(&args.space).is_none() {
        return invalid_space(&args.space);
    }

    let params = ListChatMessagesParams {
        space: args.space,
        max_results: args.max_results.unwrap_or(LIST_MAX_RESULTS),
        page_token: args.page_token,
        filter: args.filter,
    };

    match client.list_chat_messages(&params).await {
        Ok(list) if list.messages.is_empty() => CallToolResult::text("No messages found"),
        Ok(list) => {
            let mut text = String::new();
            for (index, message) in list.messages.iter().enumerate() {
                let sender = message
                    .sender
                    .as_ref()
                    .and_then(|s| s.display_name.as_deref())
                    .unwrap_or("Unknown");
                text.push_str(&format!(
                    "{}. From: {}\n   Time: {}\n   {}\n\n",
                    index + 1,
                    sender,
                    message.create_time.as_deref().unwrap_or("Unknown time"),
                    message.text.as_deref().unwrap_or("(No content)"),
                ));
            }
            CallToolResult::text(text.trim_end())
        }
        Err(e) => CallToolResult::error(e.to_string()),
    }
}

async fn handle_send_chat_message(client: &WorkspaceClient, args: Value) -> CallToolResult {
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Args {
        space: String,
        text: String,
        thread_key: Option<String>,
    }

    let args: Args = match parse_args(args) {
        Ok(a) => a,
        Err(result) => return result,
    };

    if space_id(&args.space).is_none() {
        return invalid_space(&args.space);
    }

    let params = SendChatMessageParams {
        space: args.space,
        text: args.text,
        thread_key: args.thread_key,
    };

    match client.send_chat_message(&params).await {
        Ok(message) => {
            CallToolResult::text(format!("Message sent successfully. Message ID: {}", message.name))
        }
        Err(e) => CallToolResult::error(e.to_string()),
    }
}

// ==================== Schemas ====================

fn tool_def(name: &str, description: &str, input_schema: Value) -> Tool {
    Tool {
        name: name.to_string(),
        description: Some(description.to_string()),
        input_schema,
    }
}

fn list_emails_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "maxResults": {
                "type": "number",
                "description": "Maximum number of messages to return (default: 10)"
            },
            "labelIds": {
                "type": "array",
                "items": {"type": "string"},
                "description": "Label IDs to filter by (e.g., ['INBOX'])"
            },
            "query": {
                "type": "string",
                "description": "Gmail search query (e.g., 'in:inbox', 'is:unread')"
            },
            "unreadOnly": {
                "type": "boolean",
                "description": "Filter to show only unread messages (default: false)"
            }
        }
    })
}

/// Schema for tools taking a single required ID
fn id_schema(field: &str, description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            field: {
                "type": "string",
                "description": description
            }
        },
        "required": [field]
    })
}

fn list_drafts_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "maxResults": {
                "type": "number",
                "description": "Maximum number of drafts to return (default: 10)"
            },
            "query": {
                "type": "string",
                "description": "Search query for drafts"
            }
        }
    })
}

fn list_calendars_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "maxResults": {
                "type": "number",
                "description": "Maximum number of calendars to return (default: 10)"
            },
            "showDeleted": {
                "type": "boolean",
                "description": "Include deleted calendars in the results"
            }
        }
    })
}

fn send_chat_message_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "space": {
                "type": "string",
                "description": "Space name (e.g., spaces/123)"
            },
            "text": {
                "type": "string",
                "description": "Message text content"
            },
            "threadKey": {
                "type": "string",
                "description": "Optional thread key for replies"
            }
        },
        "required": ["space", "text"]
    })
}

fn list_events_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "maxResults": {
                "type": "number",
                "description": "Maximum number of events to return (default: 25)"
            },
            "timeMin": {
                "type": "string",
                "description": "Start time (RFC 3339). Default: now"
            },
            "timeMax": {
                "type": "string",
                "description": "End time (RFC 3339). Default: 30 days from now"
            },
            "query": {
                "type": "string",
                "description": "Text search term"
            }
        }
    })
}

fn list_chat_messages_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "space": {
                "type": "string",
                "description": "Space name (e.g., spaces/123)"
            },
            "maxResults": {
                "type": "number",
                "description": "Maximum number of messages to return (default: 10)"
            },
            "pageToken": {
                "type": "string",
                "description": "Token for pagination"
            },
            "filter": {
                "type": "string",
                "description": "Filter query for messages"
            }
        },
        "required": ["space"]
    })
}
