//! Integration tests for the Google Workspace MCP Server
//!
//! These tests run the real token endpoint client and MCP server against a
//! mock Google backend - they don't make real API calls.

use std::sync::Arc;

use serde_json::{json, Value};
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use google_workspace_mcp::auth::AuthManager;
use google_workspace_mcp::config::{google, Config};
use google_workspace_mcp::error::AuthError;
use google_workspace_mcp::mcp::server::McpServer;

/// Helper to build a config pointing every endpoint at the mock server
fn config_for(server: &MockServer, refresh_token: &str) -> Config {
    let uri = server.uri();
    let vars = [
        ("GOOGLE_CLIENT_ID", "client-id".to_string()),
        ("GOOGLE_CLIENT_SECRET", "client-secret".to_string()),
        ("REDIRECT_URI", "http://localhost:3000/oauth2callback".to_string()),
        ("GOOGLE_REFRESH_TOKEN", refresh_token.to_string()),
        ("GOOGLE_TOKEN_URI", format!("{}/token", uri)),
        ("GOOGLE_TOKENINFO_URI", format!("{}/tokeninfo", uri)),
    ];

    let mut config = Config::from_lookup(|key| {
        vars.iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.clone())
    })
    .expect("config should load");
    config.api.gmail = uri.clone();
    config.api.calendar = uri.clone();
    config.api.chat = uri;
    config
}

async fn mount_token_endpoint(server: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=good-refresh-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "ya29.test-access",
            "expires_in": 3599,
            "token_type": "Bearer"
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

async fn mount_tokeninfo(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/tokeninfo"))
        .and(query_param("access_token", "ya29.test-access"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "aud": "client-id",
            "scope": google::SCOPES.join(" "),
            "expires_in": "3599"
        })))
        .expect(1)
        .mount(server)
        .await;
}

mod auth_lifecycle_tests {
    use super::*;

    #[tokio::test]
    async fn test_validate_auth_against_token_endpoints() {
        let server = MockServer::start().await;
        mount_token_endpoint(&server, 1).await;
        mount_tokeninfo(&server).await;

        let manager = AuthManager::from_config(&config_for(&server, "good-refresh-token")).unwrap();

        assert!(manager.validate_auth().await);

        let creds = manager.credentials();
        assert_eq!(creds.access_token.as_deref(), Some("ya29.test-access"));
        // The response omitted refresh_token; the configured one is kept.
        assert_eq!(creds.refresh_token.as_deref(), Some("good-refresh-token"));
        assert!(manager.next_refresh_at().is_some());

        manager.destroy();
    }

    #[tokio::test]
    async fn test_revoked_refresh_token_fails_validation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_grant",
                "error_description": "Token has been expired or revoked."
            })))
            // Startup attempt, then the explicit client() retry
            .expect(2)
            .mount(&server)
            .await;

        let manager = AuthManager::from_config(&config_for(&server, "revoked")).unwrap();

        assert!(!manager.validate_auth().await);
        assert!(matches!(
            manager.client().await,
            Err(AuthError::InvalidGrant { .. })
        ));
        assert!(!manager.is_refreshing());

        manager.destroy();
    }

    #[tokio::test]
    async fn test_unavailable_token_endpoint_fails_validation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(503))
            // The retry is 30 s out; validation settles on the first attempt
            .expect(1)
            .mount(&server)
            .await;

        let manager = AuthManager::from_config(&config_for(&server, "good-refresh-token")).unwrap();

        assert!(!manager.validate_auth().await);
        assert!(!manager.is_refreshing());
        assert!(manager.next_refresh_at().is_some());

        manager.destroy();
    }

    #[tokio::test]
    async fn test_client_handle_is_shared() {
        let server = MockServer::start().await;
        mount_token_endpoint(&server, 1).await;

        let manager = AuthManager::from_config(&config_for(&server, "good-refresh-token")).unwrap();

        let first = manager.client().await.unwrap();
        let second = manager.client().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.access_token().as_deref(), Some("ya29.test-access"));

        manager.destroy();
        manager.destroy();
    }
}

mod mcp_protocol_tests {
    use super::*;

    /// Helper to create a JSON-RPC request line
    fn make_request(id: i64, method: &str, params: Option<Value>) -> String {
        let mut request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
        });
        if let Some(p) = params {
            request["params"] = p;
        }
        format!("{}\n", request)
    }

    async fn run_session(manager: Arc<AuthManager>, input: String) -> Vec<Value> {
        let mut server = McpServer::new(manager);
        let mut output = Vec::new();
        server
            .serve(input.as_bytes(), &mut output, std::future::pending())
            .await
            .unwrap();

        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).expect("response is JSON"))
            .collect()
    }

    #[tokio::test]
    async fn test_full_session_lists_emails() {
        let server = MockServer::start().await;
        mount_token_endpoint(&server, 1).await;
        Mock::given(method("GET"))
            .and(path("/users/me/messages"))
            .and(header("authorization", "Bearer ya29.test-access"))
            .and(query_param("q", "is:unread"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "messages": [{"id": "18c1", "threadId": "18c0"}],
                "resultSizeEstimate": 1
            })))
            .expect(1)
            .mount(&server)
            .await;

        let manager = Arc::new(
            AuthManager::from_config(&config_for(&server, "good-refresh-token")).unwrap(),
        );

        let mut input = make_request(
            1,
            "initialize",
            Some(json!({
                "protocolVersion": "2024-11-05",
                "clientInfo": {"name": "test-client", "version": "1.0.0"},
                "capabilities": {}
            })),
        );
        input.push_str("{\"jsonrpc\":\"2.0\",\"method\":\"notifications/initialized\"}\n");
        input.push_str(&make_request(2, "tools/list", None));
        input.push_str(&make_request(
            3,
            "tools/call",
            Some(json!({
                "name": "list_emails",
                "arguments": {"unreadOnly": true},
                "_meta": {"progressToken": "p1"}
            })),
        ));

        let responses = run_session(Arc::clone(&manager), input).await;
        assert_eq!(responses.len(), 3);

        assert_eq!(responses[0]["id"], 1);
        assert_eq!(responses[0]["result"]["protocolVersion"], "2024-11-05");
        assert!(responses[0]["result"]["capabilities"]["tools"].is_object());

        let tools = responses[1]["result"]["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 10);
        assert!(tools.iter().all(|t| t["inputSchema"]["type"] == "object"));

        let call = &responses[2]["result"];
        assert!(call.get("isError").is_none());
        assert_eq!(call["_meta"]["progressToken"], "p1");
        assert!(call["content"][0]["text"]
            .as_str()
            .unwrap()
            .contains("1. ID: 18c1 (thread 18c0)"));

        manager.destroy();
    }

    #[tokio::test]
    async fn test_parse_error_response() {
        let server = MockServer::start().await;
        let manager = Arc::new(AuthManager::from_config(&config_for(&server, "unused")).unwrap());
        manager.destroy();

        let responses = run_session(manager, "{not json\n".to_string()).await;

        assert_eq!(responses.len(), 1);
        assert!(responses[0]["id"].is_null());
        assert_eq!(responses[0]["error"]["code"], -32700);
    }

    #[tokio::test]
    async fn test_tool_call_after_destroy_is_tool_error() {
        let server = MockServer::start().await;
        let manager = Arc::new(AuthManager::from_config(&config_for(&server, "unused")).unwrap());
        manager.destroy();

        let input = make_request(
            7,
            "tools/call",
            Some(json!({"name": "list_events", "arguments": {}})),
        );
        let responses = run_session(manager, input).await;

        assert_eq!(responses[0]["result"]["isError"], true);
        assert!(responses[0]["result"]["content"][0]["text"]
            .as_str()
            .unwrap()
            .contains("destroyed"));
    }
}
