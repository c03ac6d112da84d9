//! MCP Server implementation
//!
//! Implements the Model Context Protocol server for stdio transport.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::auth::AuthManager;
use crate::error::Result;
use crate::mcp::tools::ToolHandler;
use crate::mcp::types::*;

/// MCP Server info
const SERVER_NAME: &str = "google-workspace";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// MCP Server for Google Workspace
pub struct McpServer {
    /// Tool handler
    tool_handler: ToolHandler,

    /// Whether the client sent `notifications/initialized`
    initialized: bool,
}

impl McpServer {
    /// Create a new MCP server
    pub fn new(auth: Arc<AuthManager>) -> Self {
        Self {
            tool_handler: ToolHandler::new(auth),
            initialized: false,
        }
    }

    /// Run the server on stdio until EOF or `shutdown` resolves
    pub async fn run_stdio<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let stdin = BufReader::new(tokio::io::stdin());
        let stdout = tokio::io::stdout();
        self.serve(stdin, stdout, shutdown).await
    }

    /// Serve line-delimited JSON-RPC over arbitrary streams
    pub async fn serve<R, W, F>(&mut self, reader: R, mut writer: W, shutdown: F) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
        F: Future<Output = ()>,
    {
        let mut lines = reader.lines();
        tokio::pin!(shutdown);

        loop {
            let line = tokio::select! {
                line = lines.next_line() => line?,
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested, stopping MCP server");
                    break;
                }
            };

            let Some(line) = line else {
                tracing::info!("stdin closed, stopping MCP server");
                break;
            };
            if line.trim().is_empty() {
                continue;
            }

            if let Some(response) = self.handle_message(&line).await {
                let mut response_str = serde_json::to_string(&response)?;
                response_str.push('\n');
                writer.write_all(response_str.as_bytes()).await?;
                writer.flush().await?;
            }
        }

        Ok(())
    }

    /// Handle an incoming JSON-RPC message
    pub async fn handle_message(&mut self, message: &str) -> Option<JsonRpcResponse> {
        let request: JsonRpcRequest = match serde_json::from_str(message) {
            Ok(req) => req,
            Err(e) => {
                tracing::warn!(error = %e, "Unparseable JSON-RPC message");
                return Some(JsonRpcResponse::error(
                    None,
                    JsonRpcError::parse_error(e.to_string()),
                ));
            }
        };

        if request.is_notification() {
            if request.method == methods::INITIALIZED {
                self.initialized = true;
                tracing::debug!("Client initialized");
            }
            return None;
        }

        let id = request.id.clone();
        let response = match request.method.as_str() {
            methods::INITIALIZE => JsonRpcResponse::success(id, self.initialize_result()),
            methods::PING => JsonRpcResponse::success(id, serde_json::json!({})),
            methods::LIST_TOOLS => {
                let result = ListToolsResult {
                    tools: self.tool_handler.list_tools(),
                };
                JsonRpcResponse::success(id, to_value(result))
            }
            methods::CALL_TOOL => match self.handle_call_tool(&request).await {
                Ok(result) => JsonRpcResponse::success(id, result),
                Err(error) => JsonRpcResponse::error(id, error),
            },
            _ => JsonRpcResponse::error(id, JsonRpcError::method_not_found(&request.method)),
        };

        Some(response)
    }

    /// Whether the client completed the initialize handshake
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn initialize_result(&self) -> Value {
        to_value(InitializeResult {
            protocol_version: MCP_VERSION.to_string(),
            server_info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: SERVER_VERSION.to_string(),
            },
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {}),
            },
        })
    }

    /// Handle call tool request
    async fn handle_call_tool(
        &self,
        request: &JsonRpcRequest,
    ) -> std::result::Result<Value, JsonRpcError> {
        let params: CallToolParams = request
            .params
            .clone()
            .ok_or_else(|| JsonRpcError::invalid_params("Missing tool parameters"))
            .and_then(|p| {
                serde_json::from_value(p).map_err(|e| {
                    JsonRpcError::invalid_params(format!("Invalid tool parameters: {}", e))
                })
            })?;

        tracing::debug!(tool = %params.name, "Calling tool");
        let result = self
            .tool_handler
            .call_tool(&params.name, params.arguments)
            .await
            .with_meta(params.meta);

        Ok(to_value(result))
    }
}

fn to_value<T: serde::Serialize>(value: T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{TokenExchange, TokenGrant, TokenInfo};
    use crate::config::{ApiEndpoints, OAuthClientConfig};
    use crate::error::AuthError;
    use async_trait::async_trait;

    struct RejectingExchange;

    #[async_trait]
    impl TokenExchange for RejectingExchange {
        async fn refresh(&self, _refresh_token: &str) -> std::result::Result<TokenGrant, AuthError> {
            Err(AuthError::InvalidGrant {
                message: "revoked".to_string(),
            })
        }

        async fn introspect(&self, _access_token: &str) -> std::result::Result<TokenInfo, AuthError> {
            Err(AuthError::Introspection {
                message: "invalid".to_string(),
            })
        }
    }

    fn server() -> McpServer {
        let oauth = OAuthClientConfig::new("id", "secret", "http://localhost");
        let manager = AuthManager::new(
            &oauth,
            None,
            Arc::new(RejectingExchange),
            ApiEndpoints::default(),
        )
        .unwrap();
        McpServer::new(Arc::new(manager))
    }

    #[test]
    fn test_server_info() {
        assert_eq!(SERVER_NAME, "google-workspace");
    }

    #[tokio::test]
    async fn test_initialized_notification_gets_no_response() {
        let mut server = server();
        let response = server
            .handle_message(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await;
        assert!(response.is_none());
        assert!(server.is_initialized());
    }

    #[tokio::test]
    async fn test_call_tool_without_params() {
        let mut server = server();
        let response = server
            .handle_message(r#"{"jsonrpc":"2.0","id":"a","method":"tools/call"}"#)
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, -32602);
        assert_eq!(response.id, Some(RequestId::String("a".to_string())));
    }

    #[tokio::test]
    async fn test_serve_until_eof() {
        let mut server = server();
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#,
            "\n\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"bogus"}"#,
            "\n",
        );
        let mut output = Vec::new();

        server
            .serve(input.as_bytes(), &mut output, std::future::pending())
            .await
            .unwrap();

        let lines: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["result"]["serverInfo"]["name"], "google-workspace");
        assert_eq!(lines[1]["error"]["code"], -32601);
    }
}
