//! MCP server over line-delimited JSON-RPC 2.0.
//!
//! One request is handled at a time; the next line is not read until the
//! current reply has been written. Tool failures are returned as
//! `isError` results, protocol failures as JSON-RPC errors.

pub mod types;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::VmError;
use crate::session::SessionContext;
use crate::tools::{ToolRegistry, RESOURCE_SCHEME};
use types::{
    BlobContents, JsonRpcRequest, JsonRpcResponse, ResourceTemplate, ToolDefinition, ToolResult,
    INVALID_PARAMS, METHOD_NOT_FOUND, PARSE_ERROR, RESOURCE_NOT_FOUND,
};

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "vm-control";

pub struct McpServer {
    registry: ToolRegistry,
    session: SessionContext,
}

impl McpServer {
    pub fn new(session: SessionContext) -> Self {
        Self {
            registry: ToolRegistry::new(),
            session,
        }
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn into_session(self) -> SessionContext {
        self.session
    }

    /// Read requests until EOF, writing one reply line per non-notification.
    pub async fn serve<R, W>(&mut self, reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            tracing::debug!(request = %line, "Received");

            let Some(response) = self.handle_line(&line).await else {
                continue;
            };
            let mut out = serde_json::to_string(&response)?;
            out.push('\n');
            writer.write_all(out.as_bytes()).await?;
            writer.flush().await?;
        }
        tracing::info!("Client closed the input stream");
        Ok(())
    }

    pub async fn handle_line(&mut self, line: &str) -> Option<JsonRpcResponse> {
        match serde_json::from_str::<JsonRpcRequest>(line) {
            Ok(request) => self.handle(request).await,
            Err(e) => {
                tracing::warn!(error = %e, "Parse error");
                Some(JsonRpcResponse::error(Value::Null, PARSE_ERROR, "Parse error"))
            }
        }
    }

    pub async fn handle(&mut self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if request.is_notification() {
            tracing::debug!(method = %request.method, "Notification received, no response sent");
            return None;
        }
        let id = request.id.unwrap_or(Value::Null);
        let params = request.params;

        let response = match request.method.as_str() {
            "initialize" => JsonRpcResponse::success(
                id,
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "serverInfo": {
                        "name": SERVER_NAME,
                        "version": env!("CARGO_PKG_VERSION")
                    },
                    "capabilities": {
                        "tools": { "listChanged": false },
                        "resources": { "listChanged": false, "subscribe": false }
                    }
                }),
            ),
            "ping" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => {
                let tools: Vec<ToolDefinition> = self
                    .registry
                    .list_tools()
                    .into_iter()
                    .map(|t| ToolDefinition {
                        name: t.name,
                        description: t.description,
                        input_schema: t.input_schema,
                    })
                    .collect();
                JsonRpcResponse::success(id, json!({ "tools": tools }))
            }
            "tools/call" => self.call_tool(id, &params).await,
            "resources/list" => JsonRpcResponse::success(id, json!({ "resources": [] })),
            "resources/templates/list" => {
                let template = ResourceTemplate {
                    uri_template: format!("{}{{id}}", RESOURCE_SCHEME),
                    name: "screenshot".to_string(),
                    description: "A screenshot by id, searched across every project".to_string(),
                    mime_type: "image/png".to_string(),
                };
                JsonRpcResponse::success(id, json!({ "resourceTemplates": [template] }))
            }
            "resources/read" => self.read_resource(id, &params),
            other => JsonRpcResponse::error(
                id,
                METHOD_NOT_FOUND,
                format!("Method not found: {}", other),
            ),
        };
        Some(response)
    }

    async fn call_tool(&mut self, id: Value, params: &Value) -> JsonRpcResponse {
        let Some(name) = params.get("name").and_then(|v| v.as_str()) else {
            return JsonRpcResponse::error(id, INVALID_PARAMS, "Missing tool name");
        };
        let args = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

        let result = match self.registry.execute(name, args, &mut self.session).await {
            Ok(text) => ToolResult::text(text),
            Err(e) => {
                tracing::warn!(tool = %name, error = %e, "Tool call failed");
                ToolResult::failure(e.to_string())
            }
        };
        JsonRpcResponse::success(id, json!(result))
    }

    fn read_resource(&self, id: Value, params: &Value) -> JsonRpcResponse {
        let Some(uri) = params.get("uri").and_then(|v| v.as_str()) else {
            return JsonRpcResponse::error(id, INVALID_PARAMS, "Missing resource uri");
        };
        let Some(screenshot_id) = uri.strip_prefix(RESOURCE_SCHEME) else {
            return JsonRpcResponse::error(
                id,
                RESOURCE_NOT_FOUND,
                format!("Unknown resource: {}", uri),
            );
        };

        match self.session.store().find_screenshot(screenshot_id) {
            Ok(bytes) => {
                let contents = BlobContents {
                    uri: uri.to_string(),
                    mime_type: "image/png".to_string(),
                    blob: BASE64.encode(bytes),
                };
                JsonRpcResponse::success(id, json!({ "contents": [contents] }))
            }
            Err(e @ VmError::NotFound(_)) => {
                JsonRpcResponse::error(id, RESOURCE_NOT_FOUND, e.to_string())
            }
            Err(e) => JsonRpcResponse::error(id, INVALID_PARAMS, e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::test_support::session;
    use tokio::io::BufReader;

    fn server(root: &std::path::Path) -> (McpServer, crate::remote::testing::RecordingTransport) {
        let (ctx, transport) = session(root);
        (McpServer::new(ctx), transport)
    }

    fn result(response: Option<JsonRpcResponse>) -> Value {
        response.expect("response").result.expect("result")
    }

    #[tokio::test]
    async fn initialize_and_notifications() {
        let temp = tempfile::tempdir().expect("tempdir");
        let (mut srv, _) = server(temp.path());

        let init = result(
            srv.handle_line(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#)
                .await,
        );
        assert_eq!(init["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(init["serverInfo"]["name"], SERVER_NAME);

        let none = srv
            .handle_line(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await;
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn protocol_errors() {
        let temp = tempfile::tempdir().expect("tempdir");
        let (mut srv, _) = server(temp.path());

        let parse = srv.handle_line("{not json").await.unwrap();
        assert_eq!(parse.error.unwrap().code, PARSE_ERROR);

        let unknown = srv
            .handle_line(r#"{"jsonrpc":"2.0","id":2,"method":"tools/teleport"}"#)
            .await
            .unwrap();
        assert_eq!(unknown.error.unwrap().code, METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn tools_list_and_call() {
        let temp = tempfile::tempdir().expect("tempdir");
        let (mut srv, transport) = server(temp.path());

        let list = result(
            srv.handle_line(r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#)
                .await,
        );
        assert_eq!(list["tools"].as_array().unwrap().len(), 20);
        assert!(list["tools"][0]["inputSchema"].is_object());

        let call = result(
            srv.handle_line(
                r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"press_keys","arguments":{"keys":["Ctrl","L"]}}}"#,
            )
            .await,
        );
        assert_eq!(call["isError"], false);
        assert_eq!(call["content"][0]["text"], "Pressed keys: [\"Ctrl\", \"L\"]");
        assert_eq!(transport.commands(), vec!["DISPLAY=:0 xdotool key ctrl+l".to_string()]);
    }

    #[tokio::test]
    async fn tool_errors_are_flagged() {
        let temp = tempfile::tempdir().expect("tempdir");
        let (mut srv, _) = server(temp.path());

        let call = result(
            srv.handle_line(
                r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"project_info"}}"#,
            )
            .await,
        );
        assert_eq!(call["isError"], true);
        assert_eq!(
            call["content"][0]["text"],
            "No project initialized. Call project_init first."
        );
    }

    #[tokio::test]
    async fn screenshot_resource_round_trip() {
        let temp = tempfile::tempdir().expect("tempdir");
        let (mut srv, _) = server(temp.path());
        let project = srv.session().store().create("demo", "").unwrap();
        std::fs::write(project.screenshot_path("shot-1"), b"png-bytes").unwrap();

        let templates = result(
            srv.handle_line(r#"{"jsonrpc":"2.0","id":1,"method":"resources/templates/list"}"#)
                .await,
        );
        assert_eq!(
            templates["resourceTemplates"][0]["uriTemplate"],
            "vm://screenshot/{id}"
        );

        let read = result(
            srv.handle_line(
                r#"{"jsonrpc":"2.0","id":2,"method":"resources/read","params":{"uri":"vm://screenshot/shot-1"}}"#,
            )
            .await,
        );
        assert_eq!(read["contents"][0]["blob"], BASE64.encode(b"png-bytes"));

        let missing = srv
            .handle_line(
                r#"{"jsonrpc":"2.0","id":3,"method":"resources/read","params":{"uri":"vm://screenshot/shot-9"}}"#,
            )
            .await
            .unwrap();
        let err = missing.error.unwrap();
        assert_eq!(err.code, RESOURCE_NOT_FOUND);
        assert_eq!(err.message, "No screenshot found for id shot-9");
    }

    #[tokio::test]
    async fn serve_answers_requests_in_order() {
        let temp = tempfile::tempdir().expect("tempdir");
        let (mut srv, _) = server(temp.path());

        let input = tokio_test::io::Builder::new()
            .read(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n")
            .read(b"\n{\"jsonrpc\":\"2.0\",\"method\":\"notifications/initialized\"}\n")
            .read(b"{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"ping\"}\n")
            .build();
        let output = tokio_test::io::Builder::new()
            .write(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n")
            .write(b"{\"jsonrpc\":\"2.0\",\"id\":2,\"result\":{}}\n")
            .build();

        srv.serve(BufReader::new(input), output).await.unwrap();
    }
}
