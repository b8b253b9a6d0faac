//! MCP Server Implementation
//!
//! Handles MCP protocol requests and routes tool calls to the graph.

use super::handlers::ToolHandler;
use super::protocol::*;
use super::schema::validate_arguments;
use super::tools::{find_tool, get_all_tools};
use super::transport::{stdio, LineTransport};
use crate::error::ToolError;
use agentmem_graph::{MemoryGraph, NodeId};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncWrite};

const PROTOCOL_VERSION: &str = "2024-11-05";
const SERVER_NAME: &str = "agentmem";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// MCP Server - handles protocol messages.
///
/// Holds no per-session state, so one instance can serve stdio or any number
/// of concurrent HTTP requests.
#[derive(Clone)]
pub struct McpServer {
    handler: ToolHandler,
}

impl McpServer {
    pub fn new(graph: MemoryGraph, default_zone: NodeId) -> Self {
        Self {
            handler: ToolHandler::new(graph, default_zone),
        }
    }

    pub fn handler(&self) -> &ToolHandler {
        &self.handler
    }

    /// Serve stdin/stdout until the client closes stdin
    pub async fn run_stdio(&self) -> std::io::Result<()> {
        self.serve(stdio()).await
    }

    /// Run the request loop over a line transport until EOF
    pub async fn serve<R, W>(&self, mut transport: LineTransport<R, W>) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        tracing::info!("MCP server starting...");

        while let Some(line) = transport.read_message().await? {
            if let Some(response) = self.handle_message(&line).await {
                transport.write_response(&response).await?;
            }
        }

        tracing::info!("Client disconnected");
        Ok(())
    }

    /// Handle one raw message; `None` when no response is due
    pub async fn handle_message(&self, message: &str) -> Option<JsonRpcResponse> {
        let value: Value = match serde_json::from_str(message) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Failed to parse JSON-RPC message: {}", e);
                return Some(JsonRpcResponse::error(
                    None,
                    JsonRpcError::parse_error(format!("Parse error: {}", e)),
                ));
            }
        };

        let id = value.get("id").cloned().filter(|id| !id.is_null());
        match serde_json::from_value::<JsonRpcRequest>(value) {
            Ok(request) => self.handle_request(request).await,
            Err(e) => Some(JsonRpcResponse::error(
                id,
                JsonRpcError::invalid_request(format!("Invalid request: {}", e)),
            )),
        }
    }

    /// Handle a JSON-RPC request; notifications get no response
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        tracing::debug!("Handling request: {}", request.method);

        if request.jsonrpc != "2.0" {
            return Some(JsonRpcResponse::error(
                request.id,
                JsonRpcError::invalid_request("jsonrpc must be \"2.0\""),
            ));
        }

        let notification = request.is_notification();
        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.id, request.params),
            "initialized" | "notifications/initialized" | "notifications/cancelled" => {
                return None;
            }
            "ping" => respond(request.id, &PingResult {}),
            "tools/list" => self.handle_tools_list(request.id),
            "tools/call" => self.handle_tools_call(request.id, request.params).await,
            _ => {
                JsonRpcResponse::error(request.id, JsonRpcError::method_not_found(&request.method))
            }
        };

        if notification {
            tracing::debug!("Dropping response to notification {}", request.method);
            return None;
        }
        Some(response)
    }

    fn handle_initialize(&self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let params: InitializeParams = params
            .and_then(|p| serde_json::from_value(p).ok())
            .unwrap_or_default();

        if let Some(client) = &params.client_info {
            tracing::info!(
                "Client connected: {} {}",
                client.name,
                client.version.as_deref().unwrap_or("")
            );
        }

        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                experimental: None,
                tools: Some(ToolsCapability {
                    list_changed: Some(false),
                }),
            },
            server_info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: Some(SERVER_VERSION.to_string()),
            },
            instructions: Some(format!(
                "Graph memory for coding agents. Tools without zone_id act on the default zone {}.",
                self.handler.default_zone()
            )),
        };

        respond(id, &result)
    }

    fn handle_tools_list(&self, id: Option<Value>) -> JsonRpcResponse {
        let result = ToolsListResult {
            tools: get_all_tools(),
        };
        respond(id, &result)
    }

    async fn handle_tools_call(&self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let params: ToolCallParams = match params {
            Some(p) => match serde_json::from_value(p) {
                Ok(p) => p,
                Err(e) => {
                    return JsonRpcResponse::error(
                        id,
                        JsonRpcError::invalid_params(format!("Invalid params: {}", e)),
                    );
                }
            },
            None => {
                return JsonRpcResponse::error(id, JsonRpcError::invalid_params("Missing params"));
            }
        };

        let Some(tool) = find_tool(&params.name) else {
            return JsonRpcResponse::error(
                id,
                JsonRpcError::invalid_params(format!("Unknown tool: {}", params.name)),
            );
        };

        let result = match self.execute_tool(tool, params.arguments).await {
            Ok(value) => ToolCallResult::structured(value),
            Err(e) => {
                tracing::debug!("Tool {} failed: {}", params.name, e);
                ToolCallResult::failure(e.to_structured(), &e.message)
            }
        };
        respond(id, &result)
    }

    /// Validate and run a tool on the blocking pool
    async fn execute_tool(&self, tool: Tool, args: Option<Value>) -> Result<Value, ToolError> {
        let args = validate_arguments(&tool.input_schema, args)?;
        let handler = self.handler.clone();
        tokio::task::spawn_blocking(move || handler.call(&tool.name, args))
            .await
            .map_err(|e| ToolError {
                reason: "storage_error",
                message: format!("tool task failed: {}", e),
            })?
    }
}

fn respond<T: serde::Serialize>(id: Option<Value>, result: &T) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => JsonRpcResponse::error(id, JsonRpcError::internal_error(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use agentmem_graph::{connect, StoreConfig};
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    fn server() -> (TempDir, McpServer) {
        let dir = TempDir::new().unwrap();
        let graph = MemoryGraph::new(Arc::new(connect(&StoreConfig::new(dir.path())).unwrap()));
        let zone = graph.zones().ensure("default").unwrap();
        (dir, McpServer::new(graph, zone.id))
    }

    async fn call_tool(server: &McpServer, name: &str, arguments: Value) -> Value {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/call",
            "params": {"name": name, "arguments": arguments}
        });
        let response = server
            .handle_message(&request.to_string())
            .await
            .expect("tool calls always get a response");
        assert!(response.error.is_none(), "unexpected protocol error: {:?}", response.error);
        response.result.unwrap()
    }

    /// Structured content of a successful call
    async fn ok(server: &McpServer, name: &str, arguments: Value) -> Value {
        let result = call_tool(server, name, arguments).await;
        assert!(result.get("isError").is_none(), "{} failed: {}", name, result);
        result["structuredContent"].clone()
    }

    /// Error reason of a failed call
    async fn failure(server: &McpServer, name: &str, arguments: Value) -> String {
        let result = call_tool(server, name, arguments).await;
        assert_eq!(result["isError"], true, "{} unexpectedly succeeded", name);
        result["structuredContent"]["error"]["reason"]
            .as_str()
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn test_initialize_and_list_tools() {
        let (_dir, server) = server();
        let response = server
            .handle_message(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2024-11-05","clientInfo":{"name":"test"}}}"#)
            .await
            .unwrap();
        let result = response.result.unwrap();
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(result["serverInfo"]["name"], "agentmem");

        let response = server
            .handle_message(r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#)
            .await
            .unwrap();
        let tools = response.result.unwrap()["tools"].as_array().unwrap().len();
        assert_eq!(tools, 26);
    }

    #[tokio::test]
    async fn test_notifications_get_no_response() {
        let (_dir, server) = server();
        assert!(server
            .handle_message(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await
            .is_none());
        assert!(server
            .handle_message(r#"{"jsonrpc":"2.0","method":"ping"}"#)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_protocol_errors() {
        let (_dir, server) = server();

        let response = server.handle_message("{not json").await.unwrap();
        let error = response.error.unwrap();
        assert_eq!(error.code, -32700);
        assert_eq!(error.data.unwrap()["reason"], "protocol_error");

        let response = server
            .handle_message(r#"{"jsonrpc":"2.0","id":7,"method":"resources/list"}"#)
            .await
            .unwrap();
        assert_eq!(response.id, Some(json!(7)));
        assert_eq!(response.error.unwrap().code, -32601);

        let response = server
            .handle_message(r#"{"jsonrpc":"2.0","id":8,"method":"tools/call","params":{"name":"drop_database"}}"#)
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, -32602);

        let response = server
            .handle_message(r#"{"jsonrpc":"2.0","id":9,"method":"tools/call","params":{"arguments":{}}}"#)
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, -32602);

        let response = server
            .handle_message(r#"{"jsonrpc":"2.0","id":10}"#)
            .await
            .unwrap();
        assert_eq!(response.id, Some(json!(10)));
        assert_eq!(response.error.unwrap().code, -32600);
    }

    #[tokio::test]
    async fn test_schema_violation_does_not_mutate() {
        let (_dir, server) = server();
        let reason = failure(&server, "create_plan", json!({"name": "P", "status": "done"})).await;
        assert_eq!(reason, "validation_error");
        let reason = failure(&server, "create_plan", json!({"name": "P", "owner": "me"})).await;
        assert_eq!(reason, "validation_error");

        let plans = ok(&server, "list_plans", json!({})).await;
        assert_eq!(plans["count"], 0);
    }

    #[tokio::test]
    async fn test_dependency_scenario() {
        let (_dir, server) = server();
        let zone = ok(&server, "create_zone", json!({"name": "Z1"})).await;
        let zone_id = zone["id"].clone();

        let plan = ok(&server, "create_plan", json!({"zone_id": zone_id, "name": "Payments"})).await;
        assert_eq!(plan["status"], "draft");

        let gateway = ok(
            &server,
            "create_task",
            json!({"zone_id": zone_id, "content": "Integrate gateway", "plan_ids": [plan["id"]]}),
        )
        .await;
        assert_eq!(gateway["status"], "pending");
        let tests = ok(
            &server,
            "create_task",
            json!({"zone_id": zone_id, "content": "Write tests", "plan_ids": [plan["id"]]}),
        )
        .await;

        let link = ok(
            &server,
            "create_relationship",
            json!({"zone_id": zone_id, "from_id": tests["id"], "to_id": gateway["id"], "type": "DEPENDS_ON"}),
        )
        .await;
        assert_eq!(link["created"], true);

        let query = json!({
            "zone_id": zone_id,
            "node_id": tests["id"],
            "type": "DEPENDS_ON",
            "direction": "outgoing",
            "depth": 1
        });
        let related = ok(&server, "get_related", query.clone()).await;
        assert_eq!(related["count"], 1);
        assert_eq!(related["related"][0]["node"]["id"], gateway["id"]);
        assert_eq!(related["related"][0]["node"]["kind"], "task");

        let deleted = ok(
            &server,
            "delete_task",
            json!({"zone_id": zone_id, "task_id": gateway["id"]}),
        )
        .await;
        assert_eq!(deleted["deleted"], true);

        let related = ok(&server, "get_related", query).await;
        assert_eq!(related["count"], 0);
    }

    #[tokio::test]
    async fn test_task_status_scenario() {
        let (_dir, server) = server();
        let plan = ok(&server, "create_plan", json!({"name": "Payments"})).await;
        let gateway = ok(
            &server,
            "create_task",
            json!({"content": "Integrate gateway", "plan_ids": [plan["id"]]}),
        )
        .await;
        let tests = ok(
            &server,
            "create_task",
            json!({"content": "Write tests", "plan_ids": [plan["id"]]}),
        )
        .await;

        let pending = json!({"plan_id": plan["id"], "status": "pending"});
        let listed = ok(&server, "list_tasks", pending.clone()).await;
        assert_eq!(listed["count"], 2);
        assert_eq!(listed["tasks"][0]["id"], gateway["id"]);
        assert_eq!(listed["tasks"][1]["id"], tests["id"]);

        let updated = ok(
            &server,
            "update_task",
            json!({"task_id": gateway["id"], "status": "completed"}),
        )
        .await;
        assert_eq!(updated["status"], "completed");

        let listed = ok(&server, "list_tasks", pending).await;
        assert_eq!(listed["count"], 1);
        assert_eq!(listed["tasks"][0]["id"], tests["id"]);
    }

    #[tokio::test]
    async fn test_engine_errors_are_tool_errors() {
        let (_dir, server) = server();
        let other = ok(&server, "create_zone", json!({"name": "other"})).await;
        let foreign = ok(&server, "create_plan", json!({"zone_id": other["id"], "name": "P"})).await;

        let hidden = ok(&server, "get_plan", json!({"plan_id": foreign["id"]})).await;
        assert!(hidden.is_null());
        let missing = json!({"plan_id": NodeId::new(), "name": "x"});
        let reason = failure(&server, "update_plan", missing).await;
        assert_eq!(reason, "not_found");
        let reason = failure(&server, "delete_plan", json!({"plan_id": foreign["id"]})).await;
        assert_eq!(reason, "isolation_violation");
        let reason = failure(&server, "delete_zone", json!({"zone_id": other["id"]})).await;
        assert_eq!(reason, "validation_error");
    }

    #[tokio::test]
    async fn test_memory_types_use_declared_spelling() {
        let (_dir, server) = server();
        let note = json!({"content": "Use rustfmt", "type": "Note"});
        let memory = ok(&server, "add_memory", note).await;
        assert_eq!(memory["type"], "Note");

        let listed = ok(&server, "search_memories", json!({"type": "Note"})).await;
        assert_eq!(listed["count"], 1);

        let reason = failure(&server, "add_memory", json!({"content": "x", "type": "note"})).await;
        assert_eq!(reason, "validation_error");
    }

    #[tokio::test]
    async fn test_stdio_session_survives_bad_lines() {
        let (_dir, server) = server();
        let input = concat!(
            "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n",
            "garbage\n",
            "{\"jsonrpc\":\"2.0\",\"method\":\"notifications/initialized\"}\n",
            "\n",
            "{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"tools/call\",\"params\":{\"name\":\"memory_stats\"}}\n",
        );
        let mut output = Vec::new();
        server
            .serve(LineTransport::new(input.as_bytes(), &mut output))
            .await
            .unwrap();

        let responses: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0]["id"], 1);
        assert_eq!(responses[1]["error"]["code"], -32700);
        assert_eq!(responses[2]["id"], 2);
        assert_eq!(responses[2]["result"]["structuredContent"]["totalNodes"], 1);
    }
}
