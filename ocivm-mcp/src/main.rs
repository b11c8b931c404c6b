//! Stdio JSON-RPC server exposing instance provisioning as MCP tools.
//!
//! Every tool failure is reported as a structured text result rather than a
//! protocol error, so callers always get a JSON payload back.

use std::sync::OnceLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use ocivm_common::error::{Error, Result};
use ocivm_common::ProvisionRequest;
use ocivm_provisioner::{services, Provisioner};
use ocivm_providers::{Credentials, ProviderClients};

mod tools;

/// Launch waits at most this long for RUNNING before reporting a timeout.
const LAUNCH_MAX_WAIT: Duration = Duration::from_secs(300);

struct Session {
    clients: ProviderClients,
    credentials: Credentials,
}

static SESSION: OnceLock<Session> = OnceLock::new();

/// Credentials are resolved on first tool call, not at startup, so the
/// server can come up and list tools without a working configuration.
fn session() -> Result<&'static Session> {
    if let Some(session) = SESSION.get() {
        return Ok(session);
    }
    let credentials = Credentials::resolve()?;
    let clients = ProviderClients::from_credentials(&credentials)?;
    Ok(SESSION.get_or_init(|| Session {
        clients,
        credentials,
    }))
}

#[derive(Deserialize)]
struct RpcRequest {
    id: Option<Value>,
    method: String,
    params: Option<Value>,
}

#[derive(Serialize)]
struct RpcSuccessResponse {
    jsonrpc: String,
    result: Value,
    id: Option<Value>,
}

#[derive(Serialize)]
struct RpcError {
    code: i32,
    message: String,
    data: Option<Value>,
}

#[derive(Serialize)]
struct RpcErrorResponse {
    jsonrpc: String,
    error: RpcError,
    id: Option<Value>,
}

fn initialize_result() -> Value {
    json!({
        "protocolVersion": "2025-06-18",
        "capabilities": {
            "tools": {
                "listChanged": false
            }
        },
        "serverInfo": {
            "name": "ocivm-mcp",
            "title": "Compute Instance Control",
            "version": env!("CARGO_PKG_VERSION")
        }
    })
}

/// Wrap a tool payload the way MCP expects tool results.
fn text_result(payload: &Value) -> Value {
    json!({
        "content": [{
            "type": "text",
            "text": serde_json::to_string_pretty(payload).unwrap_or_else(|_| payload.to_string())
        }]
    })
}

fn error_payload(err: &Error) -> Value {
    json!({
        "status": "error",
        "message": err.to_string()
    })
}

async fn handle_method(method: &str, params: Option<&Value>) -> Option<Value> {
    match method {
        "initialize" => Some(initialize_result()),
        "tools/list" => Some(tools::tool_schemas()),
        m if m.starts_with("notifications/") => None,
        "tools/call" => {
            let name = params
                .and_then(|p| p.get("name"))
                .and_then(|n| n.as_str())
                .unwrap_or_default()
                .to_string();
            let arguments = params
                .and_then(|p| p.get("arguments"))
                .cloned()
                .unwrap_or_else(|| json!({}));
            let payload = dispatch_tool(&name, &arguments)
                .await
                .unwrap_or_else(|err| error_payload(&err));
            Some(text_result(&payload))
        }
        other => Some(text_result(&json!({
            "status": "error",
            "message": format!("unknown method: {other}")
        }))),
    }
}

async fn dispatch_tool(name: &str, arguments: &Value) -> Result<Value> {
    match name {
        "oci_instance_launch" => handle_launch(arguments).await,
        "oci_instance_list" => handle_list(arguments).await,
        "oci_instance_terminate" => handle_terminate(arguments).await,
        "oci_instance_get" => handle_get(arguments).await,
        "oci_network_list" => handle_network_list().await,
        "oci_config_check" => handle_config_check().await,
        other => Ok(json!({
            "status": "error",
            "message": format!("unknown tool: {other}")
        })),
    }
}

fn str_arg(arguments: &Value, key: &str) -> Option<String> {
    arguments.get(key).and_then(|v| v.as_str()).map(String::from)
}

fn num_arg(arguments: &Value, key: &str) -> Option<f64> {
    arguments.get(key).and_then(Value::as_f64)
}

fn missing_argument(key: &str) -> Value {
    json!({
        "status": "error",
        "message": format!("missing required argument: {key}")
    })
}

async fn handle_launch(arguments: &Value) -> Result<Value> {
    let Some(display_name) = str_arg(arguments, "name") else {
        return Ok(missing_argument("name"));
    };
    let mut request = ProvisionRequest::with_defaults(display_name);
    if let Some(shape) = str_arg(arguments, "shape") {
        request.shape = shape;
    }
    if let Some(ocpus) = num_arg(arguments, "ocpus") {
        request.ocpus = ocpus;
    }
    if let Some(memory_gb) = num_arg(arguments, "memory_gb") {
        request.memory_gb = memory_gb;
    }
    if let Some(os_family) = str_arg(arguments, "image_os") {
        request.os_family = os_family;
    }
    if let Some(os_version) = str_arg(arguments, "image_version") {
        request.os_version = os_version;
    }
    if let Some(ssh_key_path) = str_arg(arguments, "ssh_key_path") {
        request.ssh_key_path = ssh_key_path;
    }
    request.subnet_hint = str_arg(arguments, "subnet");

    let session = session()?;
    let provisioner = Provisioner::new(session.clients.clone())
        .with_max_wait(Some(LAUNCH_MAX_WAIT));
    let result = provisioner.provision(&request).await?;

    Ok(json!({
        "status": "launched",
        "instance_id": result.instance.id,
        "name": result.instance.display_name,
        "shape": result.instance.shape,
        "state": result.instance.lifecycle_state,
        "public_ip": result.network_interface.public_ip,
        "private_ip": result.network_interface.private_ip,
        "ssh_command": result.ssh_hint
    }))
}

async fn handle_list(arguments: &Value) -> Result<Value> {
    let session = session()?;
    let state = str_arg(arguments, "state");
    let summaries = services::list_instances(&session.clients, state.as_deref()).await?;

    let instances: Vec<Value> = summaries
        .iter()
        .map(|s| {
            json!({
                "id": s.id,
                "name": s.display_name,
                "state": s.lifecycle_state,
                "shape": s.shape,
                "public_ip": s.public_ip.as_deref().unwrap_or("N/A"),
                "created": s.time_created.map(|t| t.to_rfc3339())
            })
        })
        .collect();

    Ok(json!({
        "total": instances.len(),
        "instances": instances
    }))
}

async fn handle_terminate(arguments: &Value) -> Result<Value> {
    let Some(instance_id) = str_arg(arguments, "instance_id") else {
        return Ok(missing_argument("instance_id"));
    };
    let session = session()?;
    let receipt = services::terminate_instance(&session.clients, &instance_id).await?;

    Ok(json!({
        "status": "terminating",
        "message": format!("Termination requested for {}", receipt.display_name),
        "instance_id": receipt.instance_id,
        "previous_state": receipt.previous_state
    }))
}

async fn handle_get(arguments: &Value) -> Result<Value> {
    let Some(instance_id) = str_arg(arguments, "instance_id") else {
        return Ok(missing_argument("instance_id"));
    };
    let session = session()?;
    let details = services::instance_details(&session.clients, &instance_id).await?;

    let public_ip = details
        .network_interface
        .as_ref()
        .and_then(|n| n.public_ip.clone());
    let private_ip = details
        .network_interface
        .as_ref()
        .and_then(|n| n.private_ip.clone());
    let ssh_command = public_ip
        .as_ref()
        .map(|ip| format!("ssh ubuntu@{ip}"));

    Ok(json!({
        "id": details.instance.id,
        "name": details.instance.display_name,
        "state": details.instance.lifecycle_state,
        "shape": details.instance.shape,
        "availability_domain": details.instance.availability_domain,
        "created": details.instance.time_created.map(|t| t.to_rfc3339()),
        "public_ip": public_ip.as_deref().unwrap_or("N/A"),
        "private_ip": private_ip.as_deref().unwrap_or("N/A"),
        "ssh_command": ssh_command
    }))
}

async fn handle_network_list() -> Result<Value> {
    let session = session()?;
    let listings = services::list_networks(&session.clients).await?;

    let networks: Vec<Value> = listings
        .iter()
        .map(|l| {
            json!({
                "vcn_id": l.vcn.id,
                "vcn_name": l.vcn.display_name,
                "cidr_block": l.vcn.cidr_block,
                "subnets": l.subnets.iter().map(|s| json!({
                    "id": s.id,
                    "name": s.display_name,
                    "cidr_block": s.cidr_block,
                    "availability_domain": s.availability_domain
                })).collect::<Vec<_>>()
            })
        })
        .collect();

    Ok(json!({
        "total_vcns": networks.len(),
        "networks": networks
    }))
}

async fn handle_config_check() -> Result<Value> {
    let session = session()?;
    let report = services::check_config(&session.clients, &session.credentials).await;
    Ok(serde_json::to_value(&report).map_err(|e| Error::Malformed {
        operation: "config_check",
        detail: e.to_string(),
    })?)
}

async fn rpc_loop() -> std::io::Result<()> {
    let stdin = tokio::io::stdin();
    let reader = BufReader::new(stdin);
    let mut lines = reader.lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let request: RpcRequest = match serde_json::from_str(&line) {
            Ok(req) => req,
            Err(err) => {
                tracing::warn!(%err, "discarding malformed request line");
                continue;
            }
        };

        // Requests without an id are notifications and get no reply.
        let is_notification = request.id.is_none();
        let result = handle_method(&request.method, request.params.as_ref()).await;
        let Some(result) = result else { continue };
        if is_notification {
            continue;
        }

        let response = RpcSuccessResponse {
            jsonrpc: "2.0".to_string(),
            result,
            id: request.id,
        };
        let payload = match serde_json::to_string(&response) {
            Ok(payload) => payload,
            Err(err) => {
                let fallback = RpcErrorResponse {
                    jsonrpc: "2.0".to_string(),
                    error: RpcError {
                        code: -32603,
                        message: err.to_string(),
                        data: None,
                    },
                    id: response.id,
                };
                serde_json::to_string(&fallback).unwrap_or_default()
            }
        };
        stdout.write_all(payload.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    // Stdout carries the protocol; all logging goes to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("starting ocivm-mcp server on stdio");
    rpc_loop().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn initialize_reports_server_info() {
        let result = handle_method("initialize", None).await.unwrap();
        assert_eq!(result["serverInfo"]["name"], "ocivm-mcp");
        assert!(result["protocolVersion"].is_string());
    }

    #[tokio::test]
    async fn tools_list_matches_dispatch_table() {
        let result = handle_method("tools/list", None).await.unwrap();
        for tool in result["tools"].as_array().unwrap() {
            let name = tool["name"].as_str().unwrap();
            assert!(matches!(
                name,
                "oci_instance_launch"
                    | "oci_instance_list"
                    | "oci_instance_terminate"
                    | "oci_instance_get"
                    | "oci_network_list"
                    | "oci_config_check"
            ));
        }
    }

    #[tokio::test]
    async fn notifications_get_no_reply() {
        assert!(handle_method("notifications/initialized", None)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn unknown_tool_is_a_structured_error() {
        let params = json!({"name": "oci_does_not_exist", "arguments": {}});
        let result = handle_method("tools/call", Some(&params)).await.unwrap();
        let text = result["content"][0]["text"].as_str().unwrap();
        let payload: Value = serde_json::from_str(text).unwrap();
        assert_eq!(payload["status"], "error");
        assert!(payload["message"].as_str().unwrap().contains("unknown tool"));
    }

    #[tokio::test]
    async fn missing_required_argument_is_a_structured_error() {
        let params = json!({"name": "oci_instance_terminate", "arguments": {}});
        let result = handle_method("tools/call", Some(&params)).await.unwrap();
        let text = result["content"][0]["text"].as_str().unwrap();
        let payload: Value = serde_json::from_str(text).unwrap();
        assert_eq!(payload["status"], "error");
        assert!(payload["message"]
            .as_str()
            .unwrap()
            .contains("instance_id"));
    }
}
