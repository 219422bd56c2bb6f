//! Identity registry MCP server.
//!
//! Implements a stdio-based Model Context Protocol server that exposes the
//! identity registry to agents via JSON-RPC 2.0.
//!
//! # Protocol
//!
//! Reads newline-delimited JSON-RPC 2.0 requests from stdin and writes
//! responses to stdout. Each request and response is a single line.
//!
//! # Callers
//!
//! The transport has no authentication of its own. Each tool call names the
//! calling principal in its `caller` argument and the registry enforces
//! ownership against that value.

use std::path::PathBuf;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use clap::Parser;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use identity_registry::clock::micros_to_rfc3339;
use identity_registry::{
    DispatchError, Dispatcher, IdentityRegistry, Operation, Principal, RegistryConfig,
    SnapshotLock, SnapshotStore, SystemClock, Value as CallValue,
};

// ── Constants ─────────────────────────────────────────────────────────────────

/// Requester used for reads that do not name a caller.
const ANONYMOUS: &str = "anonymous";

/// MCP protocol version supported.
const PROTOCOL_VERSION: &str = "2024-11-05";

const REQUESTER_DESC: &str = "Requesting principal (default: anonymous)";
const OWNER_DESC: &str = "Principal issuing the call (must own the target)";

// ── JSON-RPC helpers ──────────────────────────────────────────────────────────

fn ok_result(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result,
    })
}

fn tool_ok(id: Value, text: impl Into<String>) -> Value {
    ok_result(
        id,
        json!({
            "content": [{"type": "text", "text": text.into()}]
        }),
    )
}

fn tool_error(id: Value, code: u32, text: impl Into<String>) -> Value {
    ok_result(
        id,
        json!({
            "content": [{"type": "text", "text": text.into()}],
            "isError": true,
            "errorCode": code
        }),
    )
}

fn rpc_error(id: Value, code: i64, message: impl Into<String>) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": code,
            "message": message.into()
        }
    })
}

// ── Tool arguments ────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
enum ArgError {
    #[error("invalid arguments: {0}")]
    Shape(#[from] serde_json::Error),

    #[error("provide exactly one of \"data\" or \"data_base64\"")]
    Payload,

    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error(transparent)]
    Principal(#[from] DispatchError),
}

#[derive(Debug, Deserialize)]
struct PayloadArgs {
    caller: String,
    data: Option<String>,
    data_base64: Option<String>,
}

impl PayloadArgs {
    fn payload(&self) -> Result<Vec<u8>, ArgError> {
        match (&self.data, &self.data_base64) {
            (Some(text), None) => Ok(text.as_bytes().to_vec()),
            (None, Some(encoded)) => Ok(STANDARD.decode(encoded)?),
            _ => Err(ArgError::Payload),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TargetArgs {
    target: String,
    caller: Option<String>,
}

impl TargetArgs {
    fn requester(&self) -> Result<Principal, ArgError> {
        match &self.caller {
            Some(raw) => Ok(Principal::parse(raw)?),
            None => Ok(Principal::new(ANONYMOUS)),
        }
    }
}

// ── MCP Server ────────────────────────────────────────────────────────────────

struct McpServer {
    dispatcher: Dispatcher,
    store: Option<SnapshotStore>,
}

impl McpServer {
    fn new(dispatcher: Dispatcher, store: Option<SnapshotStore>) -> Self {
        Self { dispatcher, store }
    }

    /// Route a JSON-RPC request to the appropriate handler.
    fn handle_request(&self, request: Value) -> Value {
        let id = request.get("id").cloned().unwrap_or(Value::Null);
        let method = match request.get("method").and_then(|m| m.as_str()) {
            Some(m) => m.to_string(),
            None => return rpc_error(id, -32600, "missing method"),
        };
        let params = request
            .get("params")
            .cloned()
            .unwrap_or(Value::Object(Default::default()));

        tracing::debug!(%method, "request");

        match method.as_str() {
            "initialize" => self.handle_initialize(id),
            // Notification: no response.
            "initialized" | "notifications/initialized" => Value::Null,
            "tools/list" => self.handle_tools_list(id),
            "tools/call" => self.handle_tools_call(id, &params),
            "ping" => ok_result(id, json!({})),
            _ => rpc_error(id, -32601, format!("method not found: {method}")),
        }
    }

    // ── initialize ────────────────────────────────────────────────────────────

    fn handle_initialize(&self, id: Value) -> Value {
        ok_result(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {
                    "tools": {}
                },
                "serverInfo": {
                    "name": "identity-registry-mcp",
                    "version": env!("CARGO_PKG_VERSION")
                }
            }),
        )
    }

    // ── tools/list ────────────────────────────────────────────────────────────

    fn handle_tools_list(&self, id: Value) -> Value {
        let payload_schema = json!({
            "type": "object",
            "required": ["caller"],
            "properties": {
                "caller": {"type": "string", "description": "Principal issuing the call"},
                "data": {"type": "string", "description": "Payload as UTF-8 text"},
                "data_base64": {"type": "string", "description": "Payload as standard base64"}
            }
        });
        let target_schema = |caller_desc: &str, caller_required: bool| {
            let required = if caller_required {
                json!(["target", "caller"])
            } else {
                json!(["target"])
            };
            json!({
                "type": "object",
                "required": required,
                "properties": {
                    "target": {
                        "type": "string",
                        "description": "Principal whose identity is addressed"
                    },
                    "caller": {"type": "string", "description": caller_desc}
                }
            })
        };

        ok_result(
            id,
            json!({
                "tools": [
                    {
                        "name": "register_identity",
                        "description":
                            "Register an identity for the caller. Fails with 409 if one exists.",
                        "inputSchema": payload_schema.clone()
                    },
                    {
                        "name": "update_identity",
                        "description": "Replace the payload of the caller's own identity. \
                                        Fails with 404 if the caller has none.",
                        "inputSchema": payload_schema
                    },
                    {
                        "name": "get_identity_data",
                        "description": "Read the payload of any identity. \
                                        Fails with 404 if the target has none.",
                        "inputSchema": target_schema(REQUESTER_DESC, false)
                    },
                    {
                        "name": "is_identity_active",
                        "description": "Whether the target's identity is active. \
                                        Fails with 404 if the target has none.",
                        "inputSchema": target_schema(REQUESTER_DESC, false)
                    },
                    {
                        "name": "deactivate_identity",
                        "description": "Deactivate the target's identity. \
                                        Fails with 404 if it does not exist, \
                                        401 if the caller does not own it.",
                        "inputSchema": target_schema(OWNER_DESC, true)
                    },
                    {
                        "name": "list_identities",
                        "description": "List every registered identity with its status.",
                        "inputSchema": {"type": "object", "properties": {}}
                    }
                ]
            }),
        )
    }

    // ── tools/call ────────────────────────────────────────────────────────────

    fn handle_tools_call(&self, id: Value, params: &Value) -> Value {
        let tool_name = match params.get("name").and_then(|n| n.as_str()) {
            Some(n) => n.to_string(),
            None => return rpc_error(id, -32602, "missing tool name"),
        };
        let args = params.get("arguments").cloned().unwrap_or(json!({}));

        let op = match tool_name.as_str() {
            "register_identity" => Operation::RegisterIdentity,
            "update_identity" => Operation::UpdateIdentity,
            "get_identity_data" => Operation::GetIdentityData,
            "is_identity_active" => Operation::IsIdentityActive,
            "deactivate_identity" => Operation::DeactivateIdentity,
            "list_identities" => return self.tool_list_identities(id),
            _ => return rpc_error(id, -32602, format!("unknown tool: {tool_name}")),
        };

        let (caller, arg) = match decode_call(op, args) {
            Ok(call) => call,
            Err(e) => {
                let code = match &e {
                    ArgError::Principal(d) => d.code(),
                    _ => identity_registry::error::CODE_BAD_REQUEST,
                };
                return tool_error(id, code, format!("error {code}: {e}"));
            }
        };

        self.invoke(id, op, arg, &caller)
    }

    fn invoke(&self, id: Value, op: Operation, arg: CallValue, caller: &Principal) -> Value {
        let contract = self.dispatcher.contract_name();
        let args = [arg];
        let result = if op.is_read_only() {
            self.dispatcher
                .call_read_only(contract, op.name(), &args, caller)
        } else {
            self.dispatcher.call_public(contract, op.name(), &args, caller)
        };

        let value = match result {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!(operation = %op, %caller, code = e.code(), "call rejected");
                return tool_error(id, e.code(), format!("error {}: {e}", e.code()));
            }
        };

        if !op.is_read_only() {
            self.persist();
        }

        match serde_json::to_string(&value) {
            Ok(text) => tool_ok(id, text),
            Err(e) => rpc_error(id, -32603, format!("failed to encode result: {e}")),
        }
    }

    // ── Tool: list_identities ─────────────────────────────────────────────────

    fn tool_list_identities(&self, id: Value) -> Value {
        let records = self.dispatcher.registry().records();
        if records.is_empty() {
            return tool_ok(id, "No identities registered.");
        }

        let mut out = format!("{} identities", records.len());
        for record in &records {
            out.push_str(&format!(
                "\n{}  {}  {} bytes  registered {}",
                record.owner,
                if record.active { "active" } else { "inactive" },
                record.data.len(),
                micros_to_rfc3339(record.registered_at),
            ));
        }
        tool_ok(id, out)
    }

    /// Write the snapshot after a mutation.
    ///
    /// The in-memory call has already committed, so a failed write is logged
    /// rather than reported to the caller.
    fn persist(&self) {
        let Some(store) = &self.store else {
            return;
        };
        if let Err(e) = store.save(self.dispatcher.registry()) {
            tracing::error!(path = %store.path().display(), error = %e, "snapshot save failed");
        }
    }
}

/// Extract the caller and single call argument for `op`.
fn decode_call(op: Operation, args: Value) -> Result<(Principal, CallValue), ArgError> {
    match op {
        Operation::RegisterIdentity | Operation::UpdateIdentity => {
            let args: PayloadArgs = serde_json::from_value(args)?;
            let caller = Principal::parse(&args.caller)?;
            Ok((caller, CallValue::Buffer(args.payload()?)))
        }
        Operation::DeactivateIdentity => {
            let args: TargetArgs = serde_json::from_value(args)?;
            let raw = args.caller.as_deref().ok_or_else(|| {
                ArgError::Shape(serde::de::Error::missing_field("caller"))
            })?;
            let caller = Principal::parse(raw)?;
            Ok((caller, CallValue::Principal(Principal::parse(&args.target)?)))
        }
        Operation::GetIdentityData | Operation::IsIdentityActive => {
            let args: TargetArgs = serde_json::from_value(args)?;
            let requester = args.requester()?;
            Ok((requester, CallValue::Principal(Principal::parse(&args.target)?)))
        }
    }
}

// ── main ──────────────────────────────────────────────────────────────────────

/// Identity registry MCP server (stdio JSON-RPC 2.0).
#[derive(Parser, Debug)]
#[command(name = "identity-registry-mcp", version)]
struct Args {
    /// Snapshot file (default: $IDREG_HOME/registry.json)
    #[arg(long)]
    store: Option<PathBuf>,

    /// Keep state in memory only
    #[arg(long)]
    ephemeral: bool,

    /// Contract name to answer to (overrides $IDREG_CONTRACT)
    #[arg(long)]
    contract: Option<String>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

/// Lock and load the snapshot. The in-memory registry owns it until the
/// returned guard drops.
fn open_registry(
    store: Option<&SnapshotStore>,
) -> anyhow::Result<(Option<SnapshotLock>, IdentityRegistry)> {
    let Some(store) = store else {
        return Ok((None, IdentityRegistry::new()));
    };

    let lock = store.try_lock()?.ok_or_else(|| {
        anyhow::anyhow!(
            "snapshot {} is in use by another process",
            store.path().display()
        )
    })?;
    let registry = store.load(Arc::new(SystemClock)).map_err(|e| {
        anyhow::anyhow!("failed to load registry from {}: {e}", store.path().display())
    })?;
    Ok((Some(lock), registry))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Log to stderr; stdout is reserved for JSON-RPC responses.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(if args.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::WARN
        })
        .init();

    let mut config = RegistryConfig::from_env();
    if let Some(contract) = args.contract {
        config.contract_name = contract;
    }

    let store = if args.ephemeral {
        None
    } else {
        Some(SnapshotStore::new(
            args.store.unwrap_or_else(|| config.snapshot_path()),
        ))
    };

    let (_lock, registry) = open_registry(store.as_ref())?;
    tracing::info!(identities = registry.len(), contract = %config.contract_name, "registry ready");

    let server = McpServer::new(Dispatcher::new(Arc::new(registry), &config), store);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Value>(trimmed) {
            Ok(request) => server.handle_request(request),
            Err(e) => rpc_error(Value::Null, -32700, format!("parse error: {e}")),
        };

        // Notifications return Value::Null; nothing is written back.
        if response.is_null() {
            continue;
        }

        let mut out = serde_json::to_vec(&response)?;
        out.push(b'\n');
        stdout.write_all(&out).await?;
        stdout.flush().await?;
    }

    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
