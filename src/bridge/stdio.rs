//! Stdio transport to the kiosk host process
//!
//! Spawns the host binary and speaks line-delimited JSON-RPC over its stdio.
//! Opening the transport performs the `channel.connect` handshake, which
//! advertises the named remote objects and their slots; slot invocations go
//! out as `object.invoke` requests.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin};
use tokio::sync::{mpsc, oneshot, Mutex};

use crate::config::BridgeConfig;
use crate::{Error, Result};

use super::transport::{ObjectRegistry, RemoteObject, Transport};

/// Default host binary name when the config names no command.
const HOST_BINARY: &str = "kiosk-host";

/// JSON-RPC request line sent to the host.
#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    id: u64,
    method: &'a str,
    params: JsonValue,
}

/// Any JSON-RPC line read from the host: a response to one of our requests,
/// or a host-initiated notification.
#[derive(Debug, Deserialize)]
struct RpcMessage {
    id: Option<u64>,
    result: Option<JsonValue>,
    error: Option<RpcError>,
    method: Option<String>,
    #[allow(dead_code)]
    params: Option<JsonValue>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i32,
    message: String,
}

/// `channel.connect` handshake result.
#[derive(Debug, Deserialize)]
struct HandshakeResult {
    objects: HashMap<String, ObjectDescriptor>,
}

#[derive(Debug, Deserialize)]
struct ObjectDescriptor {
    #[serde(default)]
    slots: Vec<String>,
}

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<std::result::Result<JsonValue, RpcError>>>>>;

/// [`Transport`] implementation backed by a spawned host process.
///
/// Each `open()` spawns a fresh host; dropping the previous registry's
/// handles closes the previous host's stdin and waits for it to exit.
pub struct StdioTransport {
    config: BridgeConfig,
}

impl StdioTransport {
    pub fn new(config: BridgeConfig) -> Self {
        Self { config }
    }
}

impl Transport for StdioTransport {
    fn open(&self) -> BoxFuture<'_, Result<ObjectRegistry>> {
        async move {
            let connection = StdioConnection::spawn(&self.config).await?;
            connection.handshake().await
        }
        .boxed()
    }
}

/// One live host process: stdin writer, pending-request map, and the stdout
/// reader task.
struct StdioConnection {
    /// Taken in `Drop` for the graceful teardown; `kill_on_drop` stays armed
    /// in case the connection is dropped outside a runtime.
    child: Option<Child>,
    stdin: Mutex<Option<ChildStdin>>,
    request_counter: AtomicU64,
    pending: PendingMap,
    shutdown_tx: Option<mpsc::Sender<()>>,
}

impl StdioConnection {
    /// Spawn the host process and start the stdout reader.
    async fn spawn(config: &BridgeConfig) -> Result<Arc<Self>> {
        let host_path = find_host_binary(config)?;

        tracing::info!(path = %host_path.display(), "spawning kiosk host");

        let mut child = tokio::process::Command::new(&host_path)
            .args(&config.host_args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Transport(format!("failed to spawn host: {}", e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Transport("failed to capture host stdin".to_string()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Transport("failed to capture host stdout".to_string()))?;

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let pending_clone = pending.clone();
        tokio::spawn(async move {
            let reader = BufReader::new(stdout);
            let mut lines = reader.lines();

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        tracing::debug!("stdout reader received shutdown signal");
                        break;
                    }
                    line = lines.next_line() => {
                        match line {
                            Ok(Some(line)) => handle_line(&line, &pending_clone).await,
                            Ok(None) => {
                                tracing::info!("host stdout closed (EOF)");
                                fail_pending(&pending_clone, "host process exited").await;
                                break;
                            }
                            Err(e) => {
                                tracing::error!("error reading from host stdout: {}", e);
                                fail_pending(&pending_clone, "host stdout read error").await;
                                break;
                            }
                        }
                    }
                }
            }
        });

        Ok(Arc::new(Self {
            child: Some(child),
            stdin: Mutex::new(Some(stdin)),
            request_counter: AtomicU64::new(1),
            pending,
            shutdown_tx: Some(shutdown_tx),
        }))
    }

    /// Run the registry handshake and build the remote object proxies.
    async fn handshake(self: Arc<Self>) -> Result<ObjectRegistry> {
        let result = self
            .send_request("channel.connect", serde_json::json!({}))
            .await
            .map_err(|e| Error::Handshake(e.to_string()))?;

        let handshake: HandshakeResult = serde_json::from_value(result)
            .map_err(|e| Error::Handshake(format!("bad handshake result: {}", e)))?;

        let mut registry = ObjectRegistry::new();
        for (name, descriptor) in handshake.objects {
            tracing::debug!(
                object = %name,
                slots = descriptor.slots.len(),
                "host advertised object"
            );
            registry.insert(
                name.clone(),
                Arc::new(StdioRemote {
                    object: name,
                    slots: descriptor.slots.into_iter().collect(),
                    connection: self.clone(),
                }),
            );
        }

        Ok(registry)
    }

    /// Send one JSON-RPC request and await its response. A JSON-RPC error
    /// from the host surfaces as [`Error::RemoteCallFailed`] with the peer's
    /// message preserved; the caller re-contextualizes if needed.
    async fn send_request(&self, method: &str, params: JsonValue) -> Result<JsonValue> {
        let id = self.request_counter.fetch_add(1, Ordering::SeqCst);

        let request = RpcRequest { id, method, params };
        let mut json = serde_json::to_string(&request)?;
        json.push('\n');

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            pending.insert(id, tx);
        }

        {
            let mut guard = self.stdin.lock().await;
            let stdin = guard
                .as_mut()
                .ok_or_else(|| Error::Transport("host stdin already closed".to_string()))?;
            stdin
                .write_all(json.as_bytes())
                .await
                .map_err(|e| Error::Transport(format!("failed to write to host stdin: {}", e)))?;
            stdin
                .flush()
                .await
                .map_err(|e| Error::Transport(format!("failed to flush host stdin: {}", e)))?;
        }

        match rx.await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(rpc)) => Err(Error::RemoteCallFailed {
                slot: method.to_string(),
                message: format!("JSON-RPC error {}: {}", rpc.code, rpc.message),
            }),
            Err(_) => Err(Error::Transport("host response channel closed".to_string())),
        }
    }
}

impl Drop for StdioConnection {
    fn drop(&mut self) {
        // Stop the reader task.
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.try_send(());
        }

        let stdin = self.stdin.get_mut().take();
        let child = self.child.take();

        // The graceful teardown needs a runtime to run on; dropped outside
        // one, `kill_on_drop` still takes the process down.
        let (Some(mut child), Ok(runtime)) = (child, tokio::runtime::Handle::try_current()) else {
            return;
        };

        runtime.spawn(async move {
            // The host should exit on its own once stdin closes.
            if let Some(mut stdin) = stdin {
                let _ = stdin.shutdown().await;
            }

            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(2)) => {
                    tracing::warn!("host did not exit after stdin close, killing");
                    child.kill().await.ok();
                }
                status = child.wait() => {
                    tracing::info!("host exited with status: {:?}", status);
                }
            }
        });
    }
}

/// Route one line from the host: responses resolve pending requests,
/// notifications are ignored (the bridge exposes no inbound event surface).
async fn handle_line(line: &str, pending: &PendingMap) {
    let message: RpcMessage = match serde_json::from_str(line) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!("failed to parse JSON-RPC message: {} - {}", e, line);
            return;
        }
    };

    match (message.id, message.method) {
        (Some(id), None) => {
            let mut pending = pending.lock().await;
            if let Some(sender) = pending.remove(&id) {
                let result = match message.error {
                    Some(error) => Err(error),
                    None => Ok(message.result.unwrap_or(JsonValue::Null)),
                };
                let _ = sender.send(result);
            } else {
                tracing::warn!(id, "response for unknown request id");
            }
        }
        (_, Some(method)) => {
            tracing::debug!(method = %method, "ignoring host notification");
        }
        _ => {
            tracing::warn!("unrecognized message from host: {}", line);
        }
    }
}

/// Reject every in-flight request; used when the host goes away.
async fn fail_pending(pending: &PendingMap, reason: &str) {
    let mut pending = pending.lock().await;
    for (_, sender) in pending.drain() {
        let _ = sender.send(Err(RpcError {
            code: -1,
            message: reason.to_string(),
        }));
    }
}

/// Proxy for one host object advertised in the handshake.
struct StdioRemote {
    object: String,
    slots: HashSet<String>,
    connection: Arc<StdioConnection>,
}

impl RemoteObject for StdioRemote {
    fn has_slot(&self, slot: &str) -> bool {
        self.slots.contains(slot)
    }

    fn call(&self, slot: &str, args: Vec<JsonValue>) -> BoxFuture<'static, Result<JsonValue>> {
        let connection = self.connection.clone();
        let object = self.object.clone();
        let slot = slot.to_string();
        async move {
            let params = serde_json::json!({
                "object": object,
                "slot": slot,
                "args": args,
            });
            connection
                .send_request("object.invoke", params)
                .await
                .map_err(|e| match e {
                    Error::RemoteCallFailed { message, .. } => {
                        Error::RemoteCallFailed { slot, message }
                    }
                    other => other,
                })
        }
        .boxed()
    }
}

/// Locate the host binary: explicit config first, then PATH, then common
/// install locations.
fn find_host_binary(config: &BridgeConfig) -> Result<PathBuf> {
    if let Some(command) = &config.host_command {
        return Ok(PathBuf::from(command));
    }

    if let Ok(path) = which::which(HOST_BINARY) {
        return Ok(path);
    }

    let home = dirs::home_dir()
        .ok_or_else(|| Error::Transport("cannot find home directory".to_string()))?;

    let common_paths = [
        home.join(".local/bin").join(HOST_BINARY),
        PathBuf::from("/usr/local/bin").join(HOST_BINARY),
        PathBuf::from("/opt/kiosk/bin").join(HOST_BINARY),
    ];

    for path in &common_paths {
        if path.exists() {
            return Ok(path.clone());
        }
    }

    Err(Error::Transport(format!(
        "{} not found; set host_command in the bridge config",
        HOST_BINARY
    )))
}
