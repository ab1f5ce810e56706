//! Local-process transport: line-delimited JSON-RPC over a child's stdio.

use std::collections::BTreeMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use toolgate_core::{ConnectionParams, InjectedAuth, ServerConfig, ToolInfo, ToolResult, TransportKind};

use super::{Transport, TransportError, TransportTimeouts};
use crate::protocol::{self, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use crate::shutdown::shutdown_child;

/// Pipes to a running server. Held under one lock so a request's write and
/// the read of its response are never interleaved with another request.
struct StdioIo {
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

/// Transport that spawns the tool server as a child process.
pub struct StdioTransport {
    server_id: String,
    command: String,
    args: Vec<String>,
    /// Server env with injected env applied over it.
    env: BTreeMap<String, String>,
    working_dir: Option<String>,
    timeouts: TransportTimeouts,
    process: Option<Child>,
    io: Option<Mutex<StdioIo>>,
    stderr_task: Option<JoinHandle<()>>,
    next_id: AtomicU64,
}

impl StdioTransport {
    /// Build an unconnected transport for a local-process server.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Connection` if `config` is not a local-process server.
    pub fn new(
        config: &ServerConfig,
        auth: &InjectedAuth,
        timeouts: TransportTimeouts,
    ) -> Result<Self, TransportError> {
        let ConnectionParams::Stdio {
            command,
            args,
            env,
            working_dir,
        } = &config.connection
        else {
            return Err(TransportError::Connection(format!(
                "server '{}' is not a local-process server",
                config.id
            )));
        };

        let mut merged = env.clone();
        merged.extend(auth.env.iter().map(|(k, v)| (k.clone(), v.clone())));

        Ok(Self {
            server_id: config.id.clone(),
            command: command.clone(),
            args: args.clone(),
            env: merged,
            working_dir: working_dir.clone(),
            timeouts,
            process: None,
            io: None,
            stderr_task: None,
            next_id: AtomicU64::new(1),
        })
    }

    fn spawn(&mut self) -> Result<(), TransportError> {
        let mut command = Command::new(&self.command);
        command
            .args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|e| {
            TransportError::Connection(format!(
                "Failed to spawn '{}': {e} (args: {:?})",
                self.command, self.args
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::Connection("Failed to get stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::Connection("Failed to get stdout".to_string()))?;

        if let Some(stderr) = child.stderr.take() {
            let server_id = self.server_id.clone();
            self.stderr_task = Some(tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(server_id = %server_id, "{line}");
                }
            }));
        }

        tracing::debug!(
            server_id = %self.server_id,
            command = %self.command,
            pid = child.id(),
            "Spawned tool server process"
        );

        self.process = Some(child);
        self.io = Some(Mutex::new(StdioIo {
            stdin,
            stdout: BufReader::new(stdout),
        }));
        Ok(())
    }

    async fn handshake(&self) -> Result<(), TransportError> {
        self.request("initialize", Some(protocol::initialize_params()), self.timeouts.connect)
            .await?;
        self.notify("notifications/initialized").await
    }

    /// Send a request and wait for the response with the matching id.
    async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        limit: Duration,
    ) -> Result<Value, TransportError> {
        let io = self.io.as_ref().ok_or(TransportError::NotConnected)?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest::new(id, method, params);

        let exchange = async {
            let mut io = io.lock().await;
            write_line(&mut io.stdin, &request).await?;
            read_response(&mut io.stdout, id, &self.server_id).await
        };

        let response = timeout(limit, exchange)
            .await
            .map_err(|_| TransportError::timeout(method, limit))??;
        response.into_result(method)
    }

    async fn notify(&self, method: &str) -> Result<(), TransportError> {
        let io = self.io.as_ref().ok_or(TransportError::NotConnected)?;
        let mut io = io.lock().await;
        write_line(&mut io.stdin, &JsonRpcNotification::new(method)).await
    }
}

async fn write_line<T: Serialize + Sync>(
    stdin: &mut ChildStdin,
    message: &T,
) -> Result<(), TransportError> {
    let mut line = serde_json::to_string(message)
        .map_err(|e| TransportError::Protocol(format!("failed to encode request: {e}")))?;
    line.push('\n');
    stdin
        .write_all(line.as_bytes())
        .await
        .map_err(|e| TransportError::Connection(format!("failed to write to server: {e}")))?;
    stdin
        .flush()
        .await
        .map_err(|e| TransportError::Connection(format!("failed to write to server: {e}")))
}

/// Read lines until the response to `id` arrives.
///
/// Blank lines, non-JSON output (npx banners and the like), notifications
/// and responses to other ids are skipped.
async fn read_response(
    stdout: &mut BufReader<ChildStdout>,
    id: u64,
    server_id: &str,
) -> Result<JsonRpcResponse, TransportError> {
    let mut line = String::new();
    loop {
        line.clear();
        let read = stdout
            .read_line(&mut line)
            .await
            .map_err(|e| TransportError::Connection(format!("failed to read from server: {e}")))?;
        if read == 0 {
            return Err(TransportError::Connection(
                "Server closed connection".to_string(),
            ));
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<JsonRpcResponse>(trimmed) {
            Ok(response) if response.answers(id) => return Ok(response),
            Ok(_) => {
                tracing::debug!(server_id, line = trimmed, "Skipping unrelated message");
            }
            Err(_) => {
                tracing::debug!(server_id, line = trimmed, "Skipping non-JSON-RPC output");
            }
        }
    }
}

#[async_trait]
impl Transport for StdioTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Stdio
    }

    async fn connect(&mut self) -> Result<(), TransportError> {
        if self.is_connected() {
            return Ok(());
        }
        self.spawn()?;

        if let Err(e) = self.handshake().await {
            self.disconnect().await;
            return Err(e);
        }
        Ok(())
    }

    async fn disconnect(&mut self) {
        // Closing stdin is the polite stop signal for stdio servers.
        self.io = None;

        if let Some(child) = self.process.take() {
            match shutdown_child(child, self.timeouts.shutdown_grace).await {
                Ok(status) => {
                    tracing::debug!(server_id = %self.server_id, %status, "Tool server exited");
                }
                Err(e) => {
                    tracing::warn!(server_id = %self.server_id, error = %e, "Failed to stop tool server");
                }
            }
        }

        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
    }

    async fn list_tools(&self) -> Result<Vec<ToolInfo>, TransportError> {
        let result = self
            .request("tools/list", None, self.timeouts.request)
            .await?;
        protocol::parse_tool_list(result)
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolResult, TransportError> {
        let params = protocol::tool_call_params(name, arguments);
        let result = self
            .request("tools/call", Some(params), self.timeouts.request)
            .await?;
        protocol::parse_tool_call(result)
    }

    fn is_connected(&self) -> bool {
        self.io.is_some() && self.process.is_some()
    }
}
