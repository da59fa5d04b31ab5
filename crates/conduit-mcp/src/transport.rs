//! Transport layer for provider communication.
//!
//! Local providers are child processes speaking newline-delimited JSON-RPC
//! over stdio. `Content-Length` framed messages are accepted on read as
//! well, since some older servers still emit them. Remote providers are
//! reached with HTTP POST; their replies may be plain JSON or a short
//! server-sent-event stream.

use std::process::Stdio;
use std::time::Duration;

use parking_lot::RwLock;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

use crate::error::{McpError, Result};
use crate::protocol::{
    IncomingMessage, JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const SESSION_HEADER: &str = "Mcp-Session-Id";

/// Settings for a provider reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// Endpoint URL of the provider.
    pub url: String,
    /// Applied to each attempt.
    pub timeout: Duration,
    /// Extra attempts after a connection-level failure.
    pub retries: u32,
    /// Extra headers sent with every request.
    pub headers: Vec<(String, String)>,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            timeout: DEFAULT_TIMEOUT,
            retries: 3,
            headers: Vec::new(),
        }
    }
}

impl HttpTransportConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Append a header; repeated keys are all sent.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }
}

/// The pipes of a stdio provider. Held behind one lock so a request and its
/// response are never interleaved with another request.
pub struct StdioChannel {
    stdin: BufWriter<ChildStdin>,
    stdout: BufReader<ChildStdout>,
}

impl StdioChannel {
    async fn write_message(&mut self, message: &Value) -> Result<()> {
        let mut json = serde_json::to_string(message)?;
        tracing::trace!(json = %json, "sending provider message");
        json.push('\n');
        self.stdin.write_all(json.as_bytes()).await?;
        self.stdin.flush().await?;
        Ok(())
    }

    /// Write the request, then read until its response arrives.
    ///
    /// Responses to abandoned requests and provider notifications are
    /// skipped. Provider-initiated requests are answered inline: `ping` with
    /// an empty result, anything else with "method not found".
    async fn exchange(&mut self, request: &JsonRpcRequest) -> Result<JsonRpcResponse> {
        self.write_message(&serde_json::to_value(request)?).await?;

        loop {
            let value = read_frame(&mut self.stdout).await?;
            match IncomingMessage::classify(value)? {
                IncomingMessage::Response(response) if response.id == request.id => {
                    return Ok(response);
                }
                IncomingMessage::Response(response) => {
                    tracing::debug!(
                        id = response.id,
                        expected = request.id,
                        "skipping stale provider response"
                    );
                }
                IncomingMessage::Notification { method } => {
                    tracing::trace!(method = %method, "ignoring provider notification");
                }
                IncomingMessage::Request { id, method } => {
                    let reply = if method == "ping" {
                        serde_json::json!({"jsonrpc": "2.0", "id": id, "result": {}})
                    } else {
                        serde_json::json!({
                            "jsonrpc": "2.0",
                            "id": id,
                            "error": {
                                "code": JsonRpcError::METHOD_NOT_FOUND,
                                "message": format!("method not supported by client: {method}"),
                            }
                        })
                    };
                    self.write_message(&reply).await?;
                }
            }
        }
    }
}

/// Read one JSON message from a provider's stdout.
///
/// Accepts newline-delimited JSON and `Content-Length` framed bodies. Blank
/// lines and lines that are clearly not JSON (stray log output) are skipped.
pub async fn read_frame<R>(reader: &mut R) -> Result<Value>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Err(McpError::ConnectionClosed);
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some(len_str) = trimmed.strip_prefix("Content-Length:") {
            let content_length: usize = len_str
                .trim()
                .parse()
                .map_err(|e| McpError::protocol(format!("invalid Content-Length: {e}")))?;

            // Remaining headers end at the first empty line.
            loop {
                line.clear();
                if reader.read_line(&mut line).await? == 0 {
                    return Err(McpError::ConnectionClosed);
                }
                if line.trim().is_empty() {
                    break;
                }
            }

            let mut body = vec![0u8; content_length];
            reader.read_exact(&mut body).await?;
            tracing::trace!(content_length, "received framed provider message");
            return Ok(serde_json::from_slice(&body)?);
        }

        if !trimmed.starts_with('{') {
            tracing::debug!(line = %trimmed, "skipping non-JSON provider output");
            continue;
        }

        tracing::trace!(json = %trimmed, "received provider message");
        return Ok(serde_json::from_str(trimmed)?);
    }
}

/// Transport for communicating with one provider.
pub enum McpTransport {
    /// Child process reached over stdin/stdout.
    Stdio {
        child: Mutex<Child>,
        /// Request/response pipes.
        channel: Mutex<StdioChannel>,
        /// Per-request timeout.
        timeout: Duration,
    },
    /// Remote provider reached over HTTP POST.
    Http {
        client: reqwest::Client,
        config: HttpTransportConfig,
        /// Session id assigned by the provider, echoed on later requests.
        session_id: RwLock<Option<String>>,
    },
}

impl McpTransport {
    /// Create a new HTTP transport.
    pub fn connect_http(config: HttpTransportConfig) -> Result<Self> {
        url::Url::parse(&config.url)
            .map_err(|e| McpError::transport(format!("invalid URL: {e}")))?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(5)
            .tcp_keepalive(Duration::from_secs(30))
            .build()
            .map_err(|e| McpError::transport(format!("failed to build HTTP client: {e}")))?;

        tracing::info!(
            url = %config.url,
            timeout_secs = config.timeout.as_secs(),
            "created HTTP transport"
        );

        Ok(Self::Http {
            client,
            config,
            session_id: RwLock::new(None),
        })
    }

    /// Spawn a provider process and attach to its stdio.
    pub fn spawn_stdio(
        command: &str,
        args: &[String],
        env: &[(String, String)],
        timeout: Duration,
    ) -> Result<Self> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| McpError::spawn_failed(format!("failed to spawn '{command}': {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::spawn_failed("failed to capture stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::spawn_failed("failed to capture stdout"))?;

        Ok(Self::Stdio {
            child: Mutex::new(child),
            channel: Mutex::new(StdioChannel {
                stdin: BufWriter::new(stdin),
                stdout: BufReader::new(stdout),
            }),
            timeout,
        })
    }

    /// Send a JSON-RPC request and wait for the matching response.
    ///
    /// Stdio requests are serialized on the channel lock; HTTP requests run
    /// concurrently. The timeout starts once the lock is held, so time spent
    /// queued behind another request never counts against it.
    pub async fn send_request(&self, request: &JsonRpcRequest) -> Result<JsonRpcResponse> {
        match self {
            Self::Stdio {
                channel, timeout, ..
            } => {
                let mut channel = channel.lock().await;
                tokio::time::timeout(*timeout, channel.exchange(request))
                    .await
                    .map_err(|_| McpError::Timeout)?
            }
            Self::Http {
                client,
                config,
                session_id,
            } => send_request_http(client, config, session_id, request).await,
        }
    }

    /// Fire-and-forget message. HTTP providers may answer 202 with no body.
    pub async fn send_notification(&self, notification: &JsonRpcNotification) -> Result<()> {
        match self {
            Self::Stdio { channel, .. } => {
                let value = serde_json::to_value(notification)?;
                channel.lock().await.write_message(&value).await
            }
            Self::Http {
                client,
                config,
                session_id,
            } => {
                let body = serde_json::to_string(notification)?;
                let req = http_post(client, config, session_id, body);
                if let Err(e) = req.send().await {
                    tracing::debug!(url = %config.url, error = %e, "HTTP notification failed");
                }
                Ok(())
            }
        }
    }

    /// Shut the transport down, killing a child process if there is one.
    pub async fn shutdown(&self) -> Result<()> {
        match self {
            Self::Stdio { child, .. } => {
                let mut child = child.lock().await;
                if matches!(child.try_wait(), Ok(None)) {
                    child.kill().await?;
                }
                Ok(())
            }
            Self::Http { .. } => Ok(()),
        }
    }

    /// Whether the provider can still be reached.
    ///
    /// For stdio this polls the child without blocking; HTTP is stateless
    /// and always reports connected.
    pub async fn is_connected(&self) -> bool {
        match self {
            Self::Stdio { child, .. } => matches!(child.lock().await.try_wait(), Ok(None)),
            Self::Http { .. } => true,
        }
    }

    pub fn is_http(&self) -> bool {
        matches!(self, Self::Http { .. })
    }

    pub fn is_stdio(&self) -> bool {
        matches!(self, Self::Stdio { .. })
    }
}

fn http_post(
    client: &reqwest::Client,
    config: &HttpTransportConfig,
    session_id: &RwLock<Option<String>>,
    body: String,
) -> reqwest::RequestBuilder {
    let mut req = client
        .post(&config.url)
        .header("Content-Type", "application/json")
        .header("Accept", "application/json, text/event-stream")
        .body(body);
    for (key, value) in &config.headers {
        req = req.header(key, value);
    }
    if let Some(id) = session_id.read().as_deref() {
        req = req.header(SESSION_HEADER, id);
    }
    req
}

async fn send_request_http(
    client: &reqwest::Client,
    config: &HttpTransportConfig,
    session_id: &RwLock<Option<String>>,
    request: &JsonRpcRequest,
) -> Result<JsonRpcResponse> {
    let json = serde_json::to_string(request)?;

    tracing::trace!(url = %config.url, json = %json, "sending HTTP provider request");

    let mut retries = config.retries;
    loop {
        match http_post(client, config, session_id, json.clone()).send().await {
            Ok(resp) => {
                let status = resp.status();
                if !status.is_success() {
                    let body = resp.text().await.unwrap_or_default();
                    return Err(McpError::transport(format!("HTTP error {status}: {body}")));
                }

                if let Some(id) = resp
                    .headers()
                    .get(SESSION_HEADER)
                    .and_then(|v| v.to_str().ok())
                {
                    *session_id.write() = Some(id.to_string());
                }

                let is_event_stream = resp
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .is_some_and(|v| v.starts_with("text/event-stream"));

                let text = resp.text().await.map_err(|e| {
                    McpError::transport(format!("failed to read response body: {e}"))
                })?;

                tracing::trace!(json = %text, "received HTTP provider response");

                return if is_event_stream {
                    parse_event_stream(&text, request.id)
                } else {
                    Ok(serde_json::from_str(&text)?)
                };
            }
            Err(e) => {
                if retries == 0 {
                    return Err(if e.is_timeout() {
                        McpError::Timeout
                    } else {
                        McpError::transport(format!("HTTP request failed: {e}"))
                    });
                }
                retries -= 1;
                tracing::warn!(
                    error = %e,
                    retries_remaining = retries,
                    "HTTP request failed, retrying"
                );
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

/// Pick the response for `id` out of a server-sent-event body.
fn parse_event_stream(body: &str, id: u64) -> Result<JsonRpcResponse> {
    for line in body.lines() {
        let Some(data) = line.strip_prefix("data:") else {
            continue;
        };
        let data = data.trim();
        if data.is_empty() {
            continue;
        }
        if let IncomingMessage::Response(response) =
            IncomingMessage::classify(serde_json::from_str(data)?)?
            && response.id == id
        {
            return Ok(response);
        }
    }
    Err(McpError::protocol(format!(
        "event stream ended without a response to request {id}"
    )))
}
