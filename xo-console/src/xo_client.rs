//! JSON-RPC client for the XO server
//!
//! The WebSocket is owned by a dedicated I/O thread. Callers submit requests
//! over a channel and block on a per-request reply channel, matched by
//! JSON-RPC id. Server notifications are forwarded as [`ClientEvent`]s.
//!
//! # Example
//! ```no_run
//! let (events_tx, events_rx) = async_channel::unbounded();
//! let client = XoClient::connect(&config, events_tx)?;
//! client.sign_in(&config)?;
//! let remotes = client.get_remotes()?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::net::TcpStream;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket, connect};
use xo_console_common::{
    BackupApi, ConsoleConfig, Remote, RemoteBackupInfo, ResourceSet, User, XoObject, methods,
};

use crate::remote_lister::BackupLister;

/// How long the I/O thread blocks on the socket before checking for requests
const POLL_INTERVAL: Duration = Duration::from_millis(50);

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;
type Reply = mpsc::Sender<Result<Value, RpcError>>;

/// Failure of a single RPC call
#[derive(Debug, Clone, PartialEq)]
pub enum RpcError {
    /// The server answered with a JSON-RPC error object
    Server {
        code: i64,
        message: String,
        data: Option<Value>,
    },
    Timeout { method: String },
    /// The connection is gone
    Closed,
    InvalidResponse(String),
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpcError::Server { message, .. } => write!(f, "{message}"),
            RpcError::Timeout { method } => write!(f, "{method} timed out"),
            RpcError::Closed => write!(f, "connection to the XO server is closed"),
            RpcError::InvalidResponse(reason) => write!(f, "invalid server response: {reason}"),
        }
    }
}

impl std::error::Error for RpcError {}

/// Out-of-band events produced by the connection
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Notification { method: String, params: Value },
    Disconnected(String),
}

/// A decoded frame received from the server
#[derive(Debug, Clone, PartialEq)]
enum Frame {
    Response {
        id: u64,
        result: Result<Value, RpcError>,
    },
    Notification {
        method: String,
        params: Value,
    },
}

struct Outgoing {
    id: u64,
    text: String,
    reply: Reply,
}

/// Work handed to the I/O thread
enum Command {
    Send(Outgoing),
    /// The caller gave up waiting; forget the pending reply
    Cancel(u64),
}

fn request_text(id: u64, method: &str, params: &Value) -> String {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params,
    })
    .to_string()
}

fn parse_frame(text: &str) -> Result<Frame, RpcError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| RpcError::InvalidResponse(e.to_string()))?;

    if let Some(method) = value.get("method").and_then(Value::as_str) {
        return Ok(Frame::Notification {
            method: method.to_string(),
            params: value.get("params").cloned().unwrap_or(Value::Null),
        });
    }

    let id = value
        .get("id")
        .and_then(Value::as_u64)
        .ok_or_else(|| RpcError::InvalidResponse("missing id".to_string()))?;

    let result = match value.get("error") {
        Some(error) if !error.is_null() => Err(RpcError::Server {
            code: error.get("code").and_then(Value::as_i64).unwrap_or(0),
            message: error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
            data: error.get("data").cloned(),
        }),
        _ => Ok(value.get("result").cloned().unwrap_or(Value::Null)),
    };

    Ok(Frame::Response { id, result })
}

/// Blocking, thread-safe XO API client
///
/// Calls block the calling thread; run them off the GTK main loop.
pub struct XoClient {
    requests: mpsc::Sender<Command>,
    next_id: AtomicU64,
    timeout: Duration,
}

impl XoClient {
    /// Open the WebSocket and start the I/O thread
    pub fn connect(
        config: &ConsoleConfig,
        events: async_channel::Sender<ClientEvent>,
    ) -> anyhow::Result<Self> {
        let url = config.ws_url()?;
        log::info!("Connecting to {url}");

        let (socket, _) = connect(url.as_str())
            .with_context(|| format!("Failed to connect to {url}"))?;
        set_read_timeout(&socket, POLL_INTERVAL).context("Failed to configure socket")?;

        let (requests, outgoing) = mpsc::channel();
        thread::Builder::new()
            .name("xo-rpc".to_string())
            .spawn(move || run_io_loop(socket, outgoing, events))
            .context("Failed to spawn RPC thread")?;

        Ok(Self {
            requests,
            next_id: AtomicU64::new(1),
            timeout: Duration::from_secs(config.rpc_timeout_secs),
        })
    }

    /// Call a method with the configured timeout and return its raw result
    pub fn call_raw(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        self.call_with_timeout(method, params, Some(self.timeout))
    }

    /// Call a method and return its raw result
    ///
    /// With `None` the call waits until the server answers or the connection
    /// closes. Imports only answer once the whole VM has been written.
    pub fn call_with_timeout(
        &self,
        method: &str,
        params: Value,
        timeout: Option<Duration>,
    ) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (reply, response) = mpsc::channel();

        log::debug!("RPC #{id} {method}");
        self.requests
            .send(Command::Send(Outgoing {
                id,
                text: request_text(id, method, &params),
                reply,
            }))
            .map_err(|_| RpcError::Closed)?;

        let Some(timeout) = timeout else {
            return response.recv().unwrap_or(Err(RpcError::Closed));
        };

        match response.recv_timeout(timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                let _ = self.requests.send(Command::Cancel(id));
                Err(RpcError::Timeout {
                    method: method.to_string(),
                })
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(RpcError::Closed),
        }
    }

    /// Call a method and deserialize its result
    pub fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, RpcError> {
        let value = self.call_raw(method, params)?;
        decode(method, value)
    }

    /// Call a long-running method that is never timed out
    fn call_untimed<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, RpcError> {
        let value = self.call_with_timeout(method, params, None)?;
        decode(method, value)
    }

    /// Authenticate with the configured token or credentials
    pub fn sign_in(&self, config: &ConsoleConfig) -> anyhow::Result<User> {
        let user: User = match (&config.token, &config.email, &config.password) {
            (Some(token), _, _) => self
                .call(methods::SIGN_IN_WITH_TOKEN, json!({ "token": token }))
                .context("Token authentication failed")?,
            (None, Some(email), Some(password)) => self
                .call(
                    methods::SIGN_IN,
                    json!({ "email": email, "password": password }),
                )
                .context("Authentication failed")?,
            _ => anyhow::bail!("No token or credentials configured"),
        };

        log::info!("Signed in as {}", user.email);
        Ok(user)
    }

    pub fn get_remotes(&self) -> Result<Vec<Remote>, RpcError> {
        self.call(methods::GET_REMOTES, json!({}))
    }

    /// Every object of the platform, keyed by id on the wire
    pub fn get_all_objects(&self) -> Result<Vec<XoObject>, RpcError> {
        let value = self.call_raw(methods::GET_ALL_OBJECTS, json!({}))?;
        Ok(crate::event_listener::parse_objects(value))
    }

    pub fn get_users(&self) -> Result<Vec<User>, RpcError> {
        self.call(methods::GET_USERS, json!({}))
    }

    pub fn get_permissions(&self) -> Result<BTreeMap<String, Value>, RpcError> {
        self.call(methods::GET_PERMISSIONS, json!({}))
    }

    pub fn get_resource_sets(&self) -> Result<Vec<ResourceSet>, RpcError> {
        self.call(methods::GET_RESOURCE_SETS, json!({}))
    }

    /// Number of patches released for a host but not applied to it
    pub fn missing_patch_count(&self, host_id: &str) -> Result<usize, RpcError> {
        let patches: Vec<Value> =
            self.call(methods::LIST_MISSING_PATCHES, json!({ "host": host_id }))?;
        Ok(patches.len())
    }
}

impl BackupLister for XoClient {
    fn list_remotes(&self) -> anyhow::Result<Vec<Remote>> {
        Ok(self.get_remotes()?)
    }

    fn list_backups(&self, remote_id: &str) -> anyhow::Result<Vec<RemoteBackupInfo>> {
        let infos: Vec<RemoteBackupInfo> =
            self.call(methods::LIST_REMOTE_BACKUPS, json!({ "remote": remote_id }))?;
        Ok(infos)
    }
}

impl BackupApi for XoClient {
    fn import_backup(&self, remote: &str, sr: &str, file: &str) -> anyhow::Result<String> {
        let vm_id: String = self.call_untimed(
            methods::IMPORT_BACKUP,
            json!({ "remote": remote, "sr": sr, "file": file }),
        )?;
        Ok(vm_id)
    }

    fn import_delta_backup(
        &self,
        remote: &str,
        sr: &str,
        file_path: &str,
        map_vdis_srs: &BTreeMap<String, String>,
    ) -> anyhow::Result<String> {
        let vm_id: String = self.call_untimed(
            methods::IMPORT_DELTA_BACKUP,
            json!({
                "remote": remote,
                "sr": sr,
                "filePath": file_path,
                "mapVdisSrs": map_vdis_srs,
            }),
        )?;
        Ok(vm_id)
    }

    fn start_vm(&self, id: &str) -> anyhow::Result<()> {
        self.call_raw(methods::START_VM, json!({ "id": id }))?;
        Ok(())
    }
}

fn decode<T: DeserializeOwned>(method: &str, value: Value) -> Result<T, RpcError> {
    serde_json::from_value(value).map_err(|e| RpcError::InvalidResponse(format!("{method}: {e}")))
}

fn set_read_timeout(socket: &Socket, timeout: Duration) -> std::io::Result<()> {
    match socket.get_ref() {
        MaybeTlsStream::Plain(stream) => stream.set_read_timeout(Some(timeout)),
        MaybeTlsStream::Rustls(stream) => stream.get_ref().set_read_timeout(Some(timeout)),
        _ => Ok(()),
    }
}

fn is_poll_timeout(err: &tungstenite::Error) -> bool {
    matches!(
        err,
        tungstenite::Error::Io(e)
            if matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut)
    )
}

fn run_io_loop(
    mut socket: Socket,
    outgoing: mpsc::Receiver<Command>,
    events: async_channel::Sender<ClientEvent>,
) {
    let mut pending: HashMap<u64, Reply> = HashMap::new();

    let reason = 'io: loop {
        // Flush queued requests
        loop {
            match outgoing.try_recv() {
                Ok(Command::Send(request)) => {
                    if let Err(e) = socket.send(Message::Text(request.text.into())) {
                        let _ = request.reply.send(Err(RpcError::Closed));
                        break 'io format!("write error: {e}");
                    }
                    pending.insert(request.id, request.reply);
                }
                Ok(Command::Cancel(id)) => {
                    if pending.remove(&id).is_some() {
                        log::debug!("RPC #{id} abandoned by caller");
                    }
                }
                Err(mpsc::TryRecvError::Empty) => break,
                Err(mpsc::TryRecvError::Disconnected) => {
                    let _ = socket.close(None);
                    break 'io "client dropped".to_string();
                }
            }
        }

        let message = match socket.read() {
            Ok(message) => message,
            Err(e) if is_poll_timeout(&e) => continue,
            Err(e) => break format!("read error: {e}"),
        };

        let text = match message {
            Message::Text(text) => text.as_str().to_string(),
            Message::Binary(binary) => match String::from_utf8(binary.into()) {
                Ok(text) => text,
                Err(_) => continue,
            },
            Message::Ping(payload) => {
                let _ = socket.send(Message::Pong(payload));
                continue;
            }
            Message::Close(frame) => {
                break frame
                    .map(|frame| frame.reason.to_string())
                    .unwrap_or_else(|| "socket closed".to_string());
            }
            _ => continue,
        };

        match parse_frame(&text) {
            Ok(Frame::Response { id, result }) => match pending.remove(&id) {
                Some(reply) => {
                    let _ = reply.send(result);
                }
                None => log::debug!("Dropping response to unknown request #{id}"),
            },
            Ok(Frame::Notification { method, params }) => {
                if events
                    .send_blocking(ClientEvent::Notification { method, params })
                    .is_err()
                {
                    log::debug!("No event listener, dropping notification");
                }
            }
            Err(e) => log::warn!("Ignoring server frame: {e}"),
        }
    };

    log::warn!("XO connection closed: {reason}");
    for (_, reply) in pending.drain() {
        let _ = reply.send(Err(RpcError::Closed));
    }
    let _ = events.send_blocking(ClientEvent::Disconnected(reason));
}
