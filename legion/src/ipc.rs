//! IPC interface for Legion

use crate::controller::LastAction;
use crate::cores::CoreManager;
use crate::power::{PowerStateMachine, RunState};
use crate::stats::CoreStats;
use anyhow::Result;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error, info};

/// IPC request types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IpcRequest {
    /// Get full daemon status
    GetStatus,

    /// List every tunable with its value
    ListTunables,

    /// Read one tunable
    GetTunable { name: String },

    /// Write one tunable
    SetTunable { name: String, value: String },

    /// Master enable toggle
    SetEnabled { enabled: bool },

    /// Display went off
    Suspend,

    /// Display came back on
    Resume,

    /// Per-core offline counters
    GetStats,
}

/// IPC response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum IpcResponse {
    Success { data: serde_json::Value },
    Error { message: String },
}

/// Full daemon status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStatus {
    pub version: String,
    pub state: RunState,
    pub started_at: DateTime<Local>,
    pub online_cores: BTreeSet<u32>,
    pub total_cores: u32,
    pub cycle_count: u32,
    pub last_action: Option<LastAction>,
}

/// IPC server
pub struct IpcServer {
    socket_path: PathBuf,
    power: Arc<PowerStateMachine>,
    started_at: DateTime<Local>,
}

impl IpcServer {
    pub fn new(socket_path: impl Into<PathBuf>, power: Arc<PowerStateMachine>) -> Self {
        Self {
            socket_path: socket_path.into(),
            power,
            started_at: Local::now(),
        }
    }

    pub async fn run(&self) -> Result<()> {
        let _ = std::fs::remove_file(&self.socket_path);

        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.socket_path, std::fs::Permissions::from_mode(0o660))?;
        }

        info!("Legion IPC listening on {}", self.socket_path.display());

        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let power = Arc::clone(&self.power);
                    let started_at = self.started_at;
                    tokio::spawn(async move {
                        if let Err(e) = handle_client(stream, power, started_at).await {
                            error!("Client error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            }
        }
    }
}

async fn handle_client(
    stream: UnixStream,
    power: Arc<PowerStateMachine>,
    started_at: DateTime<Local>,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    while reader.read_line(&mut line).await? > 0 {
        let response = match serde_json::from_str::<IpcRequest>(&line) {
            Ok(request) => {
                debug!("IPC request: {:?}", request);
                process_request(request, &power, started_at).await
            }
            Err(e) => IpcResponse::Error {
                message: format!("Invalid request: {}", e),
            },
        };

        let response_json = serde_json::to_string(&response)?;
        writer.write_all(response_json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;

        line.clear();
    }

    Ok(())
}

fn success<T: Serialize>(data: T) -> IpcResponse {
    match serde_json::to_value(data) {
        Ok(data) => IpcResponse::Success { data },
        Err(e) => IpcResponse::Error {
            message: e.to_string(),
        },
    }
}

fn failure(e: impl std::fmt::Display) -> IpcResponse {
    IpcResponse::Error {
        message: e.to_string(),
    }
}

/// Build the status report
pub async fn daemon_status(power: &PowerStateMachine, started_at: DateTime<Local>) -> DaemonStatus {
    let control = power.control();
    DaemonStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        state: power.state().await,
        started_at,
        online_cores: control.cores().online_cores(),
        total_cores: control.cores().total_cores(),
        cycle_count: control.cycle_count(),
        last_action: control.last_action(),
    }
}

async fn process_request(
    request: IpcRequest,
    power: &PowerStateMachine,
    started_at: DateTime<Local>,
) -> IpcResponse {
    let tunables = power.control().tunables();

    match request {
        IpcRequest::GetStatus => success(daemon_status(power, started_at).await),

        IpcRequest::ListTunables => success(tunables.list()),

        IpcRequest::GetTunable { name } => match tunables.get(&name) {
            Ok(value) => success(BTreeMap::from([(name, value)])),
            Err(e) => failure(e),
        },

        IpcRequest::SetTunable { name, value } => match tunables.set(&name, &value) {
            Ok(value) => success(BTreeMap::from([(name, value)])),
            Err(e) => failure(e),
        },

        IpcRequest::SetEnabled { enabled } => match power.set_enabled(enabled).await {
            Ok(state) => success(serde_json::json!({ "state": state })),
            Err(e) => failure(e),
        },

        IpcRequest::Suspend => {
            let state = power.on_suspend().await;
            success(serde_json::json!({ "state": state }))
        }

        IpcRequest::Resume => {
            let state = power.on_resume().await;
            success(serde_json::json!({ "state": state }))
        }

        IpcRequest::GetStats => match power.control().stats() {
            Some(stats) => success(stats.snapshot()),
            None => failure("statistics are disabled"),
        },
    }
}

/// IPC client
pub struct IpcClient {
    socket_path: PathBuf,
}

impl IpcClient {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    pub async fn send(&self, request: IpcRequest) -> Result<IpcResponse> {
        let mut stream = UnixStream::connect(&self.socket_path).await?;

        let request_json = serde_json::to_string(&request)?;
        stream.write_all(request_json.as_bytes()).await?;
        stream.write_all(b"\n").await?;
        stream.flush().await?;

        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        reader.read_line(&mut line).await?;

        Ok(serde_json::from_str(&line)?)
    }

    async fn call<T: serde::de::DeserializeOwned>(&self, request: IpcRequest) -> Result<T> {
        match self.send(request).await? {
            IpcResponse::Success { data } => Ok(serde_json::from_value(data)?),
            IpcResponse::Error { message } => Err(anyhow::anyhow!(message)),
        }
    }

    pub async fn get_status(&self) -> Result<DaemonStatus> {
        self.call(IpcRequest::GetStatus).await
    }

    pub async fn list_tunables(&self) -> Result<BTreeMap<String, u32>> {
        self.call(IpcRequest::ListTunables).await
    }

    pub async fn get_tunable(&self, name: &str) -> Result<u32> {
        let mut data: BTreeMap<String, u32> = self
            .call(IpcRequest::GetTunable {
                name: name.to_string(),
            })
            .await?;
        data.remove(name)
            .ok_or_else(|| anyhow::anyhow!("tunable {} missing from response", name))
    }

    pub async fn set_tunable(&self, name: &str, value: &str) -> Result<u32> {
        let mut data: BTreeMap<String, u32> = self
            .call(IpcRequest::SetTunable {
                name: name.to_string(),
                value: value.to_string(),
            })
            .await?;
        data.remove(name)
            .ok_or_else(|| anyhow::anyhow!("tunable {} missing from response", name))
    }

    pub async fn set_enabled(&self, enabled: bool) -> Result<RunState> {
        self.state_call(IpcRequest::SetEnabled { enabled }).await
    }

    pub async fn suspend(&self) -> Result<RunState> {
        self.state_call(IpcRequest::Suspend).await
    }

    pub async fn resume(&self) -> Result<RunState> {
        self.state_call(IpcRequest::Resume).await
    }

    pub async fn get_stats(&self) -> Result<CoreStats> {
        self.call(IpcRequest::GetStats).await
    }

    async fn state_call(&self, request: IpcRequest) -> Result<RunState> {
        #[derive(Deserialize)]
        struct StateReply {
            state: RunState,
        }

        let reply: StateReply = self.call(request).await?;
        Ok(reply.state)
    }
}
