//! JSON-RPC session against the engine's control endpoint.
//!
//! Every call carries the shared secret as a `token:` parameter and is
//! fallible on its own; one failed call never poisons the session unless
//! the transport itself is gone.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::error::{ConnectError, RpcError};
use crate::tasks::model::{DownloadOptions, DownloadTask, VersionInfo};

#[derive(serde::Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: String,
    method: &'a str,
    params: Vec<Value>,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcFailure>,
}

#[derive(Deserialize)]
struct RpcFailure {
    code: i64,
    message: String,
}

struct SessionInner {
    http: reqwest::Client,
    endpoint: String,
    secret: String,
    next_id: AtomicU64,
    closed: AtomicBool,
}

/// One live RPC connection. Cloning shares the same underlying session;
/// a replacement requires a fresh `open`.
#[derive(Clone)]
pub struct Aria2Session {
    inner: Arc<SessionInner>,
}

impl Aria2Session {
    /// Opens a session and probes it with a version call. Probe failure is
    /// returned as `ConnectError` and is not retried here.
    pub async fn open(
        endpoint: &str,
        secret: &str,
        timeout: Duration,
    ) -> Result<Self, ConnectError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        let session = Self {
            inner: Arc::new(SessionInner {
                http,
                endpoint: endpoint.to_string(),
                secret: secret.to_string(),
                next_id: AtomicU64::new(1),
                closed: AtomicBool::new(false),
            }),
        };

        let info = session.get_version().await?;
        log::info!("connected to engine {} at {endpoint}", info.version);
        Ok(session)
    }

    async fn call(&self, method: &'static str, mut params: Vec<Value>) -> Result<Value, RpcError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(RpcError::NotConnected);
        }

        params.insert(0, Value::String(format!("token:{}", self.inner.secret)));
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: id.to_string(),
            method,
            params,
        };

        let response = self
            .inner
            .http
            .post(&self.inner.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|source| RpcError::Transport { method, source })?;
        let body: RpcResponse = response
            .json()
            .await
            .map_err(|source| RpcError::Transport { method, source })?;

        if let Some(failure) = body.error {
            return Err(RpcError::Engine {
                method,
                code: failure.code,
                message: failure.message,
            });
        }
        body.result.ok_or(RpcError::Engine {
            method,
            code: 0,
            message: "response carried neither result nor error".to_string(),
        })
    }

    pub async fn get_version(&self) -> Result<VersionInfo, RpcError> {
        let value = self.call("aria2.getVersion", vec![]).await?;
        decode(value, "aria2.getVersion")
    }

    /// Submits a new URI download and returns its gid.
    pub async fn add_uri(
        &self,
        uris: &[String],
        options: &DownloadOptions,
    ) -> Result<String, RpcError> {
        let value = self
            .call("aria2.addUri", vec![json!(uris), json!(options)])
            .await?;
        decode(value, "aria2.addUri")
    }

    /// Submits a torrent body (base64-encoded on the wire) and returns its gid.
    pub async fn add_torrent(
        &self,
        torrent: &[u8],
        options: &DownloadOptions,
    ) -> Result<String, RpcError> {
        let encoded = BASE64.encode(torrent);
        let value = self
            .call(
                "aria2.addTorrent",
                vec![json!(encoded), json!([]), json!(options)],
            )
            .await?;
        decode(value, "aria2.addTorrent")
    }

    pub async fn pause(&self, gid: &str) -> Result<(), RpcError> {
        self.call("aria2.pause", vec![json!(gid)]).await.map(drop)
    }

    pub async fn unpause(&self, gid: &str) -> Result<(), RpcError> {
        self.call("aria2.unpause", vec![json!(gid)]).await.map(drop)
    }

    /// Asks the engine to stop a transfer. The stopped task stays in the
    /// engine's result bookkeeping until `remove_download_result`.
    pub async fn remove(&self, gid: &str) -> Result<(), RpcError> {
        self.call("aria2.remove", vec![json!(gid)]).await.map(drop)
    }

    pub async fn remove_download_result(&self, gid: &str) -> Result<(), RpcError> {
        self.call("aria2.removeDownloadResult", vec![json!(gid)])
            .await
            .map(drop)
    }

    pub async fn tell_status(&self, gid: &str) -> Result<DownloadTask, RpcError> {
        let value = self.call("aria2.tellStatus", vec![json!(gid)]).await?;
        decode(value, "aria2.tellStatus")
    }

    pub async fn tell_active(&self) -> Result<Vec<DownloadTask>, RpcError> {
        let value = self.call("aria2.tellActive", vec![]).await?;
        decode(value, "aria2.tellActive")
    }

    pub async fn tell_waiting(&self, offset: u32, num: u32) -> Result<Vec<DownloadTask>, RpcError> {
        let value = self
            .call("aria2.tellWaiting", vec![json!(offset), json!(num)])
            .await?;
        decode(value, "aria2.tellWaiting")
    }

    pub async fn tell_stopped(&self, offset: u32, num: u32) -> Result<Vec<DownloadTask>, RpcError> {
        let value = self
            .call("aria2.tellStopped", vec![json!(offset), json!(num)])
            .await?;
        decode(value, "aria2.tellStopped")
    }

    /// Releases the session. Safe to call more than once; later calls on a
    /// closed session fail with `NotConnected`.
    pub fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::SeqCst) {
            log::debug!("RPC session closed");
        }
    }
}

fn decode<T: DeserializeOwned>(value: Value, method: &'static str) -> Result<T, RpcError> {
    serde_json::from_value(value).map_err(|source| RpcError::Malformed { method, source })
}
