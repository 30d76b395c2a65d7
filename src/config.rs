//! Supervisor configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Name of the per-user application data directory.
const APP_DIR: &str = "coverx";

/// Subdirectory of the user's download folder that the engine writes into.
const DOWNLOAD_SUBDIR: &str = "coverx-downloads";

/// Configuration for one supervisor instance, constructed once at startup
/// and injected into each component. Port and secret stay fixed for the
/// lifetime of the instance.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Engine binary, resolved through `PATH` unless absolute.
    pub engine_binary: PathBuf,
    /// Destination folder for transfers; created on start.
    pub download_dir: PathBuf,
    pub rpc_port: u16,
    /// Shared secret passed to the spawned process and to every RPC call.
    pub rpc_secret: String,
    /// Timeout applied to each RPC round-trip.
    pub rpc_timeout: Duration,
    /// Fixed settling delay between spawning the engine and the first
    /// control probe.
    pub settle_delay: Duration,
    pub poll_interval: Duration,
    /// Offset window for the waiting/stopped list calls.
    pub page_size: u32,
    /// Passphrase for the shareable-link codec.
    pub link_secret: String,
    pub ledger_path: PathBuf,
    /// Recoverable location for files removed together with their task.
    pub trash_dir: PathBuf,
}

impl SupervisorConfig {
    pub fn rpc_endpoint(&self) -> String {
        format!("http://localhost:{}/jsonrpc", self.rpc_port)
    }

    pub fn ws_endpoint(&self) -> String {
        format!("ws://localhost:{}/jsonrpc", self.rpc_port)
    }

    /// Fixed argument set for the engine process. Transfer-tuning flags are
    /// constants, not computed per call.
    pub fn engine_args(&self) -> Vec<String> {
        vec![
            "--enable-rpc".into(),
            "--rpc-listen-all=true".into(),
            format!("--rpc-listen-port={}", self.rpc_port),
            format!("--rpc-secret={}", self.rpc_secret),
            "--rpc-allow-origin-all=true".into(),
            format!("--dir={}", self.download_dir.display()),
            "--continue=true".into(),
            "--max-connection-per-server=16".into(),
            "--min-split-size=1M".into(),
            "--split=16".into(),
            "--file-allocation=falloc".into(),
            "--log-level=warn".into(),
        ]
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR);
        let download_dir = dirs::download_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(DOWNLOAD_SUBDIR);

        Self {
            engine_binary: PathBuf::from("aria2c"),
            download_dir,
            rpc_port: 6800,
            rpc_secret: "coverx-aria2".to_string(),
            rpc_timeout: Duration::from_secs(5),
            settle_delay: Duration::from_secs(2),
            poll_interval: Duration::from_secs(1),
            page_size: 100,
            link_secret: "coverx-link".to_string(),
            ledger_path: data_dir.join("removed.json"),
            trash_dir: data_dir.join("trash"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_args_carry_rpc_endpoint_settings() {
        let config = SupervisorConfig::default();
        let args = config.engine_args();
        assert!(args.contains(&"--enable-rpc".to_string()));
        assert!(args.contains(&format!("--rpc-listen-port={}", config.rpc_port)));
        assert!(args.contains(&format!("--rpc-secret={}", config.rpc_secret)));
    }

    #[test]
    fn endpoints_target_localhost() {
        let config = SupervisorConfig::default();
        assert_eq!(config.rpc_endpoint(), "http://localhost:6800/jsonrpc");
        assert_eq!(config.ws_endpoint(), "ws://localhost:6800/jsonrpc");
    }
}
