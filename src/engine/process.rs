//! Engine process lifecycle.

use std::process::Stdio;

use tokio::process::{Child, Command};

use crate::config::SupervisorConfig;
use crate::error::StartError;

/// Handle to the spawned engine process. Spawning says nothing about
/// readiness; the RPC control probe establishes that after the settling
/// delay has passed.
pub struct EngineProcess {
    child: Child,
}

impl EngineProcess {
    /// Creates the download directory, spawns the engine with the fixed
    /// argument set, and waits out the settling delay.
    pub async fn start(config: &SupervisorConfig) -> Result<Self, StartError> {
        tokio::fs::create_dir_all(&config.download_dir)
            .await
            .map_err(|source| StartError::CreateDir {
                path: config.download_dir.clone(),
                source,
            })?;

        let child = Command::new(&config.engine_binary)
            .args(config.engine_args())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| StartError::Spawn {
                binary: config.engine_binary.clone(),
                source,
            })?;

        log::info!(
            "engine started (pid {:?}), settling for {:?}",
            child.id(),
            config.settle_delay
        );
        tokio::time::sleep(config.settle_delay).await;

        Ok(Self { child })
    }

    /// Signals termination and returns immediately. Graceful-shutdown
    /// confirmation is not waited for; session cleanup is a separate step.
    pub fn stop(&mut self) {
        if let Err(e) = self.child.start_kill() {
            log::warn!("failed to signal engine termination: {e}");
        }
    }
}
