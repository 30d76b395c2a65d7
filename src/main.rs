use anyhow::Context;
use coverx::supervisor::Event;
use coverx::{Supervisor, SupervisorConfig};
use tokio::sync::broadcast;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = SupervisorConfig::default();
    let handle = Supervisor::start(config)
        .await
        .context("supervisor failed to initialize")?;

    // Mirror the event stream into the log; a UI surface subscribes the
    // same way.
    let mut events = handle.subscribe();
    let watcher = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(Event::DownloadComplete { gid, file_name }) => {
                    log::info!(
                        "download {gid} complete ({})",
                        file_name.unwrap_or_else(|| "unknown file".to_string())
                    );
                }
                Ok(Event::AddRequested(url)) => {
                    log::info!("deep link requested download of {url}");
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for the shutdown signal")?;
    log::info!("shutting down");
    handle.shutdown().await;
    watcher.abort();

    Ok(())
}
