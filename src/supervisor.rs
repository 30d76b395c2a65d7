//! Supervisor context and the command/event boundary.
//!
//! One actor task owns every piece of mutable state (live snapshot and
//! removed ledger) and drains a single serialized queue fed by three
//! producers: poll snapshots, completion notifications, and commands.
//! Observers only ever see whole snapshots over the broadcast channel,
//! never intermediate state.

use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::SupervisorConfig;
use crate::engine::{Aria2Session, EngineProcess, events};
use crate::error::{InitError, RpcError, TaskOpError};
use crate::link;
use crate::tasks::model::{DownloadOptions, DownloadTask, TaskFile};
use crate::tasks::progress::{self, Progress};
use crate::tasks::reconciler;
use crate::tasks::RemovedLedger;

const COMMAND_QUEUE: usize = 32;
const UPDATE_QUEUE: usize = 8;
const EVENT_QUEUE: usize = 100;

/// Outcome of an add request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    Added(String),
    /// The URL is already being fetched by a live task. Submission needs
    /// explicit confirmation (`allow_duplicate`).
    Duplicate { existing_gid: String },
}

/// Best-effort events pushed to whoever subscribes.
#[derive(Debug, Clone)]
pub enum Event {
    TasksUpdated(Arc<Vec<DownloadTask>>),
    DownloadComplete {
        gid: String,
        file_name: Option<String>,
    },
    ProgressUpdated(Progress),
    /// A deep link resolved to this URL; the surface decides whether to
    /// submit it.
    AddRequested(String),
}

enum Command {
    AddDownload {
        url: String,
        options: DownloadOptions,
        allow_duplicate: bool,
        reply: oneshot::Sender<Result<AddOutcome, TaskOpError>>,
    },
    AddTorrent {
        torrent: Vec<u8>,
        options: DownloadOptions,
        reply: oneshot::Sender<Result<String, TaskOpError>>,
    },
    Pause {
        gid: String,
        reply: oneshot::Sender<Result<(), TaskOpError>>,
    },
    Resume {
        gid: String,
        reply: oneshot::Sender<Result<(), TaskOpError>>,
    },
    Stop {
        gid: String,
        reply: oneshot::Sender<Result<(), TaskOpError>>,
    },
    Remove {
        gid: String,
        delete_files: bool,
        reply: oneshot::Sender<Result<(), TaskOpError>>,
    },
    DeletePermanently {
        gid: String,
        reply: oneshot::Sender<Result<(), TaskOpError>>,
    },
    GetAll {
        reply: oneshot::Sender<Vec<DownloadTask>>,
    },
    GetRemoved {
        reply: oneshot::Sender<Vec<DownloadTask>>,
    },
    GetDownloadPath {
        reply: oneshot::Sender<String>,
    },
    SetDownloadPath {
        path: String,
        reply: oneshot::Sender<Result<(), TaskOpError>>,
    },
    EncodeLink {
        url: String,
        reply: oneshot::Sender<String>,
    },
    DecodeLink {
        text: String,
        reply: oneshot::Sender<String>,
    },
    HandleDeepLink {
        uri: String,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Cloneable handle to a running supervisor.
#[derive(Clone)]
pub struct SupervisorHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<Event>,
}

/// The supervisor actor. Constructed by [`Supervisor::start`], torn down by
/// a shutdown command; there is no ambient instance.
pub struct Supervisor {
    config: SupervisorConfig,
    engine: EngineProcess,
    session: Aria2Session,
    ledger: RemovedLedger,
    live: Arc<Vec<DownloadTask>>,
    events: broadcast::Sender<Event>,
    poll_task: JoinHandle<()>,
    listener_task: JoinHandle<()>,
}

impl Supervisor {
    /// Brings the whole stack up: ledger, engine process (with settling
    /// delay), RPC probe, poll loop, notification listener, actor loop.
    /// Start and connect failures abort initialization; the spawned engine
    /// is reaped on the error path.
    pub async fn start(config: SupervisorConfig) -> Result<SupervisorHandle, InitError> {
        let ledger = RemovedLedger::load(config.ledger_path.clone()).await;
        let engine = EngineProcess::start(&config).await?;
        let session =
            Aria2Session::open(&config.rpc_endpoint(), &config.rpc_secret, config.rpc_timeout)
                .await?;

        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_QUEUE);
        let (updates_tx, updates_rx) = mpsc::channel(UPDATE_QUEUE);
        let (completions_tx, completions_rx) = mpsc::channel(COMMAND_QUEUE);
        let (events_tx, _) = broadcast::channel(EVENT_QUEUE);

        let poll_task = reconciler::spawn_poll_loop(
            session.clone(),
            config.poll_interval,
            config.page_size,
            updates_tx,
        );
        let listener_task = tokio::spawn(events::listen(config.ws_endpoint(), completions_tx));

        let supervisor = Supervisor {
            config,
            engine,
            session,
            ledger,
            live: Arc::new(Vec::new()),
            events: events_tx.clone(),
            poll_task,
            listener_task,
        };
        tokio::spawn(supervisor.run(commands_rx, updates_rx, completions_rx));

        Ok(SupervisorHandle {
            commands: commands_tx,
            events: events_tx,
        })
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut updates: mpsc::Receiver<Vec<DownloadTask>>,
        mut completions: mpsc::Receiver<String>,
    ) {
        loop {
            tokio::select! {
                Some(snapshot) = updates.recv() => self.publish(snapshot),
                Some(gid) = completions.recv() => self.on_complete(gid).await,
                command = commands.recv() => match command {
                    Some(Command::Shutdown { reply }) => {
                        self.shutdown();
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.handle(command).await,
                    None => {
                        self.shutdown();
                        break;
                    }
                },
            }
        }
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::AddDownload {
                url,
                options,
                allow_duplicate,
                reply,
            } => {
                let result = self.add_download(&url, &options, allow_duplicate).await;
                let _ = reply.send(result);
            }
            Command::AddTorrent {
                torrent,
                options,
                reply,
            } => {
                let result = self
                    .session
                    .add_torrent(&torrent, &options)
                    .await
                    .map_err(Into::into);
                let _ = reply.send(result);
            }
            Command::Pause { gid, reply } => {
                let _ = reply.send(self.session.pause(&gid).await.map_err(Into::into));
            }
            Command::Resume { gid, reply } => {
                let _ = reply.send(self.session.unpause(&gid).await.map_err(Into::into));
            }
            Command::Stop { gid, reply } => {
                let _ = reply.send(self.session.remove(&gid).await.map_err(Into::into));
            }
            Command::Remove {
                gid,
                delete_files,
                reply,
            } => {
                let _ = reply.send(self.remove(&gid, delete_files).await);
            }
            Command::DeletePermanently { gid, reply } => {
                let _ = reply.send(self.delete_permanently(&gid).await);
            }
            Command::GetAll { reply } => {
                let _ = reply.send(self.live.as_ref().clone());
            }
            Command::GetRemoved { reply } => {
                let _ = reply.send(self.ledger.records().to_vec());
            }
            Command::GetDownloadPath { reply } => {
                let path = self
                    .ledger
                    .last_download_path()
                    .map(str::to_string)
                    .unwrap_or_else(|| self.config.download_dir.display().to_string());
                let _ = reply.send(path);
            }
            Command::SetDownloadPath { path, reply } => {
                self.ledger.set_last_download_path(path);
                let result = self.ledger.persist().await.map_err(Into::into);
                let _ = reply.send(result);
            }
            Command::EncodeLink { url, reply } => {
                let _ = reply.send(link::encode(&url, &self.config.link_secret));
            }
            Command::DecodeLink { text, reply } => {
                let _ = reply.send(link::decode(&text, &self.config.link_secret));
            }
            Command::HandleDeepLink { uri } => {
                match link::resolve_deep_link(&uri, &self.config.link_secret) {
                    Some(url) => {
                        let _ = self.events.send(Event::AddRequested(url));
                    }
                    None => log::warn!("ignoring deep link with unexpected shape: {uri}"),
                }
            }
            Command::Shutdown { .. } => unreachable!("handled in the run loop"),
        }
    }

    /// Replaces the live snapshot wholesale and notifies observers.
    /// Ledgered gids never appear in the published view.
    fn publish(&mut self, snapshot: Vec<DownloadTask>) {
        let snapshot: Vec<DownloadTask> = snapshot
            .into_iter()
            .filter(|task| !self.ledger.contains(&task.gid))
            .collect();
        let progress = progress::aggregate(&snapshot);
        self.live = Arc::new(snapshot);
        let _ = self.events.send(Event::TasksUpdated(self.live.clone()));
        let _ = self.events.send(Event::ProgressUpdated(progress));
    }

    /// Both the notification listener and the poll cycle can report a
    /// completion; subscribers are expected to be idempotent per gid.
    async fn on_complete(&mut self, gid: String) {
        let file_name = match self.session.tell_status(&gid).await {
            Ok(task) => task.files.first().and_then(|file| file_name_of(&file.path)),
            Err(e) => {
                log::warn!("could not fetch completed task {gid}: {e}");
                None
            }
        };
        let _ = self.events.send(Event::DownloadComplete { gid, file_name });
    }

    async fn add_download(
        &mut self,
        url: &str,
        options: &DownloadOptions,
        allow_duplicate: bool,
    ) -> Result<AddOutcome, TaskOpError> {
        if !allow_duplicate {
            if let Some(existing) = reconciler::find_duplicate(&self.live, url) {
                return Ok(AddOutcome::Duplicate {
                    existing_gid: existing.gid.clone(),
                });
            }
        }
        let uris = [url.to_string()];
        let gid = self.session.add_uri(&uris, options).await?;
        Ok(AddOutcome::Added(gid))
    }

    /// Moves a task out of the live view and into the durable ledger.
    /// The ledger write must land (or be retried) before success is
    /// reported; the engine-side cleanup around it is best-effort.
    async fn remove(&mut self, gid: &str, delete_files: bool) -> Result<(), TaskOpError> {
        if self.ledger.contains(gid) {
            return Ok(());
        }

        let snapshot = self.session.tell_status(gid).await?;

        if snapshot.status.is_stoppable() {
            if let Err(e) = self.session.remove(gid).await {
                log::warn!("best-effort stop of {gid} failed: {e}");
            }
        }

        let mut record = snapshot.clone();
        record.removed_at = Some(Utc::now());
        self.ledger.append(record);
        self.ledger.persist().await?;

        // The engine may legitimately refuse this while the task winds down.
        if let Err(e) = self.session.remove_download_result(gid).await {
            log::debug!("engine kept the result for {gid}: {e}");
        }

        if delete_files {
            self.trash_files(&snapshot.files).await;
        }

        self.drop_from_live(gid);
        Ok(())
    }

    /// Unlike remove, this never touches the ledger and unlinks files
    /// irrecoverably.
    async fn delete_permanently(&mut self, gid: &str) -> Result<(), TaskOpError> {
        let snapshot = self.session.tell_status(gid).await?;
        self.session.remove_download_result(gid).await?;

        for file in &snapshot.files {
            match tokio::fs::remove_file(&file.path).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => log::warn!("could not delete {}: {e}", file.path),
            }
        }

        self.drop_from_live(gid);
        Ok(())
    }

    /// Moves task files into the recoverable trash location. Missing files
    /// are skipped silently; other failures are logged and do not fail the
    /// surrounding remove.
    async fn trash_files(&self, files: &[TaskFile]) {
        for file in files {
            let source = Path::new(&file.path);
            if !matches!(tokio::fs::try_exists(source).await, Ok(true)) {
                continue;
            }
            if let Err(e) = tokio::fs::create_dir_all(&self.config.trash_dir).await {
                log::warn!("trash location unavailable: {e}");
                return;
            }
            let Some(name) = source.file_name() else {
                continue;
            };
            let target = self.config.trash_dir.join(name);
            if let Err(e) = tokio::fs::rename(source, &target).await {
                log::warn!("could not move {} to trash: {e}", source.display());
            }
        }
    }

    fn drop_from_live(&mut self, gid: &str) {
        if self.live.iter().any(|task| task.gid == gid) {
            let filtered: Vec<DownloadTask> = self
                .live
                .iter()
                .filter(|task| task.gid != gid)
                .cloned()
                .collect();
            self.publish(filtered);
        }
    }

    /// Three unordered best-effort steps: stop polling and listening,
    /// close the session, signal the engine.
    fn shutdown(&mut self) {
        self.poll_task.abort();
        self.listener_task.abort();
        self.session.close();
        self.engine.stop();
        log::info!("supervisor stopped");
    }
}

impl SupervisorHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    pub async fn add_download(
        &self,
        url: impl Into<String>,
        options: DownloadOptions,
        allow_duplicate: bool,
    ) -> Result<AddOutcome, TaskOpError> {
        self.request(|reply| Command::AddDownload {
            url: url.into(),
            options,
            allow_duplicate,
            reply,
        })
        .await?
    }

    pub async fn add_torrent(
        &self,
        torrent: Vec<u8>,
        options: DownloadOptions,
    ) -> Result<String, TaskOpError> {
        self.request(|reply| Command::AddTorrent {
            torrent,
            options,
            reply,
        })
        .await?
    }

    pub async fn pause(&self, gid: impl Into<String>) -> Result<(), TaskOpError> {
        self.request(|reply| Command::Pause {
            gid: gid.into(),
            reply,
        })
        .await?
    }

    pub async fn resume(&self, gid: impl Into<String>) -> Result<(), TaskOpError> {
        self.request(|reply| Command::Resume {
            gid: gid.into(),
            reply,
        })
        .await?
    }

    pub async fn stop(&self, gid: impl Into<String>) -> Result<(), TaskOpError> {
        self.request(|reply| Command::Stop {
            gid: gid.into(),
            reply,
        })
        .await?
    }

    pub async fn remove(
        &self,
        gid: impl Into<String>,
        delete_files: bool,
    ) -> Result<(), TaskOpError> {
        self.request(|reply| Command::Remove {
            gid: gid.into(),
            delete_files,
            reply,
        })
        .await?
    }

    pub async fn delete_permanently(&self, gid: impl Into<String>) -> Result<(), TaskOpError> {
        self.request(|reply| Command::DeletePermanently {
            gid: gid.into(),
            reply,
        })
        .await?
    }

    pub async fn get_all(&self) -> Result<Vec<DownloadTask>, TaskOpError> {
        self.request(|reply| Command::GetAll { reply }).await
    }

    pub async fn get_removed(&self) -> Result<Vec<DownloadTask>, TaskOpError> {
        self.request(|reply| Command::GetRemoved { reply }).await
    }

    pub async fn get_download_path(&self) -> Result<String, TaskOpError> {
        self.request(|reply| Command::GetDownloadPath { reply }).await
    }

    pub async fn set_download_path(&self, path: impl Into<String>) -> Result<(), TaskOpError> {
        self.request(|reply| Command::SetDownloadPath {
            path: path.into(),
            reply,
        })
        .await?
    }

    pub async fn encode_link(&self, url: impl Into<String>) -> Result<String, TaskOpError> {
        self.request(|reply| Command::EncodeLink {
            url: url.into(),
            reply,
        })
        .await
    }

    pub async fn decode_link(&self, text: impl Into<String>) -> Result<String, TaskOpError> {
        self.request(|reply| Command::DecodeLink {
            text: text.into(),
            reply,
        })
        .await
    }

    /// Hands an OS-delivered deep link to the supervisor. Resolution is
    /// announced through `Event::AddRequested`; malformed links are logged
    /// and dropped.
    pub async fn handle_deep_link(&self, uri: impl Into<String>) -> Result<(), TaskOpError> {
        self.commands
            .send(Command::HandleDeepLink { uri: uri.into() })
            .await
            .map_err(|_| TaskOpError::Rpc(RpcError::NotConnected))
    }

    /// Requests teardown and waits for the actor to finish its best-effort
    /// cleanup.
    pub async fn shutdown(&self) {
        let (reply, done) = oneshot::channel();
        if self
            .commands
            .send(Command::Shutdown { reply })
            .await
            .is_ok()
        {
            let _ = done.await;
        }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, TaskOpError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| TaskOpError::Rpc(RpcError::NotConnected))?;
        response
            .await
            .map_err(|_| TaskOpError::Rpc(RpcError::NotConnected))
    }
}

fn file_name_of(path: &str) -> Option<String> {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::model::TaskStatus;

    #[test]
    fn file_name_is_taken_from_the_full_path() {
        assert_eq!(
            file_name_of("/downloads/movie.mkv"),
            Some("movie.mkv".to_string())
        );
        assert_eq!(file_name_of(""), None);
    }

    #[tokio::test]
    async fn ledgered_gids_are_filtered_from_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = RemovedLedger::load(dir.path().join("removed.json")).await;
        ledger.append(DownloadTask {
            gid: "gone".to_string(),
            status: TaskStatus::Complete,
            total_length: 1,
            completed_length: 1,
            download_speed: 0,
            files: Vec::new(),
            dir: String::new(),
            error_message: None,
            removed_at: None,
        });

        let snapshot = vec![
            DownloadTask {
                gid: "gone".to_string(),
                status: TaskStatus::Complete,
                total_length: 1,
                completed_length: 1,
                download_speed: 0,
                files: Vec::new(),
                dir: String::new(),
                error_message: None,
                removed_at: None,
            },
            DownloadTask {
                gid: "live".to_string(),
                status: TaskStatus::Active,
                total_length: 10,
                completed_length: 5,
                download_speed: 1,
                files: Vec::new(),
                dir: String::new(),
                error_message: None,
                removed_at: None,
            },
        ];

        let visible: Vec<DownloadTask> = snapshot
            .into_iter()
            .filter(|task| !ledger.contains(&task.gid))
            .collect();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].gid, "live");
    }
}
