use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// Where canvas snapshots go. Implementations only have to store a string
/// and hand the latest one back.
pub trait SnapshotStore: Send + Sync + 'static {
    fn save(&self, snapshot: String) -> impl Future<Output = Result<()>> + Send;
    fn load(&self) -> impl Future<Output = Result<Option<String>>> + Send;
}

/// Stores the snapshot as a JSON file on disk.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotStore for FileStore {
    async fn save(&self, snapshot: String) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create directory '{}'", parent.display()))?;
        }

        let staging = self.path.with_extension("tmp");
        tokio::fs::write(&staging, snapshot.as_bytes())
            .await
            .with_context(|| format!("failed to write '{}'", staging.display()))?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .with_context(|| format!("failed to replace '{}'", self.path.display()))?;
        Ok(())
    }

    async fn load(&self) -> Result<Option<String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => {
                Err(err).with_context(|| format!("failed to read '{}'", self.path.display()))
            }
        }
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    saves: Vec<String>,
    failing: bool,
    latency: Duration,
}

/// In-memory store keeping every saved snapshot, with switchable failure
/// and artificial latency.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: impl Into<String>) -> Self {
        let store = Self::default();
        store.lock().saves.push(snapshot.into());
        store
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_failing(&self, failing: bool) {
        self.lock().failing = failing;
    }

    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    pub fn saves(&self) -> Vec<String> {
        self.lock().saves.clone()
    }

    pub fn latest(&self) -> Option<String> {
        self.lock().saves.last().cloned()
    }
}

impl SnapshotStore for MemoryStore {
    async fn save(&self, snapshot: String) -> Result<()> {
        let latency = self.lock().latency;
        if !latency.is_zero() {
            sleep(latency).await;
        }

        let mut inner = self.lock();
        if inner.failing {
            bail!("snapshot store is unavailable");
        }
        inner.saves.push(snapshot);
        Ok(())
    }

    async fn load(&self) -> Result<Option<String>> {
        Ok(self.latest())
    }
}

/// Outcome of the most recent save attempt, for a status banner.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "state")]
pub enum SaveStatus {
    Idle,
    Saving {
        revision: u64,
    },
    Saved {
        revision: u64,
        at: DateTime<Utc>,
    },
    Failed {
        revision: u64,
        message: String,
        at: DateTime<Utc>,
    },
}

impl SaveStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, SaveStatus::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
struct PendingSnapshot {
    revision: u64,
    json: String,
}

/// Handle to a running auto-save task.
///
/// Each `schedule` call replaces the pending snapshot and restarts the quiet
/// period; once nothing new arrives for `delay`, the latest snapshot is
/// written. Changes that arrive while a write is in flight trigger one more
/// write afterwards.
#[derive(Debug)]
pub struct AutosaveHandle {
    pending: watch::Sender<Option<PendingSnapshot>>,
    status: watch::Receiver<SaveStatus>,
    task: JoinHandle<()>,
}

impl AutosaveHandle {
    /// Starts the auto-save task on the current tokio runtime.
    pub fn spawn<S: SnapshotStore>(store: S, delay: Duration) -> Self {
        let (pending, pending_rx) = watch::channel(None);
        let (status_tx, status) = watch::channel(SaveStatus::Idle);
        let task = tokio::spawn(run_autosave(store, delay, pending_rx, status_tx));
        Self {
            pending,
            status,
            task,
        }
    }

    pub fn schedule(&self, revision: u64, json: String) {
        self.pending
            .send_replace(Some(PendingSnapshot { revision, json }));
    }

    pub fn status(&self) -> SaveStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SaveStatus> {
        self.status.clone()
    }

    /// Writes any pending snapshot immediately and stops the task.
    pub async fn shutdown(self) -> SaveStatus {
        let Self {
            pending,
            status,
            task,
        } = self;
        drop(pending);
        if let Err(err) = task.await {
            warn!("auto-save task ended abnormally: {err}");
        }
        status.borrow().clone()
    }
}

async fn run_autosave<S: SnapshotStore>(
    store: S,
    delay: Duration,
    mut pending: watch::Receiver<Option<PendingSnapshot>>,
    status: watch::Sender<SaveStatus>,
) {
    let mut saved_revision: Option<u64> = None;

    loop {
        if pending.changed().await.is_err() {
            break;
        }

        let closed = loop {
            tokio::select! {
                changed = pending.changed() => {
                    if changed.is_err() {
                        break true;
                    }
                }
                _ = sleep(delay) => break false,
            }
        };

        let snapshot = pending.borrow_and_update().clone();
        if let Some(snapshot) = snapshot {
            if saved_revision != Some(snapshot.revision) {
                status.send_replace(SaveStatus::Saving {
                    revision: snapshot.revision,
                });
                match store.save(snapshot.json).await {
                    Ok(()) => {
                        debug!("saved canvas revision {}", snapshot.revision);
                        saved_revision = Some(snapshot.revision);
                        status.send_replace(SaveStatus::Saved {
                            revision: snapshot.revision,
                            at: Utc::now(),
                        });
                    }
                    Err(err) => {
                        warn!("failed to save canvas revision {}: {err:#}", snapshot.revision);
                        status.send_replace(SaveStatus::Failed {
                            revision: snapshot.revision,
                            message: format!("{err:#}"),
                            at: Utc::now(),
                        });
                    }
                }
            }
        }

        if closed {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DELAY: Duration = Duration::from_millis(1000);

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_edits_coalesce_into_one_save() {
        let store = MemoryStore::new();
        let handle = AutosaveHandle::spawn(store.clone(), DELAY);

        for revision in 1..=5 {
            handle.schedule(revision, format!("rev-{revision}"));
            sleep(ms(100)).await;
        }
        assert!(store.saves().is_empty());

        sleep(ms(1000)).await;
        assert_eq!(store.saves(), vec!["rev-5".to_string()]);
        assert!(matches!(handle.status(), SaveStatus::Saved { revision: 5, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn every_edit_restarts_the_quiet_period() {
        let store = MemoryStore::new();
        let handle = AutosaveHandle::spawn(store.clone(), DELAY);

        handle.schedule(1, "a".to_string());
        sleep(ms(600)).await;
        handle.schedule(2, "b".to_string());
        sleep(ms(600)).await;
        assert!(store.saves().is_empty());

        sleep(ms(500)).await;
        assert_eq!(store.saves(), vec!["b".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn edits_during_a_save_schedule_a_follow_up() {
        let store = MemoryStore::new();
        store.set_latency(ms(500));
        let handle = AutosaveHandle::spawn(store.clone(), DELAY);

        handle.schedule(1, "first".to_string());
        sleep(ms(1200)).await;
        assert!(matches!(handle.status(), SaveStatus::Saving { revision: 1 }));

        handle.schedule(2, "second".to_string());
        sleep(ms(3000)).await;
        assert_eq!(store.saves(), vec!["first".to_string(), "second".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_is_reported_and_next_edit_retries() {
        let store = MemoryStore::new();
        store.set_failing(true);
        let handle = AutosaveHandle::spawn(store.clone(), DELAY);

        handle.schedule(1, "lost".to_string());
        sleep(ms(1500)).await;
        assert!(handle.status().is_failed());
        assert!(store.saves().is_empty());

        // No retry happens on its own.
        sleep(ms(5000)).await;
        assert!(store.saves().is_empty());

        store.set_failing(false);
        handle.schedule(2, "kept".to_string());
        sleep(ms(1500)).await;
        assert_eq!(store.saves(), vec!["kept".to_string()]);
        assert!(matches!(handle.status(), SaveStatus::Saved { revision: 2, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_flushes_pending_snapshot() {
        let store = MemoryStore::new();
        let handle = AutosaveHandle::spawn(store.clone(), DELAY);

        handle.schedule(7, "pending".to_string());
        let status = handle.shutdown().await;

        assert_eq!(store.saves(), vec!["pending".to_string()]);
        assert!(matches!(status, SaveStatus::Saved { revision: 7, .. }));
    }

    #[tokio::test]
    async fn file_store_round_trips() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = FileStore::new(dir.path().join("nested").join("canvas.json"));

        assert_eq!(store.load().await?, None);
        store.save("{\"elements\":[]}".to_string()).await?;
        store.save("{\"elements\":[]}".to_string()).await?;
        assert_eq!(store.load().await?, Some("{\"elements\":[]}".to_string()));
        Ok(())
    }

    #[test]
    fn status_serializes_with_state_tag() -> Result<()> {
        let json = serde_json::to_string(&SaveStatus::Saving { revision: 3 })?;
        assert_eq!(json, "{\"state\":\"saving\",\"revision\":3}");
        Ok(())
    }
}
