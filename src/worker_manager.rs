//! Background dispatch of sync work.
//!
//! Callers (CLI, schedulers) hand a [`Task`] to a [`TaskQueue`] and return
//! immediately. [`LocalTaskQueue`] runs each task on the tokio runtime and
//! refuses to start a second task for a library that already has one running.
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::orchestrator::{CatalogSync, PassReport, SyncReport};
use crate::sync::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    Sync { library_id: i64 },
    Reweight { library_id: i64 },
    RefreshThumbnails { library_id: i64 },
}

impl Task {
    pub fn name(&self) -> &'static str {
        match self {
            Task::Sync { .. } => "sync",
            Task::Reweight { .. } => "reweight",
            Task::RefreshThumbnails { .. } => "refresh_thumbnails",
        }
    }

    pub fn library_id(&self) -> i64 {
        match *self {
            Task::Sync { library_id }
            | Task::Reweight { library_id }
            | Task::RefreshThumbnails { library_id } => library_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Synced(SyncReport),
    Reweighted(PassReport),
    ThumbnailsRefreshed(PassReport),
}

pub enum Enqueued {
    Started(JoinHandle<Result<TaskOutcome, SyncError>>),
    /// Another task for the same library is still running; nothing was queued.
    AlreadyRunning,
}

impl Enqueued {
    pub fn is_started(&self) -> bool {
        matches!(self, Enqueued::Started(_))
    }
}

pub trait TaskQueue: Send + Sync {
    fn enqueue(&self, task: Task) -> Enqueued;

    fn trigger_sync(&self, library_id: i64) -> Enqueued {
        self.enqueue(Task::Sync { library_id })
    }

    fn trigger_reweight(&self, library_id: i64) -> Enqueued {
        self.enqueue(Task::Reweight { library_id })
    }
}

type RunningSet = Arc<Mutex<HashSet<i64>>>;

/// Marks a library busy until dropped.
struct LibraryLease {
    running: RunningSet,
    library_id: i64,
}

impl LibraryLease {
    fn acquire(running: &RunningSet, library_id: i64) -> Option<Self> {
        let mut set = running.lock().unwrap_or_else(|p| p.into_inner());
        set.insert(library_id).then(|| Self {
            running: running.clone(),
            library_id,
        })
    }
}

impl Drop for LibraryLease {
    fn drop(&mut self) {
        let mut set = self.running.lock().unwrap_or_else(|p| p.into_inner());
        set.remove(&self.library_id);
    }
}

/// Runs tasks on the current tokio runtime. Must be used from within one.
#[derive(Clone)]
pub struct LocalTaskQueue {
    sync: CatalogSync,
    running: RunningSet,
}

impl LocalTaskQueue {
    pub fn new(sync: CatalogSync) -> Self {
        Self {
            sync,
            running: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn is_running(&self, library_id: i64) -> bool {
        self.running
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .contains(&library_id)
    }
}

impl TaskQueue for LocalTaskQueue {
    fn enqueue(&self, task: Task) -> Enqueued {
        let library_id = task.library_id();
        let Some(lease) = LibraryLease::acquire(&self.running, library_id) else {
            warn!(task = task.name(), library_id, "library busy; task not started");
            return Enqueued::AlreadyRunning;
        };
        let sync = self.sync.clone();
        let handle = tokio::spawn(async move {
            let _lease = lease;
            info!(task = task.name(), library_id, "starting task");
            let res = match task {
                Task::Sync { library_id } => sync.run_sync(library_id).await.map(TaskOutcome::Synced),
                Task::Reweight { library_id } => {
                    sync.reweight(library_id).await.map(TaskOutcome::Reweighted)
                }
                Task::RefreshThumbnails { library_id } => sync
                    .refresh_thumbnails(library_id)
                    .await
                    .map(TaskOutcome::ThumbnailsRefreshed),
            };
            match &res {
                Ok(_) => info!(task = task.name(), library_id, "task finished"),
                Err(e) => error!(task = task.name(), library_id, error = %e, "task failed"),
            }
            res
        });
        Enqueued::Started(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_ops::catalog::Catalog;
    use crate::database_ops::db::Db;
    use crate::orchestrator::fakes::*;
    use crate::scoring::LibraryStats;
    use crate::thumbnails::PassthroughThumbnails;
    use serde_json::json;
    use tokio::sync::Semaphore;

    #[tokio::test]
    async fn second_trigger_for_a_busy_library_is_rejected() {
        let catalog = Catalog::new(Db::in_memory().await.unwrap());
        let stats = LibraryStats { mean: 4.0, stdev: 0.5 };
        let ps4 = catalog.create_library("PS4", LIBRARY_URL, stats).await.unwrap();
        let ps5 = catalog.create_library("PS5", LIBRARY_URL, stats).await.unwrap();

        let gate = Arc::new(Semaphore::new(0));
        let mut source = FakeSource::new(json!({ "total_results": 0, "links": [] }));
        source.gate = Some(gate.clone());
        let sync = CatalogSync::new(
            catalog,
            Arc::new(source),
            Arc::new(PassthroughThumbnails),
            fast_config(),
        );
        let queue = LocalTaskQueue::new(sync);

        let Enqueued::Started(first) = queue.trigger_sync(ps4.id) else {
            panic!("first sync should start");
        };
        assert!(queue.is_running(ps4.id));
        assert!(!queue.trigger_sync(ps4.id).is_started());
        assert!(!queue.trigger_reweight(ps4.id).is_started());
        let Enqueued::Started(other) = queue.trigger_sync(ps5.id) else {
            panic!("other library should start");
        };

        gate.add_permits(2);
        let outcome = first.await.unwrap().unwrap();
        assert!(matches!(outcome, TaskOutcome::Synced(SyncReport { added: 0, .. })));
        other.await.unwrap().unwrap();
        assert!(!queue.is_running(ps4.id));

        let Enqueued::Started(again) = queue.trigger_reweight(ps4.id) else {
            panic!("library should be free again");
        };
        assert!(matches!(
            again.await.unwrap().unwrap(),
            TaskOutcome::Reweighted(PassReport { updated: 0, .. })
        ));
    }

    #[tokio::test]
    async fn failed_task_releases_the_library() {
        let catalog = Catalog::new(Db::in_memory().await.unwrap());
        let sync = CatalogSync::new(
            catalog,
            Arc::new(FakeSource::new(json!({}))),
            Arc::new(PassthroughThumbnails),
            fast_config(),
        );
        let queue = LocalTaskQueue::new(sync);
        let Enqueued::Started(handle) = queue.enqueue(Task::RefreshThumbnails { library_id: 42 })
        else {
            panic!("should start");
        };
        assert!(matches!(
            handle.await.unwrap(),
            Err(SyncError::LibraryNotFound(42))
        ));
        assert!(!queue.is_running(42));
    }
}
