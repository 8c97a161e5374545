use std::sync::Arc;
use std::time::Duration;

use log::warn;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use storage::snapshot::{AnswerSnapshot, SnapshotKey, SnapshotStore};

/// Fixed cadence of local autosave writes.
pub const AUTOSAVE_INTERVAL: Duration = Duration::from_secs(5);

/// Handle to a running autosave task; stop and drop both hard-stop it.
#[derive(Debug)]
pub struct AutosaveHandle {
    task: JoinHandle<()>,
}

impl AutosaveHandle {
    pub fn stop(&self) {
        self.task.abort();
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for AutosaveHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Periodically persists the newest session snapshot to the local store.
///
/// The session side publishes a fresh [`AnswerSnapshot`] on every accepted
/// answer through a watch channel; the autosaver writes at most once per
/// [`AUTOSAVE_INTERVAL`] and only when the snapshot actually changed. The
/// task exits on its own once the sender is dropped (session teardown), and
/// the handle aborts it for explicit stops.
pub struct Autosaver;

impl Autosaver {
    #[must_use]
    pub fn spawn(
        store: Arc<dyn SnapshotStore>,
        key: SnapshotKey,
        mut rx: watch::Receiver<AnswerSnapshot>,
    ) -> AutosaveHandle {
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(AUTOSAVE_INTERVAL);
            interval.tick().await;
            loop {
                interval.tick().await;
                match rx.has_changed() {
                    Ok(false) => continue,
                    Ok(true) => {}
                    // Sender dropped: the session is gone, stop saving.
                    Err(_) => return,
                }
                let snapshot = rx.borrow_and_update().clone();
                if let Err(e) = store.save(&key, &snapshot).await {
                    // Autosave is best-effort; the next interval retries.
                    warn!("autosave for quiz {} failed: {e}", key.quiz_id);
                }
            }
        });
        AutosaveHandle { task }
    }
}
