use log::debug;
use std::future::Future;
use tokio::task::JoinHandle;

/// A spawned background task that is aborted when the handle is dropped.
///
/// The session keeps its position watch and content poller in these so that
/// tearing the session down cannot leave either one running.
#[derive(Debug)]
pub struct ScopedTask {
    label: &'static str,
    handle: JoinHandle<()>,
}

impl ScopedTask {
    /// Spawns `future` on the current tokio runtime.
    pub fn spawn<F>(label: &'static str, future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        debug!("spawning {}", label);
        Self {
            label,
            handle: tokio::spawn(future),
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for ScopedTask {
    fn drop(&mut self) {
        if !self.handle.is_finished() {
            debug!("cancelling {}", self.label);
        }
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn dropping_the_handle_aborts_the_task() {
        let (tx, rx) = oneshot::channel::<()>();
        let task = ScopedTask::spawn("sleeper", async move {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            let _ = tx.send(());
        });
        assert_eq!(task.label(), "sleeper");
        drop(task);
        // the sender is dropped with the aborted future
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn finished_tasks_report_completion() {
        let task = ScopedTask::spawn("noop", async {});
        for _ in 0..100 {
            if task.is_finished() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(task.is_finished());
    }
}
