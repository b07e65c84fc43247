use std::{future::Future, time::Duration};

use tokio::{sync::Mutex, task::JoinHandle, time};

/// Single-slot delayed task scheduler.
///
/// At most one task exists at a time: scheduling while the previous task is
/// still sleeping or running is a no-op, so a burst of triggers collapses into
/// one run `delay` after the first trigger.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            task: Mutex::new(None),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `job` after the delay unless a task is already outstanding.
    /// Returns `true` when a new task was created.
    pub async fn schedule<F>(&self, job: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut slot = self.task.lock().await;
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            return false;
        }

        let delay = self.delay;
        *slot = Some(tokio::spawn(async move {
            time::sleep(delay).await;
            job.await;
        }));
        true
    }

    /// `true` while a task is sleeping or running.
    pub async fn is_pending(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Abort the outstanding task, if any, wherever it is suspended.
    pub async fn cancel(&self) {
        if let Some(task) = self.task.lock().await.take() {
            task.abort();
        }
    }
}
