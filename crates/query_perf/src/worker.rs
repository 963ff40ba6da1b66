//! Bounded pool that runs orchestrator tasks off the caller's path.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use query_structs::{PredictorError, Result};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, info};

type BoxedTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

struct QueuedTask {
    job_id: String,
    task: BoxedTask,
}

/// Runs queued tasks with at most `concurrency` in flight.
///
/// Every task is bounded by the hard time limit. A task that exceeds it is
/// dropped where it stands; nothing updates its job afterwards.
pub struct WorkerPool {
    sender: mpsc::UnboundedSender<QueuedTask>,
    dispatcher: JoinHandle<()>,
}

impl WorkerPool {
    #[must_use]
    pub fn start(concurrency: usize, hard_time_limit: Duration) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let dispatcher = tokio::spawn(dispatch(receiver, semaphore, hard_time_limit));

        info!(
            concurrency,
            hard_time_limit_secs = hard_time_limit.as_secs(),
            "Worker pool started"
        );
        Self { sender, dispatcher }
    }

    /// Queues `task` for the job `job_id`.
    ///
    /// # Errors
    ///
    /// Returns [`PredictorError::Internal`] if the pool has stopped.
    pub fn submit<F>(&self, job_id: impl Into<String>, task: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let job_id = job_id.into();
        debug!(%job_id, "Queueing task");
        self.sender
            .send(QueuedTask {
                job_id,
                task: Box::pin(task),
            })
            .map_err(|err| {
                PredictorError::Internal(format!(
                    "worker pool stopped, job {} not queued",
                    err.0.job_id
                ))
            })
    }

    /// Stops accepting work and waits for queued and running tasks.
    pub async fn shutdown(self) {
        let Self { sender, dispatcher } = self;
        drop(sender);
        if let Err(err) = dispatcher.await {
            error!(error = %err, "Worker dispatcher crashed");
        }
        info!("Worker pool stopped");
    }
}

async fn dispatch(
    mut receiver: mpsc::UnboundedReceiver<QueuedTask>,
    semaphore: Arc<Semaphore>,
    hard_time_limit: Duration,
) {
    let mut running = JoinSet::new();

    while let Some(QueuedTask { job_id, task }) = receiver.recv().await {
        let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
            break;
        };

        while let Some(finished) = running.try_join_next() {
            report_join(finished);
        }

        running.spawn(async move {
            let _permit = permit;
            if tokio::time::timeout(hard_time_limit, task).await.is_err() {
                error!(
                    %job_id,
                    limit_secs = hard_time_limit.as_secs(),
                    "Hard time limit exceeded, task dropped"
                );
            }
        });
    }

    while let Some(finished) = running.join_next().await {
        report_join(finished);
    }
}

fn report_join(result: core::result::Result<(), JoinError>) {
    if let Err(err) = result {
        error!(error = %err, "Worker task panicked");
    }
}
