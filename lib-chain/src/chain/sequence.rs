//! Block sequence
//!
//! FIFO of head-mutating jobs drained by a single worker task. Exactly one
//! job runs at a time; callers await the job's result through a oneshot.

use std::future::Future;
use std::pin::Pin;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, trace};

use crate::errors::{ChainError, ChainResult};

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Handle to the serialization queue. Cloning shares the same worker.
#[derive(Debug, Clone)]
pub struct Sequence {
    jobs: mpsc::UnboundedSender<Job>,
}

impl Sequence {
    /// Start the worker on the current Tokio runtime
    pub fn spawn() -> Self {
        let (jobs, mut queue) = mpsc::unbounded_channel::<Job>();

        tokio::spawn(async move {
            trace!("Block sequence worker started");
            while let Some(job) = queue.recv().await {
                // A panicking job must not take the worker down with it
                if let Err(e) = tokio::spawn(job).await {
                    error!("Block sequence job aborted: {}", e);
                }
            }
            trace!("Block sequence worker stopped");
        });

        Self { jobs }
    }

    /// Queue `job` behind everything already queued and wait for its result
    pub async fn run<F, T>(&self, job: F) -> ChainResult<T>
    where
        F: Future<Output = ChainResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (reply, result) = oneshot::channel();
        let job: Job = Box::pin(async move {
            // Caller may have gone away; the job still ran to completion
            let _ = reply.send(job.await);
        });

        self.jobs.send(job).map_err(|_| ChainError::SequenceClosed)?;
        result.await.map_err(|_| ChainError::SequenceClosed)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Mutex;

    #[tokio::test]
    async fn test_jobs_run_in_submission_order() {
        let sequence = Sequence::spawn();
        let log = Arc::new(Mutex::new(Vec::new()));

        let slow = {
            let log = Arc::clone(&log);
            let sequence = sequence.clone();
            tokio::spawn(async move {
                sequence
                    .run(async move {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        log.lock().await.push("slow");
                        Ok::<_, ChainError>(())
                    })
                    .await
            })
        };
        // Give the first job time to be queued
        tokio::time::sleep(Duration::from_millis(10)).await;

        let log2 = Arc::clone(&log);
        sequence
            .run(async move {
                log2.lock().await.push("fast");
                Ok::<_, ChainError>(())
            })
            .await
            .unwrap();

        slow.await.unwrap().unwrap();
        assert_eq!(*log.lock().await, vec!["slow", "fast"]);
    }

    #[tokio::test]
    async fn test_errors_are_returned_to_caller() {
        let sequence = Sequence::spawn();
        let result: ChainResult<()> = sequence.run(async { Err::<(), _>(ChainError::HeadNotSet) }).await;
        assert!(matches!(result, Err(ChainError::HeadNotSet)));
    }

    #[tokio::test]
    async fn test_panicking_job_does_not_stop_worker() {
        let sequence = Sequence::spawn();
        let result: ChainResult<()> = sequence
            .run(async {
                let fail = true;
                if fail {
                    panic!("job failed");
                }
                Ok::<(), ChainError>(())
            })
            .await;
        assert!(matches!(result, Err(ChainError::SequenceClosed)));

        let value = sequence.run(async { Ok::<_, ChainError>(7u32) }).await.unwrap();
        assert_eq!(value, 7);
    }
}
