use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::debug;

use crate::core::error::{ProvisionError, ProvisionResult};

use super::request::{TransformOutcome, TransformRequest};
use super::runner::TransformRunner;

/// Runs transforms on blocking threads, at most `threads` at a time.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    runner: TransformRunner,
}

impl WorkerPool {
    pub fn new(threads: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(threads.max(1))),
            runner: TransformRunner::new(),
        }
    }

    /// Submit a request and wait for it to finish or fail.
    pub async fn run(&self, request: TransformRequest) -> ProvisionResult<TransformOutcome> {
        let _permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ProvisionError::Transform("worker pool is closed".into()))?;

        let runner = self.runner;
        let label = request.kind.label();
        let outcome = tokio::task::spawn_blocking(move || runner.invoke(&request))
            .await
            .map_err(|e| ProvisionError::Transform(format!("{label} worker panicked: {e}")))??;
        debug!("Transform {} finished in {:?}", label, outcome.duration);
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::write_jar;
    use crate::core::worker::request::TransformKind;

    #[tokio::test]
    async fn concurrent_requests_all_complete() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.jar");
        write_jar(&input, &[("A.class", b"a")]);

        let pool = WorkerPool::new(2);
        let jobs = (0..4).map(|i| {
            let pool = pool.clone();
            let request = TransformRequest::new(
                TransformKind::Overlay {
                    archives: Vec::new(),
                },
                &input,
                dir.path().join(format!("out-{i}.jar")),
            );
            async move { pool.run(request).await }
        });
        let outcomes = futures_util::future::join_all(jobs).await;
        for outcome in outcomes {
            assert!(outcome.unwrap().output.is_file());
        }
    }

    #[tokio::test]
    async fn failures_cross_the_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let request = TransformRequest::new(
            TransformKind::CopyMissing,
            dir.path().join("missing.jar"),
            dir.path().join("out.jar"),
        );
        let err = WorkerPool::new(1).run(request).await.unwrap_err();
        assert!(matches!(err, ProvisionError::Io { .. }));
    }
}
