use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::{BatchOperation, BatchResult, ResourceRegistry};
use crate::error::{BatchError, CfError, CfResult};
use crate::types::BatchConfig;

/// Runs batch operations with bounded parallelism.
///
/// At most `concurrency` operations are in flight; each runs under its own
/// deadline. Results come back in input order once every operation has
/// finished.
#[derive(Clone)]
pub struct BatchExecutor {
    registry: Arc<ResourceRegistry>,
    concurrency: usize,
    operation_timeout: Duration,
}

impl BatchExecutor {
    pub fn new(registry: Arc<ResourceRegistry>, config: &BatchConfig) -> Self {
        Self {
            registry,
            concurrency: config.concurrency.max(1),
            operation_timeout: config.operation_timeout,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &Arc<ResourceRegistry> {
        &self.registry
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn operation_timeout(&self) -> Duration {
        self.operation_timeout
    }

    /// Execute `operations` and return one result per operation, positionally.
    ///
    /// Per-operation failures are captured in the results. Cancelling
    /// `cancel` fails in-flight operations and everything not yet started
    /// with [`CfError::Cancelled`].
    pub async fn execute(
        &self,
        cancel: &CancellationToken,
        operations: Vec<BatchOperation>,
    ) -> Vec<BatchResult> {
        let total = operations.len();
        let started = Instant::now();
        tracing::info!(
            operations = total,
            concurrency = self.concurrency,
            "Executing batch"
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut slots: Vec<Option<BatchResult>> = std::iter::repeat_with(|| None).take(total).collect();
        let mut pending: HashMap<tokio::task::Id, (usize, BatchOperation)> = HashMap::new();
        let mut tasks = JoinSet::new();

        for (index, operation) in operations.into_iter().enumerate() {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };

            let Some(permit) = permit else {
                let result = BatchResult::from_outcome(
                    operation.id.clone(),
                    Err(CfError::Cancelled),
                    Duration::ZERO,
                );
                finalize(&operation, &result);
                slots[index] = Some(result);
                continue;
            };

            let registry = self.registry.clone();
            let cancel = cancel.clone();
            let timeout = self.operation_timeout;
            let task_operation = operation.clone();

            let handle = tasks.spawn(async move {
                let start = Instant::now();
                let outcome = run_operation(&registry, &task_operation, &cancel, timeout).await;
                drop(permit);
                BatchResult::from_outcome(task_operation.id.clone(), outcome, start.elapsed())
            });
            pending.insert(handle.id(), (index, operation));
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            let (task_id, result) = match joined {
                Ok((task_id, result)) => (task_id, result),
                Err(e) => {
                    let task_id = e.id();
                    let id = pending
                        .get(&task_id)
                        .map(|(_, operation)| operation.id.clone())
                        .unwrap_or_default();
                    let failed = BatchResult::from_outcome(
                        id,
                        Err(BatchError::TaskFailed {
                            message: e.to_string(),
                        }
                        .into()),
                        Duration::ZERO,
                    );
                    (task_id, failed)
                }
            };

            if let Some((index, operation)) = pending.remove(&task_id) {
                finalize(&operation, &result);
                slots[index] = Some(result);
            }
        }

        let results: Vec<BatchResult> = slots
            .into_iter()
            .flatten()
            .collect();

        let failed = results.iter().filter(|r| !r.success).count();
        tracing::info!(
            operations = total,
            failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Batch complete"
        );

        results
    }
}

async fn run_operation(
    registry: &ResourceRegistry,
    operation: &BatchOperation,
    cancel: &CancellationToken,
    timeout: Duration,
) -> CfResult<serde_json::Value> {
    tracing::debug!(
        id = %operation.id,
        operation = %operation.operation,
        resource_type = %operation.resource_type,
        "Batch operation started"
    );

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(CfError::Cancelled),
        outcome = tokio::time::timeout(timeout, registry.dispatch(operation, cancel)) => {
            outcome.unwrap_or_else(|_| Err(BatchError::Timeout { timeout }.into()))
        }
    }
}

fn finalize(operation: &BatchOperation, result: &BatchResult) {
    match &result.error {
        Some(error) => tracing::warn!(
            id = %result.id,
            resource_type = %operation.resource_type,
            error = %error,
            "Batch operation failed"
        ),
        None => tracing::debug!(
            id = %result.id,
            duration_ms = result.duration.as_millis() as u64,
            "Batch operation succeeded"
        ),
    }

    if let Some(callback) = &operation.callback {
        callback(result);
    }
}
