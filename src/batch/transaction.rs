//! Transactional batches with best-effort rollback.
//!
//! Only `create` can be undone (by deleting what was created). Successful
//! updates and deletes are reported as not reversible and left in place.

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::{BatchExecutor, BatchOperation, BatchResult, OperationType};
use crate::error::{CfError, CfResult};

/// Result of a transactional batch.
#[derive(Debug)]
pub struct TransactionOutcome {
    /// One result per operation, in input order.
    pub results: Vec<BatchResult>,
    /// Ids of create operations whose resource was deleted again.
    pub rolled_back: Vec<String>,
    /// Create operations whose rollback delete failed.
    pub rollback_failures: Vec<(String, CfError)>,
    /// Ids of successful update/delete operations that were left in place.
    pub not_reversible: Vec<String>,
    /// [`CfError::TransactionFailed`] when any operation failed.
    pub error: Option<CfError>,
}

impl TransactionOutcome {
    pub fn is_committed(&self) -> bool {
        self.error.is_none()
    }

    /// Results on success, the aggregate error otherwise.
    pub fn into_result(self) -> CfResult<Vec<BatchResult>> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.results),
        }
    }
}

/// Wraps a [`BatchExecutor`]: when any operation fails, resources created by
/// the batch are deleted again.
pub struct BatchTransaction {
    executor: BatchExecutor,
    rollback: bool,
}

impl BatchTransaction {
    pub fn new(executor: BatchExecutor) -> Self {
        Self {
            executor,
            rollback: true,
        }
    }

    pub fn with_rollback(mut self, enabled: bool) -> Self {
        self.rollback = enabled;
        self
    }

    pub fn executor(&self) -> &BatchExecutor {
        &self.executor
    }

    pub async fn execute(
        &self,
        cancel: &CancellationToken,
        operations: Vec<BatchOperation>,
    ) -> TransactionOutcome {
        let plan: Vec<(OperationType, String)> = operations
            .iter()
            .map(|op| (op.operation.clone(), op.resource_type.clone()))
            .collect();

        let results = self.executor.execute(cancel, operations).await;

        let failed_ids: Vec<String> = results
            .iter()
            .filter(|r| !r.success)
            .map(|r| r.id.clone())
            .collect();

        let mut outcome = TransactionOutcome {
            results,
            rolled_back: Vec::new(),
            rollback_failures: Vec::new(),
            not_reversible: Vec::new(),
            error: None,
        };

        if failed_ids.is_empty() {
            return outcome;
        }

        if self.rollback {
            self.roll_back(&plan, &mut outcome).await;
        }

        tracing::warn!(
            failed = ?failed_ids,
            rolled_back = outcome.rolled_back.len(),
            rollback_failures = outcome.rollback_failures.len(),
            not_reversible = outcome.not_reversible.len(),
            "Batch transaction failed"
        );

        outcome.error = Some(CfError::TransactionFailed {
            failed_ids,
            rolled_back: outcome.rolled_back.clone(),
            not_reversible: outcome.not_reversible.clone(),
        });
        outcome
    }

    /// Delete created resources, newest first. Rollback is not cancelled
    /// with the batch.
    async fn roll_back(&self, plan: &[(OperationType, String)], outcome: &mut TransactionOutcome) {
        let cancel = CancellationToken::new();
        let registry = self.executor.registry();

        for ((operation, resource_type), result) in plan.iter().zip(&outcome.results).rev() {
            if !result.success {
                continue;
            }

            match operation {
                OperationType::Create => {
                    let Some(guid) = result.resource_guid() else {
                        outcome.rollback_failures.push((
                            result.id.clone(),
                            crate::error::BatchError::InvalidPayload {
                                message: "created resource has no guid".to_string(),
                            }
                            .into(),
                        ));
                        continue;
                    };

                    let undo = BatchOperation::new(
                        format!("rollback-{}", result.id),
                        OperationType::Delete,
                        resource_type.clone(),
                        Value::from(guid),
                    );
                    match registry.dispatch(&undo, &cancel).await {
                        Ok(_) => {
                            tracing::info!(id = %result.id, guid, "Rolled back created resource");
                            outcome.rolled_back.push(result.id.clone());
                        }
                        Err(e) => {
                            tracing::error!(id = %result.id, guid, error = %e, "Rollback failed");
                            outcome.rollback_failures.push((result.id.clone(), e));
                        }
                    }
                }
                OperationType::Update | OperationType::Delete => {
                    outcome.not_reversible.push(result.id.clone());
                }
                OperationType::Get | OperationType::Other(_) => {}
            }
        }

        outcome.rolled_back.reverse();
        outcome.rollback_failures.reverse();
        outcome.not_reversible.reverse();
    }
}
