//! Batch execution of heterogeneous CRUD operations.
//!
//! A batch is a list of [`BatchOperation`]s, each naming a verb and a resource
//! type. The [`BatchExecutor`] dispatches them through a [`ResourceRegistry`]
//! with bounded parallelism and returns one [`BatchResult`] per operation, in
//! input order. [`BatchTransaction`] adds best-effort rollback of created
//! resources.

mod executor;
mod registry;
mod transaction;

pub use executor::BatchExecutor;
pub use registry::{resource_guid, ResourceHandler, ResourceRegistry, RestResourceHandler};
pub use transaction::{BatchTransaction, TransactionOutcome};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::client::CfClient;
use crate::error::{CfError, CfResult};

/// Verb of a batch operation.
///
/// Unrecognised verbs parse as [`OperationType::Other`] so one bad entry only
/// fails its own result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OperationType {
    Create,
    Update,
    Delete,
    Get,
    Other(String),
}

impl OperationType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Get => "get",
            Self::Other(verb) => verb,
        }
    }
}

impl From<String> for OperationType {
    fn from(verb: String) -> Self {
        match verb.as_str() {
            "create" => Self::Create,
            "update" => Self::Update,
            "delete" => Self::Delete,
            "get" => Self::Get,
            _ => Self::Other(verb),
        }
    }
}

impl From<OperationType> for String {
    fn from(operation: OperationType) -> Self {
        match operation {
            OperationType::Other(verb) => verb,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Completion callback, invoked once with the finalized result.
pub type BatchCallback = Arc<dyn Fn(&BatchResult) + Send + Sync>;

/// One unit of work in a batch.
///
/// The payload shape depends on the verb: the request body for `create`, the
/// body plus a `guid` field for `update`, and the guid (or an object with a
/// `guid` field) for `get` and `delete`.
#[derive(Clone, Serialize, Deserialize)]
pub struct BatchOperation {
    pub id: String,
    pub operation: OperationType,
    pub resource_type: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(skip)]
    pub callback: Option<BatchCallback>,
}

impl BatchOperation {
    pub fn new(
        id: impl Into<String>,
        operation: OperationType,
        resource_type: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            id: id.into(),
            operation,
            resource_type: resource_type.into(),
            payload,
            callback: None,
        }
    }

    pub fn create(id: impl Into<String>, resource_type: impl Into<String>, payload: Value) -> Self {
        Self::new(id, OperationType::Create, resource_type, payload)
    }

    pub fn update(id: impl Into<String>, resource_type: impl Into<String>, payload: Value) -> Self {
        Self::new(id, OperationType::Update, resource_type, payload)
    }

    pub fn delete(id: impl Into<String>, resource_type: impl Into<String>, guid: &str) -> Self {
        Self::new(id, OperationType::Delete, resource_type, Value::from(guid))
    }

    pub fn get(id: impl Into<String>, resource_type: impl Into<String>, guid: &str) -> Self {
        Self::new(id, OperationType::Get, resource_type, Value::from(guid))
    }

    pub fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&BatchResult) + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(callback));
        self
    }
}

impl fmt::Debug for BatchOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchOperation")
            .field("id", &self.id)
            .field("operation", &self.operation)
            .field("resource_type", &self.resource_type)
            .field("payload", &self.payload)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

/// Parse a batch from its JSON form, a list of operations.
pub fn parse_operations(json: &str) -> CfResult<Vec<BatchOperation>> {
    serde_json::from_str(json).map_err(|e| {
        crate::error::BatchError::InvalidPayload {
            message: e.to_string(),
        }
        .into()
    })
}

/// Outcome of one batch operation.
#[derive(Debug)]
pub struct BatchResult {
    /// Id of the originating operation.
    pub id: String,
    pub success: bool,
    /// Response body of the operation, if any.
    pub data: Option<Value>,
    pub error: Option<CfError>,
    pub duration: Duration,
}

impl BatchResult {
    pub fn from_outcome(id: impl Into<String>, outcome: CfResult<Value>, duration: Duration) -> Self {
        match outcome {
            Ok(data) => Self {
                id: id.into(),
                success: true,
                data: Some(data),
                error: None,
                duration,
            },
            Err(error) => Self {
                id: id.into(),
                success: false,
                data: None,
                error: Some(error),
                duration,
            },
        }
    }

    /// Guid of the resource the operation returned, if any.
    pub fn resource_guid(&self) -> Option<&str> {
        self.data.as_ref()?.get("guid")?.as_str()
    }
}

/// Executor over the Cloud Foundry resource registry, sized from the
/// client's batch configuration.
pub fn create_batch_executor(client: Arc<CfClient>) -> BatchExecutor {
    let config = client.config().batch.clone();
    BatchExecutor::new(Arc::new(ResourceRegistry::cloud_foundry(client)), &config)
}

/// Transactional wrapper over [`create_batch_executor`].
pub fn create_batch_transaction(client: Arc<CfClient>) -> BatchTransaction {
    let rollback = client.config().batch.rollback_on_failure;
    BatchTransaction::new(create_batch_executor(client)).with_rollback(rollback)
}
