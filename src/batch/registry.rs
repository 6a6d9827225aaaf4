//! Resource dispatch for batch operations.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::{BatchOperation, OperationType};
use crate::client::CfClient;
use crate::core::HttpMethod;
use crate::error::{BatchError, CfError, CfResult};
use crate::interceptor::{Request, Response};

fn unsupported(resource: &str, operation: OperationType) -> CfError {
    BatchError::UnsupportedOperation {
        operation: operation.to_string(),
        resource: resource.to_string(),
    }
    .into()
}

/// CRUD adapter for one resource type. Verbs a resource does not support
/// keep the default implementation, which fails with
/// [`BatchError::UnsupportedOperation`].
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    /// Resource tag this handler serves (e.g. `app`).
    fn resource_type(&self) -> &str;

    async fn create(&self, _payload: &Value, _cancel: &CancellationToken) -> CfResult<Value> {
        Err(unsupported(self.resource_type(), OperationType::Create))
    }

    async fn update(&self, _payload: &Value, _cancel: &CancellationToken) -> CfResult<Value> {
        Err(unsupported(self.resource_type(), OperationType::Update))
    }

    async fn delete(&self, _payload: &Value, _cancel: &CancellationToken) -> CfResult<Value> {
        Err(unsupported(self.resource_type(), OperationType::Delete))
    }

    async fn get(&self, _payload: &Value, _cancel: &CancellationToken) -> CfResult<Value> {
        Err(unsupported(self.resource_type(), OperationType::Get))
    }
}

/// Guid addressed by a payload: the payload itself when it is a string,
/// otherwise its `guid` field.
pub fn resource_guid(payload: &Value) -> CfResult<&str> {
    let guid = match payload {
        Value::String(guid) => Some(guid.as_str()),
        Value::Object(fields) => fields.get("guid").and_then(Value::as_str),
        _ => None,
    };

    guid.filter(|g| !g.is_empty()).ok_or_else(|| {
        BatchError::InvalidPayload {
            message: "payload does not name a resource guid".to_string(),
        }
        .into()
    })
}

/// Maps resource tags to their handlers.
#[derive(Clone, Default)]
pub struct ResourceRegistry {
    handlers: HashMap<String, Arc<dyn ResourceHandler>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry of the Cloud Controller v3 resources the batch vocabulary
    /// covers. Stacks are read-only.
    pub fn cloud_foundry(client: Arc<CfClient>) -> Self {
        let resources = [
            ("app", "/v3/apps"),
            ("space", "/v3/spaces"),
            ("organization", "/v3/organizations"),
            ("route", "/v3/routes"),
            ("service_instance", "/v3/service_instances"),
            ("domain", "/v3/domains"),
            ("service_credential_binding", "/v3/service_credential_bindings"),
        ];

        let mut registry = Self::new();
        for (resource_type, collection) in resources {
            registry.register(Arc::new(RestResourceHandler::new(
                resource_type,
                collection,
                client.clone(),
            )));
        }
        registry.register(Arc::new(
            RestResourceHandler::new("stack", "/v3/stacks", client).read_only(),
        ));
        registry
    }

    /// Register a handler, replacing any previous one for the same tag.
    pub fn register(&mut self, handler: Arc<dyn ResourceHandler>) -> &mut Self {
        self.handlers
            .insert(handler.resource_type().to_string(), handler);
        self
    }

    pub fn with_handler(mut self, handler: Arc<dyn ResourceHandler>) -> Self {
        self.register(handler);
        self
    }

    pub fn get(&self, resource_type: &str) -> Option<&Arc<dyn ResourceHandler>> {
        self.handlers.get(resource_type)
    }

    pub fn contains(&self, resource_type: &str) -> bool {
        self.handlers.contains_key(resource_type)
    }

    /// Registered tags, sorted.
    pub fn resource_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Run one operation against its handler.
    pub async fn dispatch(
        &self,
        operation: &BatchOperation,
        cancel: &CancellationToken,
    ) -> CfResult<Value> {
        let handler = self.get(&operation.resource_type).ok_or_else(|| {
            CfError::from(BatchError::UnsupportedResource {
                resource: operation.resource_type.clone(),
            })
        })?;

        match &operation.operation {
            OperationType::Create => handler.create(&operation.payload, cancel).await,
            OperationType::Update => handler.update(&operation.payload, cancel).await,
            OperationType::Delete => handler.delete(&operation.payload, cancel).await,
            OperationType::Get => handler.get(&operation.payload, cancel).await,
            other => Err(unsupported(&operation.resource_type, other.clone())),
        }
    }
}

/// Handler that drives a `/v3/<collection>` resource through [`CfClient`].
pub struct RestResourceHandler {
    resource_type: String,
    collection: String,
    client: Arc<CfClient>,
    read_only: bool,
}

impl RestResourceHandler {
    pub fn new(
        resource_type: impl Into<String>,
        collection: impl Into<String>,
        client: Arc<CfClient>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            collection: collection.into(),
            client,
            read_only: false,
        }
    }

    /// Only `get` is supported.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn member_path(&self, guid: &str) -> String {
        format!("{}/{}", self.collection, guid)
    }

    fn check_writable(&self, operation: OperationType) -> CfResult<()> {
        if self.read_only {
            return Err(unsupported(&self.resource_type, operation));
        }
        Ok(())
    }

    async fn send(&self, request: Request, cancel: &CancellationToken) -> CfResult<Response> {
        self.client.execute(request.with_cancel(cancel.clone())).await
    }
}

fn body_value(response: &Response) -> CfResult<Value> {
    if response.body.is_empty() {
        return Ok(Value::Null);
    }
    response.json()
}

#[async_trait]
impl ResourceHandler for RestResourceHandler {
    fn resource_type(&self) -> &str {
        &self.resource_type
    }

    async fn create(&self, payload: &Value, cancel: &CancellationToken) -> CfResult<Value> {
        self.check_writable(OperationType::Create)?;
        let request = Request::new(HttpMethod::Post, self.collection.as_str()).with_json(payload)?;
        let response = self.send(request, cancel).await?;
        body_value(&response)
    }

    async fn update(&self, payload: &Value, cancel: &CancellationToken) -> CfResult<Value> {
        self.check_writable(OperationType::Update)?;
        let guid = resource_guid(payload)?;

        let mut body = payload.clone();
        if let Some(fields) = body.as_object_mut() {
            fields.remove("guid");
        }

        let request = Request::new(HttpMethod::Patch, self.member_path(guid)).with_json(&body)?;
        let response = self.send(request, cancel).await?;
        body_value(&response)
    }

    async fn delete(&self, payload: &Value, cancel: &CancellationToken) -> CfResult<Value> {
        self.check_writable(OperationType::Delete)?;
        let guid = resource_guid(payload)?;

        let request = Request::new(HttpMethod::Delete, self.member_path(guid));
        let response = self.send(request, cancel).await?;

        // Deletes are asynchronous; the job link is in `Location`.
        Ok(match response.header("location") {
            Some(job) => json!({ "guid": guid, "job": job }),
            None => json!({ "guid": guid }),
        })
    }

    async fn get(&self, payload: &Value, cancel: &CancellationToken) -> CfResult<Value> {
        let guid = resource_guid(payload)?;
        let response = self.send(Request::get(self.member_path(guid)), cancel).await?;
        body_value(&response)
    }
}
