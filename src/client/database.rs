//! `Database`: holds address + provider-id + name; exposes collection
//! lifecycle and server-side `execute`.

use std::sync::Arc;

use serde_json::Value;

use crate::descriptor::DatabaseDescriptor;
use crate::envelope::RequestResult;
use crate::error::Result;
use crate::provider::rpc::{Endpoint, RpcEngine};

/// Unwrap a `RequestResult<T>` that arrived as a raw `Value` from an
/// `RpcEngine` call.
pub(crate) fn unwrap_envelope<T: serde::de::DeserializeOwned>(response: Value) -> Result<T> {
    let envelope: RequestResult<T> = serde_json::from_value(response)?;
    envelope.into_result()
}

#[derive(Clone)]
pub struct Database {
    engine: Arc<dyn RpcEngine>,
    endpoint: Endpoint,
    name: String,
}

impl Database {
    pub(crate) fn new(engine: Arc<dyn RpcEngine>, endpoint: Endpoint, name: String) -> Self {
        Database { engine, endpoint, name }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptor(&self) -> DatabaseDescriptor {
        DatabaseDescriptor::new(self.endpoint.address.clone(), self.endpoint.provider_id, self.name.clone())
    }

    async fn call<T: serde::de::DeserializeOwned>(&self, op: &str, args: Value) -> Result<T> {
        let response = self.engine.call(&self.endpoint, op, args).await?;
        unwrap_envelope(response)
    }

    pub async fn create_collection(&self, name: &str) -> Result<bool> {
        self.call(
            "sonata_create_collection",
            serde_json::json!({"db_name": self.name, "coll_name": name}),
        )
        .await
    }

    pub async fn open_collection(&self, name: &str) -> Result<bool> {
        self.call(
            "sonata_open_collection",
            serde_json::json!({"db_name": self.name, "coll_name": name}),
        )
        .await
    }

    pub async fn exists(&self, name: &str) -> bool {
        self.open_collection(name).await.unwrap_or(false)
    }

    pub async fn drop_collection(&self, name: &str) -> Result<bool> {
        self.call(
            "sonata_drop_collection",
            serde_json::json!({"db_name": self.name, "coll_name": name}),
        )
        .await
    }

    pub fn collection(&self, name: &str) -> super::Collection {
        super::Collection::new(self.clone(), name.to_string())
    }

    /// Run server-side script `code` against this database, returning
    /// the requested variables.
    pub async fn execute(
        &self,
        code: &str,
        vars: &[String],
        commit: bool,
    ) -> Result<serde_json::Map<String, Value>> {
        self.call(
            "sonata_exec_on_database",
            serde_json::json!({"db_name": self.name, "code": code, "vars": vars, "commit": commit}),
        )
        .await
    }

    pub(crate) fn engine(&self) -> Arc<dyn RpcEngine> {
        self.engine.clone()
    }

    pub(crate) fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}
