//! `Admin`: the admin-operation facade — create/attach/detach/destroy a
//! database, guarded by the shared token.

use std::sync::Arc;

use serde_json::Value;

use crate::client::database::unwrap_envelope;
use crate::error::Result;
use crate::provider::rpc::{Endpoint, RpcEngine};

#[derive(Clone)]
pub struct Admin {
    engine: Arc<dyn RpcEngine>,
    token: Option<String>,
}

impl Admin {
    pub(crate) fn new(engine: Arc<dyn RpcEngine>, token: Option<String>) -> Self {
        Admin { engine, token }
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &Endpoint,
        op: &str,
        mut args: serde_json::Map<String, Value>,
    ) -> Result<T> {
        if let Some(token) = &self.token {
            args.insert("token".into(), Value::String(token.clone()));
        }
        let response = self.engine.call(endpoint, op, Value::Object(args)).await?;
        unwrap_envelope(response)
    }

    pub async fn create_database(
        &self,
        address: impl Into<String>,
        provider_id: u16,
        name: impl Into<String>,
        kind: impl Into<String>,
        config: Value,
    ) -> Result<bool> {
        let endpoint = Endpoint { address: address.into(), provider_id };
        let args = serde_json::json!({"db_name": name.into(), "type": kind.into(), "config": config});
        self.call(&endpoint, "sonata_create_database", args.as_object().unwrap().clone())
            .await
    }

    pub async fn attach_database(
        &self,
        address: impl Into<String>,
        provider_id: u16,
        name: impl Into<String>,
        kind: impl Into<String>,
        config: Value,
    ) -> Result<bool> {
        let endpoint = Endpoint { address: address.into(), provider_id };
        let args = serde_json::json!({"db_name": name.into(), "type": kind.into(), "config": config});
        self.call(&endpoint, "sonata_attach_database", args.as_object().unwrap().clone())
            .await
    }

    pub async fn detach_database(
        &self,
        address: impl Into<String>,
        provider_id: u16,
        name: impl Into<String>,
    ) -> Result<bool> {
        let endpoint = Endpoint { address: address.into(), provider_id };
        let args = serde_json::json!({"db_name": name.into()});
        self.call(&endpoint, "sonata_detach_database", args.as_object().unwrap().clone())
            .await
    }

    pub async fn destroy_database(
        &self,
        address: impl Into<String>,
        provider_id: u16,
        name: impl Into<String>,
    ) -> Result<bool> {
        let endpoint = Endpoint { address: address.into(), provider_id };
        let args = serde_json::json!({"db_name": name.into()});
        self.call(&endpoint, "sonata_destroy_database", args.as_object().unwrap().clone())
            .await
    }
}
