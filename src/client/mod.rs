//! Client-side value-type handles: `Client`, `Admin`, `Database`,
//! `Collection`, and `AsyncRequest`.
//!
//! Every handle is a thin, cheaply-cloneable facade over an
//! [`RpcEngine`](crate::provider::RpcEngine); state (the engine
//! reference, the endpoint, names) is shared by reference count, never
//! duplicated.

pub mod admin;
pub mod async_request;
pub mod collection;
pub mod database;

pub use admin::Admin;
pub use async_request::AsyncRequest;
pub use collection::Collection;
pub use database::Database;

use std::sync::Arc;

use crate::provider::rpc::{Endpoint, RpcEngine};

/// Owns the RPC engine reference every other client-side handle is
/// built from.
#[derive(Clone)]
pub struct Client {
    engine: Arc<dyn RpcEngine>,
}

impl Client {
    pub fn new(engine: Arc<dyn RpcEngine>) -> Self {
        Client { engine }
    }

    pub fn engine(&self) -> Arc<dyn RpcEngine> {
        self.engine.clone()
    }

    /// Open a handle to a database hosted at `address`/`provider_id`.
    /// When `check` is true, verifies the database exists before
    /// returning; when false, the existence check is skipped and the
    /// returned handle may point at nothing.
    pub async fn open(
        &self,
        address: impl Into<String>,
        provider_id: u16,
        name: impl Into<String>,
        check: bool,
    ) -> crate::error::Result<Database> {
        let endpoint = Endpoint {
            address: address.into(),
            provider_id,
        };
        let name = name.into();
        if check {
            let response = self
                .engine
                .call(
                    &endpoint,
                    "sonata_open_database",
                    serde_json::json!({"db_name": name}),
                )
                .await?;
            let exists: bool = crate::client::database::unwrap_envelope(response)?;
            if !exists {
                return Err(crate::error::Error::NotFound(format!(
                    "no such database '{name}'"
                )));
            }
        }
        Ok(Database::new(self.engine.clone(), endpoint, name))
    }

    pub fn admin(&self, token: Option<String>) -> Admin {
        Admin::new(self.engine.clone(), token)
    }
}
