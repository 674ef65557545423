//! The `RpcEngine` abstraction and its one concrete, in-process
//! implementation.
//!
//! The choice of underlying network transport is deliberately out of
//! scope for the core; this trait is the minimum surface client handles
//! and the scripting bridge need to reach a [`Provider`] by address and
//! provider id, in-process or otherwise.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use crate::envelope::RequestResult;
use crate::error::{Error, Result};
use crate::provider::Provider;

/// Identifies one `Provider` instance reachable over the fleet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Endpoint {
    pub address: String,
    pub provider_id: u16,
}

/// Dispatches a named operation with serialized JSON arguments to a
/// target provider and returns its `RequestResult`-shaped response.
///
/// Implementations are expected to be cheap to clone (an `Arc` or a
/// connection-pool handle) since every client handle holds one.
#[async_trait]
pub trait RpcEngine: Send + Sync {
    async fn call(&self, endpoint: &Endpoint, op: &str, args: Value) -> Result<Value>;
}

/// An in-process `RpcEngine` that dispatches directly to co-located
/// [`Provider`]s registered in a process-wide table keyed by endpoint.
/// This is enough to exercise `Client`/`Database`/`Collection` and the
/// scripting bridge's cross-database calls without a real network stack.
#[derive(Clone, Default)]
pub struct LocalRpcEngine {
    providers: Arc<RwLock<HashMap<Endpoint, Arc<Provider>>>>,
}

impl LocalRpcEngine {
    pub fn new() -> Self {
        LocalRpcEngine::default()
    }

    pub fn register(&self, endpoint: Endpoint, provider: Arc<Provider>) {
        self.providers.write().insert(endpoint, provider);
    }

    pub fn unregister(&self, endpoint: &Endpoint) {
        self.providers.write().remove(endpoint);
    }

    fn provider_for(&self, endpoint: &Endpoint) -> Result<Arc<Provider>> {
        self.providers
            .read()
            .get(endpoint)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("no provider registered at {}:{}", endpoint.address, endpoint.provider_id)))
    }
}

#[async_trait]
impl RpcEngine for LocalRpcEngine {
    async fn call(&self, endpoint: &Endpoint, op: &str, args: Value) -> Result<Value> {
        let provider = self.provider_for(endpoint)?;
        crate::provider::rpc::dispatch(&provider, op, args).await
    }
}

/// Routes one wire-level operation name (as used in §6's RPC table) to
/// the matching `Provider` method, returning the response pre-wrapped in
/// a `RequestResult` envelope serialized to `Value`.
pub(crate) async fn dispatch(provider: &Provider, op: &str, args: Value) -> Result<Value> {
    let args = args
        .as_object()
        .ok_or_else(|| Error::Invalid("rpc arguments must be a JSON object".into()))?;

    macro_rules! envelope {
        ($result:expr) => {{
            let r: RequestResult<_> = $result.into();
            return serde_json::to_value(r).map_err(Error::from);
        }};
    }

    fn str_arg<'a>(args: &'a serde_json::Map<String, Value>, key: &str) -> Result<&'a str> {
        args.get(key)
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Invalid(format!("missing string argument '{key}'")))
    }

    fn u64_arg(args: &serde_json::Map<String, Value>, key: &str) -> Result<u64> {
        args.get(key)
            .and_then(Value::as_u64)
            .ok_or_else(|| Error::Invalid(format!("missing numeric argument '{key}'")))
    }

    fn bool_arg(args: &serde_json::Map<String, Value>, key: &str) -> bool {
        args.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    fn ids_arg(args: &serde_json::Map<String, Value>, key: &str) -> Result<Vec<u64>> {
        args.get(key)
            .and_then(Value::as_array)
            .ok_or_else(|| Error::Invalid(format!("missing array argument '{key}'")))?
            .iter()
            .map(|v| v.as_u64().ok_or_else(|| Error::Invalid("id must be a u64".into())))
            .collect()
    }

    match op {
        "sonata_create_database" => {
            let token = args.get("token").and_then(Value::as_str);
            let name = str_arg(args, "db_name")?;
            let kind = str_arg(args, "type")?;
            let config = args.get("config").cloned().unwrap_or(Value::Object(Default::default()));
            envelope!(provider.create_database(token, name, kind, config).await)
        }
        "sonata_attach_database" => {
            let token = args.get("token").and_then(Value::as_str);
            let name = str_arg(args, "db_name")?;
            let kind = str_arg(args, "type")?;
            let config = args.get("config").cloned().unwrap_or(Value::Object(Default::default()));
            envelope!(provider.attach_database(token, name, kind, config).await)
        }
        "sonata_detach_database" => {
            let token = args.get("token").and_then(Value::as_str);
            let name = str_arg(args, "db_name")?;
            envelope!(provider.detach_database(token, name).await)
        }
        "sonata_destroy_database" => {
            let token = args.get("token").and_then(Value::as_str);
            let name = str_arg(args, "db_name")?;
            envelope!(provider.destroy_database(token, name).await)
        }
        "sonata_open_database" => {
            let name = str_arg(args, "db_name")?;
            envelope!(Ok::<_, Error>(provider.exists(name)))
        }
        "sonata_create_collection" => {
            let db = str_arg(args, "db_name")?;
            let coll = str_arg(args, "coll_name")?;
            envelope!(provider.create_collection(db, coll).await)
        }
        "sonata_open_collection" => {
            let db = str_arg(args, "db_name")?;
            let coll = str_arg(args, "coll_name")?;
            envelope!(provider.open_collection(db, coll).await)
        }
        "sonata_drop_collection" => {
            let db = str_arg(args, "db_name")?;
            let coll = str_arg(args, "coll_name")?;
            envelope!(provider.drop_collection(db, coll).await)
        }
        "sonata_store" | "sonata_store_json" => {
            let db = str_arg(args, "db_name")?;
            let coll = str_arg(args, "coll_name")?;
            let record = args.get("record").cloned().unwrap_or(Value::Null);
            let commit = bool_arg(args, "commit");
            envelope!(provider.store(db, coll, record, commit).await)
        }
        "sonata_store_multi" | "sonata_store_multi_json" => {
            let db = str_arg(args, "db_name")?;
            let coll = str_arg(args, "coll_name")?;
            let records = args
                .get("records")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let commit = bool_arg(args, "commit");
            envelope!(provider.store_multi(db, coll, records, commit).await)
        }
        "sonata_fetch" | "sonata_fetch_json" => {
            let db = str_arg(args, "db_name")?;
            let coll = str_arg(args, "coll_name")?;
            let id = u64_arg(args, "id")?;
            envelope!(provider.fetch(db, coll, id).await)
        }
        "sonata_fetch_multi" | "sonata_fetch_multi_json" => {
            let db = str_arg(args, "db_name")?;
            let coll = str_arg(args, "coll_name")?;
            let ids = ids_arg(args, "ids")?;
            envelope!(provider.fetch_multi(db, coll, &ids).await)
        }
        "sonata_filter" | "sonata_filter_json" => {
            let db = str_arg(args, "db_name")?;
            let coll = str_arg(args, "coll_name")?;
            let predicate = str_arg(args, "predicate")?;
            envelope!(provider.filter(db, coll, predicate).await)
        }
        "sonata_update" | "sonata_update_json" => {
            let db = str_arg(args, "db_name")?;
            let coll = str_arg(args, "coll_name")?;
            let id = u64_arg(args, "id")?;
            let record = args.get("record").cloned().unwrap_or(Value::Null);
            let commit = bool_arg(args, "commit");
            envelope!(provider.update(db, coll, id, record, commit).await)
        }
        "sonata_update_multi" | "sonata_update_multi_json" => {
            let db = str_arg(args, "db_name")?;
            let coll = str_arg(args, "coll_name")?;
            let ids = ids_arg(args, "ids")?;
            let records = args
                .get("records")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let commit = bool_arg(args, "commit");
            envelope!(provider.update_multi(db, coll, &ids, records, commit).await)
        }
        "sonata_all" | "sonata_all_json" => {
            let db = str_arg(args, "db_name")?;
            let coll = str_arg(args, "coll_name")?;
            envelope!(provider.all(db, coll).await)
        }
        "sonata_last_id" => {
            let db = str_arg(args, "db_name")?;
            let coll = str_arg(args, "coll_name")?;
            envelope!(provider.last_id(db, coll).await)
        }
        "sonata_size" => {
            let db = str_arg(args, "db_name")?;
            let coll = str_arg(args, "coll_name")?;
            envelope!(provider.size(db, coll).await)
        }
        "sonata_erase" => {
            let db = str_arg(args, "db_name")?;
            let coll = str_arg(args, "coll_name")?;
            let id = u64_arg(args, "id")?;
            let commit = bool_arg(args, "commit");
            envelope!(provider.erase(db, coll, id, commit).await)
        }
        "sonata_erase_multi" => {
            let db = str_arg(args, "db_name")?;
            let coll = str_arg(args, "coll_name")?;
            let ids = ids_arg(args, "ids")?;
            let commit = bool_arg(args, "commit");
            envelope!(provider.erase_multi(db, coll, &ids, commit).await)
        }
        "sonata_exec_on_database" => {
            let db = str_arg(args, "db_name")?;
            let code = str_arg(args, "code")?;
            let vars: Vec<String> = args
                .get("vars")
                .and_then(Value::as_array)
                .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                .unwrap_or_default();
            let commit = bool_arg(args, "commit");
            envelope!(provider.exec_on_database(db, code, &vars, commit).await)
        }
        other => Err(Error::Invalid(format!("unknown RPC operation '{other}'"))),
    }
}
