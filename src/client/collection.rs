//! `Collection`: a named sequence of records inside one database. Every
//! operation has a blocking form returning the value directly and a
//! non-blocking form returning an [`AsyncRequest`] the caller can poll
//! or wait on later.

use serde_json::Value;

use crate::client::async_request::AsyncRequest;
use crate::client::database::unwrap_envelope;
use crate::client::Database;
use crate::error::Result;
use crate::record::RecordId;

#[derive(Clone)]
pub struct Collection {
    database: Database,
    name: String,
}

impl Collection {
    pub(crate) fn new(database: Database, name: String) -> Self {
        Collection { database, name }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Spawn the RPC call on the ambient runtime and return an
    /// `AsyncRequest` that resolves it, running `decode` to produce the
    /// caller's typed value when waited on.
    fn dispatch_async<T>(
        &self,
        op: &'static str,
        args: Value,
        decode: impl FnOnce(Value) -> Result<T> + Send + 'static,
        out: std::sync::Arc<parking_lot::Mutex<Option<T>>>,
    ) -> AsyncRequest
    where
        T: Send + 'static,
    {
        let (request, resolver) = AsyncRequest::new(Box::new(move |raw| {
            let value = decode(raw)?;
            *out.lock() = Some(value);
            Ok(())
        }));
        let engine = self.database.engine();
        let endpoint = self.database.endpoint().clone();
        tokio::spawn(async move {
            let response = engine
                .call(&endpoint, op, args)
                .await
                .unwrap_or_else(|e| serde_json::json!({"ok": false, "error": {"kind": e.kind(), "message": e.to_string()}}));
            resolver.resolve(response);
        });
        request
    }

    async fn call<T: serde::de::DeserializeOwned>(&self, op: &str, args: Value) -> Result<T> {
        let response = self.database.engine().call(self.database.endpoint(), op, args).await?;
        unwrap_envelope(response)
    }

    fn args(&self, extra: serde_json::Map<String, Value>) -> Value {
        let mut map = serde_json::Map::new();
        map.insert("db_name".into(), Value::String(self.database.name().to_string()));
        map.insert("coll_name".into(), Value::String(self.name.clone()));
        map.extend(extra);
        Value::Object(map)
    }

    // --- blocking forms -------------------------------------------------

    pub async fn store(&self, record: Value, commit: bool) -> Result<RecordId> {
        self.call("sonata_store", self.args([("record".into(), record), ("commit".into(), commit.into())].into_iter().collect()))
            .await
    }

    pub async fn store_multi(&self, records: Vec<Value>, commit: bool) -> Result<Vec<RecordId>> {
        self.call(
            "sonata_store_multi",
            self.args([("records".into(), Value::Array(records)), ("commit".into(), commit.into())].into_iter().collect()),
        )
        .await
    }

    pub async fn fetch(&self, id: RecordId) -> Result<Value> {
        self.call("sonata_fetch", self.args([("id".into(), id.into())].into_iter().collect()))
            .await
    }

    pub async fn fetch_multi(&self, ids: &[RecordId]) -> Result<Vec<Value>> {
        self.call(
            "sonata_fetch_multi",
            self.args([("ids".into(), serde_json::to_value(ids)?)].into_iter().collect()),
        )
        .await
    }

    pub async fn filter(&self, predicate: &str) -> Result<Vec<Value>> {
        self.call(
            "sonata_filter",
            self.args([("predicate".into(), Value::String(predicate.to_string()))].into_iter().collect()),
        )
        .await
    }

    pub async fn update(&self, id: RecordId, record: Value, commit: bool) -> Result<bool> {
        self.call(
            "sonata_update",
            self.args([("id".into(), id.into()), ("record".into(), record), ("commit".into(), commit.into())].into_iter().collect()),
        )
        .await
    }

    pub async fn update_multi(&self, ids: &[RecordId], records: Vec<Value>, commit: bool) -> Result<Vec<bool>> {
        self.call(
            "sonata_update_multi",
            self.args(
                [
                    ("ids".into(), serde_json::to_value(ids)?),
                    ("records".into(), Value::Array(records)),
                    ("commit".into(), commit.into()),
                ]
                .into_iter()
                .collect(),
            ),
        )
        .await
    }

    pub async fn all(&self) -> Result<Vec<Value>> {
        self.call("sonata_all", self.args(Default::default())).await
    }

    pub async fn last_id(&self) -> Result<RecordId> {
        self.call("sonata_last_id", self.args(Default::default())).await
    }

    pub async fn size(&self) -> Result<u64> {
        self.call("sonata_size", self.args(Default::default())).await
    }

    pub async fn erase(&self, id: RecordId, commit: bool) -> Result<bool> {
        self.call(
            "sonata_erase",
            self.args([("id".into(), id.into()), ("commit".into(), commit.into())].into_iter().collect()),
        )
        .await
    }

    pub async fn erase_multi(&self, ids: &[RecordId], commit: bool) -> Result<bool> {
        self.call(
            "sonata_erase_multi",
            self.args([("ids".into(), serde_json::to_value(ids)?), ("commit".into(), commit.into())].into_iter().collect()),
        )
        .await
    }

    // --- non-blocking forms ----------------------------------------------

    pub fn store_async(&self, record: Value, commit: bool, out: std::sync::Arc<parking_lot::Mutex<Option<RecordId>>>) -> AsyncRequest {
        let args = self.args([("record".into(), record), ("commit".into(), commit.into())].into_iter().collect());
        self.dispatch_async("sonata_store", args, |raw| unwrap_envelope(raw), out)
    }

    pub fn store_multi_async(
        &self,
        records: Vec<Value>,
        commit: bool,
        out: std::sync::Arc<parking_lot::Mutex<Option<Vec<RecordId>>>>,
    ) -> AsyncRequest {
        let args = self.args([("records".into(), Value::Array(records)), ("commit".into(), commit.into())].into_iter().collect());
        self.dispatch_async("sonata_store_multi", args, |raw| unwrap_envelope(raw), out)
    }

    pub fn fetch_async(&self, id: RecordId, out: std::sync::Arc<parking_lot::Mutex<Option<Value>>>) -> AsyncRequest {
        let args = self.args([("id".into(), id.into())].into_iter().collect());
        self.dispatch_async("sonata_fetch", args, |raw| unwrap_envelope(raw), out)
    }

    pub fn fetch_multi_async(&self, ids: &[RecordId], out: std::sync::Arc<parking_lot::Mutex<Option<Vec<Value>>>>) -> Result<AsyncRequest> {
        let args = self.args([("ids".into(), serde_json::to_value(ids)?)].into_iter().collect());
        Ok(self.dispatch_async("sonata_fetch_multi", args, |raw| unwrap_envelope(raw), out))
    }

    pub fn filter_async(&self, predicate: &str, out: std::sync::Arc<parking_lot::Mutex<Option<Vec<Value>>>>) -> AsyncRequest {
        let args = self.args([("predicate".into(), Value::String(predicate.to_string()))].into_iter().collect());
        self.dispatch_async("sonata_filter", args, |raw| unwrap_envelope(raw), out)
    }

    pub fn update_async(
        &self,
        id: RecordId,
        record: Value,
        commit: bool,
        out: std::sync::Arc<parking_lot::Mutex<Option<bool>>>,
    ) -> AsyncRequest {
        let args = self.args([("id".into(), id.into()), ("record".into(), record), ("commit".into(), commit.into())].into_iter().collect());
        self.dispatch_async("sonata_update", args, |raw| unwrap_envelope(raw), out)
    }

    pub fn update_multi_async(
        &self,
        ids: &[RecordId],
        records: Vec<Value>,
        commit: bool,
        out: std::sync::Arc<parking_lot::Mutex<Option<Vec<bool>>>>,
    ) -> Result<AsyncRequest> {
        let args = self.args(
            [
                ("ids".into(), serde_json::to_value(ids)?),
                ("records".into(), Value::Array(records)),
                ("commit".into(), commit.into()),
            ]
            .into_iter()
            .collect(),
        );
        Ok(self.dispatch_async("sonata_update_multi", args, |raw| unwrap_envelope(raw), out))
    }

    pub fn all_async(&self, out: std::sync::Arc<parking_lot::Mutex<Option<Vec<Value>>>>) -> AsyncRequest {
        self.dispatch_async("sonata_all", self.args(Default::default()), |raw| unwrap_envelope(raw), out)
    }

    pub fn last_id_async(&self, out: std::sync::Arc<parking_lot::Mutex<Option<RecordId>>>) -> AsyncRequest {
        self.dispatch_async("sonata_last_id", self.args(Default::default()), |raw| unwrap_envelope(raw), out)
    }

    pub fn size_async(&self, out: std::sync::Arc<parking_lot::Mutex<Option<u64>>>) -> AsyncRequest {
        self.dispatch_async("sonata_size", self.args(Default::default()), |raw| unwrap_envelope(raw), out)
    }

    pub fn erase_async(&self, id: RecordId, commit: bool, out: std::sync::Arc<parking_lot::Mutex<Option<bool>>>) -> AsyncRequest {
        let args = self.args([("id".into(), id.into()), ("commit".into(), commit.into())].into_iter().collect());
        self.dispatch_async("sonata_erase", args, |raw| unwrap_envelope(raw), out)
    }

    pub fn erase_multi_async(&self, ids: &[RecordId], commit: bool, out: std::sync::Arc<parking_lot::Mutex<Option<bool>>>) -> Result<AsyncRequest> {
        let args = self.args([("ids".into(), serde_json::to_value(ids)?), ("commit".into(), commit.into())].into_iter().collect());
        Ok(self.dispatch_async("sonata_erase_multi", args, |raw| unwrap_envelope(raw), out))
    }
}
