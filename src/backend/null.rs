//! A backend that accepts every write and reports nothing back. Used in
//! benchmarking and as a placeholder inner backend for decorator tests
//! where the actual stored content is irrelevant.

use std::collections::HashSet;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::backend::{Backend, BatchBools, BatchIds, BatchRecords};
use crate::error::{Error, Result};
use crate::record::RecordId;

#[derive(Default)]
pub struct NullBackend {
    collections: Mutex<HashSet<String>>,
}

impl NullBackend {
    pub fn new() -> Self {
        NullBackend::default()
    }

    fn require(&self, name: &str) -> Result<()> {
        if self.collections.lock().contains(name) {
            Ok(())
        } else {
            Err(Error::NotFound(format!("no such collection '{name}'")))
        }
    }
}

#[async_trait]
impl Backend for NullBackend {
    async fn create_collection(&self, name: &str) -> Result<bool> {
        let mut colls = self.collections.lock();
        if !colls.insert(name.to_string()) {
            return Err(Error::AlreadyExists(format!("collection '{name}' already exists")));
        }
        Ok(true)
    }

    async fn open_collection(&self, name: &str) -> Result<bool> {
        self.require(name)?;
        Ok(true)
    }

    async fn drop_collection(&self, name: &str) -> Result<bool> {
        if !self.collections.lock().remove(name) {
            return Err(Error::NotFound(format!("no such collection '{name}'")));
        }
        Ok(true)
    }

    async fn store(&self, coll: &str, _record: Value, _commit: bool) -> Result<RecordId> {
        self.require(coll)?;
        Ok(0)
    }

    async fn store_multi(&self, coll: &str, records: Vec<Value>, _commit: bool) -> Result<BatchIds> {
        self.require(coll)?;
        Ok(vec![0; records.len()])
    }

    async fn fetch(&self, coll: &str, _id: RecordId) -> Result<Value> {
        self.require(coll)?;
        Err(Error::NotFound("null backend stores nothing".into()))
    }

    async fn fetch_multi(&self, coll: &str, ids: &[RecordId]) -> Result<BatchRecords> {
        self.require(coll)?;
        Ok(vec![crate::record::missing_sentinel(); ids.len()])
    }

    async fn filter(&self, coll: &str, _predicate: &str) -> Result<BatchRecords> {
        self.require(coll)?;
        Ok(Vec::new())
    }

    async fn update(&self, coll: &str, _id: RecordId, _record: Value, _commit: bool) -> Result<bool> {
        self.require(coll)?;
        Ok(false)
    }

    async fn update_multi(
        &self,
        coll: &str,
        ids: &[RecordId],
        _records: Vec<Value>,
        _commit: bool,
    ) -> Result<BatchBools> {
        self.require(coll)?;
        Ok(vec![false; ids.len()])
    }

    async fn all(&self, coll: &str) -> Result<BatchRecords> {
        self.require(coll)?;
        Ok(Vec::new())
    }

    async fn last_id(&self, coll: &str) -> Result<RecordId> {
        self.require(coll)?;
        Err(Error::Empty(format!("collection '{coll}' has never stored a record")))
    }

    async fn size(&self, coll: &str) -> Result<u64> {
        self.require(coll)?;
        Ok(0)
    }

    async fn erase(&self, coll: &str, _id: RecordId, _commit: bool) -> Result<bool> {
        self.require(coll)?;
        Ok(false)
    }

    async fn erase_multi(&self, coll: &str, _ids: &[RecordId], _commit: bool) -> Result<bool> {
        self.require(coll)?;
        Ok(false)
    }

    async fn execute(
        &self,
        _code: &str,
        _vars: &[String],
        _commit: bool,
    ) -> Result<serde_json::Map<String, Value>> {
        Err(Error::Unsupported("null backend does not support execute".into()))
    }

    async fn commit(&self) -> Result<bool> {
        Ok(true)
    }

    async fn destroy(&self) -> Result<bool> {
        self.collections.lock().clear();
        Ok(true)
    }

    async fn get_config(&self) -> Result<Value> {
        Ok(serde_json::json!({}))
    }
}
