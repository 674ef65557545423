//! The in-memory reference backend. The golden oracle for contract
//! tests: no predicate filtering, no scripted execution, one mutex
//! guarding all collections.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::backend::{Backend, BatchBools, BatchIds, BatchRecords};
use crate::error::{Error, Result};
use crate::record::{self, RecordId};

/// One collection's storage: a dense vector of slots (`None` = tombstone)
/// plus the live count, tracked separately since tombstones keep their
/// slot.
#[derive(Default)]
struct CollectionState {
    slots: Vec<Option<Value>>,
    live: u64,
}

#[derive(Default)]
pub struct VectorBackend {
    collections: Mutex<HashMap<String, CollectionState>>,
}

impl VectorBackend {
    pub fn new() -> Self {
        VectorBackend::default()
    }
}

fn not_found_coll(name: &str) -> Error {
    Error::NotFound(format!("no such collection '{name}'"))
}

#[async_trait]
impl Backend for VectorBackend {
    async fn create_collection(&self, name: &str) -> Result<bool> {
        let mut colls = self.collections.lock();
        if colls.contains_key(name) {
            return Err(Error::AlreadyExists(format!("collection '{name}' already exists")));
        }
        colls.insert(name.to_string(), CollectionState::default());
        Ok(true)
    }

    async fn open_collection(&self, name: &str) -> Result<bool> {
        let colls = self.collections.lock();
        if colls.contains_key(name) {
            Ok(true)
        } else {
            Err(not_found_coll(name))
        }
    }

    async fn drop_collection(&self, name: &str) -> Result<bool> {
        let mut colls = self.collections.lock();
        colls.remove(name).ok_or_else(|| not_found_coll(name))?;
        Ok(true)
    }

    async fn store(&self, coll: &str, record: Value, _commit: bool) -> Result<RecordId> {
        if !record.is_object() {
            return Err(Error::Invalid("record must be a JSON object".into()));
        }
        let mut colls = self.collections.lock();
        let state = colls.get_mut(coll).ok_or_else(|| not_found_coll(coll))?;
        let id = state.slots.len() as RecordId;
        state.slots.push(Some(record::stamp_id(record, id)));
        state.live += 1;
        Ok(id)
    }

    async fn store_multi(&self, coll: &str, records: Vec<Value>, _commit: bool) -> Result<BatchIds> {
        if records.iter().any(|r| !r.is_object()) {
            return Err(Error::Invalid("every record must be a JSON object".into()));
        }
        let mut colls = self.collections.lock();
        let state = colls.get_mut(coll).ok_or_else(|| not_found_coll(coll))?;
        let mut ids = Vec::with_capacity(records.len());
        for record in records {
            let id = state.slots.len() as RecordId;
            state.slots.push(Some(record::stamp_id(record, id)));
            state.live += 1;
            ids.push(id);
        }
        Ok(ids)
    }

    async fn fetch(&self, coll: &str, id: RecordId) -> Result<Value> {
        let colls = self.collections.lock();
        let state = colls.get(coll).ok_or_else(|| not_found_coll(coll))?;
        state
            .slots
            .get(id as usize)
            .and_then(|slot| slot.clone())
            .ok_or_else(|| Error::NotFound(format!("no such record {id}")))
    }

    async fn fetch_multi(&self, coll: &str, ids: &[RecordId]) -> Result<BatchRecords> {
        let colls = self.collections.lock();
        let state = colls.get(coll).ok_or_else(|| not_found_coll(coll))?;
        Ok(ids
            .iter()
            .map(|id| {
                state
                    .slots
                    .get(*id as usize)
                    .and_then(|slot| slot.clone())
                    .unwrap_or_else(record::missing_sentinel)
            })
            .collect())
    }

    async fn filter(&self, _coll: &str, _predicate: &str) -> Result<BatchRecords> {
        Err(Error::Unsupported("vector backend does not support filter".into()))
    }

    async fn update(&self, coll: &str, id: RecordId, record: Value, _commit: bool) -> Result<bool> {
        if !record.is_object() {
            return Err(Error::Invalid("record must be a JSON object".into()));
        }
        let mut colls = self.collections.lock();
        let state = colls.get_mut(coll).ok_or_else(|| not_found_coll(coll))?;
        match state.slots.get_mut(id as usize) {
            Some(slot @ Some(_)) => {
                *slot = Some(record::stamp_id(record, id));
                Ok(true)
            }
            _ => Err(Error::NotFound(format!("no such record {id}"))),
        }
    }

    async fn update_multi(
        &self,
        coll: &str,
        ids: &[RecordId],
        records: Vec<Value>,
        _commit: bool,
    ) -> Result<BatchBools> {
        let mut colls = self.collections.lock();
        let state = colls.get_mut(coll).ok_or_else(|| not_found_coll(coll))?;
        let mut results = Vec::with_capacity(ids.len());
        for (id, record) in ids.iter().zip(records.into_iter()) {
            // updateMultiJson requires each element to be a JSON object;
            // non-objects are reported as `false`, not an error.
            let ok = if record.is_object() {
                match state.slots.get_mut(*id as usize) {
                    Some(slot @ Some(_)) => {
                        *slot = Some(record::stamp_id(record, *id));
                        true
                    }
                    _ => false,
                }
            } else {
                false
            };
            results.push(ok);
        }
        Ok(results)
    }

    async fn all(&self, coll: &str) -> Result<BatchRecords> {
        let colls = self.collections.lock();
        let state = colls.get(coll).ok_or_else(|| not_found_coll(coll))?;
        Ok(state.slots.iter().filter_map(|slot| slot.clone()).collect())
    }

    async fn last_id(&self, coll: &str) -> Result<RecordId> {
        let colls = self.collections.lock();
        let state = colls.get(coll).ok_or_else(|| not_found_coll(coll))?;
        if state.slots.is_empty() {
            Err(Error::Empty(format!("collection '{coll}' has never stored a record")))
        } else {
            Ok(state.slots.len() as RecordId - 1)
        }
    }

    async fn size(&self, coll: &str) -> Result<u64> {
        let colls = self.collections.lock();
        let state = colls.get(coll).ok_or_else(|| not_found_coll(coll))?;
        Ok(state.live)
    }

    async fn erase(&self, coll: &str, id: RecordId, _commit: bool) -> Result<bool> {
        let mut colls = self.collections.lock();
        let state = colls.get_mut(coll).ok_or_else(|| not_found_coll(coll))?;
        match state.slots.get_mut(id as usize) {
            Some(slot @ Some(_)) => {
                *slot = None;
                state.live -= 1;
                Ok(true)
            }
            _ => Err(Error::NotFound(format!("no such record {id}"))),
        }
    }

    async fn erase_multi(&self, coll: &str, ids: &[RecordId], commit: bool) -> Result<bool> {
        for id in ids {
            match self.erase(coll, *id, commit).await {
                Ok(_) | Err(Error::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }

    async fn execute(
        &self,
        _code: &str,
        _vars: &[String],
        _commit: bool,
    ) -> Result<serde_json::Map<String, Value>> {
        Err(Error::Unsupported("vector backend does not support execute".into()))
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn crud_scenario_s1() {
        let be = VectorBackend::new();
        be.create_collection("c").await.unwrap();
        let id_a = be.store("c", json!({"name": "A"}), true).await.unwrap();
        let id_b = be.store("c", json!({"name": "B"}), true).await.unwrap();
        let id_c = be.store("c", json!({"name": "C"}), true).await.unwrap();
        assert_eq!([id_a, id_b, id_c], [0, 1, 2]);
        assert_eq!(be.size("c").await.unwrap(), 3);
        assert_eq!(be.last_id("c").await.unwrap(), 2);

        be.erase("c", 1, true).await.unwrap();
        assert_eq!(be.size("c").await.unwrap(), 2);
        assert_eq!(be.last_id("c").await.unwrap(), 2);
        assert!(matches!(be.fetch("c", 1).await, Err(Error::NotFound(_))));

        let all = be.all("c").await.unwrap();
        let names: Vec<_> = all.iter().map(|r| r["name"].as_str().unwrap()).collect();
        assert_eq!(names, ["A", "C"]);
    }

    #[tokio::test]
    async fn update_multi_partial_success_s2() {
        let be = VectorBackend::new();
        be.create_collection("c").await.unwrap();
        be.store("c", json!({"name": "A"}), true).await.unwrap();

        let results = be
            .update_multi(
                "c",
                &[0, 99],
                vec![json!({"name": "A2"}), json!({"name": "X"})],
                true,
            )
            .await
            .unwrap();
        assert_eq!(results, [true, false]);
        assert_eq!(be.fetch("c", 0).await.unwrap()["name"], "A2");
        assert!(matches!(be.fetch("c", 99).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn last_id_empty_collection() {
        let be = VectorBackend::new();
        be.create_collection("c").await.unwrap();
        assert!(matches!(be.last_id("c").await, Err(Error::Empty(_))));
    }

    #[tokio::test]
    async fn fetch_multi_missing_sentinel() {
        let be = VectorBackend::new();
        be.create_collection("c").await.unwrap();
        be.store("c", json!({"name": "A"}), true).await.unwrap();
        let fetched = be.fetch_multi("c", &[0, 5]).await.unwrap();
        assert_eq!(fetched.len(), 2);
        assert!(fetched[1].is_null());
    }

    #[tokio::test]
    async fn store_rejects_non_object_record() {
        let be = VectorBackend::new();
        be.create_collection("c").await.unwrap();
        assert!(matches!(be.store("c", json!("not an object"), true).await, Err(Error::Invalid(_))));
        assert!(matches!(be.store_multi("c", vec![json!({"ok": true}), json!(1)], true).await, Err(Error::Invalid(_))));
        assert!(matches!(be.update("c", 0, json!(1), true).await, Err(Error::Invalid(_))));
        assert_eq!(be.size("c").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn erase_multi_ignores_invalid_ids_s3() {
        let be = VectorBackend::new();
        be.create_collection("c").await.unwrap();
        be.store("c", json!({"name": "A"}), true).await.unwrap();
        be.store("c", json!({"name": "B"}), true).await.unwrap();

        assert!(be.erase_multi("c", &[0, 99, 1], true).await.unwrap());
        assert_eq!(be.size("c").await.unwrap(), 0);
        assert!(matches!(be.fetch("c", 0).await, Err(Error::NotFound(_))));
        assert!(matches!(be.fetch("c", 1).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn filter_and_execute_unsupported() {
        let be = VectorBackend::new();
        be.create_collection("c").await.unwrap();
        assert!(matches!(be.filter("c", "true").await, Err(Error::Unsupported(_))));
        assert!(matches!(be.execute("1", &[], true).await, Err(Error::Unsupported(_))));
    }
}
