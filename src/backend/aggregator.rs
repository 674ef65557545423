//! Batched-write decorator. Wraps any inner backend; writes accumulate
//! per collection in a batch buffer and are submitted together once a
//! threshold is crossed.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Condvar, Mutex};
use serde_json::Value;
use tracing::trace;

use crate::backend::{Backend, BatchBools, BatchIds, BatchRecords};
use crate::error::Result;
use crate::provider::TaskPool;
use crate::record::{RecordId, PENDING_ID};

#[derive(Default)]
struct PendingWrites {
    count: Mutex<u64>,
    cv: Condvar,
}

impl PendingWrites {
    fn enter(&self) {
        *self.count.lock() += 1;
    }

    fn exit(&self) {
        let mut count = self.count.lock();
        *count -= 1;
        if *count == 0 {
            self.cv.notify_all();
        }
    }

    fn wait_drained(&self) {
        let mut count = self.count.lock();
        while *count != 0 {
            self.cv.wait(&mut count);
        }
    }
}

struct PendingWriteGuard<'a> {
    barrier: &'a PendingWrites,
}

impl<'a> PendingWriteGuard<'a> {
    fn new(barrier: &'a PendingWrites) -> Self {
        barrier.enter();
        PendingWriteGuard { barrier }
    }
}

impl Drop for PendingWriteGuard<'_> {
    fn drop(&mut self) {
        self.barrier.exit();
    }
}

pub struct AggregatorBackend {
    inner: Arc<dyn Backend>,
    pool: TaskPool,
    flush_on_read: bool,
    flush_on_exec: bool,
    batch_size: usize,
    commit_on_flush: bool,
    batches: Mutex<HashMap<String, Vec<Value>>>,
    pending: Arc<PendingWrites>,
}

impl AggregatorBackend {
    pub fn new(
        inner: Arc<dyn Backend>,
        pool: TaskPool,
        flush_on_read: bool,
        flush_on_exec: bool,
        batch_size: usize,
        commit_on_flush: bool,
    ) -> Self {
        AggregatorBackend {
            inner,
            pool,
            flush_on_read,
            flush_on_exec,
            batch_size,
            commit_on_flush,
            batches: Mutex::new(HashMap::new()),
            pending: Arc::new(PendingWrites::default()),
        }
    }

    fn submit(&self, coll: &str, content: Vec<Value>, commit: bool) {
        if content.is_empty() {
            return;
        }
        let inner = self.inner.clone();
        let pending = self.pending.clone();
        let coll = coll.to_string();
        let commit = commit || self.commit_on_flush;
        self.pool.spawn(async move {
            let _guard = PendingWriteGuard::new(&pending);
            if let Err(e) = inner.store_multi(&coll, content, commit).await {
                trace!(error = %e, "deferred aggregator store_multi failed");
            }
        });
    }

    /// Append one record to `coll`'s batch, opening the collection (and
    /// creating its buffer) first if this decorator has not seen it yet.
    async fn enqueue(&self, coll: &str, record: Value, commit: bool) -> Result<()> {
        {
            let batches = self.batches.lock();
            if !batches.contains_key(coll) {
                drop(batches);
                self.inner.open_collection(coll).await?;
                self.batches.lock().entry(coll.to_string()).or_default();
            }
        }
        let to_submit = {
            let mut batches = self.batches.lock();
            let batch = batches.entry(coll.to_string()).or_default();
            batch.push(record);
            if batch.len() >= self.batch_size || commit {
                Some(std::mem::take(batch))
            } else {
                None
            }
        };
        if let Some(content) = to_submit {
            self.submit(coll, content, commit);
        }
        Ok(())
    }

    async fn enqueue_many(&self, coll: &str, records: Vec<Value>, commit: bool) -> Result<()> {
        {
            let batches = self.batches.lock();
            if !batches.contains_key(coll) {
                drop(batches);
                self.inner.open_collection(coll).await?;
                self.batches.lock().entry(coll.to_string()).or_default();
            }
        }
        let to_submit = {
            let mut batches = self.batches.lock();
            let batch = batches.entry(coll.to_string()).or_default();
            batch.extend(records);
            if batch.len() >= self.batch_size || commit {
                Some(std::mem::take(batch))
            } else {
                None
            }
        };
        if let Some(content) = to_submit {
            self.submit(coll, content, commit);
        }
        Ok(())
    }

    /// Wait for in-flight submissions to land, then — unlike the lazy
    /// decorator's barrier — also drain this collection's own
    /// not-yet-submitted batch buffer (or every collection's, if none
    /// is named). This part genuinely is collection-scoped.
    fn flush(&self, coll: &str) {
        let pending = self.pending.clone();
        tokio::task::block_in_place(move || pending.wait_drained());

        let drained: Vec<(String, Vec<Value>)> = {
            let mut batches = self.batches.lock();
            if coll.is_empty() {
                batches
                    .iter_mut()
                    .filter(|(_, v)| !v.is_empty())
                    .map(|(k, v)| (k.clone(), std::mem::take(v)))
                    .collect()
            } else if let Some(batch) = batches.get_mut(coll) {
                if batch.is_empty() {
                    Vec::new()
                } else {
                    vec![(coll.to_string(), std::mem::take(batch))]
                }
            } else {
                Vec::new()
            }
        };
        for (coll, content) in drained {
            let inner = self.inner.clone();
            let commit_on_flush = self.commit_on_flush;
            tokio::task::block_in_place(move || {
                tokio::runtime::Handle::current()
                    .block_on(async move { inner.store_multi(&coll, content, commit_on_flush).await })
            })
            .ok();
        }
    }
}

#[async_trait]
impl Backend for AggregatorBackend {
    async fn create_collection(&self, name: &str) -> Result<bool> {
        let result = self.inner.create_collection(name).await?;
        self.batches.lock().entry(name.to_string()).or_default();
        Ok(result)
    }

    async fn open_collection(&self, name: &str) -> Result<bool> {
        let result = self.inner.open_collection(name).await?;
        self.batches.lock().entry(name.to_string()).or_default();
        Ok(result)
    }

    async fn drop_collection(&self, name: &str) -> Result<bool> {
        self.flush(name);
        let result = self.inner.drop_collection(name).await?;
        self.batches.lock().remove(name);
        Ok(result)
    }

    async fn store(&self, coll: &str, record: Value, commit: bool) -> Result<RecordId> {
        self.enqueue(coll, record, commit).await?;
        Ok(PENDING_ID)
    }

    async fn store_multi(&self, coll: &str, records: Vec<Value>, commit: bool) -> Result<BatchIds> {
        let n = records.len();
        self.enqueue_many(coll, records, commit).await?;
        Ok(vec![PENDING_ID; n])
    }

    async fn fetch(&self, coll: &str, id: RecordId) -> Result<Value> {
        if self.flush_on_read {
            self.flush(coll);
        }
        self.inner.fetch(coll, id).await
    }

    async fn fetch_multi(&self, coll: &str, ids: &[RecordId]) -> Result<BatchRecords> {
        if self.flush_on_read {
            self.flush(coll);
        }
        self.inner.fetch_multi(coll, ids).await
    }

    async fn filter(&self, coll: &str, predicate: &str) -> Result<BatchRecords> {
        if self.flush_on_read {
            self.flush(coll);
        }
        self.inner.filter(coll, predicate).await
    }

    async fn update(&self, coll: &str, id: RecordId, record: Value, commit: bool) -> Result<bool> {
        if self.flush_on_read {
            self.flush(coll);
        }
        self.inner.update(coll, id, record, commit).await
    }

    async fn update_multi(
        &self,
        coll: &str,
        ids: &[RecordId],
        records: Vec<Value>,
        commit: bool,
    ) -> Result<BatchBools> {
        if self.flush_on_read {
            self.flush(coll);
        }
        self.inner.update_multi(coll, ids, records, commit).await
    }

    async fn all(&self, coll: &str) -> Result<BatchRecords> {
        if self.flush_on_read {
            self.flush(coll);
        }
        self.inner.all(coll).await
    }

    async fn last_id(&self, coll: &str) -> Result<RecordId> {
        if self.flush_on_read {
            self.flush(coll);
        }
        self.inner.last_id(coll).await
    }

    async fn size(&self, coll: &str) -> Result<u64> {
        if self.flush_on_read {
            self.flush(coll);
        }
        self.inner.size(coll).await
    }

    async fn erase(&self, coll: &str, id: RecordId, commit: bool) -> Result<bool> {
        if self.flush_on_read {
            self.flush(coll);
        }
        self.inner.erase(coll, id, commit).await
    }

    async fn erase_multi(&self, coll: &str, ids: &[RecordId], commit: bool) -> Result<bool> {
        if self.flush_on_read {
            self.flush(coll);
        }
        self.inner.erase_multi(coll, ids, commit).await
    }

    async fn execute(
        &self,
        code: &str,
        vars: &[String],
        commit: bool,
    ) -> Result<serde_json::Map<String, Value>> {
        if self.flush_on_exec {
            self.flush("");
        }
        self.inner.execute(code, vars, commit).await
    }

    async fn commit(&self) -> Result<bool> {
        self.flush("");
        self.inner.commit().await
    }

    async fn destroy(&self) -> Result<bool> {
        self.flush("");
        self.inner.destroy().await
    }

    async fn get_config(&self) -> Result<Value> {
        let inner_config = self.inner.get_config().await?;
        Ok(serde_json::json!({
            "flush_on_exec": self.flush_on_exec,
            "flush_on_read": self.flush_on_read,
            "commit_on_flush": self.commit_on_flush,
            "batch_size": self.batch_size,
            "config": inner_config,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::vector::VectorBackend;
    use serde_json::json;

    fn setup(batch_size: usize, commit_on_flush: bool) -> AggregatorBackend {
        let inner: Arc<dyn Backend> = Arc::new(VectorBackend::new());
        AggregatorBackend::new(inner, TaskPool::current(), true, true, batch_size, commit_on_flush)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn batches_submit_at_threshold_s3() {
        let be = setup(2, true);
        be.create_collection("c").await.unwrap();
        for i in 0..4 {
            be.store("c", json!({"i": i}), false).await.unwrap();
        }
        // Give the two threshold-triggered submissions a chance to land
        // before the explicit commit.
        be.commit().await.unwrap();
        assert_eq!(be.size("c").await.unwrap(), 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn commit_flushes_partial_batch() {
        let be = setup(10, false);
        be.create_collection("c").await.unwrap();
        be.store("c", json!({"i": 0}), false).await.unwrap();
        assert_eq!(be.size("c").await.unwrap(), 1);
    }
}
