//! Fire-and-forget write decorator. Wraps any inner backend; writes are
//! deposited onto the task pool and return the `PENDING_ID` sentinel
//! immediately, while reads optionally flush first.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Condvar, Mutex};
use serde_json::Value;
use tracing::trace;

use crate::backend::{Backend, BatchBools, BatchIds, BatchRecords};
use crate::error::Result;
use crate::provider::TaskPool;
use crate::record::{RecordId, PENDING_ID};

/// Counted barrier: every deferred task increments on entry and
/// decrements on completion; `flush` blocks until the count is zero.
/// Unlike the aggregator's barrier, the collection name a caller passes
/// to `flush` is accepted but does not scope the wait — this mirrors
/// the original's lazy-flush semantics exactly (a global barrier,
/// despite the per-collection-looking signature).
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

/// RAII guard mirroring the original's `PendingWrite`: entering the
/// barrier on construction, leaving it on drop (including on panic or
/// early return from the deferred task).
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

pub struct LazyBackend {
    inner: Arc<dyn Backend>,
    pool: TaskPool,
    flush_on_read: bool,
    flush_on_exec: bool,
    pending: Arc<PendingWrites>,
}

impl LazyBackend {
    pub fn new(inner: Arc<dyn Backend>, pool: TaskPool, flush_on_read: bool, flush_on_exec: bool) -> Self {
        LazyBackend {
            inner,
            pool,
            flush_on_read,
            flush_on_exec,
            pending: Arc::new(PendingWrites::default()),
        }
    }

    /// Block until every write enqueued so far has completed on the
    /// inner backend. `_coll` is accepted for signature symmetry with
    /// the aggregator but, faithful to the original, does not scope the
    /// wait: this is always a global barrier.
    fn flush(&self, _coll: &str) {
        let pending = self.pending.clone();
        tokio::task::block_in_place(move || pending.wait_drained());
    }

    fn defer_store(&self, coll: &str, record: Value, commit: bool) {
        let inner = self.inner.clone();
        let pending = self.pending.clone();
        let coll = coll.to_string();
        self.pool.spawn(async move {
            let _guard = PendingWriteGuard::new(&pending);
            if let Err(e) = inner.store(&coll, record, commit).await {
                trace!(error = %e, "deferred lazy store failed");
            }
        });
    }

    fn defer_store_multi(&self, coll: &str, records: Vec<Value>, commit: bool) {
        let inner = self.inner.clone();
        let pending = self.pending.clone();
        let coll = coll.to_string();
        self.pool.spawn(async move {
            let _guard = PendingWriteGuard::new(&pending);
            if let Err(e) = inner.store_multi(&coll, records, commit).await {
                trace!(error = %e, "deferred lazy store_multi failed");
            }
        });
    }
}

#[async_trait]
impl Backend for LazyBackend {
    async fn create_collection(&self, name: &str) -> Result<bool> {
        self.inner.create_collection(name).await
    }

    async fn open_collection(&self, name: &str) -> Result<bool> {
        self.inner.open_collection(name).await
    }

    async fn drop_collection(&self, name: &str) -> Result<bool> {
        self.flush(name);
        self.inner.drop_collection(name).await
    }

    async fn store(&self, coll: &str, record: Value, commit: bool) -> Result<RecordId> {
        self.defer_store(coll, record, commit);
        Ok(PENDING_ID)
    }

    async fn store_multi(&self, coll: &str, records: Vec<Value>, commit: bool) -> Result<BatchIds> {
        let n = records.len();
        self.defer_store_multi(coll, records, commit);
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
            "flush-on-exec": self.flush_on_exec,
            "flush-on-read": self.flush_on_read,
            "config": inner_config,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::vector::VectorBackend;
    use serde_json::json;

    async fn setup(flush_on_read: bool) -> LazyBackend {
        let inner: Arc<dyn Backend> = Arc::new(VectorBackend::new());
        inner.create_collection("c").await.unwrap();
        LazyBackend::new(inner, TaskPool::current(), flush_on_read, true)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn store_returns_sentinel_then_flush_on_read_sees_it_s4() {
        let be = setup(true).await;
        let id = be.store("c", json!({"name": "A"}), true).await.unwrap();
        assert_eq!(id, PENDING_ID);
        let fetched = be.fetch("c", 0).await.unwrap();
        assert_eq!(fetched["name"], "A");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn commit_is_a_happens_before_edge() {
        let be = setup(false).await;
        be.store("c", json!({"name": "A"}), true).await.unwrap();
        be.commit().await.unwrap();
        assert_eq!(be.size("c").await.unwrap(), 1);
    }
}
