//! The `Backend` trait and its production implementations.

pub mod aggregator;
pub mod lazy;
pub mod null;
pub mod registry;
pub mod scripted;
pub mod vector;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::record::RecordId;

/// Per-element outcome of a batch operation, used by `storeMulti`-style
/// calls where batch operations are not atomic across elements.
pub type BatchIds = Vec<RecordId>;
pub type BatchBools = Vec<bool>;
pub type BatchRecords = Vec<Value>;

/// The contract every database implementation satisfies: collection
/// lifecycle, single/multi record CRUD, scans, predicate filtering,
/// scripted execution, and commit/destroy.
///
/// Every operation returns a [`Result`]; implementations never panic on
/// caller-supplied input. `commit` is a durability hint: `true` forces
/// the record's effects to stable storage before the call returns,
/// `false` permits batching. [`Backend::commit`] is an explicit barrier.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Create a new, empty collection. `AlreadyExists` if the name is
    /// taken.
    async fn create_collection(&self, name: &str) -> Result<bool>;

    /// Verify a collection exists, opening any backend-side handle
    /// needed to operate on it. `NotFound` if absent.
    async fn open_collection(&self, name: &str) -> Result<bool>;

    /// Drop a collection and invalidate every id it ever issued.
    /// `NotFound` if absent.
    async fn drop_collection(&self, name: &str) -> Result<bool>;

    /// Store one record, returning its assigned id.
    async fn store(&self, coll: &str, record: Value, commit: bool) -> Result<RecordId>;

    /// Store a sequence of records, returning ids parallel to the input.
    async fn store_multi(
        &self,
        coll: &str,
        records: Vec<Value>,
        commit: bool,
    ) -> Result<BatchIds>;

    /// Fetch one record by id. `NotFound` if the collection or the id
    /// is absent.
    async fn fetch(&self, coll: &str, id: RecordId) -> Result<Value>;

    /// Fetch several records by id; missing ids produce the empty
    /// sentinel rather than failing the whole call.
    async fn fetch_multi(&self, coll: &str, ids: &[RecordId]) -> Result<BatchRecords>;

    /// Return every live record matching a user-supplied predicate.
    /// `Unsupported` on backends without scripting.
    async fn filter(&self, coll: &str, predicate: &str) -> Result<BatchRecords>;

    /// Replace a record's contents in place; `__id` is never changed.
    async fn update(&self, coll: &str, id: RecordId, record: Value, commit: bool) -> Result<bool>;

    /// Replace several records' contents; returns a per-element outcome
    /// rather than failing the whole call on a missing id.
    async fn update_multi(
        &self,
        coll: &str,
        ids: &[RecordId],
        records: Vec<Value>,
        commit: bool,
    ) -> Result<BatchBools>;

    /// Return every live record in id order.
    async fn all(&self, coll: &str) -> Result<BatchRecords>;

    /// The maximum id ever assigned, irrespective of erasures. `Empty`
    /// if the collection has never stored a record.
    async fn last_id(&self, coll: &str) -> Result<RecordId>;

    /// The count of live (non-erased) records.
    async fn size(&self, coll: &str) -> Result<u64>;

    /// Tombstone a record; its id is never reused.
    async fn erase(&self, coll: &str, id: RecordId, commit: bool) -> Result<bool>;

    /// Tombstone several records.
    async fn erase_multi(&self, coll: &str, ids: &[RecordId], commit: bool) -> Result<bool>;

    /// Run arbitrary user code, returning the named variables captured
    /// from the script's scope (plus `__output__` if requested).
    /// `Unsupported` on backends without scripting.
    async fn execute(
        &self,
        code: &str,
        vars: &[String],
        commit: bool,
    ) -> Result<serde_json::Map<String, Value>>;

    /// An explicit durability barrier: every pending write at the
    /// moment of the call is durable before the call returns.
    async fn commit(&self) -> Result<bool>;

    /// Release all storage owned by this backend instance.
    async fn destroy(&self) -> Result<bool>;

    /// A JSON description of this backend instance's configuration.
    async fn get_config(&self) -> Result<Value>;
}
