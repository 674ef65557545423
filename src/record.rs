//! The JSON record model: a `serde_json::Value` object carrying the
//! reserved `__id` field every backend assigns on store.

use serde_json::{Map, Value};

/// Reserved field name for the record id. Injected by the backend on
/// store and always overrides any caller-supplied value.
pub const ID_FIELD: &str = "__id";

/// A monotonically assigned record identifier. `u64::MAX` is the sentinel
/// value returned by the lazy and aggregator decorators for deferred
/// writes; it is never a real assigned id.
pub type RecordId = u64;

/// The sentinel id returned by decorators for deferred writes.
pub const PENDING_ID: RecordId = u64::MAX;

/// Stamp `__id` onto a JSON record, overriding any existing value.
/// The field is inserted (or moved) to the front of the object so
/// re-serialized records consistently show `__id` first.
///
/// Callers must validate `record.is_object()` before calling this; it
/// is never called on unvalidated input.
pub fn stamp_id(mut record: Value, id: RecordId) -> Value {
    let obj = record.as_object_mut().expect("stamp_id called on a non-object record");
    obj.remove(ID_FIELD);
    let mut reordered = Map::new();
    reordered.insert(ID_FIELD.to_string(), Value::from(id));
    reordered.extend(obj.clone());
    Value::Object(reordered)
}

/// Read the `__id` field back out of a stamped record, if present and
/// numeric.
pub fn read_id(record: &Value) -> Option<RecordId> {
    record.get(ID_FIELD)?.as_u64()
}

/// The empty-sentinel value `fetchMulti` returns at positions of missing
/// ids: `null`, distinguishable from any real record (which is always an
/// object).
pub fn missing_sentinel() -> Value {
    Value::Null
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stamp_overrides_caller_supplied_id() {
        let rec = json!({"__id": 999, "name": "A"});
        let stamped = stamp_id(rec, 7);
        assert_eq!(read_id(&stamped), Some(7));
        assert_eq!(stamped["name"], "A");
    }

    #[test]
    fn stamp_id_is_first_key() {
        let rec = json!({"name": "A"});
        let stamped = stamp_id(rec, 3);
        let obj = stamped.as_object().unwrap();
        assert_eq!(obj.keys().next().map(String::as_str), Some(ID_FIELD));
    }

    #[test]
    fn missing_sentinel_is_null() {
        assert!(missing_sentinel().is_null());
    }
}
