//! Property-based tests verifying invariants of the in-memory reference
//! backend across arbitrary JSON inputs.

use proptest::prelude::*;
use serde_json::{json, Map, Value};
use sonata::backend::vector::VectorBackend;
use sonata::backend::Backend;
use sonata::Error;

fn arb_json_object() -> impl Strategy<Value = Value> {
    prop::collection::hash_map("[a-z]{1,8}", prop::num::i64::ANY.prop_map(Value::from), 0..5)
        .prop_map(|fields| Value::Object(fields.into_iter().collect::<Map<_, _>>()))
}

fn arb_non_object() -> impl Strategy<Value = Value> {
    prop_oneof![
        prop::num::i64::ANY.prop_map(Value::from),
        ".*".prop_map(Value::String),
        Just(Value::Null),
        Just(Value::Bool(true)),
    ]
}

proptest! {
    /// Any JSON object stored into a fresh collection can be fetched back
    /// with the same fields plus the stamped `__id`, regardless of content.
    #[test]
    fn store_then_fetch_round_trips_fields(record in arb_json_object()) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let be = VectorBackend::new();
            be.create_collection("c").await.unwrap();
            let id = be.store("c", record.clone(), true).await.unwrap();
            let fetched = be.fetch("c", id).await.unwrap();
            prop_assert_eq!(fetched["__id"].as_u64(), Some(id));
            for (k, v) in record.as_object().unwrap() {
                prop_assert_eq!(&fetched[k], v);
            }
            Ok(())
        })?;
    }

    /// `store` rejects any non-object record with `Invalid`, never
    /// silently coercing it into an empty stamped object.
    #[test]
    fn store_rejects_non_object_records(record in arb_non_object()) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let be = VectorBackend::new();
            be.create_collection("c").await.unwrap();
            let result = be.store("c", record, true).await;
            prop_assert!(matches!(result, Err(Error::Invalid(_))));
            Ok(())
        })?;
    }

    /// `erase_multi` is best-effort: any mix of valid and bogus ids still
    /// returns `Ok(true)`, and every valid id among them is actually gone.
    #[test]
    fn erase_multi_is_always_best_effort(
        valid_count in 0usize..5,
        bogus_ids in prop::collection::vec(100u64..1000, 0..5),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let be = VectorBackend::new();
            be.create_collection("c").await.unwrap();
            let mut ids = Vec::new();
            for i in 0..valid_count {
                ids.push(be.store("c", json!({"n": i}), true).await.unwrap());
            }
            ids.extend(bogus_ids);
            let ok = be.erase_multi("c", &ids, true).await;
            prop_assert!(matches!(ok, Ok(true)));
            for i in 0..valid_count as u64 {
                prop_assert!(matches!(be.fetch("c", i).await, Err(Error::NotFound(_))));
            }
            Ok(())
        })?;
    }
}
