//! The scripting bridge: native callables registered into the script
//! engine that re-enter the Client/Admin facades, letting a script on
//! one database create collections, store records, or run further
//! scripts on another database of the fleet.
//!
//! Every entry validates its arguments, converts script values to
//! native values, invokes the facade, and converts the result back;
//! facade errors surface to the script as a context error (a thrown
//! `EvalAltResult`), never a panic.

use rhai::{Array, Dynamic, Engine, EvalAltResult, Map};

use crate::client::{Admin, Client};
use crate::descriptor::{CollectionDescriptor, DatabaseDescriptor};

type BridgeResult<T> = Result<T, Box<EvalAltResult>>;

fn bridge_err(msg: impl std::fmt::Display) -> Box<EvalAltResult> {
    Box::new(EvalAltResult::ErrorRuntime(msg.to_string().into(), rhai::Position::NONE))
}

fn db_descriptor_from_map(m: &Map) -> BridgeResult<DatabaseDescriptor> {
    rhai::serde::from_dynamic(&Dynamic::from(m.clone())).map_err(|e| bridge_err(e))
}

fn coll_descriptor_from_map(m: &Map) -> BridgeResult<CollectionDescriptor> {
    rhai::serde::from_dynamic(&Dynamic::from(m.clone())).map_err(|e| bridge_err(e))
}

fn block_on<F: std::future::Future>(fut: F) -> F::Output {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(fut))
}

/// Register every bridge primitive on `engine`. `client` supplies the
/// `RpcEngine` reference used to reach any database on the fleet;
/// `admin_token`, if set, is threaded through to the admin primitives.
pub fn register_bridge(engine: &mut Engine, client: Client, admin_token: Option<String>) {
    {
        let client = client.clone();
        let admin_token = admin_token.clone();
        engine.register_result_fn(
            "snta_db_create",
            move |address: &str, provider_id: i64, db_name: &str, kind: &str, config: Map| -> BridgeResult<bool> {
                let admin = admin_for(&client, admin_token.clone());
                let config_value = rhai::serde::from_dynamic(&Dynamic::from(config)).map_err(bridge_err)?;
                block_on(admin.create_database(address, provider_id as u16, db_name, kind, config_value))
                    .map_err(|e| bridge_err(e))
            },
        );
    }
    {
        let client = client.clone();
        let admin_token = admin_token.clone();
        engine.register_result_fn(
            "snta_db_attach",
            move |address: &str, provider_id: i64, db_name: &str, kind: &str, config: Map| -> BridgeResult<bool> {
                let admin = admin_for(&client, admin_token.clone());
                let config_value = rhai::serde::from_dynamic(&Dynamic::from(config)).map_err(bridge_err)?;
                block_on(admin.attach_database(address, provider_id as u16, db_name, kind, config_value))
                    .map_err(|e| bridge_err(e))
            },
        );
    }
    {
        let client = client.clone();
        let admin_token = admin_token.clone();
        engine.register_result_fn(
            "snta_db_detach",
            move |address: &str, provider_id: i64, db_name: &str| -> BridgeResult<bool> {
                let admin = admin_for(&client, admin_token.clone());
                block_on(admin.detach_database(address, provider_id as u16, db_name)).map_err(|e| bridge_err(e))
            },
        );
    }
    {
        let client = client.clone();
        let admin_token = admin_token.clone();
        engine.register_result_fn(
            "snta_db_destroy",
            move |address: &str, provider_id: i64, db_name: &str| -> BridgeResult<bool> {
                let admin = admin_for(&client, admin_token.clone());
                block_on(admin.destroy_database(address, provider_id as u16, db_name)).map_err(|e| bridge_err(e))
            },
        );
    }

    {
        let client = client.clone();
        engine.register_result_fn("sntd_coll_create", move |db: Map, coll_name: &str| -> BridgeResult<bool> {
            let desc = db_descriptor_from_map(&db)?;
            let database = block_on(open(&client, &desc)).map_err(|e| bridge_err(e))?;
            block_on(database.create_collection(coll_name)).map_err(|e| bridge_err(e))
        });
    }
    {
        let client = client.clone();
        engine.register_fn("sntd_coll_exists", move |db: Map, coll_name: &str| -> bool {
            let Ok(desc) = db_descriptor_from_map(&db) else { return false };
            let Ok(database) = block_on(open(&client, &desc)) else { return false };
            block_on(database.exists(coll_name))
        });
    }
    {
        let client = client.clone();
        engine.register_fn("sntd_coll_open", move |db: Map, coll_name: &str| -> Dynamic {
            let Ok(desc) = db_descriptor_from_map(&db) else { return Dynamic::UNIT };
            let Ok(database) = block_on(open(&client, &desc)) else { return Dynamic::UNIT };
            if block_on(database.exists(coll_name)) {
                let descriptor = CollectionDescriptor::new(desc, coll_name);
                rhai::serde::to_dynamic(&descriptor).unwrap_or(Dynamic::UNIT)
            } else {
                Dynamic::UNIT
            }
        });
    }
    {
        let client = client.clone();
        engine.register_result_fn("sntd_coll_drop", move |db: Map, coll_name: &str| -> BridgeResult<bool> {
            let desc = db_descriptor_from_map(&db)?;
            let database = block_on(open(&client, &desc)).map_err(|e| bridge_err(e))?;
            block_on(database.drop_collection(coll_name)).map_err(|e| bridge_err(e))
        });
    }
    {
        let client = client.clone();
        engine.register_result_fn(
            "sntd_execute",
            move |db: Map, code: &str, vars: Array| -> BridgeResult<Map> {
                let desc = db_descriptor_from_map(&db)?;
                let database = block_on(open(&client, &desc)).map_err(|e| bridge_err(e))?;
                let vars: Vec<String> = vars.into_iter().filter_map(|v| v.into_string().ok()).collect();
                let result = block_on(database.execute(code, &vars, true)).map_err(|e| bridge_err(e))?;
                let value = serde_json::Value::Object(result);
                rhai::serde::to_dynamic(&value)
                    .map_err(bridge_err)
                    .map(|d| d.cast::<Map>())
            },
        );
    }

    {
        let client = client.clone();
        engine.register_result_fn("sntc_store", move |coll: Map, record: rhai::Dynamic| -> BridgeResult<i64> {
            let desc = coll_descriptor_from_map(&coll)?;
            let collection = block_on(open(&client, &desc.database)).map_err(bridge_err)?.collection(&desc.collection_name);
            let record: serde_json::Value = rhai::serde::from_dynamic(&record).map_err(bridge_err)?;
            let id = block_on(collection.store(record, true)).map_err(bridge_err)?;
            Ok(id as i64)
        });
    }
    {
        let client = client.clone();
        engine.register_result_fn("sntc_fetch", move |coll: Map, id: i64| -> BridgeResult<Dynamic> {
            let desc = coll_descriptor_from_map(&coll)?;
            let collection = block_on(open(&client, &desc.database)).map_err(bridge_err)?.collection(&desc.collection_name);
            let value = block_on(collection.fetch(id as u64)).map_err(bridge_err)?;
            rhai::serde::to_dynamic(&value).map_err(bridge_err)
        });
    }
    {
        let client = client.clone();
        engine.register_result_fn("sntc_filter", move |coll: Map, predicate: &str| -> BridgeResult<Array> {
            let desc = coll_descriptor_from_map(&coll)?;
            let collection = block_on(open(&client, &desc.database)).map_err(bridge_err)?.collection(&desc.collection_name);
            let records = block_on(collection.filter(predicate)).map_err(bridge_err)?;
            records
                .iter()
                .map(|r| rhai::serde::to_dynamic(r).map_err(bridge_err))
                .collect()
        });
    }
    {
        let client = client.clone();
        engine.register_result_fn(
            "sntc_update",
            move |coll: Map, id: i64, record: Dynamic| -> BridgeResult<bool> {
                let desc = coll_descriptor_from_map(&coll)?;
                let collection = block_on(open(&client, &desc.database)).map_err(bridge_err)?.collection(&desc.collection_name);
                let record: serde_json::Value = rhai::serde::from_dynamic(&record).map_err(bridge_err)?;
                block_on(collection.update(id as u64, record, true)).map_err(bridge_err)
            },
        );
    }
    {
        let client = client.clone();
        engine.register_result_fn("sntc_all", move |coll: Map| -> BridgeResult<Array> {
            let desc = coll_descriptor_from_map(&coll)?;
            let collection = block_on(open(&client, &desc.database)).map_err(bridge_err)?.collection(&desc.collection_name);
            let records = block_on(collection.all()).map_err(bridge_err)?;
            records
                .iter()
                .map(|r| rhai::serde::to_dynamic(r).map_err(bridge_err))
                .collect()
        });
    }
    {
        let client = client.clone();
        engine.register_result_fn("sntc_last_record_id", move |coll: Map| -> BridgeResult<i64> {
            let desc = coll_descriptor_from_map(&coll)?;
            let collection = block_on(open(&client, &desc.database)).map_err(bridge_err)?.collection(&desc.collection_name);
            block_on(collection.last_id()).map(|id| id as i64).map_err(bridge_err)
        });
    }
    {
        let client = client.clone();
        engine.register_result_fn("sntc_size", move |coll: Map| -> BridgeResult<i64> {
            let desc = coll_descriptor_from_map(&coll)?;
            let collection = block_on(open(&client, &desc.database)).map_err(bridge_err)?.collection(&desc.collection_name);
            block_on(collection.size()).map(|n| n as i64).map_err(bridge_err)
        });
    }
    {
        engine.register_result_fn("sntc_erase", move |coll: Map, id: i64| -> BridgeResult<bool> {
            let desc = coll_descriptor_from_map(&coll)?;
            let collection = block_on(open(&client, &desc.database)).map_err(bridge_err)?.collection(&desc.collection_name);
            block_on(collection.erase(id as u64, true)).map_err(bridge_err)
        });
    }

    // Every bridge primitive above re-enters the facade with `block_on`
    // and only returns once the call has fully completed, so there is
    // never a pending handle left for these two to act on; they exist
    // so scripts written against the async-handle primitives still run.
    engine.register_fn("sntr_wait", |_handle: Dynamic| -> bool { true });
    engine.register_fn("sntr_test", |_handle: Dynamic| -> bool { true });
}


fn admin_for(client: &Client, token: Option<String>) -> Admin {
    client.admin(token)
}

async fn open(client: &Client, desc: &DatabaseDescriptor) -> crate::error::Result<crate::client::Database> {
    client.open(desc.address.clone(), desc.provider_id, desc.database_name.clone(), true).await
}
