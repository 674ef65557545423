//! End-to-end coverage of the scripted backend: persistence through
//! `sled`, predicate filtering through the embedded `rhai` VM, and the
//! scripting bridge re-entering the fleet from inside `execute`.

use std::sync::Arc;

use serde_json::json;
use sonata::provider::rpc::{Endpoint, LocalRpcEngine};
use sonata::provider::{Provider, TaskPool};
use sonata::Client;

fn wire_up(provider_id: u16) -> (Client, Endpoint) {
    let engine = Arc::new(LocalRpcEngine::new());
    let provider = Arc::new(Provider::new(provider_id, None, TaskPool::current()));
    let endpoint = Endpoint {
        address: "local".to_string(),
        provider_id,
    };
    engine.register(endpoint.clone(), provider.clone());
    provider.bind_engine(engine.clone());
    (Client::new(engine), endpoint)
}

#[tokio::test]
async fn scripted_backend_persists_and_filters() {
    let (client, endpoint) = wire_up(10);
    let dir = tempfile::tempdir().unwrap();
    client
        .admin(None)
        .create_database(
            endpoint.address.clone(),
            endpoint.provider_id,
            "papers",
            "scripted",
            json!({"path": dir.path().join("db").to_string_lossy()}),
        )
        .await
        .unwrap();

    let database = client.open(endpoint.address, endpoint.provider_id, "papers", true).await.unwrap();
    database.create_collection("authors").await.unwrap();
    let coll = database.collection("authors");

    coll.store(json!({"name": "Ada", "papers": 10}), true).await.unwrap();
    coll.store(json!({"name": "Alan", "papers": 40}), true).await.unwrap();
    coll.store(json!({"name": "Grace", "papers": 50}), true).await.unwrap();

    let prolific = coll.filter("function($r){return $r.papers>35;}").await.unwrap();
    assert_eq!(prolific.len(), 2);

    assert_eq!(coll.size().await.unwrap(), 3);
}

#[tokio::test]
async fn execute_bridges_back_into_another_database() {
    let (client, endpoint) = wire_up(11);

    client
        .admin(None)
        .create_database(endpoint.address.clone(), endpoint.provider_id, "source", "scripted", json!({"temporary": true}))
        .await
        .unwrap();
    client
        .admin(None)
        .create_database(endpoint.address.clone(), endpoint.provider_id, "target", "scripted", json!({"temporary": true}))
        .await
        .unwrap();

    let target_db = client.open(endpoint.address.clone(), endpoint.provider_id, "target", true).await.unwrap();
    target_db.create_collection("mirrored").await.unwrap();

    let source_db = client.open(endpoint.address, endpoint.provider_id, "source", true).await.unwrap();

    let desc = target_db.descriptor();
    let script = format!(
        "let db = #{{address: \"{}\", provider_id: {}, database_name: \"{}\"}}; \
         let coll = #{{database: db, collection_name: \"mirrored\"}}; \
         let id = sntc_store(coll, #{{name: \"bridged\"}});",
        desc.address, desc.provider_id, desc.database_name
    );

    source_db.execute(&script, &[], true).await.unwrap();

    let mirrored = target_db.collection("mirrored");
    assert_eq!(mirrored.size().await.unwrap(), 1);
    let record = mirrored.fetch(0).await.unwrap();
    assert_eq!(record["name"], "bridged");
}
