//! End-to-end coverage over `Provider` + `Client` + `Collection`, wired
//! together through a `LocalRpcEngine` the way a real deployment would
//! wire a provider into the fleet's RPC layer.

use std::sync::Arc;

use serde_json::json;
use sonata::provider::rpc::{Endpoint, LocalRpcEngine};
use sonata::provider::{Provider, TaskPool};
use sonata::{Client, Error};

fn wire_up(provider_id: u16, token: Option<&str>) -> (Client, Endpoint) {
    let engine = Arc::new(LocalRpcEngine::new());
    let provider = Arc::new(Provider::new(provider_id, token.map(str::to_string), TaskPool::current()));
    let endpoint = Endpoint {
        address: "local".to_string(),
        provider_id,
    };
    engine.register(endpoint.clone(), provider.clone());
    provider.bind_engine(engine.clone());
    (Client::new(engine), endpoint)
}

#[tokio::test]
async fn create_store_fetch_round_trip() {
    let (client, endpoint) = wire_up(1, None);
    let admin = client.admin(None);
    admin
        .create_database(endpoint.address.clone(), endpoint.provider_id, "db", "vector", json!({}))
        .await
        .unwrap();

    let database = client.open(endpoint.address.clone(), endpoint.provider_id, "db", true).await.unwrap();
    database.create_collection("people").await.unwrap();

    let coll = database.collection("people");
    let id = coll.store(json!({"name": "Ada"}), true).await.unwrap();
    assert_eq!(id, 0);

    let fetched = coll.fetch(id).await.unwrap();
    assert_eq!(fetched["name"], "Ada");
    assert_eq!(coll.size().await.unwrap(), 1);
}

#[tokio::test]
async fn open_unknown_database_is_not_found() {
    let (client, endpoint) = wire_up(2, None);
    let err = client
        .open(endpoint.address.clone(), endpoint.provider_id, "nope", true)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn admin_token_is_enforced_over_rpc() {
    let (client, endpoint) = wire_up(3, Some("s3cret"));

    let unauthenticated = client.admin(None);
    let err = unauthenticated
        .create_database(endpoint.address.clone(), endpoint.provider_id, "db", "vector", json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::PermissionDenied(_)));

    let authenticated = client.admin(Some("s3cret".to_string()));
    authenticated
        .create_database(endpoint.address.clone(), endpoint.provider_id, "db", "vector", json!({}))
        .await
        .unwrap();

    let err = unauthenticated
        .detach_database(endpoint.address.clone(), endpoint.provider_id, "db")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::PermissionDenied(_)));

    authenticated
        .detach_database(endpoint.address, endpoint.provider_id, "db")
        .await
        .unwrap();
}

#[tokio::test]
async fn update_multi_reports_per_element_outcome() {
    use pretty_assertions::assert_eq;

    let (client, endpoint) = wire_up(4, None);
    client
        .admin(None)
        .create_database(endpoint.address.clone(), endpoint.provider_id, "db", "vector", json!({}))
        .await
        .unwrap();
    let database = client.open(endpoint.address, endpoint.provider_id, "db", true).await.unwrap();
    database.create_collection("c").await.unwrap();
    let coll = database.collection("c");
    coll.store(json!({"name": "A"}), true).await.unwrap();

    let results = coll
        .update_multi(&[0, 99], vec![json!({"name": "A2"}), json!({"name": "X"})], true)
        .await
        .unwrap();
    assert_eq!(results, vec![true, false]);

    let fetched = coll.fetch(0).await.unwrap();
    assert_eq!(fetched, json!({"__id": 0, "name": "A2"}));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn non_blocking_store_resolves_via_async_request() {
    let (client, endpoint) = wire_up(5, None);
    client
        .admin(None)
        .create_database(endpoint.address.clone(), endpoint.provider_id, "db", "vector", json!({}))
        .await
        .unwrap();
    let database = client.open(endpoint.address, endpoint.provider_id, "db", true).await.unwrap();
    database.create_collection("c").await.unwrap();
    let coll = database.collection("c");

    let out = Arc::new(parking_lot::Mutex::new(None));
    let request = coll.store_async(json!({"name": "A"}), true, out.clone());
    request.wait().unwrap();
    assert_eq!(*out.lock(), Some(0));
}
