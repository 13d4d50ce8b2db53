//! Host configuration read and written by a worker over a real Unix socket.

mod common;

use sidecar_bridge::shared_config::{self, ConfigClient, ConfigStore};
use sidecar_bridge::worker::INVALID_PAYLOAD;
use sidecar_bridge::{BridgeConfig, Value, Worker};

async fn config_client(store: ConfigStore) -> (sidecar_bridge::worker::RunningWorker, ConfigClient) {
    let host = common::spawn_worker(shared_config::serve(Worker::builder(), store)).await;
    let client = ConfigClient::new(common::connect(&host, 1).await);
    (host, client)
}

#[tokio::test]
async fn test_get_set_has_with_defaults() {
    let bridge = BridgeConfig {
        socket_address: "/tmp/configured.sock".to_string(),
        ..BridgeConfig::default()
    };
    let store = ConfigStore::from_bridge_config(&bridge).unwrap();
    let (_host, config) = config_client(store.clone()).await;

    assert_eq!(
        config.get("bridge.socket_address", "default").await.unwrap(),
        Value::from("/tmp/configured.sock")
    );
    assert_eq!(
        config.get("bridge.non_exist", "default").await.unwrap(),
        Value::from("default")
    );
    assert!(!config.has("bridge.non_exist").await.unwrap());

    config.set("bridge.non_exist", "exist").await.unwrap();
    assert_eq!(config.get("bridge.non_exist", "").await.unwrap(), Value::from("exist"));
    assert!(config.has("bridge.non_exist").await.unwrap());

    // Writes land in the host's store.
    assert_eq!(store.get("bridge.non_exist"), Some(Value::from("exist")));
}

#[tokio::test]
async fn test_structured_values_survive() {
    let (_host, config) = config_client(ConfigStore::new()).await;

    let pool = Value::map([("size", Value::from(4)), ("hosts", Value::array(["a", "b"]))]);
    config.set("db.pool", pool.clone()).await.unwrap();

    assert_eq!(config.get("db.pool", Value::Nil).await.unwrap(), pool);
    assert_eq!(config.get("db.pool.size", 0).await.unwrap(), Value::Int(4));
}

#[tokio::test]
async fn test_invalid_key_is_remote_error() {
    let (_host, config) = config_client(ConfigStore::new()).await;

    let err = config.set("a..b", 1).await.unwrap_err();
    assert_eq!(err.remote().map(|r| r.category.as_str()), Some(INVALID_PAYLOAD));

    // Other calls on the same connection are unaffected.
    assert_eq!(config.get("a", "fallback").await.unwrap(), Value::from("fallback"));
}
