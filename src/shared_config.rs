//! Host configuration shared with the worker over the bridge.
//!
//! The host owns a [`ConfigStore`] and serves it with [`serve`] on a
//! socket of its own; the worker reaches it through a [`ConfigClient`].
//! Three operations travel over the usual call/reply frames:
//!
//! | operation    | arguments          | result                  |
//! |--------------|--------------------|-------------------------|
//! | `config.get` | `{key, default}`   | stored value or default |
//! | `config.set` | `{key, value}`     | nil                     |
//! | `config.has` | `{key}`            | bool                    |
//!
//! Keys are dotted paths into nested maps: `bridge.socket_address` reads
//! the `socket_address` entry of the `bridge` map.
//!
//! # Example
//!
//! ```ignore
//! use sidecar_bridge::shared_config::{self, ConfigClient, ConfigStore};
//! use sidecar_bridge::{BridgeConfig, Client, Worker};
//!
//! // Host side
//! let store = ConfigStore::from_bridge_config(&BridgeConfig::default())?;
//! let server = shared_config::serve(Worker::builder(), store)
//!     .build()
//!     .bind("/tmp/sidecar-config.sock")
//!     .await?;
//! tokio::spawn(server.run());
//!
//! // Worker side
//! let config = ConfigClient::new(Client::builder().socket_address("/tmp/sidecar-config.sock").connect().await?);
//! let addr = config.get("bridge.socket_address", "default").await?;
//! ```

use std::sync::{Arc, PoisonError, RwLock};

use serde::Deserialize;

use crate::client::Client;
use crate::codec::{MsgPackCodec, RemoteError};
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::value::Value;
use crate::worker::{HandlerResult, WorkerBuilder, INVALID_PAYLOAD};

/// Operation names served by [`serve`].
pub mod ops {
    pub const GET: &str = "config.get";
    pub const SET: &str = "config.set";
    pub const HAS: &str = "config.has";
}

/// Top-level key under which [`ConfigStore::from_bridge_config`] places the
/// bridge settings.
pub const BRIDGE_SECTION: &str = "bridge";

/// Nested key/value configuration. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ConfigStore {
    root: Arc<RwLock<Value>>,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore {
    pub fn new() -> Self {
        Self::with_root(Value::empty_map())
    }

    /// Start from an existing map. A non-map root is replaced by an empty map.
    pub fn with_root(root: Value) -> Self {
        let root = if root.as_map().is_some() { root } else { Value::empty_map() };
        Self {
            root: Arc::new(RwLock::new(root)),
        }
    }

    /// A store holding `config` under the `bridge` section.
    pub fn from_bridge_config(config: &BridgeConfig) -> Result<Self> {
        let section: Value = MsgPackCodec::decode(&MsgPackCodec::encode(config)?)?;
        Ok(Self::with_root(Value::map([(BRIDGE_SECTION, section)])))
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let segments = split_key(key).ok()?;
        let root = self.root.read().unwrap_or_else(PoisonError::into_inner);
        segments
            .iter()
            .try_fold(&*root, |node, segment| node.get(*segment))
            .cloned()
    }

    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Store `value` at `key`, creating intermediate maps. An intermediate
    /// entry that is not a map is overwritten.
    pub fn set(&self, key: &str, value: Value) -> Result<()> {
        let segments = split_key(key)?;
        let mut root = self.root.write().unwrap_or_else(PoisonError::into_inner);

        let (last, parents) = segments
            .split_last()
            .ok_or_else(|| BridgeError::Config("config key must not be empty".to_string()))?;

        let mut node = &mut *root;
        for segment in parents {
            if node.get(*segment).map_or(true, |child| child.as_map().is_none()) {
                node.insert(*segment, Value::empty_map());
            }
            node = node
                .get_mut(*segment)
                .ok_or_else(|| BridgeError::Config(format!("cannot descend into {segment:?}")))?;
        }
        node.insert(*last, value);
        Ok(())
    }

    /// A copy of the whole tree.
    pub fn snapshot(&self) -> Value {
        self.root.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

fn split_key(key: &str) -> Result<Vec<&str>> {
    let segments: Vec<&str> = key.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(BridgeError::Config(format!("invalid config key {key:?}")));
    }
    Ok(segments)
}

#[derive(Deserialize)]
struct GetArgs {
    key: String,
    #[serde(default)]
    default: Value,
}

#[derive(Deserialize)]
struct SetArgs {
    key: String,
    value: Value,
}

#[derive(Deserialize)]
struct HasArgs {
    key: String,
}

fn invalid_key(err: BridgeError) -> RemoteError {
    RemoteError::new(INVALID_PAYLOAD, 0, err.to_string())
}

fn get(store: &ConfigStore, args: GetArgs) -> HandlerResult {
    split_key(&args.key).map_err(invalid_key)?;
    Ok(store.get(&args.key).unwrap_or(args.default))
}

fn set(store: &ConfigStore, args: SetArgs) -> HandlerResult {
    store.set(&args.key, args.value).map_err(invalid_key)?;
    tracing::debug!("Config key {} updated by worker", args.key);
    Ok(Value::Nil)
}

fn has(store: &ConfigStore, args: HasArgs) -> HandlerResult {
    split_key(&args.key).map_err(invalid_key)?;
    Ok(Value::Bool(store.has(&args.key)))
}

/// Register the `config.*` operations for `store` on `builder`.
pub fn serve(builder: WorkerBuilder, store: ConfigStore) -> WorkerBuilder {
    let (get_store, set_store, has_store) = (store.clone(), store.clone(), store);
    builder
        .handle(ops::GET, move |args: GetArgs| {
            let result = get(&get_store, args);
            async move { result }
        })
        .handle(ops::SET, move |args: SetArgs| {
            let result = set(&set_store, args);
            async move { result }
        })
        .handle(ops::HAS, move |args: HasArgs| {
            let result = has(&has_store, args);
            async move { result }
        })
}

/// Worker-side access to the host's configuration.
#[derive(Clone)]
pub struct ConfigClient {
    client: Client,
}

impl ConfigClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// The value at `key`, or `default` if the host has none.
    pub async fn get(&self, key: &str, default: impl Into<Value>) -> Result<Value> {
        self.client
            .call(ops::GET, Value::map([("key", Value::from(key)), ("default", default.into())]))
            .await
    }

    pub async fn set(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        self.client
            .call(ops::SET, Value::map([("key", Value::from(key)), ("value", value.into())]))
            .await?;
        Ok(())
    }

    pub async fn has(&self, key: &str) -> Result<bool> {
        let reply = self.client.call(ops::HAS, Value::map([("key", key)])).await?;
        reply
            .as_bool()
            .ok_or_else(|| BridgeError::Protocol(format!("{}: expected a bool, got {reply}", ops::HAS)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_walks_nested_maps() {
        let store = ConfigStore::with_root(Value::map([(
            "bridge",
            Value::map([("socket_address", "/tmp/a.sock")]),
        )]));

        assert_eq!(store.get("bridge.socket_address"), Some(Value::from("/tmp/a.sock")));
        assert_eq!(store.get("bridge"), Some(Value::map([("socket_address", "/tmp/a.sock")])));
        assert_eq!(store.get("bridge.missing"), None);
        assert_eq!(store.get("bridge.socket_address.deeper"), None);
        assert!(!store.has("other"));
    }

    #[test]
    fn test_set_creates_intermediate_maps() {
        let store = ConfigStore::new();
        store.set("app.db.port", Value::from(27017)).unwrap();
        store.set("app.name", Value::from("unit")).unwrap();

        assert_eq!(store.get("app.db.port"), Some(Value::Int(27017)));
        assert_eq!(
            store.snapshot(),
            Value::map([(
                "app",
                Value::map([
                    ("db", Value::map([("port", 27017)])),
                    ("name", Value::from("unit")),
                ]),
            )])
        );
    }

    #[test]
    fn test_set_overwrites_scalar_parent() {
        let store = ConfigStore::new();
        store.set("a", Value::from(1)).unwrap();
        store.set("a.b", Value::from(2)).unwrap();
        assert_eq!(store.get("a.b"), Some(Value::Int(2)));
    }

    #[test]
    fn test_invalid_keys() {
        let store = ConfigStore::new();
        assert!(store.set("", Value::Nil).is_err());
        assert!(store.set("a..b", Value::Nil).is_err());
        assert_eq!(store.get(".a"), None);
    }

    #[test]
    fn test_bridge_config_section() {
        let config = BridgeConfig {
            socket_address: "/run/w.sock".to_string(),
            ..BridgeConfig::default()
        };
        let store = ConfigStore::from_bridge_config(&config).unwrap();

        assert_eq!(store.get("bridge.socket_address"), Some(Value::from("/run/w.sock")));
        assert_eq!(store.get("bridge.connections"), Some(Value::Int(1)));
        assert_eq!(store.get("bridge.call_timeout_ms"), Some(Value::Nil));
        assert!(store.has("bridge.call_timeout_ms"));
    }

    #[tokio::test]
    async fn test_get_falls_back_to_default() {
        let store = ConfigStore::new();
        let args = GetArgs {
            key: "missing".to_string(),
            default: Value::from("default"),
        };
        assert_eq!(get(&store, args).unwrap(), Value::from("default"));

        let err = get(
            &store,
            GetArgs {
                key: "a..b".to_string(),
                default: Value::Nil,
            },
        )
        .unwrap_err();
        assert_eq!(err.category, INVALID_PAYLOAD);
    }
}
