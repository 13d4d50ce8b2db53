//! Handler registry for dispatching calls by operation name.
//!
//! # Example
//!
//! ```ignore
//! use sidecar_bridge::worker::HandlerRegistry;
//! use sidecar_bridge::Value;
//!
//! let mut registry = HandlerRegistry::new();
//! registry.register("echo", |args: Value| async move { Ok(args) });
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;

use serde::de::DeserializeOwned;

use crate::codec::{MsgPackCodec, RemoteError};
use crate::value::Value;

/// Category of the error reply for an operation nobody registered.
pub const UNKNOWN_OPERATION: &str = "unknown_operation";
/// Category of the error reply for arguments the handler cannot decode.
pub const INVALID_PAYLOAD: &str = "invalid_payload";

/// Result type for handler functions.
pub type HandlerResult = std::result::Result<Value, RemoteError>;

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Trait for handler functions.
pub trait Handler: Send + Sync + 'static {
    /// Handle a call's arguments.
    fn call(&self, args: Value) -> BoxFuture<'static, HandlerResult>;
}

/// Wrapper that converts the call arguments before calling the handler.
pub struct TypedHandler<F, T, Fut>
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    handler: F,
    _phantom: PhantomData<fn(T) -> Fut>,
}

impl<F, T, Fut> TypedHandler<F, T, Fut>
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

/// Re-read a `Value` as `T` through its MessagePack form.
fn convert_args<T: DeserializeOwned>(args: &Value) -> std::result::Result<T, RemoteError> {
    MsgPackCodec::encode(args)
        .and_then(|bytes| MsgPackCodec::decode(&bytes))
        .map_err(|e| RemoteError::new(INVALID_PAYLOAD, 0, e.to_string()))
}

impl<F, T, Fut> Handler for TypedHandler<F, T, Fut>
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, args: Value) -> BoxFuture<'static, HandlerResult> {
        let parsed: T = match convert_args(&args) {
            Ok(v) => v,
            Err(e) => return Box::pin(async move { Err(e) }),
        };

        Box::pin((self.handler)(parsed))
    }
}

/// Registry mapping operation names to handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Box<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. A second registration for `operation` replaces
    /// the first.
    pub fn register<F, T, Fut>(&mut self, operation: &str, handler: F)
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        T: DeserializeOwned + Send + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        if self
            .handlers
            .insert(operation.to_string(), Box::new(TypedHandler::new(handler)))
            .is_some()
        {
            tracing::warn!("Handler for {} registered twice; keeping the last one", operation);
        }
    }

    pub fn get_handler(&self, operation: &str) -> Option<&dyn Handler> {
        self.handlers.get(operation).map(|h| h.as_ref())
    }

    /// Registered operation names, sorted.
    pub fn operations(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Run the handler for `operation`.
    ///
    /// Unknown operations fail with an `unknown_operation` error.
    pub fn dispatch(&self, operation: &str, args: Value) -> BoxFuture<'static, HandlerResult> {
        match self.get_handler(operation) {
            Some(handler) => handler.call(args),
            None => {
                let err = RemoteError::new(UNKNOWN_OPERATION, 0, format!("unknown operation: {operation}"));
                Box::pin(async move { Err(err) })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct AddArgs {
        a: i64,
        b: i64,
    }

    #[tokio::test]
    async fn test_register_and_dispatch() {
        let mut registry = HandlerRegistry::new();
        registry.register("echo", |args: Value| async move { Ok(args) });

        let out = registry.dispatch("echo", Value::from("hello")).await.unwrap();
        assert_eq!(out, Value::from("hello"));
        assert_eq!(registry.operations(), vec!["echo"]);
    }

    #[tokio::test]
    async fn test_typed_arguments() {
        let mut registry = HandlerRegistry::new();
        registry.register("add", |args: AddArgs| async move { Ok(Value::from(args.a + args.b)) });

        let out = registry
            .dispatch("add", Value::map([("a", 2), ("b", 3)]))
            .await
            .unwrap();
        assert_eq!(out, Value::Int(5));
    }

    #[tokio::test]
    async fn test_invalid_arguments() {
        let mut registry = HandlerRegistry::new();
        registry.register("add", |args: AddArgs| async move { Ok(Value::from(args.a + args.b)) });

        let err = registry.dispatch("add", Value::from("nope")).await.unwrap_err();
        assert_eq!(err.category, INVALID_PAYLOAD);
    }

    #[tokio::test]
    async fn test_unknown_operation() {
        let registry = HandlerRegistry::new();
        let err = registry.dispatch("missing", Value::Nil).await.unwrap_err();
        assert_eq!(err.category, UNKNOWN_OPERATION);
        assert!(err.message.contains("missing"));
        assert!(registry.get_handler("missing").is_none());
    }

    #[tokio::test]
    async fn test_handler_failure_passes_through() {
        let mut registry = HandlerRegistry::new();
        registry.register("fail", |_: Value| async move {
            Err(RemoteError::new("duplicate_key", 11000, "E11000 duplicate key error"))
        });

        let err = registry.dispatch("fail", Value::Nil).await.unwrap_err();
        assert_eq!(err.code, 11000);
    }
}
