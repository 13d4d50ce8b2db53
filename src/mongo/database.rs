//! Database handle and database-level commands.

use crate::client::Client;
use crate::error::{BridgeError, Result};
use crate::value::Value;

use super::ops;
use super::Collection;

/// Handle to one database.
#[derive(Clone)]
pub struct Database {
    client: Client,
    name: String,
}

impl Database {
    pub(super) fn new(client: Client, name: String) -> Self {
        Self { client, name }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn collection(&self, name: &str) -> Collection {
        Collection::new(self.client.clone(), self.name.clone(), name.to_string())
    }

    fn command_payload(&self, command: Value) -> Value {
        Value::map([
            ("database", Value::from(self.name.as_str())),
            ("command", command),
            ("opts", Value::empty_map()),
        ])
    }

    /// Run a database command and return its reply document.
    ///
    /// ```ignore
    /// let reply = db.run_command(Value::map([("ping", 1)])).await?;
    /// assert_eq!(reply.get("ok").and_then(Value::as_i64), Some(1));
    /// ```
    pub async fn run_command(&self, command: Value) -> Result<Value> {
        self.client
            .call(ops::RUN_COMMAND, self.command_payload(command))
            .await
    }

    /// Run a cursor-producing command (e.g. `listCollections`) and return
    /// the documents it produced. An empty cursor is an empty array, never nil.
    pub async fn run_command_cursor(&self, command: Value) -> Result<Value> {
        let reply = self
            .client
            .call(ops::RUN_COMMAND_CURSOR, self.command_payload(command))
            .await?;
        if reply.is_nil() {
            return Err(BridgeError::Protocol(format!(
                "{}: worker returned nil instead of a cursor",
                ops::RUN_COMMAND_CURSOR
            )));
        }
        Ok(reply)
    }
}
