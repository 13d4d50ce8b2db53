//! Collection handle: one `mongo.*` call per method.

use crate::client::Client;
use crate::error::{BridgeError, Result};
use crate::value::Value;

use super::ops;
use super::results::{DeleteResult, FindOptions, InsertManyResult, InsertOneResult, UpdateResult};

/// Handle to one collection. Cheap to clone; holds no server state.
#[derive(Clone)]
pub struct Collection {
    client: Client,
    database: String,
    name: String,
}

impl Collection {
    pub(super) fn new(client: Client, database: String, name: String) -> Self {
        Self {
            client,
            database,
            name,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn database_name(&self) -> &str {
        &self.database
    }

    /// `{database, collection, <fields>, opts}`
    fn payload<const N: usize>(&self, fields: [(&str, Value); N], opts: Value) -> Value {
        let mut payload = Value::map([
            ("database", Value::from(self.database.as_str())),
            ("collection", Value::from(self.name.as_str())),
        ]);
        for (key, value) in fields {
            payload.insert(key, value);
        }
        payload.insert("opts", opts);
        payload
    }

    async fn call<const N: usize>(&self, op: &str, fields: [(&str, Value); N], opts: Value) -> Result<Value> {
        self.client.call(op, self.payload(fields, opts)).await
    }

    pub async fn insert_one(&self, document: Value) -> Result<InsertOneResult> {
        self.call(ops::INSERT_ONE, [("document", document)], Value::empty_map())
            .await?
            .try_into()
    }

    pub async fn insert_many(&self, documents: Vec<Value>) -> Result<InsertManyResult> {
        self.call(ops::INSERT_MANY, [("documents", Value::Array(documents))], Value::empty_map())
            .await?
            .try_into()
    }

    /// Documents matching `filter`, in store order unless `options` sorts.
    pub async fn find(&self, filter: Value, options: FindOptions) -> Result<Vec<Value>> {
        let reply = self.call(ops::FIND, [("filter", filter)], options.to_value()).await?;
        into_documents(reply, ops::FIND)
    }

    /// First document matching `filter`, or `None`.
    pub async fn find_one(&self, filter: Value) -> Result<Option<Value>> {
        match self.call(ops::FIND_ONE, [("filter", filter)], Value::empty_map()).await? {
            Value::Nil => Ok(None),
            doc @ Value::Map(_) => Ok(Some(doc)),
            other => Err(BridgeError::Protocol(format!(
                "{}: expected a document or nil, got {other}",
                ops::FIND_ONE
            ))),
        }
    }

    pub async fn replace_one(&self, filter: Value, replacement: Value) -> Result<UpdateResult> {
        self.call(
            ops::REPLACE_ONE,
            [("filter", filter), ("replacement", replacement)],
            Value::empty_map(),
        )
        .await?
        .try_into()
    }

    pub async fn update_one(&self, filter: Value, update: Value) -> Result<UpdateResult> {
        self.call(ops::UPDATE_ONE, [("filter", filter), ("update", update)], Value::empty_map())
            .await?
            .try_into()
    }

    pub async fn update_many(&self, filter: Value, update: Value) -> Result<UpdateResult> {
        self.call(ops::UPDATE_MANY, [("filter", filter), ("update", update)], Value::empty_map())
            .await?
            .try_into()
    }

    pub async fn delete_one(&self, filter: Value) -> Result<DeleteResult> {
        self.call(ops::DELETE_ONE, [("filter", filter)], Value::empty_map())
            .await?
            .try_into()
    }

    pub async fn delete_many(&self, filter: Value) -> Result<DeleteResult> {
        self.call(ops::DELETE_MANY, [("filter", filter)], Value::empty_map())
            .await?
            .try_into()
    }

    /// Number of documents matching `filter`. Pass an empty map to count all.
    pub async fn count_documents(&self, filter: Value) -> Result<i64> {
        let reply = self
            .call(ops::COUNT_DOCUMENTS, [("filter", filter)], Value::empty_map())
            .await?;
        reply.as_i64().ok_or_else(|| {
            BridgeError::Protocol(format!("{}: expected an integer, got {reply}", ops::COUNT_DOCUMENTS))
        })
    }

    /// Run an aggregation pipeline (a list of stage documents).
    pub async fn aggregate(&self, pipeline: Vec<Value>) -> Result<Vec<Value>> {
        let reply = self
            .call(ops::AGGREGATE, [("pipeline", Value::Array(pipeline))], Value::empty_map())
            .await?;
        into_documents(reply, ops::AGGREGATE)
    }

    /// Drop the collection. Dropping a missing collection succeeds.
    pub async fn drop(&self) -> Result<()> {
        self.call(ops::DROP, [], Value::empty_map()).await?;
        Ok(())
    }
}

fn into_documents(reply: Value, op: &str) -> Result<Vec<Value>> {
    match reply {
        Value::Array(docs) => Ok(docs),
        Value::Nil => Ok(Vec::new()),
        other => Err(BridgeError::Protocol(format!("{op}: expected a list, got {other}"))),
    }
}
