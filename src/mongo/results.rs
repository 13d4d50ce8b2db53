//! Typed results and options for collection operations.
//!
//! Results are read out of reply maps with the numeric coercion of
//! [`Value::as_i64`], so a count sent as `"3"` reads as `3`.

use crate::error::{BridgeError, Result};
use crate::value::Value;

fn expect_map<'a>(reply: &'a Value, what: &str) -> Result<&'a Value> {
    if reply.as_map().is_some() {
        Ok(reply)
    } else {
        Err(BridgeError::Protocol(format!("{what}: expected a map, got {reply}")))
    }
}

fn field_i64(reply: &Value, key: &str, what: &str) -> Result<i64> {
    reply
        .get(key)
        .and_then(Value::as_i64)
        .ok_or_else(|| BridgeError::Protocol(format!("{what}: missing integer field {key:?}")))
}

fn field(reply: &Value, key: &str) -> Option<Value> {
    reply.get(key).filter(|v| !v.is_nil()).cloned()
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertOneResult {
    pub inserted_id: Value,
}

impl TryFrom<Value> for InsertOneResult {
    type Error = BridgeError;

    fn try_from(reply: Value) -> Result<Self> {
        let reply = expect_map(&reply, "insertOne")?;
        Ok(Self {
            inserted_id: field(reply, "inserted_id").unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertManyResult {
    /// Ids in the order the documents were given.
    pub inserted_ids: Vec<Value>,
}

impl TryFrom<Value> for InsertManyResult {
    type Error = BridgeError;

    fn try_from(reply: Value) -> Result<Self> {
        let reply = expect_map(&reply, "insertMany")?;
        let ids = reply
            .get("inserted_ids")
            .and_then(Value::as_array)
            .ok_or_else(|| BridgeError::Protocol("insertMany: missing inserted_ids".to_string()))?;
        Ok(Self {
            inserted_ids: ids.to_vec(),
        })
    }
}

/// Outcome of a replace or update.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateResult {
    pub matched_count: i64,
    pub modified_count: i64,
    pub upserted_id: Option<Value>,
}

impl TryFrom<Value> for UpdateResult {
    type Error = BridgeError;

    fn try_from(reply: Value) -> Result<Self> {
        let reply = expect_map(&reply, "update")?;
        Ok(Self {
            matched_count: field_i64(reply, "matched_count", "update")?,
            modified_count: field_i64(reply, "modified_count", "update")?,
            upserted_id: field(reply, "upserted_id"),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteResult {
    pub deleted_count: i64,
}

impl TryFrom<Value> for DeleteResult {
    type Error = BridgeError;

    fn try_from(reply: Value) -> Result<Self> {
        let reply = expect_map(&reply, "delete")?;
        Ok(Self {
            deleted_count: field_i64(reply, "deleted_count", "delete")?,
        })
    }
}

/// Modifiers for [`Collection::find`](super::Collection::find).
///
/// ```
/// use sidecar_bridge::mongo::FindOptions;
///
/// let opts = FindOptions::new().skip(1).limit(1);
/// assert_eq!(opts.skip, Some(1));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
    pub sort: Option<Value>,
    pub projection: Option<Value>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skip(mut self, skip: i64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn sort(mut self, sort: Value) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn projection(mut self, projection: Value) -> Self {
        self.projection = Some(projection);
        self
    }

    /// Wire form: only the options that are set.
    pub fn to_value(&self) -> Value {
        let mut opts = Value::empty_map();
        if let Some(skip) = self.skip {
            opts.insert("skip", skip);
        }
        if let Some(limit) = self.limit {
            opts.insert("limit", limit);
        }
        if let Some(sort) = &self.sort {
            opts.insert("sort", sort.clone());
        }
        if let Some(projection) = &self.projection {
            opts.insert("projection", projection.clone());
        }
        opts
    }
}
