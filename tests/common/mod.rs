//! Shared helpers for socket-level tests.
//!
//! [`spawn_store_worker`] runs a `Worker` that serves the `mongo.*`
//! operations from an in-memory store. It understands equality filters,
//! `$inc`/`$set` updates, `skip`/`limit`/`sort`, and `$match`/`$group`
//! pipelines with `$sum`, which is all the facade scenarios need.

#![allow(dead_code)]

use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use sidecar_bridge::mongo::{ops, MongoClient};
use sidecar_bridge::transport::generate_socket_path;
use sidecar_bridge::worker::{HandlerResult, RunningWorker, WorkerBuilder, INVALID_PAYLOAD};
use sidecar_bridge::{Client, RemoteError, Value, Worker};

/// Bind `builder` on a fresh socket path and serve it in the background.
pub async fn spawn_worker(builder: WorkerBuilder) -> RunningWorker {
    builder
        .build()
        .bind(&generate_socket_path())
        .await
        .unwrap()
        .spawn()
}

pub async fn connect(worker: &RunningWorker, connections: usize) -> Client {
    Client::builder()
        .socket_address(worker.path())
        .connections(connections)
        .connect()
        .await
        .unwrap()
}

pub async fn spawn_store_worker() -> RunningWorker {
    spawn_worker(store_worker(Arc::new(Store::default()))).await
}

pub async fn mongo_client(worker: &RunningWorker) -> MongoClient {
    MongoClient::new(connect(worker, 1).await)
}

type Op = fn(&Store, &Value) -> HandlerResult;

fn route(builder: WorkerBuilder, store: &Arc<Store>, operation: &str, op: Op) -> WorkerBuilder {
    let store = store.clone();
    builder.handle(operation, move |args: Value| {
        let store = store.clone();
        async move { op(&store, &args) }
    })
}

pub fn store_worker(store: Arc<Store>) -> WorkerBuilder {
    let routes: [(&str, Op); 14] = [
        (ops::INSERT_ONE, Store::insert_one),
        (ops::INSERT_MANY, Store::insert_many),
        (ops::FIND, Store::find),
        (ops::FIND_ONE, Store::find_one),
        (ops::REPLACE_ONE, Store::replace_one),
        (ops::UPDATE_ONE, |s, a| s.update(a, false)),
        (ops::UPDATE_MANY, |s, a| s.update(a, true)),
        (ops::DELETE_ONE, |s, a| s.delete(a, false)),
        (ops::DELETE_MANY, |s, a| s.delete(a, true)),
        (ops::COUNT_DOCUMENTS, Store::count_documents),
        (ops::AGGREGATE, Store::aggregate),
        (ops::DROP, Store::drop_collection),
        (ops::RUN_COMMAND, Store::run_command),
        (ops::RUN_COMMAND_CURSOR, Store::run_command_cursor),
    ];

    routes
        .into_iter()
        .fold(Worker::builder(), |builder, (name, op)| route(builder, &store, name, op))
}

fn invalid(message: impl Into<String>) -> RemoteError {
    RemoteError::new(INVALID_PAYLOAD, 0, message)
}

fn arg<'a>(args: &'a Value, key: &str) -> Result<&'a Value, RemoteError> {
    args.get(key).ok_or_else(|| invalid(format!("missing field {key:?}")))
}

fn arg_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, RemoteError> {
    arg(args, key)?
        .as_str()
        .ok_or_else(|| invalid(format!("field {key:?} must be a string")))
}

fn opt_i64(args: &Value, key: &str) -> Option<i64> {
    args.get("opts").and_then(|o| o.get(key)).and_then(Value::as_i64)
}

fn matches(doc: &Value, filter: &Value) -> bool {
    filter
        .as_map()
        .unwrap_or_default()
        .iter()
        .all(|(k, v)| doc.get(k.clone()).is_some_and(|d| d.loosely_equals(v)))
}

fn compare(a: &Value, b: &Value) -> CmpOrdering {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(CmpOrdering::Equal),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

fn add(current: Option<&Value>, delta: &Value) -> Value {
    match (current.and_then(Value::as_i64), delta.as_i64()) {
        (Some(a), Some(b)) => Value::Int(a + b),
        _ => Value::Float(current.and_then(Value::as_f64).unwrap_or(0.0) + delta.as_f64().unwrap_or(0.0)),
    }
}

#[derive(Default)]
pub struct Store {
    collections: Mutex<HashMap<(String, String), Vec<Value>>>,
    next_id: AtomicI64,
}

impl Store {
    fn with_collection<T>(&self, args: &Value, f: impl FnOnce(&mut Vec<Value>) -> T) -> Result<T, RemoteError> {
        let key = (
            arg_str(args, "database")?.to_string(),
            arg_str(args, "collection")?.to_string(),
        );
        let mut collections = self.collections.lock().unwrap();
        Ok(f(collections.entry(key).or_default()))
    }

    fn with_id(&self, mut doc: Value) -> Result<(Value, Value), RemoteError> {
        if doc.as_map().is_none() {
            return Err(invalid("documents must be maps"));
        }
        let id = match doc.get("_id") {
            Some(id) => id.clone(),
            None => {
                let id = Value::Int(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
                doc.insert("_id", id.clone());
                id
            }
        };
        Ok((id, doc))
    }

    fn insert_one(&self, args: &Value) -> HandlerResult {
        let (id, doc) = self.with_id(arg(args, "document")?.clone())?;
        self.with_collection(args, |docs| docs.push(doc))?;
        Ok(Value::map([("inserted_id", id)]))
    }

    fn insert_many(&self, args: &Value) -> HandlerResult {
        let documents = arg(args, "documents")?
            .as_array()
            .ok_or_else(|| invalid("documents must be a list"))?;
        let prepared = documents
            .iter()
            .map(|doc| self.with_id(doc.clone()))
            .collect::<Result<Vec<_>, _>>()?;

        let ids: Vec<Value> = prepared.iter().map(|(id, _)| id.clone()).collect();
        self.with_collection(args, |docs| docs.extend(prepared.into_iter().map(|(_, doc)| doc)))?;
        Ok(Value::map([("inserted_ids", Value::Array(ids))]))
    }

    fn find(&self, args: &Value) -> HandlerResult {
        let filter = arg(args, "filter")?;
        let mut found = self.with_collection(args, |docs| {
            docs.iter().filter(|d| matches(d, filter)).cloned().collect::<Vec<_>>()
        })?;

        if let Some((field, direction)) = args
            .get("opts")
            .and_then(|o| o.get("sort"))
            .and_then(Value::as_map)
            .and_then(|s| s.first())
        {
            let descending = direction.as_i64() == Some(-1);
            found.sort_by(|a, b| {
                let ord = compare(a.get(field.clone()).unwrap_or(&Value::Nil), b.get(field.clone()).unwrap_or(&Value::Nil));
                if descending { ord.reverse() } else { ord }
            });
        }

        let skip = opt_i64(args, "skip").unwrap_or(0).max(0) as usize;
        let limit = match opt_i64(args, "limit") {
            Some(n) if n > 0 => n as usize,
            _ => usize::MAX,
        };
        Ok(Value::Array(found.into_iter().skip(skip).take(limit).collect()))
    }

    fn find_one(&self, args: &Value) -> HandlerResult {
        let filter = arg(args, "filter")?;
        self.with_collection(args, |docs| {
            docs.iter().find(|d| matches(d, filter)).cloned().unwrap_or_default()
        })
    }

    fn replace_one(&self, args: &Value) -> HandlerResult {
        let filter = arg(args, "filter")?;
        let mut replacement = arg(args, "replacement")?.clone();
        let matched = self.with_collection(args, |docs| {
            let Some(doc) = docs.iter_mut().find(|d| matches(d, filter)) else {
                return 0;
            };
            if let Some(id) = doc.get("_id") {
                replacement.insert("_id", id.clone());
            }
            *doc = replacement;
            1
        })?;
        Ok(update_result(matched))
    }

    fn update(&self, args: &Value, many: bool) -> HandlerResult {
        let filter = arg(args, "filter")?;
        let update = arg(args, "update")?;
        let inc = update.get("$inc").and_then(Value::as_map).unwrap_or_default();
        let set = update.get("$set").and_then(Value::as_map).unwrap_or_default();
        if inc.is_empty() && set.is_empty() {
            return Err(invalid("update needs $inc or $set"));
        }

        let matched = self.with_collection(args, |docs| {
            let mut matched = 0;
            for doc in docs.iter_mut().filter(|d| matches(d, filter)) {
                for (field, delta) in inc {
                    let next = add(doc.get(field.clone()), delta);
                    doc.insert(field.clone(), next);
                }
                for (field, value) in set {
                    doc.insert(field.clone(), value.clone());
                }
                matched += 1;
                if !many {
                    break;
                }
            }
            matched
        })?;
        Ok(update_result(matched))
    }

    fn delete(&self, args: &Value, many: bool) -> HandlerResult {
        let filter = arg(args, "filter")?;
        let deleted = self.with_collection(args, |docs| {
            let before = docs.len();
            if many {
                docs.retain(|d| !matches(d, filter));
            } else if let Some(pos) = docs.iter().position(|d| matches(d, filter)) {
                docs.remove(pos);
            }
            (before - docs.len()) as i64
        })?;
        Ok(Value::map([("deleted_count", deleted)]))
    }

    fn count_documents(&self, args: &Value) -> HandlerResult {
        let filter = arg(args, "filter")?;
        let count = self.with_collection(args, |docs| docs.iter().filter(|d| matches(d, filter)).count())?;
        Ok(Value::Int(count as i64))
    }

    fn aggregate(&self, args: &Value) -> HandlerResult {
        let pipeline = arg(args, "pipeline")?
            .as_array()
            .ok_or_else(|| invalid("pipeline must be a list"))?;
        let mut docs = self.with_collection(args, |docs| docs.clone())?;

        for stage in pipeline {
            let Some([(name, body)]) = stage.as_map() else {
                return Err(invalid("each stage must have exactly one operator"));
            };
            docs = match name.as_str() {
                Some("$match") => docs.into_iter().filter(|d| matches(d, body)).collect(),
                Some("$group") => group(docs, body)?,
                Some("$limit") => docs.into_iter().take(body.as_i64().unwrap_or(0).max(0) as usize).collect(),
                _ => return Err(invalid(format!("unsupported stage {name}"))),
            };
        }
        Ok(Value::Array(docs))
    }

    fn drop_collection(&self, args: &Value) -> HandlerResult {
        let key = (
            arg_str(args, "database")?.to_string(),
            arg_str(args, "collection")?.to_string(),
        );
        self.collections.lock().unwrap().remove(&key);
        Ok(Value::Nil)
    }

    fn run_command(&self, args: &Value) -> HandlerResult {
        match command_name(args)?.as_str() {
            "ping" => Ok(Value::map([("ok", 1)])),
            other => Err(RemoteError::new("command_not_found", 59, format!("no such command: '{other}'"))),
        }
    }

    fn run_command_cursor(&self, args: &Value) -> HandlerResult {
        let database = arg_str(args, "database")?;
        match command_name(args)?.as_str() {
            "listCollections" => {
                let mut names: Vec<String> = self
                    .collections
                    .lock()
                    .unwrap()
                    .keys()
                    .filter(|(db, _)| db == database)
                    .map(|(_, coll)| coll.clone())
                    .collect();
                names.sort();
                Ok(Value::array(names.into_iter().map(|name| {
                    Value::map([("name", Value::from(name)), ("type", Value::from("collection"))])
                })))
            }
            other => Err(RemoteError::new("command_not_found", 59, format!("no such command: '{other}'"))),
        }
    }
}

fn command_name(args: &Value) -> Result<String, RemoteError> {
    arg(args, "command")?
        .as_map()
        .and_then(|entries| entries.first())
        .and_then(|(name, _)| name.as_str())
        .map(str::to_string)
        .ok_or_else(|| invalid("command must be a non-empty map"))
}

fn update_result(matched: i64) -> Value {
    Value::map([
        ("matched_count", Value::from(matched)),
        ("modified_count", Value::from(matched)),
        ("upserted_id", Value::Nil),
    ])
}

/// `{_id: "$field" | literal, <out>: {$sum: "$field" | number}, ...}`
fn group(docs: Vec<Value>, spec: &Value) -> Result<Vec<Value>, RemoteError> {
    let entries = spec.as_map().ok_or_else(|| invalid("$group takes a map"))?;
    let key_expr = spec.get("_id").ok_or_else(|| invalid("$group needs _id"))?;

    let resolve = |doc: &Value, expr: &Value| -> Value {
        match expr.as_str().and_then(|s| s.strip_prefix('$')) {
            Some(field) => doc.get(field).cloned().unwrap_or_default(),
            None => expr.clone(),
        }
    };

    let mut groups: Vec<Value> = Vec::new();
    for doc in &docs {
        let key = resolve(doc, key_expr);
        let pos = match groups.iter().position(|g| g.get("_id") == Some(&key)) {
            Some(pos) => pos,
            None => {
                groups.push(Value::map([("_id", key)]));
                groups.len() - 1
            }
        };

        for (out, acc) in entries.iter().filter(|(k, _)| k.as_str() != Some("_id")) {
            let operand = acc
                .get("$sum")
                .ok_or_else(|| invalid(format!("unsupported accumulator for {out}")))?;
            let next = add(groups[pos].get(out.clone()), &resolve(doc, operand));
            groups[pos].insert(out.clone(), next);
        }
    }
    Ok(groups)
}
