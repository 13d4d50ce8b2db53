//! Typed document-store facade over the bridge.
//!
//! Each method becomes one call named `mongo.<method>` whose payload names
//! the database, the collection and the method's arguments. The worker owns
//! the actual driver; this layer only shapes requests and reads results.
//!
//! # Example
//!
//! ```ignore
//! use sidecar_bridge::mongo::{FindOptions, MongoClient};
//! use sidecar_bridge::{BridgeConfig, Value};
//!
//! let mongo = MongoClient::connect(BridgeConfig::from_env()?).await?;
//! let unit = mongo.database("testing").collection("unit");
//!
//! unit.insert_one(Value::map([("foo", "bar"), ("tid", 0)])).await?;
//! let page = unit
//!     .find(Value::map([("foo", "bar")]), FindOptions::new().skip(1).limit(1))
//!     .await?;
//! ```

mod collection;
mod database;
mod results;

pub use collection::Collection;
pub use database::Database;
pub use results::{DeleteResult, FindOptions, InsertManyResult, InsertOneResult, UpdateResult};

use crate::client::Client;
use crate::config::BridgeConfig;
use crate::error::Result;

/// Operation names understood by a document-store worker.
pub mod ops {
    pub const INSERT_ONE: &str = "mongo.insertOne";
    pub const INSERT_MANY: &str = "mongo.insertMany";
    pub const FIND: &str = "mongo.find";
    pub const FIND_ONE: &str = "mongo.findOne";
    pub const REPLACE_ONE: &str = "mongo.replaceOne";
    pub const UPDATE_ONE: &str = "mongo.updateOne";
    pub const UPDATE_MANY: &str = "mongo.updateMany";
    pub const DELETE_ONE: &str = "mongo.deleteOne";
    pub const DELETE_MANY: &str = "mongo.deleteMany";
    pub const COUNT_DOCUMENTS: &str = "mongo.countDocuments";
    pub const AGGREGATE: &str = "mongo.aggregate";
    pub const DROP: &str = "mongo.drop";
    pub const RUN_COMMAND: &str = "mongo.runCommand";
    pub const RUN_COMMAND_CURSOR: &str = "mongo.runCommandCursor";
}

/// Entry point of the facade. Cheap to clone.
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
}

impl MongoClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn connect(config: BridgeConfig) -> Result<Self> {
        Ok(Self::new(Client::connect(config).await?))
    }

    pub fn database(&self, name: &str) -> Database {
        Database::new(self.client.clone(), name.to_string())
    }

    /// The underlying bridge client.
    pub fn client(&self) -> &Client {
        &self.client
    }
}
