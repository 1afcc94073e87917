pub mod db;
pub use db::Db;

mod engine;

mod result;
pub use result::{DeleteResult, InsertResult, UpdateResult};

pub mod subscriber;
pub use subscriber::Subscriber;

pub use keel_core::{async_trait, driver, schema, stmt, Capability, Error, Result, Schema};
pub use keel_sql::{Serializer, Statement};
