pub mod driver;
pub use driver::{Capability, Driver};

mod error;
pub use error::{Error, ValuesMissingKind};

pub mod schema;
pub use schema::Schema;

pub mod stmt;

/// A Result type alias that uses keel's [`Error`] type.
pub type Result<T> = core::result::Result<T, Error>;

pub use async_trait::async_trait;
