mod capability;
pub use capability::{
    Capability, DefaultValues, Dialect, LastInsertId, LimitSyntax, LockSyntax, OnConflictSyntax,
    PlaceholderStyle, QuoteStyle, ReturningKind, SpatialSyntax,
};

mod response;
pub use response::{Response, Rows};

use crate::{stmt::Sql, Result};

use async_trait::async_trait;
use std::fmt::Debug;

/// Executes finished SQL against a database.
///
/// Keel never opens connections itself. A driver receives the SQL text with
/// its placeholders already in the dialect's style, plus the bound values in
/// placeholder order, and returns either raw rows or an affected-row count.
#[async_trait]
pub trait Driver: Debug + Send + Sync + 'static {
    /// Describes the driver's capability, which informs the SQL keel emits.
    fn capability(&self) -> &Capability;

    /// Execute a statement
    async fn exec(&self, sql: &Sql) -> Result<Response>;
}
