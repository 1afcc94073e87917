use keel_core::{
    schema::Model,
    stmt::{Fields, Record},
    Result,
};

use async_trait::async_trait;

/// Receives lifecycle notifications around writes.
///
/// Every method defaults to doing nothing. An error returned from a `before_*`
/// hook aborts the write before any SQL runs; an error from an `after_*` hook
/// is returned to the caller after the SQL has run.
#[async_trait]
pub trait Subscriber: Send + Sync + 'static {
    /// Restricts the subscriber to one model, by name. `None` listens to
    /// everything, including writes against plain tables.
    fn listen_to(&self) -> Option<&str> {
        None
    }

    async fn before_insert(&self, _event: &InsertEvent<'_>) -> Result<()> {
        Ok(())
    }

    async fn after_insert(&self, _event: &InsertEvent<'_>) -> Result<()> {
        Ok(())
    }

    async fn before_update(&self, _event: &UpdateEvent<'_>) -> Result<()> {
        Ok(())
    }

    async fn after_update(&self, _event: &UpdateEvent<'_>) -> Result<()> {
        Ok(())
    }

    async fn before_delete(&self, _event: &DeleteEvent<'_>) -> Result<()> {
        Ok(())
    }

    async fn after_delete(&self, _event: &DeleteEvent<'_>) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug)]
pub struct InsertEvent<'a> {
    /// `None` for inserts into plain tables.
    pub model: Option<&'a Model>,

    /// Rows being inserted. After the insert, generated values are merged in.
    pub rows: &'a [Fields],
}

#[derive(Debug)]
pub struct UpdateEvent<'a> {
    pub model: Option<&'a Model>,
    pub values: &'a Fields,

    /// Entities the update targets, refreshed in the `after_update` event.
    pub entities: &'a [Record],
}

#[derive(Debug)]
pub struct DeleteEvent<'a> {
    pub model: Option<&'a Model>,
    pub entities: &'a [Record],
}

pub(crate) fn listens(subscriber: &dyn Subscriber, model: Option<&Model>) -> bool {
    match (subscriber.listen_to(), model) {
        (None, _) => true,
        (Some(name), Some(model)) => model.name == name,
        (Some(_), None) => false,
    }
}
