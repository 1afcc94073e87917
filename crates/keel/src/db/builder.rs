use super::{Db, Shared};
use crate::Subscriber;

use keel_core::{driver::Driver, Capability, Result, Schema};

use std::sync::Arc;

#[derive(Default)]
pub struct Builder {
    schema: Option<Schema>,

    /// Overrides the driver's own capability when set.
    capability: Option<Capability>,

    subscribers: Vec<Arc<dyn Subscriber>>,
    refresh_entities: Option<bool>,
    broadcast: Option<bool>,
}

impl Builder {
    pub fn schema(&mut self, schema: Schema) -> &mut Self {
        self.schema = Some(schema);
        self
    }

    pub fn capability(&mut self, capability: Capability) -> &mut Self {
        self.capability = Some(capability);
        self
    }

    /// Use the capability matching a connection URL's scheme.
    pub fn url(&mut self, url: &str) -> Result<&mut Self> {
        self.capability = Some(Capability::from_url(url)?);
        Ok(self)
    }

    pub fn subscriber(&mut self, subscriber: impl Subscriber) -> &mut Self {
        self.subscribers.push(Arc::new(subscriber));
        self
    }

    /// Whether writes reconcile generated values back onto the caller's
    /// rows and entities. Defaults to `true`.
    pub fn refresh_entities(&mut self, enabled: bool) -> &mut Self {
        self.refresh_entities = Some(enabled);
        self
    }

    /// Whether writes notify subscribers. Defaults to `true`.
    pub fn broadcast(&mut self, enabled: bool) -> &mut Self {
        self.broadcast = Some(enabled);
        self
    }

    pub fn build(&mut self, driver: impl Driver) -> Result<Db> {
        let Some(schema) = self.schema.take() else {
            keel_core::bail!("no schema configured");
        };

        let capability = match self.capability.take() {
            Some(capability) => capability,
            None => driver.capability().clone(),
        };

        tracing::debug!(
            dialect = %capability.dialect,
            models = schema.models.len(),
            subscribers = self.subscribers.len(),
            "building db"
        );

        Ok(Db {
            shared: Arc::new(Shared {
                schema,
                driver: Arc::new(driver),
                capability,
                subscribers: std::mem::take(&mut self.subscribers),
                refresh_entities: self.refresh_entities.unwrap_or(true),
                broadcast: self.broadcast.unwrap_or(true),
            }),
        })
    }
}
