mod builder;
pub use builder::Builder;

use crate::{
    engine,
    subscriber::{self, DeleteEvent, InsertEvent, Subscriber, UpdateEvent},
    DeleteResult, InsertResult, UpdateResult,
};

use keel_core::{
    driver::{Driver, Response},
    schema::Model,
    stmt::{Entity, ExpressionMap, Fields, QueryKind, Record, Row, Sql, Value, ValueSet},
    Capability, Result, Schema,
};
use keel_sql::{RelationQuery, Serializer, Statement};

use std::{fmt, sync::Arc};

/// Shared state between all `Db` clones.
pub(crate) struct Shared {
    pub(crate) schema: Schema,
    pub(crate) driver: Arc<dyn Driver>,
    pub(crate) capability: Capability,
    pub(crate) subscribers: Vec<Arc<dyn Subscriber>>,
    pub(crate) refresh_entities: bool,
    pub(crate) broadcast: bool,
}

/// A database handle: schema, driver and lifecycle subscribers.
///
/// Cloning is cheap and every clone shares the same state.
#[derive(Clone)]
pub struct Db {
    shared: Arc<Shared>,
}

impl Db {
    pub fn builder() -> Builder {
        Builder::default()
    }

    pub fn schema(&self) -> &Schema {
        &self.shared.schema
    }

    pub fn capability(&self) -> &Capability {
        &self.shared.capability
    }

    /// Renders an expression map without executing it.
    pub fn serialize(&self, map: &ExpressionMap) -> Result<Statement> {
        Serializer::new(self.schema(), self.capability()).serialize(map)
    }

    /// Execute finished SQL on the driver. Driver errors are returned as is.
    pub async fn exec(&self, sql: &Sql) -> Result<Response> {
        tracing::debug!(
            sql = %sql.text,
            params = sql.values().len(),
            dialect = %self.capability().dialect,
            "exec"
        );
        self.shared.driver.exec(sql).await
    }

    /// Execute a select, returning hydrated entities.
    pub async fn find(&self, map: &ExpressionMap) -> Result<Vec<Entity>> {
        engine::find(self, map).await
    }

    pub async fn find_one(&self, map: &ExpressionMap) -> Result<Option<Entity>> {
        Ok(self.find(map).await?.into_iter().next())
    }

    /// Execute a select, returning the driver's rows without hydration.
    pub async fn raw(&self, map: &ExpressionMap) -> Result<Vec<Row>> {
        let statement = self.serialize(map)?;
        Ok(self.exec(&statement.sql).await?.rows.into_values())
    }

    /// Insert the map's value set.
    ///
    /// Values produced during the insert are merged back into the value set
    /// when refreshing is enabled. An empty list of rows returns immediately
    /// without executing anything or notifying subscribers.
    pub async fn insert(&self, map: &mut ExpressionMap) -> Result<InsertResult> {
        if matches!(&map.value_set, Some(ValueSet::Many(rows)) if rows.is_empty()) {
            tracing::debug!("insert without rows; nothing to execute");
            return Ok(InsertResult::default());
        }

        let statement = self.serialize(map)?;
        let model = map.main_model(self.schema());
        let broadcast = self.broadcasts(map);

        if broadcast {
            tracing::debug!("before insert");
            let event = InsertEvent {
                model,
                rows: rows(map),
            };
            for subscriber in self.listeners(model) {
                subscriber.before_insert(&event).await?;
            }
        }

        let response = self.exec(&statement.sql).await?;

        let mut generated = statement.generated;
        generated.resize_with(rows(map).len(), Record::new);

        if let (Some(model), Some(value_set)) = (model, &mut map.value_set) {
            if self.shared.refresh_entities && map.update_entity {
                engine::refresh_insert(self, model, value_set.rows(), &mut generated, &response)
                    .await?;
            }

            for (fields, generated) in value_set.rows_mut().iter_mut().zip(&generated) {
                fields.merge_generated(generated);
            }
        }

        let identifiers = match model {
            Some(model) => rows(map)
                .iter()
                .map(|fields| identifier(model, fields))
                .collect(),
            None => vec![],
        };

        let result = InsertResult {
            identifiers,
            generated_maps: generated,
            affected: response.rows.affected(),
            raw: response.rows.into_values(),
        };

        if broadcast {
            let event = InsertEvent {
                model,
                rows: rows(map),
            };
            for subscriber in self.listeners(model) {
                subscriber.after_insert(&event).await?;
            }
            tracing::debug!("after insert");
        }

        Ok(result)
    }

    /// Update the rows matched by the map's where clauses.
    ///
    /// Entities listed with `where_entity` receive refreshed version and
    /// update-date values when refreshing is enabled.
    pub async fn update(&self, map: &mut ExpressionMap) -> Result<UpdateResult> {
        let statement = self.serialize(map)?;
        let model = map.main_model(self.schema());
        let broadcast = self.broadcasts(map);

        let values = match &map.value_set {
            Some(ValueSet::One(fields)) => fields.clone(),
            _ => Fields::new(),
        };

        if broadcast {
            tracing::debug!("before update");
            let event = UpdateEvent {
                model,
                values: &values,
                entities: &map.where_entities,
            };
            for subscriber in self.listeners(model) {
                subscriber.before_update(&event).await?;
            }
        }

        let response = self.exec(&statement.sql).await?;

        let mut generated_maps = vec![];
        if let Some(model) = model {
            if self.shared.refresh_entities && map.update_entity {
                generated_maps =
                    engine::refresh_update(self, model, &map.where_entities, &response).await?;

                for (entity, generated) in map.where_entities.iter_mut().zip(&generated_maps) {
                    entity.merge(generated);
                }
            }
        }

        let result = UpdateResult {
            affected: response.rows.affected(),
            generated_maps,
            entities: map.where_entities.clone(),
            raw: response.rows.into_values(),
        };

        if broadcast {
            let event = UpdateEvent {
                model,
                values: &values,
                entities: &map.where_entities,
            };
            for subscriber in self.listeners(model) {
                subscriber.after_update(&event).await?;
            }
            tracing::debug!("after update");
        }

        Ok(result)
    }

    pub async fn delete(&self, map: &ExpressionMap) -> Result<DeleteResult> {
        let statement = self.serialize(map)?;
        let model = map.main_model(self.schema());
        let broadcast = self.broadcasts(map);
        let event = DeleteEvent {
            model,
            entities: &map.where_entities,
        };

        if broadcast {
            tracing::debug!("before delete");
            for subscriber in self.listeners(model) {
                subscriber.before_delete(&event).await?;
            }
        }

        let response = self.exec(&statement.sql).await?;

        if broadcast {
            for subscriber in self.listeners(model) {
                subscriber.after_delete(&event).await?;
            }
            tracing::debug!("after delete");
        }

        Ok(DeleteResult {
            affected: response.rows.affected(),
            raw: response.rows.into_values(),
        })
    }

    /// Points a to-one relation of `of` at `value` (`Value::Null` clears it).
    pub async fn set_relation(
        &self,
        model: &str,
        relation: &str,
        of: impl Into<Value>,
        value: impl Into<Value>,
    ) -> Result<u64> {
        let model = self.schema().model_by_name(model)?;
        let mut map = RelationQuery::new(self.schema(), model, relation)?.set(of.into(), value.into())?;
        self.write(&mut map).await
    }

    /// Links `values` into a to-many relation of `of`.
    pub async fn add_relation(
        &self,
        model: &str,
        relation: &str,
        of: impl Into<Value>,
        values: Vec<Value>,
    ) -> Result<u64> {
        let model = self.schema().model_by_name(model)?;
        let mut map = RelationQuery::new(self.schema(), model, relation)?.add(of.into(), values)?;
        self.write(&mut map).await
    }

    /// Unlinks `values` from a to-many relation of `of`.
    pub async fn remove_relation(
        &self,
        model: &str,
        relation: &str,
        of: impl Into<Value>,
        values: Vec<Value>,
    ) -> Result<u64> {
        let model = self.schema().model_by_name(model)?;
        let mut map =
            RelationQuery::new(self.schema(), model, relation)?.remove(of.into(), values)?;
        self.write(&mut map).await
    }

    async fn write(&self, map: &mut ExpressionMap) -> Result<u64> {
        Ok(match map.kind {
            QueryKind::Insert => self.insert(map).await?.affected,
            QueryKind::Update => self.update(map).await?.affected,
            QueryKind::Delete => self.delete(map).await?.affected,
            QueryKind::Select => keel_core::bail!("relation changes never select"),
        })
    }

    fn broadcasts(&self, map: &ExpressionMap) -> bool {
        self.shared.broadcast && map.call_listeners
    }

    fn listeners(&self, model: Option<&Model>) -> Vec<Arc<dyn Subscriber>> {
        self.shared
            .subscribers
            .iter()
            .filter(|subscriber| subscriber::listens(subscriber.as_ref(), model))
            .cloned()
            .collect()
    }
}

impl fmt::Debug for Db {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Db")
            .field("driver", &self.shared.driver)
            .field("dialect", &self.shared.capability.dialect)
            .field("subscribers", &self.shared.subscribers.len())
            .finish()
    }
}

fn rows(map: &ExpressionMap) -> &[Fields] {
    map.value_set.as_ref().map(ValueSet::rows).unwrap_or_default()
}

fn identifier(model: &Model, fields: &Fields) -> Record {
    let values = fields.to_record();
    model
        .primary_columns()
        .filter_map(|column| {
            let value = values.get(&column.property)?;
            Some((column.property.clone(), value.clone()))
        })
        .collect()
}
