use super::{Record, Value};
use crate::schema::ModelId;

/// A hydrated entity: the concrete model it was resolved to, plus its
/// properties.
///
/// Relations hold `Value::Entity`, `Value::List` of entities, or
/// `Value::Null` when joined but absent. A relation that was not joined has no
/// key at all.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub model: ModelId,
    pub record: Record,
}

impl Entity {
    /// Creates an empty entity of the given model.
    pub fn new(model: ModelId) -> Entity {
        Entity {
            model,
            record: Record::new(),
        }
    }

    pub fn get(&self, property: &str) -> Option<&Value> {
        self.record.get(property)
    }

    pub fn get_path(&self, path: &str) -> Option<&Value> {
        self.record.get_path(path)
    }

    pub fn set(&mut self, property: impl Into<String>, value: impl Into<Value>) {
        self.record.insert(property, value);
    }

    /// Returns the entity stored under a to-one relation property.
    pub fn related(&self, property: &str) -> Option<&Entity> {
        self.get(property)?.as_entity()
    }

    /// Returns the entities stored under a to-many relation property.
    pub fn related_many(&self, property: &str) -> Vec<&Entity> {
        self.get(property)
            .and_then(Value::as_list)
            .map(|items| items.iter().filter_map(Value::as_entity).collect())
            .unwrap_or_default()
    }
}
