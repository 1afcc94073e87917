mod builder;
pub use builder::{Builder, ModelDef};

mod column;
pub use column::{Column, ColumnRef, ColumnRole, Generation};

mod model;
pub use model::{Model, ModelId, TableKind};

mod relation;
pub use relation::{JoinColumn, JoinPath, Junction, Relation, RelationKind};

mod ty;
pub use ty::Type;

use crate::Result;

/// Registry of mapped models.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Schema {
    pub models: Vec<Model>,
}

impl Schema {
    pub fn builder() -> Builder {
        Builder::default()
    }

    #[track_caller]
    pub fn model(&self, id: impl Into<ModelId>) -> &Model {
        &self.models[id.into().0]
    }

    pub fn model_by_name(&self, name: &str) -> Result<&Model> {
        self.models
            .iter()
            .find(|model| model.name == name)
            .ok_or_else(|| crate::err!("model `{name}` is not registered"))
    }

    /// True when `ancestor` is `id` or one of its inheritance parents.
    pub fn is_same_or_ancestor(&self, ancestor: ModelId, id: ModelId) -> bool {
        let mut current = Some(id);

        while let Some(model) = current {
            if model == ancestor {
                return true;
            }
            current = self.model(model).parent;
        }

        false
    }

    /// Resolves the concrete model for a discriminator value, searching the
    /// whole inheritance tree below `base`. Falls back to `base`.
    pub fn resolve_discriminator(&self, base: ModelId, value: Option<&str>) -> ModelId {
        let Some(value) = value else {
            return base;
        };

        let mut stack = vec![base];

        while let Some(id) = stack.pop() {
            let model = self.model(id);

            if id != base && model.discriminator_value.as_deref() == Some(value) {
                return id;
            }

            stack.extend(model.children.iter().rev());
        }

        base
    }

    /// Discriminator values of `id` and every model below it.
    pub fn discriminator_values(&self, id: ModelId) -> Vec<String> {
        let mut values = vec![];
        let mut stack = vec![id];

        while let Some(id) = stack.pop() {
            let model = self.model(id);
            values.extend(model.discriminator_value.clone());
            stack.extend(model.children.iter().rev());
        }

        values
    }
}

impl From<&Model> for ModelId {
    fn from(value: &Model) -> Self {
        value.id
    }
}
