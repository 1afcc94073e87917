use crate::schema::ModelId;

/// A named source participating in a query.
#[derive(Debug, Clone, PartialEq)]
pub struct Alias {
    pub name: String,
    pub source: AliasSource,
}

/// What an alias refers to. A source is either a mapped model or raw, never
/// both.
#[derive(Debug, Clone, PartialEq)]
pub enum AliasSource {
    /// A mapped model; columns and relations come from its metadata.
    Model(ModelId),

    /// A table addressed by name without metadata.
    Table(String),

    /// A subquery, spliced as `(<sql>) alias`.
    Subquery(String),
}

impl Alias {
    pub fn model(name: impl Into<String>, model: ModelId) -> Alias {
        Alias {
            name: name.into(),
            source: AliasSource::Model(model),
        }
    }

    pub fn table(name: impl Into<String>, table: impl Into<String>) -> Alias {
        Alias {
            name: name.into(),
            source: AliasSource::Table(table.into()),
        }
    }

    pub fn subquery(name: impl Into<String>, sql: impl Into<String>) -> Alias {
        Alias {
            name: name.into(),
            source: AliasSource::Subquery(sql.into()),
        }
    }

    /// The mapped model, if any.
    pub fn model_id(&self) -> Option<ModelId> {
        match &self.source {
            AliasSource::Model(id) => Some(*id),
            _ => None,
        }
    }

    pub fn is_mapped(&self) -> bool {
        self.model_id().is_some()
    }
}
