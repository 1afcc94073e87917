use super::{Model, ModelId, Schema};

use std::fmt;

/// A relation between two models.
#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    /// Property the related entity (or entities) are assigned to.
    pub property: String,

    pub kind: RelationKind,

    /// Model on the other side of the relation.
    pub target: ModelId,

    /// True when this side stores the join columns (or, for many-to-many,
    /// declares the junction table).
    pub owner: bool,

    /// Owning side only: local foreign key columns and the target properties
    /// they reference. Empty for many-to-many.
    pub join_columns: Vec<JoinColumn>,

    /// Property of the relation on the target model that pairs with this one.
    /// Required on the non-owning side.
    pub inverse: Option<String>,

    /// Owning many-to-many only: the junction table.
    pub junction: Option<Junction>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    OneToOne,
    ManyToOne,
    OneToMany,
    ManyToMany,
}

/// A foreign key column on the owning side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinColumn {
    /// Database name of the foreign key column.
    pub name: String,

    /// Property of the referenced column on the other model.
    pub referenced: String,
}

/// Junction table backing a many-to-many relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Junction {
    pub table: String,

    /// Junction columns pointing at the owning model.
    pub owner_columns: Vec<JoinColumn>,

    /// Junction columns pointing at the target model.
    pub inverse_columns: Vec<JoinColumn>,
}

/// Join columns of a relation, resolved from whichever side owns them.
/// All names are database column names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinPath {
    /// Parent holds the foreign key: `parent.fk = child.referenced`.
    Owner { pairs: Vec<(String, String)> },

    /// Child holds the foreign key: `child.fk = parent.referenced`.
    Inverse { pairs: Vec<(String, String)> },

    /// Through a junction table. Both pair lists are
    /// `(referenced column, junction column)`, for the parent and the child
    /// respectively.
    Junction {
        table: String,
        parent: Vec<(String, String)>,
        child: Vec<(String, String)>,
    },
}

impl Relation {
    pub fn new(property: impl Into<String>, kind: RelationKind, target: ModelId) -> Relation {
        Relation {
            property: property.into(),
            kind,
            target,
            owner: false,
            join_columns: vec![],
            inverse: None,
            junction: None,
        }
    }

    /// True when the relation yields at most one entity.
    pub fn is_to_one(&self) -> bool {
        matches!(self.kind, RelationKind::OneToOne | RelationKind::ManyToOne)
    }

    pub fn is_to_many(&self) -> bool {
        !self.is_to_one()
    }

    pub fn target<'a>(&self, schema: &'a Schema) -> &'a Model {
        schema.model(self.target)
    }

    /// The paired relation declared on the target model.
    pub fn inverse_relation<'a>(&self, schema: &'a Schema) -> Option<&'a Relation> {
        let inverse = self.inverse.as_deref()?;
        self.target(schema).relation(inverse)
    }

    /// Resolves the column pairs that connect `model` (which declares this
    /// relation) to the target. Names returned are database column names.
    pub fn join_path(&self, schema: &Schema, model: &Model) -> Option<JoinPath> {
        let target = self.target(schema);

        if self.owner {
            if let Some(junction) = &self.junction {
                return Some(JoinPath::Junction {
                    table: junction.table.clone(),
                    parent: referenced_pairs(model, &junction.owner_columns)?,
                    child: referenced_pairs(target, &junction.inverse_columns)?,
                });
            }

            let pairs = self
                .join_columns
                .iter()
                .map(|jc| {
                    let referenced = target.column(&jc.referenced)?;
                    Some((jc.name.clone(), referenced.name.clone()))
                })
                .collect::<Option<Vec<_>>>()?;

            return Some(JoinPath::Owner { pairs });
        }

        let inverse = self.inverse_relation(schema)?;

        if let Some(junction) = &inverse.junction {
            // Walk the owner's junction the other way around.
            return Some(JoinPath::Junction {
                table: junction.table.clone(),
                parent: referenced_pairs(model, &junction.inverse_columns)?,
                child: referenced_pairs(target, &junction.owner_columns)?,
            });
        }

        let pairs = inverse
            .join_columns
            .iter()
            .map(|jc| {
                let referenced = model.column(&jc.referenced)?;
                Some((jc.name.clone(), referenced.name.clone()))
            })
            .collect::<Option<Vec<_>>>()?;

        Some(JoinPath::Inverse { pairs })
    }
}

/// Pairs of (referenced column name on `model`, junction column name).
fn referenced_pairs(model: &Model, columns: &[JoinColumn]) -> Option<Vec<(String, String)>> {
    columns
        .iter()
        .map(|jc| {
            let referenced = model.column(&jc.referenced)?;
            Some((referenced.name.clone(), jc.name.clone()))
        })
        .collect()
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RelationKind::OneToOne => "one-to-one",
            RelationKind::ManyToOne => "many-to-one",
            RelationKind::OneToMany => "one-to-many",
            RelationKind::ManyToMany => "many-to-many",
        })
    }
}
