use super::{Column, ColumnRole, Relation, Schema};

use std::fmt;

/// A mapped entity type.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    /// Uniquely identifies the model in the schema.
    pub id: ModelId,

    /// Entity name, used in error messages.
    pub name: String,

    /// Table (or view) the model is stored in. Single-table inheritance
    /// children share their root's table.
    pub table: String,

    pub kind: TableKind,

    /// Columns in declaration order, inherited columns first. A model with
    /// inheritance children also carries its descendants' columns, tagged with
    /// the descendant as [`Column::owner`].
    pub columns: Vec<Column>,

    pub relations: Vec<Relation>,

    /// Discriminator value identifying this model under single-table
    /// inheritance.
    pub discriminator_value: Option<String>,

    /// Inheritance parent.
    pub parent: Option<ModelId>,

    /// Direct inheritance children.
    pub children: Vec<ModelId>,
}

/// Uniquely identifies a model
#[derive(PartialEq, Eq, Clone, Copy, Hash, PartialOrd, Ord)]
pub struct ModelId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    Regular,

    /// View-backed; rows are identified by every selected column rather than a
    /// primary key.
    View,

    /// Many-to-many junction table.
    Junction,
}

impl Model {
    pub fn is_view(&self) -> bool {
        self.kind == TableKind::View
    }

    /// First column mapped to the property.
    pub fn column(&self, property: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.property == property)
    }

    /// Every column mapped to the property. Composite foreign keys map more
    /// than one column to the same relation property.
    pub fn columns_for_property<'a>(
        &'a self,
        property: &'a str,
    ) -> impl Iterator<Item = &'a Column> + 'a {
        self.columns.iter().filter(move |c| c.property == property)
    }

    pub fn column_by_name(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn primary_columns(&self) -> impl Iterator<Item = &Column> + '_ {
        self.columns.iter().filter(|c| c.primary_key)
    }

    pub fn relation(&self, property: &str) -> Option<&Relation> {
        self.relations.iter().find(|r| r.property == property)
    }

    pub fn version_column(&self) -> Option<&Column> {
        self.column_with_role(ColumnRole::Version)
    }

    pub fn update_date_column(&self) -> Option<&Column> {
        self.column_with_role(ColumnRole::UpdateDate)
    }

    pub fn create_date_column(&self) -> Option<&Column> {
        self.column_with_role(ColumnRole::CreateDate)
    }

    pub fn discriminator_column(&self) -> Option<&Column> {
        self.column_with_role(ColumnRole::Discriminator)
    }

    fn column_with_role(&self, role: ColumnRole) -> Option<&Column> {
        self.columns.iter().find(|c| c.role == role)
    }

    /// True when the model has no primary column that is a real property, as
    /// with junction tables whose keys are all foreign keys.
    pub fn has_only_virtual_primary_columns(&self) -> bool {
        self.primary_columns().all(|c| c.is_virtual)
    }

    /// Columns that belong to this model rather than to one of its
    /// inheritance descendants.
    pub fn own_columns<'a>(&'a self, schema: &'a Schema) -> impl Iterator<Item = &'a Column> + 'a {
        self.columns
            .iter()
            .filter(move |c| schema.is_same_or_ancestor(c.owner, self.id))
    }
}

impl ModelId {
    pub(crate) fn placeholder() -> Self {
        Self(usize::MAX)
    }
}

impl fmt::Debug for ModelId {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "ModelId({})", self.0)
    }
}
