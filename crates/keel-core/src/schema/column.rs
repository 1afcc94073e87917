use super::{ModelId, Type};

/// A mapped column.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Property on the entity the column is read from and written to. For a
    /// foreign key column this is the owning relation's property.
    pub property: String,

    /// The name of the column in the database.
    pub name: String,

    /// Database storage type.
    pub ty: Type,

    /// Whether or not the column is nullable
    pub nullable: bool,

    /// True if the column is part of the model's primary key
    pub primary_key: bool,

    /// How the database (or keel) generates values for this column.
    pub generation: Generation,

    /// SQL default expression declared on the column, e.g. `now()`.
    pub default: Option<String>,

    /// For foreign key columns, the column on the target model this one points
    /// at.
    pub references: Option<ColumnRef>,

    /// Whether the column is written by INSERT statements.
    pub insert: bool,

    /// Whether the column is written by UPDATE statements.
    pub update: bool,

    /// Special role the column plays for its model.
    pub role: ColumnRole,

    /// Internal columns (foreign keys backing a relation, junction keys) are
    /// persisted but never hydrated as plain properties.
    pub is_virtual: bool,

    /// Spatial reference system id for geometry/geography columns.
    pub srid: Option<i32>,

    /// The model that declared this column. Differs from the containing model
    /// for columns inherited through single-table inheritance.
    pub owner: ModelId,
}

/// Value generation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generation {
    None,

    /// Auto-increment / serial integer.
    Increment,

    /// UUID generated by the database when supported, otherwise by keel.
    Uuid,

    /// Database row id.
    Rowid,

    /// SQL standard identity column. `always` identities reject explicit values
    /// unless overridden.
    Identity { always: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    Regular,

    /// Optimistic lock counter, incremented on every update.
    Version,

    /// Set by the database on insert.
    CreateDate,

    /// Touched on every update.
    UpdateDate,

    /// Single-table inheritance type tag.
    Discriminator,
}

/// Reference from a foreign key column to a column on another model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    pub model: ModelId,

    /// Property of the referenced column.
    pub property: String,
}

impl Column {
    /// A plain insertable, updatable column whose database name matches its
    /// property.
    pub fn new(property: impl Into<String>, ty: Type) -> Column {
        let property = property.into();

        Column {
            name: property.clone(),
            property,
            ty,
            nullable: false,
            primary_key: false,
            generation: Generation::None,
            default: None,
            references: None,
            insert: true,
            update: true,
            role: ColumnRole::Regular,
            is_virtual: false,
            srid: None,
            owner: ModelId::placeholder(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Column {
        self.name = name.into();
        self
    }

    pub fn nullable(mut self) -> Column {
        self.nullable = true;
        self
    }

    pub fn primary(mut self) -> Column {
        self.primary_key = true;
        self
    }

    pub fn generated(mut self, generation: Generation) -> Column {
        self.generation = generation;
        self
    }

    pub fn default(mut self, sql: impl Into<String>) -> Column {
        self.default = Some(sql.into());
        self
    }

    pub fn role(mut self, role: ColumnRole) -> Column {
        self.role = role;
        self
    }

    pub fn readonly(mut self) -> Column {
        self.insert = false;
        self.update = false;
        self
    }

    pub fn no_update(mut self) -> Column {
        self.update = false;
        self
    }

    pub fn srid(mut self, srid: i32) -> Column {
        self.srid = Some(srid);
        self
    }

    pub fn is_generated(&self) -> bool {
        self.generation != Generation::None
    }

    /// True when the database assigns the value on insert without the column
    /// being listed.
    pub fn is_increment(&self) -> bool {
        matches!(
            self.generation,
            Generation::Increment | Generation::Rowid | Generation::Identity { .. }
        )
    }

    pub fn is_version(&self) -> bool {
        self.role == ColumnRole::Version
    }

    pub fn is_update_date(&self) -> bool {
        self.role == ColumnRole::UpdateDate
    }

    pub fn is_create_date(&self) -> bool {
        self.role == ColumnRole::CreateDate
    }

    pub fn is_discriminator(&self) -> bool {
        self.role == ColumnRole::Discriminator
    }

    /// Columns whose value may only be known after the insert ran.
    pub fn is_insert_returning(&self) -> bool {
        self.default.is_some()
            || self.is_generated()
            || self.is_create_date()
            || self.is_update_date()
            || self.is_version()
    }

    /// Columns whose value changes as a side effect of an update.
    pub fn is_update_returning(&self) -> bool {
        self.is_update_date() || self.is_version()
    }
}
