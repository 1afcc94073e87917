use super::Row;

/// Requests the number of related entities be loaded by a side query and
/// assigned onto the parent entities.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationCountAttribute {
    pub parent_alias: String,

    /// To-many relation property on the parent alias's model.
    pub relation: String,

    /// Property path on the parent entity, without the alias.
    pub map_to_property: String,
}

/// Output of a relation-count side load. Each row carries a `parentId` and a
/// `cnt` column.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationCountResult {
    pub attribute: RelationCountAttribute,

    /// Parent column whose value is compared against `parentId`.
    pub reference_column: String,

    pub rows: Vec<Row>,
}

impl RelationCountResult {
    pub const PARENT_ID: &'static str = "parentId";
    pub const COUNT: &'static str = "cnt";
}
