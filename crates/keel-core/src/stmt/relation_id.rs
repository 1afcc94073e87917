use super::Row;

/// Requests the identifiers of a relation be loaded by a side query and
/// assigned onto the parent entities.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationIdAttribute {
    pub parent_alias: String,

    /// Relation property on the parent alias's model.
    pub relation: String,

    /// Property path on the parent entity, without the alias. Dot separated
    /// for nested paths.
    pub map_to_property: String,
}

/// Output of a relation-id side load, correlated back to parent rows by the
/// hydration engine.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationIdResult {
    pub attribute: RelationIdAttribute,

    /// Pairs of (side row column, parent column). A side row belongs to a
    /// parent when every pair matches.
    pub correlation: Vec<(String, String)>,

    /// Pairs of (side row column, id property). A single pair yields the bare
    /// value; several yield an id map.
    pub values: Vec<(String, String)>,

    /// True when the relation yields at most one id.
    pub is_to_one: bool,

    pub rows: Vec<Row>,
}
