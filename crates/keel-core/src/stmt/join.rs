/// Binds a child alias to a parent alias, either through a relation of the
/// parent's model or onto an arbitrary property path.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinAttribute {
    pub kind: JoinKind,

    /// The joined (child) alias.
    pub alias: String,

    /// The alias the join hangs off.
    pub parent_alias: String,

    /// Relation property on the parent alias's model. `None` for mapped joins.
    pub relation: Option<String>,

    /// Property path on the parent entity results are assigned to instead of
    /// the relation property. Dot separated for nested paths.
    pub map_to_property: Option<String>,

    /// Extra (or, for mapped joins, the whole) ON condition.
    pub condition: Option<String>,

    /// True when the join yields a list.
    pub is_many: bool,

    /// True when the joined alias's columns are selected and hydrated.
    pub is_selected: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

impl JoinKind {
    pub fn as_sql(self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
        }
    }
}

impl JoinAttribute {
    /// Alias of the junction table when joining through a many-to-many
    /// relation.
    pub fn junction_alias(&self) -> String {
        format!("{}_{}", self.parent_alias, self.alias)
    }
}
