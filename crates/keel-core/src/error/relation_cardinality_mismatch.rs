use super::Error;

/// Error when a relation operation does not match the relation's cardinality.
#[derive(Debug)]
pub(super) struct RelationCardinalityMismatch {
    op: &'static str,
    relation: Box<str>,
    cardinality: Box<str>,
}

impl std::error::Error for RelationCardinalityMismatch {}

impl core::fmt::Display for RelationCardinalityMismatch {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(
            f,
            "relation cardinality mismatch: cannot `{}` on {} ({})",
            self.op, self.relation, self.cardinality
        )
    }
}

impl Error {
    /// Creates a relation cardinality mismatch error.
    pub fn relation_cardinality_mismatch(
        op: &'static str,
        relation: impl Into<String>,
        cardinality: impl core::fmt::Display,
    ) -> Error {
        Error::from(super::ErrorKind::RelationCardinalityMismatch(
            RelationCardinalityMismatch {
                op,
                relation: relation.into().into(),
                cardinality: cardinality.to_string().into(),
            },
        ))
    }

    /// Returns `true` if this error is a relation cardinality mismatch error.
    pub fn is_relation_cardinality_mismatch(&self) -> bool {
        matches!(
            self.kind(),
            super::ErrorKind::RelationCardinalityMismatch(_)
        )
    }
}
