use super::Error;

/// Error when an insert or update has nothing to persist.
///
/// Raised before any SQL is sent to the database.
#[derive(Debug)]
pub(super) struct ValuesMissing {
    kind: ValuesMissingKind,
}

/// Distinguishes an absent value set from one that produced no columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValuesMissingKind {
    /// No value set was configured, or an update received an empty one.
    EmptyValueSet,

    /// A value set was present but no column resolved to an SQL expression.
    NoColumnExpressions,
}

impl std::error::Error for ValuesMissing {}

impl core::fmt::Display for ValuesMissing {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self.kind {
            ValuesMissingKind::EmptyValueSet => {
                f.write_str("values missing: no value set was provided")
            }
            ValuesMissingKind::NoColumnExpressions => {
                f.write_str("values missing: value set produced no column expressions")
            }
        }
    }
}

impl Error {
    /// Creates a values missing error.
    pub fn values_missing(kind: ValuesMissingKind) -> Error {
        Error::from(super::ErrorKind::ValuesMissing(ValuesMissing { kind }))
    }

    /// Returns `true` if this error is a values missing error.
    pub fn is_values_missing(&self) -> bool {
        matches!(self.kind(), super::ErrorKind::ValuesMissing(_))
    }

    /// Returns which flavor of values missing error this is, if any.
    pub fn values_missing_kind(&self) -> Option<ValuesMissingKind> {
        match self.kind() {
            super::ErrorKind::ValuesMissing(err) => Some(err.kind),
            _ => None,
        }
    }
}
