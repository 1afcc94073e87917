use super::Error;

/// Error when SQL text references a named parameter that was never bound.
#[derive(Debug)]
pub(super) struct ParameterMissing {
    name: Box<str>,
}

impl std::error::Error for ParameterMissing {}

impl core::fmt::Display for ParameterMissing {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "parameter missing: `:{}` has no bound value", self.name)
    }
}

impl Error {
    /// Creates a parameter missing error.
    pub fn parameter_missing(name: impl Into<String>) -> Error {
        Error::from(super::ErrorKind::ParameterMissing(ParameterMissing {
            name: name.into().into(),
        }))
    }

    /// Returns `true` if this error is a parameter missing error.
    pub fn is_parameter_missing(&self) -> bool {
        matches!(self.kind(), super::ErrorKind::ParameterMissing(_))
    }
}
