use super::Error;

/// Error when a statement requests a clause the active dialect cannot express.
///
/// This occurs when:
/// - `RETURNING`/`OUTPUT` is requested on a dialect without either clause
/// - an upsert is requested on a dialect without conflict handling
/// - `ORDER BY`/`LIMIT` is attached to an UPDATE or DELETE where the dialect
///   forbids it
/// - a row lock mode is requested that the dialect has no syntax for
#[derive(Debug)]
pub(super) struct CapabilityUnsupported {
    feature: Box<str>,
    dialect: Box<str>,
}

impl std::error::Error for CapabilityUnsupported {}

impl core::fmt::Display for CapabilityUnsupported {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(
            f,
            "capability unsupported: {} is not supported by {}",
            self.feature, self.dialect
        )
    }
}

impl Error {
    /// Creates a capability unsupported error.
    pub fn capability_unsupported(
        feature: impl Into<String>,
        dialect: impl core::fmt::Display,
    ) -> Error {
        Error::from(super::ErrorKind::CapabilityUnsupported(
            CapabilityUnsupported {
                feature: feature.into().into(),
                dialect: dialect.to_string().into(),
            },
        ))
    }

    /// Returns `true` if this error is a capability unsupported error.
    pub fn is_capability_unsupported(&self) -> bool {
        matches!(self.kind(), super::ErrorKind::CapabilityUnsupported(_))
    }
}
