use super::Error;

/// Error when a value set names a property the model does not declare.
#[derive(Debug)]
pub(super) struct PropertyNotFound {
    model: Box<str>,
    property: Box<str>,
}

impl std::error::Error for PropertyNotFound {}

impl core::fmt::Display for PropertyNotFound {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(
            f,
            "property not found: {} has no property `{}`",
            self.model, self.property
        )
    }
}

impl Error {
    /// Creates a property not found error.
    pub fn property_not_found(model: impl Into<String>, property: impl Into<String>) -> Error {
        Error::from(super::ErrorKind::PropertyNotFound(PropertyNotFound {
            model: model.into().into(),
            property: property.into().into(),
        }))
    }

    /// Returns `true` if this error is a property not found error.
    pub fn is_property_not_found(&self) -> bool {
        matches!(self.kind(), super::ErrorKind::PropertyNotFound(_))
    }
}
