use super::Error;

/// Error when a scalar identifier targets a model with a composite primary key.
#[derive(Debug)]
pub(super) struct IdentifierAmbiguous {
    model: Box<str>,
    key: Box<[String]>,
}

impl std::error::Error for IdentifierAmbiguous {}

impl core::fmt::Display for IdentifierAmbiguous {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(
            f,
            "identifier ambiguous: {} has a composite primary key ({}); provide every key property",
            self.model,
            self.key.join(", ")
        )
    }
}

impl Error {
    /// Creates an identifier ambiguous error.
    pub fn identifier_ambiguous(model: impl Into<String>, key: &[impl AsRef<str>]) -> Error {
        Error::from(super::ErrorKind::IdentifierAmbiguous(IdentifierAmbiguous {
            model: model.into().into(),
            key: key.iter().map(|k| k.as_ref().to_string()).collect(),
        }))
    }

    /// Returns `true` if this error is an identifier ambiguous error.
    pub fn is_identifier_ambiguous(&self) -> bool {
        matches!(self.kind(), super::ErrorKind::IdentifierAmbiguous(_))
    }
}
