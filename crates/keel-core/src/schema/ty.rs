/// Database storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type {
    Boolean,
    Integer,
    BigInt,
    Float,
    Decimal,
    Text,
    VarChar(u64),
    Bytes,
    Uuid,
    Json,
    Timestamp,
    Date,
    Geometry,
    Geography,
}

impl Type {
    pub fn is_spatial(&self) -> bool {
        matches!(self, Type::Geometry | Type::Geography)
    }

    /// SQL name used when casting a spatial literal.
    pub fn spatial_name(&self) -> Option<&'static str> {
        match self {
            Type::Geometry => Some("geometry"),
            Type::Geography => Some("geography"),
            _ => None,
        }
    }
}
