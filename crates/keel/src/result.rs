use keel_core::stmt::{Record, Row};

/// Outcome of an insert.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct InsertResult {
    /// Primary key values of each inserted row, as far as they are known.
    pub identifiers: Vec<Record>,

    /// Values the database (or keel) produced for each row: generated keys,
    /// defaults, versions and dates.
    pub generated_maps: Vec<Record>,

    /// Rows the driver returned verbatim.
    pub raw: Vec<Row>,

    pub affected: u64,
}

/// Outcome of an update.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct UpdateResult {
    pub affected: u64,

    /// Refreshed values for each targeted entity, in target order.
    pub generated_maps: Vec<Record>,

    /// The targeted entities with refreshed values merged in.
    pub entities: Vec<Record>,

    pub raw: Vec<Row>,
}

/// Outcome of a delete.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DeleteResult {
    pub affected: u64,
    pub raw: Vec<Row>,
}
