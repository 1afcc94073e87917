use crate::stmt::Row;

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub rows: Rows,

    /// Id generated by the last insert, for drivers that report one instead
    /// of returning rows.
    pub last_insert_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Rows {
    /// Number of rows impacted by the operation
    Count(u64),

    /// Raw rows, keyed by column alias
    Values(Vec<Row>),
}

impl Response {
    pub fn count(count: u64) -> Self {
        Self {
            rows: Rows::Count(count),
            last_insert_id: None,
        }
    }

    pub fn values(values: Vec<Row>) -> Self {
        Self {
            rows: Rows::Values(values),
            last_insert_id: None,
        }
    }

    pub fn with_last_insert_id(mut self, id: i64) -> Self {
        self.last_insert_id = Some(id);
        self
    }
}

impl Rows {
    pub fn is_count(&self) -> bool {
        matches!(self, Self::Count(_))
    }

    pub fn is_values(&self) -> bool {
        matches!(self, Self::Values(_))
    }

    /// Affected rows: the count, or the number of returned rows.
    pub fn affected(&self) -> u64 {
        match self {
            Rows::Count(count) => *count,
            Rows::Values(rows) => rows.len() as u64,
        }
    }

    /// The returned rows. A count yields none.
    pub fn into_values(self) -> Vec<Row> {
        match self {
            Rows::Count(_) => vec![],
            Rows::Values(rows) => rows,
        }
    }

    pub fn as_values(&self) -> &[Row] {
        match self {
            Rows::Count(_) => &[],
            Rows::Values(rows) => rows,
        }
    }
}
