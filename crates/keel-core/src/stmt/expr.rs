use super::{Record, Value};

use indexmap::IndexMap;
use std::{fmt, sync::Arc};

/// A value to persist into one column.
///
/// `Raw` is the only way caller-provided SQL text reaches a statement; every
/// other variant is bound as a parameter or rendered as a keyword.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A value bound through the parameter registry.
    Value(Value),

    /// SQL text spliced verbatim, e.g. `"counter" + 1`.
    Raw(RawSql),

    /// The column's database default.
    Default,
}

/// Supplier of raw SQL text.
///
/// The supplier is invoked at emission time. Callers are responsible for
/// escaping anything they splice in.
#[derive(Clone)]
pub struct RawSql(Arc<dyn Fn() -> String + Send + Sync>);

impl RawSql {
    /// Raw SQL from fixed text.
    pub fn new(sql: impl Into<String>) -> RawSql {
        let sql: String = sql.into();
        RawSql(Arc::new(move || sql.clone()))
    }

    /// Raw SQL produced by a callback.
    pub fn from_fn(f: impl Fn() -> String + Send + Sync + 'static) -> RawSql {
        RawSql(Arc::new(f))
    }

    pub fn render(&self) -> String {
        (self.0)()
    }
}

impl fmt::Debug for RawSql {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RawSql").field(&self.render()).finish()
    }
}

impl PartialEq for RawSql {
    fn eq(&self, other: &RawSql) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.render() == other.render()
    }
}

impl Expr {
    pub fn raw(sql: impl Into<String>) -> Expr {
        Expr::Raw(RawSql::new(sql))
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Expr::Value(value) => Some(value),
            _ => None,
        }
    }
}

macro_rules! impl_expr_from_value {
    ( $( $ty:ty ),* ) => {
        $(
            impl From<$ty> for Expr {
                fn from(value: $ty) -> Self {
                    Expr::Value(value.into())
                }
            }
        )*
    };
}

impl_expr_from_value!(
    Value,
    bool,
    i32,
    i64,
    u32,
    f64,
    &str,
    String,
    &[u8],
    uuid::Uuid,
    serde_json::Value,
    Record,
    super::Entity,
    Vec<Value>
);

impl<T: Into<Value>> From<Option<T>> for Expr {
    fn from(value: Option<T>) -> Self {
        Expr::Value(value.into())
    }
}

impl From<RawSql> for Expr {
    fn from(value: RawSql) -> Self {
        Expr::Raw(value)
    }
}

/// One row of a value set: property name to persisted expression.
///
/// A property absent from the map is "not provided" and is distinct from an
/// explicit `Value::Null`.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Fields {
    fields: IndexMap<String, Expr>,
}

impl Fields {
    pub fn new() -> Fields {
        Fields::default()
    }

    /// Builder-style insert.
    pub fn set(mut self, property: impl Into<String>, expr: impl Into<Expr>) -> Fields {
        self.insert(property, expr);
        self
    }

    pub fn insert(&mut self, property: impl Into<String>, expr: impl Into<Expr>) {
        self.fields.insert(property.into(), expr.into());
    }

    pub fn get(&self, property: &str) -> Option<&Expr> {
        self.fields.get(property)
    }

    pub fn contains_key(&self, property: &str) -> bool {
        self.fields.contains_key(property)
    }

    /// True when the row writes its own value for `property`. A missing
    /// property, `DEFAULT` and `NULL` all leave it to the database.
    pub fn supplies(&self, property: &str) -> bool {
        match self.fields.get(property) {
            Some(Expr::Value(value)) => !value.is_null(),
            Some(Expr::Raw(_)) => true,
            Some(Expr::Default) | None => false,
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Expr)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Writes every field of a generated map back, replacing what was there.
    pub fn merge_generated(&mut self, generated: &Record) {
        for (key, value) in generated.iter() {
            self.fields
                .insert(key.to_string(), Expr::Value(value.clone()));
        }
    }

    /// The plain values of this row, skipping raw and default expressions.
    pub fn to_record(&self) -> Record {
        self.fields
            .iter()
            .filter_map(|(k, v)| Some((k.clone(), v.as_value()?.clone())))
            .collect()
    }
}

impl From<Record> for Fields {
    fn from(record: Record) -> Self {
        Fields {
            fields: record
                .into_iter()
                .map(|(k, v)| (k, Expr::Value(v)))
                .collect(),
        }
    }
}

impl<K: Into<String>, V: Into<Expr>> FromIterator<(K, V)> for Fields {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Fields {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
