use crate::{
    schema::{Column, Type},
    stmt::{LockMode, Value},
    Error, Result,
};

use std::fmt;

/// Describes what the database's SQL dialect supports. Emitters consult
/// these flags and generators instead of branching on the dialect itself.
#[derive(Debug, Clone, PartialEq)]
pub struct Capability {
    pub dialect: Dialect,

    /// How bound parameters are written in SQL text.
    pub placeholder: PlaceholderStyle,

    /// How a write statement returns affected-row values.
    pub returning: ReturningKind,

    /// Upsert syntax.
    pub on_conflict: OnConflictSyntax,

    /// MySQL: `INSERT IGNORE` skips conflicting rows.
    pub insert_ignore_modifier: bool,

    /// `ORDER BY` and `LIMIT` are accepted on UPDATE and DELETE.
    pub limit_on_modify: bool,

    /// Supports `VALUES (...), (...)`. Otherwise multi-row inserts are
    /// written as `SELECT ... FROM DUAL UNION ALL ...`.
    pub multi_row_values: bool,

    /// Accepts the `DEFAULT` keyword inside a VALUES tuple.
    pub default_keyword: bool,

    /// Null values are written as the `NULL` literal instead of being bound.
    pub null_literal: bool,

    /// Auto-increment columns are listed in INSERT statements, receiving
    /// `DEFAULT` (or `NULL`) when no value is supplied.
    pub insert_increment_columns: bool,

    /// Explicit values for identity columns require bracketing the insert
    /// with `SET IDENTITY_INSERT <table> ON/OFF`.
    pub identity_insert: bool,

    /// Explicit values for `GENERATED ALWAYS` identity columns require
    /// `OVERRIDING SYSTEM VALUE`.
    pub overriding_system_value: bool,

    /// The database generates UUID column values itself.
    pub uuid_generation: bool,

    /// What the driver's last insert id refers to for multi-row inserts.
    pub last_insert_id: LastInsertId,

    /// Booleans are stored as integers.
    pub bool_as_int: bool,

    /// The database has a native JSON type.
    pub json_type: bool,

    /// Spatial literal construction.
    pub spatial: SpatialSyntax,

    /// Limit and offset syntax.
    pub limit: LimitSyntax,

    /// Row lock syntax.
    pub lock: LockSyntax,

    /// Identifier quoting.
    pub quote: QuoteStyle,

    /// INSERT form used when no column is written.
    pub default_values: DefaultValues,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Postgresql,
    Mysql,
    Mssql,
    Oracle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `$1`, `$2`, ...
    Dollar,

    /// `?`, bound strictly by position.
    Question,

    /// `@0`, `@1`, ...
    At,

    /// `:name`, bound by name.
    Colon,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturningKind {
    None,

    /// Trailing `RETURNING ...`.
    Returning,

    /// `OUTPUT INSERTED.x` / `OUTPUT DELETED.x` ahead of VALUES or WHERE.
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnConflictSyntax {
    None,

    /// `ON CONFLICT (...) DO NOTHING | DO UPDATE SET c = EXCLUDED.c`
    OnConflict,

    /// `ON DUPLICATE KEY UPDATE c = VALUES(c)`
    DuplicateKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LastInsertId {
    None,

    /// Id of the first inserted row.
    First,

    /// Id of the last inserted row.
    Last,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpatialSyntax {
    None,

    /// `ST_GeomFromText(p[, srid])` from WKT.
    Wkt,

    /// `ST_SetSRID(ST_GeomFromGeoJSON(p), srid)::geometry` from GeoJSON.
    GeoJson,

    /// `geometry::STGeomFromText(p, srid)`.
    Static,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitSyntax {
    /// `LIMIT n OFFSET m`
    LimitOffset,

    /// `OFFSET m ROWS FETCH NEXT n ROWS ONLY`
    OffsetFetch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockSyntax {
    Unsupported,

    /// `FOR UPDATE` / `FOR SHARE`
    ForUpdate,

    /// `FOR UPDATE` only.
    ForUpdateOnly,

    /// `WITH (UPDLOCK, ROWLOCK)` table hint after the table name.
    TableHint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteStyle {
    Double,
    Backtick,
    Bracket,
}

impl QuoteStyle {
    /// When `chars[start]` opens a string literal or quoted identifier, the
    /// index just past its closing quote. Doubled quotes inside are escapes.
    ///
    /// Square brackets only quote under [`QuoteStyle::Bracket`]; elsewhere
    /// they are array subscripts.
    pub fn quoted_end(self, chars: &[char], start: usize) -> Option<usize> {
        let close = match *chars.get(start)? {
            c @ ('\'' | '"' | '`') => c,
            '[' if self == QuoteStyle::Bracket => ']',
            _ => return None,
        };

        let mut i = start + 1;
        while i < chars.len() {
            if chars[i] == close {
                if close != ']' && chars.get(i + 1) == Some(&close) {
                    i += 2;
                    continue;
                }
                return Some(i + 1);
            }
            i += 1;
        }

        Some(chars.len())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultValues {
    /// `DEFAULT VALUES`
    Keyword,

    /// `VALUES ()`
    EmptyTuple,

    /// `VALUES (DEFAULT)`
    DefaultTuple,
}

impl Capability {
    /// SQLite capabilities.
    pub const SQLITE: Self = Self {
        dialect: Dialect::Sqlite,
        placeholder: PlaceholderStyle::Question,
        returning: ReturningKind::None,
        on_conflict: OnConflictSyntax::OnConflict,
        insert_ignore_modifier: false,
        limit_on_modify: false,
        multi_row_values: true,
        default_keyword: false,
        null_literal: false,
        insert_increment_columns: true,
        identity_insert: false,
        overriding_system_value: false,
        uuid_generation: false,
        last_insert_id: LastInsertId::Last,
        bool_as_int: true,
        json_type: false,
        spatial: SpatialSyntax::None,
        limit: LimitSyntax::LimitOffset,
        lock: LockSyntax::Unsupported,
        quote: QuoteStyle::Double,
        default_values: DefaultValues::Keyword,
    };

    /// PostgreSQL capabilities
    pub const POSTGRESQL: Self = Self {
        dialect: Dialect::Postgresql,
        placeholder: PlaceholderStyle::Dollar,
        returning: ReturningKind::Returning,
        default_keyword: true,
        insert_increment_columns: false,
        overriding_system_value: true,
        uuid_generation: true,
        last_insert_id: LastInsertId::None,
        bool_as_int: false,
        json_type: true,
        spatial: SpatialSyntax::GeoJson,
        lock: LockSyntax::ForUpdate,
        ..Self::SQLITE
    };

    /// MySQL capabilities
    pub const MYSQL: Self = Self {
        dialect: Dialect::Mysql,
        on_conflict: OnConflictSyntax::DuplicateKey,
        insert_ignore_modifier: true,
        limit_on_modify: true,
        default_keyword: true,
        last_insert_id: LastInsertId::First,
        json_type: true,
        spatial: SpatialSyntax::Wkt,
        lock: LockSyntax::ForUpdate,
        quote: QuoteStyle::Backtick,
        default_values: DefaultValues::EmptyTuple,
        ..Self::SQLITE
    };

    /// SQL Server capabilities
    pub const MSSQL: Self = Self {
        dialect: Dialect::Mssql,
        placeholder: PlaceholderStyle::At,
        returning: ReturningKind::Output,
        on_conflict: OnConflictSyntax::None,
        default_keyword: true,
        insert_increment_columns: false,
        identity_insert: true,
        uuid_generation: true,
        last_insert_id: LastInsertId::None,
        spatial: SpatialSyntax::Static,
        limit: LimitSyntax::OffsetFetch,
        lock: LockSyntax::TableHint,
        quote: QuoteStyle::Bracket,
        ..Self::SQLITE
    };

    /// Oracle capabilities
    pub const ORACLE: Self = Self {
        dialect: Dialect::Oracle,
        placeholder: PlaceholderStyle::Colon,
        on_conflict: OnConflictSyntax::None,
        multi_row_values: false,
        default_keyword: true,
        null_literal: true,
        last_insert_id: LastInsertId::None,
        limit: LimitSyntax::OffsetFetch,
        lock: LockSyntax::ForUpdateOnly,
        default_values: DefaultValues::DefaultTuple,
        ..Self::SQLITE
    };

    /// Picks the capability for a connection URL by its scheme.
    pub fn from_url(url: &str) -> Result<Capability> {
        let url = url::Url::parse(url)?;

        let capability = match url.scheme() {
            "sqlite" => Self::SQLITE,
            "postgres" | "postgresql" => Self::POSTGRESQL,
            "mysql" | "mariadb" => Self::MYSQL,
            "mssql" | "sqlserver" => Self::MSSQL,
            "oracle" => Self::ORACLE,
            scheme => crate::bail!("unsupported database scheme `{scheme}`"),
        };

        Ok(capability)
    }

    pub fn supports_returning(&self) -> bool {
        self.returning != ReturningKind::None
    }

    /// Quotes an identifier, doubling any embedded closing quote.
    pub fn quote(&self, ident: &str) -> String {
        let (open, close) = match self.quote {
            QuoteStyle::Double => ('"', '"'),
            QuoteStyle::Backtick => ('`', '`'),
            QuoteStyle::Bracket => ('[', ']'),
        };

        let mut out = String::with_capacity(ident.len() + 2);
        out.push(open);
        for c in ident.chars() {
            if c == close {
                out.push(close);
            }
            out.push(c);
        }
        out.push(close);
        out
    }

    /// Limit/offset fragment, with its leading space, or empty.
    pub fn limit_clause(&self, limit: Option<u64>, offset: Option<u64>, ordered: bool) -> String {
        match self.limit {
            LimitSyntax::LimitOffset => match (limit, offset) {
                (None, None) => String::new(),
                (Some(limit), None) => format!(" LIMIT {limit}"),
                (Some(limit), Some(offset)) => format!(" LIMIT {limit} OFFSET {offset}"),
                (None, Some(offset)) => match self.dialect {
                    Dialect::Mysql => format!(" LIMIT 18446744073709551615 OFFSET {offset}"),
                    Dialect::Sqlite => format!(" LIMIT -1 OFFSET {offset}"),
                    _ => format!(" OFFSET {offset}"),
                },
            },
            LimitSyntax::OffsetFetch => {
                if limit.is_none() && offset.is_none() {
                    return String::new();
                }

                let mut out = String::new();

                // OFFSET requires an ORDER BY on SQL Server
                if !ordered && self.dialect == Dialect::Mssql {
                    out.push_str(" ORDER BY (SELECT NULL)");
                }

                out.push_str(&format!(" OFFSET {} ROWS", offset.unwrap_or(0)));

                if let Some(limit) = limit {
                    out.push_str(&format!(" FETCH NEXT {limit} ROWS ONLY"));
                }

                out
            }
        }
    }

    /// Row lock fragment, with its leading space.
    pub fn lock_clause(&self, mode: LockMode) -> Result<String> {
        let clause = match (self.lock, mode) {
            (LockSyntax::ForUpdate | LockSyntax::ForUpdateOnly, LockMode::PessimisticWrite) => {
                " FOR UPDATE"
            }
            (LockSyntax::ForUpdate, LockMode::PessimisticRead) => match self.dialect {
                Dialect::Mysql => " LOCK IN SHARE MODE",
                _ => " FOR SHARE",
            },
            (LockSyntax::TableHint, LockMode::PessimisticWrite) => " WITH (UPDLOCK, ROWLOCK)",
            (LockSyntax::TableHint, LockMode::PessimisticRead) => " WITH (HOLDLOCK, ROWLOCK)",
            (LockSyntax::ForUpdateOnly, LockMode::PessimisticRead) => {
                return Err(Error::capability_unsupported("shared row locks", self.dialect))
            }
            (LockSyntax::Unsupported, _) => {
                return Err(Error::capability_unsupported("row locks", self.dialect))
            }
        };

        Ok(clause.to_string())
    }

    /// Wraps a spatial parameter placeholder in the dialect's constructor.
    pub fn spatial_literal(&self, placeholder: &str, column: &Column) -> String {
        let ty = column.ty.spatial_name().unwrap_or("geometry");

        match (self.spatial, column.srid) {
            (SpatialSyntax::Wkt, Some(srid)) => format!("ST_GeomFromText({placeholder}, {srid})"),
            (SpatialSyntax::Wkt, None) => format!("ST_GeomFromText({placeholder})"),
            (SpatialSyntax::GeoJson, Some(srid)) => {
                format!("ST_SetSRID(ST_GeomFromGeoJSON({placeholder}), {srid})::{ty}")
            }
            (SpatialSyntax::GeoJson, None) => format!("ST_GeomFromGeoJSON({placeholder})::{ty}"),
            (SpatialSyntax::Static, srid) => {
                format!("{ty}::STGeomFromText({placeholder}, {})", srid.unwrap_or(0))
            }
            (SpatialSyntax::None, _) => placeholder.to_string(),
        }
    }

    /// INSERT tail used when no column is written.
    pub fn default_values_clause(&self) -> &'static str {
        match self.default_values {
            DefaultValues::Keyword => "DEFAULT VALUES",
            DefaultValues::EmptyTuple => "VALUES ()",
            DefaultValues::DefaultTuple => "VALUES (DEFAULT)",
        }
    }

    /// Converts a value into the form the database stores for `column`.
    pub fn persist_value(&self, column: &Column, value: Value) -> Value {
        match (column.ty, value) {
            (_, Value::Bool(v)) if self.bool_as_int => Value::I64(v as i64),
            (Type::Json, value @ (Value::Record(_) | Value::List(_) | Value::Json(_))) => {
                if self.json_type {
                    Value::Json(value.to_json())
                } else {
                    Value::String(value.to_json().to_string())
                }
            }
            (ty, Value::Json(json)) if ty.is_spatial() => Value::String(json.to_string()),
            (_, value) => value,
        }
    }

    /// Converts a value read from the database into its hydrated form.
    pub fn hydrate_value(&self, column: &Column, value: Value) -> Value {
        match (column.ty, value) {
            (Type::Boolean, Value::I64(v)) => Value::Bool(v != 0),
            (Type::Json, Value::String(text)) => match serde_json::from_str(&text) {
                Ok(json) => Value::Json(json),
                Err(_) => Value::String(text),
            },
            (Type::Integer | Type::BigInt, Value::String(text)) => match text.parse() {
                Ok(v) => Value::I64(v),
                Err(_) => Value::String(text),
            },
            (Type::Uuid, Value::String(text)) => match uuid::Uuid::parse_str(&text) {
                Ok(v) => Value::Uuid(v),
                Err(_) => Value::String(text),
            },
            (_, value) => value,
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Dialect::Sqlite => "sqlite",
            Dialect::Postgresql => "postgres",
            Dialect::Mysql => "mysql",
            Dialect::Mssql => "mssql",
            Dialect::Oracle => "oracle",
        })
    }
}

impl PlaceholderStyle {
    /// True when values are bound by position rather than by name.
    pub fn is_positional(self) -> bool {
        !matches!(self, PlaceholderStyle::Colon)
    }
}
