use super::{Formatter, ToSql};

/// A quoted identifier
pub(super) struct Ident<S>(pub(super) S);

/// A column reference, qualified by its alias when the formatter is rendering
/// a multi-source statement.
pub(super) struct ColumnRef<'a> {
    pub(super) alias: &'a str,
    pub(super) column: &'a str,
}

/// `"alias"."column" AS "alias_column"`
pub(super) struct ColumnAlias<'a> {
    pub(super) alias: &'a str,
    pub(super) column: &'a str,
}

/// `INSERTED."column"` or `DELETED."column"` in an OUTPUT clause.
pub(super) struct Pseudo<'a> {
    pub(super) table: &'static str,
    pub(super) column: &'a str,
}

impl<S: AsRef<str>> ToSql for Ident<S> {
    fn to_sql(self, f: &mut Formatter<'_>) {
        let quoted = f.serializer.capability.quote(self.0.as_ref());
        f.dst.push_str(&quoted);
    }
}

impl ToSql for ColumnRef<'_> {
    fn to_sql(self, f: &mut Formatter<'_>) {
        if f.qualify {
            fmt!(f, Ident(self.alias), ".");
        }
        fmt!(f, Ident(self.column));
    }
}

impl ToSql for ColumnAlias<'_> {
    fn to_sql(self, f: &mut Formatter<'_>) {
        let alias = format!("{}_{}", self.alias, self.column);
        fmt!(f, Ident(self.alias), ".", Ident(self.column), " AS ", Ident(alias));
    }
}

impl ToSql for Pseudo<'_> {
    fn to_sql(self, f: &mut Formatter<'_>) {
        fmt!(f, self.table, ".", Ident(self.column));
    }
}
