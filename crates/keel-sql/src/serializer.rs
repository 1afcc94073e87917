#[macro_use]
mod fmt;
use fmt::ToSql;

mod condition;

mod delim;
use delim::{Comma, Delimited};

mod encode;

mod ident;
use ident::{ColumnAlias, ColumnRef, Ident, Pseudo};

mod replace;

// Statement serializers
mod delete;
mod insert;
mod select;
mod update;

use keel_core::{
    schema::{Column, Model},
    stmt::{AliasSource, ExpressionMap, Params, QueryKind, Record, Returning, Sql},
    Capability, Error, Result, Schema,
};

/// Serialize an expression map to SQL text plus bound parameters.
#[derive(Debug)]
pub struct Serializer<'a> {
    /// Schema the expression map's aliases refer to
    schema: &'a Schema,

    /// The capability handles the differences between SQL dialects and
    /// supported features.
    capability: &'a Capability,
}

/// A serialized statement, ready to hand to a driver.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub kind: QueryKind,

    pub sql: Sql,

    /// Values generated client-side for each inserted row, keyed by property.
    /// Empty for statements other than INSERT.
    pub generated: Vec<Record>,
}

struct Formatter<'a> {
    /// Handle to the serializer
    serializer: &'a Serializer<'a>,

    /// The query being serialized
    map: &'a ExpressionMap,

    /// Where to write the serialized SQL
    dst: &'a mut String,

    /// Where to store parameters
    params: &'a mut Params,

    /// True when column references are qualified by their alias.
    qualify: bool,
}

impl<'a> Serializer<'a> {
    pub fn new(schema: &'a Schema, capability: &'a Capability) -> Serializer<'a> {
        Serializer { schema, capability }
    }

    pub fn capability(&self) -> &'a Capability {
        self.capability
    }

    pub fn serialize(&self, map: &ExpressionMap) -> Result<Statement> {
        let mut dst = String::new();
        let mut params = Params::with_parameters(&map.parameters);

        let mut f = Formatter {
            serializer: self,
            map,
            dst: &mut dst,
            params: &mut params,
            qualify: map.kind == QueryKind::Select,
        };

        let generated = match map.kind {
            QueryKind::Select => f.select().map(|_| vec![]),
            QueryKind::Insert => f.insert(),
            QueryKind::Update => f.update().map(|_| vec![]),
            QueryKind::Delete => f.delete().map(|_| vec![]),
        }?;

        let sql = params.export(&dst, self.capability.placeholder, self.capability.quote)?;

        tracing::debug!(
            sql = %sql.text,
            params = sql.params.len(),
            dialect = %self.capability.dialect,
            "serialized statement"
        );

        Ok(Statement {
            kind: map.kind,
            sql,
            generated,
        })
    }
}

impl<'a> Formatter<'a> {
    fn capability(&self) -> &'a Capability {
        self.serializer.capability
    }

    fn schema(&self) -> &'a Schema {
        self.serializer.schema
    }

    fn main_model(&self) -> Option<&'a Model> {
        self.map.main_model(self.serializer.schema)
    }

    /// Table a write statement targets.
    fn target_table(&self) -> Result<&'a str> {
        let main = self.map.main_alias();
        match &main.source {
            AliasSource::Model(id) => Ok(&self.schema().model(*id).table),
            AliasSource::Table(table) => Ok(table),
            AliasSource::Subquery(_) => {
                keel_core::bail!("alias `{}` is a subquery and cannot be written to", main.name)
            }
        }
    }

    /// Database column names for a property, or the name itself when the
    /// target is unmapped.
    fn column_names(&self, model: Option<&Model>, property: &str) -> Result<Vec<String>> {
        let Some(model) = model else {
            return Ok(vec![property.to_string()]);
        };

        let names: Vec<String> = model
            .columns_for_property(property)
            .map(|column| column.name.clone())
            .collect();

        if !names.is_empty() {
            return Ok(names);
        }

        model
            .column_by_name(property)
            .map(|column| vec![column.name.clone()])
            .ok_or_else(|| Error::property_not_found(&model.name, property))
    }

    /// Resolves a caller returning specification to column names, checking the
    /// dialect can return anything at all.
    fn returning_columns(&self, model: Option<&Model>, feature: &str) -> Result<ReturningList> {
        let capability = self.capability();

        let Some(returning) = &self.map.returning else {
            return Ok(ReturningList::default());
        };

        if !capability.supports_returning() {
            return Err(Error::capability_unsupported(feature, capability.dialect));
        }

        match returning {
            Returning::Raw(raw) => Ok(ReturningList {
                columns: vec![],
                raw: Some(raw.clone()),
            }),
            Returning::Columns(columns) => {
                let mut list = ReturningList::default();
                for property in columns {
                    for name in self.column_names(model, property)? {
                        list.push(name);
                    }
                }
                Ok(list)
            }
        }
    }

    /// `OUTPUT INSERTED."a", ...` ahead of VALUES / WHERE.
    fn output_clause(&mut self, returning: &ReturningList, table: &'static str) {
        if self.capability().returning != keel_core::driver::ReturningKind::Output
            || returning.is_empty()
        {
            return;
        }

        fmt!(self, " OUTPUT ");

        match &returning.raw {
            Some(raw) => fmt!(self, raw),
            None => fmt!(
                self,
                Comma(returning.columns.iter().map(|column| Pseudo { table, column }))
            ),
        }
    }

    /// Trailing `RETURNING "a", ...`.
    fn returning_clause(&mut self, returning: &ReturningList) {
        if self.capability().returning != keel_core::driver::ReturningKind::Returning
            || returning.is_empty()
        {
            return;
        }

        fmt!(self, " RETURNING ");

        match &returning.raw {
            Some(raw) => fmt!(self, raw),
            None => fmt!(self, Comma(returning.columns.iter().map(Ident))),
        }
    }

    /// ORDER BY and LIMIT on UPDATE / DELETE.
    fn modify_order_and_limit(&mut self, statement: &str) -> Result<()> {
        let capability = self.capability();
        let map = self.map;

        if map.order_bys.is_empty() && map.limit.is_none() && map.offset.is_none() {
            return Ok(());
        }

        if !capability.limit_on_modify {
            return Err(Error::capability_unsupported(
                format!("ORDER BY / LIMIT on {statement}"),
                capability.dialect,
            ));
        }

        if map.offset.is_some() {
            return Err(Error::capability_unsupported(
                format!("OFFSET on {statement}"),
                capability.dialect,
            ));
        }

        self.order_by_clause();

        if let Some(limit) = map.limit {
            fmt!(self, format!(" LIMIT {limit}"));
        }

        Ok(())
    }

    fn order_by_clause(&mut self) {
        let map = self.map;

        if map.order_bys.is_empty() {
            return;
        }

        fmt!(self, " ORDER BY ");

        for (i, order_by) in map.order_bys.iter().enumerate() {
            if i > 0 {
                fmt!(self, ", ");
            }

            let expr = self.replace_properties(&order_by.expr);
            let direction = match order_by.direction {
                keel_core::stmt::Direction::Asc => " ASC",
                keel_core::stmt::Direction::Desc => " DESC",
            };
            fmt!(self, expr, direction);
        }
    }
}

/// Columns (or raw text) a write statement returns.
#[derive(Debug, Default)]
struct ReturningList {
    columns: Vec<String>,
    raw: Option<String>,
}

impl ReturningList {
    fn push(&mut self, column: impl Into<String>) {
        let column = column.into();
        if !self.columns.contains(&column) {
            self.columns.push(column);
        }
    }

    fn extend_columns<'c>(&mut self, columns: impl IntoIterator<Item = &'c Column>) {
        for column in columns {
            self.push(column.name.clone());
        }
    }

    fn is_empty(&self) -> bool {
        self.columns.is_empty() && self.raw.is_none()
    }
}
