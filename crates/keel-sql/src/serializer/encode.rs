use super::Formatter;

use keel_core::{
    schema::Column,
    stmt::{Expr, Value},
};

impl Formatter<'_> {
    /// Renders one persisted cell.
    ///
    /// Raw expressions are spliced verbatim; this is the only path by which
    /// caller text reaches a statement. Everything else is a keyword or a
    /// bound parameter named after `name`.
    pub(super) fn encode(&mut self, column: Option<&Column>, name: &str, expr: &Expr) {
        match expr {
            Expr::Raw(raw) => {
                let sql = raw.render();
                self.dst.push_str(&sql);
            }
            Expr::Default => self.default_value(column, true),
            Expr::Value(value) => self.encode_value(column, name, value.clone()),
        }
    }

    pub(super) fn encode_value(&mut self, column: Option<&Column>, name: &str, value: Value) {
        let capability = self.capability();

        let value = match column {
            Some(column) => {
                let value = self.referenced_value(column, value);
                capability.persist_value(column, value)
            }
            None => value,
        };

        if value.is_null() && capability.null_literal {
            self.dst.push_str("NULL");
            return;
        }

        let spatial = column.filter(|column| column.ty.is_spatial() && !value.is_null());
        let placeholder = self.params.placeholder(name, value);

        match spatial {
            Some(column) => {
                let wrapped = capability.spatial_literal(&placeholder, column);
                self.dst.push_str(&wrapped);
            }
            None => self.dst.push_str(&placeholder),
        }
    }

    /// `DEFAULT`, or the column's default expression (else `NULL`) where the
    /// keyword is unavailable.
    pub(super) fn default_value(&mut self, column: Option<&Column>, allow_keyword: bool) {
        if allow_keyword && self.capability().default_keyword {
            self.dst.push_str("DEFAULT");
            return;
        }

        match column.and_then(|column| column.default.as_deref()) {
            Some(default) => self.dst.push_str(default),
            None => self.dst.push_str("NULL"),
        }
    }

    /// A foreign key column given an entity-shaped value persists the value of
    /// the referenced property, following chains of references.
    fn referenced_value(&self, column: &Column, mut value: Value) -> Value {
        let schema = self.schema();
        let mut current = column;

        while value.is_object() {
            let Some(reference) = &current.references else {
                break;
            };

            value = value.get(&reference.property).cloned().unwrap_or_default();

            match schema.model(reference.model).column(&reference.property) {
                Some(next) => current = next,
                None => break,
            }
        }

        value
    }
}
