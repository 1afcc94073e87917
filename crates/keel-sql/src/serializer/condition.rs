use super::{ColumnRef, Formatter};

use keel_core::{
    schema::Column,
    stmt::{BinaryOp, Condition, Conjunction, Value},
    Error, Result,
};

impl<'a> Formatter<'a> {
    /// ` WHERE ...` from the expression map's clauses, followed by `extra`
    /// (already rendered SQL) when given.
    pub(super) fn where_clause(&mut self, extra: Option<String>) -> Result<()> {
        let map = self.map;

        if map.wheres.is_empty() && extra.is_none() {
            return Ok(());
        }

        self.dst.push_str(" WHERE ");

        if map.wheres.is_empty() {
            self.dst.push_str(extra.as_deref().unwrap_or_default());
            return Ok(());
        }

        let nested = map.wheres.len() > 1 || extra.is_some();

        if extra.is_some() && map.wheres.len() > 1 {
            self.dst.push('(');
        }

        for (i, clause) in map.wheres.iter().enumerate() {
            if i > 0 {
                self.dst.push_str(match clause.conjunction {
                    Conjunction::And => " AND ",
                    Conjunction::Or => " OR ",
                });
            }
            self.condition(&clause.condition, nested)?;
        }

        if let Some(extra) = extra {
            if map.wheres.len() > 1 {
                self.dst.push(')');
            }
            self.dst.push_str(" AND ");
            self.dst.push_str(&extra);
        }

        Ok(())
    }

    /// Renders one predicate node. Compound nodes are parenthesized when
    /// `nested`.
    pub(super) fn condition(&mut self, condition: &Condition, nested: bool) -> Result<()> {
        match condition {
            Condition::Compare {
                alias,
                property,
                op,
                value,
            } => {
                let column = self.resolve_column(alias.as_deref(), property)?;
                self.column_ref(alias.as_deref(), &column.1);

                match (op, value) {
                    (BinaryOp::Eq, Value::Null) => self.dst.push_str(" IS NULL"),
                    (BinaryOp::Ne, Value::Null) => self.dst.push_str(" IS NOT NULL"),
                    (op, value) => {
                        self.dst.push(' ');
                        self.dst.push_str(op.as_sql());
                        self.dst.push(' ');
                        self.bind_compared(column.0, property, value.clone());
                    }
                }
            }
            Condition::In {
                alias,
                property,
                values,
            } => {
                if values.is_empty() {
                    self.dst.push_str("0 = 1");
                    return Ok(());
                }

                let (column, name) = self.resolve_column(alias.as_deref(), property)?;
                let capability = self.capability();
                let values = values
                    .iter()
                    .map(|value| match column {
                        Some(column) => capability.persist_value(column, value.clone()),
                        None => value.clone(),
                    })
                    .collect();

                self.column_ref(alias.as_deref(), &name);
                let placeholder = self.params.list_placeholder(property, values);
                self.dst.push_str(" IN (");
                self.dst.push_str(&placeholder);
                self.dst.push(')');
            }
            Condition::IsNull {
                alias,
                property,
                negate,
            } => {
                let (_, name) = self.resolve_column(alias.as_deref(), property)?;
                self.column_ref(alias.as_deref(), &name);
                self.dst
                    .push_str(if *negate { " IS NOT NULL" } else { " IS NULL" });
            }
            Condition::Raw(sql) => {
                let sql = self.replace_properties(sql);
                self.parenthesized(nested, |f| {
                    f.dst.push_str(&sql);
                    Ok(())
                })?;
            }
            Condition::And(conditions) | Condition::Or(conditions) if conditions.is_empty() => {
                let identity = match condition {
                    Condition::And(_) => "1 = 1",
                    _ => "0 = 1",
                };
                self.dst.push_str(identity);
            }
            Condition::And(conditions) => {
                self.parenthesized(nested, |f| f.conditions(conditions, " AND "))?
            }
            Condition::Or(conditions) => {
                self.parenthesized(nested, |f| f.conditions(conditions, " OR "))?
            }
            Condition::Not(inner) => {
                self.dst.push_str("NOT (");
                self.condition(inner, false)?;
                self.dst.push(')');
            }
        }

        Ok(())
    }

    fn conditions(&mut self, conditions: &[Condition], separator: &str) -> Result<()> {
        for (i, condition) in conditions.iter().enumerate() {
            if i > 0 {
                self.dst.push_str(separator);
            }
            self.condition(condition, true)?;
        }
        Ok(())
    }

    fn parenthesized(
        &mut self,
        wrap: bool,
        body: impl FnOnce(&mut Self) -> Result<()>,
    ) -> Result<()> {
        if wrap {
            self.dst.push('(');
        }
        body(self)?;
        if wrap {
            self.dst.push(')');
        }
        Ok(())
    }

    fn bind_compared(&mut self, column: Option<&Column>, property: &str, value: Value) {
        let value = match column {
            Some(column) => self.capability().persist_value(column, value),
            None => value,
        };
        let placeholder = self.params.placeholder(property, value);
        self.dst.push_str(&placeholder);
    }

    /// Writes a column reference for `alias` (the main alias when `None`).
    fn column_ref(&mut self, alias: Option<&str>, column: &str) {
        let map = self.map;
        let alias = alias.unwrap_or(&map.main_alias().name);
        fmt!(self, ColumnRef { alias, column });
    }

    /// Looks up the column a property of an alias maps to. Unmapped aliases
    /// use the property as the column name.
    pub(super) fn resolve_column(
        &self,
        alias: Option<&str>,
        property: &str,
    ) -> Result<(Option<&'a Column>, String)> {
        let map = self.map;
        let alias_name = alias.unwrap_or(&map.main_alias().name);

        let Some(alias) = map.alias(alias_name) else {
            keel_core::bail!("unknown alias `{alias_name}` in condition on `{property}`");
        };

        let Some(id) = alias.model_id() else {
            return Ok((None, property.to_string()));
        };

        let model = self.schema().model(id);
        let column = model
            .column(property)
            .or_else(|| model.column_by_name(property))
            .ok_or_else(|| Error::property_not_found(&model.name, property))?;

        Ok((Some(column), column.name.clone()))
    }
}

#[cfg(test)]
mod tests {
    use crate::Serializer;

    use keel_core::{
        schema::{Column, ModelDef, Type},
        stmt::{Condition, ExpressionMap, Value},
        Capability, Schema,
    };
    use pretty_assertions::assert_eq;

    fn schema() -> Schema {
        let mut builder = Schema::builder();
        builder.model(
            ModelDef::new("User", "user")
                .column(Column::new("id", Type::Integer).primary())
                .column(Column::new("firstName", Type::Text).name("first_name"))
                .column(Column::new("active", Type::Boolean))
                .column(Column::new("deletedAt", Type::Timestamp).nullable()),
        );
        builder.build().unwrap()
    }

    fn render(map: &ExpressionMap, capability: &Capability) -> (String, Vec<Value>) {
        let schema = schema();
        let stmt = Serializer::new(&schema, capability).serialize(map).unwrap();
        let values = stmt.sql.values().into_iter().cloned().collect();
        (stmt.sql.text, values)
    }

    #[test]
    fn null_comparisons_become_is_null() {
        let schema = schema();
        let user = schema.model_by_name("User").unwrap();

        let mut map = ExpressionMap::delete(user);
        map.where_(Condition::eq("deletedAt", Value::Null))
            .and_where(Condition::ne("firstName", Value::Null));

        let (sql, values) = render(&map, &Capability::POSTGRESQL);
        assert_eq!(
            sql,
            "DELETE FROM \"user\" WHERE \"deletedAt\" IS NULL AND \"first_name\" IS NOT NULL"
        );
        assert!(values.is_empty());
    }

    #[test]
    fn empty_in_list_matches_nothing() {
        let schema = schema();
        let user = schema.model_by_name("User").unwrap();

        let mut map = ExpressionMap::delete(user);
        map.where_(Condition::in_list("id", Vec::<Value>::new()));

        let (sql, _) = render(&map, &Capability::POSTGRESQL);
        assert_eq!(sql, "DELETE FROM \"user\" WHERE 0 = 1");
    }

    #[test]
    fn compound_clauses_are_parenthesized() {
        let schema = schema();
        let user = schema.model_by_name("User").unwrap();

        let mut map = ExpressionMap::delete(user);
        map.where_(Condition::or([
            Condition::eq("id", 1),
            Condition::eq("id", 2),
        ]))
        .and_where(Condition::eq("active", true));

        let (sql, values) = render(&map, &Capability::SQLITE);
        assert_eq!(
            sql,
            "DELETE FROM \"user\" WHERE (\"id\" = ? OR \"id\" = ?) AND \"active\" = ?"
        );
        assert_eq!(values, [Value::I64(1), Value::I64(2), Value::I64(1)]);
    }

    #[test]
    fn raw_conditions_use_named_parameters() {
        let schema = schema();
        let user = schema.model_by_name("User").unwrap();

        let mut map = ExpressionMap::select(user, "u");
        map.where_(Condition::raw("u.firstName = :name OR u.id IN (:...ids)"))
            .set_parameter("name", "ann")
            .set_parameter("ids", Value::List(vec![1.into(), 2.into()]));

        let (sql, values) = render(&map, &Capability::POSTGRESQL);
        assert!(
            sql.ends_with("WHERE \"u\".\"first_name\" = $1 OR \"u\".\"id\" IN ($2, $3)"),
            "{sql}"
        );
        assert_eq!(values, [Value::from("ann"), Value::I64(1), Value::I64(2)]);
    }

    #[test]
    fn unknown_property_is_reported() {
        let schema = schema();
        let user = schema.model_by_name("User").unwrap();

        let mut map = ExpressionMap::delete(user);
        map.where_(Condition::eq("nickname", "x"));

        let err = Serializer::new(&schema, &Capability::POSTGRESQL)
            .serialize(&map)
            .unwrap_err();
        assert!(err.is_property_not_found());
    }
}
