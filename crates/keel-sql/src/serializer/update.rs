use super::{Formatter, Ident};

use keel_core::{
    schema::Model,
    stmt::{Fields, ValueSet},
    Error, Result, ValuesMissingKind,
};

impl<'a> Formatter<'a> {
    pub(super) fn update(&mut self) -> Result<()> {
        let map = self.map;
        let capability = self.capability();

        let fields = match &map.value_set {
            Some(ValueSet::One(fields)) if !fields.is_empty() => fields,
            Some(ValueSet::Many(_)) => {
                keel_core::bail!("an update takes a single set of values, not a list of rows")
            }
            _ => return Err(Error::values_missing(ValuesMissingKind::EmptyValueSet)),
        };

        let table = self.target_table()?;
        let model = self.main_model();

        let mut returning = self.returning_columns(model, "RETURNING")?;
        if let Some(model) = model {
            if map.update_entity && capability.supports_returning() && returning.raw.is_none() {
                let refreshed: Vec<_> = model
                    .columns
                    .iter()
                    .filter(|column| column.is_update_returning())
                    .collect();

                if !refreshed.is_empty() {
                    returning.extend_columns(refreshed);
                    if !map.where_entities.is_empty() {
                        returning.extend_columns(model.primary_columns());
                    }
                }
            }
        }

        fmt!(self, "UPDATE ", Ident(table), " SET ");

        match model {
            Some(model) => self.update_assignments(model, fields)?,
            None => {
                for (i, (name, expr)) in fields.iter().enumerate() {
                    if i > 0 {
                        fmt!(self, ", ");
                    }
                    fmt!(self, Ident(name), " = ");
                    self.encode(None, name, expr);
                }
            }
        }

        self.output_clause(&returning, "INSERTED");
        self.where_clause(None)?;
        self.modify_order_and_limit("UPDATE")?;
        self.returning_clause(&returning);

        Ok(())
    }

    /// `"column" = <expr>` for every updatable column the values touch, plus
    /// the version increment and update timestamp.
    fn update_assignments(&mut self, model: &'a Model, fields: &Fields) -> Result<()> {
        let mut assigned: Vec<&str> = vec![];

        for (property, expr) in fields.iter() {
            let mut columns = model.columns_for_property(property).peekable();

            if columns.peek().is_none() {
                return Err(Error::property_not_found(&model.name, property));
            }

            for column in columns {
                if !column.update || assigned.contains(&column.name.as_str()) {
                    continue;
                }

                if !assigned.is_empty() {
                    fmt!(self, ", ");
                }

                fmt!(self, Ident(&column.name), " = ");
                self.encode(Some(column), property, expr);
                assigned.push(&column.name);
            }
        }

        if assigned.is_empty() {
            return Err(Error::values_missing(ValuesMissingKind::NoColumnExpressions));
        }

        if let Some(version) = model.version_column() {
            if !assigned.contains(&version.name.as_str()) {
                fmt!(self, ", ", Ident(&version.name), " = ", Ident(&version.name), " + 1");
            }
        }

        if let Some(update_date) = model.update_date_column() {
            if !assigned.contains(&update_date.name.as_str()) {
                fmt!(self, ", ", Ident(&update_date.name), " = CURRENT_TIMESTAMP");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::Serializer;

    use keel_core::{
        driver::ReturningKind,
        schema::{Column, ColumnRole, ModelDef, Type},
        stmt::{Condition, Direction, ExpressionMap, Fields, Record, Value},
        Capability, Schema, ValuesMissingKind,
    };
    use pretty_assertions::assert_eq;

    fn schema() -> Schema {
        let mut builder = Schema::builder();
        builder.model(
            ModelDef::new("Post", "post")
                .column(Column::new("id", Type::Integer).primary())
                .column(Column::new("title", Type::Text))
                .column(Column::new("version", Type::Integer).role(ColumnRole::Version))
                .column(Column::new("updatedAt", Type::Timestamp).role(ColumnRole::UpdateDate))
                .column(Column::new("slug", Type::Text).no_update()),
        );
        builder.build().unwrap()
    }

    #[test]
    fn version_and_update_date_are_appended() {
        let schema = schema();
        let post = schema.model_by_name("Post").unwrap();
        let capability = Capability {
            returning: ReturningKind::None,
            ..Capability::POSTGRESQL
        };

        let mut map = ExpressionMap::update(post);
        map.set(Fields::new().set("title", "new"))
            .where_(Condition::eq("id", 1));

        let stmt = Serializer::new(&schema, &capability).serialize(&map).unwrap();
        assert_eq!(
            stmt.sql.text,
            "UPDATE \"post\" SET \"title\" = $1, \"version\" = \"version\" + 1, \
             \"updatedAt\" = CURRENT_TIMESTAMP WHERE \"id\" = $2"
        );
        assert_eq!(stmt.sql.values(), [&Value::from("new"), &Value::I64(1)]);
    }

    #[test]
    fn explicit_version_is_not_doubled() {
        let schema = schema();
        let post = schema.model_by_name("Post").unwrap();

        let mut map = ExpressionMap::update(post);
        map.update_entity(false)
            .set(Fields::new().set("title", "new").set("version", 9));

        let stmt = Serializer::new(&schema, &Capability::SQLITE)
            .serialize(&map)
            .unwrap();
        assert_eq!(
            stmt.sql.text,
            "UPDATE \"post\" SET \"title\" = ?, \"version\" = ?, \"updatedAt\" = CURRENT_TIMESTAMP"
        );
    }

    #[test]
    fn refreshed_columns_are_returned_with_keys() {
        let schema = schema();
        let post = schema.model_by_name("Post").unwrap();

        let mut map = ExpressionMap::update(post);
        map.set(Fields::new().set("title", "new"))
            .where_entity(&schema, vec![Record::new().set("id", 4)])
            .unwrap();

        let stmt = Serializer::new(&schema, &Capability::POSTGRESQL)
            .serialize(&map)
            .unwrap();
        assert!(
            stmt.sql
                .text
                .ends_with("WHERE \"id\" IN ($2) RETURNING \"version\", \"updatedAt\", \"id\""),
            "{}",
            stmt.sql.text
        );

        let stmt = Serializer::new(&schema, &Capability::MSSQL)
            .serialize(&map)
            .unwrap();
        assert!(
            stmt.sql.text.contains(
                "OUTPUT INSERTED.[version], INSERTED.[updatedAt], INSERTED.[id] WHERE [id] IN (@1)"
            ),
            "{}",
            stmt.sql.text
        );
    }

    #[test]
    fn empty_and_unusable_value_sets() {
        let schema = schema();
        let post = schema.model_by_name("Post").unwrap();
        let serializer = Serializer::new(&schema, &Capability::POSTGRESQL);

        let mut map = ExpressionMap::update(post);
        map.set(Fields::new());
        let err = serializer.serialize(&map).unwrap_err();
        assert_eq!(err.values_missing_kind(), Some(ValuesMissingKind::EmptyValueSet));

        map.set(Fields::new().set("slug", "x"));
        let err = serializer.serialize(&map).unwrap_err();
        assert_eq!(
            err.values_missing_kind(),
            Some(ValuesMissingKind::NoColumnExpressions)
        );

        map.set(Fields::new().set("body", "x"));
        let err = serializer.serialize(&map).unwrap_err();
        assert!(err.is_property_not_found());
    }

    #[test]
    fn order_and_limit_need_dialect_support() {
        let schema = schema();
        let post = schema.model_by_name("Post").unwrap();

        let mut map = ExpressionMap::update(post);
        map.update_entity(false)
            .set(Fields::new().set("title", "x"))
            .order_by("Post.id", Direction::Asc)
            .limit(1);

        let stmt = Serializer::new(&schema, &Capability::MYSQL)
            .serialize(&map)
            .unwrap();
        assert!(stmt.sql.text.ends_with(" ORDER BY `id` ASC LIMIT 1"), "{}", stmt.sql.text);

        let err = Serializer::new(&schema, &Capability::POSTGRESQL)
            .serialize(&map)
            .unwrap_err();
        assert!(err.is_capability_unsupported());
    }
}
