use super::{Comma, Formatter, Ident};

use keel_core::{
    driver::OnConflictSyntax,
    schema::{Column, Generation, Model},
    stmt::{ConflictAction, Expr, Fields, OnConflict, Record, Value},
    Error, Result, ValuesMissingKind,
};

impl<'a> Formatter<'a> {
    /// Serializes an INSERT. Returns the values generated client-side for
    /// each row.
    pub(super) fn insert(&mut self) -> Result<Vec<Record>> {
        let map = self.map;

        let rows = match &map.value_set {
            Some(value_set) if !value_set.is_empty() => value_set.rows(),
            _ => return Err(Error::values_missing(ValuesMissingKind::EmptyValueSet)),
        };

        match self.main_model() {
            Some(model) => self.insert_model(model, rows),
            None => {
                self.insert_raw(rows)?;
                Ok(vec![])
            }
        }
    }

    fn insert_model(&mut self, model: &'a Model, rows: &[Fields]) -> Result<Vec<Record>> {
        let capability = self.capability();
        let map = self.map;
        let table = &model.table;

        let columns: Vec<&Column> = model
            .columns
            .iter()
            .filter(|column| self.is_insert_column(column, rows))
            .collect();

        let mut generated = vec![Record::new(); rows.len()];

        let mut returning = self.returning_columns(Some(model), "RETURNING")?;
        if map.update_entity && capability.supports_returning() && returning.raw.is_none() {
            returning.extend_columns(
                model
                    .columns
                    .iter()
                    .filter(|column| column.is_insert_returning() && !column.is_virtual),
            );
        }

        let identity_insert = capability.identity_insert
            && columns
                .iter()
                .any(|column| column.is_increment() && provided(rows, column));

        let overriding = capability.overriding_system_value
            && columns.iter().any(|column| {
                matches!(column.generation, Generation::Identity { always: true })
                    && provided(rows, column)
            });

        if identity_insert {
            fmt!(self, "SET IDENTITY_INSERT ", Ident(table), " ON; ");
        }

        self.insert_head(table)?;

        if columns.is_empty() {
            if rows.len() > 1 {
                return Err(Error::capability_unsupported(
                    "multi-row insert without columns",
                    capability.dialect,
                ));
            }

            self.output_clause(&returning, "INSERTED");
            fmt!(self, " ", capability.default_values_clause());
        } else {
            fmt!(self, "(", Comma(columns.iter().map(|column| Ident(&column.name))), ")");

            if overriding {
                fmt!(self, " OVERRIDING SYSTEM VALUE");
            }

            self.output_clause(&returning, "INSERTED");

            if capability.multi_row_values || rows.len() == 1 {
                fmt!(self, " VALUES ");
                for (i, row) in rows.iter().enumerate() {
                    if i > 0 {
                        fmt!(self, ", ");
                    }
                    fmt!(self, "(");
                    self.insert_cells(model, &columns, row, &mut generated[i], true);
                    fmt!(self, ")");
                }
            } else {
                for (i, row) in rows.iter().enumerate() {
                    fmt!(self, if i > 0 { " UNION ALL SELECT " } else { " SELECT " });
                    self.insert_cells(model, &columns, row, &mut generated[i], false);
                    fmt!(self, " FROM DUAL");
                }
            }
        }

        let column_names: Vec<String> = columns.iter().map(|column| column.name.clone()).collect();
        self.conflict_clause(Some(model), &column_names)?;
        self.returning_clause(&returning);

        if identity_insert {
            fmt!(self, "; SET IDENTITY_INSERT ", Ident(table), " OFF");
        }

        Ok(generated)
    }

    /// Inserts plain key/value rows into an unmapped table. The column list
    /// is the union of every row's keys.
    fn insert_raw(&mut self, rows: &[Fields]) -> Result<()> {
        let capability = self.capability();
        let table = self.target_table()?;

        let mut columns: Vec<&str> = vec![];
        for row in rows {
            for key in row.keys() {
                if !columns.contains(&key) {
                    columns.push(key);
                }
            }
        }

        if columns.is_empty() {
            return Err(Error::values_missing(ValuesMissingKind::NoColumnExpressions));
        }

        let returning = self.returning_columns(None, "RETURNING")?;

        self.insert_head(table)?;
        fmt!(self, "(", Comma(columns.iter().map(Ident)), ")");
        self.output_clause(&returning, "INSERTED");

        let keyword = capability.multi_row_values || rows.len() == 1;
        if keyword {
            fmt!(self, " VALUES ");
        }

        for (i, row) in rows.iter().enumerate() {
            match (keyword, i) {
                (true, 0) => fmt!(self, "("),
                (true, _) => fmt!(self, ", ("),
                (false, 0) => fmt!(self, " SELECT "),
                (false, _) => fmt!(self, " UNION ALL SELECT "),
            }

            for (j, name) in columns.iter().enumerate() {
                if j > 0 {
                    fmt!(self, ", ");
                }
                match row.get(name) {
                    Some(expr) => self.encode(None, name, expr),
                    None => self.default_value(None, keyword),
                }
            }

            fmt!(self, if keyword { ")" } else { " FROM DUAL" });
        }

        let column_names: Vec<String> = columns.iter().map(|name| name.to_string()).collect();
        self.conflict_clause(None, &column_names)?;
        self.returning_clause(&returning);

        Ok(())
    }

    /// `INSERT [IGNORE ]INTO "table"`
    fn insert_head(&mut self, table: &str) -> Result<()> {
        let capability = self.capability();

        let ignore = matches!(
            self.map.on_conflict,
            Some(OnConflict {
                action: ConflictAction::Ignore,
                ..
            })
        ) && capability.insert_ignore_modifier;

        fmt!(self, if ignore { "INSERT IGNORE INTO " } else { "INSERT INTO " }, Ident(table));
        Ok(())
    }

    fn is_insert_column(&self, column: &Column, rows: &[Fields]) -> bool {
        let map = self.map;

        if !column.insert {
            return false;
        }

        if !map.insert_columns.is_empty() && !map.insert_columns.contains(&column.property) {
            return false;
        }

        // Auto-increment columns are left to the database unless the dialect
        // wants them listed or the caller overrides the value.
        if column.is_increment() && !self.capability().insert_increment_columns {
            return provided(rows, column);
        }

        true
    }

    /// Renders the cells of one row in column order.
    fn insert_cells(
        &mut self,
        model: &Model,
        columns: &[&Column],
        row: &Fields,
        generated: &mut Record,
        allow_keyword: bool,
    ) {
        let capability = self.capability();

        for (i, column) in columns.iter().enumerate() {
            if i > 0 {
                fmt!(self, ", ");
            }

            if column.is_discriminator() {
                if let Some(value) = &model.discriminator_value {
                    self.encode_value(Some(column), &column.property, Value::from(value.as_str()));
                    continue;
                }
            }

            match row.get(&column.property) {
                Some(Expr::Default) => self.default_value(Some(column), allow_keyword),
                Some(expr) => self.encode(Some(column), &column.property, expr),
                None if column.is_version() => fmt!(self, "1"),
                None if column.generation == Generation::Uuid && !capability.uuid_generation => {
                    let value = Value::Uuid(uuid::Uuid::new_v4());
                    generated.insert(column.property.clone(), value.clone());
                    self.encode_value(Some(column), &column.property, value);
                }
                None => self.default_value(Some(column), allow_keyword),
            }
        }
    }

    fn conflict_clause(&mut self, model: Option<&Model>, columns: &[String]) -> Result<()> {
        let capability = self.capability();
        let map = self.map;

        let Some(on_conflict) = &map.on_conflict else {
            return Ok(());
        };

        let mut target = vec![];
        for property in &on_conflict.target {
            target.extend(self.column_names(model, property)?);
        }

        let update: Vec<String> = match &on_conflict.action {
            ConflictAction::Ignore => vec![],
            ConflictAction::Update(properties) => {
                let mut names = vec![];
                for property in properties {
                    names.extend(self.column_names(model, property)?);
                }
                names
            }
            ConflictAction::UpdateAll => columns
                .iter()
                .filter(|column| !target.contains(column))
                .cloned()
                .collect(),
        };

        match capability.on_conflict {
            OnConflictSyntax::OnConflict => {
                fmt!(self, " ON CONFLICT");

                if !target.is_empty() {
                    fmt!(self, " (", Comma(target.iter().map(Ident)), ")");
                }

                if update.is_empty() {
                    fmt!(self, " DO NOTHING");
                } else {
                    if target.is_empty() {
                        keel_core::bail!("ON CONFLICT DO UPDATE requires a conflict target");
                    }

                    fmt!(self, " DO UPDATE SET ");
                    for (i, column) in update.iter().enumerate() {
                        if i > 0 {
                            fmt!(self, ", ");
                        }
                        fmt!(self, Ident(column), " = EXCLUDED.", Ident(column));
                    }
                }
            }
            OnConflictSyntax::DuplicateKey => {
                if update.is_empty() {
                    // INSERT IGNORE already skips the conflicting rows
                    if !capability.insert_ignore_modifier {
                        return Err(Error::capability_unsupported(
                            "ignoring conflicting rows",
                            capability.dialect,
                        ));
                    }
                } else {
                    fmt!(self, " ON DUPLICATE KEY UPDATE ");
                    for (i, column) in update.iter().enumerate() {
                        if i > 0 {
                            fmt!(self, ", ");
                        }
                        fmt!(self, Ident(column), " = VALUES(", Ident(column), ")");
                    }
                }
            }
            OnConflictSyntax::None => {
                return Err(Error::capability_unsupported(
                    "ON CONFLICT",
                    capability.dialect,
                ));
            }
        }

        Ok(())
    }
}

/// True when any row supplies a non-null value for the column.
fn provided(rows: &[Fields], column: &Column) -> bool {
    rows.iter().any(|row| row.supplies(&column.property))
}
