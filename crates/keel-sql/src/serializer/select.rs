use super::{ColumnAlias, ColumnRef, Formatter, Ident};

use keel_core::{
    driver::LockSyntax,
    schema::{JoinPath, Model},
    stmt::{Alias, AliasSource, JoinAttribute, Value},
    Error, Result,
};

impl<'a> Formatter<'a> {
    pub(super) fn select(&mut self) -> Result<()> {
        let map = self.map;
        let capability = self.capability();
        let main = map.main_alias();

        fmt!(self, "SELECT ");
        self.selections()?;

        fmt!(self, " FROM ");
        self.source(main);

        if let Some(lock) = map.lock {
            if capability.lock == LockSyntax::TableHint {
                fmt!(self, capability.lock_clause(lock)?);
            }
        }

        for join in &map.joins {
            self.join(join)?;
        }

        let inheritance = match map.main_model(self.schema()) {
            Some(model) => self.discriminator_filter(&main.name, model),
            None => None,
        };
        self.where_clause(inheritance)?;

        self.order_by_clause();
        fmt!(
            self,
            capability.limit_clause(map.limit, map.offset, !map.order_bys.is_empty())
        );

        if let Some(lock) = map.lock {
            if capability.lock != LockSyntax::TableHint {
                fmt!(self, capability.lock_clause(lock)?);
            }
        }

        Ok(())
    }

    /// The select list. Every selected column is aliased `<alias>_<column>`
    /// so rows can be split back per alias.
    fn selections(&mut self) -> Result<()> {
        let map = self.map;
        let schema = self.schema();
        let mut written = 0;

        for alias in &map.aliases {
            if !map.is_alias_selected(&alias.name) {
                continue;
            }

            let whole = map.selects.iter().any(|selection| *selection == alias.name);

            let Some(id) = alias.model_id() else {
                if whole {
                    self.separator(&mut written);
                    fmt!(self, Ident(&alias.name), ".*");
                    continue;
                }

                for selection in &map.selects {
                    if let Some((name, column)) = selection.split_once('.') {
                        if name == alias.name {
                            self.separator(&mut written);
                            fmt!(self, ColumnAlias { alias: name, column });
                        }
                    }
                }
                continue;
            };

            let model = schema.model(id);

            for selection in &map.selects {
                if let Some((name, property)) = selection.split_once('.') {
                    if name == alias.name && model.columns_for_property(property).next().is_none() {
                        return Err(Error::property_not_found(&model.name, property));
                    }
                }
            }

            for column in &model.columns {
                let selected = whole
                    || column.primary_key
                    || column.is_discriminator()
                    || map.is_selected(&alias.name, &column.property);

                if selected {
                    self.separator(&mut written);
                    fmt!(
                        self,
                        ColumnAlias {
                            alias: &alias.name,
                            column: &column.name
                        }
                    );
                }
            }
        }

        // Selections not addressing an alias are raw expressions
        for selection in &map.selects {
            let head = selection.split('.').next().unwrap_or_default();
            if map.alias(head).is_none() {
                self.separator(&mut written);
                let sql = self.replace_properties(selection);
                fmt!(self, sql);
            }
        }

        if written == 0 {
            fmt!(self, "*");
        }

        Ok(())
    }

    fn separator(&mut self, written: &mut usize) {
        if *written > 0 {
            fmt!(self, ", ");
        }
        *written += 1;
    }

    /// `"table" "alias"` or `(<sql>) "alias"`
    fn source(&mut self, alias: &Alias) {
        match &alias.source {
            AliasSource::Model(id) => {
                let table = &self.schema().model(*id).table;
                fmt!(self, Ident(table), " ", Ident(&alias.name));
            }
            AliasSource::Table(table) => fmt!(self, Ident(table), " ", Ident(&alias.name)),
            AliasSource::Subquery(sql) => fmt!(self, "(", sql, ") ", Ident(&alias.name)),
        }
    }

    fn join(&mut self, join: &JoinAttribute) -> Result<()> {
        let map = self.map;
        let schema = self.schema();
        let kind = join.kind.as_sql();

        let Some(target) = map.alias(&join.alias) else {
            keel_core::bail!("join references unknown alias `{}`", join.alias);
        };

        let Some(property) = &join.relation else {
            // Joined onto a property path; the condition is the whole ON clause
            fmt!(self, " ", kind, " ");
            self.source(target);
            let on = match &join.condition {
                Some(condition) => self.replace_properties(condition),
                None => "1 = 1".to_string(),
            };
            fmt!(self, " ON ", on);
            return self.join_inheritance(target);
        };

        let Some(parent) = map.alias_model(schema, &join.parent_alias) else {
            keel_core::bail!("alias `{}` is not mapped to a model", join.parent_alias);
        };

        let relation = parent
            .relation(property)
            .ok_or_else(|| Error::property_not_found(&parent.name, property))?;

        let Some(path) = relation.join_path(schema, parent) else {
            keel_core::bail!(
                "cannot resolve join columns of {}.{}",
                parent.name,
                relation.property
            );
        };

        let child = join.alias.as_str();
        let parent = join.parent_alias.as_str();

        match &path {
            JoinPath::Owner { pairs } => {
                fmt!(self, " ", kind, " ");
                self.source(target);
                fmt!(self, " ON ");
                for (i, (fk, referenced)) in pairs.iter().enumerate() {
                    if i > 0 {
                        fmt!(self, " AND ");
                    }
                    self.column_equals((child, referenced), (parent, fk));
                }
            }
            JoinPath::Inverse { pairs } => {
                fmt!(self, " ", kind, " ");
                self.source(target);
                fmt!(self, " ON ");
                for (i, (fk, referenced)) in pairs.iter().enumerate() {
                    if i > 0 {
                        fmt!(self, " AND ");
                    }
                    self.column_equals((child, fk), (parent, referenced));
                }
            }
            JoinPath::Junction {
                table,
                parent: parent_pairs,
                child: child_pairs,
            } => {
                let junction = join.junction_alias();

                fmt!(self, " ", kind, " ", Ident(table), " ", Ident(&junction), " ON ");
                for (i, (referenced, column)) in parent_pairs.iter().enumerate() {
                    if i > 0 {
                        fmt!(self, " AND ");
                    }
                    self.column_equals((&junction, column), (parent, referenced));
                }

                fmt!(self, " ", kind, " ");
                self.source(target);
                fmt!(self, " ON ");
                for (i, (referenced, column)) in child_pairs.iter().enumerate() {
                    if i > 0 {
                        fmt!(self, " AND ");
                    }
                    self.column_equals((child, referenced), (&junction, column));
                }
            }
        }

        if let Some(condition) = &join.condition {
            let condition = self.replace_properties(condition);
            fmt!(self, " AND (", condition, ")");
        }

        self.join_inheritance(target)
    }

    fn join_inheritance(&mut self, target: &Alias) -> Result<()> {
        let Some(id) = target.model_id() else {
            return Ok(());
        };

        let model = self.schema().model(id);
        if let Some(filter) = self.discriminator_filter(&target.name, model) {
            fmt!(self, " AND ", filter);
        }

        Ok(())
    }

    fn column_equals(&mut self, (a, x): (&str, &str), (b, y): (&str, &str)) {
        fmt!(
            self,
            ColumnRef {
                alias: a,
                column: x
            },
            " = ",
            ColumnRef {
                alias: b,
                column: y
            }
        );
    }

    /// Restricts an inheritance child to its own discriminator values (and
    /// those of its descendants). Roots see every row.
    fn discriminator_filter(&mut self, alias: &str, model: &Model) -> Option<String> {
        model.parent?;
        let column = model.discriminator_column()?;

        let values: Vec<Value> = self
            .schema()
            .discriminator_values(model.id)
            .into_iter()
            .map(Value::from)
            .collect();

        let capability = self.capability();
        let placeholder = self.params.list_placeholder("discriminator", values);

        Some(format!(
            "{}.{} IN ({placeholder})",
            capability.quote(alias),
            capability.quote(&column.name)
        ))
    }
}

#[cfg(test)]
mod tests {
    use crate::Serializer;

    use keel_core::{
        schema::{Column, ColumnRole, Junction, ModelDef, Type},
        stmt::{Condition, Direction, ExpressionMap, LockMode, Value},
        Capability, Schema,
    };
    use pretty_assertions::assert_eq;

    fn schema() -> Schema {
        let mut builder = Schema::builder();
        builder
            .model(
                ModelDef::new("User", "user")
                    .column(Column::new("id", Type::Integer).primary())
                    .column(Column::new("name", Type::Text))
                    .one_to_many("posts", "Post", "author"),
            )
            .model(
                ModelDef::new("Post", "post")
                    .column(Column::new("id", Type::Integer).primary())
                    .column(Column::new("title", Type::Text))
                    .many_to_one("author", "User", &[("authorId", "id")])
                    .many_to_many(
                        "tags",
                        "Tag",
                        Junction::new("post_tags", &[("postId", "id")], &[("tagId", "id")]),
                    ),
            )
            .model(
                ModelDef::new("Tag", "tag")
                    .column(Column::new("id", Type::Integer).primary())
                    .column(Column::new("label", Type::Text)),
            )
            .model(
                ModelDef::new("Content", "content")
                    .column(Column::new("id", Type::Integer).primary())
                    .column(Column::new("type", Type::Text).role(ColumnRole::Discriminator))
                    .column(Column::new("ownerId", Type::Integer)),
            )
            .model(
                ModelDef::new("Photo", "ignored")
                    .child_of("Content", "photo")
                    .column(Column::new("size", Type::Integer)),
            );
        builder.build().unwrap()
    }

    fn sql(map: &ExpressionMap, capability: &Capability) -> String {
        let schema = schema();
        Serializer::new(&schema, capability)
            .serialize(map)
            .unwrap()
            .sql
            .text
    }

    #[test]
    fn joined_relation_columns_are_aliased() {
        let schema = schema();
        let user = schema.model_by_name("User").unwrap();

        let mut map = ExpressionMap::select(user, "u");
        map.left_join_and_select(&schema, "u.posts", "p").unwrap();

        assert_eq!(
            sql(&map, &Capability::POSTGRESQL),
            "SELECT \"u\".\"id\" AS \"u_id\", \"u\".\"name\" AS \"u_name\", \
             \"p\".\"id\" AS \"p_id\", \"p\".\"title\" AS \"p_title\", \
             \"p\".\"authorId\" AS \"p_authorId\" \
             FROM \"user\" \"u\" LEFT JOIN \"post\" \"p\" ON \"p\".\"authorId\" = \"u\".\"id\""
        );
    }

    #[test]
    fn owning_join_with_extra_condition() {
        let schema = schema();
        let post = schema.model_by_name("Post").unwrap();

        let mut map = ExpressionMap::select(post, "p");
        map.selects = vec!["p.title".to_string()];
        map.inner_join(&schema, "p.author", "a")
            .unwrap()
            .and_where(Condition::eq("a.name", "ann"));
        map.joins[0].condition = Some("a.name <> ''".to_string());

        assert_eq!(
            sql(&map, &Capability::SQLITE),
            "SELECT \"p\".\"id\" AS \"p_id\", \"p\".\"title\" AS \"p_title\" \
             FROM \"post\" \"p\" INNER JOIN \"user\" \"a\" ON \"a\".\"id\" = \"p\".\"authorId\" \
             AND (\"a\".\"name\" <> '') WHERE \"a\".\"name\" = ?"
        );
    }

    #[test]
    fn many_to_many_joins_through_the_junction() {
        let schema = schema();
        let post = schema.model_by_name("Post").unwrap();

        let mut map = ExpressionMap::select(post, "p");
        map.selects.clear();
        map.left_join_and_select(&schema, "p.tags", "t").unwrap();

        assert_eq!(
            sql(&map, &Capability::MYSQL),
            "SELECT `t`.`id` AS `t_id`, `t`.`label` AS `t_label` FROM `post` `p` \
             LEFT JOIN `post_tags` `p_t` ON `p_t`.`postId` = `p`.`id` \
             LEFT JOIN `tag` `t` ON `t`.`id` = `p_t`.`tagId`"
        );
    }

    #[test]
    fn inheritance_children_filter_by_discriminator() {
        let schema = schema();
        let photo = schema.model_by_name("Photo").unwrap();

        let mut map = ExpressionMap::select(photo, "c");
        map.where_(Condition::gt("c.size", 10));

        let stmt = Serializer::new(&schema, &Capability::POSTGRESQL)
            .serialize(&map)
            .unwrap();
        assert_eq!(
            stmt.sql.text,
            "SELECT \"c\".\"id\" AS \"c_id\", \"c\".\"type\" AS \"c_type\", \
             \"c\".\"ownerId\" AS \"c_ownerId\", \"c\".\"size\" AS \"c_size\" \
             FROM \"content\" \"c\" WHERE \"c\".\"size\" > $1 AND \"c\".\"type\" IN ($2)"
        );
        assert_eq!(stmt.sql.values(), [&Value::I64(10), &Value::from("photo")]);

        let content = schema.model_by_name("Content").unwrap();
        let map = ExpressionMap::select(content, "c");
        assert!(!sql(&map, &Capability::POSTGRESQL).contains("WHERE"));
    }

    #[test]
    fn mapped_joins_use_their_condition() {
        let schema = schema();
        let user = schema.model_by_name("User").unwrap();
        let photo = schema.model_by_name("Photo").unwrap();

        let mut map = ExpressionMap::select(user, "u");
        map.selects.clear();
        map.left_join_and_map_many("u.photos", photo, "ph", "ph.ownerId = u.id")
            .unwrap();

        let text = sql(&map, &Capability::POSTGRESQL);
        assert!(
            text.ends_with(
                "FROM \"user\" \"u\" LEFT JOIN \"content\" \"ph\" ON \"ph\".\"ownerId\" = \"u\".\"id\" \
                 AND \"ph\".\"type\" IN ($1)"
            ),
            "{text}"
        );
    }

    #[test]
    fn pagination_per_dialect() {
        let schema = schema();
        let user = schema.model_by_name("User").unwrap();

        let mut map = ExpressionMap::select(user, "u");
        map.selects = vec!["u.id".to_string()];
        map.limit(10).offset(5);

        assert_eq!(
            sql(&map, &Capability::MSSQL),
            "SELECT [u].[id] AS [u_id] FROM [user] [u] \
             ORDER BY (SELECT NULL) OFFSET 5 ROWS FETCH NEXT 10 ROWS ONLY"
        );

        map.order_by("u.name", Direction::Desc);
        assert_eq!(
            sql(&map, &Capability::SQLITE),
            "SELECT \"u\".\"id\" AS \"u_id\" FROM \"user\" \"u\" \
             ORDER BY \"u\".\"name\" DESC LIMIT 10 OFFSET 5"
        );
    }

    #[test]
    fn locks_per_dialect() {
        let schema = schema();
        let user = schema.model_by_name("User").unwrap();

        let mut map = ExpressionMap::select(user, "u");
        map.selects = vec!["u.id".to_string()];
        map.set_lock(LockMode::PessimisticWrite);

        assert_eq!(
            sql(&map, &Capability::MSSQL),
            "SELECT [u].[id] AS [u_id] FROM [user] [u] WITH (UPDLOCK, ROWLOCK)"
        );
        assert_eq!(
            sql(&map, &Capability::POSTGRESQL),
            "SELECT \"u\".\"id\" AS \"u_id\" FROM \"user\" \"u\" FOR UPDATE"
        );

        map.set_lock(LockMode::PessimisticRead);
        assert!(sql(&map, &Capability::MYSQL).ends_with(" LOCK IN SHARE MODE"));

        let err = Serializer::new(&schema, &Capability::SQLITE)
            .serialize(&map)
            .unwrap_err();
        assert!(err.is_capability_unsupported());
    }

    #[test]
    fn subqueries_and_raw_selections() {
        let schema = schema();

        let mut map = ExpressionMap::select_from_subquery(
            "SELECT \"id\" FROM \"user\" WHERE \"name\" = :name",
            "s",
        );
        map.set_parameter("name", "ann")
            .add_select("COUNT(*) AS total");

        let stmt = Serializer::new(&schema, &Capability::POSTGRESQL)
            .serialize(&map)
            .unwrap();
        assert_eq!(
            stmt.sql.text,
            "SELECT \"s\".*, COUNT(*) AS total \
             FROM (SELECT \"id\" FROM \"user\" WHERE \"name\" = $1) \"s\""
        );
        assert_eq!(stmt.sql.values(), [&Value::from("ann")]);
    }

    #[test]
    fn selecting_an_unknown_property_fails() {
        let schema = schema();
        let user = schema.model_by_name("User").unwrap();

        let mut map = ExpressionMap::select(user, "u");
        map.selects = vec!["u.nickname".to_string()];

        let err = Serializer::new(&schema, &Capability::POSTGRESQL)
            .serialize(&map)
            .unwrap_err();
        assert!(err.is_property_not_found());
    }
}
