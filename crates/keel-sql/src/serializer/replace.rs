use super::Formatter;

use keel_core::schema::Model;

impl Formatter<'_> {
    /// Rewrites `alias.property` tokens of mapped aliases in raw SQL to
    /// escaped column references. `alias.relation.property` resolves to the
    /// relation's foreign key column referencing `property`.
    ///
    /// Quoted text and `:name` parameter tokens are copied unchanged, as are
    /// tokens that do not resolve.
    pub(super) fn replace_properties(&self, sql: &str) -> String {
        let chars: Vec<char> = sql.chars().collect();
        let mut out = String::with_capacity(sql.len());
        let mut i = 0;

        let quote = self.capability().quote;

        while i < chars.len() {
            if let Some(end) = quote.quoted_end(&chars, i) {
                out.extend(&chars[i..end]);
                i = end;
                continue;
            }

            let c = chars[i];

            match c {
                ':' => {
                    // Parameter tokens (and casts) pass through untouched
                    let mut end = i + 1;
                    while end < chars.len() && (is_ident(chars[end]) || chars[end] == '.' || chars[end] == ':') {
                        end += 1;
                    }
                    out.extend(&chars[i..end]);
                    i = end;
                }
                c if is_ident_start(c) && (i == 0 || !is_ident(chars[i - 1])) => {
                    let mut end = i;
                    while end < chars.len() && (is_ident(chars[end]) || chars[end] == '.') {
                        end += 1;
                    }

                    let token: String = chars[i..end].iter().collect();
                    match self.resolve_token(&token) {
                        Some(replacement) => out.push_str(&replacement),
                        None => out.push_str(&token),
                    }
                    i = end;
                }
                c => {
                    out.push(c);
                    i += 1;
                }
            }
        }

        out
    }

    fn resolve_token(&self, token: &str) -> Option<String> {
        let mut segments = token.split('.');
        let alias = segments.next()?;
        let property = segments.next()?;
        let nested = segments.next();

        if segments.next().is_some() {
            return None;
        }

        let model = self.map.alias_model(self.schema(), alias)?;
        let column = match nested {
            None => model.column(property)?,
            Some(referenced) => foreign_key_column(model, property, referenced)?,
        };

        let capability = self.capability();
        let column = capability.quote(&column.name);

        Some(if self.qualify {
            format!("{}.{column}", capability.quote(alias))
        } else {
            column
        })
    }
}

/// The foreign key column of `relation` that references `referenced`.
fn foreign_key_column<'a>(
    model: &'a Model,
    relation: &'a str,
    referenced: &str,
) -> Option<&'a keel_core::schema::Column> {
    model.relation(relation)?;
    model.columns_for_property(relation).find(|column| {
        column
            .references
            .as_ref()
            .is_some_and(|reference| reference.property == referenced)
    })
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

#[cfg(test)]
mod tests {
    use crate::Serializer;

    use keel_core::{
        schema::{Column, ModelDef, Type},
        stmt::{Condition, Direction, ExpressionMap, Fields},
        Capability, Schema,
    };
    use pretty_assertions::assert_eq;

    fn schema() -> Schema {
        let mut builder = Schema::builder();
        builder
            .model(
                ModelDef::new("User", "user")
                    .column(Column::new("id", Type::Integer).primary())
                    .column(Column::new("firstName", Type::Text).name("first_name")),
            )
            .model(
                ModelDef::new("Post", "post")
                    .column(Column::new("id", Type::Integer).primary())
                    .many_to_one("author", "User", &[("author_id", "id")]),
            );
        builder.build().unwrap()
    }

    #[test]
    fn properties_become_columns_outside_quotes() {
        let schema = schema();
        let user = schema.model_by_name("User").unwrap();

        let mut map = ExpressionMap::select(user, "u");
        map.where_(Condition::raw(
            "u.firstName = 'u.firstName' AND \"u.firstName\" <> x.firstName",
        ))
        .order_by("u.firstName", Direction::Desc);

        let stmt = Serializer::new(&schema, &Capability::POSTGRESQL)
            .serialize(&map)
            .unwrap();

        assert_eq!(
            stmt.sql.text,
            "SELECT \"u\".\"id\" AS \"u_id\", \"u\".\"first_name\" AS \"u_first_name\" \
             FROM \"user\" \"u\" \
             WHERE \"u\".\"first_name\" = 'u.firstName' AND \"u.firstName\" <> x.firstName \
             ORDER BY \"u\".\"first_name\" DESC"
        );
    }

    #[test]
    fn relation_paths_resolve_to_foreign_keys() {
        let schema = schema();
        let post = schema.model_by_name("Post").unwrap();

        let mut map = ExpressionMap::delete(post);
        map.where_(Condition::raw("Post.author.id = 3"));

        let stmt = Serializer::new(&schema, &Capability::MYSQL)
            .serialize(&map)
            .unwrap();

        assert_eq!(stmt.sql.text, "DELETE FROM `post` WHERE `author_id` = 3");
    }

    #[test]
    fn brackets_are_subscripts_outside_bracket_dialects() {
        let schema = schema();
        let user = schema.model_by_name("User").unwrap();

        let mut map = ExpressionMap::update(user);
        map.update_entity(false)
            .set(Fields::new().set("firstName", "a"))
            .where_(Condition::raw("tags[User.id] = 1 AND [User.firstName] = 2"));

        let postgres = Serializer::new(&schema, &Capability::POSTGRESQL)
            .serialize(&map)
            .unwrap();
        assert_eq!(
            postgres.sql.text,
            "UPDATE \"user\" SET \"first_name\" = $1 \
             WHERE tags[\"id\"] = 1 AND [\"first_name\"] = 2"
        );

        let mssql = Serializer::new(&schema, &Capability::MSSQL)
            .serialize(&map)
            .unwrap();
        assert_eq!(
            mssql.sql.text,
            "UPDATE [user] SET [first_name] = @0 WHERE tags[User.id] = 1 AND [User.firstName] = 2"
        );
    }
}
