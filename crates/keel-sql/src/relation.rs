use keel_core::{
    schema::{JoinPath, Model, Relation, Schema},
    stmt::{Condition, ExpressionMap, Fields, Value},
    Error, Result,
};

/// Builds the writes that link and unlink related entities without loading
/// them: foreign key updates, or junction rows for many-to-many relations.
///
/// `of` identifies the entity owning the relation and every related value
/// identifies a target entity. Identifiers are either bare key values (single
/// column keys) or records carrying the key properties.
#[derive(Debug)]
pub struct RelationQuery<'a> {
    schema: &'a Schema,
    model: &'a Model,
    relation: &'a Relation,
}

impl<'a> RelationQuery<'a> {
    pub fn new(schema: &'a Schema, model: &'a Model, property: &str) -> Result<RelationQuery<'a>> {
        let relation = model
            .relation(property)
            .ok_or_else(|| Error::property_not_found(&model.name, property))?;

        Ok(RelationQuery {
            schema,
            model,
            relation,
        })
    }

    /// Points a to-one relation of `of` at `value`. A null value unlinks.
    pub fn set(&self, of: Value, value: Value) -> Result<ExpressionMap> {
        if !self.relation.is_to_one() {
            return Err(self.mismatch("set"));
        }

        let target = self.relation.target(self.schema);

        match self.join_path()? {
            JoinPath::Owner { .. } => {
                let mut map = write(ExpressionMap::update(self.model));
                map.set(Fields::new().set(&self.relation.property, value))
                    .where_in_ids(self.schema, vec![of])?;
                Ok(map)
            }
            JoinPath::Inverse { pairs } => {
                let inverse = self.inverse_property()?;
                let mut map = write(ExpressionMap::update(target));

                if value.is_null() {
                    map.set(Fields::new().set(inverse, Value::Null))
                        .where_(self.foreign_key_matches(&pairs, &of)?);
                } else {
                    map.set(Fields::new().set(inverse, of))
                        .where_in_ids(self.schema, vec![value])?;
                }

                Ok(map)
            }
            JoinPath::Junction { .. } => Err(self.mismatch("set")),
        }
    }

    /// Links every entity in `values` to `of`.
    pub fn add(&self, of: Value, values: Vec<Value>) -> Result<ExpressionMap> {
        if !self.relation.is_to_many() {
            return Err(self.mismatch("add"));
        }

        match self.join_path()? {
            JoinPath::Inverse { .. } => {
                let target = self.relation.target(self.schema);
                let mut map = write(ExpressionMap::update(target));
                map.set(Fields::new().set(self.inverse_property()?, of))
                    .where_in_ids(self.schema, values)?;
                Ok(map)
            }
            JoinPath::Junction {
                table,
                parent,
                child,
            } => {
                let target = self.relation.target(self.schema);
                let rows = values
                    .iter()
                    .map(|value| {
                        let mut fields = Fields::new();
                        for (column, part) in junction_parts(self.model, &parent, &of)? {
                            fields.insert(column, part);
                        }
                        for (column, part) in junction_parts(target, &child, value)? {
                            fields.insert(column, part);
                        }
                        Ok(fields)
                    })
                    .collect::<Result<Vec<_>>>()?;

                let mut map = write(ExpressionMap::insert_into(&table));
                map.values(rows);
                Ok(map)
            }
            JoinPath::Owner { .. } => Err(self.mismatch("add")),
        }
    }

    /// Unlinks every entity in `values` from `of`.
    pub fn remove(&self, of: Value, values: Vec<Value>) -> Result<ExpressionMap> {
        if !self.relation.is_to_many() {
            return Err(self.mismatch("remove"));
        }

        match self.join_path()? {
            JoinPath::Inverse { pairs } => {
                let target = self.relation.target(self.schema);
                let mut map = write(ExpressionMap::update(target));
                map.set(Fields::new().set(self.inverse_property()?, Value::Null))
                    .where_in_ids(self.schema, values)?
                    .and_where(self.foreign_key_matches(&pairs, &of)?);
                Ok(map)
            }
            JoinPath::Junction {
                table,
                parent,
                child,
            } => {
                let target = self.relation.target(self.schema);
                let parent_parts = junction_parts(self.model, &parent, &of)?;

                let terms = values
                    .iter()
                    .map(|value| {
                        let terms = parent_parts
                            .iter()
                            .cloned()
                            .chain(junction_parts(target, &child, value)?)
                            .map(|(column, part)| Condition::eq(&column, part))
                            .collect::<Vec<_>>();
                        Ok(Condition::and(terms))
                    })
                    .collect::<Result<Vec<_>>>()?;

                let mut map = write(ExpressionMap::delete_from(&table));
                map.where_(Condition::or(terms));
                Ok(map)
            }
            JoinPath::Owner { .. } => Err(self.mismatch("remove")),
        }
    }

    fn join_path(&self) -> Result<JoinPath> {
        match self.relation.join_path(self.schema, self.model) {
            Some(path) => Ok(path),
            None => keel_core::bail!(
                "cannot resolve join columns of {}.{}",
                self.model.name,
                self.relation.property
            ),
        }
    }

    fn inverse_property(&self) -> Result<&'a str> {
        match self.relation.inverse.as_deref() {
            Some(inverse) => Ok(inverse),
            None => keel_core::bail!(
                "{}.{} has no inverse relation",
                self.model.name,
                self.relation.property
            ),
        }
    }

    /// `fk = <of's referenced value>` for every foreign key column on the
    /// target.
    fn foreign_key_matches(&self, pairs: &[(String, String)], of: &Value) -> Result<Condition> {
        let terms = pairs
            .iter()
            .map(|(fk, referenced)| {
                let part = key_part(self.model, referenced, of, pairs.len())?;
                Ok(Condition::eq(fk, part))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(match <[Condition; 1]>::try_from(terms) {
            Ok([term]) => term,
            Err(terms) => Condition::and(terms),
        })
    }

    fn mismatch(&self, operation: &'static str) -> Error {
        Error::relation_cardinality_mismatch(
            operation,
            format!("{}.{}", self.model.name, self.relation.property),
            self.relation.kind,
        )
    }
}

fn write(mut map: ExpressionMap) -> ExpressionMap {
    map.call_listeners(false).update_entity(false);
    map
}

/// Junction column values identifying `id` on `model`.
fn junction_parts(
    model: &Model,
    pairs: &[(String, String)],
    id: &Value,
) -> Result<Vec<(String, Value)>> {
    pairs
        .iter()
        .map(|(referenced, column)| {
            Ok((column.clone(), key_part(model, referenced, id, pairs.len())?))
        })
        .collect()
}

/// The value of `model`'s column `referenced` within an identifier.
fn key_part(model: &Model, referenced: &str, id: &Value, width: usize) -> Result<Value> {
    let Some(column) = model.column_by_name(referenced) else {
        keel_core::bail!("{} has no column `{referenced}`", model.name);
    };

    match id.get(&column.property) {
        Some(value) if !value.is_null() => Ok(value.clone()),
        _ if !id.is_object() && width == 1 => Ok(id.clone()),
        _ => Err(Error::identifier_ambiguous(&model.name, &[&column.property])),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Serializer;

    use keel_core::{
        schema::{Column, Junction, ModelDef, Type},
        stmt::Record,
        Capability,
    };
    use pretty_assertions::assert_eq;

    fn schema() -> Schema {
        let mut builder = Schema::builder();
        builder
            .model(
                ModelDef::new("User", "user")
                    .column(Column::new("id", Type::Integer).primary())
                    .one_to_many("posts", "Post", "author")
                    .one_to_one_inverse("profile", "Profile", "user"),
            )
            .model(
                ModelDef::new("Profile", "profile")
                    .column(Column::new("id", Type::Integer).primary())
                    .one_to_one("user", "User", &[("userId", "id")]),
            )
            .model(
                ModelDef::new("Post", "post")
                    .column(Column::new("id", Type::Integer).primary())
                    .many_to_one("author", "User", &[("authorId", "id")])
                    .many_to_many(
                        "tags",
                        "Tag",
                        Junction::new("post_tags", &[("postId", "id")], &[("tagId", "id")]),
                    ),
            )
            .model(ModelDef::new("Tag", "tag").column(Column::new("id", Type::Integer).primary()));
        builder.build().unwrap()
    }

    fn render(schema: &Schema, map: &ExpressionMap) -> (String, Vec<Value>) {
        let stmt = Serializer::new(schema, &Capability::POSTGRESQL)
            .serialize(map)
            .unwrap();
        let values = stmt.sql.values().into_iter().cloned().collect();
        (stmt.sql.text, values)
    }

    #[test]
    fn set_owner_updates_the_foreign_key() {
        let schema = schema();
        let post = schema.model_by_name("Post").unwrap();

        let map = RelationQuery::new(&schema, post, "author")
            .unwrap()
            .set(1.into(), Record::new().set("id", 7).into())
            .unwrap();

        assert!(!map.call_listeners);
        assert_eq!(
            render(&schema, &map),
            (
                "UPDATE \"post\" SET \"authorId\" = $1 WHERE \"id\" IN ($2)".to_string(),
                vec![Value::I64(7), Value::I64(1)]
            )
        );
    }

    #[test]
    fn set_inverse_one_to_one_updates_the_target() {
        let schema = schema();
        let user = schema.model_by_name("User").unwrap();
        let query = RelationQuery::new(&schema, user, "profile").unwrap();

        let map = query.set(3.into(), 9.into()).unwrap();
        assert_eq!(
            render(&schema, &map).0,
            "UPDATE \"profile\" SET \"userId\" = $1 WHERE \"id\" IN ($2)"
        );

        let map = query.set(3.into(), Value::Null).unwrap();
        assert_eq!(
            render(&schema, &map),
            (
                "UPDATE \"profile\" SET \"userId\" = $1 WHERE \"userId\" = $2".to_string(),
                vec![Value::Null, Value::I64(3)]
            )
        );
    }

    #[test]
    fn add_and_remove_one_to_many() {
        let schema = schema();
        let user = schema.model_by_name("User").unwrap();
        let query = RelationQuery::new(&schema, user, "posts").unwrap();

        let map = query.add(1.into(), vec![10.into(), 11.into()]).unwrap();
        assert_eq!(
            render(&schema, &map).0,
            "UPDATE \"post\" SET \"authorId\" = $1 WHERE \"id\" IN ($2, $3)"
        );

        let map = query.remove(1.into(), vec![10.into()]).unwrap();
        assert_eq!(
            render(&schema, &map),
            (
                "UPDATE \"post\" SET \"authorId\" = $1 WHERE \"id\" IN ($2) AND \"authorId\" = $3"
                    .to_string(),
                vec![Value::Null, Value::I64(10), Value::I64(1)]
            )
        );
    }

    #[test]
    fn many_to_many_writes_junction_rows() {
        let schema = schema();
        let post = schema.model_by_name("Post").unwrap();
        let query = RelationQuery::new(&schema, post, "tags").unwrap();

        let map = query.add(1.into(), vec![2.into(), 3.into()]).unwrap();
        assert_eq!(
            render(&schema, &map),
            (
                "INSERT INTO \"post_tags\"(\"postId\", \"tagId\") VALUES ($1, $2), ($3, $4)"
                    .to_string(),
                vec![Value::I64(1), Value::I64(2), Value::I64(1), Value::I64(3)]
            )
        );

        let map = query
            .remove(Record::new().set("id", 1).into(), vec![2.into(), 3.into()])
            .unwrap();
        assert_eq!(
            render(&schema, &map).0,
            "DELETE FROM \"post_tags\" WHERE (\"postId\" = $1 AND \"tagId\" = $2) \
             OR (\"postId\" = $3 AND \"tagId\" = $4)"
        );
    }

    #[test]
    fn wrong_cardinality_is_rejected() {
        let schema = schema();
        let user = schema.model_by_name("User").unwrap();
        let post = schema.model_by_name("Post").unwrap();

        let err = RelationQuery::new(&schema, user, "posts")
            .unwrap()
            .set(1.into(), 2.into())
            .unwrap_err();
        assert!(err.is_relation_cardinality_mismatch());

        let err = RelationQuery::new(&schema, post, "author")
            .unwrap()
            .add(1.into(), vec![2.into()])
            .unwrap_err();
        assert!(err.is_relation_cardinality_mismatch());
    }
}
