use super::{export, key_filter, parent_keys, resolve};

use keel_core::{
    schema::{JoinPath, Schema},
    stmt::{ExpressionMap, Params, RelationCountAttribute, RelationCountResult, Row, Sql},
    Capability, Error, Result,
};

/// Plans the side queries behind `load_relation_count_and_map`.
#[derive(Debug)]
pub struct RelationCountLoader<'a> {
    schema: &'a Schema,
    capability: &'a Capability,
}

#[derive(Debug, Clone)]
pub struct RelationCountLoad {
    pub query: Option<Sql>,
    result: RelationCountResult,
}

impl RelationCountLoad {
    pub fn finish(mut self, rows: Vec<Row>) -> RelationCountResult {
        self.result.rows = rows;
        self.result
    }
}

impl<'a> RelationCountLoader<'a> {
    pub fn new(schema: &'a Schema, capability: &'a Capability) -> RelationCountLoader<'a> {
        RelationCountLoader { schema, capability }
    }

    pub fn load(&self, map: &ExpressionMap, rows: &[Row]) -> Result<Vec<RelationCountLoad>> {
        map.relation_count_attributes
            .iter()
            .map(|attribute| self.plan(map, attribute, rows))
            .collect()
    }

    fn plan(
        &self,
        map: &ExpressionMap,
        attribute: &RelationCountAttribute,
        rows: &[Row],
    ) -> Result<RelationCountLoad> {
        let (model, relation, path) =
            resolve(self.schema, map, &attribute.parent_alias, &attribute.relation)?;

        if relation.is_to_one() {
            return Err(Error::relation_cardinality_mismatch(
                "count",
                format!("{}.{}", model.name, relation.property),
                relation.kind,
            ));
        }

        // (column counted on, parent column it references, table)
        let (column, reference_column, table) = match path {
            JoinPath::Inverse { pairs } => match &pairs[..] {
                [(fk, referenced)] => (
                    fk.clone(),
                    referenced.clone(),
                    relation.target(self.schema).table.clone(),
                ),
                _ => keel_core::bail!(
                    "counting {}.{} over a composite key is not supported",
                    model.name,
                    relation.property
                ),
            },
            JoinPath::Junction { table, parent, .. } => match &parent[..] {
                [(referenced, junction)] => (junction.clone(), referenced.clone(), table),
                _ => keel_core::bail!(
                    "counting {}.{} over a composite key is not supported",
                    model.name,
                    relation.property
                ),
            },
            JoinPath::Owner { .. } => keel_core::bail!(
                "{}.{} stores its foreign key on the parent and cannot be counted",
                model.name,
                relation.property
            ),
        };

        let keys = parent_keys(
            rows,
            &attribute.parent_alias,
            std::slice::from_ref(&reference_column),
        );

        let query = if keys.is_empty() {
            None
        } else {
            let capability = self.capability;
            let mut params = Params::new();
            let quoted = capability.quote(&column);
            let filter = key_filter(&mut params, capability, std::slice::from_ref(&column), keys);

            let text = format!(
                "SELECT {quoted} AS {}, COUNT(*) AS {} FROM {} WHERE {filter} GROUP BY {quoted}",
                capability.quote(RelationCountResult::PARENT_ID),
                capability.quote(RelationCountResult::COUNT),
                capability.quote(&table),
            );

            Some(export(capability, &params, &text)?)
        };

        Ok(RelationCountLoad {
            query,
            result: RelationCountResult {
                attribute: attribute.clone(),
                reference_column,
                rows: vec![],
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::{
        schema::{Column, Junction, ModelDef, Type},
        stmt::{Record, Value},
    };
    use pretty_assertions::assert_eq;

    fn schema() -> Schema {
        let mut builder = Schema::builder();
        builder
            .model(
                ModelDef::new("User", "user")
                    .column(Column::new("id", Type::Integer).primary())
                    .column(Column::new("uid", Type::Text))
                    .one_to_many("posts", "Post", "author"),
            )
            .model(
                ModelDef::new("Post", "post")
                    .column(Column::new("id", Type::Integer).primary())
                    .many_to_one("author", "User", &[("authorUid", "uid")])
                    .many_to_many(
                        "tags",
                        "Tag",
                        Junction::new("post_tags", &[("postId", "id")], &[("tagId", "id")]),
                    ),
            )
            .model(ModelDef::new("Tag", "tag").column(Column::new("id", Type::Integer).primary()));
        builder.build().unwrap()
    }

    #[test]
    fn counts_group_by_the_foreign_key() {
        let schema = schema();
        let user = schema.model_by_name("User").unwrap();

        let mut map = ExpressionMap::select(user, "u");
        map.load_relation_count_and_map(&schema, "u.postCount", "u.posts")
            .unwrap();

        let rows = vec![
            Record::new().set("u_id", 1).set("u_uid", "a"),
            Record::new().set("u_id", 2).set("u_uid", "b"),
        ];

        let loads = RelationCountLoader::new(&schema, &Capability::POSTGRESQL)
            .load(&map, &rows)
            .unwrap();
        let sql = loads[0].query.as_ref().unwrap();

        assert_eq!(
            sql.text,
            "SELECT \"authorUid\" AS \"parentId\", COUNT(*) AS \"cnt\" FROM \"post\" \
             WHERE \"authorUid\" IN ($1, $2) GROUP BY \"authorUid\""
        );
        assert_eq!(sql.values(), [&Value::from("a"), &Value::from("b")]);

        let result = loads[0].clone().finish(vec![]);
        assert_eq!(result.reference_column, "uid");
    }

    #[test]
    fn many_to_many_counts_junction_rows() {
        let schema = schema();
        let post = schema.model_by_name("Post").unwrap();

        let mut map = ExpressionMap::select(post, "p");
        map.load_relation_count_and_map(&schema, "p.tagCount", "p.tags")
            .unwrap();

        let rows = vec![Record::new().set("p_id", 5)];
        let loads = RelationCountLoader::new(&schema, &Capability::MSSQL)
            .load(&map, &rows)
            .unwrap();

        assert_eq!(
            loads[0].query.as_ref().unwrap().text,
            "SELECT [postId] AS [parentId], COUNT(*) AS [cnt] FROM [post_tags] \
             WHERE [postId] IN (@0) GROUP BY [postId]"
        );
    }
}
