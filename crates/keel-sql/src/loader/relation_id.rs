use super::{export, key_filter, parent_keys, resolve};

use keel_core::{
    schema::{JoinPath, Model, Schema},
    stmt::{ExpressionMap, Params, Record, RelationIdAttribute, RelationIdResult, Row, Sql, Value},
    Capability, Result,
};

/// Plans the side queries behind `load_relation_id_and_map`.
#[derive(Debug)]
pub struct RelationIdLoader<'a> {
    schema: &'a Schema,
    capability: &'a Capability,
}

/// One planned relation-id load. Execute `query`, when there is one, and pass
/// the returned rows to [`finish`](RelationIdLoad::finish).
#[derive(Debug, Clone)]
pub struct RelationIdLoad {
    pub query: Option<Sql>,
    result: RelationIdResult,
}

impl RelationIdLoad {
    pub fn finish(mut self, rows: Vec<Row>) -> RelationIdResult {
        self.result.rows.extend(rows);
        self.result
    }
}

impl<'a> RelationIdLoader<'a> {
    pub fn new(schema: &'a Schema, capability: &'a Capability) -> RelationIdLoader<'a> {
        RelationIdLoader { schema, capability }
    }

    /// Owner-side ids are read straight from the parent rows, so their
    /// foreign key columns must be part of a partial selection.
    pub fn prepare(&self, map: &mut ExpressionMap) {
        let selections: Vec<String> = map
            .relation_id_attributes
            .iter()
            .filter(|attribute| map.is_alias_selected(&attribute.parent_alias))
            .filter(|attribute| {
                map.alias_model(self.schema, &attribute.parent_alias)
                    .and_then(|model| model.relation(&attribute.relation))
                    .is_some_and(|relation| relation.owner && relation.junction.is_none())
            })
            .map(|attribute| format!("{}.{}", attribute.parent_alias, attribute.relation))
            .collect();

        for selection in selections {
            let alias = selection.split('.').next().unwrap_or_default();
            if !map.selects.iter().any(|s| s == alias) {
                map.add_select(selection);
            }
        }
    }

    pub fn load(&self, map: &ExpressionMap, rows: &[Row]) -> Result<Vec<RelationIdLoad>> {
        map.relation_id_attributes
            .iter()
            .map(|attribute| self.plan(map, attribute, rows))
            .collect()
    }

    fn plan(
        &self,
        map: &ExpressionMap,
        attribute: &RelationIdAttribute,
        rows: &[Row],
    ) -> Result<RelationIdLoad> {
        let (model, relation, path) =
            resolve(self.schema, map, &attribute.parent_alias, &attribute.relation)?;
        let target = relation.target(self.schema);
        let alias = attribute.parent_alias.as_str();

        let mut result = RelationIdResult {
            attribute: attribute.clone(),
            correlation: vec![],
            values: vec![],
            is_to_one: relation.is_to_one(),
            rows: vec![],
        };

        let query = match path {
            JoinPath::Owner { pairs } => {
                let primary: Vec<String> =
                    model.primary_columns().map(|c| c.name.clone()).collect();

                result.correlation = primary.iter().map(|c| (c.clone(), c.clone())).collect();
                result.values = pairs
                    .iter()
                    .map(|(fk, referenced)| (fk.clone(), property_of(target, referenced)))
                    .collect();

                for row in rows {
                    let mut side = Record::new();
                    for column in primary.iter().chain(pairs.iter().map(|(fk, _)| fk)) {
                        let value = row.get(&format!("{alias}_{column}")).cloned();
                        side.insert(column.clone(), value.unwrap_or_default());
                    }

                    let linked = pairs
                        .iter()
                        .any(|(fk, _)| side.get(fk).is_some_and(|v| !v.is_null()));
                    if linked {
                        result.rows.push(side);
                    }
                }

                None
            }
            JoinPath::Inverse { pairs } => {
                let foreign: Vec<String> = pairs.iter().map(|(fk, _)| fk.clone()).collect();
                let referenced: Vec<String> = pairs.iter().map(|(_, r)| r.clone()).collect();

                result.correlation = pairs;
                result.values = target
                    .primary_columns()
                    .map(|c| (c.name.clone(), c.property.clone()))
                    .collect();

                let mut select = foreign.clone();
                for (column, _) in &result.values {
                    if !select.contains(column) {
                        select.push(column.clone());
                    }
                }

                let keys = parent_keys(rows, alias, &referenced);
                self.query(&select, &target.table, &foreign, keys)?
            }
            JoinPath::Junction {
                table,
                parent,
                child,
            } => {
                let referenced: Vec<String> = parent.iter().map(|(r, _)| r.clone()).collect();
                let junction_parent: Vec<String> = parent.iter().map(|(_, j)| j.clone()).collect();

                result.correlation = parent.iter().map(|(r, j)| (j.clone(), r.clone())).collect();
                result.values = child
                    .iter()
                    .map(|(r, j)| (j.clone(), property_of(target, r)))
                    .collect();

                let mut select = junction_parent.clone();
                select.extend(child.iter().map(|(_, j)| j.clone()));

                let keys = parent_keys(rows, alias, &referenced);
                self.query(&select, &table, &junction_parent, keys)?
            }
        };

        Ok(RelationIdLoad { query, result })
    }

    fn query(
        &self,
        select: &[String],
        table: &str,
        filter: &[String],
        keys: Vec<Vec<Value>>,
    ) -> Result<Option<Sql>> {
        if keys.is_empty() {
            return Ok(None);
        }

        let capability = self.capability;
        let mut params = Params::new();

        let columns: Vec<String> = select.iter().map(|c| capability.quote(c)).collect();
        let filter = key_filter(&mut params, capability, filter, keys);
        let text = format!(
            "SELECT {} FROM {} WHERE {filter}",
            columns.join(", "),
            capability.quote(table)
        );

        export(capability, &params, &text).map(Some)
    }
}

fn property_of(model: &Model, column: &str) -> String {
    model
        .column_by_name(column)
        .map(|c| c.property.clone())
        .unwrap_or_else(|| column.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::schema::{Column, Junction, ModelDef, Type};
    use pretty_assertions::assert_eq;

    fn schema() -> Schema {
        let mut builder = Schema::builder();
        builder
            .model(
                ModelDef::new("User", "user")
                    .column(Column::new("id", Type::Integer).primary())
                    .one_to_many("posts", "Post", "author"),
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

    #[test]
    fn owner_ids_come_from_parent_rows() {
        let schema = schema();
        let post = schema.model_by_name("Post").unwrap();

        let mut map = ExpressionMap::select(post, "p");
        map.selects = vec!["p.id".to_string()];
        map.load_relation_id_and_map(&schema, "p.authorId", "p.author")
            .unwrap();

        let loader = RelationIdLoader::new(&schema, &Capability::POSTGRESQL);
        loader.prepare(&mut map);
        assert!(map.is_selected("p", "author"));

        let rows = vec![
            Record::new().set("p_id", 1).set("p_authorId", 7),
            Record::new().set("p_id", 2).set("p_authorId", Value::Null),
        ];

        let loads = loader.load(&map, &rows).unwrap();
        assert_eq!(loads.len(), 1);
        assert!(loads[0].query.is_none());

        let result = loads[0].clone().finish(vec![]);
        assert!(result.is_to_one);
        assert_eq!(result.correlation, [("id".to_string(), "id".to_string())]);
        assert_eq!(result.values, [("authorId".to_string(), "id".to_string())]);
        assert_eq!(
            result.rows,
            [Record::new().set("id", 1).set("authorId", 7)]
        );
    }

    #[test]
    fn inverse_ids_query_the_target_table() {
        let schema = schema();
        let user = schema.model_by_name("User").unwrap();

        let mut map = ExpressionMap::select(user, "u");
        map.load_relation_id_and_map(&schema, "u.postIds", "u.posts")
            .unwrap();

        let rows = vec![
            Record::new().set("u_id", 1),
            Record::new().set("u_id", 1),
            Record::new().set("u_id", 2),
        ];

        let loads = RelationIdLoader::new(&schema, &Capability::POSTGRESQL)
            .load(&map, &rows)
            .unwrap();
        let sql = loads[0].query.as_ref().unwrap();

        assert_eq!(
            sql.text,
            "SELECT \"authorId\", \"id\" FROM \"post\" WHERE \"authorId\" IN ($1, $2)"
        );
        assert_eq!(sql.values(), [&Value::I64(1), &Value::I64(2)]);

        let result = loads[0].clone().finish(vec![]);
        assert!(!result.is_to_one);
        assert_eq!(result.correlation, [("authorId".to_string(), "id".to_string())]);
    }

    #[test]
    fn junction_ids_query_the_junction_table() {
        let schema = schema();
        let post = schema.model_by_name("Post").unwrap();

        let mut map = ExpressionMap::select(post, "p");
        map.load_relation_id_and_map(&schema, "p.tagIds", "p.tags")
            .unwrap();

        let rows = vec![Record::new().set("p_id", 3)];
        let loads = RelationIdLoader::new(&schema, &Capability::MYSQL)
            .load(&map, &rows)
            .unwrap();

        assert_eq!(
            loads[0].query.as_ref().unwrap().text,
            "SELECT `postId`, `tagId` FROM `post_tags` WHERE `postId` IN (?)"
        );

        let result = loads[0].clone().finish(vec![]);
        assert_eq!(result.values, [("tagId".to_string(), "id".to_string())]);
    }

    #[test]
    fn no_parents_means_no_query() {
        let schema = schema();
        let user = schema.model_by_name("User").unwrap();

        let mut map = ExpressionMap::select(user, "u");
        map.load_relation_id_and_map(&schema, "u.postIds", "u.posts")
            .unwrap();

        let loads = RelationIdLoader::new(&schema, &Capability::SQLITE)
            .load(&map, &[])
            .unwrap();
        assert!(loads[0].query.is_none());
    }
}
