use super::{
    Alias, Condition, Conjunction, Fields, JoinAttribute, JoinKind, Record, RelationCountAttribute,
    RelationIdAttribute, Value, WhereClause,
};
use crate::{
    schema::{Model, Relation, Schema},
    Error, Result,
};

/// The mutable description of one logical query.
///
/// Built through the configuration methods below, consumed once by an
/// emitter and, for reads, once more by the hydration engine. Clone it to
/// seed a derived query.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionMap {
    pub kind: QueryKind,

    /// Participating aliases. The first one is the main alias.
    pub aliases: Vec<Alias>,

    pub joins: Vec<JoinAttribute>,

    /// Selections, either a bare alias (every column) or `alias.property`.
    pub selects: Vec<String>,

    pub wheres: Vec<WhereClause>,

    pub order_bys: Vec<OrderBy>,

    pub limit: Option<u64>,

    pub offset: Option<u64>,

    pub lock: Option<LockMode>,

    /// Row(s) to insert, or the assignments of an update.
    pub value_set: Option<ValueSet>,

    /// Explicit subset of properties to insert. Empty means every insertable
    /// column.
    pub insert_columns: Vec<String>,

    pub returning: Option<Returning>,

    pub on_conflict: Option<OnConflict>,

    /// Caller-bound parameters referenced from raw SQL as `:name`.
    pub parameters: Record,

    /// Refresh generated values onto the value set (or the targeted
    /// entities) after a write.
    pub update_entity: bool,

    /// Broadcast lifecycle notifications around a write.
    pub call_listeners: bool,

    /// Entities targeted by an update or delete, refreshed after the write.
    pub where_entities: Vec<Record>,

    pub relation_id_attributes: Vec<RelationIdAttribute>,

    pub relation_count_attributes: Vec<RelationCountAttribute>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Select,
    Insert,
    Update,
    Delete,
}

/// Values to persist.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueSet {
    One(Fields),
    Many(Vec<Fields>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    /// `alias.property` or raw SQL.
    pub expr: String,
    pub direction: Direction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    PessimisticRead,
    PessimisticWrite,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Returning {
    /// Properties (mapped) or column names (raw).
    Columns(Vec<String>),

    /// Raw returning list, e.g. `*`.
    Raw(String),
}

/// Conflict handling for inserts.
#[derive(Debug, Clone, PartialEq)]
pub struct OnConflict {
    /// Properties (or columns) forming the conflicting unique key.
    pub target: Vec<String>,
    pub action: ConflictAction,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConflictAction {
    /// Skip conflicting rows.
    Ignore,

    /// Overwrite the listed properties from the proposed row.
    Update(Vec<String>),

    /// Overwrite every inserted column except the conflict target.
    UpdateAll,
}

impl ExpressionMap {
    fn new(kind: QueryKind, main: Alias) -> ExpressionMap {
        ExpressionMap {
            kind,
            aliases: vec![main],
            joins: vec![],
            selects: vec![],
            wheres: vec![],
            order_bys: vec![],
            limit: None,
            offset: None,
            lock: None,
            value_set: None,
            insert_columns: vec![],
            returning: None,
            on_conflict: None,
            parameters: Record::new(),
            update_entity: true,
            call_listeners: true,
            where_entities: vec![],
            relation_id_attributes: vec![],
            relation_count_attributes: vec![],
        }
    }

    /// Selects every column of `model` under `alias`.
    pub fn select(model: &Model, alias: &str) -> ExpressionMap {
        let mut map = ExpressionMap::new(QueryKind::Select, Alias::model(alias, model.id));
        map.selects.push(alias.to_string());
        map
    }

    /// Selects from an unmapped table.
    pub fn select_from(table: &str, alias: &str) -> ExpressionMap {
        let mut map = ExpressionMap::new(QueryKind::Select, Alias::table(alias, table));
        map.selects.push(alias.to_string());
        map
    }

    /// Selects from a subquery spliced as `(<sql>) alias`. Its parameters are
    /// bound with [`set_parameter`](Self::set_parameter).
    pub fn select_from_subquery(sql: &str, alias: &str) -> ExpressionMap {
        let mut map = ExpressionMap::new(QueryKind::Select, Alias::subquery(alias, sql));
        map.selects.push(alias.to_string());
        map
    }

    pub fn insert(model: &Model) -> ExpressionMap {
        ExpressionMap::new(QueryKind::Insert, Alias::model(&model.name, model.id))
    }

    pub fn insert_into(table: &str) -> ExpressionMap {
        ExpressionMap::new(QueryKind::Insert, Alias::table(table, table))
    }

    pub fn update(model: &Model) -> ExpressionMap {
        ExpressionMap::new(QueryKind::Update, Alias::model(&model.name, model.id))
    }

    pub fn update_table(table: &str) -> ExpressionMap {
        ExpressionMap::new(QueryKind::Update, Alias::table(table, table))
    }

    pub fn delete(model: &Model) -> ExpressionMap {
        ExpressionMap::new(QueryKind::Delete, Alias::model(&model.name, model.id))
    }

    pub fn delete_from(table: &str) -> ExpressionMap {
        ExpressionMap::new(QueryKind::Delete, Alias::table(table, table))
    }

    pub fn main_alias(&self) -> &Alias {
        &self.aliases[0]
    }

    pub fn alias(&self, name: &str) -> Option<&Alias> {
        self.aliases.iter().find(|alias| alias.name == name)
    }

    /// The model behind the main alias, if it is mapped.
    pub fn main_model<'a>(&self, schema: &'a Schema) -> Option<&'a Model> {
        self.main_alias().model_id().map(|id| schema.model(id))
    }

    pub fn alias_model<'a>(&self, schema: &'a Schema, name: &str) -> Option<&'a Model> {
        self.alias(name)?.model_id().map(|id| schema.model(id))
    }

    /// The join that introduced `alias`.
    pub fn join(&self, alias: &str) -> Option<&JoinAttribute> {
        self.joins.iter().find(|join| join.alias == alias)
    }

    /// True when `property` of `alias` is part of the selection, either
    /// through the whole alias or by name.
    pub fn is_selected(&self, alias: &str, property: &str) -> bool {
        self.selects.iter().any(|selection| match selection.split_once('.') {
            None => selection == alias,
            Some((a, p)) => a == alias && p == property,
        })
    }

    /// True when any selection targets `alias`.
    pub fn is_alias_selected(&self, alias: &str) -> bool {
        self.selects
            .iter()
            .any(|selection| selection.split('.').next() == Some(alias))
    }

    pub fn add_select(&mut self, selection: impl Into<String>) -> &mut Self {
        let selection = selection.into();
        if !self.selects.contains(&selection) {
            self.selects.push(selection);
        }
        self
    }

    /// Left joins a relation (`parent.relation`) and selects it.
    pub fn left_join_and_select(
        &mut self,
        schema: &Schema,
        path: &str,
        alias: &str,
    ) -> Result<&mut Self> {
        self.join_relation(schema, JoinKind::Left, path, alias, None, true)
    }

    pub fn inner_join_and_select(
        &mut self,
        schema: &Schema,
        path: &str,
        alias: &str,
    ) -> Result<&mut Self> {
        self.join_relation(schema, JoinKind::Inner, path, alias, None, true)
    }

    /// Left joins a relation without selecting it, typically to filter on it.
    pub fn left_join(&mut self, schema: &Schema, path: &str, alias: &str) -> Result<&mut Self> {
        self.join_relation(schema, JoinKind::Left, path, alias, None, false)
    }

    pub fn inner_join(&mut self, schema: &Schema, path: &str, alias: &str) -> Result<&mut Self> {
        self.join_relation(schema, JoinKind::Inner, path, alias, None, false)
    }

    /// Left joins a relation, adding `condition` to the ON clause.
    pub fn left_join_and_select_where(
        &mut self,
        schema: &Schema,
        path: &str,
        alias: &str,
        condition: &str,
    ) -> Result<&mut Self> {
        self.join_relation(
            schema,
            JoinKind::Left,
            path,
            alias,
            Some(condition.to_string()),
            true,
        )
    }

    /// Joins `model` on `condition` and maps every match onto a property path
    /// of the parent, e.g. `user.photos`.
    pub fn left_join_and_map_many(
        &mut self,
        map_to: &str,
        model: &Model,
        alias: &str,
        condition: &str,
    ) -> Result<&mut Self> {
        self.join_mapped(map_to, model, alias, condition, true)
    }

    /// Like [`left_join_and_map_many`](Self::left_join_and_map_many) but keeps
    /// only the first match.
    pub fn left_join_and_map_one(
        &mut self,
        map_to: &str,
        model: &Model,
        alias: &str,
        condition: &str,
    ) -> Result<&mut Self> {
        self.join_mapped(map_to, model, alias, condition, false)
    }

    fn join_relation(
        &mut self,
        schema: &Schema,
        kind: JoinKind,
        path: &str,
        alias: &str,
        condition: Option<String>,
        select: bool,
    ) -> Result<&mut Self> {
        let (parent_alias, relation) = self.resolve_relation(schema, path)?;
        let target = relation.target;
        let is_many = relation.is_to_many();
        let property = relation.property.clone();

        self.ensure_unique_alias(alias)?;
        self.aliases.push(Alias::model(alias, target));
        self.joins.push(JoinAttribute {
            kind,
            alias: alias.to_string(),
            parent_alias,
            relation: Some(property),
            map_to_property: None,
            condition,
            is_many,
            is_selected: select,
        });

        if select {
            self.add_select(alias);
        }

        Ok(self)
    }

    fn join_mapped(
        &mut self,
        map_to: &str,
        model: &Model,
        alias: &str,
        condition: &str,
        is_many: bool,
    ) -> Result<&mut Self> {
        let Some((parent_alias, property)) = map_to.split_once('.') else {
            crate::bail!("join target `{map_to}` must be written as `alias.property`");
        };

        if self.alias(parent_alias).is_none() {
            crate::bail!("unknown alias `{parent_alias}` in `{map_to}`");
        }

        self.ensure_unique_alias(alias)?;
        self.aliases.push(Alias::model(alias, model.id));
        self.joins.push(JoinAttribute {
            kind: JoinKind::Left,
            alias: alias.to_string(),
            parent_alias: parent_alias.to_string(),
            relation: None,
            map_to_property: Some(property.to_string()),
            condition: Some(condition.to_string()),
            is_many,
            is_selected: true,
        });
        self.add_select(alias);

        Ok(self)
    }

    fn ensure_unique_alias(&self, alias: &str) -> Result<()> {
        if self.alias(alias).is_some() {
            crate::bail!("alias `{alias}` is already used in this query");
        }
        Ok(())
    }

    /// Splits `alias.relation` and looks the relation up on the alias's model.
    pub fn resolve_relation<'a>(
        &self,
        schema: &'a Schema,
        path: &str,
    ) -> Result<(String, &'a Relation)> {
        let Some((parent_alias, property)) = path.split_once('.') else {
            crate::bail!("relation path `{path}` must be written as `alias.relation`");
        };

        let Some(model) = self.alias_model(schema, parent_alias) else {
            crate::bail!("alias `{parent_alias}` is not mapped to a model");
        };

        let relation = model
            .relation(property)
            .ok_or_else(|| Error::property_not_found(&model.name, property))?;

        Ok((parent_alias.to_string(), relation))
    }

    /// Replaces every where clause with `condition`.
    pub fn where_(&mut self, condition: Condition) -> &mut Self {
        self.wheres.clear();
        self.and_where(condition)
    }

    pub fn and_where(&mut self, condition: Condition) -> &mut Self {
        self.wheres.push(WhereClause {
            conjunction: Conjunction::And,
            condition,
        });
        self
    }

    pub fn or_where(&mut self, condition: Condition) -> &mut Self {
        self.wheres.push(WhereClause {
            conjunction: Conjunction::Or,
            condition,
        });
        self
    }

    /// Restricts the query to the given primary key values.
    ///
    /// Each id is either a scalar (single-column keys only) or a record
    /// carrying every primary key property.
    pub fn where_in_ids(&mut self, schema: &Schema, ids: Vec<Value>) -> Result<&mut Self> {
        let Some(model) = self.main_model(schema) else {
            crate::bail!("where_in_ids requires a mapped main alias");
        };

        let condition = primary_key_condition(model, &self.main_alias().name, &ids)?;
        Ok(self.and_where(condition))
    }

    /// Targets specific entities; their primary keys become the where clause
    /// and the entities themselves are refreshed after the write.
    pub fn where_entity(&mut self, schema: &Schema, entities: Vec<Record>) -> Result<&mut Self> {
        let ids = entities.iter().cloned().map(Value::Record).collect();
        self.where_in_ids(schema, ids)?;
        self.where_entities = entities;
        Ok(self)
    }

    pub fn order_by(&mut self, expr: impl Into<String>, direction: Direction) -> &mut Self {
        self.order_bys.clear();
        self.add_order_by(expr, direction)
    }

    pub fn add_order_by(&mut self, expr: impl Into<String>, direction: Direction) -> &mut Self {
        self.order_bys.push(OrderBy {
            expr: expr.into(),
            direction,
        });
        self
    }

    pub fn limit(&mut self, limit: u64) -> &mut Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(&mut self, offset: u64) -> &mut Self {
        self.offset = Some(offset);
        self
    }

    pub fn set_lock(&mut self, lock: LockMode) -> &mut Self {
        self.lock = Some(lock);
        self
    }

    pub fn values(&mut self, values: impl Into<ValueSet>) -> &mut Self {
        self.value_set = Some(values.into());
        self
    }

    /// Assignments of an update.
    pub fn set(&mut self, fields: Fields) -> &mut Self {
        self.value_set = Some(ValueSet::One(fields));
        self
    }

    pub fn insert_columns(&mut self, columns: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.insert_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn returning(&mut self, returning: Returning) -> &mut Self {
        self.returning = Some(returning);
        self
    }

    pub fn on_conflict(&mut self, on_conflict: OnConflict) -> &mut Self {
        self.on_conflict = Some(on_conflict);
        self
    }

    /// Binds a caller parameter. Binding the same name again replaces the
    /// earlier value.
    pub fn set_parameter(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.parameters.insert(name, value);
        self
    }

    pub fn update_entity(&mut self, enabled: bool) -> &mut Self {
        self.update_entity = enabled;
        self
    }

    pub fn call_listeners(&mut self, enabled: bool) -> &mut Self {
        self.call_listeners = enabled;
        self
    }

    /// Loads the ids of `relation` (`alias.relation`) onto `map_to`
    /// (`alias.property`).
    pub fn load_relation_id_and_map(
        &mut self,
        schema: &Schema,
        map_to: &str,
        relation: &str,
    ) -> Result<&mut Self> {
        let (parent_alias, relation) = self.resolve_relation(schema, relation)?;
        let map_to_property = map_to_property(map_to, &parent_alias)?;

        self.relation_id_attributes.push(RelationIdAttribute {
            parent_alias,
            relation: relation.property.clone(),
            map_to_property,
        });
        Ok(self)
    }

    /// Loads the number of entities in a to-many `relation` onto `map_to`.
    pub fn load_relation_count_and_map(
        &mut self,
        schema: &Schema,
        map_to: &str,
        relation: &str,
    ) -> Result<&mut Self> {
        let (parent_alias, relation) = self.resolve_relation(schema, relation)?;
        let map_to_property = map_to_property(map_to, &parent_alias)?;

        if relation.is_to_one() {
            let owner = self
                .alias_model(schema, &parent_alias)
                .map(|model| model.name.as_str())
                .unwrap_or_default();
            return Err(Error::relation_cardinality_mismatch(
                "count",
                format!("{owner}.{}", relation.property),
                relation.kind,
            ));
        }

        self.relation_count_attributes.push(RelationCountAttribute {
            parent_alias,
            relation: relation.property.clone(),
            map_to_property,
        });
        Ok(self)
    }
}

fn map_to_property(map_to: &str, parent_alias: &str) -> Result<String> {
    match map_to.split_once('.') {
        Some((alias, property)) if alias == parent_alias => Ok(property.to_string()),
        _ => crate::bail!("`{map_to}` must be a property path on alias `{parent_alias}`"),
    }
}

/// Builds a predicate matching the given primary key values.
pub fn primary_key_condition(model: &Model, alias: &str, ids: &[Value]) -> Result<Condition> {
    let keys: Vec<_> = model.primary_columns().collect();
    let key_names: Vec<&str> = keys.iter().map(|c| c.property.as_str()).collect();

    if keys.is_empty() {
        crate::bail!("model `{}` has no primary key", model.name);
    }

    if let [key] = keys[..] {
        let path = format!("{alias}.{}", key.property);
        let values = ids
            .iter()
            .map(|id| match id {
                id if id.is_object() => id
                    .get(&key.property)
                    .filter(|value| !value.is_null())
                    .cloned()
                    .ok_or_else(|| Error::identifier_ambiguous(&model.name, &key_names)),
                id => Ok(id.clone()),
            })
            .collect::<Result<Vec<_>>>()?;

        return Ok(Condition::in_list(&path, values));
    }

    let terms = ids
        .iter()
        .map(|id| {
            if !id.is_object() {
                return Err(Error::identifier_ambiguous(&model.name, &key_names));
            }

            keys.iter()
                .map(|key| {
                    let value = id
                        .get(&key.property)
                        .filter(|value| !value.is_null())
                        .ok_or_else(|| Error::identifier_ambiguous(&model.name, &key_names))?;
                    Ok(Condition::eq(&format!("{alias}.{}", key.property), value.clone()))
                })
                .collect::<Result<Vec<_>>>()
                .map(Condition::and)
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Condition::or(terms))
}

impl ValueSet {
    pub fn rows(&self) -> &[Fields] {
        match self {
            ValueSet::One(fields) => std::slice::from_ref(fields),
            ValueSet::Many(rows) => rows,
        }
    }

    pub fn rows_mut(&mut self) -> &mut [Fields] {
        match self {
            ValueSet::One(fields) => std::slice::from_mut(fields),
            ValueSet::Many(rows) => rows,
        }
    }

    pub fn len(&self) -> usize {
        self.rows().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows().is_empty()
    }
}

impl From<Fields> for ValueSet {
    fn from(fields: Fields) -> Self {
        ValueSet::One(fields)
    }
}

impl From<Vec<Fields>> for ValueSet {
    fn from(rows: Vec<Fields>) -> Self {
        ValueSet::Many(rows)
    }
}

impl From<Record> for ValueSet {
    fn from(record: Record) -> Self {
        ValueSet::One(record.into())
    }
}

impl From<Vec<Record>> for ValueSet {
    fn from(records: Vec<Record>) -> Self {
        ValueSet::Many(records.into_iter().map(Fields::from).collect())
    }
}

impl Returning {
    pub fn columns(columns: impl IntoIterator<Item = impl Into<String>>) -> Returning {
        Returning::Columns(columns.into_iter().map(Into::into).collect())
    }
}

impl OnConflict {
    pub fn ignore(target: impl IntoIterator<Item = impl Into<String>>) -> OnConflict {
        OnConflict {
            target: target.into_iter().map(Into::into).collect(),
            action: ConflictAction::Ignore,
        }
    }

    pub fn update(
        target: impl IntoIterator<Item = impl Into<String>>,
        columns: impl IntoIterator<Item = impl Into<String>>,
    ) -> OnConflict {
        OnConflict {
            target: target.into_iter().map(Into::into).collect(),
            action: ConflictAction::Update(columns.into_iter().map(Into::into).collect()),
        }
    }

    pub fn update_all(target: impl IntoIterator<Item = impl Into<String>>) -> OnConflict {
        OnConflict {
            target: target.into_iter().map(Into::into).collect(),
            action: ConflictAction::UpdateAll,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, Generation, ModelDef, Type};

    fn schema() -> Schema {
        let mut builder = Schema::builder();
        builder
            .model(
                ModelDef::new("User", "user")
                    .column(Column::new("id", Type::Integer).primary().generated(Generation::Increment))
                    .one_to_many("posts", "Post", "author"),
            )
            .model(
                ModelDef::new("Post", "post")
                    .column(Column::new("id", Type::Integer).primary().generated(Generation::Increment))
                    .many_to_one("author", "User", &[("authorId", "id")]),
            )
            .model(
                ModelDef::new("Membership", "membership")
                    .column(Column::new("userId", Type::Integer).primary())
                    .column(Column::new("groupId", Type::Integer).primary()),
            );
        builder.build().unwrap()
    }

    #[test]
    fn join_registers_alias_and_selection() {
        let schema = schema();
        let user = schema.model_by_name("User").unwrap();

        let mut map = ExpressionMap::select(user, "user");
        map.left_join_and_select(&schema, "user.posts", "post").unwrap();

        let join = map.join("post").unwrap();
        assert!(join.is_many);
        assert_eq!(join.parent_alias, "user");
        assert_eq!(join.relation.as_deref(), Some("posts"));
        assert!(map.is_selected("post", "id"));
        assert_eq!(map.alias_model(&schema, "post").unwrap().name, "Post");
    }

    #[test]
    fn duplicate_alias_is_rejected() {
        let schema = schema();
        let user = schema.model_by_name("User").unwrap();

        let mut map = ExpressionMap::select(user, "user");
        assert!(map.left_join_and_select(&schema, "user.posts", "user").is_err());
    }

    #[test]
    fn unknown_relation_is_property_not_found() {
        let schema = schema();
        let user = schema.model_by_name("User").unwrap();

        let mut map = ExpressionMap::select(user, "user");
        let err = map
            .left_join_and_select(&schema, "user.comments", "comment")
            .unwrap_err();
        assert!(err.is_property_not_found());
    }

    #[test]
    fn composite_key_rejects_scalar_ids() {
        let schema = schema();
        let membership = schema.model_by_name("Membership").unwrap();

        let mut map = ExpressionMap::delete(membership);
        let err = map.where_in_ids(&schema, vec![Value::from(1)]).unwrap_err();
        assert!(err.is_identifier_ambiguous());

        let partial = Record::new().set("userId", 1);
        let err = map
            .where_in_ids(&schema, vec![Value::Record(partial)])
            .unwrap_err();
        assert!(err.is_identifier_ambiguous());

        let full = Record::new().set("userId", 1).set("groupId", 2);
        map.where_in_ids(&schema, vec![Value::Record(full)]).unwrap();
        assert_eq!(map.wheres.len(), 1);
    }

    #[test]
    fn counting_a_to_one_relation_is_a_cardinality_mismatch() {
        let schema = schema();
        let post = schema.model_by_name("Post").unwrap();

        let mut map = ExpressionMap::select(post, "post");
        let err = map
            .load_relation_count_and_map(&schema, "post.authorCount", "post.author")
            .unwrap_err();
        assert!(err.is_relation_cardinality_mismatch());
    }

    #[test]
    fn set_parameter_replaces_earlier_value() {
        let schema = schema();
        let user = schema.model_by_name("User").unwrap();

        let mut map = ExpressionMap::select(user, "user");
        map.set_parameter("name", "a").set_parameter("name", "b");
        assert_eq!(map.parameters.get("name"), Some(&Value::from("b")));
        assert_eq!(map.parameters.len(), 1);
    }
}
