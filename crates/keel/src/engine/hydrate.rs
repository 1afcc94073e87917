use keel_core::{
    schema::{Model, Schema},
    stmt::{Entity, ExpressionMap, RelationCountResult, RelationIdResult, Row, Value},
    Capability,
};

use indexmap::IndexMap;
use std::collections::HashMap;

/// Rebuilds entity graphs from the flat, joined rows of a select.
///
/// Rows are grouped per alias by the key text of their primary columns (all
/// selected columns for views). Each group becomes one entity and joined
/// aliases are hydrated recursively from that group's rows only, so a parent
/// fanned out over many child rows collapses back into a single entity.
pub(crate) struct Hydrator<'a> {
    schema: &'a Schema,
    capability: &'a Capability,
    map: &'a ExpressionMap,
    rows: &'a [Row],
    relation_ids: &'a [RelationIdResult],
    relation_counts: &'a [RelationCountResult],

    /// Groups already computed, keyed by alias and the row set they came from.
    groups: HashMap<(String, Vec<usize>), Vec<Vec<usize>>>,
}

impl<'a> Hydrator<'a> {
    pub(crate) fn new(
        schema: &'a Schema,
        capability: &'a Capability,
        map: &'a ExpressionMap,
        rows: &'a [Row],
    ) -> Hydrator<'a> {
        Hydrator {
            schema,
            capability,
            map,
            rows,
            relation_ids: &[],
            relation_counts: &[],
            groups: HashMap::new(),
        }
    }

    pub(crate) fn relation_ids(mut self, results: &'a [RelationIdResult]) -> Self {
        self.relation_ids = results;
        self
    }

    pub(crate) fn relation_counts(mut self, results: &'a [RelationCountResult]) -> Self {
        self.relation_counts = results;
        self
    }

    pub(crate) fn transform(mut self) -> Vec<Entity> {
        let map = self.map;
        let all: Vec<usize> = (0..self.rows.len()).collect();
        let entities = self.transform_alias(&all, &map.main_alias().name, 0);

        tracing::trace!(
            rows = self.rows.len(),
            entities = entities.len(),
            "hydrated rows"
        );

        entities
    }

    fn transform_alias(&mut self, rows: &[usize], alias: &str, depth: usize) -> Vec<Entity> {
        // Each join nests at most once per join attribute
        if depth > self.map.joins.len() {
            tracing::warn!(alias, depth, "join nesting too deep; skipping");
            return vec![];
        }

        let Some(model) = self.map.alias_model(self.schema, alias) else {
            return vec![];
        };

        let groups = self.group(rows, alias, model);
        tracing::trace!(alias, rows = rows.len(), groups = groups.len(), "grouped rows");

        let mut entities = Vec::with_capacity(groups.len());
        for group in &groups {
            if let Some(entity) = self.entity(group, alias, model, depth) {
                entities.push(entity);
            }
        }
        entities
    }

    fn group(&mut self, rows: &[usize], alias: &str, model: &Model) -> Vec<Vec<usize>> {
        let cache_key = (alias.to_string(), rows.to_vec());
        if let Some(groups) = self.groups.get(&cache_key) {
            return groups.clone();
        }

        let keys = self.key_columns(alias, model);
        let mut groups: IndexMap<Vec<Option<String>>, Vec<usize>> = IndexMap::new();

        for &index in rows {
            let row = &self.rows[index];
            let key: Vec<_> = keys
                .iter()
                .map(|column| row.get(column).and_then(Value::to_key_text))
                .collect();

            // A left join that matched nothing
            if key.iter().all(Option::is_none) {
                continue;
            }

            groups.entry(key).or_default().push(index);
        }

        let groups: Vec<_> = groups.into_values().collect();
        self.groups.insert(cache_key, groups.clone());
        groups
    }

    /// Raw row keys identifying an entity of `alias`.
    fn key_columns(&self, alias: &str, model: &Model) -> Vec<String> {
        let primary: Vec<_> = model
            .primary_columns()
            .map(|column| raw_key(alias, &column.name))
            .collect();

        if !primary.is_empty() && !model.is_view() {
            return primary;
        }

        model
            .columns
            .iter()
            .filter(|column| self.map.is_selected(alias, &column.property))
            .map(|column| raw_key(alias, &column.name))
            .collect()
    }

    fn entity(
        &mut self,
        group: &[usize],
        alias: &str,
        base: &'a Model,
        depth: usize,
    ) -> Option<Entity> {
        let rows = self.rows;
        let first = &rows[*group.first()?];
        let model = self.resolve_model(first, alias, base);

        let mut entity = Entity::new(model.id);
        let has_columns = self.columns(&mut entity, first, alias, model);
        let has_relations = self.joins(&mut entity, group, alias, model, depth);
        let has_ids = self.ids(&mut entity, first, alias, model);
        let has_counts = self.counts(&mut entity, first, alias, model);

        let keep = has_columns
            || (model.has_only_virtual_primary_columns()
                && (has_relations || has_ids || has_counts));

        keep.then_some(entity)
    }

    /// The concrete model of a row, following the discriminator when the
    /// alias' model takes part in single-table inheritance.
    fn resolve_model(&self, row: &Row, alias: &str, base: &'a Model) -> &'a Model {
        let Some(column) = base.discriminator_column() else {
            return base;
        };

        let value = row
            .get(&raw_key(alias, &column.name))
            .and_then(Value::to_key_text);

        self.schema
            .model(self.schema.resolve_discriminator(base.id, value.as_deref()))
    }

    fn columns(&self, entity: &mut Entity, row: &Row, alias: &str, model: &Model) -> bool {
        let mut has_data = false;

        for column in model.own_columns(self.schema) {
            if column.is_virtual {
                continue;
            }

            let selected = self.map.is_selected(alias, &column.property)
                || column.primary_key
                || column.is_discriminator();
            if !selected {
                continue;
            }

            let Some(value) = row.get(&raw_key(alias, &column.name)) else {
                continue;
            };

            let value = self.capability.hydrate_value(column, value.clone());
            has_data |= !value.is_null();
            entity.set(&column.property, value);
        }

        has_data
    }

    fn joins(
        &mut self,
        entity: &mut Entity,
        group: &[usize],
        alias: &str,
        model: &Model,
        depth: usize,
    ) -> bool {
        let map = self.map;
        let mut has_data = false;

        for join in map
            .joins
            .iter()
            .filter(|join| join.parent_alias == alias && join.is_selected)
        {
            // The relation may belong to a sibling in the inheritance tree
            if let Some(relation) = &join.relation {
                if model.relation(relation).is_none() {
                    continue;
                }
            }

            let related = self.transform_alias(group, &join.alias, depth + 1);
            let value = if join.is_many {
                Value::List(related.into_iter().map(Value::from).collect())
            } else {
                related
                    .into_iter()
                    .next()
                    .map(Value::from)
                    .unwrap_or(Value::Null)
            };

            let property = join
                .map_to_property
                .as_deref()
                .or(join.relation.as_deref())
                .unwrap_or(&join.alias);

            entity.record.set_path(property, value);
            has_data = true;
        }

        has_data
    }

    fn ids(&self, entity: &mut Entity, row: &Row, alias: &str, model: &Model) -> bool {
        let mut has_data = false;

        for result in self
            .relation_ids
            .iter()
            .filter(|result| result.attribute.parent_alias == alias)
        {
            if model.relation(&result.attribute.relation).is_none() {
                continue;
            }

            let mut expected = Vec::with_capacity(result.correlation.len());
            for (side, parent) in &result.correlation {
                let Some(key) = row.get(&raw_key(alias, parent)).and_then(Value::to_key_text)
                else {
                    break;
                };
                expected.push((side.as_str(), key));
            }
            if expected.len() != result.correlation.len() {
                continue;
            }

            let mut ids = result
                .rows
                .iter()
                .filter(|side| {
                    expected.iter().all(|(column, key)| {
                        side.get(column).and_then(Value::to_key_text).as_ref() == Some(key)
                    })
                })
                .map(|side| id_value(result, side));

            let value = if result.is_to_one {
                match ids.next() {
                    Some(id) => id,
                    None => continue,
                }
            } else {
                Value::List(ids.collect())
            };

            entity
                .record
                .set_path(&result.attribute.map_to_property, value);
            has_data = true;
        }

        has_data
    }

    fn counts(&self, entity: &mut Entity, row: &Row, alias: &str, model: &Model) -> bool {
        let mut has_data = false;

        for result in self
            .relation_counts
            .iter()
            .filter(|result| result.attribute.parent_alias == alias)
        {
            if model.relation(&result.attribute.relation).is_none() {
                continue;
            }

            let Some(reference) = row
                .get(&raw_key(alias, &result.reference_column))
                .and_then(Value::to_key_text)
            else {
                continue;
            };

            let property = &result.attribute.map_to_property;
            entity.record.set_path(property, Value::I64(0));

            for side in &result.rows {
                let parent = side
                    .get(RelationCountResult::PARENT_ID)
                    .and_then(Value::to_key_text);

                if parent.as_deref() == Some(&reference) {
                    let count = side
                        .get(RelationCountResult::COUNT)
                        .and_then(Value::as_i64)
                        .unwrap_or(0);
                    entity.record.set_path(property, Value::I64(count));
                    has_data = true;
                }
            }
        }

        has_data
    }
}

fn raw_key(alias: &str, column: &str) -> String {
    format!("{alias}_{column}")
}

/// A related id: the bare value for single-column keys, otherwise a record
/// keyed by property.
fn id_value(result: &RelationIdResult, side: &Row) -> Value {
    match &result.values[..] {
        [(column, _)] => side.get(column).cloned().unwrap_or_default(),
        values => Value::Record(
            values
                .iter()
                .map(|(column, property)| {
                    (
                        property.clone(),
                        side.get(column).cloned().unwrap_or_default(),
                    )
                })
                .collect(),
        ),
    }
}
