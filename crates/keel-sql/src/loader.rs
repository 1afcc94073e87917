//! Side queries loading relation ids and relation counts for the parents
//! returned by a select.

mod relation_count;
pub use relation_count::{RelationCountLoad, RelationCountLoader};

mod relation_id;
pub use relation_id::{RelationIdLoad, RelationIdLoader};

use indexmap::IndexMap;
use keel_core::{
    schema::{JoinPath, Model, Relation, Schema},
    stmt::{ExpressionMap, Params, Row, Sql, Value},
    Capability, Error, Result,
};

/// The parent model and relation an attribute names.
fn resolve<'a>(
    schema: &'a Schema,
    map: &ExpressionMap,
    alias: &str,
    property: &str,
) -> Result<(&'a Model, &'a Relation, JoinPath)> {
    let Some(model) = map.alias_model(schema, alias) else {
        keel_core::bail!("alias `{alias}` is not mapped to a model");
    };

    let relation = model
        .relation(property)
        .ok_or_else(|| Error::property_not_found(&model.name, property))?;

    let Some(path) = relation.join_path(schema, model) else {
        keel_core::bail!("cannot resolve join columns of {}.{property}", model.name);
    };

    Ok((model, relation, path))
}

fn export(capability: &Capability, params: &Params, text: &str) -> Result<Sql> {
    let sql = params.export(text, capability.placeholder, capability.quote)?;
    tracing::debug!(
        sql = %sql.text,
        params = sql.params.len(),
        dialect = %capability.dialect,
        "side query"
    );
    Ok(sql)
}

/// Distinct, fully non-null tuples of `columns` read from the parent rows of
/// `alias`, in first-seen order.
fn parent_keys(rows: &[Row], alias: &str, columns: &[String]) -> Vec<Vec<Value>> {
    let mut keys: IndexMap<Vec<String>, Vec<Value>> = IndexMap::new();

    'rows: for row in rows {
        let mut text = Vec::with_capacity(columns.len());
        let mut values = Vec::with_capacity(columns.len());

        for column in columns {
            let value = row
                .get(&format!("{alias}_{column}"))
                .cloned()
                .unwrap_or_default();

            let Some(key) = value.to_key_text() else {
                continue 'rows;
            };

            text.push(key);
            values.push(value);
        }

        keys.entry(text).or_insert(values);
    }

    keys.into_values().collect()
}

/// Predicate restricting `columns` to one of `keys`: an `IN` list for single
/// columns, otherwise a disjunction of conjunctions.
fn key_filter(
    params: &mut Params,
    capability: &Capability,
    columns: &[String],
    keys: Vec<Vec<Value>>,
) -> String {
    if let [column] = columns {
        let values = keys.into_iter().flatten().collect();
        let placeholder = params.list_placeholder(column, values);
        return format!("{} IN ({placeholder})", capability.quote(column));
    }

    keys.into_iter()
        .map(|key| {
            let terms: Vec<String> = columns
                .iter()
                .zip(key)
                .map(|(column, value)| {
                    let placeholder = params.placeholder(column, value);
                    format!("{} = {placeholder}", capability.quote(column))
                })
                .collect();
            format!("({})", terms.join(" AND "))
        })
        .collect::<Vec<_>>()
        .join(" OR ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::stmt::Record;
    use pretty_assertions::assert_eq;

    #[test]
    fn parent_keys_skip_nulls_and_duplicates() {
        let rows = vec![
            Record::new().set("u_id", 1),
            Record::new().set("u_id", 1),
            Record::new().set("u_id", Value::Null),
            Record::new().set("u_id", "2"),
            Record::new().set("u_id", 2),
        ];

        let keys = parent_keys(&rows, "u", &["id".to_string()]);
        assert_eq!(keys, [vec![Value::I64(1)], vec![Value::from("2")]]);
    }

    #[test]
    fn composite_filters_are_disjunctions() {
        let mut params = Params::new();
        let columns = ["a".to_string(), "b".to_string()];
        let keys = vec![vec![1.into(), 2.into()], vec![3.into(), 4.into()]];

        let sql = key_filter(&mut params, &Capability::POSTGRESQL, &columns, keys);
        assert_eq!(sql, "(\"a\" = :a AND \"b\" = :b) OR (\"a\" = :a_1 AND \"b\" = :b_1)");
        assert_eq!(params.len(), 4);
    }
}
