//! Reconciles values the database produced during a write with the values
//! the caller provided.

use keel_core::{
    driver::LastInsertId,
    schema::{Column, Model},
    stmt::{primary_key_condition, ExpressionMap, Fields, Record, Row, Value},
    Capability, Result,
};

/// Maps returned rows (keyed by column name) to property records, skipping
/// columns that are not model properties.
pub(crate) fn returned(model: &Model, capability: &Capability, rows: &[Row]) -> Vec<Record> {
    rows.iter()
        .map(|row| {
            row.iter()
                .filter_map(|(name, value)| {
                    let column = model.column_by_name(name)?;
                    if column.is_virtual {
                        return None;
                    }
                    Some((
                        column.property.clone(),
                        capability.hydrate_value(column, value.clone()),
                    ))
                })
                .collect()
        })
        .collect()
}

/// Derives auto-increment keys from the driver's last insert id for rows
/// that did not provide one.
///
/// Only applies to models with a single incrementing primary column.
pub(crate) fn assign_last_insert_ids(
    model: &Model,
    capability: &Capability,
    rows: &[Fields],
    generated: &mut [Record],
    last_insert_id: i64,
) {
    let mut primary = model.primary_columns();
    let (Some(column), None) = (primary.next(), primary.next()) else {
        return;
    };
    if !column.is_increment() {
        return;
    }

    let property = &column.property;
    let pending: Vec<usize> = rows
        .iter()
        .zip(generated.iter())
        .enumerate()
        .filter(|(_, (fields, generated))| {
            !fields.supplies(property) && !generated.contains_key(property)
        })
        .map(|(index, _)| index)
        .collect();

    let count = pending.len() as i64;
    let first = match capability.last_insert_id {
        LastInsertId::First => last_insert_id,
        LastInsertId::Last => last_insert_id - (count - 1),
        LastInsertId::None => return,
    };

    for (offset, index) in pending.into_iter().enumerate() {
        generated[index].insert(property, first + offset as i64);
    }
}

/// What is known about each inserted row: provided values plus generated
/// ones.
pub(crate) fn known(rows: &[Fields], generated: &[Record]) -> Vec<Record> {
    rows.iter()
        .zip(generated)
        .map(|(fields, generated)| {
            let mut record = fields.to_record();
            record.merge(generated);
            record
        })
        .collect()
}

/// Columns matching `wanted` that some row does not know yet.
pub(crate) fn missing<'a>(
    model: &'a Model,
    known: &[Record],
    wanted: impl Fn(&Column) -> bool,
) -> Vec<&'a Column> {
    model
        .columns
        .iter()
        .filter(|column| !column.is_virtual && wanted(column))
        .filter(|column| known.iter().any(|row| !row.contains_key(&column.property)))
        .collect()
}

/// A select re-reading `columns` for every row with a complete primary key.
///
/// Returns `None` when there is nothing to read.
pub(crate) fn refetch(
    model: &Model,
    known: &[Record],
    columns: &[&Column],
) -> Result<Option<ExpressionMap>> {
    if columns.is_empty() {
        return Ok(None);
    }

    let ids: Vec<Value> = known
        .iter()
        .filter_map(|row| primary_key(model, row))
        .collect();
    if ids.is_empty() {
        return Ok(None);
    }

    let alias = &model.name;
    let mut map = ExpressionMap::select(model, alias);
    map.selects.clear();

    let columns = columns.iter().copied().filter(|column| !column.primary_key);
    for column in model.primary_columns().chain(columns) {
        map.add_select(format!("{alias}.{}", column.property));
    }

    map.where_(primary_key_condition(model, alias, &ids)?)
        .update_entity(false)
        .call_listeners(false);

    Ok(Some(map))
}

/// Copies the `columns` of each fetched record onto the generated map of the
/// known row sharing its primary key. Rows without a match are left alone.
pub(crate) fn merge_by_key(
    model: &Model,
    known: &[Record],
    generated: &mut [Record],
    fetched: &[Record],
    columns: &[&Column],
) {
    for (row, generated) in known.iter().zip(generated.iter_mut()) {
        let Some(key) = primary_key(model, row).as_ref().and_then(Value::to_key_text) else {
            continue;
        };

        let found = fetched.iter().find(|fetched| {
            primary_key(model, fetched)
                .as_ref()
                .and_then(Value::to_key_text)
                .as_ref()
                == Some(&key)
        });

        let Some(found) = found else {
            continue;
        };

        for column in columns {
            if let Some(value) = found.get(&column.property) {
                generated.insert(&column.property, value.clone());
            }
        }
    }
}

/// The primary key of a row: the bare value for single-column keys, a record
/// for composite ones. `None` when any part is unknown.
pub(crate) fn primary_key(model: &Model, row: &Record) -> Option<Value> {
    let mut parts = vec![];
    for column in model.primary_columns() {
        let value = row.get(&column.property)?;
        if value.is_null() {
            return None;
        }
        parts.push((column.property.clone(), value.clone()));
    }

    match parts.len() {
        0 => None,
        1 => parts.pop().map(|(_, value)| value),
        _ => Some(Value::Record(parts.into_iter().collect())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use keel_core::{
        schema::{ColumnRole, Generation, ModelDef, Type},
        Schema,
    };
    use pretty_assertions::assert_eq;

    fn schema() -> Schema {
        let mut builder = Schema::builder();
        builder.model(
            ModelDef::new("Post", "post")
                .column(
                    Column::new("id", Type::Integer)
                        .primary()
                        .generated(Generation::Increment),
                )
                .column(Column::new("title", Type::Text))
                .column(
                    Column::new("version", Type::Integer).role(ColumnRole::Version),
                ),
        );
        builder.build().unwrap()
    }

    fn rows() -> Vec<Fields> {
        vec![
            Fields::new().set("title", "a"),
            Fields::new().set("id", 40).set("title", "b"),
            Fields::new().set("title", "c"),
        ]
    }

    #[test]
    fn last_insert_id_counts_back_from_the_last_row() {
        let schema = schema();
        let post = schema.model_by_name("Post").unwrap();
        let mut generated = vec![Record::new(); 3];

        assign_last_insert_ids(post, &Capability::SQLITE, &rows(), &mut generated, 12);

        assert_eq!(generated[0].get("id"), Some(&Value::I64(11)));
        assert_eq!(generated[1].get("id"), None);
        assert_eq!(generated[2].get("id"), Some(&Value::I64(12)));
    }

    #[test]
    fn last_insert_id_counts_up_from_the_first_row() {
        let schema = schema();
        let post = schema.model_by_name("Post").unwrap();
        let mut generated = vec![Record::new(); 3];

        assign_last_insert_ids(post, &Capability::MYSQL, &rows(), &mut generated, 7);

        assert_eq!(generated[0].get("id"), Some(&Value::I64(7)));
        assert_eq!(generated[2].get("id"), Some(&Value::I64(8)));
    }

    #[test]
    fn refetch_reads_unknown_columns_by_key() {
        let schema = schema();
        let post = schema.model_by_name("Post").unwrap();

        let known = vec![
            Record::new().set("id", 1).set("title", "a"),
            Record::new().set("title", "no key"),
        ];
        let columns = missing(post, &known, Column::is_insert_returning);
        assert_eq!(
            columns.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            ["id", "version"]
        );

        let map = refetch(post, &known, &columns).unwrap().unwrap();
        assert_eq!(map.selects, ["Post.id", "Post.version"]);
        assert!(!map.call_listeners);
    }

    #[test]
    fn fetched_values_follow_their_keys() {
        let schema = schema();
        let post = schema.model_by_name("Post").unwrap();
        let version = post.version_column().unwrap();

        let known = vec![Record::new().set("id", 1), Record::new().set("id", 2)];
        let fetched = vec![
            Record::new().set("id", 2).set("version", 5),
            Record::new().set("id", 1).set("version", 3),
        ];
        let mut generated = vec![Record::new(); 2];

        merge_by_key(post, &known, &mut generated, &fetched, &[version]);

        assert_eq!(generated[0].get("version"), Some(&Value::I64(3)));
        assert_eq!(generated[1].get("version"), Some(&Value::I64(5)));
    }
}
