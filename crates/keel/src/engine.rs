mod hydrate;
use hydrate::Hydrator;

mod refresh;

use crate::Db;

use keel_core::{
    driver::Response,
    schema::{Column, Model},
    stmt::{Entity, ExpressionMap, Fields, QueryKind, Record},
    Result,
};
use keel_sql::{RelationCountLoader, RelationIdLoader, Serializer};

/// Runs a select and hydrates its rows, including relation-id and
/// relation-count side queries.
pub(crate) async fn find(db: &Db, map: &ExpressionMap) -> Result<Vec<Entity>> {
    let schema = db.schema();
    let capability = db.capability();

    if map.kind != QueryKind::Select {
        keel_core::bail!("find expects a select, got {:?}", map.kind);
    }
    if map.main_model(schema).is_none() {
        keel_core::bail!(
            "alias `{}` is not backed by a model; use `raw` instead",
            map.main_alias().name
        );
    }

    let mut map = map.clone();
    let ids = RelationIdLoader::new(schema, capability);
    ids.prepare(&mut map);

    let statement = Serializer::new(schema, capability).serialize(&map)?;
    let rows = db.exec(&statement.sql).await?.rows.into_values();

    let mut relation_ids = vec![];
    for load in ids.load(&map, &rows)? {
        let side = match &load.query {
            Some(sql) => db.exec(sql).await?.rows.into_values(),
            None => vec![],
        };
        relation_ids.push(load.finish(side));
    }

    let mut relation_counts = vec![];
    for load in RelationCountLoader::new(schema, capability).load(&map, &rows)? {
        let side = match &load.query {
            Some(sql) => db.exec(sql).await?.rows.into_values(),
            None => vec![],
        };
        relation_counts.push(load.finish(side));
    }

    Ok(Hydrator::new(schema, capability, &map, &rows)
        .relation_ids(&relation_ids)
        .relation_counts(&relation_counts)
        .transform())
}

/// Fills `generated` with the values the database produced for each inserted
/// row: first from returned rows, otherwise from the last insert id, then by
/// re-selecting whatever is still unknown.
pub(crate) async fn refresh_insert(
    db: &Db,
    model: &Model,
    rows: &[Fields],
    generated: &mut [Record],
    response: &Response,
) -> Result<()> {
    let capability = db.capability();
    let returned = response.rows.as_values();

    if capability.supports_returning() && !returned.is_empty() && returned.len() == rows.len() {
        for (generated, values) in generated
            .iter_mut()
            .zip(refresh::returned(model, capability, returned))
        {
            generated.merge(&values);
        }
    } else if let Some(id) = response.last_insert_id {
        refresh::assign_last_insert_ids(model, capability, rows, generated, id);
    }

    let known = refresh::known(rows, generated);
    let columns = refresh::missing(model, &known, Column::is_insert_returning);

    if let Some(select) = refresh::refetch(model, &known, &columns)? {
        tracing::debug!(model = %model.name, columns = columns.len(), "re-reading inserted rows");
        let fetched = records(find(db, &select).await?);
        refresh::merge_by_key(model, &known, generated, &fetched, &columns);
    }

    Ok(())
}

/// Values an update changed as a side effect (versions, update dates), one
/// record per targeted entity.
pub(crate) async fn refresh_update(
    db: &Db,
    model: &Model,
    entities: &[Record],
    response: &Response,
) -> Result<Vec<Record>> {
    let columns: Vec<&Column> = model
        .columns
        .iter()
        .filter(|column| !column.is_virtual && column.is_update_returning())
        .collect();

    let mut generated = vec![Record::new(); entities.len()];
    if entities.is_empty() || columns.is_empty() {
        return Ok(generated);
    }

    let capability = db.capability();
    let returned = response.rows.as_values();

    let fetched = if capability.supports_returning() && !returned.is_empty() {
        refresh::returned(model, capability, returned)
    } else {
        match refresh::refetch(model, entities, &columns)? {
            Some(select) => records(find(db, &select).await?),
            None => vec![],
        }
    };

    refresh::merge_by_key(model, entities, &mut generated, &fetched, &columns);
    Ok(generated)
}

fn records(entities: Vec<Entity>) -> Vec<Record> {
    entities.into_iter().map(|entity| entity.record).collect()
}
