use keel::{
    async_trait,
    driver::{Driver, Response},
    schema::{Column, ColumnRole, Generation, Junction, ModelDef, Type},
    stmt::{ExpressionMap, Fields, Record, Sql, Value, ValueSet},
    subscriber::{InsertEvent, UpdateEvent},
    Capability, Db, Error, Result, Schema, Subscriber,
};
use pretty_assertions::assert_eq;

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

/// Records every statement and answers with scripted responses, falling
/// back to an empty row set.
#[derive(Debug, Clone)]
struct Recorder {
    capability: Capability,
    state: Arc<Mutex<State>>,
}

#[derive(Debug, Default)]
struct State {
    log: Vec<Sql>,
    responses: VecDeque<Result<Response>>,
}

impl Recorder {
    fn new(capability: Capability) -> Recorder {
        Recorder {
            capability,
            state: Arc::default(),
        }
    }

    fn respond(&self, response: Result<Response>) -> &Self {
        self.state.lock().unwrap().responses.push_back(response);
        self
    }

    fn log(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.log.iter().map(|sql| sql.text.clone()).collect()
    }
}

#[async_trait]
impl Driver for Recorder {
    fn capability(&self) -> &Capability {
        &self.capability
    }

    async fn exec(&self, sql: &Sql) -> Result<Response> {
        let mut state = self.state.lock().unwrap();
        state.log.push(sql.clone());
        state
            .responses
            .pop_front()
            .unwrap_or_else(|| Ok(Response::values(vec![])))
    }
}

/// Counts notifications and optionally refuses inserts.
#[derive(Default)]
struct Audit {
    model: Option<&'static str>,
    refuse: bool,
    seen: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Subscriber for Audit {
    fn listen_to(&self) -> Option<&str> {
        self.model
    }

    async fn before_insert(&self, event: &InsertEvent<'_>) -> Result<()> {
        self.seen
            .lock()
            .unwrap()
            .push(format!("before_insert {}", event.rows.len()));

        if self.refuse {
            return Err(anyhow::anyhow!("inserts are frozen").into());
        }
        Ok(())
    }

    async fn after_insert(&self, event: &InsertEvent<'_>) -> Result<()> {
        let ids: Vec<_> = event
            .rows
            .iter()
            .filter_map(|row| row.get("id")?.as_value()?.to_key_text())
            .collect();
        self.seen
            .lock()
            .unwrap()
            .push(format!("after_insert {}", ids.join(",")));
        Ok(())
    }

    async fn after_update(&self, event: &UpdateEvent<'_>) -> Result<()> {
        self.seen
            .lock()
            .unwrap()
            .push(format!("after_update {}", event.entities.len()));
        Ok(())
    }
}

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
                .column(
                    Column::new("id", Type::Integer)
                        .primary()
                        .generated(Generation::Increment),
                )
                .column(Column::new("title", Type::Text))
                .column(Column::new("version", Type::Integer).role(ColumnRole::Version))
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
        );
    builder.build().unwrap()
}

fn db(driver: &Recorder, audit: Option<Audit>) -> Db {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();

    let mut builder = Db::builder();
    builder.schema(schema());
    if let Some(audit) = audit {
        builder.subscriber(audit);
    }
    builder.build(driver.clone()).unwrap()
}

fn titles(titles: &[&str]) -> ValueSet {
    ValueSet::Many(
        titles
            .iter()
            .map(|title| Fields::new().set("title", *title))
            .collect(),
    )
}

#[tokio::test]
async fn empty_insert_executes_nothing() {
    let driver = Recorder::new(Capability::MYSQL);
    let audit = Audit::default();
    let seen = audit.seen.clone();
    let db = db(&driver, Some(audit));

    let mut map = ExpressionMap::insert(db.schema().model_by_name("Post").unwrap());
    map.values(titles(&[]));

    let result = db.insert(&mut map).await.unwrap();

    assert_eq!(result, keel::InsertResult::default());
    assert!(driver.log().is_empty());
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn insert_ids_come_from_last_insert_id() {
    let driver = Recorder::new(Capability::MYSQL);
    driver
        .respond(Ok(Response::count(2).with_last_insert_id(7)))
        .respond(Ok(Response::values(vec![
            Record::new().set("Post_id", 8).set("Post_version", 1),
            Record::new().set("Post_id", 7).set("Post_version", 1),
        ])));

    let audit = Audit::default();
    let seen = audit.seen.clone();
    let db = db(&driver, Some(audit));

    let mut map = ExpressionMap::insert(db.schema().model_by_name("Post").unwrap());
    map.values(titles(&["a", "b"]));

    let result = db.insert(&mut map).await.unwrap();

    // The version column is re-read by key since MySQL cannot return it
    let log = driver.log();
    assert_eq!(log.len(), 2);
    assert_eq!(
        log[1],
        "SELECT `Post`.`id` AS `Post_id`, `Post`.`version` AS `Post_version` \
         FROM `post` `Post` WHERE `Post`.`id` IN (?, ?)"
    );

    assert_eq!(result.affected, 2);
    assert_eq!(
        result.identifiers,
        [Record::new().set("id", 7), Record::new().set("id", 8)]
    );
    assert_eq!(
        result.generated_maps,
        [
            Record::new().set("id", 7).set("version", 1),
            Record::new().set("id", 8).set("version", 1),
        ]
    );

    let rows = map.value_set.as_ref().unwrap().rows();
    assert_eq!(rows[1].get("id").and_then(|id| id.as_value()), Some(&Value::I64(8)));
    assert_eq!(
        *seen.lock().unwrap(),
        ["before_insert 2", "after_insert 7,8"]
    );
}

#[tokio::test]
async fn null_ids_are_generated_like_missing_ones() {
    let driver = Recorder::new(Capability::MYSQL);
    driver
        .respond(Ok(Response::count(2).with_last_insert_id(7)))
        .respond(Ok(Response::values(vec![
            Record::new().set("Post_id", 7).set("Post_version", 1),
            Record::new().set("Post_id", 8).set("Post_version", 1),
        ])));
    let db = db(&driver, None);

    let mut map = ExpressionMap::insert(db.schema().model_by_name("Post").unwrap());
    map.values(ValueSet::Many(vec![
        Fields::new().set("id", Value::Null).set("title", "a"),
        Fields::new().set("title", "b"),
    ]));

    let result = db.insert(&mut map).await.unwrap();

    let log = driver.log();
    assert!(log[0].starts_with("INSERT INTO `post`(`title`"), "{}", log[0]);
    assert_eq!(
        log[1],
        "SELECT `Post`.`id` AS `Post_id`, `Post`.`version` AS `Post_version` \
         FROM `post` `Post` WHERE `Post`.`id` IN (?, ?)"
    );

    assert_eq!(
        result.identifiers,
        [Record::new().set("id", 7), Record::new().set("id", 8)]
    );
    assert_eq!(
        result.generated_maps,
        [
            Record::new().set("id", 7).set("version", 1),
            Record::new().set("id", 8).set("version", 1),
        ]
    );

    let rows = map.value_set.as_ref().unwrap().rows();
    assert_eq!(rows[0].get("id").and_then(|id| id.as_value()), Some(&Value::I64(7)));
}

#[tokio::test]
async fn insert_reads_returned_rows() {
    let driver = Recorder::new(Capability::POSTGRESQL);
    driver.respond(Ok(Response::values(vec![Record::new()
        .set("id", 41)
        .set("version", 1)])));
    let db = db(&driver, None);

    let mut map = ExpressionMap::insert(db.schema().model_by_name("Post").unwrap());
    map.values(Fields::new().set("title", "hello"));

    let result = db.insert(&mut map).await.unwrap();

    let log = driver.log();
    assert_eq!(log.len(), 1);
    assert!(log[0].contains("RETURNING"), "{}", log[0]);
    assert_eq!(result.identifiers, [Record::new().set("id", 41)]);
    assert_eq!(result.generated_maps[0].get("version"), Some(&Value::I64(1)));
}

#[tokio::test]
async fn refresh_can_be_switched_off() {
    let driver = Recorder::new(Capability::MYSQL);
    driver.respond(Ok(Response::count(1).with_last_insert_id(3)));

    let mut builder = Db::builder();
    builder.schema(schema()).refresh_entities(false);
    let db = builder.build(driver.clone()).unwrap();

    let mut map = ExpressionMap::insert(db.schema().model_by_name("Post").unwrap());
    map.values(titles(&["a"]));

    let result = db.insert(&mut map).await.unwrap();

    assert_eq!(result.affected, 1);
    assert_eq!(result.identifiers, [Record::new()]);
}

#[tokio::test]
async fn refused_insert_never_reaches_the_driver() {
    let driver = Recorder::new(Capability::MYSQL);
    let db = db(
        &driver,
        Some(Audit {
            refuse: true,
            ..Audit::default()
        }),
    );

    let mut map = ExpressionMap::insert(db.schema().model_by_name("Post").unwrap());
    map.values(titles(&["a"]));

    let err = db.insert(&mut map).await.unwrap_err();

    assert!(err.to_string().contains("inserts are frozen"), "{err}");
    assert!(driver.log().is_empty());
}

#[tokio::test]
async fn subscribers_only_hear_their_model() {
    let driver = Recorder::new(Capability::MYSQL);
    let audit = Audit {
        model: Some("User"),
        ..Audit::default()
    };
    let seen = audit.seen.clone();
    let db = db(&driver, Some(audit));

    let mut map = ExpressionMap::insert(db.schema().model_by_name("Post").unwrap());
    map.values(titles(&["a"]));
    db.insert(&mut map).await.unwrap();

    let mut map = ExpressionMap::insert_into("audit_log");
    map.values(Fields::new().set("message", "x"));
    db.insert(&mut map).await.unwrap();

    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(driver.log().len(), 2);
}

#[tokio::test]
async fn driver_errors_pass_through() {
    let driver = Recorder::new(Capability::POSTGRESQL);
    driver.respond(Err(Error::driver(std::io::Error::other(
        "connection reset",
    ))));
    let db = db(&driver, None);

    let mut map = ExpressionMap::delete(db.schema().model_by_name("Tag").unwrap());
    map.where_in_ids(db.schema(), vec![1.into()]).unwrap();

    let err = db.delete(&map).await.unwrap_err();

    assert!(err.is_driver());
    assert_eq!(err.to_string(), "connection reset");
}

#[tokio::test]
async fn empty_update_fails_before_any_notification() {
    let driver = Recorder::new(Capability::POSTGRESQL);
    let audit = Audit::default();
    let seen = audit.seen.clone();
    let db = db(&driver, Some(audit));

    let mut map = ExpressionMap::update(db.schema().model_by_name("Post").unwrap());
    map.set(Fields::new());

    let err = db.update(&mut map).await.unwrap_err();

    assert!(err.is_values_missing());
    assert!(driver.log().is_empty());
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn update_refetches_versions_without_returning() {
    let driver = Recorder::new(Capability::MYSQL);
    driver
        .respond(Ok(Response::count(1)))
        .respond(Ok(Response::values(vec![Record::new()
            .set("Post_id", 3)
            .set("Post_version", 2)])));

    let audit = Audit::default();
    let seen = audit.seen.clone();
    let db = db(&driver, Some(audit));

    let mut map = ExpressionMap::update(db.schema().model_by_name("Post").unwrap());
    map.set(Fields::new().set("title", "renamed"))
        .where_entity(
            db.schema(),
            vec![Record::new().set("id", 3).set("version", 1)],
        )
        .unwrap();

    let result = db.update(&mut map).await.unwrap();

    let log = driver.log();
    assert_eq!(log.len(), 2);
    assert!(log[0].starts_with("UPDATE `post` SET `title` = ?, `version` = `version` + 1"));
    assert!(log[1].starts_with("SELECT"), "{}", log[1]);

    assert_eq!(result.affected, 1);
    assert_eq!(
        result.entities,
        [Record::new().set("id", 3).set("version", 2)]
    );
    assert_eq!(*seen.lock().unwrap(), ["after_update 1"]);
}

#[tokio::test]
async fn find_merges_relation_counts() {
    let driver = Recorder::new(Capability::POSTGRESQL);
    driver
        .respond(Ok(Response::values(vec![
            Record::new().set("u_id", 1).set("u_name", "ann"),
            Record::new().set("u_id", 2).set("u_name", "bob"),
        ])))
        .respond(Ok(Response::values(vec![Record::new()
            .set("parentId", 2)
            .set("cnt", 3)])));
    let db = db(&driver, None);

    let mut map = ExpressionMap::select(db.schema().model_by_name("User").unwrap(), "u");
    map.load_relation_count_and_map(db.schema(), "u.postCount", "u.posts")
        .unwrap();

    let users = db.find(&map).await.unwrap();

    assert_eq!(
        driver.log()[1],
        "SELECT \"authorId\" AS \"parentId\", COUNT(*) AS \"cnt\" FROM \"post\" \
         WHERE \"authorId\" IN ($1, $2) GROUP BY \"authorId\""
    );
    assert_eq!(users.len(), 2);
    assert_eq!(users[0].get("postCount"), Some(&Value::I64(0)));
    assert_eq!(users[1].get("postCount"), Some(&Value::I64(3)));
}

#[tokio::test]
async fn find_needs_a_model() {
    let driver = Recorder::new(Capability::SQLITE);
    let db = db(&driver, None);

    let map = ExpressionMap::select_from("audit_log", "a");

    assert!(db.find(&map).await.is_err());
    assert!(driver.log().is_empty());

    driver.respond(Ok(Response::values(vec![Record::new().set("message", "x")])));
    let rows = db.raw(&map).await.unwrap();
    assert_eq!(rows, [Record::new().set("message", "x")]);
}

#[tokio::test]
async fn junction_links_are_inserted_and_removed() {
    let driver = Recorder::new(Capability::POSTGRESQL);
    driver
        .respond(Ok(Response::count(2)))
        .respond(Ok(Response::count(1)));
    let db = db(&driver, None);

    let added = db
        .add_relation("Post", "tags", 1, vec![2.into(), 3.into()])
        .await
        .unwrap();
    let removed = db
        .remove_relation("Post", "tags", 1, vec![2.into()])
        .await
        .unwrap();

    assert_eq!((added, removed), (2, 1));

    let log = driver.log();
    assert!(log[0].starts_with("INSERT INTO \"post_tags\""), "{}", log[0]);
    assert!(log[1].starts_with("DELETE FROM \"post_tags\""), "{}", log[1]);
}

#[tokio::test]
async fn set_relation_on_a_to_many_is_rejected() {
    let driver = Recorder::new(Capability::POSTGRESQL);
    let db = db(&driver, None);

    let err = db
        .set_relation("User", "posts", 1, 2)
        .await
        .unwrap_err();

    assert!(err.is_relation_cardinality_mismatch());
}
