//! Store facade behaviour against a live engine.

use agilestore_core::{
    transaction_done, CoreError, Database, DbConfig, EngineConfig, ErrorKind, Factory, Key,
    KeyRange, Mode, PropertyKind, Store, StoreConfig,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Person {
    username: String,
    city: String,
    age: u32,
}

fn person(username: &str, city: &str, age: u32) -> Person {
    Person {
        username: username.to_string(),
        city: city.to_string(),
        age,
    }
}

fn people_config() -> StoreConfig {
    StoreConfig::new("people", "username").index("city")
}

async fn open_with(factory: &Factory) -> Store<Person> {
    let db = Database::open(factory, &DbConfig::new("app"), &[people_config()])
        .await
        .unwrap();
    db.store("people").unwrap()
}

async fn open() -> Store<Person> {
    open_with(&Factory::new().unwrap()).await
}

async fn seeded() -> Store<Person> {
    let store = open().await;
    let people = [
        person("ada", "London", 36),
        person("alan", "London", 41),
        person("grace", "New York", 85),
        person("linus", "Helsinki", 54),
        person("edsger", "Rotterdam", 72),
    ];
    assert_eq!(store.add_many(&people, false).await.unwrap(), 5);
    store
}

fn usernames(people: &[Person]) -> Vec<&str> {
    people.iter().map(|p| p.username.as_str()).collect()
}

#[tokio::test]
async fn add_then_get_by_key_path() {
    let store = open().await;
    let ada = person("ada", "London", 36);

    let key = store.add(&ada).await.unwrap();
    assert_eq!(key, Key::from("ada"));
    assert_eq!(store.get_one("username", "ada").await.unwrap(), Some(ada));
}

#[tokio::test]
async fn missing_record_is_none() {
    let store = seeded().await;
    assert_eq!(store.get_one("username", "nobody").await.unwrap(), None);
    assert_eq!(store.get_one_by_index("city", "Paris").await.unwrap(), None);
}

#[tokio::test]
async fn undeclared_property_is_rejected() {
    let store = seeded().await;

    let err = store.get_one("age", 36).await.unwrap_err();
    assert_eq!(err, CoreError::invalid_property("people", "age"));
    let err = store.delete_many("age", &KeyRange::only(36)).await.unwrap_err();
    assert!(matches!(err, CoreError::InvalidProperty { .. }));
    let err = store.get_many_by_index("username", &KeyRange::all()).await.unwrap_err();
    assert!(matches!(err, CoreError::InvalidProperty { .. }));

    assert_eq!(store.count().await.unwrap(), 5);
}

#[tokio::test]
async fn unbound_store_is_rejected_first() {
    let store: Store<Person> = Store::new(people_config());
    assert!(!store.is_bound());

    let err = store.get_one("age", 3).await.unwrap_err();
    assert_eq!(err, CoreError::not_bound("people"));
    let err = store.add_many(&[], false).await.unwrap_err();
    assert_eq!(err, CoreError::not_bound("people"));
}

#[tokio::test]
async fn property_kinds() {
    let store = open().await;
    assert_eq!(store.property_kind("username"), Some(PropertyKind::PrimaryKey));
    assert_eq!(store.property_kind("city"), Some(PropertyKind::Index));
    assert_eq!(store.property_kind("age"), None);
}

#[tokio::test]
async fn duplicate_add_is_a_constraint_error() {
    let store = open().await;
    store.add(&person("ada", "London", 36)).await.unwrap();

    let err = store.add(&person("ada", "Paris", 20)).await.unwrap_err();
    assert!(matches!(
        err,
        CoreError::Request {
            kind: ErrorKind::Constraint,
            ..
        }
    ));
    assert_eq!(store.get_one_by_key("ada").await.unwrap().unwrap().city, "London");
}

#[tokio::test]
async fn put_round_trips_and_clear_empties() {
    let store = seeded().await;
    let moved = person("ada", "Paris", 37);

    store.put(&moved).await.unwrap();
    assert_eq!(store.get_one_by_key("ada").await.unwrap(), Some(moved));
    assert_eq!(store.count().await.unwrap(), 5);

    store.clear().await.unwrap();
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn bulk_add_counts_successes() {
    let store = open().await;
    let people: Vec<Person> = (0..50).map(|i| person(&format!("user{i:02}"), "Oslo", i)).collect();

    assert_eq!(store.add_many(&people, false).await.unwrap(), 50);
    assert_eq!(store.count().await.unwrap(), 50);
}

#[tokio::test]
async fn bulk_add_with_duplicate_rejects_and_writes_nothing() {
    let store = open().await;
    let people = [
        person("ada", "London", 36),
        person("alan", "London", 41),
        person("ada", "Paris", 20),
    ];

    let err = store.add_many(&people, false).await.unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Constraint));
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn bulk_add_ignoring_errors_skips_duplicates() {
    let store = open().await;
    let people = [
        person("ada", "London", 36),
        person("alan", "London", 41),
        person("ada", "Paris", 20),
        person("grace", "New York", 85),
    ];

    assert_eq!(store.add_many(&people, true).await.unwrap(), 3);
    assert_eq!(store.count().await.unwrap(), 3);
    assert_eq!(store.get_one_by_key("ada").await.unwrap().unwrap().city, "London");
}

#[tokio::test]
async fn bulk_add_of_nothing_is_zero() {
    let store = open().await;
    assert_eq!(store.add_many(&[], false).await.unwrap(), 0);
}

#[tokio::test]
async fn bulk_add_in_caller_transaction_keeps_it_alive() {
    let factory = Factory::new().unwrap();
    let db = Database::open(&factory, &DbConfig::new("app"), &[people_config()])
        .await
        .unwrap();
    let store: Store<Person> = db.store("people").unwrap();
    let people = [person("ada", "London", 36), person("ada", "Paris", 20)];

    let txn = db.transaction(&["people"], Mode::ReadWrite).unwrap();
    let err = store.add_many_in_txn(&txn, &people, false).await.unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Constraint));

    let done = transaction_done(&txn);
    drop(txn);
    done.await.unwrap();
    assert_eq!(store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn quota_abort_rejects_even_when_ignoring_errors() {
    let factory = Factory::with_config(EngineConfig::new().max_records(2)).unwrap();
    let store = open_with(&factory).await;
    let people = [
        person("ada", "London", 36),
        person("alan", "London", 41),
        person("grace", "New York", 85),
    ];

    let err = store.add_many(&people, true).await.unwrap_err();
    assert!(matches!(
        err,
        CoreError::Transaction {
            kind: ErrorKind::QuotaExceeded,
            ..
        }
    ));
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn get_many_by_key_and_index() {
    let store = seeded().await;

    let range = KeyRange::between("alan", "grace");
    let found = store.get_many("username", &range).await.unwrap();
    assert_eq!(usernames(&found), vec!["alan", "edsger", "grace"]);

    let london = store.get_many("city", &KeyRange::only("London")).await.unwrap();
    assert_eq!(usernames(&london), vec!["ada", "alan"]);

    let all = store.get_many_by_key(&KeyRange::all()).await.unwrap();
    assert_eq!(all.len(), 5);
}

#[tokio::test]
async fn filter_honours_limit() {
    let store = seeded().await;

    let old = store.filter(|p: &Person| p.age > 50, None).await.unwrap();
    assert_eq!(usernames(&old), vec!["edsger", "grace", "linus"]);

    let first = store.filter(|p: &Person| p.age > 50, Some(2)).await.unwrap();
    assert_eq!(usernames(&first), vec!["edsger", "grace"]);

    let roomy = store.filter(|p: &Person| p.age > 50, Some(10)).await.unwrap();
    assert_eq!(roomy.len(), 3);

    let none = store.filter(|p: &Person| p.age > 50, Some(0)).await.unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn filter_on_empty_store_is_empty() {
    let store = open().await;
    assert!(store.filter(|_: &Person| true, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn filter_in_caller_transaction_resolves_before_commit() {
    let factory = Factory::new().unwrap();
    let db = Database::open(&factory, &DbConfig::new("app"), &[people_config()])
        .await
        .unwrap();
    let store: Store<Person> = db.store("people").unwrap();
    store.add(&person("ada", "London", 36)).await.unwrap();

    let txn = db.transaction(&["people"], Mode::ReadOnly).unwrap();
    let found = store.filter_in_txn(&txn, |_: &Person| true, None).await.unwrap();
    assert_eq!(found.len(), 1);
    assert!(txn.is_active());
}

#[tokio::test]
async fn delete_by_index_counts_every_match() {
    let store = seeded().await;

    let deleted = store.delete_many("city", &KeyRange::only("London")).await.unwrap();
    assert_eq!(deleted, Some(2));
    assert_eq!(store.count().await.unwrap(), 3);
    assert_eq!(store.get_one_by_index("city", "London").await.unwrap(), None);
}

#[tokio::test]
async fn delete_by_index_over_nothing_is_zero() {
    let store = seeded().await;
    let deleted = store.delete_many_by_index("city", &KeyRange::only("Paris")).await.unwrap();
    assert_eq!(deleted, 0);
    assert_eq!(store.count().await.unwrap(), 5);
}

#[tokio::test]
async fn delete_by_key_path_is_uncounted() {
    let store = seeded().await;

    let deleted = store
        .delete_many("username", &KeyRange::between("a", "b"))
        .await
        .unwrap();
    assert_eq!(deleted, None);
    assert_eq!(store.count().await.unwrap(), 3);
}

#[tokio::test]
async fn unbounded_key_range_delete_is_rejected() {
    let store = seeded().await;

    let err = store.delete_many_by_key_range(&KeyRange::all()).await.unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Data));
    assert_eq!(store.count().await.unwrap(), 5);
}

#[tokio::test]
async fn delete_one_removes_only_that_record() {
    let store = seeded().await;
    store.delete_one("ada").await.unwrap();
    store.delete_one("nobody").await.unwrap();
    assert_eq!(store.count().await.unwrap(), 4);
    assert_eq!(store.get_one_by_key("ada").await.unwrap(), None);
}

#[derive(Serialize)]
struct AgePatch {
    age: u32,
}

#[tokio::test]
async fn update_one_merges_fields() {
    let store = seeded().await;

    store.update_one("ada", &AgePatch { age: 37 }).await.unwrap();

    let ada = store.get_one_by_key("ada").await.unwrap().unwrap();
    assert_eq!(ada, person("ada", "London", 37));
}

#[tokio::test]
async fn update_one_of_missing_record_fails() {
    let store = seeded().await;

    let err = store.update_one("nobody", &AgePatch { age: 1 }).await.unwrap_err();
    assert_eq!(
        err,
        CoreError::RecordNotFound {
            store: "people".to_string()
        }
    );
    assert_eq!(store.count().await.unwrap(), 5);
}

#[tokio::test]
async fn aborted_caller_transaction_rolls_back_writes() {
    let factory = Factory::new().unwrap();
    let db = Database::open(&factory, &DbConfig::new("app"), &[people_config()])
        .await
        .unwrap();
    let store: Store<Person> = db.store("people").unwrap();

    let txn = db.transaction(&["people"], Mode::ReadWrite).unwrap();
    store.put_in_txn(&txn, &person("ada", "London", 36)).await.unwrap();
    assert_eq!(store.count_in_txn(&txn).await.unwrap(), 1);

    let done = transaction_done(&txn);
    txn.abort();
    drop(txn);
    assert_eq!(done.await.unwrap_err().kind(), Some(ErrorKind::Abort));
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn caller_transaction_batches_several_operations() {
    let factory = Factory::new().unwrap();
    let db = Database::open(&factory, &DbConfig::new("app"), &[people_config()])
        .await
        .unwrap();
    let store: Store<Person> = db.store("people").unwrap();

    let txn = db.transaction(&["people"], Mode::ReadWrite).unwrap();
    store.add_in_txn(&txn, &person("ada", "London", 36)).await.unwrap();
    store.add_in_txn(&txn, &person("alan", "London", 41)).await.unwrap();
    store.update_one_in_txn(&txn, "alan", &AgePatch { age: 42 }).await.unwrap();
    let deleted = store
        .delete_many_in_txn(&txn, "city", &KeyRange::only("London"))
        .await
        .unwrap();
    assert_eq!(deleted, Some(2));
    store.add_in_txn(&txn, &person("grace", "New York", 85)).await.unwrap();

    let done = transaction_done(&txn);
    txn.commit();
    drop(txn);
    done.await.unwrap();

    let all = store.get_many_by_key(&KeyRange::all()).await.unwrap();
    assert_eq!(usernames(&all), vec!["grace"]);
}

#[tokio::test]
async fn failed_deletes_are_skipped_and_uncounted() {
    let factory = Factory::new().unwrap();
    let db = Database::open(&factory, &DbConfig::new("app"), &[people_config()])
        .await
        .unwrap();
    let store: Store<Person> = db.store("people").unwrap();
    let people = [
        person("ada", "Oslo", 36),
        person("alan", "Oslo", 41),
        person("grace", "Oslo", 85),
        person("linus", "Oslo", 54),
    ];
    assert_eq!(store.add_many(&people, false).await.unwrap(), 4);

    // Every delete fails in a read-only transaction; the scan still completes.
    let txn = db.transaction(&["people"], Mode::ReadOnly).unwrap();
    let deleted = store
        .delete_many_in_txn(&txn, "city", &KeyRange::only("Oslo"))
        .await
        .unwrap();
    assert_eq!(deleted, Some(0));
    assert!(txn.is_active());
    drop(txn);

    assert_eq!(store.count().await.unwrap(), 4);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Reading {
    id: String,
    celsius: f64,
}

fn reading(id: &str, celsius: f64) -> Reading {
    Reading {
        id: id.to_string(),
        celsius,
    }
}

#[tokio::test]
async fn float_fields_store_and_index() {
    let factory = Factory::new().unwrap();
    let config = StoreConfig::new("readings", "id").index("celsius");
    let db = Database::open(&factory, &DbConfig::new("sensors"), &[config])
        .await
        .unwrap();
    let store: Store<Reading> = db.store("readings").unwrap();
    let readings = [
        reading("a", 21.5),
        reading("b", -3.25),
        reading("c", 21.5),
        reading("d", 30.0),
    ];
    assert_eq!(store.add_many(&readings, false).await.unwrap(), 4);

    assert_eq!(store.get_one("id", "a").await.unwrap(), Some(reading("a", 21.5)));
    assert_eq!(
        store.get_one("celsius", -3.25).await.unwrap(),
        Some(reading("b", -3.25))
    );

    let warm = store.get_many("celsius", &KeyRange::only(21.5)).await.unwrap();
    assert_eq!(warm, vec![reading("a", 21.5), reading("c", 21.5)]);

    let above_freezing = store
        .get_many("celsius", &KeyRange::all().lower(0).lower_open(true))
        .await
        .unwrap();
    assert_eq!(above_freezing.len(), 3);
}
