//! Test fixtures.
//!
//! The `people` store keys records by username and indexes them by
//! registration date.

use agilestore_core::{Database, DbConfig, Factory, Store, StoreConfig};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Name of the fixture store.
pub const PEOPLE: &str = "people";

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    /// Unique user name; the primary key.
    pub username: String,
    /// Age in years.
    pub age: u32,
    /// Registration day as `YYYY-MM-DD`; indexed.
    #[serde(rename = "registrationDate")]
    pub registration_date: String,
    /// Whether the e-mail address was confirmed.
    pub verified: bool,
}

/// Configuration of the `people` store.
pub fn people_config() -> StoreConfig {
    StoreConfig::new(PEOPLE, "username").index("registrationDate")
}

/// Opens a fresh database holding only the `people` store.
///
/// Each call starts its own engine, so tests never share state.
pub async fn open_people() -> Store<Person> {
    let factory = Factory::new().expect("Failed to start engine");
    let db = Database::open(&factory, &DbConfig::new("testkit"), &[people_config()])
        .await
        .expect("Failed to open test database");
    db.store(PEOPLE).expect("people store is configured")
}

/// Installs a log subscriber that writes through the test harness.
///
/// Honours `RUST_LOG`; safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
