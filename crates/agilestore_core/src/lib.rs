//! # agilestore core
//!
//! Typed, future-based CRUD stores over the agilestore engine.
//!
//! This crate provides:
//! - [`Store<T>`], a serde-typed facade with add, get, put, update, delete,
//!   filter, count and bulk-insert operations
//! - [`Database`], which opens a database, creates the configured stores and
//!   indices, and binds facades to the connection
//! - [`Pending`], the future every operation resolves through: exactly one
//!   result or one error
//!
//! Each operation either creates its own transaction and resolves once that
//! transaction commits, or runs in a caller transaction (`*_in_txn`) and
//! resolves as soon as its requests succeed.
//!
//! ## Usage
//!
//! ```
//! use agilestore_core::{Database, DbConfig, Factory, KeyRange, StoreConfig};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize, Debug, PartialEq)]
//! struct Person {
//!     username: String,
//!     city: String,
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), agilestore_core::CoreError> {
//! let factory = Factory::new().map_err(agilestore_core::CoreError::request)?;
//! let people = StoreConfig::new("people", "username").index("city");
//! let db = Database::open(&factory, &DbConfig::new("app"), &[people]).await?;
//!
//! let store = db.store::<Person>("people")?;
//! store
//!     .add(&Person { username: "ada".into(), city: "London".into() })
//!     .await?;
//!
//! let found = store.get_one("city", "London").await?;
//! assert_eq!(found.map(|p| p.username), Some("ada".to_string()));
//!
//! let deleted = store.delete_many("city", &KeyRange::only("London")).await?;
//! assert_eq!(deleted, Some(1));
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod bulk;
mod config;
mod database;
mod delete;
mod error;
mod property;
mod range;
mod scan;
mod settle;
mod store;
mod txop;

pub use config::{DbConfig, StoreConfig};
pub use database::{BindStore, Database};
pub use error::{CoreError, CoreResult};
pub use property::PropertyKind;
pub use range::KeyRange;
pub use settle::Pending;
pub use store::Store;
pub use txop::transaction_done;

pub use agilestore_codec::{Key, Value};
pub use agilestore_engine::{EngineConfig, ErrorKind, Factory, Mode, Transaction};
