//! # agilestore engine
//!
//! An in-process transactional key/value engine with a callback-based
//! request/event protocol.
//!
//! The engine models the browser's indexed storage API:
//! - databases are versioned and change schema only inside a version change
//! - object stores hold records ordered by primary key, with secondary indexes
//! - every read or write is a [`Request`] queued on a [`Transaction`] and
//!   reporting exactly one success or one error
//! - an error nobody handles aborts the transaction and rolls back its writes
//!
//! All callbacks run on one event-loop thread per [`Factory`].
//!
//! ## Usage
//!
//! ```
//! use agilestore_codec::{Key, Value};
//! use agilestore_engine::{ErrorDisposition, Factory, Mode, StoreParams};
//! use std::sync::mpsc;
//!
//! let factory = Factory::new().unwrap();
//!
//! let (opened, connection) = mpsc::channel();
//! factory
//!     .open("demo", Some(1))
//!     .on_upgrade_needed(|change| {
//!         change.create_store("notes", StoreParams::new().auto_increment(true))?;
//!         Ok(())
//!     })
//!     .listen(move |conn| opened.send(conn).unwrap(), |err| panic!("{err}"));
//! let conn = connection.recv().unwrap();
//!
//! let txn = conn.transaction(&["notes"], Mode::ReadWrite).unwrap();
//! let (added, key) = mpsc::channel();
//! txn.store("notes").unwrap().add(Value::from("hello")).listen(
//!     move |key| added.send(key).unwrap(),
//!     |_| ErrorDisposition::Propagate,
//! );
//! drop(txn);
//!
//! assert_eq!(key.recv().unwrap(), Key::from(1));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod cursor;
mod data;
mod error;
mod factory;
mod range;
mod request;
mod schema;
mod store;
mod transaction;
mod worker;

pub use config::EngineConfig;
pub use cursor::{Cursor, CursorRequest};
pub use error::{EngineError, EngineResult, ErrorKind};
pub use factory::{Connection, Factory, OpenRequest, StoreSchemaMut, VersionChange};
pub use range::KeyRange;
pub use request::{ErrorDisposition, Request};
pub use schema::{IndexSchema, StoreParams, StoreSchema};
pub use store::{Index, ObjectStore};
pub use transaction::{Mode, Transaction};
