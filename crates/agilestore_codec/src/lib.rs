//! # agilestore codec
//!
//! Dynamic record values for agilestore.
//!
//! This crate provides:
//! - [`Value`], the shape every record takes inside the engine
//! - [`Key`], the validated subset of values usable as primary or index keys
//! - [`to_value`] / [`from_value`], the serde bridge for typed records
//!
//! ## Usage
//!
//! ```
//! use agilestore_codec::{from_value, to_value, Key, Value};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Item {
//!     name: String,
//!     qty: i64,
//! }
//!
//! let value = to_value(&Item { name: "pen".into(), qty: 3 }).unwrap();
//! assert_eq!(value.get("qty"), Some(&Value::Integer(3)));
//!
//! let key = Key::new(value.get("name").cloned().unwrap()).unwrap();
//! assert_eq!(key, Key::from("pen"));
//!
//! let back: Item = from_value(value).unwrap();
//! assert_eq!(back.qty, 3);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod convert;
mod error;
mod key;
mod value;

pub use convert::{from_value, to_value};
pub use error::{CodecError, CodecResult};
pub use key::Key;
pub use value::Value;
