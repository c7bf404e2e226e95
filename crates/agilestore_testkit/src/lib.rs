//! # agilestore testkit
//!
//! Test utilities for agilestore.
//!
//! This crate provides:
//! - The `people` fixture record and store configuration
//! - A seeded generator of fake people for populating stores
//! - Property-based test strategies using proptest
//! - Log capture for tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agilestore_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn lookups() {
//!     let people = open_people().await;
//!     let added = populate(&people, 100, 7).await.unwrap();
//!     // ... test operations
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
