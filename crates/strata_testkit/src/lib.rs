//! # Strata Testkit
//!
//! Test utilities for Strata.
//!
//! This crate provides:
//! - Fixtures: sample models, deterministic identifier generators, and
//!   tracing setup for tests
//! - Property-based test generators using proptest
//! - A store harness that applies random operations and checks that
//!   indexes agree with the records
//!
//! ## Usage
//!
//! ```rust,ignore
//! use strata_testkit::prelude::*;
//!
//! #[test]
//! fn people_by_val() {
//!     let mut store = person_store(false);
//!     store.add_data(person_data("Ada", "Lovelace", 12)).unwrap();
//!     assert_eq!(store.find("val", 12).unwrap().len(), 1);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod integration;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
}

pub use fixtures::*;
pub use generators::*;
pub use integration::*;
