//! # cpwatch-types
//!
//! Core types for Catchpoint test data. This crate defines the flattened
//! [`TestDataset`] that the fetcher produces, the selectors used to request
//! it, and the query and summary surface used to explore it.
//!
//! ## Design Goals
//!
//! - **Immutable datasets**: Built once through a builder, then only read
//! - **Typed cells**: Every value is a [`Value`] (null, integer, float or text)
//! - **Embedded SQL**: Ad-hoc queries run against an in-memory SQLite copy
//! - **No network code**: Fetching lives in `cpwatch-adapters`
//!
//! ## Features
//!
//! - `sql` (default): `query` and `summary` via bundled SQLite
//! - `serde`: Serialization of datasets and selectors
//! - `all`: Enable everything
//!
//! ## Example
//!
//! ```rust
//! use cpwatch_types::{Stat, TestDataset, Value};
//!
//! let dataset = TestDataset::builder()
//!     .dimensions(["test", "country"])
//!     .metrics(["dns_ms"])
//!     .row(vec!["home".into(), "Japan".into(), Value::Int(12)])
//!     .row(vec!["home".into(), "France".into(), Value::Int(48)])
//!     .row(vec!["cart".into(), "Japan".into(), Value::Int(20)])
//!     .build()
//!     .unwrap();
//!
//! let japan = dataset.query("SELECT * FROM data WHERE country = 'Japan'").unwrap();
//! assert_eq!(japan.len(), 2);
//!
//! let summary = dataset.summary(None, Stat::Mean, "test").unwrap();
//! assert_eq!(summary.get("home", "dns_ms"), Some(30.0));
//! ```

mod dataset;
mod error;
mod interval;
mod render;
mod value;

#[cfg(feature = "sql")]
mod query;
#[cfg(feature = "sql")]
mod summary;

pub use dataset::*;
pub use error::*;
pub use interval::*;
pub use render::{to_csv, to_html};
pub use value::*;

#[cfg(feature = "sql")]
pub use query::*;
#[cfg(feature = "sql")]
pub use summary::*;

/// Timestamp layout used for window bounds in requests and provenance.
pub const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
