//! # cpwatch-adapters
//!
//! Collects Catchpoint test data and turns it into [`TestDataset`]s.
//!
//! ## Modules
//!
//! - [`extract`] - flattens an explorer response into classified rows
//! - [`breadcrumbs`] - expands CDN debug headers into typed columns
//! - `catchpoint` (`catchpoint` feature) - async REST client with folder
//!   resolution and rate-limit retries
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cpwatch_adapters::catchpoint::{CatchpointAdapter, TestDataRequest, TestSelection};
//! use cpwatch_adapters::TestType;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let adapter = CatchpointAdapter::builder()
//!         .api_key(std::env::var("CP_API_KEY")?)
//!         .build()?;
//!
//!     let request = TestDataRequest::new(TestSelection::Folder {
//!         id: "73339".into(),
//!         test_type: TestType::Web,
//!     });
//!     let dataset = adapter.fetch_test_data(&request).await?;
//!
//!     println!("Collected {} rows", dataset.len());
//!     Ok(())
//! }
//! ```
//!
//! Extraction works offline too:
//!
//! ```rust
//! use cpwatch_adapters::extract::{extract, ExtractOptions};
//! use cpwatch_adapters::Provenance;
//!
//! let raw = serde_json::json!({"data": {"responseItems": [{
//!     "dimensions": [{"name": "Test"}],
//!     "metrics": [{"name": "DNS (ms)"}],
//!     "items": [{"dimensions": [{"name": "home"}], "values": [12]}]
//! }]}});
//!
//! let dataset = extract(raw, &ExtractOptions::default(), Provenance::default()).unwrap();
//! assert_eq!(dataset.columns(), ["test", "dns_ms"]);
//! ```

pub mod breadcrumbs;
pub mod error;
pub mod extract;

#[cfg(feature = "catchpoint")]
pub mod catchpoint;

pub use error::AdapterError;

// Re-export types for convenience
pub use cpwatch_types::{DataKind, Interval, Provenance, TestDataset, TestType, Value};
