//! # cpwatch
//!
//! A command-line explorer and library for Catchpoint synthetic test data.
//!
//! The heavy lifting lives in the workspace crates: `cpwatch-adapters`
//! downloads and extracts explorer responses, `cpwatch-types` holds the
//! resulting [`TestDataset`] with its SQL and summary surface. This crate
//! adds what a command-line run needs around them.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                           cpwatch                            │
//! │  ┌──────────┐   ┌──────────────┐   ┌─────────┐   ┌─────────┐ │
//! │  │ settings │──▶│  Catchpoint  │──▶│ dataset │──▶│ report  │ │
//! │  │  (.env)  │   │   adapter    │   │ sql/sum │   │csv/html │ │
//! │  └──────────┘   └──────────────┘   └─────────┘   └─────────┘ │
//! │                        ▲                                     │
//! │  ┌──────────┐   ┌──────┴───────┐                             │
//! │  │   lock   │   │   source     │◀── saved raw responses      │
//! │  └──────────┘   └──────────────┘                             │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **[`settings`]**: key=value env file layered under the environment
//! - **[`logging`]**: tracing subscriber setup
//! - **[`lock`]**: single-run guard on an advisory file lock
//! - **[`source`]**: replay of saved responses
//! - **[`report`]**: JSON export
//!
//! ## Usage
//!
//! ### As a CLI tool
//!
//! ```bash
//! # p95 per country for one test over the last hour
//! cpwatch fetch --test-id 101 --group-by country
//!
//! # Every web test in a folder, filtered with SQL, saved for later
//! cpwatch fetch --folder 73339 --test-type web \
//!     --sql "SELECT * FROM data WHERE dns_ms > 100" --save-raw raw.json
//!
//! # Re-run a summary offline
//! cpwatch replay raw.json --stat median --group-by city
//! ```
//!
//! ### As a library
//!
//! ```no_run
//! use cpwatch::{FileSource, Stat};
//! use cpwatch_adapters::extract::ExtractOptions;
//!
//! let dataset = FileSource::new("raw.json").load(&ExtractOptions::default())?;
//! let summary = dataset.summary(None, Stat::P95, "country")?;
//! println!("{}", summary);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod duration;
pub mod lock;
pub mod logging;
pub mod report;
pub mod settings;
pub mod source;

// Re-export main types for convenience
pub use lock::{LockError, RunLock};
pub use logging::LogOptions;
pub use settings::{Settings, SettingsError};
pub use source::{save_raw, FileSource, SourceError};

pub use cpwatch_types::{QueryError, QueryTable, Stat, SummaryError, SummaryTable, TestDataset};
