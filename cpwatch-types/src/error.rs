//! Error types shared across the workspace.

use thiserror::Error;

/// A caller supplied an argument outside the supported set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgumentError {
    /// Interval code not in the provider enumeration.
    #[error("Unsupported interval {0}")]
    UnknownInterval(String),

    /// Test type other than web, transaction, api or all.
    #[error("Unsupported test type {0}")]
    UnknownTestType(String),

    /// Data kind other than aggregated or raw.
    #[error("Unsupported data kind {0}")]
    UnknownDataKind(String),

    /// Summary statistic other than p95, p75, p50, mean or median.
    #[error("Unsupported stat {0}")]
    UnknownStat(String),
}

/// Errors raised while assembling a [`TestDataset`](crate::TestDataset).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DatasetError {
    /// A row does not have one value per column.
    #[error("row {index} has {actual} values, expected {expected}")]
    RowWidth {
        /// Position of the offending row.
        index: usize,
        /// Number of columns in the dataset.
        expected: usize,
        /// Number of values in the row.
        actual: usize,
    },
}

/// Errors writing CSV output.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("csv output is not utf-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}
