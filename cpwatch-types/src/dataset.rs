//! The flattened, classified test dataset.

use std::collections::BTreeMap;
use std::fmt;

use crate::{DatasetError, Interval, Value};

/// Which part of a row a column belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ColumnKind {
    Dimension,
    Metric,
    Tracepoint,
}

/// Request parameters retained alongside the data they produced.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Provenance {
    /// Test ids the data was requested for.
    pub test_ids: Vec<String>,
    /// Window start, formatted as `%Y-%m-%dT%H:%M:%S`.
    pub start_time: String,
    /// Window end, formatted as `%Y-%m-%dT%H:%M:%S`.
    pub end_time: String,
    /// Aggregation interval, if the data came from the explorer API.
    pub interval: Option<Interval>,
    pub metric_ids: Vec<String>,
    pub dimension_ids: Vec<String>,
    pub sub_source_ids: Vec<String>,
    pub tracepoint_ids: Vec<String>,
}

/// Diagnostic counters gathered while extracting rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExtractionStats {
    /// Items present in the response.
    pub total_items: usize,
    /// Items turned into rows (included + excluded).
    pub extracted: usize,
    /// Rows kept in the dataset.
    pub included: usize,
    /// Rows routed to the excluded set.
    pub excluded: usize,
    /// Rows classified as outliers, included or not.
    pub outliers: usize,
    /// Rows classified as errors, included or not.
    pub errors: usize,
    /// Rows with at least one null metric.
    pub null_rows: usize,
    /// Metric values within 60% of the outlier threshold.
    pub potential_outliers: usize,
}

/// Catchpoint test data flattened into a table.
///
/// Columns are the dimension names, then the metric names, then the
/// tracepoint names. Every row, included or excluded, holds exactly one
/// value per column. A dataset never changes after it is built; querying
/// and summarizing work on copies.
///
/// # Example
///
/// ```rust
/// use cpwatch_types::{TestDataset, Value};
///
/// let dataset = TestDataset::builder()
///     .dimensions(["test", "country"])
///     .metrics(["dns_ms", "connect_ms"])
///     .row(vec!["home".into(), "Japan".into(), Value::Int(12), Value::Int(40)])
///     .build()
///     .unwrap();
///
/// assert_eq!(dataset.columns().len(), 4);
/// assert_eq!(dataset.len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TestDataset {
    columns: Vec<String>,
    dimensions: Vec<String>,
    metrics: Vec<String>,
    tracepoints: Vec<String>,
    rows: Vec<Vec<Value>>,
    excluded_rows: Vec<Vec<Value>>,
    provenance: Provenance,
    stats: ExtractionStats,
    raw_response: serde_json::Value,
}

impl TestDataset {
    /// Create a builder for constructing a dataset.
    pub fn builder() -> TestDatasetBuilder {
        TestDatasetBuilder::default()
    }

    /// Ordered column names.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Dimension column names.
    pub fn dimensions(&self) -> &[String] {
        &self.dimensions
    }

    /// Metric column names.
    pub fn metrics(&self) -> &[String] {
        &self.metrics
    }

    /// Tracepoint (header) column names.
    pub fn tracepoints(&self) -> &[String] {
        &self.tracepoints
    }

    /// Included rows.
    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// Rows filtered out by the outlier/error policy.
    pub fn excluded_rows(&self) -> &[Vec<Value>] {
        &self.excluded_rows
    }

    /// Request parameters that produced this data.
    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    /// Extraction counters.
    pub fn stats(&self) -> &ExtractionStats {
        &self.stats
    }

    /// The provider payload as received.
    pub fn raw_response(&self) -> &serde_json::Value {
        &self.raw_response
    }

    /// Number of included rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if there are no included rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// What kind of column `name` is.
    pub fn column_kind(&self, name: &str) -> Option<ColumnKind> {
        if self.dimensions.iter().any(|d| d == name) {
            Some(ColumnKind::Dimension)
        } else if self.metrics.iter().any(|m| m == name) {
            Some(ColumnKind::Metric)
        } else if self.tracepoints.iter().any(|t| t == name) {
            Some(ColumnKind::Tracepoint)
        } else {
            None
        }
    }

    /// Kind of the column at `index`, by position.
    pub(crate) fn kind_at(&self, index: usize) -> ColumnKind {
        if index < self.dimensions.len() {
            ColumnKind::Dimension
        } else if index < self.dimensions.len() + self.metrics.len() {
            ColumnKind::Metric
        } else {
            ColumnKind::Tracepoint
        }
    }

    /// Included rows keyed by position, each as a column → value map.
    pub fn records(&self) -> BTreeMap<usize, BTreeMap<String, Value>> {
        self.rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let record = self
                    .columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect();
                (i, record)
            })
            .collect()
    }

    /// Build a copy of this dataset with different tracepoint columns.
    ///
    /// `rows` and `excluded_rows` must already be laid out for the new
    /// columns. Provenance, stats and the raw response are kept.
    pub fn with_tracepoints(
        &self,
        tracepoints: Vec<String>,
        rows: Vec<Vec<Value>>,
        excluded_rows: Vec<Vec<Value>>,
    ) -> Result<Self, DatasetError> {
        TestDataset::builder()
            .dimensions(self.dimensions.iter().cloned())
            .metrics(self.metrics.iter().cloned())
            .tracepoints(tracepoints)
            .rows(rows)
            .excluded_rows(excluded_rows)
            .provenance(self.provenance.clone())
            .stats(self.stats)
            .raw_response(self.raw_response.clone())
            .build()
    }
}

impl fmt::Display for TestDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::render::write_text_table(f, &self.columns, &self.rows)
    }
}

/// Builder for [`TestDataset`].
#[derive(Debug, Default)]
pub struct TestDatasetBuilder {
    dimensions: Vec<String>,
    metrics: Vec<String>,
    tracepoints: Vec<String>,
    rows: Vec<Vec<Value>>,
    excluded_rows: Vec<Vec<Value>>,
    provenance: Provenance,
    stats: Option<ExtractionStats>,
    raw_response: serde_json::Value,
}

impl TestDatasetBuilder {
    /// Set the dimension column names.
    pub fn dimensions<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dimensions = names.into_iter().map(Into::into).collect();
        self
    }

    /// Set the metric column names.
    pub fn metrics<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metrics = names.into_iter().map(Into::into).collect();
        self
    }

    /// Set the tracepoint column names.
    pub fn tracepoints<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tracepoints = names.into_iter().map(Into::into).collect();
        self
    }

    /// Append an included row.
    pub fn row(mut self, row: Vec<Value>) -> Self {
        self.rows.push(row);
        self
    }

    /// Replace all included rows.
    pub fn rows(mut self, rows: Vec<Vec<Value>>) -> Self {
        self.rows = rows;
        self
    }

    /// Append an excluded row.
    pub fn excluded_row(mut self, row: Vec<Value>) -> Self {
        self.excluded_rows.push(row);
        self
    }

    /// Replace all excluded rows.
    pub fn excluded_rows(mut self, rows: Vec<Vec<Value>>) -> Self {
        self.excluded_rows = rows;
        self
    }

    /// Set the request provenance.
    pub fn provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = provenance;
        self
    }

    /// Set the extraction counters.
    ///
    /// When omitted, the counters are derived from the row counts.
    pub fn stats(mut self, stats: ExtractionStats) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Attach the raw provider payload.
    pub fn raw_response(mut self, raw: serde_json::Value) -> Self {
        self.raw_response = raw;
        self
    }

    /// Validate row widths and build the dataset.
    pub fn build(self) -> Result<TestDataset, DatasetError> {
        let columns: Vec<String> = self
            .dimensions
            .iter()
            .chain(&self.metrics)
            .chain(&self.tracepoints)
            .cloned()
            .collect();

        for (index, row) in self.rows.iter().chain(&self.excluded_rows).enumerate() {
            if row.len() != columns.len() {
                return Err(DatasetError::RowWidth {
                    index,
                    expected: columns.len(),
                    actual: row.len(),
                });
            }
        }

        let stats = self.stats.unwrap_or(ExtractionStats {
            total_items: self.rows.len() + self.excluded_rows.len(),
            extracted: self.rows.len() + self.excluded_rows.len(),
            included: self.rows.len(),
            excluded: self.excluded_rows.len(),
            ..ExtractionStats::default()
        });

        Ok(TestDataset {
            columns,
            dimensions: self.dimensions,
            metrics: self.metrics,
            tracepoints: self.tracepoints,
            rows: self.rows,
            excluded_rows: self.excluded_rows,
            provenance: self.provenance,
            stats,
            raw_response: self.raw_response,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TestDataset {
        TestDataset::builder()
            .dimensions(["test", "host"])
            .metrics(["dns_ms"])
            .tracepoints(["x_es_info"])
            .row(vec!["t1".into(), "a".into(), Value::Int(5), Value::Null])
            .row(vec!["t1".into(), "b".into(), Value::Int(9), "[a=1]".into()])
            .excluded_row(vec!["t2".into(), "a".into(), Value::Int(4000), Value::Null])
            .build()
            .unwrap()
    }

    #[test]
    fn test_columns_follow_kind_order() {
        let dataset = sample();
        assert_eq!(dataset.columns(), ["test", "host", "dns_ms", "x_es_info"]);
        assert_eq!(
            dataset.columns().len(),
            dataset.dimensions().len() + dataset.metrics().len() + dataset.tracepoints().len()
        );
        assert_eq!(dataset.column_kind("host"), Some(ColumnKind::Dimension));
        assert_eq!(dataset.column_kind("dns_ms"), Some(ColumnKind::Metric));
        assert_eq!(dataset.column_kind("x_es_info"), Some(ColumnKind::Tracepoint));
        assert_eq!(dataset.column_kind("nope"), None);
        assert_eq!(dataset.kind_at(3), ColumnKind::Tracepoint);
    }

    #[test]
    fn test_default_stats_from_rows() {
        let stats = *sample().stats();
        assert_eq!(stats.included, 2);
        assert_eq!(stats.excluded, 1);
        assert_eq!(stats.extracted, 3);
    }

    #[test]
    fn test_row_width_is_checked() {
        let err = TestDataset::builder()
            .dimensions(["test"])
            .metrics(["dns_ms"])
            .row(vec!["t1".into()])
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            DatasetError::RowWidth {
                index: 0,
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn test_excluded_row_width_is_checked() {
        let result = TestDataset::builder()
            .dimensions(["test"])
            .excluded_row(vec!["t1".into(), Value::Int(1)])
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_records() {
        let records = sample().records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[&1]["host"], Value::from("b"));
        assert_eq!(records[&0]["x_es_info"], Value::Null);
    }
}
