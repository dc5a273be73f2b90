//! Grouped statistics over query results.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::query::{quote_ident, QueryError, QueryTable, TABLE_NAME};
use crate::{ArgumentError, TestDataset, Value};

/// Reduction applied to each group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Stat {
    #[default]
    P95,
    P75,
    P50,
    Mean,
    Median,
}

impl Stat {
    /// Lower-case name.
    pub fn name(&self) -> &'static str {
        match self {
            Stat::P95 => "p95",
            Stat::P75 => "p75",
            Stat::P50 => "p50",
            Stat::Mean => "mean",
            Stat::Median => "median",
        }
    }

    /// Reduce a set of values. Returns `None` for an empty set.
    pub fn apply(&self, values: &[f64]) -> Option<f64> {
        match self {
            Stat::P95 => percentile(values, 0.95),
            Stat::P75 => percentile(values, 0.75),
            Stat::P50 | Stat::Median => percentile(values, 0.5),
            Stat::Mean => mean(values),
        }
    }
}

impl fmt::Display for Stat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Stat {
    type Err = ArgumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "p95" => Ok(Stat::P95),
            "p75" => Ok(Stat::P75),
            "p50" => Ok(Stat::P50),
            "mean" => Ok(Stat::Mean),
            "median" => Ok(Stat::Median),
            _ => Err(ArgumentError::UnknownStat(s.to_string())),
        }
    }
}

/// Percentile with linear interpolation between closest ranks.
///
/// `q` is clamped to `[0, 1]`. NaN values are ignored.
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));

    let q = q.clamp(0.0, 1.0);
    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

fn mean(values: &[f64]) -> Option<f64> {
    let kept: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if kept.is_empty() {
        return None;
    }
    Some(kept.iter().sum::<f64>() / kept.len() as f64)
}

/// Why a summary could not be produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SummaryError {
    /// `group_by` is not one of the dataset's dimensions.
    #[error("No such dimension {0}")]
    UnknownDimension(String),

    /// The query result does not contain the grouping column.
    #[error("Query result has no column {0}")]
    MissingColumn(String),

    /// The underlying query failed or matched nothing.
    #[error(transparent)]
    Query(#[from] QueryError),
}

/// One statistic per group and numeric column.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryTable {
    /// Grouping column name.
    pub group_by: String,
    /// Statistic that produced the values.
    pub stat: Stat,
    /// Reduced column names.
    pub columns: Vec<String>,
    /// Group key and one value per reduced column, sorted by key.
    pub rows: Vec<(Value, Vec<Option<f64>>)>,
}

impl SummaryTable {
    /// Number of groups.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if there are no groups.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Value for one group and column.
    pub fn get(&self, group: &str, column: &str) -> Option<f64> {
        let index = self.columns.iter().position(|c| c == column)?;
        self.rows
            .iter()
            .find(|(key, _)| key.to_string() == group)
            .and_then(|(_, values)| values.get(index).copied().flatten())
    }

    /// Flatten into a table whose first column is the group key.
    pub fn to_table(&self) -> QueryTable {
        let columns = std::iter::once(self.group_by.clone())
            .chain(self.columns.iter().cloned())
            .collect();
        let rows = self
            .rows
            .iter()
            .map(|(key, values)| {
                std::iter::once(key.clone())
                    .chain(values.iter().map(|v| Value::from(*v)))
                    .collect()
            })
            .collect();
        QueryTable { columns, rows }
    }

    /// Groups as CSV text.
    pub fn to_csv(&self) -> Result<String, crate::RenderError> {
        self.to_table().to_csv()
    }

    /// Groups as an HTML table.
    pub fn to_html(&self) -> String {
        self.to_table().to_html()
    }
}

impl fmt::Display for SummaryTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.to_table().fmt(f)
    }
}

impl QueryTable {
    /// Group rows by `group_by` and reduce every numeric column with `stat`.
    ///
    /// Rows whose group key is null are dropped. A column is numeric when
    /// it holds at least one value and all of its values are integers or
    /// floats; nulls are skipped.
    pub fn summarize(&self, stat: Stat, group_by: &str) -> Result<SummaryTable, SummaryError> {
        let key_index = self
            .column_index(group_by)
            .ok_or_else(|| SummaryError::MissingColumn(group_by.to_string()))?;

        let numeric: Vec<usize> = (0..self.columns.len())
            .filter(|&i| i != key_index && self.is_numeric_column(i))
            .collect();

        let mut groups: Vec<(Value, Vec<Vec<f64>>)> = Vec::new();
        for row in &self.rows {
            let key = match row.get(key_index) {
                Some(Value::Null) | None => continue,
                Some(key) => key,
            };
            let slot = match groups.iter().position(|(k, _)| k == key) {
                Some(pos) => pos,
                None => {
                    groups.push((key.clone(), vec![Vec::new(); numeric.len()]));
                    groups.len() - 1
                }
            };
            for (j, &col) in numeric.iter().enumerate() {
                if let Some(v) = row.get(col).and_then(Value::as_f64) {
                    groups[slot].1[j].push(v);
                }
            }
        }
        groups.sort_by(|a, b| compare_keys(&a.0, &b.0));

        let rows = groups
            .into_iter()
            .map(|(key, samples)| (key, samples.iter().map(|s| stat.apply(s)).collect()))
            .collect();

        Ok(SummaryTable {
            group_by: group_by.to_string(),
            stat,
            columns: numeric.iter().map(|&i| self.columns[i].clone()).collect(),
            rows,
        })
    }

    fn is_numeric_column(&self, index: usize) -> bool {
        let mut seen = false;
        for row in &self.rows {
            match row.get(index) {
                Some(Value::Null) | None => {}
                Some(v) if v.is_numeric() => seen = true,
                Some(_) => return false,
            }
        }
        seen
    }
}

/// Numbers sort before text; numbers by value, text lexicographically.
fn compare_keys(a: &Value, b: &Value) -> Ordering {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.to_string().cmp(&b.to_string()),
    }
}

impl TestDataset {
    /// Group the data by a dimension and reduce each numeric column.
    ///
    /// Without `sql`, every metric is summarized. With `sql`, the query
    /// result is summarized and must include the `group_by` column.
    ///
    /// # Example
    ///
    /// ```rust
    /// use cpwatch_types::{Stat, TestDataset, Value};
    ///
    /// let dataset = TestDataset::builder()
    ///     .dimensions(["test"])
    ///     .metrics(["dns_ms"])
    ///     .row(vec!["home".into(), Value::Int(10)])
    ///     .row(vec!["home".into(), Value::Int(20)])
    ///     .row(vec!["cart".into(), Value::Int(5)])
    ///     .build()
    ///     .unwrap();
    ///
    /// let summary = dataset.summary(None, Stat::Mean, "test").unwrap();
    /// assert_eq!(summary.get("home", "dns_ms"), Some(15.0));
    /// assert_eq!(summary.get("cart", "dns_ms"), Some(5.0));
    /// ```
    pub fn summary(
        &self,
        sql: Option<&str>,
        stat: Stat,
        group_by: &str,
    ) -> Result<SummaryTable, SummaryError> {
        if !self.dimensions().iter().any(|d| d == group_by) {
            return Err(SummaryError::UnknownDimension(group_by.to_string()));
        }

        let table = match sql {
            Some(sql) => self.query(sql)?,
            None => {
                let columns: Vec<String> = std::iter::once(group_by)
                    .chain(self.metrics().iter().map(String::as_str))
                    .map(quote_ident)
                    .collect();
                let sql = format!("SELECT {} FROM {}", columns.join(", "), TABLE_NAME);
                self.query(&sql)?
            }
        };

        table.summarize(stat, group_by)
    }
}

/// Counts of rows per group, handy for sanity-checking a summary.
pub fn group_counts(table: &QueryTable, group_by: &str) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    if let Some(index) = table.column_index(group_by) {
        for row in &table.rows {
            if let Some(key) = row.get(index).filter(|v| !v.is_null()) {
                *counts.entry(key.to_string()).or_insert(0) += 1;
            }
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TestDataset {
        TestDataset::builder()
            .dimensions(["test", "country"])
            .metrics(["dns_ms", "connect_ms"])
            .tracepoints(["x_es_info"])
            .row(vec!["home".into(), "Japan".into(), Value::Int(10), Value::Int(100), Value::Null])
            .row(vec!["home".into(), "France".into(), Value::Int(20), Value::Null, Value::Null])
            .row(vec!["home".into(), "Japan".into(), Value::Int(30), Value::Int(300), Value::Null])
            .row(vec!["cart".into(), "Japan".into(), Value::Int(5), Value::Int(50), "[a=1]".into()])
            .row(vec![Value::Null, "Japan".into(), Value::Int(999), Value::Int(999), Value::Null])
            .build()
            .unwrap()
    }

    #[test]
    fn test_percentile_interpolates() {
        let values = [10.0, 20.0, 30.0, 40.0];
        assert_eq!(percentile(&values, 0.5), Some(25.0));
        assert_eq!(percentile(&values, 0.0), Some(10.0));
        assert_eq!(percentile(&values, 1.0), Some(40.0));
        let p95 = percentile(&values, 0.95).unwrap();
        assert!((p95 - 38.5).abs() < 1e-9);
        assert_eq!(percentile(&[], 0.5), None);
        assert_eq!(percentile(&[7.0], 0.95), Some(7.0));
    }

    #[test]
    fn test_stat_parse() {
        assert_eq!("P95".parse::<Stat>().unwrap(), Stat::P95);
        assert_eq!("median".parse::<Stat>().unwrap(), Stat::Median);
        let err = "p99".parse::<Stat>().unwrap_err();
        assert_eq!(err, ArgumentError::UnknownStat("p99".into()));
        assert_eq!(err.to_string(), "Unsupported stat p99");
    }

    #[test]
    fn test_summary_default_query() {
        let summary = sample().summary(None, Stat::Mean, "test").unwrap();
        assert_eq!(summary.columns, ["dns_ms", "connect_ms"]);
        // null group key dropped, groups sorted
        let keys: Vec<String> = summary.rows.iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(keys, ["cart", "home"]);
        assert_eq!(summary.get("home", "dns_ms"), Some(20.0));
        // nulls skipped within a column
        assert_eq!(summary.get("home", "connect_ms"), Some(200.0));
    }

    #[test]
    fn test_summary_with_sql_filter() {
        let summary = sample()
            .summary(
                Some("SELECT country, dns_ms FROM data WHERE test = 'home'"),
                Stat::P50,
                "country",
            )
            .unwrap();
        assert_eq!(summary.get("Japan", "dns_ms"), Some(20.0));
        assert_eq!(summary.get("France", "dns_ms"), Some(20.0));
        assert_eq!(summary.len(), 2);
    }

    #[test]
    fn test_summary_skips_non_numeric_columns() {
        let summary = sample()
            .summary(Some("SELECT test, country, dns_ms FROM data"), Stat::P95, "test")
            .unwrap();
        assert_eq!(summary.columns, ["dns_ms"]);
    }

    #[test]
    fn test_summary_unknown_dimension_checked_first() {
        let err = sample()
            .summary(Some("not even sql"), Stat::P95, "dns_ms")
            .unwrap_err();
        assert_eq!(err, SummaryError::UnknownDimension("dns_ms".into()));
        assert_eq!(err.to_string(), "No such dimension dns_ms");
    }

    #[test]
    fn test_summary_propagates_no_rows() {
        let err = sample()
            .summary(Some("SELECT test, dns_ms FROM data WHERE 0"), Stat::P95, "test")
            .unwrap_err();
        assert_eq!(err, SummaryError::Query(QueryError::NoRows));
    }

    #[test]
    fn test_summary_missing_group_column() {
        let err = sample()
            .summary(Some("SELECT dns_ms FROM data"), Stat::P95, "test")
            .unwrap_err();
        assert_eq!(err, SummaryError::MissingColumn("test".into()));
    }

    #[test]
    fn test_summary_display_and_csv() {
        let summary = sample().summary(None, Stat::Mean, "test").unwrap();
        let csv = summary.to_csv().unwrap();
        assert_eq!(csv.lines().next(), Some("test,dns_ms,connect_ms"));
        assert_eq!(csv.lines().nth(1), Some("cart,5,50"));
        assert!(summary.to_string().starts_with("test"));
    }

    #[test]
    fn test_group_counts() {
        let table = sample().query("SELECT test FROM data").unwrap();
        let counts = group_counts(&table, "test");
        assert_eq!(counts["home"], 3);
        assert_eq!(counts["cart"], 1);
        assert_eq!(counts.len(), 2);
    }
}
