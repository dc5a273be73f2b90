//! Flatten a test-data explorer response into a [`TestDataset`].
//!
//! The explorer nests everything under `data.responseItems[0]`: header
//! lists for dimensions, metrics and tracepoints, then one item per data
//! point. Each item becomes a row, classified as normal, outlier or error
//! and routed to the included or excluded set.

use serde::Deserialize;
use tracing::{debug, warn};

use cpwatch_types::{ExtractionStats, Provenance, TestDataset, Value};

use crate::AdapterError;

/// Metric values at or above this are outliers unless configured otherwise.
pub const DEFAULT_OUTLIER_THRESHOLD: f64 = 2999.99;

/// Fraction of the outlier threshold above which a value is a potential outlier.
pub const POTENTIAL_OUTLIER_RATIO: f64 = 0.6;

/// Failure counters that read as `0` when the provider sends no value.
pub const FAILURE_COUNT_METRICS: [&str; 4] = [
    "cnt_connection_failures",
    "cnt_ssl_failures",
    "cnt_response_failures",
    "cnt_timeout_failures",
];

// Provider emits "availibility"; keep the correct spelling too.
const AVAILABILITY_SUFFIXES: [&str; 2] = ["availibility", "availability"];

/// Row inclusion policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractOptions {
    /// Keep outlier rows in the dataset.
    pub include_outliers: bool,
    /// Values at or above this mark a row as an outlier.
    pub outlier_threshold: f64,
    /// Keep error rows in the dataset.
    pub include_errors: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            include_outliers: true,
            outlier_threshold: DEFAULT_OUTLIER_THRESHOLD,
            include_errors: true,
        }
    }
}

/// Lower-case a dimension name.
pub fn normalize_dimension_name(name: &str) -> String {
    name.to_lowercase()
}

/// Turn a provider metric label into a column name.
///
/// `"DNS (ms)"` becomes `dns_ms`, `"# Connection Failures"` becomes
/// `cnt_connection_failures` and `"Time To First Byte (ms)"` becomes
/// `ttfb_ms`. Applying it twice changes nothing.
pub fn normalize_metric_name(name: &str) -> String {
    name.to_lowercase()
        .replace(' ', "_")
        .replace('%', "pct")
        .replace(['(', ')'], "")
        .replace('#', "cnt")
        .replace("time_to_first_byte_ms", "ttfb_ms")
}

/// Turn a tracepoint (response header) name into a column name.
pub fn normalize_tracepoint_name(name: &str) -> String {
    name.replace('-', "_").to_lowercase()
}

/// How a row is classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowClass {
    Normal,
    Outlier,
    Error,
}

impl RowClass {
    /// Whether a row of this class is kept under `options`.
    pub fn is_included(&self, options: &ExtractOptions) -> bool {
        match self {
            RowClass::Normal => true,
            RowClass::Outlier => options.include_outliers,
            RowClass::Error => options.include_errors,
        }
    }
}

/// Outcome of classifying one row's metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowAssessment {
    pub class: RowClass,
    /// At least one metric is null.
    pub has_null: bool,
    /// Values within the potential-outlier band, counted before any outlier.
    pub potential_outliers: usize,
}

/// Coerce raw metric values to integers.
///
/// Numbers are truncated. Anything else is null, except for the failure
/// counters, which become `0`.
pub fn coerce_metrics(names: &[String], raw: &[serde_json::Value]) -> Vec<Option<i64>> {
    names
        .iter()
        .zip(raw)
        .map(|(name, value)| match value {
            serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            _ if FAILURE_COUNT_METRICS.contains(&name.as_str()) => Some(0),
            _ => None,
        })
        .collect()
}

/// Classify a row from its normalized metric names and coerced values.
///
/// Rows with a null metric skip the outlier check. Outliers skip the error
/// check. An availability metric below 100 is an expected failure state and
/// clears the error flag; otherwise any `*failures` counter above zero
/// makes the row an error. Nulls never trigger either flag.
pub fn assess_row(names: &[String], values: &[Option<i64>], threshold: f64) -> RowAssessment {
    let has_null = values.iter().any(Option::is_none);
    let mut potential_outliers = 0;
    let mut outlier = false;

    if !has_null {
        for v in values.iter().flatten() {
            let v = *v as f64;
            if v >= threshold {
                outlier = true;
                break;
            }
            if v >= threshold * POTENTIAL_OUTLIER_RATIO {
                potential_outliers += 1;
            }
        }
    }

    let class = if outlier {
        RowClass::Outlier
    } else {
        let valid_error = names.iter().zip(values).any(|(name, v)| {
            AVAILABILITY_SUFFIXES.iter().any(|s| name.ends_with(s)) && matches!(v, Some(v) if *v < 100)
        });
        let failed = names
            .iter()
            .zip(values)
            .any(|(name, v)| name.ends_with("failures") && matches!(v, Some(v) if *v > 0));
        if failed && !valid_error {
            RowClass::Error
        } else {
            RowClass::Normal
        }
    };

    RowAssessment {
        class,
        has_null,
        potential_outliers,
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    data: EnvelopeData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnvelopeData {
    response_items: Vec<ResponseBlock>,
}

#[derive(Debug, Deserialize)]
struct ResponseBlock {
    dimensions: Vec<HeaderName>,
    metrics: Vec<HeaderName>,
    #[serde(default)]
    tracepoints: Option<Vec<HeaderName>>,
    items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct HeaderName {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Item {
    dimensions: Vec<ItemDimension>,
    values: Vec<serde_json::Value>,
    #[serde(default)]
    tracepoints: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct ItemDimension {
    name: serde_json::Value,
}

fn dimension_value(raw: &serde_json::Value) -> Value {
    match raw {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::String(s) => Value::Text(s.clone()),
        other => Value::Text(other.to_string()),
    }
}

/// Extract a dataset from a raw explorer response.
///
/// Missing tracepoint headers are tolerated. Any other structural problem,
/// including an item whose dimension or value count disagrees with the
/// headers, is reported as [`AdapterError::Malformed`].
pub fn extract(
    response: serde_json::Value,
    options: &ExtractOptions,
    provenance: Provenance,
) -> Result<TestDataset, AdapterError> {
    let envelope =
        Envelope::deserialize(&response).map_err(|e| AdapterError::Malformed(e.to_string()))?;
    let block = envelope
        .data
        .response_items
        .into_iter()
        .next()
        .ok_or_else(|| AdapterError::Malformed("data.responseItems is empty".to_string()))?;

    let dimensions: Vec<String> = block
        .dimensions
        .iter()
        .map(|d| normalize_dimension_name(&d.name))
        .collect();
    let metrics: Vec<String> = block
        .metrics
        .iter()
        .map(|m| normalize_metric_name(&m.name))
        .collect();
    let tracepoints: Vec<String> = match &block.tracepoints {
        Some(headers) => headers
            .iter()
            .map(|t| normalize_tracepoint_name(&t.name))
            .collect(),
        None => {
            warn!("no tracepoints in response data");
            Vec::new()
        }
    };
    debug!(?dimensions, ?metrics, ?tracepoints, "response columns");

    let mut stats = ExtractionStats {
        total_items: block.items.len(),
        ..ExtractionStats::default()
    };
    let mut rows = Vec::new();
    let mut excluded = Vec::new();

    for (index, item) in block.items.iter().enumerate() {
        if item.dimensions.len() != dimensions.len() {
            return Err(AdapterError::Malformed(format!(
                "item {} has {} dimension values, expected {}",
                index,
                item.dimensions.len(),
                dimensions.len()
            )));
        }
        if item.values.len() != metrics.len() {
            return Err(AdapterError::Malformed(format!(
                "item {} has {} metric values, expected {}",
                index,
                item.values.len(),
                metrics.len()
            )));
        }

        let item_tracepoints = item.tracepoints.as_deref().unwrap_or_default();
        let header_values: Vec<Value> = if tracepoints.is_empty() {
            Vec::new()
        } else if item_tracepoints.is_empty() {
            vec![Value::Null; tracepoints.len()]
        } else if item_tracepoints.len() == tracepoints.len() {
            item_tracepoints.iter().map(Value::from_json).collect()
        } else {
            return Err(AdapterError::Malformed(format!(
                "item {} has {} tracepoint values, expected {}",
                index,
                item_tracepoints.len(),
                tracepoints.len()
            )));
        };

        let metric_values = coerce_metrics(&metrics, &item.values);
        let assessment = assess_row(&metrics, &metric_values, options.outlier_threshold);

        if assessment.has_null {
            stats.null_rows += 1;
            debug!(row = index, values = ?metric_values, "row has null metric values");
        }
        stats.potential_outliers += assessment.potential_outliers;
        match assessment.class {
            RowClass::Outlier => stats.outliers += 1,
            RowClass::Error => stats.errors += 1,
            RowClass::Normal => {}
        }

        let row: Vec<Value> = item
            .dimensions
            .iter()
            .map(|d| dimension_value(&d.name))
            .chain(metric_values.into_iter().map(Value::from))
            .chain(header_values)
            .collect();

        if assessment.class.is_included(options) {
            rows.push(row);
        } else {
            excluded.push(row);
        }
    }

    stats.included = rows.len();
    stats.excluded = excluded.len();
    stats.extracted = stats.included + stats.excluded;

    debug!(
        expected = stats.total_items,
        extracted = stats.extracted,
        excluded = stats.excluded,
        outliers = stats.outliers,
        include_outliers = options.include_outliers,
        errors = stats.errors,
        include_errors = options.include_errors,
        potential_outliers = stats.potential_outliers,
        null_rows = stats.null_rows,
        "extracted test data"
    );

    Ok(TestDataset::builder()
        .dimensions(dimensions)
        .metrics(metrics)
        .tracepoints(tracepoints)
        .rows(rows)
        .excluded_rows(excluded)
        .provenance(provenance)
        .stats(stats)
        .raw_response(response)
        .build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn response(values: serde_json::Value) -> serde_json::Value {
        json!({
            "data": {
                "responseItems": [{
                    "dimensions": [{"name": "Test"}, {"name": "Country"}],
                    "metrics": [
                        {"name": "DNS (ms)"},
                        {"name": "Availability"},
                        {"name": "# Connection Failures"}
                    ],
                    "tracepoints": [{"index": 0, "name": "X-ES-Info"}],
                    "items": values
                }]
            }
        })
    }

    fn item(test: &str, values: serde_json::Value) -> serde_json::Value {
        json!({
            "dimensions": [{"name": test}, {"name": "Japan"}],
            "values": values,
            "tracepoints": ["[a=1,l=Tokyo]"]
        })
    }

    #[test]
    fn test_normalize_metric_name() {
        assert_eq!(normalize_metric_name("DNS (ms)"), "dns_ms");
        assert_eq!(normalize_metric_name("# SSL Failures"), "cnt_ssl_failures");
        assert_eq!(normalize_metric_name("Time To First Byte (ms)"), "ttfb_ms");
        assert_eq!(normalize_metric_name("Availability %"), "availability_pct");
    }

    #[test]
    fn test_normalization_is_idempotent() {
        for raw in ["DNS (ms)", "# Timeout Failures", "Time To First Byte (ms)", "% Up"] {
            let once = normalize_metric_name(raw);
            assert_eq!(normalize_metric_name(&once), once);
        }
        let once = normalize_tracepoint_name("Akamai-Request-BC");
        assert_eq!(once, "akamai_request_bc");
        assert_eq!(normalize_tracepoint_name(&once), once);
    }

    #[test]
    fn test_failure_counters_never_null() {
        let metrics = names(&["dns_ms", "cnt_ssl_failures", "cnt_timeout_failures"]);
        let values = coerce_metrics(&metrics, &[json!(null), json!(null), json!("n/a")]);
        assert_eq!(values, vec![None, Some(0), Some(0)]);
    }

    #[test]
    fn test_coerce_truncates_floats() {
        let metrics = names(&["dns_ms", "connect_ms"]);
        let values = coerce_metrics(&metrics, &[json!(12.9), json!(true)]);
        assert_eq!(values, vec![Some(12), None]);
    }

    #[test]
    fn test_availability_and_failures() {
        let metrics = names(&["availability", "cnt_connection_failures"]);
        let assess = |v: [i64; 2]| assess_row(&metrics, &[Some(v[0]), Some(v[1])], 2999.99).class;

        assert_eq!(assess([100, 0]), RowClass::Normal);
        assert_eq!(assess([95, 1]), RowClass::Normal);
        assert_eq!(assess([100, 1]), RowClass::Error);
    }

    #[test]
    fn test_classification_ignores_metric_order() {
        let forward = names(&["availibility", "cnt_ssl_failures"]);
        let reverse = names(&["cnt_ssl_failures", "availibility"]);
        let a = assess_row(&forward, &[Some(95), Some(2)], 2999.99);
        let b = assess_row(&reverse, &[Some(2), Some(95)], 2999.99);
        assert_eq!(a.class, RowClass::Normal);
        assert_eq!(a.class, b.class);
    }

    #[test]
    fn test_outlier_threshold() {
        let metrics = names(&["dns_ms", "connect_ms", "wait_ms"]);
        let result = assess_row(&metrics, &[Some(1900), Some(3500), Some(2500)], 2999.99);
        assert_eq!(result.class, RowClass::Outlier);
        // only values seen before the outlier count
        assert_eq!(result.potential_outliers, 1);
    }

    #[test]
    fn test_null_rows_skip_outlier_check() {
        let metrics = names(&["dns_ms", "connect_ms"]);
        let result = assess_row(&metrics, &[None, Some(5000)], 2999.99);
        assert!(result.has_null);
        assert_eq!(result.class, RowClass::Normal);
    }

    #[test]
    fn test_extract_builds_columns_and_rows() {
        let raw = response(json!([
            item("home", json!([10, 100, 0])),
            item("cart", json!([20, 100, null])),
        ]));
        let dataset = extract(raw.clone(), &ExtractOptions::default(), Provenance::default()).unwrap();

        assert_eq!(
            dataset.columns(),
            ["test", "country", "dns_ms", "availability", "cnt_connection_failures", "x_es_info"]
        );
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.rows()[1][4], Value::Int(0));
        assert_eq!(dataset.rows()[0][5], Value::from("[a=1,l=Tokyo]"));
        assert_eq!(dataset.raw_response(), &raw);
        assert_eq!(dataset.stats().total_items, 2);
    }

    #[test]
    fn test_extract_routes_errors_and_outliers() {
        let items = json!([
            item("ok", json!([10, 100, 0])),
            item("err", json!([10, 100, 1])),
            item("slow", json!([3500, 100, 0])),
            item("down", json!([10, 95, 1])),
        ]);

        let all = extract(response(items.clone()), &ExtractOptions::default(), Provenance::default())
            .unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(all.stats().errors, 1);
        assert_eq!(all.stats().outliers, 1);

        let options = ExtractOptions {
            include_outliers: false,
            include_errors: false,
            ..ExtractOptions::default()
        };
        let strict = extract(response(items), &options, Provenance::default()).unwrap();
        assert_eq!(strict.len(), 2);
        assert_eq!(strict.excluded_rows().len(), 2);
        assert_eq!(strict.excluded_rows()[0][0], Value::from("err"));
        assert_eq!(strict.excluded_rows()[1][0], Value::from("slow"));
        let stats = strict.stats();
        assert_eq!(stats.extracted, stats.included + stats.excluded);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.outliers, 1);
    }

    #[test]
    fn test_extract_counts_null_rows() {
        let raw = response(json!([item("home", json!([null, 100, 0]))]));
        let dataset = extract(raw, &ExtractOptions::default(), Provenance::default()).unwrap();
        assert_eq!(dataset.stats().null_rows, 1);
        assert_eq!(dataset.rows()[0][2], Value::Null);
    }

    #[test]
    fn test_extract_without_tracepoints() {
        let raw = json!({
            "data": {"responseItems": [{
                "dimensions": [{"name": "Test"}],
                "metrics": [{"name": "DNS (ms)"}],
                "items": [{"dimensions": [{"name": 42}], "values": [7]}]
            }]}
        });
        let dataset = extract(raw, &ExtractOptions::default(), Provenance::default()).unwrap();
        assert!(dataset.tracepoints().is_empty());
        assert_eq!(dataset.rows()[0], vec![Value::from("42"), Value::Int(7)]);
    }

    #[test]
    fn test_extract_missing_tracepoint_values_are_null() {
        let raw = response(json!([{
            "dimensions": [{"name": "home"}, {"name": "Japan"}],
            "values": [1, 100, 0]
        }]));
        let dataset = extract(raw, &ExtractOptions::default(), Provenance::default()).unwrap();
        assert_eq!(dataset.rows()[0][5], Value::Null);
    }

    #[test]
    fn test_extract_rejects_malformed_items() {
        let short = response(json!([item("home", json!([1, 100]))]));
        let err = extract(short, &ExtractOptions::default(), Provenance::default()).unwrap_err();
        assert!(matches!(err, AdapterError::Malformed(_)));
        assert_eq!(err.status(), Some(0));

        let missing = json!({"data": {"responseItems": []}});
        assert!(extract(missing, &ExtractOptions::default(), Provenance::default()).is_err());

        let wrong = json!({"data": {}});
        assert!(matches!(
            extract(wrong, &ExtractOptions::default(), Provenance::default()),
            Err(AdapterError::Malformed(_))
        ));
    }

    #[test]
    fn test_extract_keeps_provenance() {
        let provenance = Provenance {
            test_ids: vec!["123".into()],
            start_time: "2024-01-01T00:00:00".into(),
            end_time: "2024-01-01T01:00:00".into(),
            ..Provenance::default()
        };
        let raw = response(json!([]));
        let dataset = extract(raw, &ExtractOptions::default(), provenance.clone()).unwrap();
        assert!(dataset.is_empty());
        assert_eq!(dataset.provenance(), &provenance);
    }
}
