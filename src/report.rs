//! JSON export of a dataset and its optional summary.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::Result;
use serde_json::{json, Map, Value as Json};

use cpwatch_types::{ExtractionStats, SummaryTable, TestDataset, Value};

/// Build the export document.
///
/// Rows are written as objects keyed by column name; only the count of
/// excluded rows is kept.
pub fn build_report(dataset: &TestDataset, summary: Option<&SummaryTable>) -> Result<Json> {
    let mut export = Map::new();

    export.insert("stats".to_string(), stats_json(dataset.stats()));
    export.insert(
        "provenance".to_string(),
        serde_json::to_value(dataset.provenance())?,
    );
    export.insert("columns".to_string(), json!(dataset.columns()));

    let records: Vec<Json> = dataset
        .rows()
        .iter()
        .map(|row| row_json(dataset.columns(), row))
        .collect();
    export.insert("records".to_string(), Json::Array(records));
    export.insert(
        "excluded_rows".to_string(),
        json!(dataset.excluded_rows().len()),
    );

    if let Some(summary) = summary {
        let groups: Vec<Json> = summary
            .rows
            .iter()
            .map(|(key, values)| {
                let mut group = Map::new();
                group.insert(summary.group_by.clone(), key.to_json());
                for (column, value) in summary.columns.iter().zip(values) {
                    group.insert(column.clone(), json!(value));
                }
                Json::Object(group)
            })
            .collect();
        export.insert(
            "summary".to_string(),
            json!({
                "stat": summary.stat.name(),
                "group_by": summary.group_by,
                "groups": groups,
            }),
        );
    }

    Ok(Json::Object(export))
}

fn stats_json(stats: &ExtractionStats) -> Json {
    json!({
        "total_items": stats.total_items,
        "extracted": stats.extracted,
        "included": stats.included,
        "excluded": stats.excluded,
        "outliers": stats.outliers,
        "errors": stats.errors,
        "null_rows": stats.null_rows,
        "potential_outliers": stats.potential_outliers,
    })
}

fn row_json(columns: &[String], row: &[Value]) -> Json {
    Json::Object(
        columns
            .iter()
            .zip(row)
            .map(|(column, value)| (column.clone(), value.to_json()))
            .collect(),
    )
}

/// Write the export document to `path` as pretty JSON.
pub fn export_to_file(
    dataset: &TestDataset,
    summary: Option<&SummaryTable>,
    path: &Path,
) -> Result<()> {
    let report = build_report(dataset, summary)?;
    let json = serde_json::to_string_pretty(&report)?;
    let mut file = File::create(path)?;
    file.write_all(json.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpwatch_types::{Provenance, Stat};

    fn dataset() -> TestDataset {
        TestDataset::builder()
            .dimensions(["test", "country"])
            .metrics(["dns_ms"])
            .row(vec!["home".into(), "Japan".into(), Value::Int(10)])
            .row(vec!["home".into(), "Japan".into(), Value::Int(30)])
            .row(vec!["cart".into(), "France".into(), Value::Null])
            .excluded_row(vec!["home".into(), "France".into(), Value::Int(9000)])
            .provenance(Provenance {
                test_ids: vec!["101".into()],
                ..Provenance::default()
            })
            .build()
            .unwrap()
    }

    #[test]
    fn test_report_without_summary() {
        let report = build_report(&dataset(), None).unwrap();

        assert_eq!(report["columns"], json!(["test", "country", "dns_ms"]));
        assert_eq!(report["records"].as_array().unwrap().len(), 3);
        assert_eq!(report["records"][0]["dns_ms"], json!(10));
        assert_eq!(report["records"][2]["dns_ms"], Json::Null);
        assert_eq!(report["excluded_rows"], json!(1));
        assert_eq!(report["provenance"]["test_ids"], json!(["101"]));
        assert!(report.get("summary").is_none());
    }

    #[test]
    fn test_report_with_summary() {
        let data = dataset();
        let summary = data.summary(None, Stat::Mean, "test").unwrap();
        let report = build_report(&data, Some(&summary)).unwrap();

        let groups = report["summary"]["groups"].as_array().unwrap();
        assert_eq!(report["summary"]["stat"], "mean");
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[1]["test"], "home");
        assert_eq!(groups[1]["dns_ms"], json!(20.0));
    }

    #[test]
    fn test_export_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");

        export_to_file(&dataset(), None, &path).unwrap();

        let written: Json =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["stats"]["included"], json!(3));
        assert_eq!(written["stats"]["excluded"], json!(1));
        assert_eq!(written["stats"]["extracted"], json!(4));
        assert_eq!(written["records"][1]["country"], "Japan");
    }
}
