//! Expansion of CDN debug headers into typed columns.
//!
//! Some tracepoints capture response headers that pack several fields into
//! one bracketed list, e.g. `[a=1.2.3.4,c=g,n=US,o=20940]`. Each known
//! header has a fixed table mapping its one-letter keys to column names.

use tracing::debug;

use cpwatch_types::{DatasetError, TestDataset, Value};

/// How a breadcrumb field is typed once extracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Int,
    Float,
}

/// One key of a breadcrumb header.
#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub key: &'static str,
    pub column: &'static str,
    pub kind: FieldType,
}

const fn field(key: &'static str, column: &'static str, kind: FieldType) -> Field {
    Field { key, column, kind }
}

/// `Akamai-Request-BC` breadcrumbs.
pub const AKAMAI_REQUEST_BC: &[Field] = &[
    field("a", "component_ip", FieldType::Text),
    field("b", "req_id", FieldType::Int),
    field("c", "component_letter", FieldType::Text),
    field("n", "component_location", FieldType::Text),
    field("o", "component_asn", FieldType::Int),
];

/// `X-Aka-Info` edge details.
pub const X_AKA_INFO: &[Field] = &[
    field("i", "ak_connected_client_ip", FieldType::Text),
    field("b", "ak_eip_forwarder_ip", FieldType::Text),
    field("g", "ak_ghost_service_ip", FieldType::Text),
    field("p", "ak_client_request_number", FieldType::Int),
    field("r", "ak_region", FieldType::Int),
    field("t", "ak_client_rtt", FieldType::Int),
];

/// `X-ES-Info` client geolocation.
pub const X_ES_INFO: &[Field] = &[
    field("a", "client_asnum", FieldType::Int),
    field("l", "client_city", FieldType::Text),
    field("c", "client_country_code", FieldType::Text),
    field("x", "client_lat", FieldType::Float),
    field("y", "client_long", FieldType::Float),
];

/// Key table for a tracepoint column, if it holds breadcrumbs.
pub fn fields_for(column: &str) -> Option<&'static [Field]> {
    match column {
        "akamai_request_bc" => Some(AKAMAI_REQUEST_BC),
        "x_aka_info" => Some(X_AKA_INFO),
        "x_es_info" => Some(X_ES_INFO),
        _ => None,
    }
}

fn is_unknown(raw: &str) -> bool {
    raw.to_ascii_lowercase().contains("unknown")
}

/// Parse one breadcrumb cell into values laid out per `fields`.
///
/// A cell that is not text or mentions `unknown` yields all nulls. Pairs
/// without `=` and keys missing from the table are skipped.
pub fn parse_breadcrumbs(cell: &Value, fields: &[Field]) -> Vec<Value> {
    let mut out = vec![Value::Null; fields.len()];
    let raw = match cell {
        Value::Text(s) if !is_unknown(s) => s,
        _ => return out,
    };

    let inner = raw.trim().trim_start_matches('[').trim_end_matches(']');
    for pair in inner.split(',') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        let Some(pos) = fields.iter().position(|f| f.key == key.trim()) else {
            debug!(key, "skipping unknown breadcrumb key");
            continue;
        };
        let value = value.trim();
        if value.is_empty() || value == "NULL" || is_unknown(value) {
            continue;
        }
        out[pos] = match fields[pos].kind {
            FieldType::Text => Value::Text(value.to_string()),
            FieldType::Int => value.parse().map_or(Value::Null, Value::Int),
            FieldType::Float => value.parse().map_or(Value::Null, Value::Float),
        };
    }
    out
}

/// Replace breadcrumb tracepoint columns with their typed fields.
///
/// Other columns keep their position. The source dataset is untouched;
/// a dataset with no breadcrumb columns comes back as an equal copy.
pub fn expand_breadcrumbs(dataset: &TestDataset) -> Result<TestDataset, DatasetError> {
    let offset = dataset.dimensions().len() + dataset.metrics().len();
    let tables: Vec<Option<&'static [Field]>> =
        dataset.tracepoints().iter().map(|t| fields_for(t)).collect();

    let mut tracepoints = Vec::new();
    for (name, table) in dataset.tracepoints().iter().zip(&tables) {
        match table {
            Some(fields) => tracepoints.extend(fields.iter().map(|f| f.column.to_string())),
            None => tracepoints.push(name.clone()),
        }
    }

    let expand = |row: &Vec<Value>| -> Vec<Value> {
        let mut out: Vec<Value> = row[..offset].to_vec();
        for (cell, table) in row[offset..].iter().zip(&tables) {
            match table {
                Some(fields) => out.extend(parse_breadcrumbs(cell, fields)),
                None => out.push(cell.clone()),
            }
        }
        out
    };

    let rows = dataset.rows().iter().map(expand).collect();
    let excluded = dataset.excluded_rows().iter().map(expand).collect();
    dataset.with_tracepoints(tracepoints, rows, excluded)
}
