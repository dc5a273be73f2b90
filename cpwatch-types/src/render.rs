//! Text, CSV and HTML rendering for tabular data.

use std::fmt;
use std::io;
use std::path::Path;

use crate::{RenderError, TestDataset, Value};

/// Write an aligned plain-text table.
pub(crate) fn write_text_table(
    f: &mut fmt::Formatter<'_>,
    columns: &[String],
    rows: &[Vec<Value>],
) -> fmt::Result {
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| row.iter().map(|v| v.to_string()).collect())
        .collect();

    let mut widths: Vec<usize> = columns.iter().map(|c| c.chars().count()).collect();
    for row in &cells {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.chars().count());
            }
        }
    }

    let header: Vec<String> = columns
        .iter()
        .zip(&widths)
        .map(|(c, w)| format!("{:<w$}", c, w = *w))
        .collect();
    writeln!(f, "{}", header.join("  ").trim_end())?;

    for row in &cells {
        let line: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{:<w$}", c, w = *w))
            .collect();
        writeln!(f, "{}", line.join("  ").trim_end())?;
    }
    Ok(())
}

/// Render rows as CSV with a header line.
///
/// Nulls are empty fields.
pub fn to_csv(columns: &[String], rows: &[Vec<Value>]) -> Result<String, RenderError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    write_records(&mut writer, columns, rows)?;
    let bytes = writer
        .into_inner()
        .map_err(|e| RenderError::Csv(e.into_error().into()))?;
    Ok(String::from_utf8(bytes)?)
}

fn write_records<W: io::Write>(
    writer: &mut csv::Writer<W>,
    columns: &[String],
    rows: &[Vec<Value>],
) -> Result<(), RenderError> {
    writer.write_record(columns)?;
    for row in rows {
        writer.write_record(row.iter().map(|v| v.to_string()))?;
    }
    writer.flush().map_err(csv::Error::from)?;
    Ok(())
}

/// Render rows as an HTML table with a leading index column.
pub fn to_html(columns: &[String], rows: &[Vec<Value>]) -> String {
    let mut out = String::from("<table border=\"1\" class=\"dataframe\">\n  <thead>\n");
    out.push_str("    <tr style=\"text-align: right;\">\n      <th></th>\n");
    for column in columns {
        out.push_str(&format!("      <th>{}</th>\n", escape_html(column)));
    }
    out.push_str("    </tr>\n  </thead>\n  <tbody>\n");
    for (i, row) in rows.iter().enumerate() {
        out.push_str(&format!("    <tr>\n      <th>{}</th>\n", i));
        for value in row {
            let cell = match value {
                Value::Null => "None".to_string(),
                other => escape_html(&other.to_string()),
            };
            out.push_str(&format!("      <td>{}</td>\n", cell));
        }
        out.push_str("    </tr>\n");
    }
    out.push_str("  </tbody>\n</table>");
    out
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

impl TestDataset {
    /// Included rows as CSV text.
    pub fn to_csv(&self) -> Result<String, RenderError> {
        to_csv(self.columns(), self.rows())
    }

    /// Save the included rows as a CSV file.
    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<(), RenderError> {
        let mut writer = csv::Writer::from_path(path)?;
        write_records(&mut writer, self.columns(), self.rows())
    }

    /// Included rows as an HTML table.
    pub fn to_html(&self) -> String {
        to_html(self.columns(), self.rows())
    }
}
