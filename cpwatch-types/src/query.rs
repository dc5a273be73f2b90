//! Ad-hoc SQL over a dataset, backed by an in-memory SQLite database.

use std::fmt;

use rusqlite::Connection;
use thiserror::Error;

use crate::{ColumnKind, TestDataset, Value};

/// Name of the table the dataset is loaded into.
pub const TABLE_NAME: &str = "data";

/// Why a query produced no table.
///
/// "No rows matched" is kept apart from "the query failed" so interactive
/// callers can treat an empty result as an answer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// The query ran but matched nothing, or the dataset is empty.
    #[error("Query did not return any rows")]
    NoRows,

    /// SQLite rejected or failed to run the statement.
    #[error("sqlite3 error {0}")]
    Sql(String),

    /// Anything else that went wrong while loading or reading results.
    #[error("unexpected error {0}")]
    Internal(String),
}

impl From<rusqlite::Error> for QueryError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(..) | rusqlite::Error::SqlInputError { .. } => {
                QueryError::Sql(err.to_string())
            }
            other => QueryError::Internal(other.to_string()),
        }
    }
}

/// Tabular result of a query.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryTable {
    /// Result column names, in select order.
    pub columns: Vec<String>,
    /// Result rows.
    pub rows: Vec<Vec<Value>>,
}

impl QueryTable {
    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// All values of one column.
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let index = self.column_index(name)?;
        Some(self.rows.iter().filter_map(|r| r.get(index)).collect())
    }

    /// Rows as CSV text.
    pub fn to_csv(&self) -> Result<String, crate::RenderError> {
        crate::render::to_csv(&self.columns, &self.rows)
    }

    /// Rows as an HTML table.
    pub fn to_html(&self) -> String {
        crate::render::to_html(&self.columns, &self.rows)
    }
}

impl fmt::Display for QueryTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::render::write_text_table(f, &self.columns, &self.rows)
    }
}

impl TestDataset {
    /// Run `sql` against the included rows, loaded as a table named `data`.
    ///
    /// Every call loads a fresh in-memory database, so statements that
    /// modify the table never touch the dataset itself.
    ///
    /// # Example
    ///
    /// ```rust
    /// use cpwatch_types::{QueryError, TestDataset, Value};
    ///
    /// let dataset = TestDataset::builder()
    ///     .dimensions(["country"])
    ///     .metrics(["dns_ms"])
    ///     .row(vec!["Japan".into(), Value::Int(12)])
    ///     .row(vec!["France".into(), Value::Int(30)])
    ///     .build()
    ///     .unwrap();
    ///
    /// let table = dataset.query("SELECT dns_ms FROM data WHERE country = 'Japan'").unwrap();
    /// assert_eq!(table.rows, vec![vec![Value::Int(12)]]);
    ///
    /// let none = dataset.query("SELECT * FROM data WHERE dns_ms > 100");
    /// assert_eq!(none, Err(QueryError::NoRows));
    /// ```
    pub fn query(&self, sql: &str) -> Result<QueryTable, QueryError> {
        if self.is_empty() || self.columns().is_empty() {
            return Err(QueryError::NoRows);
        }

        let mut conn = Connection::open_in_memory()?;
        self.load_into(&mut conn)?;

        let mut stmt = conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = columns.len();

        let rows = stmt
            .query_map([], |row| {
                (0..width)
                    .map(|i| row.get::<_, Value>(i))
                    .collect::<rusqlite::Result<Vec<_>>>()
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        if rows.is_empty() {
            return Err(QueryError::NoRows);
        }

        Ok(QueryTable { columns, rows })
    }

    fn load_into(&self, conn: &mut Connection) -> Result<(), QueryError> {
        let definitions: Vec<String> = self
            .columns()
            .iter()
            .enumerate()
            .map(|(i, name)| match self.kind_at(i) {
                ColumnKind::Dimension => format!("{} TEXT", quote_ident(name)),
                ColumnKind::Metric => format!("{} INTEGER", quote_ident(name)),
                ColumnKind::Tracepoint => quote_ident(name),
            })
            .collect();
        conn.execute(
            &format!("CREATE TABLE {} ({})", TABLE_NAME, definitions.join(", ")),
            [],
        )?;

        let placeholders = vec!["?"; self.columns().len()].join(", ");
        let insert = format!("INSERT INTO {} VALUES ({})", TABLE_NAME, placeholders);

        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&insert)?;
            for row in self.rows() {
                stmt.execute(rusqlite::params_from_iter(row.iter()))?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

/// Quote an identifier for use in generated SQL.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
