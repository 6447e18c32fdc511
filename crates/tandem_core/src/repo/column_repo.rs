//! Board column repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide read APIs for the fixed column set seeded by migrations.
//! - Keep column presentation metadata behind a typed contract.
//!
//! # Invariants
//! - Column listing is deterministic: `display_rank ASC`.
//! - Columns are configuration state; nothing in core mutates them.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::column::Column;
use rusqlite::{Connection, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Result type used by column repository operations.
pub type ColumnRepoResult<T> = Result<T, ColumnRepoError>;

/// Errors from column repository operations.
#[derive(Debug)]
pub enum ColumnRepoError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Required column is missing from expected table.
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    /// Persisted data cannot be converted to valid read model.
    InvalidData(String),
}

impl Display for ColumnRepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "column repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "column repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "column repository requires column `{column}` in table `{table}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid column data: {message}"),
        }
    }
}

impl Error for ColumnRepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::UninitializedConnection { .. } => None,
            Self::MissingRequiredTable(_) => None,
            Self::MissingRequiredColumn { .. } => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for ColumnRepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for ColumnRepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Repository interface for board column reads.
pub trait ColumnRepository {
    /// Lists every column ascending by `display_rank`.
    fn list_columns(&self) -> ColumnRepoResult<Vec<Column>>;
    /// Loads one column by id.
    fn get_column(&self, column_id: &str) -> ColumnRepoResult<Option<Column>>;
}

/// SQLite-backed column repository.
pub struct SqliteColumnRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteColumnRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> ColumnRepoResult<Self> {
        ensure_column_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

const COLUMN_SELECT_SQL: &str = "SELECT
    column_id,
    display_name,
    emoji,
    color,
    display_rank
 FROM columns";

impl ColumnRepository for SqliteColumnRepository<'_> {
    fn list_columns(&self) -> ColumnRepoResult<Vec<Column>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{COLUMN_SELECT_SQL} ORDER BY display_rank ASC;"))?;
        let mut rows = stmt.query([])?;
        let mut columns = Vec::new();
        while let Some(row) = rows.next()? {
            columns.push(parse_column_row(row)?);
        }
        Ok(columns)
    }

    fn get_column(&self, column_id: &str) -> ColumnRepoResult<Option<Column>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{COLUMN_SELECT_SQL} WHERE column_id = ?1;"))?;
        let mut rows = stmt.query([column_id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_column_row(row)?));
        }
        Ok(None)
    }
}

fn parse_column_row(row: &Row<'_>) -> ColumnRepoResult<Column> {
    let column_id: String = row.get("column_id")?;
    if column_id.trim().is_empty() {
        return Err(ColumnRepoError::InvalidData(
            "blank id in columns.column_id".to_string(),
        ));
    }

    Ok(Column {
        column_id,
        display_name: row.get("display_name")?,
        emoji: row.get("emoji")?,
        color: row.get("color")?,
        display_rank: row.get("display_rank")?,
    })
}

fn ensure_column_connection_ready(conn: &Connection) -> ColumnRepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(ColumnRepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    if !table_exists(conn, "columns")? {
        return Err(ColumnRepoError::MissingRequiredTable("columns"));
    }

    for column in [
        "column_id",
        "display_name",
        "emoji",
        "color",
        "display_rank",
    ] {
        if !table_has_column(conn, "columns", column)? {
            return Err(ColumnRepoError::MissingRequiredColumn {
                table: "columns",
                column,
            });
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> ColumnRepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> ColumnRepoResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}
