//! SQL conveniences for pools of SQLite handles.

use super::manager::SqliteManager;
use super::resource::ResourcePool;
use crate::Result;
use rusqlite::types::Value;

/// One result row, column values in select order.
pub type Row = Vec<Value>;

pub type SqlitePool = ResourcePool<SqliteManager>;

impl ResourcePool<SqliteManager> {
    /// Acquire a handle, run one statement with positional `args`, release.
    ///
    /// Statements that produce no rows (INSERT, UPDATE, DDL) return an empty vec.
    pub async fn execute_sql(&self, sql: impl Into<String>, args: Vec<Value>) -> Result<Vec<Row>> {
        let sql = sql.into();
        self.execute(move |conn| {
            let mut stmt = conn.prepare_cached(&sql)?;
            let width = stmt.column_count();
            let rows = stmt
                .query_map(rusqlite::params_from_iter(args.iter()), |row| {
                    (0..width).map(|i| row.get::<_, Value>(i)).collect()
                })?
                .collect::<rusqlite::Result<Vec<Row>>>()?;
            Ok(rows)
        })
        .await
    }

    /// Run several `;`-separated statements that return no rows.
    pub async fn execute_batch_sql(&self, sql: impl Into<String>) -> Result<()> {
        let sql = sql.into();
        self.execute(move |conn| {
            conn.execute_batch(&sql)?;
            Ok(())
        })
        .await
    }
}
