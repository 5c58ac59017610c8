//! Backing-store queries run on a pooled handle.

use super::request::{Record, RetrievalRequest};
use crate::Result;
use rusqlite::{params, Connection};

/// The query behind one retrieval, executed on a checked-out handle.
///
/// Runs on a blocking thread with exclusive use of `conn`. An `Err` is
/// reported on that request's result only, and a [`crate::Error::Store`]
/// error retires the handle.
pub trait RecordSource<C>: Send + Sync + 'static {
    fn fetch(&self, conn: &mut C, request: &RetrievalRequest) -> Result<Vec<Record>>;
}

impl<C, F> RecordSource<C> for F
where
    F: Fn(&mut C, &RetrievalRequest) -> Result<Vec<Record>> + Send + Sync + 'static,
{
    fn fetch(&self, conn: &mut C, request: &RetrievalRequest) -> Result<Vec<Record>> {
        self(conn, request)
    }
}

pub const RECORDS_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS records (
    domain     TEXT NOT NULL,
    id         TEXT NOT NULL,
    key        TEXT NOT NULL,
    content    TEXT NOT NULL,
    confidence REAL NOT NULL DEFAULT 1.0,
    PRIMARY KEY (domain, id)
);
CREATE INDEX IF NOT EXISTS idx_records_domain_confidence
    ON records (domain, confidence DESC);
";

const SELECT_RECORDS: &str = "
SELECT id, domain, key, content, confidence
FROM records
WHERE domain = ?1
  AND confidence >= ?2
  AND (instr(key, ?3) > 0 OR instr(content, ?3) > 0)
ORDER BY confidence DESC, id
LIMIT ?4";

/// Records in a `records` table, matched by substring on key or content.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteRecordSource;

impl SqliteRecordSource {
    pub fn new() -> Self {
        Self
    }

    pub fn install_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(RECORDS_SCHEMA)?;
        Ok(())
    }

    /// Upsert `records` in one transaction; returns the number written.
    pub fn insert_records(conn: &mut Connection, records: &[Record]) -> Result<usize> {
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO records (domain, id, key, content, confidence)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for r in records {
                stmt.execute(params![r.domain, r.id, r.key, r.content, r.confidence])?;
            }
        }
        tx.commit()?;
        Ok(records.len())
    }
}

impl RecordSource<Connection> for SqliteRecordSource {
    fn fetch(&self, conn: &mut Connection, request: &RetrievalRequest) -> Result<Vec<Record>> {
        let limit = request.limit.unwrap_or(usize::MAX).min(i64::MAX as usize) as i64;
        let mut stmt = conn.prepare_cached(SELECT_RECORDS)?;
        let records = stmt
            .query_map(
                params![
                    request.domain,
                    request.min_confidence.unwrap_or(0.0),
                    request.query,
                    limit
                ],
                |row| {
                    Ok(Record {
                        id: row.get(0)?,
                        domain: row.get(1)?,
                        key: row.get(2)?,
                        content: row.get(3)?,
                        confidence: row.get(4)?,
                    })
                },
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }
}
