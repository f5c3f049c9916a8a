//! Results table batch writer.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::errors::ScanError;
use crate::models::records::TableRow;

#[async_trait]
pub trait ResultsTable: Send + Sync {
    /// Write all rows of one scan as one batch, returning how many were stored.
    async fn write_batch(&self, rows: &[TableRow]) -> Result<usize, ScanError>;
}

/// Postgres rejects statements with more bind parameters than this.
const MAX_BIND_PARAMS: usize = 65_535;
const COLUMNS_PER_ROW: usize = 6;

/// Rows per INSERT statement, keeping each under the bind-parameter limit.
pub const ROWS_PER_INSERT: usize = MAX_BIND_PARAMS / COLUMNS_PER_ROW;

const UPSERT_PREFIX: &str = r#"INSERT INTO "SCAP_Scan_Results"
    ("InstanceId", "SCAP_Rule_Name", time, severity, result, report_url) "#;

const UPSERT_SUFFIX: &str = r#" ON CONFLICT ("InstanceId", "SCAP_Rule_Name") DO UPDATE
    SET time = EXCLUDED.time,
        severity = EXCLUDED.severity,
        result = EXCLUDED.result,
        report_url = EXCLUDED.report_url"#;

/// Results stored in the `SCAP_Scan_Results` table, one row per host and rule.
#[derive(Debug, Clone)]
pub struct PgResultsTable {
    pool: PgPool,
}

impl PgResultsTable {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// One row per (`InstanceId`, `SCAP_Rule_Name`), the last one winning.
///
/// A single upsert statement cannot touch the same key twice.
pub(crate) fn last_per_key(rows: &[TableRow]) -> Vec<&TableRow> {
    let mut position: HashMap<(&str, &str), usize> = HashMap::new();
    let mut unique: Vec<&TableRow> = Vec::with_capacity(rows.len());
    for row in rows {
        let key = (row.host_id.as_str(), row.rule_id.as_str());
        match position.get(&key) {
            Some(&index) => unique[index] = row,
            None => {
                position.insert(key, unique.len());
                unique.push(row);
            }
        }
    }
    unique
}

fn upsert_statement<'a>(rows: &[&'a TableRow]) -> QueryBuilder<'a, Postgres> {
    let mut query: QueryBuilder<Postgres> = QueryBuilder::new(UPSERT_PREFIX);
    query.push_values(rows.iter().copied(), |mut row, item| {
        row.push_bind(&item.host_id)
            .push_bind(&item.rule_id)
            .push_bind(&item.time)
            .push_bind(&item.severity)
            .push_bind(&item.result)
            .push_bind(&item.report_url);
    });
    query.push(UPSERT_SUFFIX);
    query
}

#[async_trait]
impl ResultsTable for PgResultsTable {
    async fn write_batch(&self, rows: &[TableRow]) -> Result<usize, ScanError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let rows = last_per_key(rows);
        let failed = |e: sqlx::Error| ScanError::TableWriteFailed(e.to_string());

        let mut tx = self.pool.begin().await.map_err(failed)?;
        for chunk in rows.chunks(ROWS_PER_INSERT) {
            upsert_statement(chunk)
                .build()
                .execute(&mut *tx)
                .await
                .map_err(failed)?;
        }
        tx.commit().await.map_err(failed)?;

        tracing::debug!(rows = rows.len(), "Results batch written");
        Ok(rows.len())
    }
}
