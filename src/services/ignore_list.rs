//! Operator-curated ignore list of rule short-ids.

use std::collections::HashSet;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::errors::ScanError;

/// Rule short-ids whose failures are suppressed.
pub type IgnoreSet = HashSet<String>;

#[async_trait]
pub trait IgnoreListSource: Send + Sync {
    /// The full ignore set. An empty set is a valid answer.
    async fn load(&self) -> Result<IgnoreSet, ScanError>;
}

/// Ignore list read from the `SCAP_Scan_Ignore_List` table.
#[derive(Debug, Clone)]
pub struct PgIgnoreList {
    pool: PgPool,
}

impl PgIgnoreList {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IgnoreListSource for PgIgnoreList {
    async fn load(&self) -> Result<IgnoreSet, ScanError> {
        let names: Vec<String> =
            sqlx::query_scalar(r#"SELECT "SCAP_Rule_Name" FROM "SCAP_Scan_Ignore_List""#)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| ScanError::IgnoreListUnavailable(e.to_string()))?;
        Ok(names.into_iter().collect())
    }
}
