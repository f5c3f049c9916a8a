//! Invocation deadline shared by every collaborator call.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::errors::ScanError;

/// Point in time by which the current invocation must finish.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
        }
    }

    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    /// Run `call`, failing with `on_timeout` once the deadline passes.
    pub async fn bound<T, F>(
        &self,
        call: F,
        on_timeout: impl FnOnce(String) -> ScanError,
    ) -> Result<T, ScanError>
    where
        F: Future<Output = Result<T, ScanError>>,
    {
        match tokio::time::timeout(self.remaining(), call).await {
            Ok(result) => result,
            Err(_) => Err(on_timeout("Invocation deadline exceeded".to_string())),
        }
    }
}
