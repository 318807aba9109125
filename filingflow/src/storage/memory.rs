//! In-memory warehouse for tests and single-process runs.

use super::{Loader, QueryStore, Record, StorageTarget};
use crate::errors::StepError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A warehouse keeping every target in process memory.
///
/// Counts loader invocations so tests can assert idempotent re-runs
/// apply side effects exactly once.
#[derive(Debug, Default)]
pub struct MemoryWarehouse {
    tables: DashMap<String, Vec<Record>>,
    write_calls: AtomicUsize,
}

impl MemoryWarehouse {
    /// Creates an empty warehouse.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns how many times [`Loader::write`] was invoked.
    #[must_use]
    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    /// Returns the number of rows stored for a target.
    #[must_use]
    pub fn row_count(&self, target: &StorageTarget) -> usize {
        self.tables
            .get(&target.to_string())
            .map_or(0, |rows| rows.len())
    }
}

#[async_trait]
impl Loader for MemoryWarehouse {
    async fn write(&self, target: &StorageTarget, records: &[Record]) -> Result<(), StepError> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        self.tables
            .entry(target.to_string())
            .or_default()
            .extend_from_slice(records);
        Ok(())
    }
}

#[async_trait]
impl QueryStore for MemoryWarehouse {
    async fn fetch(
        &self,
        target: &StorageTarget,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Record>, StepError> {
        Ok(self
            .tables
            .get(&target.to_string())
            .map(|rows| rows.iter().skip(offset).take(limit).cloned().collect())
            .unwrap_or_default())
    }
}
