//! Storage collaborator seams.
//!
//! The core never interprets a target's schema; it only sequences when
//! writes happen and with what retry and idempotency semantics. The
//! same filing batch lands in three competing shapes so the serving
//! layer can compare them: a raw staging table, a JSON/variant table
//! and denormalized fact tables.

mod memory;

pub use memory::MemoryWarehouse;

use crate::errors::StepError;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A denormalized fact table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactTable {
    /// Balance sheet facts.
    BalanceSheet,
    /// Income statement facts.
    IncomeStatement,
    /// Cash flow facts.
    CashFlow,
}

impl FactTable {
    /// Returns the warehouse table name.
    #[must_use]
    pub fn table_name(&self) -> &'static str {
        match self {
            Self::BalanceSheet => "balance_sheet",
            Self::IncomeStatement => "income_statement",
            Self::CashFlow => "cash_flow",
        }
    }
}

/// One of the three competing storage shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum StorageTarget {
    /// Raw staging rows, loaded as-is.
    Raw,
    /// Semi-structured rows with a variant payload column.
    Json,
    /// A denormalized relational fact table.
    Denormalized {
        /// Which fact table.
        table: FactTable,
    },
}

impl StorageTarget {
    /// Returns the warehouse schema the target lives in.
    #[must_use]
    pub fn schema_name(&self) -> &'static str {
        match self {
            Self::Raw => "RAW_SCHEMA",
            Self::Json => "JSON_SCHEMA",
            Self::Denormalized { .. } => "DBT_SCHEMA",
        }
    }

    /// Returns the warehouse table name.
    #[must_use]
    pub fn table_name(&self) -> &'static str {
        match self {
            Self::Raw => "raw_data",
            Self::Json => "json_sec_data",
            Self::Denormalized { table } => table.table_name(),
        }
    }
}

impl std::fmt::Display for StorageTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.schema_name(), self.table_name())
    }
}

/// A row as handed to the loader: schema interpretation stays with the
/// warehouse side of the seam.
pub type Record = serde_json::Value;

/// One filing fact in the shape of the JSON/variant table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilingRecord {
    /// SEC central index key of the registrant.
    pub cik: String,
    /// Registrant name.
    pub company_name: String,
    /// Date the filing was submitted.
    pub filing_date: NaiveDate,
    /// Fiscal year the fact belongs to.
    pub fiscal_year: i32,
    /// Accession number of the submission.
    pub adsh: String,
    /// Taxonomy tag of the fact.
    pub tag: String,
    /// Numeric value.
    pub value: f64,
    /// Unit of measure.
    pub unit: String,
    /// The full semi-structured payload.
    pub data: serde_json::Value,
}

impl FilingRecord {
    /// Converts the record into a loader row.
    ///
    /// # Errors
    ///
    /// Returns a fatal [`StepError`] if the record cannot be
    /// serialized.
    pub fn to_record(&self) -> Result<Record, StepError> {
        serde_json::to_value(self).map_err(|e| StepError::fatal(format!("unserializable record: {e}")))
    }
}

/// Writes transformed records into a named storage target.
#[async_trait]
pub trait Loader: Send + Sync {
    /// Writes a batch of records to the target.
    async fn write(&self, target: &StorageTarget, records: &[Record]) -> Result<(), StepError>;
}

/// Read-only paginated access to a storage target, consumed by the
/// separate serving layer.
#[async_trait]
pub trait QueryStore: Send + Sync {
    /// Fetches up to `limit` rows starting at `offset`.
    async fn fetch(
        &self,
        target: &StorageTarget,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Record>, StepError>;
}
