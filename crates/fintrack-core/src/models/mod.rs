//! Data models for the finance datasets.
//!
//! This module contains the records persisted per dataset:
//!
//! - `Transaction`: income/expense entries, optionally part of a recurrence
//! - `Category`: user-defined labels with a type and color
//! - `Budgets`: monthly expense ceilings keyed by `YYYY-MM`
//! - `Investment`: principal plus rate, valued by compound growth
//! - `Snapshot`: the export/import envelope for all four datasets
//!
//! Records carry a `schemaVersion`; [`Migrate`] upgrades older records at
//! load time so the rest of the crate never branches on missing fields.

pub mod budget;
pub mod category;
pub mod dataset;
pub mod investment;
pub mod snapshot;
pub mod transaction;

pub use budget::{parse_month, Budgets};
pub use category::{default_categories, Category, CategoryInput, UNCATEGORIZED};
pub use dataset::Dataset;
pub use investment::{years_between, InstrumentKind, Investment, InvestmentInput};
pub use snapshot::Snapshot;
pub use transaction::{
    strip_marker, RecurringRule, Transaction, TransactionEdit, TransactionInput,
    TransactionType, RECURRENCE_MARKER,
};

/// Load-time upgrade of a persisted record to the current schema.
pub trait Migrate: Sized {
    fn migrate(self) -> Self;
}

pub fn migrate_all<T: Migrate>(items: Vec<T>) -> Vec<T> {
    items.into_iter().map(Migrate::migrate).collect()
}

/// Ids that older clients wrote either as numbers or as numeric strings.
pub(crate) mod flexible_id {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(match value {
            Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        })
    }
}
