use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Budgets, Category, Dataset, Investment, Migrate, Transaction};
use crate::error::{FinanceError, Result};

/// File-based backup of all four datasets.
///
/// On import a missing (or null) key leaves that dataset untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transactions: Option<Vec<Transaction>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<Category>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budgets: Option<Budgets>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub investments: Option<Vec<Investment>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_date: Option<DateTime<Utc>>,
}

impl Snapshot {
    /// Parse and validate an import payload. Nothing is applied here, so a
    /// rejected payload never leaves a dataset half-imported.
    pub fn parse(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| FinanceError::malformed(format!("not valid JSON: {}", e)))?;
        if !value.is_object() {
            return Err(FinanceError::malformed("expected a JSON object at top level"));
        }

        let snapshot: Snapshot = serde_json::from_value(value)
            .map_err(|e| FinanceError::malformed(e.to_string()))?;

        if let Some(budgets) = &snapshot.budgets {
            budgets
                .validate()
                .map_err(|e| FinanceError::malformed(e.to_string()))?;
        }
        if let Some(transactions) = &snapshot.transactions {
            check_unique_ids(Dataset::Transactions, transactions.iter().map(|t| t.id))?;
            for tx in transactions {
                // Legacy records carry the sign in the amount until migrated
                tx.clone()
                    .migrate()
                    .validate()
                    .map_err(|e| FinanceError::malformed(format!("transaction {}: {}", tx.id, e)))?;
            }
        }
        if let Some(categories) = &snapshot.categories {
            check_unique_ids(Dataset::Categories, categories.iter().map(|c| c.id))?;
        }
        if let Some(investments) = &snapshot.investments {
            check_unique_ids(Dataset::Investments, investments.iter().map(|i| i.id))?;
            for investment in investments {
                investment.validate().map_err(|e| {
                    FinanceError::malformed(format!("investment {}: {}", investment.id, e))
                })?;
            }
        }
        Ok(snapshot)
    }

    /// Datasets carried by this snapshot.
    pub fn datasets(&self) -> Vec<Dataset> {
        let mut present = Vec::new();
        if self.transactions.is_some() {
            present.push(Dataset::Transactions);
        }
        if self.categories.is_some() {
            present.push(Dataset::Categories);
        }
        if self.budgets.is_some() {
            present.push(Dataset::Budgets);
        }
        if self.investments.is_some() {
            present.push(Dataset::Investments);
        }
        present
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn check_unique_ids(dataset: Dataset, ids: impl Iterator<Item = i64>) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(FinanceError::malformed(format!(
                "duplicate id {} in {}",
                id, dataset
            )));
        }
    }
    Ok(())
}
