use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{FinanceError, Result};

/// Monthly expense ceilings keyed by `YYYY-MM`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Budgets(BTreeMap<String, Decimal>);

impl Budgets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, month: &str) -> Option<Decimal> {
        self.0.get(month).copied()
    }

    pub fn set(&mut self, month: &str, ceiling: Decimal) -> Result<()> {
        parse_month(month)?;
        if ceiling.is_sign_negative() && !ceiling.is_zero() {
            return Err(FinanceError::invalid(format!(
                "budget for {} must not be negative (got {})",
                month, ceiling
            )));
        }
        self.0.insert(month.to_string(), ceiling);
        Ok(())
    }

    pub fn remove(&mut self, month: &str) -> Option<Decimal> {
        self.0.remove(month)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Decimal)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check every key and value, as done before accepting an import.
    pub fn validate(&self) -> Result<()> {
        for (month, ceiling) in &self.0 {
            parse_month(month)?;
            if ceiling.is_sign_negative() && !ceiling.is_zero() {
                return Err(FinanceError::invalid(format!(
                    "budget for {} is negative",
                    month
                )));
            }
        }
        Ok(())
    }
}

/// Parse a `YYYY-MM` key into the first day of that month.
pub fn parse_month(month: &str) -> Result<NaiveDate> {
    if month.len() != 7 {
        return Err(FinanceError::invalid(format!(
            "invalid month '{}', expected YYYY-MM",
            month
        )));
    }
    NaiveDate::parse_from_str(&format!("{}-01", month), "%Y-%m-%d").map_err(|_| {
        FinanceError::invalid(format!("invalid month '{}', expected YYYY-MM", month))
    })
}
