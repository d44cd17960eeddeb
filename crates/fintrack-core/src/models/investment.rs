use chrono::{Datelike, Local, Months, NaiveDate};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Migrate;
use crate::error::{FinanceError, Result};

pub const INVESTMENT_SCHEMA_VERSION: u32 = 1;

/// Kind of instrument; unknown kinds from newer clients load as `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentKind {
    Savings,
    FixedIncome,
    TreasuryBond,
    Stock,
    Fund,
    RealEstate,
    Crypto,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Investment {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: InstrumentKind,
    pub principal: Decimal,
    pub annual_rate_percent: Decimal,
    pub start_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maturity_date: Option<NaiveDate>,
    #[serde(default)]
    pub schema_version: u32,
}

impl Investment {
    pub fn from_input(id: i64, input: &InvestmentInput) -> Self {
        Self {
            id,
            name: input.name.trim().to_string(),
            kind: input.kind,
            principal: input.principal,
            annual_rate_percent: input.annual_rate_percent,
            start_date: input.start_date,
            maturity_date: input.maturity_date,
            schema_version: INVESTMENT_SCHEMA_VERSION,
        }
    }

    /// Compound value at `today`: `principal * (1 + rate/100)^years`.
    pub fn value_at(&self, today: NaiveDate) -> f64 {
        let principal = self.principal.to_f64().unwrap_or(0.0);
        let rate = self.annual_rate_percent.to_f64().unwrap_or(0.0) / 100.0;
        principal * (1.0 + rate).powf(years_between(self.start_date, today))
    }

    pub fn current_value(&self) -> f64 {
        self.value_at(Local::now().date_naive())
    }

    pub fn is_matured(&self, today: NaiveDate) -> bool {
        self.maturity_date.is_some_and(|m| m <= today)
    }

    pub fn validate(&self) -> Result<()> {
        validate_fields(&self.name, self.principal, self.start_date, self.maturity_date)
    }
}

impl Migrate for Investment {
    fn migrate(mut self) -> Self {
        self.schema_version = INVESTMENT_SCHEMA_VERSION;
        self
    }
}

/// Elapsed years counted in whole calendar months plus leftover days.
///
/// Exactly one calendar year yields 1.0, whatever the leap days in between.
/// Dates before `start` count as zero.
pub fn years_between(start: NaiveDate, today: NaiveDate) -> f64 {
    if today <= start {
        return 0.0;
    }
    let mut months =
        (today.year() - start.year()) * 12 + today.month() as i32 - start.month() as i32;
    let add = |m: i32| start.checked_add_months(Months::new(m.max(0) as u32));
    while months > 0 && add(months).map_or(true, |d| d > today) {
        months -= 1;
    }
    let anchor = add(months).unwrap_or(start);
    let days = (today - anchor).num_days();
    months as f64 / 12.0 + days as f64 / 365.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvestmentInput {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: InstrumentKind,
    pub principal: Decimal,
    pub annual_rate_percent: Decimal,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub maturity_date: Option<NaiveDate>,
}

impl InvestmentInput {
    pub fn validate(&self) -> Result<()> {
        validate_fields(&self.name, self.principal, self.start_date, self.maturity_date)
    }
}

fn validate_fields(
    name: &str,
    principal: Decimal,
    start_date: NaiveDate,
    maturity_date: Option<NaiveDate>,
) -> Result<()> {
    if name.trim().is_empty() {
        return Err(FinanceError::invalid("investment name must not be empty"));
    }
    if principal <= Decimal::ZERO {
        return Err(FinanceError::invalid(format!(
            "principal must be positive (got {})",
            principal
        )));
    }
    if let Some(maturity) = maturity_date {
        if maturity < start_date {
            return Err(FinanceError::invalid("maturity date precedes start date"));
        }
    }
    Ok(())
}
