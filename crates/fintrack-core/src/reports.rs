//! Read-only aggregates over the in-memory datasets.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::{FinanceError, Result};
use crate::models::{parse_month, Budgets, Category, Investment, Transaction, TransactionType};

/// Number of categories kept by [`category_breakdown`].
pub const TOP_CATEGORIES: usize = 8;

/// Which transactions a report looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeriodFilter {
    #[default]
    All,
    Year(i32),
    Month { year: i32, month: u32 },
}

impl PeriodFilter {
    pub fn contains(&self, date: NaiveDate) -> bool {
        match *self {
            PeriodFilter::All => true,
            PeriodFilter::Year(year) => date.year() == year,
            PeriodFilter::Month { year, month } => date.year() == year && date.month() == month,
        }
    }
}

impl FromStr for PeriodFilter {
    type Err = FinanceError;

    /// Accepts `all`, `YYYY` or `YYYY-MM`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(PeriodFilter::All);
        }
        if s.len() == 4 {
            return s
                .parse::<i32>()
                .map(PeriodFilter::Year)
                .map_err(|_| FinanceError::invalid(format!("invalid year: {}", s)));
        }
        let first = parse_month(s)?;
        Ok(PeriodFilter::Month {
            year: first.year(),
            month: first.month(),
        })
    }
}

impl fmt::Display for PeriodFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeriodFilter::All => write!(f, "all"),
            PeriodFilter::Year(year) => write!(f, "{}", year),
            PeriodFilter::Month { year, month } => write!(f, "{:04}-{:02}", year, month),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Totals {
    pub income: Decimal,
    pub expense: Decimal,
    pub balance: Decimal,
}

pub fn totals(transactions: &[Transaction], filter: PeriodFilter) -> Totals {
    let mut result = Totals::default();
    for tx in transactions.iter().filter(|t| filter.contains(t.date)) {
        match tx.kind {
            TransactionType::Income => result.income += tx.amount,
            TransactionType::Expense => result.expense += tx.amount,
        }
    }
    result.balance = result.income - result.expense;
    result
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryTotal {
    pub category_id: i64,
    pub name: String,
    pub color: String,
    pub total: Decimal,
}

/// Expense totals per category, largest first, at most [`TOP_CATEGORIES`].
///
/// Expenses whose category is missing or dangling are left out.
pub fn category_breakdown(
    transactions: &[Transaction],
    categories: &[Category],
    filter: PeriodFilter,
) -> Vec<CategoryTotal> {
    let by_id: HashMap<i64, &Category> = categories.iter().map(|c| (c.id, c)).collect();
    let mut sums: HashMap<i64, Decimal> = HashMap::new();

    for tx in transactions
        .iter()
        .filter(|t| t.kind == TransactionType::Expense && filter.contains(t.date))
    {
        if let Some(id) = tx.category_id.filter(|id| by_id.contains_key(id)) {
            *sums.entry(id).or_default() += tx.amount;
        }
    }

    let mut breakdown: Vec<CategoryTotal> = sums
        .into_iter()
        .filter(|(_, total)| *total > Decimal::ZERO)
        .filter_map(|(id, total)| {
            by_id.get(&id).map(|c| CategoryTotal {
                category_id: id,
                name: c.name.clone(),
                color: c.color.clone(),
                total,
            })
        })
        .collect();
    breakdown.sort_by(|a, b| b.total.cmp(&a.total).then(a.category_id.cmp(&b.category_id)));
    breakdown.truncate(TOP_CATEGORIES);
    breakdown
}

/// Distinct years with transactions, most recent first.
pub fn available_years(transactions: &[Transaction]) -> Vec<i32> {
    let years: BTreeSet<i32> = transactions.iter().map(|t| t.date.year()).collect();
    years.into_iter().rev().collect()
}

/// Distinct `YYYY-MM` keys with transactions, most recent first.
pub fn available_months(transactions: &[Transaction], year: Option<i32>) -> Vec<String> {
    let months: BTreeSet<String> = transactions
        .iter()
        .filter(|t| year.map_or(true, |y| t.date.year() == y))
        .map(Transaction::month_key)
        .collect();
    months.into_iter().rev().collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BudgetStatus {
    pub month: String,
    pub ceiling: Option<Decimal>,
    pub spent: Decimal,
    pub remaining: Option<Decimal>,
    pub over_budget: bool,
}

/// Expenses of `month` against its ceiling, if one is set.
pub fn budget_status(
    budgets: &Budgets,
    transactions: &[Transaction],
    month: &str,
) -> Result<BudgetStatus> {
    let filter: PeriodFilter = month.parse()?;
    if !matches!(filter, PeriodFilter::Month { .. }) {
        return Err(FinanceError::invalid(format!("expected YYYY-MM, got {}", month)));
    }
    let spent = totals(transactions, filter).expense;
    let ceiling = budgets.get(month);
    Ok(BudgetStatus {
        month: filter.to_string(),
        ceiling,
        spent,
        remaining: ceiling.map(|c| c - spent),
        over_budget: ceiling.is_some_and(|c| spent > c),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioValue {
    pub count: usize,
    pub principal: Decimal,
    pub value: f64,
}

impl PortfolioValue {
    pub fn gain(&self) -> f64 {
        use rust_decimal::prelude::ToPrimitive;
        self.value - self.principal.to_f64().unwrap_or(0.0)
    }
}

pub fn portfolio_value(investments: &[Investment], today: NaiveDate) -> PortfolioValue {
    PortfolioValue {
        count: investments.len(),
        principal: investments.iter().map(|i| i.principal).sum(),
        value: investments.iter().map(|i| i.value_at(today)).sum(),
    }
}
