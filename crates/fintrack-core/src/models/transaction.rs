use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{flexible_id, Migrate};
use crate::error::{FinanceError, Result};

/// Suffix appended to the description of every generated occurrence.
///
/// Records written before explicit group ids existed are grouped by it,
/// so the text must stay byte-for-byte stable.
pub const RECURRENCE_MARKER: &str = " (Recorrente)";

/// Current on-disk version of [`Transaction`].
pub const TRANSACTION_SCHEMA_VERSION: u32 = 1;

/// Millisecond ids below this predate any plausible timestamp id.
const MIN_TIMESTAMP_ID: i64 = 1_000_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Income,
    #[default]
    Expense,
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionType::Income => write!(f, "income"),
            TransactionType::Expense => write!(f, "expense"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RecurringRule {
    #[default]
    None,
    Weekly,
    Monthly,
    Yearly,
}

impl RecurringRule {
    pub fn is_recurring(&self) -> bool {
        !matches!(self, RecurringRule::None)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: i64,
    pub description: String,
    pub amount: Decimal,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    // Older records stored the select value ("6", "") under `category`
    #[serde(alias = "category", default, deserialize_with = "flexible_id::deserialize")]
    pub category_id: Option<i64>,
    pub date: NaiveDate,
    #[serde(alias = "recurring", default)]
    pub recurring_rule: RecurringRule,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurring_group_id: Option<String>,
    #[serde(alias = "timestamp", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub schema_version: u32,
}

impl Transaction {
    /// Build a fresh record from user input.
    pub fn from_input(id: i64, input: &TransactionInput) -> Self {
        Self {
            id,
            description: input.description.trim().to_string(),
            amount: input.amount,
            kind: input.kind,
            category_id: input.category_id,
            date: input.date,
            recurring_rule: input.recurring_rule,
            recurring_group_id: None,
            created_at: Some(Utc::now()),
            schema_version: TRANSACTION_SCHEMA_VERSION,
        }
    }

    /// True for generated occurrences (the description carries the marker).
    pub fn is_recurring_copy(&self) -> bool {
        self.description.ends_with(RECURRENCE_MARKER)
    }

    /// True if the record belongs to some recurrence, explicit or legacy.
    pub fn looks_recurring(&self) -> bool {
        self.recurring_group_id.is_some()
            || self.recurring_rule.is_recurring()
            || self.is_recurring_copy()
    }

    /// Description with the recurrence marker removed.
    pub fn base_description(&self) -> &str {
        strip_marker(&self.description)
    }

    /// Signed contribution to a balance.
    pub fn signed_amount(&self) -> Decimal {
        match self.kind {
            TransactionType::Income => self.amount,
            TransactionType::Expense => -self.amount,
        }
    }

    /// Same field rules as new input: a description and a non-negative amount.
    pub fn validate(&self) -> Result<()> {
        validate_fields(&self.description, self.amount)
    }

    /// Year-month key (`YYYY-MM`) of the transaction date.
    pub fn month_key(&self) -> String {
        self.date.format("%Y-%m").to_string()
    }

    /// Replace every editable field, keeping id, date, rule and group.
    ///
    /// `base_description` must already be stripped of the marker; it is
    /// re-appended when this record is a generated occurrence.
    pub(crate) fn apply_edit(&mut self, base_description: &str, edit: &TransactionEdit) {
        self.description = if self.is_recurring_copy() {
            format!("{}{}", base_description, RECURRENCE_MARKER)
        } else {
            base_description.to_string()
        };
        self.amount = edit.amount;
        self.kind = edit.kind;
        self.category_id = edit.category_id;
    }
}

impl Migrate for Transaction {
    fn migrate(mut self) -> Self {
        if self.schema_version >= TRANSACTION_SCHEMA_VERSION {
            return self;
        }
        // The type carries the sign
        self.amount = self.amount.abs();
        if self.created_at.is_none() && self.id >= MIN_TIMESTAMP_ID {
            self.created_at = DateTime::from_timestamp_millis(self.id);
        }
        self.schema_version = TRANSACTION_SCHEMA_VERSION;
        self
    }
}

/// Strip one trailing recurrence marker, if present.
pub fn strip_marker(description: &str) -> &str {
    description
        .strip_suffix(RECURRENCE_MARKER)
        .unwrap_or(description)
}

/// Fields supplied when creating a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionInput {
    pub description: String,
    pub amount: Decimal,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    #[serde(default)]
    pub category_id: Option<i64>,
    pub date: NaiveDate,
    #[serde(default)]
    pub recurring_rule: RecurringRule,
}

impl TransactionInput {
    pub fn validate(&self) -> Result<()> {
        validate_fields(&self.description, self.amount)
    }
}

/// Fields replaced by an edit. Identity, date and recurrence are never edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionEdit {
    pub description: String,
    pub amount: Decimal,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    #[serde(default)]
    pub category_id: Option<i64>,
}

impl TransactionEdit {
    pub fn validate(&self) -> Result<()> {
        validate_fields(&self.description, self.amount)
    }
}

impl From<&Transaction> for TransactionEdit {
    fn from(tx: &Transaction) -> Self {
        Self {
            description: tx.base_description().to_string(),
            amount: tx.amount,
            kind: tx.kind,
            category_id: tx.category_id,
        }
    }
}

fn validate_fields(description: &str, amount: Decimal) -> Result<()> {
    if strip_marker(description).trim().is_empty() {
        return Err(FinanceError::invalid("description must not be empty"));
    }
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(FinanceError::invalid(format!(
            "amount must not be negative (got {})",
            amount
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn legacy_json() -> &'static str {
        r#"{
            "id": 1704067200000,
            "description": "Aluguel (Recorrente)",
            "amount": -1500.5,
            "type": "expense",
            "category": "7",
            "date": "2024-02-01",
            "recurring": "monthly",
            "timestamp": "2024-01-01T00:00:00.000Z"
        }"#
    }

    #[test]
    fn test_parse_legacy_record() {
        let tx: Transaction = serde_json::from_str(legacy_json()).expect("legacy record parses");
        assert_eq!(tx.category_id, Some(7));
        assert_eq!(tx.recurring_rule, RecurringRule::Monthly);
        assert_eq!(tx.recurring_group_id, None);
        assert_eq!(tx.schema_version, 0);
        assert!(tx.is_recurring_copy());
        assert_eq!(tx.base_description(), "Aluguel");
    }

    #[test]
    fn test_migrate_backfills_and_normalizes() {
        let mut tx: Transaction = serde_json::from_str(legacy_json()).unwrap();
        tx.created_at = None;
        let tx = tx.migrate();
        assert_eq!(tx.amount, Decimal::new(15005, 1));
        assert_eq!(tx.schema_version, TRANSACTION_SCHEMA_VERSION);
        assert_eq!(
            tx.created_at.map(|d| d.timestamp_millis()),
            Some(1_704_067_200_000)
        );
    }

    #[test]
    fn test_empty_category_is_none() {
        let json = r#"{"id":1,"description":"x","amount":1,"type":"income","category":"","date":"2024-01-01"}"#;
        let tx: Transaction = serde_json::from_str(json).unwrap();
        assert_eq!(tx.category_id, None);
        assert_eq!(tx.recurring_rule, RecurringRule::None);
    }

    #[test]
    fn test_serializes_camel_case() {
        let tx: Transaction = serde_json::from_str(legacy_json()).unwrap();
        let value = serde_json::to_value(tx.migrate()).unwrap();
        assert_eq!(value["categoryId"], 7);
        assert_eq!(value["recurringRule"], "monthly");
        assert_eq!(value["type"], "expense");
        assert!(value.get("recurringGroupId").is_none());
    }

    #[test]
    fn test_strip_marker_only_strips_suffix() {
        assert_eq!(strip_marker("Gym (Recorrente)"), "Gym");
        assert_eq!(strip_marker("Gym"), "Gym");
        assert_eq!(strip_marker(" (Recorrente) Gym"), " (Recorrente) Gym");
    }

    #[test]
    fn test_validate_rejects_negative_and_empty() {
        let mut input = TransactionEdit {
            description: "Coffee".to_string(),
            amount: Decimal::new(-1, 0),
            kind: TransactionType::Expense,
            category_id: None,
        };
        assert!(input.validate().is_err());
        input.amount = Decimal::ZERO;
        assert!(input.validate().is_ok());
        input.description = RECURRENCE_MARKER.to_string();
        assert!(input.validate().is_err());
    }
}
