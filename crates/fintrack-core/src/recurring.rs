//! Recurring-entry lifecycle.
//!
//! A recurring rule is expanded once, at creation time, into up to twelve
//! dated copies of the base transaction. The base and its copies form a
//! group that is edited or deleted as a unit.
//!
//! Group membership has two strategies, see [`GroupKey`]. New writes always
//! carry an explicit group id; description matching only exists for records
//! saved before group ids were introduced.

use chrono::{Days, Months, NaiveDate};
use tracing::{debug, warn};

use crate::models::{RecurringRule, Transaction, TransactionEdit, RECURRENCE_MARKER};
use crate::utils::{new_group_id, IdGenerator};

/// Maximum number of occurrences generated after the base entry.
pub const MAX_OCCURRENCES: u32 = 12;

/// How a transaction identifies the group it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupKey {
    /// Shared `recurringGroupId`. Matches only records carrying the same id.
    Explicit(String),
    /// Legacy fallback: same description once the marker is stripped.
    /// Matches only records without any group id.
    InferredByDescription(String),
}

impl GroupKey {
    /// Key for `tx`, or `None` when it is a standalone entry.
    pub fn of(tx: &Transaction) -> Option<Self> {
        if let Some(id) = &tx.recurring_group_id {
            return Some(GroupKey::Explicit(id.clone()));
        }
        if tx.looks_recurring() {
            return Some(GroupKey::InferredByDescription(
                tx.base_description().to_string(),
            ));
        }
        None
    }

    /// Key for `target` within `transactions`.
    ///
    /// A plain entry (no group id, rule or marker) still joins a legacy group
    /// when a marked copy without group id shares its description: older
    /// clients saved the first occurrence with the rule dropped.
    pub fn resolve(transactions: &[Transaction], target: &Transaction) -> Option<Self> {
        if let Some(key) = Self::of(target) {
            return Some(key);
        }
        let text = target.base_description();
        transactions
            .iter()
            .any(|t| {
                t.recurring_group_id.is_none()
                    && t.is_recurring_copy()
                    && t.base_description() == text
            })
            .then(|| GroupKey::InferredByDescription(text.to_string()))
    }

    pub fn matches(&self, candidate: &Transaction) -> bool {
        match self {
            GroupKey::Explicit(id) => candidate.recurring_group_id.as_deref() == Some(id),
            GroupKey::InferredByDescription(text) => {
                candidate.recurring_group_id.is_none() && candidate.base_description() == text
            }
        }
    }
}

/// Date of the `i`-th occurrence after `base`, or `None` past the calendar.
///
/// Months are added from the base date each time, so a base on the 31st
/// clamps to shorter months without drifting to the 28th afterwards.
pub fn occurrence_date(base: NaiveDate, rule: RecurringRule, i: u32) -> Option<NaiveDate> {
    match rule {
        RecurringRule::None => None,
        RecurringRule::Weekly => base.checked_add_days(Days::new(7 * u64::from(i))),
        RecurringRule::Monthly => base.checked_add_months(Months::new(i)),
        RecurringRule::Yearly => base.checked_add_months(Months::new(12 * i)),
    }
}

/// Generate the occurrences that follow `base`.
///
/// `base` receives a fresh group id first if it has none. Generation stops
/// after [`MAX_OCCURRENCES`] or once a date would pass one calendar year from
/// the base date, whichever comes first. A non-recurring base yields nothing.
pub fn expand(base: &mut Transaction, ids: &mut IdGenerator) -> Vec<Transaction> {
    if !base.recurring_rule.is_recurring() {
        return Vec::new();
    }

    let group_id = base
        .recurring_group_id
        .get_or_insert_with(new_group_id)
        .clone();

    let Some(horizon) = base.date.checked_add_months(Months::new(12)) else {
        return Vec::new();
    };
    let description = format!("{}{}", base.base_description(), RECURRENCE_MARKER);

    let mut occurrences = Vec::new();
    for i in 1..=MAX_OCCURRENCES {
        let Some(date) = occurrence_date(base.date, base.recurring_rule, i) else {
            break;
        };
        if date > horizon {
            break;
        }
        occurrences.push(Transaction {
            id: ids.next_id(),
            date,
            description: description.clone(),
            recurring_group_id: Some(group_id.clone()),
            ..base.clone()
        });
    }

    debug!(
        group = %group_id,
        rule = ?base.recurring_rule,
        count = occurrences.len(),
        "Expanded recurring transaction"
    );
    occurrences
}

/// Every transaction in the same group as `target` (including itself).
pub fn group_of<'a>(transactions: &'a [Transaction], target: &Transaction) -> Vec<&'a Transaction> {
    let key = GroupKey::resolve(transactions, target);
    let members: Vec<&Transaction> = match &key {
        Some(key) => transactions.iter().filter(|t| key.matches(t)).collect(),
        None => transactions.iter().filter(|t| t.id == target.id).collect(),
    };

    if let Some(GroupKey::InferredByDescription(text)) = &key {
        let heads = members.iter().filter(|t| !t.is_recurring_copy()).count();
        if heads > 1 {
            warn!(
                description = %text,
                heads,
                "Legacy recurring group is ambiguous; several entries look like the first occurrence"
            );
        }
    }
    members
}

/// Ids of the group containing the transaction `target_id`.
pub fn group_ids(transactions: &[Transaction], target_id: i64) -> Vec<i64> {
    transactions
        .iter()
        .find(|t| t.id == target_id)
        .map(|target| group_of(transactions, target).iter().map(|t| t.id).collect())
        .unwrap_or_default()
}

/// Apply `edit` to every member of the group of `target_id`.
///
/// Each member keeps its id, date, rule and group id. The first occurrence
/// (no marker) gets the edited description as typed, the generated ones get
/// it with the marker re-appended. Returns the number of updated records.
pub fn apply_group_edit(
    transactions: &mut [Transaction],
    target_id: i64,
    edit: &TransactionEdit,
) -> usize {
    let members = group_ids(transactions, target_id);
    let base_description = crate::models::strip_marker(edit.description.trim()).trim_end();

    let mut updated = 0;
    for tx in transactions.iter_mut().filter(|t| members.contains(&t.id)) {
        tx.apply_edit(base_description, edit);
        updated += 1;
    }
    updated
}

/// Remove every member of the group of `target_id`.
///
/// Returns the remaining transactions and how many were removed.
pub fn apply_group_delete(
    transactions: Vec<Transaction>,
    target_id: i64,
) -> (Vec<Transaction>, usize) {
    let members = group_ids(&transactions, target_id);
    let before = transactions.len();
    let remaining: Vec<Transaction> = transactions
        .into_iter()
        .filter(|t| !members.contains(&t.id))
        .collect();
    let removed = before - remaining.len();
    (remaining, removed)
}
