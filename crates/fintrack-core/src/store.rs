//! The in-memory finance datasets and every mutation on them.
//!
//! [`FinancialStore`] is the only caller of the sync coordinator and the
//! recurring engine. Each mutation updates memory, then persists the whole
//! affected dataset before returning. A failed local write is reported but
//! the in-memory change is kept.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::error::{FinanceError, Result};
use crate::models::{
    default_categories, migrate_all, strip_marker, Budgets, Category, CategoryInput, Dataset,
    Investment, InvestmentInput, Snapshot, Transaction, TransactionEdit, TransactionInput,
    UNCATEGORIZED,
};
use crate::recurring;
use crate::remote::UserId;
use crate::reports::{self, BudgetStatus, CategoryTotal, PeriodFilter, PortfolioValue, Totals};
use crate::sync::{ConnectivitySignal, SaveOutcome, SyncCoordinator, SyncReport};
use crate::utils::IdGenerator;

pub struct FinancialStore {
    sync: SyncCoordinator,
    transactions: Vec<Transaction>,
    categories: Vec<Category>,
    budgets: Budgets,
    investments: Vec<Investment>,
    ids: IdGenerator,
}

impl FinancialStore {
    /// Authenticate, load all datasets and seed default categories.
    ///
    /// Never fails: authentication problems leave the store in local-only
    /// mode and unreadable datasets start empty.
    pub async fn open(mut sync: SyncCoordinator) -> Self {
        if let Err(e) = sync.authenticate().await {
            warn!(error = %e, "Starting without a remote identity");
        }

        let mut store = Self {
            sync,
            transactions: Vec::new(),
            categories: Vec::new(),
            budgets: Budgets::new(),
            investments: Vec::new(),
            ids: IdGenerator::new(),
        };
        store.reload().await;
        store
    }

    /// Replace the in-memory datasets with what the coordinator loads.
    pub async fn reload(&mut self) {
        self.transactions = migrate_all(
            self.sync
                .load_as(Dataset::Transactions)
                .await
                .unwrap_or_default(),
        );
        self.categories = migrate_all(self.sync.load_as(Dataset::Categories).await.unwrap_or_default());
        self.budgets = self.sync.load_as(Dataset::Budgets).await.unwrap_or_default();
        self.investments = migrate_all(self.sync.load_as(Dataset::Investments).await.unwrap_or_default());
        self.observe_ids();

        if self.categories.is_empty() {
            info!("No categories stored, seeding defaults");
            self.categories = default_categories();
            if let Err(e) = self.persist(Dataset::Categories).await {
                warn!(error = %e, "Failed to persist default categories");
            }
        }

        debug!(
            transactions = self.transactions.len(),
            categories = self.categories.len(),
            budgets = self.budgets.len(),
            investments = self.investments.len(),
            "Datasets loaded"
        );
    }

    fn observe_ids(&mut self) {
        self.ids.observe_all(self.transactions.iter().map(|t| t.id));
        self.ids.observe_all(self.categories.iter().map(|c| c.id));
        self.ids.observe_all(self.investments.iter().map(|i| i.id));
    }

    async fn persist(&mut self, dataset: Dataset) -> Result<SaveOutcome> {
        match dataset {
            Dataset::Transactions => self.sync.save_as(dataset, &self.transactions).await,
            Dataset::Categories => self.sync.save_as(dataset, &self.categories).await,
            Dataset::Budgets => self.sync.save_as(dataset, &self.budgets).await,
            Dataset::Investments => self.sync.save_as(dataset, &self.investments).await,
        }
    }

    // ===== Accessors =====

    /// Identity the coordinator currently stores datasets under.
    pub fn user_id(&self) -> Option<&UserId> {
        self.sync.user_id()
    }

    pub fn sync(&self) -> &SyncCoordinator {
        &self.sync
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn budgets(&self) -> &Budgets {
        &self.budgets
    }

    pub fn investments(&self) -> &[Investment] {
        &self.investments
    }

    pub fn transaction(&self, id: i64) -> Option<&Transaction> {
        self.transactions.iter().find(|t| t.id == id)
    }

    /// Display name of a category reference; dangling ones are uncategorized.
    pub fn category_name(&self, category_id: Option<i64>) -> &str {
        category_id
            .and_then(|id| self.categories.iter().find(|c| c.id == id))
            .map_or(UNCATEGORIZED, |c| c.name.as_str())
    }

    // ===== Transactions =====

    /// Add a transaction, expanding it into its occurrences when recurring.
    ///
    /// Returns the ids created, base entry first.
    pub async fn add_transaction(&mut self, input: TransactionInput) -> Result<Vec<i64>> {
        input.validate()?;
        let mut base = Transaction::from_input(self.ids.next_id(), &input);
        let occurrences = recurring::expand(&mut base, &mut self.ids);

        let mut created = vec![base.id];
        created.extend(occurrences.iter().map(|t| t.id));
        self.transactions.push(base);
        self.transactions.extend(occurrences);

        info!(count = created.len(), "Added transaction");
        self.persist(Dataset::Transactions).await?;
        Ok(created)
    }

    /// Replace the editable fields of a single transaction.
    pub async fn edit_transaction(&mut self, id: i64, edit: TransactionEdit) -> Result<()> {
        edit.validate()?;
        let tx = self
            .transactions
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| FinanceError::not_found("transaction", id))?;
        let base_description = strip_marker(edit.description.trim()).trim_end();
        tx.apply_edit(base_description, &edit);
        self.persist(Dataset::Transactions).await?;
        Ok(())
    }

    /// Members of the recurring group `id` belongs to (just itself if none).
    pub fn recurring_group(&self, id: i64) -> Result<Vec<&Transaction>> {
        let target = self
            .transaction(id)
            .ok_or_else(|| FinanceError::not_found("transaction", id))?;
        Ok(recurring::group_of(&self.transactions, target))
    }

    /// Apply an edit to every member of the group `id` belongs to.
    pub async fn edit_recurring_group(&mut self, id: i64, edit: TransactionEdit) -> Result<usize> {
        edit.validate()?;
        if self.transaction(id).is_none() {
            return Err(FinanceError::not_found("transaction", id));
        }
        let updated = recurring::apply_group_edit(&mut self.transactions, id, &edit);
        info!(id, updated, "Edited recurring group");
        self.persist(Dataset::Transactions).await?;
        Ok(updated)
    }

    pub async fn delete_transaction(&mut self, id: i64) -> Result<()> {
        let before = self.transactions.len();
        self.transactions.retain(|t| t.id != id);
        if self.transactions.len() == before {
            return Err(FinanceError::not_found("transaction", id));
        }
        self.persist(Dataset::Transactions).await?;
        Ok(())
    }

    /// Delete every member of the group `id` belongs to.
    pub async fn delete_recurring_group(&mut self, id: i64) -> Result<usize> {
        if self.transaction(id).is_none() {
            return Err(FinanceError::not_found("transaction", id));
        }
        let all = std::mem::take(&mut self.transactions);
        let (remaining, removed) = recurring::apply_group_delete(all, id);
        self.transactions = remaining;
        info!(id, removed, "Deleted recurring group");
        self.persist(Dataset::Transactions).await?;
        Ok(removed)
    }

    // ===== Categories =====

    pub async fn add_category(&mut self, input: CategoryInput) -> Result<i64> {
        input.validate()?;
        let category = Category::from_input(self.ids.next_id(), &input);
        let id = category.id;
        self.categories.push(category);
        self.persist(Dataset::Categories).await?;
        Ok(id)
    }

    pub async fn edit_category(&mut self, id: i64, input: CategoryInput) -> Result<()> {
        input.validate()?;
        let slot = self
            .categories
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| FinanceError::not_found("category", id))?;
        *slot = Category::from_input(id, &input);
        self.persist(Dataset::Categories).await?;
        Ok(())
    }

    /// Remove a category. Transactions referencing it are left dangling.
    pub async fn delete_category(&mut self, id: i64) -> Result<()> {
        let before = self.categories.len();
        self.categories.retain(|c| c.id != id);
        if self.categories.len() == before {
            return Err(FinanceError::not_found("category", id));
        }
        self.persist(Dataset::Categories).await?;
        Ok(())
    }

    // ===== Budgets =====

    pub async fn set_budget(&mut self, month: &str, ceiling: Decimal) -> Result<()> {
        self.budgets.set(month, ceiling)?;
        self.persist(Dataset::Budgets).await?;
        Ok(())
    }

    pub async fn remove_budget(&mut self, month: &str) -> Result<()> {
        if self.budgets.remove(month).is_none() {
            return Err(FinanceError::not_found("budget", month));
        }
        self.persist(Dataset::Budgets).await?;
        Ok(())
    }

    // ===== Investments =====

    pub async fn add_investment(&mut self, input: InvestmentInput) -> Result<i64> {
        input.validate()?;
        let investment = Investment::from_input(self.ids.next_id(), &input);
        let id = investment.id;
        self.investments.push(investment);
        self.persist(Dataset::Investments).await?;
        Ok(id)
    }

    pub async fn edit_investment(&mut self, id: i64, input: InvestmentInput) -> Result<()> {
        input.validate()?;
        let slot = self
            .investments
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| FinanceError::not_found("investment", id))?;
        *slot = Investment::from_input(id, &input);
        self.persist(Dataset::Investments).await?;
        Ok(())
    }

    pub async fn delete_investment(&mut self, id: i64) -> Result<()> {
        let before = self.investments.len();
        self.investments.retain(|i| i.id != id);
        if self.investments.len() == before {
            return Err(FinanceError::not_found("investment", id));
        }
        self.persist(Dataset::Investments).await?;
        Ok(())
    }

    // ===== Export / import =====

    pub fn export_snapshot(&self) -> Snapshot {
        Snapshot {
            transactions: Some(self.transactions.clone()),
            categories: Some(self.categories.clone()),
            budgets: Some(self.budgets.clone()),
            investments: Some(self.investments.clone()),
            export_date: Some(chrono::Utc::now()),
        }
    }

    pub fn export_json(&self) -> Result<String> {
        self.export_snapshot().to_json()
    }

    /// Parse and apply an import payload; nothing changes if it is malformed.
    pub async fn import_json(&mut self, json: &str) -> Result<Vec<Dataset>> {
        let snapshot = Snapshot::parse(json)?;
        self.import_snapshot(snapshot).await
    }

    /// Replace every dataset present in `snapshot`, then persist them.
    ///
    /// Returns the datasets replaced. All are persisted even if one fails;
    /// the first failure is returned.
    pub async fn import_snapshot(&mut self, snapshot: Snapshot) -> Result<Vec<Dataset>> {
        let imported = snapshot.datasets();
        if let Some(transactions) = snapshot.transactions {
            self.transactions = migrate_all(transactions);
        }
        if let Some(categories) = snapshot.categories {
            self.categories = migrate_all(categories);
        }
        if let Some(budgets) = snapshot.budgets {
            self.budgets = budgets;
        }
        if let Some(investments) = snapshot.investments {
            self.investments = migrate_all(investments);
        }
        self.observe_ids();

        let mut first_error = None;
        for dataset in &imported {
            if let Err(e) = self.persist(*dataset).await {
                warn!(dataset = %dataset, error = %e, "Failed to persist imported dataset");
                first_error.get_or_insert(e);
            }
        }
        info!(datasets = ?imported, "Import applied");
        match first_error {
            Some(e) => Err(e),
            None => Ok(imported),
        }
    }

    // ===== Sync =====

    /// Forward a connectivity change; returns the resync report on reconnect.
    pub async fn on_connectivity(&mut self, signal: ConnectivitySignal) -> Option<SyncReport> {
        self.sync.handle_connectivity(signal).await
    }

    /// Push all local datasets to the remote store now.
    pub async fn sync_now(&mut self) -> SyncReport {
        self.sync.resync().await
    }

    // ===== Reports =====

    pub fn totals(&self, filter: PeriodFilter) -> Totals {
        reports::totals(&self.transactions, filter)
    }

    pub fn category_breakdown(&self, filter: PeriodFilter) -> Vec<CategoryTotal> {
        reports::category_breakdown(&self.transactions, &self.categories, filter)
    }

    pub fn budget_status(&self, month: &str) -> Result<BudgetStatus> {
        reports::budget_status(&self.budgets, &self.transactions, month)
    }

    pub fn portfolio_value(&self, today: NaiveDate) -> PortfolioValue {
        reports::portfolio_value(&self.investments, today)
    }

    pub fn available_years(&self) -> Vec<i32> {
        reports::available_years(&self.transactions)
    }

    pub fn available_months(&self, year: Option<i32>) -> Vec<String> {
        reports::available_months(&self.transactions, year)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{LocalCache, MemoryCache};
    use crate::models::{RecurringRule, TransactionType, RECURRENCE_MARKER};
    use crate::remote::MemoryRemote;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn input(description: &str, rule: RecurringRule) -> TransactionInput {
        TransactionInput {
            description: description.to_string(),
            amount: Decimal::new(250, 0),
            kind: TransactionType::Expense,
            category_id: Some(7),
            date: date(2024, 1, 15),
            recurring_rule: rule,
        }
    }

    async fn local_store() -> (FinancialStore, MemoryCache) {
        let cache = MemoryCache::new();
        let store = FinancialStore::open(SyncCoordinator::new(Box::new(cache.clone()))).await;
        (store, cache)
    }

    #[tokio::test]
    async fn test_open_seeds_default_categories() {
        let (store, cache) = local_store().await;
        assert_eq!(store.categories().len(), 25);
        assert!(cache.contains("categories"));
        assert!(store.user_id().unwrap().as_str().starts_with("local-"));
    }

    #[tokio::test]
    async fn test_add_recurring_creates_group() {
        let (mut store, _cache) = local_store().await;
        let ids = store
            .add_transaction(input("Aluguel", RecurringRule::Monthly))
            .await
            .unwrap();
        assert_eq!(ids.len(), 13);
        let group = store.recurring_group(ids[5]).unwrap();
        assert_eq!(group.len(), 13);
        assert_eq!(
            store.transaction(ids[1]).unwrap().description,
            format!("Aluguel{}", RECURRENCE_MARKER)
        );
    }

    #[tokio::test]
    async fn test_single_edit_keeps_marker_on_copies() {
        let (mut store, _cache) = local_store().await;
        let ids = store
            .add_transaction(input("Academia", RecurringRule::Weekly))
            .await
            .unwrap();
        let edit = TransactionEdit {
            description: "Gym".to_string(),
            amount: Decimal::new(90, 0),
            kind: TransactionType::Expense,
            category_id: Some(8),
        };
        store.edit_transaction(ids[2], edit).await.unwrap();
        let edited = store.transaction(ids[2]).unwrap();
        assert_eq!(edited.description, format!("Gym{}", RECURRENCE_MARKER));
        assert_eq!(store.transaction(ids[0]).unwrap().description, "Academia");
    }

    #[tokio::test]
    async fn test_missing_ids_are_not_found() {
        let (mut store, _cache) = local_store().await;
        assert!(matches!(
            store.delete_transaction(1).await,
            Err(FinanceError::NotFound { kind: "transaction", .. })
        ));
        assert!(store.delete_recurring_group(1).await.is_err());
        assert!(store.delete_category(999_999).await.is_err());
        assert!(store.remove_budget("2024-01").await.is_err());
    }

    #[tokio::test]
    async fn test_invalid_input_is_rejected_before_mutation() {
        let (mut store, _cache) = local_store().await;
        let mut bad = input("Mercado", RecurringRule::None);
        bad.amount = Decimal::new(-5, 0);
        assert!(matches!(
            store.add_transaction(bad).await,
            Err(FinanceError::InvalidInput(_))
        ));
        assert!(store.transactions().is_empty());
    }

    #[tokio::test]
    async fn test_category_delete_leaves_dangling_reference() {
        let (mut store, _cache) = local_store().await;
        store
            .add_transaction(input("Mercado", RecurringRule::None))
            .await
            .unwrap();
        store.delete_category(7).await.unwrap();
        assert_eq!(store.transactions().len(), 1);
        assert_eq!(store.category_name(Some(7)), UNCATEGORIZED);
        assert_eq!(store.category_name(None), UNCATEGORIZED);
        assert_eq!(store.category_name(Some(1)), "Salário");
    }

    #[tokio::test]
    async fn test_local_write_failure_keeps_memory_change() {
        let (mut store, cache) = local_store().await;
        cache.set_quota(Some(cache.used_bytes()));
        let err = store
            .add_transaction(input("Cinema", RecurringRule::None))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FinanceError::LocalWriteFailure { dataset: Dataset::Transactions, .. }
        ));
        assert_eq!(store.transactions().len(), 1);
    }

    #[tokio::test]
    async fn test_import_replaces_only_present_keys() {
        let (mut store, cache) = local_store().await;
        store
            .add_transaction(input("Mercado", RecurringRule::None))
            .await
            .unwrap();

        let imported = store
            .import_json(r#"{"budgets": {"2024-01": 1200}, "investments": []}"#)
            .await
            .unwrap();
        assert_eq!(imported, vec![Dataset::Budgets, Dataset::Investments]);
        assert_eq!(store.transactions().len(), 1);
        assert_eq!(store.budgets().get("2024-01"), Some(Decimal::new(1200, 0)));
        assert!(cache.contains("budgets"));
    }

    #[tokio::test]
    async fn test_malformed_import_changes_nothing() {
        let (mut store, _cache) = local_store().await;
        store.set_budget("2024-01", Decimal::new(10, 0)).await.unwrap();
        let err = store
            .import_json(r#"{"budgets": {"January": 5}, "transactions": []}"#)
            .await
            .unwrap_err();
        assert!(matches!(err, FinanceError::MalformedImport(_)));
        assert_eq!(store.budgets().get("2024-01"), Some(Decimal::new(10, 0)));
    }

    #[tokio::test]
    async fn test_export_then_import_into_fresh_store() {
        let (mut store, _cache) = local_store().await;
        store
            .add_transaction(input("Internet", RecurringRule::Yearly))
            .await
            .unwrap();
        let json = store.export_json().unwrap();

        let (mut other, _other_cache) = local_store().await;
        other.import_json(&json).await.unwrap();
        assert_eq!(other.transactions(), store.transactions());
        assert_eq!(other.categories(), store.categories());
    }

    #[tokio::test]
    async fn test_open_loads_remote_data_and_mirrors_it() {
        let cache = MemoryCache::new();
        let remote = MemoryRemote::new("anon-9");
        remote.put_document(
            &UserId::from("anon-9"),
            Dataset::Budgets,
            serde_json::json!({"2024-06": 300}),
        );
        let sync = SyncCoordinator::new(Box::new(cache.clone())).with_remote(Box::new(remote));
        let store = FinancialStore::open(sync).await;

        assert_eq!(store.user_id(), Some(&UserId::from("anon-9")));
        assert_eq!(store.budgets().get("2024-06"), Some(Decimal::new(300, 0)));
        assert_eq!(
            cache.read("budgets").unwrap(),
            Some(serde_json::json!({"2024-06": 300}))
        );
    }

    #[tokio::test]
    async fn test_reconnect_pushes_offline_changes() {
        let cache = MemoryCache::new();
        let remote = MemoryRemote::new("anon-3");
        let sync = SyncCoordinator::new(Box::new(cache))
            .with_remote(Box::new(remote.clone()))
            .with_online(false);
        let mut store = FinancialStore::open(sync).await;
        assert!(store.user_id().is_none());

        store.set_budget("2024-07", Decimal::new(800, 0)).await.unwrap();
        assert_eq!(remote.write_count(), 0);

        let report = store
            .on_connectivity(ConnectivitySignal::Online)
            .await
            .unwrap();
        assert!(report.pushed.contains(&Dataset::Budgets));
        assert!(report.pushed.contains(&Dataset::Categories));
        assert_eq!(store.user_id(), Some(&UserId::from("anon-3")));
        assert!(remote
            .document(&UserId::from("anon-3"), Dataset::Budgets)
            .is_some());
    }

    #[tokio::test]
    async fn test_user_id_tracks_replaced_remote_identity() {
        let remote = MemoryRemote::new("anon-5");
        let sync = SyncCoordinator::new(Box::new(MemoryCache::new()))
            .with_remote(Box::new(remote.clone()));
        let mut store = FinancialStore::open(sync).await;
        assert_eq!(store.user_id(), Some(&UserId::from("anon-5")));

        remote.set_user("anon-6");
        store.set_budget("2024-10", Decimal::new(500, 0)).await.unwrap();
        assert_eq!(store.user_id(), Some(&UserId::from("anon-6")));
        assert_eq!(
            remote.document(&UserId::from("anon-6"), Dataset::Budgets),
            Some(serde_json::json!({"2024-10": 500.0}))
        );
    }
}
