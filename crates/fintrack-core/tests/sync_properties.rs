//! End-to-end behavior of the store, sync coordinator and recurring engine.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::json;

use fintrack_core::models::{
    Investment, InstrumentKind, RecurringRule, Transaction, TransactionEdit, TransactionInput,
    TransactionType, RECURRENCE_MARKER,
};
use fintrack_core::recurring;
use fintrack_core::utils::IdGenerator;
use fintrack_core::{
    ConnectivitySignal, FileCache, FinancialStore, LocalCache, MemoryCache, MemoryRemote,
    SyncCoordinator, UserId,
};
use fintrack_core::models::Dataset;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn monthly(description: &str, on: NaiveDate) -> TransactionInput {
    TransactionInput {
        description: description.to_string(),
        amount: Decimal::new(1500, 0),
        kind: TransactionType::Expense,
        category_id: Some(7),
        date: on,
        recurring_rule: RecurringRule::Monthly,
    }
}

fn legacy(id: i64, description: &str, on: NaiveDate) -> Transaction {
    Transaction {
        id,
        description: description.to_string(),
        amount: Decimal::new(100, 0),
        kind: TransactionType::Expense,
        category_id: Some(6),
        date: on,
        recurring_rule: RecurringRule::None,
        recurring_group_id: None,
        created_at: None,
        schema_version: 1,
    }
}

#[tokio::test]
async fn round_trip_online_and_after_network_loss() {
    let cache = MemoryCache::new();
    let remote = MemoryRemote::new("anon");
    let mut sync = SyncCoordinator::new(Box::new(cache)).with_remote(Box::new(remote.clone()));
    sync.authenticate().await.unwrap();

    let value = json!([{"id": 1, "name": "Poupança"}]);
    sync.save(Dataset::Investments, &value).await.unwrap();
    assert_eq!(sync.load(Dataset::Investments).await, Some(value.clone()));

    remote.set_available(false);
    assert_eq!(sync.load(Dataset::Investments).await, Some(value));
}

#[tokio::test]
async fn save_while_offline_is_loadable() {
    let remote = MemoryRemote::new("anon");
    let mut sync = SyncCoordinator::new(Box::new(MemoryCache::new()))
        .with_remote(Box::new(remote.clone()));
    sync.authenticate().await.unwrap();
    sync.handle_connectivity(ConnectivitySignal::Offline).await;

    let value = json!({"2024-04": 950.5});
    sync.save(Dataset::Budgets, &value).await.unwrap();
    assert_eq!(sync.load(Dataset::Budgets).await, Some(value));
    assert_eq!(remote.write_count(), 0);
}

#[tokio::test]
async fn file_cache_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let cache = FileCache::new(dir.path().to_path_buf()).unwrap();
    let mut store = FinancialStore::open(SyncCoordinator::new(Box::new(cache))).await;
    let ids = store
        .add_transaction(monthly("Aluguel", date(2024, 3, 1)))
        .await
        .unwrap();
    let user = store.user_id().cloned();
    drop(store);

    let cache = FileCache::new(dir.path().to_path_buf()).unwrap();
    assert!(cache.saved_at("transactions").is_some());
    let reopened = FinancialStore::open(SyncCoordinator::new(Box::new(cache))).await;
    assert_eq!(reopened.transactions().len(), ids.len());
    assert_eq!(reopened.user_id().cloned(), user);
}

#[test]
fn monthly_expansion_clamps_to_month_end() {
    let mut base = Transaction::from_input(1, &monthly("Aluguel", date(2024, 1, 31)));
    let mut ids = IdGenerator::new();
    let occurrences = recurring::expand(&mut base, &mut ids);

    let dates: Vec<NaiveDate> = occurrences.iter().map(|t| t.date).collect();
    assert_eq!(dates.len(), 12);
    assert_eq!(dates[0], date(2024, 2, 29));
    assert_eq!(dates[1], date(2024, 3, 31));
    assert_eq!(dates[2], date(2024, 4, 30));
    assert_eq!(dates[11], date(2025, 1, 31));
    assert!(occurrences
        .iter()
        .all(|t| t.recurring_group_id == base.recurring_group_id));
}

#[test]
fn weekly_expansion_stops_at_twelve() {
    let mut input = monthly("Feira", date(2024, 1, 1));
    input.recurring_rule = RecurringRule::Weekly;
    let mut base = Transaction::from_input(1, &input);
    let occurrences = recurring::expand(&mut base, &mut IdGenerator::new());
    assert_eq!(occurrences.len(), 12);
    assert_eq!(occurrences[11].date, date(2024, 3, 25));
}

#[tokio::test]
async fn group_edit_preserves_ids_and_dates() {
    let mut store = FinancialStore::open(SyncCoordinator::new(Box::new(MemoryCache::new()))).await;
    let ids = store
        .add_transaction(monthly("Aluguel", date(2024, 1, 10)))
        .await
        .unwrap();
    assert_eq!(ids.len(), 13);
    let before: Vec<(i64, NaiveDate)> = store.transactions().iter().map(|t| (t.id, t.date)).collect();

    let edit = TransactionEdit {
        description: "Aluguel novo".to_string(),
        amount: Decimal::new(1750, 0),
        kind: TransactionType::Expense,
        category_id: Some(7),
    };
    let updated = store.edit_recurring_group(ids[4], edit).await.unwrap();
    assert_eq!(updated, 13);

    let after: Vec<(i64, NaiveDate)> = store.transactions().iter().map(|t| (t.id, t.date)).collect();
    assert_eq!(before, after);
    assert!(store
        .transactions()
        .iter()
        .all(|t| t.amount == Decimal::new(1750, 0)));
    assert_eq!(store.transaction(ids[0]).unwrap().description, "Aluguel novo");
    assert_eq!(
        store.transaction(ids[12]).unwrap().description,
        format!("Aluguel novo{}", RECURRENCE_MARKER)
    );
}

async fn open_with_transactions(transactions: Vec<Transaction>) -> FinancialStore {
    let mut cache = MemoryCache::new();
    cache
        .write("transactions", &serde_json::to_value(transactions).unwrap())
        .unwrap();
    FinancialStore::open(SyncCoordinator::new(Box::new(cache))).await
}

#[tokio::test]
async fn legacy_group_deletes_together() {
    let legacy_records = || {
        vec![
            legacy(1_700_000_000_000, "Netflix", date(2023, 11, 14)),
            legacy(1_700_000_000_001, "Netflix (Recorrente)", date(2023, 12, 14)),
            legacy(1_700_000_000_002, "Spotify", date(2023, 11, 20)),
        ]
    };

    for target in [1_700_000_000_000, 1_700_000_000_001] {
        let mut store = open_with_transactions(legacy_records()).await;
        let removed = store.delete_recurring_group(target).await.unwrap();
        assert_eq!(removed, 2, "deleting {}", target);
        let left: Vec<i64> = store.transactions().iter().map(|t| t.id).collect();
        assert_eq!(left, vec![1_700_000_000_002]);
    }
}

#[tokio::test]
async fn group_delete_leaves_other_groups_alone() {
    let mut store = FinancialStore::open(SyncCoordinator::new(Box::new(MemoryCache::new()))).await;
    let rent = store
        .add_transaction(monthly("Aluguel", date(2024, 1, 5)))
        .await
        .unwrap();
    let same_name = store
        .add_transaction(monthly("Aluguel", date(2024, 1, 20)))
        .await
        .unwrap();
    let mut single = monthly("Mercado", date(2024, 1, 7));
    single.recurring_rule = RecurringRule::None;
    let standalone = store.add_transaction(single).await.unwrap();

    let removed = store.delete_recurring_group(rent[3]).await.unwrap();
    assert_eq!(removed, rent.len());
    assert_eq!(store.transactions().len(), same_name.len() + 1);
    assert!(store.transaction(standalone[0]).is_some());
    assert!(same_name.iter().all(|id| store.transaction(*id).is_some()));
}

#[tokio::test]
async fn reconnect_resyncs_local_state_once() {
    let remote = MemoryRemote::new("anon-42");
    let sync = SyncCoordinator::new(Box::new(MemoryCache::new()))
        .with_remote(Box::new(remote.clone()));
    let mut store = FinancialStore::open(sync).await;
    store.on_connectivity(ConnectivitySignal::Offline).await;
    store
        .set_budget("2024-09", Decimal::new(2000, 0))
        .await
        .unwrap();

    let report = store
        .on_connectivity(ConnectivitySignal::Online)
        .await
        .unwrap();
    assert!(report.is_clean());
    assert!(store
        .on_connectivity(ConnectivitySignal::Online)
        .await
        .is_none());
    assert_eq!(
        remote.document(&UserId::from("anon-42"), Dataset::Budgets),
        Some(json!({"2024-09": 2000.0}))
    );
}

#[test]
fn investment_growth() {
    let investment = Investment {
        id: 1,
        name: "Tesouro".to_string(),
        kind: InstrumentKind::TreasuryBond,
        principal: Decimal::new(1000, 0),
        annual_rate_percent: Decimal::new(12, 0),
        start_date: date(2023, 6, 1),
        maturity_date: None,
        schema_version: 1,
    };
    assert!((investment.value_at(date(2024, 6, 1)) - 1120.0).abs() < 1e-6);
    assert_eq!(investment.value_at(date(2023, 6, 1)), 1000.0);
}
