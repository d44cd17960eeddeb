//! fintrack core - offline-first personal finance data.
//!
//! Transactions, categories, monthly budgets and investments are kept in
//! memory by [`FinancialStore`], persisted through a [`SyncCoordinator`]
//! that always writes a local cache first and mirrors to a per-user remote
//! store when it can. Recurring transactions are expanded into dated groups
//! that can be edited or deleted as a unit.

pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod recurring;
pub mod remote;
pub mod reports;
pub mod store;
pub mod sync;
pub mod utils;

pub use cache::{FileCache, LocalCache, MemoryCache};
pub use config::{Config, FirebaseConfig};
pub use error::{FinanceError, Result};
pub use remote::{FirestoreClient, MemoryRemote, RemoteError, RemoteStore, UserId};
pub use reports::PeriodFilter;
pub use store::FinancialStore;
pub use sync::{ConnectivitySignal, SaveOutcome, SyncCoordinator, SyncReport};
