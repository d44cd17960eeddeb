//! Offline-first persistence.
//!
//! The [`SyncCoordinator`] decides, per call, whether the remote store is
//! reachable. Local writes always happen first and always complete; remote
//! writes are best effort. When connectivity comes back every dataset is
//! pushed from the local cache ("local wins", no merge).

pub mod coordinator;

pub use coordinator::{ConnectivitySignal, SaveOutcome, SyncCoordinator, SyncReport, LOCAL_USER_KEY};
