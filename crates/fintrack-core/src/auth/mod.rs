//! Anonymous session management for the Firestore backend.
//!
//! Sessions are persisted to disk so the same anonymous user (and therefore
//! the same remote documents) survives restarts. Id tokens expire after an
//! hour and are refreshed five minutes early.

pub mod session;

pub use session::{Session, SessionData};
