//! Small helpers shared across the crate.

pub mod ids;

pub use ids::{new_group_id, IdGenerator};
