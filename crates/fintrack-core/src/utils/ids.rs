use chrono::Utc;
use uuid::Uuid;

/// Hands out millisecond-timestamp ids that never repeat within a collection.
///
/// Two ids requested in the same millisecond (a recurring expansion does
/// that twelve times) are bumped past the last one issued.
#[derive(Debug, Default, Clone)]
pub struct IdGenerator {
    last: i64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure future ids are greater than an id already in use.
    pub fn observe(&mut self, id: i64) {
        self.last = self.last.max(id);
    }

    pub fn observe_all(&mut self, ids: impl IntoIterator<Item = i64>) {
        for id in ids {
            self.observe(id);
        }
    }

    pub fn next_id(&mut self) -> i64 {
        let id = Utc::now().timestamp_millis().max(self.last + 1);
        self.last = id;
        id
    }
}

/// Identifier shared by every occurrence spawned from one recurring rule.
pub fn new_group_id() -> String {
    Uuid::new_v4().to_string()
}
