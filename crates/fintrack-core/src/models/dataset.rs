use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The unit of sync granularity: each dataset is persisted as one blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dataset {
    Transactions,
    Categories,
    Budgets,
    Investments,
}

impl Dataset {
    /// All datasets, in the order they are loaded and resynced.
    pub const ALL: [Dataset; 4] = [
        Dataset::Transactions,
        Dataset::Categories,
        Dataset::Budgets,
        Dataset::Investments,
    ];

    /// Storage key, shared by the local cache and the remote collection name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Dataset::Transactions => "transactions",
            Dataset::Categories => "categories",
            Dataset::Budgets => "budgets",
            Dataset::Investments => "investments",
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dataset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Dataset::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| format!("Unknown dataset: {}", s))
    }
}
