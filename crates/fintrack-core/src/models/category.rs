use serde::{Deserialize, Serialize};

use super::{Migrate, TransactionType};
use crate::error::{FinanceError, Result};

/// Name shown for transactions whose category no longer exists.
pub const UNCATEGORIZED: &str = "Uncategorized";

pub const CATEGORY_SCHEMA_VERSION: u32 = 1;

/// Color given to categories saved without one.
const FALLBACK_COLOR: &str = "#95a5a6";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub schema_version: u32,
}

impl Category {
    fn seed(id: i64, name: &str, kind: TransactionType, color: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            kind,
            color: color.to_string(),
            schema_version: CATEGORY_SCHEMA_VERSION,
        }
    }

    pub fn from_input(id: i64, input: &CategoryInput) -> Self {
        Self::seed(id, input.name.trim(), input.kind, &input.color)
    }
}

impl Migrate for Category {
    fn migrate(mut self) -> Self {
        if self.color.trim().is_empty() {
            self.color = FALLBACK_COLOR.to_string();
        }
        self.schema_version = CATEGORY_SCHEMA_VERSION;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryInput {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub color: String,
}

impl CategoryInput {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(FinanceError::invalid("category name must not be empty"));
        }
        let hex = self.color.strip_prefix('#').unwrap_or("");
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(FinanceError::invalid(format!(
                "color must look like #rrggbb (got {})",
                self.color
            )));
        }
        Ok(())
    }
}

/// Categories a fresh installation starts with.
pub fn default_categories() -> Vec<Category> {
    use TransactionType::{Expense, Income};

    [
        // Income
        (1, "Salário", Income, "#27ae60"),
        (2, "Freelance", Income, "#2ecc71"),
        (3, "Investimentos", Income, "#16a085"),
        (4, "Vendas", Income, "#1abc9c"),
        (5, "Outros Rendimentos", Income, "#58d68d"),
        // Essential expenses
        (6, "Alimentação", Expense, "#e74c3c"),
        (7, "Moradia", Expense, "#8e44ad"),
        (8, "Transporte", Expense, "#e67e22"),
        (9, "Combustível", Expense, "#d35400"),
        (10, "Saúde", Expense, "#c0392b"),
        (11, "Educação", Expense, "#2980b9"),
        // Variable expenses
        (12, "Lazer", Expense, "#f39c12"),
        (13, "Roupas", Expense, "#9b59b6"),
        (14, "Tecnologia", Expense, "#34495e"),
        (15, "Viagens", Expense, "#e67e22"),
        (16, "Restaurantes", Expense, "#e74c3c"),
        // Fixed bills
        (17, "Internet", Expense, "#3498db"),
        (18, "Telefone", Expense, "#1abc9c"),
        (19, "Energia Elétrica", Expense, "#f1c40f"),
        (20, "Água", Expense, "#3498db"),
        (21, "Gás", Expense, "#95a5a6"),
        // Other
        (22, "Seguros", Expense, "#7f8c8d"),
        (23, "Impostos", Expense, "#2c3e50"),
        (24, "Doações", Expense, "#e91e63"),
        (25, "Outros", Expense, "#95a5a6"),
    ]
    .into_iter()
    .map(|(id, name, kind, color)| Category::seed(id, name, kind, color))
    .collect()
}
