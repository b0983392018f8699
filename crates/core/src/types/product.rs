//! Menu products (`products` table).

use serde::{Deserialize, Serialize};

use super::id::ProductId;
use super::price::Price;

/// A menu entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    pub price: Price,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default = "default_available")]
    pub available: bool,
}

const fn default_available() -> bool {
    true
}

impl Product {
    /// Group available products by category, keeping menu order inside each
    /// group. Products without a category land under `"Outros"`.
    #[must_use]
    pub fn by_category(products: &[Self]) -> Vec<(String, Vec<&Self>)> {
        let mut groups: Vec<(String, Vec<&Self>)> = Vec::new();
        for product in products.iter().filter(|p| p.available) {
            let category = product.category.as_deref().unwrap_or("Outros");
            match groups.iter_mut().find(|(name, _)| name == category) {
                Some((_, items)) => items.push(product),
                None => groups.push((category.to_string(), vec![product])),
            }
        }
        groups
    }
}
