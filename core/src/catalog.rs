//! Product Catalog — the immutable-per-run list of redeemable items.
//!
//! Products are append-only; there is no edit or delete operation.
//! Ids are assigned max+1 rather than by count, so they stay unique
//! even if deletions ever appear.

use crate::error::{EngineError, EngineResult};
use crate::types::{Points, ProductId};
use serde::{Deserialize, Serialize};

/// Display glyph lookup, keyed on the lowercase first word of the
/// product name. Anything unrecognized ships in a plain package.
const GLYPHS: &[(&str, &str)] = &[
    ("netflix", "🎬"),
    ("spotify", "🎵"),
    ("gaming", "🎮"),
    ("food", "🍔"),
    ("shopping", "👗"),
    ("random", "🎲"),
    ("gift", "🎁"),
    ("premium", "🌟"),
];

const FALLBACK_GLYPH: &str = "📦";

fn pick_glyph(name: &str) -> &'static str {
    let first_word = name
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_lowercase();
    GLYPHS
        .iter()
        .find(|(key, _)| *key == first_word)
        .map(|(_, glyph)| *glyph)
        .unwrap_or(FALLBACK_GLYPH)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub cost: Points,
    pub description: String,
    pub glyph: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductCatalog {
    products: Vec<Product>,
}

impl ProductCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    /// Products in insertion order. Display order matters: top-N
    /// previews take the head of this list.
    pub fn list(&self) -> &[Product] {
        &self.products
    }

    pub fn get(&self, id: ProductId) -> Option<&Product> {
        self.products.iter().find(|product| product.id == id)
    }

    /// Append a product. Cost must be a positive whole-point amount.
    /// Returns a copy of the stored product.
    pub fn add(&mut self, name: &str, cost: i64, description: &str) -> EngineResult<Product> {
        if cost <= 0 {
            return Err(EngineError::InvalidAmount(cost));
        }
        let id = self
            .products
            .iter()
            .map(|product| product.id)
            .max()
            .unwrap_or(0)
            + 1;
        let product = Product {
            id,
            name: name.to_string(),
            cost: cost as Points,
            description: description.to_string(),
            glyph: pick_glyph(name).to_string(),
        };
        self.products.push(product.clone());
        Ok(product)
    }
}
