use crate::model::{generate_id, Id};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const DEFAULT_SKU_PREFIX: &str = "SKU";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: Id,
    pub tenant_id: Id,
    pub name: String,
    /// Prefix used when auto-numbering SKUs of products in this category.
    pub code: String,
    pub created_at: DateTime<Utc>,
}

impl Category {
    pub fn new(tenant_id: Id, name: String, code: String) -> Self {
        Self {
            id: generate_id(),
            tenant_id,
            name,
            code,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCategory {
    pub name: String,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: Id,
    pub tenant_id: Id,
    pub branch_id: Id,
    pub category_id: Option<Id>,
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    pub unit: String,
    pub cost_price: Decimal,
    pub selling_price: Decimal,
    /// Only ever changed together with a ledger row.
    pub stock_quantity: i32,
    pub reorder_level: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn is_low_stock(&self) -> bool {
        self.stock_quantity <= self.reorder_level
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewProduct {
    pub branch_id: Option<Id>,
    pub category_id: Option<Id>,
    pub sku: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub unit: Option<String>,
    pub cost_price: Decimal,
    pub selling_price: Decimal,
    #[serde(default)]
    pub reorder_level: i32,
    #[serde(default)]
    pub opening_stock: i32,
}

impl NewProduct {
    /// Build the product row with zero stock; opening stock is booked
    /// separately through the ledger.
    pub fn into_product(self, tenant_id: Id, branch_id: Id, sku: String) -> Product {
        let now = Utc::now();
        Product {
            id: generate_id(),
            tenant_id,
            branch_id,
            category_id: self.category_id,
            sku,
            name: self.name.trim().to_string(),
            description: self.description,
            unit: self.unit.unwrap_or_else(|| "pc".to_string()),
            cost_price: self.cost_price,
            selling_price: self.selling_price,
            stock_quantity: 0,
            reorder_level: self.reorder_level,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductUpdate {
    pub category_id: Option<Id>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub unit: Option<String>,
    pub cost_price: Option<Decimal>,
    pub selling_price: Option<Decimal>,
    pub reorder_level: Option<i32>,
    pub is_active: Option<bool>,
}

impl ProductUpdate {
    pub fn apply_to(self, product: &mut Product) {
        if let Some(category_id) = self.category_id {
            product.category_id = Some(category_id);
        }
        if let Some(name) = self.name {
            product.name = name.trim().to_string();
        }
        if let Some(description) = self.description {
            product.description = Some(description);
        }
        if let Some(unit) = self.unit {
            product.unit = unit;
        }
        if let Some(cost_price) = self.cost_price {
            product.cost_price = cost_price;
        }
        if let Some(selling_price) = self.selling_price {
            product.selling_price = selling_price;
        }
        if let Some(reorder_level) = self.reorder_level {
            product.reorder_level = reorder_level;
        }
        if let Some(is_active) = self.is_active {
            product.is_active = is_active;
        }
        product.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductFilter {
    pub q: Option<String>,
    pub category_id: Option<Id>,
    pub branch_id: Option<Id>,
    #[serde(default)]
    pub low_stock: bool,
    #[serde(default)]
    pub include_inactive: bool,
}

impl ProductFilter {
    pub fn matches(&self, product: &Product) -> bool {
        if !self.include_inactive && !product.is_active {
            return false;
        }
        if self.low_stock && !product.is_low_stock() {
            return false;
        }
        if let Some(category_id) = &self.category_id {
            if product.category_id.as_ref() != Some(category_id) {
                return false;
            }
        }
        if let Some(branch_id) = &self.branch_id {
            if &product.branch_id != branch_id {
                return false;
            }
        }
        match self.q.as_deref().map(str::trim) {
            Some(q) if !q.is_empty() => {
                let q = q.to_lowercase();
                product.name.to_lowercase().contains(&q) || product.sku.to_lowercase().contains(&q)
            }
            _ => true,
        }
    }
}
