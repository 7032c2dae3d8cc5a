//! Initial stock estimation per store.
//!
//! Stock covers 30 days of average sales (mean over days with positive
//! sales, rounded half to even). Stores without any positive sales, including
//! stores with attributes but no transactions, fall back to a profile
//! heuristic from their attributes. The total is then split into
//! Groceries / Electronics / Clothing by store type, assortment and
//! nearby competition.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::persistence::write_atomic;
use salescast_core::data::{LoadError, SalesSource};
use salescast_core::domain::{StoreAttributes, StoreFrame, StoreId};

/// Days of average sales held as initial stock.
pub const DAYS_OF_COVER: f64 = 30.0;

/// Competition closer than this (metres) counts as nearby.
pub const NEARBY_COMPETITION_M: u32 = 500;

/// How the total was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockBasis {
    SalesHistory,
    StoreProfile,
}

/// Category fractions; always sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategorySplit {
    pub groceries: f64,
    pub electronics: f64,
    pub clothing: f64,
}

impl CategorySplit {
    /// Split for a store; the 0.5 / 0.3 / 0.2 baseline when attributes are unknown.
    pub fn for_store(attributes: Option<&StoreAttributes>) -> Self {
        let (mut g, mut e, mut c) = (0.5, 0.3, 0.2);

        if let Some(attrs) = attributes {
            match attrs.store_type.to_ascii_lowercase().as_str() {
                "a" => {
                    g += 0.1;
                    e -= 0.05;
                    c -= 0.05;
                }
                "c" => {
                    g -= 0.1;
                    e += 0.15;
                    c -= 0.05;
                }
                "d" => {
                    g -= 0.1;
                    e -= 0.1;
                    c += 0.2;
                }
                _ => {}
            }
            match attrs.assortment.to_ascii_lowercase().as_str() {
                "c" => c += 0.05,
                "a" => e -= 0.05,
                _ => {}
            }
            if attrs.has_competition_within(NEARBY_COMPETITION_M) {
                e += 0.05;
            }
        }

        let total = g + e + c;
        Self {
            groceries: g / total,
            electronics: e / total,
            clothing: c / total,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryEstimate {
    pub store_id: StoreId,
    pub basis: StockBasis,
    pub total: u64,
    pub groceries: u64,
    pub electronics: u64,
    pub clothing: u64,
}

/// Profile heuristic used when a store has no positive sales.
pub fn profile_stock(attributes: Option<&StoreAttributes>) -> u64 {
    let mut stock: i64 = 500;
    if let Some(attrs) = attributes {
        if attrs.has_competition_within(NEARBY_COMPETITION_M) {
            stock += 200;
        }
        match attrs.assortment.to_ascii_lowercase().as_str() {
            "a" => stock += 300,
            "c" => stock -= 100,
            _ => {}
        }
    }
    stock.max(0) as u64
}

/// Estimate one store's initial stock.
pub fn estimate_store(frame: &StoreFrame) -> InventoryEstimate {
    let positive: Vec<f64> = frame
        .records
        .iter()
        .map(|r| r.sales)
        .filter(|s| s.is_finite() && *s > 0.0)
        .collect();

    let from_sales = if positive.is_empty() {
        None
    } else {
        let mean = positive.iter().sum::<f64>() / positive.len() as f64;
        Some((mean.round_ties_even() * DAYS_OF_COVER) as u64).filter(|v| *v > 0)
    };

    let (basis, total) = match from_sales {
        Some(total) => (StockBasis::SalesHistory, total),
        None => (
            StockBasis::StoreProfile,
            profile_stock(frame.attributes.as_ref()),
        ),
    };

    let split = CategorySplit::for_store(frame.attributes.as_ref());
    let share = |f: f64| (total as f64 * f).floor() as u64;

    InventoryEstimate {
        store_id: frame.store_id,
        basis,
        total,
        groceries: share(split.groceries),
        electronics: share(split.electronics),
        clothing: share(split.clothing),
    }
}

/// Estimate every store the source knows about.
pub fn estimate_all(source: &dyn SalesSource) -> Result<Vec<InventoryEstimate>, LoadError> {
    let mut out = Vec::new();
    for store_id in source.all_store_ids() {
        let frame = source.load_store(store_id)?;
        let estimate = estimate_store(&frame);
        debug!(store_id, total = estimate.total, basis = ?estimate.basis, "inventory estimated");
        out.push(estimate);
    }
    Ok(out)
}

/// Write estimates as CSV (atomically).
pub fn write_inventory_csv(path: &Path, estimates: &[InventoryEstimate]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    for e in estimates {
        wtr.serialize(e)
            .with_context(|| format!("failed to serialize inventory for store {}", e.store_id))?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    write_atomic(path, &data).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
