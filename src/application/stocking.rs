//! Randomized stock level generation
//!
//! Stock draws pick one of three tiers at random and then a uniform
//! level inside that tier, so generated inventories show a spread of
//! low, medium and high quantities. Products not yet on the market
//! stock at zero.

use crate::domain::CatalogRecord;

/// Inclusive upper bounds of the three stock tiers. Validation
/// guarantees `low_max < medium_max < high_max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockTiers {
    pub low_max: u32,
    pub medium_max: u32,
    pub high_max: u32,
}

impl Default for StockTiers {
    fn default() -> Self {
        Self {
            low_max: 10,
            medium_max: 50,
            high_max: 100,
        }
    }
}

impl StockTiers {
    /// Draw a level: pick a tier, then a uniform value inside it.
    pub fn draw(&self) -> u32 {
        let (min, max) = match fastrand::u32(0..=2) {
            0 => (0, self.low_max),
            1 => (self.low_max + 1, self.medium_max),
            _ => (self.medium_max + 1, self.high_max),
        };
        fastrand::u32(min..=max)
    }
}

/// Stock level for one product on a given day (`today` as YYYY-MM-DD).
///
/// Products that are off market, have no release date, or release
/// after today are stocked at zero. ISO dates order lexically, so the
/// comparison is a plain string one.
pub fn stock_level(record: &CatalogRecord, tiers: &StockTiers, today: &str) -> u32 {
    let released = record
        .release_date()
        .is_some_and(|date| !date.is_empty() && date <= today);
    if record.on_market && released {
        tiers.draw()
    } else {
        0
    }
}
