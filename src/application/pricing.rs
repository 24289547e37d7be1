//! Randomized price generation
//!
//! Price rules constrain by category and supplier; a product is priced
//! by the most specific rule whose constraints it satisfies. Integer
//! bounds draw uniformly with cent precision, fractional bounds keep
//! the ending of the `from` bound (10.99..20.99 draws x.99).

use crate::application::run_request::{PriceBound, PriceRule};
use crate::domain::CatalogRecord;

/// Rules ordered most specific first, ready for per product lookup.
#[derive(Debug, Clone, Default)]
pub struct PriceBook {
    rules: Vec<PriceRule>,
}

impl PriceBook {
    pub fn new(mut rules: Vec<PriceRule>) -> Self {
        // Stable sort keeps the request order among equally specific rules.
        rules.sort_by_key(|rule| std::cmp::Reverse(rule.field_count()));
        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Price for one product. A product no rule matches is priced 0,
    /// same as the row it still gets in the price upload.
    pub fn price_for(&self, record: &CatalogRecord) -> f64 {
        self.rules
            .iter()
            .find(|rule| rule.matches(&record.catid, &record.supplier_id))
            .map_or(0.0, |rule| draw_price(rule.from, rule.to))
    }
}

/// Draw a random price in `[from, to]`.
///
/// The `from` bound picks the shape: an integer bound draws a uniform
/// value rounded to cents, a fractional bound draws an integer part
/// and reattaches .99 or .95 (anything not ending near .99 is treated
/// as .95). A whole valued float draws a plain integer.
pub fn draw_price(from: PriceBound, to: PriceBound) -> f64 {
    let (low, high) = (from.as_f64(), to.as_f64());
    if from.is_integer() {
        let drawn = low + fastrand::f64() * (high - low);
        return (drawn * 100.0).round() / 100.0;
    }

    let whole = fastrand::i64(low.trunc() as i64..=high.trunc() as i64) as f64;
    let fraction = low.fract();
    if fraction == 0.0 {
        whole
    } else if fraction > 0.96 {
        whole + 0.99
    } else {
        whole + 0.95
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn record(catid: &str, supplier_id: &str) -> CatalogRecord {
        CatalogRecord {
            product_id: "4242".to_string(),
            catid: catid.to_string(),
            supplier_id: supplier_id.to_string(),
            ..CatalogRecord::default()
        }
    }

    fn rule(
        category: Option<&str>,
        supplier: Option<&str>,
        from: PriceBound,
        to: PriceBound,
    ) -> PriceRule {
        PriceRule {
            category: category.map(str::to_string),
            supplier: supplier.map(str::to_string),
            from,
            to,
        }
    }

    #[test]
    fn most_specific_rule_wins_regardless_of_order() {
        let book = PriceBook::new(vec![
            rule(None, None, PriceBound::Integer(1), PriceBound::Integer(2)),
            rule(
                Some("151"),
                Some("5"),
                PriceBound::Integer(1000),
                PriceBound::Integer(2000),
            ),
        ]);

        let price = book.price_for(&record("151", "5"));
        assert!((1000.0..=2000.0).contains(&price));

        let fallback = book.price_for(&record("999", "999"));
        assert!((1.0..=2.0).contains(&fallback));
    }

    #[test]
    fn supplier_only_rules_match_on_supplier() {
        let book = PriceBook::new(vec![rule(
            None,
            Some("5"),
            PriceBound::Integer(10),
            PriceBound::Integer(20),
        )]);

        assert!(book.price_for(&record("151", "5")) >= 10.0);
        assert_eq!(book.price_for(&record("151", "6")), 0.0);
    }

    #[test]
    fn unmatched_products_price_to_zero() {
        let book = PriceBook::new(vec![rule(
            Some("151"),
            None,
            PriceBound::Integer(10),
            PriceBound::Integer(20),
        )]);
        assert_eq!(book.price_for(&record("2636", "5")), 0.0);
        assert!(PriceBook::new(Vec::new()).is_empty());
    }

    #[test]
    fn fractional_bounds_keep_their_ending() {
        for _ in 0..50 {
            let price = draw_price(PriceBound::Fractional(10.99), PriceBound::Fractional(20.99));
            assert!((10.99..=20.99).contains(&price));
            assert!((price.fract() - 0.99).abs() < 1e-9);

            let price = draw_price(PriceBound::Fractional(10.95), PriceBound::Fractional(20.95));
            assert!((price.fract() - 0.95).abs() < 1e-9);

            let price = draw_price(PriceBound::Fractional(10.0), PriceBound::Fractional(20.0));
            assert_eq!(price.fract(), 0.0);
        }
    }

    proptest! {
        #[test]
        fn integer_draws_stay_in_range_with_cent_precision(low in 0i64..500, span in 0i64..500) {
            let high = low + span;
            let price = draw_price(PriceBound::Integer(low), PriceBound::Integer(high));
            prop_assert!(price >= low as f64 && price <= high as f64);
            prop_assert!(((price * 100.0).round() / 100.0 - price).abs() < 1e-9);
        }
    }
}
