//! Import run request validation
//!
//! The raw request mirrors the wire shape submitted by callers. It is
//! validated once up front into a [`ValidatedImportRequest`] so the
//! orchestrator never sees contradictory stock bounds or blank
//! credentials.

use serde::Deserialize;
use thiserror::Error;

use crate::application::stocking::StockTiers;
use crate::infrastructure::parsing::{FilterCombinator, SelectionPolicy};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RequestValidationError {
    #[error("Required request field '{field}' is empty")]
    MissingField { field: &'static str },

    #[error("Stock bounds must be strictly increasing, got {low} / {medium} / {high}")]
    StockBoundsOutOfOrder { low: u32, medium: u32, high: u32 },

    #[error("At least one category id or supplier id is required")]
    EmptySelection,
}

/// One price generation rule. Absent fields leave that dimension
/// unconstrained; a rule with both category and supplier is the most
/// specific kind.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PriceRule {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub supplier: Option<String>,
    pub from: PriceBound,
    pub to: PriceBound,
}

impl PriceRule {
    /// Number of populated fields; doubles as the specificity rank.
    pub fn field_count(&self) -> usize {
        2 + usize::from(self.category.is_some()) + usize::from(self.supplier.is_some())
    }

    /// Whether the rule constrains are satisfied by a product's
    /// category and supplier.
    pub fn matches(&self, category_id: &str, supplier_id: &str) -> bool {
        self.category.as_deref().is_none_or(|c| c == category_id)
            && self.supplier.as_deref().is_none_or(|s| s == supplier_id)
    }
}

/// A price range endpoint. Integer bounds draw uniformly with cent
/// precision; fractional bounds reproduce their ending (.99 or .95).
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum PriceBound {
    Integer(i64),
    Fractional(f64),
}

impl PriceBound {
    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Integer(value) => *value as f64,
            Self::Fractional(value) => *value,
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Self::Integer(_))
    }
}

fn default_languages() -> Vec<String> {
    vec!["1".to_string()]
}

const fn default_max_images() -> u32 {
    1
}

const fn default_low_stock_max() -> u32 {
    10
}

const fn default_medium_stock_max() -> u32 {
    50
}

const fn default_high_stock_max() -> u32 {
    100
}

const fn default_max_products() -> usize {
    1000
}

/// Wire shape of an import run request.
#[derive(Debug, Clone, Deserialize)]
pub struct ImportRunRequest {
    #[serde(rename = "categoryIds", default)]
    pub category_ids: Vec<String>,
    #[serde(rename = "supplierIds", default)]
    pub supplier_ids: Vec<String>,
    pub secret: String,
    pub client_id: String,
    pub tenant: String,
    #[serde(default)]
    pub hook_url: String,
    #[serde(default = "default_languages")]
    pub languages: Vec<String>,
    #[serde(default = "default_max_images")]
    pub max_images: u32,
    #[serde(default = "default_low_stock_max")]
    pub low_stock_max: u32,
    #[serde(default = "default_medium_stock_max")]
    pub medium_stock_max: u32,
    #[serde(default = "default_high_stock_max")]
    pub high_stock_max: u32,
    #[serde(rename = "generatePrices", default)]
    pub generate_prices: Vec<PriceRule>,
    #[serde(default = "default_max_products")]
    pub max_products: usize,
}

/// A request the orchestrator can run without further checks.
#[derive(Debug, Clone)]
pub struct ValidatedImportRequest {
    pub tenant: String,
    pub client_id: String,
    pub client_secret: String,
    pub hook_url: Option<String>,
    pub language_id: String,
    pub category_ids: Vec<String>,
    pub supplier_ids: Vec<String>,
    pub price_rules: Vec<PriceRule>,
    pub max_images: u32,
    pub max_products: usize,
    pub stock_tiers: StockTiers,
}

impl ImportRunRequest {
    pub fn validate(self) -> Result<ValidatedImportRequest, RequestValidationError> {
        for (field, value) in [
            ("tenant", &self.tenant),
            ("client_id", &self.client_id),
            ("secret", &self.secret),
        ] {
            if value.trim().is_empty() {
                return Err(RequestValidationError::MissingField { field });
            }
        }

        if !(self.low_stock_max < self.medium_stock_max
            && self.medium_stock_max < self.high_stock_max)
        {
            return Err(RequestValidationError::StockBoundsOutOfOrder {
                low: self.low_stock_max,
                medium: self.medium_stock_max,
                high: self.high_stock_max,
            });
        }

        if self.category_ids.is_empty() && self.supplier_ids.is_empty() {
            return Err(RequestValidationError::EmptySelection);
        }

        let language_id = self
            .languages
            .iter()
            .find(|l| !l.is_empty())
            .cloned()
            .unwrap_or_else(|| "1".to_string());

        Ok(ValidatedImportRequest {
            tenant: self.tenant,
            client_id: self.client_id,
            client_secret: self.secret,
            hook_url: Some(self.hook_url).filter(|u| !u.is_empty()),
            language_id,
            category_ids: self.category_ids,
            supplier_ids: self.supplier_ids,
            price_rules: self.generate_prices,
            max_images: self.max_images,
            max_products: self.max_products,
            stock_tiers: StockTiers {
                low_max: self.low_stock_max,
                medium_max: self.medium_stock_max,
                high_max: self.high_stock_max,
            },
        })
    }
}

impl ValidatedImportRequest {
    /// Selection over the index feed: with both id lists present a
    /// record must match both, with one list only that list, and with
    /// neither nothing is selected.
    pub fn selection_policy(&self) -> SelectionPolicy {
        let combinator = if !self.category_ids.is_empty() && !self.supplier_ids.is_empty() {
            FilterCombinator::And
        } else {
            FilterCombinator::Or
        };
        SelectionPolicy::new(
            self.category_ids.iter().cloned().collect(),
            self.supplier_ids.iter().cloned().collect(),
            combinator,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn minimal_request() -> ImportRunRequest {
        serde_json::from_value(serde_json::json!({
            "tenant": "acme",
            "client_id": "cid",
            "secret": "shh"
        }))
        .unwrap()
    }

    #[test]
    fn defaults_match_the_wire_contract() {
        let request = minimal_request();
        assert_eq!(request.languages, vec!["1"]);
        assert_eq!(request.max_images, 1);
        assert_eq!(request.low_stock_max, 10);
        assert_eq!(request.medium_stock_max, 50);
        assert_eq!(request.high_stock_max, 100);
        assert_eq!(request.max_products, 1000);
        assert!(request.generate_prices.is_empty());
    }

    #[rstest]
    #[case::tenant("tenant")]
    #[case::client_id("client_id")]
    #[case::secret("secret")]
    fn blank_credentials_are_rejected(#[case] field: &'static str) {
        let mut request = minimal_request();
        match field {
            "tenant" => request.tenant = "  ".to_string(),
            "client_id" => request.client_id = String::new(),
            _ => request.secret = " ".to_string(),
        }
        assert_eq!(
            request.validate().unwrap_err(),
            RequestValidationError::MissingField { field }
        );
    }

    #[rstest]
    #[case::medium_at_low(10, 10, 100)]
    #[case::high_at_medium(10, 50, 50)]
    #[case::low_above_medium(60, 50, 100)]
    fn stock_bounds_must_increase(#[case] low: u32, #[case] medium: u32, #[case] high: u32) {
        let mut request = minimal_request();
        request.low_stock_max = low;
        request.medium_stock_max = medium;
        request.high_stock_max = high;
        assert!(matches!(
            request.validate().unwrap_err(),
            RequestValidationError::StockBoundsOutOfOrder { .. }
        ));
    }

    #[test]
    fn combinator_follows_which_lists_are_present() {
        let mut request = minimal_request();
        request.category_ids = vec!["151".to_string()];
        request.supplier_ids = vec!["5".to_string()];
        let validated = request.validate().unwrap();
        assert!(validated.selection_policy().matches("151", "5"));
        assert!(!validated.selection_policy().matches("151", "6"));

        let mut request = minimal_request();
        request.category_ids = vec!["151".to_string()];
        let validated = request.validate().unwrap();
        assert!(validated.selection_policy().matches("151", "anything"));
    }

    #[test]
    fn price_rules_deserialize_with_mixed_bounds() {
        let rules: Vec<PriceRule> = serde_json::from_value(serde_json::json!([
            {"category": "151", "supplier": "5", "from": 100, "to": 200},
            {"category": "151", "from": 10.99, "to": 20.99},
            {"from": 1, "to": 5}
        ]))
        .unwrap();

        assert_eq!(rules[0].field_count(), 4);
        assert_eq!(rules[1].field_count(), 3);
        assert_eq!(rules[2].field_count(), 2);
        assert!(rules[0].from.is_integer());
        assert!(!rules[1].from.is_integer());
        assert!(rules[1].matches("151", "7"));
        assert!(!rules[1].matches("152", "7"));
        assert!(rules[2].matches("any", "any"));
    }

    #[test]
    fn selecting_nothing_is_rejected() {
        assert_eq!(
            minimal_request().validate().unwrap_err(),
            RequestValidationError::EmptySelection
        );
    }

    #[test]
    fn empty_hook_url_validates_to_none() {
        let mut request = minimal_request();
        request.supplier_ids = vec!["5".to_string()];
        let validated = request.validate().unwrap();
        assert_eq!(validated.hook_url, None);
        assert_eq!(validated.language_id, "1");
    }
}
