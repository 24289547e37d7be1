//! Extraction context and record selection
//!
//! Carries the selection policy and reference lookups through an
//! extraction run, and decides per record whether it is kept.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::domain::SupplierBrand;

/// How category and supplier filters combine when both are present
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FilterCombinator {
    And,
    Or,
}

impl Default for FilterCombinator {
    fn default() -> Self {
        Self::And
    }
}

/// Record selection policy evaluated against raw index attributes
#[derive(Debug, Clone, Default)]
pub struct SelectionPolicy {
    pub category_ids: HashSet<String>,
    pub supplier_ids: HashSet<String>,
    pub combinator: FilterCombinator,
}

impl SelectionPolicy {
    pub fn new(
        category_ids: HashSet<String>,
        supplier_ids: HashSet<String>,
        combinator: FilterCombinator,
    ) -> Self {
        Self {
            category_ids,
            supplier_ids,
            combinator,
        }
    }

    /// Decide whether a record with the given category and supplier is kept.
    ///
    /// Both filter sets empty selects nothing: an unfiltered run would pull
    /// the entire feed, which is never intended.
    pub fn matches(&self, category_id: &str, supplier_id: &str) -> bool {
        match (self.category_ids.is_empty(), self.supplier_ids.is_empty()) {
            (true, true) => false,
            (false, true) => self.category_ids.contains(category_id),
            (true, false) => self.supplier_ids.contains(supplier_id),
            (false, false) => {
                let in_categories = self.category_ids.contains(category_id);
                let in_suppliers = self.supplier_ids.contains(supplier_id);
                match self.combinator {
                    FilterCombinator::And => in_categories && in_suppliers,
                    FilterCombinator::Or => in_categories || in_suppliers,
                }
            }
        }
    }

    pub fn is_unfiltered(&self) -> bool {
        self.category_ids.is_empty() && self.supplier_ids.is_empty()
    }
}

/// Context for one index extraction pass
#[derive(Debug, Clone)]
pub struct ExtractContext<'a> {
    /// Selection policy applied to every record
    pub policy: SelectionPolicy,

    /// Supplier reference table for resolving supplier names
    pub suppliers: Option<&'a HashMap<String, SupplierBrand>>,

    /// Source label used in diagnostics
    pub source: String,
}

impl<'a> ExtractContext<'a> {
    pub fn new(policy: SelectionPolicy) -> Self {
        Self {
            policy,
            suppliers: None,
            source: "index".to_string(),
        }
    }

    pub fn with_suppliers(mut self, suppliers: &'a HashMap<String, SupplierBrand>) -> Self {
        self.suppliers = Some(suppliers);
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn supplier_name(&self, supplier_id: &str) -> Option<String> {
        self.suppliers
            .and_then(|table| table.get(supplier_id))
            .map(|brand| brand.name.clone())
    }
}

/// Context for parsing a single product detail document
#[derive(Debug, Clone)]
pub struct DetailParseContext {
    /// Product the document belongs to
    pub product_id: String,

    /// Feed-relative path of the document, for diagnostics
    pub path: String,
}

impl DetailParseContext {
    pub fn new(product_id: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            product_id: product_id.into(),
            path: path.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(values: &[&str]) -> HashSet<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn empty_policy_selects_nothing() {
        let policy = SelectionPolicy::default();
        assert!(policy.is_unfiltered());
        assert!(!policy.matches("151", "4242"));
    }

    #[test]
    fn single_sided_policies_ignore_the_other_side() {
        let by_category =
            SelectionPolicy::new(set(&["151"]), HashSet::new(), FilterCombinator::And);
        assert!(by_category.matches("151", "anything"));
        assert!(!by_category.matches("9999", "anything"));

        let by_supplier =
            SelectionPolicy::new(HashSet::new(), set(&["4242"]), FilterCombinator::And);
        assert!(by_supplier.matches("anything", "4242"));
        assert!(!by_supplier.matches("anything", "1"));
    }

    #[test]
    fn combinator_applies_when_both_sides_present() {
        let both_and = SelectionPolicy::new(set(&["151"]), set(&["4242"]), FilterCombinator::And);
        assert!(both_and.matches("151", "4242"));
        assert!(!both_and.matches("151", "1"));
        assert!(!both_and.matches("9", "4242"));

        let both_or = SelectionPolicy::new(set(&["151"]), set(&["4242"]), FilterCombinator::Or);
        assert!(both_or.matches("151", "1"));
        assert!(both_or.matches("9", "4242"));
        assert!(!both_or.matches("9", "1"));
    }

    #[test]
    fn supplier_names_resolve_through_context() {
        let mut table = HashMap::new();
        table.insert(
            "4242".to_string(),
            SupplierBrand {
                id: "4242".to_string(),
                name: "Chromatix".to_string(),
                logo_url: None,
            },
        );
        let context = ExtractContext::new(SelectionPolicy::default()).with_suppliers(&table);
        assert_eq!(context.supplier_name("4242").as_deref(), Some("Chromatix"));
        assert_eq!(context.supplier_name("1"), None);
    }
}
