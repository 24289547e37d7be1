//! Extraction configuration
//!
//! Element and attribute names the index extractor keys on, kept
//! configurable so daily and full feed variants can be handled with
//! the same extraction loop.

use serde::{Deserialize, Serialize};

/// Configuration for the streaming index extractor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Element name of a single catalog record in the index feed
    pub record_element: String,
    /// Wrapper element holding the per-country market entries
    pub markets_element: String,
    /// Entry element inside the markets wrapper
    pub market_entry_element: String,
    /// Attribute on a market entry carrying the country code
    pub market_value_attribute: String,
    /// Child subtrees skipped entirely during record folding
    pub excluded_children: Vec<String>,
    /// Fields that stay lists even when a single value is present
    pub list_valued_fields: Vec<String>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            record_element: "file".to_string(),
            markets_element: "Country_Markets".to_string(),
            market_entry_element: "Country_Market".to_string(),
            market_value_attribute: "Value".to_string(),
            excluded_children: vec!["EAN_UPCS".to_string(), "EAN_UPC".to_string()],
            list_valued_fields: vec!["country_markets".to_string()],
        }
    }
}

impl ExtractorConfig {
    pub fn is_excluded_child(&self, name: &str) -> bool {
        self.excluded_children.iter().any(|c| c == name)
    }

    pub fn is_list_valued(&self, field: &str) -> bool {
        self.list_valued_fields.iter().any(|f| f == field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_targets_index_records() {
        let config = ExtractorConfig::default();
        assert_eq!(config.record_element, "file");
        assert!(config.is_excluded_child("EAN_UPCS"));
        assert!(!config.is_excluded_child("Country_Markets"));
        assert!(config.is_list_valued("country_markets"));
    }
}
