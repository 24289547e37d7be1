//! Typed rows of the vendor reference files
//!
//! Suppliers, languages and feature logos are small lookup tables loaded
//! once per run. The category tree has its own module because it carries
//! traversal logic.

use serde::{Deserialize, Serialize};

/// One supplier row, used to resolve display names and to create brands.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SupplierBrand {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
}

/// One language row; `short_code` drives the Content-Language header.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LanguageRef {
    pub id: String,
    pub code: String,
    pub short_code: String,
}

impl LanguageRef {
    /// Wire form of the short code, e.g. "EN" becomes "en".
    pub fn content_language(&self) -> String {
        self.short_code.to_lowercase()
    }
}

/// One feature logo row, matched against product features to import
/// labels. `category_ids` restricts the logo to specific categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureLogoRef {
    pub id: String,
    pub feature_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub category_ids: Vec<String>,
}

impl FeatureLogoRef {
    /// A logo applies when the product carries the feature and the
    /// product category is in the logo's category list.
    pub fn applies_to(&self, feature_id: &str, category_id: &str) -> bool {
        self.feature_id == feature_id && self.category_ids.iter().any(|c| c == category_id)
    }
}
