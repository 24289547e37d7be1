//! Catalog record domain model
//!
//! A `CatalogRecord` starts as the attribute skeleton extracted from the
//! vendor index feed and is later enriched with a `DetailDocument` parsed
//! from the per-product detail XML. Field names follow the feed-internal
//! snake_case naming produced by the attribute rename step.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// One product row from the vendor index feed.
///
/// `extra` carries pass-through attributes that have no dedicated field;
/// their keys are already lower-cased by the extractor.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CatalogRecord {
    pub product_id: String,
    pub supplier_id: String,
    /// Supplier display name resolved from the supplier reference table.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supplier: Option<String>,
    pub catid: String,
    /// Relative path of the per-product detail document inside the feed.
    pub path: String,
    pub on_market: bool,
    pub product_view: u64,
    /// Always present for selected records, even when the feed lists none.
    pub country_markets: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prod_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_added: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highpic: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<DetailDocument>,
}

impl CatalogRecord {
    /// Display name used in product payloads: generated title first,
    /// then the index model name, then the product id.
    pub fn display_name(&self) -> &str {
        if let Some(detail) = &self.detail {
            if let Some(title) = &detail.title {
                if !title.is_empty() {
                    return title;
                }
            }
        }
        match &self.model_name {
            Some(name) if !name.is_empty() => name,
            _ => &self.product_id,
        }
    }

    /// Long description used in product payloads, falling back to the
    /// summary text when the vendor supplies no full description.
    pub fn description(&self) -> Option<&str> {
        let detail = self.detail.as_ref()?;
        detail
            .long_description
            .as_deref()
            .filter(|text| !text.is_empty())
            .or(detail.long_summary.as_deref())
    }

    pub fn release_date(&self) -> Option<&str> {
        self.detail.as_ref()?.release_date.as_deref()
    }

    pub fn ean_codes(&self) -> &[String] {
        self.detail.as_ref().map_or(&[], |d| d.ean_codes.as_slice())
    }

    pub fn media(&self) -> &[MediaEntry] {
        self.detail.as_ref().map_or(&[], |d| d.media.as_slice())
    }

    pub fn feature_ids(&self) -> &[String] {
        self.detail
            .as_ref()
            .map_or(&[], |d| d.feature_ids.as_slice())
    }

    /// Records without resolved mixins are excluded from submission.
    pub fn has_mixins(&self) -> bool {
        self.detail.as_ref().is_some_and(|d| !d.mixins.is_empty())
    }

    pub fn with_detail(mut self, detail: DetailDocument) -> Self {
        self.detail = Some(detail);
        self
    }
}

/// Enrichment parsed from one per-product detail document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DetailDocument {
    /// Generated international title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub long_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub long_summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manual_pdf_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warranty_info: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_of_life_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasons_to_buy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bullet_points: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_date: Option<String>,
    /// Always present, possibly empty.
    pub ean_codes: Vec<String>,
    pub media: Vec<MediaEntry>,
    /// Feature ids seen on the product, in document order.
    pub feature_ids: Vec<String>,
    /// Resolved feature values grouped by feature-group slug.
    pub mixins: BTreeMap<String, BTreeMap<String, MixinValue>>,
    /// Schema URL per feature-group slug, for payload metadata.
    pub metadata_refs: BTreeMap<String, String>,
}

/// One gallery image reference from a detail document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MediaEntry {
    pub position: u32,
    pub original_url: String,
}

/// A schema-typed feature value ready for JSON submission.
///
/// The wire shape is decided by the feature schema: measured values and
/// ranges serialize as objects, everything else as a bare JSON scalar.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MixinValue {
    Measured {
        value: f64,
        uom: String,
    },
    Range {
        #[serde(rename = "firstValue")]
        first_value: f64,
        #[serde(rename = "toValue")]
        to_value: i64,
        uom: String,
    },
    Integer(i64),
    Flag(bool),
    Text(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record_with_title(title: Option<&str>, model_name: Option<&str>) -> CatalogRecord {
        CatalogRecord {
            product_id: "4242".into(),
            model_name: model_name.map(String::from),
            detail: title.map(|t| DetailDocument {
                title: Some(t.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn display_name_prefers_generated_title() {
        let record = record_with_title(Some("Acme Phone 12 128GB"), Some("Phone 12"));
        assert_eq!(record.display_name(), "Acme Phone 12 128GB");
    }

    #[test]
    fn display_name_falls_back_to_model_name_then_id() {
        let record = record_with_title(None, Some("Phone 12"));
        assert_eq!(record.display_name(), "Phone 12");

        let record = record_with_title(None, None);
        assert_eq!(record.display_name(), "4242");
    }

    #[test]
    fn description_falls_back_to_summary() {
        let mut record = record_with_title(None, None);
        record.detail = Some(DetailDocument {
            long_summary: Some("short pitch".into()),
            ..Default::default()
        });
        assert_eq!(record.description(), Some("short pitch"));
    }

    #[test]
    fn records_without_resolved_features_have_no_mixins() {
        let record = record_with_title(Some("t"), None);
        assert!(!record.has_mixins());
    }

    #[test]
    fn mixin_values_serialize_to_schema_shapes() {
        let measured = MixinValue::Measured {
            value: 1.6,
            uom: "GHz".into(),
        };
        assert_eq!(
            serde_json::to_value(&measured).unwrap(),
            json!({"value": 1.6, "uom": "GHz"})
        );

        let range = MixinValue::Range {
            first_value: 10.0,
            to_value: 1,
            uom: "cm".into(),
        };
        assert_eq!(
            serde_json::to_value(&range).unwrap(),
            json!({"firstValue": 10.0, "toValue": 1, "uom": "cm"})
        );

        assert_eq!(serde_json::to_value(MixinValue::Flag(true)).unwrap(), json!(true));
        assert_eq!(serde_json::to_value(MixinValue::Integer(8)).unwrap(), json!(8));
    }
}
