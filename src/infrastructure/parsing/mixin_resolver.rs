//! Mixin resolution
//!
//! Turns raw product features into typed mixin attributes using the
//! per-category feature schema. Resolution is idempotent per
//! (group, attribute) and fails at single-feature granularity: a bad
//! value drops that value, never the document.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::domain::{DetailDocument, MixinValue};
use crate::infrastructure::parsing::detail_parser::{ParsedDetail, RawFeature};
use crate::infrastructure::parsing::error::{ExtractError, ExtractResult};
use crate::infrastructure::parsing::schema_cache::{SchemaCache, SchemaEntry, normalize_slug};

/// Resolves raw features into typed mixin values through the schema cache
pub struct MixinResolver {
    cache: Arc<SchemaCache>,
}

impl MixinResolver {
    pub fn new(cache: Arc<SchemaCache>) -> Self {
        Self { cache }
    }

    /// Resolve every feature of a parsed detail document.
    ///
    /// Consumes the raw features and fills `mixins`, `metadata_refs` and
    /// `feature_ids` of the document. Returns the number of features that
    /// resolved cleanly; the rest are logged and skipped.
    pub async fn resolve_all(&self, parsed: &mut ParsedDetail) -> usize {
        let Some(category) = parsed.category_name.clone() else {
            debug!("Detail document carries no category name, features skipped");
            return 0;
        };
        let category_slug = normalize_slug(&category);
        let features = std::mem::take(&mut parsed.features);
        let mut resolved = 0usize;

        for feature in &features {
            match self
                .resolve_feature(
                    &category_slug,
                    &parsed.group_index,
                    feature,
                    &mut parsed.document,
                )
                .await
            {
                Ok(()) => resolved += 1,
                Err(error) => {
                    debug!(
                        feature_id = %feature.feature_id,
                        feature = %feature.name,
                        error = %error,
                        "Feature not resolved"
                    );
                }
            }
        }

        resolved
    }

    async fn resolve_feature(
        &self,
        category_slug: &str,
        group_index: &HashMap<String, String>,
        feature: &RawFeature,
        document: &mut DetailDocument,
    ) -> ExtractResult<()> {
        let group_slug = group_index.get(&feature.group_id).ok_or_else(|| {
            ExtractError::UnknownFeatureGroup {
                group_id: feature.group_id.clone(),
            }
        })?;

        let key = format!("{category_slug}-{group_slug}");
        let schema = self.cache.get(&key).await?;

        if !document.metadata_refs.contains_key(group_slug) {
            document
                .metadata_refs
                .insert(group_slug.clone(), self.cache.schema_url(&key));
            document.mixins.entry(group_slug.clone()).or_default();
        }

        // Kept for label matching even when the value below fails.
        document.feature_ids.push(feature.feature_id.clone());

        let feature_slug = normalize_slug(&feature.name);
        let group_values = document.mixins.entry(group_slug.clone()).or_default();
        if group_values.contains_key(&feature_slug) {
            return Ok(());
        }

        let Some(entry) = schema.properties.get(&feature_slug) else {
            return Err(ExtractError::schema_lookup_failed(
                &key,
                format!("no property '{feature_slug}'"),
            ));
        };

        if let Some(value) = typed_value(&key, entry, feature)? {
            group_values.insert(feature_slug, value);
        }
        Ok(())
    }
}

/// Coerce one feature into its schema-typed value.
///
/// `Ok(None)` is the two-bound range form, which computes its bounds but
/// never stores a value.
fn typed_value(
    key: &str,
    entry: &SchemaEntry,
    feature: &RawFeature,
) -> ExtractResult<Option<MixinValue>> {
    if let Some(reference) = &entry.reference {
        let local = feature
            .local_value
            .as_deref()
            .ok_or_else(|| ExtractError::required_field_missing("LocalValue", Some(&feature.name)))?;

        let uom = match &feature.sign {
            Some(sign) => sign.clone(),
            None => derive_uom(&feature.presentation_value, local, &feature.name)?,
        };

        if reference.contains("atomic_uom") {
            let value = local
                .trim()
                .parse::<f64>()
                .map_err(|_| ExtractError::invalid_number(&feature.name, local))?;
            return Ok(Some(MixinValue::Measured { value, uom }));
        }

        let parts: Vec<&str> = local.split('-').collect();
        let first_value = parts[0]
            .trim()
            .parse::<f64>()
            .map_err(|_| ExtractError::invalid_number(&feature.name, local))?;
        if parts.len() == 2 {
            return Ok(None);
        }
        return Ok(Some(MixinValue::Range {
            first_value,
            to_value: 1,
            uom,
        }));
    }

    match entry.kind.first() {
        Some("string") => Ok(Some(MixinValue::Text(feature.presentation_value.clone()))),
        Some("number") => {
            let value = feature
                .presentation_value
                .trim()
                .parse::<i64>()
                .map_err(|_| {
                    ExtractError::invalid_number(&feature.name, &feature.presentation_value)
                })?;
            Ok(Some(MixinValue::Integer(value)))
        }
        Some(_) => Ok(Some(MixinValue::Flag(feature.presentation_value == "Y"))),
        None => Err(ExtractError::schema_lookup_failed(
            key,
            "property has neither $ref nor type",
        )),
    }
}

/// Unit of measure when the measure block carries no sign: the text left
/// after the local value inside the presentation value.
fn derive_uom(presentation: &str, local: &str, feature_name: &str) -> ExtractResult<String> {
    presentation
        .split_once(local)
        .map(|(_, after)| after.trim().to_string())
        .ok_or_else(|| ExtractError::required_field_missing("unit", Some(feature_name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::blob_store::FsBlobStore;
    use std::path::Path;

    const DISPLAY_SCHEMA: &str = r#"{
        "properties": {
            "display_diagonal": { "$ref": "https://schemas.example.com/atomic_uom.json" },
            "usable_range": { "$ref": "https://schemas.example.com/range_uom.json" },
            "touchscreen": { "type": ["boolean", "null"] },
            "display_brand": { "type": "string" },
            "pixel_density": { "type": ["number", "null"] }
        }
    }"#;

    fn schema_fixture(dir: &Path) -> Arc<SchemaCache> {
        std::fs::create_dir_all(dir.join("schemas")).unwrap();
        std::fs::write(dir.join("schemas/notebooks-display.json"), DISPLAY_SCHEMA).unwrap();
        Arc::new(SchemaCache::new(
            Arc::new(FsBlobStore::new(dir)),
            "schemas",
            "https://schemas.example.com",
        ))
    }

    fn display_feature(name: &str, presentation: &str) -> RawFeature {
        RawFeature {
            group_id: "10074".to_string(),
            feature_id: "9000".to_string(),
            name: name.to_string(),
            presentation_value: presentation.to_string(),
            local_value: None,
            sign: None,
        }
    }

    fn parsed_with(features: Vec<RawFeature>) -> ParsedDetail {
        ParsedDetail {
            document: DetailDocument::default(),
            category_name: Some("Notebooks".to_string()),
            group_index: HashMap::from([("10074".to_string(), "display".to_string())]),
            features,
        }
    }

    #[tokio::test]
    async fn measured_boolean_string_and_number_values_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let cache = schema_fixture(dir.path());
        let resolver = MixinResolver::new(Arc::clone(&cache));

        let mut diagonal = display_feature("Display diagonal", "39.6 cm (15.6\")");
        diagonal.feature_id = "9007".to_string();
        diagonal.local_value = Some("39.6".to_string());
        diagonal.sign = Some("cm".to_string());

        let mut parsed = parsed_with(vec![
            diagonal,
            display_feature("Touchscreen", "Y"),
            display_feature("Display brand", "Chromatix"),
            display_feature("Pixel density", "141"),
        ]);

        let resolved = resolver.resolve_all(&mut parsed).await;
        assert_eq!(resolved, 4);

        let display = &parsed.document.mixins["display"];
        assert_eq!(
            display["display_diagonal"],
            MixinValue::Measured {
                value: 39.6,
                uom: "cm".to_string()
            }
        );
        assert_eq!(display["touchscreen"], MixinValue::Flag(true));
        assert_eq!(
            display["display_brand"],
            MixinValue::Text("Chromatix".to_string())
        );
        assert_eq!(display["pixel_density"], MixinValue::Integer(141));

        assert_eq!(
            parsed.document.metadata_refs.get("display").map(String::as_str),
            Some("https://schemas.example.com/notebooks-display.json")
        );
        assert_eq!(parsed.document.feature_ids.len(), 4);
        assert_eq!(cache.fetch_count(), 1);
    }

    #[tokio::test]
    async fn uom_derives_from_the_presentation_value_without_a_sign() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = MixinResolver::new(schema_fixture(dir.path()));

        let mut diagonal = display_feature("Display diagonal", "39.6 cm (15.6\")");
        diagonal.local_value = Some("39.6".to_string());

        let mut parsed = parsed_with(vec![diagonal]);
        resolver.resolve_all(&mut parsed).await;

        assert_eq!(
            parsed.document.mixins["display"]["display_diagonal"],
            MixinValue::Measured {
                value: 39.6,
                uom: "cm (15.6\")".to_string()
            }
        );
    }

    #[tokio::test]
    async fn single_bound_ranges_attach_and_double_bounds_do_not() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = MixinResolver::new(schema_fixture(dir.path()));

        let mut single = display_feature("Usable range", "10 m");
        single.local_value = Some("10".to_string());
        single.sign = Some("m".to_string());

        let mut parsed = parsed_with(vec![single]);
        resolver.resolve_all(&mut parsed).await;
        assert_eq!(
            parsed.document.mixins["display"]["usable_range"],
            MixinValue::Range {
                first_value: 10.0,
                to_value: 1,
                uom: "m".to_string()
            }
        );

        let mut double = display_feature("Usable range", "10 - 20 m");
        double.local_value = Some("10 - 20".to_string());
        double.sign = Some("m".to_string());

        let mut parsed = parsed_with(vec![double]);
        resolver.resolve_all(&mut parsed).await;
        assert!(!parsed.document.mixins["display"].contains_key("usable_range"));
        // The feature id still lands in the list for label matching.
        assert_eq!(parsed.document.feature_ids, vec!["9000"]);
    }

    #[tokio::test]
    async fn duplicate_attributes_resolve_once_with_a_single_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let cache = schema_fixture(dir.path());
        let resolver = MixinResolver::new(Arc::clone(&cache));

        let mut parsed = parsed_with(vec![
            display_feature("Touchscreen", "Y"),
            display_feature("Touchscreen", "N"),
        ]);
        resolver.resolve_all(&mut parsed).await;

        // First value wins, one schema read.
        assert_eq!(
            parsed.document.mixins["display"]["touchscreen"],
            MixinValue::Flag(true)
        );
        assert_eq!(cache.fetch_count(), 1);
        assert_eq!(parsed.document.feature_ids.len(), 2);
    }

    #[tokio::test]
    async fn unknown_groups_and_unknown_properties_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = MixinResolver::new(schema_fixture(dir.path()));

        let mut orphan = display_feature("Touchscreen", "Y");
        orphan.group_id = "99999".to_string();

        let mut parsed = parsed_with(vec![
            orphan,
            display_feature("Unlisted feature", "whatever"),
        ]);
        let resolved = resolver.resolve_all(&mut parsed).await;

        assert_eq!(resolved, 0);
        assert!(
            parsed
                .document
                .mixins
                .get("display")
                .is_none_or(|group| group.is_empty())
        );
    }

    #[tokio::test]
    async fn non_numeric_values_never_poison_the_document() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = MixinResolver::new(schema_fixture(dir.path()));

        let mut parsed = parsed_with(vec![
            display_feature("Pixel density", "many"),
            display_feature("Touchscreen", "N"),
        ]);
        let resolved = resolver.resolve_all(&mut parsed).await;

        assert_eq!(resolved, 1);
        let display = &parsed.document.mixins["display"];
        assert!(!display.contains_key("pixel_density"));
        assert_eq!(display["touchscreen"], MixinValue::Flag(false));
    }
}
