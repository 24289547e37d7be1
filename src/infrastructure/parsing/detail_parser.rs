//! Product detail document parsing
//!
//! Whole-document event parse of one per-product detail XML into the
//! enrichment fields of a [`DetailDocument`]. The feed inconsistently
//! writes one-item groups as a bare element or a list; scalar fields
//! take the first entry, EAN codes and gallery pictures accumulate.
//! Feature elements and the per-document feature-group index are kept
//! raw for the mixin resolver.

use std::collections::HashMap;
use std::io::Read;

use flate2::read::GzDecoder;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::domain::{DetailDocument, MediaEntry};
use crate::infrastructure::parsing::context::DetailParseContext;
use crate::infrastructure::parsing::error::{ExtractError, ExtractResult};
use crate::infrastructure::parsing::index_extractor::attribute_value;
use crate::infrastructure::parsing::schema_cache::normalize_slug;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// One raw feature element, handed to the mixin resolver untyped
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawFeature {
    /// Feature-group id referencing the document's group index
    pub group_id: String,
    pub feature_id: String,
    /// Feature display name, normalized later into the schema slug
    pub name: String,
    pub presentation_value: String,
    /// Bare numeric value, present for measured features
    pub local_value: Option<String>,
    /// Unit sign from the measure block, when the feed carries one
    pub sign: Option<String>,
}

/// Parse result for one detail document
#[derive(Debug, Default)]
pub struct ParsedDetail {
    pub document: DetailDocument,
    /// Category display name, raw; slugged by the resolver
    pub category_name: Option<String>,
    /// Feature-group id to slugged group name
    pub group_index: HashMap<String, String>,
    /// Feature elements in document order
    pub features: Vec<RawFeature>,
}

/// Parser for per-product detail documents
#[derive(Debug, Default)]
pub struct DetailDocumentParser;

impl DetailDocumentParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse a detail document, transparently decompressing gzip input
    pub fn parse(&self, bytes: &[u8], context: &DetailParseContext) -> ExtractResult<ParsedDetail> {
        if bytes.starts_with(&GZIP_MAGIC) {
            let mut decoder = GzDecoder::new(bytes);
            let mut decompressed = Vec::new();
            decoder.read_to_end(&mut decompressed)?;
            self.parse_events(&decompressed, context)
        } else {
            self.parse_events(bytes, context)
        }
    }

    fn parse_events(&self, bytes: &[u8], context: &DetailParseContext) -> ExtractResult<ParsedDetail> {
        let mut reader = Reader::from_reader(bytes);
        let mut buf = Vec::with_capacity(4096);
        let mut stack: Vec<String> = Vec::new();
        let mut state = ParseState::default();

        loop {
            buf.clear();
            match reader.read_event_into(&mut buf)? {
                Event::Start(ref element) => {
                    let name = local_name(element);
                    state.element_opened(&stack, &name, element)?;
                    if name == "Sign"
                        && tail_is(&stack, &["Measure", "Signs"])
                        && state
                            .pending_feature
                            .as_ref()
                            .is_some_and(|feature| feature.sign.is_none())
                    {
                        state.capture_sign = true;
                    }
                    stack.push(name);
                }
                Event::Empty(ref element) => {
                    let name = local_name(element);
                    state.element_opened(&stack, &name, element)?;
                }
                Event::Text(ref text) => {
                    let text = text.unescape()?;
                    state.text(&stack, &text);
                }
                Event::CData(ref cdata) => {
                    let text = String::from_utf8_lossy(cdata);
                    state.text(&stack, &text);
                }
                Event::End(_) => {
                    state.element_closed(&stack);
                    stack.pop();
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !state.saw_product {
            return Err(ExtractError::malformed(
                "no product element found",
                Some(&context.path),
            ));
        }

        Ok(ParsedDetail {
            document: state.document,
            category_name: state.category_name,
            group_index: state.group_index,
            features: state.features,
        })
    }
}

#[derive(Default)]
struct ParseState {
    document: DetailDocument,
    category_name: Option<String>,
    group_index: HashMap<String, String>,
    features: Vec<RawFeature>,
    saw_product: bool,
    pending_group: Option<String>,
    pending_feature: Option<RawFeature>,
    title: String,
    long_summary: String,
    release_child: String,
    sign: String,
    capture_sign: bool,
}

impl ParseState {
    /// Handle an opening or self-closing element. `parent` is the open
    /// element path, excluding the element itself.
    fn element_opened(
        &mut self,
        parent: &[String],
        name: &str,
        element: &BytesStart<'_>,
    ) -> ExtractResult<()> {
        match name {
            "Product" => {
                self.saw_product = true;
                if let Some(date) = non_empty(attribute_value(element, "ReleaseDate")?) {
                    self.document.release_date = Some(date);
                }
            }
            "Date" if tail_is(parent, &["EndOfLifeDate"]) => {
                if self.document.end_of_life_date.is_none() {
                    self.document.end_of_life_date = non_empty(attribute_value(element, "Value")?);
                }
            }
            "ReasonToBuy" if tail_is(parent, &["ReasonsToBuy"]) => {
                if self.document.reasons_to_buy.is_none() {
                    self.document.reasons_to_buy = non_empty(attribute_value(element, "Value")?);
                }
            }
            "BulletPoint" if tail_is(parent, &["BulletPoints"]) => {
                if self.document.bullet_points.is_none() {
                    self.document.bullet_points = non_empty(attribute_value(element, "Value")?);
                }
            }
            "EANCode" if tail_is(parent, &["Product"]) => {
                if let Some(ean) = non_empty(attribute_value(element, "EAN")?) {
                    self.document.ean_codes.push(ean);
                }
            }
            "ProductDescription" if tail_is(parent, &["Product"]) => {
                self.document.long_description = non_empty(attribute_value(element, "LongDesc")?);
                self.document.warranty_info = non_empty(attribute_value(element, "WarrantyInfo")?);
                // Manual PDF falls back to the plain PDF link.
                self.document.manual_pdf_url = non_empty(attribute_value(element, "ManualPDFURL")?)
                    .or(non_empty(attribute_value(element, "PDFURL")?));
            }
            "ProductPicture" if tail_is(parent, &["ProductGallery"]) => {
                if let Some(original_url) = non_empty(attribute_value(element, "Original")?) {
                    let position = attribute_value(element, "No")?
                        .and_then(|no| no.parse::<u32>().ok())
                        .unwrap_or(self.document.media.len() as u32 + 1);
                    self.document.media.push(MediaEntry {
                        position,
                        original_url,
                    });
                }
            }
            "Name" if tail_is(parent, &["Product", "Category"]) => {
                if self.category_name.is_none() {
                    self.category_name = non_empty(attribute_value(element, "Value")?);
                }
            }
            "CategoryFeatureGroup" if tail_is(parent, &["Product"]) => {
                self.pending_group = attribute_value(element, "ID")?;
            }
            "Name" if tail_is(parent, &["CategoryFeatureGroup", "FeatureGroup"]) => {
                if let (Some(group_id), Some(value)) = (
                    self.pending_group.clone(),
                    non_empty(attribute_value(element, "Value")?),
                ) {
                    self.group_index.insert(group_id, normalize_slug(&value));
                }
            }
            "ProductFeature" if tail_is(parent, &["Product"]) => {
                self.pending_feature = Some(RawFeature {
                    group_id: attribute_value(element, "CategoryFeatureGroup_ID")?
                        .unwrap_or_default(),
                    presentation_value: attribute_value(element, "Presentation_Value")?
                        .unwrap_or_default(),
                    ..RawFeature::default()
                });
            }
            "LocalValue" if tail_is(parent, &["ProductFeature"]) => {
                if let Some(feature) = self.pending_feature.as_mut() {
                    feature.local_value = non_empty(attribute_value(element, "Value")?);
                }
            }
            "Feature" if tail_is(parent, &["ProductFeature"]) => {
                if let Some(feature) = self.pending_feature.as_mut() {
                    feature.feature_id = attribute_value(element, "ID")?.unwrap_or_default();
                }
            }
            "Name" if tail_is(parent, &["ProductFeature", "Feature"]) => {
                if let Some(feature) = self.pending_feature.as_mut() {
                    if feature.name.is_empty() {
                        feature.name = attribute_value(element, "Value")?.unwrap_or_default();
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// `stack` includes the element currently holding the text
    fn text(&mut self, stack: &[String], text: &str) {
        if self.capture_sign {
            self.sign.push_str(text);
        } else if tail_is(stack, &["Product", "GeneratedIntTitle"]) {
            self.title.push_str(text);
        } else if tail_is(stack, &["SummaryDescription", "LongSummaryDescription"]) {
            self.long_summary.push_str(text);
        } else if tail_is(stack, &["Product", "ReleaseDate"]) {
            self.release_child.push_str(text);
        }
    }

    /// Handle a closing element; `stack` still includes it
    fn element_closed(&mut self, stack: &[String]) {
        let Some(name) = stack.last() else { return };
        match name.as_str() {
            "GeneratedIntTitle" if tail_is(stack, &["Product", "GeneratedIntTitle"]) => {
                if self.document.title.is_none() {
                    self.document.title = trimmed(&self.title);
                }
                self.title.clear();
            }
            "LongSummaryDescription"
                if tail_is(stack, &["SummaryDescription", "LongSummaryDescription"]) =>
            {
                if self.document.long_summary.is_none() {
                    self.document.long_summary = trimmed(&self.long_summary);
                }
                self.long_summary.clear();
            }
            "ReleaseDate" if tail_is(stack, &["Product", "ReleaseDate"]) => {
                if self.document.release_date.is_none() {
                    self.document.release_date = trimmed(&self.release_child);
                }
                self.release_child.clear();
            }
            "Sign" => {
                if self.capture_sign {
                    if let Some(feature) = self.pending_feature.as_mut() {
                        feature.sign = trimmed(&self.sign);
                    }
                    self.capture_sign = false;
                    self.sign.clear();
                }
            }
            "CategoryFeatureGroup" => {
                self.pending_group = None;
            }
            "ProductFeature" => {
                if let Some(feature) = self.pending_feature.take() {
                    self.features.push(feature);
                }
            }
            _ => {}
        }
    }
}

fn local_name(element: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(element.local_name().as_ref()).into_owned()
}

fn tail_is(stack: &[String], suffix: &[&str]) -> bool {
    stack.len() >= suffix.len()
        && stack[stack.len() - suffix.len()..]
            .iter()
            .zip(suffix)
            .all(|(have, want)| have == want)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn trimmed(buffer: &str) -> Option<String> {
    let value = buffer.trim();
    (!value.is_empty()).then(|| value.to_string())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::Compression;
    use flate2::write::GzEncoder;

    use super::*;

    const SAMPLE_DETAIL: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ICECAT-interface>
  <Product ID="1001" ReleaseDate="2016-04-18" Title="index title, unused">
    <ProductDescription LongDesc="A fine notebook." PDFURL="https://pdfs.example.com/1001.pdf"
                        WarrantyInfo="2 years carry-in"/>
    <SummaryDescription>
      <ShortSummaryDescription>short text</ShortSummaryDescription>
      <LongSummaryDescription>Alpha 100, 39.6 cm display.</LongSummaryDescription>
    </SummaryDescription>
    <GeneratedIntTitle>Chromatix Alpha 100 Notebook</GeneratedIntTitle>
    <EndOfLifeDate><Date Value="2020-12-31"/></EndOfLifeDate>
    <ReasonsToBuy>
      <ReasonToBuy Value="Light and fast"/>
      <ReasonToBuy Value="second reason, dropped"/>
    </ReasonsToBuy>
    <BulletPoints>
      <BulletPoint Value="All-day battery"/>
      <BulletPoint Value="second bullet, dropped"/>
    </BulletPoints>
    <EANCode EAN="8711234567890"/>
    <EANCode EAN="8711234567891"/>
    <ProductGallery>
      <ProductPicture No="1" Original="https://images.example.com/img/gallery/1001_a.jpg"/>
      <ProductPicture No="2" Original="https://images.example.com/img/gallery/1001_b.jpg"/>
    </ProductGallery>
    <Category ID="151"><Name Value="Notebooks" langid="1"/></Category>
    <CategoryFeatureGroup ID="10074" No="1">
      <FeatureGroup ID="19"><Name Value="Display" langid="1"/></FeatureGroup>
    </CategoryFeatureGroup>
    <CategoryFeatureGroup ID="10081" No="2">
      <FeatureGroup ID="35"><Name Value="Ports / Interfaces"/></FeatureGroup>
    </CategoryFeatureGroup>
    <ProductFeature CategoryFeatureGroup_ID="10074" Presentation_Value="39.6 cm (15.6&#34;)">
      <LocalValue Value="39.6"/>
      <Feature ID="9007">
        <Name Value="Display diagonal" langid="1"/>
        <Measure ID="36"><Signs><Sign langid="1">cm</Sign></Signs></Measure>
      </Feature>
    </ProductFeature>
    <ProductFeature CategoryFeatureGroup_ID="10081" Presentation_Value="Y">
      <Feature ID="9009"><Name Value="Touchscreen"/></Feature>
    </ProductFeature>
  </Product>
</ICECAT-interface>"#;

    fn parse_sample() -> ParsedDetail {
        DetailDocumentParser::new()
            .parse(
                SAMPLE_DETAIL.as_bytes(),
                &DetailParseContext::new("1001", "details/1001.xml"),
            )
            .unwrap()
    }

    #[test]
    fn scalar_blocks_take_the_first_entry() {
        let parsed = parse_sample();
        let doc = &parsed.document;

        assert_eq!(doc.title.as_deref(), Some("Chromatix Alpha 100 Notebook"));
        assert_eq!(doc.long_description.as_deref(), Some("A fine notebook."));
        assert_eq!(
            doc.long_summary.as_deref(),
            Some("Alpha 100, 39.6 cm display.")
        );
        assert_eq!(doc.reasons_to_buy.as_deref(), Some("Light and fast"));
        assert_eq!(doc.bullet_points.as_deref(), Some("All-day battery"));
        assert_eq!(doc.end_of_life_date.as_deref(), Some("2020-12-31"));
        assert_eq!(doc.release_date.as_deref(), Some("2016-04-18"));
        assert_eq!(doc.warranty_info.as_deref(), Some("2 years carry-in"));
    }

    #[test]
    fn manual_pdf_falls_back_to_the_plain_pdf_link() {
        let parsed = parse_sample();
        assert_eq!(
            parsed.document.manual_pdf_url.as_deref(),
            Some("https://pdfs.example.com/1001.pdf")
        );
    }

    #[test]
    fn repeating_groups_accumulate_in_document_order() {
        let parsed = parse_sample();
        let doc = &parsed.document;

        assert_eq!(doc.ean_codes, vec!["8711234567890", "8711234567891"]);
        assert_eq!(doc.media.len(), 2);
        assert_eq!(doc.media[0].position, 1);
        assert_eq!(
            doc.media[0].original_url,
            "https://images.example.com/img/gallery/1001_a.jpg"
        );
        assert_eq!(doc.media[1].position, 2);
    }

    #[test]
    fn feature_groups_index_by_id_with_slugged_names() {
        let parsed = parse_sample();

        assert_eq!(parsed.category_name.as_deref(), Some("Notebooks"));
        assert_eq!(
            parsed.group_index.get("10074").map(String::as_str),
            Some("display")
        );
        assert_eq!(
            parsed.group_index.get("10081").map(String::as_str),
            Some("ports___interfaces")
        );
    }

    #[test]
    fn features_keep_raw_values_for_the_resolver() {
        let parsed = parse_sample();
        assert_eq!(parsed.features.len(), 2);

        let diagonal = &parsed.features[0];
        assert_eq!(diagonal.group_id, "10074");
        assert_eq!(diagonal.feature_id, "9007");
        assert_eq!(diagonal.name, "Display diagonal");
        assert_eq!(diagonal.presentation_value, "39.6 cm (15.6\")");
        assert_eq!(diagonal.local_value.as_deref(), Some("39.6"));
        assert_eq!(diagonal.sign.as_deref(), Some("cm"));

        let touch = &parsed.features[1];
        assert_eq!(touch.feature_id, "9009");
        assert_eq!(touch.presentation_value, "Y");
        assert_eq!(touch.local_value, None);
        assert_eq!(touch.sign, None);
    }

    #[test]
    fn gzip_documents_are_sniffed_and_decompressed() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(SAMPLE_DETAIL.as_bytes()).unwrap();
        let compressed = encoder.finish().unwrap();

        let parsed = DetailDocumentParser::new()
            .parse(
                &compressed,
                &DetailParseContext::new("1001", "details/1001.xml.gz"),
            )
            .unwrap();

        assert_eq!(
            parsed.document.title.as_deref(),
            Some("Chromatix Alpha 100 Notebook")
        );
    }

    #[test]
    fn document_without_a_product_element_is_malformed() {
        let error = DetailDocumentParser::new()
            .parse(
                b"<ICECAT-interface></ICECAT-interface>",
                &DetailParseContext::new("1001", "details/1001.xml"),
            )
            .unwrap_err();

        assert!(matches!(error, ExtractError::MalformedDocument { .. }));
        assert!(!error.is_recoverable());
    }
}
