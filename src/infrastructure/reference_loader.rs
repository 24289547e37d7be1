//! Reference table loading
//!
//! The vendor ships four small lookup files next to the catalog index:
//! suppliers, the category tree, languages and feature logos. Each is
//! streamed once per run and projected into the typed rows the import
//! stages consume. Rows missing their key attributes are skipped with a
//! debug log rather than failing the whole table.

use std::collections::HashMap;
use std::io::{BufReader, Read};
use std::sync::Arc;

use flate2::read::GzDecoder;
use quick_xml::Reader;
use quick_xml::events::Event;
use thiserror::Error;
use tracing::{debug, info};

use crate::domain::{
    CategoryIndex, CategoryNode, FeatureLogoRef, LanguageRef, ROOT_PARENT_ID, SupplierBrand,
};
use crate::infrastructure::blob_store::BlobStore;
use crate::infrastructure::config::FeedConfig;
use crate::infrastructure::parsing::error::{ExtractError, ExtractResult};
use crate::infrastructure::parsing::index_extractor::{attribute_value, raw_attributes};

pub const SUPPLIERS_FILE: &str = "SuppliersList.xml.gz";
pub const CATEGORIES_FILE: &str = "CategoriesList.xml.gz";
pub const LANGUAGES_FILE: &str = "LanguageList.xml.gz";
pub const FEATURE_LOGOS_FILE: &str = "FeatureLogosList.xml.gz";

const READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Errors raised while loading one of the vendor reference files.
#[derive(Error, Debug)]
pub enum ReferenceError {
    #[error("Reference file '{file}' could not be opened: {source}")]
    Open {
        file: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Reference file '{file}' could not be parsed: {source}")]
    Parse {
        file: String,
        #[source]
        source: ExtractError,
    },
}

impl ReferenceError {
    fn open(file: &str, source: anyhow::Error) -> Self {
        Self::Open {
            file: file.to_string(),
            source,
        }
    }

    fn parse(file: &str, source: ExtractError) -> Self {
        Self::Parse {
            file: file.to_string(),
            source,
        }
    }
}

/// All reference lookups for one import run.
#[derive(Debug, Clone, Default)]
pub struct ReferenceTables {
    pub categories: CategoryIndex,
    pub suppliers: HashMap<String, SupplierBrand>,
    pub languages: Vec<LanguageRef>,
    pub feature_logos: Vec<FeatureLogoRef>,
}

impl ReferenceTables {
    pub fn supplier(&self, id: &str) -> Option<&SupplierBrand> {
        self.suppliers.get(id)
    }

    pub fn language(&self, id: &str) -> Option<&LanguageRef> {
        self.languages.iter().find(|l| l.id == id)
    }

    /// Logos matching one product feature in one category.
    pub fn logos_for(&self, feature_id: &str, category_id: &str) -> Vec<&FeatureLogoRef> {
        self.feature_logos
            .iter()
            .filter(|logo| logo.applies_to(feature_id, category_id))
            .collect()
    }
}

/// Streams the four vendor reference files out of a blob store.
pub struct ReferenceLoader {
    store: Arc<dyn BlobStore>,
    language_id: String,
    suppliers_file: String,
    categories_file: String,
    languages_file: String,
    feature_logos_file: String,
}

impl ReferenceLoader {
    pub fn new(store: Arc<dyn BlobStore>, language_id: impl Into<String>) -> Self {
        Self {
            store,
            language_id: language_id.into(),
            suppliers_file: SUPPLIERS_FILE.to_string(),
            categories_file: CATEGORIES_FILE.to_string(),
            languages_file: LANGUAGES_FILE.to_string(),
            feature_logos_file: FEATURE_LOGOS_FILE.to_string(),
        }
    }

    /// Reads the file names from the configured feed layout instead of
    /// the vendor defaults.
    pub fn with_files(mut self, feed: &FeedConfig) -> Self {
        self.suppliers_file = feed.suppliers_file.clone();
        self.categories_file = feed.categories_file.clone();
        self.languages_file = feed.languages_file.clone();
        self.feature_logos_file = feed.feature_logos_file.clone();
        self
    }

    pub async fn load(&self) -> Result<ReferenceTables, ReferenceError> {
        let suppliers = parse_suppliers(self.reader_for(&self.suppliers_file).await?)
            .map_err(|error| ReferenceError::parse(&self.suppliers_file, error))?;
        let categories = parse_categories(
            self.reader_for(&self.categories_file).await?,
            &self.language_id,
        )
        .map_err(|error| ReferenceError::parse(&self.categories_file, error))?;
        let languages = parse_languages(self.reader_for(&self.languages_file).await?)
            .map_err(|error| ReferenceError::parse(&self.languages_file, error))?;
        let feature_logos = parse_feature_logos(
            self.reader_for(&self.feature_logos_file).await?,
            &self.language_id,
        )
        .map_err(|error| ReferenceError::parse(&self.feature_logos_file, error))?;

        info!(
            suppliers = suppliers.len(),
            categories = categories.len(),
            languages = languages.len(),
            feature_logos = feature_logos.len(),
            "📚 Reference tables loaded"
        );

        Ok(ReferenceTables {
            categories: CategoryIndex::from_nodes(categories),
            suppliers,
            languages,
            feature_logos,
        })
    }

    async fn reader_for(&self, name: &str) -> Result<XmlReader, ReferenceError> {
        let raw = self
            .store
            .open(name)
            .await
            .map_err(|error| ReferenceError::open(name, error))?;
        let source: Box<dyn Read + Send> = if name.ends_with(".gz") {
            Box::new(GzDecoder::new(BufReader::with_capacity(
                READ_BUFFER_SIZE,
                raw,
            )))
        } else {
            raw
        };
        Ok(Reader::from_reader(BufReader::with_capacity(
            READ_BUFFER_SIZE,
            source,
        )))
    }
}

type XmlReader = Reader<BufReader<Box<dyn Read + Send>>>;

fn parse_suppliers(mut reader: XmlReader) -> ExtractResult<HashMap<String, SupplierBrand>> {
    let mut buf = Vec::new();
    let mut suppliers = HashMap::new();
    loop {
        buf.clear();
        match reader.read_event_into(&mut buf)? {
            Event::Start(element) | Event::Empty(element)
                if element.local_name().as_ref() == b"Supplier" =>
            {
                let mut attrs = raw_attributes(&element)?;
                match (attrs.remove("ID"), attrs.remove("Name")) {
                    (Some(id), Some(name)) => {
                        suppliers.insert(
                            id.clone(),
                            SupplierBrand {
                                id,
                                name,
                                logo_url: attrs.remove("LogoOriginal").filter(|v| !v.is_empty()),
                            },
                        );
                    }
                    _ => debug!("Supplier row without ID or Name skipped"),
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(suppliers)
}

fn parse_categories(mut reader: XmlReader, language_id: &str) -> ExtractResult<Vec<CategoryNode>> {
    let mut buf = Vec::new();
    let mut nodes = Vec::new();
    loop {
        buf.clear();
        match reader.read_event_into(&mut buf)? {
            Event::Start(element) if element.local_name().as_ref() == b"Category" => {
                let Some(id) = attribute_value(&element, "ID")? else {
                    debug!("Category row without ID skipped");
                    skip_element(&mut reader, &mut buf)?;
                    continue;
                };
                nodes.push(fold_category(&mut reader, &mut buf, id, language_id)?);
            }
            Event::Empty(element) if element.local_name().as_ref() == b"Category" => {
                if let Some(id) = attribute_value(&element, "ID")? {
                    nodes.push(CategoryNode {
                        id,
                        name: "Unknown".to_string(),
                        parent_id: ROOT_PARENT_ID.to_string(),
                        description: None,
                    });
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(nodes)
}

/// Consumes one open category element. Name and description only count as
/// direct children in the run language; anything nested under
/// `ParentCategory` stays out of the node.
fn fold_category(
    reader: &mut XmlReader,
    buf: &mut Vec<u8>,
    id: String,
    language_id: &str,
) -> ExtractResult<CategoryNode> {
    let mut name: Option<String> = None;
    let mut parent_id: Option<String> = None;
    let mut description: Option<String> = None;
    let mut depth = 1u32;

    loop {
        buf.clear();
        match reader.read_event_into(buf)? {
            Event::Start(element) => {
                if depth == 1 {
                    fold_category_child(
                        &element, language_id, &mut name, &mut parent_id, &mut description,
                    )?;
                }
                depth += 1;
            }
            Event::Empty(element) => {
                if depth == 1 {
                    fold_category_child(
                        &element, language_id, &mut name, &mut parent_id, &mut description,
                    )?;
                }
            }
            Event::End(_) => {
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
            Event::Eof => {
                return Err(ExtractError::malformed(
                    "category element never closed",
                    None,
                ));
            }
            _ => {}
        }
    }

    Ok(CategoryNode {
        id,
        name: name.unwrap_or_else(|| "Unknown".to_string()),
        parent_id: parent_id.unwrap_or_else(|| ROOT_PARENT_ID.to_string()),
        description,
    })
}

fn fold_category_child(
    element: &quick_xml::events::BytesStart<'_>,
    language_id: &str,
    name: &mut Option<String>,
    parent_id: &mut Option<String>,
    description: &mut Option<String>,
) -> ExtractResult<()> {
    match element.local_name().as_ref() {
        b"Name" if name.is_none() => {
            if attribute_value(element, "langid")?.as_deref() == Some(language_id) {
                *name = attribute_value(element, "Value")?.filter(|v| !v.is_empty());
            }
        }
        b"ParentCategory" if parent_id.is_none() => {
            *parent_id = attribute_value(element, "ID")?;
        }
        b"Description" if description.is_none() => {
            if attribute_value(element, "langid")?.as_deref() == Some(language_id) {
                *description = attribute_value(element, "Value")?.filter(|v| !v.is_empty());
            }
        }
        _ => {}
    }
    Ok(())
}

fn parse_languages(mut reader: XmlReader) -> ExtractResult<Vec<LanguageRef>> {
    let mut buf = Vec::new();
    let mut languages = Vec::new();
    loop {
        buf.clear();
        match reader.read_event_into(&mut buf)? {
            Event::Start(element) | Event::Empty(element)
                if element.local_name().as_ref() == b"Language" =>
            {
                let mut attrs = raw_attributes(&element)?;
                match (
                    attrs.remove("ID"),
                    attrs.remove("Code"),
                    attrs.remove("ShortCode"),
                ) {
                    (Some(id), Some(code), Some(short_code)) => languages.push(LanguageRef {
                        id,
                        code,
                        short_code,
                    }),
                    _ => debug!("Language row without ID, Code or ShortCode skipped"),
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(languages)
}

fn parse_feature_logos(
    mut reader: XmlReader,
    language_id: &str,
) -> ExtractResult<Vec<FeatureLogoRef>> {
    let mut buf = Vec::new();
    let mut logos = Vec::new();
    loop {
        buf.clear();
        match reader.read_event_into(&mut buf)? {
            Event::Start(element) if element.local_name().as_ref() == b"FeatureLogo" => {
                let mut attrs = raw_attributes(&element)?;
                match (attrs.remove("ID"), attrs.remove("Feature_ID")) {
                    (Some(id), Some(feature_id)) => {
                        let image_url = attrs.remove("LogoPic").filter(|v| !v.is_empty());
                        logos.push(fold_feature_logo(
                            &mut reader,
                            &mut buf,
                            id,
                            feature_id,
                            image_url,
                            language_id,
                        )?);
                    }
                    _ => {
                        debug!("Feature logo row without ID or Feature_ID skipped");
                        skip_element(&mut reader, &mut buf)?;
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(logos)
}

/// What the logo walk is currently collecting text for.
enum LogoCapture {
    Description,
    Name,
}

/// Consumes one open feature logo element. The display name comes from the
/// logo value of the feature the logo is keyed on; category ids may appear
/// at any nesting depth.
fn fold_feature_logo(
    reader: &mut XmlReader,
    buf: &mut Vec<u8>,
    id: String,
    feature_id: String,
    image_url: Option<String>,
    language_id: &str,
) -> ExtractResult<FeatureLogoRef> {
    let mut name: Option<String> = None;
    let mut description: Option<String> = None;
    let mut category_ids = Vec::new();
    let mut depth = 1u32;
    let mut in_matching_feature = false;
    let mut capture: Option<LogoCapture> = None;
    let mut text = String::new();

    loop {
        buf.clear();
        match reader.read_event_into(buf)? {
            Event::Start(element) => {
                match element.local_name().as_ref() {
                    b"FeatureLogoCategory" => {
                        if let Some(catid) = attribute_value(&element, "catid")? {
                            category_ids.push(catid);
                        }
                    }
                    b"Description"
                        if description.is_none()
                            && attribute_value(&element, "langid")?.as_deref()
                                == Some(language_id) =>
                    {
                        capture = Some(LogoCapture::Description);
                        text.clear();
                    }
                    b"FeatureLogoFeature" => {
                        in_matching_feature =
                            attribute_value(&element, "ID")?.as_deref() == Some(&feature_id);
                    }
                    b"FeatureLogoValue" if in_matching_feature && name.is_none() => {
                        capture = Some(LogoCapture::Name);
                        text.clear();
                    }
                    _ => {}
                }
                depth += 1;
            }
            Event::Empty(element) => {
                if element.local_name().as_ref() == b"FeatureLogoCategory" {
                    if let Some(catid) = attribute_value(&element, "catid")? {
                        category_ids.push(catid);
                    }
                }
            }
            Event::Text(content) => {
                if capture.is_some() {
                    text.push_str(&content.unescape()?);
                }
            }
            Event::End(element) => {
                match element.local_name().as_ref() {
                    b"Description" | b"FeatureLogoValue" => {
                        if let Some(target) = capture.take() {
                            let value = text.trim().to_string();
                            if !value.is_empty() {
                                match target {
                                    LogoCapture::Description => description = Some(value),
                                    LogoCapture::Name => name = Some(value),
                                }
                            }
                        }
                    }
                    b"FeatureLogoFeature" => in_matching_feature = false,
                    _ => {}
                }
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
            Event::Eof => {
                return Err(ExtractError::malformed(
                    "feature logo element never closed",
                    None,
                ));
            }
            _ => {}
        }
    }

    Ok(FeatureLogoRef {
        id,
        feature_id,
        name,
        image_url,
        description,
        category_ids,
    })
}

/// Skips the rest of an element whose open tag was already consumed.
fn skip_element(reader: &mut XmlReader, buf: &mut Vec<u8>) -> ExtractResult<()> {
    let mut depth = 1u32;
    loop {
        buf.clear();
        match reader.read_event_into(buf)? {
            Event::Start(_) => depth += 1,
            Event::End(_) => {
                depth -= 1;
                if depth == 0 {
                    return Ok(());
                }
            }
            Event::Eof => {
                return Err(ExtractError::malformed("element never closed", None));
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::blob_store::FsBlobStore;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    const SUPPLIERS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ICECAT-interface>
  <SupplierMappings>
    <Supplier ID="5" Name="Acer" LogoOriginal="https://images.example.com/acer.png"/>
    <Supplier ID="7" Name="Lenovo" LogoOriginal=""/>
    <Supplier Name="No id"/>
  </SupplierMappings>
</ICECAT-interface>"#;

    const CATEGORIES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ICECAT-interface>
  <CategoriesList>
    <Category ID="151" Score="100">
      <Name ID="9" langid="1" Value="Notebooks"/>
      <Name langid="6" Value="Notebooki"/>
      <Description langid="1" Value="Portable computers"/>
      <ParentCategory ID="2636">
        <Names><Name langid="1" Value="Computers"/></Names>
      </ParentCategory>
    </Category>
    <Category ID="2636">
      <Name langid="1" Value="Computers"/>
      <ParentCategory ID="1"/>
    </Category>
    <Category ID="9999"/>
  </CategoriesList>
</ICECAT-interface>"#;

    const LANGUAGES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ICECAT-interface>
  <LanguageList>
    <Language ID="1" Code="en" ShortCode="EN"/>
    <Language ID="2" Code="nl" ShortCode="NL"/>
    <Language ID="99" Code="xx"/>
  </LanguageList>
</ICECAT-interface>"#;

    const FEATURE_LOGOS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ICECAT-interface>
  <FeatureLogosList>
    <FeatureLogo ID="401" Feature_ID="42" LogoPic="https://images.example.com/hd.png">
      <Descriptions>
        <Description langid="1">High definition display</Description>
        <Description langid="6">Wyswietlacz</Description>
      </Descriptions>
      <FeatureLogoCategories>
        <FeatureLogoCategory catid="151"/>
        <FeatureLogoCategory catid="2636"/>
      </FeatureLogoCategories>
      <FeatureLogoFeatures>
        <FeatureLogoFeature ID="41">
          <FeatureLogoValues><FeatureLogoValue>Wrong feature</FeatureLogoValue></FeatureLogoValues>
        </FeatureLogoFeature>
        <FeatureLogoFeature ID="42">
          <FeatureLogoValues><FeatureLogoValue>Full HD</FeatureLogoValue></FeatureLogoValues>
        </FeatureLogoFeature>
      </FeatureLogoFeatures>
    </FeatureLogo>
    <FeatureLogo ID="402" Feature_ID="77">
      <FeatureLogoCategories>
        <FeatureLogoCategory catid="151"/>
      </FeatureLogoCategories>
    </FeatureLogo>
  </FeatureLogosList>
</ICECAT-interface>"#;

    fn write_gz(path: &std::path::Path, content: &str) {
        let file = std::fs::File::create(path).unwrap();
        let mut encoder = GzEncoder::new(file, Compression::fast());
        encoder.write_all(content.as_bytes()).unwrap();
        encoder.finish().unwrap();
    }

    fn fixture_loader(dir: &std::path::Path) -> ReferenceLoader {
        write_gz(&dir.join(SUPPLIERS_FILE), SUPPLIERS_XML);
        write_gz(&dir.join(CATEGORIES_FILE), CATEGORIES_XML);
        write_gz(&dir.join(LANGUAGES_FILE), LANGUAGES_XML);
        write_gz(&dir.join(FEATURE_LOGOS_FILE), FEATURE_LOGOS_XML);
        ReferenceLoader::new(Arc::new(FsBlobStore::new(dir)), "1")
    }

    #[tokio::test]
    async fn loads_all_four_tables() {
        let dir = tempfile::tempdir().unwrap();
        let tables = fixture_loader(dir.path()).load().await.unwrap();

        assert_eq!(tables.suppliers.len(), 2);
        assert_eq!(tables.categories.len(), 3);
        assert_eq!(tables.languages.len(), 2);
        assert_eq!(tables.feature_logos.len(), 2);
    }

    #[tokio::test]
    async fn missing_reference_file_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ReferenceLoader::new(Arc::new(FsBlobStore::new(dir.path())), "1");

        let error = loader.load().await.unwrap_err();
        assert!(matches!(
            error,
            ReferenceError::Open { ref file, .. } if file == SUPPLIERS_FILE
        ));
    }

    #[tokio::test]
    async fn suppliers_keep_ids_and_drop_empty_logos() {
        let dir = tempfile::tempdir().unwrap();
        let tables = fixture_loader(dir.path()).load().await.unwrap();

        let acer = tables.supplier("5").unwrap();
        assert_eq!(acer.name, "Acer");
        assert_eq!(
            acer.logo_url.as_deref(),
            Some("https://images.example.com/acer.png")
        );
        assert_eq!(tables.supplier("7").unwrap().logo_url, None);
    }

    #[tokio::test]
    async fn categories_use_the_run_language_and_ignore_parent_names() {
        let dir = tempfile::tempdir().unwrap();
        let tables = fixture_loader(dir.path()).load().await.unwrap();

        let notebooks = tables.categories.get("151").unwrap();
        assert_eq!(notebooks.name, "Notebooks");
        assert_eq!(notebooks.parent_id, "2636");
        assert_eq!(notebooks.description.as_deref(), Some("Portable computers"));

        let computers = tables.categories.get("2636").unwrap();
        assert!(computers.is_root());

        // A bare category row still lands in the tree as a root placeholder.
        assert_eq!(tables.categories.get("9999").unwrap().name, "Unknown");
    }

    #[tokio::test]
    async fn language_lookup_drives_the_content_language_header() {
        let dir = tempfile::tempdir().unwrap();
        let tables = fixture_loader(dir.path()).load().await.unwrap();

        let english = tables.language("1").unwrap();
        assert_eq!(english.content_language(), "en");
        assert!(tables.language("99").is_none());
    }

    #[tokio::test]
    async fn feature_logos_match_name_by_their_own_feature_id() {
        let dir = tempfile::tempdir().unwrap();
        let tables = fixture_loader(dir.path()).load().await.unwrap();

        let hd = &tables.feature_logos[0];
        assert_eq!(hd.name.as_deref(), Some("Full HD"));
        assert_eq!(hd.description.as_deref(), Some("High definition display"));
        assert_eq!(hd.category_ids, vec!["151", "2636"]);

        let matches = tables.logos_for("42", "151");
        assert_eq!(matches.len(), 1);
        assert!(tables.logos_for("42", "8888").is_empty());
        assert!(tables.logos_for("41", "151").is_empty());

        // The second logo has no matching feature value and no image.
        let bare = &tables.feature_logos[1];
        assert_eq!(bare.name, None);
        assert_eq!(bare.image_url, None);
    }
}
