//! Streaming index-feed extraction
//!
//! Single-pass event parser over the (optionally gzipped) catalog index
//! XML. Record attributes are renamed through a fixed table, country
//! market entries are flattened into an ordered list, and records that
//! fail the selection policy are skipped without materializing their
//! subtree. The working set is bounded by tree depth, not feed size.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use once_cell::sync::Lazy;

use flate2::read::GzDecoder;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tracing::debug;

use crate::domain::CatalogRecord;
use crate::infrastructure::parsing::config::ExtractorConfig;
use crate::infrastructure::parsing::context::ExtractContext;
use crate::infrastructure::parsing::error::{ExtractError, ExtractResult};

/// Index attribute names mapped to their record field names. Attributes
/// not listed here pass through with their name lower-cased.
static ATTRIBUTE_RENAMES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("Product_ID", "product_id"),
        ("Updated", "updated"),
        ("Quality", "quality"),
        ("Supplier_id", "supplier_id"),
        ("Prod_ID", "prod_id"),
        ("Catid", "catid"),
        ("On_Market", "on_market"),
        ("Model_Name", "model_name"),
        ("Product_View", "product_view"),
        ("HighPic", "highpic"),
        ("HighPicSize", "highpicsize"),
        ("HighPicWidth", "highpicwidth"),
        ("HighPicHeight", "highpicheight"),
        ("Date_Added", "date_added"),
    ])
});

/// Reader abstraction for the feed's compression formats
enum FeedReader {
    /// Gzip compressed index
    Gzip(Reader<BufReader<GzDecoder<Box<dyn Read + Send>>>>),
    /// Uncompressed XML
    Plain(Reader<BufReader<Box<dyn Read + Send>>>),
}

impl FeedReader {
    fn read_event<'a>(&mut self, buf: &'a mut Vec<u8>) -> Result<Event<'a>, quick_xml::Error> {
        buf.clear();
        match self {
            FeedReader::Gzip(reader) => reader.read_event_into(buf),
            FeedReader::Plain(reader) => reader.read_event_into(buf),
        }
    }
}

/// Result of pulling one record from the index stream
#[derive(Debug)]
pub enum ExtractedItem {
    /// A record that passed the selection policy
    Record(CatalogRecord),
    /// A record dropped by the selection policy
    Skipped,
    /// End of the feed reached
    Eof,
}

/// Streaming extractor over a catalog index feed
pub struct IndexExtractor {
    reader: FeedReader,
    config: ExtractorConfig,
    records_seen: u64,
    records_kept: u64,
}

impl IndexExtractor {
    /// Open an index feed file, detecting gzip by extension
    pub fn open(path: impl AsRef<Path>, config: ExtractorConfig) -> ExtractResult<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let gzipped = path.extension().map(|ext| ext == "gz").unwrap_or(false)
            || path.to_string_lossy().ends_with(".xml.gz");
        Ok(Self::from_reader(Box::new(file), gzipped, config))
    }

    /// Build an extractor over an already-opened byte stream
    pub fn from_reader(input: Box<dyn Read + Send>, gzipped: bool, config: ExtractorConfig) -> Self {
        let reader = if gzipped {
            let decoder = GzDecoder::new(input);
            let buf_reader = BufReader::with_capacity(1024 * 1024, decoder); // 1MB buffer
            FeedReader::Gzip(Reader::from_reader(buf_reader))
        } else {
            let buf_reader = BufReader::with_capacity(1024 * 1024, input); // 1MB buffer
            FeedReader::Plain(Reader::from_reader(buf_reader))
        };

        Self {
            reader,
            config,
            records_seen: 0,
            records_kept: 0,
        }
    }

    /// Total record elements encountered so far
    pub fn records_seen(&self) -> u64 {
        self.records_seen
    }

    /// Records that passed the selection policy so far
    pub fn records_kept(&self) -> u64 {
        self.records_kept
    }

    /// Pull the next record from the stream.
    ///
    /// Non-matching records are consumed without building their subtree
    /// and reported as [`ExtractedItem::Skipped`] so callers can track
    /// progress through very large feeds.
    pub fn next_record(&mut self, context: &ExtractContext<'_>) -> ExtractResult<ExtractedItem> {
        let mut buf = Vec::with_capacity(8192);

        loop {
            let event = self.reader.read_event(&mut buf)?;

            match event {
                Event::Start(ref element) if self.is_record_element(element) => {
                    let attributes = raw_attributes(element)?;
                    self.records_seen += 1;

                    if !self.selected(context, &attributes) {
                        self.skip_subtree()?;
                        return Ok(ExtractedItem::Skipped);
                    }

                    let (children, markets) = self.fold_record_subtree()?;
                    let record = self.build_record(attributes, children, markets, context)?;
                    self.records_kept += 1;
                    return Ok(ExtractedItem::Record(record));
                }
                Event::Empty(ref element) if self.is_record_element(element) => {
                    let attributes = raw_attributes(element)?;
                    self.records_seen += 1;

                    if !self.selected(context, &attributes) {
                        return Ok(ExtractedItem::Skipped);
                    }

                    let record =
                        self.build_record(attributes, BTreeMap::new(), Vec::new(), context)?;
                    self.records_kept += 1;
                    return Ok(ExtractedItem::Record(record));
                }
                Event::Eof => return Ok(ExtractedItem::Eof),
                _ => {}
            }
        }
    }

    /// Drain the remaining stream into a record set
    pub fn records(&mut self, context: &ExtractContext<'_>) -> ExtractResult<Vec<CatalogRecord>> {
        let mut records = Vec::new();
        loop {
            match self.next_record(context)? {
                ExtractedItem::Record(record) => records.push(record),
                ExtractedItem::Skipped => continue,
                ExtractedItem::Eof => break,
            }
        }
        Ok(records)
    }

    fn is_record_element(&self, element: &BytesStart<'_>) -> bool {
        element.local_name().as_ref() == self.config.record_element.as_bytes()
    }

    /// The policy is evaluated on the raw attribute names, before any
    /// renaming, so a skipped record costs no field mapping work.
    fn selected(&self, context: &ExtractContext<'_>, attributes: &HashMap<String, String>) -> bool {
        let category = attributes.get("Catid").map(String::as_str).unwrap_or("");
        let supplier = attributes.get("Supplier_id").map(String::as_str).unwrap_or("");
        context.policy.matches(category, supplier)
    }

    /// Consume events until the current record element closes
    fn skip_subtree(&mut self) -> ExtractResult<()> {
        let mut buf = Vec::with_capacity(1024);
        let mut depth = 1u32;

        loop {
            match self.reader.read_event(&mut buf)? {
                Event::Start(_) => depth += 1,
                Event::End(_) => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                Event::Eof => {
                    return Err(ExtractError::malformed(
                        "feed ended inside a record subtree",
                        None,
                    ));
                }
                _ => {}
            }
        }
    }

    /// Fold the children of a matched record into text values, pulling
    /// country market entries out into their own ordered list.
    fn fold_record_subtree(
        &mut self,
    ) -> ExtractResult<(BTreeMap<String, Vec<String>>, Vec<String>)> {
        let mut children: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut markets: Vec<String> = Vec::new();
        let mut buf = Vec::with_capacity(4096);
        let mut depth = 1u32;
        let mut capture: Option<(String, String)> = None;
        let mut excluded_until: Option<u32> = None;

        loop {
            let event = self.reader.read_event(&mut buf)?;

            match event {
                Event::Start(ref element) => {
                    let name = String::from_utf8_lossy(element.local_name().as_ref()).into_owned();
                    if excluded_until.is_none() {
                        if name == self.config.market_entry_element {
                            if let Some(value) =
                                attribute_value(element, &self.config.market_value_attribute)?
                            {
                                markets.push(value);
                            }
                        } else if depth == 1 {
                            if self.config.is_excluded_child(&name) {
                                excluded_until = Some(depth);
                            } else if name != self.config.markets_element {
                                capture = Some((name.to_lowercase(), String::new()));
                            }
                        }
                    }
                    depth += 1;
                }
                Event::Empty(ref element) => {
                    let name = String::from_utf8_lossy(element.local_name().as_ref()).into_owned();
                    if excluded_until.is_none() {
                        if name == self.config.market_entry_element {
                            if let Some(value) =
                                attribute_value(element, &self.config.market_value_attribute)?
                            {
                                markets.push(value);
                            }
                        } else if depth == 1
                            && !self.config.is_excluded_child(&name)
                            && name != self.config.markets_element
                        {
                            children
                                .entry(name.to_lowercase())
                                .or_default()
                                .push(String::new());
                        }
                    }
                }
                Event::Text(ref text) => {
                    if excluded_until.is_none() {
                        if let Some((_, value)) = capture.as_mut() {
                            value.push_str(&text.unescape()?);
                        }
                    }
                }
                Event::CData(ref cdata) => {
                    if excluded_until.is_none() {
                        if let Some((_, value)) = capture.as_mut() {
                            value.push_str(&String::from_utf8_lossy(cdata));
                        }
                    }
                }
                Event::End(_) => {
                    depth -= 1;
                    if let Some(marker) = excluded_until {
                        if depth == marker {
                            excluded_until = None;
                        }
                    } else if depth == 1 {
                        if let Some((name, value)) = capture.take() {
                            children
                                .entry(name)
                                .or_default()
                                .push(value.trim().to_string());
                        }
                    }
                    if depth == 0 {
                        return Ok((children, markets));
                    }
                }
                Event::Eof => {
                    return Err(ExtractError::malformed(
                        "feed ended inside a record subtree",
                        None,
                    ));
                }
                _ => {}
            }
        }
    }

    fn build_record(
        &self,
        attributes: HashMap<String, String>,
        children: BTreeMap<String, Vec<String>>,
        markets: Vec<String>,
        context: &ExtractContext<'_>,
    ) -> ExtractResult<CatalogRecord> {
        let mut fields: HashMap<String, String> = HashMap::with_capacity(attributes.len());
        for (key, value) in attributes {
            let renamed = ATTRIBUTE_RENAMES
                .get(key.as_str())
                .map(|mapped| (*mapped).to_string())
                .unwrap_or_else(|| key.to_lowercase());
            fields.insert(renamed, value);
        }

        let product_id = take_required(&mut fields, "product_id", &context.source)?;
        let supplier_id = take_required(&mut fields, "supplier_id", &context.source)?;
        let catid = take_required(&mut fields, "catid", &context.source)?;
        let path = take_required(&mut fields, "path", &context.source)?;

        let on_market = fields
            .remove("on_market")
            .map(|value| value == "1")
            .unwrap_or(false);

        let product_view = match fields.remove("product_view") {
            Some(raw) => raw.parse::<u64>().unwrap_or_else(|_| {
                debug!(product_id = %product_id, value = %raw, "Unparseable view count, using 0");
                0
            }),
            None => 0,
        };

        let supplier = context.supplier_name(&supplier_id);
        if supplier.is_none() && context.suppliers.is_some() {
            debug!(product_id = %product_id, supplier_id = %supplier_id, "Supplier id not in reference table");
        }

        let mut record = CatalogRecord {
            product_id,
            supplier_id,
            supplier,
            catid,
            path,
            on_market,
            product_view,
            country_markets: markets,
            prod_id: fields.remove("prod_id"),
            model_name: fields.remove("model_name"),
            quality: fields.remove("quality"),
            updated: fields.remove("updated"),
            date_added: fields.remove("date_added"),
            highpic: fields.remove("highpic"),
            extra: fields,
            detail: None,
        };

        // Repeated children keep the last value; attributes win over a
        // same-named child element.
        for (name, values) in children {
            if let Some(value) = values.into_iter().last() {
                record.extra.entry(name).or_insert(value);
            }
        }

        Ok(record)
    }
}

pub(crate) fn raw_attributes(element: &BytesStart<'_>) -> ExtractResult<HashMap<String, String>> {
    let mut attributes = HashMap::new();
    for attribute in element.attributes() {
        let attribute = attribute?;
        let key = String::from_utf8_lossy(attribute.key.local_name().as_ref()).into_owned();
        let value = attribute.unescape_value()?.into_owned();
        attributes.insert(key, value);
    }
    Ok(attributes)
}

pub(crate) fn attribute_value(element: &BytesStart<'_>, name: &str) -> ExtractResult<Option<String>> {
    for attribute in element.attributes() {
        let attribute = attribute?;
        if attribute.key.local_name().as_ref() == name.as_bytes() {
            return Ok(Some(attribute.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

fn take_required(
    fields: &mut HashMap<String, String>,
    field: &str,
    source: &str,
) -> ExtractResult<String> {
    fields
        .remove(field)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ExtractError::required_field_missing(field, Some(source)))
}
