//! Error types for feed extraction and detail parsing
//!
//! Extraction errors distinguish recoverable per-record problems from
//! fatal document-level failures: a bad feature value drops that value,
//! a malformed index aborts the run.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Required field '{field}' not found in document")]
    RequiredFieldMissing {
        field: String,
        context: Option<String>,
    },

    #[error("Malformed document: {message}")]
    MalformedDocument {
        message: String,
        path: Option<String>,
    },

    #[error("Invalid numeric value for '{field}': {value}")]
    InvalidNumber { field: String, value: String },

    #[error("Feature group '{group_id}' not present in the document's group index")]
    UnknownFeatureGroup { group_id: String },

    #[error("Schema lookup failed for '{key}': {reason}")]
    SchemaLookupFailed { key: String, reason: String },

    #[error("XML reader error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Malformed attribute: {0}")]
    Attr(#[from] quick_xml::events::attributes::AttrError),

    #[error("I/O error while reading feed: {0}")]
    Io(#[from] std::io::Error),
}

impl ExtractError {
    /// Create a required field missing error with context
    pub fn required_field_missing(field: &str, context: Option<&str>) -> Self {
        Self::RequiredFieldMissing {
            field: field.to_string(),
            context: context.map(str::to_string),
        }
    }

    /// Create a malformed document error, optionally naming the blob
    pub fn malformed(message: impl Into<String>, path: Option<&str>) -> Self {
        Self::MalformedDocument {
            message: message.into(),
            path: path.map(str::to_string),
        }
    }

    /// Create an invalid number error
    pub fn invalid_number(field: &str, value: &str) -> Self {
        Self::InvalidNumber {
            field: field.to_string(),
            value: value.to_string(),
        }
    }

    /// Create a schema lookup error
    pub fn schema_lookup_failed(key: &str, reason: impl Into<String>) -> Self {
        Self::SchemaLookupFailed {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    /// Recoverable errors drop the affected value or record; the
    /// surrounding document keeps being processed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::RequiredFieldMissing { .. } => true,
            Self::InvalidNumber { .. } => true,
            Self::UnknownFeatureGroup { .. } => true,
            Self::SchemaLookupFailed { .. } => true,
            Self::MalformedDocument { .. } => false,
            Self::Xml(_) => false,
            Self::Attr(_) => true,
            Self::Io(_) => false,
        }
    }
}

pub type ExtractResult<T> = Result<T, ExtractError>;
