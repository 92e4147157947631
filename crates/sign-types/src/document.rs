//! Document types for the signature system.
//!
//! A `Document` is a file the caller wants signed. Once the transaction is
//! completed, drivers return `DocumentResult` values wrapping the document
//! identity with the signed content.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Free-form document metadata, kept in insertion order.
pub type Metadata = IndexMap<String, MetadataValue>;

/// A scalar metadata value.
///
/// Providers that support metadata round-trip these values; the untagged
/// representation keeps the JSON shape identical to what the caller supplied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
	Bool(bool),
	Integer(i64),
	Float(f64),
	String(String),
}

impl MetadataValue {
	/// Builds a metadata value from a JSON scalar. Objects, arrays and
	/// nulls have no scalar representation and yield `None`.
	pub fn from_json(value: &serde_json::Value) -> Option<Self> {
		match value {
			serde_json::Value::Bool(b) => Some(Self::Bool(*b)),
			serde_json::Value::Number(n) => n
				.as_i64()
				.map(Self::Integer)
				.or_else(|| n.as_f64().map(Self::Float)),
			serde_json::Value::String(s) => Some(Self::String(s.clone())),
			_ => None,
		}
	}
}

impl fmt::Display for MetadataValue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Bool(b) => write!(f, "{}", b),
			Self::Integer(i) => write!(f, "{}", i),
			Self::Float(v) => write!(f, "{}", v),
			Self::String(s) => f.write_str(s),
		}
	}
}

impl From<&str> for MetadataValue {
	fn from(value: &str) -> Self {
		Self::String(value.to_string())
	}
}

impl From<String> for MetadataValue {
	fn from(value: String) -> Self {
		Self::String(value)
	}
}

impl From<i64> for MetadataValue {
	fn from(value: i64) -> Self {
		Self::Integer(value)
	}
}

impl From<bool> for MetadataValue {
	fn from(value: bool) -> Self {
		Self::Bool(value)
	}
}

/// A document to be signed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
	/// Caller-assigned identifier, unique within a scenario.
	pub id: i64,
	/// Display name of the document.
	pub name: String,
	/// Path of the source file on the local filesystem.
	pub path: PathBuf,
	/// Metadata forwarded to providers that support it.
	#[serde(default)]
	pub metadata: Metadata,
}

impl Document {
	/// Creates a document without metadata.
	pub fn new(id: i64, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
		Self {
			id,
			name: name.into(),
			path: path.into(),
			metadata: Metadata::new(),
		}
	}

	/// Replaces the document metadata.
	pub fn with_metadata(mut self, metadata: Metadata) -> Self {
		self.metadata = metadata;
		self
	}

	/// Returns the file name of the document path, falling back to the
	/// document name when the path has none.
	pub fn file_name(&self) -> String {
		self.path
			.file_name()
			.map(|name| name.to_string_lossy().into_owned())
			.unwrap_or_else(|| self.name.clone())
	}
}

/// A signed document returned by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentResult {
	/// Identity of the document. The path is empty for provider results.
	pub document: Document,
	/// Binary content, only populated once the transaction is completed.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub content: Option<Vec<u8>>,
	/// Download URL when the provider exposes one.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub url: Option<String>,
}

impl DocumentResult {
	/// Creates a result for a downloaded document.
	pub fn new(id: i64, name: impl Into<String>, content: Vec<u8>) -> Self {
		Self {
			document: Document::new(id, name, PathBuf::new()),
			content: Some(content),
			url: None,
		}
	}

	pub fn id(&self) -> i64 {
		self.document.id
	}

	pub fn name(&self) -> &str {
		&self.document.name
	}

	pub fn metadata(&self) -> &Metadata {
		&self.document.metadata
	}
}
