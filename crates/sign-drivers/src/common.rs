//! Helpers shared by the driver implementations.

use crate::DriverError;
use serde::de::DeserializeOwned;
use serde_json::Value;
use sign_types::{
	parse_datetime, CanonicalStatus, ConfigSchema, Document, Metadata, MetadataValue, Signer,
	Transaction, ValidationError,
};
use std::collections::HashMap;

/// Validates a driver table against its schema, then deserializes it.
pub(crate) fn parse_config<T: DeserializeOwned>(
	schema: &dyn ConfigSchema,
	config: &toml::Value,
) -> Result<T, DriverError> {
	schema.validate(config)?;
	config
		.clone()
		.try_into()
		.map_err(|e: toml::de::Error| ValidationError::DeserializationError(e.to_string()).into())
}

/// Reads the source file of a document.
pub(crate) async fn read_document(document: &Document) -> Result<Vec<u8>, DriverError> {
	tokio::fs::read(&document.path).await.map_err(|e| {
		DriverError::Io(std::io::Error::new(
			e.kind(),
			format!("{}: {}", document.path.display(), e),
		))
	})
}

/// Provider identifiers recorded while building a transaction, keyed by
/// scenario identifier.
#[derive(Debug, Default)]
pub(crate) struct IdMap {
	kind: IdKind,
	ids: HashMap<i64, String>,
}

#[derive(Debug, Default, Clone, Copy)]
pub(crate) enum IdKind {
	#[default]
	Signer,
	Document,
}

impl IdMap {
	pub(crate) fn new(kind: IdKind) -> Self {
		Self {
			kind,
			ids: HashMap::new(),
		}
	}

	pub(crate) fn insert(&mut self, scenario_id: i64, provider_id: String) {
		self.ids.insert(scenario_id, provider_id);
	}

	/// Resolves a scenario id, failing with a validation error when it was
	/// never registered.
	pub(crate) fn get(&self, scenario_id: i64) -> Result<&str, ValidationError> {
		self.ids
			.get(&scenario_id)
			.map(String::as_str)
			.ok_or(match self.kind {
				IdKind::Signer => ValidationError::UnknownSigner(scenario_id),
				IdKind::Document => ValidationError::UnknownDocument(scenario_id),
			})
	}
}

/// Signers must have a phone number on providers that send SMS codes.
pub(crate) fn require_phone(signer: &Signer) -> Result<&str, ValidationError> {
	signer
		.phone
		.as_deref()
		.filter(|phone| !phone.trim().is_empty())
		.ok_or_else(|| ValidationError::MissingField(format!("signers[{}].phone", signer.id)))
}

pub(crate) fn require_email(signer: &Signer) -> Result<&str, ValidationError> {
	Some(signer.email.as_str())
		.filter(|email| !email.trim().is_empty())
		.ok_or_else(|| ValidationError::MissingField(format!("signers[{}].email", signer.id)))
}

/// Signed files only exist once every signer has signed.
pub(crate) fn ensure_completed(transaction: &Transaction) -> Result<(), DriverError> {
	if transaction.is_completed() {
		Ok(())
	} else {
		Err(DriverError::Sign(format!(
			"Could not download signed files of transaction {} because it is {}",
			transaction.id,
			transaction.status.as_str()
		)))
	}
}

/// Reads a string field, treating empty strings as absent.
pub(crate) fn str_field(value: &Value, key: &str) -> Option<String> {
	value
		.get(key)
		.and_then(Value::as_str)
		.filter(|s| !s.is_empty())
		.map(str::to_string)
}

/// Reads a provider identifier that may be a string or a number.
pub(crate) fn id_field(value: &Value, key: &str) -> Option<String> {
	match value.get(key) {
		Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
		Some(Value::Number(n)) => Some(n.to_string()),
		_ => None,
	}
}

pub(crate) fn date_field(value: &Value, key: &str) -> Option<chrono::DateTime<chrono::Utc>> {
	value
		.get(key)
		.and_then(Value::as_str)
		.and_then(parse_datetime)
}

/// Required identifier in a provider response.
pub(crate) fn response_id(value: &Value, key: &str) -> Result<String, DriverError> {
	id_field(value, key).ok_or_else(|| {
		DriverError::Provider(sign_transport::TransportError::InvalidResponse(format!(
			"missing '{}' in provider response",
			key
		)))
	})
}

/// Collects the scalar members of a JSON object as document metadata.
pub(crate) fn metadata_from_json(value: &Value) -> Metadata {
	value
		.as_object()
		.map(|object| {
			object
				.iter()
				.filter_map(|(key, value)| {
					MetadataValue::from_json(value).map(|value| (key.clone(), value))
				})
				.collect()
		})
		.unwrap_or_default()
}

/// Serializes document metadata as a JSON object.
pub(crate) fn metadata_to_json(metadata: &Metadata) -> Value {
	serde_json::to_value(metadata).unwrap_or(Value::Null)
}

/// Splits a display name when the provider does not return name parts.
pub(crate) fn split_name(name: &str) -> (String, String) {
	match name.trim().split_once(' ') {
		Some((first, last)) => (first.to_string(), last.trim().to_string()),
		None => (String::new(), name.trim().to_string()),
	}
}
