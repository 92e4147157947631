//! Provider-agnostic entry point for electronic signatures.
//!
//! A `Requester` wraps the driver of one signature provider and exposes the
//! common operations: create a transaction from a scenario, refresh it,
//! download the signed documents, cancel it and normalize webhook payloads.
//! The requester adds no behavior of its own, every call goes to the driver.

use serde_json::Value;
use sign_config::{Config, ConfigError};
use sign_drivers::{DriverError, DriverInterface, Provider};
use sign_types::{truncate_id, DocumentResult, Scenario, Transaction, Webhook};
use thiserror::Error;
use tracing::{info, instrument};

pub use sign_drivers::implementations;
pub use sign_types::{
	Document, InvitationMode, Language, Metadata, MetadataValue, Signature, Signer, SignerResult,
	SignerStatus, TransactionStatus, ValidationError,
};

/// Errors that can occur while requesting signatures.
#[derive(Debug, Error)]
pub enum RequesterError {
	/// The configuration could not be used to pick a driver.
	#[error("Configuration error: {0}")]
	Config(#[from] ConfigError),
	/// The driver failed.
	#[error(transparent)]
	Driver(#[from] DriverError),
}

/// Signature requester bound to one provider.
pub struct Requester {
	driver: Box<dyn DriverInterface>,
}

impl Requester {
	/// Builds the driver of `provider` from its configuration table.
	///
	/// The table is validated before any network call. DocuSign
	/// authenticates here.
	pub async fn new(provider: Provider, config: &toml::Value) -> Result<Self, RequesterError> {
		let driver = provider.connect(config).await?;
		info!(driver = driver.name(), "Signature driver ready");
		Ok(Self { driver })
	}

	/// Builds the primary driver of a loaded configuration.
	pub async fn from_config(config: &Config) -> Result<Self, RequesterError> {
		let provider = config.primary_provider()?;
		let table = config.driver_config(provider).ok_or_else(|| {
			ConfigError::Validation(format!("No configuration for driver '{}'", provider))
		})?;
		Self::new(provider, table).await
	}

	/// Wraps an already built driver.
	pub fn with_driver(driver: Box<dyn DriverInterface>) -> Self {
		Self { driver }
	}

	pub fn driver_name(&self) -> &'static str {
		self.driver.name()
	}

	pub fn expiration_days(&self) -> u32 {
		self.driver.expiration_days()
	}

	#[instrument(skip_all, fields(driver = self.driver.name(), title = %scenario.title))]
	pub async fn create_transaction(&self, scenario: &Scenario) -> Result<Transaction, RequesterError> {
		let transaction = self.driver.create_transaction(scenario).await?;
		info!(
			transaction_id = %truncate_id(&transaction.id),
			status = transaction.status_label(),
			"Created signature transaction"
		);
		Ok(transaction)
	}

	#[instrument(skip_all, fields(driver = self.driver.name(), transaction_id = %truncate_id(transaction_id)))]
	pub async fn get_transaction(&self, transaction_id: &str) -> Result<Transaction, RequesterError> {
		Ok(self.driver.get_transaction(transaction_id).await?)
	}

	#[instrument(skip_all, fields(driver = self.driver.name(), transaction_id = %truncate_id(transaction_id)))]
	pub async fn get_documents(
		&self,
		transaction_id: &str,
	) -> Result<Vec<DocumentResult>, RequesterError> {
		Ok(self.driver.get_documents(transaction_id).await?)
	}

	#[instrument(skip_all, fields(driver = self.driver.name(), transaction_id = %truncate_id(transaction_id)))]
	pub async fn cancel_transaction(&self, transaction_id: &str) -> Result<Transaction, RequesterError> {
		Ok(self.driver.cancel_transaction(transaction_id).await?)
	}

	/// Normalizes a provider callback payload.
	pub fn format_webhook(&self, payload: &Value) -> Result<Webhook, RequesterError> {
		Ok(self.driver.format_webhook(payload)?)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use serde_json::json;
	use sign_types::{ConfigSchema, Schema};
	use std::sync::{Arc, Mutex};

	struct EmptySchema;

	impl ConfigSchema for EmptySchema {
		fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
			Schema::new(vec![], vec![]).validate(config)
		}
	}

	/// Driver recording the operations it receives.
	#[derive(Default)]
	struct RecordingDriver {
		calls: Arc<Mutex<Vec<String>>>,
	}

	impl RecordingDriver {
		fn record(&self, call: String) {
			self.calls.lock().unwrap().push(call);
		}
	}

	#[async_trait]
	impl DriverInterface for RecordingDriver {
		fn name(&self) -> &'static str {
			"recording"
		}

		fn config_schema(&self) -> Box<dyn ConfigSchema> {
			Box::new(EmptySchema)
		}

		async fn create_transaction(&self, scenario: &Scenario) -> Result<Transaction, DriverError> {
			scenario.validate()?;
			self.record(format!("create:{}", scenario.title));
			Ok(Transaction::new(self.name(), "tx-1", TransactionStatus::Ready))
		}

		async fn get_transaction(&self, transaction_id: &str) -> Result<Transaction, DriverError> {
			self.record(format!("get:{}", transaction_id));
			Ok(Transaction::new(
				self.name(),
				transaction_id,
				TransactionStatus::Completed,
			))
		}

		async fn get_documents(&self, transaction_id: &str) -> Result<Vec<DocumentResult>, DriverError> {
			self.record(format!("documents:{}", transaction_id));
			Ok(vec![DocumentResult::new(1, "document1.pdf", b"%PDF".to_vec())])
		}

		fn expiration_days(&self) -> u32 {
			7
		}

		fn format_webhook(&self, payload: &Value) -> Result<Webhook, DriverError> {
			let id = payload["id"]
				.as_str()
				.ok_or_else(|| ValidationError::InvalidWebhook("missing id".to_string()))?;
			Ok(Webhook::new(id, TransactionStatus::Completed))
		}
	}

	fn requester() -> (Requester, Arc<Mutex<Vec<String>>>) {
		let driver = RecordingDriver::default();
		let calls = driver.calls.clone();
		(Requester::with_driver(Box::new(driver)), calls)
	}

	#[tokio::test]
	async fn test_operations_are_delegated() {
		let (requester, calls) = requester();
		let mut scenario = Scenario::new("Lease");
		scenario.signers.push(Signer::new(1, "Jane", "Doe", "jane@example.com"));
		scenario
			.documents
			.push(Document::new(1, "Lease", "/tmp/lease.pdf"));

		let created = requester.create_transaction(&scenario).await.unwrap();
		assert_eq!(created.status, TransactionStatus::Ready);
		let refreshed = requester.get_transaction(&created.id).await.unwrap();
		assert!(refreshed.is_completed());
		let documents = requester.get_documents(&created.id).await.unwrap();
		assert_eq!(documents[0].name(), "document1.pdf");

		assert_eq!(requester.driver_name(), "recording");
		assert_eq!(requester.expiration_days(), 7);
		assert_eq!(
			*calls.lock().unwrap(),
			vec!["create:Lease", "get:tx-1", "documents:tx-1"]
		);
	}

	#[tokio::test]
	async fn test_driver_errors_are_propagated() {
		let (requester, calls) = requester();
		let result = requester.create_transaction(&Scenario::new("Empty")).await;
		assert!(matches!(
			result,
			Err(RequesterError::Driver(DriverError::Validation(
				ValidationError::MissingField(_)
			)))
		));
		assert!(calls.lock().unwrap().is_empty());

		match requester.cancel_transaction("tx-1").await {
			Err(RequesterError::Driver(err)) => assert_eq!(
				err.to_string(),
				"Operation 'cancel_transaction' is not implemented by the recording driver"
			),
			other => panic!("unexpected result: {:?}", other),
		}
	}

	#[test]
	fn test_format_webhook() {
		let (requester, _) = requester();
		let webhook = requester.format_webhook(&json!({"id": "tx-1"})).unwrap();
		assert_eq!(webhook.transaction_id, "tx-1");
		assert!(requester.format_webhook(&json!({})).is_err());
	}

	#[tokio::test]
	async fn test_new_validates_configuration() {
		let config: toml::Value = toml::from_str(r#"api_key = "key""#).unwrap();
		match Requester::new(Provider::YousignV3, &config).await {
			Err(RequesterError::Driver(DriverError::Validation(ValidationError::MissingField(
				field,
			)))) => assert_eq!(field, "mode"),
			Err(other) => panic!("unexpected error: {}", other),
			Ok(_) => panic!("requester built from an incomplete configuration"),
		}
	}

	#[tokio::test]
	async fn test_from_config() {
		let config: Config = r#"
[driver]
primary = "yousignv3"

[driver.implementations.yousignv3]
api_key = "key"
mode = "sandbox"
"#
		.parse()
		.unwrap();

		let requester = Requester::from_config(&config).await.unwrap();
		assert_eq!(requester.driver_name(), "yousignv3");
		assert_eq!(requester.expiration_days(), 30);
	}
}
