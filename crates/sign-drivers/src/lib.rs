//! Signature provider drivers.
//!
//! Each supported provider gets a driver implementing `DriverInterface`: it
//! turns a `Scenario` into the provider's own resources, reads them back as
//! canonical `Transaction` values, downloads signed documents and formats
//! webhook payloads. Drivers are built by async factories because some of
//! them (DocuSign) authenticate before they can serve requests.

use async_trait::async_trait;
use futures::future::BoxFuture;
use sign_transport::TransportError;
use sign_types::{
	ConfigSchema, DocumentResult, ImplementationRegistry, Scenario, Transaction, ValidationError,
	Webhook,
};
use thiserror::Error;

mod common;
mod provider;

pub use provider::Provider;

/// Re-export implementations
pub mod implementations {
	pub mod docusign;
	pub mod universign;
	pub mod yousign;
	pub mod yousignv3;
}

#[cfg(test)]
pub(crate) mod test_utils;

/// Errors that can occur while driving a signature provider.
#[derive(Debug, Error)]
pub enum DriverError {
	/// The configuration, scenario or payload was rejected before any call.
	#[error("Validation error: {0}")]
	Validation(#[from] ValidationError),
	/// The provider refused the credentials.
	#[error("Authentication failed: {0}")]
	Auth(String),
	/// The integration must be granted access by the user first.
	#[error("Consent required, grant access at {consent_url}")]
	ConsentRequired { consent_url: String },
	/// The provider cannot perform the request in the current state.
	#[error("Signature error: {0}")]
	Sign(String),
	/// The driver does not support the operation.
	#[error("Operation '{operation}' is not implemented by the {driver} driver")]
	NotImplemented {
		driver: &'static str,
		operation: &'static str,
	},
	/// The provider call failed.
	#[error("Provider error: {0}")]
	Provider(#[from] TransportError),
	/// A document file could not be read.
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),
}

/// Common contract of every signature provider.
#[async_trait]
pub trait DriverInterface: Send + Sync {
	/// Configuration name of the driver.
	fn name(&self) -> &'static str;

	/// Returns the configuration schema for validation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Submits a scenario and returns the resulting transaction.
	///
	/// The scenario and the provider-mandatory signer fields are validated
	/// before any network call. Creation is not atomic: a failure midway
	/// leaves the partially built resources on the provider.
	async fn create_transaction(&self, scenario: &Scenario) -> Result<Transaction, DriverError>;

	/// Reads the current state of a transaction.
	async fn get_transaction(&self, transaction_id: &str) -> Result<Transaction, DriverError>;

	/// Downloads the signed documents of a completed transaction.
	async fn get_documents(&self, transaction_id: &str) -> Result<Vec<DocumentResult>, DriverError>;

	/// Cancels a transaction and returns its new state.
	async fn cancel_transaction(&self, _transaction_id: &str) -> Result<Transaction, DriverError> {
		Err(DriverError::NotImplemented {
			driver: self.name(),
			operation: "cancel_transaction",
		})
	}

	/// Number of days a new transaction stays open.
	fn expiration_days(&self) -> u32;

	/// Maps a provider callback payload onto a canonical webhook.
	fn format_webhook(&self, payload: &serde_json::Value) -> Result<Webhook, DriverError>;
}

/// Async factory building a ready-to-use driver from its TOML table.
pub type DriverFactory =
	fn(&toml::Value) -> BoxFuture<'static, Result<Box<dyn DriverInterface>, DriverError>>;

/// Registry trait for driver implementations.
pub trait DriverRegistry: ImplementationRegistry<Factory = DriverFactory> {}

/// Get all registered driver implementations.
///
/// Returns a vector of (name, factory) tuples in provider order.
pub fn get_all_implementations() -> Vec<(&'static str, DriverFactory)> {
	Provider::ALL
		.iter()
		.map(|provider| (provider.name(), provider.factory()))
		.collect()
}
