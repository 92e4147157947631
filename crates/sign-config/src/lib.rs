//! Configuration for the signature requester.
//!
//! The configuration names the primary signature provider and carries one
//! table per configured driver:
//!
//! ```toml
//! [driver]
//! primary = "yousignv3"
//!
//! [driver.implementations.yousignv3]
//! api_key = "${YOUSIGN_API_KEY}"
//! mode = "sandbox"
//! ```
//!
//! ## Modular Configuration Support
//!
//! Secrets can live in separate files:
//! - Use `include = ["secrets.toml"]` to include other config files
//! - Each top-level section must be unique across all files (no duplicates allowed)

mod loader;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sign_drivers::Provider;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

pub use loader::ConfigLoader;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Keep the message only, not the whole input.
		ConfigError::Parse(err.message().to_string())
	}
}

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Signature provider selection and settings.
	pub driver: DriverConfig,
}

/// Provider selection and per-provider settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DriverConfig {
	/// Name of the provider used by the requester.
	pub primary: String,
	/// Driver tables keyed by provider name.
	#[serde(default)]
	pub implementations: HashMap<String, toml::Value>,
}

/// Resolves environment variables in a string.
///
/// Replaces `${VAR_NAME}` with the value of the environment variable
/// `VAR_NAME`, or with `default` for `${VAR_NAME:-default}` when it is unset.
///
/// Input strings are limited to 1MB.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = String::with_capacity(input.len());
	let mut last = 0;
	for cap in re.captures_iter(input) {
		let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let value = match (std::env::var(var_name.as_str()), cap.get(2)) {
			(Ok(value), _) => value,
			(Err(_), Some(default)) => default.as_str().to_string(),
			(Err(_), None) => {
				return Err(ConfigError::Validation(format!(
					"Environment variable '{}' not found",
					var_name.as_str()
				)))
			},
		};
		result.push_str(&input[last..full_match.start()]);
		result.push_str(&value);
		last = full_match.end();
	}
	result.push_str(&input[last..]);

	Ok(result)
}

impl Config {
	/// Loads configuration from a file, resolving includes and environment
	/// variables.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let path_buf = Path::new(path);
		let base_dir = path_buf.parent().unwrap_or_else(|| Path::new("."));

		let mut loader = ConfigLoader::new(base_dir);
		let file_name = path_buf
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path)))?;
		loader.load_config(file_name).await
	}

	/// The provider selected by `driver.primary`.
	pub fn primary_provider(&self) -> Result<Provider, ConfigError> {
		self.driver
			.primary
			.parse()
			.map_err(|e: sign_types::ValidationError| ConfigError::Validation(e.to_string()))
	}

	/// Configuration table of a provider, if present.
	pub fn driver_config(&self, provider: Provider) -> Option<&toml::Value> {
		self.driver.implementations.get(provider.name())
	}

	/// Checks that:
	/// - the primary driver is a known provider with a configuration table
	/// - every configured table belongs to a known provider
	/// - every table passes its driver's schema
	fn validate(&self) -> Result<(), ConfigError> {
		if self.driver.primary.trim().is_empty() {
			return Err(ConfigError::Validation(
				"Primary driver cannot be empty".into(),
			));
		}

		let primary = self.primary_provider()?;
		if self.driver_config(primary).is_none() {
			return Err(ConfigError::Validation(format!(
				"Primary driver '{}' has no [driver.implementations.{}] table",
				primary, primary
			)));
		}

		for (name, table) in &self.driver.implementations {
			let provider: Provider = name
				.parse()
				.map_err(|e: sign_types::ValidationError| ConfigError::Validation(e.to_string()))?;
			provider.config_schema().validate(table).map_err(|e| {
				ConfigError::Validation(format!("driver.implementations.{}: {}", name, e))
			})?;
		}

		Ok(())
	}
}

/// Parses a TOML string: environment variables are resolved and the
/// configuration is validated after parsing.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const YOUSIGN_CONFIG: &str = r#"
[driver]
primary = "yousignv3"

[driver.implementations.yousignv3]
api_key = "${SIGN_CONFIG_TEST_API_KEY:-sandbox-key}"
mode = "sandbox"
"#;

	#[test]
	fn test_env_var_resolution() {
		std::env::set_var("SIGN_CONFIG_TEST_HOST", "localhost");
		std::env::set_var("SIGN_CONFIG_TEST_PORT", "8080");

		let input = "endpoint = \"http://${SIGN_CONFIG_TEST_HOST}:${SIGN_CONFIG_TEST_PORT}/rpc\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "endpoint = \"http://localhost:8080/rpc\"");

		std::env::remove_var("SIGN_CONFIG_TEST_HOST");
		std::env::remove_var("SIGN_CONFIG_TEST_PORT");
	}

	#[test]
	fn test_env_var_with_default() {
		let input = "value = \"${SIGN_CONFIG_MISSING_VAR:-default_value}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "value = \"default_value\"");
	}

	#[test]
	fn test_missing_env_var_error() {
		let input = "value = \"${SIGN_CONFIG_MISSING_VAR}\"";
		let result = resolve_env_vars(input);
		assert!(result
			.unwrap_err()
			.to_string()
			.contains("SIGN_CONFIG_MISSING_VAR"));
	}

	#[test]
	fn test_oversized_input_rejected() {
		let input = "a".repeat(1024 * 1024 + 1);
		assert!(matches!(
			resolve_env_vars(&input),
			Err(ConfigError::Validation(_))
		));
	}

	#[test]
	fn test_parse_valid_config() {
		let config: Config = YOUSIGN_CONFIG.parse().unwrap();
		assert_eq!(config.primary_provider().unwrap(), Provider::YousignV3);
		let table = config.driver_config(Provider::YousignV3).unwrap();
		assert_eq!(table["api_key"].as_str(), Some("sandbox-key"));
		assert!(config.driver_config(Provider::Docusign).is_none());
	}

	#[test]
	fn test_unknown_primary_rejected() {
		let err = r#"
[driver]
primary = "hellosign"

[driver.implementations.hellosign]
api_key = "k"
"#
		.parse::<Config>()
		.unwrap_err();
		assert!(err.to_string().contains("Unknown provider 'hellosign'"));
	}

	#[test]
	fn test_primary_without_table_rejected() {
		let err = r#"
[driver]
primary = "universign"
"#
		.parse::<Config>()
		.unwrap_err();
		assert!(err
			.to_string()
			.contains("has no [driver.implementations.universign] table"));
	}

	#[test]
	fn test_driver_table_checked_against_schema() {
		let err = r#"
[driver]
primary = "yousignv3"

[driver.implementations.yousignv3]
api_key = "k"
mode = "staging"

[driver.implementations.universign]
username = "api@example.com"
"#
		.parse::<Config>()
		.unwrap_err();
		let message = err.to_string();
		assert!(
			message.contains("driver.implementations.yousignv3")
				|| message.contains("driver.implementations.universign"),
			"unexpected error: {}",
			message
		);
	}

	#[test]
	fn test_missing_driver_section() {
		let err = "[logging]\nlevel = \"debug\"\n".parse::<Config>().unwrap_err();
		assert!(matches!(err, ConfigError::Parse(_)));
	}
}
