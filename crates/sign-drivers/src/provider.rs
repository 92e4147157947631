//! Closed set of supported signature providers.

use crate::implementations::{docusign, universign, yousign, yousignv3};
use crate::{DriverError, DriverFactory, DriverInterface};
use serde::{Deserialize, Serialize};
use sign_types::{ConfigSchema, ImplementationRegistry, ValidationError};
use std::fmt;
use std::str::FromStr;

/// A signature provider with a driver in this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
	Docusign,
	Universign,
	/// Yousign API v2 (procedures).
	Yousign,
	/// Yousign API v3 (signature requests).
	YousignV3,
}

impl Provider {
	pub const ALL: [Provider; 4] = [
		Provider::Docusign,
		Provider::Universign,
		Provider::Yousign,
		Provider::YousignV3,
	];

	/// Configuration name, matching the implementation registry.
	pub fn name(&self) -> &'static str {
		match self {
			Provider::Docusign => docusign::Registry::NAME,
			Provider::Universign => universign::Registry::NAME,
			Provider::Yousign => yousign::Registry::NAME,
			Provider::YousignV3 => yousignv3::Registry::NAME,
		}
	}

	pub fn factory(&self) -> DriverFactory {
		match self {
			Provider::Docusign => docusign::Registry::factory(),
			Provider::Universign => universign::Registry::factory(),
			Provider::Yousign => yousign::Registry::factory(),
			Provider::YousignV3 => yousignv3::Registry::factory(),
		}
	}

	/// Schema of the provider's configuration table, usable without building
	/// a driver.
	pub fn config_schema(&self) -> Box<dyn ConfigSchema> {
		match self {
			Provider::Docusign => Box::new(docusign::DocusignSchema),
			Provider::Universign => Box::new(universign::UniversignSchema),
			Provider::Yousign => Box::new(yousign::YousignSchema),
			Provider::YousignV3 => Box::new(yousignv3::YousignV3Schema),
		}
	}

	/// Builds the driver for this provider from its configuration table.
	pub async fn connect(&self, config: &toml::Value) -> Result<Box<dyn DriverInterface>, DriverError> {
		(self.factory())(config).await
	}
}

impl fmt::Display for Provider {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

impl FromStr for Provider {
	type Err = ValidationError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Provider::ALL
			.into_iter()
			.find(|provider| provider.name() == s)
			.ok_or_else(|| ValidationError::UnknownProvider {
				name: s.to_string(),
				available: Provider::ALL
					.iter()
					.map(Provider::name)
					.collect::<Vec<_>>()
					.join(", "),
			})
	}
}
