//! Transport layer for signature providers.
//!
//! Providers are reached either over REST with JSON, form and multipart
//! bodies (`RestRequester`) or over XML-RPC (`XmlRpcRequester`). Both
//! requesters share one HTTP client configuration and report failures with
//! `TransportError`.

use std::time::Duration;
use thiserror::Error;

pub mod rest;
pub mod xmlrpc;

pub use rest::{Authorization, RestRequester};
pub use xmlrpc::{XmlRpcRequester, XmlRpcValue};

/// Request timeout applied to every provider call.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur while talking to a provider.
#[derive(Debug, Error)]
pub enum TransportError {
	/// The request never produced a response.
	#[error("Network error: {0}")]
	Network(String),
	/// The provider answered with a status of 400 or more.
	#[error("API error ({status}): {message}")]
	Api { status: u16, message: String },
	/// The XML-RPC server returned a fault.
	#[error("XML-RPC fault {code}: {message}")]
	Fault { code: i64, message: String },
	/// The response body could not be decoded.
	#[error("Invalid response: {0}")]
	InvalidResponse(String),
	/// The request could not be built.
	#[error("Invalid request: {0}")]
	InvalidRequest(String),
}

impl From<reqwest::Error> for TransportError {
	fn from(err: reqwest::Error) -> Self {
		if err.is_builder() {
			TransportError::InvalidRequest(err.to_string())
		} else if err.is_decode() {
			TransportError::InvalidResponse(err.to_string())
		} else {
			TransportError::Network(err.to_string())
		}
	}
}

/// Builds the HTTP client shared by the requesters.
pub fn http_client() -> Result<reqwest::Client, TransportError> {
	reqwest::Client::builder()
		.timeout(REQUEST_TIMEOUT)
		.build()
		.map_err(|e| TransportError::InvalidRequest(format!("Failed to build HTTP client: {}", e)))
}

/// Joins an endpoint and a path, trimming the trailing slash of the endpoint.
/// Absolute URLs are returned unchanged.
pub(crate) fn join_url(endpoint: &str, path: &str) -> String {
	if path.starts_with("http://") || path.starts_with("https://") {
		return path.to_string();
	}
	let endpoint = endpoint.trim_end_matches('/');
	if path.is_empty() {
		endpoint.to_string()
	} else if path.starts_with('/') {
		format!("{}{}", endpoint, path)
	} else {
		format!("{}/{}", endpoint, path)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_join_url() {
		assert_eq!(
			join_url("https://api.example.com/v3/", "/signature_requests"),
			"https://api.example.com/v3/signature_requests"
		);
		assert_eq!(
			join_url("https://api.example.com/v3", "documents/1"),
			"https://api.example.com/v3/documents/1"
		);
		assert_eq!(
			join_url("https://api.example.com", "https://other.example.com/file"),
			"https://other.example.com/file"
		);
		assert_eq!(join_url("https://api.example.com/", ""), "https://api.example.com");
	}

	#[test]
	fn test_error_display() {
		let err = TransportError::Api {
			status: 404,
			message: "Not Found".to_string(),
		};
		assert_eq!(err.to_string(), "API error (404): Not Found");
		let fault = TransportError::Fault {
			code: 73002,
			message: "Invalid profile".to_string(),
		};
		assert_eq!(fault.to_string(), "XML-RPC fault 73002: Invalid profile");
	}
}
