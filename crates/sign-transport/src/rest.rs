//! REST requester for JSON provider APIs.
//!
//! Requests are sent against a base endpoint with an optional bearer token.
//! Responses are decoded as JSON (an empty body decodes to `null`), and any
//! status of 400 or more becomes `TransportError::Api` carrying the message
//! the provider put in its error body.

use crate::{http_client, join_url, TransportError};
use reqwest::{Method, RequestBuilder, Response};
use serde::Serialize;
use serde_json::Value;
use sign_types::SecretString;
use tracing::debug;

/// Error body fields checked, in order, for a provider error message.
const ERROR_MESSAGE_FIELDS: &[&str] = &["detail", "error", "message", "errorCode"];

/// Credentials attached to every request.
#[derive(Debug, Clone)]
pub enum Authorization {
	None,
	Bearer(SecretString),
}

/// JSON client bound to one provider endpoint.
#[derive(Debug, Clone)]
pub struct RestRequester {
	client: reqwest::Client,
	endpoint: String,
	auth: Authorization,
}

impl RestRequester {
	/// Creates a requester with its own HTTP client.
	pub fn new(endpoint: impl Into<String>, auth: Authorization) -> Result<Self, TransportError> {
		Ok(Self::with_client(http_client()?, endpoint, auth))
	}

	pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>, auth: Authorization) -> Self {
		Self {
			client,
			endpoint: endpoint.into(),
			auth,
		}
	}

	/// Returns a requester sharing the HTTP client but targeting another
	/// endpoint with other credentials.
	pub fn rebase(&self, endpoint: impl Into<String>, auth: Authorization) -> Self {
		Self::with_client(self.client.clone(), endpoint, auth)
	}

	pub fn endpoint(&self) -> &str {
		&self.endpoint
	}

	pub fn url(&self, path: &str) -> String {
		join_url(&self.endpoint, path)
	}

	pub async fn get(&self, path: &str) -> Result<Value, TransportError> {
		let builder = self.request(Method::GET, path);
		self.send_json(builder, Method::GET, path).await
	}

	/// Downloads a binary resource.
	pub async fn get_bytes(&self, path: &str) -> Result<Vec<u8>, TransportError> {
		debug!(method = "GET", url = %self.url(path), "Downloading provider resource");
		let response = self.request(Method::GET, path).send().await?;
		let response = check_status(response).await?;
		Ok(response.bytes().await?.to_vec())
	}

	/// Posts a JSON body. A `null` body sends no content at all.
	pub async fn post(&self, path: &str, body: &Value) -> Result<Value, TransportError> {
		let builder = self.request(Method::POST, path);
		let builder = if body.is_null() {
			builder
		} else {
			builder.json(body)
		};
		self.send_json(builder, Method::POST, path).await
	}

	/// Sends an `application/x-www-form-urlencoded` body.
	pub async fn post_form<F: Serialize + ?Sized>(
		&self,
		path: &str,
		form: &F,
	) -> Result<Value, TransportError> {
		let builder = self.request(Method::POST, path).form(form);
		self.send_json(builder, Method::POST, path).await
	}

	pub async fn post_multipart(
		&self,
		path: &str,
		form: reqwest::multipart::Form,
	) -> Result<Value, TransportError> {
		let builder = self.request(Method::POST, path).multipart(form);
		self.send_json(builder, Method::POST, path).await
	}

	pub async fn put(&self, path: &str, body: &Value) -> Result<Value, TransportError> {
		let builder = self.request(Method::PUT, path).json(body);
		self.send_json(builder, Method::PUT, path).await
	}

	pub async fn delete(&self, path: &str) -> Result<Value, TransportError> {
		let builder = self.request(Method::DELETE, path);
		self.send_json(builder, Method::DELETE, path).await
	}

	fn request(&self, method: Method, path: &str) -> RequestBuilder {
		let builder = self
			.client
			.request(method, self.url(path))
			.header(reqwest::header::ACCEPT, "application/json");
		match &self.auth {
			Authorization::None => builder,
			Authorization::Bearer(token) => builder.bearer_auth(token.expose_secret()),
		}
	}

	async fn send_json(
		&self,
		builder: RequestBuilder,
		method: Method,
		path: &str,
	) -> Result<Value, TransportError> {
		debug!(method = %method, url = %self.url(path), "Sending provider request");
		let response = check_status(builder.send().await?).await?;
		let body = response.bytes().await?;
		parse_json(&body)
	}
}

async fn check_status(response: Response) -> Result<Response, TransportError> {
	let status = response.status();
	if !status.is_client_error() && !status.is_server_error() {
		return Ok(response);
	}

	let body = response.bytes().await.unwrap_or_default();
	let message = serde_json::from_slice::<Value>(&body)
		.ok()
		.and_then(|value| error_message(&value))
		.unwrap_or_else(|| {
			status
				.canonical_reason()
				.unwrap_or("Unknown error")
				.to_string()
		});

	Err(TransportError::Api {
		status: status.as_u16(),
		message,
	})
}

fn parse_json(body: &[u8]) -> Result<Value, TransportError> {
	if body.iter().all(u8::is_ascii_whitespace) {
		return Ok(Value::Null);
	}
	serde_json::from_slice(body).map_err(|e| TransportError::InvalidResponse(e.to_string()))
}

/// Extracts a provider error message from a JSON error body.
pub fn error_message(body: &Value) -> Option<String> {
	ERROR_MESSAGE_FIELDS.iter().find_map(|field| match body.get(field) {
		Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
		Some(Value::Null) | None => None,
		Some(Value::String(_)) => None,
		Some(other) => Some(other.to_string()),
	})
}
