//! Yousign API v3 driver.
//!
//! A transaction is a Yousign signature request. Creation posts the request
//! in draft, uploads each document as a multipart file, adds the signers
//! with their signature fields and finally activates the request. Signing
//! links are only returned right after activation, so the transaction
//! returned by `create_transaction` is built from the activation response.

use crate::common::{
	date_field, ensure_completed, id_field, metadata_from_json, parse_config, read_document,
	require_email, require_phone, response_id, str_field, IdKind, IdMap,
};
use crate::implementations::yousign::procedure_webhook;
use crate::{DriverError, DriverFactory, DriverInterface};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use sign_transport::{Authorization, RestRequester, TransportError};
use sign_types::{
	truncate_id, ConfigSchema, Document, DocumentResult, Field, FieldType, ImplementationRegistry,
	Scenario, Schema, SecretString, Signer, SignerResult, SignerStatus, StatusTable, Transaction,
	TransactionStatus, ValidationError, Webhook,
};
use tracing::{debug, info, instrument};

const PRODUCTION_URL: &str = "https://api.yousign.app/v3";
const SANDBOX_URL: &str = "https://api-sandbox.yousign.app/v3";
const EXPIRATION_DAYS: u32 = 30;

/// Signature request statuses.
pub const SIGNATURE_REQUEST_STATUSES: StatusTable<TransactionStatus> = StatusTable::new(&[
	("draft", TransactionStatus::Draft),
	("approval", TransactionStatus::Draft),
	("ongoing", TransactionStatus::Ready),
	("done", TransactionStatus::Completed),
	("expired", TransactionStatus::Expired),
	("declined", TransactionStatus::Refused),
	("rejected", TransactionStatus::Refused),
	("canceled", TransactionStatus::Canceled),
	("deleted", TransactionStatus::Canceled),
]);

/// Signer statuses.
pub const SIGNER_STATUSES: StatusTable<SignerStatus> = StatusTable::new(&[
	("initiated", SignerStatus::Ready),
	("notified", SignerStatus::Ready),
	("verified", SignerStatus::Accessed),
	("processing", SignerStatus::Accessed),
	("consent_processing", SignerStatus::Accessed),
	("signed", SignerStatus::Signed),
	("declined", SignerStatus::Canceled),
	("aborted", SignerStatus::Canceled),
	("error", SignerStatus::Failed),
]);

/// Webhook events that change the signature request status.
pub const WEBHOOK_EVENTS: StatusTable<TransactionStatus> = StatusTable::new(&[
	("signature_request.activated", TransactionStatus::Ready),
	("signature_request.reminder_executed", TransactionStatus::Ready),
	("signature_request.done", TransactionStatus::Completed),
	("signature_request.declined", TransactionStatus::Refused),
	("signature_request.expired", TransactionStatus::Expired),
	("signature_request.canceled", TransactionStatus::Canceled),
	("signature_request.deleted", TransactionStatus::Canceled),
	("signer.notified", TransactionStatus::Ready),
	("signer.done", TransactionStatus::Ready),
	("signer.declined", TransactionStatus::Refused),
]);

const AUTHENTICATION_MODES: &[&str] = &["no_otp", "otp_sms", "otp_email"];

/// Driver configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct YousignV3Config {
	pub api_key: SecretString,
	/// `production` or `sandbox`.
	pub mode: String,
	/// Overrides the API base URL picked from `mode`.
	#[serde(default)]
	pub endpoint: Option<String>,
	#[serde(default = "default_signature_level")]
	pub signature_level: String,
	#[serde(default = "default_authentication_mode")]
	pub authentication_mode: String,
	#[serde(default = "default_timezone")]
	pub timezone: String,
}

fn default_signature_level() -> String {
	"electronic_signature".to_string()
}

fn default_authentication_mode() -> String {
	"otp_sms".to_string()
}

fn default_timezone() -> String {
	"Europe/Paris".to_string()
}

/// Configuration schema for the Yousign v3 driver.
pub struct YousignV3Schema;

impl ConfigSchema for YousignV3Schema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(
			vec![
				Field::new("api_key", FieldType::String).non_empty(),
				Field::new("mode", FieldType::String).one_of(&["sandbox", "production"]),
			],
			vec![
				Field::new("endpoint", FieldType::String).non_empty(),
				Field::new("signature_level", FieldType::String),
				Field::new("authentication_mode", FieldType::String).one_of(AUTHENTICATION_MODES),
				Field::new("timezone", FieldType::String),
			],
		)
		.validate(config)
	}
}

/// Yousign v3 signature request driver.
pub struct YousignV3Driver {
	requester: RestRequester,
	config: YousignV3Config,
}

impl YousignV3Driver {
	pub fn new(config: YousignV3Config) -> Result<Self, DriverError> {
		let endpoint = match &config.endpoint {
			Some(endpoint) => endpoint.clone(),
			None if config.mode == "production" => PRODUCTION_URL.to_string(),
			None => SANDBOX_URL.to_string(),
		};
		let requester = RestRequester::new(endpoint, Authorization::Bearer(config.api_key.clone()))?;
		Ok(Self { requester, config })
	}

	fn check_signer(&self, signer: &Signer) -> Result<(), ValidationError> {
		require_email(signer)?;
		if self.config.authentication_mode == "otp_sms" {
			require_phone(signer)?;
		}
		Ok(())
	}

	async fn upload_document(
		&self,
		request_id: &str,
		document: &Document,
	) -> Result<String, DriverError> {
		let content = read_document(document).await?;
		let part = Part::bytes(content)
			.file_name(document.file_name())
			.mime_str("application/pdf")
			.map_err(TransportError::from)?;
		let form = Form::new()
			.text("nature", "signable_document")
			.part("file", part);

		let response = self
			.requester
			.post_multipart(&format!("/signature_requests/{}/documents", request_id), form)
			.await?;
		response_id(&response, "id")
	}

	fn signer_payload(
		&self,
		scenario: &Scenario,
		signer: &Signer,
		documents: &IdMap,
	) -> Result<Value, ValidationError> {
		let mut fields = Vec::new();
		for signature in scenario.signatures_for_signer(signer.id) {
			let mut field = json!({
				"document_id": documents.get(signature.document_id)?,
				"type": "signature",
				"page": signature.page,
				"x": signature.x,
				"y": signature.y,
			});
			if signature.width > 0 {
				field["width"] = json!(signature.width);
			}
			if signature.height > 0 {
				field["height"] = json!(signature.height);
			}
			fields.push(field);
		}

		let mut payload = json!({
			"info": {
				"first_name": signer.firstname,
				"last_name": signer.lastname,
				"email": signer.email,
				"phone_number": signer.phone,
				"locale": scenario.lang.code(),
			},
			"signature_level": self.config.signature_level,
			"signature_authentication_mode": self.config.authentication_mode,
			"fields": fields,
		});

		let mut redirect_urls = Map::new();
		for (key, url) in [
			("success", &scenario.success_url),
			("error", &scenario.error_url),
			("decline", &scenario.cancel_url),
		] {
			if let Some(url) = url {
				redirect_urls.insert(key.to_string(), json!(url));
			}
		}
		if !redirect_urls.is_empty() {
			payload["redirect_urls"] = Value::Object(redirect_urls);
		}

		Ok(payload)
	}

	#[instrument(skip_all, fields(request_id = %truncate_id(request_id)))]
	async fn fetch_signature_request(&self, request_id: &str) -> Result<Value, DriverError> {
		Ok(self
			.requester
			.get(&format!("/signature_requests/{}", request_id))
			.await?)
	}

	/// Builds the canonical transaction from a signature request payload.
	///
	/// Each signer is read individually; the link embedded in the request
	/// payload wins over the one in the signer payload.
	async fn transaction_from_signature_request(
		&self,
		request: &Value,
	) -> Result<Transaction, DriverError> {
		let id = response_id(request, "id")?;
		let mut transaction = Transaction::new(
			self.name(),
			id.clone(),
			SIGNATURE_REQUEST_STATUSES.resolve_opt(request["status"].as_str()),
		);
		transaction.created_at = date_field(request, "created_at");
		transaction.expire_at = date_field(request, "expiration_date");
		transaction.title = str_field(request, "name");
		transaction.custom_id = str_field(request, "external_id");

		let request_signers = request["signers"].as_array().cloned().unwrap_or_default();
		for (index, request_signer) in request_signers.iter().enumerate() {
			let signer_id = response_id(request_signer, "id")?;
			let data = self
				.requester
				.get(&format!("/signature_requests/{}/signers/{}", id, signer_id))
				.await?;
			let info = &data["info"];

			let mut signer = Signer::new(
				index as i64 + 1,
				str_field(info, "first_name").unwrap_or_default(),
				str_field(info, "last_name").unwrap_or_default(),
				str_field(info, "email").unwrap_or_default(),
			);
			signer.phone = str_field(info, "phone_number");

			let url = str_field(request_signer, "signature_link")
				.or_else(|| str_field(&data, "signature_link"));
			transaction.signers.push(
				SignerResult::new(signer, SIGNER_STATUSES.resolve_opt(data["status"].as_str()))
					.with_url(url),
			);
		}

		Ok(transaction)
	}

	async fn download_document(
		&self,
		request_id: &str,
		index: usize,
		document_id: &str,
	) -> Result<DocumentResult, DriverError> {
		let path = format!("/signature_requests/{}/documents/{}", request_id, document_id);
		let content = self.requester.get_bytes(&format!("{}/download", path)).await?;
		let data = self.requester.get(&path).await?;

		let name = str_field(&data, "filename").unwrap_or_else(|| document_id.to_string());
		let mut result = DocumentResult::new(index as i64 + 1, name, content);
		result.document.metadata = metadata_from_json(&data);
		Ok(result)
	}
}

#[async_trait]
impl DriverInterface for YousignV3Driver {
	fn name(&self) -> &'static str {
		Registry::NAME
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(YousignV3Schema)
	}

	async fn create_transaction(&self, scenario: &Scenario) -> Result<Transaction, DriverError> {
		scenario.validate()?;
		for signer in &scenario.signers {
			self.check_signer(signer)?;
		}

		let expiration = Utc::now() + Duration::days(i64::from(self.expiration_days()));
		let mut payload = json!({
			"name": scenario.title,
			"delivery_mode": if scenario.invitation_mode.sends_email() { "email" } else { "none" },
			"ordered_signers": scenario.invitation_mode.is_ordered(),
			"expiration_date": expiration.format("%Y-%m-%d").to_string(),
			"timezone": self.config.timezone,
		});
		if let Some(custom_id) = &scenario.custom_id {
			payload["external_id"] = json!(custom_id);
		}

		let request = self.requester.post("/signature_requests", &payload).await?;
		let request_id = response_id(&request, "id")?;
		info!(request_id = %truncate_id(&request_id), "Created Yousign signature request");

		let mut documents = IdMap::new(IdKind::Document);
		for document in &scenario.documents {
			let document_id = self.upload_document(&request_id, document).await?;
			debug!(document = document.id, yousign_id = %document_id, "Uploaded document");
			documents.insert(document.id, document_id);
		}

		for signer in &scenario.signers {
			let payload = self.signer_payload(scenario, signer, &documents)?;
			let response = self
				.requester
				.post(&format!("/signature_requests/{}/signers", request_id), &payload)
				.await?;
			debug!(signer = signer.id, yousign_id = ?id_field(&response, "id"), "Added signer");
		}

		let activated = self
			.requester
			.post(
				&format!("/signature_requests/{}/activate", request_id),
				&Value::Null,
			)
			.await?;
		info!(request_id = %truncate_id(&request_id), "Activated Yousign signature request");

		self.transaction_from_signature_request(&activated).await
	}

	async fn get_transaction(&self, transaction_id: &str) -> Result<Transaction, DriverError> {
		let request = self.fetch_signature_request(transaction_id).await?;
		self.transaction_from_signature_request(&request).await
	}

	async fn get_documents(&self, transaction_id: &str) -> Result<Vec<DocumentResult>, DriverError> {
		let request = self.fetch_signature_request(transaction_id).await?;
		let transaction = self.transaction_from_signature_request(&request).await?;
		ensure_completed(&transaction)?;

		let mut results = Vec::new();
		let documents = request["documents"].as_array().cloned().unwrap_or_default();
		for (index, document) in documents
			.iter()
			.filter(|d| d["nature"].as_str() != Some("attachment"))
			.enumerate()
		{
			let document_id = response_id(document, "id")?;
			results.push(
				self.download_document(transaction_id, index, &document_id)
					.await?,
			);
		}
		Ok(results)
	}

	async fn cancel_transaction(&self, transaction_id: &str) -> Result<Transaction, DriverError> {
		self.requester
			.post(
				&format!("/signature_requests/{}/cancel", transaction_id),
				&json!({ "reason": "contractualization_aborted" }),
			)
			.await?;
		info!(request_id = %truncate_id(transaction_id), "Canceled Yousign signature request");
		self.get_transaction(transaction_id).await
	}

	fn expiration_days(&self) -> u32 {
		EXPIRATION_DAYS
	}

	/// Accepts v3 event payloads and, for older integrations, the v2
	/// `{procedure, eventName}` shape.
	fn format_webhook(&self, payload: &Value) -> Result<Webhook, DriverError> {
		let Some(event_name) = payload.get("event_name").and_then(Value::as_str) else {
			return procedure_webhook(payload);
		};

		let request_id = payload
			.pointer("/data/signature_request/id")
			.and_then(Value::as_str)
			.ok_or_else(|| {
				ValidationError::InvalidWebhook(
					"Yousign webhook field \"data.signature_request.id\" must be set".to_string(),
				)
			})?;
		if !WEBHOOK_EVENTS.contains(event_name) {
			return Err(ValidationError::InvalidWebhook(format!(
				"Unknown Yousign webhook event name: {}",
				event_name
			))
			.into());
		}

		Ok(Webhook::new(request_id, WEBHOOK_EVENTS.resolve(event_name)))
	}
}

/// Factory function to create a Yousign v3 driver from configuration.
pub fn create_driver(
	config: &toml::Value,
) -> BoxFuture<'static, Result<Box<dyn DriverInterface>, DriverError>> {
	let config = config.clone();
	async move {
		let config: YousignV3Config = parse_config(&YousignV3Schema, &config)?;
		Ok(Box::new(YousignV3Driver::new(config)?) as Box<dyn DriverInterface>)
	}
	.boxed()
}

/// Registry for the Yousign v3 driver.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "yousignv3";
	type Factory = DriverFactory;

	fn factory() -> Self::Factory {
		create_driver
	}
}

impl crate::DriverRegistry for Registry {}
