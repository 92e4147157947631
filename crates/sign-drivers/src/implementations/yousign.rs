//! Yousign API v2 driver.
//!
//! A transaction is a Yousign procedure, identified by its resource path
//! (`/procedures/...`). The procedure is created stopped, files, members and
//! file objects (signature fields) are attached, then the procedure is
//! started. Yousign v2 has no cancellation endpoint for started procedures.

use crate::common::{
	date_field, ensure_completed, metadata_from_json, metadata_to_json, parse_config,
	read_document, require_email, response_id, str_field, IdKind, IdMap,
};
use crate::{DriverError, DriverFactory, DriverInterface};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{Duration, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use sign_transport::{Authorization, RestRequester};
use sign_types::{
	truncate_id, ConfigSchema, DocumentResult, Field, FieldType, ImplementationRegistry, Scenario,
	Schema, SecretString, Signer, SignerResult, SignerStatus, StatusTable, Transaction,
	TransactionStatus, ValidationError, Webhook,
};
use tracing::{debug, info, instrument};

const EXPIRATION_DAYS: u32 = 30;
const STAGING_APP_URL: &str = "https://staging-app.yousign.com";
const PRODUCTION_APP_URL: &str = "https://webapp.yousign.com";

/// Procedure statuses.
pub const PROCEDURE_STATUSES: StatusTable<TransactionStatus> = StatusTable::new(&[
	("draft", TransactionStatus::Draft),
	("active", TransactionStatus::Ready),
	("finished", TransactionStatus::Completed),
	("expired", TransactionStatus::Expired),
	("refused", TransactionStatus::Refused),
]);

/// Member statuses.
pub const MEMBER_STATUSES: StatusTable<SignerStatus> = StatusTable::new(&[
	("pending", SignerStatus::Ready),
	("processing", SignerStatus::Accessed),
	("done", SignerStatus::Signed),
	("refused", SignerStatus::Canceled),
]);

/// Webhook events. Member events keep the procedure ready because other
/// members may still have to sign.
pub const PROCEDURE_EVENTS: StatusTable<TransactionStatus> = StatusTable::new(&[
	("procedure.started", TransactionStatus::Ready),
	("procedure.finished", TransactionStatus::Completed),
	("procedure.refused", TransactionStatus::Refused),
	("procedure.expired", TransactionStatus::Expired),
	("member.started", TransactionStatus::Ready),
	("member.finished", TransactionStatus::Ready),
]);

/// Driver configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct YousignConfig {
	pub api_key: SecretString,
	/// API base URL, such as `https://staging-api.yousign.com`.
	pub endpoint: String,
	/// Web application hosting the signing pages.
	#[serde(default)]
	pub app_url: Option<String>,
}

impl YousignConfig {
	fn app_url(&self) -> String {
		match &self.app_url {
			Some(url) => url.trim_end_matches('/').to_string(),
			None if self.endpoint.contains("staging") => STAGING_APP_URL.to_string(),
			None => PRODUCTION_APP_URL.to_string(),
		}
	}
}

/// Configuration schema for the Yousign v2 driver.
pub struct YousignSchema;

impl ConfigSchema for YousignSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(
			vec![
				Field::new("api_key", FieldType::String).non_empty(),
				Field::new("endpoint", FieldType::String).non_empty(),
			],
			vec![Field::new("app_url", FieldType::String).non_empty()],
		)
		.validate(config)
	}
}

/// Yousign v2 procedure driver.
pub struct YousignDriver {
	requester: RestRequester,
	app_url: String,
}

impl YousignDriver {
	pub fn new(config: YousignConfig) -> Result<Self, DriverError> {
		let requester = RestRequester::new(
			config.endpoint.clone(),
			Authorization::Bearer(config.api_key.clone()),
		)?;
		Ok(Self {
			requester,
			app_url: config.app_url(),
		})
	}

	/// Signing page of one member.
	fn sign_url(&self, member_id: &str) -> String {
		let query = url::form_urlencoded::Serializer::new(String::new())
			.append_pair("members", member_id)
			.finish();
		format!("{}/procedure/sign?{}", self.app_url, query)
	}

	fn procedure_payload(&self, scenario: &Scenario) -> Value {
		let expiration = Utc::now() + Duration::days(i64::from(self.expiration_days()));
		let mut payload = json!({
			"name": scenario.title,
			"description": "",
			"start": false,
			"ordered": scenario.invitation_mode.is_ordered(),
			"expiresAt": expiration.format("%Y-%m-%d").to_string(),
		});
		if let Some(custom_id) = &scenario.custom_id {
			payload["metadata"] = json!({ "customId": custom_id });
		}

		let mut config = Map::new();
		if scenario.invitation_mode.sends_email() {
			config.insert(
				"email".to_string(),
				json!({
					"member.started": [{
						"subject": scenario.title,
						"message": "Hello <tag data-tag-type=\"string\" data-tag-name=\"recipient.firstname\"></tag>, \
							<tag data-tag-type=\"button\" data-tag-name=\"url\" data-tag-title=\"Access documents\">Access documents</tag>",
						"to": ["@member"]
					}]
				}),
			);
		}
		if let Some(status_url) = &scenario.status_url {
			let hook = json!([{ "url": status_url, "method": "POST" }]);
			let events: Map<String, Value> = PROCEDURE_EVENTS
				.entries()
				.iter()
				.map(|(event, _)| (event.to_string(), hook.clone()))
				.collect();
			config.insert("webhook".to_string(), Value::Object(events));
		}
		if !config.is_empty() {
			payload["config"] = Value::Object(config);
		}
		payload
	}

	fn member_payload(
		&self,
		scenario: &Scenario,
		procedure_id: &str,
		position: usize,
		signer: &Signer,
	) -> Value {
		let mut payload = json!({
			"firstname": signer.firstname,
			"lastname": signer.lastname,
			"email": signer.email,
			"procedure": procedure_id,
		});
		if let Some(phone) = &signer.phone {
			payload["phone"] = json!(phone);
		}
		if scenario.invitation_mode.is_ordered() {
			payload["position"] = json!(position + 1);
		}
		payload
	}

	#[instrument(skip_all, fields(procedure_id = %truncate_id(procedure_id)))]
	async fn fetch_procedure(&self, procedure_id: &str) -> Result<Value, DriverError> {
		Ok(self.requester.get(procedure_id).await?)
	}

	fn transaction_from_procedure(&self, procedure: &Value) -> Result<Transaction, DriverError> {
		let id = response_id(procedure, "id")?;
		let mut transaction = Transaction::new(
			self.name(),
			id,
			PROCEDURE_STATUSES.resolve_opt(procedure["status"].as_str()),
		);
		transaction.title = str_field(procedure, "name");
		transaction.custom_id = procedure
			.pointer("/metadata/customId")
			.and_then(Value::as_str)
			.map(str::to_string);
		transaction.created_at = date_field(procedure, "createdAt");
		transaction.expire_at = date_field(procedure, "expiresAt").or_else(|| {
			transaction
				.created_at
				.map(|created| created + Duration::days(i64::from(self.expiration_days())))
		});

		let members = procedure["members"].as_array().cloned().unwrap_or_default();
		for (index, member) in members.iter().enumerate() {
			let member_id = response_id(member, "id")?;
			let mut signer = Signer::new(
				index as i64 + 1,
				str_field(member, "firstname").unwrap_or_default(),
				str_field(member, "lastname").unwrap_or_default(),
				str_field(member, "email").unwrap_or_default(),
			);
			signer.phone = str_field(member, "phone");

			let mut result =
				SignerResult::new(signer, MEMBER_STATUSES.resolve_opt(member["status"].as_str()))
					.with_url(Some(self.sign_url(&member_id)));
			result.action_at = date_field(member, "finishedAt");
			transaction.signers.push(result);
		}

		Ok(transaction)
	}
}

#[async_trait]
impl DriverInterface for YousignDriver {
	fn name(&self) -> &'static str {
		Registry::NAME
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(YousignSchema)
	}

	async fn create_transaction(&self, scenario: &Scenario) -> Result<Transaction, DriverError> {
		scenario.validate()?;
		for signer in &scenario.signers {
			require_email(signer)?;
		}

		let procedure = self
			.requester
			.post("/procedures", &self.procedure_payload(scenario))
			.await?;
		let procedure_id = response_id(&procedure, "id")?;
		info!(procedure_id = %truncate_id(&procedure_id), "Created Yousign procedure");

		let mut files = IdMap::new(IdKind::Document);
		for document in &scenario.documents {
			let content = read_document(document).await?;
			let mut payload = json!({
				"name": document.file_name(),
				"content": STANDARD.encode(content),
				"procedure": procedure_id,
			});
			if !document.metadata.is_empty() {
				payload["metadata"] = metadata_to_json(&document.metadata);
			}
			let file = self.requester.post("/files", &payload).await?;
			files.insert(document.id, response_id(&file, "id")?);
		}

		let mut members = IdMap::new(IdKind::Signer);
		for (position, signer) in scenario.signers.iter().enumerate() {
			let payload = self.member_payload(scenario, &procedure_id, position, signer);
			let member = self.requester.post("/members", &payload).await?;
			members.insert(signer.id, response_id(&member, "id")?);
		}

		for signature in &scenario.signatures {
			let [x1, y1, x2, y2] = signature.corners();
			let payload = json!({
				"file": files.get(signature.document_id)?,
				"member": members.get(signature.signer_id)?,
				"position": format!("{},{},{},{}", x1, y1, x2, y2),
				"page": signature.page,
				"mention": signature.label.clone().unwrap_or_default(),
				"mention2": "",
			});
			self.requester.post("/file_objects", &payload).await?;
		}
		debug!(count = scenario.signatures.len(), "Placed signature fields");

		self.requester
			.put(&procedure_id, &json!({ "start": true }))
			.await?;
		info!(procedure_id = %truncate_id(&procedure_id), "Started Yousign procedure");

		self.get_transaction(&procedure_id).await
	}

	async fn get_transaction(&self, transaction_id: &str) -> Result<Transaction, DriverError> {
		let procedure = self.fetch_procedure(transaction_id).await?;
		self.transaction_from_procedure(&procedure)
	}

	async fn get_documents(&self, transaction_id: &str) -> Result<Vec<DocumentResult>, DriverError> {
		let procedure = self.fetch_procedure(transaction_id).await?;
		ensure_completed(&self.transaction_from_procedure(&procedure)?)?;

		let mut results = Vec::new();
		let files = procedure["files"].as_array().cloned().unwrap_or_default();
		for (index, file) in files
			.iter()
			.filter(|f| f["type"].as_str() != Some("attachment"))
			.enumerate()
		{
			let file_id = response_id(file, "id")?;
			let content = self
				.requester
				.get_bytes(&format!("{}/download?alt=media", file_id))
				.await?;
			let name = str_field(file, "name").unwrap_or_else(|| file_id.clone());
			let mut result = DocumentResult::new(index as i64 + 1, name, content);
			result.document.metadata = metadata_from_json(&file["metadata"]);
			results.push(result);
		}
		Ok(results)
	}

	fn expiration_days(&self) -> u32 {
		EXPIRATION_DAYS
	}

	fn format_webhook(&self, payload: &Value) -> Result<Webhook, DriverError> {
		procedure_webhook(payload)
	}
}

/// Maps a `{procedure, eventName}` callback. The procedure is either its id
/// or the full procedure object.
pub(crate) fn procedure_webhook(payload: &Value) -> Result<Webhook, DriverError> {
	let procedure_id = match payload.get("procedure") {
		Some(Value::String(id)) if !id.is_empty() => id.clone(),
		Some(procedure @ Value::Object(_)) => str_field(procedure, "id").ok_or_else(|| {
			ValidationError::InvalidWebhook("Yousign webhook procedure has no id".to_string())
		})?,
		_ => {
			return Err(ValidationError::InvalidWebhook(
				"Yousign webhook parameter \"procedure\" must be set".to_string(),
			)
			.into())
		},
	};
	let event_name = payload
		.get("eventName")
		.and_then(Value::as_str)
		.ok_or_else(|| {
			ValidationError::InvalidWebhook(
				"Yousign webhook parameter \"eventName\" must be set".to_string(),
			)
		})?;

	if !PROCEDURE_EVENTS.contains(event_name) {
		return Err(ValidationError::InvalidWebhook(format!(
			"Unknown Yousign webhook event name: {}",
			event_name
		))
		.into());
	}
	Ok(Webhook::new(procedure_id, PROCEDURE_EVENTS.resolve(event_name)))
}

/// Factory function to create a Yousign v2 driver from configuration.
pub fn create_driver(
	config: &toml::Value,
) -> BoxFuture<'static, Result<Box<dyn DriverInterface>, DriverError>> {
	let config = config.clone();
	async move {
		let config: YousignConfig = parse_config(&YousignSchema, &config)?;
		Ok(Box::new(YousignDriver::new(config)?) as Box<dyn DriverInterface>)
	}
	.boxed()
}

/// Registry for the Yousign v2 driver.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "yousign";
	type Factory = DriverFactory;

	fn factory() -> Self::Factory {
		create_driver
	}
}

impl crate::DriverRegistry for Registry {}
