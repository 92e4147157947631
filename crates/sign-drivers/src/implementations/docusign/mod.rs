//! DocuSign eSignature REST driver.
//!
//! A transaction is a DocuSign envelope sent in one request with its
//! documents, embedded signers and sign-here tabs. Signers are embedded
//! (they carry a `clientUserId`), so signing URLs are recipient views that
//! expire within minutes and are regenerated on every `get_transaction`.

mod auth;

use crate::common::{
	date_field, ensure_completed, id_field, parse_config, read_document, require_email,
	response_id, split_name, str_field,
};
use crate::{DriverError, DriverFactory, DriverInterface};
use async_trait::async_trait;
use auth::{JwtGrant, DEMO_AUTH_URL, PRODUCTION_AUTH_URL};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Duration;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Deserialize;
use serde_json::{json, Value};
use sign_transport::{Authorization, RestRequester};
use sign_types::{
	truncate_id, CanonicalStatus, ConfigSchema, Document, DocumentResult, Field, FieldType,
	ImplementationRegistry, Metadata, MetadataValue, Scenario, Schema, SecretString, Signer,
	SignerResult, SignerStatus, StatusTable, Transaction, TransactionStatus, ValidationError,
	Webhook,
};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

const EXPIRATION_DAYS: u32 = 30;
const CUSTOM_ID_FIELD: &str = "customId";
const RETURN_URL_FIELD: &str = "returnUrl";
/// Lets DocuSign email embedded signers instead of relying on the caller.
const SIGN_AT_DOCUSIGN: &str = "SIGN_AT_DOCUSIGN";
const VOIDED_REASON: &str = "Canceled by the sender";

/// Envelope statuses.
pub const ENVELOPE_STATUSES: StatusTable<TransactionStatus> = StatusTable::new(&[
	("created", TransactionStatus::Draft),
	("sent", TransactionStatus::Ready),
	("delivered", TransactionStatus::Ready),
	("signed", TransactionStatus::Ready),
	("correct", TransactionStatus::Ready),
	("completed", TransactionStatus::Completed),
	("declined", TransactionStatus::Refused),
	("voided", TransactionStatus::Canceled),
	("deleted", TransactionStatus::Canceled),
	("timedout", TransactionStatus::Expired),
	("authoritativecopy", TransactionStatus::Completed),
]);

/// Recipient statuses.
pub const RECIPIENT_STATUSES: StatusTable<SignerStatus> = StatusTable::new(&[
	("created", SignerStatus::Waiting),
	("sent", SignerStatus::Ready),
	("delivered", SignerStatus::Accessed),
	("signed", SignerStatus::Signed),
	("completed", SignerStatus::Signed),
	("declined", SignerStatus::Canceled),
	("autoresponded", SignerStatus::Failed),
	("faxpending", SignerStatus::Waiting),
]);

/// Driver configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DocusignConfig {
	pub integrator_key: String,
	/// Id of the user the integration impersonates.
	pub user_id: String,
	/// RSA private key in PEM form, or the path of a PEM file.
	pub private_key: SecretString,
	/// Redirect URI registered for the integration, used for consent.
	pub redirect_uri: String,
	/// `demo`, `sandbox` or `production`.
	pub mode: String,
	#[serde(default)]
	pub auth_endpoint: Option<String>,
	/// Where signers land after signing when the scenario gives no URL.
	#[serde(default)]
	pub return_url: Option<String>,
}

impl DocusignConfig {
	fn auth_url(&self) -> String {
		match &self.auth_endpoint {
			Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
			None if self.mode == "production" => PRODUCTION_AUTH_URL.to_string(),
			None => DEMO_AUTH_URL.to_string(),
		}
	}

	fn grant<'a>(&'a self, private_key: &'a SecretString) -> JwtGrant<'a> {
		JwtGrant {
			integrator_key: &self.integrator_key,
			user_id: &self.user_id,
			redirect_uri: &self.redirect_uri,
			private_key,
		}
	}
}

/// Configuration schema for the DocuSign driver.
pub struct DocusignSchema;

impl ConfigSchema for DocusignSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(
			vec![
				Field::new("integrator_key", FieldType::String).non_empty(),
				Field::new("user_id", FieldType::String).non_empty(),
				Field::new("private_key", FieldType::String).non_empty(),
				Field::new("redirect_uri", FieldType::String).non_empty(),
				Field::new("mode", FieldType::String).one_of(&["demo", "sandbox", "production"]),
			],
			vec![
				Field::new("auth_endpoint", FieldType::String).non_empty(),
				Field::new("return_url", FieldType::String).non_empty(),
			],
		)
		.validate(config)
	}
}

/// DocuSign envelope driver.
pub struct DocusignDriver {
	requester: RestRequester,
	config: DocusignConfig,
	/// Last recipient view issued, keyed by envelope and recipient id.
	signing_urls: RwLock<HashMap<(String, String), String>>,
}

impl DocusignDriver {
	/// Authenticates with the JWT grant and binds the driver to the default
	/// account of the impersonated user.
	pub async fn connect(config: DocusignConfig) -> Result<Self, DriverError> {
		let private_key = load_private_key(&config.private_key).await?;
		let auth_requester = RestRequester::new(config.auth_url(), Authorization::None)?;
		let session = auth::authenticate(&auth_requester, &config.grant(&private_key)).await?;
		info!(
			account_id = %truncate_id(&session.account_id),
			"Authenticated with DocuSign"
		);

		let requester = auth_requester.rebase(
			session.api_endpoint(),
			Authorization::Bearer(session.access_token.clone()),
		);
		Ok(Self {
			requester,
			config,
			signing_urls: RwLock::new(HashMap::new()),
		})
	}

	async fn document_payload(&self, document: &Document) -> Result<Value, DriverError> {
		let content = read_document(document).await?;
		let extension = document
			.path
			.extension()
			.and_then(|ext| ext.to_str())
			.unwrap_or("pdf");
		let mut payload = json!({
			"documentBase64": STANDARD.encode(content),
			"name": document.name,
			"documentId": document.id.to_string(),
			"fileExtension": extension,
		});
		if !document.metadata.is_empty() {
			let fields: Vec<Value> = document
				.metadata
				.iter()
				.map(|(name, value)| json!({ "name": name, "value": value.to_string() }))
				.collect();
			payload["documentFields"] = Value::Array(fields);
		}
		Ok(payload)
	}

	fn signer_payload(&self, scenario: &Scenario, position: usize, signer: &Signer) -> Value {
		let routing_order = if scenario.invitation_mode.is_ordered() {
			position + 1
		} else {
			1
		};
		let tabs: Vec<Value> = scenario
			.signatures_for_signer(signer.id)
			.map(|signature| {
				let mut tab = json!({
					"documentId": signature.document_id.to_string(),
					"pageNumber": signature.page.to_string(),
					"xPosition": signature.x.to_string(),
					"yPosition": signature.y.to_string(),
					"recipientId": signer.id.to_string(),
				});
				if let Some(label) = &signature.label {
					tab["tabLabel"] = json!(label);
				}
				tab
			})
			.collect();

		let mut payload = json!({
			"email": signer.email,
			"name": signer.full_name(),
			"firstName": signer.firstname,
			"lastName": signer.lastname,
			"recipientId": signer.id.to_string(),
			"routingOrder": routing_order.to_string(),
			"clientUserId": signer.id.to_string(),
			"emailNotification": { "supportedLanguage": scenario.lang.code() },
			"tabs": { "signHereTabs": tabs },
		});
		if scenario.invitation_mode.sends_email() {
			payload["embeddedRecipientStartURL"] = json!(SIGN_AT_DOCUSIGN);
		}
		payload
	}

	fn envelope_payload(&self, scenario: &Scenario, documents: Vec<Value>) -> Value {
		let signers: Vec<Value> = scenario
			.signers
			.iter()
			.enumerate()
			.map(|(position, signer)| self.signer_payload(scenario, position, signer))
			.collect();

		let mut custom_fields = Vec::new();
		if let Some(custom_id) = &scenario.custom_id {
			custom_fields.push(text_custom_field(CUSTOM_ID_FIELD, custom_id));
		}
		if let Some(success_url) = &scenario.success_url {
			custom_fields.push(text_custom_field(RETURN_URL_FIELD, success_url));
		}

		let mut payload = json!({
			"emailSubject": scenario.title,
			"status": "sent",
			"documents": documents,
			"recipients": { "signers": signers },
			"notification": {
				"useAccountDefaults": "false",
				"expirations": {
					"expireEnabled": "true",
					"expireAfter": self.expiration_days().to_string(),
					"expireWarn": "0",
				},
			},
			"customFields": { "textCustomFields": custom_fields },
		});
		if let Some(status_url) = &scenario.status_url {
			payload["eventNotification"] = json!({
				"url": status_url,
				"loggingEnabled": "true",
				"requireAcknowledgment": "true",
				"envelopeEvents": (["sent", "delivered", "completed", "declined", "voided"]
					.iter()
					.map(|code| json!({ "envelopeEventStatusCode": code }))
					.collect::<Vec<_>>()),
			});
		}
		payload
	}

	#[instrument(skip_all, fields(envelope_id = %truncate_id(envelope_id)))]
	async fn fetch_envelope(&self, envelope_id: &str) -> Result<Value, DriverError> {
		Ok(self.requester.get(&format!("/envelopes/{}", envelope_id)).await?)
	}

	/// Creates a fresh recipient view for an embedded signer.
	async fn recipient_view(
		&self,
		envelope_id: &str,
		return_url: &str,
		recipient: &Value,
	) -> Result<Option<String>, DriverError> {
		let body = json!({
			"returnUrl": return_url,
			"authenticationMethod": "none",
			"email": recipient["email"],
			"userName": recipient["name"],
			"clientUserId": recipient["clientUserId"],
			"recipientId": recipient["recipientId"],
		});
		let view = self
			.requester
			.post(&format!("/envelopes/{}/views/recipient", envelope_id), &body)
			.await?;
		Ok(str_field(&view, "url"))
	}
}

#[async_trait]
impl DriverInterface for DocusignDriver {
	fn name(&self) -> &'static str {
		Registry::NAME
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(DocusignSchema)
	}

	async fn create_transaction(&self, scenario: &Scenario) -> Result<Transaction, DriverError> {
		scenario.validate()?;
		for signer in &scenario.signers {
			require_email(signer)?;
		}

		let mut documents = Vec::with_capacity(scenario.documents.len());
		for document in &scenario.documents {
			documents.push(self.document_payload(document).await?);
		}

		let summary = self
			.requester
			.post("/envelopes", &self.envelope_payload(scenario, documents))
			.await?;
		let envelope_id = response_id(&summary, "envelopeId")?;
		info!(envelope_id = %truncate_id(&envelope_id), "Sent DocuSign envelope");

		self.get_transaction(&envelope_id).await
	}

	async fn get_transaction(&self, transaction_id: &str) -> Result<Transaction, DriverError> {
		let envelope = self.fetch_envelope(transaction_id).await?;
		let recipients = self
			.requester
			.get(&format!("/envelopes/{}/recipients", transaction_id))
			.await?;
		let custom_fields = self
			.requester
			.get(&format!("/envelopes/{}/custom_fields", transaction_id))
			.await?;

		let mut transaction = Transaction::new(
			self.name(),
			transaction_id,
			ENVELOPE_STATUSES.resolve_opt(envelope["status"].as_str()),
		);
		transaction.title = str_field(&envelope, "emailSubject");
		transaction.custom_id = custom_field(&custom_fields, CUSTOM_ID_FIELD);
		transaction.created_at = date_field(&envelope, "createdDateTime");
		transaction.expire_at = date_field(&envelope, "expireDateTime").or_else(|| {
			transaction
				.created_at
				.map(|created| created + Duration::days(i64::from(EXPIRATION_DAYS)))
		});

		let return_url = custom_field(&custom_fields, RETURN_URL_FIELD)
			.or_else(|| self.config.return_url.clone())
			.unwrap_or_else(|| self.config.redirect_uri.clone());

		let signers = recipients["signers"].as_array().cloned().unwrap_or_default();
		for (index, recipient) in signers.iter().enumerate() {
			let id = id_field(recipient, "recipientId")
				.and_then(|id| id.parse().ok())
				.unwrap_or(index as i64 + 1);
			let name = str_field(recipient, "name").unwrap_or_default();
			let (first, last) = split_name(&name);
			let signer = Signer::new(
				id,
				str_field(recipient, "firstName").unwrap_or(first),
				str_field(recipient, "lastName").unwrap_or(last),
				str_field(recipient, "email").unwrap_or_default(),
			);
			let status = RECIPIENT_STATUSES.resolve_opt(recipient["status"].as_str());

			let embedded = str_field(recipient, "clientUserId").is_some();
			let url = if embedded
				&& transaction.status == TransactionStatus::Ready
				&& !status.is_terminal()
			{
				let key = (transaction_id.to_string(), id.to_string());
				match self.recipient_view(transaction_id, &return_url, recipient).await {
					Ok(Some(url)) => {
						self.signing_urls.write().await.insert(key, url.clone());
						Some(url)
					},
					Ok(None) => None,
					Err(e) => {
						warn!(recipient_id = id, error = %e, "Could not create DocuSign recipient view");
						self.signing_urls.read().await.get(&key).cloned()
					},
				}
			} else {
				None
			};

			let mut result = SignerResult::new(signer, status).with_url(url);
			result.action_at = date_field(recipient, "signedDateTime")
				.or_else(|| date_field(recipient, "declinedDateTime"))
				.or_else(|| date_field(recipient, "deliveredDateTime"));
			transaction.signers.push(result);
		}

		Ok(transaction)
	}

	async fn get_documents(&self, transaction_id: &str) -> Result<Vec<DocumentResult>, DriverError> {
		let envelope = self.fetch_envelope(transaction_id).await?;
		ensure_completed(&Transaction::new(
			self.name(),
			transaction_id,
			ENVELOPE_STATUSES.resolve_opt(envelope["status"].as_str()),
		))?;

		let listing = self
			.requester
			.get(&format!("/envelopes/{}/documents", transaction_id))
			.await?;
		let documents = listing["envelopeDocuments"]
			.as_array()
			.cloned()
			.unwrap_or_default();

		let mut results = Vec::new();
		for (index, document) in documents
			.iter()
			.filter(|d| d["documentId"].as_str() != Some("certificate") && d["type"].as_str() != Some("summary"))
			.enumerate()
		{
			let document_id = response_id(document, "documentId")?;
			let path = format!("/envelopes/{}/documents/{}", transaction_id, document_id);
			let content = self.requester.get_bytes(&path).await?;
			let fields = self.requester.get(&format!("{}/fields", path)).await?;
			debug!(document_id = %document_id, size = content.len(), "Downloaded signed document");

			let id = document_id.parse().unwrap_or(index as i64 + 1);
			let name = str_field(document, "name").unwrap_or_else(|| document_id.clone());
			let mut result = DocumentResult::new(id, name, content);
			result.document.metadata = document_fields(&fields);
			results.push(result);
		}
		Ok(results)
	}

	async fn cancel_transaction(&self, transaction_id: &str) -> Result<Transaction, DriverError> {
		self.requester
			.put(
				&format!("/envelopes/{}", transaction_id),
				&json!({ "status": "voided", "voidedReason": VOIDED_REASON }),
			)
			.await?;
		info!(envelope_id = %truncate_id(transaction_id), "Voided DocuSign envelope");
		self.get_transaction(transaction_id).await
	}

	fn expiration_days(&self) -> u32 {
		EXPIRATION_DAYS
	}

	fn format_webhook(&self, _payload: &Value) -> Result<Webhook, DriverError> {
		Err(DriverError::NotImplemented {
			driver: self.name(),
			operation: "format_webhook",
		})
	}
}

fn text_custom_field(name: &str, value: &str) -> Value {
	json!({ "name": name, "value": value, "show": "false", "required": "false" })
}

fn custom_field(custom_fields: &Value, name: &str) -> Option<String> {
	custom_fields["textCustomFields"]
		.as_array()?
		.iter()
		.find(|field| field["name"].as_str() == Some(name))
		.and_then(|field| str_field(field, "value"))
}

/// Document fields come back as text; numbers and booleans are restored.
fn document_fields(fields: &Value) -> Metadata {
	let Some(fields) = fields["documentFields"].as_array() else {
		return Metadata::new();
	};
	fields
		.iter()
		.filter_map(|field| {
			let name = str_field(field, "name")?;
			let text = field["value"].as_str().unwrap_or_default();
			let value = if let Ok(i) = text.parse::<i64>() {
				MetadataValue::Integer(i)
			} else if let Ok(b) = text.parse::<bool>() {
				MetadataValue::Bool(b)
			} else {
				MetadataValue::String(text.to_string())
			};
			Some((name, value))
		})
		.collect()
}

/// Accepts the PEM text itself or the path of a PEM file.
async fn load_private_key(private_key: &SecretString) -> Result<SecretString, DriverError> {
	let value = private_key.expose_secret().trim();
	if value.starts_with("-----BEGIN") {
		return Ok(private_key.clone());
	}
	let pem = tokio::fs::read_to_string(value).await.map_err(|e| {
		DriverError::Io(std::io::Error::new(
			e.kind(),
			format!("private key file {}: {}", value, e),
		))
	})?;
	Ok(SecretString::from(pem))
}

/// Factory function to create a DocuSign driver from configuration.
pub fn create_driver(
	config: &toml::Value,
) -> BoxFuture<'static, Result<Box<dyn DriverInterface>, DriverError>> {
	let config = config.clone();
	async move {
		let config: DocusignConfig = parse_config(&DocusignSchema, &config)?;
		Ok(Box::new(DocusignDriver::connect(config).await?) as Box<dyn DriverInterface>)
	}
	.boxed()
}

/// Registry for the DocuSign driver.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "docusign";
	type Factory = DriverFactory;

	fn factory() -> Self::Factory {
		create_driver
	}
}

impl crate::DriverRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_utils::{
		assert_table_resolves, dangling_scenario, two_by_two_scenario, PDF_CONTENT,
	};
	use sign_types::InvitationMode;
	use wiremock::matchers::{any, body_partial_json, body_string_contains, header, method, path};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	const PRIVATE_KEY: &str = include_str!(concat!(
		env!("CARGO_MANIFEST_DIR"),
		"/testdata/docusign_test_key.pem"
	));
	const API: &str = "/restapi/v2.1/accounts/acc-1";

	fn config(server: &MockServer) -> DocusignConfig {
		DocusignConfig {
			integrator_key: "integrator-1".to_string(),
			user_id: "user-1".to_string(),
			private_key: SecretString::from(PRIVATE_KEY),
			redirect_uri: "https://app.example.com/docusign/consent".to_string(),
			mode: "demo".to_string(),
			auth_endpoint: Some(server.uri()),
			return_url: None,
		}
	}

	async fn mount_auth(server: &MockServer) {
		Mock::given(method("POST"))
			.and(path("/oauth/token"))
			.and(body_string_contains(
				"grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer",
			))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"access_token": "token-1",
				"token_type": "Bearer",
				"expires_in": 3600
			})))
			.mount(server)
			.await;
		Mock::given(method("GET"))
			.and(path("/oauth/userinfo"))
			.and(header("authorization", "Bearer token-1"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"sub": "user-1",
				"accounts": [
					{"account_id": "acc-2", "is_default": false, "base_uri": "https://unused.example.com"},
					{"account_id": "acc-1", "is_default": true, "base_uri": server.uri()}
				]
			})))
			.mount(server)
			.await;
	}

	async fn connected(server: &MockServer) -> DocusignDriver {
		mount_auth(server).await;
		DocusignDriver::connect(config(server)).await.unwrap()
	}

	async fn mount_envelope(server: &MockServer, status: &str, recipient_status: &str) {
		Mock::given(method("GET"))
			.and(path(format!("{}/envelopes/env-1", API)))
			.and(header("authorization", "Bearer token-1"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"envelopeId": "env-1",
				"status": status,
				"emailSubject": "Contract signature",
				"createdDateTime": "2024-03-01T10:00:00.0000000Z"
			})))
			.mount(server)
			.await;
		let recipient = |id: &str, name: &str, email: &str| {
			json!({
				"recipientId": id,
				"name": name,
				"email": email,
				"clientUserId": id,
				"status": recipient_status
			})
		};
		Mock::given(method("GET"))
			.and(path(format!("{}/envelopes/env-1/recipients", API)))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"signers": [
					recipient("1", "Jane Doe", "jane.doe@example.com"),
					recipient("2", "John Smith", "john.smith@example.com")
				]
			})))
			.mount(server)
			.await;
		Mock::given(method("GET"))
			.and(path(format!("{}/envelopes/env-1/custom_fields", API)))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"textCustomFields": [
					{"name": "customId", "value": "contract-42"},
					{"name": "returnUrl", "value": "https://app.example.com/signed"}
				]
			})))
			.mount(server)
			.await;
	}

	#[tokio::test]
	async fn test_create_transaction_end_to_end() {
		let server = MockServer::start().await;
		let driver = connected(&server).await;
		let (_dir, scenario) = two_by_two_scenario();

		Mock::given(method("POST"))
			.and(path(format!("{}/envelopes", API)))
			.respond_with(
				ResponseTemplate::new(201).set_body_json(json!({"envelopeId": "env-1", "status": "sent"})),
			)
			.expect(1)
			.mount(&server)
			.await;
		mount_envelope(&server, "sent", "sent").await;
		Mock::given(method("POST"))
			.and(path(format!("{}/envelopes/env-1/views/recipient", API)))
			.and(body_partial_json(json!({
				"clientUserId": "1",
				"returnUrl": "https://app.example.com/signed"
			})))
			.respond_with(
				ResponseTemplate::new(201).set_body_json(json!({"url": "https://demo.docusign.net/signing/1"})),
			)
			.mount(&server)
			.await;
		Mock::given(method("POST"))
			.and(path(format!("{}/envelopes/env-1/views/recipient", API)))
			.and(body_partial_json(json!({"clientUserId": "2"})))
			.respond_with(ResponseTemplate::new(400).set_body_json(json!({
				"errorCode": "UNKNOWN_ENVELOPE_RECIPIENT"
			})))
			.mount(&server)
			.await;

		let transaction = driver.create_transaction(&scenario).await.unwrap();

		assert_eq!(transaction.driver, "docusign");
		assert_eq!(transaction.id, "env-1");
		assert_eq!(transaction.status, TransactionStatus::Ready);
		assert_eq!(transaction.custom_id.as_deref(), Some("contract-42"));
		let created = transaction.created_at.unwrap();
		assert_eq!((transaction.expire_at.unwrap() - created).num_days(), 30);

		let jane = transaction.signer(1).unwrap();
		assert_eq!(jane.signer.firstname, "Jane");
		assert_eq!(jane.signer.lastname, "Doe");
		assert_eq!(jane.status, SignerStatus::Ready);
		assert_eq!(jane.url.as_deref(), Some("https://demo.docusign.net/signing/1"));
		// A failed view with no earlier URL leaves the signer without one.
		assert_eq!(transaction.signer(2).unwrap().url, None);

		let requests = server.received_requests().await.unwrap();
		let envelope: Value = requests
			.iter()
			.find(|r| r.method.as_str() == "POST" && r.url.path() == format!("{}/envelopes", API))
			.map(|r| serde_json::from_slice(&r.body).unwrap())
			.unwrap();
		assert_eq!(envelope["status"], "sent");
		assert_eq!(envelope["emailSubject"], "Contract signature");
		assert_eq!(envelope["documents"][0]["documentBase64"], STANDARD.encode(PDF_CONTENT));
		assert_eq!(envelope["documents"][1]["documentFields"][0], json!({"name": "localId2", "value": "200"}));
		let signers = &envelope["recipients"]["signers"];
		assert_eq!(signers[1]["routingOrder"], "2");
		assert_eq!(signers[1]["embeddedRecipientStartURL"], "SIGN_AT_DOCUSIGN");
		assert_eq!(signers[0]["emailNotification"]["supportedLanguage"], "fr");
		assert_eq!(
			signers[0]["tabs"]["signHereTabs"][1],
			json!({
				"documentId": "2",
				"pageNumber": "1",
				"xPosition": "100",
				"yPosition": "100",
				"recipientId": "1"
			})
		);
		assert_eq!(envelope["notification"]["expirations"]["expireAfter"], "30");
	}

	#[tokio::test]
	async fn test_failed_view_falls_back_to_last_url() {
		let server = MockServer::start().await;
		let driver = connected(&server).await;
		mount_envelope(&server, "sent", "sent").await;
		Mock::given(method("POST"))
			.and(path(format!("{}/envelopes/env-1/views/recipient", API)))
			.respond_with(
				ResponseTemplate::new(201).set_body_json(json!({"url": "https://demo.docusign.net/signing/first"})),
			)
			.up_to_n_times(2)
			.mount(&server)
			.await;
		Mock::given(method("POST"))
			.and(path(format!("{}/envelopes/env-1/views/recipient", API)))
			.respond_with(ResponseTemplate::new(500).set_body_json(json!({
				"errorCode": "SERVICE_UNAVAILABLE"
			})))
			.mount(&server)
			.await;

		let first = driver.get_transaction("env-1").await.unwrap();
		assert_eq!(
			first.signer(2).unwrap().url.as_deref(),
			Some("https://demo.docusign.net/signing/first")
		);

		let refreshed = driver.get_transaction("env-1").await.unwrap();
		for id in [1, 2] {
			assert_eq!(
				refreshed.signer(id).unwrap().url.as_deref(),
				Some("https://demo.docusign.net/signing/first")
			);
		}
	}

	#[test]
	fn test_invitation_mode_none_keeps_signers_embedded() {
		let (_dir, mut scenario) = two_by_two_scenario();
		scenario.invitation_mode = InvitationMode::None;
		let driver = DocusignDriver {
			requester: RestRequester::with_client(reqwest::Client::new(), "http://localhost", Authorization::None),
			config: DocusignConfig {
				integrator_key: "i".to_string(),
				user_id: "u".to_string(),
				private_key: SecretString::from("k"),
				redirect_uri: "https://app.example.com".to_string(),
				mode: "demo".to_string(),
				auth_endpoint: None,
				return_url: None,
			},
			signing_urls: RwLock::new(HashMap::new()),
		};

		let payload = driver.signer_payload(&scenario, 1, &scenario.signers[1]);
		assert_eq!(payload["routingOrder"], "1");
		assert!(payload.get("embeddedRecipientStartURL").is_none());
		assert_eq!(payload["clientUserId"], "2");
	}

	#[tokio::test]
	async fn test_validation_happens_before_network() {
		let server = MockServer::start().await;
		let driver = connected(&server).await;
		Mock::given(any())
			.and(path(format!("{}/envelopes", API)))
			.respond_with(ResponseTemplate::new(500))
			.expect(0)
			.mount(&server)
			.await;

		let (_dir, scenario) = dangling_scenario();
		assert!(matches!(
			driver.create_transaction(&scenario).await,
			Err(DriverError::Validation(ValidationError::UnknownSigner(99)))
		));
	}

	#[tokio::test]
	async fn test_consent_required() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/oauth/token"))
			.respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "consent_required"})))
			.mount(&server)
			.await;

		match DocusignDriver::connect(config(&server)).await {
			Err(DriverError::ConsentRequired { consent_url }) => {
				assert!(consent_url.starts_with(&format!("{}/oauth/auth?response_type=code", server.uri())));
				assert!(consent_url.contains("scope=signature%20impersonation"));
				assert!(consent_url.contains("client_id=integrator-1"));
				assert!(consent_url
					.contains("redirect_uri=https%3A%2F%2Fapp.example.com%2Fdocusign%2Fconsent"));
			},
			Err(other) => panic!("unexpected error: {}", other),
			Ok(_) => panic!("connected without consent"),
		}
	}

	#[tokio::test]
	async fn test_other_auth_failure() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/oauth/token"))
			.respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})))
			.mount(&server)
			.await;

		assert!(matches!(
			DocusignDriver::connect(config(&server)).await,
			Err(DriverError::Auth(message)) if message.contains("invalid_grant")
		));
	}

	#[tokio::test]
	async fn test_private_key_from_file() {
		let server = MockServer::start().await;
		mount_auth(&server).await;
		let dir = tempfile::TempDir::new().unwrap();
		let key_path = dir.path().join("docusign.pem");
		std::fs::write(&key_path, PRIVATE_KEY).unwrap();

		let mut config = config(&server);
		config.private_key = SecretString::from(key_path.display().to_string());
		assert!(DocusignDriver::connect(config.clone()).await.is_ok());

		config.private_key = SecretString::from(dir.path().join("missing.pem").display().to_string());
		assert!(matches!(
			DocusignDriver::connect(config).await,
			Err(DriverError::Io(_))
		));
	}

	#[tokio::test]
	async fn test_get_documents_skips_certificate() {
		let server = MockServer::start().await;
		let driver = connected(&server).await;
		mount_envelope(&server, "completed", "completed").await;
		Mock::given(method("GET"))
			.and(path(format!("{}/envelopes/env-1/documents", API)))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"envelopeDocuments": [
					{"documentId": "1", "name": "Document 1", "type": "content"},
					{"documentId": "certificate", "name": "Summary", "type": "summary"}
				]
			})))
			.mount(&server)
			.await;
		Mock::given(method("GET"))
			.and(path(format!("{}/envelopes/env-1/documents/1", API)))
			.respond_with(ResponseTemplate::new(200).set_body_bytes(PDF_CONTENT.to_vec()))
			.expect(1)
			.mount(&server)
			.await;
		Mock::given(method("GET"))
			.and(path(format!("{}/envelopes/env-1/documents/1/fields", API)))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"documentFields": [{"name": "localId1", "value": "100"}, {"name": "kind", "value": "lease"}]
			})))
			.mount(&server)
			.await;

		let documents = driver.get_documents("env-1").await.unwrap();
		assert_eq!(documents.len(), 1);
		assert_eq!(documents[0].id(), 1);
		assert_eq!(documents[0].name(), "Document 1");
		assert_eq!(documents[0].content.as_deref(), Some(PDF_CONTENT));
		assert_eq!(documents[0].metadata()["localId1"], MetadataValue::Integer(100));
		assert_eq!(documents[0].metadata()["kind"], MetadataValue::from("lease"));
	}

	#[tokio::test]
	async fn test_get_documents_requires_completion() {
		let server = MockServer::start().await;
		let driver = connected(&server).await;
		mount_envelope(&server, "delivered", "delivered").await;

		assert!(matches!(
			driver.get_documents("env-1").await,
			Err(DriverError::Sign(_))
		));
	}

	#[tokio::test]
	async fn test_cancel_voids_envelope() {
		let server = MockServer::start().await;
		let driver = connected(&server).await;
		Mock::given(method("PUT"))
			.and(path(format!("{}/envelopes/env-1", API)))
			.and(body_partial_json(json!({"status": "voided"})))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({"envelopeId": "env-1"})))
			.expect(1)
			.mount(&server)
			.await;
		mount_envelope(&server, "voided", "sent").await;

		let transaction = driver.cancel_transaction("env-1").await.unwrap();
		assert_eq!(transaction.status, TransactionStatus::Canceled);
		// No recipient view is requested once the envelope is voided.
		assert!(transaction.signers.iter().all(|s| s.url.is_none()));
	}

	#[tokio::test]
	async fn test_format_webhook_is_not_implemented() {
		let server = MockServer::start().await;
		let driver = connected(&server).await;
		assert!(matches!(
			driver.format_webhook(&json!({"envelopeId": "env-1"})),
			Err(DriverError::NotImplemented {
				driver: "docusign",
				operation: "format_webhook"
			})
		));
	}

	#[test]
	fn test_status_tables() {
		assert_table_resolves(&ENVELOPE_STATUSES);
		assert_table_resolves(&RECIPIENT_STATUSES);
		assert_eq!(ENVELOPE_STATUSES.resolve("authoritativecopy"), TransactionStatus::Completed);
		assert_eq!(ENVELOPE_STATUSES.resolve("timedout"), TransactionStatus::Expired);
		assert_eq!(RECIPIENT_STATUSES.resolve("autoresponded"), SignerStatus::Failed);
		assert_eq!(RECIPIENT_STATUSES.resolve("unknown-status"), SignerStatus::Unknown);
	}

	#[test]
	fn test_auth_url_selection() {
		let mut config = DocusignConfig {
			integrator_key: "i".to_string(),
			user_id: "u".to_string(),
			private_key: SecretString::from("k"),
			redirect_uri: "https://app.example.com".to_string(),
			mode: "production".to_string(),
			auth_endpoint: None,
			return_url: None,
		};
		assert_eq!(config.auth_url(), PRODUCTION_AUTH_URL);
		config.mode = "sandbox".to_string();
		assert_eq!(config.auth_url(), DEMO_AUTH_URL);
		config.auth_endpoint = Some("https://account.example.com/".to_string());
		assert_eq!(config.auth_url(), "https://account.example.com");
	}
}
