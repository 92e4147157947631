//! Universign XML-RPC driver.
//!
//! The whole transaction (documents, signers and signature fields) is sent in
//! a single `requester.requestTransaction` call. Signers are referenced from
//! signature fields by their position in the request.

use crate::common::{ensure_completed, id_field, parse_config, read_document, require_phone};
use crate::{DriverError, DriverFactory, DriverInterface};
use async_trait::async_trait;
use chrono::{Duration, NaiveTime};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Deserialize;
use serde_json::Value;
use sign_transport::{TransportError, XmlRpcRequester, XmlRpcValue};
use sign_types::{
	truncate_id, ConfigSchema, DocumentResult, Field, FieldType, ImplementationRegistry, Metadata,
	MetadataValue, Scenario, Schema, SecretString, Signer, SignerResult, SignerStatus,
	StatusTable, Transaction, TransactionStatus, ValidationError, Webhook,
};
use tracing::{info, instrument};

const EXPIRATION_DAYS: u32 = 14;

/// Transaction statuses.
pub const TRANSACTION_STATUSES: StatusTable<TransactionStatus> = StatusTable::new(&[
	("ready", TransactionStatus::Ready),
	("expired", TransactionStatus::Expired),
	("completed", TransactionStatus::Completed),
	("canceled", TransactionStatus::Canceled),
	("failed", TransactionStatus::Failed),
]);

/// Signer statuses.
pub const SIGNER_STATUSES: StatusTable<SignerStatus> = StatusTable::new(&[
	("waiting", SignerStatus::Waiting),
	("ready", SignerStatus::Ready),
	("accessed", SignerStatus::Accessed),
	("code-sent", SignerStatus::CodeSent),
	("pending-id-docs", SignerStatus::Accessed),
	("pending-validation", SignerStatus::Accessed),
	("signed", SignerStatus::Signed),
	("canceled", SignerStatus::Canceled),
	("failed", SignerStatus::Failed),
]);

/// Callback status codes, indexed by code.
const WEBHOOK_STATUSES: [TransactionStatus; 5] = [
	TransactionStatus::Ready,
	TransactionStatus::Expired,
	TransactionStatus::Completed,
	TransactionStatus::Canceled,
	TransactionStatus::Failed,
];

fn default_certificate_type() -> String {
	"simple".to_string()
}

/// Driver configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct UniversignConfig {
	pub username: String,
	pub password: SecretString,
	/// XML-RPC endpoint, such as `https://sign.test.cryptolog.com/sign/rpc/`.
	pub endpoint: String,
	/// Signature profile configured on the Universign account.
	pub profile: String,
	#[serde(default = "default_certificate_type")]
	pub certificate_type: String,
	#[serde(default)]
	pub handwritten_signature_mode: i64,
}

/// Configuration schema for the Universign driver.
pub struct UniversignSchema;

impl ConfigSchema for UniversignSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(
			vec![
				Field::new("username", FieldType::String).non_empty(),
				Field::new("password", FieldType::String).non_empty(),
				Field::new("endpoint", FieldType::String).non_empty(),
				Field::new("profile", FieldType::String).non_empty(),
			],
			vec![
				Field::new("certificate_type", FieldType::String).one_of(&[
					"simple",
					"certified",
					"advanced",
				]),
				Field::new(
					"handwritten_signature_mode",
					FieldType::Integer {
						min: Some(0),
						max: Some(2),
					},
				),
			],
		)
		.validate(config)
	}
}

/// Universign transaction driver.
pub struct UniversignDriver {
	requester: XmlRpcRequester,
	config: UniversignConfig,
}

impl UniversignDriver {
	pub fn new(config: UniversignConfig) -> Result<Self, DriverError> {
		let requester = XmlRpcRequester::new(
			config.endpoint.clone(),
			config.username.clone(),
			config.password.clone(),
		)?;
		Ok(Self { requester, config })
	}

	fn signer_request(&self, scenario: &Scenario, signer: &Signer) -> Result<XmlRpcValue, DriverError> {
		let phone = require_phone(signer)?;
		let request = XmlRpcValue::new_struct()
			.with("firstname", &signer.firstname)
			.with("lastname", &signer.lastname)
			.with("emailAddress", &signer.email)
			.with("phoneNum", phone)
			.with_opt(
				"birthDate",
				signer.birthday.map(|day| day.and_time(NaiveTime::MIN)),
			)
			.with_opt("successURL", scenario.success_url.as_ref())
			.with_opt("cancelURL", scenario.cancel_url.as_ref())
			.with_opt("failURL", scenario.error_url.as_ref());
		Ok(request)
	}

	async fn document_requests(&self, scenario: &Scenario) -> Result<Vec<XmlRpcValue>, DriverError> {
		let mut documents = Vec::with_capacity(scenario.documents.len());
		for document in &scenario.documents {
			let mut fields = Vec::new();
			for signature in scenario.signatures_for_document(document.id) {
				let signer_index = scenario
					.signers
					.iter()
					.position(|signer| signer.id == signature.signer_id)
					.ok_or(ValidationError::UnknownSigner(signature.signer_id))?;
				fields.push(
					XmlRpcValue::new_struct()
						.with("page", signature.page)
						.with("x", signature.x)
						.with("y", signature.y)
						.with("signerIndex", signer_index as i64)
						.with_opt("label", signature.label.as_ref()),
				);
			}

			let mut request = XmlRpcValue::new_struct()
				.with("content", read_document(document).await?)
				.with("name", document.file_name())
				.with("signatureFields", fields);
			if !document.metadata.is_empty() {
				request = request.with("metaData", metadata_to_xmlrpc(&document.metadata));
			}
			documents.push(request);
		}
		Ok(documents)
	}

	#[instrument(skip_all, fields(transaction_id = %truncate_id(transaction_id)))]
	async fn fetch_transaction_info(&self, transaction_id: &str) -> Result<XmlRpcValue, DriverError> {
		Ok(self
			.requester
			.call("requester.getTransactionInfo", &[transaction_id.into()])
			.await?)
	}

	fn transaction_from_info(&self, transaction_id: &str, info: &XmlRpcValue) -> Transaction {
		let mut transaction = Transaction::new(
			self.name(),
			transaction_id,
			TRANSACTION_STATUSES.resolve_opt(info.get("status").and_then(XmlRpcValue::as_str)),
		);
		transaction.title = member_str(info, "description");
		transaction.custom_id = member_str(info, "customId");
		transaction.created_at = info
			.get("creationDate")
			.and_then(XmlRpcValue::as_datetime)
			.map(|created| created.and_utc());
		transaction.expire_at = transaction
			.created_at
			.map(|created| created + Duration::days(i64::from(EXPIRATION_DAYS)));

		let signer_infos = info
			.get("signerInfos")
			.and_then(XmlRpcValue::as_array)
			.unwrap_or_default();
		for (index, signer_info) in signer_infos.iter().enumerate() {
			let signer = Signer::new(
				index as i64 + 1,
				member_str(signer_info, "firstName").unwrap_or_default(),
				member_str(signer_info, "lastName").unwrap_or_default(),
				member_str(signer_info, "email").unwrap_or_default(),
			);
			let status = SIGNER_STATUSES
				.resolve_opt(signer_info.get("status").and_then(XmlRpcValue::as_str));
			let mut result =
				SignerResult::new(signer, status).with_url(member_str(signer_info, "url"));
			result.action_at = signer_info
				.get("actionDate")
				.and_then(XmlRpcValue::as_datetime)
				.map(|date| date.and_utc());
			transaction.signers.push(result);
		}

		transaction
	}
}

#[async_trait]
impl DriverInterface for UniversignDriver {
	fn name(&self) -> &'static str {
		Registry::NAME
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(UniversignSchema)
	}

	async fn create_transaction(&self, scenario: &Scenario) -> Result<Transaction, DriverError> {
		scenario.validate()?;
		let signers = scenario
			.signers
			.iter()
			.map(|signer| self.signer_request(scenario, signer))
			.collect::<Result<Vec<_>, _>>()?;
		let documents = self.document_requests(scenario).await?;

		let mode = scenario.invitation_mode;
		let request = XmlRpcValue::new_struct()
			.with("documents", documents)
			.with("signers", signers)
			.with("description", &scenario.title)
			.with("handwrittenSignatureMode", self.config.handwritten_signature_mode)
			.with("profile", &self.config.profile)
			.with("certificateType", &self.config.certificate_type)
			.with("language", scenario.lang.code())
			.with("finalDocSent", false)
			.with("finalDocRequesterSent", true)
			.with(
				"mustContactFirstSigner",
				mode == sign_types::InvitationMode::Email,
			)
			.with("chainingMode", if mode.sends_email() { "email" } else { "none" })
			.with_opt("customId", scenario.custom_id.as_ref());

		let response = self
			.requester
			.call("requester.requestTransaction", &[request])
			.await?;
		let transaction_id = member_str(&response, "id").ok_or_else(|| {
			TransportError::InvalidResponse("missing 'id' in requestTransaction response".to_string())
		})?;
		info!(transaction_id = %truncate_id(&transaction_id), "Created Universign transaction");

		self.get_transaction(&transaction_id).await
	}

	async fn get_transaction(&self, transaction_id: &str) -> Result<Transaction, DriverError> {
		let info = self.fetch_transaction_info(transaction_id).await?;
		Ok(self.transaction_from_info(transaction_id, &info))
	}

	async fn get_documents(&self, transaction_id: &str) -> Result<Vec<DocumentResult>, DriverError> {
		ensure_completed(&self.get_transaction(transaction_id).await?)?;

		let documents = self
			.requester
			.call("requester.getDocuments", &[transaction_id.into()])
			.await?;
		let documents = documents.as_array().unwrap_or_default();

		Ok(documents
			.iter()
			.enumerate()
			.map(|(index, document)| {
				let name = member_str(document, "name").unwrap_or_else(|| format!("document-{}", index + 1));
				let content = document
					.get("content")
					.and_then(XmlRpcValue::as_bytes)
					.map(<[u8]>::to_vec)
					.unwrap_or_default();
				let mut result = DocumentResult::new(index as i64 + 1, name, content);
				if let Some(metadata) = document.get("metaData") {
					result.document.metadata = metadata_from_xmlrpc(metadata);
				}
				result
			})
			.collect())
	}

	async fn cancel_transaction(&self, transaction_id: &str) -> Result<Transaction, DriverError> {
		self.requester
			.call("requester.cancelTransaction", &[transaction_id.into()])
			.await?;
		info!(transaction_id = %truncate_id(transaction_id), "Canceled Universign transaction");
		self.get_transaction(transaction_id).await
	}

	fn expiration_days(&self) -> u32 {
		EXPIRATION_DAYS
	}

	/// Maps a `{id, status}` callback where `status` is a code from 0 to 4,
	/// sent either as a number or as a numeric string.
	fn format_webhook(&self, payload: &Value) -> Result<Webhook, DriverError> {
		let transaction_id = id_field(payload, "id").ok_or_else(|| {
			ValidationError::InvalidWebhook("Universign webhook parameter \"id\" must be set".to_string())
		})?;
		let code = match payload.get("status") {
			Some(Value::Number(n)) => n.as_i64(),
			Some(Value::String(s)) => s.trim().parse().ok(),
			_ => None,
		}
		.ok_or_else(|| {
			ValidationError::InvalidWebhook(
				"Universign webhook parameter \"status\" must be an integer".to_string(),
			)
		})?;

		let status = usize::try_from(code)
			.ok()
			.and_then(|code| WEBHOOK_STATUSES.get(code))
			.ok_or_else(|| {
				ValidationError::InvalidWebhook(format!("Unknown Universign webhook status: {}", code))
			})?;
		Ok(Webhook::new(transaction_id, *status))
	}
}

fn member_str(value: &XmlRpcValue, key: &str) -> Option<String> {
	value
		.get(key)
		.and_then(XmlRpcValue::as_str)
		.filter(|s| !s.is_empty())
		.map(str::to_string)
}

fn metadata_to_xmlrpc(metadata: &Metadata) -> XmlRpcValue {
	metadata
		.iter()
		.fold(XmlRpcValue::new_struct(), |acc, (key, value)| match value {
			MetadataValue::Bool(b) => acc.with(key, *b),
			MetadataValue::Integer(i) => acc.with(key, *i),
			MetadataValue::Float(f) => acc.with(key, *f),
			MetadataValue::String(s) => acc.with(key, s),
		})
}

fn metadata_from_xmlrpc(value: &XmlRpcValue) -> Metadata {
	let Some(members) = value.as_struct() else {
		return Metadata::new();
	};
	members
		.iter()
		.filter_map(|(key, value)| {
			let value = match value {
				XmlRpcValue::Boolean(b) => MetadataValue::Bool(*b),
				XmlRpcValue::Int(i) => MetadataValue::Integer(*i),
				XmlRpcValue::Double(f) => MetadataValue::Float(*f),
				XmlRpcValue::String(s) => MetadataValue::String(s.clone()),
				_ => return None,
			};
			Some((key.clone(), value))
		})
		.collect()
}

/// Factory function to create a Universign driver from configuration.
pub fn create_driver(
	config: &toml::Value,
) -> BoxFuture<'static, Result<Box<dyn DriverInterface>, DriverError>> {
	let config = config.clone();
	async move {
		let config: UniversignConfig = parse_config(&UniversignSchema, &config)?;
		Ok(Box::new(UniversignDriver::new(config)?) as Box<dyn DriverInterface>)
	}
	.boxed()
}

/// Registry for the Universign driver.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "universign";
	type Factory = DriverFactory;

	fn factory() -> Self::Factory {
		create_driver
	}
}

impl crate::DriverRegistry for Registry {}
