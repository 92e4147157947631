//! JWT-bearer authentication against the DocuSign account server.
//!
//! The driver signs an assertion with the integration's RSA key, exchanges
//! it for an access token and resolves the account the impersonated user
//! works in. A missing consent surfaces as `DriverError::ConsentRequired`
//! with the URL the user must visit once.

use crate::common::str_field;
use crate::DriverError;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sign_transport::{Authorization, RestRequester, TransportError};
use sign_types::SecretString;

pub const DEMO_AUTH_URL: &str = "https://account-d.docusign.com";
pub const PRODUCTION_AUTH_URL: &str = "https://account.docusign.com";

const JWT_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const SCOPE: &str = "signature impersonation";
const TOKEN_LIFETIME_SECS: i64 = 3600;
const API_PATH: &str = "/restapi/v2.1/accounts";

/// Claims of the JWT grant assertion.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Claims {
	pub iss: String,
	pub sub: String,
	pub aud: String,
	pub iat: i64,
	pub exp: i64,
	pub scope: String,
}

/// Credentials needed to request a token.
pub(crate) struct JwtGrant<'a> {
	pub integrator_key: &'a str,
	pub user_id: &'a str,
	pub redirect_uri: &'a str,
	pub private_key: &'a SecretString,
}

/// Authenticated access to one DocuSign account.
#[derive(Debug, Clone)]
pub(crate) struct Session {
	pub access_token: SecretString,
	pub account_id: String,
	pub base_uri: String,
}

impl Session {
	/// Base URL of the eSignature REST API for the account.
	pub fn api_endpoint(&self) -> String {
		format!(
			"{}{}/{}",
			self.base_uri.trim_end_matches('/'),
			API_PATH,
			self.account_id
		)
	}
}

/// Host (and port, when explicit) of the account server.
pub(crate) fn audience(auth_url: &str) -> Result<String, DriverError> {
	let url = url::Url::parse(auth_url)
		.map_err(|e| DriverError::Auth(format!("Invalid auth endpoint '{}': {}", auth_url, e)))?;
	let host = url
		.host_str()
		.ok_or_else(|| DriverError::Auth(format!("Auth endpoint '{}' has no host", auth_url)))?;
	Ok(match url.port() {
		Some(port) => format!("{}:{}", host, port),
		None => host.to_string(),
	})
}

/// Page where a user grants the integration the right to impersonate them.
pub(crate) fn consent_url(auth_url: &str, grant: &JwtGrant<'_>) -> String {
	let encode = |value: &str| url::form_urlencoded::byte_serialize(value.as_bytes()).collect::<String>();
	format!(
		"{}/oauth/auth?response_type=code&scope=signature%20impersonation&client_id={}&redirect_uri={}",
		auth_url.trim_end_matches('/'),
		encode(grant.integrator_key),
		encode(grant.redirect_uri)
	)
}

/// Signs the grant assertion, valid for one hour from `issued_at`.
pub(crate) fn build_assertion(
	auth_url: &str,
	grant: &JwtGrant<'_>,
	issued_at: i64,
) -> Result<String, DriverError> {
	let claims = Claims {
		iss: grant.integrator_key.to_string(),
		sub: grant.user_id.to_string(),
		aud: audience(auth_url)?,
		iat: issued_at,
		exp: issued_at + TOKEN_LIFETIME_SECS,
		scope: SCOPE.to_string(),
	};
	let key = grant
		.private_key
		.with_exposed(|pem| EncodingKey::from_rsa_pem(pem.as_bytes()))
		.map_err(|e| DriverError::Auth(format!("Invalid private key: {}", e)))?;
	encode(&Header::new(Algorithm::RS256), &claims, &key)
		.map_err(|e| DriverError::Auth(format!("Could not sign JWT assertion: {}", e)))
}

/// Runs the JWT grant and resolves the default account of the user.
pub(crate) async fn authenticate(
	requester: &RestRequester,
	grant: &JwtGrant<'_>,
) -> Result<Session, DriverError> {
	let auth_url = requester.endpoint().to_string();
	let assertion = build_assertion(&auth_url, grant, Utc::now().timestamp())?;

	let token = requester
		.post_form(
			"/oauth/token",
			&[("grant_type", JWT_GRANT_TYPE), ("assertion", assertion.as_str())],
		)
		.await
		.map_err(|e| match e {
			TransportError::Api { message, .. } if message == "consent_required" => {
				DriverError::ConsentRequired {
					consent_url: consent_url(&auth_url, grant),
				}
			},
			other => DriverError::Auth(other.to_string()),
		})?;
	let access_token = str_field(&token, "access_token")
		.map(SecretString::from)
		.ok_or_else(|| DriverError::Auth("Token response has no access_token".to_string()))?;

	let user_info = requester
		.rebase(auth_url.clone(), Authorization::Bearer(access_token.clone()))
		.get("/oauth/userinfo")
		.await
		.map_err(|e| DriverError::Auth(e.to_string()))?;
	let account = default_account(&user_info)
		.ok_or_else(|| DriverError::Auth("Could not connect to DocuSign: no account".to_string()))?;

	Ok(Session {
		access_token,
		account_id: str_field(account, "account_id")
			.ok_or_else(|| DriverError::Auth("Account has no account_id".to_string()))?,
		base_uri: str_field(account, "base_uri")
			.ok_or_else(|| DriverError::Auth("Account has no base_uri".to_string()))?,
	})
}

/// The account flagged as default, else the first one.
fn default_account(user_info: &Value) -> Option<&Value> {
	let accounts = user_info.get("accounts")?.as_array()?;
	accounts
		.iter()
		.find(|account| match &account["is_default"] {
			Value::Bool(flag) => *flag,
			Value::String(flag) => flag == "true",
			_ => false,
		})
		.or_else(|| accounts.first())
}
