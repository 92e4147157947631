//! Signer types.

use crate::status::CanonicalStatus;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A person asked to sign one or more documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signer {
	/// Caller-assigned identifier, unique within a scenario.
	pub id: i64,
	pub firstname: String,
	pub lastname: String,
	pub email: String,
	/// International phone number, required by providers that send OTP codes.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub phone: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub birthday: Option<NaiveDate>,
}

impl Signer {
	pub fn new(
		id: i64,
		firstname: impl Into<String>,
		lastname: impl Into<String>,
		email: impl Into<String>,
	) -> Self {
		Self {
			id,
			firstname: firstname.into(),
			lastname: lastname.into(),
			email: email.into(),
			phone: None,
			birthday: None,
		}
	}

	pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
		self.phone = Some(phone.into());
		self
	}

	pub fn with_birthday(mut self, birthday: NaiveDate) -> Self {
		self.birthday = Some(birthday);
		self
	}

	/// First and last name separated by a space, ignoring empty parts.
	pub fn full_name(&self) -> String {
		[self.firstname.trim(), self.lastname.trim()]
			.iter()
			.filter(|part| !part.is_empty())
			.copied()
			.collect::<Vec<_>>()
			.join(" ")
	}
}

/// Canonical lifecycle of a signer within a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignerStatus {
	/// Waiting for previous signers.
	Waiting,
	/// Invited and able to sign.
	Ready,
	/// Opened the signing page.
	Accessed,
	/// A one-time code was sent.
	CodeSent,
	Signed,
	Canceled,
	Failed,
	Unknown,
}

impl CanonicalStatus for SignerStatus {
	const UNKNOWN: Self = SignerStatus::Unknown;

	fn as_str(&self) -> &'static str {
		match self {
			SignerStatus::Waiting => "waiting",
			SignerStatus::Ready => "ready",
			SignerStatus::Accessed => "accessed",
			SignerStatus::CodeSent => "code-sent",
			SignerStatus::Signed => "signed",
			SignerStatus::Canceled => "canceled",
			SignerStatus::Failed => "failed",
			SignerStatus::Unknown => "unknown",
		}
	}

	fn label(&self) -> &'static str {
		match self {
			SignerStatus::Waiting => "Waiting",
			SignerStatus::Ready => "Ready",
			SignerStatus::Accessed => "Accessed",
			SignerStatus::CodeSent => "Code Sent",
			SignerStatus::Signed => "Signed",
			SignerStatus::Canceled => "Canceled",
			SignerStatus::Failed => "Failed",
			SignerStatus::Unknown => "Unknown",
		}
	}

	fn is_terminal(&self) -> bool {
		matches!(
			self,
			SignerStatus::Signed | SignerStatus::Canceled | SignerStatus::Failed
		)
	}
}

impl fmt::Display for SignerStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Provider view of one signer, wrapping the signer identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignerResult {
	pub signer: Signer,
	pub status: SignerStatus,
	/// Signing link, short-lived on most providers.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub url: Option<String>,
	/// When the signer last acted (signed, refused).
	#[serde(skip_serializing_if = "Option::is_none")]
	pub action_at: Option<DateTime<Utc>>,
	/// Provider error message attached to this signer.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

impl SignerResult {
	pub fn new(signer: Signer, status: SignerStatus) -> Self {
		Self {
			signer,
			status,
			url: None,
			action_at: None,
			error: None,
		}
	}

	pub fn with_url(mut self, url: Option<String>) -> Self {
		self.url = url;
		self
	}

	pub fn id(&self) -> i64 {
		self.signer.id
	}

	pub fn status_label(&self) -> &'static str {
		self.status.label()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_full_name() {
		let signer = Signer::new(1, "Jane", "Doe", "jane@example.com");
		assert_eq!(signer.full_name(), "Jane Doe");

		let no_first = Signer::new(2, "", "Doe", "doe@example.com");
		assert_eq!(no_first.full_name(), "Doe");
	}

	#[test]
	fn test_signer_status_serialization() {
		assert_eq!(
			serde_json::to_string(&SignerStatus::CodeSent).unwrap(),
			"\"code-sent\""
		);
		let status: SignerStatus = serde_json::from_str("\"accessed\"").unwrap();
		assert_eq!(status, SignerStatus::Accessed);
		assert_eq!(SignerStatus::CodeSent.to_string(), "code-sent");
	}

	#[test]
	fn test_signer_status_labels_and_terminal() {
		assert_eq!(SignerStatus::CodeSent.label(), "Code Sent");
		assert_eq!(SignerStatus::Waiting.label(), "Waiting");
		assert!(SignerStatus::Signed.is_terminal());
		assert!(SignerStatus::Failed.is_terminal());
		assert!(!SignerStatus::Ready.is_terminal());
		assert!(!SignerStatus::Unknown.is_terminal());
	}

	#[test]
	fn test_signer_result_composes_signer() {
		let signer = Signer::new(7, "John", "Smith", "john@example.com").with_phone("+33600000000");
		let result = SignerResult::new(signer.clone(), SignerStatus::Ready)
			.with_url(Some("https://sign.example.com/7".to_string()));
		assert_eq!(result.id(), 7);
		assert_eq!(result.signer, signer);
		assert_eq!(result.status_label(), "Ready");
		assert_eq!(result.url.as_deref(), Some("https://sign.example.com/7"));
	}
}
