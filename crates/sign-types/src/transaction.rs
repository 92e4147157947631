//! Canonical transaction types.
//!
//! A `Transaction` is the provider-agnostic view of a signature request once
//! it has been submitted. Drivers rebuild it from provider payloads on every
//! read; nothing is cached between calls.

use crate::signer::SignerResult;
use crate::status::CanonicalStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical lifecycle of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
	/// Created on the provider, not yet sent to signers.
	Draft,
	/// Sent and waiting for signatures.
	Ready,
	Completed,
	/// A signer declined.
	Refused,
	Canceled,
	Failed,
	Expired,
	Unknown,
}

impl CanonicalStatus for TransactionStatus {
	const UNKNOWN: Self = TransactionStatus::Unknown;

	fn as_str(&self) -> &'static str {
		match self {
			TransactionStatus::Draft => "draft",
			TransactionStatus::Ready => "ready",
			TransactionStatus::Completed => "completed",
			TransactionStatus::Refused => "refused",
			TransactionStatus::Canceled => "canceled",
			TransactionStatus::Failed => "failed",
			TransactionStatus::Expired => "expired",
			TransactionStatus::Unknown => "unknown",
		}
	}

	fn label(&self) -> &'static str {
		match self {
			TransactionStatus::Draft => "Draft",
			TransactionStatus::Ready => "Waiting",
			TransactionStatus::Completed => "Completed",
			TransactionStatus::Refused => "Refused",
			TransactionStatus::Canceled => "Canceled",
			TransactionStatus::Failed => "Failed",
			TransactionStatus::Expired => "Expired",
			TransactionStatus::Unknown => "Unknown",
		}
	}

	fn is_terminal(&self) -> bool {
		matches!(
			self,
			TransactionStatus::Completed
				| TransactionStatus::Refused
				| TransactionStatus::Canceled
				| TransactionStatus::Failed
				| TransactionStatus::Expired
		)
	}
}

impl fmt::Display for TransactionStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// A submitted signature request as seen by one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
	/// Name of the driver that produced this transaction.
	pub driver: String,
	/// Provider identifier, used for later reads.
	pub id: String,
	pub status: TransactionStatus,
	pub created_at: Option<DateTime<Utc>>,
	pub expire_at: Option<DateTime<Utc>>,
	/// Caller correlation id echoed from the scenario.
	pub custom_id: Option<String>,
	pub title: Option<String>,
	pub signers: Vec<SignerResult>,
}

impl Transaction {
	pub fn new(driver: impl Into<String>, id: impl Into<String>, status: TransactionStatus) -> Self {
		Self {
			driver: driver.into(),
			id: id.into(),
			status,
			created_at: None,
			expire_at: None,
			custom_id: None,
			title: None,
			signers: Vec::new(),
		}
	}

	pub fn status_label(&self) -> &'static str {
		self.status.label()
	}

	pub fn is_completed(&self) -> bool {
		self.status == TransactionStatus::Completed
	}

	pub fn signer(&self, id: i64) -> Option<&SignerResult> {
		self.signers.iter().find(|s| s.signer.id == id)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{Signer, SignerStatus};

	#[test]
	fn test_transaction_status_strings() {
		assert_eq!(TransactionStatus::Ready.as_str(), "ready");
		assert_eq!(TransactionStatus::Ready.label(), "Waiting");
		assert_eq!(
			serde_json::to_string(&TransactionStatus::Completed).unwrap(),
			"\"completed\""
		);
		assert_eq!(TransactionStatus::Refused.to_string(), "refused");
	}

	#[test]
	fn test_terminal_statuses() {
		assert!(!TransactionStatus::Draft.is_terminal());
		assert!(!TransactionStatus::Ready.is_terminal());
		assert!(!TransactionStatus::Unknown.is_terminal());
		for status in [
			TransactionStatus::Completed,
			TransactionStatus::Refused,
			TransactionStatus::Canceled,
			TransactionStatus::Failed,
			TransactionStatus::Expired,
		] {
			assert!(status.is_terminal(), "{} should be terminal", status);
		}
	}

	#[test]
	fn test_signer_lookup() {
		let mut transaction = Transaction::new("yousignv3", "sr_1", TransactionStatus::Ready);
		transaction.signers.push(SignerResult::new(
			Signer::new(2, "Jane", "Doe", "jane@example.com"),
			SignerStatus::Ready,
		));

		assert_eq!(transaction.status_label(), "Waiting");
		assert!(!transaction.is_completed());
		assert!(transaction.signer(2).is_some());
		assert!(transaction.signer(3).is_none());
	}
}
