//! Canonical webhook notification.

use crate::transaction::TransactionStatus;
use serde::{Deserialize, Serialize};

/// A provider callback reduced to the transaction it concerns and the
/// canonical status it announces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Webhook {
	pub transaction_id: String,
	pub transaction_status: TransactionStatus,
}

impl Webhook {
	pub fn new(transaction_id: impl Into<String>, transaction_status: TransactionStatus) -> Self {
		Self {
			transaction_id: transaction_id.into(),
			transaction_status,
		}
	}
}
