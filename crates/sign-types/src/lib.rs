//! Common types module for the electronic signature system.
//!
//! This module defines the provider-agnostic data types shared by every
//! signature driver: the request side (documents, signers, signature
//! placements and the scenario that ties them together) and the canonical
//! result side (transactions, signer and document results, webhooks).

/// Documents to sign and their signed results.
pub mod document;
/// Implementation registry trait used by driver factories.
pub mod registry;
/// Complete signature requests.
pub mod scenario;
/// Secret values such as API keys and private keys.
pub mod secret_string;
/// Signature placements on documents.
pub mod signature;
/// Signers and their per-transaction results.
pub mod signer;
/// Provider status lookup tables.
pub mod status;
/// Canonical transactions.
pub mod transaction;
/// Date parsing helpers shared by drivers.
pub mod utils;
/// Configuration and input validation types.
pub mod validation;
/// Canonical webhook notifications.
pub mod webhook;

pub use document::{Document, DocumentResult, Metadata, MetadataValue};
pub use registry::ImplementationRegistry;
pub use scenario::{InvitationMode, Language, Scenario};
pub use secret_string::SecretString;
pub use signature::Signature;
pub use signer::{Signer, SignerResult, SignerStatus};
pub use status::{CanonicalStatus, StatusTable};
pub use transaction::{Transaction, TransactionStatus};
pub use utils::{parse_date, parse_datetime, truncate_id};
pub use validation::*;
pub use webhook::Webhook;
