//! Signature scenarios.
//!
//! A `Scenario` describes a signature request once, independently of the
//! provider that will run it: the documents, the signers, where each signer
//! signs, and how signers are invited. Drivers call `Scenario::validate`
//! before any network call so a broken reference never reaches a provider.

use crate::document::Document;
use crate::signature::Signature;
use crate::signer::Signer;
use crate::validation::ValidationError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Language of the provider signing interface and notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
	#[default]
	Fr,
	En,
	De,
	Es,
	It,
	Nl,
	Pt,
}

impl Language {
	pub const ALL: [Language; 7] = [
		Language::Fr,
		Language::En,
		Language::De,
		Language::Es,
		Language::It,
		Language::Nl,
		Language::Pt,
	];

	/// Two-letter ISO 639-1 code.
	pub fn code(&self) -> &'static str {
		match self {
			Language::Fr => "fr",
			Language::En => "en",
			Language::De => "de",
			Language::Es => "es",
			Language::It => "it",
			Language::Nl => "nl",
			Language::Pt => "pt",
		}
	}
}

impl fmt::Display for Language {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.code())
	}
}

impl FromStr for Language {
	type Err = ValidationError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let lower = s.trim().to_ascii_lowercase();
		Language::ALL
			.into_iter()
			.find(|lang| lang.code() == lower)
			.ok_or_else(|| ValidationError::InvalidValue {
				field: "lang".to_string(),
				message: format!("unsupported language '{}'", s),
			})
	}
}

/// How signers are notified of the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvitationMode {
	/// No provider emails; the caller distributes signing links.
	#[default]
	None,
	/// Every signer is invited by email at once.
	Email,
	/// Signers are invited one after the other, in scenario order.
	Chain,
}

impl InvitationMode {
	pub fn sends_email(&self) -> bool {
		!matches!(self, InvitationMode::None)
	}

	pub fn is_ordered(&self) -> bool {
		matches!(self, InvitationMode::Chain)
	}
}

/// A complete, provider-agnostic signature request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Scenario {
	pub title: String,
	pub signers: Vec<Signer>,
	pub documents: Vec<Document>,
	pub signatures: Vec<Signature>,
	#[serde(default)]
	pub lang: Language,
	#[serde(default)]
	pub invitation_mode: InvitationMode,
	/// Where signers land after signing.
	pub success_url: Option<String>,
	/// Where signers land after declining.
	pub cancel_url: Option<String>,
	/// Where signers land when the provider fails.
	pub error_url: Option<String>,
	/// Callback endpoint notified of status changes.
	pub status_url: Option<String>,
	/// Caller correlation id echoed back on the transaction.
	pub custom_id: Option<String>,
}

impl Scenario {
	pub fn new(title: impl Into<String>) -> Self {
		Self {
			title: title.into(),
			..Default::default()
		}
	}

	pub fn signer(&self, id: i64) -> Option<&Signer> {
		self.signers.iter().find(|s| s.id == id)
	}

	pub fn document(&self, id: i64) -> Option<&Document> {
		self.documents.iter().find(|d| d.id == id)
	}

	pub fn signatures_for_signer(&self, signer_id: i64) -> impl Iterator<Item = &Signature> {
		self.signatures
			.iter()
			.filter(move |s| s.signer_id == signer_id)
	}

	pub fn signatures_for_document(&self, document_id: i64) -> impl Iterator<Item = &Signature> {
		self.signatures
			.iter()
			.filter(move |s| s.document_id == document_id)
	}

	/// Checks the scenario is internally consistent.
	///
	/// Requires at least one signer and one document, unique signer and
	/// document ids, and signatures that reference existing entities with a
	/// page of 1 or more and non-negative dimensions.
	pub fn validate(&self) -> Result<(), ValidationError> {
		if self.signers.is_empty() {
			return Err(ValidationError::MissingField("signers".to_string()));
		}
		if self.documents.is_empty() {
			return Err(ValidationError::MissingField("documents".to_string()));
		}

		let mut signer_ids = HashSet::new();
		for signer in &self.signers {
			if !signer_ids.insert(signer.id) {
				return Err(ValidationError::DuplicateId {
					kind: "signer",
					id: signer.id,
				});
			}
		}
		let mut document_ids = HashSet::new();
		for document in &self.documents {
			if !document_ids.insert(document.id) {
				return Err(ValidationError::DuplicateId {
					kind: "document",
					id: document.id,
				});
			}
		}

		for signature in &self.signatures {
			if !signer_ids.contains(&signature.signer_id) {
				return Err(ValidationError::UnknownSigner(signature.signer_id));
			}
			if !document_ids.contains(&signature.document_id) {
				return Err(ValidationError::UnknownDocument(signature.document_id));
			}
			if signature.page < 1 {
				return Err(ValidationError::InvalidValue {
					field: "signatures.page".to_string(),
					message: "pages are numbered from 1".to_string(),
				});
			}
			if signature.width < 0 || signature.height < 0 {
				return Err(ValidationError::InvalidValue {
					field: "signatures.location".to_string(),
					message: format!(
						"negative size {}x{}",
						signature.width, signature.height
					),
				});
			}
			if !signature.fits_page_space() {
				return Err(ValidationError::InvalidValue {
					field: "signatures.location".to_string(),
					message: format!(
						"location [{}, {}, {}, {}] overflows page coordinates",
						signature.x, signature.y, signature.width, signature.height
					),
				});
			}
		}

		Ok(())
	}
}
