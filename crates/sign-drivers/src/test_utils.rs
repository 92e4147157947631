//! Fixtures shared by the driver tests.

use sign_types::{
	CanonicalStatus, Document, InvitationMode, Language, Metadata, Scenario, Signature, Signer,
	StatusTable,
};
use tempfile::TempDir;

pub(crate) const PDF_CONTENT: &[u8] = b"%PDF-1.4\n%test document\n";

/// Two documents, two signers and one signature per signer per document.
///
/// The returned directory holds the document files and must outlive the
/// scenario.
pub(crate) fn two_by_two_scenario() -> (TempDir, Scenario) {
	let dir = TempDir::new().unwrap();

	let mut scenario = Scenario::new("Contract signature");
	scenario.lang = Language::Fr;
	scenario.invitation_mode = InvitationMode::Chain;
	scenario.custom_id = Some("contract-42".to_string());
	scenario.success_url = Some("https://app.example.com/signed".to_string());
	scenario.cancel_url = Some("https://app.example.com/canceled".to_string());
	scenario.error_url = Some("https://app.example.com/failed".to_string());

	for id in 1..=2 {
		let path = dir.path().join(format!("document{}.pdf", id));
		std::fs::write(&path, PDF_CONTENT).unwrap();

		let mut metadata = Metadata::new();
		metadata.insert(format!("localId{}", id), (100 * id).into());
		scenario
			.documents
			.push(Document::new(id, format!("Document {}", id), path).with_metadata(metadata));
	}

	scenario.signers = vec![
		Signer::new(1, "Jane", "Doe", "jane.doe@example.com").with_phone("+33611111111"),
		Signer::new(2, "John", "Smith", "john.smith@example.com").with_phone("+33622222222"),
	];

	for signer_id in 1..=2 {
		for document_id in 1..=2 {
			scenario.signatures.push(
				Signature::new(signer_id, document_id)
					.on_page(1)
					.with_location([100, 100, 200, 80]),
			);
		}
	}

	(dir, scenario)
}

/// A scenario whose last signature points at a signer that does not exist.
pub(crate) fn dangling_scenario() -> (TempDir, Scenario) {
	let (dir, mut scenario) = two_by_two_scenario();
	scenario.signatures.push(Signature::new(99, 1));
	(dir, scenario)
}

/// Checks that every provider value of `table` resolves to the status it is
/// listed with, and that values outside the table resolve to `S::UNKNOWN`.
pub(crate) fn assert_table_resolves<S: CanonicalStatus>(table: &StatusTable<S>) {
	assert!(
		table.duplicate_keys().is_empty(),
		"duplicate keys: {:?}",
		table.duplicate_keys()
	);
	for (native, status) in table.entries() {
		assert_eq!(table.resolve(native), *status, "provider value '{}'", native);
		assert_eq!(table.resolve_opt(Some(native)), *status);
	}
	for native in ["", "not-a-provider-status", "READY"] {
		if !table.contains(native) {
			assert_eq!(table.resolve(native), S::UNKNOWN, "provider value '{}'", native);
		}
	}
	assert_eq!(table.resolve_opt(None), S::UNKNOWN);
}
