//! Provider status lookup tables.
//!
//! Every provider reports its own status vocabulary. Drivers translate those
//! strings with a `StatusTable`, a static list of `(provider value, canonical
//! value)` pairs. Any value missing from a table resolves to the canonical
//! `unknown` status.

use std::fmt::Debug;

/// A canonical status enumeration that provider statuses are mapped onto.
pub trait CanonicalStatus: Copy + PartialEq + Debug + 'static {
	/// Value used when a provider status is not recognized.
	const UNKNOWN: Self;

	/// Lowercase wire name, such as `code-sent`.
	fn as_str(&self) -> &'static str;

	/// Human readable label.
	fn label(&self) -> &'static str;

	/// Whether the status can no longer change.
	fn is_terminal(&self) -> bool;
}

/// Static mapping from provider status strings to a canonical status.
#[derive(Debug)]
pub struct StatusTable<S: 'static> {
	entries: &'static [(&'static str, S)],
}

impl<S: CanonicalStatus> StatusTable<S> {
	pub const fn new(entries: &'static [(&'static str, S)]) -> Self {
		Self { entries }
	}

	/// Maps a provider status onto the canonical enumeration.
	///
	/// Matching is exact on the provider's spelling; anything else,
	/// including an empty string, yields `S::UNKNOWN`.
	pub fn resolve(&self, native: &str) -> S {
		self.entries
			.iter()
			.find(|(key, _)| *key == native)
			.map(|(_, status)| *status)
			.unwrap_or(S::UNKNOWN)
	}

	/// Like `resolve`, for optional provider fields.
	pub fn resolve_opt(&self, native: Option<&str>) -> S {
		native.map(|n| self.resolve(n)).unwrap_or(S::UNKNOWN)
	}

	pub fn contains(&self, native: &str) -> bool {
		self.entries.iter().any(|(key, _)| *key == native)
	}

	pub fn entries(&self) -> &'static [(&'static str, S)] {
		self.entries
	}

	/// Returns the provider keys listed more than once. Used by tests to
	/// guarantee every provider value maps to exactly one canonical value.
	pub fn duplicate_keys(&self) -> Vec<&'static str> {
		let mut duplicates = Vec::new();
		for (i, (key, _)) in self.entries.iter().enumerate() {
			if self.entries[..i].iter().any(|(other, _)| other == key) && !duplicates.contains(key)
			{
				duplicates.push(*key);
			}
		}
		duplicates
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::TransactionStatus;

	const TABLE: StatusTable<TransactionStatus> = StatusTable::new(&[
		("active", TransactionStatus::Ready),
		("finished", TransactionStatus::Completed),
	]);

	#[test]
	fn test_resolve_known_and_unknown() {
		assert_eq!(TABLE.resolve("active"), TransactionStatus::Ready);
		assert_eq!(TABLE.resolve("finished"), TransactionStatus::Completed);
		assert_eq!(TABLE.resolve("Finished"), TransactionStatus::Unknown);
		assert_eq!(TABLE.resolve(""), TransactionStatus::Unknown);
		assert_eq!(TABLE.resolve_opt(None), TransactionStatus::Unknown);
		assert!(TABLE.contains("active"));
	}

	#[test]
	fn test_duplicate_keys() {
		assert!(TABLE.duplicate_keys().is_empty());

		const DUPLICATED: StatusTable<TransactionStatus> = StatusTable::new(&[
			("sent", TransactionStatus::Ready),
			("sent", TransactionStatus::Draft),
			("sent", TransactionStatus::Draft),
		]);
		assert_eq!(DUPLICATED.duplicate_keys(), vec!["sent"]);
	}
}
