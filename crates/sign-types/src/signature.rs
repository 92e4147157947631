//! Signature placement on a document page.

use serde::{Deserialize, Serialize};

/// Where one signer signs one document.
///
/// Coordinates are in provider units (PDF points on every supported
/// provider), with the page counted from 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signature {
	pub signer_id: i64,
	pub document_id: i64,
	pub page: u32,
	pub x: i32,
	pub y: i32,
	pub width: i32,
	pub height: i32,
	/// Text shown next to the signature field where supported.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub label: Option<String>,
}

impl Signature {
	/// Creates a signature on page 1 with an empty location.
	pub fn new(signer_id: i64, document_id: i64) -> Self {
		Self {
			signer_id,
			document_id,
			page: 1,
			x: 0,
			y: 0,
			width: 0,
			height: 0,
			label: None,
		}
	}

	pub fn on_page(mut self, page: u32) -> Self {
		self.page = page;
		self
	}

	/// Sets `[x, y, width, height]`.
	pub fn with_location(mut self, [x, y, width, height]: [i32; 4]) -> Self {
		self.x = x;
		self.y = y;
		self.width = width;
		self.height = height;
		self
	}

	pub fn with_label(mut self, label: impl Into<String>) -> Self {
		self.label = Some(label.into());
		self
	}

	/// Returns the lower-left and upper-right corners `[x1, y1, x2, y2]`.
	///
	/// The upper-right corner saturates at `i32::MAX`.
	pub fn corners(&self) -> [i32; 4] {
		[
			self.x,
			self.y,
			self.x.saturating_add(self.width),
			self.y.saturating_add(self.height),
		]
	}

	/// Whether the upper-right corner is representable.
	pub fn fits_page_space(&self) -> bool {
		self.x.checked_add(self.width).is_some() && self.y.checked_add(self.height).is_some()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_location_round_trip() {
		let signature = Signature::new(1, 2)
			.on_page(3)
			.with_location([100, 100, 200, 80])
			.with_label("Read and approved");

		assert_eq!(
			(signature.x, signature.y, signature.width, signature.height),
			(100, 100, 200, 80)
		);
		assert_eq!(signature.corners(), [100, 100, 300, 180]);
		assert_eq!(signature.page, 3);
		assert_eq!(signature.label.as_deref(), Some("Read and approved"));
	}

	#[test]
	fn test_corners_saturate() {
		let signature = Signature::new(1, 1).with_location([i32::MAX - 10, 0, 200, 80]);
		assert!(!signature.fits_page_space());
		assert_eq!(signature.corners(), [i32::MAX - 10, 0, i32::MAX, 80]);
	}
}
