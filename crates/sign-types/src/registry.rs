//! Registration trait for driver implementations.

/// Binds a driver implementation to its configuration name and factory.
///
/// Every driver module exposes a `Registry` unit struct implementing this
/// trait, so the provider enum can reach each factory by a compile-time path.
pub trait ImplementationRegistry {
	/// Name of the driver in configuration files, for example `yousignv3`
	/// in `[driver.implementations.yousignv3]`.
	const NAME: &'static str;

	/// Factory type shared by all implementations of the same interface.
	type Factory;

	fn factory() -> Self::Factory;
}
