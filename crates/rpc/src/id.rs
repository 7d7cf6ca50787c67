//! Request id allocation.

use crate::RequestId;

/// Simple counter-based id generator.
///
/// Ids only need to be unique among one side's outstanding requests, so wrapping is not a
/// concern in practice.
#[derive(Debug, Default, Clone, Copy)]
pub struct CounterIdGen(pub i64);

impl CounterIdGen {
	/// Creates a new counter starting at 0.
	#[must_use]
	pub const fn new() -> Self {
		Self(0)
	}

	/// Generates the next id and increments the counter.
	#[allow(clippy::should_implement_trait, reason = "convention")]
	pub fn next(&mut self) -> RequestId {
		let id = self.0;
		self.0 = self.0.wrapping_add(1);
		RequestId::Number(id)
	}
}
