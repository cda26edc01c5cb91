use crate::error::{MarkovError, Result};

/// Default bound on phrase regeneration attempts.
pub const DEFAULT_MAX_ATTEMPTS: usize = 1000;

/// Parameters of phrase generation.
///
/// # Invariants
/// - `max_attempts` is always >= 1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhraseOptions {
	max_attempts: usize,
}

impl Default for PhraseOptions {
	fn default() -> Self {
		Self {
			max_attempts: DEFAULT_MAX_ATTEMPTS,
		}
	}
}

impl PhraseOptions {
	/// Number of chains generated before giving up on `min_length`.
	pub fn max_attempts(&self) -> usize {
		self.max_attempts
	}

	/// Sets the number of attempts.
	///
	/// # Errors
	/// Returns an error if `max_attempts` is 0.
	pub fn set_max_attempts(&mut self, max_attempts: usize) -> Result<()> {
		if max_attempts == 0 {
			return Err(MarkovError::InvalidOption("max_attempts must be >= 1".to_owned()));
		}
		self.max_attempts = max_attempts;
		Ok(())
	}
}
