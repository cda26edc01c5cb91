use std::cmp::Ordering;

/// Token customization points of a model.
///
/// - `normalize_key` folds a token before it enters the sliding window, so
///   several spellings can share a state without changing the stored token.
/// - `copy_token` produces the value stored in the transition list.
/// - `compare_tokens` is the total order of a state's transition list.
///   `None` is the end-of-sequence token.
///
/// Every method has an identity default.
pub trait TokenHooks {
	fn normalize_key(&self, token: &str) -> String {
		token.to_owned()
	}

	fn copy_token(&self, token: &str) -> String {
		token.to_owned()
	}

	fn compare_tokens(&self, a: &Option<String>, b: &Option<String>) -> Ordering {
		a.cmp(b)
	}
}

/// Identity hooks. The end token sorts first, then tokens ascend by string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DefaultHooks;

impl TokenHooks for DefaultHooks {}

/// Lowercases tokens for state lookup while keeping their original spelling
/// in the transition lists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaseInsensitive;

impl TokenHooks for CaseInsensitive {
	fn normalize_key(&self, token: &str) -> String {
		token.to_lowercase()
	}
}
