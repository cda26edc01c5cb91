use std::collections::VecDeque;
use std::fmt;

/// Separator between window slots in a canonical state key.
pub const KEY_SEPARATOR: char = ',';

/// Sliding window over the last `n` tokens of a sequence.
///
/// A `State` is the lookup key of a Markov model: each slot holds either a
/// token or `None` for history that does not exist yet (the start of a
/// sequence). Its canonical form, returned by [`State::key`], joins the slots
/// with `,` and renders `None` as an empty field, so the start state of a
/// window-2 model is `","`.
///
/// ## Invariants
/// - The window length never changes after construction
/// - Two states are equal iff their keys are equal
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct State {
	window: VecDeque<Option<String>>,
}

impl State {
	/// The all-`None` start state of a window of `size` slots.
	pub fn start(size: usize) -> Self {
		Self {
			window: std::iter::repeat_n(None, size).collect(),
		}
	}

	/// Builds a state right-aligned in a window of `size` slots.
	///
	/// Missing history on the left is padded with `None`. When more than
	/// `size` tokens are given, only the first `size` are kept.
	///
	/// Examples for the tokens `["beep", "boop"]`:
	/// - size 1 → `"beep"`
	/// - size 2 → `"beep,boop"`
	/// - size 3 → `",beep,boop"`
	pub fn from_tokens<S: AsRef<str>>(size: usize, tokens: &[S]) -> Self {
		let taken = size.min(tokens.len());
		let mut state = Self::start(size);
		for (slot, token) in state.window.iter_mut().skip(size - taken).zip(tokens) {
			*slot = Some(token.as_ref().to_owned());
		}
		state
	}

	/// Number of slots in the window.
	pub fn len(&self) -> usize {
		self.window.len()
	}

	pub fn is_empty(&self) -> bool {
		self.window.is_empty()
	}

	/// Drops the oldest slot and appends `token`.
	pub fn advance(&mut self, token: Option<String>) {
		if self.window.is_empty() {
			return;
		}
		self.window.pop_front();
		self.window.push_back(token);
	}

	/// Slots from oldest to newest.
	pub fn tokens(&self) -> impl Iterator<Item = Option<&str>> {
		self.window.iter().map(|slot| slot.as_deref())
	}

	/// Canonical string form used as the transition table key.
	pub fn key(&self) -> String {
		let mut key = String::new();
		for (i, slot) in self.window.iter().enumerate() {
			if i > 0 {
				key.push(KEY_SEPARATOR);
			}
			if let Some(token) = slot {
				key.push_str(token);
			}
		}
		key
	}
}

impl fmt::Display for State {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.key())
	}
}
