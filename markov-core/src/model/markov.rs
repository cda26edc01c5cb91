use std::any::Any;
use std::collections::BTreeMap;
use std::sync::mpsc;
use std::thread;

use serde::{Deserialize, Serialize};

use super::hooks::{DefaultHooks, TokenHooks};
use super::options::PhraseOptions;
use super::state::State;
use super::transitions::TransitionTable;
use super::weighted::Weighted;
use crate::error::{MarkovError, Result};
use crate::random::RandomSource;

/// Plain structural form of a model, used by save/load and snapshot files.
///
/// ```json
/// { "windowSize": 1, "transitionTable": { "": [[1, "this"]], "this": [[1, null]] } }
/// ```
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
	pub window_size: usize,
	pub transition_table: TransitionTable,
}

/// Fixed-order Markov model over string tokens.
///
/// The model keeps, for every window of `window_size` consecutive tokens, the
/// weighted list of tokens observed right after it. `None` marks the end of a
/// sequence.
///
/// # Responsibilities
/// - Ingest token sequences and accumulate transition weights
/// - Sample chains and phrases with an injected random source
/// - Merge with another model of the same window size
/// - Save to and load from a `Snapshot`
///
/// # Invariants
/// - `window_size` is always >= 1
/// - The start state (all `None`) always has an entry, possibly empty
#[derive(Clone, Debug)]
pub struct Markov<H = DefaultHooks> {
	window_size: usize,
	transitions: TransitionTable,
	hooks: H,
	phrase_options: PhraseOptions,
}

impl Markov<DefaultHooks> {
	/// Creates an empty model with identity token hooks.
	///
	/// # Errors
	/// Returns an error if `window_size` is 0.
	pub fn new(window_size: usize) -> Result<Self> {
		Self::with_hooks(window_size, DefaultHooks)
	}

	/// Rebuilds a model from a snapshot.
	pub fn load(snapshot: Snapshot) -> Result<Self> {
		Self::load_with_hooks(snapshot, DefaultHooks)
	}
}

impl<H: TokenHooks> Markov<H> {
	pub fn with_hooks(window_size: usize, hooks: H) -> Result<Self> {
		if window_size == 0 {
			return Err(MarkovError::InvalidWindowSize(window_size));
		}
		let mut transitions = TransitionTable::new();
		transitions.ensure_state(&State::start(window_size).key());
		Ok(Self {
			window_size,
			transitions,
			hooks,
			phrase_options: PhraseOptions::default(),
		})
	}

	/// Rebuilds a model from a snapshot, re-sorting any list that breaks the
	/// token order of `hooks`.
	///
	/// # Errors
	/// Returns an error if the snapshot window size is 0.
	pub fn load_with_hooks(snapshot: Snapshot, hooks: H) -> Result<Self> {
		let mut model = Self::with_hooks(snapshot.window_size, hooks)?;
		let mut transitions = snapshot.transition_table.normalized(&model.hooks);
		transitions.ensure_state(&model.start_state().key());
		model.transitions = transitions;
		Ok(model)
	}

	pub fn window_size(&self) -> usize {
		self.window_size
	}

	pub fn transitions(&self) -> &TransitionTable {
		&self.transitions
	}

	/// How many times each token was ingested. See [`TransitionTable::counts`].
	pub fn counts(&self) -> BTreeMap<String, u64> {
		self.transitions.counts()
	}

	pub fn hooks(&self) -> &H {
		&self.hooks
	}

	pub fn phrase_options(&self) -> &PhraseOptions {
		&self.phrase_options
	}

	pub fn set_phrase_options(&mut self, options: PhraseOptions) {
		self.phrase_options = options;
	}

	/// The all-`None` window every ingested sequence starts from.
	pub fn start_state(&self) -> State {
		State::start(self.window_size)
	}

	/// Builds a state of this model's window size. See [`State::from_tokens`].
	pub fn create_state<S: AsRef<str>>(&self, tokens: &[S]) -> State {
		State::from_tokens(self.window_size, tokens)
	}

	/// Records one more observation of `state → token`.
	pub fn add_transition(&mut self, state: &State, token: Option<String>) -> &[Weighted] {
		self.add_weighted(state, 1, token)
	}

	/// Adds `weight` observations of `state → token`.
	pub fn add_weighted(&mut self, state: &State, weight: u64, token: Option<String>) -> &[Weighted] {
		self.transitions.add_weighted(&state.key(), weight, token, &self.hooks)
	}

	/// Merges a batch of weighted transitions into `state`.
	pub fn add_many(&mut self, state: &State, incoming: &[Weighted]) -> &[Weighted] {
		self.transitions.add_many(&state.key(), incoming, &self.hooks)
	}

	/// Ingests one token sequence.
	///
	/// Walks the sequence from the start state, recording each token as a
	/// transition from the current window, then records the end edge out of
	/// the final window. An empty sequence records nothing.
	pub fn add_tokens<S: AsRef<str>>(&mut self, tokens: &[S]) {
		if tokens.is_empty() {
			return;
		}
		let mut state = self.start_state();
		for token in tokens {
			let token = token.as_ref();
			let stored = self.hooks.copy_token(token);
			self.transitions.add_weighted(&state.key(), 1, Some(stored), &self.hooks);
			state.advance(Some(self.hooks.normalize_key(token)));
		}
		self.transitions.add_weighted(&state.key(), 1, None, &self.hooks);
	}

	/// Merges another model into this one, summing transition weights.
	///
	/// # Errors
	/// Returns `StateSizeMismatch` if the window sizes differ.
	pub fn merge<O>(&mut self, other: &Markov<O>) -> Result<()> {
		if self.window_size != other.window_size {
			return Err(MarkovError::StateSizeMismatch {
				expected: self.window_size,
				actual: other.window_size,
			});
		}
		self.transitions.merge(&other.transitions, &self.hooks);
		log::debug!(
			"Merged {} states into window-{} model ({} states)",
			other.transitions.len(),
			self.window_size,
			self.transitions.len()
		);
		Ok(())
	}

	/// Samples the token following `state`.
	///
	/// Returns `None` for an unknown or empty state and `Some(None)` when the
	/// end edge was drawn.
	pub fn choose<R: RandomSource + ?Sized>(&self, state: &State, random: &mut R) -> Option<Option<String>> {
		self.transitions.choose_weighted(&state.key(), random)
	}

	/// Generates a chain of tokens.
	///
	/// Starts from `start` (the start state by default) and keeps sampling
	/// until the end edge is drawn, the state is unknown, or `max_length`
	/// tokens were produced. The end token is never part of the output.
	///
	/// With `max_length = None` only the end edge stops the walk, so a model
	/// without reachable end edges never returns.
	///
	/// # Errors
	/// Returns `StateSizeMismatch` if `start` is not `window_size` slots long.
	pub fn chain<R: RandomSource + ?Sized>(
		&self,
		max_length: Option<usize>,
		start: Option<State>,
		random: &mut R,
	) -> Result<Vec<String>> {
		let mut state = match start {
			Some(state) => checked_start(state, self.window_size)?,
			None => self.start_state(),
		};
		let mut result = Vec::new();
		while max_length.is_none_or(|max| result.len() < max) {
			match self.choose(&state, random) {
				Some(Some(token)) => {
					state.advance(Some(self.hooks.normalize_key(&token)));
					result.push(token);
				}
				_ => break,
			}
		}
		Ok(result)
	}

	/// Generates a space-joined phrase of at most `phrase_len` tokens
	/// (0 for unbounded) and at least `min_length` characters.
	///
	/// Chains are regenerated from scratch until one is long enough.
	///
	/// # Errors
	/// Returns `PhraseUnreachable` once `PhraseOptions::max_attempts` chains
	/// were all too short.
	pub fn generate_phrase<R: RandomSource + ?Sized>(
		&self,
		phrase_len: usize,
		min_length: usize,
		random: &mut R,
	) -> Result<String> {
		let max_length = (phrase_len > 0).then_some(phrase_len);
		let attempts = self.phrase_options.max_attempts();
		for _ in 0..attempts {
			let phrase = self.chain(max_length, None, random)?.join(" ");
			if phrase.chars().count() >= min_length {
				return Ok(phrase);
			}
		}
		Err(MarkovError::PhraseUnreachable { min_length, attempts })
	}

	/// Returns a snapshot with no hidden state: `load(save())` behaves like `self`.
	pub fn save(&self) -> Snapshot {
		Snapshot {
			window_size: self.window_size,
			transition_table: self.transitions.clone(),
		}
	}
}

impl<H: TokenHooks + Clone + Send + 'static> Markov<H> {
	/// Builds a model from whitespace-tokenized lines.
	///
	/// # Behavior
	/// - Splits the lines into chunks (CPU cores * 8).
	/// - Builds a partial model per chunk on its own thread.
	/// - Merges all partial models into the result.
	///
	/// # Errors
	/// Returns an error if `window_size` is 0, or `Worker` if a build thread
	/// panicked (for instance inside a token hook).
	pub fn from_lines(lines: &[String], window_size: usize, hooks: H) -> Result<Self> {
		let mut model = Self::with_hooks(window_size, hooks)?;
		if lines.is_empty() {
			return Ok(model);
		}

		let chunks = num_cpus::get() * 8;
		let chunk_size = lines.len().div_ceil(chunks).max(1);
		log::debug!("Building window-{window_size} model from {} lines in chunks of {chunk_size}", lines.len());

		let (tx, rx) = mpsc::channel();
		let mut workers = Vec::new();
		for chunk in lines.chunks(chunk_size) {
			let tx = tx.clone();
			let chunk: Vec<String> = chunk.to_vec();
			let mut partial = model.clone();

			workers.push(thread::spawn(move || {
				for line in &chunk {
					let tokens: Vec<&str> = line.split_whitespace().collect();
					partial.add_tokens(&tokens);
				}
				// The receiver outlives every sender
				let _ = tx.send(partial);
			}));
		}
		drop(tx);

		for partial in rx.iter() {
			model.merge(&partial)?;
		}
		// A panicked worker drops its sender without sending
		for worker in workers {
			worker.join().map_err(|payload| MarkovError::Worker(panic_message(payload.as_ref())))?;
		}
		Ok(model)
	}
}

/// Accepts `state` as a chain start only if it has `window_size` slots.
pub(crate) fn checked_start(state: State, window_size: usize) -> Result<State> {
	if state.len() != window_size {
		return Err(MarkovError::StateSizeMismatch {
			expected: window_size,
			actual: state.len(),
		});
	}
	Ok(state)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
	if let Some(message) = payload.downcast_ref::<&str>() {
		(*message).to_owned()
	} else if let Some(message) = payload.downcast_ref::<String>() {
		message.clone()
	} else {
		"build thread panicked".to_owned()
	}
}
