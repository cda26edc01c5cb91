use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::hooks::TokenHooks;
use super::weighted::{self, Weighted};
use crate::random::RandomSource;

/// Weighted transition store: state key → sorted list of `(weight, token)`.
///
/// States are kept in a `BTreeMap` so iteration, snapshots and merges are
/// deterministic.
///
/// ## Invariants
/// - Every list is strictly ordered by the hooks' token order
/// - A token appears at most once per list, with a positive weight
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct TransitionTable {
	states: BTreeMap<String, Vec<Weighted>>,
}

impl TransitionTable {
	pub fn new() -> Self {
		Self::default()
	}

	/// Creates an empty list for `state` if it has none yet.
	pub fn ensure_state(&mut self, state: &str) {
		if !self.states.contains_key(state) {
			self.states.insert(state.to_owned(), Vec::new());
		}
	}

	/// Records `weight` more observations of `state → token`.
	///
	/// Returns the updated list of `state`.
	pub fn add_weighted<H: TokenHooks + ?Sized>(
		&mut self,
		state: &str,
		weight: u64,
		token: Option<String>,
		hooks: &H,
	) -> &[Weighted] {
		let list = self.list_mut(state);
		weighted::insert_weighted(list, weight, token, hooks);
		list
	}

	/// Merges a batch of transitions into the list of `state`.
	pub fn add_many<H: TokenHooks + ?Sized>(
		&mut self,
		state: &str,
		incoming: &[Weighted],
		hooks: &H,
	) -> &[Weighted] {
		let list = self.list_mut(state);
		weighted::merge_weighted(list, incoming, hooks);
		list
	}

	/// Merges every state of `other` into this table.
	pub fn merge<H: TokenHooks + ?Sized>(&mut self, other: &TransitionTable, hooks: &H) {
		for (state, incoming) in &other.states {
			self.add_many(state, incoming, hooks);
		}
	}

	/// Samples the next token out of `state`.
	///
	/// Returns `None` when the state is unknown or has no transitions, and
	/// `Some(None)` when the end-of-sequence edge was drawn.
	pub fn choose_weighted<R: RandomSource + ?Sized>(
		&self,
		state: &str,
		random: &mut R,
	) -> Option<Option<String>> {
		let list = self.states.get(state)?;
		weighted::choose_weighted(list, random).cloned()
	}

	pub fn get(&self, state: &str) -> Option<&[Weighted]> {
		self.states.get(state).map(Vec::as_slice)
	}

	/// Weight of `state → token`, 0 when never observed.
	pub fn weight(&self, state: &str, token: Option<&str>) -> u64 {
		self.states
			.get(state)
			.and_then(|list| list.iter().find(|entry| entry.token() == token))
			.map_or(0, Weighted::weight)
	}

	/// Total observations of every token across all states.
	///
	/// Each ingested token produces exactly one edge into it, so this equals
	/// the number of times the token was seen. End edges are not counted.
	pub fn counts(&self) -> BTreeMap<String, u64> {
		let mut counts = BTreeMap::new();
		for Weighted(weight, token) in self.states.values().flatten() {
			if let Some(token) = token {
				let total: &mut u64 = counts.entry(token.clone()).or_default();
				*total = total.saturating_add(*weight);
			}
		}
		counts
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &[Weighted])> {
		self.states.iter().map(|(state, list)| (state.as_str(), list.as_slice()))
	}

	/// Number of known states.
	pub fn len(&self) -> usize {
		self.states.len()
	}

	pub fn is_empty(&self) -> bool {
		self.states.is_empty()
	}

	/// Re-establishes the ordering invariant on every list.
	pub(crate) fn normalized<H: TokenHooks + ?Sized>(self, hooks: &H) -> Self {
		let states = self
			.states
			.into_iter()
			.map(|(state, list)| (state, weighted::normalize(list, hooks)))
			.collect();
		Self { states }
	}

	fn list_mut(&mut self, state: &str) -> &mut Vec<Weighted> {
		self.states.entry(state.to_owned()).or_default()
	}
}

impl FromIterator<(String, Vec<Weighted>)> for TransitionTable {
	fn from_iter<I: IntoIterator<Item = (String, Vec<Weighted>)>>(iter: I) -> Self {
		Self { states: iter.into_iter().collect() }
	}
}
