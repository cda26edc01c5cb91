use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use super::hooks::DefaultHooks;
use super::markov::{Markov, Snapshot};
use crate::error::{MarkovError, Result};
use crate::random::RandomSource;

/// Input accepted by [`MarkovMap::build_from`]: either one snapshot or a map
/// from window size to snapshot.
///
/// Map keys are strings, as JSON object keys are.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(untagged)]
pub enum SnapshotSet {
	Single(Snapshot),
	Sized(BTreeMap<String, Snapshot>),
}

/// Models of several window sizes behind one phrase generator.
///
/// # Responsibilities
/// - Hold at most one model per window size
/// - Resolve a requested size to the closest model not exceeding it
/// - Generate phrases through the resolved model
///
/// # Invariants
/// - `models` is keyed by each model's own window size
/// - A cached best fit for `k` always has the largest window size <= `k`
#[derive(Debug, Default)]
pub struct MarkovMap {
	models: BTreeMap<usize, Markov>,
	best_fit: HashMap<usize, usize>,
}

impl MarkovMap {
	pub fn new() -> Self {
		Self::default()
	}

	/// Loads every snapshot of `data`.
	///
	/// Models are keyed by the window size stored in their snapshot. When a
	/// map key disagrees with it, the snapshot wins.
	pub fn build_from(data: SnapshotSet) -> Result<Self> {
		let mut map = Self::new();
		match data {
			SnapshotSet::Single(snapshot) => map.insert(Markov::load(snapshot)?),
			SnapshotSet::Sized(snapshots) => {
				for (key, snapshot) in snapshots {
					let markov = Markov::load(snapshot)?;
					if key.parse::<usize>().ok() != Some(markov.window_size()) {
						log::warn!("Snapshot keyed {key} has window size {}", markov.window_size());
					}
					map.insert(markov);
				}
			}
		}
		Ok(map)
	}

	/// Builds one model per entry of `window_sizes` from whitespace-tokenized lines.
	pub fn from_lines(lines: &[String], window_sizes: impl IntoIterator<Item = usize>) -> Result<Self> {
		let mut map = Self::new();
		for window_size in window_sizes {
			map.insert(Markov::from_lines(lines, window_size, DefaultHooks)?);
		}
		Ok(map)
	}

	/// Snapshot of every model, keyed by window size.
	pub fn save(&self) -> SnapshotSet {
		SnapshotSet::Sized(
			self.models
				.iter()
				.map(|(size, markov)| (size.to_string(), markov.save()))
				.collect(),
		)
	}

	/// Adds a model, replacing any model of the same window size.
	pub fn insert(&mut self, markov: Markov) {
		self.models.insert(markov.window_size(), markov);
		self.best_fit.clear();
	}

	pub fn get(&self, window_size: usize) -> Option<&Markov> {
		self.models.get(&window_size)
	}

	pub fn window_sizes(&self) -> Vec<usize> {
		self.models.keys().copied().collect()
	}

	pub fn len(&self) -> usize {
		self.models.len()
	}

	pub fn is_empty(&self) -> bool {
		self.models.is_empty()
	}

	/// Returns the model with the largest window size not exceeding `k`.
	///
	/// The resolution is memoized per `k`.
	///
	/// # Errors
	/// Returns `NoModelAvailable` when every model is larger than `k`.
	pub fn best_fit(&mut self, k: usize) -> Result<&Markov> {
		let size = match self.best_fit.get(&k).copied() {
			Some(size) => size,
			None => {
				let size = *self
					.models
					.range(..=k)
					.next_back()
					.ok_or(MarkovError::NoModelAvailable(k))?
					.0;
				log::debug!("Resolved {k}-phrases to window-{size} model");
				self.best_fit.insert(k, size);
				size
			}
		};
		self.models.get(&size).ok_or(MarkovError::NoModelAvailable(k))
	}

	/// Generates a phrase of at most `k` tokens and at least `min_length`
	/// characters with the best fitting model.
	pub fn generate_phrase<R: RandomSource + ?Sized>(
		&mut self,
		k: usize,
		min_length: usize,
		random: &mut R,
	) -> Result<String> {
		self.best_fit(k)?.generate_phrase(k, min_length, random)
	}

	/// Merges another registry into this one.
	///
	/// Models of a size present on both sides are merged. Missing sizes are cloned.
	pub fn merge(&mut self, other: &Self) -> Result<()> {
		for (size, markov) in &other.models {
			if let Some(existing) = self.models.get_mut(size) {
				existing.merge(markov)?;
			} else {
				self.models.insert(*size, markov.clone());
			}
		}
		self.best_fit.clear();
		Ok(())
	}
}
