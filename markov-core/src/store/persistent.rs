use std::collections::BTreeMap;

use tokio::sync::OnceCell;

use super::{KvStore, WriteBatch};
use crate::error::{MarkovError, Result};
use crate::model::hooks::{DefaultHooks, TokenHooks};
use crate::model::markov::{self, Markov, Snapshot};
use crate::model::state::State;
use crate::model::transitions::TransitionTable;
use crate::model::weighted::{self, Weighted};
use crate::random::RandomSource;

/// Key holding the persisted window size, below the model prefix.
pub const WINDOW_SIZE_KEY: &str = "windowSize";

/// Prefix of the per-state transition lists, below the model prefix.
pub const TRANSITIONS_PREFIX: &str = "transitions/";

/// Window size written when neither the store nor the caller has one.
pub const DEFAULT_WINDOW_SIZE: usize = 1;

/// Options of a [`PersistentMarkov`].
///
/// - `window_size`: requested window size. `None` accepts whatever the store
///   holds, or [`DEFAULT_WINDOW_SIZE`] for an empty store.
/// - `prefix`: namespace prepended to every key, so several models can
///   share one store. Prefixes must be disjoint; nothing checks it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreOptions {
	window_size: Option<usize>,
	prefix: String,
}

impl StoreOptions {
	pub fn new() -> Self {
		Self::default()
	}

	/// # Errors
	/// Returns an error if `window_size` is 0.
	pub fn with_window_size(mut self, window_size: usize) -> Result<Self> {
		if window_size == 0 {
			return Err(MarkovError::InvalidWindowSize(window_size));
		}
		self.window_size = Some(window_size);
		Ok(self)
	}

	pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.prefix = prefix.into();
		self
	}

	pub fn window_size(&self) -> Option<usize> {
		self.window_size
	}

	pub fn prefix(&self) -> &str {
		&self.prefix
	}
}

/// Markov model backed by a [`KvStore`].
///
/// Layout, below `options.prefix`:
/// - `windowSize` → JSON integer
/// - `transitions/<state key>` → JSON weighted list, sorted by token
///
/// # Readiness
/// Nothing touches the transitions before a one-time initialization run:
/// 1. read the window size, writing the requested one (or the default) when
///    absent. A persisted size that differs from a requested one fails with
///    `WindowSizeMismatch`.
/// 2. create the empty start state entry when absent.
///
/// The first public call (or [`init`](Self::init)) starts the run. Concurrent
/// callers wait on the same run, and its outcome is latched: a failed run is
/// reported to every later caller and never retried.
///
/// # Ordering
/// Writes to one state are read-modify-write sequences with no locking.
/// Callers must serialize concurrent writes to the same model themselves.
pub struct PersistentMarkov<S, H = DefaultHooks> {
	store: S,
	options: StoreOptions,
	hooks: H,
	ready: OnceCell<Result<usize>>,
}

impl<S: KvStore> PersistentMarkov<S, DefaultHooks> {
	pub fn new(store: S, options: StoreOptions) -> Self {
		Self::with_hooks(store, options, DefaultHooks)
	}
}

impl<S: KvStore, H: TokenHooks + Send + Sync> PersistentMarkov<S, H> {
	pub fn with_hooks(store: S, options: StoreOptions, hooks: H) -> Self {
		Self {
			store,
			options,
			hooks,
			ready: OnceCell::new(),
		}
	}

	pub fn store(&self) -> &S {
		&self.store
	}

	pub fn options(&self) -> &StoreOptions {
		&self.options
	}

	/// True once initialization has succeeded.
	pub fn is_ready(&self) -> bool {
		matches!(self.ready.get(), Some(Ok(_)))
	}

	/// Runs initialization if nobody has yet and returns the window size.
	///
	/// # Errors
	/// Returns the latched initialization error, if any.
	pub async fn init(&self) -> Result<usize> {
		self.ready.get_or_init(|| self.initialize()).await.clone()
	}

	/// Window size of the model, once ready.
	pub async fn window_size(&self) -> Result<usize> {
		self.init().await
	}

	async fn initialize(&self) -> Result<usize> {
		log::debug!("Initializing persistent markov (prefix {:?})", self.options.prefix);
		let result = self.bootstrap().await;
		match &result {
			Ok(size) => log::info!("Persistent markov ready with window size {size}"),
			Err(err) => log::warn!("Persistent markov initialization failed: {err}"),
		}
		result
	}

	async fn bootstrap(&self) -> Result<usize> {
		let key = self.window_size_key();
		let window_size = match self.store.get(&key).await? {
			Some(bytes) => {
				let persisted: usize = serde_json::from_slice(&bytes)?;
				if persisted == 0 {
					return Err(MarkovError::InvalidWindowSize(persisted));
				}
				if let Some(requested) = self.options.window_size {
					if requested != persisted {
						return Err(MarkovError::WindowSizeMismatch { persisted, requested });
					}
				}
				persisted
			}
			None => {
				let size = self.options.window_size.unwrap_or(DEFAULT_WINDOW_SIZE);
				self.store.put(&key, serde_json::to_vec(&size)?).await?;
				size
			}
		};

		let start = self.transitions_key(&State::start(window_size).key());
		if self.store.get(&start).await?.is_none() {
			self.store.put(&start, serde_json::to_vec(&Vec::<Weighted>::new())?).await?;
		}
		Ok(window_size)
	}

	fn window_size_key(&self) -> String {
		format!("{}{}", self.options.prefix, WINDOW_SIZE_KEY)
	}

	fn transitions_prefix(&self) -> String {
		format!("{}{}", self.options.prefix, TRANSITIONS_PREFIX)
	}

	fn transitions_key(&self, state_key: &str) -> String {
		format!("{}{}", self.transitions_prefix(), state_key)
	}

	async fn read_list(&self, state_key: &str) -> Result<Option<Vec<Weighted>>> {
		match self.store.get(&self.transitions_key(state_key)).await? {
			Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
			None => Ok(None),
		}
	}

	async fn write_list(&self, state_key: &str, list: &[Weighted]) -> Result<()> {
		self.store
			.put(&self.transitions_key(state_key), serde_json::to_vec(list)?)
			.await
	}

	async fn add_weighted_key(
		&self,
		state_key: &str,
		weight: u64,
		token: Option<String>,
	) -> Result<Vec<Weighted>> {
		let mut list = self.read_list(state_key).await?.unwrap_or_default();
		weighted::insert_weighted(&mut list, weight, token, &self.hooks);
		self.write_list(state_key, &list).await?;
		Ok(list)
	}

	async fn add_many_key(&self, state_key: &str, incoming: &[Weighted]) -> Result<Vec<Weighted>> {
		let mut list = self.read_list(state_key).await?.unwrap_or_default();
		weighted::merge_weighted(&mut list, incoming, &self.hooks);
		self.write_list(state_key, &list).await?;
		Ok(list)
	}

	/// Records one more observation of `state → token`.
	pub async fn add_transition(&self, state: &State, token: Option<String>) -> Result<Vec<Weighted>> {
		self.add_weighted(state, 1, token).await
	}

	/// Adds `weight` observations of `state → token` and returns the stored list.
	pub async fn add_weighted(&self, state: &State, weight: u64, token: Option<String>) -> Result<Vec<Weighted>> {
		self.init().await?;
		self.add_weighted_key(&state.key(), weight, token).await
	}

	/// Merges a batch of weighted transitions into `state`.
	pub async fn add_many(&self, state: &State, incoming: &[Weighted]) -> Result<Vec<Weighted>> {
		self.init().await?;
		self.add_many_key(&state.key(), incoming).await
	}

	/// Ingests one token sequence.
	///
	/// Each transition write completes before the window advances to the next
	/// token. An empty sequence records nothing.
	pub async fn add_tokens<T: AsRef<str> + Sync>(&self, tokens: &[T]) -> Result<()> {
		let window_size = self.init().await?;
		if tokens.is_empty() {
			return Ok(());
		}
		let mut state = State::start(window_size);
		for token in tokens {
			let token = token.as_ref();
			self.add_weighted_key(&state.key(), 1, Some(self.hooks.copy_token(token)))
				.await?;
			state.advance(Some(self.hooks.normalize_key(token)));
		}
		self.add_weighted_key(&state.key(), 1, None).await?;
		Ok(())
	}

	/// Merges another persistent model into this one, waiting for both to be
	/// ready first.
	///
	/// States are merged one at a time, so a failing store can leave the
	/// merge half applied.
	///
	/// # Errors
	/// Returns `StateSizeMismatch` if the window sizes differ.
	pub async fn merge<O, H2>(&self, other: &PersistentMarkov<O, H2>) -> Result<()>
	where
		O: KvStore,
		H2: TokenHooks + Send + Sync,
	{
		let window_size = self.init().await?;
		let other_size = other.init().await?;
		if window_size != other_size {
			return Err(MarkovError::StateSizeMismatch {
				expected: window_size,
				actual: other_size,
			});
		}
		let table = other.read_table().await?;
		self.merge_table(&table).await?;
		log::debug!("Merged {} persisted states", table.len());
		Ok(())
	}

	/// Merges an in-memory model into this one.
	pub async fn merge_markov<H2: TokenHooks + Sync>(&self, other: &Markov<H2>) -> Result<()> {
		let window_size = self.init().await?;
		if window_size != other.window_size() {
			return Err(MarkovError::StateSizeMismatch {
				expected: window_size,
				actual: other.window_size(),
			});
		}
		self.merge_table(other.transitions()).await
	}

	async fn merge_table(&self, table: &TransitionTable) -> Result<()> {
		for (state_key, incoming) in table.iter() {
			self.add_many_key(state_key, incoming).await?;
		}
		Ok(())
	}

	/// Samples the token following `state`.
	///
	/// `Ok(None)` for an unknown or empty state, `Ok(Some(None))` when the end
	/// edge was drawn.
	pub async fn choose<R: RandomSource + Send + ?Sized>(
		&self,
		state: &State,
		random: &mut R,
	) -> Result<Option<Option<String>>> {
		self.init().await?;
		let list = self.read_list(&state.key()).await?.unwrap_or_default();
		Ok(weighted::choose_weighted(&list, random).cloned())
	}

	/// Generates a chain of tokens. Same contract as [`Markov::chain`].
	pub async fn chain<R: RandomSource + Send + ?Sized>(
		&self,
		max_length: Option<usize>,
		start: Option<State>,
		random: &mut R,
	) -> Result<Vec<String>> {
		let window_size = self.init().await?;
		let mut state = match start {
			Some(state) => markov::checked_start(state, window_size)?,
			None => State::start(window_size),
		};
		let mut result = Vec::new();
		while max_length.is_none_or(|max| result.len() < max) {
			match self.choose(&state, random).await? {
				Some(Some(token)) => {
					state.advance(Some(self.hooks.normalize_key(&token)));
					result.push(token);
				}
				_ => break,
			}
		}
		Ok(result)
	}

	async fn read_table(&self) -> Result<TransitionTable> {
		let prefix = self.transitions_prefix();
		let mut lists = Vec::new();
		for (key, bytes) in self.store.scan_prefix(&prefix).await? {
			let state_key = key
				.strip_prefix(&prefix)
				.ok_or_else(|| MarkovError::Storage(format!("scan for {prefix:?} returned foreign key {key:?}")))?
				.to_owned();
			let list: Vec<Weighted> = serde_json::from_slice(&bytes)?;
			lists.push((state_key, list));
		}
		Ok(lists.into_iter().collect::<TransitionTable>().normalized(&self.hooks))
	}

	/// Reads the whole model as a snapshot.
	pub async fn get_data(&self) -> Result<Snapshot> {
		let window_size = self.init().await?;
		Ok(Snapshot {
			window_size,
			transition_table: self.read_table().await?,
		})
	}

	/// Replaces every transition with the ones of `snapshot` in a single batch.
	///
	/// # Errors
	/// Returns `StateSizeMismatch` if the snapshot window size differs from
	/// the persisted one.
	pub async fn set_data(&self, snapshot: Snapshot) -> Result<()> {
		let window_size = self.init().await?;
		if snapshot.window_size != window_size {
			return Err(MarkovError::StateSizeMismatch {
				expected: window_size,
				actual: snapshot.window_size,
			});
		}
		let mut table = snapshot.transition_table.normalized(&self.hooks);
		table.ensure_state(&State::start(window_size).key());

		let mut batch = self.clear_batch().await?;
		for (state_key, list) in table.iter() {
			batch.put(self.transitions_key(state_key), serde_json::to_vec(list)?);
		}
		log::debug!("Replacing persisted transitions with {} states", table.len());
		self.store.write(batch).await
	}

	/// Deletes every transition, leaving the empty start state.
	pub async fn clear_data(&self) -> Result<()> {
		let window_size = self.init().await?;
		let mut batch = self.clear_batch().await?;
		batch.put(
			self.transitions_key(&State::start(window_size).key()),
			serde_json::to_vec(&Vec::<Weighted>::new())?,
		);
		self.store.write(batch).await
	}

	async fn clear_batch(&self) -> Result<WriteBatch> {
		let mut batch = self.store.batch();
		for (key, _) in self.store.scan_prefix(&self.transitions_prefix()).await? {
			batch.del(key);
		}
		Ok(batch)
	}

	/// How many times each token was ingested. See [`TransitionTable::counts`].
	pub async fn counts(&self) -> Result<BTreeMap<String, u64>> {
		self.init().await?;
		Ok(self.read_table().await?.counts())
	}

	/// Copies the persisted model into memory.
	pub async fn to_markov(&self) -> Result<Markov> {
		Markov::load(self.get_data().await?)
	}
}
