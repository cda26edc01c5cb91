use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use pretty_assertions::assert_eq;

use markov_core::model::weighted::Weighted;
use markov_core::random::Replay;
use markov_core::store::memory::MemoryStore;
use markov_core::store::persistent::{PersistentMarkov, StoreOptions};
use markov_core::store::{KvStore, WriteBatch};
use markov_core::{Markov, MarkovError, Result, State};

/// Counts reads of the window size key and yields on every read, so
/// concurrent callers interleave.
#[derive(Default)]
struct CountingStore {
	inner: MemoryStore,
	window_reads: AtomicUsize,
}

#[async_trait]
impl KvStore for CountingStore {
	async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
		if key.ends_with("windowSize") {
			self.window_reads.fetch_add(1, Ordering::SeqCst);
		}
		tokio::task::yield_now().await;
		self.inner.get(key).await
	}

	async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
		self.inner.put(key, value).await
	}

	async fn del(&self, key: &str) -> Result<()> {
		self.inner.del(key).await
	}

	async fn write(&self, batch: WriteBatch) -> Result<()> {
		self.inner.write(batch).await
	}

	async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
		self.inner.scan_prefix(prefix).await
	}
}

/// Fails every put while `failing` is set.
#[derive(Default)]
struct FlakyStore {
	inner: MemoryStore,
	failing: AtomicBool,
}

#[async_trait]
impl KvStore for FlakyStore {
	async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
		self.inner.get(key).await
	}

	async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
		if self.failing.load(Ordering::SeqCst) {
			return Err(MarkovError::Storage(format!("write refused for {key}")));
		}
		self.inner.put(key, value).await
	}

	async fn del(&self, key: &str) -> Result<()> {
		self.inner.del(key).await
	}

	async fn write(&self, batch: WriteBatch) -> Result<()> {
		self.inner.write(batch).await
	}

	async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
		self.inner.scan_prefix(prefix).await
	}
}

/// Scans also return a key outside the requested prefix.
#[derive(Default)]
struct LeakyScanStore {
	inner: MemoryStore,
}

#[async_trait]
impl KvStore for LeakyScanStore {
	async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
		self.inner.get(key).await
	}

	async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
		self.inner.put(key, value).await
	}

	async fn del(&self, key: &str) -> Result<()> {
		self.inner.del(key).await
	}

	async fn write(&self, batch: WriteBatch) -> Result<()> {
		self.inner.write(batch).await
	}

	async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
		let mut entries = self.inner.scan_prefix(prefix).await?;
		entries.push(("elsewhere".to_owned(), b"[]".to_vec()));
		Ok(entries)
	}
}

fn words(sentence: &str) -> Vec<&str> {
	sentence.split(' ').collect()
}

fn w(weight: u64, token: &str) -> Weighted {
	Weighted(weight, Some(token.to_owned()))
}

fn sized(window_size: usize) -> StoreOptions {
	StoreOptions::new().with_window_size(window_size).unwrap()
}

#[tokio::test]
async fn concurrent_callers_share_one_initialization() {
	let markov = PersistentMarkov::new(CountingStore::default(), sized(2));
	let tokens = words("now is the time");

	let (init, size, added) = tokio::join!(markov.init(), markov.window_size(), markov.add_tokens(&tokens));
	assert_eq!(init, Ok(2));
	assert_eq!(size, Ok(2));
	assert_eq!(added, Ok(()));
	assert_eq!(markov.store().window_reads.load(Ordering::SeqCst), 1);

	markov.add_tokens(&tokens).await.unwrap();
	assert_eq!(markov.store().window_reads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn window_size_conflict_is_latched() {
	let store = CountingStore::default();
	store.inner.put("windowSize", b"2".to_vec()).await.unwrap();
	let markov = PersistentMarkov::new(store, sized(3));

	let mismatch = Err(MarkovError::WindowSizeMismatch { persisted: 2, requested: 3 });
	let mut replay = Replay::tenths();
	let (init, chain) = tokio::join!(markov.init(), markov.chain(None, None, &mut replay));
	assert_eq!(init, mismatch.clone());
	assert_eq!(chain.map(|_| 0), mismatch.clone());

	assert_eq!(markov.add_tokens(&["late"]).await, Err(MarkovError::WindowSizeMismatch { persisted: 2, requested: 3 }));
	assert!(!markov.is_ready());
	assert_eq!(markov.store().window_reads.load(Ordering::SeqCst), 1);
	assert_eq!(markov.store().inner.get("transitions/,,").await.unwrap(), None);
}

#[tokio::test]
async fn persisted_size_is_adopted_without_request() {
	let store = Arc::new(MemoryStore::new());
	let first = PersistentMarkov::new(store.clone(), sized(2));
	first.add_tokens(&words("now is the time for action")).await.unwrap();

	let reopened = PersistentMarkov::new(store, StoreOptions::new());
	assert_eq!(reopened.window_size().await, Ok(2));
	assert_eq!(reopened.get_data().await.unwrap(), first.get_data().await.unwrap());
}

#[tokio::test]
async fn ingestion_matches_in_memory_model() {
	let persistent = PersistentMarkov::new(MemoryStore::new(), sized(1));
	let mut memory = Markov::new(1).unwrap();
	for sentence in ["this is a testing sentence", "here is another testing sentence"] {
		persistent.add_tokens(&words(sentence)).await.unwrap();
		memory.add_tokens(&words(sentence));
	}
	persistent.add_tokens::<&str>(&[]).await.unwrap();

	let data = persistent.get_data().await.unwrap();
	assert_eq!(data, memory.save());
	assert_eq!(data.transition_table.get(""), Some(&[w(1, "here"), w(1, "this")][..]));
	assert_eq!(data.transition_table.get("sentence"), Some(&[Weighted(2, None)][..]));
}

#[tokio::test]
async fn merge_awaits_the_other_model() {
	let store = Arc::new(MemoryStore::new());
	let a = PersistentMarkov::new(store.clone(), sized(2).with_prefix("a/"));
	a.add_tokens(&words("now is the time for action")).await.unwrap();
	{
		let writer = PersistentMarkov::new(store.clone(), sized(2).with_prefix("b/"));
		writer.add_tokens(&words("tomorrow is the time for sleep")).await.unwrap();
	}

	let b = PersistentMarkov::new(store.clone(), StoreOptions::new().with_prefix("b/"));
	assert!(!b.is_ready());
	a.merge(&b).await.unwrap();
	assert!(b.is_ready());

	let table = a.get_data().await.unwrap().transition_table;
	assert_eq!(table.get("time,for"), Some(&[w(1, "action"), w(1, "sleep")][..]));
	assert_eq!(table.get("is,the"), Some(&[w(2, "time")][..]));
	assert_eq!(table.get(","), Some(&[w(1, "now"), w(1, "tomorrow")][..]));

	let untouched = b.get_data().await.unwrap().transition_table;
	assert_eq!(untouched.get("time,for"), Some(&[w(1, "sleep")][..]));
}

#[tokio::test]
async fn merge_rejects_differing_window() {
	let a = PersistentMarkov::new(MemoryStore::new(), sized(2));
	let b = PersistentMarkov::new(MemoryStore::new(), sized(1));
	assert_eq!(a.merge(&b).await, Err(MarkovError::StateSizeMismatch { expected: 2, actual: 1 }));

	let memory = Markov::new(1).unwrap();
	assert_eq!(
		a.merge_markov(&memory).await,
		Err(MarkovError::StateSizeMismatch { expected: 2, actual: 1 })
	);
}

#[tokio::test]
async fn merge_in_memory_model_conserves_weight() {
	let persistent = PersistentMarkov::new(MemoryStore::new(), sized(1));
	persistent.add_tokens(&words("a b c")).await.unwrap();
	let mut memory = Markov::new(1).unwrap();
	memory.add_tokens(&words("a b d"));
	memory.add_tokens(&words("a b c"));

	persistent.merge_markov(&memory).await.unwrap();
	let table = persistent.get_data().await.unwrap().transition_table;
	assert_eq!(table.weight("", Some("a")), 3);
	assert_eq!(table.weight("b", Some("c")), 2);
	assert_eq!(table.weight("b", Some("d")), 1);
	assert_eq!(table.weight("c", None), 2);
}

#[tokio::test]
async fn replayed_chain_matches_in_memory_model() {
	let persistent = PersistentMarkov::new(MemoryStore::new(), sized(1));
	let mut memory = Markov::new(1).unwrap();
	for sentence in ["a b c", "a b d", "c e g"] {
		persistent.add_tokens(&words(sentence)).await.unwrap();
		memory.add_tokens(&words(sentence));
	}

	let mut replay = Replay::tenths();
	assert_eq!(persistent.chain(None, None, &mut replay).await.unwrap(), vec!["a", "b", "d"]);
	let start = State::from_tokens(1, &["c"]);
	assert_eq!(persistent.chain(None, Some(start), &mut replay).await.unwrap(), vec!["e", "g"]);

	let mut replay = Replay::tenths();
	let mut same = Replay::tenths();
	assert_eq!(
		persistent.chain(Some(2), None, &mut replay).await.unwrap(),
		memory.chain(Some(2), None, &mut same).unwrap()
	);

	let unknown = State::from_tokens(1, &["zzz"]);
	assert_eq!(persistent.choose(&unknown, &mut replay).await, Ok(None));
}

#[tokio::test]
async fn chain_rejects_start_of_wrong_length() {
	let markov = PersistentMarkov::new(MemoryStore::new(), sized(1));
	markov.add_tokens(&["a"]).await.unwrap();
	let mut replay = Replay::tenths();
	for size in [0, 2] {
		assert_eq!(
			markov.chain(None, Some(State::start(size)), &mut replay).await,
			Err(MarkovError::StateSizeMismatch { expected: 1, actual: size })
		);
	}
}

#[tokio::test]
async fn counts_match_in_memory_model() {
	let persistent = PersistentMarkov::new(MemoryStore::new(), sized(1));
	let mut memory = Markov::new(1).unwrap();
	for sentence in ["this is a testing sentence", "here is another testing sentence"] {
		persistent.add_tokens(&words(sentence)).await.unwrap();
		memory.add_tokens(&words(sentence));
	}
	let counts = persistent.counts().await.unwrap();
	assert_eq!(counts, memory.counts());
	assert_eq!(counts.get("is"), Some(&2));
	assert_eq!(counts.get("here"), Some(&1));
}

#[tokio::test]
async fn foreign_scan_keys_are_storage_errors() {
	let markov = PersistentMarkov::new(LeakyScanStore::default(), sized(1));
	markov.add_tokens(&["a"]).await.unwrap();
	let err = markov.get_data().await.unwrap_err();
	assert!(matches!(err, MarkovError::Storage(ref message) if message.contains("elsewhere")), "{err}");
}

#[tokio::test]
async fn weighted_operations() {
	let markov = PersistentMarkov::new(MemoryStore::new(), sized(1));
	let state = State::from_tokens(1, &["x"]);
	markov.add_weighted(&state, 2, Some("b".to_owned())).await.unwrap();
	markov.add_transition(&state, None).await.unwrap();
	let list = markov.add_many(&state, &[w(1, "a"), w(3, "b")]).await.unwrap();
	assert_eq!(list, vec![Weighted(1, None), w(1, "a"), w(5, "b")]);
}

#[tokio::test]
async fn set_and_clear_data() {
	let mut memory = Markov::new(1).unwrap();
	memory.add_tokens(&words("a b c"));
	let snapshot = memory.save();

	let markov = PersistentMarkov::new(MemoryStore::new(), sized(1));
	markov.add_tokens(&words("stale words")).await.unwrap();
	markov.set_data(snapshot.clone()).await.unwrap();
	assert_eq!(markov.get_data().await.unwrap(), snapshot);
	assert_eq!(markov.to_markov().await.unwrap().save(), snapshot);

	let wrong = Markov::new(2).unwrap().save();
	assert_eq!(
		markov.set_data(wrong).await,
		Err(MarkovError::StateSizeMismatch { expected: 1, actual: 2 })
	);

	markov.clear_data().await.unwrap();
	let cleared = markov.get_data().await.unwrap();
	assert_eq!(cleared, Markov::new(1).unwrap().save());
	assert_eq!(markov.store().get("windowSize").await.unwrap(), Some(b"1".to_vec()));
}

#[tokio::test]
async fn prefixes_keep_models_apart() {
	let store = Arc::new(MemoryStore::new());
	let one = PersistentMarkov::new(store.clone(), sized(1).with_prefix("one/"));
	let two = PersistentMarkov::new(store.clone(), sized(2).with_prefix("two/"));
	one.add_tokens(&["a"]).await.unwrap();
	two.add_tokens(&["b"]).await.unwrap();
	two.clear_data().await.unwrap();

	assert_eq!(one.get_data().await.unwrap().transition_table.weight("", Some("a")), 1);
	assert_eq!(two.get_data().await.unwrap().transition_table.len(), 1);
}

#[tokio::test]
async fn storage_errors_propagate() {
	let store = FlakyStore::default();
	store.failing.store(true, Ordering::SeqCst);
	let broken = PersistentMarkov::new(store, sized(1));
	let refused = Err(MarkovError::Storage("write refused for windowSize".to_owned()));
	assert_eq!(broken.init().await, refused);

	// The failed run is latched: a healthy store is never retried
	broken.store().failing.store(false, Ordering::SeqCst);
	assert_eq!(broken.init().await, refused);
	assert_eq!(broken.add_tokens(&["a"]).await, refused.map(|_| ()));
	assert_eq!(broken.store().get("windowSize").await.unwrap(), None);

	let markov = PersistentMarkov::new(FlakyStore::default(), sized(1));
	markov.init().await.unwrap();
	markov.store().failing.store(true, Ordering::SeqCst);
	assert_eq!(
		markov.add_tokens(&["a"]).await,
		Err(MarkovError::Storage("write refused for transitions/".to_owned()))
	);
	assert!(markov.is_ready());
}
