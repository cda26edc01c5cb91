//! Markov-chain model builder and sampler over token sequences.
//!
//! This crate provides:
//! - Fixed-window Markov models with weighted, sorted transition lists
//! - Loss-free merging of independently built models
//! - Chain and phrase sampling with an injectable random source
//! - A registry picking the closest model for a requested phrase size
//! - A key-value backed model behind a one-time asynchronous readiness gate
//! - Snapshot files (JSON or `postcard`)

/// Error type shared by every module.
pub mod error;

/// Core models, transition store and registry.
pub mod model;

/// Injectable random sources.
pub mod random;

/// Key-value persistence.
pub mod store;

/// Snapshot files and corpus reading.
pub mod io;

pub use error::{MarkovError, Result};
pub use model::markov::{Markov, Snapshot};
pub use model::registry::{MarkovMap, SnapshotSet};
pub use model::state::State;
pub use model::weighted::Weighted;
