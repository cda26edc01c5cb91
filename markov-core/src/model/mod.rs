//! Top-level module for the Markov engine.
//!
//! - Sliding-window states (`State`)
//! - Token customization hooks (`TokenHooks`)
//! - Sorted weighted transition lists and the table holding them
//! - The fixed-window model (`Markov`)
//! - A multi-size registry (`MarkovMap`)

/// Token customization points injected into a model.
pub mod hooks;

/// Fixed-window Markov model: ingestion, merge, sampling, save/load.
pub mod markov;

/// Phrase generation options.
pub mod options;

/// Models of several window sizes behind one phrase generator.
pub mod registry;

/// Sliding window of recent tokens and its canonical key.
pub mod state;

/// State key → weighted transition list.
pub mod transitions;

/// Sorted weighted lists: insertion, merge and weighted sampling.
pub mod weighted;
