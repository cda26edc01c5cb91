use thiserror::Error;

pub type Result<T> = std::result::Result<T, MarkovError>;

/// Every failure the crate can report.
///
/// The type is `Clone` because a failed readiness run is latched and handed
/// out to every caller of the persistent model.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarkovError {
	#[error("state size mismatch: expected {expected}, got {actual}")]
	StateSizeMismatch { expected: usize, actual: usize },

	#[error("persisted window size {persisted} conflicts with requested {requested}")]
	WindowSizeMismatch { persisted: usize, requested: usize },

	#[error("no markov available for {0}-phrases")]
	NoModelAvailable(usize),

	#[error("window size must be >= 1, got {0}")]
	InvalidWindowSize(usize),

	#[error("no phrase of at least {min_length} characters after {attempts} attempts")]
	PhraseUnreachable { min_length: usize, attempts: usize },

	#[error("invalid option: {0}")]
	InvalidOption(String),

	#[error("storage error: {0}")]
	Storage(String),

	#[error("serialization error: {0}")]
	Serialization(String),

	#[error("IO error: {0}")]
	Io(String),

	#[error("build worker failed: {0}")]
	Worker(String),
}

impl From<std::io::Error> for MarkovError {
	fn from(err: std::io::Error) -> Self {
		MarkovError::Io(err.to_string())
	}
}

impl From<serde_json::Error> for MarkovError {
	fn from(err: serde_json::Error) -> Self {
		MarkovError::Serialization(err.to_string())
	}
}

impl From<postcard::Error> for MarkovError {
	fn from(err: postcard::Error) -> Self {
		MarkovError::Serialization(err.to_string())
	}
}
