use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{MarkovError, Result};
use crate::model::markov::Snapshot;
use crate::model::registry::SnapshotSet;

/// On-disk encoding of a snapshot file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotFormat {
	/// Plain JSON, the layout of [`Snapshot`].
	Json,
	/// Compact `postcard` encoding.
	Binary,
}

impl SnapshotFormat {
	/// `.bin` files are binary, everything else is JSON.
	pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
		match path.as_ref().extension().and_then(|ext| ext.to_str()) {
			Some("bin") => SnapshotFormat::Binary,
			_ => SnapshotFormat::Json,
		}
	}
}

/// `postcard` cannot decode untagged enums, so binary files carry an
/// explicit variant tag.
#[derive(Serialize, Deserialize)]
enum TaggedSnapshotSet {
	Single(Snapshot),
	Sized(BTreeMap<String, Snapshot>),
}

impl From<SnapshotSet> for TaggedSnapshotSet {
	fn from(set: SnapshotSet) -> Self {
		match set {
			SnapshotSet::Single(snapshot) => TaggedSnapshotSet::Single(snapshot),
			SnapshotSet::Sized(snapshots) => TaggedSnapshotSet::Sized(snapshots),
		}
	}
}

impl From<TaggedSnapshotSet> for SnapshotSet {
	fn from(set: TaggedSnapshotSet) -> Self {
		match set {
			TaggedSnapshotSet::Single(snapshot) => SnapshotSet::Single(snapshot),
			TaggedSnapshotSet::Sized(snapshots) => SnapshotSet::Sized(snapshots),
		}
	}
}

/// Writes `data` to `path`, encoded per [`SnapshotFormat::from_path`].
pub fn save_snapshot<P: AsRef<Path>>(path: P, data: &SnapshotSet) -> Result<()> {
	let path = path.as_ref();
	let bytes = match SnapshotFormat::from_path(path) {
		SnapshotFormat::Json => serde_json::to_vec(data)?,
		SnapshotFormat::Binary => postcard::to_stdvec(&TaggedSnapshotSet::from(data.clone()))?,
	};
	std::fs::write(path, bytes)?;
	log::info!("Saved snapshot to {:?}", path);
	Ok(())
}

/// Reads a snapshot file written by [`save_snapshot`], or any JSON snapshot.
pub fn load_snapshot<P: AsRef<Path>>(path: P) -> Result<SnapshotSet> {
	let path = path.as_ref();
	let bytes = std::fs::read(path)?;
	let data: SnapshotSet = match SnapshotFormat::from_path(path) {
		SnapshotFormat::Json => serde_json::from_slice(&bytes)?,
		SnapshotFormat::Binary => postcard::from_bytes::<TaggedSnapshotSet>(&bytes)?.into(),
	};
	log::info!("Loaded snapshot from {:?}", path);
	Ok(data)
}

/// Reads a text file and returns all its lines.
///
/// - Reads the entire file into memory
/// - Splits on `\n` / `\r\n`
pub fn read_lines<P: AsRef<Path>>(filename: P) -> Result<Vec<String>> {
	let mut contents = String::new();
	File::open(filename)?.read_to_string(&mut contents)?;
	Ok(contents.lines().map(str::to_owned).collect())
}

/// Builds an output path based on an input path and a new extension.
///
/// Example:
/// `data/input.txt` + `"bin"` → `data/input.bin`
pub fn build_output_path<P: AsRef<Path>>(input_path: P, output_extension: &str) -> Result<PathBuf> {
	let input_path = input_path.as_ref();

	let parent = input_path.parent().unwrap_or_else(|| Path::new("."));
	let file_stem = input_path
		.file_stem()
		.ok_or_else(|| MarkovError::Io(format!("{} has no filename", input_path.display())))?;

	let mut output = PathBuf::from(parent);
	output.push(file_stem);
	output.set_extension(output_extension);

	Ok(output)
}
