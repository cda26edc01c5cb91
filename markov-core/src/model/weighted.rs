use std::cmp::Ordering;
use std::fmt;

use serde::de::{self, Unexpected, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

use super::hooks::TokenHooks;
use crate::random::RandomSource;

/// One observed edge out of a state: `(weight, next token)`.
///
/// `None` as token is the end-of-sequence edge. Serialized as a two-element
/// array, e.g. `[2, "time"]` or `[1, null]`.
///
/// Weights are occurrence counts. Any whole, non-negative number is accepted
/// on load (`2` or `2.0`). Fractional, negative or non-finite weights are
/// rejected.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Weighted(#[serde(deserialize_with = "deserialize_weight")] pub u64, pub Option<String>);

impl Weighted {
	pub fn weight(&self) -> u64 {
		self.0
	}

	pub fn token(&self) -> Option<&str> {
		self.1.as_deref()
	}
}

struct WeightVisitor;

impl Visitor<'_> for WeightVisitor {
	type Value = u64;

	fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("a whole, non-negative weight")
	}

	fn visit_u64<E: de::Error>(self, value: u64) -> Result<u64, E> {
		Ok(value)
	}

	fn visit_i64<E: de::Error>(self, value: i64) -> Result<u64, E> {
		u64::try_from(value).map_err(|_| E::invalid_value(Unexpected::Signed(value), &self))
	}

	fn visit_f64<E: de::Error>(self, value: f64) -> Result<u64, E> {
		// 2^64 itself does not fit, hence the strict bound
		if value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value < u64::MAX as f64 {
			Ok(value as u64)
		} else {
			Err(E::invalid_value(Unexpected::Float(value), &self))
		}
	}
}

fn deserialize_weight<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
	deserializer.deserialize_u64(WeightVisitor)
}

/// Adds `weight` to the entry for `token`, inserting it at its sorted
/// position when absent.
///
/// Uses a binary search over `hooks.compare_tokens`, so locating the entry is
/// O(log k) and inserting shifts at most k entries. A zero weight is ignored.
pub fn insert_weighted<H: TokenHooks + ?Sized>(
	list: &mut Vec<Weighted>,
	weight: u64,
	token: Option<String>,
	hooks: &H,
) {
	if weight == 0 {
		return;
	}
	match list.binary_search_by(|entry| hooks.compare_tokens(&entry.1, &token)) {
		Ok(index) => list[index].0 = list[index].0.saturating_add(weight),
		Err(index) => list.insert(index, Weighted(weight, token)),
	}
}

/// Returns true if `list` is strictly ordered and holds only positive weights.
pub fn is_normalized<H: TokenHooks + ?Sized>(list: &[Weighted], hooks: &H) -> bool {
	list.iter().all(|entry| entry.0 > 0)
		&& list
			.windows(2)
			.all(|pair| hooks.compare_tokens(&pair[0].1, &pair[1].1) == Ordering::Less)
}

/// Brings an arbitrary list into sorted, duplicate-free form by folding it
/// through [`insert_weighted`]. Already normalized lists are returned as is.
pub fn normalize<H: TokenHooks + ?Sized>(list: Vec<Weighted>, hooks: &H) -> Vec<Weighted> {
	if is_normalized(&list, hooks) {
		return list;
	}
	let mut sorted = Vec::with_capacity(list.len());
	for Weighted(weight, token) in list {
		insert_weighted(&mut sorted, weight, token, hooks);
	}
	sorted
}

/// Merges `incoming` into the sorted `list` with a linear two-pointer scan.
///
/// The result is the same as calling [`insert_weighted`] for every incoming
/// entry, but costs O(existing + incoming). Weights of tokens present on both
/// sides are summed.
pub fn merge_weighted<H: TokenHooks + ?Sized>(list: &mut Vec<Weighted>, incoming: &[Weighted], hooks: &H) {
	if incoming.is_empty() {
		return;
	}
	let incoming = normalize(incoming.to_vec(), hooks);

	let existing = std::mem::take(list);
	let mut merged = Vec::with_capacity(existing.len() + incoming.len());
	let mut ours = existing.into_iter().peekable();
	let mut theirs = incoming.into_iter().peekable();

	loop {
		let order = match (ours.peek(), theirs.peek()) {
			(Some(a), Some(b)) => hooks.compare_tokens(&a.1, &b.1),
			(Some(_), None) => Ordering::Less,
			(None, Some(_)) => Ordering::Greater,
			(None, None) => break,
		};
		match order {
			Ordering::Less => merged.extend(ours.next()),
			Ordering::Greater => merged.extend(theirs.next()),
			Ordering::Equal => {
				if let (Some(mut a), Some(b)) = (ours.next(), theirs.next()) {
					a.0 = a.0.saturating_add(b.0);
					merged.push(a);
				}
			}
		}
	}

	*list = merged;
}

/// Picks one token with probability proportional to its weight.
///
/// Each entry draws `u` from `random` and gets the key `u^(1/weight)`. The
/// entry with the largest key wins, and ties keep the earlier entry. Returns
/// `None` for an empty list.
pub fn choose_weighted<'a, R: RandomSource + ?Sized>(
	list: &'a [Weighted],
	random: &mut R,
) -> Option<&'a Option<String>> {
	let mut best: Option<(f64, &Weighted)> = None;
	for entry in list {
		if entry.0 == 0 {
			continue;
		}
		let key = random.next_unit().powf(1.0 / entry.0 as f64);
		if best.is_none_or(|(best_key, _)| key > best_key) {
			best = Some((key, entry));
		}
	}
	best.map(|(_, entry)| &entry.1)
}
