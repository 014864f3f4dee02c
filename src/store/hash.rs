//! Content addressing for queued transfers.
//!
//! The integrity hash is the only deduplication key shared with the remote ledger, so it must be
//! computed exactly once, at enqueue time, from the fields that define the transfer.

use crate::store::Amount;
use sha2::{Digest, Sha256};

/// Number of hash hex characters embedded in a transfer id.
pub const ID_HASH_FRAGMENT_LEN: usize = 12;

/// SHA-256 over the tagged, length-prefixed defining fields of a transfer, hex encoded.
pub fn integrity_hash(
	sender_id: &str,
	receiver_id: &str,
	amount: Amount,
	created_at: i64,
	device_id: &str,
) -> String {
	let amount = amount.to_string();
	let created_at = created_at.to_string();
	let fields: [(&str, &str); 5] = [
		("sender", sender_id),
		("receiver", receiver_id),
		("amount", &amount),
		("created_at", &created_at),
		("device", device_id),
	];

	let mut hasher = Sha256::new();
	for (tag, value) in fields {
		hasher.update(tag.as_bytes());
		hasher.update((value.len() as u64).to_be_bytes());
		hasher.update(value.as_bytes());
	}
	hex::encode(hasher.finalize())
}

/// Local identifier derived from the creation time and a fragment of the integrity hash.
pub fn transfer_id(created_at: i64, hash: &str) -> String {
	let fragment = hash.get(..ID_HASH_FRAGMENT_LEN).unwrap_or(hash);
	format!("offline_{}_{}", created_at, fragment)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn amount(units: u128) -> Amount {
		Amount::from_minor_units(units)
	}

	#[test]
	fn test_hash_is_deterministic() {
		let first = integrity_hash("alice", "bob", amount(10_000), 1_700_000_000_000, "device-1");
		let second = integrity_hash("alice", "bob", amount(10_000), 1_700_000_000_000, "device-1");
		assert_eq!(first, second);
		assert_eq!(first.len(), 64);
		assert!(first.bytes().all(|b| b.is_ascii_hexdigit()));
	}

	#[test]
	fn test_every_defining_field_changes_the_hash() {
		let base = integrity_hash("alice", "bob", amount(10_000), 1, "device-1");
		assert_ne!(base, integrity_hash("alice2", "bob", amount(10_000), 1, "device-1"));
		assert_ne!(base, integrity_hash("alice", "bob2", amount(10_000), 1, "device-1"));
		assert_ne!(base, integrity_hash("alice", "bob", amount(10_001), 1, "device-1"));
		assert_ne!(base, integrity_hash("alice", "bob", amount(10_000), 2, "device-1"));
		assert_ne!(base, integrity_hash("alice", "bob", amount(10_000), 1, "device-2"));
	}

	#[test]
	fn test_field_boundaries_are_unambiguous() {
		assert_ne!(
			integrity_hash("ab", "c", amount(1), 1, "d"),
			integrity_hash("a", "bc", amount(1), 1, "d")
		);
	}

	#[test]
	fn test_transfer_id_embeds_time_and_hash_fragment() {
		let hash = integrity_hash("alice", "bob", amount(500), 42, "device-1");
		let id = transfer_id(42, &hash);
		assert_eq!(id, format!("offline_42_{}", &hash[..ID_HASH_FRAGMENT_LEN]));
	}
}
