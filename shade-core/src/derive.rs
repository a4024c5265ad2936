//! Deterministic derivations binding a depositor secret to a committed note
//! set: recipient and note-set commitments, the unspendable target address,
//! per-index nullifiers and the anti-spam proof-of-work digest.
//!
//! All functions are total over fixed-size inputs. Each derivation mixes in
//! its own 32-byte domain tag so no output is replayable as the input of
//! another.

use sha3::{Digest, Keccak256};

use crate::{
    error::ClaimError,
    note::NoteSet,
    types::{
        left_pad32, Address, Hash, Secret, ADDRESS_LEN, HASH_LEN, MAX_NOTES, NOTE_SLOT_LEN,
        POW_TRAILING_BITS,
    },
};

pub const TAG_RECIPIENT: Hash = domain_tag(b"SHADE_V1_RECIPIENT");
pub const TAG_ADDRESS: Hash = domain_tag(b"SHADE_V1_ADDRESS");
pub const TAG_NULLIFIER: Hash = domain_tag(b"SHADE_V1_NULLIFIER");

/// Zero-pads an ASCII label to a 32-byte tag.
const fn domain_tag(ascii: &[u8]) -> Hash {
    assert!(ascii.len() <= HASH_LEN);
    let mut tag = [0u8; HASH_LEN];
    let mut i = 0;
    while i < ascii.len() {
        tag[i] = ascii[i];
        i += 1;
    }
    tag
}

/// Compute the keccak256 hash of the given data.
pub fn keccak256(data: &[u8]) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// A `u64` as a 32-byte big-endian integer.
pub fn be32(v: u64) -> Hash {
    left_pad32(&v.to_be_bytes())
}

/// Commitment to a single recipient address, used in place of the raw
/// address inside the note-set commitment.
pub fn recipient_commitment(recipient: &Address) -> Hash {
    let mut input = [0u8; 2 * HASH_LEN];
    input[..HASH_LEN].copy_from_slice(&TAG_RECIPIENT);
    input[HASH_LEN..].copy_from_slice(&left_pad32(recipient));
    keccak256(&input)
}

/// The fixed-capacity slot encoding the note-set commitment hashes over:
/// `MAX_NOTES` slots of `amount_be32 ‖ recipient_commitment`, zero-filled
/// past the populated notes.
pub fn note_slots(notes: &NoteSet) -> [[u8; NOTE_SLOT_LEN]; MAX_NOTES] {
    let mut slots = [[0u8; NOTE_SLOT_LEN]; MAX_NOTES];
    for (slot, note) in slots.iter_mut().zip(notes.notes()) {
        note.amount.to_big_endian(&mut slot[..HASH_LEN]);
        slot[HASH_LEN..].copy_from_slice(&recipient_commitment(&note.recipient));
    }
    slots
}

/// Commitment over the full ordered note set. Reordering notes changes the
/// output.
pub fn notes_commitment(notes: &NoteSet) -> Hash {
    let mut input = [0u8; MAX_NOTES * NOTE_SLOT_LEN];
    for (i, slot) in note_slots(notes).iter().enumerate() {
        input[i * NOTE_SLOT_LEN..(i + 1) * NOTE_SLOT_LEN].copy_from_slice(slot);
    }
    keccak256(&input)
}

/// The unspendable funding address: low 20 bytes of a hash over the domain
/// tag, chain id, secret and notes commitment. No signing key exists for it.
pub fn target_address(secret: &Secret, chain_id: u64, notes_commitment: &Hash) -> Address {
    let digest = tagged_digest(&TAG_ADDRESS, chain_id, secret, notes_commitment);
    digest[HASH_LEN - ADDRESS_LEN..].try_into().unwrap()
}

/// Replay-prevention tag for the note at `note_index`. Distinct indices give
/// distinct nullifiers.
pub fn nullifier(secret: &Secret, chain_id: u64, note_index: u32) -> Hash {
    tagged_digest(&TAG_NULLIFIER, chain_id, secret, &be32(note_index as u64))
}

fn tagged_digest(tag: &Hash, chain_id: u64, secret: &Secret, trailer: &Hash) -> Hash {
    let mut input = [0u8; 4 * HASH_LEN];
    input[..HASH_LEN].copy_from_slice(tag);
    input[HASH_LEN..2 * HASH_LEN].copy_from_slice(&be32(chain_id));
    input[2 * HASH_LEN..3 * HASH_LEN].copy_from_slice(secret);
    input[3 * HASH_LEN..].copy_from_slice(trailer);
    keccak256(&input)
}

/// Anti-spam digest over the notes commitment and the secret.
pub fn pow_digest(notes_commitment: &Hash, secret: &Secret) -> Hash {
    let mut input = [0u8; 2 * HASH_LEN];
    input[..HASH_LEN].copy_from_slice(notes_commitment);
    input[HASH_LEN..].copy_from_slice(secret);
    keccak256(&input)
}

/// A digest is valid when its [`POW_TRAILING_BITS`] low-order bits are all
/// zero.
pub fn pow_is_valid(digest: &Hash) -> bool {
    let mut remaining = POW_TRAILING_BITS;
    let mut i = HASH_LEN;
    while remaining >= 8 {
        i -= 1;
        if digest[i] != 0 {
            return false;
        }
        remaining -= 8;
    }
    remaining == 0 || digest[i - 1] & ((1u8 << remaining) - 1) == 0
}

/// Deterministically searches a proof-of-work valid secret starting from
/// `seed`: each failed candidate is rehashed into the next one. Fails with
/// [`ClaimError::SecretSearchExhausted`] after `max_attempts` candidates.
pub fn find_valid_secret(
    seed: &Secret,
    notes_commitment: &Hash,
    max_attempts: u64,
) -> Result<Secret, ClaimError> {
    let mut candidate = *seed;
    for attempt in 0..max_attempts {
        if pow_is_valid(&pow_digest(notes_commitment, &candidate)) {
            log::debug!("found pow-valid secret after {attempt} attempts");
            return Ok(candidate);
        }
        candidate = keccak256(&candidate);
    }
    Err(ClaimError::SecretSearchExhausted {
        attempts: max_attempts,
    })
}
