//! Fixed-size aliases and the hard resource bounds shared by both
//! implementations of the core. Every limit here is checked, not advisory:
//! the circuit counterpart allocates wires from these constants and cannot
//! process anything larger.

/// Length of a hash in bytes.
pub const HASH_LEN: usize = 32;
/// Length of an address in bytes.
pub const ADDRESS_LEN: usize = 20;
/// Capacity of a note set. Commitments are computed over this many slots,
/// zero-filled past the populated ones.
pub const MAX_NOTES: usize = 5;
/// One commitment slot: amount as a 32-byte big-endian integer followed by
/// the recipient commitment.
pub const NOTE_SLOT_LEN: usize = 2 * HASH_LEN;
/// Maximum number of layers in an account proof, root to leaf.
pub const MAX_PROOF_DEPTH: usize = 9;
/// Maximum size of a raw trie node in bytes.
pub const MAX_NODE_LEN: usize = 532;
/// Number of nibbles in a full address-hash path.
pub const MAX_KEY_NIBBLE_LEN: usize = 64;
/// Maximum size of a hex-prefix encoded key. One flag byte more than the
/// 32 key bytes.
pub const MAX_ENC_KEY_LEN: usize = 33;
/// The maximum number of bytes the length of data can take.
/// 2 is the usual in practice for eth MPT related data.
pub const MAX_LEN_BYTES: usize = 2;
/// Maximum length of the encoded account record held in a leaf:
/// list header (2) + nonce (9) + balance (33) + two 33-byte hashes.
pub const MAX_ACCOUNT_VALUE_LEN: usize = 110;
/// Number of low-order bits of a proof-of-work digest that must be zero.
pub const POW_TRAILING_BITS: usize = 8;

pub type Hash = [u8; HASH_LEN];
pub type Address = [u8; ADDRESS_LEN];
pub type Secret = [u8; HASH_LEN];

pub fn left_pad32(slice: &[u8]) -> [u8; 32] {
    left_pad::<32>(slice)
}

pub fn left_pad<const N: usize>(slice: &[u8]) -> [u8; N] {
    match slice.len() {
        a if a > N => panic!(
            "left_pad{} must not be called with higher slice len than {} (given{})",
            N,
            N,
            slice.len()
        ),
        a if a == N => slice.try_into().unwrap(),
        a => {
            let mut output = [0u8; N];
            output[N - a..].copy_from_slice(slice);
            output
        }
    }
}
