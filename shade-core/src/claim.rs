//! The fixed-order public-value vector handed to the claim-verification
//! collaborator. Two incompatible layouts existed historically; this crate
//! emits and reads only the explicit version pinned here.

use ethereum_types::U256;

use crate::{
    bundle::DepositBundle,
    derive::pow_is_valid,
    error::ClaimError,
    note::NotePolicy,
    types::{Address, Hash, ADDRESS_LEN, HASH_LEN},
};

/// The pinned layout version. Version 1 (no note index, block-hash snapshot
/// model) is neither emitted nor readable.
pub const PUBLIC_VALUES_VERSION: u8 = 2;

/// The public values authorizing one claim. Serialized as a fixed-width
/// byte vector, one byte per slot, every multi-byte field
/// most-significant-byte first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicClaimValues {
    pub snapshot_id: u64,
    pub root: Hash,
    pub chain_id: u64,
    pub note_index: u32,
    pub amount: U256,
    pub recipient: Address,
    pub nullifier: Hash,
    pub pow_digest: Hash,
}

impl PublicClaimValues {
    /// Assembles the public values of one claim from a deposit bundle and a
    /// snapshot. The bundle is revalidated, every value is rederived, and
    /// the anti-spam gate is checked; proving and proof verification happen
    /// elsewhere.
    pub fn assemble(
        bundle: &DepositBundle,
        policy: &NotePolicy,
        snapshot_id: u64,
        root: &Hash,
        note_index: u32,
    ) -> Result<Self, ClaimError> {
        let derived = bundle.derive(policy)?;
        let note = bundle
            .notes
            .get(note_index as usize)
            .ok_or(ClaimError::StructuralMismatch(
                "note index beyond the committed set",
            ))?;
        if !pow_is_valid(&derived.pow_digest) {
            return Err(ClaimError::InvalidPow);
        }
        Ok(Self {
            snapshot_id,
            root: *root,
            chain_id: bundle.chain_id,
            note_index,
            amount: note.amount,
            recipient: note.recipient,
            nullifier: derived.nullifiers[note_index as usize],
            pow_digest: derived.pow_digest,
        })
    }

    const VERSION_IDX: usize = 0;
    const SNAPSHOT_IDX: usize = Self::VERSION_IDX + 1;
    const ROOT_IDX: usize = Self::SNAPSHOT_IDX + 8;
    const CHAIN_ID_IDX: usize = Self::ROOT_IDX + HASH_LEN;
    const NOTE_INDEX_IDX: usize = Self::CHAIN_ID_IDX + 8;
    const AMOUNT_IDX: usize = Self::NOTE_INDEX_IDX + 4;
    const RECIPIENT_IDX: usize = Self::AMOUNT_IDX + HASH_LEN;
    const NULLIFIER_IDX: usize = Self::RECIPIENT_IDX + ADDRESS_LEN;
    const POW_IDX: usize = Self::NULLIFIER_IDX + HASH_LEN;
    pub const TOTAL_LEN: usize = Self::POW_IDX + HASH_LEN;

    pub fn to_bytes(&self) -> [u8; Self::TOTAL_LEN] {
        let mut out = [0u8; Self::TOTAL_LEN];
        out[Self::VERSION_IDX] = PUBLIC_VALUES_VERSION;
        out[Self::SNAPSHOT_IDX..Self::ROOT_IDX].copy_from_slice(&self.snapshot_id.to_be_bytes());
        out[Self::ROOT_IDX..Self::CHAIN_ID_IDX].copy_from_slice(&self.root);
        out[Self::CHAIN_ID_IDX..Self::NOTE_INDEX_IDX]
            .copy_from_slice(&self.chain_id.to_be_bytes());
        out[Self::NOTE_INDEX_IDX..Self::AMOUNT_IDX]
            .copy_from_slice(&self.note_index.to_be_bytes());
        self.amount
            .to_big_endian(&mut out[Self::AMOUNT_IDX..Self::RECIPIENT_IDX]);
        out[Self::RECIPIENT_IDX..Self::NULLIFIER_IDX].copy_from_slice(&self.recipient);
        out[Self::NULLIFIER_IDX..Self::POW_IDX].copy_from_slice(&self.nullifier);
        out[Self::POW_IDX..].copy_from_slice(&self.pow_digest);
        out
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, ClaimError> {
        if data.len() != Self::TOTAL_LEN {
            return Err(ClaimError::MalformedEncoding(
                "public value vector has the wrong length",
            ));
        }
        if data[Self::VERSION_IDX] != PUBLIC_VALUES_VERSION {
            return Err(ClaimError::MalformedEncoding(
                "unsupported public value layout version",
            ));
        }
        Ok(Self {
            snapshot_id: u64::from_be_bytes(
                data[Self::SNAPSHOT_IDX..Self::ROOT_IDX].try_into().unwrap(),
            ),
            root: data[Self::ROOT_IDX..Self::CHAIN_ID_IDX].try_into().unwrap(),
            chain_id: u64::from_be_bytes(
                data[Self::CHAIN_ID_IDX..Self::NOTE_INDEX_IDX]
                    .try_into()
                    .unwrap(),
            ),
            note_index: u32::from_be_bytes(
                data[Self::NOTE_INDEX_IDX..Self::AMOUNT_IDX]
                    .try_into()
                    .unwrap(),
            ),
            amount: U256::from_big_endian(&data[Self::AMOUNT_IDX..Self::RECIPIENT_IDX]),
            recipient: data[Self::RECIPIENT_IDX..Self::NULLIFIER_IDX]
                .try_into()
                .unwrap(),
            nullifier: data[Self::NULLIFIER_IDX..Self::POW_IDX].try_into().unwrap(),
            pow_digest: data[Self::POW_IDX..].try_into().unwrap(),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample() -> PublicClaimValues {
        PublicClaimValues {
            snapshot_id: 19_000_201,
            root: [0xaa; 32],
            chain_id: 11155111,
            note_index: 3,
            amount: U256::from(123_456u64),
            recipient: [0xbc; 20],
            nullifier: [0xcd; 32],
            pow_digest: [0xde; 32],
        }
    }

    #[test]
    fn test_vector_roundtrip() {
        let values = sample();
        let bytes = values.to_bytes();
        assert_eq!(bytes.len(), PublicClaimValues::TOTAL_LEN);
        assert_eq!(bytes[0], PUBLIC_VALUES_VERSION);
        assert_eq!(PublicClaimValues::from_bytes(&bytes).unwrap(), values);
    }

    #[test]
    fn test_fixed_slot_positions() {
        // the collaborator contract reads fixed offsets, keep them stable
        let bytes = sample().to_bytes();
        assert_eq!(PublicClaimValues::TOTAL_LEN, 169);
        // snapshot id, big-endian u64 at offset 1
        assert_eq!(&bytes[1..9], &19_000_201u64.to_be_bytes());
        // amount big-endian at offset 53: low bytes at the end of the slot
        assert_eq!(bytes[53 + 31], (123_456u64 & 0xff) as u8);
        assert_eq!(bytes[53 + 30], ((123_456u64 >> 8) & 0xff) as u8);
        // recipient right after the amount
        assert_eq!(&bytes[85..105], &[0xbc; 20]);
    }

    #[test]
    fn test_assemble_from_bundle() {
        use crate::derive::{find_valid_secret, notes_commitment, nullifier};
        use crate::note::{Note, NoteSet};

        let policy = NotePolicy {
            max_total: U256::from(1u64) << 64,
        };
        let notes = NoteSet::new(
            vec![
                Note::new([0x11; 20], U256::from(3u64)),
                Note::new([0x22; 20], U256::from(4u64)),
            ],
            &policy,
        )
        .unwrap();
        // assembly enforces the anti-spam gate, so the secret must be mined
        let nc = notes_commitment(&notes);
        let seed = [0x42u8; 32];
        let mined = find_valid_secret(&seed, &nc, 100_000).unwrap();
        let root = [0xaa; 32];

        let unmined = crate::bundle::DepositBundle::new(1, seed, notes.clone());
        assert_eq!(
            PublicClaimValues::assemble(&unmined, &policy, 7, &root, 0).unwrap_err(),
            ClaimError::InvalidPow
        );

        let bundle = crate::bundle::DepositBundle::new(1, mined, notes);
        let values = PublicClaimValues::assemble(&bundle, &policy, 7, &root, 1).unwrap();
        assert_eq!(values.amount, U256::from(4u64));
        assert_eq!(values.recipient, [0x22; 20]);
        assert_eq!(values.nullifier, nullifier(&mined, 1, 1));
        assert!(matches!(
            PublicClaimValues::assemble(&bundle, &policy, 7, &root, 2),
            Err(ClaimError::StructuralMismatch(_))
        ));
    }

    #[test]
    fn test_unknown_version_rejected() {
        let mut bytes = sample().to_bytes().to_vec();
        bytes[0] = 1;
        assert_eq!(
            PublicClaimValues::from_bytes(&bytes).unwrap_err(),
            ClaimError::MalformedEncoding("unsupported public value layout version")
        );
        bytes.push(0);
        assert!(PublicClaimValues::from_bytes(&bytes).is_err());
    }
}
