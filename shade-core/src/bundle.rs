//! The versioned deposit bundle a depositor keeps between funding and
//! claiming. Everything derivable is recomputed from it; a precomputed
//! target address, when present, is only ever checked, never overwritten.

use serde::{Deserialize, Serialize};

use crate::{
    derive,
    error::ClaimError,
    note::{NotePolicy, NoteSet},
    types::{Address, Hash, Secret},
};

pub const BUNDLE_VERSION: u16 = 1;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositBundle {
    pub version: u16,
    pub chain_id: u64,
    pub secret: Secret,
    pub notes: NoteSet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_address: Option<Address>,
}

/// Every value the core can derive from a bundle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DerivedValues {
    pub notes_commitment: Hash,
    pub target_address: Address,
    pub nullifiers: Vec<Hash>,
    pub pow_digest: Hash,
}

impl DepositBundle {
    pub fn new(chain_id: u64, secret: Secret, notes: NoteSet) -> Self {
        Self {
            version: BUNDLE_VERSION,
            chain_id,
            secret,
            notes,
            target_address: None,
        }
    }

    /// Recomputes all derived values and checks them for self-consistency.
    /// A bundle whose stored target address disagrees with the derived one
    /// is corrupt and must not be silently repaired.
    pub fn derive(&self, policy: &NotePolicy) -> Result<DerivedValues, ClaimError> {
        // revalidate: bundles cross trust boundaries (files, backups)
        let notes = NoteSet::new(self.notes.notes().to_vec(), policy)?;
        let notes_commitment = derive::notes_commitment(&notes);
        let target_address = derive::target_address(&self.secret, self.chain_id, &notes_commitment);
        if let Some(stored) = self.target_address {
            if stored != target_address {
                return Err(ClaimError::TargetAddressMismatch);
            }
        }
        let nullifiers = (0..notes.len() as u32)
            .map(|i| derive::nullifier(&self.secret, self.chain_id, i))
            .collect();
        Ok(DerivedValues {
            notes_commitment,
            target_address,
            nullifiers,
            pow_digest: derive::pow_digest(&notes_commitment, &self.secret),
        })
    }
}

#[cfg(test)]
mod test {
    use ethereum_types::U256;

    use super::*;
    use crate::note::Note;

    fn policy() -> NotePolicy {
        NotePolicy {
            max_total: U256::from(1u64) << 64,
        }
    }

    fn bundle() -> DepositBundle {
        let notes = NoteSet::new(
            vec![
                Note::new([0x11; 20], U256::from(3u64)),
                Note::new([0x22; 20], U256::from(4u64)),
            ],
            &policy(),
        )
        .unwrap();
        DepositBundle::new(1, [0x42; 32], notes)
    }

    #[test]
    fn test_bundle_roundtrip_rederives_everything() {
        let mut bundle = bundle();
        let derived = bundle.derive(&policy()).unwrap();
        assert_eq!(derived.nullifiers.len(), 2);

        // a stored target address that matches passes the self-check
        bundle.target_address = Some(derived.target_address);
        let json = serde_json::to_string(&bundle).unwrap();
        let restored: DepositBundle = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, bundle);
        assert_eq!(restored.derive(&policy()).unwrap(), derived);
    }

    #[test]
    fn test_target_address_mismatch_is_an_error() {
        let mut bundle = bundle();
        bundle.target_address = Some([0xee; 20]);
        assert_eq!(
            bundle.derive(&policy()).unwrap_err(),
            ClaimError::TargetAddressMismatch
        );
    }
}
