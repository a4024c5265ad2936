//! Input types for already-fetched state-proof query responses.
//!
//! Fetching is outside the core: whatever transport delivered the response,
//! the verifier consumes only the raw proof node bytes and re-derives every
//! account field from them. The response's pre-parsed convenience fields are
//! kept solely so callers and tests can cross-check the data source.

use ethereum_types::U256;
use serde::{Deserialize, Serialize};

use crate::{
    error::ClaimError,
    mpt::AccountProof,
    rlp::AccountRecord,
    types::Hash,
};

/// The account half of a standard "prove this account's inclusion at this
/// snapshot" response, as returned by the external data source.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccountQueryResponse {
    /// Raw trie nodes, root first.
    pub account_proof: Vec<Vec<u8>>,
    pub nonce: u64,
    pub balance: U256,
    pub storage_hash: Hash,
    pub code_hash: Hash,
}

impl AccountQueryResponse {
    /// Bounds-checks the raw node bytes into a fixed-capacity proof. Only
    /// the raw bytes feed verification.
    pub fn proof_input(&self) -> Result<AccountProof, ClaimError> {
        AccountProof::from_nodes(&self.account_proof)
    }

    /// Compares the response's convenience fields against an independently
    /// decoded record. A disagreement means the data source is lying about
    /// its own proof.
    pub fn cross_check(&self, record: &AccountRecord) -> Result<(), ClaimError> {
        if record.nonce != self.nonce
            || record.balance != self.balance
            || record.storage_root != self.storage_hash
            || record.code_root != self.code_hash
        {
            return Err(ClaimError::StructuralMismatch(
                "data source fields disagree with the proved account",
            ));
        }
        Ok(())
    }
}
