//! Fail-closed error taxonomy of the claim core. Every variant is terminal
//! at this layer; retrying (mining a new secret, fetching a fresher proof)
//! is the caller's decision.

use ethereum_types::U256;
use thiserror::Error;

use crate::types::{MAX_NOTES, POW_TRAILING_BITS};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClaimError {
    #[error("malformed length-prefix encoding: {0}")]
    MalformedEncoding(&'static str),
    #[error("unexpected node structure: {0}")]
    StructuralMismatch(&'static str),
    #[error("node path diverges from the target address path at nibble {at}")]
    PathMismatch { at: usize },
    #[error("child reference does not match layer {layer} of the proof")]
    HashMismatch { layer: usize },
    #[error("proved balance {balance} is below the required amount {required}")]
    InsufficientBalance { balance: U256, required: U256 },
    #[error("proof depth {depth} exceeds the maximum of {max}")]
    DepthExceeded { depth: usize, max: usize },
    #[error("node of {len} bytes exceeds the maximum of {max}")]
    NodeTooLarge { len: usize, max: usize },
    #[error("proof-of-work digest does not end in {POW_TRAILING_BITS} zero bits")]
    InvalidPow,
    #[error("no proof-of-work valid secret found in {attempts} attempts")]
    SecretSearchExhausted { attempts: u64 },
    #[error("supplied target address does not match the derived one")]
    TargetAddressMismatch,
    #[error("a note set must contain at least one note")]
    EmptyNoteSet,
    #[error("a note set may contain at most {MAX_NOTES} notes, got {0}")]
    TooManyNotes(usize),
    #[error("note {0} carries a zero amount")]
    ZeroAmount(usize),
    #[error("aggregate amount {total} exceeds the policy maximum {max}")]
    AggregateTooLarge { total: U256, max: U256 },
}
