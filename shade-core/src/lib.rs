//! Procedural implementation of the shade claim-authorization core.
//!
//! Everything in this crate is a pure, synchronous computation over
//! fixed-size byte inputs: deriving the commitments that bind a depositor
//! secret to a note set, and verifying radix-16 trie inclusion proofs for
//! the derived target address. The same logic exists a second time as a
//! constraint system in `shade_circuits`; this crate is the reference the
//! circuits are cross-checked against and the one used to build witnesses.

pub mod bundle;
pub mod claim;
pub mod derive;
pub mod error;
pub mod eth;
pub mod mpt;
pub mod nibbles;
pub mod note;
pub mod rlp;
pub mod types;
