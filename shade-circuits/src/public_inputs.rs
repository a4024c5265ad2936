//! The pinned public-input layout of the claim circuit. The wrapper gives
//! named access over the flat target/value slice shared between the circuit
//! and its verifier-facing consumers.

use plonky2::iop::target::Target;
use plonky2::{
    field::extension::Extendable, hash::hash_types::RichField,
    plonk::circuit_builder::CircuitBuilder,
};
use plonky2_crypto::u32::arithmetic_u32::U32Target;

use crate::{
    array::Array,
    keccak::{OutputHash, PACKED_HASH_LEN},
    u256::{UInt256Target, NUM_LIMBS},
};

/// Number of u32 limbs of a packed 20-byte address.
pub const PACKED_ADDRESS_LEN: usize = 5;

/// Wrapper around the public inputs of a claim proof. Layout:
/// - R: packed root commitment of the snapshot
/// - C: chain id
/// - I: claimed note index
/// - A: claimed amount, little-endian u32 limbs
/// - P: packed recipient address
/// - N: packed nullifier for the claimed index
/// - W: packed proof-of-work digest
#[derive(Clone, Debug)]
pub struct PublicInputs<'a, T: Clone> {
    pub(crate) proof_inputs: &'a [T],
}

impl<'a, T: Copy + Default> PublicInputs<'a, T> {
    pub(crate) const ROOT_IDX: usize = 0;
    pub(crate) const CHAIN_ID_IDX: usize = Self::ROOT_IDX + PACKED_HASH_LEN;
    pub(crate) const NOTE_INDEX_IDX: usize = Self::CHAIN_ID_IDX + 1;
    pub(crate) const AMOUNT_IDX: usize = Self::NOTE_INDEX_IDX + 1;
    pub(crate) const RECIPIENT_IDX: usize = Self::AMOUNT_IDX + NUM_LIMBS;
    pub(crate) const NULLIFIER_IDX: usize = Self::RECIPIENT_IDX + PACKED_ADDRESS_LEN;
    pub(crate) const POW_IDX: usize = Self::NULLIFIER_IDX + PACKED_HASH_LEN;
    pub const TOTAL_LEN: usize = Self::POW_IDX + PACKED_HASH_LEN;

    pub fn from(arr: &'a [T]) -> Self {
        assert_eq!(arr.len(), Self::TOTAL_LEN);
        Self { proof_inputs: arr }
    }

    pub fn root_data(&self) -> &[T] {
        &self.proof_inputs[Self::ROOT_IDX..Self::CHAIN_ID_IDX]
    }

    pub fn chain_id_data(&self) -> T {
        self.proof_inputs[Self::CHAIN_ID_IDX]
    }

    pub fn note_index_data(&self) -> T {
        self.proof_inputs[Self::NOTE_INDEX_IDX]
    }

    pub fn amount_data(&self) -> &[T] {
        &self.proof_inputs[Self::AMOUNT_IDX..Self::RECIPIENT_IDX]
    }

    pub fn recipient_data(&self) -> &[T] {
        &self.proof_inputs[Self::RECIPIENT_IDX..Self::NULLIFIER_IDX]
    }

    pub fn nullifier_data(&self) -> &[T] {
        &self.proof_inputs[Self::NULLIFIER_IDX..Self::POW_IDX]
    }

    pub fn pow_digest_data(&self) -> &[T] {
        &self.proof_inputs[Self::POW_IDX..]
    }
}

impl PublicInputs<'_, Target> {
    /// Registers the claim values in the pinned order.
    pub fn register<F, const D: usize>(
        cb: &mut CircuitBuilder<F, D>,
        root: &OutputHash,
        chain_id: Target,
        note_index: Target,
        amount: &UInt256Target,
        recipient: &Array<U32Target, PACKED_ADDRESS_LEN>,
        nullifier: &OutputHash,
        pow_digest: &OutputHash,
    ) where
        F: RichField + Extendable<D>,
    {
        root.register_as_public_input(cb);
        cb.register_public_input(chain_id);
        cb.register_public_input(note_index);
        amount.register_as_public_input(cb);
        recipient.register_as_public_input(cb);
        nullifier.register_as_public_input(cb);
        pow_digest.register_as_public_input(cb);
    }
}
