//! The composed claim circuit: recompute every derivation from the secret
//! and the committed note set, prove the derived target address held enough
//! balance in the snapshot, and expose the pinned public values.

use anyhow::{ensure, Result};
use core::array::from_fn as create_array;
use plonky2::{
    field::extension::Extendable,
    hash::hash_types::RichField,
    iop::{
        target::Target,
        witness::{PartialWitness, WitnessWrite},
    },
    plonk::circuit_builder::CircuitBuilder,
};

use crate::{
    account::decode_account_balance,
    array::{Array, VectorWire},
    keccak::{ByteKeccakWires, KeccakCircuit, KeccakWires, PAD_LEN},
    mpt::{AccountProofCircuit, InputWires, MPTKeyWire, OutputWires},
    public_inputs::{PublicInputs, PACKED_ADDRESS_LEN},
    u256::UInt256Target,
    utils::{bits_to_num, num_to_bits},
};
use plonky2_crypto::u32::arithmetic_u32::U32Target;
use shade_core::{
    derive::{self, be32, keccak256, TAG_ADDRESS, TAG_NULLIFIER, TAG_RECIPIENT},
    note::NoteSet,
    types::{left_pad32, Address, Secret, ADDRESS_LEN, HASH_LEN, MAX_NOTES, NOTE_SLOT_LEN,
        POW_TRAILING_BITS},
};

/// The fixed-capacity slot encoding the note-set commitment hashes over.
pub const NOTES_BUF_LEN: usize = MAX_NOTES * NOTE_SLOT_LEN;
/// Padded keccak buffer sizes for each derivation input.
const NOTES_PAD: usize = PAD_LEN(NOTES_BUF_LEN);
const TAGGED_PAD: usize = PAD_LEN(4 * HASH_LEN);
const PAIR_PAD: usize = PAD_LEN(2 * HASH_LEN);
const ADDR_PAD: usize = PAD_LEN(ADDRESS_LEN);

/// Witness of one claim: the secret material, the committed note set, the
/// claimed note and the account proof (leaf to root) for the derived
/// target address.
#[derive(Clone, Debug)]
pub struct ClaimCircuit<const DEPTH: usize, const NODE_LEN: usize> {
    secret: Secret,
    chain_id: u32,
    note_index: usize,
    slots: [[u8; NOTE_SLOT_LEN]; MAX_NOTES],
    recipient: Address,
    nodes: Vec<Vec<u8>>,
}

pub struct ClaimWires<const DEPTH: usize, const NODE_LEN: usize>
where
    [(); PAD_LEN(NODE_LEN)]:,
    [(); DEPTH - 1]:,
{
    secret: Array<Target, HASH_LEN>,
    chain_id: Target,
    note_index: Target,
    notes_buf: Array<Target, NOTES_PAD>,
    recipient: Array<Target, ADDRESS_LEN>,
    notes_kw: ByteKeccakWires<NOTES_PAD>,
    rc_kw: ByteKeccakWires<PAIR_PAD>,
    addr_kw: ByteKeccakWires<TAGGED_PAD>,
    key_kw: KeccakWires<ADDR_PAD>,
    null_kw: KeccakWires<TAGGED_PAD>,
    pow_kw: ByteKeccakWires<PAIR_PAD>,
    mpt_input: InputWires<DEPTH, NODE_LEN>,
    mpt_output: OutputWires<DEPTH, NODE_LEN>,
}

impl<const DEPTH: usize, const NODE_LEN: usize> ClaimCircuit<DEPTH, NODE_LEN>
where
    [(); PAD_LEN(NODE_LEN)]:,
    [(); DEPTH - 1]:,
{
    /// Builds the witness from a validated note set and the raw proof
    /// nodes as fetched, root first.
    pub fn new(
        secret: Secret,
        chain_id: u32,
        note_index: usize,
        notes: &NoteSet,
        proof_root_to_leaf: Vec<Vec<u8>>,
    ) -> Result<Self> {
        ensure!(
            note_index < notes.len(),
            "note index {} out of range for {} notes",
            note_index,
            notes.len()
        );
        let slots = derive::note_slots(notes);
        let recipient = notes.get(note_index).unwrap().recipient;
        let mut nodes = proof_root_to_leaf;
        nodes.reverse();
        Ok(Self {
            secret,
            chain_id,
            note_index,
            slots,
            recipient,
            nodes,
        })
    }

    pub fn build<F, const D: usize>(b: &mut CircuitBuilder<F, D>) -> ClaimWires<DEPTH, NODE_LEN>
    where
        F: RichField + Extendable<D>,
    {
        let zero = b.zero();
        let one = b.one();
        let tru = b._true();

        // --- witness material ---
        let secret = Array::<Target, HASH_LEN>::new(b);
        secret.assert_bytes(b);
        let chain_id = b.add_virtual_target();
        let note_index = b.add_virtual_target();
        let notes_buf = Array::<Target, NOTES_PAD>::new(b);
        notes_buf.assert_bytes(b);
        let recipient = Array::<Target, ADDRESS_LEN>::new(b);
        recipient.assert_bytes(b);

        // chain id as 4 big-endian bytes for the 32-byte tag encoding
        let chain_bits = num_to_bits(b, 32, chain_id);
        let chain_bytes: [Target; 4] =
            create_array(|j| bits_to_num(b, &chain_bits[8 * (3 - j)..8 * (4 - j)]));
        let chain_id32: Array<Target, HASH_LEN> = Array::from_array(create_array(|i| {
            if i < HASH_LEN - 4 {
                zero
            } else {
                chain_bytes[i - (HASH_LEN - 4)]
            }
        }));

        // --- notes commitment over the fixed-capacity slot buffer ---
        let notes_vec = VectorWire {
            arr: notes_buf.clone(),
            real_len: b.constant(F::from_canonical_usize(NOTES_BUF_LEN)),
        };
        let notes_kw = KeccakCircuit::<NOTES_PAD>::hash_to_bytes(b, &notes_vec);
        notes_kw.output.assert_bytes(b);
        let notes_commitment = notes_kw.output.clone();

        // --- target address = low 20 bytes of the tagged digest ---
        let tag_addr = constant_bytes(b, &TAG_ADDRESS);
        let addr_input = tag_addr
            .concat(&chain_id32)
            .concat(&secret)
            .concat(&notes_commitment);
        let addr_vec = pad_to_vector::<F, D, { 4 * HASH_LEN }, TAGGED_PAD>(b, addr_input);
        let addr_kw = KeccakCircuit::<TAGGED_PAD>::hash_to_bytes(b, &addr_vec);
        addr_kw.output.assert_bytes(b);
        let target_address: Array<Target, ADDRESS_LEN> = addr_kw.output.take_last();

        // --- trie key is the hash of the target address ---
        let key_vec = pad_to_vector::<F, D, ADDRESS_LEN, ADDR_PAD>(b, target_address);
        let key_kw = KeccakCircuit::<ADDR_PAD>::hash_vector(b, &key_vec);
        let mpt_key = MPTKeyWire::init_from_u32_targets(b, &key_kw.output_array);

        // --- account proof walk against that key ---
        let mpt_input = AccountProofCircuit::<DEPTH, NODE_LEN>::create_input_wires(b, Some(mpt_key));
        let mpt_output = AccountProofCircuit::<DEPTH, NODE_LEN>::verify_account_proof(b, &mpt_input);
        mpt_input.nodes.iter().for_each(|n| n.assert_bytes(b));

        // --- balance must cover the aggregate of all committed amounts ---
        let account = decode_account_balance(b, &mpt_output.leaf_value);
        let mut total = UInt256Target::zero(b);
        for i in 0..MAX_NOTES {
            let amount_bytes: Array<Target, HASH_LEN> =
                Array::from_array(create_array(|j| notes_buf.arr[i * NOTE_SLOT_LEN + j]));
            let amount = UInt256Target::from_be_bytes(b, &amount_bytes);
            let (new_total, carry) = total.add(b, &amount);
            // the committed aggregate never overflows 256 bits
            b.connect(carry.0, zero);
            total = new_total;
        }
        let covered = total.is_less_or_equal(b, &account.balance);
        b.connect(covered.target, tru.target);

        // --- bind the claimed note to its slot ---
        // exactly one slot matches the claimed index, which also range
        // checks the index against the note capacity
        let mut index_hits = zero;
        let mut amount_sel = [zero; HASH_LEN];
        let mut commitment_sel = [zero; HASH_LEN];
        for i in 0..MAX_NOTES {
            let it = b.constant(F::from_canonical_usize(i));
            let hit = b.is_equal(note_index, it);
            index_hits = b.add(index_hits, hit.target);
            for j in 0..HASH_LEN {
                amount_sel[j] =
                    b.mul_add(hit.target, notes_buf.arr[i * NOTE_SLOT_LEN + j], amount_sel[j]);
                commitment_sel[j] = b.mul_add(
                    hit.target,
                    notes_buf.arr[i * NOTE_SLOT_LEN + HASH_LEN + j],
                    commitment_sel[j],
                );
            }
        }
        b.connect(index_hits, one);
        let claimed_amount_bytes: Array<Target, HASH_LEN> = Array::from_array(amount_sel);
        let claimed_amount = UInt256Target::from_be_bytes(b, &claimed_amount_bytes);

        // the revealed recipient must hash to the committed slot value
        let tag_rc = constant_bytes(b, &TAG_RECIPIENT);
        let padded_recipient: Array<Target, HASH_LEN> = Array::from_array(create_array(|i| {
            if i < HASH_LEN - ADDRESS_LEN {
                zero
            } else {
                recipient.arr[i - (HASH_LEN - ADDRESS_LEN)]
            }
        }));
        let rc_input = tag_rc.concat(&padded_recipient);
        let rc_vec = pad_to_vector::<F, D, { 2 * HASH_LEN }, PAIR_PAD>(b, rc_input);
        let rc_kw = KeccakCircuit::<PAIR_PAD>::hash_to_bytes(b, &rc_vec);
        rc_kw.output.assert_bytes(b);
        rc_kw
            .output
            .enforce_equal(b, &Array::from_array(commitment_sel));

        // --- nullifier for the claimed index ---
        let tag_null = constant_bytes(b, &TAG_NULLIFIER);
        let index32: Array<Target, HASH_LEN> = Array::from_array(create_array(|i| {
            if i == HASH_LEN - 1 {
                note_index
            } else {
                zero
            }
        }));
        let null_input = tag_null
            .concat(&chain_id32)
            .concat(&secret)
            .concat(&index32);
        let null_vec = pad_to_vector::<F, D, { 4 * HASH_LEN }, TAGGED_PAD>(b, null_input);
        let null_kw = KeccakCircuit::<TAGGED_PAD>::hash_vector(b, &null_vec);

        // --- proof-of-work gate ---
        let pow_input = notes_commitment.concat(&secret);
        let pow_vec = pad_to_vector::<F, D, { 2 * HASH_LEN }, PAIR_PAD>(b, pow_input);
        let pow_kw = KeccakCircuit::<PAIR_PAD>::hash_to_bytes(b, &pow_vec);
        pow_kw.output.assert_bytes(b);
        enforce_trailing_zero_bits(b, &pow_kw.output, POW_TRAILING_BITS);
        let pow_packed = pow_kw.output.convert_u8_to_u32(b);

        // --- public values, in the pinned order ---
        let recipient_packed: Array<U32Target, PACKED_ADDRESS_LEN> =
            recipient.convert_u8_to_u32(b);
        PublicInputs::register(
            b,
            &mpt_output.root,
            chain_id,
            note_index,
            &claimed_amount,
            &recipient_packed,
            &null_kw.output_array,
            &pow_packed,
        );

        ClaimWires {
            secret,
            chain_id,
            note_index,
            notes_buf,
            recipient,
            notes_kw,
            rc_kw,
            addr_kw,
            key_kw,
            null_kw,
            pow_kw,
            mpt_input,
            mpt_output,
        }
    }

    pub fn assign<F: RichField + Extendable<D>, const D: usize>(
        &self,
        pw: &mut PartialWitness<F>,
        wires: &ClaimWires<DEPTH, NODE_LEN>,
    ) -> Result<()> {
        wires.secret.assign_bytes(pw, &self.secret);
        pw.set_target(wires.chain_id, F::from_canonical_u32(self.chain_id));
        pw.set_target(wires.note_index, F::from_canonical_usize(self.note_index));

        let mut notes_bytes = [0u8; NOTES_PAD];
        for (i, slot) in self.slots.iter().enumerate() {
            notes_bytes[i * NOTE_SLOT_LEN..(i + 1) * NOTE_SLOT_LEN].copy_from_slice(slot);
        }
        wires.notes_buf.assign_bytes(pw, &notes_bytes);
        wires.recipient.assign_bytes(pw, &self.recipient);

        // recompute every derivation procedurally; the circuit must agree
        let notes_commitment = keccak256(&notes_bytes[..NOTES_BUF_LEN]);
        let chain_id32 = be32(self.chain_id as u64);
        let addr_input = [
            TAG_ADDRESS.as_slice(),
            &chain_id32,
            &self.secret,
            &notes_commitment,
        ]
        .concat();
        let target_address = &keccak256(&addr_input)[HASH_LEN - ADDRESS_LEN..];
        let rc_input = [TAG_RECIPIENT.as_slice(), &left_pad32(&self.recipient)].concat();
        let null_input = [
            TAG_NULLIFIER.as_slice(),
            &chain_id32,
            &self.secret,
            &be32(self.note_index as u64),
        ]
        .concat();
        let pow_input = [notes_commitment.as_slice(), &self.secret].concat();

        KeccakCircuit::<NOTES_PAD>::assign_byte_keccak_fixed_len(
            pw,
            &wires.notes_kw,
            &notes_bytes[..NOTES_BUF_LEN],
        );
        KeccakCircuit::<PAIR_PAD>::assign_byte_keccak_fixed_len(pw, &wires.rc_kw, &rc_input);
        KeccakCircuit::<TAGGED_PAD>::assign_byte_keccak_fixed_len(pw, &wires.addr_kw, &addr_input);
        KeccakCircuit::<ADDR_PAD>::assign_fixed_len(pw, &wires.key_kw, ADDRESS_LEN);
        KeccakCircuit::<TAGGED_PAD>::assign_fixed_len(pw, &wires.null_kw, null_input.len());
        KeccakCircuit::<PAIR_PAD>::assign_byte_keccak_fixed_len(pw, &wires.pow_kw, &pow_input);

        let key = keccak256(target_address);
        let mpt_circuit = AccountProofCircuit::<DEPTH, NODE_LEN>::new(key, self.nodes.clone());
        mpt_circuit.assign_wires(pw, &wires.mpt_input, &wires.mpt_output)
    }
}

/// The circuit view of a constant byte string.
fn constant_bytes<F: RichField + Extendable<D>, const D: usize, const N: usize>(
    b: &mut CircuitBuilder<F, D>,
    bytes: &[u8; N],
) -> Array<Target, N> {
    Array::from_array(create_array(|i| {
        b.constant(F::from_canonical_u8(bytes[i]))
    }))
}

/// Widens a fixed-length input to its keccak-padded buffer, with a
/// constant real length.
fn pad_to_vector<
    F: RichField + Extendable<D>,
    const D: usize,
    const LEN: usize,
    const PADDED: usize,
>(
    b: &mut CircuitBuilder<F, D>,
    input: Array<Target, LEN>,
) -> VectorWire<Target, PADDED> {
    let zero = b.zero();
    VectorWire {
        arr: Array::from_array(create_array(|i| {
            if i < LEN {
                input.arr[i]
            } else {
                zero
            }
        })),
        real_len: b.constant(F::from_canonical_usize(LEN)),
    }
}

/// Enforces the digest's low-order `bits` to be zero, starting from its
/// last byte.
fn enforce_trailing_zero_bits<F: RichField + Extendable<D>, const D: usize>(
    b: &mut CircuitBuilder<F, D>,
    digest: &Array<Target, HASH_LEN>,
    bits: usize,
) {
    let zero = b.zero();
    let mut remaining = bits;
    let mut i = HASH_LEN;
    while remaining >= 8 {
        i -= 1;
        b.connect(digest.arr[i], zero);
        remaining -= 8;
    }
    if remaining > 0 {
        let low = num_to_bits(b, 8, digest.arr[i - 1]);
        for bit in low.iter().take(remaining) {
            b.connect(bit.target, zero);
        }
    }
}
