//! In-circuit keccak256 over fixed-capacity byte vectors. The hash gadget
//! itself comes from plonky2_crypto; this wrapper computes the padding in
//! circuit so the same circuit shape serves any input length up to the
//! buffer capacity.

use anyhow::{ensure, Result};
use plonky2::{
    field::extension::Extendable,
    hash::hash_types::RichField,
    iop::{
        target::Target,
        witness::{PartialWitness, WitnessWrite},
    },
    plonk::circuit_builder::CircuitBuilder,
    util::ceil_div_usize,
};
use plonky2_crypto::{
    biguint::BigUintTarget,
    hash::{
        keccak256::{CircuitBuilderHashKeccak, KECCAK256_R},
        HashInputTarget,
    },
    u32::arithmetic_u32::U32Target,
};

use crate::{
    array::{Array, Vector, VectorWire},
    utils::{convert_u8_targets_to_u32, less_than},
};
use shade_core::derive::keccak256;

/// Length of a hash in bytes.
pub const HASH_LEN: usize = 32;
/// Length of a hash in u32 limbs.
pub const PACKED_HASH_LEN: usize = HASH_LEN / 4;

/// Keccak pads data before hashing it. This returns the full size of the
/// padded data, which is the number of wires a fixed input buffer needs.
pub const fn compute_size_with_padding(data_len: usize) -> usize {
    let input_len_bits = data_len * 8;
    let num_actual_blocks = 1 + input_len_bits / KECCAK256_R;
    let padded_len_bits = num_actual_blocks * KECCAK256_R;
    ceil_div_usize(padded_len_bits, 8)
}

/// Only the amount of padding applied on top of the data.
pub const fn compute_padding_size(data_len: usize) -> usize {
    compute_size_with_padding(data_len) - data_len
}

/// Shorthand for the padded buffer size of a `d`-byte input.
#[allow(non_snake_case)]
pub const fn PAD_LEN(d: usize) -> usize {
    compute_size_with_padding(d)
}

/// The output of the hash function packed into 32-bit limbs.
pub type OutputHash = Array<U32Target, PACKED_HASH_LEN>;

/// The output of the hash function in byte representation.
pub type OutputByteHash = Array<Target, HASH_LEN>;

/// Circuit able to hash any array of bytes of dynamic size, as long as its
/// padded length fits in N bytes.
#[derive(Clone, Debug)]
pub struct KeccakCircuit<const N: usize> {
    data: Vec<u8>,
}

/// Wires containing the output of the hash function as well as the
/// intermediate wires created. The padding difference needs assigning at
/// proving time because it is computed outside the circuit from the real
/// input length.
#[derive(Clone, Debug)]
pub struct KeccakWires<const N: usize> {
    input_array: VectorWire<Target, N>,
    diff: Target,
    pub output_array: OutputHash,
}

/// Same as [`KeccakWires`] with the output additionally exposed as bytes.
#[derive(Clone, Debug)]
pub struct ByteKeccakWires<const N: usize> {
    keccak: KeccakWires<N>,
    pub output: OutputByteHash,
}

impl<const N: usize> KeccakCircuit<N> {
    pub fn new(data: Vec<u8>) -> Result<Self> {
        let total = compute_size_with_padding(data.len());
        ensure!(
            total <= N,
            "{} bytes can't fit in {} bytes with padding (data len {})",
            total,
            N,
            data.len(),
        );
        ensure!(
            N % 4 == 0,
            "fixed array size must be 0 mod 4 for conversion with u32"
        );
        Ok(Self { data })
    }

    /// Takes an array which is already at the right padded length. The
    /// circuit fills the padding part and hashes it.
    pub fn hash_vector<F: RichField + Extendable<D>, const D: usize>(
        b: &mut CircuitBuilder<F, D>,
        a: &VectorWire<Target, N>,
    ) -> KeccakWires<N> {
        let diff_target = b.add_virtual_target();
        let end_padding = b.add(a.real_len, diff_target);
        let one = b.one();
        let end_padding = b.sub(end_padding, one); // inclusive range
        let single_pad = b.constant(F::from_canonical_usize(0x81)); // 1000 0001
        let begin_pad = b.constant(F::from_canonical_usize(0x01)); // 0000 0001
        let end_pad = b.constant(F::from_canonical_usize(0x80)); // 1000 0000
        let padded_node = a
            .arr
            .arr
            .iter()
            .enumerate()
            .map(|(i, byte)| {
                let i_target = b.constant(F::from_canonical_usize(i));
                // condition if we are within the data range ==> i < length
                let is_data = less_than(b, i_target, a.real_len, 32);
                // condition if we start the padding ==> i == length
                let is_start_padding = b.is_equal(i_target, a.real_len);
                // condition if we are done with the padding ==> i == length + diff - 1
                let is_end_padding = b.is_equal(i_target, end_padding);
                // condition if we only need to add one byte 1000 0001 to pad
                // i == length == length + diff - 1
                let is_start_and_end = b.and(is_start_padding, is_end_padding);

                // if the prover gave a wrong byte, the resulting hash would
                // not match whatever it is checked against
                let item_data = b.mul(is_data.target, *byte);
                let item_start_padding = b.mul(is_start_padding.target, begin_pad);
                let item_end_padding = b.mul(is_end_padding.target, end_pad);
                let item_start_and_end = b.mul(is_start_and_end.target, single_pad);
                // if all conditions are false the item is 0x00, the padding
                let mut item = item_data;
                item = b.add(item, item_start_padding);
                item = b.add(item, item_end_padding);
                item = b.add(item, item_start_and_end);
                item
            })
            .collect::<Vec<_>>();

        // convert padded node to u32
        let node_u32_target: Vec<U32Target> = convert_u8_targets_to_u32(b, &padded_node);

        // fixed size block delimitation: each bool tells the hash gadget
        // whether to update its state for this block
        let rate_bytes = b.constant(F::from_canonical_usize(KECCAK256_R / 8));
        let end_padding_offset = b.add(end_padding, one);
        let nb_blocks = b.div(end_padding_offset, rate_bytes);
        // - 1 because keccak always takes the first block
        let nb_actual_blocks = b.sub(nb_blocks, one);
        let total_num_blocks = N / (KECCAK256_R / 8) - 1;
        let blocks = (0..total_num_blocks)
            .map(|i| {
                let i_target = b.constant(F::from_canonical_usize(i));
                less_than(b, i_target, nb_actual_blocks, 8)
            })
            .collect::<Vec<_>>();

        let hash_target = HashInputTarget {
            input: BigUintTarget {
                limbs: node_u32_target,
            },
            input_bits: 0,
            blocks,
        };

        let hash_output = b.hash_keccak256(&hash_target);
        KeccakWires {
            input_array: a.clone(),
            diff: diff_target,
            output_array: OutputHash::try_from(hash_output.limbs).unwrap(),
        }
    }

    /// Hashes the vector and exposes the output as bytes, for when the
    /// digest feeds a subsequent hash or a byte-position comparison.
    /// WARNING: if the output is compared against untrusted bytes, the
    /// caller must range check those bytes.
    pub fn hash_to_bytes<F: RichField + Extendable<D>, const D: usize>(
        b: &mut CircuitBuilder<F, D>,
        a: &VectorWire<Target, N>,
    ) -> ByteKeccakWires<N>
    where
        [(); L32(HASH_LEN)]:,
    {
        let tru = b._true();
        let wires = Self::hash_vector(b, a);
        let hash_bytes = Array::<Target, HASH_LEN>::new(b);
        let packed_hash = hash_bytes.convert_u8_to_u32(b);
        let t = packed_hash.equals(b, &wires.output_array);
        b.connect(tru.target, t.target);
        ByteKeccakWires::<N> {
            keccak: wires,
            output: hash_bytes,
        }
    }

    /// The input data is usually assigned elsewhere in the circuits; only
    /// the padding difference always needs assigning here. Computing it off
    /// circuit is sound because a tweaked length gives an invalid digest.
    pub fn assign<F: RichField>(
        pw: &mut PartialWitness<F>,
        wires: &KeccakWires<N>,
        data: &InputData<u8, N>,
    ) {
        if let InputData::NonAssigned(vector) = data {
            wires.input_array.assign(pw, vector);
        }
        let diff = compute_padding_size(data.real_len());
        pw.set_target(wires.diff, F::from_canonical_usize(diff));
    }

    /// Padding assignment for inputs whose length is a circuit constant.
    pub fn assign_fixed_len<F: RichField>(pw: &mut PartialWitness<F>, wires: &KeccakWires<N>, len: usize) {
        pw.set_target(
            wires.diff,
            F::from_canonical_usize(compute_padding_size(len)),
        );
    }

    pub fn assign_byte_keccak<F: RichField>(
        pw: &mut PartialWitness<F>,
        wires: &ByteKeccakWires<N>,
        data: &InputData<u8, N>,
    ) {
        Self::assign(pw, &wires.keccak, data);
        let expected_hash = match data {
            InputData::Assigned(a) => keccak256(&a.arr[0..a.real_len]),
            InputData::NonAssigned(a) => keccak256(&a.arr[0..a.real_len]),
        };
        wires.output.assign_bytes(pw, &expected_hash);
    }

    /// Byte-output assignment for fixed-length inputs: the expected digest
    /// is recomputed from the data that was assigned elsewhere.
    pub fn assign_byte_keccak_fixed_len<F: RichField>(
        pw: &mut PartialWitness<F>,
        wires: &ByteKeccakWires<N>,
        data: &[u8],
    ) {
        Self::assign_fixed_len(pw, &wires.keccak, data.len());
        wires.output.assign_bytes(pw, &keccak256(data));
    }
}

/// InputData holds the information if the input data wire is already
/// assigned or not. In most cases the input data is assigned in other
/// places of the circuits; for standalone hashing it is assigned here.
pub enum InputData<'a, F, const N: usize> {
    Assigned(&'a Vector<F, N>),
    NonAssigned(&'a Vector<F, N>),
}

impl<F, const N: usize> InputData<'_, F, N> {
    pub fn real_len(&self) -> usize {
        match self {
            InputData::Assigned(v) => v.real_len,
            InputData::NonAssigned(v) => v.real_len,
        }
    }
}
