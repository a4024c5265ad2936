//! Sequential in-circuit verification of an account proof. The circuit
//! walks the layers leaf to root, hashing each node and checking that the
//! parent references it, while consuming the 64-nibble address-hash path
//! backwards. The procedural mirror walking root to leaf lives in
//! `shade_core::mpt`; both must accept and reject the same proofs.

use crate::{
    array::{Array, Vector, VectorWire},
    keccak::{InputData, KeccakCircuit, KeccakWires, OutputHash, HASH_LEN, PACKED_HASH_LEN, PAD_LEN},
    rlp::{
        decode_compact_encoding, decode_fixed_list, RlpHeader, RlpList, MAX_ITEMS_IN_LIST,
        MAX_KEY_NIBBLE_LEN,
    },
    utils::{convert_u8_targets_to_u32, find_index_subvector, less_than},
};
use anyhow::{anyhow, Result};
use core::array::from_fn as create_array;
use plonky2::{
    field::extension::Extendable,
    hash::hash_types::RichField,
    iop::{
        target::{BoolTarget, Target},
        witness::{PartialWitness, WitnessWrite},
    },
    plonk::circuit_builder::CircuitBuilder,
};
use plonky2_crypto::u32::arithmetic_u32::U32Target;
use shade_core::{
    derive::keccak256,
    nibbles::bytes_to_nibbles,
    types::MAX_ACCOUNT_VALUE_LEN,
};

/// An inlined child node is at most a few bytes longer than a hash
/// reference; this bounds the byte window compared for embedded children.
const MAX_EMBEDDED_LEN: usize = 36;

/// Circuit proving the inclusion of an account record inside a state trie.
/// * DEPTH is the maximal depth of the trie; shorter proofs continue over
///   "imaginary" nodes that are masked out.
/// * NODE_LEN is the maximal length of a node. Since nodes are hashed with
///   keccak, the allocated buffers are larger to fit the padding.
#[derive(Clone, Debug)]
pub struct AccountProofCircuit<const DEPTH: usize, const NODE_LEN: usize> {
    /// proof nodes ordered from leaf to root
    nodes: Vec<Vec<u8>>,
    /// the full 32-byte key (hash of the target address); the circuit works
    /// over its nibble expansion
    key: [u8; MAX_KEY_NIBBLE_LEN / 2],
}

pub struct InputWires<const DEPTH: usize, const NODE_LEN: usize>
where
    [(); PAD_LEN(NODE_LEN)]:,
    [(); DEPTH - 1]:,
{
    pub key: MPTKeyWire,
    /// buffers sized for the padded maximum node length; the real length of
    /// each node rides along in the vector wire
    pub nodes: [VectorWire<Target, { PAD_LEN(NODE_LEN) }>; DEPTH],
    /// for proofs shorter than DEPTH, the tail of the path is disabled; the
    /// boolean for node i of the path lives at index i-1
    should_process: [BoolTarget; DEPTH - 1],
}

pub struct OutputWires<const DEPTH: usize, const NODE_LEN: usize>
where
    [(); PAD_LEN(NODE_LEN)]:,
    [(); DEPTH - 1]:,
{
    /// kept because keccak assigns additional wires per input
    keccak_wires: [KeccakWires<{ PAD_LEN(NODE_LEN) }>; DEPTH],
    /// the account record held in the leaf, provably extracted
    pub leaf_value: VectorWire<Target, MAX_ACCOUNT_VALUE_LEN>,
    /// the hash of the last processed layer, i.e. the root commitment
    pub root: OutputHash,
}

impl<const DEPTH: usize, const NODE_LEN: usize> AccountProofCircuit<DEPTH, NODE_LEN>
where
    [(); PAD_LEN(NODE_LEN)]:,
    [(); DEPTH - 1]:,
{
    pub fn new(key: [u8; MAX_KEY_NIBBLE_LEN / 2], proof: Vec<Vec<u8>>) -> Self {
        Self { nodes: proof, key }
    }

    pub fn create_input_wires<F, const D: usize>(
        b: &mut CircuitBuilder<F, D>,
        key: Option<MPTKeyWire>,
    ) -> InputWires<DEPTH, NODE_LEN>
    where
        F: RichField + Extendable<D>,
    {
        // the initial pointer sits at the last nibble of the key
        let key = key.unwrap_or_else(|| MPTKeyWire {
            key: Array::<Target, MAX_KEY_NIBBLE_LEN>::new(b),
            pointer: b.constant(F::from_canonical_usize(MAX_KEY_NIBBLE_LEN) - F::ONE),
        });
        let should_process: [BoolTarget; DEPTH - 1] =
            create_array(|_| b.add_virtual_bool_target_safe());
        // nodes are ordered from leaf to root and padded at the end
        let nodes: [VectorWire<Target, _>; DEPTH] =
            create_array(|_| VectorWire::<Target, { PAD_LEN(NODE_LEN) }>::new(b));
        InputWires {
            key,
            nodes,
            should_process,
        }
    }

    /// Builds the sequential walk. The caller is responsible for range
    /// checking the node bytes (`assert_bytes` on each node wire).
    pub fn verify_account_proof<F, const D: usize>(
        b: &mut CircuitBuilder<F, D>,
        inputs: &InputWires<DEPTH, NODE_LEN>,
    ) -> OutputWires<DEPTH, NODE_LEN>
    where
        F: RichField + Extendable<D>,
    {
        let zero = b.zero();
        let t = b._true();
        // --- leaf layer ---
        // 1. hash the leaf
        // 2. decode it as a 2-item node whose key segment flags a leaf
        // 3. extract the value and advance the key pointer
        let leaf_hash = KeccakCircuit::<{ PAD_LEN(NODE_LEN) }>::hash_vector(b, &inputs.nodes[0]);
        let leaf_headers =
            decode_fixed_list::<_, _, MAX_ITEMS_IN_LIST>(b, &inputs.nodes[0].arr.arr, zero);
        let leaf_step = Self::advance_key_leaf_or_extension::<
            F,
            D,
            MAX_ITEMS_IN_LIST,
            MAX_ACCOUNT_VALUE_LEN,
        >(b, &inputs.nodes[0].arr, &inputs.key, &leaf_headers);
        let leaf_ok = b.and(leaf_step.is_tuple, leaf_step.is_leaf);
        b.connect(t.target, leaf_ok.target);
        let mut iterative_key = leaf_step.new_key;
        let leaf_value = leaf_step.child.clone();
        let mut last_hash_output = leaf_hash.output_array.clone();
        let mut keccak_wires = vec![leaf_hash];

        // --- intermediate layers ---
        // 1. decode the node as branch or extension
        // 2. advance the key pointer accordingly
        // 3. check the selected child reference designates the previous
        //    layer, by hash or by inlined bytes
        // 4. hash the node and iterate
        for i in 1..DEPTH {
            let is_real = inputs.should_process[i - 1];
            let (new_key, child_item, valid_node) =
                Self::advance_key(b, &inputs.nodes[i].arr, &iterative_key);

            // a reference of exactly 32 string bytes links by hash, any
            // other reference must be the child node inlined verbatim
            let thirty_two = b.constant(F::from_canonical_usize(HASH_LEN));
            let len_is_hash = b.is_equal(child_item.len, thirty_two);
            let is_string = b.is_equal(child_item.data_type, zero);
            let is_hash_ref = b.and(len_is_hash, is_string);

            let extracted_child_hash = inputs.nodes[i]
                .arr
                .extract_array::<F, D, HASH_LEN>(b, child_item.offset);
            let extracted_hash_u32 = convert_u8_targets_to_u32(b, &extracted_child_hash.arr);
            let hash_ok = last_hash_output.equals(
                b,
                &Array::<U32Target, PACKED_HASH_LEN> {
                    arr: extracted_hash_u32.try_into().unwrap(),
                },
            );
            let embedded_ok =
                Self::embedded_child_equals(b, &inputs.nodes[i].arr, &child_item, &inputs.nodes[i - 1]);
            let child_ok = b.select(is_hash_ref, hash_ok.target, embedded_ok.target);
            let child_ok = BoolTarget::new_unsafe(child_ok);

            // all conditions must hold when processing a real node; masked
            // layers must never fail the circuit
            let cond = b.and(valid_node, child_ok);
            let is_parent = b.select(is_real, cond.target, t.target);
            b.connect(is_parent, t.target);

            let hash_wires =
                KeccakCircuit::<{ PAD_LEN(NODE_LEN) }>::hash_vector(b, &inputs.nodes[i]);
            last_hash_output = hash_wires.output_array.select(b, is_real, &last_hash_output);
            iterative_key = new_key.select(b, is_real, &iterative_key);
            keccak_wires.push(hash_wires);
        }
        // the walk must consume the full 64-nibble path exactly: a leaf
        // terminating early or late leaves the pointer off -1
        let mone = b.constant(F::NEG_ONE);
        b.connect(iterative_key.pointer, mone);

        OutputWires {
            keccak_wires: keccak_wires.try_into().unwrap(),
            leaf_value,
            root: last_hash_output,
        }
    }

    /// Advances the key through one node that is either a branch or an
    /// extension, returning the new key, the selected child item and the
    /// condition that must hold for the node to be valid.
    pub(crate) fn advance_key<F: RichField + Extendable<D>, const D: usize>(
        b: &mut CircuitBuilder<F, D>,
        node: &Array<Target, { PAD_LEN(NODE_LEN) }>,
        key: &MPTKeyWire,
    ) -> (MPTKeyWire, RlpHeader, BoolTarget) {
        let zero = b.zero();
        // decode as a list of up to 17 items: 17 ==> branch node,
        // 2 ==> extension (a leaf cannot appear above the terminal layer)
        let rlp_headers = decode_fixed_list::<F, D, MAX_ITEMS_IN_LIST>(b, &node.arr, zero);
        // the value window is irrelevant above the leaf, a hash-sized one
        // keeps the extraction small
        let tuple_step = Self::advance_key_leaf_or_extension::<F, D, MAX_ITEMS_IN_LIST, HASH_LEN>(
            b,
            node,
            key,
            &rlp_headers,
        );
        let (branch_key, branch_child, branch_ok) =
            Self::advance_key_branch(b, node, key, &rlp_headers);

        // above the leaf, a 2-item node must be an extension
        let not_leaf = b.not(tuple_step.is_leaf);
        let ext_ok = b.and(tuple_step.is_tuple, not_leaf);
        let valid_node = b.or(ext_ok, branch_ok);

        // select between the two interpretations; an invalid node fails the
        // hash link anyway
        let child = RlpHeader {
            start: b.select(tuple_step.is_tuple, tuple_step.child_item.start, branch_child.start),
            offset: b.select(
                tuple_step.is_tuple,
                tuple_step.child_item.offset,
                branch_child.offset,
            ),
            len: b.select(tuple_step.is_tuple, tuple_step.child_item.len, branch_child.len),
            data_type: b.select(
                tuple_step.is_tuple,
                tuple_step.child_item.data_type,
                branch_child.data_type,
            ),
        };
        let new_key = tuple_step.new_key.select(b, tuple_step.is_tuple, &branch_key);
        (new_key, child, valid_node)
    }

    /// Branch interpretation: select the child slot indexed by the current
    /// key nibble and advance the pointer by one.
    pub(crate) fn advance_key_branch<F: RichField + Extendable<D>, const D: usize>(
        b: &mut CircuitBuilder<F, D>,
        _node: &Array<Target, { PAD_LEN(NODE_LEN) }>,
        key: &MPTKeyWire,
        rlp_headers: &RlpList<MAX_ITEMS_IN_LIST>,
    ) -> (MPTKeyWire, RlpHeader, BoolTarget) {
        let one = b.one();
        let seventeen = b.constant(F::from_canonical_usize(MAX_ITEMS_IN_LIST));
        let branch_condition = b.is_equal(seventeen, rlp_headers.num_fields);

        // the key and pointer come from the verifier, no need to check the
        // nibble itself
        let nibble = key.current_nibble(b);
        let new_key = key.advance_by(b, one);
        let child = rlp_headers.select(b, nibble);
        (new_key, child, branch_condition)
    }

    /// Leaf-or-extension interpretation: decode the first item as a compact
    /// key segment, check it against the expected slice of the full key and
    /// advance the pointer past it.
    pub(crate) fn advance_key_leaf_or_extension<
        F: RichField + Extendable<D>,
        const D: usize,
        const LIST_LEN: usize,
        // in case of a leaf the value is a whole account record, in case of
        // an extension it is a 32-byte hash
        const VALUE_LEN: usize,
    >(
        b: &mut CircuitBuilder<F, D>,
        node: &Array<Target, { PAD_LEN(NODE_LEN) }>,
        key: &MPTKeyWire,
        rlp_headers: &RlpList<LIST_LEN>,
    ) -> LeafOrExtensionStep<VALUE_LEN> {
        let one = b.one();
        let two = b.two();
        let is_tuple = b.is_equal(rlp_headers.num_fields, two);
        let key_header = RlpHeader {
            start: rlp_headers.start[0],
            offset: rlp_headers.offset[0],
            len: rlp_headers.len[0],
            data_type: rlp_headers.data_type[0],
        };
        let path = decode_compact_encoding(b, node, &key_header);
        let child_item = RlpHeader {
            start: rlp_headers.start[1],
            offset: rlp_headers.offset[1],
            len: rlp_headers.len[1],
            data_type: rlp_headers.data_type[1],
        };
        let child: Array<Target, VALUE_LEN> = node.extract_array(b, child_item.offset);
        let new_key = key.advance_by(b, path.nibbles.real_len);

        // the decoded segment must equal the slice of the full key it
        // covers, which ends at the previous pointer (the walk goes
        // backwards)
        let seg_start = b.add(new_key.pointer, one);
        let mut seg_ok = b._true();
        for i in 0..MAX_KEY_NIBBLE_LEN {
            let it = b.constant(F::from_canonical_usize(i));
            let within = less_than(b, it, path.nibbles.real_len, 7);
            let idx = b.add(seg_start, it);
            // masked to index 0 outside the segment to keep lookups in range
            let idx = b.mul(within.target, idx);
            let expected = key.key.value_at(b, idx);
            let eq = b.is_equal(expected, path.nibbles.arr[i]);
            let outside = b.not(within);
            let ok = b.or(eq, outside);
            seg_ok = b.and(seg_ok, ok);
        }
        let is_tuple = b.and(is_tuple, path.condition);
        let is_tuple = b.and(is_tuple, seg_ok);

        LeafOrExtensionStep {
            new_key,
            child: child.into_vec(child_item.len),
            child_item,
            is_tuple,
            is_leaf: path.is_leaf,
        }
    }

    /// Compares the full span of an item (header included) against the raw
    /// bytes of the child layer, for inlined children.
    fn embedded_child_equals<F: RichField + Extendable<D>, const D: usize>(
        b: &mut CircuitBuilder<F, D>,
        parent: &Array<Target, { PAD_LEN(NODE_LEN) }>,
        item: &RlpHeader,
        child: &VectorWire<Target, { PAD_LEN(NODE_LEN) }>,
    ) -> BoolTarget {
        let header_len = b.sub(item.offset, item.start);
        let span_len = b.add(header_len, item.len);
        let mut ok = b.is_equal(span_len, child.real_len);
        for j in 0..MAX_EMBEDDED_LEN {
            let jt = b.constant(F::from_canonical_usize(j));
            let within = less_than(b, jt, span_len, 7);
            let idx = b.add(item.start, jt);
            let parent_byte = parent.value_at(b, idx);
            let eq = b.is_equal(parent_byte, child.arr.arr[j]);
            let outside = b.not(within);
            let byte_ok = b.or(eq, outside);
            ok = b.and(ok, byte_ok);
        }
        ok
    }

    /// Assigns the nodes to the wires. The output wires are needed as well
    /// because the keccak gadget requires special assignment from the raw
    /// vectors.
    pub fn assign_wires<F: RichField + Extendable<D>, const D: usize>(
        &self,
        p: &mut PartialWitness<F>,
        inputs: &InputWires<DEPTH, NODE_LEN>,
        outputs: &OutputWires<DEPTH, NODE_LEN>,
    ) -> Result<()> {
        let pad_len = DEPTH.checked_sub(self.nodes.len()).ok_or(anyhow!(
            "circuit depth {} too small for this account proof of {} layers",
            DEPTH,
            self.nodes.len()
        ))?;
        let padded_nodes = self
            .nodes
            .iter()
            .map(|n| Vector::<u8, { PAD_LEN(NODE_LEN) }>::from_vec(n))
            .chain((0..pad_len).map(|_| Ok(Vector::<u8, { PAD_LEN(NODE_LEN) }>::empty())))
            .collect::<Result<Vec<_>>>()?;
        for (i, (wire, node)) in inputs.nodes.iter().zip(padded_nodes.iter()).enumerate() {
            wire.assign(p, node);
            KeccakCircuit::<{ PAD_LEN(NODE_LEN) }>::assign(
                p,
                &outputs.keccak_wires[i],
                // the node data is assigned above, keccak only needs its
                // internal padding wire
                &InputData::Assigned(node),
            );
        }
        // mark the real layers and make sure each parent references its
        // child, to fail here rather than in the proving output
        for i in 1..DEPTH {
            if i < self.nodes.len() {
                p.set_bool_target(inputs.should_process[i - 1], true);
                let child_hash = keccak256(&self.nodes[i - 1]);
                if find_index_subvector(&self.nodes[i], &child_hash).is_none()
                    && find_index_subvector(&self.nodes[i], &self.nodes[i - 1]).is_none()
                {
                    return Err(anyhow!("can't find child reference in parent node"));
                }
            } else {
                p.set_bool_target(inputs.should_process[i - 1], false);
            }
        }
        let full_key_nibbles = bytes_to_nibbles(&self.key);
        inputs.key.key.assign(
            p,
            &create_array(|i| F::from_canonical_u8(full_key_nibbles[i])),
        );
        Ok(())
    }
}

/// One decoded leaf-or-extension step.
pub(crate) struct LeafOrExtensionStep<const VALUE_LEN: usize> {
    pub new_key: MPTKeyWire,
    pub child: VectorWire<Target, VALUE_LEN>,
    pub child_item: RlpHeader,
    pub is_tuple: BoolTarget,
    pub is_leaf: BoolTarget,
}

/// A running pointer over the portion of the key the circuit has already
/// proven. The pointer goes backwards because the walk starts at the leaf;
/// it must equal -1 once the root is reached.
#[derive(Clone, Debug)]
pub struct MPTKeyWire {
    /// the full key of the account being looked up, in nibbles
    pub key: Array<Target, MAX_KEY_NIBBLE_LEN>,
    pub pointer: Target,
}

impl MPTKeyWire {
    pub fn current_nibble<F: RichField + Extendable<D>, const D: usize>(
        &self,
        b: &mut CircuitBuilder<F, D>,
    ) -> Target {
        self.key.value_at(b, self.pointer)
    }

    /// Moves the pointer backwards by `len` nibbles.
    pub fn advance_by<F: RichField + Extendable<D>, const D: usize>(
        &self,
        b: &mut CircuitBuilder<F, D>,
        len: Target,
    ) -> Self {
        Self {
            key: self.key.clone(),
            pointer: b.sub(self.pointer, len),
        }
    }

    /// Returns self if condition is true, otherwise other. The keys are
    /// expected to be the same wires; only the pointer is selected.
    pub fn select<F: RichField + Extendable<D>, const D: usize>(
        &self,
        b: &mut CircuitBuilder<F, D>,
        condition: BoolTarget,
        other: &Self,
    ) -> Self {
        Self {
            key: self.key.clone(),
            pointer: b.select(condition, self.pointer, other.pointer),
        }
    }

    pub fn new<F: RichField + Extendable<D>, const D: usize>(b: &mut CircuitBuilder<F, D>) -> Self {
        Self {
            key: Array::<Target, MAX_KEY_NIBBLE_LEN>::new(b),
            pointer: b.add_virtual_target(),
        }
    }

    pub fn assign<F: RichField>(
        &self,
        p: &mut PartialWitness<F>,
        key_nibbles: &[u8; MAX_KEY_NIBBLE_LEN],
        ptr: usize,
    ) {
        let f_nibbles = create_array(|i| F::from_canonical_u8(key_nibbles[i]));
        self.key.assign(p, &f_nibbles);
        p.set_target(self.pointer, F::from_canonical_usize(ptr));
    }

    /// Builds the key wire from the packed hash of the target address,
    /// with the pointer set at the last nibble.
    pub fn init_from_u32_targets<F: RichField + Extendable<D>, const D: usize>(
        b: &mut CircuitBuilder<F, D>,
        arr: &Array<U32Target, PACKED_HASH_LEN>,
    ) -> Self {
        Self {
            key: Array {
                arr: arr
                    .arr
                    .iter()
                    .flat_map(|u32_limb| {
                        // decompose the limb in 16 2-bit limbs, already
                        // range-checked by split_le_base
                        let limbs: [Target; 16] =
                            b.split_le_base::<4>(u32_limb.0, 16).try_into().unwrap();
                        // pack pairs of 2-bit limbs into nibbles, ordered
                        // big-endian within each byte
                        limbs
                            .chunks(4)
                            .flat_map(|chunk| {
                                vec![
                                    b.mul_const_add(F::from_canonical_u8(4), chunk[3], chunk[2]),
                                    b.mul_const_add(F::from_canonical_u8(4), chunk[1], chunk[0]),
                                ]
                            })
                            .collect::<Vec<_>>()
                    })
                    .collect::<Vec<_>>()
                    .try_into()
                    .unwrap(),
            },
            pointer: b.constant(F::from_canonical_usize(MAX_KEY_NIBBLE_LEN - 1)),
        }
    }
}
