//! Fixed-capacity account proofs and the procedural verifier that walks
//! them from the root commitment down to the account leaf.
//!
//! The walk mirrors the in-circuit verifier in `shade_circuits::mpt`: both
//! must accept and reject exactly the same inputs. Divergence between the
//! two is a correctness bug, which is why this implementation also iterates
//! over fixed-capacity buffers with explicit lengths.

use ethereum_types::U256;

use crate::{
    derive::keccak256,
    error::ClaimError,
    nibbles::{address_path, decode_path, PathKind},
    rlp::{decode_account, decode_list_items, AccountRecord, Item, MAX_ITEMS_IN_LIST},
    types::{Address, Hash, HASH_LEN, MAX_KEY_NIBBLE_LEN, MAX_NODE_LEN, MAX_PROOF_DEPTH},
};

/// One raw trie node held in a fixed buffer with an explicit length.
#[derive(Clone, Copy)]
pub struct NodeBuf {
    bytes: [u8; MAX_NODE_LEN],
    len: usize,
}

impl NodeBuf {
    pub fn from_slice(data: &[u8]) -> Result<Self, ClaimError> {
        if data.len() > MAX_NODE_LEN {
            return Err(ClaimError::NodeTooLarge {
                len: data.len(),
                max: MAX_NODE_LEN,
            });
        }
        let mut bytes = [0u8; MAX_NODE_LEN];
        bytes[..data.len()].copy_from_slice(data);
        Ok(Self {
            bytes,
            len: data.len(),
        })
    }

    pub fn empty() -> Self {
        Self {
            bytes: [0u8; MAX_NODE_LEN],
            len: 0,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

/// An ordered chain of raw trie nodes, root (layer 0) to leaf. Construction
/// enforces the depth and per-node size bounds before anything is parsed.
#[derive(Clone)]
pub struct AccountProof {
    nodes: [NodeBuf; MAX_PROOF_DEPTH],
    depth: usize,
}

impl AccountProof {
    pub fn from_nodes<I, T>(layers: I) -> Result<Self, ClaimError>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        let mut nodes = [NodeBuf::empty(); MAX_PROOF_DEPTH];
        let mut depth = 0;
        for layer in layers {
            if depth == MAX_PROOF_DEPTH {
                return Err(ClaimError::DepthExceeded {
                    depth: depth + 1,
                    max: MAX_PROOF_DEPTH,
                });
            }
            nodes[depth] = NodeBuf::from_slice(layer.as_ref())?;
            depth += 1;
        }
        if depth == 0 {
            return Err(ClaimError::StructuralMismatch("empty account proof"));
        }
        Ok(Self { nodes, depth })
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn node(&self, layer: usize) -> &[u8] {
        self.nodes[layer].as_slice()
    }

    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        self.nodes[..self.depth].iter().map(|n| n.as_slice())
    }
}

/// Child-reference resolution: a reference of exactly 32 bytes is the hash
/// of the child layer; any other reference must be byte-identical to the
/// child layer's raw encoding (small subtrees may be inlined rather than
/// hashed). Which rule applies is decided by the length alone.
fn child_matches(node: &[u8], child: &Item, next: &[u8]) -> bool {
    if !child.is_list && child.len == HASH_LEN {
        child.payload(node) == keccak256(next).as_slice()
    } else {
        child.span(node) == next
    }
}

/// Walks an account proof from the supplied root commitment to the leaf of
/// the target address and checks the proved balance against the required
/// aggregate amount. Fail-closed: any failing check invalidates the proof.
pub fn verify_account_proof(
    proof: &AccountProof,
    root: &Hash,
    target: &Address,
    required: U256,
) -> Result<AccountRecord, ClaimError> {
    let path = address_path(&keccak256(target));
    if keccak256(proof.node(0)) != *root {
        return Err(ClaimError::HashMismatch { layer: 0 });
    }

    let mut cursor = 0usize;
    for layer in 0..proof.depth() {
        let node = proof.node(layer);
        let (items, count) = decode_list_items::<MAX_ITEMS_IN_LIST>(node)?;
        let terminal = layer + 1 == proof.depth();
        let child = match count {
            17 => {
                if terminal {
                    return Err(ClaimError::StructuralMismatch(
                        "branch node as terminal layer",
                    ));
                }
                if cursor >= MAX_KEY_NIBBLE_LEN {
                    return Err(ClaimError::StructuralMismatch(
                        "address path exhausted before the leaf",
                    ));
                }
                let nibble = path[cursor] as usize;
                cursor += 1;
                items[nibble]
            }
            2 => {
                if items[0].is_list {
                    return Err(ClaimError::StructuralMismatch("key path must be a scalar"));
                }
                let decoded = decode_path(items[0].payload(node))?;
                if cursor + decoded.len > MAX_KEY_NIBBLE_LEN {
                    return Err(ClaimError::PathMismatch { at: cursor });
                }
                for (i, nibble) in decoded.nibbles().iter().enumerate() {
                    if *nibble != path[cursor + i] {
                        return Err(ClaimError::PathMismatch { at: cursor + i });
                    }
                }
                cursor += decoded.len;
                match decoded.kind {
                    PathKind::Leaf => {
                        if !terminal {
                            return Err(ClaimError::StructuralMismatch(
                                "leaf node before the terminal layer",
                            ));
                        }
                        if cursor != MAX_KEY_NIBBLE_LEN {
                            return Err(ClaimError::PathMismatch { at: cursor });
                        }
                        if items[1].is_list {
                            return Err(ClaimError::StructuralMismatch(
                                "leaf value must be a scalar",
                            ));
                        }
                        let record = decode_account(items[1].payload(node))?;
                        if record.balance < required {
                            return Err(ClaimError::InsufficientBalance {
                                balance: record.balance,
                                required,
                            });
                        }
                        log::debug!(
                            "account proof for 0x{} accepted at depth {}",
                            hex::encode(target),
                            proof.depth()
                        );
                        return Ok(record);
                    }
                    PathKind::Extension => {
                        if terminal {
                            return Err(ClaimError::StructuralMismatch(
                                "extension node as terminal layer",
                            ));
                        }
                        items[1]
                    }
                }
            }
            _ => {
                return Err(ClaimError::StructuralMismatch(
                    "node must carry 2 or 17 items",
                ))
            }
        };
        if !child_matches(node, &child, proof.node(layer + 1)) {
            return Err(ClaimError::HashMismatch { layer: layer + 1 });
        }
    }
    // every accepting walk returns at the leaf above
    Err(ClaimError::StructuralMismatch("proof ended without a leaf"))
}
