//! Constraint-system counterpart of `shade_core`: the same derivations,
//! decoders and trie walk expressed as plonky2 gadgets. Both
//! implementations are maintained against the same vectors; any divergence
//! between them is a bug in one of the two.

#![feature(generic_const_exprs)]
#![feature(generic_arg_infer)]
#![allow(incomplete_features)]

use plonky2::plonk::config::{GenericConfig, PoseidonGoldilocksConfig};

pub mod account;
pub mod array;
pub mod claim;
pub mod keccak;
pub mod mpt;
pub mod public_inputs;
pub mod rlp;
pub mod u256;
pub mod utils;

pub const D: usize = 2;
pub type C = PoseidonGoldilocksConfig;
pub type F = <C as GenericConfig<D>>::F;
