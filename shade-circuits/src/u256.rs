//! Minimal 256-bit arithmetic over 32-bit limbs: just what balance
//! accumulation and the threshold comparison need.

use ethereum_types::U256;
use plonky2::{
    field::extension::Extendable,
    hash::hash_types::RichField,
    iop::{
        target::{BoolTarget, Target},
        witness::{PartialWitness, WitnessWrite},
    },
    plonk::circuit_builder::CircuitBuilder,
};
use plonky2_crypto::u32::arithmetic_u32::{CircuitBuilderU32, U32Target};

use crate::array::Array;

/// Number of 32-bit limbs of a 256-bit integer.
pub const NUM_LIMBS: usize = 8;

/// A 256-bit unsigned integer as little-endian 32-bit limbs.
#[derive(Clone, Debug)]
pub struct UInt256Target(pub [U32Target; NUM_LIMBS]);

impl UInt256Target {
    /// Fresh range-checked wires.
    pub fn new<F: RichField + Extendable<D>, const D: usize>(
        b: &mut CircuitBuilder<F, D>,
    ) -> Self {
        Self(std::array::from_fn(|_| {
            let t = b.add_virtual_target();
            b.range_check(t, 32);
            U32Target(t)
        }))
    }

    pub fn zero<F: RichField + Extendable<D>, const D: usize>(
        b: &mut CircuitBuilder<F, D>,
    ) -> Self {
        let zero = b.zero_u32();
        Self([zero; NUM_LIMBS])
    }

    /// Packs 32 big-endian bytes into limbs. The bytes must already be
    /// range checked by the caller.
    pub fn from_be_bytes<F: RichField + Extendable<D>, const D: usize>(
        b: &mut CircuitBuilder<F, D>,
        bytes: &Array<Target, 32>,
    ) -> Self {
        let le_bytes = bytes.reverse();
        let limbs = le_bytes.convert_u8_to_u32(b);
        Self(limbs.arr)
    }

    /// self + other, returning the sum and the final carry limb.
    pub fn add<F: RichField + Extendable<D>, const D: usize>(
        &self,
        b: &mut CircuitBuilder<F, D>,
        other: &Self,
    ) -> (Self, U32Target) {
        let mut carry = b.zero_u32();
        let limbs = std::array::from_fn(|i| {
            let (result, new_carry) = b.add_u32s_with_carry(&[self.0[i], other.0[i]], carry);
            carry = new_carry;
            result
        });
        (Self(limbs), carry)
    }

    /// True iff self <= other, via the borrow of other - self.
    pub fn is_less_or_equal<F: RichField + Extendable<D>, const D: usize>(
        &self,
        b: &mut CircuitBuilder<F, D>,
        other: &Self,
    ) -> BoolTarget {
        let mut borrow = b.zero_u32();
        for i in 0..NUM_LIMBS {
            let (_, new_borrow) = b.sub_u32(other.0[i], self.0[i], borrow);
            borrow = new_borrow;
        }
        let zero = b.zero();
        b.is_equal(borrow.0, zero)
    }

    pub fn register_as_public_input<F: RichField + Extendable<D>, const D: usize>(
        &self,
        b: &mut CircuitBuilder<F, D>,
    ) {
        for limb in &self.0 {
            b.register_public_input(limb.0);
        }
    }

    pub fn assign<F: RichField>(&self, pw: &mut PartialWitness<F>, value: U256) {
        for (limb, half) in self.0.iter().zip(u256_limbs(value)) {
            pw.set_target(limb.0, F::from_canonical_u32(half));
        }
    }
}

/// The little-endian u32 limbs of a U256 value, for witness assignment and
/// public-input comparison.
pub fn u256_limbs(value: U256) -> [u32; NUM_LIMBS] {
    std::array::from_fn(|i| {
        let word = value.0[i / 2];
        if i % 2 == 0 {
            word as u32
        } else {
            (word >> 32) as u32
        }
    })
}

#[cfg(test)]
mod test {
    use plonky2::field::types::Field;
    use plonky2::iop::witness::PartialWitness;
    use plonky2::plonk::circuit_builder::CircuitBuilder;
    use plonky2::plonk::circuit_data::CircuitConfig;
    use rand::{thread_rng, Rng};

    use super::*;
    use crate::{C, D, F};
    use anyhow::Result;

    fn check_add(left: U256, right: U256) -> Result<()> {
        let config = CircuitConfig::standard_recursion_config();
        let mut pw = PartialWitness::new();
        let mut b = CircuitBuilder::<F, D>::new(config);
        let l = UInt256Target::new(&mut b);
        let r = UInt256Target::new(&mut b);
        let (sum, _) = l.add(&mut b, &r);
        let expected = UInt256Target::new(&mut b);
        for i in 0..NUM_LIMBS {
            b.connect(sum.0[i].0, expected.0[i].0);
        }
        l.assign(&mut pw, left);
        r.assign(&mut pw, right);
        let (exp, overflowed) = left.overflowing_add(right);
        assert!(!overflowed);
        expected.assign(&mut pw, exp);
        let data = b.build::<C>();
        let proof = data.prove(pw)?;
        data.verify(proof)
    }

    #[test]
    fn test_add_with_carries() -> Result<()> {
        check_add(U256::from(u32::MAX), U256::one())?;
        check_add(U256::from(u64::MAX), U256::from(u64::MAX))?;
        let mut rng = thread_rng();
        check_add(
            U256::from(rng.gen::<u128>()),
            U256::from(rng.gen::<u128>()),
        )
    }

    fn check_le(left: U256, right: U256, expected: bool) -> Result<()> {
        let config = CircuitConfig::standard_recursion_config();
        let mut pw = PartialWitness::new();
        let mut b = CircuitBuilder::<F, D>::new(config);
        let l = UInt256Target::new(&mut b);
        let r = UInt256Target::new(&mut b);
        let le = l.is_less_or_equal(&mut b, &r);
        let exp = b.constant(F::from_bool(expected));
        b.connect(le.target, exp);
        l.assign(&mut pw, left);
        r.assign(&mut pw, right);
        let data = b.build::<C>();
        let proof = data.prove(pw)?;
        data.verify(proof)
    }

    #[test]
    fn test_is_less_or_equal() -> Result<()> {
        check_le(U256::from(5u64), U256::from(10u64), true)?;
        check_le(U256::from(10u64), U256::from(10u64), true)?;
        check_le(U256::from(11u64), U256::from(10u64), false)?;
        // the comparison looks at high limbs as well
        check_le(U256::from(1u64) << 200, U256::from(u64::MAX), false)?;
        check_le(U256::from(u64::MAX), U256::from(1u64) << 200, true)
    }

    #[test]
    fn test_u256_limbs() {
        let v = U256::from(0x1_0000_0002u64);
        let limbs = u256_limbs(v);
        assert_eq!(limbs[0], 2);
        assert_eq!(limbs[1], 1);
        assert!(limbs[2..].iter().all(|l| *l == 0));
    }
}
