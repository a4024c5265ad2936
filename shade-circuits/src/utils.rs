use plonky2::field::extension::Extendable;
use plonky2::hash::hash_types::RichField;
use plonky2::iop::target::{BoolTarget, Target};
use plonky2::plonk::circuit_builder::CircuitBuilder;
use plonky2_crypto::u32::arithmetic_u32::U32Target;

const TWO_POWER_8: usize = 256;
const TWO_POWER_16: usize = 65536;
const TWO_POWER_24: usize = 16777216;

// Returns the index where the subvector starts in v, if any.
pub fn find_index_subvector(v: &[u8], sub: &[u8]) -> Option<usize> {
    v.windows(sub.len()).position(|s| s == sub)
}

pub(crate) fn convert_u8_targets_to_u32<F: RichField + Extendable<D>, const D: usize>(
    b: &mut CircuitBuilder<F, D>,
    data: &[Target],
) -> Vec<U32Target> {
    assert!(data.len() % 4 == 0);

    // constants to convert [u8; 4] to u32
    // u32 = u8[0] + u8[1] * 2^8 + u8[2] * 2^16 + u8[3] * 2^24
    let two_power_8: Target = b.constant(F::from_canonical_usize(TWO_POWER_8));
    let two_power_16: Target = b.constant(F::from_canonical_usize(TWO_POWER_16));
    let two_power_24: Target = b.constant(F::from_canonical_usize(TWO_POWER_24));
    let powers = [two_power_8, two_power_16, two_power_24];

    (0..data.len())
        .step_by(4)
        .map(|i| {
            let mut x = data[i];
            for (j, v) in data[i..].iter().skip(1).take(3).enumerate() {
                x = b.mul_add(*v, powers[j], x);
            }
            U32Target(x)
        })
        .collect()
}

/// Returns the bits of the given number.
pub fn num_to_bits<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    n: usize,
    x: Target,
) -> Vec<BoolTarget> {
    builder.range_check(x, n);
    builder.split_le(x, n)
}

pub fn bits_to_num<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    bits: &[BoolTarget],
) -> Target {
    let mut res = builder.zero();
    let mut e2 = builder.one();
    for bit in bits {
        res = builder.mul_add(e2, bit.target, res);
        e2 = builder.add(e2, e2);
    }
    res
}

/// Returns true if a < b in the first n bits. False otherwise.
pub fn less_than<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    a: Target,
    b: Target,
    n: usize,
) -> BoolTarget {
    assert!(n < 64);

    let power_of_two = builder.constant(F::from_canonical_u64(1 << n));
    let mut lin_pol = builder.add(a, power_of_two);
    // 2^n + a - b
    lin_pol = builder.sub(lin_pol, b);

    let binary = num_to_bits(builder, n + 1, lin_pol);
    // bin(2^n + a - b)[n] == false is correct only when a < b otherwise
    // 2^n + a - b > 2^n so binary[n] will be set
    builder.not(binary[n])
}

pub fn greater_than<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    a: Target,
    b: Target,
    n: usize,
) -> BoolTarget {
    less_than(builder, b, a, n)
}

pub fn less_than_or_equal_to<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    a: Target,
    b: Target,
    n: usize,
) -> BoolTarget {
    let one = builder.one();
    let b_plus_1 = builder.add(b, one);
    less_than(builder, a, b_plus_1, n)
}

pub fn greater_than_or_equal_to<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    a: Target,
    b: Target,
    n: usize,
) -> BoolTarget {
    let one = builder.one();
    let a_plus_1 = builder.add(a, one);
    less_than(builder, b, a_plus_1, n)
}

/// Resize the input vector if needed
pub fn convert_u8_to_u32_slice(data: &[u8]) -> Vec<u32> {
    let mut d = data.to_vec();
    if data.len() % 4 != 0 {
        d.resize(data.len() + (4 - (data.len() % 4)), 0);
    }
    let mut converted = Vec::new();
    for chunk in d.chunks_exact(4) {
        converted.push(u32::from_le_bytes(chunk.try_into().unwrap()));
    }
    converted
}

// taken from rust doc https://doc.rust-lang.org/std/primitive.u32.html#method.from_be_bytes
pub fn read_le_u32(input: &mut &[u8]) -> u32 {
    let (int_bytes, rest) = input.split_at(std::mem::size_of::<u32>());
    *input = rest;
    u32::from_le_bytes(int_bytes.try_into().unwrap())
}

pub trait ToFields {
    fn to_fields<F: RichField>(&self) -> Vec<F>;
}

impl ToFields for &[u8] {
    fn to_fields<F: RichField>(&self) -> Vec<F> {
        self.iter().map(|x| F::from_canonical_u8(*x)).collect()
    }
}

impl ToFields for &[u32] {
    fn to_fields<F: RichField>(&self) -> Vec<F> {
        self.iter().map(|x| F::from_canonical_u32(*x)).collect()
    }
}

pub trait Fieldable {
    fn to_field<F: RichField>(&self) -> F;
}

impl Fieldable for u8 {
    fn to_field<F: RichField>(&self) -> F {
        F::from_canonical_u8(*self)
    }
}

impl Fieldable for u32 {
    fn to_field<F: RichField>(&self) -> F {
        F::from_canonical_u32(*self)
    }
}

impl<T: Fieldable> ToFields for Vec<T> {
    fn to_fields<F: RichField>(&self) -> Vec<F> {
        self.iter().map(|x| x.to_field()).collect()
    }
}

impl<const N: usize, T: Fieldable> ToFields for [T; N] {
    fn to_fields<F: RichField>(&self) -> Vec<F> {
        self.iter().map(|x| x.to_field()).collect()
    }
}

pub trait Packer {
    type T;
    fn pack(&self) -> Vec<Self::T>;
}

impl Packer for &[u8] {
    type T = u32;
    fn pack(&self) -> Vec<u32> {
        convert_u8_to_u32_slice(self)
    }
}

impl Packer for Vec<u8> {
    type T = u32;
    fn pack(&self) -> Vec<u32> {
        convert_u8_to_u32_slice(self)
    }
}

impl<const N: usize> Packer for [u8; N] {
    type T = u32;
    fn pack(&self) -> Vec<u32> {
        convert_u8_to_u32_slice(self.as_slice())
    }
}

#[cfg(test)]
pub(crate) mod test {
    use plonky2::field::types::Field;
    use plonky2::iop::witness::PartialWitness;
    use plonky2::plonk::circuit_builder::CircuitBuilder;
    use plonky2::plonk::circuit_data::CircuitConfig;

    use super::*;
    use crate::{C, D, F};
    use anyhow::Result;

    #[test]
    fn test_pack_roundtrip() {
        let bytes = [1u8, 0, 0, 0, 2, 0, 0, 0];
        assert_eq!(bytes.pack(), vec![1, 2]);
        let odd = [0xffu8, 0, 0];
        assert_eq!(odd.as_slice().pack(), vec![0xff]);
    }

    #[test]
    fn test_less_than_family() -> Result<()> {
        let config = CircuitConfig::standard_recursion_config();
        let pw = PartialWitness::new();
        let mut builder = CircuitBuilder::<F, D>::new(config);

        let a = builder.constant(F::from_canonical_u64(5u64));
        let b = builder.constant(F::from_canonical_u64(10u64));
        let one = builder.one();

        let result = less_than(&mut builder, a, b, 4);
        builder.connect(result.target, one);
        let result = greater_than(&mut builder, b, a, 4);
        builder.connect(result.target, one);
        let result = less_than_or_equal_to(&mut builder, b, b, 4);
        builder.connect(result.target, one);
        let result = greater_than_or_equal_to(&mut builder, b, b, 4);
        builder.connect(result.target, one);

        let data = builder.build::<C>();
        let proof = data.prove(pw)?;
        data.verify(proof)
    }

    #[test]
    fn test_bits_roundtrip() -> Result<()> {
        let config = CircuitConfig::standard_recursion_config();
        let pw = PartialWitness::new();
        let mut builder = CircuitBuilder::<F, D>::new(config);
        let number = builder.constant(F::from_canonical_usize(1986));
        let bits = num_to_bits(&mut builder, 11, number);
        let back = bits_to_num(&mut builder, &bits);
        builder.connect(number, back);

        let data = builder.build::<C>();
        let proof = data.prove(pw)?;
        data.verify(proof)
    }
}
