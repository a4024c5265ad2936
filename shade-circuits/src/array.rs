//! Fixed-capacity wire arrays. Every variable-length byte run in the
//! circuits is an `Array` of a hard maximum size plus an explicit length
//! wire (`VectorWire`), never a data-dependent collection.

use anyhow::{anyhow, Result};
use plonky2::{
    field::{extension::Extendable, types::Field},
    hash::hash_types::RichField,
    iop::{
        target::{BoolTarget, Target},
        witness::{PartialWitness, WitnessWrite},
    },
    plonk::circuit_builder::CircuitBuilder,
};
use plonky2_crypto::u32::arithmetic_u32::U32Target;
use std::{array::from_fn as create_array, fmt::Debug, ops::Index};

use crate::utils::{less_than, less_than_or_equal_to};

/// Utility trait to convert any value into its field representation
/// equivalence.
pub trait ToField<F: RichField> {
    fn to_field(&self) -> F;
}

impl<F: RichField> ToField<F> for u8 {
    fn to_field(&self) -> F {
        F::from_canonical_u8(*self)
    }
}

impl<F: RichField> ToField<F> for u32 {
    fn to_field(&self) -> F {
        F::from_canonical_u32(*self)
    }
}

impl<F: RichField> ToField<F> for usize {
    fn to_field(&self) -> F {
        F::from_canonical_usize(*self)
    }
}

/// Small wrapper trait to handle Target and U32Target in a similar way for
/// arrays.
pub trait Targetable: Copy {
    fn to_target(&self) -> Target;
    fn from_target(t: Target) -> Self;
}

impl Targetable for Target {
    fn to_target(&self) -> Target {
        *self
    }
    fn from_target(t: Target) -> Self {
        t
    }
}

impl Targetable for U32Target {
    fn to_target(&self) -> Target {
        self.0
    }
    fn from_target(t: Target) -> Self {
        U32Target(t)
    }
}

/// A fixed buffer holding dynamic-length data, the value counterpart of a
/// [`VectorWire`].
#[derive(Clone, Debug, Copy)]
pub struct Vector<T, const MAX_LEN: usize> {
    pub arr: [T; MAX_LEN],
    pub real_len: usize,
}

impl<T: Default + Clone + Debug, const MAX_LEN: usize> Vector<T, MAX_LEN> {
    pub fn to_fields<F: RichField>(&self) -> Vector<F, MAX_LEN>
    where
        T: ToField<F>,
    {
        Vector {
            arr: self
                .arr
                .iter()
                .map(|x| x.to_field())
                .collect::<Vec<_>>()
                .try_into()
                .unwrap(),
            real_len: self.real_len,
        }
    }

    pub fn from_vec(d: &[T]) -> Result<Self> {
        anyhow::ensure!(
            d.len() <= MAX_LEN,
            "{} bytes can't fit in a {} bytes buffer",
            d.len(),
            MAX_LEN
        );
        let padded = d
            .iter()
            .cloned()
            .chain(std::iter::repeat(T::default()))
            .take(MAX_LEN)
            .collect::<Vec<_>>();
        Ok(Self {
            arr: padded.try_into().map_err(|e| anyhow!("{:?}", e))?,
            real_len: d.len(),
        })
    }

    pub fn empty() -> Self {
        Self {
            arr: create_array(|_| T::default()),
            real_len: 0,
        }
    }
}

/// Wires representing an array of dynamic length up to MAX_LEN. Useful when
/// the exact size of the data is not known in advance, e.g. trie nodes.
#[derive(Debug, Clone)]
pub struct VectorWire<T: Targetable + Clone, const MAX_LEN: usize> {
    pub arr: Array<T, MAX_LEN>,
    pub real_len: Target,
}

impl<const SIZE: usize, T: Targetable + Clone> Index<usize> for VectorWire<T, SIZE> {
    type Output = T;
    fn index(&self, index: usize) -> &Self::Output {
        self.arr.index(index)
    }
}

impl<const MAX_LEN: usize, T: Targetable + Clone> VectorWire<T, MAX_LEN> {
    pub fn new<F, const D: usize>(b: &mut CircuitBuilder<F, D>) -> Self
    where
        F: RichField + Extendable<D>,
    {
        let real_len = b.add_virtual_target();
        let arr = Array::<T, MAX_LEN>::new(b);
        Self { arr, real_len }
    }

    pub fn assign<F: RichField, V: ToField<F>>(
        &self,
        pw: &mut PartialWitness<F>,
        value: &Vector<V, MAX_LEN>,
    ) {
        pw.set_target(self.real_len, F::from_canonical_usize(value.real_len));
        self.arr
            .assign(pw, &create_array(|i| value.arr[i].to_field()));
    }
}

impl<const MAX_LEN: usize> VectorWire<Target, MAX_LEN> {
    /// Asserts the full vector is composed of bytes, the padding included.
    pub fn assert_bytes<F: RichField + Extendable<D>, const D: usize>(
        &self,
        b: &mut CircuitBuilder<F, D>,
    ) {
        self.arr.assert_bytes(b)
    }

    /// Reads the vector up to its real len and left-pads the result up to
    /// PAD_LEN, e.g. [77, 66, 0, 0] of length 2 becomes [0, 0, 77, 66].
    /// This turns a variable-length big-endian scalar into a fixed-width
    /// one without knowing the real length outside the circuit. PAD_LEN
    /// must be at least the real length, otherwise the result is
    /// meaningless.
    pub fn normalize_left<F: RichField + Extendable<D>, const D: usize, const PAD_LEN: usize>(
        &self,
        b: &mut CircuitBuilder<F, D>,
    ) -> Array<Target, PAD_LEN> {
        let zero = b.zero();
        let pad_t = b.constant(F::from_canonical_usize(PAD_LEN));
        Array {
            arr: create_array(|i| {
                let it = b.constant(F::from_canonical_usize(i));
                let jt = b.sub(pad_t, it);
                let is_lt =
                    less_than_or_equal_to(b, jt, self.real_len, (MAX_LEN.ilog2() + 1) as usize);
                let idx = b.sub(self.real_len, jt);
                let val = self.arr.value_at_failover(b, idx);
                b.select(is_lt, val, zero)
            }),
        }
    }
}

/// Fixed size array in circuit of any targetable type of N elements.
#[derive(Clone, Debug)]
pub struct Array<T: Clone, const N: usize> {
    pub arr: [T; N],
}

impl<F: Field, const N: usize> Default for Array<F, N> {
    fn default() -> Self {
        Self { arr: [F::ZERO; N] }
    }
}

impl<T: Clone, const N: usize> From<[T; N]> for Array<T, N> {
    fn from(value: [T; N]) -> Self {
        Self { arr: value }
    }
}

impl<T: Clone + Debug, const N: usize> TryFrom<Vec<T>> for Array<T, N> {
    type Error = anyhow::Error;
    fn try_from(value: Vec<T>) -> Result<Self> {
        Ok(Self {
            arr: value
                .try_into()
                .map_err(|e| anyhow!("can't convert to array: {:?}", e))?,
        })
    }
}

impl<T: Clone, const SIZE: usize> Index<usize> for Array<T, SIZE> {
    type Output = T;
    fn index(&self, index: usize) -> &Self::Output {
        self.arr.index(index)
    }
}

impl<const SIZE: usize> Array<Target, SIZE> {
    pub fn assert_bytes<F: RichField + Extendable<D>, const D: usize>(
        &self,
        b: &mut CircuitBuilder<F, D>,
    ) {
        for byte in self.arr {
            b.range_check(byte, 8)
        }
    }
}

impl<T: Targetable + Clone, const SIZE: usize> Array<T, SIZE> {
    /// Creates new wires of the given SIZE.
    pub fn new<F: RichField + Extendable<D>, const D: usize>(b: &mut CircuitBuilder<F, D>) -> Self {
        Self {
            arr: create_array(|_| T::from_target(b.add_virtual_target())),
        }
    }

    pub fn from_array(arr: [T; SIZE]) -> Self {
        Self { arr }
    }

    pub fn concat<const OTHER_SIZE: usize>(
        &self,
        other: &Array<T, OTHER_SIZE>,
    ) -> Array<T, { SIZE + OTHER_SIZE }> {
        Array {
            arr: create_array(|i| {
                if i < SIZE {
                    self.arr[i]
                } else {
                    other.arr[i - SIZE]
                }
            }),
        }
    }

    /// Assigns each value in the given array to the respective wire in
    /// `self`.
    pub fn assign<F: RichField>(&self, pw: &mut PartialWitness<F>, array: &[F; SIZE]) {
        #[allow(clippy::needless_range_loop)]
        for i in 0..SIZE {
            pw.set_target(self.arr[i].to_target(), array[i])
        }
    }

    /// Assigns a vector of bytes to this array. In circuit, one must call
    /// `assert_bytes` if the wires are expected to hold bytes.
    pub fn assign_bytes<F: RichField>(&self, pw: &mut PartialWitness<F>, array: &[u8; SIZE]) {
        self.assign(pw, &create_array(|i| F::from_canonical_u8(array[i])))
    }

    /// Returns the last `TAKE` elements of the array.
    pub fn take_last<const TAKE: usize>(&self) -> Array<T, TAKE> {
        Array {
            arr: create_array(|i| self.arr[SIZE - TAKE + i]),
        }
    }

    /// Conditionally select this array if condition is true or the other
    /// array if condition is false. Cost is O(SIZE) calls to select().
    pub fn select<F: RichField + Extendable<D>, const D: usize>(
        &self,
        b: &mut CircuitBuilder<F, D>,
        condition: BoolTarget,
        other: &Self,
    ) -> Self {
        Array {
            arr: create_array(|i| {
                T::from_target(b.select(
                    condition,
                    self.arr[i].to_target(),
                    other.arr[i].to_target(),
                ))
            }),
        }
    }

    /// Returns true if self == other, false otherwise.
    pub fn equals<F: RichField + Extendable<D>, const D: usize>(
        &self,
        b: &mut CircuitBuilder<F, D>,
        other: &Self,
    ) -> BoolTarget {
        let mut res = b._true();
        for (our, other) in self.arr.iter().zip(other.arr.iter()) {
            let eq = b.is_equal(our.to_target(), other.to_target());
            res = b.and(res, eq);
        }
        res
    }

    /// Enforce this array is equal to another one.
    pub fn enforce_equal<F: RichField + Extendable<D>, const D: usize>(
        &self,
        b: &mut CircuitBuilder<F, D>,
        other: &Self,
    ) {
        self.arr
            .iter()
            .zip(other.arr.iter())
            .for_each(|(our, other)| b.connect(our.to_target(), other.to_target()));
    }

    /// Enforces both arrays contain the same subslice array[..slice_len].
    /// Note the check goes up to the pointer excluded.
    pub fn enforce_slice_equals<F: RichField + Extendable<D>, const D: usize>(
        &self,
        b: &mut CircuitBuilder<F, D>,
        other: &Self,
        slice_len: Target,
    ) {
        let tru = b._true();
        for (i, (our, other)) in self.arr.iter().zip(other.arr.iter()).enumerate() {
            let it = b.constant(F::from_canonical_usize(i));
            let before_end = less_than(b, it, slice_len, (SIZE.ilog2() + 1) as usize);
            let eq = b.is_equal(our.to_target(), other.to_target());
            let res = b.select(before_end, eq.target, tru.target);
            b.connect(res, tru.target);
        }
    }

    /// Returns self[at..at+SUB_SIZE].
    /// Cost is O(SIZE * SUB_SIZE) due to SUB_SIZE calls to value_at().
    /// WARNING: the index `at` must fulfill `SIZE - at >= SUB_SIZE`,
    /// otherwise nothing is guaranteed on the result.
    pub fn extract_array<F: RichField + Extendable<D>, const D: usize, const SUB_SIZE: usize>(
        &self,
        b: &mut CircuitBuilder<F, D>,
        at: Target,
    ) -> Array<T, SUB_SIZE> {
        let m = b.constant(F::from_canonical_usize(SUB_SIZE));
        let upper_bound = b.add(at, m);
        Array::<T, SUB_SIZE> {
            arr: create_array(|i| {
                let i_target = b.constant(F::from_canonical_usize(i));
                let i_plus_n_target = b.add(at, i_target);
                // ((i + offset) <= n + M)
                let lt = less_than_or_equal_to(b, i_plus_n_target, upper_bound, 63);
                // ((i+n) <= n+M) * (i+n)
                let j = b.mul(lt.target, i_plus_n_target);
                // out_val = arr[((i+n)<=n+M) * (i+n)]
                self.value_at(b, j)
            }),
        }
    }

    /// Inefficient method to extract a value from an array but that works
    /// all the time, when b.random_access does not work.
    pub fn value_at_failover<F: RichField + Extendable<D>, const D: usize>(
        &self,
        b: &mut CircuitBuilder<F, D>,
        at: Target,
    ) -> T {
        let mut acc = b.zero();
        for (i, el) in self.arr.iter().enumerate() {
            let i_target = b.constant(F::from_canonical_usize(i));
            let is_eq = b.is_equal(i_target, at);
            // SUM_i (i == at) * element
            acc = b.mul_add(is_eq.target, el.to_target(), acc);
        }
        T::from_target(acc)
    }

    /// Extract the value from the array at the index given by `at`.
    /// Cost is O(SIZE) in general, less for small power-of-two arrays.
    pub fn value_at<F: RichField + Extendable<D>, const D: usize>(
        &self,
        b: &mut CircuitBuilder<F, D>,
        at: Target,
    ) -> T {
        // random_access requires a power of two size under the gate limit
        if SIZE < RANDOM_ACCESS_SIZE && (SIZE & (SIZE - 1) == 0) {
            return T::from_target(b.random_access(
                at,
                self.arr.iter().map(|v| v.to_target()).collect::<Vec<_>>(),
            ));
        }
        self.value_at_failover(b, at)
    }

    pub fn reverse(&self) -> Self {
        Self {
            arr: create_array(|i| self.arr[SIZE - 1 - i]),
        }
    }

    pub fn register_as_public_input<F: RichField + Extendable<D>, const D: usize>(
        &self,
        b: &mut CircuitBuilder<F, D>,
    ) {
        b.register_public_inputs(&self.arr.iter().map(|t| t.to_target()).collect::<Vec<_>>());
    }

    pub fn into_vec(&self, real_len: Target) -> VectorWire<T, SIZE> {
        VectorWire {
            arr: self.clone(),
            real_len,
        }
    }
}

/// Returns the size of the array in 32-bit units, rounded up.
#[allow(non_snake_case)]
pub const fn L32(a: usize) -> usize {
    if a % 4 != 0 {
        a / 4 + 1
    } else {
        a / 4
    }
}

impl<const SIZE: usize> Array<Target, SIZE> {
    pub fn convert_u8_to_u32<F: RichField + Extendable<D>, const D: usize>(
        &self,
        b: &mut CircuitBuilder<F, D>,
    ) -> Array<U32Target, { L32(SIZE) }>
    where
        [(); L32(SIZE)]:,
    {
        let two_power_8: Target = b.constant(F::from_canonical_usize(1 << 8));
        let two_power_16: Target = b.constant(F::from_canonical_usize(1 << 16));
        let two_power_24: Target = b.constant(F::from_canonical_usize(1 << 24));
        let powers = [two_power_8, two_power_16, two_power_24];

        Array {
            arr: (0..SIZE)
                .step_by(4)
                .map(|i| {
                    let mut x = self.arr[i];
                    for (j, v) in self.arr[i..].iter().skip(1).take(3).enumerate() {
                        x = b.mul_add(*v, powers[j], x);
                    }
                    U32Target(x)
                })
                .collect::<Vec<_>>()
                .try_into()
                .unwrap(),
        }
    }
}

/// Maximum size of the array where we can call b.random_access() from
/// native Plonky2 API.
const RANDOM_ACCESS_SIZE: usize = 64;

#[cfg(test)]
mod test {
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
    use rand::{thread_rng, Rng};
    use std::panic;

    use shade_test::{
        circuit::{run_circuit, UserCircuit},
        utils::random_vector,
    };

    use super::{Array, Vector, VectorWire};
    use crate::{C, D, F};

    #[test]
    fn test_value_at() {
        const SIZE: usize = 80;
        #[derive(Clone, Debug)]
        struct ValueAtCircuit {
            arr: [u8; SIZE],
            idx: usize,
            exp: u8,
        }
        impl<F, const D: usize> UserCircuit<F, D> for ValueAtCircuit
        where
            F: RichField + Extendable<D>,
        {
            type Wires = (Array<Target, SIZE>, Target, Target);
            fn build(c: &mut CircuitBuilder<F, D>) -> Self::Wires {
                let array = Array::<Target, SIZE>::new(c);
                let exp_value = c.add_virtual_target();
                let index = c.add_virtual_target();
                let extracted = array.value_at(c, index);
                c.connect(exp_value, extracted);
                (array, index, exp_value)
            }
            fn prove(&self, pw: &mut PartialWitness<F>, wires: &Self::Wires) {
                wires
                    .0
                    .assign(pw, &create_array(|i| F::from_canonical_u8(self.arr[i])));
                pw.set_target(wires.1, F::from_canonical_usize(self.idx));
                pw.set_target(wires.2, F::from_canonical_u8(self.exp));
            }
        }
        let mut rng = thread_rng();
        let mut arr = [0u8; SIZE];
        rng.fill(&mut arr[..]);
        let idx: usize = rng.gen_range(0..SIZE);
        let exp = arr[idx];
        run_circuit::<F, D, C, _>(ValueAtCircuit { arr, idx, exp });
    }

    #[test]
    fn test_extract_array() {
        const SIZE: usize = 80;
        const SUBSIZE: usize = 40;
        #[derive(Clone, Debug)]
        struct ExtractArrayCircuit {
            arr: [u8; SIZE],
            idx: usize,
            exp: [u8; SUBSIZE],
        }
        impl<F, const D: usize> UserCircuit<F, D> for ExtractArrayCircuit
        where
            F: RichField + Extendable<D>,
        {
            type Wires = (Array<Target, SIZE>, Target, Array<Target, SUBSIZE>);
            fn build(c: &mut CircuitBuilder<F, D>) -> Self::Wires {
                let array = Array::<Target, SIZE>::new(c);
                let index = c.add_virtual_target();
                let expected = Array::<Target, SUBSIZE>::new(c);
                let extracted = array.extract_array::<_, _, SUBSIZE>(c, index);
                let are_equal = expected.equals(c, &extracted);
                let tru = c._true();
                c.connect(are_equal.target, tru.target);
                (array, index, expected)
            }
            fn prove(&self, pw: &mut PartialWitness<F>, wires: &Self::Wires) {
                wires
                    .0
                    .assign(pw, &create_array(|i| F::from_canonical_u8(self.arr[i])));
                pw.set_target(wires.1, F::from_canonical_usize(self.idx));
                wires
                    .2
                    .assign(pw, &create_array(|i| F::from_canonical_u8(self.exp[i])));
            }
        }
        let mut rng = thread_rng();
        let mut arr = [0u8; SIZE];
        rng.fill(&mut arr[..]);
        let idx: usize = rng.gen_range(0..(SIZE - SUBSIZE));
        let exp = create_array(|i| arr[idx + i]);
        run_circuit::<F, D, C, _>(ExtractArrayCircuit { arr, idx, exp });
    }

    #[test]
    fn test_enforce_slice_equals() {
        #[derive(Clone, Debug)]
        struct TestSliceEqual<const N: usize> {
            arr: [u8; N],
            arr2: [u8; N],
            ptr: usize,
        }

        impl<F, const D: usize, const N: usize> UserCircuit<F, D> for TestSliceEqual<N>
        where
            F: RichField + Extendable<D>,
        {
            type Wires = (Array<Target, N>, Target, Array<Target, N>);

            fn build(c: &mut CircuitBuilder<F, D>) -> Self::Wires {
                let arr = Array::<Target, N>::new(c);
                let ptr = c.add_virtual_target();
                let prefix = Array::<Target, N>::new(c);
                arr.enforce_slice_equals(c, &prefix, ptr);
                (arr, ptr, prefix)
            }

            fn prove(&self, pw: &mut PartialWitness<F>, wires: &Self::Wires) {
                wires
                    .0
                    .assign(pw, &create_array(|i| F::from_canonical_u8(self.arr[i])));
                wires
                    .2
                    .assign(pw, &create_array(|i| F::from_canonical_u8(self.arr2[i])));
                pw.set_target(wires.1, F::from_canonical_usize(self.ptr));
            }
        }
        const N: usize = 45;
        let arr: [u8; N] = random_vector(N).try_into().unwrap();
        let mut arr2: [u8; N] = random_vector(N).try_into().unwrap();
        let pointer = thread_rng().gen_range(0..N);
        arr2[0..pointer].copy_from_slice(&arr[0..pointer]);
        run_circuit::<F, D, C, _>(TestSliceEqual {
            arr,
            arr2,
            ptr: pointer,
        });

        let res = panic::catch_unwind(|| {
            run_circuit::<F, D, C, _>(TestSliceEqual {
                arr,
                arr2: random_vector(N).try_into().unwrap(),
                ptr: N,
            });
        });
        assert!(res.is_err());
    }

    #[test]
    fn test_normalize_left() {
        #[derive(Debug, Clone)]
        struct TestNormalizeLeft<const VLEN: usize, const PAD_LEN: usize> {
            input: Vector<u8, VLEN>,
            exp: [u8; PAD_LEN],
        }

        impl<const VLEN: usize, const PAD_LEN: usize> UserCircuit<F, D>
            for TestNormalizeLeft<VLEN, PAD_LEN>
        {
            type Wires = (VectorWire<Target, VLEN>, Array<Target, PAD_LEN>);

            fn build(c: &mut CircuitBuilder<F, D>) -> Self::Wires {
                let vec = VectorWire::new(c);
                let exp_out = Array::<Target, PAD_LEN>::new(c);
                let comp_out: Array<Target, PAD_LEN> = vec.normalize_left(c);
                exp_out.enforce_equal(c, &comp_out);
                (vec, exp_out)
            }

            fn prove(&self, pw: &mut PartialWitness<F>, wires: &Self::Wires) {
                wires.0.assign(pw, &self.input);
                wires.1.assign_bytes(pw, &self.exp);
            }
        }

        {
            const VLEN: usize = 4;
            const PAD: usize = 4;
            let inp = [77, 66, 55];
            let exp = [00, 77, 66, 55];
            run_circuit::<F, D, C, _>(TestNormalizeLeft::<VLEN, PAD> {
                input: Vector::from_vec(&inp).unwrap(),
                exp,
            });
        }
        {
            // the buffer past the real length may hold garbage, the result
            // must not depend on it
            const VLEN: usize = 7;
            const PAD: usize = 5;
            let real_len = 4;
            let real_data: Vec<u8> = random_vector(real_len);
            let inp = Vector {
                arr: real_data
                    .iter()
                    .copied()
                    .chain(std::iter::repeat_with(|| thread_rng().gen()))
                    .take(VLEN)
                    .collect::<Vec<_>>()
                    .try_into()
                    .unwrap(),
                real_len,
            };
            let exp = shade_core::types::left_pad::<PAD>(&real_data);
            run_circuit::<F, D, C, _>(TestNormalizeLeft::<VLEN, PAD> { input: inp, exp });
        }
    }
}
