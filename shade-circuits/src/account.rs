//! In-circuit decoding of the account record held in the terminal leaf:
//! `[nonce, balance, storage_root, code_root]`. The structural checks
//! mirror `shade_core::rlp::decode_account`.

use plonky2::{
    field::extension::Extendable, hash::hash_types::RichField, iop::target::Target,
    plonk::circuit_builder::CircuitBuilder,
};

use crate::{
    array::{Array, VectorWire},
    rlp::{decode_fixed_list, decode_header},
    u256::UInt256Target,
    utils::less_than_or_equal_to,
};
use shade_core::types::{HASH_LEN, MAX_ACCOUNT_VALUE_LEN};

/// Wires exposing the proved balance, both as big-endian bytes and as u32
/// limbs ready for arithmetic.
#[derive(Clone, Debug)]
pub struct AccountWires {
    pub balance_bytes: Array<Target, HASH_LEN>,
    pub balance: UInt256Target,
}

/// Decodes the account record spanning the whole leaf value and extracts
/// the balance, left-padded to a fixed 32-byte big-endian window.
pub fn decode_account_balance<F: RichField + Extendable<D>, const D: usize>(
    b: &mut CircuitBuilder<F, D>,
    value: &VectorWire<Target, MAX_ACCOUNT_VALUE_LEN>,
) -> AccountWires {
    let zero = b.zero();
    let one = b.one();
    let tru = b._true();

    // the record is a list that consumes the leaf value exactly
    let outer = decode_header(b, &value.arr.arr, zero);
    b.connect(outer.data_type, one);
    let end = b.add(outer.offset, outer.len);
    b.connect(end, value.real_len);

    let headers = decode_fixed_list::<F, D, 4>(b, &value.arr.arr, zero);
    let four = b.constant(F::from_canonical_usize(4));
    b.connect(headers.num_fields, four);
    // all four fields are scalars
    for i in 0..4 {
        b.connect(headers.data_type[i], zero);
    }
    // nonce fits 8 bytes, balance 32, the two commitments are exactly 32
    let eight = b.constant(F::from_canonical_usize(8));
    let thirty_two = b.constant(F::from_canonical_usize(HASH_LEN));
    let nonce_ok = less_than_or_equal_to(b, headers.len[0], eight, 8);
    b.connect(nonce_ok.target, tru.target);
    let balance_ok = less_than_or_equal_to(b, headers.len[1], thirty_two, 8);
    b.connect(balance_ok.target, tru.target);
    b.connect(headers.len[2], thirty_two);
    b.connect(headers.len[3], thirty_two);
    // the four items fill the record with no slack
    let consumed = b.add(headers.offset[3], headers.len[3]);
    b.connect(consumed, end);

    // read the balance through a fixed window, left-padded to 32 bytes
    let window: Array<Target, HASH_LEN> = value.arr.extract_array(b, headers.offset[1]);
    let balance_bytes = window.into_vec(headers.len[1]).normalize_left(b);
    let balance = UInt256Target::from_be_bytes(b, &balance_bytes);
    AccountWires {
        balance_bytes,
        balance,
    }
}

#[cfg(test)]
mod test {
    use ethereum_types::U256;
    use plonky2::{
        field::types::Field,
        iop::witness::PartialWitness,
        plonk::{circuit_builder::CircuitBuilder, circuit_data::CircuitConfig},
    };

    use super::*;
    use crate::{array::Vector, u256::u256_limbs, C, D, F};
    use shade_test::trie::TestAccount;

    #[test]
    fn test_account_balance_extraction() {
        for balance in [
            U256::zero(),
            U256::from(1u64),
            U256::from(0x7fu64),
            U256::from(1_000_000_007u64),
            U256::MAX,
        ] {
            let account = TestAccount::new([0x21; 20], balance);
            let encoded = account.encode();
            // the procedural decoder agrees with the assigned record
            let record = shade_core::rlp::decode_account(&encoded).unwrap();
            assert_eq!(record.balance, balance);

            let config = CircuitConfig::standard_recursion_config();
            let mut pw = PartialWitness::new();
            let mut b = CircuitBuilder::<F, D>::new(config);
            let value = VectorWire::<_, MAX_ACCOUNT_VALUE_LEN>::new(&mut b);
            let wires = decode_account_balance(&mut b, &value);
            for (limb, exp) in wires.balance.0.iter().zip(u256_limbs(balance)) {
                let exp_t = b.constant(F::from_canonical_u32(exp));
                b.connect(limb.0, exp_t);
            }
            value.assign(&mut pw, &Vector::<u8, MAX_ACCOUNT_VALUE_LEN>::from_vec(&encoded).unwrap());
            let data = b.build::<C>();
            let proof = data.prove(pw).unwrap();
            data.verify(proof).unwrap();
        }
    }
}
