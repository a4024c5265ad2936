//! From-scratch decoder for the length-prefixed (RLP-style) node encoding.
//!
//! The verifier never trusts a pre-parsed view of a node; every structure is
//! re-derived from the raw bytes with hard bounds on every length. There is
//! no lenient mode: an item must consume exactly the bytes its header
//! declares, and a list must be filled by its sub-items with no slack.

use ethereum_types::U256;

use crate::{
    error::ClaimError,
    types::{Hash, HASH_LEN, MAX_LEN_BYTES},
};

/// Maximum number of items a node can carry: a branch fans out over 16
/// child slots plus one value slot.
pub const MAX_ITEMS_IN_LIST: usize = 17;

/// Location of one decoded item inside a node buffer. `start` is the first
/// byte of the item's own header, `offset` the first payload byte.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Item {
    pub start: usize,
    pub offset: usize,
    pub len: usize,
    pub is_list: bool,
}

impl Item {
    /// The payload bytes of this item.
    pub fn payload<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        &data[self.offset..self.offset + self.len]
    }

    /// The full encoding of this item, header included. This is what an
    /// embedded child node is compared against.
    pub fn span<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        &data[self.start..self.offset + self.len]
    }
}

/// Classifies the item starting at `data[at..]` from its prefix byte:
/// single embedded byte, short or long string, short or long list. The
/// returned offsets are absolute within `data`.
pub fn decode_header(data: &[u8], at: usize) -> Result<Item, ClaimError> {
    let prefix = *data
        .get(at)
        .ok_or(ClaimError::MalformedEncoding("empty item"))?;
    let (header_len, len, is_list) = match prefix {
        0x00..=0x7f => (0usize, 1usize, false),
        0x80..=0xb7 => (1, (prefix - 0x80) as usize, false),
        0xb8..=0xbf => {
            let len_of_len = (prefix - 0xb7) as usize;
            (1 + len_of_len, read_length(data, at + 1, len_of_len)?, false)
        }
        0xc0..=0xf7 => (1, (prefix - 0xc0) as usize, true),
        0xf8..=0xff => {
            let len_of_len = (prefix - 0xf7) as usize;
            (1 + len_of_len, read_length(data, at + 1, len_of_len)?, true)
        }
    };
    let offset = at + header_len;
    if offset + len > data.len() {
        return Err(ClaimError::MalformedEncoding("item overruns its buffer"));
    }
    Ok(Item {
        start: at,
        offset,
        len,
        is_list,
    })
}

/// Big-endian length read for long strings and long lists, bounded to
/// [`MAX_LEN_BYTES`] length bytes.
fn read_length(data: &[u8], at: usize, len_of_len: usize) -> Result<usize, ClaimError> {
    if len_of_len > MAX_LEN_BYTES {
        return Err(ClaimError::MalformedEncoding("length of length too large"));
    }
    let bytes = data
        .get(at..at + len_of_len)
        .ok_or(ClaimError::MalformedEncoding("truncated length bytes"))?;
    let mut len = 0usize;
    for b in bytes {
        len = (len << 8) | *b as usize;
    }
    Ok(len)
}

/// Decodes `data` as exactly one item: the payload must end exactly at the
/// end of the buffer, any shortfall or overrun fails.
pub fn decode_item(data: &[u8]) -> Result<Item, ClaimError> {
    let item = decode_header(data, 0)?;
    if item.offset + item.len != data.len() {
        return Err(ClaimError::MalformedEncoding(
            "declared item length does not match the buffer",
        ));
    }
    Ok(item)
}

/// Converts a length-bounded byte run into an unsigned integer. Positions
/// at or beyond the declared length contribute nothing to the value, so a
/// fixed-capacity buffer can hold a variable-length scalar safely.
pub fn read_uint(payload: &[u8]) -> Result<U256, ClaimError> {
    if payload.len() > HASH_LEN {
        return Err(ClaimError::MalformedEncoding("scalar wider than 32 bytes"));
    }
    let mut value = U256::zero();
    for i in 0..HASH_LEN {
        if i < payload.len() {
            value = (value << 8) | U256::from(payload[i]);
        }
    }
    Ok(value)
}

/// Decodes `data` as a list and scans its sub-items into a fixed-capacity
/// array, returning the populated count. The sub-items must fill the list
/// payload exactly; a list with more than `N` items cannot do so and fails.
pub fn decode_list_items<const N: usize>(data: &[u8]) -> Result<([Item; N], usize), ClaimError> {
    let list = decode_item(data)?;
    if !list.is_list {
        return Err(ClaimError::StructuralMismatch("expected a list item"));
    }
    let end = list.offset + list.len;
    let mut items = [Item::default(); N];
    let mut count = 0;
    let mut at = list.offset;
    for slot in items.iter_mut() {
        if at == end {
            break;
        }
        let item = decode_header(data, at)?;
        let next = item.offset + item.len;
        if next > end {
            return Err(ClaimError::MalformedEncoding("item overruns its list"));
        }
        *slot = item;
        at = next;
        count += 1;
    }
    if at != end {
        return Err(ClaimError::MalformedEncoding(
            "list payload not fully consumed",
        ));
    }
    Ok((items, count))
}

/// The four fields of an encoded account record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccountRecord {
    pub nonce: u64,
    pub balance: U256,
    pub storage_root: Hash,
    pub code_root: Hash,
}

/// Decodes an account record `[nonce, balance, storage_root, code_root]`.
/// The two commitments must be exactly 32 bytes; the nonce fits 8 bytes and
/// the balance 32.
pub fn decode_account(data: &[u8]) -> Result<AccountRecord, ClaimError> {
    let (items, count) = decode_list_items::<4>(data)?;
    if count != 4 {
        return Err(ClaimError::StructuralMismatch(
            "account record must carry exactly 4 fields",
        ));
    }
    if items.iter().any(|i| i.is_list) {
        return Err(ClaimError::StructuralMismatch(
            "account record fields must be scalars",
        ));
    }
    let nonce_bytes = items[0].payload(data);
    if nonce_bytes.len() > 8 {
        return Err(ClaimError::MalformedEncoding("nonce wider than 8 bytes"));
    }
    let nonce = read_uint(nonce_bytes)?.as_u64();
    let balance = read_uint(items[1].payload(data))?;
    let storage_root: Hash = items[2]
        .payload(data)
        .try_into()
        .map_err(|_| ClaimError::MalformedEncoding("storage commitment must be 32 bytes"))?;
    let code_root: Hash = items[3]
        .payload(data)
        .try_into()
        .map_err(|_| ClaimError::MalformedEncoding("code commitment must be 32 bytes"))?;
    Ok(AccountRecord {
        nonce,
        balance,
        storage_root,
        code_root,
    })
}

#[cfg(test)]
mod test {
    use rlp::RlpStream;
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_decode_header_classes() {
        // single embedded byte
        let item = decode_item(&[0x7f]).unwrap();
        assert_eq!((item.offset, item.len, item.is_list), (0, 1, false));
        // empty string
        let item = decode_item(&[0x80]).unwrap();
        assert_eq!((item.offset, item.len, item.is_list), (1, 0, false));
        // short string
        let data = rlp::encode(&b"dog".to_vec()).to_vec();
        let item = decode_item(&data).unwrap();
        assert_eq!((item.offset, item.len, item.is_list), (1, 3, false));
        // long string needs two length bytes past 255
        let data = rlp::encode(&vec![0xaa; 1024]).to_vec();
        assert_eq!(data[0], 0xb9);
        let item = decode_item(&data).unwrap();
        assert_eq!((item.offset, item.len, item.is_list), (3, 1024, false));
        // short and long lists
        let data = rlp::encode_list::<Vec<u8>, _>(&[b"a".to_vec(), b"b".to_vec()]).to_vec();
        let item = decode_item(&data).unwrap();
        assert!(item.is_list);
        let big = rlp::encode_list::<Vec<u8>, _>(&vec![vec![0xaa; 65]; 5]).to_vec();
        let item = decode_item(&big).unwrap();
        assert!(item.is_list);
        assert_eq!(item.len, big.len() - item.offset);
    }

    #[rstest]
    #[case::trailing_byte({
        let mut d = rlp::encode(&b"dog".to_vec()).to_vec();
        d.push(0);
        d
    })]
    #[case::truncated(rlp::encode(&vec![0xaa; 80]).to_vec()[..40].to_vec())]
    #[case::empty(vec![])]
    fn test_exact_consumption_contract(#[case] data: Vec<u8>) {
        assert!(matches!(
            decode_item(&data),
            Err(ClaimError::MalformedEncoding(_))
        ));
    }

    #[test]
    fn test_length_of_length_bound() {
        // 3 length bytes is beyond MAX_LEN_BYTES even if the buffer agrees
        let mut data = vec![0xba, 0x00, 0x00, 0x03];
        data.extend_from_slice(&[1, 2, 3]);
        assert_eq!(
            decode_item(&data).unwrap_err(),
            ClaimError::MalformedEncoding("length of length too large")
        );
    }

    #[test]
    fn test_read_uint_window() {
        assert_eq!(read_uint(&[]).unwrap(), U256::zero());
        assert_eq!(read_uint(&[0x04, 0x00]).unwrap(), U256::from(1024u64));
        assert_eq!(read_uint(&[0xff; 32]).unwrap(), U256::max_value());
        assert!(read_uint(&[0x01; 33]).is_err());
    }

    #[test]
    fn test_decode_list_items_against_reference() {
        let fields = vec![vec![0x11; 32], vec![0x22; 32], vec![0x33; 5]];
        let data = rlp::encode_list::<Vec<u8>, _>(&fields).to_vec();
        let (items, count) = decode_list_items::<17>(&data).unwrap();
        assert_eq!(count, 3);
        let reference = rlp::Rlp::new(&data);
        for (i, field) in fields.iter().enumerate() {
            assert_eq!(items[i].payload(&data), field.as_slice());
            assert_eq!(reference.at(i).unwrap().data().unwrap(), field.as_slice());
        }
        // a scalar is not a list
        let scalar = rlp::encode(&b"dog".to_vec()).to_vec();
        assert_eq!(
            decode_list_items::<17>(&scalar).unwrap_err(),
            ClaimError::StructuralMismatch("expected a list item")
        );
    }

    #[test]
    fn test_decode_list_items_capacity() {
        // 18 items cannot fill the payload within a 17-slot scan
        let fields = vec![vec![0xab; 4]; 18];
        let data = rlp::encode_list::<Vec<u8>, _>(&fields).to_vec();
        assert_eq!(
            decode_list_items::<17>(&data).unwrap_err(),
            ClaimError::MalformedEncoding("list payload not fully consumed")
        );
    }

    fn encode_account(nonce: u64, balance: U256, storage: &[u8], code: &[u8]) -> Vec<u8> {
        let mut s = RlpStream::new_list(4);
        s.append(&nonce)
            .append(&balance)
            .append(&storage.to_vec())
            .append(&code.to_vec());
        s.out().to_vec()
    }

    #[test]
    fn test_decode_account() {
        let data = encode_account(7, U256::from(1_000_000u64), &[0x5a; 32], &[0x6b; 32]);
        let record = decode_account(&data).unwrap();
        assert_eq!(record.nonce, 7);
        assert_eq!(record.balance, U256::from(1_000_000u64));
        assert_eq!(record.storage_root, [0x5a; 32]);
        assert_eq!(record.code_root, [0x6b; 32]);
    }

    #[rstest]
    #[case::short_storage(encode_account(1, U256::one(), &[0x5a; 31], &[0x6b; 32]))]
    #[case::long_code(encode_account(1, U256::one(), &[0x5a; 32], &[0x6b; 33]))]
    fn test_decode_account_rejects_bad_commitments(#[case] data: Vec<u8>) {
        assert!(matches!(
            decode_account(&data),
            Err(ClaimError::MalformedEncoding(_))
        ));
    }

    #[test]
    fn test_decode_account_rejects_wrong_arity() {
        let mut s = RlpStream::new_list(3);
        s.append(&1u64)
            .append(&U256::one())
            .append(&vec![0x5a; 32]);
        assert_eq!(
            decode_account(&s.out()).unwrap_err(),
            ClaimError::StructuralMismatch("account record must carry exactly 4 fields")
        );
    }
}
