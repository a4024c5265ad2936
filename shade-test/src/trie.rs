use std::sync::Arc;

use eth_trie::{EthTrie, MemoryDB, Trie};
use ethereum_types::U256;
use rlp::RlpStream;
use shade_core::{
    derive::keccak256,
    types::{Address, Hash},
};

/// A reference account living in a test trie.
#[derive(Clone, Debug)]
pub struct TestAccount {
    pub address: Address,
    pub nonce: u64,
    pub balance: U256,
    pub storage_root: Hash,
    pub code_root: Hash,
}

impl TestAccount {
    /// Deterministic account: the storage and code commitments are derived
    /// from the address so tests can assert on them.
    pub fn new(address: Address, balance: U256) -> Self {
        Self {
            address,
            nonce: 1,
            balance,
            storage_root: keccak256(&[address.as_slice(), b"storage"].concat()),
            code_root: keccak256(&[address.as_slice(), b"code"].concat()),
        }
    }

    /// The account record as stored in the trie leaf.
    pub fn encode(&self) -> Vec<u8> {
        let mut s = RlpStream::new_list(4);
        s.append(&self.nonce)
            .append(&self.balance)
            .append(&self.storage_root.to_vec())
            .append(&self.code_root.to_vec());
        s.out().to_vec()
    }
}

/// Builds an account trie holding `target` plus `fillers` sibling entries.
/// Sibling keys share the target key's first byte(s) so the proved path
/// goes through extension and branch nodes, not just a lone leaf.
pub fn build_account_trie(target: &TestAccount, fillers: usize) -> (EthTrie<MemoryDB>, Hash) {
    let memdb = Arc::new(MemoryDB::new(true));
    let mut trie = EthTrie::new(Arc::clone(&memdb));

    let key = keccak256(&target.address);
    trie.insert(&key, &target.encode()).expect("can't insert");
    for i in 0..fillers {
        // diverge from the target key at byte 1 or 2, keeping the shared
        // prefix that forces an extension at the top of the trie
        let mut sibling_key = key;
        sibling_key[1 + i % 2] ^= (i / 2 + 1) as u8;
        let filler = TestAccount::new([i as u8; 20], U256::from(1 + i as u64));
        trie.insert(&sibling_key, &filler.encode())
            .expect("can't insert");
    }
    let root = trie.root_hash().expect("root hash problem");
    (trie, root.0)
}

/// The raw proof nodes for `address`, root first.
pub fn account_proof_nodes(trie: &mut EthTrie<MemoryDB>, address: &Address) -> Vec<Vec<u8>> {
    trie.get_proof(&keccak256(address)).expect("can't prove")
}
