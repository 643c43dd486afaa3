//! Two-dimensional account nonces: a 192-bit key selecting an independent 64-bit sequence

use ethers::types::{Address, U256};
use std::collections::HashMap;
use tollgate_primitives::constants::nonce::SEQUENCE_BITS;

#[derive(Clone, Debug, Default)]
pub struct NonceManager {
    sequences: HashMap<(Address, U256), u64>,
}

impl NonceManager {
    /// Full nonce (`key << 64 | sequence`) the next user operation of `sender` with `key` has
    /// to carry
    pub fn get_nonce(&self, sender: &Address, key: U256) -> U256 {
        let sequence = self.sequences.get(&(*sender, key)).copied().unwrap_or_default();
        (key << SEQUENCE_BITS) | U256::from(sequence)
    }

    /// Manually bumps the sequence of `key` (invalidates the pending nonce)
    pub fn increment_nonce(&mut self, sender: Address, key: U256) {
        let sequence = self.sequences.entry((sender, key)).or_default();
        *sequence = sequence.saturating_add(1);
    }

    /// Consumes `nonce` if it is the expected next nonce of its key
    pub fn validate_and_update_nonce(&mut self, sender: Address, nonce: U256) -> bool {
        let key = nonce >> SEQUENCE_BITS;
        let sequence = self.sequences.entry((sender, key)).or_default();
        if nonce.low_u64() != *sequence || *sequence == u64::MAX {
            return false;
        }
        *sequence += 1;
        true
    }
}
