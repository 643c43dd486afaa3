//! Basic transaction type for account abstraction (ERC-4337)

mod hash;

use crate::{constants::nonce::SEQUENCE_BITS, get_address, utils::as_checksum_addr};
use ethers::{
    abi::AbiEncode,
    contract::{EthAbiCodec, EthAbiType},
    types::{Address, Bytes, H256, U256},
    utils::keccak256,
};
pub use hash::UserOperationHash;
use serde::{Deserialize, Serialize};
use std::ops::Deref;

/// Signed user operation together with its hash (bound to an entry point and a chain)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserOperation {
    pub hash: UserOperationHash,
    pub user_operation: UserOperationSigned,
}

impl UserOperation {
    pub fn new(hash: UserOperationHash, user_operation: UserOperationSigned) -> Self {
        Self { hash, user_operation }
    }
}

impl Deref for UserOperation {
    type Target = UserOperationSigned;

    fn deref(&self) -> &Self::Target {
        &self.user_operation
    }
}

/// User operation as submitted by a bundler
#[derive(Default, Clone, Debug, PartialEq, Eq, EthAbiCodec, EthAbiType, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationSigned {
    #[serde(serialize_with = "as_checksum_addr")]
    pub sender: Address,
    /// 192-bit key followed by a 64-bit sequence
    pub nonce: U256,
    /// Factory address followed by the factory call data, empty once the account exists
    pub init_code: Bytes,
    pub call_data: Bytes,
    pub call_gas_limit: U256,
    /// Gas of the whole validation phase (factory, account and paymaster)
    pub verification_gas_limit: U256,
    /// Gas charged on top of the metered gas (calldata, bundle overhead)
    pub pre_verification_gas: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    /// Paymaster address followed by paymaster specific data, empty when the sender pays
    pub paymaster_and_data: Bytes,
    pub signature: Bytes,
}

/// ABI layout hashed into the user operation hash: dynamic fields replaced by their keccak256
#[derive(EthAbiCodec, EthAbiType)]
struct PackedUserOperation {
    pub sender: Address,
    pub nonce: U256,
    pub init_code: H256,
    pub call_data: H256,
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub paymaster_and_data: H256,
}

impl From<&UserOperationSigned> for PackedUserOperation {
    fn from(value: &UserOperationSigned) -> Self {
        Self {
            sender: value.sender,
            nonce: value.nonce,
            init_code: keccak256(value.init_code.deref()).into(),
            call_data: keccak256(value.call_data.deref()).into(),
            call_gas_limit: value.call_gas_limit,
            verification_gas_limit: value.verification_gas_limit,
            pre_verification_gas: value.pre_verification_gas,
            max_fee_per_gas: value.max_fee_per_gas,
            max_priority_fee_per_gas: value.max_priority_fee_per_gas,
            paymaster_and_data: keccak256(value.paymaster_and_data.deref()).into(),
        }
    }
}

impl UserOperationSigned {
    /// ABI encoding of every field but the signature
    pub fn pack_without_signature(&self) -> Bytes {
        PackedUserOperation::from(self).encode().into()
    }

    /// `keccak256(keccak256(pack_without_signature) ++ entry_point ++ chain_id)`. The signature is
    /// not covered.
    pub fn hash(&self, entry_point: &Address, chain_id: u64) -> UserOperationHash {
        let packed = keccak256(self.pack_without_signature());
        let preimage = (H256::from(packed), *entry_point, U256::from(chain_id)).encode();
        H256::from(keccak256(preimage)).into()
    }

    /// Key part of the nonce (upper 192 bits)
    pub fn nonce_key(&self) -> U256 {
        self.nonce >> SEQUENCE_BITS
    }

    /// Sequence part of the nonce (lower 64 bits)
    pub fn nonce_sequence(&self) -> u64 {
        self.nonce.low_u64()
    }

    /// Factory address from the init code (if present)
    pub fn factory(&self) -> Option<Address> {
        get_address(&self.init_code)
    }

    /// Paymaster address from the paymaster and data field (if present)
    pub fn paymaster(&self) -> Option<Address> {
        get_address(&self.paymaster_and_data)
    }

    // builder

    pub fn sender(mut self, sender: Address) -> Self {
        self.sender = sender;
        self
    }

    pub fn nonce(mut self, nonce: U256) -> Self {
        self.nonce = nonce;
        self
    }

    pub fn init_code(mut self, init_code: Bytes) -> Self {
        self.init_code = init_code;
        self
    }

    pub fn call_data(mut self, call_data: Bytes) -> Self {
        self.call_data = call_data;
        self
    }

    pub fn call_gas_limit(mut self, call_gas_limit: U256) -> Self {
        self.call_gas_limit = call_gas_limit;
        self
    }

    pub fn verification_gas_limit(mut self, verification_gas_limit: U256) -> Self {
        self.verification_gas_limit = verification_gas_limit;
        self
    }

    pub fn pre_verification_gas(mut self, pre_verification_gas: U256) -> Self {
        self.pre_verification_gas = pre_verification_gas;
        self
    }

    pub fn max_fee_per_gas(mut self, max_fee_per_gas: U256) -> Self {
        self.max_fee_per_gas = max_fee_per_gas;
        self
    }

    pub fn max_priority_fee_per_gas(mut self, max_priority_fee_per_gas: U256) -> Self {
        self.max_priority_fee_per_gas = max_priority_fee_per_gas;
        self
    }

    pub fn paymaster_and_data(mut self, paymaster_and_data: Bytes) -> Self {
        self.paymaster_and_data = paymaster_and_data;
        self
    }

    pub fn signature(mut self, signature: Bytes) -> Self {
        self.signature = signature;
        self
    }

    /// User operation with a random sender and just enough gas to be valid
    #[cfg(feature = "test-utils")]
    pub fn random() -> Self {
        UserOperationSigned::default()
            .sender(Address::random())
            .verification_gas_limit(100_000.into())
            .pre_verification_gas(21_000.into())
            .max_priority_fee_per_gas(1_000_000_000.into())
    }
}
