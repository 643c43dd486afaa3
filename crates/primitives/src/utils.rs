//! Address and init code helpers

use ethers::{
    abi::AbiEncode,
    contract::{EthAbiCodec, EthAbiType},
    types::{Address, Bytes, U256},
    utils::{get_create2_address_from_hash, keccak256, to_checksum},
};

/// Converts address to checksum address
pub fn as_checksum_addr<S>(val: &Address, s: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    s.serialize_str(&to_checksum(val, None))
}

/// If possible, parses address from the first 20 bytes
pub fn get_address(buf: &[u8]) -> Option<Address> {
    if buf.len() >= 20 {
        Some(Address::from_slice(&buf[0..20]))
    } else {
        None
    }
}

pub fn pack_factory_data(factory: Address, factory_data: Bytes) -> Vec<u8> {
    if factory.is_zero() {
        vec![]
    } else {
        [factory.0.to_vec(), factory_data.to_vec()].concat()
    }
}

pub fn unpack_factory_data(init_code: &[u8]) -> (Address, Bytes) {
    if init_code.len() > 20 {
        (Address::from_slice(&init_code[0..20]), Bytes::from(init_code[20..].to_vec()))
    } else {
        (Address::default(), Bytes::default())
    }
}

/// Factory payload carried after the factory address in the init code
#[derive(Clone, Debug, Default, PartialEq, Eq, EthAbiCodec, EthAbiType)]
pub struct CreateAccount {
    pub owner: Address,
    pub salt: U256,
}

impl CreateAccount {
    pub fn new(owner: Address, salt: U256) -> Self {
        Self { owner, salt }
    }

    /// Builds the init code deploying this account through `factory`
    pub fn init_code(&self, factory: Address) -> Bytes {
        pack_factory_data(factory, self.clone().encode().into()).into()
    }
}

/// Deterministic (counterfactual) address of the account `factory` deploys for `owner` and
/// `salt`
pub fn account_address(factory: Address, owner: Address, salt: U256) -> Address {
    let salt = keccak256([owner.encode(), salt.encode()].concat());
    get_create2_address_from_hash(factory, salt, keccak256(factory.as_bytes()))
}
