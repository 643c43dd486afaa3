//! Account abstraction (ERC-4337)-related constants

/// Entry point
pub mod entry_point {
    /// Address of the canonical entry point smart contract
    pub const ADDRESS: &str = "0x5FF137D4b0FDCD49DcA30c7CF57E578a026d2789";
    /// Version of the entry point protocol implemented by the engine
    pub const VERSION: &str = "0.6.0";
}

/// User operation validation
pub mod validation {
    use ethers::types::{Address, U256};
    use lazy_static::lazy_static;

    /// Number of bits every gas and fee field of a user operation has to fit into
    pub const MAX_GAS_VALUE_BITS: usize = 120;

    lazy_static! {
        /// Aggregator marker returned by an account or paymaster whose signature check failed
        pub static ref SIG_VALIDATION_FAILED: Address = Address::from_low_u64_be(1);
        /// Exclusive upper bound of every gas and fee field (2^120)
        pub static ref MAX_GAS_VALUE: U256 = U256::one() << MAX_GAS_VALUE_BITS;
    }

    /// Entities (factory, sender/account, paymaster, aggregator)
    pub mod entities {
        pub const FACTORY: &str = "factory";
        pub const SENDER: &str = "account";
        pub const PAYMASTER: &str = "paymaster";
        pub const AGGREGATOR: &str = "aggregator";
    }
}

/// Nonce layout (192-bit key, 64-bit sequence)
pub mod nonce {
    /// Number of low bits holding the sequence number
    pub const SEQUENCE_BITS: usize = 64;
}
