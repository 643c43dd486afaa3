//! Account abstraction (ERC-4337) entry point primitive types
//!
//! This crate contains the data model shared by the entry point engine and its callers: user
//! operations and their hashes, packed validation data, deposit and stake records, simulation
//! results and the entry point log.

pub mod constants;
pub mod entrypoint;
pub mod events;
mod user_operation;
mod utils;
pub mod validation;

pub use entrypoint::{
    AggregatorStakeInfo, DepositInfo, ExecutionResult, PostOpMode, ReturnInfo, StakeInfo,
    UserOpsPerAggregator, ValidationResult,
};
pub use events::EntryPointEvent;
pub use user_operation::{UserOperation, UserOperationHash, UserOperationSigned};
pub use utils::{
    account_address, as_checksum_addr, get_address, pack_factory_data, unpack_factory_data,
    CreateAccount,
};
pub use validation::ValidationData;
