//! Entry point log entries

use crate::UserOperationHash;
use ethers::types::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

/// Entries the entry point appends to its log
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "PascalCase")]
pub enum EntryPointEvent {
    #[serde(rename_all = "camelCase")]
    Deposited { account: Address, total_deposit: U256 },

    #[serde(rename_all = "camelCase")]
    Withdrawn { account: Address, withdraw_address: Address, amount: U256 },

    #[serde(rename_all = "camelCase")]
    StakeLocked { account: Address, total_staked: U256, unstake_delay_sec: u32 },

    #[serde(rename_all = "camelCase")]
    StakeUnlocked { account: Address, withdraw_time: u64 },

    #[serde(rename_all = "camelCase")]
    StakeWithdrawn { account: Address, withdraw_address: Address, amount: U256 },

    /// An account was deployed from the user operation's init code
    #[serde(rename_all = "camelCase")]
    AccountDeployed {
        user_op_hash: UserOperationHash,
        sender: Address,
        factory: Address,
        paymaster: Address,
    },

    /// Aggregator used for the following user operations (zero when the group ends)
    #[serde(rename_all = "camelCase")]
    SignatureAggregatorChanged { aggregator: Address },

    /// One per user operation that passed validation
    #[serde(rename_all = "camelCase")]
    UserOperationEvent {
        user_op_hash: UserOperationHash,
        sender: Address,
        /// Zero if the sender paid for itself
        paymaster: Address,
        nonce: U256,
        success: bool,
        actual_gas_cost: U256,
        actual_gas_used: U256,
    },

    /// Revert data of a user operation's call, preserved byte-for-byte
    #[serde(rename_all = "camelCase")]
    UserOperationRevertReason {
        user_op_hash: UserOperationHash,
        sender: Address,
        nonce: U256,
        revert_reason: Bytes,
    },

    /// One per user operation that failed validation (nothing executed, nothing charged)
    #[serde(rename_all = "camelCase")]
    UserOperationRejected {
        user_op_hash: UserOperationHash,
        sender: Address,
        nonce: U256,
        op_index: usize,
        reason: String,
    },
}

impl EntryPointEvent {
    /// Hash of the user operation the entry refers to (if any)
    pub fn user_op_hash(&self) -> Option<UserOperationHash> {
        match self {
            Self::AccountDeployed { user_op_hash, .. } |
            Self::UserOperationEvent { user_op_hash, .. } |
            Self::UserOperationRevertReason { user_op_hash, .. } |
            Self::UserOperationRejected { user_op_hash, .. } => Some(*user_op_hash),
            _ => None,
        }
    }
}
