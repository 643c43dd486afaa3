//! Entry point records: deposits, stakes, simulation results and aggregated batches

use crate::{utils::as_checksum_addr, UserOperationSigned};
use ethers::types::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Deposit and stake of an entity (account, paymaster, factory or aggregator)
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositInfo {
    /// Balance spendable for gas
    pub deposit: U256,
    /// Whether the stake is locked (unlock not requested yet)
    pub staked: bool,
    /// Anti-spam collateral, separate from the deposit
    pub stake: U256,
    pub unstake_delay_sec: u32,
    /// Set by `unlock_stake`, stake can be withdrawn once this timestamp is reached
    pub withdraw_time: u64,
}

impl DepositInfo {
    pub fn stake_info(&self) -> StakeInfo {
        StakeInfo { stake: self.stake, unstake_delay_sec: self.unstake_delay_sec.into() }
    }
}

/// Stake info
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StakeInfo {
    pub stake: U256,
    pub unstake_delay_sec: U256,
}

impl StakeInfo {
    pub fn is_staked(&self) -> bool {
        self.stake > U256::zero() && self.unstake_delay_sec > U256::zero()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatorStakeInfo {
    #[serde(serialize_with = "as_checksum_addr")]
    pub aggregator: Address,
    pub stake_info: StakeInfo,
}

/// Gas and validity information gathered while validating a user operation
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnInfo {
    /// Gas used by validation plus the pre-verification gas
    pub pre_op_gas: U256,
    pub prefund: U256,
    /// Account or paymaster reported a signature failure
    pub sig_failed: bool,
    pub valid_after: u64,
    pub valid_until: u64,
    pub paymaster_context: Bytes,
}

/// Result of validation-only simulation
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub return_info: ReturnInfo,
    pub sender_info: StakeInfo,
    pub factory_info: StakeInfo,
    pub paymaster_info: StakeInfo,
    /// Present when the account deferred its signature check to an aggregator
    pub aggregator_info: Option<AggregatorStakeInfo>,
}

/// Result of a simulated validation + execution of a single user operation
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub pre_op_gas: U256,
    /// Actual gas cost charged to the payer
    pub paid: U256,
    pub actual_gas_used: U256,
    pub valid_after: u64,
    pub valid_until: u64,
    /// Whether the account's call (and the paymaster's post-op, if any) succeeded
    pub success: bool,
    /// Raw revert data of the account's call
    pub revert_reason: Option<Bytes>,
    pub target_success: bool,
    pub target_result: Bytes,
}

/// Mode passed to the paymaster's post-op callback
#[derive(
    Clone, Copy, Debug, Display, EnumString, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[strum(serialize_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum PostOpMode {
    /// User operation succeeded
    OpSucceeded,
    /// User operation reverted, paymaster still has to pay for gas
    OpReverted,
    /// The first post-op call reverted, this is the second call
    PostOpReverted,
}

/// User operations sharing one signature aggregator
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOpsPerAggregator {
    pub user_ops: Vec<UserOperationSigned>,
    #[serde(serialize_with = "as_checksum_addr")]
    pub aggregator: Address,
    /// Aggregated signature
    pub signature: Bytes,
}
