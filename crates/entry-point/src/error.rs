use ethers::{
    abi::{AbiDecode, AbiEncode},
    types::{Address, Bytes, U256},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tollgate_primitives::constants::validation::entities;

/// Selector of `Error(string)`
const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

/// Entry point errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EntryPointError {
    /// Failed user operation error
    #[error("{0}")]
    FailedOp(FailedOp),

    /// Batch without user operations
    #[error("empty batch")]
    EmptyBatch,

    /// Beneficiary of the batch is the zero address
    #[error("AA90 invalid beneficiary")]
    InvalidBeneficiary,

    /// Aggregator group uses the signature failure marker as aggregator
    #[error("AA96 invalid aggregator")]
    InvalidAggregator,

    /// Entry point was entered again while processing a batch or a simulation
    #[error("ReentrancyGuard: reentrant call")]
    ReentrancyDetected,

    /// Deposit or stake operation rejected by the ledger
    #[error(transparent)]
    Stake(#[from] StakeError),
}

impl From<FailedOp> for EntryPointError {
    fn from(failed_op: FailedOp) -> Self {
        EntryPointError::FailedOp(failed_op)
    }
}

/// User operation rejected during validation (or settlement), identified by its position in the
/// batch
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("FailedOp({op_index}, {reason})")]
#[serde(rename_all = "camelCase")]
pub struct FailedOp {
    pub op_index: usize,
    pub reason: FailedOpReason,
}

impl FailedOp {
    pub fn new(op_index: usize, reason: FailedOpReason) -> Self {
        Self { op_index, reason }
    }
}

/// Why the init code of a user operation did not produce the sender
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InitCodeFailure {
    /// Factory missing, reverted or returned the zero address
    Failed(Option<Revert>),
    /// Factory returned an address different from the sender
    WrongSender(Address),
    /// Factory returned the sender but left no code there
    NoCode,
}

/// Reason codes of rejected user operations
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailedOpReason {
    #[error("AA10 sender already constructed")]
    SenderAlreadyConstructed,

    #[error("{}", init_code_failure_message(.0))]
    InitCodeFailed(InitCodeFailure),

    #[error("AA20 account not deployed")]
    AccountNotDeployed,

    #[error("AA21 didn't pay prefund")]
    PrefundNotPaid,

    #[error("AA22 expired or not due")]
    AccountExpired,

    #[error("AA23 reverted: {revert}")]
    AccountReverted { revert: Revert },

    #[error("AA24 signature error")]
    AccountSignatureError,

    #[error("AA25 invalid account nonce: expected {expected}, got {actual}")]
    InvalidNonce { expected: U256, actual: U256 },

    #[error("AA30 paymaster not deployed")]
    PaymasterNotDeployed,

    #[error("AA31 paymaster deposit too low: {deposit} < {required}")]
    PaymasterDepositTooLow { deposit: U256, required: U256 },

    #[error("AA32 paymaster expired or not due")]
    PaymasterExpired,

    #[error("AA33 reverted: {revert}")]
    PaymasterReverted { revert: Revert },

    #[error("AA34 signature error")]
    PaymasterSignatureError,

    #[error("AA40 over verificationGasLimit ({entity})")]
    ValidationOutOfGas { entity: String },

    #[error("AA51 prefund below actualGasCost")]
    PrefundBelowActualGasCost,

    #[error("AA93 invalid paymasterAndData")]
    InvalidPaymasterAndData,

    #[error("AA94 gas values overflow")]
    GasValuesOverflow,

    #[error("SignatureValidationFailed({aggregator:?})")]
    SignatureValidationFailed { aggregator: Address },
}

fn init_code_failure_message(failure: &InitCodeFailure) -> String {
    match failure {
        InitCodeFailure::Failed(None) => "AA13 initCode failed or OOG".into(),
        InitCodeFailure::Failed(Some(revert)) => format!("AA13 initCode failed or OOG: {revert}"),
        InitCodeFailure::WrongSender(addr) => {
            format!("AA14 initCode must return sender ({addr:?})")
        }
        InitCodeFailure::NoCode => "AA15 initCode must create sender".into(),
    }
}

impl FailedOpReason {
    pub fn out_of_gas(entity: &str) -> Self {
        Self::ValidationOutOfGas { entity: entity.into() }
    }

    /// Entity the failure is attributed to
    pub fn entity(&self) -> &str {
        match self {
            Self::SenderAlreadyConstructed | Self::InitCodeFailed(_) => entities::FACTORY,
            Self::PaymasterNotDeployed |
            Self::PaymasterDepositTooLow { .. } |
            Self::PaymasterExpired |
            Self::PaymasterReverted { .. } |
            Self::PaymasterSignatureError |
            Self::InvalidPaymasterAndData => entities::PAYMASTER,
            Self::ValidationOutOfGas { entity } => entity,
            Self::SignatureValidationFailed { .. } => entities::AGGREGATOR,
            _ => entities::SENDER,
        }
    }
}

/// Deposit and stake errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StakeError {
    #[error("insufficient balance: {available} < {requested}")]
    InsufficientBalance { available: U256, requested: U256 },

    #[error("invalid unstake delay: {requested} (current {current})")]
    InvalidDelay { current: u32, requested: u32 },

    #[error("no stake specified")]
    NoStake,

    #[error("not staked")]
    NotStaked,

    #[error("stake withdrawal is not due (withdraw time {withdraw_time}, now {now})")]
    StakeNotWithdrawable { withdraw_time: u64, now: u64 },
}

/// Abnormal termination of a capability call. All state changes made by the call are discarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Revert {
    /// Revert with the given revert data
    Reason(Bytes),
    /// The call exceeded its gas limit
    OutOfGas,
}

impl Revert {
    /// Reverts with `Error(string)` encoded revert data
    pub fn with_reason(reason: impl Into<String>) -> Self {
        let reason: String = reason.into();
        Self::Reason([ERROR_STRING_SELECTOR.to_vec(), reason.encode()].concat().into())
    }

    /// Raw revert data (empty when out of gas)
    pub fn data(&self) -> Bytes {
        match self {
            Self::Reason(data) => data.clone(),
            Self::OutOfGas => Bytes::default(),
        }
    }

    pub fn reason(&self) -> Option<String> {
        match self {
            Self::Reason(data) => decode_revert_string(data),
            Self::OutOfGas => None,
        }
    }
}

impl fmt::Display for Revert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reason(data) => match decode_revert_string(data) {
                Some(reason) => write!(f, "{reason}"),
                None => write!(f, "{data}"),
            },
            Self::OutOfGas => write!(f, "out of gas"),
        }
    }
}

impl From<StakeError> for Revert {
    fn from(err: StakeError) -> Self {
        Self::with_reason(err.to_string())
    }
}

impl From<EntryPointError> for Revert {
    fn from(err: EntryPointError) -> Self {
        Self::with_reason(err.to_string())
    }
}

// revert data produced by `require(cond, "reason")` and `revert("reason")` is `Error(string)`
pub fn decode_revert_string(data: &Bytes) -> Option<String> {
    if data.len() < ERROR_STRING_SELECTOR.len() {
        return None;
    }
    let (error_sig, reason) = data.split_at(ERROR_STRING_SELECTOR.len());
    if error_sig == ERROR_STRING_SELECTOR {
        <String as AbiDecode>::decode(reason).ok()
    } else {
        None
    }
}
