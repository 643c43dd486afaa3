//! Per user operation state machine: validating, executing, settling the paymaster, compensating

use crate::{
    context::CallContext,
    error::{FailedOp, FailedOpReason},
    guard::ReentrancyGuard,
    state::{BlockEnv, WorldState},
};
use ethers::types::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};
use tollgate_primitives::{EntryPointEvent, UserOperationHash, UserOperationSigned};
use tracing::{debug, warn};

/// Terminal state of a user operation in a batch
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationStatus {
    /// Validated, executed and settled
    Succeeded,
    /// Validated and settled, the call reverted (its effects were discarded)
    Reverted,
    /// Validated and settled, the paymaster's post-operation callback reverted (the call's
    /// effects were discarded)
    PostOpReverted,
    /// Not accepted. Nothing executed and nothing was charged.
    Rejected(FailedOp),
}

/// Outcome of a single user operation of a batch
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOutcome {
    pub user_op_hash: UserOperationHash,
    pub sender: Address,
    pub paymaster: Option<Address>,
    pub nonce: U256,
    pub status: OperationStatus,
    pub actual_gas_used: U256,
    pub actual_gas_cost: U256,
    /// Revert data of the call (or of the post-operation callback)
    pub revert_reason: Option<Bytes>,
}

impl ExecutionOutcome {
    pub fn success(&self) -> bool {
        self.status == OperationStatus::Succeeded
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self.status, OperationStatus::Rejected(_))
    }

    /// Reason code of a rejected user operation
    pub fn failed_op(&self) -> Option<&FailedOp> {
        match &self.status {
            OperationStatus::Rejected(failed_op) => Some(failed_op),
            _ => None,
        }
    }
}

/// Summary of a processed batch
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleReceipt {
    pub beneficiary: Address,
    /// Sum of the actual gas cost of every settled user operation, paid to the beneficiary
    pub collected: U256,
    pub outcomes: Vec<ExecutionOutcome>,
    /// Log entries emitted while processing the batch
    pub logs: Vec<EntryPointEvent>,
}

impl BundleReceipt {
    pub fn rejected(&self) -> impl Iterator<Item = &ExecutionOutcome> {
        self.outcomes.iter().filter(|outcome| outcome.is_rejected())
    }
}

/// Runs user operations against a world state
pub(crate) struct Executor<'a> {
    pub(crate) state: &'a mut WorldState,
    pub(crate) env: &'a BlockEnv,
    pub(crate) guard: &'a ReentrancyGuard,
    pub(crate) entry_point: Address,
    pub(crate) chain_id: u64,
}

impl<'a> Executor<'a> {
    pub(crate) fn new(
        state: &'a mut WorldState,
        env: &'a BlockEnv,
        guard: &'a ReentrancyGuard,
        entry_point: Address,
        chain_id: u64,
    ) -> Self {
        Self { state, env, guard, entry_point, chain_id }
    }

    /// Call frame of `address`, called by the entry point
    pub(crate) fn frame(&mut self, address: Address, gas_limit: U256) -> CallContext<'_> {
        CallContext::new(
            &mut *self.state,
            self.env,
            self.guard,
            self.entry_point,
            address,
            self.entry_point,
            gas_limit,
        )
    }

    pub(crate) fn user_op_hash(&self, uo: &UserOperationSigned) -> UserOperationHash {
        uo.hash(&self.entry_point, self.chain_id)
    }

    /// Runs a single user operation to its terminal state.
    ///
    /// A rejected user operation leaves no trace in the state besides its
    /// [`EntryPointEvent::UserOperationRejected`] log entry.
    pub(crate) fn process_user_operation(
        &mut self,
        op_index: usize,
        uo: &UserOperationSigned,
        aggregator: Address,
    ) -> ExecutionOutcome {
        let snapshot = self.state.snapshot();

        let res = self
            .validate_prepayment(op_index, uo)
            .and_then(|validated| {
                self.check_validation_data(op_index, &validated, aggregator)?;
                let prefund = self.charge_prefund(op_index, &validated)?;
                Ok((validated, prefund))
            })
            .and_then(|(validated, prefund)| self.execute_user_op(op_index, validated, prefund));

        match res {
            Ok(outcome) => outcome,
            Err(failed_op) => {
                self.state.revert_to(snapshot);
                self.reject(uo, failed_op)
            }
        }
    }

    /// Records `failed_op` as the terminal state of `uo`
    pub(crate) fn reject(
        &mut self,
        uo: &UserOperationSigned,
        failed_op: FailedOp,
    ) -> ExecutionOutcome {
        let user_op_hash = self.user_op_hash(uo);
        warn!("User operation {user_op_hash:?} from {:?} rejected: {failed_op}", uo.sender);

        self.state.emit(EntryPointEvent::UserOperationRejected {
            user_op_hash,
            sender: uo.sender,
            nonce: uo.nonce,
            op_index: failed_op.op_index,
            reason: failed_op.reason.to_string(),
        });

        ExecutionOutcome {
            user_op_hash,
            sender: uo.sender,
            paymaster: uo.paymaster(),
            nonce: uo.nonce,
            status: OperationStatus::Rejected(failed_op),
            actual_gas_used: U256::zero(),
            actual_gas_cost: U256::zero(),
            revert_reason: None,
        }
    }

    pub(crate) fn reject_all(
        &mut self,
        op_index: usize,
        uos: &[UserOperationSigned],
        reason: FailedOpReason,
    ) -> Vec<ExecutionOutcome> {
        debug!("Rejecting {} user operations: {reason}", uos.len());
        uos.iter()
            .enumerate()
            .map(|(i, uo)| self.reject(uo, FailedOp::new(op_index + i, reason.clone())))
            .collect()
    }
}
