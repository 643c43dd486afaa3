//! Execution phase of a validated user operation: the call, the paymaster's post-operation
//! callback and the gas settlement

use crate::{
    error::{FailedOp, Revert},
    executor::{ExecutionOutcome, Executor, OperationStatus},
    gas::{gas_price, GasMeter, Prefund},
    validation::ValidatedUserOperation,
};
use ethers::types::{Address, Bytes, U256};
use tollgate_primitives::{EntryPointEvent, PostOpMode};
use tracing::{debug, trace, warn};

impl Executor<'_> {
    /// Executes the call of `validated` within its call gas limit, runs the paymaster's
    /// post-operation callback and settles the prefund.
    ///
    /// Fails only when the actual gas cost exceeds the prefund.
    pub(crate) fn execute_user_op(
        &mut self,
        op_index: usize,
        validated: ValidatedUserOperation,
        prefund: Prefund,
    ) -> Result<ExecutionOutcome, FailedOp> {
        let ValidatedUserOperation { uo, paymaster, context, validation_gas_used, .. } = validated;
        let gas_price = gas_price(&uo, self.env.base_fee);

        // everything past validation shares one budget: verification gas limit + call gas limit
        let mut gas = GasMeter::new(uo.verification_gas_limit.saturating_add(uo.call_gas_limit));
        gas.record(validation_gas_used);

        let snapshot = self.state.snapshot();
        let (mut status, mut revert_reason) = if uo.call_data.is_empty() {
            (OperationStatus::Succeeded, None)
        } else {
            let account = self.state.code(&uo.sender).and_then(|code| code.as_account());
            let mut frame = self.frame(uo.sender, uo.call_gas_limit);
            let res = match account {
                Some(account) => account.execute(&mut frame, &uo.call_data),
                None => Err(Revert::with_reason("account not deployed")),
            };
            let used = frame.gas_used();
            gas.record(used);

            match res {
                Ok(_) => (OperationStatus::Succeeded, None),
                Err(revert) => {
                    debug!("User operation {:?} call reverted: {revert}", uo.hash);
                    self.state.revert_to(snapshot.clone());
                    let revert_reason = revert.data();
                    if !revert_reason.is_empty() {
                        self.state.emit(EntryPointEvent::UserOperationRevertReason {
                            user_op_hash: uo.hash,
                            sender: uo.sender,
                            nonce: uo.nonce,
                            revert_reason: revert_reason.clone(),
                        });
                    }
                    (OperationStatus::Reverted, Some(revert_reason))
                }
            }
        };

        if let Some(paymaster) = paymaster.filter(|_| !context.is_empty()) {
            let mode = match status {
                OperationStatus::Succeeded => PostOpMode::OpSucceeded,
                _ => PostOpMode::OpReverted,
            };
            let cost = actual_gas_cost(uo.pre_verification_gas, &gas, gas_price);
            if let Err(revert) = self.post_op(paymaster, mode, &context, cost, &mut gas) {
                warn!("Paymaster {paymaster:?} post op of {:?} reverted: {revert}", uo.hash);
                self.state.revert_to(snapshot.clone());
                status = OperationStatus::PostOpReverted;
                revert_reason = Some(revert.data());

                let mode = PostOpMode::PostOpReverted;
                let cost = actual_gas_cost(uo.pre_verification_gas, &gas, gas_price);
                if let Err(revert) = self.post_op(paymaster, mode, &context, cost, &mut gas) {
                    warn!("Paymaster {paymaster:?} second post op reverted: {revert}");
                    self.state.revert_to(snapshot);
                }
            }
        }

        let actual_gas_used = uo.pre_verification_gas.saturating_add(gas.used());
        let actual_gas_cost = actual_gas_used.saturating_mul(gas_price);
        let settlement = prefund
            .settle(&mut self.state.stake_manager, actual_gas_cost)
            .map_err(|reason| FailedOp::new(op_index, reason))?;
        trace!(
            "Settled {:?}: {actual_gas_used} gas at {gas_price}, refunded {} to {:?}",
            uo.hash,
            settlement.refund,
            settlement.payer
        );

        let success = status == OperationStatus::Succeeded;
        self.state.emit(EntryPointEvent::UserOperationEvent {
            user_op_hash: uo.hash,
            sender: uo.sender,
            paymaster: paymaster.unwrap_or_default(),
            nonce: uo.nonce,
            success,
            actual_gas_cost,
            actual_gas_used,
        });

        Ok(ExecutionOutcome {
            user_op_hash: uo.hash,
            sender: uo.sender,
            paymaster,
            nonce: uo.nonce,
            status,
            actual_gas_used,
            actual_gas_cost,
            revert_reason,
        })
    }

    /// Calls the paymaster's post-operation callback with whatever is left of the user
    /// operation's gas budget. A reverted callback leaves no trace in the state.
    fn post_op(
        &mut self,
        paymaster: Address,
        mode: PostOpMode,
        context: &Bytes,
        actual_gas_cost: U256,
        gas: &mut GasMeter,
    ) -> Result<(), Revert> {
        let code = self
            .state
            .code(&paymaster)
            .and_then(|code| code.as_paymaster())
            .ok_or_else(|| Revert::with_reason("paymaster not deployed"))?;

        let snapshot = self.state.snapshot();
        let mut frame = self.frame(paymaster, gas.remaining());
        let res = code.post_op(&mut frame, mode, context, actual_gas_cost);
        let used = frame.gas_used();
        gas.record(used);

        if res.is_err() {
            self.state.revert_to(snapshot);
        }
        res
    }
}

fn actual_gas_cost(pre_verification_gas: U256, gas: &GasMeter, gas_price: U256) -> U256 {
    pre_verification_gas.saturating_add(gas.used()).saturating_mul(gas_price)
}
