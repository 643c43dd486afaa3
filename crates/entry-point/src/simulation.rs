//! Side-effect-free views of the entry point.
//!
//! Every simulation runs against a throw-away copy of the world state: nothing a simulation does
//! is ever visible afterwards, whatever its outcome.

use crate::{
    entry_point::EntryPoint,
    error::{EntryPointError, FailedOp},
    gas::{GasMeter, SIMULATION_GAS_LIMIT},
};
use ethers::types::{Address, Bytes, U256};
use tollgate_primitives::{
    constants::validation::SIG_VALIDATION_FAILED, AggregatorStakeInfo, ExecutionResult,
    ReturnInfo, StakeInfo, UserOperationSigned, ValidationResult,
};
use tracing::debug;

impl EntryPoint {
    /// Validates `uo` as [`EntryPoint::handle_ops`] would, without executing it.
    ///
    /// Signature failures and time ranges are reported in the result instead of failing the
    /// simulation.
    pub fn simulate_validation(
        &self,
        uo: UserOperationSigned,
    ) -> Result<ValidationResult, EntryPointError> {
        let _entered = self.guard.enter()?;
        let mut state = self.state.fork();
        let mut executor = self.executor(&mut state);

        let validated = executor.validate_prepayment(0, &uo)?;
        executor.charge_prefund(0, &validated)?.discard();

        // stakes as left behind by the validation
        let validation_data = validated.validation_data();
        let stake_manager = &executor.state.stake_manager;
        let stake_info = |address: Option<Address>| -> StakeInfo {
            address
                .map(|address| stake_manager.get_deposit_info(&address).stake_info())
                .unwrap_or_default()
        };

        let account_aggregator = validated.account_validation_data.aggregator;
        let aggregator_info = if account_aggregator.is_zero() ||
            account_aggregator == *SIG_VALIDATION_FAILED
        {
            None
        } else {
            Some(AggregatorStakeInfo {
                aggregator: account_aggregator,
                stake_info: stake_info(Some(account_aggregator)),
            })
        };

        let result = ValidationResult {
            return_info: ReturnInfo {
                pre_op_gas: validated.pre_op_gas(),
                prefund: validated.required_prefund,
                sig_failed: validated.account_validation_data.is_sig_failed() ||
                    validated.paymaster_validation_data.is_sig_failed(),
                valid_after: validation_data.valid_after,
                valid_until: validation_data.valid_until_or_max(),
                paymaster_context: validated.context.clone(),
            },
            sender_info: stake_info(Some(uo.sender)),
            factory_info: stake_info(validated.factory),
            paymaster_info: stake_info(validated.paymaster),
            aggregator_info,
        };
        debug!("Simulated validation of {:?}: {result:?}", validated.uo.hash);
        Ok(result)
    }

    /// Validates and executes `uo` as [`EntryPoint::handle_ops`] would, then calls `target` with
    /// `target_call_data` on the resulting state.
    ///
    /// Validation checks are not enforced, the validation data is reported instead.
    pub fn simulate_handle_op(
        &self,
        uo: UserOperationSigned,
        target: Option<Address>,
        target_call_data: Bytes,
    ) -> Result<ExecutionResult, EntryPointError> {
        let _entered = self.guard.enter()?;
        let mut state = self.state.fork();
        let mut executor = self.executor(&mut state);

        let validated = executor.validate_prepayment(0, &uo)?;
        let prefund = executor.charge_prefund(0, &validated)?;
        let validation_data = validated.validation_data();
        let pre_op_gas = validated.pre_op_gas();

        let outcome = executor.execute_user_op(0, validated, prefund)?;

        let (target_success, target_result) = match target {
            Some(target) => {
                let entry_point = executor.entry_point;
                let mut frame = executor.frame(entry_point, SIMULATION_GAS_LIMIT.into());
                match frame.call(target, U256::zero(), &target_call_data) {
                    Ok(result) => (true, result),
                    Err(revert) => (false, revert.data()),
                }
            }
            None => (false, Bytes::default()),
        };

        Ok(ExecutionResult {
            pre_op_gas,
            paid: outcome.actual_gas_cost,
            actual_gas_used: outcome.actual_gas_used,
            valid_after: validation_data.valid_after,
            valid_until: validation_data.valid_until_or_max(),
            success: outcome.success(),
            revert_reason: outcome.revert_reason,
            target_success,
            target_result,
        })
    }

    /// Address the factory in `init_code` would deploy the account at
    pub fn get_sender_address(&self, init_code: &Bytes) -> Result<Address, EntryPointError> {
        let _entered = self.guard.enter()?;
        let mut state = self.state.fork();
        let mut executor = self.executor(&mut state);

        let mut gas = GasMeter::new(SIMULATION_GAS_LIMIT.into());
        let (_, sender) =
            executor.run_factory(init_code, &mut gas).map_err(|reason| FailedOp::new(0, reason))?;
        Ok(sender)
    }
}
