//! Validation phase of a user operation: account deployment, account and paymaster validation,
//! validation data checks and the prefund charge

use crate::{
    error::{FailedOp, FailedOpReason, InitCodeFailure, Revert},
    executor::Executor,
    gas::{check_gas_values, required_prefund, GasMeter, Prefund},
};
use ethers::types::{Address, Bytes, U256};
use tollgate_primitives::{
    constants::validation::entities, unpack_factory_data, EntryPointEvent, UserOpsPerAggregator,
    UserOperation, UserOperationSigned, ValidationData,
};
use tracing::{debug, trace};

/// User operation accepted by its account (and paymaster)
#[derive(Debug, Clone)]
pub(crate) struct ValidatedUserOperation {
    pub uo: UserOperation,
    pub factory: Option<Address>,
    pub paymaster: Option<Address>,
    /// Post-operation context returned by the paymaster
    pub context: Bytes,
    pub account_validation_data: ValidationData,
    pub paymaster_validation_data: ValidationData,
    pub required_prefund: U256,
    /// Gas spent by the factory, the account and the paymaster
    pub validation_gas_used: U256,
}

impl ValidatedUserOperation {
    /// Entity whose deposit pays for the user operation
    pub fn payer(&self) -> Address {
        self.paymaster.unwrap_or(self.uo.sender)
    }

    /// Pre-verification gas plus gas used during validation
    pub fn pre_op_gas(&self) -> U256 {
        self.uo.pre_verification_gas.saturating_add(self.validation_gas_used)
    }

    /// Validation data of the account intersected with the paymaster's
    pub fn validation_data(&self) -> ValidationData {
        self.account_validation_data.intersect(&self.paymaster_validation_data)
    }
}

impl Executor<'_> {
    /// Deploys the sender if needed and lets the account (and the paymaster) accept the user
    /// operation. Everything runs within the verification gas limit.
    pub(crate) fn validate_prepayment(
        &mut self,
        op_index: usize,
        uo: &UserOperationSigned,
    ) -> Result<ValidatedUserOperation, FailedOp> {
        let fail = |reason| FailedOp::new(op_index, reason);

        check_gas_values(uo).map_err(fail)?;
        let paymaster = match uo.paymaster_and_data.len() {
            0 => None,
            1..=19 => return Err(fail(FailedOpReason::InvalidPaymasterAndData)),
            _ => uo.paymaster(),
        };

        let uo = UserOperation::new(self.user_op_hash(uo), uo.clone());
        let required_prefund = required_prefund(&uo);
        let mut gas = GasMeter::new(uo.verification_gas_limit);

        let factory = if uo.init_code.is_empty() {
            None
        } else {
            Some(self.create_sender(&uo, paymaster, &mut gas).map_err(fail)?)
        };

        let account_validation_data = self
            .validate_account(&uo, paymaster.is_none(), required_prefund, &mut gas)
            .map_err(fail)?;

        let (context, paymaster_validation_data) = match paymaster {
            Some(paymaster) => self
                .validate_paymaster(&uo, paymaster, required_prefund, &mut gas)
                .map_err(fail)?,
            None => (Bytes::default(), ValidationData::valid()),
        };

        trace!("User operation {:?} validated with {} gas", uo.hash, gas.used());

        Ok(ValidatedUserOperation {
            uo,
            factory,
            paymaster,
            context,
            account_validation_data,
            paymaster_validation_data,
            required_prefund,
            validation_gas_used: gas.used(),
        })
    }

    /// Runs the factory of the init code and returns the factory address
    fn create_sender(
        &mut self,
        uo: &UserOperation,
        paymaster: Option<Address>,
        gas: &mut GasMeter,
    ) -> Result<Address, FailedOpReason> {
        if self.state.has_code(&uo.sender) {
            return Err(FailedOpReason::SenderAlreadyConstructed);
        }

        let (factory, sender) = self.run_factory(&uo.init_code, gas)?;
        if sender != uo.sender {
            return Err(FailedOpReason::InitCodeFailed(InitCodeFailure::WrongSender(sender)));
        }
        if !self.state.has_code(&sender) {
            return Err(FailedOpReason::InitCodeFailed(InitCodeFailure::NoCode));
        }

        debug!("Account {sender:?} deployed by factory {factory:?}");
        self.state.emit(EntryPointEvent::AccountDeployed {
            user_op_hash: uo.hash,
            sender,
            factory,
            paymaster: paymaster.unwrap_or_default(),
        });
        Ok(factory)
    }

    /// Calls the factory encoded in `init_code`. Returns the factory and the address it created.
    pub(crate) fn run_factory(
        &mut self,
        init_code: &Bytes,
        gas: &mut GasMeter,
    ) -> Result<(Address, Address), FailedOpReason> {
        let (factory, data) = unpack_factory_data(init_code);
        let code = self
            .state
            .code(&factory)
            .and_then(|code| code.as_factory())
            .ok_or(FailedOpReason::InitCodeFailed(InitCodeFailure::Failed(None)))?;

        let mut frame = self.frame(factory, gas.remaining());
        let res = code.create_account(&mut frame, &data);
        let used = frame.gas_used();
        gas.consume(used).map_err(|_| FailedOpReason::out_of_gas(entities::FACTORY))?;

        match res {
            Ok(sender) if sender.is_zero() => {
                Err(FailedOpReason::InitCodeFailed(InitCodeFailure::Failed(None)))
            }
            Ok(sender) => Ok((factory, sender)),
            Err(Revert::OutOfGas) => Err(FailedOpReason::out_of_gas(entities::FACTORY)),
            Err(revert) => {
                Err(FailedOpReason::InitCodeFailed(InitCodeFailure::Failed(Some(revert))))
            }
        }
    }

    /// Consumes the nonce and calls the account. The account is asked to top up its deposit
    /// when it pays for itself.
    fn validate_account(
        &mut self,
        uo: &UserOperation,
        self_paid: bool,
        required_prefund: U256,
        gas: &mut GasMeter,
    ) -> Result<ValidationData, FailedOpReason> {
        if uo.sender.is_zero() {
            return Err(FailedOpReason::AccountNotDeployed);
        }
        let account = self
            .state
            .code(&uo.sender)
            .and_then(|code| code.as_account())
            .ok_or(FailedOpReason::AccountNotDeployed)?;

        let expected = self.state.nonce_manager.get_nonce(&uo.sender, uo.nonce_key());
        if !self.state.nonce_manager.validate_and_update_nonce(uo.sender, uo.nonce) {
            return Err(FailedOpReason::InvalidNonce { expected, actual: uo.nonce });
        }

        let missing_account_funds = if self_paid {
            required_prefund.saturating_sub(self.state.stake_manager.balance_of(&uo.sender))
        } else {
            U256::zero()
        };

        let mut frame = self.frame(uo.sender, gas.remaining());
        let res = account.validate_user_op(
            &mut frame,
            &uo.user_operation,
            uo.hash,
            missing_account_funds,
        );
        let used = frame.gas_used();
        gas.consume(used).map_err(|_| FailedOpReason::out_of_gas(entities::SENDER))?;

        match res {
            Ok(validation_data) => Ok(validation_data),
            Err(Revert::OutOfGas) => Err(FailedOpReason::out_of_gas(entities::SENDER)),
            Err(revert) => Err(FailedOpReason::AccountReverted { revert }),
        }
    }

    fn validate_paymaster(
        &mut self,
        uo: &UserOperation,
        paymaster: Address,
        required_prefund: U256,
        gas: &mut GasMeter,
    ) -> Result<(Bytes, ValidationData), FailedOpReason> {
        let code = self
            .state
            .code(&paymaster)
            .and_then(|code| code.as_paymaster())
            .ok_or(FailedOpReason::PaymasterNotDeployed)?;

        let deposit = self.state.stake_manager.balance_of(&paymaster);
        if deposit < required_prefund {
            return Err(FailedOpReason::PaymasterDepositTooLow {
                deposit,
                required: required_prefund,
            });
        }

        let mut frame = self.frame(paymaster, gas.remaining());
        let res = code.validate_paymaster_user_op(
            &mut frame,
            &uo.user_operation,
            uo.hash,
            required_prefund,
        );
        let used = frame.gas_used();
        gas.consume(used).map_err(|_| FailedOpReason::out_of_gas(entities::PAYMASTER))?;

        match res {
            Ok(res) => Ok(res),
            Err(Revert::OutOfGas) => Err(FailedOpReason::out_of_gas(entities::PAYMASTER)),
            Err(revert) => Err(FailedOpReason::PaymasterReverted { revert }),
        }
    }

    /// Signature and time range checks of the account's and the paymaster's validation data.
    ///
    /// `aggregator` is the aggregator the account has to report: zero for self-validated user
    /// operations.
    pub(crate) fn check_validation_data(
        &self,
        op_index: usize,
        validated: &ValidatedUserOperation,
        aggregator: Address,
    ) -> Result<(), FailedOp> {
        let now = self.env.timestamp;
        let fail = |reason| Err(FailedOp::new(op_index, reason));

        let account = &validated.account_validation_data;
        if account.aggregator != aggregator {
            return fail(FailedOpReason::AccountSignatureError);
        }
        if account.is_out_of_time_range(now) {
            return fail(FailedOpReason::AccountExpired);
        }

        let paymaster = &validated.paymaster_validation_data;
        if !paymaster.aggregator.is_zero() {
            return fail(FailedOpReason::PaymasterSignatureError);
        }
        if paymaster.is_out_of_time_range(now) {
            return fail(FailedOpReason::PaymasterExpired);
        }

        Ok(())
    }

    /// Debits the required prefund from the payer's deposit
    pub(crate) fn charge_prefund(
        &mut self,
        op_index: usize,
        validated: &ValidatedUserOperation,
    ) -> Result<Prefund, FailedOp> {
        let payer = validated.payer();
        Prefund::charge(&mut self.state.stake_manager, payer, validated.required_prefund).map_err(
            |err| {
                debug!("Prefund of {payer:?} failed: {err}");
                let reason = match validated.paymaster {
                    Some(_) => FailedOpReason::PaymasterDepositTooLow {
                        deposit: self.state.stake_manager.balance_of(&payer),
                        required: validated.required_prefund,
                    },
                    None => FailedOpReason::PrefundNotPaid,
                };
                FailedOp::new(op_index, reason)
            },
        )
    }

    /// Lets the aggregator of a group validate the aggregated signature
    pub(crate) fn validate_aggregated_signatures(
        &self,
        group: &UserOpsPerAggregator,
    ) -> Result<(), FailedOpReason> {
        if group.aggregator.is_zero() {
            return Ok(());
        }

        let fail = FailedOpReason::SignatureValidationFailed { aggregator: group.aggregator };
        let aggregator = self
            .state
            .code(&group.aggregator)
            .and_then(|code| code.as_aggregator())
            .ok_or_else(|| fail.clone())?;

        aggregator.validate_signatures(&group.user_ops, &group.signature).map_err(|revert| {
            debug!("Aggregator {:?} rejected signature: {revert}", group.aggregator);
            fail
        })
    }
}
