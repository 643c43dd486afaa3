//! Gas metering, pricing and the prefund lifecycle

use crate::{
    error::{FailedOpReason, Revert, StakeError},
    stake_manager::StakeManager,
};
use ethers::types::{Address, U256};
use tollgate_primitives::{constants::validation::MAX_GAS_VALUE, UserOperationSigned};

/// Cold storage read
pub const SLOAD_GAS: u64 = 2_100;
/// Write of a fresh (zero) storage slot
pub const SSTORE_SET_GAS: u64 = 20_000;
/// Write of a non-zero storage slot
pub const SSTORE_RESET_GAS: u64 = 2_900;
/// Message call
pub const CALL_GAS: u64 = 2_600;
/// Surcharge of a message call transferring value
pub const CALL_VALUE_GAS: u64 = 9_000;
/// Contract deployment
pub const CREATE_GAS: u64 = 32_000;
/// Gas limit of calls made on behalf of the entry point outside of a user operation
pub const SIMULATION_GAS_LIMIT: u64 = 30_000_000;

/// Gas meter of a single call frame
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GasMeter {
    limit: U256,
    used: U256,
}

impl GasMeter {
    pub fn new(limit: U256) -> Self {
        Self { limit, used: U256::zero() }
    }

    /// Consumes `gas`. Running out of gas consumes everything that was left.
    pub fn consume(&mut self, gas: U256) -> Result<(), Revert> {
        let used = self.used.saturating_add(gas);
        if used > self.limit {
            self.used = self.limit;
            return Err(Revert::OutOfGas);
        }
        self.used = used;
        Ok(())
    }

    /// Records `gas` spent by a frame that ran within [`GasMeter::remaining`]. Never exceeds the
    /// limit.
    pub fn record(&mut self, gas: U256) {
        self.used = self.used.saturating_add(gas).min(self.limit);
    }

    pub fn used(&self) -> U256 {
        self.used
    }

    pub fn remaining(&self) -> U256 {
        self.limit - self.used
    }

    pub fn limit(&self) -> U256 {
        self.limit
    }
}

/// Every gas and fee field has to fit in 120 bits
pub fn check_gas_values(uo: &UserOperationSigned) -> Result<(), FailedOpReason> {
    let fields = [
        uo.call_gas_limit,
        uo.verification_gas_limit,
        uo.pre_verification_gas,
        uo.max_fee_per_gas,
        uo.max_priority_fee_per_gas,
    ];
    if fields.iter().any(|value| *value >= *MAX_GAS_VALUE) {
        return Err(FailedOpReason::GasValuesOverflow);
    }
    Ok(())
}

/// Effective gas price: `min(maxFeePerGas, baseFee + maxPriorityFeePerGas)`
pub fn gas_price(uo: &UserOperationSigned, base_fee: U256) -> U256 {
    if uo.max_fee_per_gas == uo.max_priority_fee_per_gas {
        // legacy mode, no basefee lookup
        return uo.max_fee_per_gas;
    }
    uo.max_fee_per_gas.min(base_fee.saturating_add(uo.max_priority_fee_per_gas))
}

/// Worst case cost of a user operation: all gas limits at `maxFeePerGas`
pub fn required_prefund(uo: &UserOperationSigned) -> U256 {
    uo.call_gas_limit
        .saturating_add(uo.verification_gas_limit)
        .saturating_add(uo.pre_verification_gas)
        .saturating_mul(uo.max_fee_per_gas)
}

/// Pessimistic charge taken from the payer's deposit before execution.
///
/// A prefund is created by debiting the payer and has to be consumed exactly once: either
/// [`Prefund::settle`] refunds the unused part, or [`Prefund::discard`] drops it together with the
/// state snapshot the debit happened in.
#[must_use = "a prefund has to be settled or discarded"]
#[derive(Debug, PartialEq, Eq)]
pub struct Prefund {
    payer: Address,
    amount: U256,
}

/// Final gas settlement of a user operation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Settlement {
    pub payer: Address,
    pub actual_gas_cost: U256,
    pub refund: U256,
}

impl Prefund {
    /// Debits `amount` from the deposit of `payer`
    pub(crate) fn charge(
        ledger: &mut StakeManager,
        payer: Address,
        amount: U256,
    ) -> Result<Self, StakeError> {
        ledger.debit(payer, amount)?;
        Ok(Self { payer, amount })
    }

    pub fn payer(&self) -> Address {
        self.payer
    }

    pub fn amount(&self) -> U256 {
        self.amount
    }

    /// Refunds `amount - actual_gas_cost` to the payer. The actual cost can never exceed the
    /// prefund.
    pub(crate) fn settle(
        self,
        ledger: &mut StakeManager,
        actual_gas_cost: U256,
    ) -> Result<Settlement, FailedOpReason> {
        if actual_gas_cost > self.amount {
            return Err(FailedOpReason::PrefundBelowActualGasCost);
        }
        let refund = self.amount - actual_gas_cost;
        ledger.credit(self.payer, refund);
        Ok(Settlement { payer: self.payer, actual_gas_cost, refund })
    }

    /// Drops the prefund without a refund. Only valid when the ledger the charge was taken from
    /// is rolled back or thrown away.
    pub(crate) fn discard(self) -> U256 {
        self.amount
    }
}
