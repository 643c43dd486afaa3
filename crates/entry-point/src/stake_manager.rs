//! Deposit and stake ledger of accounts, paymasters, factories and aggregators

use crate::error::StakeError;
use ethers::types::{Address, U256};
use std::collections::HashMap;
use tollgate_primitives::DepositInfo;
use tracing::trace;

/// Per-address deposits (spendable balance for gas) and stakes (locked collateral).
///
/// The deposit of an address never goes negative: every debit checks the available balance
/// first. Stakes follow the lock, unlock, cooldown, withdraw cycle.
#[derive(Clone, Debug, Default)]
pub struct StakeManager {
    deposits: HashMap<Address, DepositInfo>,
}

impl StakeManager {
    pub fn get_deposit_info(&self, account: &Address) -> DepositInfo {
        self.deposits.get(account).cloned().unwrap_or_default()
    }

    /// Spendable deposit of `account`
    pub fn balance_of(&self, account: &Address) -> U256 {
        self.deposits.get(account).map(|info| info.deposit).unwrap_or_default()
    }

    /// Credits `amount` to the deposit of `account` and returns the new total
    pub fn deposit_to(&mut self, account: Address, amount: U256) -> U256 {
        let info = self.deposits.entry(account).or_default();
        info.deposit = info.deposit.saturating_add(amount);
        trace!("Deposit of {account:?} increased by {amount} to {}", info.deposit);
        info.deposit
    }

    /// Debits `amount` from the deposit of `account` (withdrawn by the caller)
    pub fn withdraw_to(&mut self, account: Address, amount: U256) -> Result<(), StakeError> {
        self.debit(account, amount)
    }

    /// Adds `amount` to the stake of `account` and (re)locks it with `unstake_delay_sec`.
    ///
    /// The delay cannot be zero nor lower than the current one. Returns the new total stake.
    pub fn add_stake(
        &mut self,
        account: Address,
        amount: U256,
        unstake_delay_sec: u32,
    ) -> Result<U256, StakeError> {
        let info = self.deposits.entry(account).or_default();
        if unstake_delay_sec == 0 || unstake_delay_sec < info.unstake_delay_sec {
            return Err(StakeError::InvalidDelay {
                current: info.unstake_delay_sec,
                requested: unstake_delay_sec,
            });
        }

        let stake = info.stake.saturating_add(amount);
        if stake.is_zero() {
            return Err(StakeError::NoStake);
        }

        info.stake = stake;
        info.staked = true;
        info.unstake_delay_sec = unstake_delay_sec;
        info.withdraw_time = 0;
        Ok(stake)
    }

    /// Starts the cooldown of the stake of `account`. Returns the time the stake becomes
    /// withdrawable.
    pub fn unlock_stake(&mut self, account: Address, now: u64) -> Result<u64, StakeError> {
        let info = self.deposits.get_mut(&account).ok_or(StakeError::NotStaked)?;
        if info.unstake_delay_sec == 0 || !info.staked {
            return Err(StakeError::NotStaked);
        }

        let withdraw_time = now.saturating_add(info.unstake_delay_sec as u64);
        info.withdraw_time = withdraw_time;
        info.staked = false;
        Ok(withdraw_time)
    }

    /// Releases the whole stake of `account` once its cooldown elapsed. Returns the released
    /// amount.
    pub fn withdraw_stake(&mut self, account: Address, now: u64) -> Result<U256, StakeError> {
        let info = self.deposits.get_mut(&account).ok_or(StakeError::NoStake)?;
        if info.stake.is_zero() {
            return Err(StakeError::NoStake);
        }
        if info.staked || info.withdraw_time == 0 || now < info.withdraw_time {
            return Err(StakeError::StakeNotWithdrawable {
                withdraw_time: info.withdraw_time,
                now,
            });
        }

        let stake = info.stake;
        info.stake = U256::zero();
        info.unstake_delay_sec = 0;
        info.withdraw_time = 0;
        Ok(stake)
    }

    pub(crate) fn debit(&mut self, account: Address, amount: U256) -> Result<(), StakeError> {
        let available = self.balance_of(&account);
        if available < amount {
            return Err(StakeError::InsufficientBalance { available, requested: amount });
        }
        if let Some(info) = self.deposits.get_mut(&account) {
            info.deposit = available - amount;
        }
        Ok(())
    }

    pub(crate) fn credit(&mut self, account: Address, amount: U256) {
        self.deposit_to(account, amount);
    }

    /// Sum of all deposits and stakes held by the ledger
    pub fn total(&self) -> U256 {
        self.deposits.values().fold(U256::zero(), |acc, info| {
            acc.saturating_add(info.deposit).saturating_add(info.stake)
        })
    }
}
