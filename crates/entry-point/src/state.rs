//! In-memory world the entry point operates on

use crate::{
    contracts::Code, error::StakeError, nonce_manager::NonceManager,
    stake_manager::StakeManager,
};
use ethers::types::{Address, H256, U256};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tollgate_primitives::EntryPointEvent;

/// Block the entry point executes in
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockEnv {
    pub number: u64,
    pub timestamp: u64,
    pub base_fee: U256,
}

/// Native balances, deployed code, contract storage, the deposit ledger, account nonces and the
/// entry point log.
///
/// The log holds the events emitted outside of batches since the last
/// [`crate::EntryPoint::take_logs`]. Events of a batch are handed over to its receipt.
#[derive(Clone, Debug, Default)]
pub struct WorldState {
    balances: HashMap<Address, U256>,
    code: HashMap<Address, Code>,
    storage: HashMap<(Address, H256), H256>,
    pub(crate) stake_manager: StakeManager,
    pub(crate) nonce_manager: NonceManager,
    logs: Vec<EntryPointEvent>,
}

/// Point a [`WorldState`] can be rolled back to. The log is never copied: rolling back truncates
/// it to its length at the time of the snapshot.
#[derive(Clone, Debug)]
pub(crate) struct Snapshot {
    state: WorldState,
    log_len: usize,
}

impl WorldState {
    /// Copy of the world without its log
    pub fn fork(&self) -> Self {
        Self {
            balances: self.balances.clone(),
            code: self.code.clone(),
            storage: self.storage.clone(),
            stake_manager: self.stake_manager.clone(),
            nonce_manager: self.nonce_manager.clone(),
            logs: Vec::new(),
        }
    }

    pub(crate) fn snapshot(&self) -> Snapshot {
        Snapshot { state: self.fork(), log_len: self.logs.len() }
    }

    /// Discards everything that happened since `snapshot` was taken
    pub(crate) fn revert_to(&mut self, snapshot: Snapshot) {
        let mut logs = std::mem::take(&mut self.logs);
        logs.truncate(snapshot.log_len);
        *self = snapshot.state;
        self.logs = logs;
    }

    pub fn balance(&self, address: &Address) -> U256 {
        self.balances.get(address).copied().unwrap_or_default()
    }

    pub fn set_balance(&mut self, address: Address, amount: U256) {
        self.balances.insert(address, amount);
    }

    pub(crate) fn add_balance(&mut self, address: Address, amount: U256) {
        let balance = self.balances.entry(address).or_default();
        *balance = balance.saturating_add(amount);
    }

    pub(crate) fn sub_balance(&mut self, address: Address, amount: U256) -> Result<(), StakeError> {
        let available = self.balance(&address);
        if available < amount {
            return Err(StakeError::InsufficientBalance { available, requested: amount });
        }
        self.balances.insert(address, available - amount);
        Ok(())
    }

    pub(crate) fn transfer(
        &mut self,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), StakeError> {
        self.sub_balance(from, amount)?;
        self.add_balance(to, amount);
        Ok(())
    }

    pub fn code(&self, address: &Address) -> Option<&Code> {
        self.code.get(address)
    }

    pub fn has_code(&self, address: &Address) -> bool {
        self.code.contains_key(address)
    }

    pub fn set_code(&mut self, address: Address, code: Code) {
        self.code.insert(address, code);
    }

    pub fn storage(&self, address: &Address, key: &H256) -> H256 {
        self.storage.get(&(*address, *key)).copied().unwrap_or_default()
    }

    pub(crate) fn set_storage(&mut self, address: Address, key: H256, value: H256) {
        if value.is_zero() {
            self.storage.remove(&(address, key));
        } else {
            self.storage.insert((address, key), value);
        }
    }

    pub fn stake_manager(&self) -> &StakeManager {
        &self.stake_manager
    }

    pub fn nonce_manager(&self) -> &NonceManager {
        &self.nonce_manager
    }

    pub fn logs(&self) -> &[EntryPointEvent] {
        &self.logs
    }

    pub(crate) fn emit(&mut self, event: EntryPointEvent) {
        self.logs.push(event);
    }

    /// Removes and returns the log entries from position `from` on
    pub(crate) fn take_logs(&mut self, from: usize) -> Vec<EntryPointEvent> {
        if from >= self.logs.len() {
            return Vec::new();
        }
        self.logs.split_off(from)
    }

    /// Credits `amount` (already taken from the caller) to the deposit of `account`
    pub(crate) fn deposit_to(&mut self, account: Address, amount: U256) -> U256 {
        let total_deposit = self.stake_manager.deposit_to(account, amount);
        self.emit(EntryPointEvent::Deposited { account, total_deposit });
        total_deposit
    }

    pub(crate) fn withdraw_to(
        &mut self,
        account: Address,
        withdraw_address: Address,
        amount: U256,
    ) -> Result<(), StakeError> {
        self.stake_manager.withdraw_to(account, amount)?;
        self.add_balance(withdraw_address, amount);
        self.emit(EntryPointEvent::Withdrawn { account, withdraw_address, amount });
        Ok(())
    }

    pub(crate) fn add_stake(
        &mut self,
        account: Address,
        amount: U256,
        unstake_delay_sec: u32,
    ) -> Result<(), StakeError> {
        let total_staked = self.stake_manager.add_stake(account, amount, unstake_delay_sec)?;
        self.emit(EntryPointEvent::StakeLocked { account, total_staked, unstake_delay_sec });
        Ok(())
    }

    pub(crate) fn unlock_stake(&mut self, account: Address, now: u64) -> Result<(), StakeError> {
        let withdraw_time = self.stake_manager.unlock_stake(account, now)?;
        self.emit(EntryPointEvent::StakeUnlocked { account, withdraw_time });
        Ok(())
    }

    pub(crate) fn withdraw_stake(
        &mut self,
        account: Address,
        withdraw_address: Address,
        now: u64,
    ) -> Result<(), StakeError> {
        let amount = self.stake_manager.withdraw_stake(account, now)?;
        self.add_balance(withdraw_address, amount);
        self.emit(EntryPointEvent::StakeWithdrawn { account, withdraw_address, amount });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_restores_everything() {
        let account = Address::random();
        let mut state = WorldState::default();
        state.set_balance(account, 10.into());
        state.deposit_to(account, 5.into());

        let snapshot = state.snapshot();
        state.transfer(account, Address::random(), 10.into()).expect("transfer");
        state.set_storage(account, H256::zero(), H256::repeat_byte(1));
        state.withdraw_to(account, account, 5.into()).expect("withdraw");
        state.nonce_manager.increment_nonce(account, U256::zero());
        assert_eq!(state.logs().len(), 2);

        state.revert_to(snapshot);
        assert_eq!(state.balance(&account), 10.into());
        assert_eq!(state.stake_manager().balance_of(&account), 5.into());
        assert_eq!(state.storage(&account, &H256::zero()), H256::zero());
        assert_eq!(state.nonce_manager().get_nonce(&account, U256::zero()), U256::zero());
        assert_eq!(state.logs().len(), 1);
    }

    #[test]
    fn snapshots_leave_the_log_alone() {
        let account = Address::random();
        let mut state = WorldState::default();
        for _ in 0..3 {
            state.deposit_to(account, 1.into());
        }

        let snapshot = state.snapshot();
        assert!(snapshot.state.logs().is_empty());
        state.deposit_to(account, 1.into());
        state.revert_to(snapshot);
        assert_eq!(state.logs().len(), 3);
        assert_eq!(state.stake_manager().balance_of(&account), 3.into());

        assert!(state.fork().logs().is_empty());
        assert_eq!(state.take_logs(1).len(), 2);
        assert_eq!(state.logs().len(), 1);
        assert!(state.take_logs(5).is_empty());
    }

    #[test]
    fn transfer_checks_balance() {
        let (from, to) = (Address::random(), Address::random());
        let mut state = WorldState::default();
        state.set_balance(from, 3.into());

        assert_eq!(
            state.transfer(from, to, 4.into()),
            Err(StakeError::InsufficientBalance { available: 3.into(), requested: 4.into() })
        );
        state.transfer(from, to, 3.into()).expect("transfer");
        assert_eq!(state.balance(&from), U256::zero());
        assert_eq!(state.balance(&to), 3.into());
    }

    #[test]
    fn stake_events() {
        let account = Address::random();
        let mut state = WorldState::default();

        state.add_stake(account, 10.into(), 60).expect("stake");
        state.unlock_stake(account, 100).expect("unlock");
        assert!(state.withdraw_stake(account, account, 159).is_err());
        state.withdraw_stake(account, account, 160).expect("withdraw");

        assert_eq!(state.balance(&account), 10.into());
        assert_eq!(
            state.logs(),
            &[
                EntryPointEvent::StakeLocked {
                    account,
                    total_staked: 10.into(),
                    unstake_delay_sec: 60
                },
                EntryPointEvent::StakeUnlocked { account, withdraw_time: 160 },
                EntryPointEvent::StakeWithdrawn {
                    account,
                    withdraw_address: account,
                    amount: 10.into()
                },
            ]
        );
    }
}
