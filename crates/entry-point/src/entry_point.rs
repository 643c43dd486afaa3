use crate::{
    config::EntryPointConfig,
    contracts::Code,
    error::EntryPointError,
    executor::{BundleReceipt, ExecutionOutcome, Executor},
    guard::ReentrancyGuard,
    state::{BlockEnv, WorldState},
};
use ethers::types::{Address, U256};
use tollgate_primitives::{
    constants::validation::SIG_VALIDATION_FAILED, DepositInfo, EntryPointEvent,
    UserOperationHash, UserOperationSigned, UserOpsPerAggregator,
};
use tracing::{debug, info};

/// Entry point of account abstraction (ERC-4337): validates, executes and pays for batches of
/// user operations against its world state.
#[derive(Debug)]
pub struct EntryPoint {
    pub(crate) config: EntryPointConfig,
    pub(crate) env: BlockEnv,
    pub(crate) state: WorldState,
    pub(crate) guard: ReentrancyGuard,
}

impl EntryPoint {
    pub fn new(config: EntryPointConfig) -> Self {
        Self::with_state(config, BlockEnv::default(), WorldState::default())
    }

    pub fn with_state(config: EntryPointConfig, env: BlockEnv, state: WorldState) -> Self {
        Self { config, env, state, guard: ReentrancyGuard::default() }
    }

    pub fn address(&self) -> Address {
        self.config.address
    }

    pub fn chain_id(&self) -> u64 {
        self.config.chain_id()
    }

    pub fn config(&self) -> &EntryPointConfig {
        &self.config
    }

    pub fn block_env(&self) -> &BlockEnv {
        &self.env
    }

    pub fn set_block_env(&mut self, env: BlockEnv) {
        self.env = env;
    }

    /// Moves to the next block, `seconds` later
    pub fn advance_time(&mut self, seconds: u64) {
        self.env.number += 1;
        self.env.timestamp = self.env.timestamp.saturating_add(seconds);
    }

    pub fn state(&self) -> &WorldState {
        &self.state
    }

    /// Deploys `code` at `address` outside of any user operation
    pub fn set_code(&mut self, address: Address, code: Code) {
        self.state.set_code(address, code);
    }

    pub fn set_balance(&mut self, address: Address, amount: U256) {
        self.state.set_balance(address, amount);
    }

    /// Native balance of `address`
    pub fn balance(&self, address: &Address) -> U256 {
        self.state.balance(address)
    }

    /// Deposit of `account` available to pay for gas
    pub fn balance_of(&self, account: &Address) -> U256 {
        self.state.stake_manager.balance_of(account)
    }

    pub fn get_deposit_info(&self, account: &Address) -> DepositInfo {
        self.state.stake_manager.get_deposit_info(account)
    }

    pub fn get_nonce(&self, sender: &Address, key: U256) -> U256 {
        self.state.nonce_manager.get_nonce(sender, key)
    }

    pub fn get_user_op_hash(&self, uo: &UserOperationSigned) -> UserOperationHash {
        uo.hash(&self.config.address, self.chain_id())
    }

    /// Events emitted outside of batches (deposits, stakes) not taken yet. The events of a batch
    /// are part of its [`BundleReceipt`].
    pub fn logs(&self) -> &[EntryPointEvent] {
        self.state.logs()
    }

    pub fn take_logs(&mut self) -> Vec<EntryPointEvent> {
        self.state.take_logs(0)
    }

    /// Adds `amount` to the deposit of `account`. Returns the new deposit.
    pub fn deposit_to(&mut self, account: Address, amount: U256) -> U256 {
        self.state.deposit_to(account, amount)
    }

    /// Withdraws `amount` of the deposit of `account` to `withdraw_address`
    pub fn withdraw_to(
        &mut self,
        account: Address,
        withdraw_address: Address,
        amount: U256,
    ) -> Result<(), EntryPointError> {
        Ok(self.state.withdraw_to(account, withdraw_address, amount)?)
    }

    pub fn add_stake(
        &mut self,
        account: Address,
        amount: U256,
        unstake_delay_sec: u32,
    ) -> Result<(), EntryPointError> {
        Ok(self.state.add_stake(account, amount, unstake_delay_sec)?)
    }

    pub fn unlock_stake(&mut self, account: Address) -> Result<(), EntryPointError> {
        Ok(self.state.unlock_stake(account, self.env.timestamp)?)
    }

    pub fn withdraw_stake(
        &mut self,
        account: Address,
        withdraw_address: Address,
    ) -> Result<(), EntryPointError> {
        Ok(self.state.withdraw_stake(account, withdraw_address, self.env.timestamp)?)
    }

    /// Skips the next nonce of `key` for `sender`
    pub fn increment_nonce(&mut self, sender: Address, key: U256) {
        self.state.nonce_manager.increment_nonce(sender, key);
    }

    pub(crate) fn executor<'a>(&'a self, state: &'a mut WorldState) -> Executor<'a> {
        Executor::new(state, &self.env, &self.guard, self.config.address, self.chain_id())
    }

    /// Validates and executes `uos` one after the other and pays the collected gas fees to
    /// `beneficiary`.
    ///
    /// A user operation failing validation is rejected on its own, the rest of the batch goes on.
    pub fn handle_ops(
        &mut self,
        uos: Vec<UserOperationSigned>,
        beneficiary: Address,
    ) -> Result<BundleReceipt, EntryPointError> {
        let _entered = self.guard.enter()?;
        check_batch(uos.len(), beneficiary)?;
        info!("Handling {} user operations, beneficiary {beneficiary:?}", uos.len());

        let log_start = self.state.logs().len();
        let (env, guard, entry_point, chain_id) =
            (&self.env, &self.guard, self.config.address, self.config.chain_id());
        let mut executor = Executor::new(&mut self.state, env, guard, entry_point, chain_id);

        let outcomes = uos
            .iter()
            .enumerate()
            .map(|(op_index, uo)| executor.process_user_operation(op_index, uo, Address::zero()))
            .collect();

        Ok(self.compensate(beneficiary, outcomes, log_start))
    }

    /// Like [`EntryPoint::handle_ops`], with the signatures of each group validated once by the
    /// group's aggregator. A group whose aggregated signature is rejected is rejected as a whole.
    pub fn handle_aggregated_ops(
        &mut self,
        uos_per_aggregator: Vec<UserOpsPerAggregator>,
        beneficiary: Address,
    ) -> Result<BundleReceipt, EntryPointError> {
        let _entered = self.guard.enter()?;
        let total: usize = uos_per_aggregator.iter().map(|group| group.user_ops.len()).sum();
        check_batch(total, beneficiary)?;
        if uos_per_aggregator.iter().any(|group| group.aggregator == *SIG_VALIDATION_FAILED) {
            return Err(EntryPointError::InvalidAggregator);
        }
        info!(
            "Handling {total} user operations in {} aggregator groups, beneficiary {beneficiary:?}",
            uos_per_aggregator.len()
        );

        let log_start = self.state.logs().len();
        let (env, guard, entry_point, chain_id) =
            (&self.env, &self.guard, self.config.address, self.config.chain_id());
        let mut executor = Executor::new(&mut self.state, env, guard, entry_point, chain_id);

        let mut outcomes = Vec::with_capacity(total);
        for group in uos_per_aggregator.iter() {
            let aggregator = group.aggregator;
            executor.state.emit(EntryPointEvent::SignatureAggregatorChanged { aggregator });

            match executor.validate_aggregated_signatures(group) {
                Ok(()) => {
                    for uo in group.user_ops.iter() {
                        let op_index = outcomes.len();
                        outcomes.push(executor.process_user_operation(op_index, uo, aggregator));
                    }
                }
                Err(reason) => {
                    debug!("Aggregator {aggregator:?} rejected its group: {reason}");
                    let rejected = executor.reject_all(outcomes.len(), &group.user_ops, reason);
                    outcomes.extend(rejected);
                }
            }
        }
        executor
            .state
            .emit(EntryPointEvent::SignatureAggregatorChanged { aggregator: Address::zero() });

        Ok(self.compensate(beneficiary, outcomes, log_start))
    }

    /// Pays the gas fees collected from the batch to the beneficiary
    fn compensate(
        &mut self,
        beneficiary: Address,
        outcomes: Vec<ExecutionOutcome>,
        log_start: usize,
    ) -> BundleReceipt {
        let collected = outcomes
            .iter()
            .fold(U256::zero(), |acc, outcome| acc.saturating_add(outcome.actual_gas_cost));
        self.state.add_balance(beneficiary, collected);

        let rejected = outcomes.iter().filter(|outcome| outcome.is_rejected()).count();
        info!(
            "Batch processed: {} settled, {rejected} rejected, {collected} paid to {beneficiary:?}",
            outcomes.len() - rejected
        );

        BundleReceipt {
            beneficiary,
            collected,
            outcomes,
            logs: self.state.take_logs(log_start),
        }
    }
}

fn check_batch(len: usize, beneficiary: Address) -> Result<(), EntryPointError> {
    if len == 0 {
        return Err(EntryPointError::EmptyBatch);
    }
    if beneficiary.is_zero() {
        return Err(EntryPointError::InvalidBeneficiary);
    }
    Ok(())
}
