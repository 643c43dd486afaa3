use crate::{
    contracts::Code,
    error::{EntryPointError, Revert},
    gas::{
        GasMeter, CALL_GAS, CALL_VALUE_GAS, CREATE_GAS, SLOAD_GAS, SSTORE_RESET_GAS,
        SSTORE_SET_GAS,
    },
    guard::ReentrancyGuard,
    state::{BlockEnv, WorldState},
};
use ethers::types::{Address, Bytes, H256, U256};
use tollgate_primitives::{UserOpsPerAggregator, UserOperationSigned};
use tracing::trace;

/// Calls a contract can make into the entry point, with the calling contract as `msg.sender`
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntryPointCall {
    DepositTo { account: Address, amount: U256 },
    WithdrawTo { withdraw_address: Address, amount: U256 },
    AddStake { amount: U256, unstake_delay_sec: u32 },
    UnlockStake,
    WithdrawStake { withdraw_address: Address },
    IncrementNonce { key: U256 },
    HandleOps { uos: Vec<UserOperationSigned>, beneficiary: Address },
    HandleAggregatedOps { uos_per_aggregator: Vec<UserOpsPerAggregator>, beneficiary: Address },
}

/// Execution context of a single call frame.
///
/// Gives the called contract access to its storage and balance, to other contracts and to the
/// entry point. Every primitive charges gas against the frame's limit.
pub struct CallContext<'a> {
    state: &'a mut WorldState,
    env: &'a BlockEnv,
    guard: &'a ReentrancyGuard,
    entry_point: Address,
    address: Address,
    caller: Address,
    gas: GasMeter,
}

impl<'a> CallContext<'a> {
    pub(crate) fn new(
        state: &'a mut WorldState,
        env: &'a BlockEnv,
        guard: &'a ReentrancyGuard,
        entry_point: Address,
        address: Address,
        caller: Address,
        gas_limit: U256,
    ) -> Self {
        Self { state, env, guard, entry_point, address, caller, gas: GasMeter::new(gas_limit) }
    }

    /// Address of the contract being called
    pub fn address(&self) -> Address {
        self.address
    }

    /// Address of the caller (`msg.sender`)
    pub fn caller(&self) -> Address {
        self.caller
    }

    pub fn entry_point(&self) -> Address {
        self.entry_point
    }

    pub fn block(&self) -> &BlockEnv {
        self.env
    }

    pub fn use_gas(&mut self, gas: u64) -> Result<(), Revert> {
        self.gas.consume(gas.into())
    }

    pub fn gas_used(&self) -> U256 {
        self.gas.used()
    }

    pub fn gas_left(&self) -> U256 {
        self.gas.remaining()
    }

    pub fn balance(&self, address: &Address) -> U256 {
        self.state.balance(address)
    }

    pub fn has_code(&self, address: &Address) -> bool {
        self.state.has_code(address)
    }

    pub fn sload(&mut self, key: H256) -> Result<H256, Revert> {
        self.use_gas(SLOAD_GAS)?;
        Ok(self.state.storage(&self.address, &key))
    }

    pub fn sstore(&mut self, key: H256, value: H256) -> Result<(), Revert> {
        let gas = if self.state.storage(&self.address, &key).is_zero() {
            SSTORE_SET_GAS
        } else {
            SSTORE_RESET_GAS
        };
        self.use_gas(gas)?;
        self.state.set_storage(self.address, key, value);
        Ok(())
    }

    /// Deploys `code` at `address`
    pub fn create(&mut self, address: Address, code: Code) -> Result<(), Revert> {
        self.use_gas(CREATE_GAS)?;
        if address.is_zero() || self.state.has_code(&address) {
            return Err(Revert::with_reason("create collision"));
        }
        trace!("{:?} deployed {code:?} at {address:?}", self.address);
        self.state.set_code(address, code);
        Ok(())
    }

    /// Calls `target` with `value` and `data`. A reverted call leaves no trace in the state.
    ///
    /// Calls to addresses without code (or to code that is not a [`Code::Contract`]) only
    /// transfer the value.
    pub fn call(&mut self, target: Address, value: U256, data: &Bytes) -> Result<Bytes, Revert> {
        self.use_gas(CALL_GAS)?;
        if target == self.entry_point {
            return Err(Revert::with_reason("use call_entry_point to call the entry point"));
        }

        let snapshot = self.state.snapshot();
        let res = self.call_inner(target, value, data);
        if res.is_err() {
            self.state.revert_to(snapshot);
        }
        res
    }

    fn call_inner(&mut self, target: Address, value: U256, data: &Bytes) -> Result<Bytes, Revert> {
        if !value.is_zero() {
            self.use_gas(CALL_VALUE_GAS)?;
            self.state.transfer(self.address, target, value)?;
        }

        let contract = match self.state.code(&target) {
            Some(Code::Contract(contract)) => contract.clone(),
            _ => return Ok(Bytes::default()),
        };

        let mut frame = CallContext::new(
            &mut *self.state,
            self.env,
            self.guard,
            self.entry_point,
            target,
            self.address,
            self.gas.remaining(),
        );
        let res = contract.call(&mut frame, value, data);
        let used = frame.gas_used();
        self.gas.consume(used)?;
        res
    }

    /// Deposits `amount` of the contract's balance for `account`
    pub fn deposit_to(&mut self, account: Address, amount: U256) -> Result<(), Revert> {
        self.call_entry_point(EntryPointCall::DepositTo { account, amount })
    }

    /// Pays the missing funds of a user operation (sends `amount` to the entry point, credited to
    /// the contract's own deposit)
    pub fn pay_prefund(&mut self, amount: U256) -> Result<(), Revert> {
        if amount.is_zero() {
            return Ok(());
        }
        self.deposit_to(self.address, amount)
    }

    pub fn call_entry_point(&mut self, call: EntryPointCall) -> Result<(), Revert> {
        self.use_gas(CALL_GAS)?;
        let sender = self.address;
        let now = self.env.timestamp;
        match call {
            EntryPointCall::DepositTo { account, amount } => {
                self.state.sub_balance(sender, amount)?;
                self.state.deposit_to(account, amount);
            }
            EntryPointCall::WithdrawTo { withdraw_address, amount } => {
                self.state.withdraw_to(sender, withdraw_address, amount)?;
            }
            EntryPointCall::AddStake { amount, unstake_delay_sec } => {
                let snapshot = self.state.snapshot();
                let res = self
                    .state
                    .sub_balance(sender, amount)
                    .and_then(|_| self.state.add_stake(sender, amount, unstake_delay_sec));
                if let Err(err) = res {
                    self.state.revert_to(snapshot);
                    return Err(err.into());
                }
            }
            EntryPointCall::UnlockStake => self.state.unlock_stake(sender, now)?,
            EntryPointCall::WithdrawStake { withdraw_address } => {
                self.state.withdraw_stake(sender, withdraw_address, now)?;
            }
            EntryPointCall::IncrementNonce { key } => {
                self.state.nonce_manager.increment_nonce(sender, key);
            }
            EntryPointCall::HandleOps { .. } | EntryPointCall::HandleAggregatedOps { .. } => {
                // every frame runs inside a batch or a simulation, both hold the guard
                let err = self.guard.enter().err().unwrap_or(EntryPointError::ReentrancyDetected);
                return Err(err.into());
            }
        }
        Ok(())
    }
}
