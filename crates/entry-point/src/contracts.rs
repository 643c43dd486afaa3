//! Capabilities of the contracts the entry point interacts with
//!
//! Every callback receives a [`CallContext`] scoped to the called contract. Gas is charged through
//! the context and an `Err(Revert)` discards every state change the callback made.

use crate::{context::CallContext, error::Revert};
use educe::Educe;
use ethers::types::{Address, Bytes, U256};
use std::sync::Arc;
use tollgate_primitives::{PostOpMode, UserOperationHash, UserOperationSigned, ValidationData};

/// Smart contract account
pub trait Account: Send + Sync {
    /// Verifies the signature and nonce semantics of `uo` and pays `missing_account_funds` to
    /// the entry point (see [`CallContext::pay_prefund`]).
    ///
    /// A failed signature check is reported as [`ValidationData::sig_failed`], not as a revert.
    fn validate_user_op(
        &self,
        ctx: &mut CallContext<'_>,
        uo: &UserOperationSigned,
        uo_hash: UserOperationHash,
        missing_account_funds: U256,
    ) -> Result<ValidationData, Revert>;

    /// Executes the call data of a validated user operation
    fn execute(&self, ctx: &mut CallContext<'_>, call_data: &Bytes) -> Result<Bytes, Revert>;
}

/// Paymaster sponsoring gas of user operations
pub trait Paymaster: Send + Sync {
    /// Agrees to pay for `uo` (at most `max_cost`). A non-empty context requests a
    /// [`Paymaster::post_op`] callback once the user operation executed.
    fn validate_paymaster_user_op(
        &self,
        ctx: &mut CallContext<'_>,
        uo: &UserOperationSigned,
        uo_hash: UserOperationHash,
        max_cost: U256,
    ) -> Result<(Bytes, ValidationData), Revert>;

    fn post_op(
        &self,
        ctx: &mut CallContext<'_>,
        mode: PostOpMode,
        context: &Bytes,
        actual_gas_cost: U256,
    ) -> Result<(), Revert>;
}

/// Factory deploying accounts from the init code of a user operation
pub trait AccountFactory: Send + Sync {
    /// Deploys the account described by `data` and returns its address
    fn create_account(&self, ctx: &mut CallContext<'_>, data: &Bytes) -> Result<Address, Revert>;
}

/// Signature aggregator validating the signatures of many user operations at once
pub trait Aggregator: Send + Sync {
    fn validate_signatures(
        &self,
        uos: &[UserOperationSigned],
        signature: &Bytes,
    ) -> Result<(), Revert>;
}

/// Any other contract user operations call into
pub trait Contract: Send + Sync {
    fn call(&self, ctx: &mut CallContext<'_>, value: U256, data: &Bytes) -> Result<Bytes, Revert>;
}

/// Code deployed at an address
#[derive(Clone, Educe)]
#[educe(Debug)]
pub enum Code {
    Account(#[educe(Debug(ignore))] Arc<dyn Account>),
    Paymaster(#[educe(Debug(ignore))] Arc<dyn Paymaster>),
    Factory(#[educe(Debug(ignore))] Arc<dyn AccountFactory>),
    Aggregator(#[educe(Debug(ignore))] Arc<dyn Aggregator>),
    Contract(#[educe(Debug(ignore))] Arc<dyn Contract>),
}

impl Code {
    pub fn account(account: impl Account + 'static) -> Self {
        Self::Account(Arc::new(account))
    }

    pub fn paymaster(paymaster: impl Paymaster + 'static) -> Self {
        Self::Paymaster(Arc::new(paymaster))
    }

    pub fn factory(factory: impl AccountFactory + 'static) -> Self {
        Self::Factory(Arc::new(factory))
    }

    pub fn aggregator(aggregator: impl Aggregator + 'static) -> Self {
        Self::Aggregator(Arc::new(aggregator))
    }

    pub fn contract(contract: impl Contract + 'static) -> Self {
        Self::Contract(Arc::new(contract))
    }

    pub fn as_account(&self) -> Option<Arc<dyn Account>> {
        match self {
            Self::Account(account) => Some(account.clone()),
            _ => None,
        }
    }

    pub fn as_paymaster(&self) -> Option<Arc<dyn Paymaster>> {
        match self {
            Self::Paymaster(paymaster) => Some(paymaster.clone()),
            _ => None,
        }
    }

    pub fn as_factory(&self) -> Option<Arc<dyn AccountFactory>> {
        match self {
            Self::Factory(factory) => Some(factory.clone()),
            _ => None,
        }
    }

    pub fn as_aggregator(&self) -> Option<Arc<dyn Aggregator>> {
        match self {
            Self::Aggregator(aggregator) => Some(aggregator.clone()),
            _ => None,
        }
    }
}
