//! Account abstraction (ERC-4337) entry point engine
//!
//! The [`EntryPoint`] owns a deposit ledger, the account nonces and an in-memory world of
//! accounts, paymasters, factories and aggregators (see [`contracts`]). Batches of user
//! operations are validated, executed and paid for one operation at a time; a failing operation
//! never affects the others.

pub mod config;
pub mod context;
pub mod contracts;
mod entry_point;
pub mod error;
mod execution;
mod executor;
pub mod gas;
mod guard;
pub mod nonce_manager;
mod simulation;
pub mod stake_manager;
pub mod state;
mod validation;

pub use config::EntryPointConfig;
pub use context::{CallContext, EntryPointCall};
pub use contracts::{Account, AccountFactory, Aggregator, Code, Contract, Paymaster};
pub use entry_point::EntryPoint;
pub use error::{EntryPointError, FailedOp, FailedOpReason, InitCodeFailure, Revert, StakeError};
pub use executor::{BundleReceipt, ExecutionOutcome, OperationStatus};
pub use gas::{Prefund, Settlement};
pub use guard::{Entered, ReentrancyGuard};
pub use state::{BlockEnv, WorldState};
