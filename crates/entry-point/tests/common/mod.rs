#![allow(dead_code)]

use ethers::{
    abi::{AbiDecode, AbiEncode},
    contract::{EthAbiCodec, EthAbiType},
    signers::{LocalWallet, Signer},
    types::{Address, BigEndianHash, Bytes, RecoveryMessage, Signature, H256, U256},
    utils::hash_message,
};
use tollgate_entry_point::{
    Account, AccountFactory, Aggregator, BlockEnv, CallContext, Code, Contract, EntryPoint,
    EntryPointCall, EntryPointConfig, Paymaster, Revert,
};
use tollgate_primitives::{
    account_address, CreateAccount, PostOpMode, UserOperationHash, UserOperationSigned,
    ValidationData,
};

/// Well-known development private keys
pub const OWNER_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const OTHER_KEY: &str = "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

pub const ACCOUNT_VALIDATION_GAS: u64 = 10_000;
pub const ACCOUNT_EXECUTION_GAS: u64 = 5_000;
pub const PAYMASTER_VALIDATION_GAS: u64 = 7_000;
pub const POST_OP_GAS: u64 = 3_000;

pub const CALL_GAS_LIMIT: u64 = 200_000;
pub const VERIFICATION_GAS_LIMIT: u64 = 150_000;
pub const PRE_VERIFICATION_GAS: u64 = 21_000;

pub const GWEI: u64 = 1_000_000_000;
pub const ETHER: u128 = 1_000_000_000_000_000_000;
pub const TIMESTAMP: u64 = 1_700_000_000;

/// Call data of [`SimpleAccount::execute`]
#[derive(Clone, Debug, Default, PartialEq, Eq, EthAbiCodec, EthAbiType)]
pub struct Execute {
    pub dest: Address,
    pub value: U256,
    pub func: Bytes,
}

impl Execute {
    pub fn call_data(dest: Address, value: U256, func: Bytes) -> Bytes {
        Self { dest, value, func }.encode().into()
    }
}

/// Account owned by an ECDSA key, signatures over the eth-signed user operation hash
#[derive(Clone, Debug, Default)]
pub struct SimpleAccount {
    pub owner: Address,
    /// Returned on a valid signature (time range, aggregator)
    pub validation_data: ValidationData,
    pub validation_gas: u64,
}

impl SimpleAccount {
    pub fn new(owner: Address) -> Self {
        Self {
            owner,
            validation_data: ValidationData::valid(),
            validation_gas: ACCOUNT_VALIDATION_GAS,
        }
    }

    pub fn with_validation_data(mut self, validation_data: ValidationData) -> Self {
        self.validation_data = validation_data;
        self
    }

    pub fn with_validation_gas(mut self, validation_gas: u64) -> Self {
        self.validation_gas = validation_gas;
        self
    }

    fn verify(&self, uo_hash: UserOperationHash, signature: &Bytes) -> bool {
        Signature::try_from(signature.as_ref())
            .and_then(|sig| sig.recover(RecoveryMessage::Data(uo_hash.0.as_bytes().to_vec())))
            .map(|signer| signer == self.owner)
            .unwrap_or(false)
    }
}

impl Account for SimpleAccount {
    fn validate_user_op(
        &self,
        ctx: &mut CallContext<'_>,
        uo: &UserOperationSigned,
        uo_hash: UserOperationHash,
        missing_account_funds: U256,
    ) -> Result<ValidationData, Revert> {
        if ctx.caller() != ctx.entry_point() {
            return Err(Revert::with_reason("account: not from EntryPoint"));
        }
        ctx.use_gas(self.validation_gas)?;

        // aggregated accounts leave the signature to the aggregator
        let validation_data = if !self.validation_data.aggregator.is_zero() ||
            self.verify(uo_hash, &uo.signature)
        {
            self.validation_data
        } else {
            ValidationData::sig_failed()
        };

        ctx.pay_prefund(missing_account_funds)?;
        Ok(validation_data)
    }

    fn execute(&self, ctx: &mut CallContext<'_>, call_data: &Bytes) -> Result<Bytes, Revert> {
        ctx.use_gas(ACCOUNT_EXECUTION_GAS)?;
        let call = Execute::decode(call_data)
            .map_err(|_| Revert::with_reason("account: invalid call data"))?;
        ctx.call(call.dest, call.value, &call.func)
    }
}

/// Deploys [`SimpleAccount`]s at their counterfactual address
#[derive(Clone, Debug, Default)]
pub struct SimpleAccountFactory;

impl AccountFactory for SimpleAccountFactory {
    fn create_account(&self, ctx: &mut CallContext<'_>, data: &Bytes) -> Result<Address, Revert> {
        let CreateAccount { owner, salt } = CreateAccount::decode(data)
            .map_err(|_| Revert::with_reason("factory: invalid data"))?;
        let address = account_address(ctx.address(), owner, salt);
        if !ctx.has_code(&address) {
            ctx.create(address, Code::account(SimpleAccount::new(owner)))?;
        }
        Ok(address)
    }
}

/// Factory returning an address it did not deploy anything at
#[derive(Clone, Debug)]
pub struct LyingFactory {
    pub returns: Address,
}

impl AccountFactory for LyingFactory {
    fn create_account(&self, _: &mut CallContext<'_>, _: &Bytes) -> Result<Address, Revert> {
        Ok(self.returns)
    }
}

/// When the post-operation callback of a [`TestPaymaster`] reverts
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PostOpFailure {
    #[default]
    Never,
    /// Only in the first call (mode is not `PostOpReverted`)
    FirstCall,
    Always,
}

/// Paymaster paying for everything, optionally requesting a post-operation callback.
///
/// Every post-operation callback is recorded in storage: slot `mode` holds the reported actual
/// gas cost.
#[derive(Clone, Debug)]
pub struct TestPaymaster {
    pub context: Bytes,
    pub validation_data: ValidationData,
    pub post_op_failure: PostOpFailure,
    pub revert_validation: bool,
    pub validation_gas: u64,
}

impl Default for TestPaymaster {
    fn default() -> Self {
        Self {
            context: Bytes::default(),
            validation_data: ValidationData::default(),
            post_op_failure: PostOpFailure::default(),
            revert_validation: false,
            validation_gas: PAYMASTER_VALIDATION_GAS,
        }
    }
}

impl TestPaymaster {
    pub fn with_post_op() -> Self {
        Self { context: Bytes::from(b"context".to_vec()), ..Default::default() }
    }

    pub fn post_op_slot(mode: PostOpMode) -> H256 {
        H256::from_low_u64_be(mode as u64 + 1)
    }
}

impl Paymaster for TestPaymaster {
    fn validate_paymaster_user_op(
        &self,
        ctx: &mut CallContext<'_>,
        _: &UserOperationSigned,
        _: UserOperationHash,
        _: U256,
    ) -> Result<(Bytes, ValidationData), Revert> {
        ctx.use_gas(self.validation_gas)?;
        if self.revert_validation {
            return Err(Revert::with_reason("paymaster: not sponsoring"));
        }
        Ok((self.context.clone(), self.validation_data))
    }

    fn post_op(
        &self,
        ctx: &mut CallContext<'_>,
        mode: PostOpMode,
        _: &Bytes,
        actual_gas_cost: U256,
    ) -> Result<(), Revert> {
        ctx.use_gas(POST_OP_GAS)?;
        ctx.sstore(Self::post_op_slot(mode), H256::from_uint(&actual_gas_cost))?;

        let fail = match self.post_op_failure {
            PostOpFailure::Never => false,
            PostOpFailure::FirstCall => mode != PostOpMode::PostOpReverted,
            PostOpFailure::Always => true,
        };
        if fail {
            return Err(Revert::with_reason("paymaster: post op failed"));
        }
        Ok(())
    }
}

/// Accepts an aggregated signature equal to `signature`
#[derive(Clone, Debug, Default)]
pub struct TestAggregator {
    pub signature: Bytes,
}

impl Aggregator for TestAggregator {
    fn validate_signatures(
        &self,
        _: &[UserOperationSigned],
        signature: &Bytes,
    ) -> Result<(), Revert> {
        if *signature != self.signature {
            return Err(Revert::with_reason("aggregator: invalid signature"));
        }
        Ok(())
    }
}

/// Counter contract. Call data: `[0x01]` increments, `[0x02]` reverts, `[0x03]` burns all gas,
/// anything else returns the current value.
#[derive(Clone, Debug, Default)]
pub struct Counter;

impl Counter {
    pub const INCREMENT: u8 = 0x01;
    pub const REVERT: u8 = 0x02;
    pub const BURN: u8 = 0x03;
    pub const REVERT_REASON: &'static str = "counter: reverted";

    pub fn call_data(selector: u8) -> Bytes {
        Bytes::from(vec![selector])
    }
}

impl Contract for Counter {
    fn call(&self, ctx: &mut CallContext<'_>, _: U256, data: &Bytes) -> Result<Bytes, Revert> {
        match data.first().copied() {
            Some(Self::INCREMENT) => {
                let value = ctx.sload(H256::zero())?.into_uint() + 1;
                ctx.sstore(H256::zero(), H256::from_uint(&value))?;
                Ok(value.encode().into())
            }
            Some(Self::REVERT) => Err(Revert::with_reason(Self::REVERT_REASON)),
            Some(Self::BURN) => {
                ctx.use_gas(u64::MAX)?;
                Ok(Bytes::default())
            }
            _ => Ok(ctx.sload(H256::zero())?.into_uint().encode().into()),
        }
    }
}

/// Tries to call back into the entry point's batch processing
#[derive(Clone, Debug, Default)]
pub struct Reentrant;

impl Contract for Reentrant {
    fn call(&self, ctx: &mut CallContext<'_>, _: U256, _: &Bytes) -> Result<Bytes, Revert> {
        let beneficiary = ctx.address();
        ctx.call_entry_point(EntryPointCall::HandleOps { uos: vec![], beneficiary })?;
        Ok(Bytes::default())
    }
}

pub struct TestContext {
    pub entry_point: EntryPoint,
    pub owner: LocalWallet,
    pub factory: Address,
    pub counter: Address,
    pub beneficiary: Address,
}

pub fn setup() -> eyre::Result<TestContext> {
    let mut entry_point = EntryPoint::new(EntryPointConfig::dev());
    entry_point.set_block_env(BlockEnv {
        number: 1,
        timestamp: TIMESTAMP,
        base_fee: GWEI.into(),
    });

    let factory = Address::from_low_u64_be(0xfac7);
    entry_point.set_code(factory, Code::factory(SimpleAccountFactory));
    let counter = Address::from_low_u64_be(0xc0c0);
    entry_point.set_code(counter, Code::contract(Counter));

    Ok(TestContext {
        entry_point,
        owner: OWNER_KEY.parse()?,
        factory,
        counter,
        beneficiary: Address::from_low_u64_be(0xbe4e),
    })
}

impl TestContext {
    /// Deploys an account of the owner and funds its deposit with one ether
    pub fn deploy_account(&mut self, salt: u64) -> Address {
        self.deploy_account_with(salt, SimpleAccount::new(self.owner.address()))
    }

    pub fn deploy_account_with(&mut self, salt: u64, account: SimpleAccount) -> Address {
        let address = account_address(self.factory, self.owner.address(), salt.into());
        self.entry_point.set_code(address, Code::account(account));
        self.entry_point.deposit_to(address, ETHER.into());
        address
    }

    pub fn deploy_paymaster(&mut self, paymaster: TestPaymaster) -> Address {
        let address = Address::random();
        self.entry_point.set_code(address, Code::paymaster(paymaster));
        self.entry_point.deposit_to(address, ETHER.into());
        address
    }

    /// Init code deploying the owner's account with `salt`
    pub fn init_code(&self, salt: u64) -> Bytes {
        CreateAccount::new(self.owner.address(), salt.into()).init_code(self.factory)
    }

    /// Unsigned user operation incrementing the counter
    pub fn user_operation(&self, sender: Address, nonce: U256) -> UserOperationSigned {
        UserOperationSigned::default()
            .sender(sender)
            .nonce(nonce)
            .call_data(Execute::call_data(
                self.counter,
                U256::zero(),
                Counter::call_data(Counter::INCREMENT),
            ))
            .call_gas_limit(CALL_GAS_LIMIT.into())
            .verification_gas_limit(VERIFICATION_GAS_LIMIT.into())
            .pre_verification_gas(PRE_VERIFICATION_GAS.into())
            .max_fee_per_gas((2 * GWEI).into())
            .max_priority_fee_per_gas(GWEI.into())
    }

    pub fn sign(&self, uo: UserOperationSigned) -> eyre::Result<UserOperationSigned> {
        sign(&self.owner, &self.entry_point, uo)
    }

    pub fn counter_value(&self) -> U256 {
        self.entry_point.state().storage(&self.counter, &H256::zero()).into_uint()
    }
}

pub fn sign(
    wallet: &LocalWallet,
    entry_point: &EntryPoint,
    uo: UserOperationSigned,
) -> eyre::Result<UserOperationSigned> {
    let uo_hash = entry_point.get_user_op_hash(&uo);
    let signature = wallet.sign_hash(hash_message(uo_hash.0.as_bytes()))?;
    Ok(uo.signature(signature.to_vec().into()))
}

pub fn paymaster_and_data(paymaster: Address) -> Bytes {
    Bytes::from([paymaster.as_bytes(), b"sponsor".as_slice()].concat())
}
