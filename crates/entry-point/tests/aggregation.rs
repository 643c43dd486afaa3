mod common;

use common::{setup, SimpleAccount, TestAggregator, TestContext};
use ethers::{
    signers::Signer,
    types::{Address, Bytes, U256},
};
use tollgate_entry_point::{Code, EntryPointError, FailedOp, FailedOpReason};
use tollgate_primitives::{
    constants::validation::SIG_VALIDATION_FAILED, EntryPointEvent, UserOpsPerAggregator,
    ValidationData,
};

fn aggregated_signature() -> Bytes {
    Bytes::from(b"aggregated".to_vec())
}

fn deploy_aggregator(ctx: &mut TestContext) -> Address {
    let aggregator = Address::random();
    let signature = aggregated_signature();
    ctx.entry_point.set_code(aggregator, Code::aggregator(TestAggregator { signature }));
    aggregator
}

/// Account leaving its signature to `aggregator`
fn deploy_aggregated_account(ctx: &mut TestContext, salt: u64, aggregator: Address) -> Address {
    let account = SimpleAccount::new(ctx.owner.address())
        .with_validation_data(ValidationData::aggregated(aggregator));
    ctx.deploy_account_with(salt, account)
}

#[test]
fn handle_aggregated_ops() -> eyre::Result<()> {
    let mut ctx = setup()?;
    let aggregator = deploy_aggregator(&mut ctx);
    let first = deploy_aggregated_account(&mut ctx, 1, aggregator);
    let second = deploy_aggregated_account(&mut ctx, 2, aggregator);
    let plain = ctx.deploy_account(3);

    // user operations of aggregated accounts carry no signature of their own
    let groups = vec![
        UserOpsPerAggregator {
            user_ops: vec![
                ctx.user_operation(first, U256::zero()),
                ctx.user_operation(second, U256::zero()),
            ],
            aggregator,
            signature: aggregated_signature(),
        },
        UserOpsPerAggregator {
            user_ops: vec![ctx.sign(ctx.user_operation(plain, U256::zero()))?],
            ..Default::default()
        },
    ];

    let receipt = ctx.entry_point.handle_aggregated_ops(groups, ctx.beneficiary)?;
    assert_eq!(receipt.outcomes.len(), 3);
    assert!(receipt.outcomes.iter().all(|outcome| outcome.success()));
    assert_eq!(ctx.counter_value(), U256::from(3));

    let aggregators = receipt
        .logs
        .iter()
        .filter_map(|log| match log {
            EntryPointEvent::SignatureAggregatorChanged { aggregator } => Some(*aggregator),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(aggregators, vec![aggregator, Address::zero(), Address::zero()]);
    assert_eq!(receipt.logs.len(), 6);
    assert!(matches!(
        receipt.logs[1],
        EntryPointEvent::UserOperationEvent { sender, .. } if sender == first
    ));
    Ok(())
}

#[test]
fn aggregated_signature_rejected() -> eyre::Result<()> {
    let mut ctx = setup()?;
    let aggregator = deploy_aggregator(&mut ctx);
    let plain = ctx.deploy_account(1);
    let first = deploy_aggregated_account(&mut ctx, 2, aggregator);
    let second = deploy_aggregated_account(&mut ctx, 3, aggregator);

    let groups = vec![
        UserOpsPerAggregator {
            user_ops: vec![ctx.sign(ctx.user_operation(plain, U256::zero()))?],
            ..Default::default()
        },
        UserOpsPerAggregator {
            user_ops: vec![
                ctx.user_operation(first, U256::zero()),
                ctx.user_operation(second, U256::zero()),
            ],
            aggregator,
            signature: Bytes::from(b"forged".to_vec()),
        },
    ];

    let receipt = ctx.entry_point.handle_aggregated_ops(groups, ctx.beneficiary)?;

    // the whole group is rejected, the rest of the batch goes on
    assert!(receipt.outcomes[0].success());
    let reason = FailedOpReason::SignatureValidationFailed { aggregator };
    assert_eq!(receipt.outcomes[1].failed_op(), Some(&FailedOp::new(1, reason.clone())));
    assert_eq!(receipt.outcomes[2].failed_op(), Some(&FailedOp::new(2, reason)));

    assert_eq!(ctx.counter_value(), U256::one());
    assert_eq!(ctx.entry_point.get_nonce(&first, U256::zero()), U256::zero());
    assert_eq!(ctx.entry_point.balance_of(&second), U256::from(common::ETHER));
    assert_eq!(receipt.collected, receipt.outcomes[0].actual_gas_cost);
    Ok(())
}

#[test]
fn aggregator_without_code() -> eyre::Result<()> {
    let mut ctx = setup()?;
    let aggregator = Address::random();
    let sender = deploy_aggregated_account(&mut ctx, 1, aggregator);

    let groups = vec![UserOpsPerAggregator {
        user_ops: vec![ctx.user_operation(sender, U256::zero())],
        aggregator,
        signature: aggregated_signature(),
    }];
    let receipt = ctx.entry_point.handle_aggregated_ops(groups, ctx.beneficiary)?;
    assert!(matches!(
        receipt.outcomes[0].failed_op(),
        Some(FailedOp { reason: FailedOpReason::SignatureValidationFailed { .. }, .. })
    ));
    Ok(())
}

#[test]
fn invalid_aggregator() -> eyre::Result<()> {
    let mut ctx = setup()?;
    let sender = ctx.deploy_account(1);

    let groups = vec![UserOpsPerAggregator {
        user_ops: vec![ctx.sign(ctx.user_operation(sender, U256::zero()))?],
        aggregator: *SIG_VALIDATION_FAILED,
        signature: Bytes::default(),
    }];
    assert_eq!(
        ctx.entry_point.handle_aggregated_ops(groups, ctx.beneficiary),
        Err(EntryPointError::InvalidAggregator)
    );
    assert_eq!(
        ctx.entry_point.handle_aggregated_ops(vec![], ctx.beneficiary),
        Err(EntryPointError::EmptyBatch)
    );
    Ok(())
}

#[test]
fn aggregator_mismatch() -> eyre::Result<()> {
    let mut ctx = setup()?;
    let aggregator = deploy_aggregator(&mut ctx);
    let other = deploy_aggregator(&mut ctx);
    let sender = deploy_aggregated_account(&mut ctx, 1, aggregator);

    // grouped under an aggregator the account did not choose
    let groups = vec![UserOpsPerAggregator {
        user_ops: vec![ctx.user_operation(sender, U256::zero())],
        aggregator: other,
        signature: aggregated_signature(),
    }];
    let receipt = ctx.entry_point.handle_aggregated_ops(groups, ctx.beneficiary)?;
    assert_eq!(
        receipt.outcomes[0].failed_op(),
        Some(&FailedOp::new(0, FailedOpReason::AccountSignatureError))
    );

    // not grouped at all
    let uo = ctx.user_operation(sender, U256::zero());
    let receipt = ctx.entry_point.handle_ops(vec![uo], ctx.beneficiary)?;
    assert_eq!(
        receipt.outcomes[0].failed_op(),
        Some(&FailedOp::new(0, FailedOpReason::AccountSignatureError))
    );
    Ok(())
}
