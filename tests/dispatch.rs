//! Balance gating, payouts and validation through the dispatcher.

use std::sync::Arc;

use treasury_disburser::disbursement::{
    BalanceGate, DisbursementError, DisbursementOutcome, DispatchOptions, FixedBonusEstimator,
    RandomPayoutEstimator, TransferRequest,
};

mod common;

const URLS: [&str; 2] = ["http://rpc-a", "http://rpc-b"];

#[tokio::test]
async fn test_gate_sufficient_with_reserve() {
    let (network, dispatcher, config) = common::mock_service(&URLS, &[], common::fixed_estimator());
    network.set_balance(dispatcher.manager().wallet().address(), common::eth(1.0));

    let gate = BalanceGate::new(dispatcher.manager().clone());
    let decision = gate
        .check_sufficient(common::eth(0.5), config.dispatch.fee_reserve_wei())
        .await
        .unwrap();

    assert!(decision.sufficient);
    assert_eq!(decision.available, common::eth(1.0));
}

#[tokio::test]
async fn test_dispatch_refuses_below_reserve() {
    let (network, dispatcher, _) = common::mock_service(&URLS, &[], common::fixed_estimator());
    network.set_balance(dispatcher.manager().wallet().address(), common::eth(0.0005));

    let request = TransferRequest::from_ether(common::TREASURY, 0.001, None).unwrap();
    let err = dispatcher
        .dispatch(request, DispatchOptions::default())
        .await
        .unwrap_err();

    match err {
        DisbursementError::InsufficientFunds { available, required } => {
            assert_eq!(available, common::eth(0.0005));
            assert_eq!(required, common::eth(0.002));
        }
        other => panic!("expected insufficient funds, got {:?}", other),
    }
    assert!(network.sent_transfers().is_empty());
}

#[tokio::test]
async fn test_underfunded_disbursement_is_simulated() {
    let (network, dispatcher, _) =
        common::mock_service(&URLS, &[], Arc::new(RandomPayoutEstimator));
    network.set_balance(dispatcher.manager().wallet().address(), common::eth(0.01));

    let outcome = dispatcher
        .simulate_then_pay(10.0, common::TREASURY, DispatchOptions::default())
        .await
        .unwrap();

    let estimate = *outcome.estimate();
    assert!(estimate.payout >= 0.03 && estimate.payout <= 0.075);

    match outcome {
        DisbursementOutcome::Simulated {
            available,
            shortfall,
            ..
        } => {
            let payout = treasury_disburser::blockchain::units::ether_to_wei(estimate.payout)
                .unwrap();
            assert_eq!(available, common::eth(0.01));
            assert_eq!(shortfall, payout + common::eth(0.001) - common::eth(0.01));
        }
        other => panic!("expected simulated outcome, got {:?}", other),
    }
    assert!(network.sent_transfers().is_empty());
}

#[tokio::test]
async fn test_funded_disbursement_is_paid() {
    let (network, dispatcher, _) =
        common::mock_service(&URLS, &[], Arc::new(FixedBonusEstimator::new(0.0)));
    network.set_balance(dispatcher.manager().wallet().address(), common::eth(1.0));

    let outcome = dispatcher
        .simulate_then_pay(10.0, common::TREASURY, DispatchOptions::default())
        .await
        .unwrap();

    match outcome {
        DisbursementOutcome::Paid { estimate, result } => {
            assert!((estimate.rate - 0.003 * 1.001).abs() < 1e-12);
            assert!(result.success);
            assert_eq!(
                network.balance_of(common::TREASURY.parse().unwrap()),
                result.amount
            );
        }
        other => panic!("expected paid outcome, got {:?}", other),
    }
}

#[tokio::test]
async fn test_invalid_destination_never_touches_network() {
    let (network, dispatcher, _) = common::mock_service(&URLS, &[], common::fixed_estimator());

    for bad in [
        "0x1234",
        "0fF31D4cdCE8B3f7929c04EbD4cd852608DC09f4aa",
        "",
    ] {
        let request = TransferRequest::from_ether(bad, 0.1, None).unwrap();
        let err = dispatcher
            .dispatch(request, DispatchOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DisbursementError::Validation(_)));
    }

    assert_eq!(network.opens(), 0);
    assert_eq!(network.rpc_calls(), 0);
}

#[tokio::test]
async fn test_balance_query_is_idempotent() {
    let (network, dispatcher, _) = common::mock_service(&URLS, &[], common::fixed_estimator());
    network.set_balance(dispatcher.manager().wallet().address(), common::eth(3.25));

    let first = dispatcher.query_balance().await.unwrap();
    let second = dispatcher.query_balance().await.unwrap();
    assert_eq!(first.available, second.available);
    assert_eq!(first.available, common::eth(3.25));
}
