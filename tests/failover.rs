//! Endpoint failover through the public API.

use treasury_disburser::blockchain::BlockchainError;
use treasury_disburser::disbursement::{DisbursementError, DispatchOptions, TransferRequest};

mod common;

#[tokio::test]
async fn test_connects_past_unreachable_candidates() {
    let urls = ["http://bad1", "http://bad2", "http://good"];
    let (network, dispatcher, _) =
        common::mock_service(&urls, &["http://bad1", "http://bad2"], common::fixed_estimator());

    let conn = dispatcher.manager().acquire().await.unwrap();
    assert_eq!(conn.endpoint().url, "http://good");
    assert_eq!(conn.index(), 2);
    assert_eq!(dispatcher.manager().last_known_good(), 2);
    assert_eq!(network.opens(), 3);
}

#[tokio::test]
async fn test_first_k_unreachable() {
    let urls = ["http://e0", "http://e1", "http://e2", "http://e3", "http://e4"];
    for k in 0..urls.len() {
        let down: Vec<&str> = urls[..k].to_vec();
        let (_, dispatcher, _) = common::mock_service(&urls, &down, common::fixed_estimator());

        let conn = dispatcher.manager().acquire().await.unwrap();
        assert_eq!(conn.index(), k);
        assert_eq!(dispatcher.manager().last_known_good(), k);
    }
}

#[tokio::test]
async fn test_all_unreachable_is_connectivity_error() {
    let urls = ["http://bad1", "http://bad2", "http://bad3"];
    let (network, dispatcher, _) = common::mock_service(&urls, &urls, common::fixed_estimator());
    network.set_balance(dispatcher.manager().wallet().address(), common::eth(5.0));

    let request = TransferRequest::from_ether(common::TREASURY, 1.0, None).unwrap();
    let err = dispatcher
        .dispatch(request, DispatchOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DisbursementError::Connectivity(BlockchainError::Unreachable { attempted: 3 })
    ));
    assert!(!dispatcher.manager().is_live());
    assert!(network.sent_transfers().is_empty());
}

#[tokio::test]
async fn test_transfer_survives_endpoint_loss() {
    let urls = ["http://primary", "http://backup"];
    let (network, dispatcher, _) = common::mock_service(&urls, &[], common::fixed_estimator());
    network.set_balance(dispatcher.manager().wallet().address(), common::eth(5.0));

    let first = TransferRequest::from_ether(common::TREASURY, 0.5, None).unwrap();
    dispatcher.dispatch(first, DispatchOptions::default()).await.unwrap();
    assert_eq!(dispatcher.manager().status().index, Some(0));

    network.set_reachable("http://primary", false);

    let second = TransferRequest::from_ether(common::TREASURY, 0.5, None).unwrap();
    let result = dispatcher
        .dispatch(second, DispatchOptions::default())
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(dispatcher.manager().status().index, Some(1));
    let nonces: Vec<u64> = network.sent_transfers().iter().map(|t| t.nonce).collect();
    assert_eq!(nonces, vec![0, 1]);
}

#[tokio::test]
async fn test_recovers_on_next_request_after_outage() {
    let urls = ["http://only"];
    let (network, dispatcher, _) = common::mock_service(&urls, &urls, common::fixed_estimator());

    assert!(dispatcher.query_balance().await.is_err());
    assert!(!dispatcher.manager().is_live());

    network.set_reachable("http://only", true);
    let snapshot = dispatcher.query_balance().await.unwrap();
    assert_eq!(snapshot.endpoint, "http://only");
    assert!(dispatcher.manager().is_live());
}
