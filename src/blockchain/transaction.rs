//! Transfer building, signing, and inclusion checks.
//!
//! # Responsibilities
//! - Take the nonce from the pending transaction count on every build
//! - Build and locally sign legacy value transfers
//! - Report how far a broadcast transaction has progressed
//!
//! Deadlines and cancellation belong to the caller; everything here is a
//! single round of RPC calls against one live connection.

use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, TxHash, U256};
use alloy::rpc::types::TransactionRequest;

use crate::blockchain::client::RpcHandle;
use crate::blockchain::connection::LiveConnection;
use crate::blockchain::types::{BlockchainResult, ConfirmationStatus, SignedTransfer};

/// Parameters of a plain value transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferPlan {
    pub to: Address,
    pub value: U256,
    pub gas_price: u128,
    pub gas_limit: u64,
}

/// Build and sign `plan` with the account bound to `conn`.
///
/// The nonce comes from the pending transaction count so transfers left in
/// the mempool by an earlier run are never reused.
pub async fn sign_transfer(
    conn: &LiveConnection,
    plan: TransferPlan,
) -> BlockchainResult<SignedTransfer> {
    let wallet = conn.wallet();

    let nonce = conn.rpc().pending_nonce(wallet.address()).await?;

    let tx = TransactionRequest::default()
        .with_to(plan.to)
        .with_value(plan.value)
        .with_nonce(nonce)
        .with_gas_price(plan.gas_price)
        .with_gas_limit(plan.gas_limit)
        .with_chain_id(wallet.chain_id());

    let signed = wallet.sign_transfer(tx).await?;

    tracing::debug!(
        tx_hash = %signed.hash,
        nonce = nonce,
        endpoint = %conn.endpoint().display_url(),
        "Transfer signed"
    );

    Ok(signed)
}

/// One inclusion check for `tx_hash`.
///
/// With `required_blocks == 0` inclusion alone confirms; otherwise the head
/// must be at least `required_blocks` past the inclusion block.
pub async fn check_inclusion(
    rpc: &dyn RpcHandle,
    tx_hash: TxHash,
    required_blocks: u32,
) -> BlockchainResult<ConfirmationStatus> {
    let receipt = match rpc.receipt(tx_hash).await? {
        Some(r) => r,
        None => return Ok(ConfirmationStatus::Pending),
    };

    if required_blocks == 0 {
        return Ok(ConfirmationStatus::Confirmed(receipt));
    }

    let head = rpc.block_number().await?;
    let depth = head.saturating_sub(receipt.block_number);
    let current = u32::try_from(depth).unwrap_or(u32::MAX);

    if current >= required_blocks {
        Ok(ConfirmationStatus::Confirmed(receipt))
    } else {
        Ok(ConfirmationStatus::Confirming {
            current,
            required: required_blocks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::mock::{MockNetwork, MOCK_GAS_PRICE};
    use crate::blockchain::pool::EndpointPool;
    use crate::blockchain::wallet::Wallet;
    use crate::blockchain::ConnectionManager;
    use std::sync::Arc;

    const TEST_PRIVATE_KEY: &str =
        "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn manager(network: &MockNetwork) -> ConnectionManager {
        network.add_endpoint("http://rpc-a");
        let pool = EndpointPool::new(["http://rpc-a"]).unwrap();
        let wallet = Wallet::from_private_key(TEST_PRIVATE_KEY, 1).unwrap();
        ConnectionManager::new(pool, Arc::new(network.connector()), wallet)
    }

    fn plan(to: Address) -> TransferPlan {
        TransferPlan {
            to,
            value: U256::from(1_000u64),
            gas_price: MOCK_GAS_PRICE,
            gas_limit: 21_000,
        }
    }

    #[tokio::test]
    async fn test_nonce_synced_from_chain() {
        let network = MockNetwork::new(1);
        let manager = manager(&network);
        let from = manager.wallet().address();
        network.set_balance(from, U256::from(10u64).pow(U256::from(18u64)));

        let conn = manager.acquire().await.unwrap();
        let to = Address::repeat_byte(0x11);

        let first = sign_transfer(&conn, plan(to)).await.unwrap();
        assert_eq!(first.nonce, 0);
        // Signing alone does not consume a nonce
        let resigned = sign_transfer(&conn, plan(to)).await.unwrap();
        assert_eq!(resigned.nonce, 0);

        conn.rpc().send_raw(&first).await.unwrap();
        let second = sign_transfer(&conn, plan(to)).await.unwrap();
        assert_eq!(second.nonce, 1);
        assert_eq!(second.to, to);
        assert_ne!(first.hash, second.hash);
    }

    #[tokio::test]
    async fn test_inclusion_progress() {
        let network = MockNetwork::new(1);
        let manager = manager(&network);
        network.set_balance(manager.wallet().address(), U256::from(10u64).pow(U256::from(18u64)));
        network.hold_inclusion(true);

        let conn = manager.acquire().await.unwrap();
        let signed = sign_transfer(&conn, plan(Address::repeat_byte(0x22))).await.unwrap();
        let hash = conn.rpc().send_raw(&signed).await.unwrap();

        let status = check_inclusion(conn.rpc(), hash, 0).await.unwrap();
        assert_eq!(status, ConfirmationStatus::Pending);

        network.mine();
        let status = check_inclusion(conn.rpc(), hash, 2).await.unwrap();
        assert_eq!(
            status,
            ConfirmationStatus::Confirming {
                current: 0,
                required: 2
            }
        );

        let status = check_inclusion(conn.rpc(), hash, 0).await.unwrap();
        match status {
            ConfirmationStatus::Confirmed(receipt) => {
                assert_eq!(receipt.tx_hash, hash);
                assert_eq!(receipt.gas_used, 21_000);
                assert!(receipt.success);
            }
            other => panic!("expected confirmed, got {:?}", other),
        }
    }
}
