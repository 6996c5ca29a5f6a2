//! Route handlers.
//!
//! Handlers translate JSON bodies into dispatcher calls. Anything that can
//! broadcast runs in its own task so a dropped connection or an HTTP timeout
//! never abandons a transfer halfway through.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::blockchain::units::wei_to_ether;
use crate::blockchain::ConnectionStatus;
use crate::disbursement::{
    DisbursementOutcome, DisbursementResult, DispatchOptions, TransferRequest, TransferResult,
};
use crate::http::response::ApiError;
use crate::http::server::AppState;

/// A JSON number or a numeric string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Numeric {
    Number(f64),
    Text(String),
}

impl Numeric {
    fn parse(&self, field: &str) -> Result<f64, ApiError> {
        match self {
            Numeric::Number(n) => Ok(*n),
            Numeric::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| ApiError::bad_request(format!("{} must be a number, got '{}'", field, s))),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferBody {
    #[serde(alias = "toAddress", alias = "recipient", alias = "address")]
    pub to: Option<String>,
    #[serde(alias = "amountETH", alias = "amountEth")]
    pub amount: Option<Numeric>,
    pub gas_price_gwei: Option<Numeric>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisbursementBody {
    #[serde(alias = "loanAmount", alias = "loanAmountETH")]
    pub principal: Option<Numeric>,
    #[serde(alias = "treasuryWallet")]
    pub destination: Option<String>,
    pub strategies: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInfo {
    pub service: &'static str,
    pub version: &'static str,
    pub account: String,
    pub treasury: String,
    pub chain_id: u64,
    pub routes: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub healthy: bool,
    pub timestamp: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionView {
    pub connected: bool,
    pub endpoint: Option<String>,
    pub index: Option<usize>,
    pub generation: u64,
    pub last_known_good: usize,
    pub pool_size: usize,
}

impl From<ConnectionStatus> for ConnectionView {
    fn from(status: ConnectionStatus) -> Self {
        Self {
            connected: status.connected,
            endpoint: status.endpoint,
            index: status.index,
            generation: status.generation,
            last_known_good: status.last_known_good,
            pool_size: status.pool_size,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: &'static str,
    pub account: String,
    pub treasury: String,
    pub chain_id: u64,
    pub connection: ConnectionView,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub balance: f64,
    pub balance_wei: String,
    pub account: String,
    pub endpoint: String,
    pub usd: f64,
    pub has_gas: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferResponse {
    pub success: bool,
    pub confirmed: bool,
    pub tx_hash: String,
    pub block_number: u64,
    pub gas_used: u64,
    pub effective_gas_price: String,
    pub fee_paid: f64,
    pub to: String,
    pub amount: f64,
    pub amount_usd: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisbursementResponse {
    pub success: bool,
    pub confirmed: bool,
    pub simulated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_used: Option<u64>,
    pub payout: f64,
    pub payout_usd: f64,
    pub rate: f64,
    pub principal: f64,
    pub destination: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shortfall: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategies: Option<Value>,
}

pub const ROUTES: &[&str] = &[
    "GET /",
    "GET /health",
    "GET /status",
    "GET /balance",
    "POST /transfers",
    "POST /transfers/treasury",
    "POST /disbursements",
];

/// Paths kept so callers of the earlier service keep working.
pub const TRANSFER_ALIASES: &[&str] = &["/withdraw", "/transfer", "/send-eth", "/coinbase-withdraw"];
pub const TREASURY_ALIASES: &[&str] = &["/transfer-earnings-to-treasury"];
pub const DISBURSEMENT_ALIASES: &[&str] = &[
    "/execute",
    "/execute-flash-loan",
    "/flash-loan-mev",
    "/mev-flash-execute",
    "/api/strategy/flash-loan/execute",
    "/api/apex/flash-loan",
];

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

fn body_or_default<T: Default>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    match body {
        Ok(Json(value)) => Ok(value),
        // An empty POST is treated as `{}`
        Err(JsonRejection::MissingJsonContentType(_)) => Ok(T::default()),
        Err(rejection) => Err(ApiError::bad_request(rejection.body_text())),
    }
}

/// Run `work` detached from the request so it completes even if the client
/// goes away.
async fn run_detached<T, F>(work: F) -> Result<T, ApiError>
where
    F: std::future::Future<Output = DisbursementResult<T>> + Send + 'static,
    T: Send + 'static,
{
    match tokio::spawn(work).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(e) => {
            tracing::error!(error = %e, "Dispatch task failed");
            Err(ApiError::internal("dispatch task failed"))
        }
    }
}

pub async fn service_info(State(state): State<AppState>) -> impl IntoResponse {
    let manager = state.dispatcher.manager();
    Json(ServiceInfo {
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        account: manager.wallet().address().to_string(),
        treasury: state.config.account.treasury_address.clone(),
        chain_id: manager.wallet().chain_id(),
        routes: ROUTES.to_vec(),
    })
}

pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        healthy: true,
        timestamp: unix_now(),
    })
}

/// Identity and connection state. Performs no network I/O.
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let manager = state.dispatcher.manager();
    Json(StatusResponse {
        status: "online",
        account: manager.wallet().address().to_string(),
        treasury: state.config.account.treasury_address.clone(),
        chain_id: manager.wallet().chain_id(),
        connection: manager.status().into(),
    })
}

pub async fn balance(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let snapshot = state.dispatcher.query_balance().await?;
    let balance = wei_to_ether(snapshot.available);

    Ok(Json(BalanceResponse {
        balance,
        balance_wei: snapshot.available.to_string(),
        account: snapshot.account.to_string(),
        endpoint: snapshot.endpoint,
        usd: balance * state.config.display.usd_rate,
        has_gas: balance >= state.config.display.operating_gas_eth,
    }))
}

/// Transfer to a caller-supplied destination.
pub async fn transfer(
    State(state): State<AppState>,
    body: Result<Json<TransferBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let body = body_or_default(body)?;
    let to = body
        .to
        .clone()
        .ok_or_else(|| ApiError::bad_request("missing destination address 'to'"))?;
    execute_transfer(state, to, body).await
}

/// Transfer to the configured treasury.
pub async fn transfer_to_treasury(
    State(state): State<AppState>,
    body: Result<Json<TransferBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let body = body_or_default(body)?;
    let to = state.config.account.treasury_address.clone();
    execute_transfer(state, to, body).await
}

async fn execute_transfer(
    state: AppState,
    to: String,
    body: TransferBody,
) -> Result<Json<TransferResponse>, ApiError> {
    let amount = body
        .amount
        .as_ref()
        .ok_or_else(|| ApiError::bad_request("missing 'amount'"))?
        .parse("amount")?;
    let gas_price_gwei = body
        .gas_price_gwei
        .as_ref()
        .map(|g| g.parse("gasPriceGwei"))
        .transpose()?;

    let request = TransferRequest::from_ether(to, amount, gas_price_gwei)?;
    let options = DispatchOptions::default().with_cancel(state.cancel.child_token());

    tracing::info!(to = %request.to, amount, "Transfer requested");

    let dispatcher = state.dispatcher.clone();
    let result = run_detached(async move { dispatcher.dispatch(request, options).await }).await?;

    Ok(Json(transfer_response(&result, state.config.display.usd_rate)))
}

fn transfer_response(result: &TransferResult, usd_rate: f64) -> TransferResponse {
    let amount = wei_to_ether(result.amount);
    TransferResponse {
        success: result.success,
        confirmed: true,
        tx_hash: result.tx_hash.to_string(),
        block_number: result.block_number,
        gas_used: result.gas_used,
        effective_gas_price: result.effective_gas_price.to_string(),
        fee_paid: wei_to_ether(result.fee_paid),
        to: result.to.to_string(),
        amount,
        amount_usd: amount * usd_rate,
    }
}

/// Estimate a payout and pay it if funds allow, otherwise simulate.
pub async fn disburse(
    State(state): State<AppState>,
    body: Result<Json<DisbursementBody>, JsonRejection>,
) -> Result<(StatusCode, Json<DisbursementResponse>), ApiError> {
    let body = body_or_default(body)?;
    let principal = match &body.principal {
        Some(p) => p.parse("principal")?,
        None => state.config.dispatch.default_principal_eth,
    };
    let destination = body
        .destination
        .clone()
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| state.config.account.treasury_address.clone());
    let options = DispatchOptions::default().with_cancel(state.cancel.child_token());

    tracing::info!(principal, destination = %destination, "Disbursement requested");

    let dispatcher = state.dispatcher.clone();
    let target = destination.clone();
    let outcome = run_detached(async move {
        dispatcher
            .simulate_then_pay(principal, &target, options)
            .await
    })
    .await?;

    let usd_rate = state.config.display.usd_rate;
    let estimate = *outcome.estimate();
    let mut response = DisbursementResponse {
        success: true,
        confirmed: false,
        simulated: outcome.is_simulated(),
        tx_hash: None,
        block_number: None,
        gas_used: None,
        payout: estimate.payout,
        payout_usd: estimate.payout * usd_rate,
        rate: estimate.rate,
        principal: estimate.principal,
        destination,
        available: None,
        shortfall: None,
        strategies: body.strategies,
    };

    match outcome {
        DisbursementOutcome::Paid { result, .. } => {
            response.success = result.success;
            response.confirmed = true;
            response.tx_hash = Some(result.tx_hash.to_string());
            response.block_number = Some(result.block_number);
            response.gas_used = Some(result.gas_used);
        }
        DisbursementOutcome::Simulated {
            available,
            shortfall,
            ..
        } => {
            response.available = Some(wei_to_ether(available));
            response.shortfall = Some(wei_to_ether(shortfall));
        }
    }

    Ok((StatusCode::OK, Json(response)))
}
