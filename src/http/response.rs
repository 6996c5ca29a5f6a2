//! JSON error responses.
//!
//! Every failure leaves the service as `{error, category, ...details}` with a
//! status derived from the category:
//!
//! | category | status |
//! |---|---|
//! | validation, insufficient_funds | 400 |
//! | connectivity | 503 |
//! | submission, confirmation_timeout, internal | 500 |

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Map, Value};

use crate::blockchain::units::wei_to_ether;
use crate::disbursement::DisbursementError;

/// An error ready to be written to the client.
#[derive(Debug, Clone)]
pub struct ApiError {
    status: StatusCode,
    body: Map<String, Value>,
}

impl ApiError {
    fn new(status: StatusCode, category: &str, message: impl Into<String>) -> Self {
        let mut body = Map::new();
        body.insert("error".to_string(), Value::String(message.into()));
        body.insert("category".to_string(), Value::String(category.to_string()));
        Self { status, body }
    }

    /// Malformed request caught before reaching the dispatcher.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "validation", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
    }

    fn with(mut self, key: &str, value: Value) -> Self {
        self.body.insert(key.to_string(), value);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn category(&self) -> &str {
        self.body
            .get("category")
            .and_then(Value::as_str)
            .unwrap_or("internal")
    }
}

impl From<DisbursementError> for ApiError {
    fn from(err: DisbursementError) -> Self {
        let message = err.to_string();
        let category = err.category();
        match err {
            DisbursementError::Validation(_) => {
                Self::new(StatusCode::BAD_REQUEST, category, message)
            }
            DisbursementError::InsufficientFunds {
                available,
                required,
            } => Self::new(StatusCode::BAD_REQUEST, category, message)
                .with("available", json!(wei_to_ether(available)))
                .with("required", json!(wei_to_ether(required)))
                .with(
                    "shortfall",
                    json!(wei_to_ether(required.saturating_sub(available))),
                ),
            DisbursementError::Connectivity(_) => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, category, message)
            }
            DisbursementError::Submission { code, .. } => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, category, message)
                    .with("code", json!(code))
            }
            DisbursementError::ConfirmationTimeout {
                tx_hash,
                waited_secs,
                cancelled,
            } => Self::new(StatusCode::INTERNAL_SERVER_ERROR, category, message)
                .with("txHash", json!(tx_hash.to_string()))
                .with("waitedSecs", json!(waited_secs))
                .with("cancelled", json!(cancelled)),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(Value::Object(self.body))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::BlockchainError;
    use alloy::primitives::{TxHash, U256};

    #[test]
    fn test_status_mapping() {
        let cases = [
            (DisbursementError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (
                DisbursementError::InsufficientFunds {
                    available: U256::ZERO,
                    required: U256::from(1u64),
                },
                StatusCode::BAD_REQUEST,
            ),
            (
                DisbursementError::Connectivity(BlockchainError::Unreachable { attempted: 2 }),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                DisbursementError::Submission {
                    reason: "nonce too low".into(),
                    code: Some(-32000),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                DisbursementError::ConfirmationTimeout {
                    tx_hash: TxHash::ZERO,
                    waited_secs: 1,
                    cancelled: false,
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            let category = err.category();
            let api = ApiError::from(err);
            assert_eq!(api.status(), status);
            assert_eq!(api.category(), category);
        }
    }

    #[test]
    fn test_insufficient_funds_details() {
        let api = ApiError::from(DisbursementError::InsufficientFunds {
            available: U256::from(250_000_000_000_000_000u64),
            required: U256::from(1_000_000_000_000_000_000u64),
        });
        assert_eq!(api.body["available"], json!(0.25));
        assert_eq!(api.body["required"], json!(1.0));
        assert_eq!(api.body["shortfall"], json!(0.75));
    }
}
