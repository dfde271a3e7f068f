//! Authorization decision: online round-trip or local offline policy.

use std::time::Duration;
use tracing::{debug, warn};

use crate::Amount;
use crate::config::OfflinePolicy;
use crate::gateway::{AuthorizationGateway, GatewayError};
use crate::model::{Currency, TransactionKind, TransactionRequest, TransactionStatus, TxId};
use crate::protocol::Protocol;

use super::CollaboratorError;

const OFFLINE_APPROVED: &str = "Y1";
const OFFLINE_DECLINED: &str = "Z1";
const ISSUER_UNAVAILABLE: &str = "91";
const SYSTEM_MALFUNCTION: &str = "96";

/// How an authorization attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Decision {
    pub status: TransactionStatus,
    pub approval_code: Option<String>,
    pub response_code: String,
    pub response_message: Option<String>,
    pub balance: Option<Amount>,
}

impl Decision {
    fn offline_declined(reason: &str) -> Self {
        Self {
            status: TransactionStatus::Declined,
            approval_code: None,
            response_code: OFFLINE_DECLINED.into(),
            response_message: Some(reason.into()),
            balance: None,
        }
    }

    fn failed(e: GatewayError) -> Self {
        let response_code = match e {
            GatewayError::Timeout => ISSUER_UNAVAILABLE,
            GatewayError::Unavailable(_) => SYSTEM_MALFUNCTION,
        };
        Self {
            status: TransactionStatus::Error,
            approval_code: None,
            response_code: response_code.into(),
            response_message: Some(CollaboratorError::from(e).to_string()),
            balance: None,
        }
    }
}

/// Decide locally. Approves only when the protocol's risk class is within
/// policy and `amount` is within the currency's floor limit; the merchant's
/// approval code is echoed back.
pub(crate) fn decide_offline(
    policy: &OfflinePolicy,
    protocol: &Protocol,
    currency: Currency,
    amount: Amount,
    request: &TransactionRequest,
) -> Decision {
    if request.kind == TransactionKind::BalanceInquiry {
        return Decision::offline_declined("balance inquiry requires online authorization");
    }
    if protocol.risk_class > policy.max_risk_class {
        return Decision::offline_declined("protocol not eligible for offline approval");
    }
    let Some(limit) = policy.floor_limit(currency) else {
        return Decision::offline_declined("no offline floor limit for currency");
    };
    if amount > limit {
        return Decision::offline_declined("amount exceeds offline floor limit");
    }

    Decision {
        status: TransactionStatus::Approved,
        approval_code: Some(request.approval_code.clone()),
        response_code: OFFLINE_APPROVED.into(),
        response_message: Some("approved offline".into()),
        balance: None,
    }
}

/// Make exactly one gateway call bounded by `timeout`. Failures become an
/// `ERROR` decision rather than an error.
pub(crate) async fn authorize_online(
    gateway: &dyn AuthorizationGateway,
    timeout: Duration,
    transaction_id: TxId,
    request: &TransactionRequest,
) -> Decision {
    let call = gateway.authorize(transaction_id, request);
    let outcome = match tokio::time::timeout(timeout, call).await {
        Ok(outcome) => outcome,
        Err(_elapsed) => Err(GatewayError::Timeout),
    };

    match outcome {
        Ok(response) => {
            debug!(
                tx = %transaction_id,
                approved = response.approved,
                response_code = %response.response_code,
                "gateway replied"
            );
            let status = if response.approved {
                TransactionStatus::Approved
            } else {
                TransactionStatus::Declined
            };
            let approval_code = match status {
                TransactionStatus::Approved => response
                    .code
                    .or_else(|| Some(request.approval_code.clone())),
                _ => response.code,
            };
            Decision {
                status,
                approval_code,
                response_code: response.response_code,
                response_message: response.response_message,
                balance: response.balance,
            }
        }
        Err(e) => {
            warn!(tx = %transaction_id, reason = %e, "gateway authorization failed");
            Decision::failed(e)
        }
    }
}
