//! Online authorization gateway.

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::Amount;
use crate::config::SimulatorConfig;
use crate::model::{TransactionKind, TransactionRequest, TxId};

/// Reply from the authorizing host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationResponse {
    pub approved: bool,
    /// Approval code issued by the host.
    pub code: Option<String>,
    pub response_code: String,
    pub response_message: Option<String>,
    /// Reported balance, for balance inquiries.
    pub balance: Option<Amount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("authorization timed out")]
    Timeout,

    #[error("gateway unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait AuthorizationGateway: Send + Sync {
    /// One authorization attempt. Card data travels with `request` and must
    /// not be retained by the implementation.
    async fn authorize(
        &self,
        transaction_id: TxId,
        request: &TransactionRequest,
    ) -> Result<AuthorizationResponse, GatewayError>;
}

/// Deterministic stand-in for an acquiring host.
///
/// Approves everything up to a configured amount and answers balance
/// inquiries with a fixed balance. Approval codes are derived from the
/// transaction id.
#[derive(Debug, Clone)]
pub struct SimulatedGateway {
    decline_above: Amount,
    balance: Amount,
}

impl SimulatedGateway {
    pub fn new(config: SimulatorConfig) -> Self {
        Self {
            decline_above: config.decline_above,
            balance: config.balance,
        }
    }

    fn approval_code(transaction_id: TxId) -> String {
        format!("{:06}", transaction_id.as_u128() % 1_000_000)
    }
}

#[async_trait]
impl AuthorizationGateway for SimulatedGateway {
    async fn authorize(
        &self,
        transaction_id: TxId,
        request: &TransactionRequest,
    ) -> Result<AuthorizationResponse, GatewayError> {
        let response = match request.kind {
            TransactionKind::BalanceInquiry => AuthorizationResponse {
                approved: true,
                code: Some(Self::approval_code(transaction_id)),
                response_code: "00".into(),
                response_message: Some("Balance available".into()),
                balance: Some(self.balance),
            },
            _ if request.amount > self.decline_above => AuthorizationResponse {
                approved: false,
                code: None,
                response_code: "61".into(),
                response_message: Some("Exceeds amount limit".into()),
                balance: None,
            },
            _ => AuthorizationResponse {
                approved: true,
                code: Some(Self::approval_code(transaction_id)),
                response_code: "00".into(),
                response_message: Some("Approved".into()),
                balance: None,
            },
        };

        debug!(
            tx = %transaction_id,
            approved = response.approved,
            response_code = %response.response_code,
            "simulated authorization"
        );
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CardData, PaymentMethod};
    use uuid::Uuid;

    fn request(kind: TransactionKind, amount: Amount) -> TransactionRequest {
        TransactionRequest {
            kind,
            amount,
            currency: "USD".into(),
            payment_method: PaymentMethod::CardDip,
            protocol: "POS Terminal -201.5".into(),
            online: true,
            approval_code: "123456".into(),
            card: CardData::default(),
        }
    }

    fn gateway() -> SimulatedGateway {
        SimulatedGateway::new(SimulatorConfig::default())
    }

    #[tokio::test]
    async fn approves_within_limit_with_six_digit_code() {
        let response = gateway()
            .authorize(Uuid::new_v4(), &request(TransactionKind::Sale, Amount::from_units(10)))
            .await
            .unwrap();
        assert!(response.approved);
        assert_eq!(response.response_code, "00");
        let code = response.code.unwrap();
        assert_eq!(code.len(), 6);
        assert!(code.bytes().all(|b| b.is_ascii_digit()));
    }

    #[tokio::test]
    async fn same_transaction_id_same_code() {
        let id = Uuid::new_v4();
        let req = request(TransactionKind::Sale, Amount::from_units(1));
        let a = gateway().authorize(id, &req).await.unwrap();
        let b = gateway().authorize(id, &req).await.unwrap();
        assert_eq!(a.code, b.code);
    }

    #[tokio::test]
    async fn declines_above_limit() {
        let response = gateway()
            .authorize(Uuid::new_v4(), &request(TransactionKind::Refund, Amount::from_units(1_001)))
            .await
            .unwrap();
        assert!(!response.approved);
        assert_eq!(response.code, None);
        assert_eq!(response.response_code, "61");
    }

    #[tokio::test]
    async fn balance_inquiry_reports_balance() {
        let response = gateway()
            .authorize(
                Uuid::new_v4(),
                &request(TransactionKind::BalanceInquiry, Amount::from_units(1)),
            )
            .await
            .unwrap();
        assert!(response.approved);
        assert_eq!(response.balance, Some(Amount::from_units(2_500)));
    }
}
