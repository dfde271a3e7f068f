//! Batch submission.
//!
//! Rows are submitted in order. A row may name an earlier row's label as its
//! target, which is how voids and pre-auth completions refer to transactions
//! whose ids are only known once processed.

use std::collections::HashMap;
use thiserror::Error;
use tokio_stream::{Stream, StreamExt};
use tracing::warn;

use crate::Amount;
use crate::engine::{Engine, EngineError};
use crate::model::{
    CardData, MerchantContext, MerchantId, PaymentMethod, TransactionKind, TransactionRequest,
    TransactionResult, TransactionType, TxId,
};

/// One parsed input row.
#[derive(Debug, Clone)]
pub struct BatchRow {
    pub line: usize,
    pub label: Option<String>,
    pub target: Option<String>,
    pub merchant: MerchantId,
    pub transaction_type: TransactionType,
    pub amount: Amount,
    pub currency: String,
    pub payment_method: PaymentMethod,
    pub protocol: String,
    pub online: bool,
    pub approval_code: String,
    pub card: CardData,
}

/// A processed row.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub label: Option<String>,
    pub result: TransactionResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TargetError {
    #[error("{0} requires a target")]
    Missing(TransactionType),

    #[error("target '{0}' does not name an earlier processed row")]
    Unknown(String),
}

/// Resolve `row` into a request, looking its target up in `labels`.
fn to_request(
    row: BatchRow,
    labels: &HashMap<String, TxId>,
) -> Result<(MerchantContext, TransactionRequest), TargetError> {
    let target = || -> Result<TxId, TargetError> {
        let label = row
            .target
            .as_deref()
            .ok_or(TargetError::Missing(row.transaction_type))?;
        labels
            .get(label)
            .copied()
            .ok_or_else(|| TargetError::Unknown(label.to_string()))
    };

    let kind = match row.transaction_type {
        TransactionType::Sale => TransactionKind::Sale,
        TransactionType::Refund => TransactionKind::Refund,
        TransactionType::Void => TransactionKind::Void { original: target()? },
        TransactionType::PreAuth => TransactionKind::PreAuth,
        TransactionType::PreAuthCompletion => TransactionKind::PreAuthCompletion {
            pre_auth: target()?,
        },
        TransactionType::BalanceInquiry => TransactionKind::BalanceInquiry,
    };

    let request = TransactionRequest {
        kind,
        amount: row.amount,
        currency: row.currency,
        payment_method: row.payment_method,
        protocol: row.protocol,
        online: row.online,
        approval_code: row.approval_code,
        card: row.card,
    };
    Ok((MerchantContext::new(row.merchant), request))
}

/// Submit every row of `rows` in order. Rows that cannot be submitted or are
/// rejected are logged and skipped; they do not stop the batch.
pub async fn run(
    engine: &Engine,
    mut rows: impl Stream<Item = BatchRow> + Unpin,
) -> Vec<BatchOutcome> {
    let mut labels: HashMap<String, TxId> = HashMap::new();
    let mut outcomes = Vec::new();

    while let Some(row) = rows.next().await {
        let line = row.line;
        let label = row.label.clone();

        let (ctx, request) = match to_request(row, &labels) {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!(line, reason = %e, "row skipped");
                continue;
            }
        };

        let result = match engine.submit(&ctx, request).await {
            Ok(result) => result,
            // committed; the engine already reported the missing notification
            Err(EngineError::Unannounced { result, .. }) => *result,
            Err(e) => {
                warn!(line, reason = %e, "row rejected");
                continue;
            }
        };

        if let Some(label) = &label {
            labels.insert(label.clone(), result.transaction_id);
        }
        outcomes.push(BatchOutcome { label, result });
    }

    outcomes
}
