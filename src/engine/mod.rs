//! Transaction processing engine.
//!
//! The engine validates a request against the protocol registry, resolves the
//! transaction it refers to (voids and pre-auth completions), obtains an
//! authorization decision online or offline, then records the result in the
//! history store and announces it on the notification feed.
//!
//! The engine is cheap to clone and any number of submissions may run
//! concurrently. Its only mutable state is the per-target locks that keep two
//! voids of one sale, or two completions of one hold, from both passing.

use chrono::Utc;
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::Amount;
use crate::Mti;
use crate::config::{GatewayConfig, OfflinePolicy, PreAuthConfig, TerminalConfig};
use crate::gateway::AuthorizationGateway;
use crate::model::{
    Currency, MerchantContext, TransactionKind, TransactionRequest, TransactionResult,
    TransactionStatus, TransactionType, TxId,
};
use crate::notification::{self, DecodeError, Notification, NotificationId, RawNotification};
use crate::protocol::{Protocol, ProtocolRegistry};
use crate::store::{HistoryStore, NotificationStore, StoreError};

mod decision;
use decision::{Decision, authorize_online, decide_offline};

mod locks;
use locks::TargetLocks;

mod error;
pub use error::{CollaboratorError, EngineError, ProcessingError, ValidationError};

mod validate;
pub use validate::{Validated, validate};

/// External services the engine depends on.
#[derive(Clone)]
pub struct Collaborators {
    pub history: Arc<dyn HistoryStore>,
    pub notifications: Arc<dyn NotificationStore>,
    pub gateway: Arc<dyn AuthorizationGateway>,
}

/// The transaction processing engine.
#[derive(Clone)]
pub struct Engine {
    registry: Arc<ProtocolRegistry>,
    offline: Arc<OfflinePolicy>,
    gateway_config: GatewayConfig,
    pre_auth: PreAuthConfig,
    collaborators: Collaborators,
    targets: Arc<TargetLocks>,
}

/// Amount and currency a request will settle in once its reference is resolved.
struct Settlement {
    amount: Amount,
    currency: Currency,
}

/// Public API
impl Engine {
    pub fn new(
        registry: ProtocolRegistry,
        config: &TerminalConfig,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            registry: Arc::new(registry),
            offline: Arc::new(config.offline.clone()),
            gateway_config: config.gateway,
            pre_auth: config.pre_auth,
            collaborators,
            targets: Arc::new(TargetLocks::default()),
        }
    }

    /// All known protocols in load order.
    pub fn list_protocols(&self) -> &[Protocol] {
        self.registry.list()
    }

    /// Validate without processing.
    pub fn validate(&self, request: &TransactionRequest) -> Result<Validated<'_>, ValidationError> {
        validate(&self.registry, request)
    }

    /// Validate, authorize and record one transaction.
    ///
    /// Validation and processing errors leave no trace. Otherwise exactly one
    /// result is appended to history; approved and declined results also
    /// emit exactly one notification. Gateway failures produce an `ERROR`
    /// result and no notification.
    ///
    /// History is the commit point. If the notification cannot be stored
    /// after that, [`EngineError::Unannounced`] carries the committed result.
    /// The request, and its card data, is dropped when this returns.
    pub async fn submit(
        &self,
        ctx: &MerchantContext,
        request: TransactionRequest,
    ) -> Result<TransactionResult, EngineError> {
        let tx_type = request.kind.transaction_type();
        let result = self.process(ctx, &request).await;
        Self::log_result(ctx, tx_type, &request, &result);
        result
    }

    /// Transactions of this merchant, most recent first.
    pub async fn history(
        &self,
        ctx: &MerchantContext,
    ) -> Result<Vec<TransactionResult>, StoreError> {
        self.collaborators.history.list_by_merchant(ctx.merchant).await
    }

    /// Decoded notifications of this merchant, most recent first. Malformed
    /// entries are reported in place.
    pub async fn notifications(
        &self,
        ctx: &MerchantContext,
    ) -> Result<Vec<Result<Notification, DecodeError>>, StoreError> {
        let raws = self.collaborators.notifications.list(ctx.merchant).await?;
        Ok(notification::decode_all(raws))
    }

    pub fn decode_notification(&self, raw: &RawNotification) -> Result<Notification, DecodeError> {
        Notification::decode(raw)
    }

    /// Returns whether the flag changed.
    pub async fn mark_notification_processed(
        &self,
        id: NotificationId,
    ) -> Result<bool, StoreError> {
        self.collaborators.notifications.mark_processed(id).await
    }
}

/// Private API
impl Engine {
    /// Small helper to log `submit` results
    fn log_result(
        ctx: &MerchantContext,
        tx_type: TransactionType,
        request: &TransactionRequest,
        result: &Result<TransactionResult, EngineError>,
    ) {
        match result {
            Ok(r) => {
                info!(
                    merchant = ctx.merchant,
                    tx = %r.transaction_id,
                    amount = %r.amount,
                    currency = %r.currency,
                    status = %r.status,
                    mti = %r.mti,
                    "{tx_type} processed"
                );
            }
            Err(EngineError::Unannounced { result: r, source }) => {
                error!(
                    merchant = ctx.merchant,
                    tx = %r.transaction_id,
                    status = %r.status,
                    reason = %source,
                    "{tx_type} committed without notification"
                );
            }
            Err(e) => {
                warn!(
                    merchant = ctx.merchant,
                    amount = %request.amount,
                    protocol = %request.protocol,
                    reason = %e,
                    "{tx_type} rejected"
                );
            }
        }
    }

    async fn process(
        &self,
        ctx: &MerchantContext,
        request: &TransactionRequest,
    ) -> Result<TransactionResult, EngineError> {
        let validated = validate(&self.registry, request)?;

        // held until the result is recorded
        let _target = match request.kind.reference() {
            Some(target) => Some(self.targets.lock(target).await),
            None => None,
        };
        let settlement = self.resolve(ctx, request, validated.currency).await?;

        let transaction_id = Uuid::new_v4();
        let decision = if request.online {
            authorize_online(
                self.collaborators.gateway.as_ref(),
                self.gateway_config.timeout(),
                transaction_id,
                &Self::settled_request(request, &settlement),
            )
            .await
        } else {
            decide_offline(
                &self.offline,
                validated.protocol,
                settlement.currency,
                settlement.amount,
                request,
            )
        };

        let result = Self::build_result(
            ctx,
            transaction_id,
            request,
            validated.protocol,
            settlement,
            decision,
        );
        let notification = match result.status {
            TransactionStatus::Error => None,
            TransactionStatus::Approved | TransactionStatus::Declined => {
                Some(Notification::for_result(&result).encode())
            }
        };

        self.collaborators.history.append(result.clone()).await?;
        if let Some(notification) = notification {
            if let Err(source) = self.collaborators.notifications.append(notification).await {
                return Err(EngineError::Unannounced {
                    result: Box::new(result),
                    source,
                });
            }
        }

        Ok(result)
    }

    /// The request as the gateway must see it: a void reverses the amount and
    /// currency of its sale, not whatever the request carried.
    fn settled_request<'r>(
        request: &'r TransactionRequest,
        settlement: &Settlement,
    ) -> Cow<'r, TransactionRequest> {
        if request.amount == settlement.amount && request.currency == settlement.currency.as_str() {
            return Cow::Borrowed(request);
        }
        Cow::Owned(TransactionRequest {
            amount: settlement.amount,
            currency: settlement.currency.as_str().to_string(),
            ..request.clone()
        })
    }

    /// Check the transaction a void or completion refers to and work out what
    /// the new transaction settles.
    async fn resolve(
        &self,
        ctx: &MerchantContext,
        request: &TransactionRequest,
        currency: Currency,
    ) -> Result<Settlement, EngineError> {
        match request.kind {
            TransactionKind::Void { original } => self.resolve_void(ctx, original).await,
            TransactionKind::PreAuthCompletion { pre_auth } => {
                self.resolve_completion(ctx, pre_auth, request.amount, currency)
                    .await
            }
            TransactionKind::Sale
            | TransactionKind::Refund
            | TransactionKind::PreAuth
            | TransactionKind::BalanceInquiry => Ok(Settlement {
                amount: request.amount,
                currency,
            }),
        }
    }

    /// A void must target an approved sale of the same merchant that has no
    /// approved void yet. The void settles the sale's amount and currency.
    async fn resolve_void(
        &self,
        ctx: &MerchantContext,
        original: TxId,
    ) -> Result<Settlement, EngineError> {
        let target = self
            .collaborators
            .history
            .find_by_id(original)
            .await?
            .filter(|t| {
                t.merchant == ctx.merchant
                    && t.transaction_type == TransactionType::Sale
                    && t.is_approved()
            })
            .ok_or(ProcessingError::VoidTargetNotFound(original))?;

        if self
            .has_approved_follow_up(ctx, TransactionType::Void, original)
            .await?
        {
            return Err(ProcessingError::AlreadyVoided(original).into());
        }

        Ok(Settlement {
            amount: target.amount,
            currency: target.currency,
        })
    }

    /// A completion must target a live, uncompleted, approved pre-auth of the
    /// same merchant, in the same currency and for no more than was held.
    async fn resolve_completion(
        &self,
        ctx: &MerchantContext,
        pre_auth: TxId,
        amount: Amount,
        currency: Currency,
    ) -> Result<Settlement, EngineError> {
        let hold = self
            .collaborators
            .history
            .find_by_id(pre_auth)
            .await?
            .filter(|t| {
                t.merchant == ctx.merchant
                    && t.transaction_type == TransactionType::PreAuth
                    && t.is_approved()
            })
            .ok_or(ProcessingError::PreAuthNotFound(pre_auth))?;

        if Utc::now() - hold.timestamp > self.pre_auth.ttl() {
            return Err(ProcessingError::PreAuthExpired(pre_auth).into());
        }

        if self
            .has_approved_follow_up(ctx, TransactionType::PreAuthCompletion, pre_auth)
            .await?
        {
            return Err(ProcessingError::PreAuthAlreadyCompleted(pre_auth).into());
        }

        if hold.currency != currency {
            return Err(ProcessingError::CompletionCurrencyMismatch {
                pre_auth,
                held: hold.currency,
                requested: currency,
            }
            .into());
        }

        if amount > hold.amount {
            return Err(ProcessingError::CompletionExceedsHold {
                pre_auth,
                held: hold.amount,
                requested: amount,
            }
            .into());
        }

        Ok(Settlement { amount, currency })
    }

    /// Whether an approved `follow_up` transaction already references `target`.
    async fn has_approved_follow_up(
        &self,
        ctx: &MerchantContext,
        follow_up: TransactionType,
        target: TxId,
    ) -> Result<bool, StoreError> {
        let history = self
            .collaborators
            .history
            .list_by_merchant(ctx.merchant)
            .await?;
        Ok(history.iter().any(|t| {
            t.transaction_type == follow_up && t.reference == Some(target) && t.is_approved()
        }))
    }

    fn build_result(
        ctx: &MerchantContext,
        transaction_id: TxId,
        request: &TransactionRequest,
        protocol: &Protocol,
        settlement: Settlement,
        decision: Decision,
    ) -> TransactionResult {
        let transaction_type = request.kind.transaction_type();
        let mti = match decision.status {
            TransactionStatus::Error => Mti::SYSTEM_ERROR,
            TransactionStatus::Approved | TransactionStatus::Declined => {
                response_mti(transaction_type)
            }
        };
        let amount = match request.kind {
            TransactionKind::BalanceInquiry => decision.balance.unwrap_or(settlement.amount),
            _ => settlement.amount,
        };

        TransactionResult {
            transaction_id,
            merchant: ctx.merchant,
            transaction_type,
            status: decision.status,
            amount,
            currency: settlement.currency,
            approval_code: decision.approval_code,
            response_code: Some(decision.response_code),
            response_message: decision.response_message,
            mti,
            protocol: protocol.id.clone(),
            reference: request.kind.reference(),
            timestamp: Utc::now(),
        }
    }
}

/// Response MTI announced for a completed (approved or declined) transaction.
fn response_mti(transaction_type: TransactionType) -> Mti {
    match transaction_type {
        TransactionType::Sale => Mti::FINANCIAL_RESPONSE,
        TransactionType::Refund | TransactionType::PreAuthCompletion => {
            Mti::FINANCIAL_ADVICE_RESPONSE
        }
        TransactionType::Void => Mti::REVERSAL_RESPONSE,
        TransactionType::PreAuth | TransactionType::BalanceInquiry => Mti::AUTHORIZATION_RESPONSE,
    }
}
