//! MTI notifications.
//!
//! Every approved or declined transaction produces one notification. Stores
//! keep the message as an opaque JSON string ([`RawNotification`]); the
//! decoder turns it back into a [`Notification`] and refuses anything that is
//! not fully well-formed, so callers never render half a message.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::Mti;
use crate::model::{MerchantId, TransactionResult, TransactionStatus, TransactionType};

pub type NotificationId = Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("malformed notification payload: {0}")]
    MalformedPayload(String),
}

/// Structured body of a notification.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NotificationMessage {
    pub mti: Mti,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub status: Option<TransactionStatus>,
    #[serde(default)]
    pub approval_code: Option<String>,
    #[serde(default)]
    pub response_code: Option<String>,
    #[serde(default)]
    pub response_message: Option<String>,
}

impl NotificationMessage {
    /// Serialize to the stored JSON form. Absent fields are omitted.
    pub fn encode(&self) -> String {
        let mut map = Map::new();
        map.insert("mti".into(), Value::String(self.mti.to_string()));

        let optional = [
            ("description", self.description.as_deref()),
            ("transaction_id", self.transaction_id.as_deref()),
            ("status", self.status.as_ref().map(TransactionStatus::as_str)),
            ("approval_code", self.approval_code.as_deref()),
            ("response_code", self.response_code.as_deref()),
            ("response_message", self.response_message.as_deref()),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                map.insert(key.into(), Value::String(value.to_string()));
            }
        }

        Value::Object(map).to_string()
    }

    /// Parse a stored JSON message.
    pub fn decode(payload: &str) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_str(payload)
            .map_err(|e| DecodeError::MalformedPayload(e.to_string()))?;
        if !value.is_object() {
            return Err(DecodeError::MalformedPayload(
                "payload is not a JSON object".into(),
            ));
        }
        NotificationMessage::deserialize(value)
            .map_err(|e| DecodeError::MalformedPayload(e.to_string()))
    }
}

/// A decoded notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: NotificationId,
    pub merchant: MerchantId,
    pub timestamp: DateTime<Utc>,
    pub processed: bool,
    pub message: NotificationMessage,
}

/// A notification as held by a store: the message is an opaque string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawNotification {
    pub id: NotificationId,
    pub merchant: MerchantId,
    pub timestamp: DateTime<Utc>,
    pub processed: bool,
    pub message: String,
}

impl RawNotification {
    /// Flip `processed` to true. Returns whether the flag changed.
    pub fn mark_processed(&mut self) -> bool {
        !std::mem::replace(&mut self.processed, true)
    }
}

impl Notification {
    /// Build the unprocessed notification announcing `result`.
    pub fn for_result(result: &TransactionResult) -> Self {
        Self {
            id: Uuid::new_v4(),
            merchant: result.merchant,
            timestamp: result.timestamp,
            processed: false,
            message: NotificationMessage {
                mti: result.mti,
                description: Some(describe(result)),
                transaction_id: Some(result.transaction_id.to_string()),
                status: Some(result.status),
                approval_code: result.approval_code.clone(),
                response_code: result.response_code.clone(),
                response_message: result.response_message.clone(),
            },
        }
    }

    /// Flip `processed` to true. Returns whether the flag changed.
    pub fn mark_processed(&mut self) -> bool {
        !std::mem::replace(&mut self.processed, true)
    }

    pub fn encode(&self) -> RawNotification {
        RawNotification {
            id: self.id,
            merchant: self.merchant,
            timestamp: self.timestamp,
            processed: self.processed,
            message: self.message.encode(),
        }
    }

    /// Decode a stored notification. Decoding never touches `processed`.
    pub fn decode(raw: &RawNotification) -> Result<Self, DecodeError> {
        Ok(Self {
            id: raw.id,
            merchant: raw.merchant,
            timestamp: raw.timestamp,
            processed: raw.processed,
            message: NotificationMessage::decode(&raw.message)?,
        })
    }
}

/// Decode every item independently; a malformed item is logged and reported
/// in place without affecting the rest.
pub fn decode_all(
    raws: impl IntoIterator<Item = RawNotification>,
) -> Vec<Result<Notification, DecodeError>> {
    raws.into_iter()
        .map(|raw| {
            let decoded = Notification::decode(&raw);
            if let Err(e) = &decoded {
                warn!(notification = %raw.id, reason = %e, "skipping notification");
            }
            decoded
        })
        .collect()
}

fn describe(result: &TransactionResult) -> String {
    let what = match result.transaction_type {
        TransactionType::Sale => "Sale",
        TransactionType::Refund => "Refund",
        TransactionType::Void => "Void",
        TransactionType::PreAuth => "Pre-authorization",
        TransactionType::PreAuthCompletion => "Pre-authorization completion",
        TransactionType::BalanceInquiry => "Balance inquiry",
    };
    let outcome = match result.status {
        TransactionStatus::Approved => "approved",
        TransactionStatus::Declined => "declined",
        TransactionStatus::Error => "failed",
    };
    format!("{what} {outcome} ({} {})", result.amount, result.currency)
}
