//! Core domain types for the payment terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::{Amount, Mti};

/// Merchant identifier, supplied by the identity/session layer.
pub type MerchantId = u32;

/// Transaction identifier, generated when processing starts.
pub type TxId = Uuid;

/// Authenticated merchant context passed into every engine call.
///
/// The engine trusts the merchant id it is given; credentials are checked
/// upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MerchantContext {
    pub merchant: MerchantId,
}

impl MerchantContext {
    pub fn new(merchant: MerchantId) -> Self {
        Self { merchant }
    }
}

/// Returned when a textual code does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Implements `as_str`, `Display` and `FromStr` over the wire names of a
/// field-less enum.
macro_rules! wire_enum {
    ($ty:ident, $kind:literal, { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            pub const ALL: &'static [$ty] = &[$($ty::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $name),+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok($ty::$variant),)+
                    other => Err(UnknownVariant { kind: $kind, value: other.to_string() }),
                }
            }
        }
    };
}

/// Currencies accepted by the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Eur,
    Gbp,
    Btc,
    Eth,
}

wire_enum!(Currency, "currency", {
    Usd => "USD",
    Eur => "EUR",
    Gbp => "GBP",
    Btc => "BTC",
    Eth => "ETH",
});

/// Discriminant of [`TransactionKind`], used for display and persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Sale,
    Refund,
    Void,
    PreAuth,
    PreAuthCompletion,
    BalanceInquiry,
}

wire_enum!(TransactionType, "transaction type", {
    Sale => "SALE",
    Refund => "REFUND",
    Void => "VOID",
    PreAuth => "PRE_AUTH",
    PreAuthCompletion => "PRE_AUTH_COMPLETION",
    BalanceInquiry => "BALANCE_INQUIRY",
});

/// What a request asks the terminal to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionKind {
    /// Debit the card.
    Sale,
    /// Credit the cardholder.
    Refund,
    /// Reverse a prior approved sale.
    Void { original: TxId },
    /// Hold funds without settling.
    PreAuth,
    /// Capture a prior approved pre-authorization.
    PreAuthCompletion { pre_auth: TxId },
    /// Query the card balance; moves no funds.
    BalanceInquiry,
}

impl TransactionKind {
    pub fn transaction_type(&self) -> TransactionType {
        match self {
            TransactionKind::Sale => TransactionType::Sale,
            TransactionKind::Refund => TransactionType::Refund,
            TransactionKind::Void { .. } => TransactionType::Void,
            TransactionKind::PreAuth => TransactionType::PreAuth,
            TransactionKind::PreAuthCompletion { .. } => TransactionType::PreAuthCompletion,
            TransactionKind::BalanceInquiry => TransactionType::BalanceInquiry,
        }
    }

    /// The earlier transaction this one operates on, if any.
    pub fn reference(&self) -> Option<TxId> {
        match self {
            TransactionKind::Void { original } => Some(*original),
            TransactionKind::PreAuthCompletion { pre_auth } => Some(*pre_auth),
            _ => None,
        }
    }
}

/// How the card details were captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    ManualEntry,
    CardSwipe,
    CardDip,
    CardNfc,
}

wire_enum!(PaymentMethod, "payment method", {
    ManualEntry => "MANUAL_ENTRY",
    CardSwipe => "CARD_SWIPE",
    CardDip => "CARD_DIP",
    CardNfc => "CARD_NFC",
});

/// Raw card details. Opaque to the engine and never persisted or logged.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CardData {
    pub card_number: String,
    pub expiry: String,
    pub cvv: String,
}

impl fmt::Debug for CardData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let last4: String = {
            let chars: Vec<char> = self.card_number.chars().collect();
            chars[chars.len().saturating_sub(4)..].iter().collect()
        };
        f.debug_struct("CardData")
            .field("card_number", &format_args!("****{last4}"))
            .field("expiry", &"**/**")
            .field("cvv", &"***")
            .finish()
    }
}

/// A single submission from the terminal.
///
/// `currency` and `protocol` are kept as the codes the client sent; the
/// validator resolves them.
#[derive(Debug, Clone)]
pub struct TransactionRequest {
    pub kind: TransactionKind,
    pub amount: Amount,
    pub currency: String,
    pub payment_method: PaymentMethod,
    pub protocol: String,
    pub online: bool,
    pub approval_code: String,
    pub card: CardData,
}

/// Outcome of a processed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionStatus {
    Approved,
    Declined,
    Error,
}

wire_enum!(TransactionStatus, "transaction status", {
    Approved => "APPROVED",
    Declined => "DECLINED",
    Error => "ERROR",
});

/// Immutable record of one processed transaction. Contains no card data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionResult {
    pub transaction_id: TxId,
    pub merchant: MerchantId,
    pub transaction_type: TransactionType,
    pub status: TransactionStatus,
    pub amount: Amount,
    pub currency: Currency,
    pub approval_code: Option<String>,
    pub response_code: Option<String>,
    pub response_message: Option<String>,
    pub mti: Mti,
    pub protocol: String,
    /// Original sale for a void, pre-authorization for a completion.
    pub reference: Option<TxId>,
    pub timestamp: DateTime<Utc>,
}

impl TransactionResult {
    pub fn is_approved(&self) -> bool {
        self.status == TransactionStatus::Approved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_round_trip() {
        for currency in Currency::ALL {
            assert_eq!(currency.as_str().parse::<Currency>().unwrap(), *currency);
        }
        for tx_type in TransactionType::ALL {
            assert_eq!(tx_type.as_str().parse::<TransactionType>().unwrap(), *tx_type);
        }
        for method in PaymentMethod::ALL {
            assert_eq!(method.as_str().parse::<PaymentMethod>().unwrap(), *method);
        }
    }

    #[test]
    fn unknown_wire_name_is_reported() {
        let err = "DOGE".parse::<Currency>().unwrap_err();
        assert_eq!(err.to_string(), "unknown currency 'DOGE'");
        assert!("sale".parse::<TransactionType>().is_err());
    }

    #[test]
    fn serde_matches_wire_names() {
        assert_eq!(
            serde_json::to_string(&TransactionType::PreAuthCompletion).unwrap(),
            "\"PRE_AUTH_COMPLETION\""
        );
        assert_eq!(serde_json::to_string(&PaymentMethod::CardNfc).unwrap(), "\"CARD_NFC\"");
        assert_eq!(serde_json::to_string(&Currency::Btc).unwrap(), "\"BTC\"");
        assert_eq!(serde_json::to_string(&TransactionStatus::Declined).unwrap(), "\"DECLINED\"");
    }

    #[test]
    fn kind_reference_and_type() {
        let id = Uuid::new_v4();
        assert_eq!(TransactionKind::Void { original: id }.reference(), Some(id));
        assert_eq!(
            TransactionKind::PreAuthCompletion { pre_auth: id }.transaction_type(),
            TransactionType::PreAuthCompletion
        );
        assert_eq!(TransactionKind::Sale.reference(), None);
    }

    #[test]
    fn card_data_debug_is_redacted() {
        let card = CardData {
            card_number: "4111111111111111".into(),
            expiry: "12/29".into(),
            cvv: "123".into(),
        };
        let debug = format!("{card:?}");
        assert!(debug.contains("****1111"));
        assert!(!debug.contains("4111111111111111"));
        assert!(!debug.contains("12/29"));
        assert!(!debug.contains("123\""));
    }
}
