//! Request validation.
//!
//! Runs before anything leaves the terminal, so a malformed approval code is
//! never forwarded to the authorization host. Checks run in a fixed order and
//! the first failure wins.

use crate::model::{Currency, TransactionRequest};
use crate::protocol::{Protocol, ProtocolRegistry};

use super::ValidationError;

/// What validation resolved from the request's raw codes.
#[derive(Debug, Clone, Copy)]
pub struct Validated<'r> {
    pub protocol: &'r Protocol,
    pub currency: Currency,
}

/// Validate `request` against `registry`:
/// - protocol must exist
/// - approval code length must equal the protocol's length
/// - approval code must be ASCII digits only
/// - amount must be positive
/// - currency must be supported
pub fn validate<'r>(
    registry: &'r ProtocolRegistry,
    request: &TransactionRequest,
) -> Result<Validated<'r>, ValidationError> {
    let protocol = registry
        .lookup(&request.protocol)
        .ok_or_else(|| ValidationError::UnknownProtocol(request.protocol.clone()))?;

    let actual = request.approval_code.chars().count();
    if actual != protocol.approval_length {
        return Err(ValidationError::ApprovalCodeLengthMismatch {
            expected: protocol.approval_length,
            actual,
        });
    }

    if request.approval_code.is_empty()
        || !request.approval_code.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(ValidationError::ApprovalCodeNotNumeric);
    }

    if !request.amount.is_positive() {
        return Err(ValidationError::InvalidAmount(request.amount));
    }

    let currency = request
        .currency
        .parse::<Currency>()
        .map_err(|_| ValidationError::UnsupportedCurrency(request.currency.clone()))?;

    Ok(Validated { protocol, currency })
}
