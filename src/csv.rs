use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use thiserror::Error;

use crate::amount::AmountParseError;
use crate::batch::{BatchOutcome, BatchRow};
use crate::model::{CardData, MerchantId, UnknownVariant};

/// Errors that can occur when parsing csv rows
#[derive(Debug, Error)]
pub enum CsvError {
    #[error("failed to open '{path}': {source}")]
    Open { path: String, source: csv::Error },

    #[error("line {line}: failed to parse row: {source}")]
    Parse { line: usize, source: csv::Error },

    #[error("line {line}: {source}")]
    Unrecognized { line: usize, source: UnknownVariant },

    #[error("line {line}: invalid amount: {source}")]
    InvalidAmount {
        line: usize,
        source: AmountParseError,
    },
}

#[derive(Debug, Deserialize)]
struct InputRow {
    r#ref: Option<String>,
    merchant: MerchantId,
    r#type: String,
    amount: String,
    currency: String,
    method: String,
    protocol: String,
    online: bool,
    approval_code: String,
    card_number: String,
    expiry: String,
    cvv: String,
    target: Option<String>,
}

#[derive(Debug, Serialize)]
struct OutputRow<'a> {
    r#ref: &'a str,
    r#type: &'a str,
    status: &'a str,
    amount: String,
    currency: &'a str,
    approval_code: &'a str,
    mti: &'a str,
    response_code: &'a str,
    protocol: &'a str,
}

/// Read transaction requests from a csv file
pub fn read_requests(
    path: impl AsRef<Path>,
) -> Result<impl Iterator<Item = Result<BatchRow, CsvError>>, CsvError> {
    let path = path.as_ref();
    let reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|source| CsvError::Open {
            path: path.display().to_string(),
            source,
        })?;

    Ok(reader
        .into_deserialize::<InputRow>()
        .enumerate()
        .map(|(idx, result)| {
            let line = idx + 2; // 1-indexed, skip header
            let row = result.map_err(|source| CsvError::Parse { line, source })?;
            let unrecognized = |source| CsvError::Unrecognized { line, source };

            Ok(BatchRow {
                line,
                label: row.r#ref.filter(|label| !label.is_empty()),
                target: row.target.filter(|target| !target.is_empty()),
                merchant: row.merchant,
                transaction_type: row.r#type.parse().map_err(unrecognized)?,
                amount: row
                    .amount
                    .parse()
                    .map_err(|source| CsvError::InvalidAmount { line, source })?,
                currency: row.currency,
                payment_method: row.method.parse().map_err(unrecognized)?,
                protocol: row.protocol,
                online: row.online,
                approval_code: row.approval_code,
                card: CardData {
                    card_number: row.card_number,
                    expiry: row.expiry,
                    cvv: row.cvv,
                },
            })
        }))
}

/// Write processed results in csv format
pub fn write_results<W: io::Write>(outcomes: &[BatchOutcome], writer: W) -> csv::Result<()> {
    let mut writer = csv::Writer::from_writer(writer);

    for outcome in outcomes {
        let result = &outcome.result;
        writer.serialize(OutputRow {
            r#ref: outcome.label.as_deref().unwrap_or(""),
            r#type: result.transaction_type.as_str(),
            status: result.status.as_str(),
            amount: result.amount.to_string(),
            currency: result.currency.as_str(),
            approval_code: result.approval_code.as_deref().unwrap_or(""),
            mti: result.mti.as_str(),
            response_code: result.response_code.as_deref().unwrap_or(""),
            protocol: &result.protocol,
        })?;
    }

    writer.flush()?;
    Ok(())
}
