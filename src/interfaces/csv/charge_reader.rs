use crate::domain::payment::ChargeCommand;
use crate::error::{PaymentError, Result};
use serde::Deserialize;
use std::io::Read;

/// One CSV row. Metadata is optional and written as `key=value;key=value`.
#[derive(Debug, Deserialize)]
struct ChargeRow {
    idempotency_key: String,
    provider: String,
    amount: i64,
    currency: String,
    payer_reference: String,
    #[serde(default)]
    metadata: Option<String>,
}

impl TryFrom<ChargeRow> for ChargeCommand {
    type Error = PaymentError;

    fn try_from(row: ChargeRow) -> Result<Self> {
        let mut command = ChargeCommand::new(
            row.idempotency_key,
            row.provider,
            row.amount,
            row.currency,
            row.payer_reference,
        );
        for pair in row.metadata.as_deref().unwrap_or("").split(';') {
            let pair = pair.trim();
            if pair.is_empty() {
                continue;
            }
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                PaymentError::InvalidCommand(format!("metadata entry '{pair}' is not key=value"))
            })?;
            command = command.with_metadata(key.trim(), value.trim());
        }
        Ok(command)
    }
}

/// Reads charge commands from a CSV source.
///
/// This reader wraps `csv::Reader` and provides an iterator over `Result<ChargeCommand>`.
/// It trims whitespace and accepts rows with or without the trailing metadata column.
pub struct ChargeReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> ChargeReader<R> {
    /// Creates a new `ChargeReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Returns an iterator that lazily reads and converts charge commands.
    ///
    /// Field-level validation (positive amount, currency code) is left to the orchestrator so
    /// that a bad row is reported the same way as a bad API call.
    pub fn commands(self) -> impl Iterator<Item = Result<ChargeCommand>> {
        self.reader.into_deserialize::<ChargeRow>().map(|result| {
            result
                .map_err(PaymentError::from)
                .and_then(ChargeCommand::try_from)
        })
    }
}
