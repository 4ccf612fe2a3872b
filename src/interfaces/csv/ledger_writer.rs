use crate::domain::payment::{PaymentRecord, PaymentStatus};
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct LedgerRow<'a> {
    idempotency_key: &'a str,
    payment_id: String,
    provider: &'a str,
    amount: i64,
    currency: &'a str,
    status: PaymentStatus,
    provider_reference: Option<&'a str>,
    failure_reason: Option<&'a str>,
}

/// Writes ledger records as CSV, sorted by idempotency key.
pub struct LedgerWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> LedgerWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_records(&mut self, mut records: Vec<PaymentRecord>) -> Result<()> {
        records.sort_by(|a, b| a.idempotency_key.cmp(&b.idempotency_key));
        for record in &records {
            self.writer.serialize(LedgerRow {
                idempotency_key: &record.idempotency_key,
                payment_id: record.payment_id.to_string(),
                provider: &record.provider,
                amount: record.amount,
                currency: &record.currency,
                status: record.status,
                provider_reference: record.provider_reference.as_deref(),
                failure_reason: record.failure_reason.as_deref(),
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payment::{ChargeCommand, PaymentId, StatusUpdate};
    use chrono::Utc;

    #[test]
    fn test_writes_sorted_rows_with_header() {
        let mut ok = PaymentRecord::pending(
            &ChargeCommand::new("b", "stripe-like", 1000, "USD", "tok_visa"),
            PaymentId::new(),
            Utc::now(),
        );
        ok.apply(StatusUpdate::succeeded("stripe-like_b"), Utc::now())
            .unwrap();
        let mut declined = PaymentRecord::pending(
            &ChargeCommand::new("a", "adyen-like", 5, "EUR", "tok_decline"),
            PaymentId::new(),
            Utc::now(),
        );
        declined
            .apply(StatusUpdate::failed("card_declined"), Utc::now())
            .unwrap();

        let mut out = Vec::new();
        LedgerWriter::new(&mut out)
            .write_records(vec![ok.clone(), declined.clone()])
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(
            lines[0],
            "idempotency_key,payment_id,provider,amount,currency,status,provider_reference,failure_reason"
        );
        assert_eq!(
            lines[1],
            format!("a,{},adyen-like,5,EUR,failed,,card_declined", declined.payment_id)
        );
        assert_eq!(
            lines[2],
            format!("b,{},stripe-like,1000,USD,succeeded,stripe-like_b,", ok.payment_id)
        );
    }
}
