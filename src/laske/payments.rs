//! Laske payment files (`MR_OUT_<id>_*`).
//!
//! Fixed-width latin-1 text, 90 bytes per line. Only record types 3, 5 and 7
//! carry payments:
//!
//! | Bytes   | Field                         |
//! |---------|-------------------------------|
//! | 21..27  | payment date, `YYMMDD`        |
//! | 27..43  | filing code                   |
//! | 43..63  | invoice number                |
//! | 77..85  | amount, euros                 |
//! | 85..87  | amount, cents                 |

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;

use super::settings::LaskeSettings;
use super::transport::Transport;
use crate::core::money::round_cents;
use crate::core::{BillingError, ImportedFile, InvoiceId, Store, add_payment};

pub const LINE_LEN: usize = 90;
const PAYMENT_RECORD_TYPES: [u8; 3] = [b'3', b'5', b'7'];
const FILING_CODE_PREFIX: &str = "288";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentLine {
    pub record_type: char,
    pub paid_date: NaiveDate,
    pub filing_code: String,
    pub invoice_number: u64,
    pub amount: Decimal,
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

fn digits(bytes: &[u8], field: &str) -> Result<u64, BillingError> {
    let text = latin1(bytes);
    text.trim()
        .parse()
        .map_err(|_| BillingError::Codec(format!("{field} '{text}' is not numeric")))
}

/// Parse one line. Lines that are not payment records give `Ok(None)`.
pub fn parse_payment_line(line: &[u8]) -> Result<Option<PaymentLine>, BillingError> {
    if line.len() != LINE_LEN || !PAYMENT_RECORD_TYPES.contains(&line[0]) {
        return Ok(None);
    }

    let date = digits(&line[21..27], "payment date")?;
    let (yy, mm, dd) = (date / 10_000, date / 100 % 100, date % 100);
    let paid_date = NaiveDate::from_ymd_opt(2000 + yy as i32, mm as u32, dd as u32)
        .ok_or_else(|| BillingError::Codec(format!("invalid payment date {date:06}")))?;

    let filing_code = latin1(&line[27..43]).trim().to_string();
    if !filing_code.starts_with(FILING_CODE_PREFIX) {
        return Err(BillingError::Codec(format!(
            "filing code '{filing_code}' does not start with {FILING_CODE_PREFIX}"
        )));
    }

    let invoice_number = digits(&line[43..63], "invoice number")?;
    let euros = digits(&line[77..85], "amount")?;
    let cents = digits(&line[85..87], "amount cents")?;
    let amount = Decimal::from(euros) + Decimal::new(cents as i64, 2);

    Ok(Some(PaymentLine {
        record_type: char::from(line[0]),
        paid_date,
        filing_code,
        invoice_number,
        amount,
    }))
}

/// Record one payment. Gives `Ok(None)` for a payment already on the invoice.
pub fn apply_payment(
    store: &mut Store,
    line: &PaymentLine,
) -> Result<Option<InvoiceId>, BillingError> {
    let invoice = store
        .invoice_by_number(line.invoice_number)
        .ok_or_else(|| BillingError::not_found("invoice number", line.invoice_number))?;
    let id = invoice.id;
    let lease = store.lease(invoice.lease)?;

    let amount = if lease.is_subject_to_vat {
        let vat = store
            .vat_on(line.paid_date)
            .ok_or_else(|| BillingError::not_found("vat on", line.paid_date))?;
        round_cents(line.amount / (Decimal::ONE + vat.percent / Decimal::ONE_HUNDRED))
    } else {
        line.amount
    };

    match add_payment(store, id, amount, line.paid_date, Some(line.filing_code.clone())) {
        Ok(_) => Ok(Some(id)),
        Err(BillingError::Duplicate(message)) => {
            tracing::debug!(invoice = id, %message, "payment skipped");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

/// Import the contents of one payment file and record it as processed.
pub fn import_payment_file(
    store: &mut Store,
    filename: &str,
    content: &[u8],
    now: NaiveDateTime,
) -> ImportedFile {
    let mut imported = ImportedFile {
        filename: filename.to_string(),
        processed_at: now,
        payment_count: 0,
        error_count: 0,
        invoices: Vec::new(),
    };

    for (i, raw) in content.split(|&b| b == b'\n').enumerate() {
        let line = raw.strip_suffix(b"\r").unwrap_or(raw);
        let result = parse_payment_line(line).and_then(|parsed| match parsed {
            Some(payment) => apply_payment(store, &payment),
            None => Ok(None),
        });
        match result {
            Ok(Some(invoice)) => {
                imported.payment_count += 1;
                if !imported.invoices.contains(&invoice) {
                    imported.invoices.push(invoice);
                }
            }
            Ok(None) => {}
            Err(err) => {
                imported.error_count += 1;
                tracing::warn!(file = filename, line = i + 1, error = %err, "payment line skipped");
            }
        }
    }

    tracing::info!(
        file = filename,
        payments = imported.payment_count,
        errors = imported.error_count,
        "payment file processed"
    );
    store.payment_import_log.files.push(imported.clone());
    imported
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportSummary {
    pub files: Vec<ImportedFile>,
    /// Files that could not be downloaded or archived.
    pub failed_files: Vec<String>,
}

impl ImportSummary {
    pub fn payment_count(&self) -> usize {
        self.files.iter().map(|f| f.payment_count).sum()
    }
}

/// Fetch, import and archive new payment files.
pub fn import_payments(
    store: &mut Store,
    settings: &LaskeSettings,
    transport: &mut dyn Transport,
    now: NaiveDateTime,
) -> Result<ImportSummary, BillingError> {
    let prefix = format!("MR_OUT_{}_", settings.payments_import_id()?);
    let mut summary = ImportSummary::default();

    for name in transport.list()? {
        if !name.starts_with(&prefix) {
            continue;
        }
        if store.payment_import_log.is_processed(&name) {
            tracing::debug!(file = %name, "already processed");
            continue;
        }
        let content = match transport.download(&name) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!(file = %name, error = %err, "payment file not downloaded");
                summary.failed_files.push(name);
                continue;
            }
        };
        summary.files.push(import_payment_file(store, &name, &content, now));
        if let Err(err) = transport.archive(&name) {
            tracing::warn!(file = %name, error = %err, "payment file not archived");
            summary.failed_files.push(name);
        }
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn payment_line(
        record: char,
        date: &str,
        filing: &str,
        number: u64,
        euros: u64,
        cents: u64,
    ) -> String {
        format!(
            "{record}{:20}{date}{filing:<16}{number:020}{:14}{euros:08}{cents:02}{:3}",
            "", "", ""
        )
    }

    #[test]
    fn parses_payment_record() {
        let line = payment_line('3', "200315", "288123", 12345, 124, 5);
        assert_eq!(line.len(), LINE_LEN);
        let parsed = parse_payment_line(line.as_bytes()).unwrap().unwrap();
        assert_eq!(parsed.paid_date, NaiveDate::from_ymd_opt(2020, 3, 15).unwrap());
        assert_eq!(parsed.filing_code, "288123");
        assert_eq!(parsed.invoice_number, 12345);
        assert_eq!(parsed.amount, dec!(124.05));
        assert_eq!(parsed.record_type, '3');
    }

    #[test]
    fn other_records_are_ignored() {
        let line = payment_line('0', "200315", "288123", 1, 1, 0);
        assert_eq!(parse_payment_line(line.as_bytes()).unwrap(), None);
        assert_eq!(parse_payment_line(b"3 short").unwrap(), None);
    }

    #[test]
    fn bad_fields_are_codec_errors() {
        let line = payment_line('5', "201345", "288123", 1, 1, 0);
        assert_eq!(parse_payment_line(line.as_bytes()).unwrap_err().kind(), "codec-validation");
        let line = payment_line('7', "200315", "999123", 1, 1, 0);
        assert!(parse_payment_line(line.as_bytes()).is_err());
    }

    #[test]
    fn latin1_bytes_do_not_break_parsing() {
        let mut line = payment_line('3', "200315", "288123", 7, 10, 0).into_bytes();
        line[5] = 0xE4;
        assert_eq!(parse_payment_line(&line).unwrap().unwrap().invoice_number, 7);
    }
}
