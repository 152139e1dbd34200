//! Finnish national payment references (viitenumero).
//!
//! The check digit is computed over the digits from right to left with the
//! repeating weights 7, 3, 1, and is `(10 - sum mod 10) mod 10`.

use crate::core::{BillingError, ServiceUnitKind};

const WEIGHTS: [u32; 3] = [7, 3, 1];

/// Check digit of a numeric reference base.
pub fn check_digit(base: &str) -> Result<u32, BillingError> {
    if base.is_empty() || !base.bytes().all(|b| b.is_ascii_digit()) {
        return Err(BillingError::Codec(format!("reference base '{base}' is not numeric")));
    }
    let sum: u32 = base
        .bytes()
        .rev()
        .zip(WEIGHTS.iter().cycle())
        .map(|(b, w)| u32::from(b - b'0') * w)
        .sum();
    Ok((10 - sum % 10) % 10)
}

/// `base` followed by its check digit.
pub fn with_check_digit(base: &str) -> Result<String, BillingError> {
    Ok(format!("{base}{}", check_digit(base)?))
}

/// Payment reference of an invoice: service unit prefix, invoice number and
/// check digit.
pub fn payment_reference(
    kind: ServiceUnitKind,
    invoice_number: u64,
) -> Result<String, BillingError> {
    with_check_digit(&format!("{}{invoice_number}", kind.sap_prefix()))
}

/// Whether `reference` is numeric and ends in the correct check digit.
pub fn is_valid_reference(reference: &str) -> bool {
    if reference.len() < 2 {
        return false;
    }
    let (base, check) = reference.split_at(reference.len() - 1);
    match (check_digit(base), check.parse::<u32>()) {
        (Ok(expected), Ok(actual)) => expected == actual,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_references() {
        // 3*7 + 2*3 + 1*1 = 28
        assert_eq!(with_check_digit("123").unwrap(), "1232");
        assert_eq!(check_digit("1").unwrap(), 3);
        assert_eq!(check_digit("10").unwrap(), 7);
        assert!(is_valid_reference("1232"));
        assert!(!is_valid_reference("1234"));
        assert!(!is_valid_reference("12a2"));
    }

    #[test]
    fn prefixes() {
        let make = payment_reference(ServiceUnitKind::Make, 1_000_001).unwrap();
        assert!(make.starts_with("2881000001"));
        assert!(is_valid_reference(&make));
        let kuva = payment_reference(ServiceUnitKind::KuvaUpa, 5).unwrap();
        assert!(kuva.starts_with("2975"));
    }
}
