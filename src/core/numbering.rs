use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::error::BillingError;

/// Monotonic invoice number sequence of one service unit.
///
/// Numbers start at the service unit's `first_invoice_number` and are
/// never reused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceNumberSequence {
    name: String,
    next_number: u64,
}

impl InvoiceNumberSequence {
    /// Create a new sequence starting at `first_number`.
    pub fn new(name: impl Into<String>, first_number: u64) -> Self {
        Self {
            name: name.into(),
            next_number: first_number,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Issue the next number.
    pub fn next_number(&mut self) -> Result<u64, BillingError> {
        let number = self.next_number;
        self.next_number = number.checked_add(1).ok_or_else(|| {
            BillingError::Numbering(format!("sequence {} is exhausted", self.name))
        })?;
        Ok(number)
    }

    /// Preview the next number without consuming it.
    pub fn peek(&self) -> u64 {
        self.next_number
    }

    /// Make sure numbers up to and including `number` are never issued again.
    pub fn advance_past(&mut self, number: u64) {
        if number >= self.next_number {
            self.next_number = number.saturating_add(1);
        }
    }
}

/// Invoice number sequences shared by every clone of the store.
///
/// Clones share the same counters, so a number drawn inside a transaction
/// that is later rolled back stays consumed.
#[derive(Debug, Clone, Default)]
pub struct SharedSequences {
    inner: Arc<Mutex<BTreeMap<String, InvoiceNumberSequence>>>,
}

impl SharedSequences {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, InvoiceNumberSequence>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Draw the next number of sequence `name`, creating it at `first_number`.
    pub fn next_number(&self, name: &str, first_number: u64) -> Result<u64, BillingError> {
        if name.trim().is_empty() {
            return Err(BillingError::Numbering("sequence name must not be empty".into()));
        }
        let mut sequences = self.lock();
        sequences
            .entry(name.to_string())
            .or_insert_with(|| InvoiceNumberSequence::new(name, first_number))
            .next_number()
    }

    pub fn peek(&self, name: &str, first_number: u64) -> u64 {
        self.lock()
            .get(name)
            .map_or(first_number, InvoiceNumberSequence::peek)
    }

    /// Register a number that already exists in the data.
    pub fn advance_past(&self, name: &str, first_number: u64, number: u64) {
        let mut sequences = self.lock();
        sequences
            .entry(name.to_string())
            .or_insert_with(|| InvoiceNumberSequence::new(name, first_number))
            .advance_past(number);
    }

    /// Detached copy for tests and inspection.
    pub fn snapshot(&self) -> BTreeMap<String, InvoiceNumberSequence> {
        self.lock().clone()
    }
}

impl PartialEq for SharedSequences {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner) || self.snapshot() == other.snapshot()
    }
}

impl Serialize for SharedSequences {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.snapshot().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SharedSequences {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = BTreeMap::<String, InvoiceNumberSequence>::deserialize(deserializer)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(map)),
        })
    }
}
