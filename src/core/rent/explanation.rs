//! Explanation tree returned next to computed amounts.
//!
//! The tree is for display and audit only and is never persisted.

use rust_decimal::Decimal;
use serde::Serialize;

use super::model::{AdjustmentAmountType, AdjustmentType, RentType};
use crate::core::date_range::DateRange;
use crate::core::entities::{IntendedUseId, RentAdjustmentId, RentId};

/// What an explanation node talks about.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "subject", rename_all = "snake_case")]
pub enum Subject {
    Rent {
        id: RentId,
        rent_type: RentType,
    },
    ContractRent {
        id: u64,
        intended_use: Option<IntendedUseId>,
        yearly_amount: Decimal,
    },
    FixedInitialYearRent {
        id: u64,
        intended_use: Option<IntendedUseId>,
        yearly_amount: Decimal,
    },
    Index {
        year: i32,
        number: Decimal,
        ratio: Decimal,
    },
    RentAdjustment {
        id: RentAdjustmentId,
        adjustment_type: AdjustmentType,
        amount_type: AdjustmentAmountType,
        value: Decimal,
    },
    Subvention {
        adjustment: RentAdjustmentId,
        percent: Decimal,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExplanationItem {
    #[serde(flatten)]
    pub subject: Subject,
    pub date_ranges: Vec<DateRange>,
    pub amount: Decimal,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sub_items: Vec<ExplanationItem>,
}

impl ExplanationItem {
    pub fn new(subject: Subject, date_ranges: Vec<DateRange>, amount: Decimal) -> Self {
        Self {
            subject,
            date_ranges,
            amount,
            sub_items: Vec::new(),
        }
    }

    pub fn with_sub_item(mut self, item: ExplanationItem) -> Self {
        self.sub_items.push(item);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Explanation {
    pub items: Vec<ExplanationItem>,
}

impl Explanation {
    pub fn push(&mut self, item: ExplanationItem) {
        self.items.push(item);
    }

    pub fn extend(&mut self, other: Explanation) {
        self.items.extend(other.items);
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Depth-first walk over all nodes.
    pub fn walk(&self) -> Vec<&ExplanationItem> {
        fn visit<'a>(item: &'a ExplanationItem, out: &mut Vec<&'a ExplanationItem>) {
            out.push(item);
            for sub in &item.sub_items {
                visit(sub, out);
            }
        }
        let mut out = Vec::new();
        for item in &self.items {
            visit(item, &mut out);
        }
        out
    }
}
