use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::date_range::{DateRange, DayMonth, Span, ymd};
use crate::core::entities::{DecisionId, IntendedUseId, ReceivableTypeId, RentAdjustmentId, RentId};
use crate::core::error::{BillingError, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RentType {
    Index,
    Index2022,
    Fixed,
    Manual,
    OneTime,
    Free,
}

impl RentType {
    pub fn is_indexed(self) -> bool {
        matches!(self, Self::Index | Self::Index2022)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RentCycle {
    #[default]
    JanuaryToDecember,
    AprilToMarch,
}

impl RentCycle {
    pub fn start_month(self) -> u32 {
        match self {
            Self::JanuaryToDecember => 1,
            Self::AprilToMarch => 4,
        }
    }

    /// Calendar year in which the cycle containing `date` starts.
    pub fn cycle_year_of(self, date: NaiveDate) -> i32 {
        if date.month() >= self.start_month() {
            date.year()
        } else {
            date.year() - 1
        }
    }

    /// The cycle year starting in `year`.
    pub fn range(self, year: i32) -> Result<DateRange, BillingError> {
        match self {
            Self::JanuaryToDecember => DateRange::year(year),
            Self::AprilToMarch => DateRange::new(ymd(year, 4, 1)?, ymd(year + 1, 3, 31)?),
        }
    }

    /// Index review day shown on bills.
    pub fn review_day(self) -> &'static str {
        match self {
            Self::JanuaryToDecember => "1.1.",
            Self::AprilToMarch => "1.4.",
        }
    }
}

/// How the consumer price index is applied to index rents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexType {
    /// Plain ratio of the rounded index to the elementary index.
    #[default]
    Ratio,
    /// Ratio applied only when the rise reaches `x_value` percent,
    /// capped at `y_value` percent.
    Threshold,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DueDatesType {
    #[default]
    Fixed,
    Custom,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodType {
    #[default]
    PerYear,
    PerMonth,
}

impl PeriodType {
    pub fn to_yearly(self, amount: Decimal) -> Decimal {
        match self {
            Self::PerYear => amount,
            Self::PerMonth => amount * Decimal::from(12),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixedInitialYearRent {
    pub id: u64,
    /// `None` overrides every contract rent.
    #[serde(default)]
    pub intended_use: Option<IntendedUseId>,
    /// Yearly amount.
    pub amount: Decimal,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

impl FixedInitialYearRent {
    pub fn span(&self) -> Span {
        Span {
            start: self.start_date,
            end: self.end_date,
        }
    }

    pub fn applies_to(&self, intended_use: Option<IntendedUseId>) -> bool {
        self.intended_use.is_none() || self.intended_use == intended_use
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractRent {
    pub id: u64,
    pub intended_use: Option<IntendedUseId>,
    pub amount: Decimal,
    #[serde(default)]
    pub period: PeriodType,
    /// Amount at the elementary index.
    #[serde(default)]
    pub base_amount: Option<Decimal>,
    #[serde(default)]
    pub base_amount_period: Option<PeriodType>,
    /// Rent of the base index year (INDEX2022 rents).
    #[serde(default)]
    pub base_year_rent: Option<Decimal>,
    /// Base index year (INDEX2022 rents).
    #[serde(default)]
    pub index: Option<i32>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

impl ContractRent {
    pub fn span(&self) -> Span {
        Span {
            start: self.start_date,
            end: self.end_date,
        }
    }

    pub fn yearly_amount(&self) -> Decimal {
        self.period.to_yearly(self.amount)
    }

    /// Yearly base for indexing: the base amount when given, else the amount.
    pub fn yearly_base_amount(&self) -> Decimal {
        match self.base_amount {
            Some(base) => self.base_amount_period.unwrap_or(self.period).to_yearly(base),
            None => self.yearly_amount(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentType {
    Discount,
    Increase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentAmountType {
    AmountPerYear,
    PercentPerYear,
    AmountTotal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagementSubvention {
    pub management: String,
    pub subvention_percent: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporarySubvention {
    #[serde(default)]
    pub description: Option<String>,
    pub subvention_percent: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Subvention {
    FormOfManagement {
        management_subventions: Vec<ManagementSubvention>,
    },
    ReLease {
        base_percent: Decimal,
        graduated_percent: Decimal,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RentAdjustment {
    pub id: RentAdjustmentId,
    /// `None` adjusts every intended use.
    #[serde(default)]
    pub intended_use: Option<IntendedUseId>,
    pub adjustment_type: AdjustmentType,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    pub amount_type: AdjustmentAmountType,
    #[serde(default)]
    pub full_amount: Option<Decimal>,
    /// Remaining amount of an `AmountTotal` adjustment.
    #[serde(default)]
    pub amount_left: Option<Decimal>,
    /// Usage already taken off `amount_left`, by the due date that took it.
    #[serde(default)]
    pub consumed: BTreeMap<NaiveDate, Decimal>,
    #[serde(default)]
    pub decision: Option<DecisionId>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub subvention: Option<Subvention>,
    #[serde(default)]
    pub temporary_subventions: Vec<TemporarySubvention>,
}

impl RentAdjustment {
    /// Recorded usage of due dates on or after `from`.
    pub fn consumed_since(&self, from: NaiveDate) -> Decimal {
        self.consumed.range(from..).map(|(_, used)| *used).sum()
    }

    pub fn span(&self) -> Span {
        let end = match self.amount_type {
            AdjustmentAmountType::AmountTotal => None,
            _ => self.end_date,
        };
        Span {
            start: Some(self.start_date),
            end,
        }
    }

    pub fn applies_to(&self, intended_use: Option<IntendedUseId>) -> bool {
        self.intended_use.is_none() || self.intended_use == intended_use
    }

    pub fn sign(&self) -> Decimal {
        match self.adjustment_type {
            AdjustmentType::Discount => Decimal::NEGATIVE_ONE,
            AdjustmentType::Increase => Decimal::ONE,
        }
    }
}

/// Cached index-adjusted yearly amount of a contract rent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexAdjustedRent {
    pub intended_use: Option<IntendedUseId>,
    pub amount: Decimal,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub factor: Decimal,
}

/// Cached payable amount of one cycle year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayableRent {
    pub amount: Decimal,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Change from the previous cycle year, in percent.
    pub difference_percent: Option<Decimal>,
    /// Payable amount of the calendar year the cycle starts in.
    pub calendar_year_rent: Decimal,
}

/// Cached equalized amount of one cycle year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EqualizedRent {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub payable_amount: Decimal,
    pub equalized_payable_amount: Decimal,
    pub equalization_factor: Decimal,
}

/// A per-lease rent rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rent {
    pub id: RentId,
    pub rent_type: RentType,
    #[serde(default)]
    pub cycle: RentCycle,
    #[serde(default)]
    pub index_type: IndexType,
    /// Index point numbers are rounded down to a multiple of this.
    #[serde(default)]
    pub index_rounding: Option<Decimal>,
    #[serde(default)]
    pub elementary_index: Option<Decimal>,
    #[serde(default)]
    pub x_value: Option<Decimal>,
    #[serde(default)]
    pub y_value: Option<Decimal>,
    #[serde(default)]
    pub equalization_start_date: Option<NaiveDate>,
    #[serde(default)]
    pub equalization_end_date: Option<NaiveDate>,
    /// One-time amount, or the yearly amount of a manual rent without contract rents.
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub override_receivable_type: Option<ReceivableTypeId>,
    #[serde(default)]
    pub due_dates_type: DueDatesType,
    #[serde(default)]
    pub due_dates_per_year: Option<u32>,
    #[serde(default)]
    pub due_dates: Vec<DayMonth>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub fixed_initial_year_rents: Vec<FixedInitialYearRent>,
    #[serde(default)]
    pub contract_rents: Vec<ContractRent>,
    #[serde(default)]
    pub rent_adjustments: Vec<RentAdjustment>,
    #[serde(default)]
    pub index_adjusted_rents: Vec<IndexAdjustedRent>,
    #[serde(default)]
    pub payable_rents: Vec<PayableRent>,
    #[serde(default)]
    pub equalized_rents: Vec<EqualizedRent>,
    #[serde(default)]
    pub deleted: bool,
}

impl Rent {
    pub fn new(id: RentId, rent_type: RentType) -> Self {
        Self {
            id,
            rent_type,
            cycle: RentCycle::default(),
            index_type: IndexType::default(),
            index_rounding: None,
            elementary_index: None,
            x_value: None,
            y_value: None,
            equalization_start_date: None,
            equalization_end_date: None,
            amount: None,
            override_receivable_type: None,
            due_dates_type: DueDatesType::Fixed,
            due_dates_per_year: None,
            due_dates: Vec::new(),
            start_date: None,
            end_date: None,
            note: None,
            fixed_initial_year_rents: Vec::new(),
            contract_rents: Vec::new(),
            rent_adjustments: Vec::new(),
            index_adjusted_rents: Vec::new(),
            payable_rents: Vec::new(),
            equalized_rents: Vec::new(),
            deleted: false,
        }
    }

    pub fn span(&self) -> Span {
        Span {
            start: self.start_date,
            end: self.end_date,
        }
    }

    /// Active window of the rent within the lease.
    pub fn active_span(&self, lease_span: &Span) -> Option<Span> {
        self.span().overlap(lease_span)
    }

    pub fn equalization_span(&self) -> Option<DateRange> {
        match (self.equalization_start_date, self.equalization_end_date) {
            (Some(start), Some(end)) if start <= end => Some(DateRange { start, end }),
            _ => None,
        }
    }

    /// Structural checks; all problems are reported.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let field = |name: &str| format!("rents[{}].{name}", self.id);

        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if end < start {
                errors.push(ValidationError::new(
                    field("end_date"),
                    "must not be before start_date",
                ));
            }
        }

        if self.rent_type != RentType::Free {
            match self.due_dates_type {
                DueDatesType::Fixed => {
                    if !matches!(self.due_dates_per_year, Some(1 | 2 | 3 | 4 | 6 | 12)) {
                        errors.push(ValidationError::new(
                            field("due_dates_per_year"),
                            "must be one of 1, 2, 3, 4, 6 or 12",
                        ));
                    }
                }
                DueDatesType::Custom => {
                    if self.due_dates.is_empty() {
                        errors.push(ValidationError::new(
                            field("due_dates"),
                            "custom due dates need at least one day and month",
                        ));
                    }
                }
            }
        }

        match self.rent_type {
            RentType::Index if self.elementary_index.is_none() => {
                errors.push(ValidationError::new(
                    field("elementary_index"),
                    "index rents need an elementary index",
                ));
            }
            RentType::Index2022 => {
                for cr in &self.contract_rents {
                    if cr.index.is_none() {
                        errors.push(ValidationError::new(
                            format!("rents[{}].contract_rents[{}].index", self.id, cr.id),
                            "index rents need a base index year",
                        ));
                    }
                }
            }
            RentType::OneTime if self.amount.is_none() => {
                errors.push(ValidationError::new(field("amount"), "one-time rents need an amount"));
            }
            _ => {}
        }

        for fiyr in &self.fixed_initial_year_rents {
            if let Some(end) = fiyr.end_date {
                let cycle_end = self.cycle.range(self.cycle.cycle_year_of(end)).map(|r| r.end);
                if cycle_end.ok() != Some(end) {
                    errors.push(ValidationError::new(
                        format!(
                            "rents[{}].fixed_initial_year_rents[{}].end_date",
                            self.id, fiyr.id
                        ),
                        "must be the last day of a rent cycle",
                    ));
                }
            }
        }

        for adj in &self.rent_adjustments {
            let adj_field =
                |name: &str| format!("rents[{}].rent_adjustments[{}].{name}", self.id, adj.id);
            if adj.amount_type == AdjustmentAmountType::AmountTotal && adj.end_date.is_some() {
                errors.push(ValidationError::new(
                    adj_field("end_date"),
                    "total amount adjustments have no end date",
                ));
            }
            if adj.full_amount.is_none() && adj.subvention.is_none() {
                errors.push(ValidationError::new(adj_field("full_amount"), "is required"));
            }
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn april_cycle() {
        let cycle = RentCycle::AprilToMarch;
        assert_eq!(cycle.cycle_year_of(d(2021, 3, 31)), 2020);
        assert_eq!(cycle.cycle_year_of(d(2021, 4, 1)), 2021);
        let range = cycle.range(2020).unwrap();
        assert_eq!((range.start, range.end), (d(2020, 4, 1), d(2021, 3, 31)));
    }

    #[test]
    fn fixed_initial_year_rent_must_end_on_cycle_end() {
        let mut rent = Rent::new(1, RentType::Fixed);
        rent.due_dates_per_year = Some(12);
        rent.fixed_initial_year_rents.push(FixedInitialYearRent {
            id: 1,
            intended_use: None,
            amount: dec!(1000),
            start_date: Some(d(2020, 1, 1)),
            end_date: Some(d(2020, 6, 30)),
        });
        let errors = rent.validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].field.ends_with("end_date"));

        rent.fixed_initial_year_rents[0].end_date = Some(d(2021, 12, 31));
        assert!(rent.validate().is_empty());
    }

    #[test]
    fn due_date_count_checked() {
        let mut rent = Rent::new(1, RentType::Index);
        rent.elementary_index = Some(dec!(1976));
        rent.due_dates_per_year = Some(5);
        assert_eq!(rent.validate().len(), 1);
    }

    #[test]
    fn monthly_contract_rent_is_yearly_times_twelve() {
        let cr = ContractRent {
            id: 1,
            intended_use: Some(1),
            amount: dec!(100),
            period: PeriodType::PerMonth,
            base_amount: None,
            base_amount_period: None,
            base_year_rent: None,
            index: None,
            start_date: None,
            end_date: None,
        };
        assert_eq!(cr.yearly_amount(), dec!(1200));
        assert_eq!(cr.yearly_base_amount(), dec!(1200));
    }
}
