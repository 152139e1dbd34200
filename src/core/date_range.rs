//! Inclusive date ranges and the range algebra used by rent proration,
//! share resolution and due-date scheduling.
//!
//! All ranges have day resolution and both ends are inclusive. Open-ended
//! validity windows (a lease without an end date, a tenant contact without
//! a start date) are [`Span`]s, whose missing ends stand for ±∞.

use std::fmt;

use chrono::{Datelike, Days, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::error::BillingError;

/// Closed, inclusive date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Create a range, rejecting inverted bounds.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, BillingError> {
        if end < start {
            return Err(BillingError::InvalidDate(format!(
                "range end {end} is before start {start}"
            )));
        }
        Ok(Self { start, end })
    }

    /// A range covering a single day.
    pub fn single(day: NaiveDate) -> Self {
        Self {
            start: day,
            end: day,
        }
    }

    /// The whole calendar month.
    pub fn month(year: i32, month: u32) -> Result<Self, BillingError> {
        let start = ymd(year, month, 1)?;
        Ok(Self {
            start,
            end: last_day_of_month(start),
        })
    }

    /// The whole calendar year.
    pub fn year(year: i32) -> Result<Self, BillingError> {
        Ok(Self {
            start: ymd(year, 1, 1)?,
            end: ymd(year, 12, 31)?,
        })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Number of days, both ends included.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Inclusive intersection, or `None` when the ranges are disjoint.
    pub fn overlap(&self, other: &DateRange) -> Option<DateRange> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start <= end).then_some(DateRange { start, end })
    }

    /// True when the range starts on the first and ends on the last day of a month.
    pub fn is_whole_months(&self) -> bool {
        self.start.day() == 1 && is_last_day_of_month(self.end)
    }

    /// Number of calendar months touched by the range.
    pub fn months(&self) -> i64 {
        i64::from(self.end.year() - self.start.year()) * 12 + i64::from(self.end.month())
            - i64::from(self.start.month())
            + 1
    }

    pub fn to_span(&self) -> Span {
        Span {
            start: Some(self.start),
            end: Some(self.end),
        }
    }
}

impl fmt::Display for DateRange {
    /// Finnish notation, e.g. `1.7.2017-31.7.2017` becomes `01.07.2017-31.07.2017`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}",
            self.start.format("%d.%m.%Y"),
            self.end.format("%d.%m.%Y")
        )
    }
}

/// Validity window with optional ends. `None` means unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl Span {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<Self, BillingError> {
        if let (Some(s), Some(e)) = (start, end) {
            if e < s {
                return Err(BillingError::InvalidDate(format!(
                    "span end {e} is before start {s}"
                )));
            }
        }
        Ok(Self { start, end })
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.is_none_or(|s| s <= date) && self.end.is_none_or(|e| date <= e)
    }

    /// Intersection of two spans, treating missing ends as ±∞.
    pub fn overlap(&self, other: &Span) -> Option<Span> {
        let start = match (self.start, other.start) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        let end = match (self.end, other.end) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return None;
            }
        }
        Some(Span { start, end })
    }

    /// The part of `range` that falls inside this span.
    pub fn clamp(&self, range: &DateRange) -> Option<DateRange> {
        let start = self.start.map_or(range.start, |s| s.max(range.start));
        let end = self.end.map_or(range.end, |e| e.min(range.end));
        (start <= end).then_some(DateRange { start, end })
    }
}

/// Build a date, failing with `InvalidDate` instead of panicking.
pub fn ymd(year: i32, month: u32, day: u32) -> Result<NaiveDate, BillingError> {
    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| BillingError::InvalidDate(format!("{year}-{month:02}-{day:02}")))
}

pub fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        2 => 28,
        _ => 31,
    }
}

pub fn first_day_of_month(date: NaiveDate) -> NaiveDate {
    date - Days::new(u64::from(date.day0()))
}

pub fn last_day_of_month(date: NaiveDate) -> NaiveDate {
    let last = days_in_month(date.year(), date.month());
    date + Days::new(u64::from(last - date.day()))
}

pub fn is_last_day_of_month(date: NaiveDate) -> bool {
    date.day() == days_in_month(date.year(), date.month())
}

pub fn overlap(a: &DateRange, b: &DateRange) -> Option<DateRange> {
    a.overlap(b)
}

/// Split `a` against `b`: the intersection plus the 0–2 parts of `a` outside `b`,
/// in chronological order.
pub fn overlap_and_remainder(a: &DateRange, b: &DateRange) -> (Option<DateRange>, Vec<DateRange>) {
    let Some(ov) = a.overlap(b) else {
        return (None, vec![*a]);
    };
    let mut remainders = Vec::with_capacity(2);
    if a.start < ov.start {
        remainders.push(DateRange {
            start: a.start,
            end: ov.start - Days::new(1),
        });
    }
    if ov.end < a.end {
        remainders.push(DateRange {
            start: ov.end + Days::new(1),
            end: a.end,
        });
    }
    (Some(ov), remainders)
}

pub fn subtract_range_from_range(a: &DateRange, b: &DateRange) -> Vec<DateRange> {
    overlap_and_remainder(a, b).1
}

/// Remove every range in `subtract` from the union of `ranges`.
pub fn subtract_ranges_from_ranges(ranges: &[DateRange], subtract: &[DateRange]) -> Vec<DateRange> {
    let mut remaining = combine_ranges(ranges);
    for cut in subtract {
        remaining = remaining
            .iter()
            .flat_map(|r| subtract_range_from_range(r, cut))
            .collect();
    }
    combine_ranges(&remaining)
}

/// Sort and merge ranges. Overlapping ranges and ranges that are only one
/// day apart (adjacent) are merged.
pub fn combine_ranges(ranges: &[DateRange]) -> Vec<DateRange> {
    let mut sorted = ranges.to_vec();
    sorted.sort();
    let mut merged: Vec<DateRange> = Vec::with_capacity(sorted.len());
    for range in sorted {
        if let Some(last) = merged.last_mut() {
            let adjacent = last.end.succ_opt().is_none_or(|next| range.start <= next);
            if adjacent {
                if range.end > last.end {
                    last.end = range.end;
                }
                continue;
            }
        }
        merged.push(range);
    }
    merged
}

/// Portion of `amount` attributable to `overlap` when `amount` is the cost of
/// `overlap` plus `remainders`.
///
/// When every range consists of whole months the split is by month count,
/// otherwise by day count.
pub fn fix_amount_for_overlap(
    amount: Decimal,
    overlap: &DateRange,
    remainders: &[DateRange],
) -> Decimal {
    if remainders.is_empty() {
        return amount;
    }
    let whole_months =
        overlap.is_whole_months() && remainders.iter().all(DateRange::is_whole_months);
    let (part, total) = if whole_months {
        let total: i64 = overlap.months() + remainders.iter().map(DateRange::months).sum::<i64>();
        (overlap.months(), total)
    } else {
        let total: i64 = overlap.days() + remainders.iter().map(DateRange::days).sum::<i64>();
        (overlap.days(), total)
    };
    if total == 0 {
        return Decimal::ZERO;
    }
    amount * Decimal::from(part) / Decimal::from(total)
}

/// Prorate a monthly amount over `range`.
///
/// Fully covered months count in full. With `real_month_lengths` a partial
/// month is prorated by its real day count; otherwise every month is 30 days
/// long and a partial month of 14–16 days counts as exactly half.
pub fn amount_from_monthly_amount(
    monthly: Decimal,
    range: &DateRange,
    real_month_lengths: bool,
) -> Decimal {
    let mut total = Decimal::ZERO;
    let mut cursor = first_day_of_month(range.start);
    while cursor <= range.end {
        let month = DateRange {
            start: cursor,
            end: last_day_of_month(cursor),
        };
        if let Some(ov) = month.overlap(range) {
            if ov == month {
                total += monthly;
            } else if real_month_lengths {
                total += monthly * Decimal::from(ov.days()) / Decimal::from(month.days());
            } else {
                let start_day = i64::from(ov.start.day().min(30));
                let end_day = if is_last_day_of_month(ov.end) {
                    30
                } else {
                    i64::from(ov.end.day().min(30))
                };
                let mut days = (end_day - start_day + 1).max(0);
                if (14..=16).contains(&days) {
                    days = 15;
                }
                total += monthly * Decimal::from(days) / Decimal::from(30);
            }
        }
        cursor = month.end + Days::new(1);
    }
    total
}

/// Divide `range` into `parts` contiguous ranges of near-equal length.
/// Earlier ranges receive the leftover days. Ranges shorter than `parts`
/// days yield one range per day.
pub fn split_date_range(range: &DateRange, parts: usize) -> Result<Vec<DateRange>, BillingError> {
    if parts == 0 {
        return Err(BillingError::InvalidDate(
            "cannot split a date range into zero parts".into(),
        ));
    }
    let total = range.days();
    let parts = (parts as i64).min(total);
    let base = total / parts;
    let extra = total % parts;

    let mut out = Vec::with_capacity(parts as usize);
    let mut cursor = range.start;
    for i in 0..parts {
        let len = base + i64::from(i < extra);
        let end = cursor + Days::new((len - 1) as u64);
        out.push(DateRange { start: cursor, end });
        cursor = end + Days::new(1);
    }
    Ok(out)
}

/// A day of a month without a year, ordered by month then day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DayMonth {
    pub month: u32,
    pub day: u32,
}

impl DayMonth {
    pub fn new(day: u32, month: u32) -> Result<Self, BillingError> {
        if !(1..=12).contains(&month) || day == 0 || day > days_in_month(2000, month) {
            return Err(BillingError::InvalidDate(format!("{day}.{month}.")));
        }
        Ok(Self { month, day })
    }

    /// The date in `year`; 29.2. falls back to 28.2. outside leap years.
    pub fn to_date(&self, year: i32) -> Result<NaiveDate, BillingError> {
        ymd(year, self.month, self.day.min(days_in_month(year, self.month)))
    }
}

impl fmt::Display for DayMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.", self.day, self.month)
    }
}
