//! Due-date schedules and the billing period each due date represents.

use chrono::{Months, NaiveDate};

use super::model::{DueDatesType, Rent, RentType};
use crate::core::date_range::{DateRange, DayMonth, Span, split_date_range};
use crate::core::entities::DueDatesPosition;
use crate::core::error::BillingError;

/// Canonical FIXED schedules as (day, month), in calendar order.
pub fn canonical_due_dates(
    per_year: u32,
    position: DueDatesPosition,
) -> Result<Vec<DayMonth>, BillingError> {
    let pairs: Vec<(u32, u32)> = match (position, per_year) {
        (DueDatesPosition::StartOfMonth, 1) => vec![(2, 1)],
        (DueDatesPosition::StartOfMonth, 2) => vec![(2, 1), (1, 7)],
        (DueDatesPosition::StartOfMonth, 3) => vec![(1, 3), (1, 7), (1, 11)],
        (DueDatesPosition::StartOfMonth, 4) => vec![(1, 3), (1, 6), (1, 9), (1, 12)],
        (DueDatesPosition::StartOfMonth, 6) => {
            vec![(1, 1), (1, 3), (1, 5), (1, 7), (1, 9), (1, 11)]
        }
        (DueDatesPosition::StartOfMonth, 12) => (1..=12).map(|m| (1, m)).collect(),
        (DueDatesPosition::MiddleOfMonth, 1) => vec![(30, 6)],
        (DueDatesPosition::MiddleOfMonth, 2) => vec![(15, 3), (30, 9)],
        (DueDatesPosition::MiddleOfMonth, 3) => vec![(15, 3), (15, 7), (15, 11)],
        (DueDatesPosition::MiddleOfMonth, 4) => vec![(15, 3), (15, 6), (15, 9), (15, 11)],
        (DueDatesPosition::MiddleOfMonth, 6) => {
            vec![(15, 1), (15, 3), (15, 5), (15, 7), (15, 9), (15, 11)]
        }
        (DueDatesPosition::MiddleOfMonth, 12) => (1..=12).map(|m| (15, m)).collect(),
        (_, n) => {
            return Err(BillingError::Validation(format!(
                "{n} due dates per year is not supported"
            )));
        }
    };
    pairs
        .into_iter()
        .map(|(day, month)| DayMonth::new(day, month))
        .collect()
}

/// The rent's yearly due dates in calendar order, without duplicates.
pub fn due_dates_for_year(
    rent: &Rent,
    position: DueDatesPosition,
) -> Result<Vec<DayMonth>, BillingError> {
    let mut dates = match rent.due_dates_type {
        DueDatesType::Fixed => {
            let per_year = rent.due_dates_per_year.ok_or_else(|| {
                BillingError::Validation(format!("rent {} has no due dates per year", rent.id))
            })?;
            canonical_due_dates(per_year, position)?
        }
        DueDatesType::Custom => {
            if rent.due_dates.is_empty() {
                return Err(BillingError::Validation(format!(
                    "rent {} has no custom due dates",
                    rent.id
                )));
            }
            rent.due_dates.clone()
        }
    };
    dates.sort();
    dates.dedup();
    Ok(dates)
}

/// Due dates ordered from the start of the rent cycle.
fn in_cycle_order(rent: &Rent, position: DueDatesPosition) -> Result<Vec<DayMonth>, BillingError> {
    let start_month = rent.cycle.start_month();
    let mut dates = due_dates_for_year(rent, position)?;
    dates.sort_by_key(|dm| ((dm.month + 12 - start_month) % 12, dm.day));
    Ok(dates)
}

/// Every scheduled date in `range`, chronologically. Activity of the rent is
/// not considered.
pub fn scheduled_dates_in_range(
    rent: &Rent,
    position: DueDatesPosition,
    range: &DateRange,
) -> Result<Vec<NaiveDate>, BillingError> {
    use chrono::Datelike;

    let schedule = due_dates_for_year(rent, position)?;
    let mut out = Vec::new();
    for year in range.start.year()..=range.end.year() {
        for dm in &schedule {
            let date = dm.to_date(year)?;
            if range.contains(date) {
                out.push(date);
            }
        }
    }
    out.sort();
    out.dedup();
    Ok(out)
}

/// The full (unclipped) billing period a scheduled due date stands for.
pub fn billing_period_for_due_date(
    rent: &Rent,
    position: DueDatesPosition,
    due_date: NaiveDate,
) -> Result<DateRange, BillingError> {
    let cycle_year = rent.cycle.cycle_year_of(due_date);
    let cycle_range = rent.cycle.range(cycle_year)?;
    let ordered = in_cycle_order(rent, position)?;

    let mut slot = None;
    for (i, dm) in ordered.iter().enumerate() {
        let year = if dm.month >= rent.cycle.start_month() {
            cycle_year
        } else {
            cycle_year + 1
        };
        if dm.to_date(year)? == due_date {
            slot = Some(i);
            break;
        }
    }
    let slot = slot.ok_or_else(|| {
        BillingError::Validation(format!(
            "{due_date} is not a due date of rent {}",
            rent.id
        ))
    })?;

    let count = ordered.len();
    if 12 % count == 0 {
        let months = (12 / count) as u32;
        let add = |date: NaiveDate, n: u32| {
            date.checked_add_months(Months::new(n))
                .ok_or_else(|| BillingError::InvalidDate(format!("{date} + {n} months")))
        };
        let start = add(cycle_range.start, slot as u32 * months)?;
        let next = add(start, months)?;
        let end = next
            .pred_opt()
            .ok_or_else(|| BillingError::InvalidDate(format!("day before {next}")))?;
        DateRange::new(start, end)
    } else {
        let slots = split_date_range(&cycle_range, count)?;
        slots.get(slot).copied().ok_or_else(|| {
            BillingError::InvalidDate(format!(
                "cycle {cycle_range} too short for {count} due dates"
            ))
        })
    }
}

/// A due date of a rent together with the billing period it covers,
/// clipped to the rent's active window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledPeriod {
    pub due_date: NaiveDate,
    pub billing_period: DateRange,
}

/// Due dates in `range` whose billing periods overlap the rent's active
/// window within the lease.
///
/// FREE rents have no due dates. A ONE_TIME rent has a single due date: the
/// first scheduled date on or after the rent starts.
pub fn billing_periods_in_range(
    rent: &Rent,
    lease_span: &Span,
    position: DueDatesPosition,
    range: &DateRange,
) -> Result<Vec<ScheduledPeriod>, BillingError> {
    if rent.rent_type == RentType::Free {
        return Ok(Vec::new());
    }
    let Some(active) = rent.active_span(lease_span) else {
        return Ok(Vec::new());
    };

    let due_dates = if rent.rent_type == RentType::OneTime {
        match first_due_date_on_or_after(rent, position, active.start)? {
            Some(date) if range.contains(date) => vec![date],
            _ => Vec::new(),
        }
    } else {
        scheduled_dates_in_range(rent, position, range)?
    };

    let mut out = Vec::new();
    for due_date in due_dates {
        let period = billing_period_for_due_date(rent, position, due_date)?;
        if let Some(billing_period) = active.clamp(&period) {
            out.push(ScheduledPeriod {
                due_date,
                billing_period,
            });
        }
    }
    Ok(out)
}

fn first_due_date_on_or_after(
    rent: &Rent,
    position: DueDatesPosition,
    start: Option<NaiveDate>,
) -> Result<Option<NaiveDate>, BillingError> {
    use chrono::Datelike;

    let Some(start) = start else {
        return Ok(None);
    };
    let schedule = due_dates_for_year(rent, position)?;
    for year in [start.year(), start.year() + 1] {
        for dm in &schedule {
            let date = dm.to_date(year)?;
            if date >= start {
                return Ok(Some(date));
            }
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rent::model::RentCycle;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn r(a: NaiveDate, b: NaiveDate) -> DateRange {
        DateRange::new(a, b).unwrap()
    }

    fn rent(per_year: u32) -> Rent {
        let mut rent = Rent::new(1, RentType::Fixed);
        rent.due_dates_per_year = Some(per_year);
        rent
    }

    #[test]
    fn monthly_schedule() {
        let dates = scheduled_dates_in_range(
            &rent(12),
            DueDatesPosition::StartOfMonth,
            &r(d(2017, 7, 1), d(2017, 7, 31)),
        )
        .unwrap();
        assert_eq!(dates, vec![d(2017, 7, 1)]);
        let pos = DueDatesPosition::StartOfMonth;
        let period = billing_period_for_due_date(&rent(12), pos, d(2017, 7, 1)).unwrap();
        assert_eq!(period, r(d(2017, 7, 1), d(2017, 7, 31)));
    }

    #[test]
    fn quarterly_middle_of_month_slots() {
        let rent = rent(4);
        let pos = DueDatesPosition::MiddleOfMonth;
        assert_eq!(
            billing_period_for_due_date(&rent, pos, d(2020, 3, 15)).unwrap(),
            r(d(2020, 1, 1), d(2020, 3, 31))
        );
        assert_eq!(
            billing_period_for_due_date(&rent, pos, d(2020, 11, 15)).unwrap(),
            r(d(2020, 10, 1), d(2020, 12, 31))
        );
        assert!(billing_period_for_due_date(&rent, pos, d(2020, 11, 16)).is_err());
    }

    #[test]
    fn april_cycle_yearly_slot() {
        let mut rent = rent(1);
        rent.cycle = RentCycle::AprilToMarch;
        let pos = DueDatesPosition::StartOfMonth;
        let period = billing_period_for_due_date(&rent, pos, d(2021, 1, 2)).unwrap();
        assert_eq!(period, r(d(2020, 4, 1), d(2021, 3, 31)));
    }

    #[test]
    fn custom_five_due_dates_split_by_days() {
        let mut rent = Rent::new(1, RentType::Fixed);
        rent.due_dates_type = DueDatesType::Custom;
        rent.due_dates = [(1, 1), (1, 3), (1, 5), (1, 8), (1, 10)]
            .iter()
            .map(|(day, month)| DayMonth::new(*day, *month).unwrap())
            .collect();
        let pos = DueDatesPosition::StartOfMonth;
        let first = billing_period_for_due_date(&rent, pos, d(2021, 1, 1)).unwrap();
        // 365 days over five slots: 73 days each
        assert_eq!(first, r(d(2021, 1, 1), d(2021, 3, 14)));
    }

    #[test]
    fn periods_clipped_to_rent() {
        let mut rent = rent(12);
        rent.start_date = Some(d(2020, 3, 10));
        let periods = billing_periods_in_range(
            &rent,
            &Span::unbounded(),
            DueDatesPosition::StartOfMonth,
            &r(d(2020, 2, 1), d(2020, 3, 31)),
        )
        .unwrap();
        assert_eq!(periods.len(), 1);
        assert_eq!(periods[0].due_date, d(2020, 3, 1));
        assert_eq!(periods[0].billing_period, r(d(2020, 3, 10), d(2020, 3, 31)));
    }

    #[test]
    fn free_and_one_time() {
        let mut free = rent(12);
        free.rent_type = RentType::Free;
        let range = r(d(2020, 1, 1), d(2020, 12, 31));
        let pos = DueDatesPosition::StartOfMonth;
        let periods = billing_periods_in_range(&free, &Span::unbounded(), pos, &range).unwrap();
        assert!(periods.is_empty());

        let mut once = rent(12);
        once.rent_type = RentType::OneTime;
        once.start_date = Some(d(2020, 5, 20));
        let periods = billing_periods_in_range(&once, &Span::unbounded(), pos, &range).unwrap();
        assert_eq!(periods.len(), 1);
        assert_eq!(periods[0].due_date, d(2020, 6, 1));
    }
}
