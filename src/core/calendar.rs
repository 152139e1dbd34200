//! Business-day calendars.
//!
//! Weekends are never business days. Bank holidays come from a pluggable
//! [`HolidayCalendar`]; the store carries a serializable [`CalendarKind`].

use chrono::{Datelike, Days, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// Source of non-weekend holidays.
pub trait HolidayCalendar {
    fn is_holiday(&self, date: NaiveDate) -> bool;
}

/// Monday to Friday are business days, no holidays.
#[derive(Debug, Clone, Copy, Default)]
pub struct WeekdaysOnly;

impl HolidayCalendar for WeekdaysOnly {
    fn is_holiday(&self, _date: NaiveDate) -> bool {
        false
    }
}

/// Finnish bank holidays (days on which Finnish banks do not settle payments).
#[derive(Debug, Clone, Copy, Default)]
pub struct FinnishBankHolidays;

impl HolidayCalendar for FinnishBankHolidays {
    fn is_holiday(&self, date: NaiveDate) -> bool {
        let fixed = matches!(
            (date.month(), date.day()),
            (1, 1) | (1, 6) | (5, 1) | (12, 6) | (12, 24) | (12, 25) | (12, 26)
        );
        if fixed {
            return true;
        }
        // Midsummer Eve is the Friday between 19 and 25 June.
        if date.month() == 6 && (19..=25).contains(&date.day()) && date.weekday() == Weekday::Fri
        {
            return true;
        }
        let Some(easter) = easter_sunday(date.year()) else {
            return false;
        };
        let offset = (date - easter).num_days();
        matches!(offset, -2 | 1 | 39)
    }
}

/// Calendar selection stored alongside the data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalendarKind {
    WeekdaysOnly,
    #[default]
    FinnishBankHolidays,
}

impl HolidayCalendar for CalendarKind {
    fn is_holiday(&self, date: NaiveDate) -> bool {
        match self {
            Self::WeekdaysOnly => WeekdaysOnly.is_holiday(date),
            Self::FinnishBankHolidays => FinnishBankHolidays.is_holiday(date),
        }
    }
}

/// Easter Sunday (anonymous Gregorian computus).
pub fn easter_sunday(year: i32) -> Option<NaiveDate> {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = (h + l - 7 * m + 114) % 31 + 1;
    NaiveDate::from_ymd_opt(year, month as u32, day as u32)
}

pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

pub fn is_business_day(date: NaiveDate, calendar: &dyn HolidayCalendar) -> bool {
    !is_weekend(date) && !calendar.is_holiday(date)
}

/// The first business day strictly after `date`.
pub fn next_business_day(date: NaiveDate, calendar: &dyn HolidayCalendar) -> NaiveDate {
    let mut next = date + Days::new(1);
    while !is_business_day(next, calendar) {
        next = next + Days::new(1);
    }
    next
}

/// `date` itself when it is a business day, otherwise the next one.
pub fn adjust_to_business_day(date: NaiveDate, calendar: &dyn HolidayCalendar) -> NaiveDate {
    if is_business_day(date, calendar) {
        date
    } else {
        next_business_day(date, calendar)
    }
}
