//! Rent calculation, invoicing and the domain model.
//!
//! Everything here is pure computation over an in-memory [`Store`]; the
//! clock is passed in explicitly and nothing touches the network.

mod amounts;
mod billing;
pub mod calendar;
mod credit;
pub mod date_range;
mod entities;
mod error;
mod index;
pub mod money;
mod numbering;
pub mod rent;
mod shares;
mod store;

pub use amounts::*;
pub use billing::*;
pub use calendar::{CalendarKind, FinnishBankHolidays, HolidayCalendar, WeekdaysOnly};
pub use credit::*;
pub use date_range::{DateRange, DayMonth, Span};
pub use entities::*;
pub use error::*;
pub use index::*;
pub use numbering::*;
pub use shares::*;
pub use store::*;
