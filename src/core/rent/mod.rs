//! Rent rules, due-date scheduling and payable-amount calculation.
//!
//! Rent types are a tagged variant; [`amount_for_period`] is the single
//! pure entry point that turns a rent and a date range into an amount and
//! its [`Explanation`].

mod calculation;
mod due_dates;
mod explanation;
mod model;

pub use calculation::*;
pub use due_dates::*;
pub use explanation::*;
pub use model::*;
