//! # mvj
//!
//! Rent calculation, invoicing and SAP ("Laske") integration for the City of
//! Helsinki's land leases: index-adjusted and fixed rents, tenant shares,
//! charge invoices and credit notes, the Laske sales-order XML export and the
//! fixed-width payment import.
//!
//! All monetary values use [`rust_decimal::Decimal`] and are rounded half-up
//! to cents only where an invoice row is produced.
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::NaiveDate;
//! use mvj::core::*;
//! use mvj::core::rent::{ContractRent, PeriodType, Rent, RentType};
//! use rust_decimal_macros::dec;
//!
//! let mut store = Store::new();
//! let mut unit = ServiceUnit::new(1, "MaKe", ServiceUnitKind::Make);
//! unit.default_receivable_type_rent = Some(2);
//! store.insert_service_unit(unit);
//! store.insert_receivable_type(ReceivableType::new(2, "Maanvuokraus", 1));
//! store.insert_contact(Contact::person(3, "Maija", "Meikäläinen"));
//!
//! let identifier = LeaseIdentifier {
//!     type_code: "A1".into(),
//!     municipality: 1,
//!     district: 4,
//!     sequence: 1,
//! };
//! let mut lease = Lease::new(10, identifier, 1);
//! lease.tenants.push(Tenant::new(20, 1, 1)
//!     .with_contact(TenantContact::new(21, 3, TenantContactRole::Tenant, None, None)));
//! let mut rent = Rent::new(30, RentType::Fixed);
//! rent.due_dates_per_year = Some(12);
//! rent.contract_rents.push(ContractRent {
//!     id: 31, intended_use: None, amount: dec!(1200), period: PeriodType::PerYear,
//!     base_amount: None, base_amount_period: None, base_year_rent: None, index: None,
//!     start_date: None, end_date: None,
//! });
//! lease.rents.push(rent);
//! store.insert_lease(lease);
//!
//! let today = NaiveDate::from_ymd_opt(2024, 2, 15).unwrap();
//! let march = DateRange::month(2024, 3).unwrap();
//! let ids = generate_invoices_for_period(&mut store, 10, &march, today).unwrap();
//! assert_eq!(store.invoice(ids[0]).unwrap().billed_amount, dec!(100.00));
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `core` (default) | Domain model, rent engine, invoices, credit notes |
//! | `laske` (default) | Laske XML export, payment import, local transport |
//! | `sftp` | SFTP transport (`ssh2`) |
//! | `ftp` | FTP transport (`suppaftp`) |
//! | `cli` | The `mvj` operational binary |
//! | `all` | Everything |

#[cfg(feature = "core")]
pub mod core;

#[cfg(feature = "laske")]
pub mod laske;

// Re-export core types at crate root for convenience
#[cfg(feature = "core")]
pub use crate::core::*;
