//! Domain entities.
//!
//! Aggregates refer to each other by id; the [`Store`](super::store::Store)
//! owns every root. Lease owns its areas, tenants and rents; Invoice owns
//! its rows and payments.

mod contact;
mod invoice;
mod lease;
mod logs;
mod receivable;
mod tenant;

pub use contact::*;
pub use invoice::*;
pub use lease::*;
pub use logs::*;
pub use receivable::*;
pub use tenant::*;

pub type ServiceUnitId = u64;
pub type LeaseId = u64;
pub type ContactId = u64;
pub type TenantId = u64;
pub type TenantContactId = u64;
pub type RentId = u64;
pub type RentAdjustmentId = u64;
pub type ReceivableTypeId = u64;
pub type IntendedUseId = u64;
pub type DecisionId = u64;
pub type InvoiceId = u64;
pub type InvoiceRowId = u64;
pub type InvoiceSetId = u64;
pub type InvoicePaymentId = u64;
pub type ExportLogId = u64;
