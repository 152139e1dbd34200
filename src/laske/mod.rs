//! Laske SAP integration.
//!
//! Invoices leave the system as `SBO_SalesOrder` XML documents uploaded to
//! the Laske export server, and payments come back as fixed-width files
//! picked up from the payments server.
//!
//! # Example
//!
//! ```no_run
//! use chrono::Utc;
//! use mvj::core::Store;
//! use mvj::laske::{self, LaskeSettings, LocalDirTransport, TracingNotifier};
//!
//! let mut store = Store::new();
//! let settings = LaskeSettings::load(None).unwrap();
//! let mut transport = LocalDirTransport::new("/srv/laske/out");
//! let summary = laske::export_invoices(
//!     &mut store,
//!     1,
//!     None,
//!     &settings,
//!     &mut transport,
//!     &TracingNotifier,
//!     Utc::now().naive_utc(),
//! )
//! .unwrap();
//! println!("sent {} invoices", summary.sent.len());
//! ```

mod adapter;
mod export;
#[cfg(feature = "ftp")]
mod ftp;
mod party;
mod payments;
mod reference;
mod sales_order;
mod settings;
#[cfg(feature = "sftp")]
mod sftp;
mod transport;
mod validate;
pub(crate) mod xml_utils;

pub use adapter::{
    AkvAdapter, InvoiceContext, LATE_PAYMENT_NOTICE, MakeAdapter, TextAdapter, adapter_for,
};
pub use export::{
    ExportNotifier, ExportSummary, FailedInvoice, SapCodes, TracingNotifier, build_sales_order,
    export_invoices, sap_codes,
};
#[cfg(feature = "ftp")]
pub use ftp::FtpTransport;
pub use party::{party_from_contact, split_name};
pub use payments::{
    ImportSummary, PaymentLine, apply_payment, import_payment_file, import_payments,
    parse_payment_line,
};
pub use reference::{check_digit, is_valid_reference, payment_reference, with_check_digit};
pub use sales_order::{
    Field, LineItem, ORDER_TYPE_CHARGE, ORDER_TYPE_CREDIT_NOTE, Party, SalesOrder, to_laske_xml,
};
pub use settings::{LaskeServers, LaskeSettings, LaskeValues, Protocol, ServerSettings};
#[cfg(feature = "sftp")]
pub use sftp::SftpTransport;
pub use transport::{ARCHIVE_DIR, LocalDirTransport, Transport, connect};
pub use validate::{errors_json, validate_sales_order};
pub use xml_utils::format_net_price;
