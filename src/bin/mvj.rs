//! Operational command line for rent invoicing and the Laske integration.
//!
//! Works on a JSON snapshot of the store: loads it, runs one job and writes
//! it back. Servers are reached over the `protocol` of their settings
//! (`sftp`, `ftp` or `local`). Exit codes: 0 success, 2 transport failure,
//! 3 configuration error, 1 anything else.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::{Datelike, Local, NaiveDate};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use mvj::core::{
    BillingError, CollectionStage, DateRange, InvoiceId, LeaseId, ServiceUnitId, Store,
    generate_invoices_for_month, generate_invoices_for_period, set_collection_stage,
};
use mvj::laske::{self, LaskeSettings, TracingNotifier};

#[derive(Parser, Debug)]
#[command(name = "mvj", version, about = "Land-lease invoicing and Laske SAP transfer")]
struct Cli {
    /// Store snapshot to operate on.
    #[arg(long, global = true, default_value = "mvj.json")]
    data: PathBuf,

    /// Laske settings file (TOML, YAML or JSON).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate invoices of all invoiceable leases for a month.
    GenerateInvoices {
        /// Run date; must be the first day of a month.
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Allow a run date other than the first of the month.
        #[arg(long = "override")]
        force: bool,
    },
    /// Generate invoices of one lease for a month.
    GenerateLeaseInvoices {
        #[arg(long)]
        lease: LeaseId,
        #[arg(long)]
        year: i32,
        #[arg(long)]
        month: u32,
    },
    /// Send unsent invoices of a service unit to Laske.
    Export {
        #[arg(long)]
        service_unit: ServiceUnitId,
        /// Limit the export to these invoices.
        #[arg(long = "invoice")]
        invoices: Vec<InvoiceId>,
    },
    /// Fetch and import new payment files.
    ImportPayments,
    /// Set or clear the collection stage of an invoice.
    SetCollectionStage {
        #[arg(long)]
        invoice: InvoiceId,
        /// reminder, demand_letter, collection or court; omit to clear.
        #[arg(long)]
        stage: Option<CollectionStage>,
    },
}

fn load_store(path: &Path) -> Result<Store, BillingError> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "no store snapshot, starting empty");
        return Ok(Store::new());
    }
    let json = fs::read_to_string(path)?;
    let store: Store = serde_json::from_str(&json)
        .map_err(|e| BillingError::Config(format!("cannot read store {}: {e}", path.display())))?;
    store.sync_sequences();
    Ok(store)
}

fn save_store(path: &Path, store: &Store) -> Result<(), BillingError> {
    let json = serde_json::to_string_pretty(store)
        .map_err(|e| BillingError::Config(format!("cannot serialize store: {e}")))?;
    fs::write(path, json)?;
    Ok(())
}

fn run(cli: Cli) -> Result<(), BillingError> {
    let mut store = load_store(&cli.data)?;
    let now = Local::now().naive_local();
    let today = now.date();

    match cli.command {
        Command::GenerateInvoices { date, force } => {
            let date = date.unwrap_or(today);
            if date.day() != 1 && !force {
                return Err(BillingError::Config(format!(
                    "{date} is not the first day of a month; use --override to run anyway"
                )));
            }
            let report = generate_invoices_for_month(&mut store, date.year(), date.month(), today)?;
            tracing::info!(
                leases = report.created.len(),
                invoices = report.invoice_count(),
                failures = report.failures.len(),
                "invoice generation finished"
            );
        }
        Command::GenerateLeaseInvoices { lease, year, month } => {
            let range = DateRange::month(year, month)?;
            let created = generate_invoices_for_period(&mut store, lease, &range, today)?;
            tracing::info!(lease, invoices = created.len(), "lease invoices generated");
        }
        Command::Export { service_unit, invoices } => {
            let settings = LaskeSettings::load(cli.config.as_deref())?;
            let mut transport = laske::connect(settings.export_server()?)?;
            let only = (!invoices.is_empty()).then_some(invoices.as_slice());
            laske::export_invoices(
                &mut store,
                service_unit,
                only,
                &settings,
                transport.as_mut(),
                &TracingNotifier,
                now,
            )?;
        }
        Command::ImportPayments => {
            let settings = LaskeSettings::load(cli.config.as_deref())?;
            let mut transport = laske::connect(settings.payments_server()?)?;
            let summary = laske::import_payments(&mut store, &settings, transport.as_mut(), now)?;
            tracing::info!(
                files = summary.files.len(),
                payments = summary.payment_count(),
                failed_files = summary.failed_files.len(),
                "payment import finished"
            );
        }
        Command::SetCollectionStage { invoice, stage } => {
            set_collection_stage(&mut store, invoice, stage)?;
        }
    }

    save_store(&cli.data, &store)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(kind = err.kind(), "{err}");
            match err.kind() {
                "transport" => ExitCode::from(2),
                "config" => ExitCode::from(3),
                _ => ExitCode::FAILURE,
            }
        }
    }
}
