use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::{ExportLogId, InvoiceId, ServiceUnitId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExportStatus {
    Sent,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportLogItem {
    pub invoice: InvoiceId,
    pub status: ExportStatus,
    /// JSON payload describing the failure.
    #[serde(default)]
    pub information: Option<String>,
}

/// One Laske export run of a service unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportLog {
    pub id: ExportLogId,
    pub service_unit: ServiceUnitId,
    pub started_at: NaiveDateTime,
    #[serde(default)]
    pub ended_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub items: Vec<ExportLogItem>,
}

impl ExportLog {
    pub fn count(&self, status: ExportStatus) -> usize {
        self.items.iter().filter(|i| i.status == status).count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportedFile {
    pub filename: String,
    pub processed_at: NaiveDateTime,
    pub payment_count: usize,
    pub error_count: usize,
    #[serde(default)]
    pub invoices: Vec<InvoiceId>,
}

/// Payment files already taken in from Laske.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentImportLog {
    #[serde(default)]
    pub files: Vec<ImportedFile>,
}

impl PaymentImportLog {
    pub fn is_processed(&self, filename: &str) -> bool {
        self.files.iter().any(|f| f.filename == filename)
    }
}
