use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::matrix::TableExport;
use crate::merge::{merge_client, PageConcatenator};
use crate::reference::{CaseRow, ReferenceTable};
use crate::registry::Session;

pub const SENT_STATUS: &str = "ENVIADO";
pub const SENT_WITHOUT_ATTACHMENT_STATUS: &str = "ENVIADO SIN ADJUNTO";
pub const LOG_COLUMNS: [&str; 4] = ["CEDULA", "NOMBRE_CLIENTE", "ASUNTO", "ESTADO"];

const PLAINTIFF: &str = "BANCO GNB SUDAMERIS S.A";

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum DeliveryError {
    #[error("no attachment available and the transport requires one")]
    MissingAttachment,
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("relay rejected the message with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Attachment {
    pub file_name: String,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct OutgoingMessage {
    pub to: String,
    pub cc: Vec<String>,
    pub subject: String,
    pub body: String,
    pub attachment: Option<Attachment>,
}

/// The external delivery collaborator. Exactly one call per dispatch row.
pub trait DeliveryTransport {
    /// # Errors
    /// Returns [`DeliveryError`] when the message could not be handed off.
    fn deliver(&self, message: &OutgoingMessage) -> Result<(), DeliveryError>;
}

#[must_use]
pub fn subject_for(row: &CaseRow) -> String {
    format!(
        "RADICACIÓN DEMANDA EJECUTIVA DTE: {PLAINTIFF} CONTRA {} CC {}",
        row.display_name, row.client_id
    )
}

#[must_use]
pub fn body_for(row: &CaseRow) -> String {
    format!(
        "Señores\n{venue}\n\n\
         Respetados señores:\n\n\
         En calidad de apoderado de {PLAINTIFF}, radico demanda ejecutiva de {amount} cuantía \
         contra {name}, identificado(a) con cédula de ciudadanía No. {id}.\n\n\
         Se adjunta en un único archivo PDF la demanda con sus anexos.\n\n\
         Cordialmente,",
        venue = row.venue,
        amount = row.amount_class.to_lowercase(),
        name = row.display_name,
        id = row.client_id,
    )
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum DispatchStatus {
    Sent,
    SentWithoutAttachment,
    Failed(String),
}

impl DispatchStatus {
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Sent => SENT_STATUS.to_string(),
            Self::SentWithoutAttachment => SENT_WITHOUT_ATTACHMENT_STATUS.to_string(),
            Self::Failed(reason) => format!("ERROR: {reason}"),
        }
    }

    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct DispatchEntry {
    pub row_number: usize,
    pub client_key: String,
    pub display_name: String,
    pub subject: String,
    pub matched_client: bool,
    #[serde(flatten)]
    pub status: DispatchStatus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct DispatchSettings {
    #[serde(default)]
    pub copy_recipients: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct DispatchLog {
    pub entries: Vec<DispatchEntry>,
    pub cancelled: bool,
}

impl DispatchLog {
    #[must_use]
    pub fn failures(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.status.is_failure())
            .count()
    }

    #[must_use]
    pub fn export(&self) -> TableExport {
        TableExport {
            columns: LOG_COLUMNS
                .iter()
                .map(|column| (*column).to_string())
                .collect(),
            rows: self
                .entries
                .iter()
                .map(|entry| {
                    vec![
                        entry.client_key.clone(),
                        entry.display_name.clone(),
                        entry.subject.clone(),
                        entry.status.render(),
                    ]
                })
                .collect(),
        }
    }
}

/// Attempt delivery for every reference row, in order, one attempt each.
///
/// A row whose client is unknown is still handed to the transport without an
/// attachment; a row whose merge fails is recorded and not delivered. Nothing
/// here aborts the batch; cancellation is checked before each row.
#[must_use]
pub fn run_dispatch(
    session: &Session,
    table: &ReferenceTable,
    concatenator: &dyn PageConcatenator,
    transport: &dyn DeliveryTransport,
    settings: &DispatchSettings,
    cancel: &CancelToken,
) -> DispatchLog {
    let mut log = DispatchLog::default();
    for row in table.rows() {
        if cancel.is_cancelled() {
            tracing::info!(completed = log.entries.len(), "dispatch run cancelled");
            log.cancelled = true;
            break;
        }
        let entry = dispatch_row(session, row, concatenator, transport, settings);
        if let DispatchStatus::Failed(reason) = &entry.status {
            tracing::warn!(
                row = entry.row_number,
                client = %entry.client_key,
                %reason,
                "dispatch row failed"
            );
        } else {
            tracing::info!(
                row = entry.row_number,
                client = %entry.client_key,
                status = %entry.status.render(),
                "dispatch row delivered"
            );
        }
        log.entries.push(entry);
    }
    log
}

fn dispatch_row(
    session: &Session,
    row: &CaseRow,
    concatenator: &dyn PageConcatenator,
    transport: &dyn DeliveryTransport,
    settings: &DispatchSettings,
) -> DispatchEntry {
    let subject = subject_for(row);
    let record = session.client(&row.client_id);
    let mut entry = DispatchEntry {
        row_number: row.row_number,
        client_key: row.client_id.clone(),
        display_name: row.display_name.clone(),
        subject: subject.clone(),
        matched_client: record.is_some(),
        status: DispatchStatus::Sent,
    };

    if row.client_id.is_empty() {
        entry.status = DispatchStatus::Failed("fila sin CC_DDO".to_string());
        return entry;
    }

    let attachment = match record {
        Some(record) => match merge_client(session, &row.client_id, concatenator) {
            Ok(Some(artifact)) => Some(Attachment {
                file_name: record.merged_file_name(),
                content: artifact.bytes,
            }),
            Ok(None) => None,
            Err(err) => {
                entry.status = DispatchStatus::Failed(err.to_string());
                return entry;
            }
        },
        None => None,
    };
    let has_attachment = attachment.is_some();

    let message = OutgoingMessage {
        to: row.venue.clone(),
        cc: settings.copy_recipients.clone(),
        subject,
        body: body_for(row),
        attachment,
    };

    entry.status = match transport.deliver(&message) {
        Ok(()) if has_attachment => DispatchStatus::Sent,
        Ok(()) => DispatchStatus::SentWithoutAttachment,
        Err(err) if has_attachment => DispatchStatus::Failed(err.to_string()),
        Err(err) => {
            DispatchStatus::Failed(format!("cédula no encontrada en los documentos; {err}"))
        }
    };
    entry
}
