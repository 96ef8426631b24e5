use std::fs;
use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use predemandas_core::{DeliveryError, DeliveryTransport, OutgoingMessage};
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use ulid::Ulid;

#[derive(Debug, Serialize)]
struct AttachmentEnvelope<'a> {
    file_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content_base64: Option<String>,
}

#[derive(Debug, Serialize)]
struct Envelope<'a> {
    id: String,
    queued_at: String,
    from: &'a str,
    to: &'a str,
    cc: &'a [String],
    subject: &'a str,
    body: &'a str,
    attachment: Option<AttachmentEnvelope<'a>>,
}

fn envelope<'a>(sender: &'a str, message: &'a OutgoingMessage, inline: bool) -> Envelope<'a> {
    Envelope {
        id: Ulid::new().to_string(),
        queued_at: OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default(),
        from: sender,
        to: &message.to,
        cc: &message.cc,
        subject: &message.subject,
        body: &message.body,
        attachment: message.attachment.as_ref().map(|attachment| AttachmentEnvelope {
            file_name: &attachment.file_name,
            content_base64: inline.then(|| STANDARD.encode(&attachment.content)),
        }),
    }
}

/// Writes each message as `<id>.json` plus `<id>_<attachment>` into a
/// directory instead of sending it.
#[derive(Debug, Clone)]
pub struct OutboxTransport {
    dir: PathBuf,
    sender: String,
}

impl OutboxTransport {
    #[must_use]
    pub fn new(dir: PathBuf, sender: String) -> Self {
        Self { dir, sender }
    }
}

impl DeliveryTransport for OutboxTransport {
    fn deliver(&self, message: &OutgoingMessage) -> Result<(), DeliveryError> {
        let io_error = |err: std::io::Error| DeliveryError::Transport(err.to_string());
        fs::create_dir_all(&self.dir).map_err(io_error)?;

        let envelope = envelope(&self.sender, message, false);
        if let Some(attachment) = &message.attachment {
            let file_name = format!("{}_{}", envelope.id, attachment.file_name);
            let path = self.dir.join(file_name);
            fs::write(path, &attachment.content).map_err(io_error)?;
        }
        let json = serde_json::to_vec_pretty(&envelope)
            .map_err(|err| DeliveryError::Transport(err.to_string()))?;
        let path = self.dir.join(format!("{}.json", envelope.id));
        fs::write(path, json).map_err(io_error)?;
        tracing::debug!(id = %envelope.id, to = %message.to, "queued message in outbox");
        Ok(())
    }
}

/// Posts a JSON envelope with the attachment inlined as base64 to an HTTP
/// mail relay.
#[derive(Debug, Clone)]
pub struct RelayTransport {
    endpoint: String,
    token: Option<String>,
    sender: String,
    allow_missing_attachment: bool,
}

impl RelayTransport {
    #[must_use]
    pub fn new(
        endpoint: String,
        token: Option<String>,
        sender: String,
        allow_missing_attachment: bool,
    ) -> Self {
        Self {
            endpoint,
            token,
            sender,
            allow_missing_attachment,
        }
    }
}

impl DeliveryTransport for RelayTransport {
    fn deliver(&self, message: &OutgoingMessage) -> Result<(), DeliveryError> {
        if message.attachment.is_none() && !self.allow_missing_attachment {
            return Err(DeliveryError::MissingAttachment);
        }

        let mut request = ureq::post(&self.endpoint)
            .config()
            .http_status_as_error(false)
            .build();
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }
        let response = request
            .send_json(envelope(&self.sender, message, true))
            .map_err(|err| DeliveryError::Transport(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.into_body().read_to_string().unwrap_or_default();
        Err(DeliveryError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}
