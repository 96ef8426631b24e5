use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::category::Category;
use crate::identity::ClientKey;
use crate::registry::{RawDocument, Session};

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum MergeError {
    #[error("cannot read {category} source {name}: {reason}")]
    UnreadableDocument {
        category: Category,
        name: String,
        reason: String,
    },
    #[error("cannot assemble merged document: {0}")]
    Assemble(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DocumentSource {
    Own,
    Shared,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct PlanEntry<'a> {
    pub category: Category,
    pub source: DocumentSource,
    pub document: &'a RawDocument,
}

/// Resolved merge inputs in ascending category rank.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct MergePlan<'a> {
    pub client_key: Option<&'a ClientKey>,
    pub entries: Vec<PlanEntry<'a>>,
}

impl MergePlan<'_> {
    pub fn categories(&self) -> impl Iterator<Item = Category> + '_ {
        self.entries.iter().map(|entry| entry.category)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn contributes(&self, category: Category) -> bool {
        self.entries.iter().any(|entry| entry.category == category)
    }
}

/// Outcome of the empty-password unlock attempt on one source document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DecryptOutcome {
    NotEncrypted,
    Decrypted,
    StillEncryptedForwarded,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Contribution {
    pub category: Category,
    pub source: DocumentSource,
    pub file_name: String,
    pub pages: usize,
    pub decrypt: DecryptOutcome,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct MergedArtifact {
    pub bytes: Vec<u8>,
    pub page_count: usize,
    pub contributions: Vec<Contribution>,
}

/// Page-level concatenation of a merge plan into one output document.
pub trait PageConcatenator {
    /// # Errors
    /// Returns [`MergeError`] when any planned document cannot be read or the
    /// output cannot be assembled. No partial output is produced.
    fn concatenate(&self, plan: &MergePlan<'_>) -> Result<MergedArtifact, MergeError>;
}

/// Merge one client's bundle.
///
/// # Errors
/// Returns [`MergeError`] from the concatenator; returns `Ok(None)` for an unknown client.
pub fn merge_client(
    session: &Session,
    client_key: &str,
    concatenator: &dyn PageConcatenator,
) -> Result<Option<MergedArtifact>, MergeError> {
    let Some(plan) = session.merge_plan(client_key) else {
        return Ok(None);
    };
    concatenator.concatenate(&plan).map(Some)
}

/// Merge the shared documents alone, for a bundle with no client.
///
/// # Errors
/// Returns [`MergeError`] from the concatenator.
pub fn merge_shared(
    session: &Session,
    concatenator: &dyn PageConcatenator,
) -> Result<MergedArtifact, MergeError> {
    concatenator.concatenate(&session.shared_merge_plan())
}

#[derive(Debug, Clone)]
pub struct ClientMerge {
    pub client_key: ClientKey,
    pub result: Result<MergedArtifact, MergeError>,
}

#[derive(Debug, Clone, Default)]
pub struct MergeRun {
    pub merges: Vec<ClientMerge>,
    pub cancelled: bool,
}

impl MergeRun {
    #[must_use]
    pub fn failures(&self) -> usize {
        self.merges
            .iter()
            .filter(|merge| merge.result.is_err())
            .count()
    }
}

/// Merge every client in registry order. A failure is local to its client;
/// cancellation is checked before each client.
#[must_use]
pub fn merge_clients(
    session: &Session,
    concatenator: &dyn PageConcatenator,
    cancel: &CancelToken,
) -> MergeRun {
    let mut run = MergeRun::default();
    for record in session.clients() {
        if cancel.is_cancelled() {
            tracing::info!(completed = run.merges.len(), "merge run cancelled");
            run.cancelled = true;
            break;
        }

        let result = match session.merge_plan(record.client_key().as_str()) {
            Some(plan) => concatenator.concatenate(&plan),
            None => Err(MergeError::Assemble(format!(
                "client {} vanished from the registry",
                record.client_key()
            ))),
        };
        match &result {
            Ok(artifact) => tracing::info!(
                client = %record.client_key(),
                pages = artifact.page_count,
                documents = artifact.contributions.len(),
                "merged client bundle"
            ),
            Err(err) => tracing::warn!(client = %record.client_key(), error = %err, "merge failed"),
        }
        run.merges.push(ClientMerge {
            client_key: record.client_key().clone(),
            result,
        });
    }
    run
}
