use std::collections::BTreeSet;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use predemandas_core::{
    ClientRecord, Contribution, MergeError, MergeRun, MergedArtifact, RawDocument, Session,
};
use serde::Serialize;
use sha2::{Digest, Sha256};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Folder used when the input has shared documents but no client.
pub const SHARED_FOLDER: &str = "COMPARTIDOS";
const MERGED_SUFFIX: &str = "DEMANDAUNIFICADA.pdf";

#[derive(Debug, Clone, Serialize)]
pub struct MergedSummary {
    pub file_name: String,
    pub pages: usize,
    pub sha256: String,
    pub contributions: Vec<Contribution>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FolderSummary {
    pub folder: String,
    pub client_key: Option<String>,
    pub documents: Vec<String>,
    pub merged: Option<MergedSummary>,
    pub error: Option<String>,
}

struct BundleWriter {
    zip: ZipWriter<File>,
    options: SimpleFileOptions,
}

impl BundleWriter {
    fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("failed to create bundle archive {}", path.display()))?;
        Ok(Self {
            zip: ZipWriter::new(file),
            options: SimpleFileOptions::default()
                .compression_method(zip::CompressionMethod::Deflated),
        })
    }

    fn add(&mut self, name: &str, content: &[u8]) -> Result<()> {
        self.zip
            .start_file(name, self.options)
            .with_context(|| format!("failed to start archive entry {name}"))?;
        self.zip
            .write_all(content)
            .with_context(|| format!("failed to write archive entry {name}"))
    }

    /// Write a folder's source documents, skipping repeated names, then its
    /// merged file when the merge succeeded. A source named like the merged
    /// file is left out; its pages are already in the merged file.
    fn add_folder<'a>(
        &mut self,
        folder: &str,
        documents: impl Iterator<Item = &'a RawDocument>,
        merged_name: String,
        merge: &Result<MergedArtifact, MergeError>,
    ) -> Result<FolderSummary> {
        let mut written = BTreeSet::new();
        if merge.is_ok() {
            written.insert(merged_name.clone());
        }
        let mut names = Vec::new();
        for document in documents {
            if !written.insert(document.name().to_string()) {
                tracing::warn!(
                    folder,
                    file = document.name(),
                    "source document name already used in bundle folder, skipped"
                );
                continue;
            }
            self.add(&format!("{folder}/{}", document.name()), document.content())?;
            names.push(document.name().to_string());
        }

        let mut summary = FolderSummary {
            folder: folder.to_string(),
            client_key: None,
            documents: names,
            merged: None,
            error: None,
        };
        match merge {
            Ok(artifact) => {
                self.add(&format!("{folder}/{merged_name}"), &artifact.bytes)?;
                summary.merged = Some(MergedSummary {
                    file_name: merged_name,
                    pages: artifact.page_count,
                    sha256: hex::encode(Sha256::digest(&artifact.bytes)),
                    contributions: artifact.contributions.clone(),
                });
            }
            Err(err) => summary.error = Some(err.to_string()),
        }
        Ok(summary)
    }

    fn finish(self) -> Result<()> {
        self.zip
            .finish()
            .context("failed to finalize bundle archive")?;
        Ok(())
    }
}

/// Write the bundle archive: one folder per client with its own documents,
/// every shared document, and the merged file. `shared_merge` is only given
/// for an input without clients.
pub fn write_bundle(
    path: &Path,
    session: &Session,
    run: &MergeRun,
    shared_merge: Option<&Result<MergedArtifact, MergeError>>,
) -> Result<Vec<FolderSummary>> {
    let mut writer = BundleWriter::create(path)?;
    let mut folders = Vec::with_capacity(run.merges.len());

    for merge in &run.merges {
        let Some(record) = session.client(merge.client_key.as_str()) else {
            continue;
        };
        let mut summary = writer.add_folder(
            &record.folder_name(),
            client_documents(session, record),
            record.merged_file_name(),
            &merge.result,
        )?;
        summary.client_key = Some(record.client_key().to_string());
        folders.push(summary);
    }

    if let Some(merge) = shared_merge {
        folders.push(writer.add_folder(
            SHARED_FOLDER,
            session.shared_documents().map(|(_, document)| document),
            format!("{SHARED_FOLDER}_{MERGED_SUFFIX}"),
            merge,
        )?);
    }

    writer.finish()?;
    tracing::info!(
        archive = %path.display(),
        folders = folders.len(),
        "wrote bundle archive"
    );
    Ok(folders)
}

fn client_documents<'a>(
    session: &'a Session,
    record: &'a ClientRecord,
) -> impl Iterator<Item = &'a RawDocument> {
    record
        .documents()
        .map(|(_, document)| document)
        .chain(session.shared_documents().map(|(_, document)| document))
}
