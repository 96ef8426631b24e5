use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use predemandas_core::{DuplicatePolicy, IngestReport, RawDocument, Session};
use serde::Serialize;
use walkdir::WalkDir;

/// A file the registry refused under the `reject` duplicate policy.
#[derive(Debug, Clone, Serialize)]
pub struct Rejection {
    pub file_name: String,
    pub reason: String,
}

#[derive(Debug)]
pub struct LoadedInput {
    pub session: Session,
    pub reports: Vec<IngestReport>,
    pub rejections: Vec<Rejection>,
}

/// PDF files directly inside `dir`, sorted by file name.
pub fn discover_pdfs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    let walker = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name();
    for entry in walker {
        let entry = entry
            .with_context(|| format!("failed to scan input directory {}", dir.display()))?;
        if entry.file_type().is_file() && is_pdf(entry.path()) {
            paths.push(entry.into_path());
        }
    }
    Ok(paths)
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| extension.eq_ignore_ascii_case("pdf"))
}

/// Read every PDF in `dir` into a fresh session.
pub fn load_session(dir: &Path, policy: DuplicatePolicy) -> Result<LoadedInput> {
    let mut session = Session::new(policy);
    let mut reports = Vec::new();
    let mut rejections = Vec::new();

    for path in discover_pdfs(dir)? {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        let content = fs::read(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let document = RawDocument::new(file_name.clone(), content);
        match session.ingest(document) {
            Ok(report) => reports.push(report),
            Err(err) => {
                tracing::warn!(
                    file = %file_name,
                    error = %err,
                    "file rejected by duplicate policy"
                );
                rejections.push(Rejection {
                    file_name,
                    reason: err.to_string(),
                });
            }
        }
    }

    tracing::info!(
        files = reports.len() + rejections.len(),
        clients = session.client_count(),
        shared = session.shared_documents().count(),
        policy = policy.as_str(),
        "ingested input directory"
    );
    Ok(LoadedInput {
        session,
        reports,
        rejections,
    })
}
