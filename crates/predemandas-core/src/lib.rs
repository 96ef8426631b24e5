//! Document classification, per-client grouping and merge planning for
//! pre-filing lawsuit bundles.
//!
//! Everything here is pure: PDF page handling lives behind
//! [`PageConcatenator`] and delivery behind [`DeliveryTransport`].

pub mod cancel;
pub mod category;
pub mod dispatch;
pub mod identity;
pub mod matrix;
pub mod merge;
pub mod normalize;
pub mod reference;
pub mod registry;

pub use cancel::CancelToken;
pub use category::{classify, classify_filename, Category, Classification};
pub use dispatch::{
    body_for, run_dispatch, subject_for, Attachment, DeliveryError, DeliveryTransport,
    DispatchEntry, DispatchLog, DispatchSettings, DispatchStatus, OutgoingMessage,
};
pub use identity::{parse_identity, ClientKey, Identity, DEFAULT_DISPLAY_NAME};
pub use matrix::{
    build_matrix, export_matrix, traceability_columns, Cell, TableExport, TraceabilityRow,
    NOT_PROVIDED,
};
pub use merge::{
    merge_client, merge_clients, merge_shared, ClientMerge, Contribution, DecryptOutcome,
    DocumentSource, MergeError, MergePlan, MergeRun, MergedArtifact, PageConcatenator, PlanEntry,
};
pub use normalize::normalize_text;
pub use reference::{CaseRow, ReferenceError, ReferenceTable};
pub use registry::{
    Binding, ClientRecord, DuplicatePolicy, IngestReport, RawDocument, RegistryError, Resolution,
    Session,
};
