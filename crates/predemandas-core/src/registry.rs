use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::category::{classify_filename, Category, Classification};
use crate::identity::{parse_identity, ClientKey, Identity};
use crate::merge::{DocumentSource, MergePlan, PlanEntry};

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum RegistryError {
    #[error("duplicate {category} for {scope}: {incoming} rejected, {existing} already bound")]
    DuplicateCategory {
        scope: String,
        category: Category,
        existing: String,
        incoming: String,
    },
}

/// An uploaded file: its name and full content.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RawDocument {
    name: String,
    content: Vec<u8>,
}

impl RawDocument {
    #[must_use]
    pub fn new(name: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn content(&self) -> &[u8] {
        &self.content
    }
}

/// What happens when a second document arrives for an already bound category.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicatePolicy {
    #[default]
    LastWins,
    KeepFirst,
    Reject,
}

impl DuplicatePolicy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LastWins => "last-wins",
            Self::KeepFirst => "keep-first",
            Self::Reject => "reject",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "last-wins" => Some(Self::LastWins),
            "keep-first" => Some(Self::KeepFirst),
            "reject" => Some(Self::Reject),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ClientRecord {
    client_key: ClientKey,
    display_name: String,
    documents: BTreeMap<Category, RawDocument>,
}

impl ClientRecord {
    #[must_use]
    pub fn client_key(&self) -> &ClientKey {
        &self.client_key
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    #[must_use]
    pub fn document(&self, category: Category) -> Option<&RawDocument> {
        self.documents.get(&category)
    }

    /// The client's own documents in rank order.
    pub fn documents(&self) -> impl Iterator<Item = (Category, &RawDocument)> {
        self.documents
            .iter()
            .map(|(category, document)| (*category, document))
    }

    /// Folder name used in the bundle archive.
    #[must_use]
    pub fn folder_name(&self) -> String {
        format!("{}_{}", self.client_key, self.display_name)
    }

    #[must_use]
    pub fn merged_file_name(&self) -> String {
        format!("{}_{}_DEMANDAUNIFICADA.pdf", self.client_key, self.display_name)
    }
}

/// Where a document for `(client, category)` comes from.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Resolution<'a> {
    Own(&'a RawDocument),
    Shared(&'a RawDocument),
    NotProvided,
}

impl<'a> Resolution<'a> {
    #[must_use]
    pub fn document(self) -> Option<&'a RawDocument> {
        match self {
            Self::Own(document) | Self::Shared(document) => Some(document),
            Self::NotProvided => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(tag = "binding", rename_all = "snake_case")]
pub enum Binding {
    Bound,
    Replaced { previous: String },
    KeptExisting { existing: String },
    Unmatched,
}

/// Observable result of ingesting one file.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct IngestReport {
    pub file_name: String,
    pub identity: Identity,
    pub classification: Classification,
    #[serde(flatten)]
    pub binding: Binding,
}

/// In-memory session state: the client registry and the shared document set.
///
/// Written only while ingesting; every other phase borrows it immutably.
#[derive(Debug, Clone, Default)]
pub struct Session {
    policy: DuplicatePolicy,
    clients: IndexMap<String, ClientRecord>,
    shared: BTreeMap<Category, RawDocument>,
}

impl Session {
    #[must_use]
    pub fn new(policy: DuplicatePolicy) -> Self {
        Self {
            policy,
            clients: IndexMap::new(),
            shared: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn policy(&self) -> DuplicatePolicy {
        self.policy
    }

    /// Drop every client and shared document, keeping the duplicate policy.
    pub fn reset(&mut self) {
        self.clients.clear();
        self.shared.clear();
    }

    /// Classify and bind one document.
    ///
    /// Client-scoped files always register their client, even when the name
    /// matches no category; only recognized categories are bound.
    ///
    /// # Errors
    /// Returns [`RegistryError::DuplicateCategory`] under [`DuplicatePolicy::Reject`]
    /// when the category is already bound for the same client (or the shared set).
    pub fn ingest(&mut self, document: RawDocument) -> Result<IngestReport, RegistryError> {
        let file_name = document.name().to_string();
        let classification = classify_filename(&file_name);
        let identity = parse_identity(&file_name);
        let policy = self.policy;

        let binding = match &identity {
            Identity::Client {
                client_key,
                display_name,
            } => {
                let record = self
                    .clients
                    .entry(client_key.as_str().to_string())
                    .or_insert_with(|| ClientRecord {
                        client_key: client_key.clone(),
                        display_name: display_name.clone(),
                        documents: BTreeMap::new(),
                    });
                match classification {
                    Classification::Matched(category) => bind(
                        &mut record.documents,
                        category,
                        document,
                        policy,
                        &format!("client {client_key}"),
                    )?,
                    Classification::Unmatched => Binding::Unmatched,
                }
            }
            Identity::Shared => match classification {
                Classification::Matched(category) => bind(
                    &mut self.shared,
                    category,
                    document,
                    policy,
                    "shared documents",
                )?,
                Classification::Unmatched => Binding::Unmatched,
            },
        };

        match &binding {
            Binding::Unmatched => {
                tracing::warn!(
                    file = %file_name,
                    "file name matches no document category, ignored"
                );
            }
            Binding::Replaced { previous } => {
                tracing::debug!(file = %file_name, %previous, "duplicate category replaced");
            }
            Binding::KeptExisting { existing } => {
                tracing::debug!(file = %file_name, %existing, "duplicate category skipped");
            }
            Binding::Bound => {
                tracing::debug!(file = %file_name, ?classification, "document bound");
            }
        }

        Ok(IngestReport {
            file_name,
            identity,
            classification,
            binding,
        })
    }

    /// Client keys in first-seen order.
    pub fn client_keys(&self) -> impl Iterator<Item = &ClientKey> {
        self.clients.values().map(ClientRecord::client_key)
    }

    /// Client records in first-seen order.
    pub fn clients(&self) -> impl Iterator<Item = &ClientRecord> {
        self.clients.values()
    }

    #[must_use]
    pub fn client(&self, client_key: &str) -> Option<&ClientRecord> {
        self.clients.get(client_key)
    }

    #[must_use]
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Shared documents in rank order.
    pub fn shared_documents(&self) -> impl Iterator<Item = (Category, &RawDocument)> {
        self.shared
            .iter()
            .map(|(category, document)| (*category, document))
    }

    #[must_use]
    pub fn shared_document(&self, category: Category) -> Option<&RawDocument> {
        self.shared.get(&category)
    }

    /// Resolve `(client, category)`: the client's own document, else the shared
    /// one, else nothing. Unknown clients only see shared documents.
    #[must_use]
    pub fn resolve(&self, client_key: &str, category: Category) -> Resolution<'_> {
        let own = self
            .client(client_key)
            .and_then(|record| record.document(category));
        if let Some(document) = own {
            return Resolution::Own(document);
        }
        match self.shared.get(&category) {
            Some(document) => Resolution::Shared(document),
            None => Resolution::NotProvided,
        }
    }

    /// Ordered merge inputs for one client, or `None` for an unknown key.
    #[must_use]
    pub fn merge_plan(&self, client_key: &str) -> Option<MergePlan<'_>> {
        let record = self.client(client_key)?;
        let entries = Category::ALL
            .into_iter()
            .filter_map(|category| {
                let (source, document) = match self.resolve(client_key, category) {
                    Resolution::Own(document) => (DocumentSource::Own, document),
                    Resolution::Shared(document) => (DocumentSource::Shared, document),
                    Resolution::NotProvided => return None,
                };
                Some(PlanEntry {
                    category,
                    source,
                    document,
                })
            })
            .collect();
        Some(MergePlan {
            client_key: Some(record.client_key()),
            entries,
        })
    }

    /// Ordered merge inputs for a bundle made of shared documents only.
    #[must_use]
    pub fn shared_merge_plan(&self) -> MergePlan<'_> {
        let entries = self
            .shared_documents()
            .map(|(category, document)| PlanEntry {
                category,
                source: DocumentSource::Shared,
                document,
            })
            .collect();
        MergePlan {
            client_key: None,
            entries,
        }
    }
}

fn bind(
    slots: &mut BTreeMap<Category, RawDocument>,
    category: Category,
    document: RawDocument,
    policy: DuplicatePolicy,
    scope: &str,
) -> Result<Binding, RegistryError> {
    let Some(existing) = slots.get(&category) else {
        slots.insert(category, document);
        return Ok(Binding::Bound);
    };

    match policy {
        DuplicatePolicy::LastWins => {
            let previous = existing.name().to_string();
            slots.insert(category, document);
            Ok(Binding::Replaced { previous })
        }
        DuplicatePolicy::KeepFirst => Ok(Binding::KeptExisting {
            existing: existing.name().to_string(),
        }),
        DuplicatePolicy::Reject => Err(RegistryError::DuplicateCategory {
            scope: scope.to_string(),
            category,
            existing: existing.name().to_string(),
            incoming: document.name().to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(name: &str) -> RawDocument {
        RawDocument::new(name, name.as_bytes().to_vec())
    }

    fn ingest_all(session: &mut Session, names: &[&str]) -> Vec<IngestReport> {
        names
            .iter()
            .map(|name| match session.ingest(doc(name)) {
                Ok(report) => report,
                Err(err) => panic!("ingest of {name} should succeed: {err}"),
            })
            .collect()
    }

    fn resolved_name(session: &Session, client_key: &str, category: Category) -> Option<String> {
        session
            .resolve(client_key, category)
            .document()
            .map(|document| document.name().to_string())
    }

    fn client<'a>(session: &'a Session, client_key: &str) -> &'a ClientRecord {
        match session.client(client_key) {
            Some(record) => record,
            None => panic!("client {client_key} should exist"),
        }
    }

    #[test]
    fn clients_are_enumerated_in_first_seen_order() {
        let mut session = Session::default();
        ingest_all(
            &mut session,
            &[
                "900_Zoe_DEMANDA.pdf",
                "100_Ana_DEMANDA.pdf",
                "900_Zoe_PAGARE.pdf",
                "500_Luz_PODER.pdf",
            ],
        );
        let keys = session
            .client_keys()
            .map(ClientKey::as_str)
            .collect::<Vec<_>>();
        assert_eq!(keys, vec!["900", "100", "500"]);
    }

    #[test]
    fn first_occurrence_fixes_display_name() {
        let mut session = Session::default();
        ingest_all(
            &mut session,
            &["123_Ana_DEMANDA.pdf", "123_ANA MARIA_PAGARE.pdf"],
        );
        let record = client(&session, "123");
        assert_eq!(record.display_name(), "Ana");
        assert_eq!(record.folder_name(), "123_Ana");
        assert_eq!(record.merged_file_name(), "123_Ana_DEMANDAUNIFICADA.pdf");
    }

    #[test]
    fn unmatched_client_file_still_registers_client() {
        let mut session = Session::default();
        let reports = ingest_all(&mut session, &["777_Leo_anexo.pdf"]);
        assert_eq!(reports[0].binding, Binding::Unmatched);
        assert_eq!(reports[0].classification, Classification::Unmatched);
        assert_eq!(client(&session, "777").documents().count(), 0);
    }

    #[test]
    fn unmatched_shared_file_is_dropped() {
        let mut session = Session::default();
        let reports = ingest_all(&mut session, &["instrucciones.pdf"]);
        assert_eq!(reports[0].binding, Binding::Unmatched);
        assert_eq!(reports[0].identity, Identity::Shared);
        assert_eq!(session.shared_documents().count(), 0);
        assert_eq!(session.client_count(), 0);
    }

    #[test]
    fn resolution_prefers_own_then_shared_then_nothing() {
        let mut session = Session::default();
        ingest_all(
            &mut session,
            &[
                "123_JohnDoe_DEMANDA.pdf",
                "123_JohnDoe_PAGARE.pdf",
                "CAMARA_COMERCIO_GLOBAL.pdf",
                "PAGARE_MODELO.pdf",
            ],
        );

        assert!(matches!(
            session.resolve("123", Category::Demanda),
            Resolution::Own(_)
        ));
        assert_eq!(
            resolved_name(&session, "123", Category::Pagare),
            Some("123_JohnDoe_PAGARE.pdf".to_string())
        );
        assert!(matches!(
            session.resolve("123", Category::CamaraYComercio),
            Resolution::Shared(_)
        ));
        assert_eq!(
            session.resolve("123", Category::Ubica),
            Resolution::NotProvided
        );
        assert!(matches!(
            session.resolve("999", Category::Pagare),
            Resolution::Shared(_)
        ));
    }

    #[test]
    fn duplicate_category_last_wins_by_default() {
        let mut session = Session::default();
        let reports = ingest_all(
            &mut session,
            &["123_Ana_DEMANDA_v1.pdf", "123_Ana_DEMANDA_v2.pdf"],
        );
        assert_eq!(
            reports[1].binding,
            Binding::Replaced {
                previous: "123_Ana_DEMANDA_v1.pdf".to_string()
            }
        );
        assert_eq!(
            resolved_name(&session, "123", Category::Demanda),
            Some("123_Ana_DEMANDA_v2.pdf".to_string())
        );
    }

    #[test]
    fn duplicate_category_keep_first_policy() {
        let mut session = Session::new(DuplicatePolicy::KeepFirst);
        let reports = ingest_all(&mut session, &["SIRNA_a.pdf", "SIRNA_b.pdf"]);
        assert_eq!(
            reports[1].binding,
            Binding::KeptExisting {
                existing: "SIRNA_a.pdf".to_string()
            }
        );
        assert_eq!(
            session
                .shared_document(Category::Sirna)
                .map(RawDocument::name),
            Some("SIRNA_a.pdf")
        );
    }

    #[test]
    fn duplicate_category_reject_policy_leaves_binding_untouched() {
        let mut session = Session::new(DuplicatePolicy::Reject);
        ingest_all(&mut session, &["123_Ana_PODER_1.pdf"]);
        let err = match session.ingest(doc("123_Ana_PODER_2.pdf")) {
            Ok(report) => panic!("duplicate should be rejected: {report:?}"),
            Err(err) => err,
        };
        assert_eq!(
            err,
            RegistryError::DuplicateCategory {
                scope: "client 123".to_string(),
                category: Category::Poder,
                existing: "123_Ana_PODER_1.pdf".to_string(),
                incoming: "123_Ana_PODER_2.pdf".to_string(),
            }
        );
        assert_eq!(
            resolved_name(&session, "123", Category::Poder),
            Some("123_Ana_PODER_1.pdf".to_string())
        );
    }

    #[test]
    fn merge_plan_follows_rank_order_and_skips_missing() {
        let mut session = Session::default();
        ingest_all(
            &mut session,
            &[
                "CAMARA_COMERCIO_GLOBAL.pdf",
                "123_JohnDoe_PAGARE.pdf",
                "123_JohnDoe_DEMANDA.pdf",
            ],
        );
        let Some(plan) = session.merge_plan("123") else {
            panic!("client 123 should have a plan");
        };
        assert_eq!(
            plan.categories().collect::<Vec<_>>(),
            vec![Category::Demanda, Category::Pagare, Category::CamaraYComercio]
        );
        let sources = plan
            .entries
            .iter()
            .map(|entry| entry.source)
            .collect::<Vec<_>>();
        assert_eq!(
            sources,
            vec![
                DocumentSource::Own,
                DocumentSource::Own,
                DocumentSource::Shared
            ]
        );
        assert!(session.merge_plan("404").is_none());
    }

    #[test]
    fn shared_merge_plan_uses_only_shared_documents() {
        let mut session = Session::default();
        ingest_all(
            &mut session,
            &["MEDIDAS.pdf", "123_Ana_DEMANDA.pdf", "SIRNA.pdf"],
        );
        let plan = session.shared_merge_plan();
        assert!(plan.client_key.is_none());
        assert_eq!(
            plan.categories().collect::<Vec<_>>(),
            vec![Category::Sirna, Category::Medidas]
        );
    }

    #[test]
    fn reset_clears_state_but_keeps_policy() {
        let mut session = Session::new(DuplicatePolicy::KeepFirst);
        ingest_all(&mut session, &["123_Ana_DEMANDA.pdf", "SIRNA.pdf"]);
        session.reset();
        assert_eq!(session.client_count(), 0);
        assert_eq!(session.shared_documents().count(), 0);
        assert_eq!(session.policy(), DuplicatePolicy::KeepFirst);
    }

    #[test]
    fn duplicate_policy_names_round_trip() {
        let policies = [
            DuplicatePolicy::LastWins,
            DuplicatePolicy::KeepFirst,
            DuplicatePolicy::Reject,
        ];
        for policy in policies {
            assert_eq!(DuplicatePolicy::parse(policy.as_str()), Some(policy));
        }
        assert_eq!(DuplicatePolicy::parse("first"), None);
    }
}
