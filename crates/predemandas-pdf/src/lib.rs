//! lopdf-backed page concatenation for merge plans built by `predemandas-core`.

use std::collections::BTreeMap;

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId};
use predemandas_core::{
    Contribution, DecryptOutcome, MergeError, MergePlan, MergedArtifact, PageConcatenator,
    PlanEntry,
};

const OUTPUT_VERSION: &str = "1.5";
const MAX_TREE_DEPTH: usize = 64;
const INHERITABLE_KEYS: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];
const STRUCTURAL_TYPES: [&[u8]; 7] = [
    b"Catalog",
    b"Pages",
    b"Page",
    b"Outlines",
    b"Outline",
    b"XRef",
    b"ObjStm",
];
const LETTER_MEDIA_BOX: [i64; 4] = [0, 0, 612, 792];

/// Concatenates every planned document page-for-page into a fresh PDF.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfConcatenator;

impl PdfConcatenator {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl PageConcatenator for PdfConcatenator {
    fn concatenate(&self, plan: &MergePlan<'_>) -> Result<MergedArtifact, MergeError> {
        let mut pages = Vec::new();
        let mut objects = BTreeMap::new();
        let mut contributions = Vec::with_capacity(plan.entries.len());
        let mut next_id = 1;

        for entry in &plan.entries {
            let imported = import_document(entry, next_id)?;
            next_id = imported.next_id;
            contributions.push(Contribution {
                category: entry.category,
                source: entry.source,
                file_name: entry.document.name().to_string(),
                pages: imported.pages.len(),
                decrypt: imported.decrypt,
            });
            pages.extend(imported.pages);
            objects.extend(imported.objects);
        }

        let page_count = pages.len();
        let bytes = assemble(pages, objects, next_id)?;
        tracing::debug!(
            client = plan.client_key.map(|key| key.as_str()).unwrap_or("shared"),
            pages = page_count,
            documents = contributions.len(),
            "assembled merged pdf"
        );
        Ok(MergedArtifact {
            bytes,
            page_count,
            contributions,
        })
    }
}

/// Try the empty password on an encrypted document. A failure is not fatal:
/// the document is forwarded as loaded.
pub fn unlock(document: &mut Document) -> DecryptOutcome {
    if !document.is_encrypted() {
        return DecryptOutcome::NotEncrypted;
    }
    match document.decrypt("") {
        Ok(()) => DecryptOutcome::Decrypted,
        Err(err) => {
            tracing::warn!(
                error = %err,
                "empty-password decrypt failed; forwarding document as-is"
            );
            DecryptOutcome::StillEncryptedForwarded
        }
    }
}

struct ImportedDocument {
    pages: Vec<(ObjectId, Dictionary)>,
    objects: BTreeMap<ObjectId, Object>,
    decrypt: DecryptOutcome,
    next_id: u32,
}

fn import_document(entry: &PlanEntry<'_>, first_id: u32) -> Result<ImportedDocument, MergeError> {
    let unreadable = |reason: String| MergeError::UnreadableDocument {
        category: entry.category,
        name: entry.document.name().to_string(),
        reason,
    };

    let mut source = Document::load_mem(entry.document.content())
        .map_err(|err| unreadable(err.to_string()))?;
    let decrypt = unlock(&mut source);
    source.renumber_objects_with(first_id);
    let next_id = source
        .objects
        .keys()
        .map(|&(id, _)| id)
        .max()
        .map_or(first_id, |max| max + 1);

    let page_ids = source.get_pages().into_values().collect::<Vec<_>>();
    if page_ids.is_empty() {
        return Err(unreadable("document has no pages".to_string()));
    }

    let mut pages = Vec::with_capacity(page_ids.len());
    for page_id in &page_ids {
        let page = flatten_page(&source, *page_id).map_err(unreadable)?;
        pages.push((*page_id, page));
    }

    let objects = source
        .objects
        .into_iter()
        .filter(|(id, object)| !page_ids.contains(id) && !is_structural(object))
        .collect();

    Ok(ImportedDocument {
        pages,
        objects,
        decrypt,
        next_id,
    })
}

/// Copy a page dictionary with inherited attributes pulled down from its
/// ancestors, detached from the source page tree.
fn flatten_page(source: &Document, page_id: ObjectId) -> Result<Dictionary, String> {
    let mut page = source
        .get_dictionary(page_id)
        .map_err(|err| err.to_string())?
        .clone();
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    let mut depth = 0;

    while let Some(parent_id) = parent {
        depth += 1;
        if depth > MAX_TREE_DEPTH {
            return Err(format!("page tree deeper than {MAX_TREE_DEPTH} levels"));
        }
        let node = source
            .get_dictionary(parent_id)
            .map_err(|err| err.to_string())?;
        for key in INHERITABLE_KEYS {
            if !page.has(key) {
                if let Ok(value) = node.get(key) {
                    page.set(key, value.clone());
                }
            }
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }

    page.remove(b"Parent");
    if !page.has(b"MediaBox") {
        let media_box = LETTER_MEDIA_BOX
            .iter()
            .map(|value| Object::Integer(*value))
            .collect::<Vec<_>>();
        page.set("MediaBox", media_box);
    }
    Ok(page)
}

fn is_structural(object: &Object) -> bool {
    let dict = match object {
        Object::Dictionary(dict) => dict,
        Object::Stream(stream) => &stream.dict,
        _ => return false,
    };
    matches!(
        dict.get(b"Type").and_then(Object::as_name),
        Ok(name) if STRUCTURAL_TYPES.contains(&name)
    )
}

fn assemble(
    pages: Vec<(ObjectId, Dictionary)>,
    objects: BTreeMap<ObjectId, Object>,
    next_id: u32,
) -> Result<Vec<u8>, MergeError> {
    let mut output = Document::with_version(OUTPUT_VERSION);
    output.objects = objects;
    output.max_id = next_id.saturating_sub(1);

    let pages_id = output.new_object_id();
    let count = i64::try_from(pages.len())
        .map_err(|_| MergeError::Assemble("page count out of range".to_string()))?;
    let kids = pages
        .iter()
        .map(|(id, _)| Object::Reference(*id))
        .collect::<Vec<_>>();
    for (id, mut page) in pages {
        page.set("Parent", pages_id);
        output.objects.insert(id, Object::Dictionary(page));
    }
    output.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = output.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    output.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    output
        .save_to(&mut bytes)
        .map_err(|err| MergeError::Assemble(err.to_string()))?;
    Ok(bytes)
}
