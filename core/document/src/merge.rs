//! Page-sequence concatenation of PDF documents.

use lopdf::{dictionary, Document, Object, ObjectId};

use drivemerge_common::{Error, Result};

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE_KEYS: [&[u8]; 4] = [b"MediaBox", b"CropBox", b"Resources", b"Rotate"];

/// Guard against malformed page trees whose parent links loop.
const MAX_TREE_DEPTH: usize = 64;

/// Concatenate the pages of every input document, in order, into one new PDF.
///
/// # Postconditions
/// - The output holds `sum(pages_i)` pages
/// - Pages keep their relative order within and across inputs
/// - An empty input yields a valid zero-page document
///
/// # Errors
/// - `Parse` if any input is not a readable PDF; nothing is produced
pub fn merge<I, B>(buffers: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = B>,
    B: AsRef<[u8]>,
{
    let mut merged = Document::with_version("1.5");
    let pages_id = merged.new_object_id();
    let mut kids: Vec<ObjectId> = Vec::new();

    for (index, buffer) in buffers.into_iter().enumerate() {
        let mut source = Document::load_mem(buffer.as_ref()).map_err(|e| {
            Error::Parse(format!("Document {} is not a valid PDF: {}", index + 1, e))
        })?;

        source.renumber_objects_with(merged.max_id + 1);
        let pages: Vec<ObjectId> = source.get_pages().into_values().collect();

        let inherited: Vec<(ObjectId, Vec<(&[u8], Object)>)> = pages
            .iter()
            .map(|&page_id| (page_id, inherited_attributes(&source, page_id)))
            .collect();

        merged.max_id = merged.max_id.max(source.max_id);
        merged.objects.extend(source.objects);

        for (page_id, attributes) in inherited {
            let page = merged
                .objects
                .get_mut(&page_id)
                .and_then(|object| object.as_dict_mut().ok())
                .ok_or_else(|| {
                    Error::Parse(format!(
                        "Document {} has a page that is not a dictionary",
                        index + 1
                    ))
                })?;

            for (key, value) in attributes {
                page.set(key, value);
            }
            page.set("Parent", pages_id);
        }

        tracing::debug!("Appended {} pages from document {}", pages.len(), index + 1);
        kids.extend(pages);
    }

    let count = kids.len();
    merged.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids.into_iter().map(Object::Reference).collect::<Vec<_>>(),
            "Count" => count as i64,
        }),
    );

    let catalog_id = merged.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    merged.trailer.set("Root", catalog_id);

    // Source catalogs and page-tree nodes are no longer reachable.
    merged.prune_objects();

    let mut output = Vec::new();
    merged
        .save_to(&mut output)
        .map_err(|e| Error::Parse(format!("Failed to write merged document: {}", e)))?;

    tracing::info!("Merged {} pages", count);
    Ok(output)
}

/// Number of pages in a PDF.
pub fn page_count(buffer: &[u8]) -> Result<usize> {
    let document = Document::load_mem(buffer)
        .map_err(|e| Error::Parse(format!("Not a valid PDF: {}", e)))?;
    Ok(document.get_pages().len())
}

/// Attributes the page lacks but an ancestor page-tree node defines.
///
/// The nearest ancestor wins, as in the PDF page tree.
fn inherited_attributes(document: &Document, page_id: ObjectId) -> Vec<(&'static [u8], Object)> {
    let Ok(page) = document.get_dictionary(page_id) else {
        return Vec::new();
    };

    let mut missing: Vec<&'static [u8]> = INHERITABLE_KEYS
        .iter()
        .copied()
        .filter(|key| !page.has(key))
        .collect();
    let mut found = Vec::new();
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();

    for _ in 0..MAX_TREE_DEPTH {
        if missing.is_empty() {
            break;
        }
        let Some(node) = parent.and_then(|id| document.get_dictionary(id).ok()) else {
            break;
        };

        missing.retain(|key| match node.get(key) {
            Ok(value) => {
                found.push((*key, value.clone()));
                false
            }
            Err(_) => true,
        });
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }

    found
}
