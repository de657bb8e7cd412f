//! Page tree helpers

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};

use crate::error::OverlayError;

/// Size of pages appended to short documents (A4, in points)
pub const BLANK_PAGE_WIDTH: f64 = 595.0;
pub const BLANK_PAGE_HEIGHT: f64 = 842.0;

/// MediaBox assumed when neither the page nor its ancestors declare one
const DEFAULT_MEDIA_BOX: [f64; 4] = [0.0, 0.0, 612.0, 792.0];

/// Inheritance chains deeper than this are treated as broken
const MAX_TREE_DEPTH: usize = 64;

fn op_err(e: lopdf::Error) -> OverlayError {
    OverlayError::OperationError(e.to_string())
}

/// Page ids in document order
pub fn page_ids(doc: &Document) -> Vec<ObjectId> {
    doc.get_pages().into_values().collect()
}

/// Follow references until a direct object is reached
pub(crate) fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Result<&'a Object, OverlayError> {
    let mut current = object;
    for _ in 0..MAX_TREE_DEPTH {
        match current {
            Object::Reference(id) => current = doc.get_object(*id).map_err(op_err)?,
            other => return Ok(other),
        }
    }
    Err(OverlayError::OperationError(
        "reference chain too deep".to_string(),
    ))
}

fn number(object: &Object) -> Option<f64> {
    match object {
        Object::Integer(v) => Some(*v as f64),
        Object::Real(v) => Some(*v as f64),
        _ => None,
    }
}

/// Look up `key` on the page, walking up `Parent` links for inheritable
/// attributes
fn inherited<'a>(
    doc: &'a Document,
    page_id: ObjectId,
    key: &[u8],
) -> Result<Option<&'a Object>, OverlayError> {
    let mut node_id = page_id;
    for _ in 0..MAX_TREE_DEPTH {
        let node = doc
            .get_object(node_id)
            .and_then(Object::as_dict)
            .map_err(op_err)?;
        if let Ok(value) = node.get(key) {
            return resolve(doc, value).map(Some);
        }
        match node.get(b"Parent").and_then(Object::as_reference) {
            Ok(parent) => node_id = parent,
            Err(_) => return Ok(None),
        }
    }
    Err(OverlayError::OperationError(
        "page tree too deep".to_string(),
    ))
}

/// The page's MediaBox as `[llx, lly, urx, ury]`, normalized so that
/// `llx < urx` and `lly < ury`
pub fn media_box(doc: &Document, page_id: ObjectId) -> Result<[f64; 4], OverlayError> {
    let Some(Object::Array(values)) = inherited(doc, page_id, b"MediaBox")? else {
        return Ok(DEFAULT_MEDIA_BOX);
    };

    let mut coords = Vec::with_capacity(4);
    for value in values {
        coords.push(resolve(doc, value).ok().and_then(number));
    }
    match coords.as_slice() {
        [Some(a), Some(b), Some(c), Some(d)] => {
            Ok([a.min(*c), b.min(*d), a.max(*c), b.max(*d)])
        }
        _ => Ok(DEFAULT_MEDIA_BOX),
    }
}

/// The page's `/Rotate`, normalized to 0, 90, 180 or 270
pub fn rotation(doc: &Document, page_id: ObjectId) -> Result<u16, OverlayError> {
    let degrees = match inherited(doc, page_id, b"Rotate")? {
        Some(Object::Integer(v)) => *v,
        Some(Object::Real(v)) => *v as i64,
        _ => 0,
    };
    match degrees.rem_euclid(360) {
        r @ (0 | 90 | 180 | 270) => Ok(r as u16),
        other => {
            tracing::warn!(rotate = other, "Ignoring /Rotate that is not a multiple of 90");
            Ok(0)
        }
    }
}

/// A private copy of the page's effective resource dictionary
pub fn resources(doc: &Document, page_id: ObjectId) -> Result<Dictionary, OverlayError> {
    match inherited(doc, page_id, b"Resources")? {
        Some(Object::Dictionary(dict)) => Ok(dict.clone()),
        _ => Ok(Dictionary::new()),
    }
}

/// Content stream references of the page, in order. A direct content
/// stream is moved into its own object so it can be referenced.
pub fn content_refs(doc: &mut Document, page_id: ObjectId) -> Result<Vec<Object>, OverlayError> {
    let contents = doc
        .get_object(page_id)
        .and_then(Object::as_dict)
        .map_err(op_err)?
        .get(b"Contents")
        .ok()
        .cloned();

    match contents {
        Some(Object::Array(items)) => Ok(items),
        Some(Object::Reference(id)) => match doc.get_object(id).map_err(op_err)? {
            // An indirect array of streams
            Object::Array(items) => Ok(items.clone()),
            _ => Ok(vec![Object::Reference(id)]),
        },
        Some(Object::Stream(stream)) => Ok(vec![Object::Reference(doc.add_object(stream))]),
        _ => Ok(Vec::new()),
    }
}

/// Append `count` blank A4 pages to the end of the document
pub fn append_blank_pages(doc: &mut Document, count: usize) -> Result<(), OverlayError> {
    if count == 0 {
        return Ok(());
    }

    let pages_id = doc
        .trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .and_then(|root| doc.get_object(root))
        .and_then(Object::as_dict)
        .and_then(|catalog| catalog.get(b"Pages"))
        .and_then(Object::as_reference)
        .map_err(op_err)?;

    let mut new_pages = Vec::with_capacity(count);
    for _ in 0..count {
        let contents_id = doc.add_object(Stream::new(Dictionary::new(), Vec::new()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![
                0.into(),
                0.into(),
                Object::Real(BLANK_PAGE_WIDTH as f32),
                Object::Real(BLANK_PAGE_HEIGHT as f32),
            ],
            "Resources" => Dictionary::new(),
            "Contents" => contents_id,
        });
        new_pages.push(Object::Reference(page_id));
    }

    let pages = doc
        .get_object_mut(pages_id)
        .and_then(Object::as_dict_mut)
        .map_err(op_err)?;

    let existing = pages.get(b"Count").and_then(Object::as_i64).unwrap_or(0);
    pages.set("Count", existing + count as i64);

    let kids_id = match pages.get_mut(b"Kids") {
        Ok(Object::Array(kids)) => {
            kids.extend(new_pages);
            return Ok(());
        }
        Ok(Object::Reference(id)) => *id,
        _ => {
            pages.set("Kids", Object::Array(new_pages));
            return Ok(());
        }
    };

    // Kids stored as an indirect array
    doc.get_object_mut(kids_id)
        .and_then(Object::as_array_mut)
        .map_err(op_err)?
        .extend(new_pages);
    Ok(())
}
