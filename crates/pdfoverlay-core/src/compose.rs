//! Compositing uploaded images onto a base document
//!
//! The algorithm:
//! 1. Parse the base PDF
//! 2. Reject documents shorter than the table's minimum page count
//! 3. Append blank pages until every configured page exists
//! 4. Embed each uploaded image once, then draw it at every placement that
//!    references it, in table order
//! 5. Serialize, refusing to return an empty document

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use tracing::{debug, warn};

use crate::error::OverlayError;
use crate::pages;
use crate::placement::{Origin, PlacementTable, Rect};
use crate::xobject::ImageXObject;

/// One uploaded image file
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedImage {
    /// Filename declared by the client
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl UploadedImage {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }
}

/// Uploaded images keyed by slot name
pub type SlotImages = HashMap<String, UploadedImage>;

/// Prefix for the XObject resource names added to pages
const XOBJECT_PREFIX: &str = "OvlIm";

/// An image drawn into a rectangle
#[derive(Debug, Clone, Copy)]
struct Stamp {
    xobject_id: ObjectId,
    rect: Rect,
}

/// Draws uploads onto documents according to one placement table.
///
/// The table is shared read-only; every call works on its own document.
#[derive(Debug, Clone)]
pub struct Compositor {
    table: Arc<PlacementTable>,
}

impl Compositor {
    pub fn new(table: PlacementTable) -> Self {
        for mismatch in table.mismatches() {
            warn!(table = %table.name, "Placement mismatch: {}", mismatch);
        }
        Self {
            table: Arc::new(table),
        }
    }

    pub fn table(&self) -> &PlacementTable {
        &self.table
    }

    pub fn compose(&self, base_pdf: &[u8], images: &SlotImages) -> Result<Vec<u8>, OverlayError> {
        compose(base_pdf, images, &self.table)
    }
}

impl Default for Compositor {
    fn default() -> Self {
        Self::new(PlacementTable::standard())
    }
}

/// Draw `images` onto `base_pdf` at the rectangles configured in `table`
pub fn compose(
    base_pdf: &[u8],
    images: &SlotImages,
    table: &PlacementTable,
) -> Result<Vec<u8>, OverlayError> {
    let mut doc =
        Document::load_mem(base_pdf).map_err(|e| OverlayError::ParseError(e.to_string()))?;

    let page_count = doc.get_pages().len();
    if page_count < table.min_pages {
        return Err(OverlayError::InvalidInput(format!(
            "PDF must have at least {} pages",
            table.min_pages
        )));
    }

    let required = table.required_pages();
    if page_count < required {
        debug!(
            "Padding document from {} to {} pages",
            page_count, required
        );
        pages::append_blank_pages(&mut doc, required - page_count)?;
    }
    let page_ids = pages::page_ids(&doc);

    // Decode each upload once; placements of the same slot share the XObject.
    let mut embedded: HashMap<&str, ObjectId> = HashMap::new();
    let mut stamps: BTreeMap<usize, Vec<Stamp>> = BTreeMap::new();

    for draw in table.draws() {
        let Some(upload) = images.get(draw.source) else {
            continue;
        };

        let xobject_id = match embedded.get(draw.source) {
            Some(id) => *id,
            None => {
                let xobject = ImageXObject::decode(draw.source, &upload.bytes)?;
                debug!(
                    slot = draw.source,
                    file = %upload.file_name,
                    "Embedding {}x{} image",
                    xobject.width,
                    xobject.height
                );
                let id = xobject.embed(&mut doc);
                embedded.insert(draw.source, id);
                id
            }
        };

        debug!(
            slot = draw.slot,
            page = draw.placement.page,
            "Placing image at {}",
            draw.placement.rect
        );
        stamps.entry(draw.placement.page).or_default().push(Stamp {
            xobject_id,
            rect: draw.placement.rect,
        });
    }

    for (page, page_stamps) in &stamps {
        let page_id = page_ids.get(*page).copied().ok_or_else(|| {
            OverlayError::OperationError(format!("page {} missing after padding", page))
        })?;
        stamp_page(&mut doc, page_id, page_stamps, table.origin)?;
    }

    let mut output = Vec::new();
    doc.save_to(&mut output)
        .map_err(|e| OverlayError::OperationError(e.to_string()))?;

    if output.is_empty() {
        return Err(OverlayError::OperationError(
            "Failed to generate valid PDF".into(),
        ));
    }

    Ok(output)
}

/// Register the stamps' XObjects on the page and append a content stream
/// drawing them
fn stamp_page(
    doc: &mut Document,
    page_id: ObjectId,
    stamps: &[Stamp],
    origin: Origin,
) -> Result<(), OverlayError> {
    let media_box = pages::media_box(doc, page_id)?;
    let rotation = pages::rotation(doc, page_id)?;

    let mut resources = pages::resources(doc, page_id)?;
    let mut xobjects = match resources.get(b"XObject") {
        Ok(object) => match pages::resolve(doc, object)? {
            Object::Dictionary(dict) => dict.clone(),
            _ => Dictionary::new(),
        },
        Err(_) => Dictionary::new(),
    };

    let mut names: HashMap<ObjectId, String> = HashMap::new();
    let mut next_index = 0usize;
    for stamp in stamps {
        if names.contains_key(&stamp.xobject_id) {
            continue;
        }
        let name = loop {
            let candidate = format!("{}{}", XOBJECT_PREFIX, next_index);
            next_index += 1;
            if !xobjects.has(candidate.as_bytes()) {
                break candidate;
            }
        };
        xobjects.set(name.as_bytes(), stamp.xobject_id);
        names.insert(stamp.xobject_id, name);
    }
    resources.set("XObject", xobjects);

    let existing = pages::content_refs(doc, page_id)?;
    let wrap = !existing.is_empty();
    let balance = if wrap {
        graphics_state_balance(doc, &existing)
    } else {
        StateBalance::default()
    };

    let mut operations = Vec::with_capacity(stamps.len() * 4 + balance.open + 1);
    if wrap {
        // Close every level the page content left open, then our own q
        for _ in 0..=balance.open {
            operations.push(Operation::new("Q", vec![]));
        }
    }
    for stamp in stamps {
        let name = &names[&stamp.xobject_id];
        let matrix = placement_matrix(stamp.rect, origin, media_box, rotation);
        operations.push(Operation::new("q", vec![]));
        operations.push(Operation::new(
            "cm",
            matrix.iter().map(|v| Object::Real(*v as f32)).collect(),
        ));
        operations.push(Operation::new(
            "Do",
            vec![Object::Name(name.as_bytes().to_vec())],
        ));
        operations.push(Operation::new("Q", vec![]));
    }

    // Leading newline keeps the operators separate from the previous stream
    let mut overlay = b"\n".to_vec();
    overlay.extend(
        Content { operations }
            .encode()
            .map_err(|e| OverlayError::OperationError(e.to_string()))?,
    );
    let overlay_id = doc.add_object(Stream::new(Dictionary::new(), overlay));

    let mut contents = Vec::with_capacity(existing.len() + 2);
    if wrap {
        // One q for us plus one for every unmatched Q in the page content
        let save = "q\n".repeat(balance.unmatched_restores + 1).into_bytes();
        let save_id = doc.add_object(Stream::new(Dictionary::new(), save));
        contents.push(Object::Reference(save_id));
        contents.extend(existing);
    }
    contents.push(Object::Reference(overlay_id));

    let page = doc
        .get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(|e| OverlayError::OperationError(e.to_string()))?;
    page.set("Resources", resources);
    page.set("Contents", Object::Array(contents));

    Ok(())
}

/// The `cm` matrix mapping the image's unit square onto `rect`.
///
/// Top-left rectangles are measured on the page as displayed, so `/Rotate`
/// is undone and the image stays upright. Bottom-left rectangles are raw
/// user space.
fn placement_matrix(rect: Rect, origin: Origin, media_box: [f64; 4], rotation: u16) -> [f64; 6] {
    let (w, h) = (rect.width(), rect.height());
    if origin == Origin::BottomLeft {
        return [w, 0.0, 0.0, h, rect.x1, rect.y1];
    }

    let [llx, lly, urx, ury] = media_box;
    let (width, height) = (urx - llx, ury - lly);
    let shown_height = if rotation % 180 == 0 { height } else { width };
    let (u, v) = (rect.x1, shown_height - rect.y2);

    // Displayed (bottom-left origin) to user space
    let [a, b, c, d, e, f] = match rotation {
        90 => [0.0, 1.0, -1.0, 0.0, width, 0.0],
        180 => [-1.0, 0.0, 0.0, -1.0, width, height],
        270 => [0.0, -1.0, 1.0, 0.0, 0.0, height],
        _ => [1.0, 0.0, 0.0, 1.0, 0.0, 0.0],
    };
    [
        w * a,
        w * b,
        h * c,
        h * d,
        u * a + v * c + e + llx,
        u * b + v * d + f + lly,
    ]
}

/// Unmatched graphics state operators in a page's existing content
#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct StateBalance {
    /// `q` left open at the end of the content
    open: usize,
    /// `Q` with no matching `q`
    unmatched_restores: usize,
}

fn graphics_state_balance(doc: &Document, contents: &[Object]) -> StateBalance {
    let mut bytes = Vec::new();
    for object in contents {
        if let Ok(Object::Stream(stream)) = pages::resolve(doc, object) {
            match stream.decompressed_content() {
                Ok(decoded) => bytes.extend(decoded),
                Err(_) => bytes.extend_from_slice(&stream.content),
            }
            bytes.push(b'\n');
        }
    }

    let content = match Content::decode(&bytes) {
        Ok(content) => content,
        Err(e) => {
            warn!("Could not decode page content, assuming balanced q/Q: {}", e);
            return StateBalance::default();
        }
    };

    let mut balance = StateBalance::default();
    for op in &content.operations {
        match op.operator.as_str() {
            "q" => balance.open += 1,
            "Q" if balance.open > 0 => balance.open -= 1,
            "Q" => balance.unmatched_restores += 1,
            _ => {}
        }
    }
    if balance != StateBalance::default() {
        debug!(
            open = balance.open,
            unmatched = balance.unmatched_restores,
            "Unbalanced page content"
        );
    }
    balance
}
