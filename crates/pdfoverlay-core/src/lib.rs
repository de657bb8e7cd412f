//! Identity-document overlay for PDF templates
//!
//! Draws uploaded images (photo, signature, ID-card scans, ...) into fixed
//! rectangles on the pages of a PDF template, using lopdf.
//!
//! - [`PlacementTable`]: which slot goes where, as static configuration
//! - [`compose`] / [`Compositor`]: applies a table to one document
//! - [`ImageXObject`]: converts an uploaded image into a PDF image object

pub mod compose;
pub mod error;
pub mod pages;
pub mod placement;
pub mod xobject;

#[cfg(any(test, feature = "test-fixtures"))]
pub mod fixtures;

pub use compose::{compose, Compositor, SlotImages, UploadedImage};
pub use error::OverlayError;
pub use placement::{
    Mismatch, Origin, Placement, PlacementSlot, PlacementTable, Rect, MAX_PAGES,
};
pub use xobject::ImageXObject;

/// Parse PDF bytes and return page count
pub fn get_page_count(bytes: &[u8]) -> Result<u32, OverlayError> {
    let doc =
        lopdf::Document::load_mem(bytes).map_err(|e| OverlayError::ParseError(e.to_string()))?;
    Ok(doc.get_pages().len() as u32)
}
