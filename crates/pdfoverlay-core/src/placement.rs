//! Placement tables
//!
//! A placement table maps image slots ("photo", "signature", ...) to the
//! rectangles where their uploads are drawn. Tables are static configuration:
//! either the built-in [`PlacementTable::standard`] layout or a JSON file.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::OverlayError;

/// Placements must target a page below this index
pub const MAX_PAGES: usize = 1000;

/// Axis-aligned rectangle stored as two corners.
///
/// Accepts `[x1, y1, x2, y2]`, `{"x1", "y1", "x2", "y2"}` or
/// `{"x", "y", "width", "height"}` when deserialized, and always
/// serializes as the four-element array.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(from = "RectRepr", into = "[f64; 4]")]
pub struct Rect {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl Rect {
    pub const fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Build from an origin and a size
    pub fn from_origin_size(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self::new(x, y, x + width, y + height)
    }

    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    fn is_drawable(&self) -> bool {
        [self.x1, self.y1, self.x2, self.y2]
            .iter()
            .all(|v| v.is_finite())
            && self.x2 > self.x1
            && self.y2 > self.y1
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})-({}, {})", self.x1, self.y1, self.x2, self.y2)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RectRepr {
    Corners([f64; 4]),
    Named {
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
    },
    Sized {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    },
}

impl From<RectRepr> for Rect {
    fn from(repr: RectRepr) -> Self {
        match repr {
            RectRepr::Corners([x1, y1, x2, y2]) => Rect::new(x1, y1, x2, y2),
            RectRepr::Named { x1, y1, x2, y2 } => Rect::new(x1, y1, x2, y2),
            RectRepr::Sized {
                x,
                y,
                width,
                height,
            } => Rect::from_origin_size(x, y, width, height),
        }
    }
}

impl From<Rect> for [f64; 4] {
    fn from(rect: Rect) -> Self {
        [rect.x1, rect.y1, rect.x2, rect.y2]
    }
}

/// Where rectangle coordinates are measured from.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Origin {
    /// Top-left corner of the page's MediaBox, y growing downward.
    #[default]
    TopLeft,
    /// PDF user space, y growing upward.
    BottomLeft,
}

/// One rectangle on one page where a slot's image is drawn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Placement {
    /// 0-based page index
    pub page: usize,
    pub rect: Rect,
    /// Draw this other slot's upload instead of the owning slot's.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl Placement {
    pub fn new(page: usize, rect: Rect) -> Self {
        Self {
            page,
            rect,
            image: None,
        }
    }

    /// Draw `slot`'s upload at this placement.
    pub fn drawing(mut self, slot: impl Into<String>) -> Self {
        self.image = Some(slot.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlacementSlot {
    pub slot: String,
    #[serde(default)]
    pub placements: Vec<Placement>,
}

impl PlacementSlot {
    pub fn new(slot: impl Into<String>, placements: Vec<Placement>) -> Self {
        Self {
            slot: slot.into(),
            placements,
        }
    }
}

/// A placement whose owning slot and drawn image differ.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub slot: String,
    pub image: String,
    pub page: usize,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "placement under slot '{}' on page {} draws the '{}' upload",
            self.slot, self.page, self.image
        )
    }
}

/// A single draw instruction, in table order.
#[derive(Debug, Clone, Copy)]
pub struct Draw<'a> {
    /// Slot the placement is filed under
    pub slot: &'a str,
    /// Slot whose upload is drawn
    pub source: &'a str,
    pub placement: &'a Placement,
}

fn default_min_pages() -> usize {
    2
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlacementTable {
    pub name: String,
    /// Base documents with fewer pages are rejected
    #[serde(default = "default_min_pages")]
    pub min_pages: usize,
    #[serde(default)]
    pub origin: Origin,
    pub slots: Vec<PlacementSlot>,
}

impl PlacementTable {
    /// The layout used by the identity-document form: photo and signature on
    /// the first page, a second signature on page two, and the ID cards on a
    /// third page that is appended when the template lacks one.
    pub fn standard() -> Self {
        Self {
            name: "standard".to_string(),
            min_pages: 2,
            origin: Origin::TopLeft,
            slots: vec![
                PlacementSlot::new(
                    "photo",
                    vec![Placement::new(0, Rect::new(100.0, 150.0, 200.0, 250.0))],
                ),
                PlacementSlot::new(
                    "signature",
                    vec![
                        Placement::new(0, Rect::new(100.0, 250.0, 200.0, 290.0)),
                        Placement::new(1, Rect::new(100.0, 300.0, 200.0, 340.0)),
                    ],
                ),
                PlacementSlot::new(
                    "aadhar_front",
                    vec![Placement::new(2, Rect::new(50.0, 50.0, 200.0, 200.0))],
                ),
                PlacementSlot::new(
                    "aadhar_back",
                    vec![Placement::new(2, Rect::new(250.0, 50.0, 400.0, 200.0))],
                ),
                PlacementSlot::new(
                    "pan",
                    vec![Placement::new(2, Rect::new(450.0, 50.0, 600.0, 200.0))],
                ),
            ],
        }
    }

    /// Parse and validate a JSON table
    pub fn from_json(json: &str) -> Result<Self, OverlayError> {
        let table: PlacementTable = serde_json::from_str(json)
            .map_err(|e| OverlayError::InvalidTable(e.to_string()))?;
        table.validate()?;
        Ok(table)
    }

    /// Read a JSON table from disk
    pub fn load(path: &Path) -> Result<Self, OverlayError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String, OverlayError> {
        serde_json::to_string_pretty(self).map_err(|e| OverlayError::InvalidTable(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), OverlayError> {
        if self.name.trim().is_empty() {
            return Err(OverlayError::InvalidTable("table name is empty".into()));
        }

        let mut seen = HashSet::new();
        for slot in &self.slots {
            if slot.slot.trim().is_empty() {
                return Err(OverlayError::InvalidTable("slot name is empty".into()));
            }
            if slot.slot == "pdf" {
                return Err(OverlayError::InvalidTable(
                    "'pdf' is reserved for the base document".into(),
                ));
            }
            if !seen.insert(slot.slot.as_str()) {
                return Err(OverlayError::InvalidTable(format!(
                    "slot '{}' is listed more than once",
                    slot.slot
                )));
            }

            for placement in &slot.placements {
                if placement.page >= MAX_PAGES {
                    return Err(OverlayError::InvalidTable(format!(
                        "slot '{}' page {}: page index must be below {}",
                        slot.slot, placement.page, MAX_PAGES
                    )));
                }
                if !placement.rect.is_drawable() {
                    return Err(OverlayError::InvalidTable(format!(
                        "slot '{}' page {}: rectangle {} has no drawable area",
                        slot.slot, placement.page, placement.rect
                    )));
                }
                if let Some(image) = &placement.image {
                    if image.trim().is_empty() || image == "pdf" {
                        return Err(OverlayError::InvalidTable(format!(
                            "slot '{}' page {}: invalid image override '{}'",
                            slot.slot, placement.page, image
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    /// Page count the document is padded to before drawing
    pub fn required_pages(&self) -> usize {
        self.draws()
            .map(|draw| draw.placement.page.saturating_add(1))
            .max()
            .unwrap_or(0)
    }

    /// Every upload field name the table draws from
    pub fn slot_names(&self) -> BTreeSet<&str> {
        self.draws()
            .map(|draw| draw.source)
            .chain(self.slots.iter().map(|slot| slot.slot.as_str()))
            .collect()
    }

    pub fn accepts(&self, field: &str) -> bool {
        self.slot_names().contains(field)
    }

    /// Placements that draw a different slot's upload than the one they are
    /// filed under
    pub fn mismatches(&self) -> Vec<Mismatch> {
        self.draws()
            .filter(|draw| draw.slot != draw.source)
            .map(|draw| Mismatch {
                slot: draw.slot.to_string(),
                image: draw.source.to_string(),
                page: draw.placement.page,
            })
            .collect()
    }

    /// All placements in table order
    pub fn draws(&self) -> impl Iterator<Item = Draw<'_>> {
        self.slots.iter().flat_map(|slot| {
            slot.placements.iter().map(move |placement| Draw {
                slot: slot.slot.as_str(),
                source: placement.image.as_deref().unwrap_or(slot.slot.as_str()),
                placement,
            })
        })
    }
}

impl Default for PlacementTable {
    fn default() -> Self {
        Self::standard()
    }
}
