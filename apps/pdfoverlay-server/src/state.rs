//! Application state for the overlay server

use std::path::{Path, PathBuf};
use std::sync::Arc;

use pdfoverlay_core::{Compositor, PlacementTable};

/// Shared, read-only request context
#[derive(Clone)]
pub struct AppState {
    pub compositor: Arc<Compositor>,
    /// Parent of the per-request scratch directories
    pub scratch_root: Arc<PathBuf>,
}

impl AppState {
    /// Build the state, creating `scratch_root` if needed
    pub fn new(table: PlacementTable, scratch_root: &Path) -> std::io::Result<Self> {
        std::fs::create_dir_all(scratch_root)?;
        tracing::info!(
            "Placement table '{}': {} slot(s), minimum {} page(s), padded to {}",
            table.name,
            table.slots.len(),
            table.min_pages,
            table.required_pages()
        );

        Ok(Self {
            compositor: Arc::new(Compositor::new(table)),
            scratch_root: Arc::new(scratch_root.to_path_buf()),
        })
    }
}

/// Default location for scratch directories
pub fn default_scratch_root() -> PathBuf {
    std::env::temp_dir().join("pdfoverlay")
}
