//! API handlers for the overlay server
//!
//! Provides endpoints for:
//! - Liveness and health checks
//! - The active placement table
//! - Compositing uploaded images onto a PDF template

use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use pdfoverlay_core::{PlacementTable, SlotImages, UploadedImage};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::ApiError;
use crate::scratch::{ScratchSpace, RESULT_FILE_NAME};
use crate::state::AppState;

/// Multipart field carrying the base document
const PDF_FIELD: &str = "pdf";

/// Handler: GET /
pub async fn handle_home() -> (StatusCode, &'static str) {
    (StatusCode::OK, "PDF Editor Backend is Running!")
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Handler: GET /health
pub async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "pdfoverlay-server",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Handler: GET /placement-table
pub async fn handle_placement_table(State(state): State<AppState>) -> Json<PlacementTable> {
    Json(state.compositor.table().clone())
}

/// Handler: POST /process-pdf
///
/// Reads the `pdf` field and any image fields the placement table knows,
/// composites them, and returns the result as a PDF attachment.
pub async fn handle_process_pdf(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let multipart = multipart.map_err(|e| ApiError::Upload(e.body_text()))?;

    let scratch = ScratchSpace::create(&state.scratch_root)?;
    let request_id = scratch.id();
    info!(%request_id, "Processing PDF upload");

    let body = process_upload(&state, &scratch, multipart).await?;

    info!(%request_id, bytes = body.len(), "PDF processed");

    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", RESULT_FILE_NAME),
            ),
        ],
        body,
    )
        .into_response())
}

/// Save the uploads into `scratch`, composite them, and return the result
/// as written to `scratch`
pub(crate) async fn process_upload(
    state: &AppState,
    scratch: &ScratchSpace,
    mut multipart: Multipart,
) -> Result<Vec<u8>, ApiError> {
    let request_id = scratch.id();
    let mut base_pdf: Option<Vec<u8>> = None;
    let mut images = SlotImages::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Upload(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().unwrap_or_default().to_string();

        let is_pdf = name == PDF_FIELD;
        if !is_pdf && !state.compositor.table().accepts(&name) {
            debug!(%request_id, field = %name, "Ignoring unknown field");
            continue;
        }

        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::Upload(e.body_text()))?;

        if is_pdf {
            scratch.save_upload(&name, &file_name, &bytes).await?;
            base_pdf = Some(bytes.to_vec());
            continue;
        }

        // Browsers send an empty part for "no file chosen"
        if file_name.is_empty() || bytes.is_empty() {
            debug!(%request_id, slot = %name, "Empty image field");
            continue;
        }

        scratch.save_upload(&name, &file_name, &bytes).await?;
        debug!(%request_id, slot = %name, file = %file_name, size = bytes.len(), "Image received");
        images.insert(name, UploadedImage::new(file_name, bytes.to_vec()));
    }

    let base_pdf = base_pdf.ok_or_else(|| ApiError::InputMissing("PDF file is missing".into()))?;

    let compositor = state.compositor.clone();
    let output = tokio::task::spawn_blocking(move || compositor.compose(&base_pdf, &images))
        .await
        .map_err(|e| ApiError::Processing(format!("Compose task panicked: {}", e)))??;

    let size = scratch.write_result(&output).await?;
    if size == 0 {
        return Err(ApiError::Processing("Failed to generate valid PDF".into()));
    }
    Ok(tokio::fs::read(scratch.result_path()).await?)
}
