//! Router-level tests for the overlay server
//!
//! Requests are driven through the real router with `tower::ServiceExt`,
//! using PDFs and images from the core crate's fixtures.

use std::path::Path;

use axum::{
    body::Body,
    extract::{FromRequest, Multipart},
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use image::Rgba;
use pdfoverlay_core::{fixtures, PlacementTable};
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use tower::ServiceExt;

use crate::api::process_upload;
use crate::build_router;
use crate::scratch::ScratchSpace;
use crate::state::AppState;

const BOUNDARY: &str = "pdfoverlay-test-boundary";
const MAX_UPLOAD: usize = 5 * 1024 * 1024;

/// One multipart part: field name, file name, bytes
type Part<'a> = (&'a str, &'a str, Vec<u8>);

fn app(scratch: &Path) -> Router {
    let state = AppState::new(PlacementTable::standard(), scratch).unwrap();
    build_router(state, MAX_UPLOAD)
}

fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, file_name, bytes) in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                name, file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn upload_request(parts: &[Part<'_>]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/process-pdf")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

fn png() -> Vec<u8> {
    fixtures::png(50, 50, Rgba([0, 128, 0, 255]))
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

async fn error_message(response: axum::response::Response) -> String {
    let json: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    json["error"].as_str().unwrap().to_string()
}

fn page_count(pdf: &[u8]) -> usize {
    lopdf::Document::load_mem(pdf).unwrap().get_pages().len()
}

fn is_empty_dir(path: &Path) -> bool {
    std::fs::read_dir(path).unwrap().next().is_none()
}

#[tokio::test]
async fn test_home_is_alive() {
    let scratch = TempDir::new().unwrap();
    let response = app(scratch.path())
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"PDF Editor Backend is Running!");
}

#[tokio::test]
async fn test_health() {
    let scratch = TempDir::new().unwrap();
    let response = app(scratch.path())
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(json["status"], "healthy");
}

#[tokio::test]
async fn test_placement_table_endpoint() {
    let scratch = TempDir::new().unwrap();
    let response = app(scratch.path())
        .oneshot(Request::get("/placement-table").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let table: PlacementTable = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(table, PlacementTable::standard());
}

#[tokio::test]
async fn test_process_pdf_success() {
    let scratch = TempDir::new().unwrap();
    let request = upload_request(&[
        ("pdf", "template.pdf", fixtures::blank_pdf(2)),
        ("photo", "photo.png", png()),
        ("signature", "sig.png", png()),
        ("aadhar_front", "front.png", png()),
    ]);

    let response = app(scratch.path()).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/pdf"
    );
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"edited.pdf\""
    );

    let pdf = body_bytes(response).await;
    assert!(pdf.starts_with(b"%PDF-"));
    assert_eq!(page_count(&pdf), 3);
    assert!(is_empty_dir(scratch.path()), "scratch directory left behind");
}

#[tokio::test]
async fn test_process_pdf_without_images_pads_document() {
    let scratch = TempDir::new().unwrap();
    let request = upload_request(&[("pdf", "template.pdf", fixtures::blank_pdf(2))]);

    let response = app(scratch.path()).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(page_count(&body_bytes(response).await), 3);
}

#[tokio::test]
async fn test_missing_pdf_is_bad_request() {
    let scratch = TempDir::new().unwrap();
    let request = upload_request(&[("photo", "photo.png", png())]);

    let response = app(scratch.path()).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_message(response).await, "PDF file is missing");
    assert!(is_empty_dir(scratch.path()));
}

#[tokio::test]
async fn test_single_page_pdf_is_bad_request() {
    let scratch = TempDir::new().unwrap();
    let request = upload_request(&[
        ("pdf", "short.pdf", fixtures::blank_pdf(1)),
        ("photo", "photo.png", png()),
    ]);

    let response = app(scratch.path()).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_message(response).await, "PDF must have at least 2 pages");
    assert!(is_empty_dir(scratch.path()));
}

#[tokio::test]
async fn test_rejected_pdf_writes_no_result() {
    let root = TempDir::new().unwrap();
    let state = AppState::new(PlacementTable::standard(), root.path()).unwrap();
    let scratch = ScratchSpace::create(root.path()).unwrap();
    let request = upload_request(&[
        ("pdf", "short.pdf", fixtures::blank_pdf(1)),
        ("photo", "photo.png", png()),
    ]);
    let multipart = Multipart::from_request(request, &()).await.unwrap();

    let err = process_upload(&state, &scratch, multipart).await.unwrap_err();

    assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    assert!(scratch.path().join("uploads").join("pdf-short.pdf").exists());
    assert!(!scratch.result_path().exists());
}

#[tokio::test]
async fn test_accepted_pdf_is_served_from_result_file() {
    let root = TempDir::new().unwrap();
    let state = AppState::new(PlacementTable::standard(), root.path()).unwrap();
    let scratch = ScratchSpace::create(root.path()).unwrap();
    let request = upload_request(&[("pdf", "template.pdf", fixtures::blank_pdf(2))]);
    let multipart = Multipart::from_request(request, &()).await.unwrap();

    let body = process_upload(&state, &scratch, multipart).await.unwrap();

    assert_eq!(std::fs::read(scratch.result_path()).unwrap(), body);
    assert_eq!(page_count(&body), 3);
}

#[tokio::test]
async fn test_malformed_pdf_is_server_error() {
    let scratch = TempDir::new().unwrap();
    let request = upload_request(&[("pdf", "broken.pdf", b"not a pdf at all".to_vec())]);

    let response = app(scratch.path()).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(error_message(response).await.contains("Failed to parse PDF"));
}

#[tokio::test]
async fn test_malformed_image_is_server_error() {
    let scratch = TempDir::new().unwrap();
    let request = upload_request(&[
        ("pdf", "template.pdf", fixtures::blank_pdf(2)),
        ("signature", "sig.png", b"scribble".to_vec()),
    ]);

    let response = app(scratch.path()).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(error_message(response).await.contains("signature"));
    assert!(is_empty_dir(scratch.path()));
}

#[tokio::test]
async fn test_empty_and_unknown_fields_are_ignored() {
    let scratch = TempDir::new().unwrap();
    let request = upload_request(&[
        ("pdf", "template.pdf", fixtures::blank_pdf(2)),
        // "No file chosen" in a browser form
        ("photo", "", Vec::new()),
        ("selfie", "selfie.png", b"not even an image".to_vec()),
    ]);

    let response = app(scratch.path()).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(page_count(&body_bytes(response).await), 3);
}

#[tokio::test]
async fn test_non_multipart_body_is_bad_request() {
    let scratch = TempDir::new().unwrap();
    let request = Request::post("/process-pdf")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();

    let response = app(scratch.path()).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(error_message(response).await.starts_with("Invalid upload"));
}

#[tokio::test]
async fn test_concurrent_requests_do_not_share_results() {
    let scratch = TempDir::new().unwrap();
    let router = app(scratch.path());

    let short = upload_request(&[
        ("pdf", "same-name.pdf", fixtures::blank_pdf(2)),
        ("photo", "same-name.png", png()),
    ]);
    let long = upload_request(&[
        ("pdf", "same-name.pdf", fixtures::blank_pdf(6)),
        ("photo", "same-name.png", png()),
    ]);

    let (short, long) = tokio::join!(
        tokio::spawn(router.clone().oneshot(short)),
        tokio::spawn(router.clone().oneshot(long)),
    );
    let short = short.unwrap().unwrap();
    let long = long.unwrap().unwrap();

    assert_eq!(short.status(), StatusCode::OK);
    assert_eq!(long.status(), StatusCode::OK);
    assert_eq!(page_count(&body_bytes(short).await), 3);
    assert_eq!(page_count(&body_bytes(long).await), 6);
    assert!(is_empty_dir(scratch.path()));
}
