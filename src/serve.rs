use axum::{
    extract::rejection::JsonRejection,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use log::{error, warn};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc as StdArc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::exporter::ClipExporter;
use crate::pdf::extract_pdf_text;
use crate::regions::{self, SaveRegionRequest};
use crate::uploads;

const INDEX_HTML: &str = include_str!("../assets/index.html");
const AUDIO_VIEW_HTML: &str = include_str!("../assets/audio_view.html");

/// Uploads can be full-length recordings; the framework default of 2 MB is
/// far too small for them.
const MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;

// State for the annotation server handlers
pub struct AppState {
    pub config: Config,
    pub exporter: Box<dyn ClipExporter>,
}

/// Run the annotation web server
pub fn serve(
    config: Config,
    exporter: Box<dyn ClipExporter>,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("Upload directory: {}", config.upload_dir.display());
    println!("Fragments directory: {}", config.fragments_dir.display());
    println!("Listening on: http://[::]:{} (IPv4 + IPv6)", config.port);
    println!("Endpoints:");
    println!("  GET  /  - Upload form");
    println!("  POST /  - Upload audio (+ optional PDF transcript)");
    println!("  GET  /audio_view?audio_filename=<f>&pdf_filename=<f>  - Playback page");
    println!("  GET  /uploads/<filename>  - Uploaded file (range-enabled)");
    println!("  GET  /fragments/<filename>  - Exported fragment or sidecar");
    println!("  POST /save_region  - Export a region and persist its metadata");
    println!("  GET  /get_saved_regions?audio_filename=<f>  - Saved regions for an asset");
    println!("  GET  /get_fragment_data?filename=<f>  - Metadata for one fragment");
    println!("  GET  /health  - Health check");

    let port = config.port;

    // Create tokio runtime and run server
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let app_state = StdArc::new(AppState { config, exporter });

        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        let app = Router::new()
            .route("/", get(index_handler).post(upload_handler))
            .route("/health", get(health_handler))
            .route("/audio_view", get(audio_view_handler))
            .route("/uploads/{filename}", get(uploaded_file_handler))
            .route("/fragments/{filename}", get(fragment_file_handler))
            .route("/save_region", post(save_region_handler))
            .route("/get_saved_regions", get(get_saved_regions_handler))
            .route("/get_fragment_data", get(get_fragment_data_handler))
            .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
            .layer(cors)
            .with_state(app_state);

        let listener = tokio::net::TcpListener::bind(format!("[::]:{}", port))
            .await
            .map_err(|e| format!("Failed to bind to port {}: {}", port, e))?;
        axum::serve(listener, app)
            .await
            .map_err(|e| format!("Server error: {}", e))?;

        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

// Health check endpoint - returns 200 OK if server is running
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn upload_form(error: Option<&str>) -> Response {
    let error_block = match error {
        Some(msg) => format!("<p class=\"error\">{}</p>", escape_html(msg)),
        None => String::new(),
    };
    Html(INDEX_HTML.replace("{{error}}", &error_block)).into_response()
}

async fn index_handler() -> Response {
    upload_form(None)
}

async fn upload_handler(
    State(state): State<StdArc<AppState>>,
    mut multipart: Multipart,
) -> Response {
    let mut audio = None;
    let mut pdf = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return upload_form(Some(&format!("Error uploading files: {}", e))),
        };

        let field_name = field.name().unwrap_or("").to_string();
        let file_name = field.file_name().unwrap_or("").to_string();
        let data = match field.bytes().await {
            Ok(d) => d,
            Err(e) => return upload_form(Some(&format!("Error uploading files: {}", e))),
        };

        match field_name.as_str() {
            "audio" => audio = Some((file_name, data)),
            "pdf" => pdf = Some((file_name, data)),
            _ => {}
        }
    }

    // Validate everything before the first write
    let (audio_name, audio_data) = match audio {
        Some(a) => a,
        None => return upload_form(Some("No audio file uploaded")),
    };
    if audio_name.is_empty() {
        return upload_form(Some("No audio file selected"));
    }
    let audio_name = match uploads::sanitize_filename(&audio_name) {
        Some(n) => n.to_string(),
        None => return upload_form(Some("Invalid audio file name")),
    };
    if !uploads::is_allowed_audio(&audio_name) {
        return upload_form(Some("Invalid audio file format"));
    }

    let pdf_upload = match pdf {
        Some((name, data)) if !name.is_empty() => {
            let name = match uploads::sanitize_filename(&name) {
                Some(n) => n.to_string(),
                None => return upload_form(Some("Invalid PDF file name")),
            };
            if !uploads::is_allowed_pdf(&name) {
                return upload_form(Some("Invalid PDF file format"));
            }
            Some((name, data))
        }
        _ => None,
    };

    if let Err(e) = uploads::store_upload(&state.config.upload_dir, &audio_name, &audio_data) {
        error!("{}", e);
        return upload_form(Some(&format!("Error uploading files: {}", e)));
    }

    let mut location = format!(
        "/audio_view?audio_filename={}",
        urlencoding::encode(&audio_name)
    );

    if let Some((pdf_name, pdf_data)) = pdf_upload {
        if let Err(e) = uploads::store_upload(&state.config.upload_dir, &pdf_name, &pdf_data) {
            error!("{}", e);
            return upload_form(Some(&format!("Error uploading files: {}", e)));
        }
        location.push_str(&format!("&pdf_filename={}", urlencoding::encode(&pdf_name)));
    }

    Redirect::to(&location).into_response()
}

#[derive(Deserialize)]
struct AudioViewQuery {
    audio_filename: Option<String>,
    pdf_filename: Option<String>,
}

async fn audio_view_handler(
    State(state): State<StdArc<AppState>>,
    Query(query): Query<AudioViewQuery>,
) -> Response {
    let audio_filename = match query
        .audio_filename
        .as_deref()
        .and_then(uploads::sanitize_filename)
    {
        Some(n) => n.to_string(),
        None => return Redirect::to("/").into_response(),
    };

    // A broken transcript is not fatal; the player renders without it
    let pdf_text = match query
        .pdf_filename
        .as_deref()
        .filter(|n| !n.is_empty())
        .and_then(uploads::sanitize_filename)
    {
        Some(pdf_name) => {
            let pdf_path = state.config.upload_dir.join(pdf_name);
            match extract_pdf_text(&pdf_path) {
                Ok(text) => Some(text),
                Err(e) => {
                    warn!(
                        "Failed to extract text from '{}': {}",
                        pdf_path.display(),
                        e
                    );
                    None
                }
            }
        }
        None => None,
    };

    let transcript_block = match pdf_text {
        Some(text) => format!(
            "<section class=\"transcript\"><h2>Transcript</h2><pre>{}</pre></section>",
            escape_html(&text)
        ),
        None => String::new(),
    };

    let page = AUDIO_VIEW_HTML
        .replace("{{audio_filename}}", &escape_html(&audio_filename))
        .replace("{{transcript}}", &transcript_block);

    Html(page).into_response()
}

fn content_type_for(filename: &str) -> &'static str {
    match uploads::extension_of(filename).as_deref() {
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("ogg") => "audio/ogg",
        Some("m4a") => "audio/mp4",
        Some("pdf") => "application/pdf",
        Some("json") => "application/json",
        Some("txt") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

/// Parse a single `bytes=start-end` range against a known total length.
///
/// Returns the inclusive byte range to serve, or None when the header is
/// malformed or unsatisfiable (the caller falls back to the full file).
fn parse_byte_range(range: &str, total_len: u64) -> Option<(u64, u64)> {
    let range = range.strip_prefix("bytes=")?;
    let parts: Vec<&str> = range.split('-').collect();
    if parts.len() != 2 {
        return None;
    }

    let start: u64 = parts[0].parse().unwrap_or(0);
    let last = total_len.checked_sub(1)?;
    let end: u64 = if parts[1].is_empty() {
        last
    } else {
        parts[1].parse().unwrap_or(last).min(last)
    };

    if start >= total_len || start > end {
        return None;
    }
    Some((start, end))
}

async fn serve_stored_file(
    dir: &std::path::Path,
    filename: &str,
    range_header: Option<&HeaderValue>,
) -> Response {
    let filename = match uploads::sanitize_filename(filename) {
        Some(n) => n,
        None => return (StatusCode::BAD_REQUEST, "Invalid filename").into_response(),
    };

    let path = dir.join(filename);
    let data = match tokio::fs::read(&path).await {
        Ok(d) => d,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return (StatusCode::NOT_FOUND, "File not found").into_response();
        }
        Err(e) => {
            error!("Failed to read '{}': {}", path.display(), e);
            return (StatusCode::INTERNAL_SERVER_ERROR, format!("Read error: {}", e))
                .into_response();
        }
    };

    let total_len = data.len() as u64;
    let content_type = content_type_for(filename);

    // Handle Range requests
    if let Some(range_header) = range_header {
        if let Ok(range_str) = range_header.to_str() {
            if let Some((start, end)) = parse_byte_range(range_str, total_len) {
                let body = data[start as usize..=(end as usize)].to_vec();
                return (
                    StatusCode::PARTIAL_CONTENT,
                    [
                        (header::CONTENT_TYPE, HeaderValue::from_static(content_type)),
                        (
                            header::CONTENT_RANGE,
                            HeaderValue::from_str(&format!(
                                "bytes {}-{}/{}",
                                start, end, total_len
                            ))
                            .unwrap(),
                        ),
                        (header::ACCEPT_RANGES, HeaderValue::from_static("bytes")),
                    ],
                    body,
                )
                    .into_response();
            }
        }
    }

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(content_type)),
            (header::ACCEPT_RANGES, HeaderValue::from_static("bytes")),
        ],
        data,
    )
        .into_response()
}

async fn uploaded_file_handler(
    State(state): State<StdArc<AppState>>,
    Path(filename): Path<String>,
    headers: HeaderMap,
) -> Response {
    serve_stored_file(
        &state.config.upload_dir,
        &filename,
        headers.get(header::RANGE),
    )
    .await
}

async fn fragment_file_handler(
    State(state): State<StdArc<AppState>>,
    Path(filename): Path<String>,
) -> Response {
    serve_stored_file(&state.config.fragments_dir, &filename, None).await
}

async fn save_region_handler(
    State(state): State<StdArc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<SaveRegionRequest>, JsonRejection>,
) -> Json<serde_json::Value> {
    let Json(req) = match payload {
        Ok(json) => json,
        Err(e) => {
            return Json(json!({
                "success": false,
                "error": format!("Invalid request body: {}", e)
            }));
        }
    };

    if uploads::sanitize_filename(&req.audio_filename).is_none() {
        return Json(json!({"success": false, "error": "Invalid audio filename"}));
    }

    // Per-request identity: body field, then header, then the configured default
    let username = req
        .username
        .clone()
        .filter(|u| !u.is_empty())
        .or_else(|| {
            headers
                .get("x-username")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
                .filter(|u| !u.is_empty())
        })
        .unwrap_or_else(|| state.config.default_username.clone());

    // ffmpeg blocks for its full run time; keep it off the async workers
    let state = StdArc::clone(&state);
    let result = tokio::task::spawn_blocking(move || {
        regions::save_region(
            &state.config.upload_dir,
            &state.config.fragments_dir,
            state.exporter.as_ref(),
            &req,
            &username,
            chrono::Local::now(),
        )
    })
    .await;

    match result {
        Ok(Ok(filename)) => Json(json!({"success": true, "filename": filename})),
        Ok(Err(e)) => Json(json!({"success": false, "error": e})),
        Err(e) => {
            error!("save_region task failed: {}", e);
            Json(json!({"success": false, "error": "Internal error"}))
        }
    }
}

#[derive(Deserialize)]
struct SavedRegionsQuery {
    audio_filename: Option<String>,
}

async fn get_saved_regions_handler(
    State(state): State<StdArc<AppState>>,
    Query(query): Query<SavedRegionsQuery>,
) -> Json<serde_json::Value> {
    let audio_filename = match query.audio_filename.filter(|n| !n.is_empty()) {
        Some(n) => n,
        None => {
            return Json(json!({"success": false, "error": "Missing audio filename"}));
        }
    };

    match regions::saved_regions_for(&state.config.fragments_dir, &audio_filename) {
        Ok(list) => Json(json!({"success": true, "regions": list})),
        Err(e) => Json(json!({"success": false, "error": e})),
    }
}

#[derive(Deserialize)]
struct FragmentDataQuery {
    filename: Option<String>,
}

async fn get_fragment_data_handler(
    State(state): State<StdArc<AppState>>,
    Query(query): Query<FragmentDataQuery>,
) -> Json<serde_json::Value> {
    let filename = match query.filename.filter(|n| !n.is_empty()) {
        Some(n) => n,
        None => {
            return Json(json!({"success": false, "error": "Missing fragment filename"}));
        }
    };

    match regions::fragment_data(&state.config.fragments_dir, &filename) {
        Ok(metadata) => Json(json!({"success": true, "data": metadata})),
        Err(e) => Json(json!({"success": false, "error": e})),
    }
}
