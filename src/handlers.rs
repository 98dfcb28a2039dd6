use crate::{
    config::{self, Config},
    engine,
    error::AppError,
    history::{AuditKind, HistoryLog},
    models::{
        ApiResponse, DownloadRequest, ResolutionListRequest, VideoListRequest, VideoSummary,
    },
    normalize, AppState,
};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    Json,
};
use percent_encoding::percent_decode_str;
use serde_json::{json, Value};
use std::path::PathBuf;
use url::Url;
use walkdir::WalkDir;

// ===================================================================
//                          HEALTH HANDLER
// ===================================================================

/// # GET /health - Liveness probe.
pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

// ===================================================================
//                          METADATA HANDLERS
// ===================================================================

/// # POST /resolution_list - Distinct mp4 resolutions for a URL, highest first.
pub async fn resolution_list(
    Json(payload): Json<ResolutionListRequest>,
) -> Result<impl IntoResponse, AppError> {
    tracing::info!("Fetching resolution list for URL: {}", payload.url);

    let opts = engine::build_probe_options(payload.proxy.as_deref(), false, &mut rand::thread_rng());
    let info = engine::extract_info(&payload.url, &opts, false)
        .await
        .map_err(|e| AppError::Engine(format!("Get resolution list failed: {e}")))?;

    let resolutions = normalize::resolution_list(&info);
    tracing::info!("Found {} resolutions", resolutions.len());
    Ok((
        StatusCode::OK,
        Json(ApiResponse::success(
            "Resolution list retrieved successfully",
            resolutions,
        )),
    ))
}

/// # POST /video_resolutions - The filtered mp4 track records themselves.
pub async fn video_resolutions(
    Json(payload): Json<ResolutionListRequest>,
) -> Result<impl IntoResponse, AppError> {
    tracing::info!("Fetching available formats for URL: {}", payload.url);

    let opts = engine::build_probe_options(payload.proxy.as_deref(), false, &mut rand::thread_rng());
    let info = engine::extract_info(&payload.url, &opts, false)
        .await
        .map_err(|e| AppError::Engine(format!("Get available formats failed: {e}")))?;

    Ok((
        StatusCode::OK,
        Json(ApiResponse::success(
            "Available formats retrieved successfully",
            normalize::available_formats(&info),
        )),
    ))
}

/// # POST /video_list - Flattened summaries of every video behind a URL.
///
/// Collection pages are flat-extracted (entries only partially populated);
/// the raw entry list is dumped to the per-domain audit trail before the
/// summaries are projected.
pub async fn video_list(
    State(state): State<AppState>,
    Json(payload): Json<VideoListRequest>,
) -> Result<impl IntoResponse, AppError> {
    tracing::info!("Fetching video list for URL: {}", payload.url);

    let opts = engine::build_probe_options(payload.proxy.as_deref(), true, &mut rand::thread_rng());
    let summaries: Vec<VideoSummary> = async {
        let info = engine::extract_info(&payload.url, &opts, false).await?;
        let entries = normalize::flatten_entries(&info);
        state.audit.record(
            &request_domain(&payload.url),
            AuditKind::VideoList,
            &Value::Array(entries.clone()),
        )?;
        anyhow::Ok(entries.iter().map(normalize::video_summary).collect())
    }
    .await
    .map_err(|e| AppError::Engine(format!("Get video list failed: {e}")))?;

    tracing::info!("Video list contains {} entries", summaries.len());
    Ok((
        StatusCode::OK,
        Json(ApiResponse::success(
            "Video list retrieved successfully",
            summaries,
        )),
    ))
}

/// # POST /video_details - Full metadata for one video, raw response audited.
pub async fn video_details(
    State(state): State<AppState>,
    Json(payload): Json<ResolutionListRequest>,
) -> Result<impl IntoResponse, AppError> {
    tracing::info!("Fetching video details for URL: {}", payload.url);

    let opts = engine::build_probe_options(payload.proxy.as_deref(), false, &mut rand::thread_rng());
    let detail = async {
        let info = engine::extract_info(&payload.url, &opts, false).await?;
        state
            .audit
            .record(&request_domain(&payload.url), AuditKind::VideoDetails, &info)?;
        anyhow::Ok(normalize::video_detail(&info))
    }
    .await
    .map_err(|e| AppError::Engine(format!("Get video details failed: {e}")))?;

    Ok((
        StatusCode::OK,
        Json(ApiResponse::success(
            "Video details retrieved successfully",
            detail,
        )),
    ))
}

// ===================================================================
//                          DOWNLOAD HANDLER
// ===================================================================

/// # POST /download - Transfers the media file to the download directory.
///
/// Blocks until the engine finishes; there is no queue and no progress
/// endpoint. Appends one history line on success.
pub async fn download(
    State(state): State<AppState>,
    Json(payload): Json<DownloadRequest>,
) -> Result<impl IntoResponse, AppError> {
    tracing::info!("Downloading media from URL: {}", payload.url);

    let download_dir = get_download_dir_from_state(&state);
    let opts = engine::build_download_options(
        &download_dir,
        payload.resolution.as_deref(),
        payload.format_id.as_deref(),
        payload.proxy.as_deref(),
        &mut rand::thread_rng(),
    )?;

    let result = async {
        tokio::fs::create_dir_all(&download_dir).await?;
        let info = engine::extract_info(&payload.url, &opts, true).await?;
        HistoryLog::new(&download_dir).append(&payload.url, &info).await?;
        anyhow::Ok(normalize::download_result(&info, &download_dir))
    }
    .await
    .map_err(|e| AppError::Engine(format!("Download failed: {e}")))?;

    tracing::info!("Download finished: {:?}", result.filepath);
    Ok((
        StatusCode::OK,
        Json(ApiResponse::success("Video downloaded successfully", result)),
    ))
}

// ===================================================================
//                          FILE HANDLERS
// ===================================================================

/// # GET /downloads - Lists everything under the download directory.
pub async fn list_downloads(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let mut files = Vec::new();
    let download_dir = get_download_dir_from_state(&state);

    if !download_dir.exists() {
        return Ok(Json(files));
    }

    for entry in WalkDir::new(&download_dir).min_depth(1).into_iter().filter_map(|e| e.ok()) {
        if entry.file_type().is_file() {
            if let Ok(relative_path) = entry.path().strip_prefix(&download_dir) {
                files.push(relative_path.to_string_lossy().to_string());
            }
        }
    }
    Ok(Json(files))
}

/// # GET /downloads/:path - Serves a single downloaded file.
pub async fn get_download(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let decoded_path = percent_decode_str(&path).decode_utf8_lossy().to_string();
    let download_dir = get_download_dir_from_state(&state);
    let file_path = download_dir.join(&decoded_path);

    let canonical_base = tokio::fs::canonicalize(&download_dir).await?;
    let canonical_file = tokio::fs::canonicalize(&file_path)
        .await
        .map_err(|_| AppError::NotFound(format!("File '{}' not found.", decoded_path)))?;

    if !canonical_file.starts_with(canonical_base) {
        return Err(AppError::NotFound("File not found".to_string()));
    }

    let file = tokio::fs::File::open(&file_path).await?;
    let stream = tokio_util::io::ReaderStream::new(file);
    let body = Body::from_stream(stream);

    let mut headers = HeaderMap::new();
    let disposition = format!(
        "attachment; filename=\"{}\"",
        file_path.file_name().unwrap_or_default().to_string_lossy()
    );
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }

    Ok((headers, body))
}

// ===================================================================
//                          CONFIG HANDLERS
// ===================================================================

/// # GET /config - Returns the current application configuration.
pub async fn get_config(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let config = state.config.read().unwrap().clone();
    Ok((StatusCode::OK, Json(config)))
}

/// # POST /config - Updates the configuration and saves it to disk.
pub async fn update_config(
    State(state): State<AppState>,
    Json(payload): Json<Config>,
) -> Result<impl IntoResponse, AppError> {
    *state.config.write().unwrap() = payload.clone();
    config::save_config(&payload).await?;
    tracing::info!("Configuration updated and saved.");
    Ok((StatusCode::OK, Json(payload)))
}

// ===================================================================
//                          HELPER FUNCTIONS
// ===================================================================

/// Configured download directory from the shared state.
fn get_download_dir_from_state(state: &AppState) -> PathBuf {
    let config = state.config.read().unwrap();
    PathBuf::from(&config.download_directory)
}

/// Host part of the request URL, used to partition the audit trail.
fn request_domain(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string())
}
