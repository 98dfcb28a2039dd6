use serde::{Deserialize, Serialize};
use serde_json::Value;

// === API Request Models ===

/// The JSON body for a `POST /download` request.
///
/// `resolution` is a "WIDTHxHEIGHT" string; only the height is used for
/// track selection. `format_id`, when given, bypasses the height-based
/// selection and is handed to the engine verbatim.
#[derive(Deserialize, Debug)]
pub struct DownloadRequest {
    pub url: String,
    pub resolution: Option<String>,
    pub format_id: Option<String>,
    pub proxy: Option<String>,
}

/// The JSON body for `POST /resolution_list`, `POST /video_resolutions`
/// and `POST /video_details`.
#[derive(Deserialize, Debug)]
pub struct ResolutionListRequest {
    pub url: String,
    pub proxy: Option<String>,
}

/// The JSON body for a `POST /video_list` request.
#[derive(Deserialize, Debug)]
pub struct VideoListRequest {
    pub url: String,
    pub proxy: Option<String>,
}

// === API Response Models ===

/// The uniform success envelope: `{status: "success", message, data}`.
#[derive(Serialize, Debug)]
pub struct ApiResponse<T> {
    pub status: &'static str,
    pub message: String,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self {
            status: "success",
            message: message.into(),
            data,
        }
    }
}

/// What a completed `/download` call returns. All metadata fields come from
/// the engine's record and may be absent; `filepath` is resolved through the
/// fallback chain in `normalize::resolve_filepath`.
#[derive(Serialize, Debug)]
pub struct DownloadResult {
    pub title: Option<String>,
    pub format: Option<String>,
    pub format_id: Option<String>,
    pub resolution: Option<String>,
    pub filesize: Option<u64>,
    pub duration: Option<f64>,
    pub view_count: Option<u64>,
    pub webpage_url: Option<String>,
    pub filepath: Option<String>,
}

/// One mp4 track as reported by `POST /video_resolutions`.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct FormatTrack {
    pub format_id: Option<String>,
    pub ext: String,
    pub resolution: String,
    pub filesize: Option<u64>,
    pub fps: Option<f64>,
}

/// One mp4 track inside `VideoDetail`, carrying the direct stream URL.
#[derive(Serialize, Debug, Clone)]
pub struct FormatDetail {
    pub format_id: Option<String>,
    pub ext: String,
    pub resolution: String,
    pub filesize: Option<u64>,
    pub fps: Option<f64>,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    pub url: Option<String>,
}

/// One flattened item of a `POST /video_list` response. Flat extraction only
/// partially populates entries, so everything is optional.
#[derive(Serialize, Debug)]
pub struct VideoSummary {
    pub id: Option<String>,
    pub title: Option<String>,
    pub duration: Option<f64>,
    pub view_count: Option<u64>,
    pub webpage_url: Option<String>,
    pub thumbnail: Option<String>,
    pub description: Option<String>,
    pub uploader: Option<String>,
    pub upload_date: Option<String>,
    pub webpage_url_domain: Option<String>,
}

/// The low-resolution preview track of a `VideoDetail` (height <= 360).
#[derive(Serialize, Debug, Clone)]
pub struct PreviewVideo {
    pub url: Option<String>,
    pub resolution: String,
    pub filesize: Option<u64>,
}

/// The full per-video record returned by `POST /video_details`.
///
/// `thumbnails` is passed through untyped: the engine's thumbnail records
/// vary by extractor and nothing here depends on their shape.
#[derive(Serialize, Debug)]
pub struct VideoDetail {
    pub id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub duration: Option<f64>,
    pub duration_string: Option<String>,
    pub view_count: Option<u64>,
    pub like_count: Option<u64>,
    pub comment_count: Option<u64>,
    pub upload_date: Option<String>,
    pub uploader: Option<String>,
    pub uploader_id: Option<String>,
    pub uploader_url: Option<String>,
    pub channel: Option<String>,
    pub channel_id: Option<String>,
    pub channel_url: Option<String>,
    pub webpage_url: Option<String>,
    pub thumbnails: Vec<Value>,
    pub thumbnail: Option<String>,
    pub resolutions: Vec<String>,
    pub formats: Vec<FormatDetail>,
    pub preview_video: Option<PreviewVideo>,
    pub is_live: bool,
    pub was_live: bool,
    pub live_status: Option<String>,
    pub tags: Vec<String>,
    pub categories: Vec<String>,
}
