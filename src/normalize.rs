//! Maps the engine's raw info record into the narrower response shapes.
//!
//! The record is an external, partially-unknown schema, so every field is
//! probed individually and absence never fails a request.

use crate::models::{
    DownloadResult, FormatDetail, FormatTrack, PreviewVideo, VideoDetail, VideoSummary,
};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Maximum height of a track eligible as `preview_video`.
const PREVIEW_MAX_HEIGHT: u64 = 360;

fn str_field(v: &Value, key: &str) -> Option<String> {
    v.get(key).and_then(Value::as_str).map(str::to_string)
}

fn u64_field(v: &Value, key: &str) -> Option<u64> {
    v.get(key).and_then(Value::as_u64)
}

fn f64_field(v: &Value, key: &str) -> Option<f64> {
    v.get(key).and_then(Value::as_f64)
}

fn formats_of(info: &Value) -> &[Value] {
    info.get("formats")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// A resolution string counts when the extractor actually reported one:
/// non-empty and distinct from the "unknown" sentinel.
fn known_resolution(resolution: &str) -> bool {
    !resolution.is_empty() && resolution != "unknown"
}

/// Height parsed from the substring after `x`; strings without `x` (or with
/// a non-numeric height) rank as 0 so they sink rather than disappear.
fn resolution_height(resolution: &str) -> u64 {
    resolution
        .split_once('x')
        .and_then(|(_, h)| h.parse().ok())
        .unwrap_or(0)
}

fn is_mp4_with_resolution(track: &Value) -> Option<&str> {
    if track.get("ext").and_then(Value::as_str) != Some("mp4") {
        return None;
    }
    track
        .get("resolution")
        .and_then(Value::as_str)
        .filter(|r| known_resolution(r))
}

/// Deduplicates resolution strings as a set and sorts descending by height.
/// The sort is stable, so equal-height ties keep their first-seen order.
fn sorted_resolution_set(resolutions: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    for r in resolutions {
        if !seen.contains(&r) {
            seen.push(r);
        }
    }
    seen.sort_by(|a, b| resolution_height(b).cmp(&resolution_height(a)));
    seen
}

/// The mp4 tracks with a reported resolution, in original order.
pub fn available_formats(info: &Value) -> Vec<FormatTrack> {
    formats_of(info)
        .iter()
        .filter_map(|track| {
            let resolution = is_mp4_with_resolution(track)?;
            Some(FormatTrack {
                format_id: str_field(track, "format_id"),
                ext: "mp4".to_string(),
                resolution: resolution.to_string(),
                filesize: u64_field(track, "filesize"),
                fps: f64_field(track, "fps"),
            })
        })
        .collect()
}

/// The distinct resolutions of the mp4 tracks, highest first.
pub fn resolution_list(info: &Value) -> Vec<String> {
    sorted_resolution_set(available_formats(info).into_iter().map(|f| f.resolution))
}

/// A collection page yields its `entries` in order; anything else is a
/// single-element sequence of the record itself.
pub fn flatten_entries(info: &Value) -> Vec<Value> {
    if info.get("_type").and_then(Value::as_str) == Some("playlist") {
        info.get("entries")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
    } else {
        vec![info.clone()]
    }
}

/// Projects one (possibly partially populated) entry into a summary.
/// Flattened entries often carry `url` instead of `webpage_url`.
pub fn video_summary(entry: &Value) -> VideoSummary {
    VideoSummary {
        id: str_field(entry, "id"),
        title: str_field(entry, "title"),
        duration: f64_field(entry, "duration"),
        view_count: u64_field(entry, "view_count"),
        webpage_url: str_field(entry, "webpage_url").or_else(|| str_field(entry, "url")),
        thumbnail: str_field(entry, "thumbnail"),
        description: str_field(entry, "description"),
        uploader: str_field(entry, "uploader"),
        upload_date: str_field(entry, "upload_date"),
        webpage_url_domain: str_field(entry, "webpage_url_domain"),
    }
}

/// The first original-order mp4 track whose resolution parses to a height
/// of at most 360, if any.
fn preview_video(info: &Value) -> Option<PreviewVideo> {
    formats_of(info).iter().find_map(|track| {
        let resolution = is_mp4_with_resolution(track)?;
        let (_, h) = resolution.split_once('x')?;
        let height: u64 = h.parse().ok()?;
        if height > PREVIEW_MAX_HEIGHT {
            return None;
        }
        Some(PreviewVideo {
            url: str_field(track, "url"),
            resolution: resolution.to_string(),
            filesize: u64_field(track, "filesize"),
        })
    })
}

/// Builds the full detail record: filtered+sorted mp4 tracks, the derived
/// resolution set, the preview track, and the per-video metadata fields.
pub fn video_detail(info: &Value) -> VideoDetail {
    let mut formats: Vec<FormatDetail> = formats_of(info)
        .iter()
        .filter_map(|track| {
            let resolution = is_mp4_with_resolution(track)?;
            Some(FormatDetail {
                format_id: str_field(track, "format_id"),
                ext: "mp4".to_string(),
                resolution: resolution.to_string(),
                filesize: u64_field(track, "filesize"),
                fps: f64_field(track, "fps"),
                vcodec: str_field(track, "vcodec"),
                acodec: str_field(track, "acodec"),
                url: str_field(track, "url"),
            })
        })
        .collect();
    let resolutions = sorted_resolution_set(formats.iter().map(|f| f.resolution.clone()));
    formats.sort_by(|a, b| {
        resolution_height(&b.resolution).cmp(&resolution_height(&a.resolution))
    });

    VideoDetail {
        id: str_field(info, "id"),
        title: str_field(info, "title"),
        description: str_field(info, "description"),
        duration: f64_field(info, "duration"),
        duration_string: str_field(info, "duration_string"),
        view_count: u64_field(info, "view_count"),
        like_count: u64_field(info, "like_count"),
        comment_count: u64_field(info, "comment_count"),
        upload_date: str_field(info, "upload_date"),
        uploader: str_field(info, "uploader"),
        uploader_id: str_field(info, "uploader_id"),
        uploader_url: str_field(info, "uploader_url"),
        channel: str_field(info, "channel"),
        channel_id: str_field(info, "channel_id"),
        channel_url: str_field(info, "channel_url"),
        webpage_url: str_field(info, "webpage_url"),
        thumbnails: info
            .get("thumbnails")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
        thumbnail: str_field(info, "thumbnail"),
        resolutions,
        preview_video: preview_video(info),
        formats,
        is_live: info.get("is_live").and_then(Value::as_bool).unwrap_or(false),
        was_live: info.get("was_live").and_then(Value::as_bool).unwrap_or(false),
        live_status: str_field(info, "live_status"),
        tags: string_array(info, "tags"),
        categories: string_array(info, "categories"),
    }
}

fn string_array(info: &Value, key: &str) -> Vec<String> {
    info.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Where the downloaded file ended up. Prefers the engine's per-file-request
/// report, then its top-level report, and as a last resort fills the output
/// template from the record's own fields.
pub fn resolve_filepath(info: &Value, download_dir: &Path) -> Option<PathBuf> {
    if let Some(path) = info
        .get("requested_downloads")
        .and_then(Value::as_array)
        .and_then(|reqs| reqs.first())
        .and_then(|req| req.get("filepath"))
        .and_then(Value::as_str)
    {
        return Some(PathBuf::from(path));
    }
    if let Some(path) = info.get("filepath").and_then(Value::as_str) {
        return Some(PathBuf::from(path));
    }

    // Mirror of the output template, with the engine's "NA" placeholder for
    // fields it did not report.
    let field = |key: &str| str_field(info, key).unwrap_or_else(|| "NA".to_string());
    let name = format!(
        "{}_{}_{}_{}.{}",
        truncate_chars(&field("title"), 100),
        field("resolution"),
        truncate_chars(&field("upload_date"), 100),
        field("id"),
        field("ext"),
    );
    Some(download_dir.join(name))
}

/// Assembles the `/download` response record from the engine's report.
pub fn download_result(info: &Value, download_dir: &Path) -> DownloadResult {
    DownloadResult {
        title: str_field(info, "title"),
        format: str_field(info, "format"),
        format_id: str_field(info, "format_id"),
        resolution: str_field(info, "resolution"),
        filesize: u64_field(info, "filesize"),
        duration: f64_field(info, "duration"),
        view_count: u64_field(info, "view_count"),
        webpage_url: str_field(info, "webpage_url"),
        filepath: resolve_filepath(info, download_dir)
            .map(|p| p.to_string_lossy().into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolution_list_filters_and_sorts_descending() {
        let info = json!({
            "formats": [
                {"ext": "mp4", "resolution": "1920x1080"},
                {"ext": "mp4", "resolution": "1280x720"},
                {"ext": "webm", "resolution": "1920x1080"},
                {"ext": "mp4", "resolution": "unknown"},
            ]
        });
        assert_eq!(resolution_list(&info), vec!["1920x1080", "1280x720"]);
    }

    #[test]
    fn available_formats_keep_track_fields() {
        let info = json!({
            "formats": [
                {"ext": "mp4", "resolution": "1280x720", "format_id": "22", "filesize": 1000u64, "fps": 30.0},
                {"ext": "webm", "resolution": "1280x720", "format_id": "247"},
            ]
        });
        let formats = available_formats(&info);
        assert_eq!(formats.len(), 1);
        assert_eq!(formats[0].format_id.as_deref(), Some("22"));
        assert_eq!(formats[0].filesize, Some(1000));
        assert_eq!(formats[0].fps, Some(30.0));
    }

    #[test]
    fn resolution_list_deduplicates() {
        let info = json!({
            "formats": [
                {"ext": "mp4", "resolution": "1280x720"},
                {"ext": "mp4", "resolution": "1280x720", "fps": 60.0},
                {"ext": "mp4", "resolution": "640x360"},
            ]
        });
        assert_eq!(resolution_list(&info), vec!["1280x720", "640x360"]);
    }

    #[test]
    fn resolutions_without_x_sink_to_the_bottom() {
        let info = json!({
            "formats": [
                {"ext": "mp4", "resolution": "audio only"},
                {"ext": "mp4", "resolution": "640x360"},
            ]
        });
        assert_eq!(resolution_list(&info), vec!["640x360", "audio only"]);
    }

    #[test]
    fn playlist_record_flattens_in_entry_order() {
        let info = json!({
            "_type": "playlist",
            "entries": [
                {"id": "a", "title": "first", "url": "https://example.com/a"},
                {"id": "b", "title": "second", "url": "https://example.com/b"},
            ]
        });
        let summaries: Vec<_> = flatten_entries(&info).iter().map(video_summary).collect();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].id.as_deref(), Some("a"));
        assert_eq!(summaries[1].id.as_deref(), Some("b"));
        // Flat entries have no webpage_url; the generic url stands in.
        assert_eq!(
            summaries[0].webpage_url.as_deref(),
            Some("https://example.com/a")
        );
    }

    #[test]
    fn single_record_flattens_to_one_summary() {
        let info = json!({
            "id": "solo",
            "title": "one video",
            "webpage_url": "https://example.com/watch?v=solo",
        });
        let summaries: Vec<_> = flatten_entries(&info).iter().map(video_summary).collect();
        assert_eq!(summaries.len(), 1);
        assert_eq!(
            summaries[0].webpage_url.as_deref(),
            Some("https://example.com/watch?v=solo")
        );
    }

    #[test]
    fn preview_picks_first_track_at_or_below_360() {
        let info = json!({
            "formats": [
                {"ext": "mp4", "resolution": "1920x1080", "url": "https://cdn/high"},
                {"ext": "webm", "resolution": "320x240", "url": "https://cdn/webm"},
                {"ext": "mp4", "resolution": "640x360", "url": "https://cdn/low"},
                {"ext": "mp4", "resolution": "320x240", "url": "https://cdn/lower"},
            ]
        });
        let preview = preview_video(&info).unwrap();
        assert_eq!(preview.resolution, "640x360");
        assert_eq!(preview.url.as_deref(), Some("https://cdn/low"));
    }

    #[test]
    fn preview_absent_when_no_track_qualifies() {
        let info = json!({
            "formats": [
                {"ext": "mp4", "resolution": "1920x1080"},
                {"ext": "mp4", "resolution": "unknown"},
                {"ext": "webm", "resolution": "320x240"},
            ]
        });
        assert!(preview_video(&info).is_none());
    }

    #[test]
    fn detail_formats_sorted_by_height_with_stable_ties() {
        let info = json!({
            "formats": [
                {"ext": "mp4", "resolution": "640x360", "format_id": "18"},
                {"ext": "mp4", "resolution": "1920x1080", "format_id": "137"},
                {"ext": "mp4", "resolution": "1920x1080", "format_id": "299"},
            ]
        });
        let detail = video_detail(&info);
        let ids: Vec<_> = detail
            .formats
            .iter()
            .map(|f| f.format_id.as_deref().unwrap())
            .collect();
        assert_eq!(ids, vec!["137", "299", "18"]);
        assert_eq!(detail.resolutions, vec!["1920x1080", "640x360"]);
    }

    #[test]
    fn detail_defaults_for_missing_fields() {
        let detail = video_detail(&json!({"id": "x"}));
        assert_eq!(detail.id.as_deref(), Some("x"));
        assert!(detail.formats.is_empty());
        assert!(detail.resolutions.is_empty());
        assert!(detail.preview_video.is_none());
        assert!(!detail.is_live);
        assert!(detail.tags.is_empty());
    }

    #[test]
    fn filepath_prefers_requested_downloads() {
        let info = json!({
            "requested_downloads": [{"filepath": "/media/a.mp4"}],
            "filepath": "/media/b.mp4",
        });
        assert_eq!(
            resolve_filepath(&info, Path::new("/media")),
            Some(PathBuf::from("/media/a.mp4"))
        );
    }

    #[test]
    fn filepath_falls_back_to_top_level_report() {
        let info = json!({"filepath": "/media/b.mp4"});
        assert_eq!(
            resolve_filepath(&info, Path::new("/media")),
            Some(PathBuf::from("/media/b.mp4"))
        );
    }

    #[test]
    fn filepath_reconstruction_fills_the_template() {
        let long_title = "t".repeat(150);
        let info = json!({
            "title": long_title,
            "resolution": "1280x720",
            "upload_date": "20240102",
            "id": "abc123",
            "ext": "mp4",
        });
        let path = resolve_filepath(&info, Path::new("/media")).unwrap();
        let expected = format!("{}_1280x720_20240102_abc123.mp4", "t".repeat(100));
        assert_eq!(path, PathBuf::from("/media").join(expected));
    }

    #[test]
    fn download_result_carries_engine_fields() {
        let info = json!({
            "title": "clip",
            "format": "137+140",
            "format_id": "137+140",
            "resolution": "1920x1080",
            "filesize": 123456u64,
            "duration": 31.5,
            "view_count": 42u64,
            "webpage_url": "https://example.com/watch?v=clip",
            "requested_downloads": [{"filepath": "/media/clip.mp4"}],
        });
        let result = download_result(&info, Path::new("/media"));
        assert_eq!(result.title.as_deref(), Some("clip"));
        assert_eq!(result.filesize, Some(123456));
        assert_eq!(result.filepath.as_deref(), Some("/media/clip.mp4"));
    }
}
