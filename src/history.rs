use anyhow::Result;
use chrono::Local;
use serde_json::{json, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Append-only download history inside the download directory. One compact
/// JSON line per completed download; no rotation, no size cap.
pub struct HistoryLog {
    path: PathBuf,
}

impl HistoryLog {
    pub const FILE_NAME: &'static str = "download_history.jsonl";

    pub fn new(download_dir: &Path) -> Self {
        Self {
            path: download_dir.join(Self::FILE_NAME),
        }
    }

    /// Appends one history line. `serde_json` keeps non-ASCII characters
    /// literal, so titles survive round trips untouched. Concurrent appends
    /// are not synchronized.
    pub async fn append(&self, url: &str, info: &Value) -> Result<()> {
        let entry = json!({
            "timestamp": Local::now().to_rfc3339(),
            "url": url,
            "title": info.get("title"),
            "format": info.get("format"),
            "formats": info.get("formats"),
            "format_id": info.get("format_id"),
            "resolution": info.get("resolution"),
            "filesize": info.get("filesize"),
            "filepath": info.get("filepath"),
            "duration": info.get("duration"),
            "view_count": info.get("view_count"),
            "webpage_url": info.get("webpage_url"),
            "extractor": info.get("extractor"),
        });

        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Which raw-response audit trail a dump belongs to.
#[derive(Clone, Copy, Debug)]
pub enum AuditKind {
    VideoList,
    VideoDetails,
}

impl AuditKind {
    pub fn dir_name(self) -> &'static str {
        match self {
            AuditKind::VideoList => "video_list",
            AuditKind::VideoDetails => "video_details",
        }
    }
}

/// Write-only sink for whole raw engine responses. A trait so tests can
/// swap in a no-op instead of touching the filesystem.
pub trait AuditSink: Send + Sync {
    fn record(&self, domain: &str, kind: AuditKind, payload: &Value) -> Result<()>;
}

/// Files the payload under `{root}/{domain}/{kind}/{timestamp}[_{id}].json`,
/// one file per call, creating directories as needed. Nothing reads these
/// back; they exist as an audit trail.
pub struct FsAuditSink {
    root: PathBuf,
}

impl FsAuditSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl AuditSink for FsAuditSink {
    fn record(&self, domain: &str, kind: AuditKind, payload: &Value) -> Result<()> {
        let dir = self.root.join(domain).join(kind.dir_name());
        std::fs::create_dir_all(&dir)?;

        let stem = match kind {
            AuditKind::VideoList => Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            AuditKind::VideoDetails => {
                let id = payload.get("id").and_then(Value::as_str).unwrap_or("unknown");
                format!("{}_{}", Local::now().format("%Y-%m-%d_%H-%M-%S"), id)
            }
        };

        let mut line = serde_json::to_string(payload)?;
        line.push('\n');

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(format!("{stem}.json")))?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct NoopAuditSink;

    impl AuditSink for NoopAuditSink {
        fn record(&self, _domain: &str, _kind: AuditKind, _payload: &Value) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn history_appends_one_parseable_line_per_download() {
        let dir = tempfile::tempdir().unwrap();
        let log = HistoryLog::new(dir.path());
        let info = json!({"title": "短片 clip", "extractor": "generic"});

        log.append("https://example.com/v/1", &info).await.unwrap();
        log.append("https://example.com/v/2", &info).await.unwrap();

        let content =
            std::fs::read_to_string(dir.path().join(HistoryLog::FILE_NAME)).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let entry: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(entry["url"], "https://example.com/v/1");
        assert!(!entry["timestamp"].as_str().unwrap().is_empty());
        assert_eq!(entry["title"], "短片 clip");
        // Non-ASCII stays literal in the file, not escaped.
        assert!(lines[0].contains("短片"));
    }

    #[test]
    fn audit_sink_files_details_under_domain_and_kind() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FsAuditSink::new(dir.path());
        let payload = json!({"id": "abc123", "title": "clip"});

        sink.record("example.com", AuditKind::VideoDetails, &payload)
            .unwrap();

        let kind_dir = dir.path().join("example.com").join("video_details");
        let entries: Vec<_> = std::fs::read_dir(&kind_dir).unwrap().collect();
        assert_eq!(entries.len(), 1);
        let name = entries[0].as_ref().unwrap().file_name();
        let name = name.to_string_lossy();
        assert!(name.ends_with("_abc123.json"));

        let content = std::fs::read_to_string(entries[0].as_ref().unwrap().path()).unwrap();
        let written: Value = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(written, payload);
    }

    #[test]
    fn audit_sink_list_dumps_go_to_their_own_directory() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FsAuditSink::new(dir.path());
        let payload = json!([{"id": "a"}, {"id": "b"}]);

        sink.record("example.com", AuditKind::VideoList, &payload)
            .unwrap();

        let kind_dir = dir.path().join("example.com").join("video_list");
        assert_eq!(std::fs::read_dir(&kind_dir).unwrap().count(), 1);
    }

    #[test]
    fn noop_sink_satisfies_the_trait() {
        let sink: Box<dyn AuditSink> = Box::new(NoopAuditSink);
        sink.record("example.com", AuditKind::VideoList, &json!([]))
            .unwrap();
    }
}
