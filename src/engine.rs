use crate::error::AppError;
use anyhow::{anyhow, Context};
use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use rand::Rng;
use regex::Regex;
use serde_json::Value;
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_stream::{wrappers::LinesStream, StreamExt};

/// Per-item output filename: title (truncated), resolution, upload date
/// (truncated), id, extension. Same-video re-downloads land on the same path
/// and overwrite.
const OUTPUT_TEMPLATE: &str = "%(title).100s_%(resolution)s_%(upload_date).100s_%(id)s.%(ext)s";

/// Fixed pool of browser identification strings. One is chosen uniformly at
/// random per engine call.
const USER_AGENTS: [&str; 9] = [
    // Chrome on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    // Firefox on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:123.0) Gecko/20100101 Firefox/123.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:122.0) Gecko/20100101 Firefox/122.0",
    // Edge on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Edge/122.0.2365.92 Safari/537.36",
    // Chrome on macOS
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
    // Safari on macOS
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2.1 Safari/605.1.15",
    // Chrome on Linux
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
    // Firefox on Linux
    "Mozilla/5.0 (X11; Linux x86_64; rv:123.0) Gecko/20100101 Firefox/123.0",
];

static PROGRESS_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[download\]\s+(?P<progress>[\d\.]+)%\s+of\s+~?\s*(?P<size>[\d\.\w/]+)(?:\s+at\s+(?P<speed>[\d\.\w/]+))?\s+ETA\s+(?P<eta>[\d:]+)").unwrap()
});

/// Picks one User-Agent from the fixed pool. The randomness source is a
/// parameter so callers and tests control it.
pub fn pick_user_agent<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    USER_AGENTS.choose(rng).copied().unwrap_or(USER_AGENTS[0])
}

/// Turns a "WIDTHxHEIGHT" string into a track-selection expression: best
/// video track at exactly that pixel height in an mp4 container, plus the
/// best m4a audio track.
pub fn selection_for_resolution(resolution: &str) -> Result<String, AppError> {
    let height = resolution
        .split_once('x')
        .map(|(_, h)| h)
        .ok_or_else(|| {
            AppError::InvalidResolution(format!(
                "Invalid resolution '{resolution}': expected WIDTHxHEIGHT"
            ))
        })?;
    let height: u32 = height.parse().map_err(|_| {
        AppError::InvalidResolution(format!(
            "Invalid resolution '{resolution}': height is not an integer"
        ))
    })?;
    Ok(format!("bv[height={height}][ext=mp4]+ba[ext=m4a]"))
}

/// The options bag handed to the extraction engine for one request.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub output_template: Option<String>,
    pub format: Option<String>,
    pub proxy: Option<String>,
    pub user_agent: String,
    pub flat_playlist: bool,
    pub no_playlist: bool,
    pub overwrites: bool,
}

impl EngineOptions {
    /// Renders the options into yt-dlp argv. `download` switches between a
    /// metadata-only probe and an actual byte transfer; both dump the full
    /// info record as a single JSON document on stdout.
    fn command_args(&self, url: &str, download: bool) -> Vec<String> {
        let mut args: Vec<String> = vec!["--dump-single-json".into(), "--no-warnings".into()];
        if download {
            args.push("--no-simulate".into());
            args.push("--newline".into());
        }
        if self.flat_playlist {
            args.push("--flat-playlist".into());
        }
        if self.no_playlist {
            args.push("--no-playlist".into());
        }
        if self.overwrites {
            args.push("--force-overwrites".into());
        }
        if let Some(template) = &self.output_template {
            args.push("-o".into());
            args.push(template.clone());
        }
        if let Some(format) = &self.format {
            args.push("-f".into());
            args.push(format.clone());
        }
        if let Some(proxy) = &self.proxy {
            args.push("--proxy".into());
            args.push(proxy.clone());
        }
        args.push("--user-agent".into());
        args.push(self.user_agent.clone());
        args.push(url.to_string());
        args
    }
}

/// Options for a `/download` call: templated output path under the download
/// directory, single-video extraction, overwrite on collision. `format_id`
/// wins over `resolution`; with neither, the engine picks its default best.
pub fn build_download_options<R: Rng + ?Sized>(
    download_dir: &Path,
    resolution: Option<&str>,
    format_id: Option<&str>,
    proxy: Option<&str>,
    rng: &mut R,
) -> Result<EngineOptions, AppError> {
    let format = match (format_id, resolution) {
        (Some(id), _) if !id.is_empty() => Some(id.to_string()),
        (_, Some(res)) if !res.is_empty() => Some(selection_for_resolution(res)?),
        _ => None,
    };

    Ok(EngineOptions {
        output_template: Some(
            download_dir
                .join(OUTPUT_TEMPLATE)
                .to_string_lossy()
                .into_owned(),
        ),
        format,
        proxy: proxy.filter(|p| !p.is_empty()).map(str::to_string),
        user_agent: pick_user_agent(rng).to_string(),
        flat_playlist: false,
        no_playlist: true,
        overwrites: true,
    })
}

/// Options for a metadata-only query (resolution list, video list, details).
/// `flat_playlist` skips the per-entry fetch for collection pages.
pub fn build_probe_options<R: Rng + ?Sized>(
    proxy: Option<&str>,
    flat_playlist: bool,
    rng: &mut R,
) -> EngineOptions {
    EngineOptions {
        output_template: None,
        format: None,
        proxy: proxy.filter(|p| !p.is_empty()).map(str::to_string),
        user_agent: pick_user_agent(rng).to_string(),
        flat_playlist,
        no_playlist: false,
        overwrites: false,
    }
}

/// Runs the engine for one URL and returns its raw info record. With
/// `download` set the media file is transferred to disk as a side effect.
///
/// The call is sequential and unbounded: no timeout, no retry. Progress
/// lines on stderr are surfaced as tracing events while the transfer runs.
pub async fn extract_info(url: &str, opts: &EngineOptions, download: bool) -> anyhow::Result<Value> {
    let mut cmd = Command::new("yt-dlp");
    cmd.args(opts.command_args(url, download))
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn().context("Failed to start yt-dlp process")?;

    let stderr_task = child.stderr.take().map(|stderr| {
        tokio::spawn(async move {
            let reader = BufReader::new(stderr).lines();
            let mut lines = LinesStream::new(reader);
            let mut buffer = String::new();
            while let Some(Ok(line)) = lines.next().await {
                if let Some(caps) = PROGRESS_REGEX.captures(&line) {
                    tracing::info!(
                        "download progress: {}% of {}",
                        &caps["progress"],
                        &caps["size"]
                    );
                }
                buffer.push_str(&line);
                buffer.push('\n');
            }
            buffer
        })
    });

    let output = child.wait_with_output().await?;
    let stderr_text = match stderr_task {
        Some(task) => task.await.unwrap_or_default(),
        None => String::new(),
    };

    if !output.status.success() {
        let reason = stderr_text
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .unwrap_or("unknown error")
            .trim()
            .to_string();
        return Err(anyhow!("yt-dlp exited with {}: {}", output.status, reason));
    }

    serde_json::from_slice(&output.stdout).context("yt-dlp returned invalid JSON")
}
