//! yt-dlp backend
//!
//! Probes with `yt-dlp -J` and fetches with a format directive derived from
//! the selector. Progress is read from a machine-friendly progress template on
//! stdout; errors are classified from stderr.

// lazy_regex! validates patterns at compile time and uses once_cell internally
#![allow(clippy::non_std_lazy_statics)]

use super::backend::{FetchRequest, MediaBackend, MediaInfo};
use super::{Selector, SourceUrl};
use crate::error::JobError;
use crate::progress::ProgressReporter;
use crate::utils::{tail_lines, truncate_str};
use async_trait::async_trait;
use lazy_regex::lazy_regex;
use serde::Deserialize;
use std::collections::VecDeque;
use std::process::Stdio;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, trace, warn};

/// Emits `[progress] <downloaded> <total> <estimate>` once per line
const PROGRESS_TEMPLATE: &str = "download:[progress] %(progress.downloaded_bytes)s %(progress.total_bytes)s %(progress.total_bytes_estimate)s";

/// Match progress template lines
static RE_PROGRESS: lazy_regex::Lazy<regex::Regex> =
    lazy_regex!(r"^\[progress\]\s+(\S+)\s+(\S+)\s+(\S+)");

/// Match post-processor banners (merge, audio extraction, remux, fixups)
static RE_POSTPROCESS: lazy_regex::Lazy<regex::Regex> =
    lazy_regex!(r"^\[(Merger|ExtractAudio|VideoRemuxer|VideoConvertor|Fixup\w*)\]");

/// yt-dlp message when no stream matches the format directive
const FORMAT_UNAVAILABLE: &str = "Requested format is not available";

/// Patterns meaning the source itself cannot be served
const UNAVAILABLE_SOURCE_PATTERNS: &[&str] = &[
    "Video unavailable",
    "Private video",
    "This video is not available",
    "Sign in to confirm your age",
    "members-only",
    "This video is private",
    "removed by the uploader",
    "no longer available",
    "blocked it in your country",
    "geo-restricted",
    "This video has been removed",
    "Unsupported URL",
    "is not a valid URL",
    "Unable to extract video data",
    "HTTP Error 403",
    "HTTP Error 404",
];

/// Lines of stderr kept for error reporting
const STDERR_TAIL_LINES: usize = 40;

/// Maximum characters of backend output attached to an error
const MAX_ERROR_CHARS: usize = 400;

/// One classified line of yt-dlp stdout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputLine {
    /// Download progress in bytes; `total` is unknown for some sources
    Progress {
        /// Bytes downloaded so far
        done: u64,
        /// Exact or estimated total size
        total: Option<u64>,
    },
    /// A post-processor (merge/transcode/remux) started
    Postprocessing,
    /// Anything else
    Other,
}

/// Classify one line of yt-dlp stdout.
#[must_use]
pub fn classify_line(line: &str) -> OutputLine {
    let line = line.trim();
    if let Some(caps) = RE_PROGRESS.captures(line) {
        let field = |i: usize| caps.get(i).and_then(|m| parse_byte_count(m.as_str()));
        if let Some(done) = field(1) {
            return OutputLine::Progress {
                done,
                total: field(2).or_else(|| field(3)),
            };
        }
        return OutputLine::Other;
    }
    if RE_POSTPROCESS.is_match(line) {
        return OutputLine::Postprocessing;
    }
    OutputLine::Other
}

/// Parse a byte count printed by yt-dlp (`NA`, integers and float estimates).
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn parse_byte_count(raw: &str) -> Option<u64> {
    let value: f64 = raw.parse().ok()?;
    if value.is_finite() && value >= 0.0 {
        Some(value as u64)
    } else {
        None
    }
}

/// Check if backend output says the source cannot be served at all
fn is_unavailable_source(stderr: &str) -> bool {
    UNAVAILABLE_SOURCE_PATTERNS
        .iter()
        .any(|pattern| stderr.contains(pattern))
}

/// Pick the most useful message out of yt-dlp stderr.
fn error_summary(stderr: &str) -> String {
    let summary = stderr
        .lines()
        .rev()
        .find_map(|line| line.trim().strip_prefix("ERROR:"))
        .map(|msg| msg.trim().to_string())
        .unwrap_or_else(|| tail_lines(stderr, 3));

    if summary.is_empty() {
        "yt-dlp exited without an error message".to_string()
    } else {
        truncate_str(summary, MAX_ERROR_CHARS)
    }
}

/// Map a failed fetch to the job failure taxonomy.
#[must_use]
pub fn classify_fetch_error(stderr: &str, selector: Selector) -> JobError {
    if stderr.contains(FORMAT_UNAVAILABLE) {
        return match selector {
            Selector::Video { .. } => JobError::QualityUnavailable {
                label: selector.label(),
            },
            Selector::AudioOnly => JobError::BackendFailure(error_summary(stderr)),
        };
    }
    if is_unavailable_source(stderr) {
        return JobError::UnresolvableSource(error_summary(stderr));
    }
    JobError::BackendFailure(error_summary(stderr))
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(rename = "_type")]
    kind: Option<String>,
    title: Option<String>,
    #[serde(default)]
    formats: Vec<ProbeFormat>,
    height: Option<u32>,
    vcodec: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    height: Option<u32>,
    vcodec: Option<String>,
}

/// Streams without a video codec report `vcodec: "none"`
fn carries_video(vcodec: Option<&str>) -> bool {
    vcodec != Some("none")
}

/// Parse `yt-dlp -J` output into [`MediaInfo`].
///
/// # Errors
///
/// Returns `JobError::UnresolvableSource` if the JSON is not a single video.
pub fn parse_probe_output(json: &str) -> Result<MediaInfo, JobError> {
    let probe: ProbeOutput = serde_json::from_str(json)
        .map_err(|e| JobError::UnresolvableSource(format!("unexpected metadata: {e}")))?;

    if matches!(probe.kind.as_deref(), Some("playlist" | "multi_video")) {
        return Err(JobError::UnresolvableSource(
            "playlists are not supported".to_string(),
        ));
    }

    let mut heights: Vec<u32> = probe
        .formats
        .iter()
        .filter(|f| carries_video(f.vcodec.as_deref()))
        .filter_map(|f| f.height)
        .collect();

    if probe.formats.is_empty() && carries_video(probe.vcodec.as_deref()) {
        heights.extend(probe.height);
    }

    heights.retain(|h| *h > 0);
    heights.sort_unstable_by(|a, b| b.cmp(a));
    heights.dedup();

    Ok(MediaInfo {
        title: probe.title.filter(|t| !t.trim().is_empty()),
        heights,
    })
}

/// Next line of `reader`, invalid UTF-8 replaced, `None` at end of stream
async fn next_lossy_line<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    buf: &mut Vec<u8>,
) -> std::io::Result<Option<String>> {
    buf.clear();
    if reader.read_until(b'\n', buf).await? == 0 {
        return Ok(None);
    }
    let line = String::from_utf8_lossy(buf);
    Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
}

/// Read a pipe to the end, keeping only its last lines.
async fn collect_tail<R: AsyncRead + Unpin>(reader: R) -> String {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
    while let Ok(Some(line)) = next_lossy_line(&mut reader, &mut buf).await {
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    Vec::from(tail).join("\n")
}

/// Backend driving a local yt-dlp executable (ffmpeg required for merging
/// and audio extraction)
#[derive(Debug, Clone)]
pub struct YtDlpBackend {
    binary: String,
    audio_bitrate_kbps: u32,
}

impl YtDlpBackend {
    /// Create a backend invoking `binary`
    #[must_use]
    pub fn new(binary: impl Into<String>, audio_bitrate_kbps: u32) -> Self {
        Self {
            binary: binary.into(),
            audio_bitrate_kbps,
        }
    }

    /// Arguments of the metadata probe
    #[must_use]
    pub fn probe_args(source: &SourceUrl) -> Vec<String> {
        vec![
            "-J".to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--".to_string(),
            source.as_str().to_string(),
        ]
    }

    /// Arguments of a fetch, including the selector's format directive
    #[must_use]
    pub fn fetch_args(&self, request: &FetchRequest) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--newline".to_string(),
            "--progress".to_string(),
            "--progress-template".to_string(),
            PROGRESS_TEMPLATE.to_string(),
            "-o".to_string(),
            request.output_template().to_string_lossy().into_owned(),
        ];

        match request.selector {
            Selector::AudioOnly => {
                // The raw best-audio stream is often webm/opus; transcode explicitly
                args.extend([
                    "-f".to_string(),
                    "bestaudio/best".to_string(),
                    "-x".to_string(),
                    "--audio-format".to_string(),
                    "mp3".to_string(),
                    "--audio-quality".to_string(),
                    format!("{}K", self.audio_bitrate_kbps),
                ]);
            }
            Selector::Video { height } => {
                args.extend([
                    "-f".to_string(),
                    format!("bestvideo[height<={height}]+bestaudio/best[height<={height}]"),
                    "--merge-output-format".to_string(),
                    "mp4".to_string(),
                    "--remux-video".to_string(),
                    "mp4".to_string(),
                ]);
            }
        }

        args.push("--".to_string());
        args.push(request.source.as_str().to_string());
        args
    }

    /// Version reported by the executable
    ///
    /// # Errors
    ///
    /// Returns `JobError::BackendFailure` if the executable cannot be run.
    pub async fn version(&self) -> Result<String, JobError> {
        let output = self
            .command(&["--version".to_string()])
            .output()
            .await
            .map_err(|e| JobError::BackendFailure(format!("failed to start {}: {e}", self.binary)))?;
        if !output.status.success() {
            return Err(JobError::BackendFailure(error_summary(
                &String::from_utf8_lossy(&output.stderr),
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Only the yt-dlp process itself is killed when the command is dropped.
    /// An ffmpeg merge or transcode it spawned runs to its own end, writing
    /// into an already removed scratch directory.
    fn command(&self, args: &[String]) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Timeouts drop the future; the child must not outlive it
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl MediaBackend for YtDlpBackend {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn probe(&self, source: &SourceUrl) -> Result<MediaInfo, JobError> {
        let args = Self::probe_args(source);
        debug!(host = %source.host(), "Probing source with yt-dlp");

        let output = self
            .command(&args)
            .output()
            .await
            .map_err(|e| JobError::BackendFailure(format!("failed to start {}: {e}", self.binary)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(status = %output.status, "yt-dlp probe failed");
            return Err(JobError::UnresolvableSource(error_summary(&stderr)));
        }

        parse_probe_output(&String::from_utf8_lossy(&output.stdout))
    }

    async fn fetch(
        &self,
        request: &FetchRequest,
        progress: &ProgressReporter,
    ) -> Result<(), JobError> {
        let args = self.fetch_args(request);
        debug!(selector = %request.selector, "Starting yt-dlp fetch");

        let mut child = self
            .command(&args)
            .spawn()
            .map_err(|e| JobError::BackendFailure(format!("failed to start {}: {e}", self.binary)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| JobError::BackendFailure("yt-dlp stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| JobError::BackendFailure("yt-dlp stderr not captured".to_string()))?;

        let stderr_task = tokio::spawn(collect_tail(stderr));

        let mut stdout = BufReader::new(stdout);
        let mut buf = Vec::new();
        while let Some(line) = next_lossy_line(&mut stdout, &mut buf).await? {
            match classify_line(&line) {
                OutputLine::Progress { done, total } => {
                    progress.on_download_progress(done, total.unwrap_or(0));
                }
                OutputLine::Postprocessing => progress.on_postprocessing(),
                OutputLine::Other => trace!(line = %line, "yt-dlp output"),
            }
        }

        let status = child.wait().await?;
        let stderr_tail = stderr_task.await.unwrap_or_default();

        if status.success() {
            Ok(())
        } else {
            let err = classify_fetch_error(&stderr_tail, request.selector);
            warn!(status = %status, error = %err, "yt-dlp fetch failed");
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_progress_lines() {
        assert_eq!(
            classify_line("[progress] 1024 4096 NA"),
            OutputLine::Progress {
                done: 1024,
                total: Some(4096)
            }
        );
        assert_eq!(
            classify_line("[progress] 2048 NA 8192.5"),
            OutputLine::Progress {
                done: 2048,
                total: Some(8192)
            }
        );
        assert_eq!(
            classify_line("[progress] 10 NA NA"),
            OutputLine::Progress {
                done: 10,
                total: None
            }
        );
        assert_eq!(classify_line("[progress] NA NA NA"), OutputLine::Other);
    }

    #[test]
    fn classifies_postprocessing_lines() {
        assert_eq!(
            classify_line("[Merger] Merging formats into \"x/media.mp4\""),
            OutputLine::Postprocessing
        );
        assert_eq!(
            classify_line("[ExtractAudio] Destination: x/media.mp3"),
            OutputLine::Postprocessing
        );
        assert_eq!(
            classify_line("[FixupM3u8] Fixing MPEG-TS in MP4 container"),
            OutputLine::Postprocessing
        );
        assert_eq!(
            classify_line("[youtube] abc: Downloading webpage"),
            OutputLine::Other
        );
    }

    #[test]
    fn format_unavailable_maps_to_quality_unavailable() {
        let stderr = "[youtube] abc: Downloading webpage\nERROR: [youtube] abc: Requested format is not available. Use --list-formats for a list of available formats";
        assert_eq!(
            classify_fetch_error(stderr, Selector::Video { height: 720 }),
            JobError::QualityUnavailable {
                label: "720p".to_string()
            }
        );
    }

    #[test]
    fn unavailable_source_and_generic_failures() {
        let private = "ERROR: [youtube] abc: Private video. Sign in if you've been granted access";
        assert!(matches!(
            classify_fetch_error(private, Selector::AudioOnly),
            JobError::UnresolvableSource(msg) if msg.contains("Private video")
        ));

        let ffmpeg = "WARNING: something\nERROR: Postprocessing: ffmpeg not found";
        assert_eq!(
            classify_fetch_error(ffmpeg, Selector::AudioOnly),
            JobError::BackendFailure("Postprocessing: ffmpeg not found".to_string())
        );

        assert!(matches!(
            classify_fetch_error("", Selector::AudioOnly),
            JobError::BackendFailure(msg) if msg.contains("without an error message")
        ));
    }

    #[test]
    fn parses_probe_json() -> Result<(), JobError> {
        let json = r#"{
            "title": "Test clip",
            "formats": [
                {"format_id": "140", "height": null, "vcodec": "none"},
                {"format_id": "18", "height": 360, "vcodec": "avc1.42001E"},
                {"format_id": "135", "height": 480, "vcodec": "avc1.4d401f"},
                {"format_id": "136", "height": 720, "vcodec": "avc1.4d401f"},
                {"format_id": "247", "height": 720, "vcodec": "vp9"},
                {"format_id": "sb0", "height": 90, "vcodec": "none"}
            ]
        }"#;
        let info = parse_probe_output(json)?;
        assert_eq!(info.title.as_deref(), Some("Test clip"));
        assert_eq!(info.heights, vec![720, 480, 360]);
        Ok(())
    }

    #[test]
    fn probe_json_without_formats_uses_top_level_height() -> Result<(), JobError> {
        let info = parse_probe_output(r#"{"title": "", "height": 540, "vcodec": "h264"}"#)?;
        assert_eq!(info.title, None);
        assert_eq!(info.heights, vec![540]);

        let audio = parse_probe_output(r#"{"title": "Podcast", "vcodec": "none"}"#)?;
        assert!(audio.heights.is_empty());
        Ok(())
    }

    #[test]
    fn probe_garbage_is_unresolvable() {
        assert!(matches!(
            parse_probe_output("not json"),
            Err(JobError::UnresolvableSource(_))
        ));
    }

    #[test]
    fn playlist_metadata_is_unresolvable() {
        let playlist = r#"{"_type":"playlist","title":"My mix","entries":[
            {"title":"a","formats":[{"height":720,"vcodec":"avc1"}]},
            {"title":"b","formats":[{"height":480,"vcodec":"avc1"}]}]}"#;
        assert_eq!(
            parse_probe_output(playlist),
            Err(JobError::UnresolvableSource(
                "playlists are not supported".to_string()
            ))
        );

        let multi = r#"{"_type":"multi_video","title":"Parts","entries":[]}"#;
        assert!(matches!(
            parse_probe_output(multi),
            Err(JobError::UnresolvableSource(_))
        ));

        let single = r#"{"_type":"video","title":"Clip","formats":[{"height":360,"vcodec":"avc1"}]}"#;
        assert_eq!(parse_probe_output(single).map(|i| i.heights), Ok(vec![360]));
    }

    #[tokio::test]
    async fn stderr_tail_survives_invalid_utf8() {
        let stderr: &[u8] = b"first\n\xff\xfe broken\r\nERROR: last words\n";
        let tail = collect_tail(stderr).await;
        let lines: Vec<&str> = tail.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "first");
        assert!(lines[1].ends_with(" broken"));
        assert_eq!(lines[2], "ERROR: last words");
    }

    #[test]
    fn fetch_args_carry_format_directive() -> Result<(), JobError> {
        let backend = YtDlpBackend::new("yt-dlp", 192);
        let source = SourceUrl::parse("https://example.com/watch?v=abc")?;

        let video = backend.fetch_args(&FetchRequest::new(
            source.clone(),
            Selector::Video { height: 720 },
            "/tmp/job",
        ));
        assert!(video
            .iter()
            .any(|a| a == "bestvideo[height<=720]+bestaudio/best[height<=720]"));
        assert!(video.iter().any(|a| a == "--merge-output-format"));
        assert_eq!(video.last().map(String::as_str), Some(source.as_str()));
        assert_eq!(video[video.len() - 2], "--");

        let audio = backend.fetch_args(&FetchRequest::new(source, Selector::AudioOnly, "/tmp/job"));
        assert!(audio.iter().any(|a| a == "-x"));
        assert!(audio.iter().any(|a| a == "192K"));
        assert!(audio.iter().any(|a| a == "/tmp/job/media.%(ext)s"));
        Ok(())
    }
}
