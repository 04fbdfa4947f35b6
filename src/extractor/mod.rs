//! Metadata extraction via the external yt-dlp tool.
//!
//! The service never parses media containers itself: `yt-dlp -j` is invoked
//! as a subprocess and its JSON output is deserialized into [`MediaInfo`].
//! This module also holds the presentation rules built on top of that info:
//! preview format deduplication and the download format selector.

use std::path::PathBuf;
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::utils::process;

/// Minimum vertical resolution shown in previews.
const MIN_PREVIEW_HEIGHT: u32 = 144;

/// Media info as reported by `yt-dlp -j`.
///
/// Only the fields the service consumes are modeled; unknown fields are
/// dropped. The same type deserializes the cached `info` payload a client
/// may send back with a start-download request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaInfo {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub view_count: Option<u64>,
    #[serde(default)]
    pub formats: Vec<MediaFormat>,
}

/// One encoding entry from the yt-dlp format list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaFormat {
    #[serde(default)]
    pub format_id: Option<String>,
    #[serde(default)]
    pub ext: Option<String>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub vcodec: Option<String>,
    #[serde(default)]
    pub acodec: Option<String>,
    #[serde(default)]
    pub filesize: Option<u64>,
    #[serde(default)]
    pub filesize_approx: Option<u64>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub format_note: Option<String>,
    #[serde(default)]
    pub protocol: Option<String>,
}

impl MediaFormat {
    /// Whether the entry carries a video track.
    pub fn has_video(&self) -> bool {
        codec_present(self.vcodec.as_deref())
    }

    /// Whether the entry carries an audio track.
    pub fn has_audio(&self) -> bool {
        codec_present(self.acodec.as_deref())
    }

    /// Reported byte size, preferring the exact figure over the estimate.
    pub fn reported_size(&self) -> u64 {
        self.filesize.or(self.filesize_approx).unwrap_or(0)
    }

    fn is_mp4(&self) -> bool {
        self.ext.as_deref() == Some("mp4")
    }

    /// Storyboard/thumbnail-sheet pseudo-formats and other non-fetchable
    /// entries that must never appear in a preview.
    fn is_excluded_from_preview(&self) -> bool {
        if matches!(self.protocol.as_deref(), Some("mhtml") | Some("https_html")) {
            return true;
        }
        if let Some(id) = self.format_id.as_deref()
            && let Some(rest) = id.strip_prefix("sb")
            && rest.chars().next().is_some_and(|c| c.is_ascii_digit())
        {
            return true;
        }
        if let Some(note) = self.format_note.as_deref()
            && (note.contains("storyboard") || note.contains("default"))
        {
            return true;
        }
        false
    }
}

fn codec_present(codec: Option<&str>) -> bool {
    matches!(codec, Some(c) if !c.is_empty() && c != "none")
}

/// One deduplicated preview entry.
#[derive(Debug, Clone, Serialize)]
pub struct PreviewFormat {
    pub format_id: Option<String>,
    pub ext: Option<String>,
    pub quality: String,
    pub filesize: Option<u64>,
    pub acodec: Option<String>,
    pub vcodec: Option<String>,
    pub url: Option<String>,
    pub note: Option<String>,
}

/// Human-readable quality label for a vertical resolution.
pub fn quality_label(height: u32) -> String {
    let mut label = format!("{height}p");
    if height >= 2160 {
        label.push_str(" 4K");
    }
    if height >= 1440 {
        label.push_str(" 2K");
    }
    if height == 1080 {
        label.push_str(" HD");
    }
    label
}

/// Deduplicate the raw format list for presentation.
///
/// One entry per vertical resolution: mp4 wins over other containers, and
/// among equal container preference the larger reported size wins. Audio-only
/// entries, storyboards and anything below 144p are excluded. The result is
/// sorted by height descending.
pub fn build_preview_formats(info: &MediaInfo) -> Vec<PreviewFormat> {
    let mut by_height: Vec<&MediaFormat> = Vec::new();

    for f in &info.formats {
        if f.is_excluded_from_preview() || !f.has_video() {
            continue;
        }
        let Some(height) = f.height.filter(|h| *h >= MIN_PREVIEW_HEIGHT) else {
            continue;
        };

        match by_height.iter().position(|e| e.height == Some(height)) {
            None => by_height.push(f),
            Some(idx) => {
                let existing = by_height[idx];
                let replace = if f.is_mp4() != existing.is_mp4() {
                    f.is_mp4()
                } else {
                    f.reported_size() > existing.reported_size()
                };
                if replace {
                    by_height[idx] = f;
                }
            }
        }
    }

    by_height.sort_by(|a, b| b.height.cmp(&a.height));

    by_height
        .into_iter()
        .map(|f| PreviewFormat {
            format_id: f.format_id.clone(),
            ext: f.ext.clone(),
            quality: quality_label(f.height.unwrap_or(0)),
            filesize: (f.reported_size() > 0).then(|| f.reported_size()),
            acodec: f.acodec.clone(),
            vcodec: f.vcodec.clone(),
            url: f.url.clone(),
            note: f.format_note.clone(),
        })
        .collect()
}

/// Pick the direct preview URL from the deduplicated formats.
///
/// First candidate offering both tracks with a direct URL wins; otherwise
/// the first video-only candidate; otherwise none (clients fall back to the
/// thumbnail).
pub fn pick_preview_url(formats: &[PreviewFormat]) -> Option<String> {
    let playable = |f: &&PreviewFormat| {
        f.url.is_some()
            && matches!(f.ext.as_deref(), Some("mp4") | Some("webm"))
            && codec_present(f.vcodec.as_deref())
    };

    formats
        .iter()
        .filter(playable)
        .find(|f| codec_present(f.acodec.as_deref()))
        .or_else(|| formats.iter().find(playable))
        .and_then(|f| f.url.clone())
}

/// Output kind requested for a download.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    #[default]
    Video,
    Audio,
}

impl OutputKind {
    /// File extension of the produced artifact.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Video => "mp4",
            Self::Audio => "mp3",
        }
    }

    /// MIME type of the produced artifact.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Video => "video/mp4",
            Self::Audio => "audio/mpeg",
        }
    }
}

/// Compute the yt-dlp format selector for a download request.
///
/// Audio requests always take the best audio stream. An explicit video
/// format id that has no paired audio track is combined with `bestaudio`;
/// with no explicit format the generic best-video+best-audio fallback is
/// used.
pub fn select_format(info: &MediaInfo, kind: OutputKind, format: Option<&str>) -> String {
    if kind == OutputKind::Audio {
        return "bestaudio".to_string();
    }

    match format {
        Some(id) => {
            let entry = info
                .formats
                .iter()
                .find(|f| f.format_id.as_deref() == Some(id));
            match entry {
                Some(f) if f.has_video() && !f.has_audio() => format!("{id}+bestaudio"),
                _ => id.to_string(),
            }
        }
        None => "bestvideo+bestaudio/best".to_string(),
    }
}

/// Vertical resolution of an explicitly selected video format, if known.
/// Used for the ` - {height}p` suffix on the user-facing filename.
pub fn selected_height(info: &MediaInfo, kind: OutputKind, format: Option<&str>) -> Option<u32> {
    if kind == OutputKind::Audio {
        return None;
    }
    let id = format?;
    info.formats
        .iter()
        .find(|f| f.format_id.as_deref() == Some(id))
        .and_then(|f| f.height)
}

/// Client for the external metadata facility.
#[derive(Debug, Clone)]
pub struct MetadataClient {
    ytdlp_path: String,
    cookies_file: Option<PathBuf>,
}

impl MetadataClient {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            ytdlp_path: config.ytdlp_path.clone(),
            cookies_file: config.existing_cookies_file().cloned(),
        }
    }

    /// Fetch media info for a URL by running `yt-dlp -j`.
    ///
    /// Failures (spawn errors, non-zero exit, unparseable output) surface as
    /// [`Error::Metadata`] with the tool's stderr attached for diagnostics.
    pub async fn fetch(&self, url: &str) -> Result<MediaInfo> {
        debug!("fetching media info for {}", url);

        let mut command = process::command(&self.ytdlp_path);
        if let Some(cookies) = &self.cookies_file {
            command.arg("--cookies").arg(cookies);
        }
        command
            .arg("--force-ipv4")
            .arg("-j")
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let output = command
            .output()
            .await
            .map_err(|e| Error::Metadata(format!("failed to run {}: {}", self.ytdlp_path, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Metadata(stderr.trim().to_string()));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| Error::Metadata(format!("unparseable yt-dlp output: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video_format(id: &str, ext: &str, height: u32, size: u64) -> MediaFormat {
        MediaFormat {
            format_id: Some(id.to_string()),
            ext: Some(ext.to_string()),
            height: Some(height),
            vcodec: Some("avc1".to_string()),
            acodec: Some("none".to_string()),
            filesize: Some(size),
            ..Default::default()
        }
    }

    #[test]
    fn test_dedup_prefers_mp4_at_equal_height() {
        let info = MediaInfo {
            formats: vec![
                video_format("248", "webm", 1080, 1000),
                video_format("137", "mp4", 1080, 1000),
            ],
            ..Default::default()
        };

        let formats = build_preview_formats(&info);
        assert_eq!(formats.len(), 1);
        assert_eq!(formats[0].format_id.as_deref(), Some("137"));
        assert_eq!(formats[0].ext.as_deref(), Some("mp4"));
    }

    #[test]
    fn test_dedup_prefers_larger_size_among_equal_containers() {
        let info = MediaInfo {
            formats: vec![
                video_format("a", "mp4", 720, 500),
                video_format("b", "mp4", 720, 900),
            ],
            ..Default::default()
        };

        let formats = build_preview_formats(&info);
        assert_eq!(formats.len(), 1);
        assert_eq!(formats[0].format_id.as_deref(), Some("b"));
    }

    #[test]
    fn test_mp4_not_displaced_by_larger_webm() {
        let info = MediaInfo {
            formats: vec![
                video_format("137", "mp4", 1080, 100),
                video_format("248", "webm", 1080, 90_000),
            ],
            ..Default::default()
        };

        let formats = build_preview_formats(&info);
        assert_eq!(formats[0].format_id.as_deref(), Some("137"));
    }

    #[test]
    fn test_low_res_storyboards_and_audio_excluded() {
        let mut storyboard = video_format("sb0", "mhtml", 480, 0);
        storyboard.protocol = Some("mhtml".to_string());
        let audio_only = MediaFormat {
            format_id: Some("140".to_string()),
            ext: Some("m4a".to_string()),
            vcodec: Some("none".to_string()),
            acodec: Some("mp4a".to_string()),
            ..Default::default()
        };
        let info = MediaInfo {
            formats: vec![
                storyboard,
                audio_only,
                video_format("sb1", "mp4", 360, 10),
                video_format("tiny", "mp4", 100, 10),
                video_format("ok", "mp4", 360, 10),
            ],
            ..Default::default()
        };

        let formats = build_preview_formats(&info);
        assert_eq!(formats.len(), 1);
        assert_eq!(formats[0].format_id.as_deref(), Some("ok"));
    }

    #[test]
    fn test_sorted_by_height_descending() {
        let info = MediaInfo {
            formats: vec![
                video_format("a", "mp4", 360, 1),
                video_format("b", "mp4", 1080, 1),
                video_format("c", "mp4", 720, 1),
            ],
            ..Default::default()
        };

        let heights: Vec<String> = build_preview_formats(&info)
            .into_iter()
            .map(|f| f.quality)
            .collect();
        assert_eq!(heights, vec!["1080p HD", "720p", "360p"]);
    }

    #[test]
    fn test_quality_labels() {
        assert_eq!(quality_label(360), "360p");
        assert_eq!(quality_label(1080), "1080p HD");
        assert_eq!(quality_label(1440), "1440p 2K");
        assert_eq!(quality_label(2160), "2160p 4K 2K");
    }

    #[test]
    fn test_preview_url_prefers_both_tracks() {
        let mut muxed = video_format("18", "mp4", 360, 1);
        muxed.acodec = Some("mp4a".to_string());
        muxed.url = Some("https://cdn/muxed".to_string());
        let mut video_only = video_format("137", "mp4", 1080, 1);
        video_only.url = Some("https://cdn/video-only".to_string());

        let info = MediaInfo {
            formats: vec![video_only, muxed],
            ..Default::default()
        };
        let formats = build_preview_formats(&info);
        assert_eq!(
            pick_preview_url(&formats).as_deref(),
            Some("https://cdn/muxed")
        );
    }

    #[test]
    fn test_preview_url_falls_back_to_video_only() {
        let mut video_only = video_format("137", "mp4", 1080, 1);
        video_only.url = Some("https://cdn/video-only".to_string());
        let info = MediaInfo {
            formats: vec![video_only],
            ..Default::default()
        };
        let formats = build_preview_formats(&info);
        assert_eq!(
            pick_preview_url(&formats).as_deref(),
            Some("https://cdn/video-only")
        );
    }

    #[test]
    fn test_preview_url_absent_without_direct_urls() {
        let info = MediaInfo {
            formats: vec![video_format("137", "mp4", 1080, 1)],
            ..Default::default()
        };
        let formats = build_preview_formats(&info);
        assert!(pick_preview_url(&formats).is_none());
    }

    #[test]
    fn test_select_format_audio() {
        let info = MediaInfo::default();
        assert_eq!(select_format(&info, OutputKind::Audio, Some("137")), "bestaudio");
    }

    #[test]
    fn test_select_format_pairs_video_only_with_bestaudio() {
        let info = MediaInfo {
            formats: vec![video_format("137", "mp4", 1080, 1)],
            ..Default::default()
        };
        assert_eq!(
            select_format(&info, OutputKind::Video, Some("137")),
            "137+bestaudio"
        );
    }

    #[test]
    fn test_select_format_muxed_kept_as_is() {
        let mut muxed = video_format("18", "mp4", 360, 1);
        muxed.acodec = Some("mp4a".to_string());
        let info = MediaInfo {
            formats: vec![muxed],
            ..Default::default()
        };
        assert_eq!(select_format(&info, OutputKind::Video, Some("18")), "18");
    }

    #[test]
    fn test_select_format_default_fallback() {
        let info = MediaInfo::default();
        assert_eq!(
            select_format(&info, OutputKind::Video, None),
            "bestvideo+bestaudio/best"
        );
    }

    #[test]
    fn test_media_info_deserializes_partial_json() {
        let json = r#"{
            "title": "Some Clip",
            "view_count": 42,
            "formats": [
                {"format_id": "137", "ext": "mp4", "height": 1080, "vcodec": "avc1", "acodec": "none"},
                {"format_id": "140", "ext": "m4a", "vcodec": "none", "acodec": "mp4a", "unknown_field": true}
            ]
        }"#;
        let info: MediaInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.title.as_deref(), Some("Some Clip"));
        assert_eq!(info.formats.len(), 2);
        assert!(info.formats[0].has_video());
        assert!(!info.formats[0].has_audio());
        assert!(info.formats[1].has_audio());
    }

    #[test]
    fn test_output_kind_extensions() {
        assert_eq!(OutputKind::Video.extension(), "mp4");
        assert_eq!(OutputKind::Audio.extension(), "mp3");
        assert_eq!(OutputKind::Audio.mime_type(), "audio/mpeg");
    }
}
