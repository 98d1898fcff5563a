//! Configuration types for media-dl
//!
//! Loading configuration from a file is left to the embedding application;
//! everything here is plain serde data with defaults, plus [`Config::validate`]
//! which turns bad templates and settings into startup errors.

use crate::error::{Error, Result};
use crate::naming::Template;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Longest extension the naming engine stamps onto a file fragment (".m3u8").
const LONGEST_EXTENSION: usize = 5;

/// Output locations and file placement behavior
///
/// Used as a flattened sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Root directory for finalized files (default: "./Music")
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Root directory for per-run scratch folders (default: ".")
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Maximum length in characters of each path fragment (None = unlimited)
    #[serde(default)]
    pub truncate: Option<usize>,

    /// Characters that are replaced in every path fragment
    #[serde(default = "default_illegal_chars")]
    pub illegal_chars: String,

    /// Replacement for illegal characters and for trailing dots (default: '_')
    #[serde(default = "default_illegal_char_replacement")]
    pub illegal_char_replacement: char,

    /// Re-download items whose final path already exists
    #[serde(default)]
    pub overwrite: bool,

    /// Also write the cover image next to the media file
    #[serde(default)]
    pub save_cover: bool,

    /// Append finalized items to an .m3u8 playlist index when run in a playlist context
    #[serde(default)]
    pub save_playlist: bool,

    /// Keep the scratch folder of a failed item for inspection (default: false)
    #[serde(default)]
    pub keep_temp_on_failure: bool,

    /// Maximum number of items processed concurrently by the batch runner (default: 1)
    #[serde(default = "default_max_concurrent_items")]
    pub max_concurrent_items: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            temp_dir: default_temp_dir(),
            truncate: None,
            illegal_chars: default_illegal_chars(),
            illegal_char_replacement: default_illegal_char_replacement(),
            overwrite: false,
            save_cover: false,
            save_playlist: false,
            keep_temp_on_failure: false,
            max_concurrent_items: default_max_concurrent_items(),
        }
    }
}

/// Path templates
///
/// Each template is a slash-delimited list of fragments using `{placeholder}`
/// or `{placeholder:spec}` substitutions.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TemplateConfig {
    /// Folder template for regular albums
    #[serde(default = "default_album_folder_template")]
    pub album_folder: String,

    /// Folder template for compilation albums
    #[serde(default = "default_compilation_folder_template")]
    pub compilation_folder: String,

    /// Folder template for items without an album
    #[serde(default = "default_no_album_folder_template")]
    pub no_album_folder: String,

    /// File template for albums with a single disc (or unknown disc count)
    #[serde(default = "default_single_disc_file_template")]
    pub single_disc_file: String,

    /// File template for albums with more than one disc
    #[serde(default = "default_multi_disc_file_template")]
    pub multi_disc_file: String,

    /// File template for items without an album
    #[serde(default = "default_no_album_file_template")]
    pub no_album_file: String,

    /// Template for playlist index files (only `playlist_*` placeholders)
    #[serde(default = "default_playlist_file_template")]
    pub playlist_file: String,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            album_folder: default_album_folder_template(),
            compilation_folder: default_compilation_folder_template(),
            no_album_folder: default_no_album_folder_template(),
            single_disc_file: default_single_disc_file_template(),
            multi_disc_file: default_multi_disc_file_template(),
            no_album_file: default_no_album_file_template(),
            playlist_file: default_playlist_file_template(),
        }
    }
}

/// External tool paths and invocation settings
///
/// Explicit paths win; otherwise the default binary name is searched in PATH
/// when `search_path` is enabled.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Path to ffmpeg (auto-detected if None)
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Path to mp4decrypt (auto-detected if None)
    #[serde(default)]
    pub mp4decrypt_path: Option<PathBuf>,

    /// Path to MP4Box (auto-detected if None)
    #[serde(default)]
    pub mp4box_path: Option<PathBuf>,

    /// Path to the fallback decrypt tool, amdecrypt (auto-detected if None)
    #[serde(default)]
    pub amdecrypt_path: Option<PathBuf>,

    /// Path to N_m3u8DL-RE (auto-detected if None)
    #[serde(default)]
    pub nm3u8dlre_path: Option<PathBuf>,

    /// Path to yt-dlp (auto-detected if None)
    #[serde(default)]
    pub ytdlp_path: Option<PathBuf>,

    /// Whether to search PATH for binaries without an explicit path (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,

    /// Suppress stdout/stderr of external tools
    #[serde(default)]
    pub silent: bool,

    /// Timeout for a single external tool invocation (default: 1 hour)
    #[serde(default = "default_tool_timeout", with = "duration_serde")]
    pub tool_timeout: Duration,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            mp4decrypt_path: None,
            mp4box_path: None,
            amdecrypt_path: None,
            nm3u8dlre_path: None,
            ytdlp_path: None,
            search_path: true,
            silent: false,
            tool_timeout: default_tool_timeout(),
        }
    }
}

/// DRM credential and key settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DrmConfig {
    /// Device file used for license requests.
    ///
    /// When unset, the built-in default device is used; this is logged at
    /// startup so the substitution is never silent.
    #[serde(default)]
    pub device_path: Option<PathBuf>,

    /// Decrypt modern-codec songs with the fallback tool instead of mp4decrypt
    #[serde(default)]
    pub use_wrapper: bool,

    /// Catch-all key paired with the normalized default key-id (all zeros)
    #[serde(default = "default_song_decryption_key")]
    pub default_song_key: String,
}

impl Default for DrmConfig {
    fn default() -> Self {
        Self {
            device_path: None,
            use_wrapper: false,
            default_song_key: default_song_decryption_key(),
        }
    }
}

/// Settings shared by songs and music videos
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Stream fetch tool
    #[serde(default)]
    pub download_mode: DownloadMode,

    /// Remux backend
    #[serde(default)]
    pub remux_mode: RemuxMode,

    /// Cover image format requested from the metadata source
    #[serde(default)]
    pub cover_format: CoverFormat,

    /// Cover image edge length in pixels (default: 1200)
    #[serde(default = "default_cover_size")]
    pub cover_size: u32,

    /// Tag names excluded from tagging; "all" clears tags without writing new ones
    #[serde(default)]
    pub exclude_tags: Vec<String>,

    /// strftime pattern used to render the date tag
    #[serde(default = "default_date_tag_template")]
    pub date_tag_template: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_mode: DownloadMode::default(),
            remux_mode: RemuxMode::default(),
            cover_format: CoverFormat::default(),
            cover_size: default_cover_size(),
            exclude_tags: Vec::new(),
            date_tag_template: default_date_tag_template(),
        }
    }
}

impl DownloadConfig {
    /// Whether the "all" exclusion is set
    pub fn skip_all_tagging(&self) -> bool {
        self.exclude_tags.iter().any(|t| t == "all")
    }
}

/// Song-specific settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SongConfig {
    /// Requested song codec
    #[serde(default)]
    pub codec: SongCodec,

    /// Format of the synced lyrics file
    #[serde(default)]
    pub synced_lyrics_format: SyncedLyricsFormat,

    /// Do not write synced lyrics files
    #[serde(default)]
    pub no_synced_lyrics: bool,

    /// Only write synced lyrics, skip the media download
    #[serde(default)]
    pub synced_lyrics_only: bool,

    /// Use the album release date instead of the track date
    #[serde(default)]
    pub use_album_date: bool,

    /// Fetch additional source-specific tags
    #[serde(default)]
    pub fetch_extra_tags: bool,

    /// Transcode to a lossy audio-only output (mp3)
    #[serde(default)]
    pub remux_to_mp3: bool,

    /// Lossy bitrate tier name: low, mid, high or best (unknown names use mid)
    #[serde(default = "default_mp3_bitrate")]
    pub mp3_bitrate: String,
}

impl Default for SongConfig {
    fn default() -> Self {
        Self {
            codec: SongCodec::default(),
            synced_lyrics_format: SyncedLyricsFormat::default(),
            no_synced_lyrics: false,
            synced_lyrics_only: false,
            use_album_date: false,
            fetch_extra_tags: false,
            remux_to_mp3: false,
            mp3_bitrate: default_mp3_bitrate(),
        }
    }
}

/// Music-video-specific settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MusicVideoConfig {
    /// Codecs in order of preference
    #[serde(default = "default_music_video_codec_priority")]
    pub codec_priority: Vec<MusicVideoCodec>,

    /// Output container
    #[serde(default)]
    pub remux_format: RemuxFormatMusicVideo,

    /// Maximum resolution
    #[serde(default)]
    pub resolution: MusicVideoResolution,
}

impl Default for MusicVideoConfig {
    fn default() -> Self {
        Self {
            codec_priority: default_music_video_codec_priority(),
            remux_format: RemuxFormatMusicVideo::default(),
            resolution: MusicVideoResolution::default(),
        }
    }
}

/// Main configuration
///
/// Fields are organized into sub-configs:
/// - [`output`](OutputConfig) — directories, truncation, sanitization, placement
/// - [`templates`](TemplateConfig) — path templates
/// - [`tools`](ToolsConfig) — external binary paths
/// - [`drm`](DrmConfig) — credentials and default keys
/// - [`download`](DownloadConfig) — fetch/remux backends, covers, tagging
/// - [`song`](SongConfig) and [`music_video`](MusicVideoConfig)
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Output locations and placement
    #[serde(flatten)]
    pub output: OutputConfig,

    /// Path templates
    #[serde(default)]
    pub templates: TemplateConfig,

    /// External tool paths
    #[serde(flatten)]
    pub tools: ToolsConfig,

    /// DRM settings
    #[serde(default)]
    pub drm: DrmConfig,

    /// Shared download settings
    #[serde(flatten)]
    pub download: DownloadConfig,

    /// Song settings
    #[serde(default)]
    pub song: SongConfig,

    /// Music video settings
    #[serde(default)]
    pub music_video: MusicVideoConfig,
}

impl Config {
    /// Validate templates and settings
    ///
    /// Unknown placeholders, malformed templates and impossible truncation
    /// limits are configuration errors reported before any item runs.
    pub fn validate(&self) -> Result<()> {
        let media_templates = [
            ("templates.album_folder", &self.templates.album_folder),
            (
                "templates.compilation_folder",
                &self.templates.compilation_folder,
            ),
            ("templates.no_album_folder", &self.templates.no_album_folder),
            ("templates.single_disc_file", &self.templates.single_disc_file),
            ("templates.multi_disc_file", &self.templates.multi_disc_file),
            ("templates.no_album_file", &self.templates.no_album_file),
        ];
        for (key, source) in media_templates {
            Template::parse(source).map_err(|e| Error::config(key, e.to_string()))?;
        }

        let playlist = Template::parse(&self.templates.playlist_file)
            .map_err(|e| Error::config("templates.playlist_file", e.to_string()))?;
        if let Some(p) = playlist.placeholders().find(|p| !p.is_playlist()) {
            return Err(Error::config(
                "templates.playlist_file",
                format!("placeholder {{{}}} is not available in playlist templates", p.name()),
            ));
        }

        if let Some(limit) = self.output.truncate
            && limit <= LONGEST_EXTENSION
        {
            return Err(Error::config(
                "output.truncate",
                format!("truncate must be greater than {LONGEST_EXTENSION}, got {limit}"),
            ));
        }

        let replacement = self.output.illegal_char_replacement;
        if replacement == '/'
            || replacement.is_whitespace()
            || self.output.illegal_chars.contains(replacement)
        {
            return Err(Error::config(
                "output.illegal_char_replacement",
                format!("replacement {replacement:?} is itself an illegal character"),
            ));
        }

        if let Some(name) = self
            .download
            .exclude_tags
            .iter()
            .find(|t| *t != "all" && !crate::tagging::TAG_NAMES.contains(&t.as_str()))
        {
            return Err(Error::config(
                "download.exclude_tags",
                format!("unknown tag name {name:?}"),
            ));
        }

        if self.output.max_concurrent_items == 0 {
            return Err(Error::config(
                "output.max_concurrent_items",
                "at least one item must be allowed to run",
            ));
        }

        Ok(())
    }
}

/// Stream fetch tool
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadMode {
    /// yt-dlp (default)
    #[default]
    YtDlp,
    /// N_m3u8DL-RE
    Nm3u8DlRe,
}

/// Remux backend
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemuxMode {
    /// ffmpeg (default)
    #[default]
    Ffmpeg,
    /// GPAC MP4Box
    Mp4Box,
}

/// Cover image format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverFormat {
    /// JPEG (default)
    #[default]
    Jpg,
    /// PNG
    Png,
    /// Original upload format
    Raw,
}

/// Song codec
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SongCodec {
    /// AAC 256kbps, legacy key scheme (default)
    #[default]
    AacLegacy,
    /// HE-AAC, legacy key scheme
    AacHeLegacy,
    /// AAC 256kbps
    Aac,
    /// HE-AAC
    AacHe,
    /// AAC binaural
    AacBinaural,
    /// AAC downmix
    AacDownmix,
    /// HE-AAC binaural
    AacHeBinaural,
    /// HE-AAC downmix
    AacHeDownmix,
    /// Dolby Atmos
    Atmos,
    /// Dolby Digital
    Ac3,
    /// Apple Lossless
    Alac,
}

impl SongCodec {
    /// Whether the codec uses the legacy key scheme
    pub fn is_legacy(&self) -> bool {
        matches!(self, SongCodec::AacLegacy | SongCodec::AacHeLegacy)
    }
}

/// Music video codec
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MusicVideoCodec {
    /// H.264/AVC
    H264,
    /// H.265/HEVC
    H265,
}

/// Music video resolution cap
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MusicVideoResolution {
    /// 480p
    #[serde(rename = "480p")]
    R480p,
    /// 720p
    #[serde(rename = "720p")]
    R720p,
    /// 1080p (default)
    #[default]
    #[serde(rename = "1080p")]
    R1080p,
    /// 1440p
    #[serde(rename = "1440p")]
    R1440p,
    /// 2160p
    #[serde(rename = "2160p")]
    R2160p,
}

/// Music video output container
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemuxFormatMusicVideo {
    /// .m4v (default)
    #[default]
    M4v,
    /// .mp4
    Mp4,
}

impl RemuxFormatMusicVideo {
    /// File extension including the dot
    pub fn extension(&self) -> &'static str {
        match self {
            RemuxFormatMusicVideo::M4v => ".m4v",
            RemuxFormatMusicVideo::Mp4 => ".mp4",
        }
    }
}

/// Synced lyrics file format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncedLyricsFormat {
    /// LRC (default)
    #[default]
    Lrc,
    /// SubRip
    Srt,
    /// Timed Text Markup Language
    Ttml,
}

impl SyncedLyricsFormat {
    /// File extension without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            SyncedLyricsFormat::Lrc => "lrc",
            SyncedLyricsFormat::Srt => "srt",
            SyncedLyricsFormat::Ttml => "ttml",
        }
    }
}

/// Lossy output bitrate tier
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LossyBitrate {
    /// 128 kbps
    Low,
    /// 160 kbps
    Mid,
    /// 192 kbps
    High,
    /// 320 kbps
    Best,
}

impl LossyBitrate {
    /// Parse a tier name; unknown names fall back to [`LossyBitrate::Mid`]
    pub fn from_name(name: &str) -> Self {
        match name {
            "low" => LossyBitrate::Low,
            "mid" => LossyBitrate::Mid,
            "high" => LossyBitrate::High,
            "best" => LossyBitrate::Best,
            _ => LossyBitrate::Mid,
        }
    }

    /// Bitrate argument for the encoder
    pub fn as_arg(&self) -> &'static str {
        match self {
            LossyBitrate::Low => "128k",
            LossyBitrate::Mid => "160k",
            LossyBitrate::High => "192k",
            LossyBitrate::Best => "320k",
        }
    }
}

// Default value functions
fn default_output_dir() -> PathBuf {
    PathBuf::from("Music")
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_illegal_chars() -> String {
    r#"\/:*?"<>|;"#.to_string()
}

fn default_illegal_char_replacement() -> char {
    '_'
}

fn default_max_concurrent_items() -> usize {
    1
}

fn default_true() -> bool {
    true
}

fn default_tool_timeout() -> Duration {
    Duration::from_secs(60 * 60)
}

fn default_cover_size() -> u32 {
    1200
}

fn default_date_tag_template() -> String {
    "%Y-%m-%dT%H:%M:%SZ".to_string()
}

fn default_mp3_bitrate() -> String {
    "mid".to_string()
}

fn default_music_video_codec_priority() -> Vec<MusicVideoCodec> {
    vec![MusicVideoCodec::H264, MusicVideoCodec::H265]
}

fn default_album_folder_template() -> String {
    "{album_artist}/{album}".to_string()
}

fn default_compilation_folder_template() -> String {
    "Compilations/{album}".to_string()
}

fn default_no_album_folder_template() -> String {
    "{artist}/Unknown Album".to_string()
}

fn default_single_disc_file_template() -> String {
    "{track:02d} {title}".to_string()
}

fn default_multi_disc_file_template() -> String {
    "{disc}-{track:02d} {title}".to_string()
}

fn default_no_album_file_template() -> String {
    "{title}".to_string()
}

fn default_playlist_file_template() -> String {
    "Playlists/{playlist_artist}/{playlist_title}".to_string()
}

/// Built-in catch-all key for the normalized default key-id.
///
/// This is a published, well-known key shared by all clients; it is a
/// default configuration value, not a credential.
pub fn default_song_decryption_key() -> String {
    "32b8ade1769e26b1ffb8986352793fc6".to_string()
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.templates.single_disc_file, "{track:02d} {title}");
        assert_eq!(config.output.illegal_char_replacement, '_');
        assert_eq!(config.download.remux_mode, RemuxMode::Ffmpeg);
        assert_eq!(config.song.codec, SongCodec::AacLegacy);
        assert_eq!(config.output.max_concurrent_items, 1);
        assert!(config.tools.search_path);
    }

    #[test]
    fn test_unknown_placeholder_is_config_error() {
        let mut config = Config::default();
        config.templates.album_folder = "{album_artist}/{albun}".into();

        match config.validate() {
            Err(Error::Config { key, message }) => {
                assert_eq!(key.as_deref(), Some("templates.album_folder"));
                assert!(message.contains("albun"), "{message}");
            }
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn test_playlist_template_rejects_media_placeholders() {
        let mut config = Config::default();
        config.templates.playlist_file = "Playlists/{artist}".into();

        let err = config.validate().unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("artist"));
    }

    #[test]
    fn test_truncate_must_leave_room_for_extension() {
        let mut config = Config::default();
        config.output.truncate = Some(5);
        assert!(config.validate().is_err());

        config.output.truncate = Some(6);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_replacement_must_not_be_illegal() {
        let mut config = Config::default();
        config.output.illegal_char_replacement = '?';
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut config = Config::default();
        config.output.max_concurrent_items = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_exclude_tags_must_be_known() {
        let mut config = Config::default();
        config.download.exclude_tags = vec!["comment".into(), "cover".into()];
        assert!(config.validate().is_ok());
        config.download.exclude_tags = vec!["all".into()];
        assert!(config.validate().is_ok());
        config.download.exclude_tags = vec!["colour".into()];
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::Config { ref key, .. } if key.as_deref() == Some("download.exclude_tags")));
    }

    #[test]
    fn test_lossy_bitrate_tiers() {
        assert_eq!(LossyBitrate::from_name("low").as_arg(), "128k");
        assert_eq!(LossyBitrate::from_name("mid").as_arg(), "160k");
        assert_eq!(LossyBitrate::from_name("high").as_arg(), "192k");
        assert_eq!(LossyBitrate::from_name("best").as_arg(), "320k");
        assert_eq!(LossyBitrate::from_name("ultra"), LossyBitrate::Mid);
        assert_eq!(LossyBitrate::from_name(""), LossyBitrate::Mid);
    }

    #[test]
    fn test_legacy_codecs() {
        assert!(SongCodec::AacLegacy.is_legacy());
        assert!(SongCodec::AacHeLegacy.is_legacy());
        assert!(!SongCodec::Aac.is_legacy());
        assert!(!SongCodec::Alac.is_legacy());
    }

    #[test]
    fn test_skip_all_tagging() {
        let mut download = DownloadConfig::default();
        assert!(!download.skip_all_tagging());
        download.exclude_tags = vec!["comment".into(), "all".into()];
        assert!(download.skip_all_tagging());
    }

    #[test]
    fn test_config_deserializes_flattened_fields() {
        let json = r#"{
            "output_dir": "/music",
            "truncate": 64,
            "remux_mode": "mp4_box",
            "tool_timeout": 30,
            "song": { "codec": "aac-he", "remux_to_mp3": true, "mp3_bitrate": "best" },
            "templates": { "album_folder": "{artist}/{album}" }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();

        assert_eq!(config.output.output_dir, PathBuf::from("/music"));
        assert_eq!(config.output.truncate, Some(64));
        assert_eq!(config.download.remux_mode, RemuxMode::Mp4Box);
        assert_eq!(config.tools.tool_timeout, Duration::from_secs(30));
        assert_eq!(config.song.codec, SongCodec::AacHe);
        assert!(config.song.remux_to_mp3);
        assert_eq!(config.templates.album_folder, "{artist}/{album}");
        // untouched templates keep their defaults
        assert_eq!(config.templates.no_album_file, "{title}");
        config.validate().unwrap();
    }
}
