//! Core types for media-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use url::Url;

/// Source-specific tags written verbatim into MP4 containers (freeform atoms)
pub type ExtraTags = BTreeMap<String, String>;

/// Kind of media an item resolves to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    /// Audio track
    Song,
    /// Music video (separate audio and video streams)
    MusicVideo,
}

/// Raw item record returned by the metadata source
///
/// `attributes` is opaque to the pipeline and handed back to the
/// [`MetadataSource`](crate::metadata::MetadataSource) on later calls.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MediaMetadata {
    /// Catalog id of the item
    pub id: String,
    /// Song or music video
    pub kind: MediaKind,
    /// Human-readable title for reports
    #[serde(default)]
    pub title: Option<String>,
    /// Whether the item has play parameters (can be streamed at all)
    pub streamable: bool,
    /// Source-specific attributes
    #[serde(default)]
    pub attributes: serde_json::Value,
}

impl MediaMetadata {
    /// Title for summaries, falling back to the id
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.id)
    }
}

/// Playlist record returned by the metadata source
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlaylistMetadata {
    /// Playlist id
    pub id: String,
    /// Playlist name
    #[serde(default)]
    pub title: Option<String>,
    /// Curator name
    #[serde(default)]
    pub curator: Option<String>,
    /// Member item ids in playlist order
    #[serde(default)]
    pub track_ids: Vec<String>,
}

/// Normalized metadata for one item
///
/// Produced once per item and consumed read-only by naming and tagging.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaTags {
    /// Track title
    pub title: Option<String>,
    /// Catalog id of the track
    pub title_id: Option<String>,
    /// Track artist
    pub artist: Option<String>,
    /// Catalog id of the artist
    pub artist_id: Option<String>,
    /// Album name
    pub album: Option<String>,
    /// Album artist
    pub album_artist: Option<String>,
    /// Catalog id of the album
    pub album_id: Option<String>,
    /// Composer
    pub composer: Option<String>,
    /// Catalog id of the composer
    pub composer_id: Option<String>,
    /// Release date
    pub date: Option<DateTime<Utc>>,
    /// Disc number (1-based)
    pub disc: Option<u32>,
    /// Number of discs in the album
    pub disc_total: Option<u32>,
    /// Track number on the disc (1-based)
    pub track: Option<u32>,
    /// Number of tracks on the disc
    pub track_total: Option<u32>,
    /// Media type label ("Song", "Music Video")
    pub media_type: Option<String>,
    /// Whether the album is a compilation
    pub compilation: Option<bool>,
    /// Genre
    pub genre: Option<String>,
    /// Copyright line
    pub copyright: Option<String>,
    /// Comment
    pub comment: Option<String>,
    /// Unsynced lyrics text
    pub lyrics: Option<String>,
}

/// Playlist context for an item
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistTags {
    /// Playlist name
    pub playlist_title: Option<String>,
    /// Curator, "Unknown" when the playlist has none
    pub playlist_artist: Option<String>,
    /// Playlist id
    pub playlist_id: Option<String>,
    /// 1-based position of the item in the playlist
    pub playlist_track: Option<u32>,
}

/// Container format of a fetched stream
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    /// MPEG-4 audio
    M4a,
    /// MPEG-4 video
    Mp4,
    /// Apple MPEG-4 video
    M4v,
}

impl FileFormat {
    /// File extension including the dot
    pub fn extension(&self) -> &'static str {
        match self {
            FileFormat::M4a => ".m4a",
            FileFormat::Mp4 => ".mp4",
            FileFormat::M4v => ".m4v",
        }
    }
}

/// One fetchable track of a stream and its encryption descriptor
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Stream locator handed to the fetch tool
    pub stream_url: Url,
    /// Protection system header for the system-managed scheme
    #[serde(default)]
    pub pssh: Option<String>,
    /// Opaque key consumed by the fallback decrypt tool
    #[serde(default)]
    pub fallback_key: Option<String>,
}

/// Selected stream for an item
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    /// Container of the staged output before any remux override
    pub file_format: FileFormat,
    /// Audio track
    pub audio_track: Track,
    /// Video track (music videos only)
    #[serde(default)]
    pub video_track: Option<Track>,
}

/// A content key for one track
///
/// Never serialized; `Debug` redacts the key material.
#[derive(Clone, PartialEq, Eq)]
pub struct DecryptionKey {
    /// Key id as hex, when the license carried one
    pub kid: Option<String>,
    /// Content key as hex
    pub key: String,
}

impl DecryptionKey {
    /// Key without a key id
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            kid: None,
            key: key.into(),
        }
    }
}

impl std::fmt::Debug for DecryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptionKey")
            .field("kid", &self.kid)
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Keys for every track of a stream
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecryptionKeys {
    /// Audio track key
    pub audio: DecryptionKey,
    /// Video track key (music videos only)
    pub video: Option<DecryptionKey>,
}

/// Lyrics returned by the metadata source
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lyrics {
    /// Time-synced lyrics in the configured format
    pub synced: Option<String>,
    /// Plain lyrics text, written into the lyrics tag
    pub unsynced: Option<String>,
}

/// Per-run random tag that namespaces temp files
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationTag(String);

impl CorrelationTag {
    /// Generate a fresh tag of 8 lowercase hex characters
    pub fn generate() -> Self {
        Self(format!("{:08x}", rand::random::<u32>()))
    }

    /// The tag text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CorrelationTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pipeline stage of a single item
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Resolve tags, lyrics and playlist context
    ResolveTags,
    /// Compute final and staged paths
    ComputePaths,
    /// Write synced lyrics file
    WriteLyrics,
    /// Select stream info for the configured codec
    SelectStream,
    /// Acquire content keys
    AcquireKey,
    /// Fetch encrypted stream(s)
    Fetch,
    /// Decrypt and remux into the staged container
    Process,
    /// Apply tags to the staged file
    Tag,
    /// Move staged file to its final path
    Move,
    /// Write cover image file
    SaveCover,
    /// Append to the playlist index
    UpdatePlaylist,
    /// Remove the per-run temp folder
    Cleanup,
}

/// Why an item was skipped
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// The item has no play parameters
    NotStreamable,
    /// The final path exists and overwrite is disabled
    AlreadyExists {
        /// Existing final path
        path: PathBuf,
    },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NotStreamable => f.write_str("not streamable"),
            SkipReason::AlreadyExists { path } => {
                write!(f, "already exists at {}", path.display())
            }
        }
    }
}

/// Result of one item in a batch
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemOutcome {
    /// Item finished
    Succeeded {
        /// Media id
        media_id: String,
        /// Human title
        title: String,
        /// Final media path (None for lyrics-only runs)
        #[serde(skip_serializing_if = "Option::is_none")]
        final_path: Option<PathBuf>,
    },
    /// Item aborted with an error
    Failed {
        /// Media id
        media_id: String,
        /// Human title
        title: String,
        /// Machine-readable error code
        code: String,
        /// Error message
        error: String,
    },
    /// Item was not attempted
    Skipped {
        /// Media id
        media_id: String,
        /// Human title
        title: String,
        /// Why it was skipped
        reason: SkipReason,
    },
}

impl ItemOutcome {
    /// Media id of the item
    pub fn media_id(&self) -> &str {
        match self {
            ItemOutcome::Succeeded { media_id, .. }
            | ItemOutcome::Failed { media_id, .. }
            | ItemOutcome::Skipped { media_id, .. } => media_id,
        }
    }

    /// Human title of the item
    pub fn title(&self) -> &str {
        match self {
            ItemOutcome::Succeeded { title, .. }
            | ItemOutcome::Failed { title, .. }
            | ItemOutcome::Skipped { title, .. } => title,
        }
    }
}

/// Outcomes of a batch, in input order
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// One outcome per input item
    pub outcomes: Vec<ItemOutcome>,
}

impl BatchSummary {
    /// Number of succeeded items
    pub fn succeeded(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Succeeded { .. }))
    }

    /// Number of failed items
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Failed { .. }))
    }

    /// Number of skipped items
    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Skipped { .. }))
    }

    fn count(&self, pred: impl Fn(&ItemOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(o)).count()
    }
}

/// Event emitted by the pipeline
///
/// Subscribe with [`BatchRunner::subscribe`](crate::pipeline::BatchRunner::subscribe).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Item processing started
    ItemStarted {
        /// Media id
        media_id: String,
        /// Human title
        title: String,
    },

    /// Item entered a stage
    StageStarted {
        /// Media id
        media_id: String,
        /// Stage being entered
        stage: Stage,
    },

    /// Item finished and was placed at its final path
    ItemCompleted {
        /// Media id
        media_id: String,
        /// Final path
        #[serde(skip_serializing_if = "Option::is_none")]
        final_path: Option<PathBuf>,
    },

    /// Item failed
    ItemFailed {
        /// Media id
        media_id: String,
        /// Machine-readable error code
        code: String,
        /// Error message
        error: String,
    },

    /// Item skipped
    ItemSkipped {
        /// Media id
        media_id: String,
        /// Why it was skipped
        reason: SkipReason,
    },

    /// All items of a batch are done
    BatchComplete {
        /// Succeeded items
        succeeded: usize,
        /// Failed items
        failed: usize,
        /// Skipped items
        skipped: usize,
    },
}
