//! Per-item run state

use crate::error::{Error, Result};
use crate::types::{
    CorrelationTag, ExtraTags, Lyrics, MediaMetadata, MediaTags, PlaylistMetadata, PlaylistTags,
    StreamInfo,
};
use std::path::PathBuf;
use std::sync::OnceLock;
use url::Url;

/// State of one item run, filled in stage by stage
///
/// Every field is set at most once; a second write is an
/// [`Error::InvalidState`]. The item is created per run and never shared
/// between items. Content keys are deliberately absent: they live only as
/// long as the decrypt step that uses them.
#[derive(Debug)]
pub struct DownloadItem {
    media: MediaMetadata,
    playlist: Option<PlaylistMetadata>,
    correlation_tag: CorrelationTag,
    lyrics: OnceLock<Lyrics>,
    tags: OnceLock<MediaTags>,
    extra_tags: OnceLock<ExtraTags>,
    playlist_tags: OnceLock<PlaylistTags>,
    playlist_file_path: OnceLock<PathBuf>,
    stream_info: OnceLock<StreamInfo>,
    cover_url: OnceLock<Url>,
    final_path: OnceLock<PathBuf>,
    staged_path: OnceLock<PathBuf>,
    cover_path: OnceLock<PathBuf>,
    synced_lyrics_path: OnceLock<PathBuf>,
}

macro_rules! set_once_fields {
    ($($field:ident, $setter:ident: $ty:ty;)*) => {
        impl DownloadItem {
            $(
                #[doc = concat!("`", stringify!($field), "`, once resolved")]
                pub fn $field(&self) -> Option<&$ty> {
                    self.$field.get()
                }

                #[doc = concat!("Record `", stringify!($field), "`; fails if already recorded")]
                pub fn $setter(&self, value: $ty) -> Result<()> {
                    self.$field
                        .set(value)
                        .map_err(|_| self.already_set(stringify!($field)))
                }
            )*
        }
    };
}

set_once_fields! {
    lyrics, set_lyrics: Lyrics;
    tags, set_tags: MediaTags;
    extra_tags, set_extra_tags: ExtraTags;
    playlist_tags, set_playlist_tags: PlaylistTags;
    playlist_file_path, set_playlist_file_path: PathBuf;
    stream_info, set_stream_info: StreamInfo;
    cover_url, set_cover_url: Url;
    final_path, set_final_path: PathBuf;
    staged_path, set_staged_path: PathBuf;
    cover_path, set_cover_path: PathBuf;
    synced_lyrics_path, set_synced_lyrics_path: PathBuf;
}

impl DownloadItem {
    /// Start a run with a fresh correlation tag
    pub fn new(media: MediaMetadata, playlist: Option<PlaylistMetadata>) -> Self {
        Self::with_correlation_tag(media, playlist, CorrelationTag::generate())
    }

    /// Start a run with a given correlation tag
    pub fn with_correlation_tag(
        media: MediaMetadata,
        playlist: Option<PlaylistMetadata>,
        correlation_tag: CorrelationTag,
    ) -> Self {
        Self {
            media,
            playlist,
            correlation_tag,
            lyrics: OnceLock::new(),
            tags: OnceLock::new(),
            extra_tags: OnceLock::new(),
            playlist_tags: OnceLock::new(),
            playlist_file_path: OnceLock::new(),
            stream_info: OnceLock::new(),
            cover_url: OnceLock::new(),
            final_path: OnceLock::new(),
            staged_path: OnceLock::new(),
            cover_path: OnceLock::new(),
            synced_lyrics_path: OnceLock::new(),
        }
    }

    /// Source record of the item
    pub fn media(&self) -> &MediaMetadata {
        &self.media
    }

    /// Catalog id of the item
    pub fn media_id(&self) -> &str {
        &self.media.id
    }

    /// Playlist the item was enumerated from
    pub fn playlist(&self) -> Option<&PlaylistMetadata> {
        self.playlist.as_ref()
    }

    /// Namespaces this run's temp files
    pub fn correlation_tag(&self) -> &CorrelationTag {
        &self.correlation_tag
    }

    /// Error for a field a stage needs but an earlier stage did not record
    pub(crate) fn missing(&self, field: &str) -> Error {
        Error::InvalidState(format!("{field} not resolved for {}", self.media.id))
    }

    fn already_set(&self, field: &str) -> Error {
        Error::InvalidState(format!("{field} already set for {}", self.media.id))
    }
}
