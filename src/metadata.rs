//! Metadata source interface
//!
//! The catalog API client is an external collaborator. The pipeline calls it
//! through [`MetadataSource`] for tags, lyrics, stream selection and cover art.

use crate::config::{CoverFormat, MusicVideoCodec, MusicVideoResolution, SongCodec, SyncedLyricsFormat};
use crate::error::Result;
use crate::types::{ExtraTags, Lyrics, MediaMetadata, MediaTags, StreamInfo};
use async_trait::async_trait;
use url::Url;

/// What stream to select for an item
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamRequest {
    /// Song in the requested codec; legacy codecs select the legacy stream
    Song {
        /// Requested codec
        codec: SongCodec,
    },
    /// Music video
    MusicVideo {
        /// Codecs in order of preference
        codec_priority: Vec<MusicVideoCodec>,
        /// Resolution cap
        resolution: MusicVideoResolution,
    },
}

/// Catalog metadata client
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Normalized tags for an item
    ///
    /// `lyrics` carries the unsynced text for the lyrics tag, if fetched.
    async fn tags(
        &self,
        media: &MediaMetadata,
        lyrics: Option<&Lyrics>,
        use_album_date: bool,
    ) -> Result<MediaTags>;

    /// Lyrics for a song; `None` when the item has none
    async fn lyrics(
        &self,
        media: &MediaMetadata,
        format: SyncedLyricsFormat,
    ) -> Result<Option<Lyrics>>;

    /// Stream for the request; `None` when no stream matches
    async fn stream_info(
        &self,
        media: &MediaMetadata,
        request: &StreamRequest,
    ) -> Result<Option<StreamInfo>>;

    /// Cover art location at the requested size
    async fn cover_url(
        &self,
        media: &MediaMetadata,
        format: CoverFormat,
        size: u32,
    ) -> Result<Option<Url>>;

    /// Cover art bytes; `None` when the image is unavailable
    async fn cover_bytes(&self, url: &Url) -> Result<Option<Vec<u8>>>;

    /// Source-specific tags written into MP4 containers
    async fn extra_tags(&self, media: &MediaMetadata) -> Result<ExtraTags> {
        let _ = media;
        Ok(ExtraTags::new())
    }

    /// File extension (with dot) of the cover image
    ///
    /// Fixed formats map directly; raw covers take the extension of the URL path.
    fn cover_extension(&self, url: &Url, format: CoverFormat) -> Option<String> {
        match format {
            CoverFormat::Jpg => Some(".jpg".to_string()),
            CoverFormat::Png => Some(".png".to_string()),
            CoverFormat::Raw => {
                let last = url.path_segments()?.next_back()?;
                let (_, ext) = last.rsplit_once('.')?;
                (!ext.is_empty()).then(|| format!(".{}", ext.to_ascii_lowercase()))
            }
        }
    }
}
