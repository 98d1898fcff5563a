//! Song pipeline

use super::finalize::{cleanup, finalize, tag_staged, write_synced_lyrics};
use super::{DownloadItem, PipelineContext};
use crate::config::LossyBitrate;
use crate::error::{Error, Result};
use crate::metadata::StreamRequest;
use crate::naming::NamingEngine;
use crate::processing::{AudioKeys, AudioPaths, Protection, plan_audio};
use crate::tagging::MediaContainer;
use crate::types::{MediaMetadata, PlaylistMetadata, Stage};
use std::sync::Arc;

/// Extension of the fetched and decrypted audio
const AUDIO_EXTENSION: &str = ".m4a";
/// Extension of lossy output
const MP3_EXTENSION: &str = ".mp3";

/// Downloads songs
#[derive(Clone, Debug)]
pub struct SongPipeline {
    ctx: Arc<PipelineContext>,
}

impl SongPipeline {
    /// Create a song pipeline over a shared context
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }

    fn final_extension(&self) -> &'static str {
        if self.ctx.config.song.remux_to_mp3 {
            MP3_EXTENSION
        } else {
            AUDIO_EXTENSION
        }
    }

    /// Resolve lyrics and tags and compute every output path
    ///
    /// Nothing is written to disk. The caller can inspect
    /// [`DownloadItem::final_path`] before deciding to [`run`](Self::run).
    pub async fn prepare(
        &self,
        media: MediaMetadata,
        playlist: Option<PlaylistMetadata>,
    ) -> Result<DownloadItem> {
        let ctx = &self.ctx;
        let song = &ctx.config.song;
        let item = DownloadItem::new(media, playlist);

        ctx.stage(&item, Stage::ResolveTags);
        let lyrics = ctx
            .metadata
            .lyrics(item.media(), song.synced_lyrics_format)
            .await?;
        let tags = ctx
            .metadata
            .tags(item.media(), lyrics.as_ref(), song.use_album_date)
            .await?;
        if let Some(lyrics) = lyrics {
            item.set_lyrics(lyrics)?;
        }
        item.set_tags(tags)?;

        if song.fetch_extra_tags {
            item.set_extra_tags(ctx.metadata.extra_tags(item.media()).await?)?;
        }

        ctx.stage(&item, Stage::ComputePaths);
        ctx.resolve_playlist(&item)?;

        let tags = item.tags().ok_or_else(|| item.missing("tags"))?;
        let final_path = ctx
            .naming
            .final_path(tags, self.final_extension(), item.playlist_tags());
        item.set_synced_lyrics_path(NamingEngine::sidecar_path(
            &final_path,
            song.synced_lyrics_format.extension(),
        ))?;
        item.set_final_path(final_path)?;

        if !song.synced_lyrics_only {
            ctx.resolve_cover(&item, NamingEngine::cover_path).await?;
        }

        tracing::debug!(
            media_id = %item.media_id(),
            final_path = ?item.final_path(),
            correlation_tag = %item.correlation_tag(),
            "song prepared"
        );
        Ok(item)
    }

    /// Write lyrics, then fetch, decrypt, tag and place the song
    ///
    /// In lyrics-only mode this stops after the lyrics file. The temp folder
    /// is removed afterwards unless the run failed and temp files are kept.
    pub async fn run(&self, item: &DownloadItem) -> Result<()> {
        let song = &self.ctx.config.song;
        if !song.no_synced_lyrics {
            write_synced_lyrics(&self.ctx, item).await?;
        }
        if song.synced_lyrics_only {
            tracing::debug!(media_id = %item.media_id(), "lyrics only, skipping media");
            return Ok(());
        }

        let result = self.download(item).await;
        cleanup(&self.ctx, item, result.is_ok()).await;
        result
    }

    async fn download(&self, item: &DownloadItem) -> Result<()> {
        let ctx = &self.ctx;
        let config = &ctx.config;
        let song = &config.song;
        let media_id = item.media_id();
        let tag = item.correlation_tag();

        ctx.stage(item, Stage::SelectStream);
        let stream = ctx
            .metadata
            .stream_info(item.media(), &StreamRequest::Song { codec: song.codec })
            .await?
            .ok_or_else(|| Error::MetadataResolution {
                media_id: media_id.to_string(),
                reason: format!("no stream available for codec {:?}", song.codec),
            })?;
        item.set_stream_info(stream)?;
        let stream = item.stream_info().ok_or_else(|| item.missing("stream_info"))?;

        let staged_extension = if song.remux_to_mp3 {
            MP3_EXTENSION
        } else {
            stream.file_format.extension()
        };
        item.set_staged_path(ctx.naming.temp_path(media_id, tag, "staged", staged_extension))?;

        let protection = Protection::for_song(
            song.codec,
            config.drm.use_wrapper,
            stream.audio_track.pssh.is_some(),
        );
        let keys = if protection.needs_key() {
            Some(ctx.acquire_keys(item, stream).await?)
        } else {
            None
        };

        ctx.stage(item, Stage::Fetch);
        tokio::fs::create_dir_all(ctx.naming.temp_folder(tag)).await?;
        let encrypted = ctx.naming.temp_path(media_id, tag, "encrypted", AUDIO_EXTENSION);
        let decrypted = ctx.naming.temp_path(media_id, tag, "decrypted", AUDIO_EXTENSION);
        ctx.fetch(item, &stream.audio_track.stream_url, &encrypted).await?;

        ctx.stage(item, Stage::Process);
        let lossy = song
            .remux_to_mp3
            .then(|| LossyBitrate::from_name(&song.mp3_bitrate));
        let steps = plan_audio(protection, config.download.remux_mode, lossy);
        let staged = item.staged_path().ok_or_else(|| item.missing("staged_path"))?;
        ctx.dispatcher
            .run_audio(
                &steps,
                AudioPaths {
                    encrypted: &encrypted,
                    decrypted: &decrypted,
                    staged,
                },
                AudioKeys {
                    key: keys.as_ref().map(|k| &k.audio),
                    media_id,
                    fallback_key: stream.audio_track.fallback_key.as_deref(),
                },
            )
            .await?;
        drop(keys);

        let cover = ctx.cover_bytes(item).await?;
        tag_staged(
            ctx,
            item,
            MediaContainer::for_extension(staged_extension),
            cover.as_deref(),
        )
        .await?;
        finalize(ctx, item, cover.as_deref()).await
    }
}
