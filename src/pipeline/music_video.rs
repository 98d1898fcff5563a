//! Music video pipeline

use super::finalize::{cleanup, finalize, tag_staged};
use super::{DownloadItem, PipelineContext};
use crate::config::RemuxFormatMusicVideo;
use crate::error::{Error, Result};
use crate::metadata::StreamRequest;
use crate::naming::NamingEngine;
use crate::processing::VideoPaths;
use crate::tagging::MediaContainer;
use crate::types::{MediaMetadata, PlaylistMetadata, Stage, StreamInfo};
use std::sync::Arc;

/// Downloads music videos
#[derive(Clone, Debug)]
pub struct MusicVideoPipeline {
    ctx: Arc<PipelineContext>,
}

impl MusicVideoPipeline {
    /// Create a music video pipeline over a shared context
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }

    /// Resolve tags, then compute every output path
    ///
    /// With `.m4v` output the stream is selected here because its container
    /// decides the final extension. `.mp4` output defers selection to
    /// [`run`](Self::run), so items skipped as already present never look it up.
    pub async fn prepare(
        &self,
        media: MediaMetadata,
        playlist: Option<PlaylistMetadata>,
    ) -> Result<DownloadItem> {
        let ctx = &self.ctx;
        let mv = &ctx.config.music_video;
        let item = DownloadItem::new(media, playlist);

        ctx.stage(&item, Stage::ResolveTags);
        item.set_tags(ctx.metadata.tags(item.media(), None, false).await?)?;

        let extension = match mv.remux_format {
            RemuxFormatMusicVideo::Mp4 => mv.remux_format.extension(),
            RemuxFormatMusicVideo::M4v => {
                let stream = self.select_stream(&item).await?;
                let extension = stream.file_format.extension();
                item.set_stream_info(stream)?;
                extension
            }
        };

        ctx.stage(&item, Stage::ComputePaths);
        ctx.resolve_playlist(&item)?;

        item.set_staged_path(ctx.naming.temp_path(
            item.media_id(),
            item.correlation_tag(),
            "staged",
            extension,
        ))?;
        let tags = item.tags().ok_or_else(|| item.missing("tags"))?;
        item.set_final_path(ctx.naming.final_path(tags, extension, item.playlist_tags()))?;
        ctx.resolve_cover(&item, NamingEngine::sidecar_path).await?;

        tracing::debug!(
            media_id = %item.media_id(),
            final_path = ?item.final_path(),
            correlation_tag = %item.correlation_tag(),
            "music video prepared"
        );
        Ok(item)
    }

    async fn select_stream(&self, item: &DownloadItem) -> Result<StreamInfo> {
        let mv = &self.ctx.config.music_video;
        self.ctx.stage(item, Stage::SelectStream);
        let request = StreamRequest::MusicVideo {
            codec_priority: mv.codec_priority.clone(),
            resolution: mv.resolution,
        };
        let stream = self
            .ctx
            .metadata
            .stream_info(item.media(), &request)
            .await?
            .ok_or_else(|| Error::MetadataResolution {
                media_id: item.media_id().to_string(),
                reason: "no music video stream matches the codec priority".to_string(),
            })?;
        if stream.video_track.is_none() {
            return Err(Error::MetadataResolution {
                media_id: item.media_id().to_string(),
                reason: "stream has no video track".to_string(),
            });
        }
        Ok(stream)
    }

    /// Fetch both tracks, decrypt, mux, tag and place the video
    pub async fn run(&self, item: &DownloadItem) -> Result<()> {
        let result = self.download(item).await;
        cleanup(&self.ctx, item, result.is_ok()).await;
        result
    }

    async fn download(&self, item: &DownloadItem) -> Result<()> {
        let ctx = &self.ctx;
        let media_id = item.media_id();
        let tag = item.correlation_tag();
        if item.stream_info().is_none() {
            item.set_stream_info(self.select_stream(item).await?)?;
        }
        let stream = item.stream_info().ok_or_else(|| item.missing("stream_info"))?;
        let video_track = stream
            .video_track
            .as_ref()
            .ok_or_else(|| item.missing("video_track"))?;

        let keys = ctx.acquire_keys(item, stream).await?;

        ctx.stage(item, Stage::Fetch);
        tokio::fs::create_dir_all(ctx.naming.temp_folder(tag)).await?;
        let encrypted_video = ctx.naming.temp_path(media_id, tag, "encrypted_video", ".mp4");
        let encrypted_audio = ctx.naming.temp_path(media_id, tag, "encrypted_audio", ".m4a");
        ctx.fetch(item, &video_track.stream_url, &encrypted_video).await?;
        ctx.fetch(item, &stream.audio_track.stream_url, &encrypted_audio).await?;

        ctx.stage(item, Stage::Process);
        let decrypted_video = ctx.naming.temp_path(media_id, tag, "decrypted_video", ".mp4");
        let decrypted_audio = ctx.naming.temp_path(media_id, tag, "decrypted_audio", ".m4a");
        let staged = item.staged_path().ok_or_else(|| item.missing("staged_path"))?;
        ctx.dispatcher
            .run_video(
                ctx.config.download.remux_mode,
                VideoPaths {
                    encrypted_video: &encrypted_video,
                    encrypted_audio: &encrypted_audio,
                    decrypted_video: &decrypted_video,
                    decrypted_audio: &decrypted_audio,
                    staged,
                },
                &keys,
            )
            .await?;
        drop(keys);

        let cover = ctx.cover_bytes(item).await?;
        tag_staged(ctx, item, MediaContainer::Modern, cover.as_deref()).await?;
        finalize(ctx, item, cover.as_deref()).await
    }
}
