//! Batch runner
//!
//! Drives many items with bounded concurrency. Every per-item error becomes a
//! [`ItemOutcome::Failed`]; one item never stops the batch.

use super::{DownloadItem, MusicVideoPipeline, PipelineContext, SongPipeline};
use crate::error::{Error, Result};
use crate::types::{
    BatchSummary, Event, ItemOutcome, MediaKind, MediaMetadata, PlaylistMetadata, SkipReason,
};
use crate::utils::path_exists;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::{Semaphore, broadcast};

/// One unit of work for the batch runner
#[derive(Clone, Debug)]
pub struct BatchItem {
    /// Item to download
    pub media: MediaMetadata,
    /// Playlist the item was enumerated from
    pub playlist: Option<PlaylistMetadata>,
}

impl BatchItem {
    /// An item outside any playlist
    pub fn single(media: MediaMetadata) -> Self {
        Self {
            media,
            playlist: None,
        }
    }

    /// Every member of a playlist, in playlist order
    pub fn from_playlist(playlist: &PlaylistMetadata, members: Vec<MediaMetadata>) -> Vec<Self> {
        members
            .into_iter()
            .map(|media| Self {
                media,
                playlist: Some(playlist.clone()),
            })
            .collect()
    }
}

/// Runs items through the song and music video pipelines
#[derive(Clone, Debug)]
pub struct BatchRunner {
    ctx: Arc<PipelineContext>,
    songs: SongPipeline,
    music_videos: MusicVideoPipeline,
    concurrent_limit: Arc<Semaphore>,
}

/// Result of the prepare phase for one item
enum Prepared {
    Ready(DownloadItem),
    Skip(SkipReason),
}

impl BatchRunner {
    /// Create a runner; concurrency comes from `output.max_concurrent_items`
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        let limit = ctx.config.output.max_concurrent_items.max(1);
        Self {
            songs: SongPipeline::new(ctx.clone()),
            music_videos: MusicVideoPipeline::new(ctx.clone()),
            concurrent_limit: Arc::new(Semaphore::new(limit)),
            ctx,
        }
    }

    /// Subscribe to pipeline events
    ///
    /// Every subscriber receives every event emitted after subscribing.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.ctx.subscribe()
    }

    /// Run every item and report per-item outcomes in input order
    pub async fn run(&self, items: Vec<BatchItem>) -> BatchSummary {
        tracing::info!(count = items.len(), "starting batch");
        let outcomes = join_all(items.into_iter().map(|item| self.run_one(item))).await;
        let summary = BatchSummary { outcomes };

        tracing::info!(
            succeeded = summary.succeeded(),
            failed = summary.failed(),
            skipped = summary.skipped(),
            "batch complete"
        );
        self.ctx.emit(Event::BatchComplete {
            succeeded: summary.succeeded(),
            failed: summary.failed(),
            skipped: summary.skipped(),
        });
        summary
    }

    /// Run one item, waiting for a concurrency slot first
    pub async fn run_one(&self, item: BatchItem) -> ItemOutcome {
        let media_id = item.media.id.clone();
        let title = item.media.display_title().to_string();

        let _permit = match self.concurrent_limit.acquire().await {
            Ok(permit) => permit,
            Err(e) => {
                let error = Error::InvalidState(format!("concurrency limiter closed: {e}"));
                return self.failed(media_id, title, &error);
            }
        };

        self.ctx.emit(Event::ItemStarted {
            media_id: media_id.clone(),
            title: title.clone(),
        });

        match self.execute(item).await {
            Ok(Prepared::Ready(item)) => {
                let final_path = if self.lyrics_only(item.media().kind) {
                    None
                } else {
                    item.final_path().cloned()
                };
                tracing::info!(media_id = %media_id, title = %title, "item succeeded");
                self.ctx.emit(Event::ItemCompleted {
                    media_id: media_id.clone(),
                    final_path: final_path.clone(),
                });
                ItemOutcome::Succeeded {
                    media_id,
                    title,
                    final_path,
                }
            }
            Ok(Prepared::Skip(reason)) => {
                tracing::info!(media_id = %media_id, title = %title, reason = %reason, "item skipped");
                self.ctx.emit(Event::ItemSkipped {
                    media_id: media_id.clone(),
                    reason: reason.clone(),
                });
                ItemOutcome::Skipped {
                    media_id,
                    title,
                    reason,
                }
            }
            Err(error) => self.failed(media_id, title, &error),
        }
    }

    async fn execute(&self, item: BatchItem) -> Result<Prepared> {
        if !item.media.streamable {
            return Ok(Prepared::Skip(SkipReason::NotStreamable));
        }

        let kind = item.media.kind;
        let prepared = match kind {
            MediaKind::Song => self.songs.prepare(item.media, item.playlist).await?,
            MediaKind::MusicVideo => self.music_videos.prepare(item.media, item.playlist).await?,
        };

        if let Some(path) = prepared.final_path()
            && !self.ctx.config.output.overwrite
            && !self.lyrics_only(kind)
            && path_exists(path).await
        {
            return Ok(Prepared::Skip(SkipReason::AlreadyExists { path: path.clone() }));
        }

        match kind {
            MediaKind::Song => self.songs.run(&prepared).await?,
            MediaKind::MusicVideo => self.music_videos.run(&prepared).await?,
        }
        Ok(Prepared::Ready(prepared))
    }

    fn lyrics_only(&self, kind: MediaKind) -> bool {
        kind == MediaKind::Song && self.ctx.config.song.synced_lyrics_only
    }

    fn failed(&self, media_id: String, title: String, error: &Error) -> ItemOutcome {
        tracing::warn!(
            media_id = %media_id,
            title = %title,
            code = error.code(),
            error = %error,
            "item failed"
        );
        self.ctx.emit(Event::ItemFailed {
            media_id: media_id.clone(),
            code: error.code().to_string(),
            error: error.to_string(),
        });
        ItemOutcome::Failed {
            media_id,
            title,
            code: error.code().to_string(),
            error: error.to_string(),
        }
    }
}
