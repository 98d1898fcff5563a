//! Final placement of a finished item

use super::{DownloadItem, PipelineContext};
use crate::error::Result;
use crate::tagging::{MediaContainer, apply_tags};
use crate::types::{CorrelationTag, Stage};
use crate::utils::{move_file, path_exists};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Header line written when a playlist index file is created
pub(crate) const PLAYLIST_HEADER: &str = "#EXTM3U";

/// Tag the staged file in place
pub(super) async fn tag_staged(
    ctx: &PipelineContext,
    item: &DownloadItem,
    container: MediaContainer,
    cover: Option<&[u8]>,
) -> Result<()> {
    ctx.stage(item, Stage::Tag);
    let staged = item.staged_path().ok_or_else(|| item.missing("staged_path"))?;
    let tags = item.tags().ok_or_else(|| item.missing("tags"))?;
    let extra = item.extra_tags().cloned().unwrap_or_default();

    apply_tags(
        ctx.tagger.clone(),
        staged.clone(),
        container,
        tags.clone(),
        cover.map(<[u8]>::to_vec),
        extra,
    )
    .await
}

/// Move the staged file into place, then write the cover file and playlist entry
///
/// Once the media file is placed, a failed cover write is logged and does not
/// fail the item.
pub(super) async fn finalize(
    ctx: &PipelineContext,
    item: &DownloadItem,
    cover: Option<&[u8]>,
) -> Result<()> {
    ctx.stage(item, Stage::Move);
    let staged = item.staged_path().ok_or_else(|| item.missing("staged_path"))?;
    let final_path = item.final_path().ok_or_else(|| item.missing("final_path"))?;
    move_file(staged, final_path).await?;
    tracing::info!(media_id = %item.media_id(), path = ?final_path, "item placed");

    let output = &ctx.config.output;
    if output.save_cover
        && let (Some(bytes), Some(cover_path)) = (cover, item.cover_path())
    {
        ctx.stage(item, Stage::SaveCover);
        let saved = write_cover(cover_path, bytes, output.overwrite, item.correlation_tag()).await;
        if let Err(e) = saved {
            tracing::warn!(
                media_id = %item.media_id(),
                path = ?cover_path,
                error = %e,
                "failed to save cover file"
            );
        }
    }

    if output.save_playlist
        && let Some(playlist_path) = item.playlist_file_path()
    {
        ctx.stage(item, Stage::UpdatePlaylist);
        let _guard = ctx.playlist_lock.lock().await;
        append_playlist_entry(playlist_path, final_path).await?;
    }

    Ok(())
}

/// Write the cover image next to the media, keeping an existing one unless overwriting
///
/// Items of one album share a cover path. Each run writes its own hidden
/// sibling and renames it into place, so readers only ever see a whole image.
async fn write_cover(
    path: &Path,
    bytes: &[u8],
    overwrite: bool,
    correlation_tag: &CorrelationTag,
) -> Result<()> {
    if !overwrite && path_exists(path).await {
        tracing::debug!(path = ?path, "cover file exists, keeping it");
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let partial = cover_partial_path(path, correlation_tag);
    let written = match tokio::fs::write(&partial, bytes).await {
        Ok(()) => tokio::fs::rename(&partial, path).await,
        Err(e) => Err(e),
    };
    if let Err(e) = written {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(e.into());
    }
    Ok(())
}

/// `dir/.Cover.jpg.<tag>.partial`
fn cover_partial_path(path: &Path, correlation_tag: &CorrelationTag) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.{correlation_tag}.partial"))
}

/// Append one finalized path to a playlist index file
///
/// Opens, appends and closes per call. The header is written when the file
/// is empty. Callers serialize appends through the context's playlist lock.
pub(crate) async fn append_playlist_entry(playlist_path: &Path, entry: &Path) -> Result<()> {
    if let Some(parent) = playlist_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(playlist_path)
        .await?;

    let mut line = String::new();
    if file.metadata().await?.len() == 0 {
        line.push_str(PLAYLIST_HEADER);
        line.push('\n');
    }
    line.push_str(&entry.to_string_lossy());
    line.push('\n');

    file.write_all(line.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

/// Write the synced lyrics file; returns whether it was written
pub(super) async fn write_synced_lyrics(
    ctx: &PipelineContext,
    item: &DownloadItem,
) -> Result<bool> {
    let Some(synced) = item.lyrics().and_then(|l| l.synced.as_deref()) else {
        return Ok(false);
    };
    let Some(path) = item.synced_lyrics_path() else {
        return Ok(false);
    };
    if !ctx.config.output.overwrite && path_exists(path).await {
        tracing::debug!(media_id = %item.media_id(), path = ?path, "synced lyrics exist, keeping them");
        return Ok(false);
    }

    ctx.stage(item, Stage::WriteLyrics);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, synced).await?;
    Ok(true)
}

/// Remove the run's temp folder unless it should be kept for inspection
pub(super) async fn cleanup(ctx: &PipelineContext, item: &DownloadItem, succeeded: bool) {
    if !succeeded && ctx.config.output.keep_temp_on_failure {
        tracing::info!(
            media_id = %item.media_id(),
            path = ?ctx.naming.temp_folder(item.correlation_tag()),
            "keeping temp files of failed item"
        );
        return;
    }
    ctx.stage(item, Stage::Cleanup);
    ctx.naming.cleanup(item.correlation_tag()).await;
}
