//! Per-item download pipeline
//!
//! Split into focused submodules:
//! - [`item`] - Set-once run state for one item
//! - [`song`] - Song pipeline (lyrics, audio dispatch)
//! - [`music_video`] - Music video pipeline (two tracks, mux)
//! - `finalize` - Atomic move, cover file, playlist index, cleanup
//! - [`batch`] - Bounded concurrent runs with per-item outcomes
//!
//! Both pipelines compose one shared, immutable [`PipelineContext`].

pub mod batch;
mod finalize;
pub mod item;
pub mod music_video;
pub mod song;

pub use batch::{BatchItem, BatchRunner};
pub use item::DownloadItem;
pub use music_video::MusicVideoPipeline;
pub use song::SongPipeline;

use crate::config::Config;
use crate::drm::{CredentialContext, KeyProvider};
use crate::error::{Error, Result};
use crate::metadata::MetadataSource;
use crate::naming::NamingEngine;
use crate::processing::{
    CliToolRunner, Decryptor, Dispatcher, Remuxer, StreamFetcher, ToolRunner, fetcher_for,
};
use crate::tagging::{LoftyTagApplier, TagApplier, TagOptions};
use crate::types::{DecryptionKeys, Event, Stage, StreamInfo};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};
use url::Url;

/// Buffer size of the event channel
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// External collaborators the pipeline drives
#[derive(Clone)]
pub struct Collaborators {
    /// Catalog metadata client
    pub metadata: Arc<dyn MetadataSource>,
    /// License exchange
    pub key_provider: Arc<dyn KeyProvider>,
    /// Runs decrypt and remux binaries
    pub runner: Arc<dyn ToolRunner>,
    /// Fetches encrypted streams
    pub fetcher: Arc<dyn StreamFetcher>,
    /// Writes tags into finished files
    pub tagger: Arc<dyn TagApplier>,
}

/// Shared, read-only state for every item run
pub struct PipelineContext {
    pub(crate) config: Arc<Config>,
    pub(crate) naming: NamingEngine,
    pub(crate) metadata: Arc<dyn MetadataSource>,
    pub(crate) key_provider: Arc<dyn KeyProvider>,
    pub(crate) fetcher: Arc<dyn StreamFetcher>,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) tagger: Arc<dyn TagApplier>,
    pub(crate) credentials: CredentialContext,
    /// Serializes appends to playlist index files across items
    pub(crate) playlist_lock: Mutex<()>,
    pub(crate) event_tx: broadcast::Sender<Event>,
}

impl PipelineContext {
    /// Build a context backed by the real external tools
    ///
    /// Validates the configuration, resolves tool paths and fails with
    /// [`Error::Config`] when a tool the configured modes need is missing.
    pub fn new(
        config: Config,
        metadata: Arc<dyn MetadataSource>,
        key_provider: Arc<dyn KeyProvider>,
    ) -> Result<Self> {
        config.validate()?;
        let runner = CliToolRunner::from_config(&config.tools);
        runner.paths().ensure_required(&config)?;

        let ffmpeg_path = runner.paths().ffmpeg.clone();
        let runner: Arc<dyn ToolRunner> = Arc::new(runner);
        let fetcher = fetcher_for(
            config.download.download_mode,
            runner.clone(),
            ffmpeg_path,
            config.tools.silent,
        );
        let tagger = Arc::new(LoftyTagApplier::new(TagOptions::from_config(&config.download)));

        Self::with_collaborators(
            config,
            Collaborators {
                metadata,
                key_provider,
                runner,
                fetcher,
                tagger,
            },
        )
    }

    /// Build a context around caller-supplied collaborators
    ///
    /// Tool availability is not checked; the runner reports missing tools
    /// per item.
    pub fn with_collaborators(config: Config, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;
        let naming = NamingEngine::new(&config)?;
        let dispatcher = Dispatcher::new(
            Decryptor::new(collaborators.runner.clone(), config.drm.default_song_key.clone()),
            Remuxer::new(collaborators.runner),
        );
        let credentials = CredentialContext::from_config(&config.drm);
        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            config: Arc::new(config),
            naming,
            metadata: collaborators.metadata,
            key_provider: collaborators.key_provider,
            fetcher: collaborators.fetcher,
            dispatcher,
            tagger: collaborators.tagger,
            credentials,
            playlist_lock: Mutex::new(()),
            event_tx,
        })
    }

    /// Configuration the context was built from
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Path computation for this configuration
    pub fn naming(&self) -> &NamingEngine {
        &self.naming
    }

    /// Subscribe to pipeline events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Send an event; having no subscribers is fine
    pub(crate) fn emit(&self, event: Event) {
        let _ = self.event_tx.send(event);
    }

    pub(crate) fn stage(&self, item: &DownloadItem, stage: Stage) {
        tracing::debug!(media_id = %item.media_id(), stage = ?stage, "stage started");
        self.emit(Event::StageStarted {
            media_id: item.media_id().to_string(),
            stage,
        });
    }

    pub(crate) async fn acquire_keys(
        &self,
        item: &DownloadItem,
        stream: &StreamInfo,
    ) -> Result<DecryptionKeys> {
        self.stage(item, Stage::AcquireKey);
        self.key_provider
            .get_key(stream, &self.credentials)
            .await
            .map_err(|source| Error::KeyAcquisition {
                media_id: item.media_id().to_string(),
                source,
            })
    }

    pub(crate) async fn fetch(&self, item: &DownloadItem, url: &Url, dest: &Path) -> Result<()> {
        tracing::debug!(
            media_id = %item.media_id(),
            fetcher = self.fetcher.name(),
            dest = ?dest,
            "fetching stream"
        );
        self.fetcher.fetch(url, dest).await?;
        Ok(())
    }

    /// Set playlist tags and the playlist index path when the item has a playlist
    pub(crate) fn resolve_playlist(&self, item: &DownloadItem) -> Result<()> {
        let Some(playlist) = item.playlist() else {
            return Ok(());
        };
        if !playlist.track_ids.iter().any(|id| id == item.media_id()) {
            return Err(Error::InvalidState(format!(
                "{} is not a member of playlist {}",
                item.media_id(),
                playlist.id
            )));
        }

        let playlist_tags = NamingEngine::playlist_tags(playlist, item.media_id());
        item.set_playlist_file_path(self.naming.playlist_file_path(&playlist_tags))?;
        item.set_playlist_tags(playlist_tags)
    }

    /// Resolve cover location and file path for an item
    pub(crate) async fn resolve_cover(
        &self,
        item: &DownloadItem,
        path_for: impl FnOnce(&Path, &str) -> PathBuf,
    ) -> Result<()> {
        let download = &self.config.download;
        let Some(url) = self
            .metadata
            .cover_url(item.media(), download.cover_format, download.cover_size)
            .await?
        else {
            return Ok(());
        };

        if let Some(ext) = self.metadata.cover_extension(&url, download.cover_format) {
            let final_path = item.final_path().ok_or_else(|| item.missing("final_path"))?;
            item.set_cover_path(path_for(final_path, &ext))?;
        }
        item.set_cover_url(url)
    }

    /// Cover image bytes for tagging and the cover file
    pub(crate) async fn cover_bytes(&self, item: &DownloadItem) -> Result<Option<Vec<u8>>> {
        match item.cover_url() {
            Some(url) => self.metadata.cover_bytes(url).await,
            None => Ok(None),
        }
    }
}

impl std::fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineContext")
            .field("naming", &self.naming)
            .field("fetcher", &self.fetcher.name())
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}
