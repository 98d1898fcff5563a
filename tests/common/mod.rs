//! Common test utilities: fake collaborators for pipeline integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use media_dl::config::{CoverFormat, SyncedLyricsFormat};
use media_dl::drm::{CredentialContext, KeyProvider};
use media_dl::error::{FetchError, KeyError, ToolError};
use media_dl::metadata::{MetadataSource, StreamRequest};
use media_dl::pipeline::{Collaborators, PipelineContext};
use media_dl::processing::{StreamFetcher, Tool, ToolRunner};
use media_dl::tagging::{MediaContainer, TagApplier};
use media_dl::types::{
    DecryptionKey, DecryptionKeys, ExtraTags, FileFormat, Lyrics, MediaKind, MediaMetadata,
    MediaTags, StreamInfo, Track,
};
use media_dl::{Config, Error, Result};
use std::collections::{HashMap, HashSet};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use url::Url;

pub const COVER_BYTES: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 1, 2, 3, 4];

/// Song record as the metadata source would return it
pub fn song(id: &str, title: &str) -> MediaMetadata {
    MediaMetadata {
        id: id.to_string(),
        kind: MediaKind::Song,
        title: Some(title.to_string()),
        streamable: true,
        attributes: serde_json::Value::Null,
    }
}

/// Music video record
pub fn music_video(id: &str, title: &str) -> MediaMetadata {
    MediaMetadata {
        kind: MediaKind::MusicVideo,
        ..song(id, title)
    }
}

/// Album track tags
pub fn album_tags(title: &str, track: u32) -> MediaTags {
    MediaTags {
        title: Some(title.to_string()),
        artist: Some("Artist".to_string()),
        album: Some("Album".to_string()),
        album_artist: Some("Artist".to_string()),
        track: Some(track),
        track_total: Some(12),
        disc: Some(1),
        disc_total: Some(1),
        ..Default::default()
    }
}

fn url(id: &str, kind: &str) -> Url {
    Url::parse(&format!("https://stream.example.com/{id}/{kind}.m3u8")).unwrap()
}

/// Audio-only stream with a legacy key placeholder
pub fn audio_stream(id: &str) -> StreamInfo {
    StreamInfo {
        file_format: FileFormat::M4a,
        audio_track: Track {
            stream_url: url(id, "audio"),
            pssh: None,
            fallback_key: None,
        },
        video_track: None,
    }
}

/// Stream with separate audio and video tracks
pub fn video_stream(id: &str) -> StreamInfo {
    StreamInfo {
        file_format: FileFormat::M4v,
        audio_track: Track {
            stream_url: url(id, "audio"),
            pssh: Some("pssh-audio".into()),
            fallback_key: None,
        },
        video_track: Some(Track {
            stream_url: url(id, "video"),
            pssh: Some("pssh-video".into()),
            fallback_key: None,
        }),
    }
}

/// In-memory catalog keyed by media id
#[derive(Default)]
pub struct FakeCatalog {
    tags: HashMap<String, MediaTags>,
    streams: HashMap<String, StreamInfo>,
    lyrics: HashMap<String, Lyrics>,
    cover: Option<Vec<u8>>,
    pub stream_requests: AtomicUsize,
}

impl FakeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_item(mut self, id: &str, tags: MediaTags, stream: StreamInfo) -> Self {
        self.tags.insert(id.to_string(), tags);
        self.streams.insert(id.to_string(), stream);
        self
    }

    pub fn with_lyrics(mut self, id: &str, lyrics: Lyrics) -> Self {
        self.lyrics.insert(id.to_string(), lyrics);
        self
    }

    pub fn with_cover(mut self, bytes: &[u8]) -> Self {
        self.cover = Some(bytes.to_vec());
        self
    }
}

#[async_trait]
impl MetadataSource for FakeCatalog {
    async fn tags(
        &self,
        media: &MediaMetadata,
        lyrics: Option<&Lyrics>,
        _use_album_date: bool,
    ) -> Result<MediaTags> {
        let mut tags = self
            .tags
            .get(&media.id)
            .cloned()
            .ok_or_else(|| Error::MetadataResolution {
                media_id: media.id.clone(),
                reason: "unknown id".into(),
            })?;
        tags.lyrics = lyrics.and_then(|l| l.unsynced.clone());
        Ok(tags)
    }

    async fn lyrics(
        &self,
        media: &MediaMetadata,
        _format: SyncedLyricsFormat,
    ) -> Result<Option<Lyrics>> {
        Ok(self.lyrics.get(&media.id).cloned())
    }

    async fn stream_info(
        &self,
        media: &MediaMetadata,
        _request: &StreamRequest,
    ) -> Result<Option<StreamInfo>> {
        self.stream_requests.fetch_add(1, Ordering::SeqCst);
        Ok(self.streams.get(&media.id).cloned())
    }

    async fn cover_url(
        &self,
        media: &MediaMetadata,
        _format: CoverFormat,
        size: u32,
    ) -> Result<Option<Url>> {
        Ok(self.cover.as_ref().map(|_| {
            Url::parse(&format!("https://img.example.com/{}/{size}x{size}.jpg", media.id)).unwrap()
        }))
    }

    async fn cover_bytes(&self, _url: &Url) -> Result<Option<Vec<u8>>> {
        Ok(self.cover.clone())
    }
}

/// Key provider returning fixed keys, or refusing every license
#[derive(Default)]
pub struct FakeKeys {
    pub refuse: bool,
    pub calls: AtomicUsize,
}

impl FakeKeys {
    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Default::default()
        }
    }
}

#[async_trait]
impl KeyProvider for FakeKeys {
    async fn get_key(
        &self,
        stream: &StreamInfo,
        _credentials: &CredentialContext,
    ) -> std::result::Result<DecryptionKeys, KeyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.refuse {
            return Err(KeyError::NoLicense("test license server said no".into()));
        }
        Ok(DecryptionKeys {
            audio: DecryptionKey::new("00112233445566778899aabbccddeeff"),
            video: stream
                .video_track
                .as_ref()
                .map(|_| DecryptionKey::new("ffeeddccbbaa99887766554433221100")),
        })
    }
}

/// Fetcher that writes a marker file instead of downloading
#[derive(Default)]
pub struct FakeFetcher {
    pub fetched: Mutex<Vec<(Url, PathBuf)>>,
    pub fail: bool,
}

#[async_trait]
impl StreamFetcher for FakeFetcher {
    async fn fetch(&self, url: &Url, dest: &Path) -> std::result::Result<(), FetchError> {
        self.fetched
            .lock()
            .unwrap()
            .push((url.clone(), dest.to_path_buf()));
        if self.fail {
            return Err(FetchError::NonZeroExit {
                tool: "yt-dlp",
                code: Some(1),
            });
        }
        tokio::fs::write(dest, format!("stream:{url}")).await.unwrap();
        Ok(())
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Tool runner that creates each tool's output file
#[derive(Default)]
pub struct FakeRunner {
    pub calls: Mutex<Vec<(Tool, Vec<String>)>>,
    pub failing: Option<Tool>,
    pub delay: Option<Duration>,
}

impl FakeRunner {
    pub fn failing(tool: Tool) -> Self {
        Self {
            failing: Some(tool),
            ..Default::default()
        }
    }

    pub fn tools(&self) -> Vec<Tool> {
        self.calls.lock().unwrap().iter().map(|(t, _)| *t).collect()
    }

    fn output_of(tool: Tool, args: &[String]) -> Option<PathBuf> {
        match tool {
            Tool::AmDecrypt => args
                .iter()
                .position(|a| a == "-o")
                .and_then(|i| args.get(i + 1))
                .map(PathBuf::from),
            _ => args.last().map(PathBuf::from),
        }
    }
}

#[async_trait]
impl ToolRunner for FakeRunner {
    async fn run(&self, tool: Tool, args: Vec<OsString>) -> std::result::Result<(), ToolError> {
        let args: Vec<String> = args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        self.calls.lock().unwrap().push((tool, args.clone()));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing == Some(tool) {
            return Err(ToolError::NonZeroExit {
                tool: tool.binary_name(),
                code: Some(1),
            });
        }
        if let Some(output) = Self::output_of(tool, &args) {
            tokio::fs::write(&output, format!("{}:{}", tool.binary_name(), output.display()))
                .await
                .unwrap();
        }
        Ok(())
    }
}

/// One recorded tagging call
#[derive(Clone, Debug)]
pub struct TagCall {
    pub path: PathBuf,
    pub container: MediaContainer,
    pub title: Option<String>,
    pub has_cover: bool,
    pub extra: ExtraTags,
}

/// Tagger that records calls; staged files are not real media
#[derive(Default)]
pub struct RecordingTagger {
    pub calls: Mutex<Vec<TagCall>>,
}

impl TagApplier for RecordingTagger {
    fn apply(
        &self,
        path: &Path,
        container: MediaContainer,
        tags: &MediaTags,
        cover: Option<&[u8]>,
        extra: &ExtraTags,
    ) -> Result<()> {
        assert!(path.exists(), "tagging a missing file: {}", path.display());
        self.calls.lock().unwrap().push(TagCall {
            path: path.to_path_buf(),
            container,
            title: tags.title.clone(),
            has_cover: cover.is_some(),
            extra: extra.clone(),
        });
        Ok(())
    }
}

/// Scratch output and temp roots plus a config pointing at them
pub struct Harness {
    pub output: TempDir,
    pub temp: TempDir,
    pub config: Config,
}

impl Harness {
    pub fn new() -> Self {
        let output = TempDir::new().unwrap();
        let temp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.output.output_dir = output.path().to_path_buf();
        config.output.temp_dir = temp.path().to_path_buf();
        Self {
            output,
            temp,
            config,
        }
    }

    /// Folders left behind under the temp root
    pub fn leftover_temp_dirs(&self) -> Vec<PathBuf> {
        walkdir::WalkDir::new(self.temp.path())
            .min_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_dir())
            .map(|e| e.into_path())
            .collect()
    }

    /// Every file under the output root
    pub fn output_files(&self) -> HashSet<PathBuf> {
        walkdir::WalkDir::new(self.output.path())
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .collect()
    }
}

/// Fakes wired into a context
pub struct Fakes {
    pub catalog: Arc<FakeCatalog>,
    pub keys: Arc<FakeKeys>,
    pub fetcher: Arc<FakeFetcher>,
    pub runner: Arc<FakeRunner>,
    pub tagger: Arc<RecordingTagger>,
}

impl Fakes {
    pub fn new(catalog: FakeCatalog) -> Self {
        Self::with(catalog, FakeKeys::default(), FakeFetcher::default(), FakeRunner::default())
    }

    pub fn with(
        catalog: FakeCatalog,
        keys: FakeKeys,
        fetcher: FakeFetcher,
        runner: FakeRunner,
    ) -> Self {
        Self {
            catalog: Arc::new(catalog),
            keys: Arc::new(keys),
            fetcher: Arc::new(fetcher),
            runner: Arc::new(runner),
            tagger: Arc::new(RecordingTagger::default()),
        }
    }

    pub fn context(&self, config: Config) -> Arc<PipelineContext> {
        let collaborators = Collaborators {
            metadata: self.catalog.clone(),
            key_provider: self.keys.clone(),
            runner: self.runner.clone(),
            fetcher: self.fetcher.clone(),
            tagger: self.tagger.clone(),
        };
        Arc::new(PipelineContext::with_collaborators(config, collaborators).unwrap())
    }

    pub fn fetched(&self) -> Vec<(Url, PathBuf)> {
        self.fetcher.fetched.lock().unwrap().clone()
    }

    pub fn stream_requests(&self) -> usize {
        self.catalog.stream_requests.load(Ordering::SeqCst)
    }

    pub fn tag_calls(&self) -> Vec<TagCall> {
        self.tagger.calls.lock().unwrap().clone()
    }
}
