//! Stream fetchers: pull a remote stream into a local temp file

use super::runner::{Tool, ToolRunner, os_args};
use crate::config::DownloadMode;
use crate::error::{FetchError, ToolError};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;

/// Retrieves a stream locator into a local file
#[async_trait]
pub trait StreamFetcher: Send + Sync {
    /// Fetch `url` into `dest`; the parent directory must exist
    async fn fetch(&self, url: &Url, dest: &Path) -> Result<(), FetchError>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// Fetcher backed by the `yt-dlp` binary (generic extractor only)
pub struct YtDlpFetcher {
    runner: Arc<dyn ToolRunner>,
    silent: bool,
}

impl YtDlpFetcher {
    /// Create a yt-dlp fetcher
    pub fn new(runner: Arc<dyn ToolRunner>, silent: bool) -> Self {
        Self { runner, silent }
    }

    fn args(&self, url: &Url, dest: &Path) -> Vec<OsString> {
        let mut args = os_args([
            "--quiet",
            "--no-warnings",
            "--allow-unplayable-formats",
            "--force-overwrites",
            "--fixup",
            "never",
            "--use-extractors",
            "generic",
        ]);
        if self.silent {
            args.push("--no-progress".into());
        }
        args.push("--output".into());
        args.push(dest.as_os_str().to_owned());
        args.push(url.as_str().into());
        args
    }
}

#[async_trait]
impl StreamFetcher for YtDlpFetcher {
    async fn fetch(&self, url: &Url, dest: &Path) -> Result<(), FetchError> {
        self.runner
            .run(Tool::YtDlp, self.args(url, dest))
            .await
            .map_err(into_fetch_error)
    }

    fn name(&self) -> &'static str {
        "yt-dlp"
    }
}

/// Fetcher backed by the `N_m3u8DL-RE` binary with binary merge
pub struct Nm3u8DlReFetcher {
    runner: Arc<dyn ToolRunner>,
    ffmpeg_path: Option<PathBuf>,
}

impl Nm3u8DlReFetcher {
    /// Create an N_m3u8DL-RE fetcher; `ffmpeg_path` is passed through for muxing
    pub fn new(runner: Arc<dyn ToolRunner>, ffmpeg_path: Option<PathBuf>) -> Self {
        Self {
            runner,
            ffmpeg_path,
        }
    }

    fn args(&self, url: &Url, dest: &Path) -> Vec<OsString> {
        let dir = dest.parent().unwrap_or_else(|| Path::new("."));
        let stem = dest.file_stem().unwrap_or_default();

        let mut args = os_args([
            url.as_str(),
            "--binary-merge",
            "--no-log",
            "--log-level",
            "off",
        ]);
        if let Some(ffmpeg) = &self.ffmpeg_path {
            args.push("--ffmpeg-binary-path".into());
            args.push(ffmpeg.as_os_str().to_owned());
        }
        args.push("--save-name".into());
        args.push(stem.to_owned());
        args.push("--save-dir".into());
        args.push(dir.as_os_str().to_owned());
        args.push("--tmp-dir".into());
        args.push(dir.as_os_str().to_owned());
        args
    }
}

#[async_trait]
impl StreamFetcher for Nm3u8DlReFetcher {
    async fn fetch(&self, url: &Url, dest: &Path) -> Result<(), FetchError> {
        self.runner
            .run(Tool::Nm3u8DlRe, self.args(url, dest))
            .await
            .map_err(into_fetch_error)
    }

    fn name(&self) -> &'static str {
        "N_m3u8DL-RE"
    }
}

/// Build the fetcher selected by the download mode
pub fn fetcher_for(
    mode: DownloadMode,
    runner: Arc<dyn ToolRunner>,
    ffmpeg_path: Option<PathBuf>,
    silent: bool,
) -> Arc<dyn StreamFetcher> {
    match mode {
        DownloadMode::YtDlp => Arc::new(YtDlpFetcher::new(runner, silent)),
        DownloadMode::Nm3u8DlRe => Arc::new(Nm3u8DlReFetcher::new(runner, ffmpeg_path)),
    }
}

fn into_fetch_error(error: ToolError) -> FetchError {
    match error {
        ToolError::NotFound { tool } => FetchError::ToolNotFound { tool },
        ToolError::Spawn { tool, reason } => {
            tracing::warn!(tool, reason = %reason, "fetch tool could not be started");
            FetchError::ToolNotFound { tool }
        }
        ToolError::NonZeroExit { tool, code } => FetchError::NonZeroExit { tool, code },
        ToolError::Timeout { tool, seconds } => FetchError::Timeout { tool, seconds },
        ToolError::MissingKey { tool } => FetchError::NonZeroExit { tool, code: None },
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        calls: Mutex<Vec<(Tool, Vec<OsString>)>>,
        fail_with: Option<fn() -> ToolError>,
    }

    #[async_trait]
    impl ToolRunner for Recording {
        async fn run(&self, tool: Tool, args: Vec<OsString>) -> Result<(), ToolError> {
            self.calls.lock().unwrap().push((tool, args));
            match self.fail_with {
                Some(make) => Err(make()),
                None => Ok(()),
            }
        }
    }

    fn url() -> Url {
        Url::parse("https://example.com/stream/master.m3u8").unwrap()
    }

    #[tokio::test]
    async fn test_ytdlp_args() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("run/1_encrypted.m4a");
        let runner = Arc::new(Recording::default());
        let fetcher = YtDlpFetcher::new(runner.clone(), true);

        fetcher.fetch(&url(), &dest).await.unwrap();

        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let (tool, args) = &calls[0];
        assert_eq!(*tool, Tool::YtDlp);
        let args: Vec<_> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert!(args.contains(&"--allow-unplayable-formats".to_string()));
        assert!(args.contains(&"--no-progress".to_string()));
        let out = args.iter().position(|a| a == "--output").unwrap();
        assert_eq!(args[out + 1], dest.to_string_lossy());
        assert_eq!(args.last().unwrap(), url().as_str());
    }

    #[tokio::test]
    async fn test_nm3u8dlre_args() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("1_encrypted_video.mp4");
        let runner = Arc::new(Recording::default());
        let fetcher =
            Nm3u8DlReFetcher::new(runner.clone(), Some(PathBuf::from("/usr/bin/ffmpeg")));

        fetcher.fetch(&url(), &dest).await.unwrap();

        let calls = runner.calls.lock().unwrap();
        let (tool, args) = &calls[0];
        assert_eq!(*tool, Tool::Nm3u8DlRe);
        let args: Vec<_> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args[0], url().as_str());
        let after = |flag: &str| {
            let i = args.iter().position(|a| a == flag).unwrap();
            args[i + 1].clone()
        };
        assert_eq!(after("--save-name"), "1_encrypted_video");
        assert_eq!(after("--save-dir"), dir.path().to_string_lossy());
        assert_eq!(after("--tmp-dir"), dir.path().to_string_lossy());
        assert_eq!(after("--ffmpeg-binary-path"), "/usr/bin/ffmpeg");
        assert!(args.contains(&"--binary-merge".to_string()));
    }

    #[tokio::test]
    async fn test_tool_errors_map_to_fetch_errors() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("x.m4a");

        let runner = Arc::new(Recording {
            fail_with: Some(|| ToolError::NotFound { tool: "yt-dlp" }),
            ..Default::default()
        });
        let err = YtDlpFetcher::new(runner, false).fetch(&url(), &dest).await.unwrap_err();
        assert!(matches!(err, FetchError::ToolNotFound { tool: "yt-dlp" }));

        let runner = Arc::new(Recording {
            fail_with: Some(|| ToolError::Timeout {
                tool: "yt-dlp",
                seconds: 9,
            }),
            ..Default::default()
        });
        let err = YtDlpFetcher::new(runner, false).fetch(&url(), &dest).await.unwrap_err();
        assert!(matches!(err, FetchError::Timeout { seconds: 9, .. }));

        let runner = Arc::new(Recording {
            fail_with: Some(|| ToolError::NonZeroExit {
                tool: "N_m3u8DL-RE",
                code: Some(1),
            }),
            ..Default::default()
        });
        let err = Nm3u8DlReFetcher::new(runner, None)
            .fetch(&url(), &dest)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::NonZeroExit { code: Some(1), .. }));
    }

    #[test]
    fn test_fetcher_for_mode() {
        let runner: Arc<dyn ToolRunner> = Arc::new(Recording::default());
        assert_eq!(
            fetcher_for(DownloadMode::YtDlp, runner.clone(), None, false).name(),
            "yt-dlp"
        );
        assert_eq!(
            fetcher_for(DownloadMode::Nm3u8DlRe, runner, None, false).name(),
            "N_m3u8DL-RE"
        );
    }
}
