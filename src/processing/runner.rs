//! External binary discovery and invocation

use crate::config::{Config, DownloadMode, RemuxMode, ToolsConfig};
use crate::error::{Error, Result, ToolError};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// External binaries the pipeline drives
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Tool {
    /// ffmpeg
    Ffmpeg,
    /// Bento4 mp4decrypt
    Mp4Decrypt,
    /// GPAC MP4Box
    Mp4Box,
    /// Fallback decrypt tool
    AmDecrypt,
    /// N_m3u8DL-RE stream fetcher
    Nm3u8DlRe,
    /// yt-dlp stream fetcher
    YtDlp,
}

impl Tool {
    /// Binary name searched in PATH
    pub fn binary_name(&self) -> &'static str {
        match self {
            Tool::Ffmpeg => "ffmpeg",
            Tool::Mp4Decrypt => "mp4decrypt",
            Tool::Mp4Box => "MP4Box",
            Tool::AmDecrypt => "amdecrypt",
            Tool::Nm3u8DlRe => "N_m3u8DL-RE",
            Tool::YtDlp => "yt-dlp",
        }
    }

    fn config_key(&self) -> &'static str {
        match self {
            Tool::Ffmpeg => "tools.ffmpeg_path",
            Tool::Mp4Decrypt => "tools.mp4decrypt_path",
            Tool::Mp4Box => "tools.mp4box_path",
            Tool::AmDecrypt => "tools.amdecrypt_path",
            Tool::Nm3u8DlRe => "tools.nm3u8dlre_path",
            Tool::YtDlp => "tools.ytdlp_path",
        }
    }
}

/// Resolved binary locations
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ToolPaths {
    /// ffmpeg
    pub ffmpeg: Option<PathBuf>,
    /// mp4decrypt
    pub mp4decrypt: Option<PathBuf>,
    /// MP4Box
    pub mp4box: Option<PathBuf>,
    /// amdecrypt
    pub amdecrypt: Option<PathBuf>,
    /// N_m3u8DL-RE
    pub nm3u8dlre: Option<PathBuf>,
    /// yt-dlp
    pub ytdlp: Option<PathBuf>,
}

impl ToolPaths {
    /// Location of a tool, if resolved
    pub fn get(&self, tool: Tool) -> Option<&Path> {
        let path = match tool {
            Tool::Ffmpeg => &self.ffmpeg,
            Tool::Mp4Decrypt => &self.mp4decrypt,
            Tool::Mp4Box => &self.mp4box,
            Tool::AmDecrypt => &self.amdecrypt,
            Tool::Nm3u8DlRe => &self.nm3u8dlre,
            Tool::YtDlp => &self.ytdlp,
        };
        path.as_deref()
    }

    /// Location of a tool, or [`ToolError::NotFound`]
    pub fn require(&self, tool: Tool) -> std::result::Result<&Path, ToolError> {
        self.get(tool).ok_or(ToolError::NotFound {
            tool: tool.binary_name(),
        })
    }

    /// Tools the configuration cannot run without
    ///
    /// mp4decrypt is not listed for the legacy-codec ffmpeg path or when the
    /// fallback decrypt tool is selected; music videos still report a
    /// per-item error if it is missing.
    pub fn required_for(config: &Config) -> Vec<Tool> {
        let mut tools = Vec::new();
        let download = &config.download;

        if download.remux_mode == RemuxMode::Ffmpeg
            || config.song.remux_to_mp3
            || download.download_mode == DownloadMode::Nm3u8DlRe
        {
            tools.push(Tool::Ffmpeg);
        }
        if download.remux_mode == RemuxMode::Mp4Box {
            tools.push(Tool::Mp4Box);
        }
        let legacy_ffmpeg =
            config.song.codec.is_legacy() && download.remux_mode == RemuxMode::Ffmpeg;
        if !legacy_ffmpeg && !config.drm.use_wrapper {
            tools.push(Tool::Mp4Decrypt);
        }
        if config.drm.use_wrapper {
            tools.push(Tool::AmDecrypt);
        }
        tools.push(match download.download_mode {
            DownloadMode::YtDlp => Tool::YtDlp,
            DownloadMode::Nm3u8DlRe => Tool::Nm3u8DlRe,
        });
        tools
    }

    /// Fail with a configuration error naming the first missing required tool
    pub fn ensure_required(&self, config: &Config) -> Result<()> {
        for tool in Self::required_for(config) {
            if self.get(tool).is_none() {
                return Err(Error::config(
                    tool.config_key(),
                    format!("required tool {} not found", tool.binary_name()),
                ));
            }
        }
        Ok(())
    }
}

impl ToolsConfig {
    /// Resolve tool paths: explicit path first, then PATH lookup with `which`
    pub fn resolve(&self) -> ToolPaths {
        let find = |explicit: &Option<PathBuf>, tool: Tool| -> Option<PathBuf> {
            if let Some(path) = explicit {
                return Some(path.clone());
            }
            if !self.search_path {
                return None;
            }
            match which::which(tool.binary_name()) {
                Ok(path) => {
                    tracing::debug!(tool = tool.binary_name(), path = ?path, "found tool in PATH");
                    Some(path)
                }
                Err(_) => None,
            }
        };

        ToolPaths {
            ffmpeg: find(&self.ffmpeg_path, Tool::Ffmpeg),
            mp4decrypt: find(&self.mp4decrypt_path, Tool::Mp4Decrypt),
            mp4box: find(&self.mp4box_path, Tool::Mp4Box),
            amdecrypt: find(&self.amdecrypt_path, Tool::AmDecrypt),
            nm3u8dlre: find(&self.nm3u8dlre_path, Tool::Nm3u8DlRe),
            ytdlp: find(&self.ytdlp_path, Tool::YtDlp),
        }
    }
}

/// Runs an external binary with an argument list
///
/// Success is exit code 0; anything else is an error for the current item.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run `tool` with `args` to completion
    async fn run(&self, tool: Tool, args: Vec<OsString>) -> std::result::Result<(), ToolError>;
}

/// [`ToolRunner`] that spawns real processes
pub struct CliToolRunner {
    paths: ToolPaths,
    silent: bool,
    timeout: Duration,
}

impl CliToolRunner {
    /// Create a runner over resolved tool paths
    pub fn new(paths: ToolPaths, silent: bool, timeout: Duration) -> Self {
        Self {
            paths,
            silent,
            timeout,
        }
    }

    /// Create a runner from tool configuration
    pub fn from_config(config: &ToolsConfig) -> Self {
        Self::new(config.resolve(), config.silent, config.tool_timeout)
    }

    /// Resolved tool paths
    pub fn paths(&self) -> &ToolPaths {
        &self.paths
    }
}

#[async_trait]
impl ToolRunner for CliToolRunner {
    async fn run(&self, tool: Tool, args: Vec<OsString>) -> std::result::Result<(), ToolError> {
        let binary = self.paths.require(tool)?;
        let name = tool.binary_name();

        let mut command = Command::new(binary);
        command.args(&args).stdin(Stdio::null()).kill_on_drop(true);
        if self.silent {
            command.stdout(Stdio::null()).stderr(Stdio::null());
        }

        // args carry key material; log the count only
        tracing::debug!(tool = name, arg_count = args.len(), "running external tool");

        let mut child = command.spawn().map_err(|e| ToolError::Spawn {
            tool: name,
            reason: e.to_string(),
        })?;

        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(status) => status.map_err(|e| ToolError::Spawn {
                tool: name,
                reason: e.to_string(),
            })?,
            Err(_) => {
                // kill_on_drop reaps the child when it goes out of scope
                tracing::warn!(tool = name, timeout_secs = self.timeout.as_secs(), "external tool timed out");
                return Err(ToolError::Timeout {
                    tool: name,
                    seconds: self.timeout.as_secs(),
                });
            }
        };

        if status.success() {
            Ok(())
        } else {
            tracing::warn!(tool = name, code = ?status.code(), "external tool failed");
            Err(ToolError::NonZeroExit {
                tool: name,
                code: status.code(),
            })
        }
    }
}

/// Convert a mixed list of strings and paths into process arguments
pub(crate) fn os_args<I, S>(items: I) -> Vec<OsString>
where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
{
    items.into_iter().map(Into::into).collect()
}
