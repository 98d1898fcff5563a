//! Error types for media-dl
//!
//! This module provides the error taxonomy for the library:
//! - Configuration errors, fatal at startup (bad template placeholder, missing tool)
//! - Per-item errors (metadata resolution, key acquisition, external tools, tagging)
//!   which the pipeline converts into a skip-and-report outcome
//! - Machine-readable error codes for summaries and events

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for media-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for media-dl
///
/// Each variant carries enough context to report the failing item without
/// re-reading pipeline state.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "templates.album_folder")
        key: Option<String>,
    },

    /// The item's metadata could not be resolved, or it is not streamable
    #[error("metadata resolution failed for {media_id}: {reason}")]
    MetadataResolution {
        /// Media id of the item
        media_id: String,
        /// Why resolution failed
        reason: String,
    },

    /// The key provider could not produce a decryption key
    #[error("key acquisition failed for {media_id}: {source}")]
    KeyAcquisition {
        /// Media id of the item
        media_id: String,
        /// Underlying key provider error
        #[source]
        source: KeyError,
    },

    /// The stream fetch tool failed
    #[error("stream fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// An external decrypt/remux binary failed
    #[error("external tool error: {0}")]
    ExternalTool(#[from] ToolError),

    /// Tag writing failed
    #[error("tagging error: {0}")]
    Tagging(#[from] lofty::error::LoftyError),

    /// A pipeline field was read before the stage that sets it ran, or set twice
    #[error("invalid pipeline state: {0}")]
    InvalidState(String),

    /// Moving the staged file to its final path failed
    #[error("failed to move {source_path} to {dest_path}: {reason}")]
    MoveFailed {
        /// Staged file
        source_path: PathBuf,
        /// Final path
        dest_path: PathBuf,
        /// The reason the move failed
        reason: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Background task panicked or was cancelled
    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Errors found while parsing a path template
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// A `{name}` that is not part of the placeholder vocabulary
    #[error("unknown placeholder {{{name}}}")]
    UnknownPlaceholder {
        /// The name as written in the template
        name: String,
    },

    /// A `{` without its closing `}`
    #[error("unclosed '{{' at offset {offset}")]
    UnclosedBrace {
        /// Byte offset of the opening brace within the fragment
        offset: usize,
    },

    /// A single `}` outside a placeholder (use `}}` for a literal brace)
    #[error("unmatched '}}' at offset {offset}")]
    UnmatchedBrace {
        /// Byte offset of the brace within the fragment
        offset: usize,
    },
}

/// Errors returned by a [`KeyProvider`](crate::drm::KeyProvider)
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// The license server refused to issue a license
    #[error("no license issued: {0}")]
    NoLicense(String),

    /// The license exchange could not reach the server
    #[error("network failure during license exchange: {0}")]
    NetworkFailure(String),

    /// Credentials or device are expired or revoked
    #[error("credentials expired: {0}")]
    Expired(String),
}

/// Errors returned by a [`StreamFetcher`](crate::processing::StreamFetcher)
#[derive(Debug, Error)]
pub enum FetchError {
    /// The fetch tool binary is not configured and not in PATH
    #[error("fetch tool {tool} not found")]
    ToolNotFound {
        /// Tool name
        tool: &'static str,
    },

    /// The fetch tool exited with a non-zero status
    #[error("{tool} exited with status {code:?}")]
    NonZeroExit {
        /// Tool name
        tool: &'static str,
        /// Exit code, if the process was not killed by a signal
        code: Option<i32>,
    },

    /// The fetch tool did not finish within the configured timeout
    #[error("{tool} timed out after {seconds}s")]
    Timeout {
        /// Tool name
        tool: &'static str,
        /// Timeout that elapsed
        seconds: u64,
    },
}

/// Errors from external decrypt/remux binaries
#[derive(Debug, Error)]
pub enum ToolError {
    /// Required tool is not configured and not in PATH
    #[error("{tool} not found")]
    NotFound {
        /// Tool name
        tool: &'static str,
    },

    /// The process could not be spawned
    #[error("failed to execute {tool}: {reason}")]
    Spawn {
        /// Tool name
        tool: &'static str,
        /// OS error text
        reason: String,
    },

    /// The process exited with a non-zero status
    #[error("{tool} exited with status {code:?}")]
    NonZeroExit {
        /// Tool name
        tool: &'static str,
        /// Exit code, if the process was not killed by a signal
        code: Option<i32>,
    },

    /// The process did not finish within the configured timeout
    #[error("{tool} timed out after {seconds}s")]
    Timeout {
        /// Tool name
        tool: &'static str,
        /// Timeout that elapsed
        seconds: u64,
    },

    /// A decrypt step needed a key that was never acquired
    #[error("{tool} requires a decryption key but none was acquired")]
    MissingKey {
        /// Tool name
        tool: &'static str,
    },
}

impl Error {
    /// Build a configuration error for a specific key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Machine-readable error code used in summaries and events
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::MetadataResolution { .. } => "metadata_resolution_failed",
            Error::KeyAcquisition { source, .. } => match source {
                KeyError::NoLicense(_) => "no_license",
                KeyError::NetworkFailure(_) => "key_network_failure",
                KeyError::Expired(_) => "key_expired",
            },
            Error::Fetch(e) => match e {
                FetchError::ToolNotFound { .. } => "fetch_tool_not_found",
                FetchError::NonZeroExit { .. } => "fetch_failed",
                FetchError::Timeout { .. } => "fetch_timeout",
            },
            Error::ExternalTool(e) => match e {
                ToolError::NotFound { .. } => "tool_not_found",
                ToolError::Spawn { .. } => "tool_spawn_failed",
                ToolError::NonZeroExit { .. } => "tool_failed",
                ToolError::Timeout { .. } => "tool_timeout",
                ToolError::MissingKey { .. } => "missing_key",
            },
            Error::Tagging(_) => "tagging_error",
            Error::InvalidState(_) => "invalid_state",
            Error::MoveFailed { .. } => "move_failed",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::Join(_) => "task_failed",
        }
    }

    /// Whether this error is fatal for the whole batch rather than a single item
    ///
    /// Only configuration errors stop a batch; everything else skips the item.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Config { .. })
    }
}
