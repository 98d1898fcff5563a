//! # media-dl
//!
//! Backend library that downloads protected music and music videos through
//! external tools and files them under a templated library layout.
//!
//! ## Design Philosophy
//!
//! media-dl is designed to be:
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Tool-driven** - Fetching, decryption and remuxing run in external binaries
//! - **Pluggable** - Metadata and license exchange are traits the caller implements
//! - **Event-driven** - Consumers subscribe to events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use media_dl::pipeline::{BatchItem, BatchRunner, PipelineContext};
//! use media_dl::{Config, KeyProvider, MetadataSource};
//! use std::sync::Arc;
//!
//! # async fn run(
//! #     metadata: Arc<dyn MetadataSource>,
//! #     keys: Arc<dyn KeyProvider>,
//! #     items: Vec<media_dl::types::MediaMetadata>,
//! # ) -> media_dl::Result<()> {
//! let ctx = Arc::new(PipelineContext::new(Config::default(), metadata, keys)?);
//! let runner = BatchRunner::new(ctx);
//!
//! let mut events = runner.subscribe();
//! tokio::spawn(async move {
//!     while let Ok(event) = events.recv().await {
//!         println!("Event: {:?}", event);
//!     }
//! });
//!
//! let summary = runner
//!     .run(items.into_iter().map(BatchItem::single).collect())
//!     .await;
//! println!("{} succeeded, {} failed", summary.succeeded(), summary.failed());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Key provider interface and device credentials
pub mod drm;
/// Error types
pub mod error;
/// Metadata source interface
pub mod metadata;
/// Path templates and sanitization
pub mod naming;
/// Per-item pipelines and the batch runner
pub mod pipeline;
/// External tool processing: fetch, decrypt, remux
pub mod processing;
/// Tag writing
pub mod tagging;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use drm::{CredentialContext, DeviceCredential, KeyProvider};
pub use error::{Error, FetchError, KeyError, Result, TemplateError, ToolError};
pub use metadata::{MetadataSource, StreamRequest};
pub use naming::NamingEngine;
pub use pipeline::{BatchItem, BatchRunner, PipelineContext};
pub use tagging::{LoftyTagApplier, MediaContainer, TagApplier};
pub use types::{BatchSummary, Event, ItemOutcome, MediaTags, PlaylistTags, Stage, StreamInfo};
