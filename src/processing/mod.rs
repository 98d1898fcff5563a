//! External tool processing: fetch, decrypt, remux
//!
//! Every external binary is reached through the [`ToolRunner`] trait so the
//! dispatch logic can be exercised without the binaries installed:
//!
//! - [`CliToolRunner`]: spawns the real processes with a timeout
//! - [`StreamFetcher`]: [`YtDlpFetcher`] and [`Nm3u8DlReFetcher`]
//! - [`Dispatcher`]: runs the minimal decrypt/remux plan for a stream
//!
//! ## Usage
//!
//! ```no_run
//! use media_dl::config::{LossyBitrate, RemuxMode};
//! use media_dl::processing::{
//!     plan_audio, AudioKeys, AudioPaths, CliToolRunner, Decryptor, Dispatcher, Protection,
//!     Remuxer,
//! };
//! use media_dl::types::DecryptionKey;
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # async fn run() -> media_dl::Result<()> {
//! let runner = Arc::new(CliToolRunner::from_config(&Default::default()));
//! let dispatcher = Dispatcher::new(
//!     Decryptor::new(runner.clone(), "32b8ade1769e26b1ffb8986352793fc6"),
//!     Remuxer::new(runner),
//! );
//!
//! let steps = plan_audio(Protection::Legacy, RemuxMode::Ffmpeg, Some(LossyBitrate::High));
//! let key = DecryptionKey::new("00112233445566778899aabbccddeeff");
//! dispatcher
//!     .run_audio(
//!         &steps,
//!         AudioPaths {
//!             encrypted: Path::new("1_encrypted.m4a"),
//!             decrypted: Path::new("1_decrypted.m4a"),
//!             staged: Path::new("1_staged.mp3"),
//!         },
//!         AudioKeys { key: Some(&key), media_id: "1", fallback_key: None },
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod decrypt;
mod dispatch;
mod fetch;
mod kid;
mod remux;
mod runner;

pub use decrypt::{Decryptor, legacy_key_args, modern_key_args};
pub use dispatch::{
    AudioKeys, AudioPaths, Dispatcher, Protection, Step, VideoPaths, plan_audio,
};
pub use fetch::{Nm3u8DlReFetcher, StreamFetcher, YtDlpFetcher, fetcher_for};
pub use kid::{
    DEFAULT_CHUNK_SIZE, TENC_MARKER, rewrite_key_ids, rewrite_key_ids_in, sequential_key_id,
};
pub use remux::{Remuxer, ffmpeg_copy_args, ffmpeg_mp3_args, mp4box_args};
pub use runner::{CliToolRunner, Tool, ToolPaths, ToolRunner};
