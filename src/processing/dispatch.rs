//! Decrypt/remux dispatch
//!
//! Planning is pure: codec family, remux backend and output flags map to the
//! minimal list of [`Step`]s. Execution threads paths through the steps: the
//! first step reads the encrypted file, later steps read the decrypted
//! intermediate, and the last step writes the staged file.
//!
//! | protection | backend | lossy | steps |
//! |------------|---------|-------|-------|
//! | legacy     | ffmpeg  | no    | decrypt+remux (one ffmpeg call) |
//! | legacy     | ffmpeg  | yes   | key-aware transcode |
//! | legacy     | MP4Box  | no    | legacy decrypt, remux |
//! | legacy     | MP4Box  | yes   | legacy decrypt, transcode |
//! | modern     | any     | no    | key-id rewrite + decrypt, remux |
//! | modern     | any     | yes   | key-id rewrite + decrypt, transcode |
//! | fallback   | any     | no    | fallback decrypt |
//! | fallback   | any     | yes   | fallback decrypt, transcode |
//! | clear      | any     | no    | remux |
//! | clear      | any     | yes   | transcode |

use super::decrypt::Decryptor;
use super::remux::Remuxer;
use crate::config::{LossyBitrate, RemuxMode, SongCodec};
use crate::error::{Result, ToolError};
use crate::types::{DecryptionKey, DecryptionKeys};
use std::path::Path;

/// How an audio stream is protected, decided once per item
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Protection {
    /// Legacy key scheme, single key bound to key id 1
    Legacy,
    /// System-managed scheme with an acquired key
    Modern,
    /// Delegated to the fallback decrypt tool
    Fallback,
    /// No key material; stream is remuxed as-is
    Clear,
}

impl Protection {
    /// Protection of a song stream
    ///
    /// A modern stream with no protection header and no fallback tool is
    /// treated as unencrypted.
    pub fn for_song(codec: SongCodec, use_fallback: bool, has_pssh: bool) -> Self {
        if codec.is_legacy() {
            Protection::Legacy
        } else if use_fallback {
            Protection::Fallback
        } else if has_pssh {
            Protection::Modern
        } else {
            Protection::Clear
        }
    }

    /// Whether a key must be acquired from the key provider
    pub fn needs_key(&self) -> bool {
        matches!(self, Protection::Legacy | Protection::Modern)
    }
}

/// One external operation in an audio plan
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    /// ffmpeg decrypts with the legacy key and stream-copies in one call
    DecryptRemux,
    /// mp4decrypt with the legacy single-key shape
    DecryptLegacy,
    /// Key-id rewrite, then mp4decrypt with the sequential key pair
    DecryptModern,
    /// Fallback decrypt tool
    DecryptFallback,
    /// Stream-copy remux
    Remux(RemuxMode),
    /// Transcode to mp3; `with_key` decrypts legacy input on the way
    Transcode {
        /// Bitrate tier
        bitrate: LossyBitrate,
        /// Pass the legacy key to ffmpeg
        with_key: bool,
    },
}

/// Plan the steps for an audio stream
pub fn plan_audio(
    protection: Protection,
    backend: RemuxMode,
    lossy: Option<LossyBitrate>,
) -> Vec<Step> {
    let finish = match lossy {
        Some(bitrate) => Step::Transcode {
            bitrate,
            with_key: false,
        },
        None => Step::Remux(backend),
    };

    match (protection, backend, lossy) {
        (Protection::Legacy, RemuxMode::Ffmpeg, None) => vec![Step::DecryptRemux],
        (Protection::Legacy, RemuxMode::Ffmpeg, Some(bitrate)) => vec![Step::Transcode {
            bitrate,
            with_key: true,
        }],
        (Protection::Legacy, RemuxMode::Mp4Box, _) => vec![Step::DecryptLegacy, finish],
        (Protection::Modern, _, _) => vec![Step::DecryptModern, finish],
        (Protection::Fallback, _, None) => vec![Step::DecryptFallback],
        (Protection::Fallback, _, Some(_)) => vec![Step::DecryptFallback, finish],
        (Protection::Clear, _, _) => vec![finish],
    }
}

/// Files an audio plan reads and writes
#[derive(Clone, Copy, Debug)]
pub struct AudioPaths<'a> {
    /// Fetched stream
    pub encrypted: &'a Path,
    /// Intermediate between two steps
    pub decrypted: &'a Path,
    /// Output of the last step
    pub staged: &'a Path,
}

/// Key material for an audio plan
#[derive(Clone, Copy, Debug, Default)]
pub struct AudioKeys<'a> {
    /// Content key (legacy and modern)
    pub key: Option<&'a DecryptionKey>,
    /// Media id passed to the fallback tool
    pub media_id: &'a str,
    /// Opaque fallback key
    pub fallback_key: Option<&'a str>,
}

/// Files a music video plan reads and writes
#[derive(Clone, Copy, Debug)]
pub struct VideoPaths<'a> {
    /// Fetched video track
    pub encrypted_video: &'a Path,
    /// Fetched audio track
    pub encrypted_audio: &'a Path,
    /// Decrypted video track
    pub decrypted_video: &'a Path,
    /// Decrypted audio track
    pub decrypted_audio: &'a Path,
    /// Muxed output
    pub staged: &'a Path,
}

/// Executes plans with the decrypt and remux tools
#[derive(Clone)]
pub struct Dispatcher {
    decryptor: Decryptor,
    remuxer: Remuxer,
}

impl Dispatcher {
    /// Create a dispatcher
    pub fn new(decryptor: Decryptor, remuxer: Remuxer) -> Self {
        Self { decryptor, remuxer }
    }

    /// Run an audio plan; any failing step aborts the item
    pub async fn run_audio(
        &self,
        steps: &[Step],
        paths: AudioPaths<'_>,
        keys: AudioKeys<'_>,
    ) -> Result<()> {
        let last = steps.len().saturating_sub(1);
        for (i, step) in steps.iter().enumerate() {
            let input = if i == 0 { paths.encrypted } else { paths.decrypted };
            let output = if i == last { paths.staged } else { paths.decrypted };
            tracing::debug!(media_id = keys.media_id, step = ?step, "running dispatch step");

            match *step {
                Step::DecryptRemux => {
                    let key = require_key(keys.key, "ffmpeg")?;
                    self.remuxer
                        .ffmpeg(&[input], output, Some(&key.key), false)
                        .await?
                }
                Step::DecryptLegacy => {
                    let key = require_key(keys.key, "mp4decrypt")?;
                    self.decryptor.mp4decrypt_legacy(input, output, &key.key).await?
                }
                Step::DecryptModern => {
                    let key = require_key(keys.key, "mp4decrypt")?;
                    self.decryptor.mp4decrypt_modern(input, output, &key.key).await?
                }
                Step::DecryptFallback => {
                    let fallback_key = keys
                        .fallback_key
                        .ok_or(ToolError::MissingKey { tool: "amdecrypt" })?;
                    self.decryptor
                        .amdecrypt(input, output, keys.media_id, fallback_key)
                        .await?
                }
                Step::Remux(RemuxMode::Ffmpeg) => {
                    self.remuxer.ffmpeg(&[input], output, None, false).await?
                }
                Step::Remux(RemuxMode::Mp4Box) => self.remuxer.mp4box(&[input], output).await?,
                Step::Transcode { bitrate, with_key } => {
                    let key = if with_key {
                        Some(require_key(keys.key, "ffmpeg")?.key.as_str())
                    } else {
                        None
                    };
                    self.remuxer.mp3(input, output, bitrate, key).await?
                }
            }
        }
        Ok(())
    }

    /// Decrypt both music video tracks with the legacy key shape, then mux
    ///
    /// MP4Box takes audio then video; ffmpeg takes video then audio and
    /// copies subtitles as `mov_text`.
    pub async fn run_video(
        &self,
        backend: RemuxMode,
        paths: VideoPaths<'_>,
        keys: &DecryptionKeys,
    ) -> Result<()> {
        let video_key = require_key(keys.video.as_ref(), "mp4decrypt")?;
        self.decryptor
            .mp4decrypt_legacy(paths.encrypted_video, paths.decrypted_video, &video_key.key)
            .await?;
        self.decryptor
            .mp4decrypt_legacy(paths.encrypted_audio, paths.decrypted_audio, &keys.audio.key)
            .await?;

        match backend {
            RemuxMode::Mp4Box => {
                self.remuxer
                    .mp4box(&[paths.decrypted_audio, paths.decrypted_video], paths.staged)
                    .await
            }
            RemuxMode::Ffmpeg => {
                self.remuxer
                    .ffmpeg(
                        &[paths.decrypted_video, paths.decrypted_audio],
                        paths.staged,
                        None,
                        true,
                    )
                    .await
            }
        }
    }
}

fn require_key<'a>(
    key: Option<&'a DecryptionKey>,
    tool: &'static str,
) -> std::result::Result<&'a DecryptionKey, ToolError> {
    key.ok_or(ToolError::MissingKey { tool })
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::processing::runner::{Tool, ToolRunner};
    use async_trait::async_trait;
    use std::ffi::OsString;
    use std::sync::{Arc, Mutex};

    const LOSSY: Option<LossyBitrate> = Some(LossyBitrate::Mid);

    #[derive(Default)]
    struct Recording {
        calls: Mutex<Vec<(Tool, Vec<String>)>>,
        fail_on: Option<Tool>,
    }

    impl Recording {
        fn tools(&self) -> Vec<Tool> {
            self.calls.lock().unwrap().iter().map(|(t, _)| *t).collect()
        }
    }

    #[async_trait]
    impl ToolRunner for Recording {
        async fn run(&self, tool: Tool, args: Vec<OsString>) -> std::result::Result<(), ToolError> {
            let args = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
            self.calls.lock().unwrap().push((tool, args));
            if self.fail_on == Some(tool) {
                return Err(ToolError::NonZeroExit {
                    tool: tool.binary_name(),
                    code: Some(1),
                });
            }
            Ok(())
        }
    }

    fn dispatcher(runner: Arc<Recording>) -> Dispatcher {
        Dispatcher::new(
            Decryptor::new(runner.clone(), "defaultkey"),
            Remuxer::new(runner),
        )
    }

    #[test]
    fn test_plan_table() {
        use Protection::*;
        use RemuxMode::*;
        let mid = LossyBitrate::Mid;
        let transcode = Step::Transcode {
            bitrate: mid,
            with_key: false,
        };

        assert_eq!(plan_audio(Legacy, Ffmpeg, None), vec![Step::DecryptRemux]);
        assert_eq!(
            plan_audio(Legacy, Ffmpeg, LOSSY),
            vec![Step::Transcode {
                bitrate: mid,
                with_key: true
            }]
        );
        assert_eq!(
            plan_audio(Legacy, Mp4Box, None),
            vec![Step::DecryptLegacy, Step::Remux(Mp4Box)]
        );
        assert_eq!(plan_audio(Legacy, Mp4Box, LOSSY), vec![Step::DecryptLegacy, transcode]);
        for backend in [Ffmpeg, Mp4Box] {
            assert_eq!(
                plan_audio(Modern, backend, None),
                vec![Step::DecryptModern, Step::Remux(backend)]
            );
            assert_eq!(plan_audio(Modern, backend, LOSSY), vec![Step::DecryptModern, transcode]);
            assert_eq!(plan_audio(Fallback, backend, None), vec![Step::DecryptFallback]);
            assert_eq!(
                plan_audio(Fallback, backend, LOSSY),
                vec![Step::DecryptFallback, transcode]
            );
            assert_eq!(plan_audio(Clear, backend, None), vec![Step::Remux(backend)]);
            assert_eq!(plan_audio(Clear, backend, LOSSY), vec![transcode]);
        }
    }

    #[test]
    fn test_protection_for_song() {
        assert_eq!(Protection::for_song(SongCodec::AacLegacy, true, true), Protection::Legacy);
        assert_eq!(Protection::for_song(SongCodec::Alac, true, true), Protection::Fallback);
        assert_eq!(Protection::for_song(SongCodec::Atmos, false, true), Protection::Modern);
        assert_eq!(Protection::for_song(SongCodec::Aac, false, false), Protection::Clear);
        assert!(Protection::Legacy.needs_key());
        assert!(!Protection::Fallback.needs_key());
    }

    struct Files {
        _dir: tempfile::TempDir,
        encrypted: std::path::PathBuf,
        decrypted: std::path::PathBuf,
        staged: std::path::PathBuf,
    }

    impl Files {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let encrypted = dir.path().join("1_encrypted.m4a");
            // key-id rewrite opens the encrypted file
            std::fs::write(&encrypted, b"no markers here").unwrap();
            Self {
                encrypted,
                decrypted: dir.path().join("1_decrypted.m4a"),
                staged: dir.path().join("1_staged.m4a"),
                _dir: dir,
            }
        }

        fn paths(&self) -> AudioPaths<'_> {
            AudioPaths {
                encrypted: &self.encrypted,
                decrypted: &self.decrypted,
                staged: &self.staged,
            }
        }
    }

    #[tokio::test]
    async fn test_legacy_ffmpeg_is_single_invocation() {
        let runner = Arc::new(Recording::default());
        let files = Files::new();
        let key = DecryptionKey::new("cafe");
        let keys = AudioKeys {
            key: Some(&key),
            media_id: "1",
            fallback_key: None,
        };

        let steps = plan_audio(Protection::Legacy, RemuxMode::Ffmpeg, None);
        dispatcher(runner.clone()).run_audio(&steps, files.paths(), keys).await.unwrap();

        assert_eq!(runner.tools(), vec![Tool::Ffmpeg]);
        let calls = runner.calls.lock().unwrap();
        let args = &calls[0].1;
        assert!(args.windows(2).any(|w| w == ["-decryption_key", "cafe"]));
        assert_eq!(args.last().unwrap(), &files.staged.to_string_lossy());
    }

    #[tokio::test]
    async fn test_modern_mp4box_threads_paths() {
        let runner = Arc::new(Recording::default());
        let files = Files::new();
        let key = DecryptionKey::new("beef");
        let keys = AudioKeys {
            key: Some(&key),
            media_id: "1",
            fallback_key: None,
        };

        let steps = plan_audio(Protection::Modern, RemuxMode::Mp4Box, None);
        dispatcher(runner.clone()).run_audio(&steps, files.paths(), keys).await.unwrap();

        assert_eq!(runner.tools(), vec![Tool::Mp4Decrypt, Tool::Mp4Box]);
        let calls = runner.calls.lock().unwrap();
        let decrypt = &calls[0].1;
        assert_eq!(decrypt[1], "00000000000000000000000000000001:beef");
        assert_eq!(decrypt[3], "00000000000000000000000000000000:defaultkey");
        assert_eq!(decrypt[4], files.encrypted.to_string_lossy());
        assert_eq!(decrypt[5], files.decrypted.to_string_lossy());
        let remux = &calls[1].1;
        assert_eq!(remux[2], files.decrypted.to_string_lossy());
        assert_eq!(remux.last().unwrap(), &files.staged.to_string_lossy());
    }

    #[tokio::test]
    async fn test_fallback_is_single_invocation_into_staged() {
        let runner = Arc::new(Recording::default());
        let files = Files::new();
        let keys = AudioKeys {
            key: None,
            media_id: "1440818839",
            fallback_key: Some("skd://opaque"),
        };

        let steps = plan_audio(Protection::Fallback, RemuxMode::Ffmpeg, None);
        dispatcher(runner.clone()).run_audio(&steps, files.paths(), keys).await.unwrap();

        assert_eq!(runner.tools(), vec![Tool::AmDecrypt]);
        let calls = runner.calls.lock().unwrap();
        let args = &calls[0].1;
        assert_eq!(args[3], files.staged.to_string_lossy());
        assert_eq!(args[5], "1440818839");
        assert_eq!(args[7], "skd://opaque");
    }

    #[tokio::test]
    async fn test_failure_aborts_remaining_steps() {
        let runner = Arc::new(Recording {
            fail_on: Some(Tool::Mp4Decrypt),
            ..Default::default()
        });
        let files = Files::new();
        let key = DecryptionKey::new("beef");
        let keys = AudioKeys {
            key: Some(&key),
            media_id: "1",
            fallback_key: None,
        };

        let steps = plan_audio(Protection::Legacy, RemuxMode::Mp4Box, LOSSY);
        let err = dispatcher(runner.clone())
            .run_audio(&steps, files.paths(), keys)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::ExternalTool(ToolError::NonZeroExit { .. })));
        assert_eq!(runner.tools(), vec![Tool::Mp4Decrypt]);
    }

    #[tokio::test]
    async fn test_missing_key_is_reported_before_running() {
        let runner = Arc::new(Recording::default());
        let files = Files::new();
        let keys = AudioKeys {
            key: None,
            media_id: "1",
            fallback_key: None,
        };

        let steps = plan_audio(Protection::Legacy, RemuxMode::Ffmpeg, None);
        let err = dispatcher(runner.clone())
            .run_audio(&steps, files.paths(), keys)
            .await
            .unwrap_err();

        assert_eq!(err.code(), "missing_key");
        assert!(runner.tools().is_empty());
    }

    #[tokio::test]
    async fn test_video_order_per_backend() {
        let dir = tempfile::tempdir().unwrap();
        let p = |name: &str| dir.path().join(name);
        let (ev, ea, dv, da, staged) = (p("ev.mp4"), p("ea.m4a"), p("dv.mp4"), p("da.m4a"), p("s.m4v"));
        let paths = VideoPaths {
            encrypted_video: &ev,
            encrypted_audio: &ea,
            decrypted_video: &dv,
            decrypted_audio: &da,
            staged: &staged,
        };
        let keys = DecryptionKeys {
            audio: DecryptionKey::new("aa"),
            video: Some(DecryptionKey::new("vv")),
        };

        let runner = Arc::new(Recording::default());
        dispatcher(runner.clone())
            .run_video(RemuxMode::Mp4Box, paths, &keys)
            .await
            .unwrap();
        assert_eq!(runner.tools(), vec![Tool::Mp4Decrypt, Tool::Mp4Decrypt, Tool::Mp4Box]);
        {
            let calls = runner.calls.lock().unwrap();
            assert_eq!(calls[0].1[1], "1:vv");
            assert_eq!(calls[1].1[1], "1:aa");
            let mux = &calls[2].1;
            assert_eq!(mux[2], da.to_string_lossy());
            assert_eq!(mux[4], dv.to_string_lossy());
        }

        let runner = Arc::new(Recording::default());
        dispatcher(runner.clone())
            .run_video(RemuxMode::Ffmpeg, paths, &keys)
            .await
            .unwrap();
        let calls = runner.calls.lock().unwrap();
        let mux = &calls[2].1;
        assert_eq!(calls[2].0, Tool::Ffmpeg);
        let inputs: Vec<_> = mux
            .windows(2)
            .filter(|w| w[0] == "-i")
            .map(|w| w[1].clone())
            .collect();
        assert_eq!(inputs, vec![dv.to_string_lossy(), da.to_string_lossy()]);
        assert!(mux.windows(2).any(|w| w == ["-c:s", "mov_text"]));
    }
}
