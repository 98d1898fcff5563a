//! Path naming engine
//!
//! Turns item metadata and user templates into sanitized filesystem paths:
//! the final media path, per-run temp paths, and the cover, lyrics and
//! playlist sidecar paths derived from them.
//!
//! Template selection for the final path:
//!
//! | album | compilation | discs | folder template | file template |
//! |-------|-------------|-------|-----------------|---------------|
//! | yes   | yes         | any   | compilation     | by disc count |
//! | yes   | no          | any   | album           | by disc count |
//! | no    | any         | any   | no-album        | no-album      |
//!
//! "By disc count" is the multi-disc template when `disc_total > 1`, the
//! single-disc template otherwise.

mod sanitize;
mod template;

pub use sanitize::Sanitizer;
pub use template::{Placeholder, Template, TemplateContext, TemplateValue, Value};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::types::{CorrelationTag, MediaTags, PlaylistMetadata, PlaylistTags};
use std::path::{Path, PathBuf};

/// Prefix of per-run temp folders
const TEMP_FOLDER_PREFIX: &str = "media_dl_temp_";

/// Extension of playlist index files
pub const PLAYLIST_EXTENSION: &str = ".m3u8";

/// Curator used when a playlist has none
const UNKNOWN_CURATOR: &str = "Unknown";

#[derive(Clone, Debug)]
struct Templates {
    album_folder: Template,
    compilation_folder: Template,
    no_album_folder: Template,
    single_disc_file: Template,
    multi_disc_file: Template,
    no_album_file: Template,
    playlist_file: Template,
}

/// Computes every path an item run touches
#[derive(Clone, Debug)]
pub struct NamingEngine {
    output_dir: PathBuf,
    temp_dir: PathBuf,
    templates: Templates,
    sanitizer: Sanitizer,
}

impl NamingEngine {
    /// Build the engine from configuration, parsing every template
    pub fn new(config: &Config) -> Result<Self> {
        let parse = |key: &str, source: &str| {
            Template::parse(source).map_err(|e| Error::config(key, e.to_string()))
        };
        let t = &config.templates;
        let templates = Templates {
            album_folder: parse("templates.album_folder", &t.album_folder)?,
            compilation_folder: parse("templates.compilation_folder", &t.compilation_folder)?,
            no_album_folder: parse("templates.no_album_folder", &t.no_album_folder)?,
            single_disc_file: parse("templates.single_disc_file", &t.single_disc_file)?,
            multi_disc_file: parse("templates.multi_disc_file", &t.multi_disc_file)?,
            no_album_file: parse("templates.no_album_file", &t.no_album_file)?,
            playlist_file: parse("templates.playlist_file", &t.playlist_file)?,
        };

        Ok(Self {
            output_dir: config.output.output_dir.clone(),
            temp_dir: config.output.temp_dir.clone(),
            templates,
            sanitizer: Sanitizer::new(
                &config.output.illegal_chars,
                config.output.illegal_char_replacement,
                config.output.truncate,
            ),
        })
    }

    /// Final path of an item under the output root
    ///
    /// Never fails: missing metadata renders as fallback literals.
    pub fn final_path(
        &self,
        tags: &MediaTags,
        file_extension: &str,
        playlist_tags: Option<&PlaylistTags>,
    ) -> PathBuf {
        let (folder, file) = if tags.album.is_some() {
            let folder = if tags.compilation == Some(true) {
                &self.templates.compilation_folder
            } else {
                &self.templates.album_folder
            };
            let file = if tags.disc_total.is_some_and(|n| n > 1) {
                &self.templates.multi_disc_file
            } else {
                &self.templates.single_disc_file
            };
            (folder, file)
        } else {
            (&self.templates.no_album_folder, &self.templates.no_album_file)
        };

        let context = TemplateContext {
            tags: Some(tags),
            playlist: playlist_tags,
        };
        let mut fragments = folder.render(&context);
        fragments.extend(file.render(&context));
        self.join_fragments(fragments, file_extension)
    }

    /// Path of the playlist index file for a playlist
    pub fn playlist_file_path(&self, playlist_tags: &PlaylistTags) -> PathBuf {
        let context = TemplateContext {
            tags: None,
            playlist: Some(playlist_tags),
        };
        let fragments = self.templates.playlist_file.render(&context);
        self.join_fragments(fragments, PLAYLIST_EXTENSION)
    }

    fn join_fragments(&self, fragments: Vec<String>, file_extension: &str) -> PathBuf {
        let last = fragments.len().saturating_sub(1);
        let mut path = self.output_dir.clone();
        for (i, fragment) in fragments.iter().enumerate() {
            if i == last {
                path.push(self.sanitizer.file(fragment, file_extension));
            } else {
                let folder = self.sanitizer.folder(fragment);
                if !folder.is_empty() {
                    path.push(folder);
                }
            }
        }
        path
    }

    /// Per-run temp folder for a correlation tag
    pub fn temp_folder(&self, correlation_tag: &CorrelationTag) -> PathBuf {
        self.temp_dir
            .join(format!("{TEMP_FOLDER_PREFIX}{correlation_tag}"))
    }

    /// `<temp_root>/media_dl_temp_<tag>/<media_id>_<stage_tag><ext>`
    pub fn temp_path(
        &self,
        media_id: &str,
        correlation_tag: &CorrelationTag,
        stage_tag: &str,
        file_extension: &str,
    ) -> PathBuf {
        let media_id = self.sanitizer.replace_illegal(media_id);
        self.temp_folder(correlation_tag)
            .join(format!("{media_id}_{stage_tag}{file_extension}"))
    }

    /// Remove the per-run temp folder, tolerating its absence
    pub async fn cleanup(&self, correlation_tag: &CorrelationTag) {
        let folder = self.temp_folder(correlation_tag);
        match tokio::fs::remove_dir_all(&folder).await {
            Ok(()) => tracing::debug!(path = ?folder, "removed temp folder"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = ?folder, error = %e, "failed to remove temp folder"),
        }
    }

    /// Song cover image: `<final dir>/Cover<ext>`
    pub fn cover_path(final_path: &Path, file_extension: &str) -> PathBuf {
        let dir = final_path.parent().unwrap_or_else(|| Path::new(""));
        dir.join(format!("Cover{file_extension}"))
    }

    /// A file next to the media file sharing its stem (lyrics, music video covers)
    pub fn sidecar_path(final_path: &Path, file_extension: &str) -> PathBuf {
        final_path.with_extension(file_extension.trim_start_matches('.'))
    }

    /// Playlist context for an item
    ///
    /// # Panics
    ///
    /// Panics if `media_id` is not a member of the playlist; the caller
    /// only builds playlist context for items it enumerated from it.
    pub fn playlist_tags(playlist: &PlaylistMetadata, media_id: &str) -> PlaylistTags {
        PlaylistTags {
            playlist_title: playlist.title.clone(),
            playlist_artist: Some(
                playlist
                    .curator
                    .clone()
                    .unwrap_or_else(|| UNKNOWN_CURATOR.to_string()),
            ),
            playlist_id: Some(playlist.id.clone()),
            playlist_track: Some(playlist_position(playlist, media_id)),
        }
    }
}

/// 1-based position of `media_id` in the playlist
///
/// # Panics
///
/// Panics if `media_id` is not a member of the playlist.
pub fn playlist_position(playlist: &PlaylistMetadata, media_id: &str) -> u32 {
    match playlist.track_ids.iter().position(|id| id == media_id) {
        Some(index) => u32::try_from(index + 1).unwrap_or(u32::MAX),
        None => panic!(
            "media {media_id} is not a member of playlist {}",
            playlist.id
        ),
    }
}
