//! Tag writing for finished media files
//!
//! Tags are written with lofty. Legacy audio (mp3) gets ID3v2.3, everything
//! else gets MP4 ilst atoms. Existing tags are always cleared first, so
//! applying the same tags twice leaves the same file.
//!
//! Source-specific extra tags have no generic lofty key, so MP4 files get them
//! as freeform (`----:mean:name`) atoms written on the [`Ilst`] directly.

use crate::config::DownloadConfig;
use crate::error::Result;
use crate::types::{ExtraTags, FileFormat, MediaTags};
use lofty::config::WriteOptions;
use lofty::mp4::{Atom, AtomData, AtomIdent, Ilst};
use lofty::picture::{MimeType, Picture, PictureType};
use lofty::tag::{Accessor, ItemKey, Tag, TagExt, TagType};
use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Tag container of a finished file
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaContainer {
    /// mp3 output, tagged with ID3v2.3
    AudioLegacy,
    /// m4a/mp4/m4v output, tagged with MP4 atoms
    Modern,
}

impl MediaContainer {
    /// Container for a final file extension (with or without the dot)
    pub fn for_extension(ext: &str) -> Self {
        if ext.trim_start_matches('.').eq_ignore_ascii_case("mp3") {
            Self::AudioLegacy
        } else {
            Self::Modern
        }
    }

    /// Container for a remuxed file format
    pub fn for_format(format: FileFormat) -> Self {
        Self::for_extension(format.extension())
    }

    fn tag_type(self) -> TagType {
        match self {
            Self::AudioLegacy => TagType::Id3v2,
            Self::Modern => TagType::Mp4Ilst,
        }
    }
}

/// Tag names accepted in `exclude_tags`
pub const TAG_NAMES: &[&str] = &[
    "title",
    "artist",
    "album",
    "album_artist",
    "composer",
    "date",
    "track",
    "track_total",
    "disc",
    "disc_total",
    "compilation",
    "genre",
    "copyright",
    "comment",
    "lyrics",
    "cover",
    "extra",
];

/// Writes tags into a finished file
///
/// Implementations do blocking file I/O; async callers should go through
/// [`apply_tags`].
pub trait TagApplier: Send + Sync {
    /// Replace all tags of `path` with `tags`, `cover` and `extra`
    fn apply(
        &self,
        path: &Path,
        container: MediaContainer,
        tags: &MediaTags,
        cover: Option<&[u8]>,
        extra: &ExtraTags,
    ) -> Result<()>;
}

/// Options for [`LoftyTagApplier`]
#[derive(Clone, Debug, Default)]
pub struct TagOptions {
    /// Clear tags and write nothing
    pub skip_all: bool,
    /// Tag names to leave out
    pub exclude: HashSet<String>,
    /// strftime pattern for the date tag
    pub date_template: String,
}

impl TagOptions {
    /// Build from download settings
    pub fn from_config(config: &DownloadConfig) -> Self {
        Self {
            skip_all: config.skip_all_tagging(),
            exclude: config.exclude_tags.iter().cloned().collect(),
            date_template: config.date_tag_template.clone(),
        }
    }

    fn wants(&self, name: &str) -> bool {
        !self.exclude.contains(name)
    }
}

/// lofty-backed tag writer
#[derive(Clone, Debug, Default)]
pub struct LoftyTagApplier {
    options: TagOptions,
}

impl LoftyTagApplier {
    /// Create a tag writer
    pub fn new(options: TagOptions) -> Self {
        Self { options }
    }

    /// Build the lofty tag for one file, without extra tags
    fn build(&self, container: MediaContainer, tags: &MediaTags, cover: Option<&[u8]>) -> Tag {
        let mut tag = Tag::new(container.tag_type());
        let opts = &self.options;

        if let Some(v) = &tags.title
            && opts.wants("title")
        {
            tag.set_title(v.clone());
        }
        if let Some(v) = &tags.artist
            && opts.wants("artist")
        {
            tag.set_artist(v.clone());
        }
        if let Some(v) = &tags.album
            && opts.wants("album")
        {
            tag.set_album(v.clone());
        }
        if let Some(v) = &tags.album_artist
            && opts.wants("album_artist")
        {
            tag.insert_text(ItemKey::AlbumArtist, v.clone());
        }
        if let Some(v) = &tags.composer
            && opts.wants("composer")
        {
            tag.insert_text(ItemKey::Composer, v.clone());
        }
        if let Some(date) = &tags.date
            && opts.wants("date")
        {
            let mut rendered = String::new();
            if write!(rendered, "{}", date.format(&opts.date_template)).is_ok() {
                tag.insert_text(ItemKey::RecordingDate, rendered);
            } else {
                tracing::warn!(
                    template = %opts.date_template,
                    "invalid date tag template, date not written"
                );
            }
        }
        if let Some(v) = tags.track
            && opts.wants("track")
        {
            tag.set_track(v);
        }
        if let Some(v) = tags.track_total
            && opts.wants("track_total")
        {
            tag.set_track_total(v);
        }
        if let Some(v) = tags.disc
            && opts.wants("disc")
        {
            tag.set_disk(v);
        }
        if let Some(v) = tags.disc_total
            && opts.wants("disc_total")
        {
            tag.set_disk_total(v);
        }
        if let Some(v) = &tags.genre
            && opts.wants("genre")
        {
            tag.set_genre(v.clone());
        }
        if let Some(v) = &tags.comment
            && opts.wants("comment")
        {
            tag.set_comment(v.clone());
        }
        if let Some(v) = &tags.copyright
            && opts.wants("copyright")
        {
            tag.insert_text(ItemKey::CopyrightMessage, v.clone());
        }
        if let Some(v) = &tags.lyrics
            && opts.wants("lyrics")
        {
            tag.insert_text(ItemKey::Lyrics, v.clone());
        }
        if let Some(v) = tags.compilation
            && opts.wants("compilation")
        {
            tag.insert_text(ItemKey::FlagCompilation, if v { "1" } else { "0" }.to_string());
        }

        if let Some(bytes) = cover
            && opts.wants("cover")
        {
            tag.push_picture(Picture::new_unchecked(
                PictureType::CoverFront,
                sniff_mime(bytes),
                None,
                bytes.to_vec(),
            ));
        }

        tag
    }
}

impl TagApplier for LoftyTagApplier {
    fn apply(
        &self,
        path: &Path,
        container: MediaContainer,
        tags: &MediaTags,
        cover: Option<&[u8]>,
        extra: &ExtraTags,
    ) -> Result<()> {
        let tag_type = container.tag_type();
        tag_type.remove_from_path(path)?;

        if self.options.skip_all {
            tracing::debug!(path = %path.display(), "tagging disabled, existing tags cleared");
            return Ok(());
        }

        let tag = self.build(container, tags, cover);
        let items = tag.item_count();
        let has_cover = tag.picture_count() > 0;

        match container {
            MediaContainer::AudioLegacy => {
                tag.save_to_path(path, WriteOptions::default().use_id3v23(true))?;
            }
            MediaContainer::Modern => {
                let mut ilst = Ilst::from(tag);
                if self.options.wants("extra") {
                    for (key, value) in extra {
                        ilst.insert(freeform_atom(key, value));
                    }
                }
                ilst.save_to_path(path, WriteOptions::default())?;
            }
        }

        tracing::debug!(
            path = %path.display(),
            items,
            extra = extra.len(),
            has_cover,
            "tags written"
        );
        Ok(())
    }
}

/// Apply tags on the blocking pool
pub async fn apply_tags(
    applier: Arc<dyn TagApplier>,
    path: PathBuf,
    container: MediaContainer,
    tags: MediaTags,
    cover: Option<Vec<u8>>,
    extra: ExtraTags,
) -> Result<()> {
    tokio::task::spawn_blocking(move || {
        applier.apply(&path, container, &tags, cover.as_deref(), &extra)
    })
    .await?
}

/// Namespace of freeform atoms for bare extra tag keys
const ITUNES_MEAN: &str = "com.apple.iTunes";

/// Freeform atom for an extra tag
///
/// `----:mean:name` keys keep their namespace; bare keys go under
/// `com.apple.iTunes`.
fn freeform_atom(key: &str, value: &str) -> Atom<'static> {
    let (mean, name) = match key
        .strip_prefix("----:")
        .and_then(|rest| rest.split_once(':'))
    {
        Some((mean, name)) => (mean.to_string(), name.to_string()),
        None => (ITUNES_MEAN.to_string(), key.to_string()),
    };
    Atom::new(
        AtomIdent::Freeform {
            mean: mean.into(),
            name: name.into(),
        },
        AtomData::UTF8(value.to_string()),
    )
}

/// Image type from magic bytes
fn sniff_mime(bytes: &[u8]) -> Option<MimeType> {
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some(MimeType::Png)
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some(MimeType::Jpeg)
    } else {
        None
    }
}
