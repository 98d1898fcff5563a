//! Path template grammar
//!
//! A template is a `/`-delimited list of fragments. Inside a fragment,
//! `{name}` or `{name:spec}` substitutes a placeholder and `{{` / `}}` are
//! literal braces. Rendering never fails: an absent value or a spec that does
//! not fit the value's type yields the placeholder's fallback literal.
//!
//! `{date}` without a spec renders the release day as `%Y-%m-%d`
//! (`1959-08-17`). A full timestamp would put `:` into the path, which the
//! default illegal-character set rewrites anyway; pass a strftime spec such
//! as `{date:%Y-%m-%d %H.%M}` to get the time.

use crate::error::TemplateError;
use crate::types::{MediaTags, PlaylistTags};
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Utc};
use std::fmt::Write;

/// Date rendering when a `{date}` placeholder carries no spec
const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";

/// The closed placeholder vocabulary
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Placeholder {
    /// Album name
    Album,
    /// Album artist
    AlbumArtist,
    /// Album catalog id
    AlbumId,
    /// Track artist
    Artist,
    /// Artist catalog id
    ArtistId,
    /// Composer
    Composer,
    /// Composer catalog id
    ComposerId,
    /// Release date
    Date,
    /// Disc number
    Disc,
    /// Disc count
    DiscTotal,
    /// Media type label
    MediaType,
    /// Playlist curator
    PlaylistArtist,
    /// Playlist id
    PlaylistId,
    /// Playlist name
    PlaylistTitle,
    /// Position in the playlist
    PlaylistTrack,
    /// Track title
    Title,
    /// Track catalog id
    TitleId,
    /// Track number
    Track,
    /// Track count
    TrackTotal,
}

impl Placeholder {
    /// Every placeholder, in vocabulary order
    pub const ALL: [Placeholder; 19] = [
        Placeholder::Album,
        Placeholder::AlbumArtist,
        Placeholder::AlbumId,
        Placeholder::Artist,
        Placeholder::ArtistId,
        Placeholder::Composer,
        Placeholder::ComposerId,
        Placeholder::Date,
        Placeholder::Disc,
        Placeholder::DiscTotal,
        Placeholder::MediaType,
        Placeholder::PlaylistArtist,
        Placeholder::PlaylistId,
        Placeholder::PlaylistTitle,
        Placeholder::PlaylistTrack,
        Placeholder::Title,
        Placeholder::TitleId,
        Placeholder::Track,
        Placeholder::TrackTotal,
    ];

    /// Look up a placeholder by the name used in templates
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }

    /// Name used in templates
    pub fn name(&self) -> &'static str {
        match self {
            Placeholder::Album => "album",
            Placeholder::AlbumArtist => "album_artist",
            Placeholder::AlbumId => "album_id",
            Placeholder::Artist => "artist",
            Placeholder::ArtistId => "artist_id",
            Placeholder::Composer => "composer",
            Placeholder::ComposerId => "composer_id",
            Placeholder::Date => "date",
            Placeholder::Disc => "disc",
            Placeholder::DiscTotal => "disc_total",
            Placeholder::MediaType => "media_type",
            Placeholder::PlaylistArtist => "playlist_artist",
            Placeholder::PlaylistId => "playlist_id",
            Placeholder::PlaylistTitle => "playlist_title",
            Placeholder::PlaylistTrack => "playlist_track",
            Placeholder::Title => "title",
            Placeholder::TitleId => "title_id",
            Placeholder::Track => "track",
            Placeholder::TrackTotal => "track_total",
        }
    }

    /// Literal substituted when the value is absent or cannot be formatted
    pub fn fallback(&self) -> &'static str {
        match self {
            Placeholder::Album => "Unknown Album",
            Placeholder::AlbumArtist | Placeholder::Artist => "Unknown Artist",
            Placeholder::AlbumId => "Unknown Album ID",
            Placeholder::ArtistId => "Unknown Artist ID",
            Placeholder::Composer => "Unknown Composer",
            Placeholder::ComposerId => "Unknown Composer ID",
            Placeholder::Date => "Unknown Date",
            Placeholder::MediaType => "Unknown Media Type",
            Placeholder::PlaylistArtist => "Unknown Playlist Artist",
            Placeholder::PlaylistId => "Unknown Playlist ID",
            Placeholder::PlaylistTitle => "Unknown Playlist Title",
            Placeholder::Title => "Unknown Title",
            Placeholder::TitleId => "Unknown Title ID",
            Placeholder::Disc
            | Placeholder::DiscTotal
            | Placeholder::Track
            | Placeholder::TrackTotal
            | Placeholder::PlaylistTrack => "",
        }
    }

    /// Whether the placeholder is filled from playlist context
    pub fn is_playlist(&self) -> bool {
        matches!(
            self,
            Placeholder::PlaylistArtist
                | Placeholder::PlaylistId
                | Placeholder::PlaylistTitle
                | Placeholder::PlaylistTrack
        )
    }
}

/// A typed value bound to a placeholder
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// Free text
    Text(String),
    /// Non-negative integer
    Number(u32),
    /// Timestamp
    Date(DateTime<Utc>),
}

/// A placeholder's actual value paired with its fallback literal
#[derive(Clone, Debug, PartialEq)]
pub struct TemplateValue {
    /// Value from metadata, if present
    pub actual: Option<Value>,
    /// Literal used when `actual` is absent or the spec does not apply
    pub fallback: &'static str,
}

impl TemplateValue {
    /// Render with an optional format spec
    pub fn render(&self, spec: Option<&str>) -> String {
        let rendered = match &self.actual {
            None => None,
            Some(Value::Text(text)) => format_text(text, spec),
            Some(Value::Number(n)) => format_number(*n, spec),
            Some(Value::Date(date)) => format_date(date, spec.unwrap_or(DEFAULT_DATE_FORMAT)),
        };
        rendered.unwrap_or_else(|| self.fallback.to_string())
    }
}

/// `[width][s]`, left-aligned like Python's string formatting
fn format_text(text: &str, spec: Option<&str>) -> Option<String> {
    let Some(spec) = spec.filter(|s| !s.is_empty()) else {
        return Some(text.to_string());
    };
    let digits = spec.strip_suffix('s').unwrap_or(spec);
    let width = parse_width(digits)?;
    Some(format!("{text:<width$}"))
}

/// `[0][width][d]`, right-aligned, zero-filled when the spec starts with `0`
fn format_number(n: u32, spec: Option<&str>) -> Option<String> {
    let Some(spec) = spec.filter(|s| !s.is_empty()) else {
        return Some(n.to_string());
    };
    let digits = spec.strip_suffix('d').unwrap_or(spec);
    if digits.starts_with('0') && digits.len() > 1 {
        let width = parse_width(&digits[1..])?;
        Some(format!("{n:0width$}"))
    } else {
        let width = parse_width(digits)?;
        Some(format!("{n:>width$}"))
    }
}

fn format_date(date: &DateTime<Utc>, pattern: &str) -> Option<String> {
    let items: Vec<Item<'_>> = StrftimeItems::new(pattern).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return None;
    }
    let mut out = String::new();
    write!(out, "{}", date.format_with_items(items.into_iter())).ok()?;
    Some(out)
}

fn parse_width(digits: &str) -> Option<usize> {
    if digits.is_empty() {
        return Some(0);
    }
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Values for one render pass
///
/// Media placeholders resolve from `tags`, playlist placeholders from
/// `playlist`; a missing source yields the fallback.
#[derive(Clone, Copy, Debug, Default)]
pub struct TemplateContext<'a> {
    /// Item tags
    pub tags: Option<&'a MediaTags>,
    /// Playlist context
    pub playlist: Option<&'a PlaylistTags>,
}

impl TemplateContext<'_> {
    /// Bind a placeholder to its value
    pub fn value(&self, placeholder: Placeholder) -> TemplateValue {
        let text = |s: Option<&String>| s.map(|s| Value::Text(s.clone()));
        let number = |n: Option<u32>| n.map(Value::Number);
        let tags = self.tags;
        let playlist = self.playlist;

        let actual = match placeholder {
            Placeholder::Album => text(tags.and_then(|t| t.album.as_ref())),
            Placeholder::AlbumArtist => text(tags.and_then(|t| t.album_artist.as_ref())),
            Placeholder::AlbumId => text(tags.and_then(|t| t.album_id.as_ref())),
            Placeholder::Artist => text(tags.and_then(|t| t.artist.as_ref())),
            Placeholder::ArtistId => text(tags.and_then(|t| t.artist_id.as_ref())),
            Placeholder::Composer => text(tags.and_then(|t| t.composer.as_ref())),
            Placeholder::ComposerId => text(tags.and_then(|t| t.composer_id.as_ref())),
            Placeholder::Date => tags.and_then(|t| t.date).map(Value::Date),
            Placeholder::Disc => number(tags.and_then(|t| t.disc)),
            Placeholder::DiscTotal => number(tags.and_then(|t| t.disc_total)),
            Placeholder::MediaType => text(tags.and_then(|t| t.media_type.as_ref())),
            Placeholder::PlaylistArtist => {
                text(playlist.and_then(|p| p.playlist_artist.as_ref()))
            }
            Placeholder::PlaylistId => text(playlist.and_then(|p| p.playlist_id.as_ref())),
            Placeholder::PlaylistTitle => {
                text(playlist.and_then(|p| p.playlist_title.as_ref()))
            }
            Placeholder::PlaylistTrack => number(playlist.and_then(|p| p.playlist_track)),
            Placeholder::Title => text(tags.and_then(|t| t.title.as_ref())),
            Placeholder::TitleId => text(tags.and_then(|t| t.title_id.as_ref())),
            Placeholder::Track => number(tags.and_then(|t| t.track)),
            Placeholder::TrackTotal => number(tags.and_then(|t| t.track_total)),
        };

        TemplateValue {
            actual,
            fallback: placeholder.fallback(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Segment {
    Literal(String),
    Field {
        placeholder: Placeholder,
        spec: Option<String>,
    },
}

/// A parsed path template
#[derive(Clone, Debug, PartialEq)]
pub struct Template {
    fragments: Vec<Vec<Segment>>,
}

impl Template {
    /// Parse a template, rejecting unknown placeholders and unbalanced braces
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let fragments = source
            .split('/')
            .map(parse_fragment)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { fragments })
    }

    /// Number of `/`-delimited fragments
    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    /// Whether the template has no fragments (never true for a parsed template)
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Every placeholder referenced by the template
    pub fn placeholders(&self) -> impl Iterator<Item = Placeholder> + '_ {
        self.fragments.iter().flatten().filter_map(|s| match s {
            Segment::Field { placeholder, .. } => Some(*placeholder),
            Segment::Literal(_) => None,
        })
    }

    /// Render every fragment, unsanitized
    pub fn render(&self, context: &TemplateContext<'_>) -> Vec<String> {
        self.fragments
            .iter()
            .map(|segments| {
                let mut out = String::new();
                for segment in segments {
                    match segment {
                        Segment::Literal(text) => out.push_str(text),
                        Segment::Field { placeholder, spec } => {
                            out.push_str(&context.value(*placeholder).render(spec.as_deref()))
                        }
                    }
                }
                out
            })
            .collect()
    }
}

fn parse_fragment(fragment: &str) -> Result<Vec<Segment>, TemplateError> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = fragment.char_indices().peekable();

    while let Some((offset, c)) = chars.next() {
        match c {
            '{' if chars.peek().map(|(_, c)| *c) == Some('{') => {
                chars.next();
                literal.push('{');
            }
            '}' if chars.peek().map(|(_, c)| *c) == Some('}') => {
                chars.next();
                literal.push('}');
            }
            '}' => return Err(TemplateError::UnmatchedBrace { offset }),
            '{' => {
                let mut body = String::new();
                let mut closed = false;
                for (_, c) in chars.by_ref() {
                    match c {
                        '}' => {
                            closed = true;
                            break;
                        }
                        '{' => return Err(TemplateError::UnclosedBrace { offset }),
                        c => body.push(c),
                    }
                }
                if !closed {
                    return Err(TemplateError::UnclosedBrace { offset });
                }

                let (name, spec) = match body.split_once(':') {
                    Some((name, spec)) => (name, Some(spec.to_string())),
                    None => (body.as_str(), None),
                };
                let placeholder = Placeholder::from_name(name).ok_or_else(|| {
                    TemplateError::UnknownPlaceholder {
                        name: name.to_string(),
                    }
                })?;

                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Field { placeholder, spec });
            }
            c => literal.push(c),
        }
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}
