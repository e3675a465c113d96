use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Album artist as extracted from descriptor text or the directory name.
///
/// The fallback is an explicit variant rather than a magic string, so
/// downstream code can tell "nothing told us the artist" apart from an
/// artist genuinely named "Unknown Artist".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artist {
    Unknown,
    Named(String),
}

impl Artist {
    pub fn named(name: impl Into<String>) -> Self {
        Artist::Named(name.into())
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Artist::Unknown)
    }
}

impl fmt::Display for Artist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Historical name used for on-disk layout and tagging.
            Artist::Unknown => f.write_str("Unknown Artist"),
            Artist::Named(name) => f.write_str(name),
        }
    }
}

/// A fully assembled album rip, ready for transcoding and enrichment.
///
/// Mutated only during assembly; treated as immutable once handed to the
/// downstream processor. Discs are sorted ascending by disc number.
#[derive(Debug, Clone, PartialEq)]
pub struct Album {
    /// Root directory of the rip inside the drop root.
    pub path: PathBuf,
    pub artist: Artist,
    pub title: String,
    /// Free-form publication year, empty when nothing could be extracted.
    pub year: String,
    /// Path to `folder.jpg` when present.
    pub cover_art: Option<PathBuf>,
    /// Raw descriptor text (`Info.txt`) as decoded, when present.
    pub descriptor: Option<String>,
    pub discs: Vec<Disc>,
}

/// One disc of an album: a cue sheet plus the continuous audio file it cuts.
#[derive(Debug, Clone, PartialEq)]
pub struct Disc {
    /// 1-based, assigned in the order cue sheets were encountered.
    pub number: u32,
    pub cue_path: PathBuf,
    /// Backing audio file the cue references, resolved relative to the cue.
    pub audio_path: PathBuf,
    pub tracks: Vec<Track>,
}

/// A single track cut out of a disc's continuous audio file.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    /// Matches the cue sheet `TRACK n` ordinal.
    pub number: u32,
    pub title: String,
    /// Performing artist; differs from the album artist on guest tracks.
    pub artist: String,
    pub album_artist: String,
    pub album: String,
    pub year: String,
    /// Offset from the start of the disc audio file.
    pub start: Duration,
    /// `None` on the final track of a disc: cut runs to end of file.
    pub end: Option<Duration>,
    /// Online catalog id, filled in by the metadata fetcher.
    pub online_id: Option<i64>,
    /// Lyrics text, filled in by the metadata fetcher.
    pub lyrics: Option<String>,
}
