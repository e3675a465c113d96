//! Cue sheet parsing.
//!
//! A cue sheet is a text sidecar describing where track boundaries fall
//! within one continuous audio file. Only four directive shapes matter here:
//! the backing `FILE` declaration, `TRACK n AUDIO` markers, track `TITLE`
//! lines, and `INDEX 01 MM:SS:FF` timestamps (75 frames per second, the
//! compact-disc subdivision). Everything else in the sheet is ignored.

use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CueError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no FILE directive in cue sheet '{0}'")]
    MissingFile(PathBuf),
    #[error("no tracks found in cue sheet '{0}'")]
    NoTracks(PathBuf),
    #[error("invalid time format: {0}")]
    InvalidTime(String),
    #[error("invalid track number: {0}")]
    InvalidTrackNumber(String),
}

/// One track entry collected from a cue sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CueTrack {
    /// The `TRACK n` ordinal as written in the sheet.
    pub number: u32,
    pub title: String,
    /// Offset of `INDEX 01` from the start of the backing audio file.
    pub start: Duration,
}

/// A parsed cue sheet, not retained after album assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CueSheet {
    /// Backing audio filename as literally written in the sheet; may be a
    /// path relative to the sheet's own directory.
    pub audio_file: String,
    pub tracks: Vec<CueTrack>,
}

/// Line-oriented cue sheet parser with precompiled directive patterns.
pub struct CueParser {
    file_re: Regex,
    track_re: Regex,
    title_re: Regex,
    index_re: Regex,
}

impl Default for CueParser {
    fn default() -> Self {
        Self::new()
    }
}

impl CueParser {
    pub fn new() -> Self {
        CueParser {
            file_re: Regex::new(r#"(?i)^FILE\s+"([^"]+)""#).expect("valid regex"),
            track_re: Regex::new(r"(?i)^TRACK\s+(\d+)\s+AUDIO").expect("valid regex"),
            title_re: Regex::new(r#"(?i)^TITLE\s+"([^"]*)""#).expect("valid regex"),
            index_re: Regex::new(r"(?i)^INDEX\s+01\s+(\S+)").expect("valid regex"),
        }
    }

    /// Parse the cue sheet at `path`, decoding the text first.
    pub fn parse_file(&self, path: &Path) -> Result<CueSheet, CueError> {
        let content = crate::textio::read_text_file(path)?;
        self.parse_content(&content, path)
    }

    /// Parse already-decoded cue text. `path` is only used for error context.
    pub fn parse_content(&self, content: &str, path: &Path) -> Result<CueSheet, CueError> {
        let mut audio_file = None;
        let mut tracks: Vec<CueTrack> = Vec::new();
        let mut current: Option<CueTrack> = None;

        for raw_line in content.lines() {
            let line = raw_line.trim();
            if let Some(caps) = self.file_re.captures(line) {
                audio_file = Some(caps[1].to_string());
            } else if let Some(caps) = self.track_re.captures(line) {
                // A new TRACK marker finalizes the previous open track.
                if let Some(track) = current.take() {
                    tracks.push(track);
                }
                let number = caps[1]
                    .parse::<u32>()
                    .map_err(|_| CueError::InvalidTrackNumber(caps[1].to_string()))?;
                current = Some(CueTrack {
                    number,
                    title: String::new(),
                    start: Duration::ZERO,
                });
            } else if let Some(track) = current.as_mut() {
                // Title and index lines belong to whichever track is open;
                // outside an open track they are album-level and ignored.
                if let Some(caps) = self.title_re.captures(line) {
                    track.title = caps[1].to_string();
                } else if let Some(caps) = self.index_re.captures(line) {
                    track.start = parse_cue_time(&caps[1])?;
                }
            }
        }
        if let Some(track) = current.take() {
            tracks.push(track);
        }

        if tracks.is_empty() {
            return Err(CueError::NoTracks(path.to_path_buf()));
        }
        let audio_file = audio_file.ok_or_else(|| CueError::MissingFile(path.to_path_buf()))?;

        Ok(CueSheet { audio_file, tracks })
    }
}

/// Convert an `MM:SS:FF` cue timestamp to a duration (75 frames per second).
pub fn parse_cue_time(time: &str) -> Result<Duration, CueError> {
    let parts: Vec<&str> = time.split(':').collect();
    if parts.len() != 3 {
        return Err(CueError::InvalidTime(time.to_string()));
    }
    let parse = |s: &str| {
        s.parse::<u64>()
            .map_err(|_| CueError::InvalidTime(time.to_string()))
    };
    let minutes = parse(parts[0])?;
    let seconds = parse(parts[1])?;
    let frames = parse(parts[2])?;
    let millis = minutes * 60_000 + seconds * 1_000 + frames * 1_000 / 75;
    Ok(Duration::from_millis(millis))
}
