//! Album assembly: turn a stabilized rip directory into an [`Album`].
//!
//! Metadata comes from three places, in priority order: the `Info.txt`
//! descriptor dropped next to the rip, the directory name, and finally the
//! sentinel fallbacks. Track boundaries come from the cue sheets found
//! directly inside the directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::Regex;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::album::{Album, Artist, Disc, Track};
use crate::convert::ScriptNormalizer;
use crate::cue::{CueParser, CueSheet};
use crate::textio;

const DESCRIPTOR_FILE: &str = "Info.txt";
const COVER_FILE: &str = "folder.jpg";

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("failed to read directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Walks a candidate directory and produces a fully populated [`Album`].
pub struct AlbumAssembler {
    cue_parser: CueParser,
    normalizer: Arc<dyn ScriptNormalizer>,
    descriptor_title_re: Regex,
    descriptor_year_re: Regex,
    descriptor_artist_re: Regex,
    dir_full_re: Regex,
    dir_simple_re: Regex,
    guest_zh_re: Regex,
    guest_feat_re: Regex,
}

impl AlbumAssembler {
    pub fn new(normalizer: Arc<dyn ScriptNormalizer>) -> Self {
        AlbumAssembler {
            cue_parser: CueParser::new(),
            normalizer,
            // Known label lines inside the descriptor text.
            descriptor_title_re: Regex::new(r"专辑名称：\s*(.+)").expect("valid regex"),
            descriptor_year_re: Regex::new(r"出版日期：\s*(\d{4})年").expect("valid regex"),
            // First line convention: 艺术家《专辑名》专辑简介
            descriptor_artist_re: Regex::new(r"^(.+)《").expect("valid regex"),
            dir_full_re: Regex::new(r"^(.+?)\s*-\s*(.+?)(?:\s*\(?(\d{4})\)?)?(?:\s+WAV\+CUE)?$")
                .expect("valid regex"),
            dir_simple_re: Regex::new(r"^(.+?)(?:\s*\(?(\d{4})\)?)?(?:\s+WAV\+CUE)?$")
                .expect("valid regex"),
            // The two contracted guest-performer clause forms, nothing more.
            guest_zh_re: Regex::new(r"^(.+?)\s*（与\s*(.+?)(?:合唱)?）\s*$").expect("valid regex"),
            guest_feat_re: Regex::new(r"(?i)^(.+?)\s*\(feat\.\s*(.+?)\s*\)\s*$")
                .expect("valid regex"),
        }
    }

    /// Build an [`Album`] from `root`. A directory yielding zero discs is a
    /// valid, empty result; only failing to list the directory is an error.
    pub fn scan_album_directory(&self, root: &Path) -> Result<Album, ScanError> {
        let mut album = Album {
            path: root.to_path_buf(),
            artist: Artist::Unknown,
            title: String::new(),
            year: String::new(),
            cover_art: None,
            descriptor: None,
            discs: Vec::new(),
        };

        let descriptor_path = root.join(DESCRIPTOR_FILE);
        match textio::read_text_file(&descriptor_path) {
            Ok(content) => {
                self.parse_descriptor(&content, &mut album);
                album.descriptor = Some(content);
            }
            Err(e) => {
                debug!(
                    "no readable {} in {}: {}; falling back to directory name",
                    DESCRIPTOR_FILE,
                    root.display(),
                    e
                );
                let dir_name = root
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                let (artist, title, year) = self.parse_dir_name(&dir_name);
                album.artist = artist;
                album.title = title;
                album.year = year;
            }
        }

        if let Artist::Named(name) = &album.artist {
            album.artist = Artist::Named(self.normalizer.normalize(name));
        }
        album.title = self.normalizer.normalize(&album.title);

        let cover_path = root.join(COVER_FILE);
        if cover_path.is_file() {
            album.cover_art = Some(cover_path);
        }

        debug!("searching for cue sheets in {}", root.display());
        let entries = std::fs::read_dir(root).map_err(|e| ScanError::ReadDir {
            path: root.to_path_buf(),
            source: e,
        })?;
        let mut cue_paths: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file()
                    && path
                        .extension()
                        .and_then(|ext| ext.to_str())
                        .map(|ext| ext.eq_ignore_ascii_case("cue"))
                        .unwrap_or(false)
            })
            .collect();
        cue_paths.sort();

        let mut disc_number = 1u32;
        for cue_path in cue_paths {
            info!("found cue sheet: {}", cue_path.display());
            match self.build_disc(&cue_path, disc_number, &album) {
                Ok(disc) => {
                    album.discs.push(disc);
                    disc_number += 1;
                }
                // Disc-scoped failure: skip this cue, keep walking.
                Err(e) => warn!("skipping cue sheet {}: {}", cue_path.display(), e),
            }
        }
        album.discs.sort_by_key(|disc| disc.number);

        Ok(album)
    }

    fn parse_descriptor(&self, content: &str, album: &mut Album) {
        if let Some(caps) = self.descriptor_title_re.captures(content) {
            album.title = caps[1].trim().to_string();
        }
        if let Some(caps) = self.descriptor_year_re.captures(content) {
            album.year = caps[1].trim().to_string();
        }
        if let Some(caps) = self.descriptor_artist_re.captures(content) {
            album.artist = Artist::named(caps[1].trim());
        } else {
            warn!("could not extract artist from descriptor, using fallback");
            album.artist = Artist::Unknown;
        }
    }

    /// Derive (artist, title, year) from the directory base name, trying
    /// "Artist - Title (Year)" first, then "Title (Year)".
    fn parse_dir_name(&self, dir_name: &str) -> (Artist, String, String) {
        if let Some(caps) = self.dir_full_re.captures(dir_name) {
            let artist = Artist::named(caps[1].trim());
            let title = caps[2].trim().to_string();
            let year = caps
                .get(3)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            return (artist, title, year);
        }
        if let Some(caps) = self.dir_simple_re.captures(dir_name) {
            let title = caps[1].trim().to_string();
            let year = caps
                .get(2)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            return (Artist::Unknown, title, year);
        }
        (Artist::Unknown, dir_name.to_string(), String::new())
    }

    fn build_disc(
        &self,
        cue_path: &Path,
        disc_number: u32,
        album: &Album,
    ) -> Result<Disc, crate::cue::CueError> {
        let sheet = self.cue_parser.parse_file(cue_path)?;

        // The filename inside the cue may be relative to the sheet itself.
        let cue_dir = cue_path.parent().unwrap_or(Path::new(""));
        let audio_path = cue_dir.join(&sheet.audio_file);
        if !audio_path.is_file() {
            return Err(crate::cue::CueError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!(
                    "audio file '{}' referenced by cue not found",
                    audio_path.display()
                ),
            )));
        }

        Ok(Disc {
            number: disc_number,
            cue_path: cue_path.to_path_buf(),
            audio_path,
            tracks: self.build_tracks(&sheet, album),
        })
    }

    fn build_tracks(&self, sheet: &CueSheet, album: &Album) -> Vec<Track> {
        let album_artist = album.artist.to_string();
        let mut tracks = Vec::with_capacity(sheet.tracks.len());
        for (i, cue_track) in sheet.tracks.iter().enumerate() {
            let mut title = self.normalizer.normalize(&cue_track.title);
            let mut artist = album_artist.clone();
            if let Some((clean_title, guests)) = self.split_guest_clause(&title) {
                title = clean_title;
                artist = format!("{}, {}", album_artist, self.normalizer.normalize(&guests));
            }
            tracks.push(Track {
                number: cue_track.number,
                title,
                artist,
                album_artist: album_artist.clone(),
                album: album.title.clone(),
                year: album.year.clone(),
                start: cue_track.start,
                end: sheet.tracks.get(i + 1).map(|next| next.start),
                online_id: None,
                lyrics: None,
            });
        }
        tracks
    }

    /// Split a guest-performer clause off a track title. Returns the cleaned
    /// title and the guest names when one of the two accepted forms matches.
    fn split_guest_clause(&self, title: &str) -> Option<(String, String)> {
        for re in [&self.guest_zh_re, &self.guest_feat_re] {
            if let Some(caps) = re.captures(title) {
                return Some((caps[1].trim().to_string(), caps[2].trim().to_string()));
            }
        }
        None
    }
}
