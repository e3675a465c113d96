//! Downstream album processing.
//!
//! The FFmpeg implementation cuts each track out of its disc's continuous
//! audio file, embeds cover art and tags, and writes the result into the
//! music library as `<artist>/<title> (<year>)[/Disc N]/NN - Title.flac`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use crate::album::{Album, Disc, Track};

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to create output directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[async_trait]
pub trait AlbumProcessor: Send + Sync {
    /// Process one assembled album into `output_root`. Only a success result
    /// lets the scheduler mark the source directory processed.
    async fn process(&self, album: &Album, output_root: &Path) -> Result<(), ProcessError>;
}

/// Invokes the external `ffmpeg` binary once per track.
pub struct FfmpegTranscoder {
    ffmpeg_path: String,
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg_path: impl Into<String>) -> Self {
        FfmpegTranscoder {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    async fn transcode_track(
        &self,
        disc: &Disc,
        track: &Track,
        output_dir: &Path,
        cover_art: Option<&Path>,
    ) {
        let file_name = format!("{:02} - {}.flac", track.number, sanitize_file_name(&track.title));
        let output_path = output_dir.join(file_name);
        let args = build_ffmpeg_args(&disc.audio_path, &output_path, track, cover_art);

        info!("transcoding track {:02}: {}", track.number, track.title);
        let output = tokio::process::Command::new(&self.ffmpeg_path)
            .args(&args)
            .output()
            .await;
        // Per-track failures are logged and the rest of the disc continues,
        // mirroring how a partially broken rip should still mostly convert.
        match output {
            Ok(out) if out.status.success() => {
                info!("created {}", output_path.display());
            }
            Ok(out) => {
                warn!(
                    "ffmpeg failed for track '{}' ({}): {}",
                    track.title,
                    out.status,
                    String::from_utf8_lossy(&out.stderr)
                );
            }
            Err(e) => warn!("could not run {} for '{}': {}", self.ffmpeg_path, track.title, e),
        }
    }
}

#[async_trait]
impl AlbumProcessor for FfmpegTranscoder {
    async fn process(&self, album: &Album, output_root: &Path) -> Result<(), ProcessError> {
        let album_dir = output_root
            .join(sanitize_file_name(&album.artist.to_string()))
            .join(format!(
                "{} ({})",
                sanitize_file_name(&album.title),
                album.year
            ));
        std::fs::create_dir_all(&album_dir).map_err(|e| ProcessError::CreateDir {
            path: album_dir.clone(),
            source: e,
        })?;

        for disc in &album.discs {
            let disc_dir = if album.discs.len() > 1 {
                album_dir.join(format!("Disc {}", disc.number))
            } else {
                album_dir.clone()
            };
            std::fs::create_dir_all(&disc_dir).map_err(|e| ProcessError::CreateDir {
                path: disc_dir.clone(),
                source: e,
            })?;
            for track in &disc.tracks {
                self.transcode_track(disc, track, &disc_dir, album.cover_art.as_deref())
                    .await;
            }
        }
        Ok(())
    }
}

/// One FFmpeg invocation: seek, cut, cover embed, tags, FLAC encode.
fn build_ffmpeg_args(
    input: &Path,
    output: &Path,
    track: &Track,
    cover_art: Option<&Path>,
) -> Vec<String> {
    let mut args: Vec<String> = vec!["-y".into()];

    // -ss/-to apply to the audio input that follows them.
    args.push("-ss".into());
    args.push(format_ffmpeg_time(track.start));
    if let Some(end) = track.end {
        args.push("-to".into());
        args.push(format_ffmpeg_time(end));
    }
    args.push("-i".into());
    args.push(input.to_string_lossy().into_owned());

    if let Some(cover) = cover_art {
        args.push("-i".into());
        args.push(cover.to_string_lossy().into_owned());
    }

    args.push("-map".into());
    args.push("0:a".into());
    if cover_art.is_some() {
        // Embed the image stream as an attached picture in the FLAC.
        for arg in [
            "-map",
            "1:v",
            "-c:v",
            "mjpeg",
            "-disposition:v",
            "attached_pic",
            "-vsync",
            "0",
        ] {
            args.push(arg.into());
        }
    }
    args.push("-c:a".into());
    args.push("flac".into());

    push_metadata(&mut args, "title", &track.title);
    push_metadata(&mut args, "artist", &track.artist);
    push_metadata(&mut args, "album_artist", &track.album_artist);
    push_metadata(&mut args, "album", &track.album);
    push_metadata(&mut args, "date", &track.year);
    push_metadata(&mut args, "track", &track.number.to_string());
    if let Some(lyrics) = &track.lyrics {
        push_metadata(&mut args, "lyrics", lyrics);
    }

    args.push(output.to_string_lossy().into_owned());
    args
}

fn push_metadata(args: &mut Vec<String>, key: &str, value: &str) {
    if !value.is_empty() {
        args.push("-metadata".into());
        args.push(format!("{}={}", key, value));
    }
}

/// Clean a string for use as a file or directory name.
pub fn sanitize_file_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .filter_map(|c| match c {
            '/' | '\\' => Some('_'),
            ':' | '*' | '?' | '"' | '<' | '>' | '|' => None,
            other => Some(other),
        })
        .collect();
    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Format a duration as FFmpeg's `HH:MM:SS.mmm`.
pub fn format_ffmpeg_time(d: Duration) -> String {
    let total_ms = d.as_millis();
    let hours = total_ms / 3_600_000;
    let minutes = total_ms % 3_600_000 / 60_000;
    let seconds = total_ms % 60_000 / 1_000;
    let millis = total_ms % 1_000;
    format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, seconds, millis)
}
