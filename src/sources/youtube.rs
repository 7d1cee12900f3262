//! Playlist-backed sources.
//!
//! Listing and downloading go through a [`PlaylistService`]; the default one
//! shells out to `yt-dlp`. Transient network failures are retried with
//! exponential backoff up to the configured attempt count.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::assembler::CancelToken;
use crate::config::RetrySettings;
use crate::errors::{PackError, PackResult};
use crate::logging::LogSink;
use crate::manifest::SoundsManifest;
use crate::naming::normalize;
use super::{Assignment, SourceEnumerator, SourceRef};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoEntry {
    pub id: String,
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistListing {
    pub title: String,
    pub videos: Vec<VideoEntry>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    /// Worth another try: resets, timeouts, DNS hiccups.
    #[error("{0}")]
    Transient(String),
    #[error("{0}")]
    Fatal(String),
}

/// Lists playlists and fetches the best audio stream of a video.
pub trait PlaylistService: Send + Sync {
    fn list(&self, reference: &str) -> Result<PlaylistListing, FetchError>;

    /// Downloads the audio of `video` into `dir` and returns the file path.
    fn download_audio(&self, video: &VideoEntry, dir: &Path) -> Result<PathBuf, FetchError>;
}

/// Runs `op` until it succeeds, fails fatally, or runs out of attempts.
pub fn with_retry<T>(
    retry: &RetrySettings,
    cancel: &CancelToken,
    sink: &dyn LogSink,
    what: &str,
    mut op: impl FnMut() -> Result<T, FetchError>,
) -> PackResult<T> {
    let mut attempt = 1;
    loop {
        cancel.check()?;
        match op() {
            Ok(value) => return Ok(value),
            Err(FetchError::Fatal(message)) => {
                return Err(PackError::Network { attempts: attempt, message });
            }
            Err(FetchError::Transient(message)) if attempt >= retry.max_attempts => {
                return Err(PackError::Network { attempts: attempt, message });
            }
            Err(FetchError::Transient(message)) => {
                let delay = retry.delay_for(attempt);
                warn!("{} failed (attempt {}): {}", what, attempt, message);
                sink.log(&format!(
                    "Connection to YouTube failed while {}. Trying again in {} seconds...",
                    what,
                    delay.as_secs_f64()
                ));
                std::thread::sleep(delay);
                attempt += 1;
            }
        }
    }
}

/// How playlist videos land in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteSlots {
    /// One entry per manifest key, in key order: a video index or `None` to
    /// drop the key.
    Indexed(Vec<Option<usize>>),
    /// Every video becomes its own event, keyed by its normalized title.
    Dynamic,
}

pub struct RemotePlaylist {
    listing: PlaylistListing,
    slots: RemoteSlots,
}

impl RemotePlaylist {
    pub fn new(listing: PlaylistListing, slots: RemoteSlots) -> Self {
        Self { listing, slots }
    }

    pub fn title(&self) -> &str {
        &self.listing.title
    }
}

impl SourceEnumerator for RemotePlaylist {
    fn enumerate(&self, manifest: &SoundsManifest, sink: &dyn LogSink) -> PackResult<Vec<Assignment>> {
        sink.log(&format!(
            "Getting videos from playlist \"{}\" ({} found)...",
            self.listing.title,
            self.listing.videos.len()
        ));

        match &self.slots {
            // The template's fixed slots have no source in this mode.
            RemoteSlots::Dynamic => Ok(manifest
                .keys()
                .map(|key| Assignment::new(key, SourceRef::Skip))
                .chain(
                    self.listing
                        .videos
                        .iter()
                        .map(|video| {
                            Assignment::named_after_source(normalize(&video.title), SourceRef::Remote(video.clone()))
                        }),
                )
                .collect()),
            RemoteSlots::Indexed(indices) => {
                if indices.len() != manifest.len() {
                    return Err(PackError::InvalidCommand(format!(
                        "expected {} slot(s), one per manifest event, got {}",
                        manifest.len(),
                        indices.len()
                    )));
                }
                manifest
                    .keys()
                    .zip(indices)
                    .map(|(key, index)| match index {
                        None => Ok(Assignment::new(key, SourceRef::Skip)),
                        Some(i) => self
                            .listing
                            .videos
                            .get(*i)
                            .map(|video| Assignment::new(key, SourceRef::Remote(video.clone())))
                            .ok_or_else(|| {
                                PackError::InvalidCommand(format!(
                                    "slot \"{}\" refers to video {} but the playlist has {}",
                                    key,
                                    i,
                                    self.listing.videos.len()
                                ))
                            }),
                    })
                    .collect()
            }
        }
    }
}

/// [`PlaylistService`] backed by the `yt-dlp` command line tool.
pub struct YtDlp {
    binary: PathBuf,
}

#[derive(Deserialize)]
struct FlatPlaylist {
    title: Option<String>,
    #[serde(default)]
    entries: Vec<FlatEntry>,
}

#[derive(Deserialize)]
struct FlatEntry {
    id: String,
    title: Option<String>,
    url: Option<String>,
}

impl YtDlp {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self { binary: binary.into() }
    }

    fn run(&self, args: &[&str]) -> Result<String, FetchError> {
        let mut command = Command::new(&self.binary);
        command.args(args).stdin(Stdio::null());
        debug!("Running {:?}", command);

        let output = command
            .output()
            .map_err(|e| FetchError::Fatal(format!("failed to start {}: {}", self.binary.display(), e)))?;

        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if is_transient(&stderr) {
            Err(FetchError::Transient(stderr))
        } else {
            Err(FetchError::Fatal(stderr))
        }
    }

    fn parse_listing(json: &str) -> Result<PlaylistListing, FetchError> {
        let flat: FlatPlaylist = serde_json::from_str(json)
            .map_err(|e| FetchError::Fatal(format!("unexpected playlist listing: {}", e)))?;

        let title = flat
            .title
            .ok_or_else(|| FetchError::Fatal("Invalid playlist URL".to_string()))?;

        let videos = flat
            .entries
            .into_iter()
            .map(|e| VideoEntry {
                url: e.url.unwrap_or_else(|| format!("https://www.youtube.com/watch?v={}", e.id)),
                title: e.title.unwrap_or_else(|| e.id.clone()),
                id: e.id,
            })
            .collect();

        Ok(PlaylistListing { title, videos })
    }
}

fn is_transient(stderr: &str) -> bool {
    const MARKERS: [&str; 6] = [
        "Connection reset",
        "timed out",
        "Temporary failure in name resolution",
        "Unable to download",
        "HTTP Error 5",
        "urlopen error",
    ];
    MARKERS.iter().any(|m| stderr.contains(m))
}

impl PlaylistService for YtDlp {
    fn list(&self, reference: &str) -> Result<PlaylistListing, FetchError> {
        let json = self.run(&["--flat-playlist", "--dump-single-json", "--no-warnings", reference])?;
        Self::parse_listing(&json)
    }

    fn download_audio(&self, video: &VideoEntry, dir: &Path) -> Result<PathBuf, FetchError> {
        let template = dir.join("%(id)s.%(ext)s");
        let template = template.to_string_lossy();
        let stdout = self.run(&[
            "--format",
            "bestaudio",
            "--no-playlist",
            "--no-progress",
            "--output",
            &template,
            "--print",
            "after_move:filepath",
            &video.url,
        ])?;

        stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .last()
            .map(PathBuf::from)
            .ok_or_else(|| FetchError::Fatal(format!("yt-dlp reported no file for \"{}\"", video.title)))
    }
}
