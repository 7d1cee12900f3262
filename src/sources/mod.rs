use std::path::PathBuf;

use crate::errors::PackResult;
use crate::logging::LogSink;
use crate::manifest::SoundsManifest;

pub mod local;
pub mod terraria;
pub mod youtube;

pub use local::LocalFiles;
pub use terraria::{TerrariaDescriptor, TerrariaFolder};
pub use youtube::{PlaylistListing, PlaylistService, RemotePlaylist, RemoteSlots, VideoEntry, YtDlp};

/// Marks a slot that should be dropped from the manifest.
pub const SKIP_SENTINEL: &str = "-";

/// Where the audio for one manifest event comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceRef {
    /// A file the caller picked.
    Local(PathBuf),
    /// A playlist video, downloaded on demand.
    Remote(VideoEntry),
    /// A music file found on disk for a sound the manifest already names.
    /// The manifest is left as is; only the file is produced.
    Discovered { path: PathBuf, identifier: String },
    /// Remove the event key.
    Skip,
}

/// Pairs one manifest event key with its audio source.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub key: String,
    pub source: SourceRef,
    /// The event is keyed by the file name the assembler settles on rather
    /// than by `key`, which is then only a preview.
    pub key_follows_name: bool,
}

impl Assignment {
    pub fn new(key: impl Into<String>, source: SourceRef) -> Self {
        Self {
            key: key.into(),
            source,
            key_follows_name: false,
        }
    }

    /// An event that does not exist in the template yet and takes its key
    /// from the resolved sound name.
    pub fn named_after_source(preview: impl Into<String>, source: SourceRef) -> Self {
        Self {
            key_follows_name: true,
            ..Self::new(preview, source)
        }
    }
}

/// Turns a source into an ordered list of assignments against a manifest.
pub trait SourceEnumerator {
    fn enumerate(&self, manifest: &SoundsManifest, sink: &dyn LogSink) -> PackResult<Vec<Assignment>>;
}
