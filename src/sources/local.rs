use std::path::PathBuf;

use crate::errors::{PackError, PackResult};
use crate::logging::LogSink;
use crate::manifest::SoundsManifest;
use super::{Assignment, SourceEnumerator, SourceRef, SKIP_SENTINEL};

/// One caller-chosen file per manifest slot, in manifest key order.
#[derive(Debug, Clone)]
pub struct LocalFiles {
    slots: Vec<Option<PathBuf>>,
}

impl LocalFiles {
    pub fn new(slots: Vec<Option<PathBuf>>) -> Self {
        Self { slots }
    }

    /// Parses raw slot values; [`SKIP_SENTINEL`] means "skip this slot".
    pub fn from_raw<S: AsRef<str>>(raw: &[S]) -> Self {
        let slots = raw
            .iter()
            .map(|s| match s.as_ref().trim() {
                SKIP_SENTINEL => None,
                path => Some(PathBuf::from(path)),
            })
            .collect();
        Self { slots }
    }

    pub fn into_slots(self) -> Vec<Option<PathBuf>> {
        self.slots
    }
}

impl SourceEnumerator for LocalFiles {
    fn enumerate(&self, manifest: &SoundsManifest, _sink: &dyn LogSink) -> PackResult<Vec<Assignment>> {
        if self.slots.len() != manifest.len() {
            return Err(PackError::InvalidCommand(format!(
                "expected {} slot(s), one per manifest event, got {}",
                manifest.len(),
                self.slots.len()
            )));
        }

        manifest
            .keys()
            .zip(&self.slots)
            .map(|(key, slot)| match slot {
                None => Ok(Assignment::new(key, SourceRef::Skip)),
                Some(path) if path.is_file() => Ok(Assignment::new(key, SourceRef::Local(path.clone()))),
                Some(path) => Err(PackError::InvalidCommand(format!(
                    "source file for \"{}\" does not exist: {}",
                    key,
                    path.display()
                ))),
            })
            .collect()
    }
}
