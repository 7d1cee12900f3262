use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use log::warn;
use serde::Deserialize;

use crate::errors::{PackError, PackResult};
use crate::logging::LogSink;
use crate::manifest::SoundsManifest;
use super::{Assignment, SourceEnumerator, SourceRef};

pub const DESCRIPTOR_FILE: &str = "pack.json";
pub const ICON_FILE: &str = "icon.png";

/// Checked in this order; the first hit wins.
const MUSIC_EXTENSIONS: [&str; 3] = ["mp3", "wav", "ogg"];

/// The `pack.json` of a Terraria resource pack.
#[derive(Debug, Clone, Deserialize)]
pub struct TerrariaDescriptor {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Author", default)]
    pub author: Option<String>,
    #[serde(rename = "Description", default)]
    pub description: Option<String>,
}

impl TerrariaDescriptor {
    pub fn load(source_dir: &Path) -> PackResult<Self> {
        let path = source_dir.join(DESCRIPTOR_FILE);
        let text = std::fs::read_to_string(&path).map_err(|e| PackError::Descriptor {
            path: path.clone(),
            message: e.to_string(),
        })?;
        let descriptor: Self = serde_json::from_str(&text).map_err(|e| PackError::Descriptor {
            path: path.clone(),
            message: e.to_string(),
        })?;
        if descriptor.name.trim().is_empty() {
            return Err(PackError::Descriptor {
                path,
                message: "Name is empty".to_string(),
            });
        }
        Ok(descriptor)
    }
}

/// Finds music for the sounds an already-populated manifest references,
/// under `<source>/Content/Music`.
pub struct TerrariaFolder {
    music_dir: PathBuf,
    strict: bool,
}

impl TerrariaFolder {
    pub fn new(source_dir: &Path, strict: bool) -> Self {
        Self {
            music_dir: source_dir.join("Content").join("Music"),
            strict,
        }
    }

    /// Lowercased file name → path. Terraria ships `Music_1.mp3` while the
    /// manifest says `music_1`.
    fn index_music_dir(&self) -> PackResult<HashMap<String, PathBuf>> {
        let mut index = HashMap::new();
        if !self.music_dir.is_dir() {
            return Ok(index);
        }
        let entries = std::fs::read_dir(&self.music_dir).map_err(|e| PackError::io(&self.music_dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| PackError::io(&self.music_dir, e))?;
            let path = entry.path();
            if path.is_file() {
                index.insert(entry.file_name().to_string_lossy().to_lowercase(), path);
            }
        }
        Ok(index)
    }
}

impl SourceEnumerator for TerrariaFolder {
    fn enumerate(&self, manifest: &SoundsManifest, sink: &dyn LogSink) -> PackResult<Vec<Assignment>> {
        let index = self.index_music_dir()?;
        if index.is_empty() {
            sink.log(&format!("No music found in {}", self.music_dir.display()));
        }

        let mut seen = HashSet::new();
        let mut assignments = Vec::new();

        for (key, event) in manifest.events() {
            for sound in &event.sounds {
                let identifier = sound.identifier();
                if !seen.insert(identifier.to_string()) {
                    continue;
                }

                let found = MUSIC_EXTENSIONS
                    .iter()
                    .find_map(|ext| index.get(&format!("{}.{}", identifier, ext).to_lowercase()));

                match found {
                    Some(path) => assignments.push(Assignment::new(
                        key,
                        SourceRef::Discovered {
                            path: path.clone(),
                            identifier: identifier.to_string(),
                        },
                    )),
                    None if self.strict => return Err(PackError::LookupGap(sound.name.clone())),
                    None => {
                        warn!("No music file for {} ({})", sound.name, key);
                        sink.log(&format!("No music file for \"{}\", leaving it as is", sound.name));
                    }
                }
            }
        }

        Ok(assignments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::MemorySink;

    fn manifest() -> SoundsManifest {
        SoundsManifest::parse(
            r#"{
                "overworld_day": {"sounds": [{"name": "environmentalmusic:music_1"}]},
                "underground": {"sounds": [{"name": "environmentalmusic:music_4"}]},
                "boss": {"sounds": [{"name": "environmentalmusic:music_5"}, {"name": "environmentalmusic:music_1"}]},
                "jungle": {"sounds": [{"name": "environmentalmusic:music_7"}]}
            }"#,
        )
        .unwrap()
    }

    fn source_with(files: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let music = dir.path().join("Content/Music");
        std::fs::create_dir_all(&music).unwrap();
        for f in files {
            std::fs::write(music.join(f), b"audio").unwrap();
        }
        dir
    }

    #[test]
    fn extension_precedence_is_mp3_wav_ogg() {
        let dir = source_with(&["Music_1.ogg", "Music_1.wav", "Music_4.ogg", "Music_4.mp3"]);
        let assignments = TerrariaFolder::new(dir.path(), false)
            .enumerate(&manifest(), &MemorySink::new())
            .unwrap();

        let picked: Vec<_> = assignments
            .iter()
            .map(|a| match &a.source {
                SourceRef::Discovered { path, .. } => path.file_name().unwrap().to_string_lossy().to_string(),
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(picked, vec!["Music_1.wav", "Music_4.mp3"]);
    }

    #[test]
    fn gaps_are_skipped_in_lenient_mode() {
        let dir = source_with(&["Music_5.mp3"]);
        let sink = MemorySink::new();
        let assignments = TerrariaFolder::new(dir.path(), false).enumerate(&manifest(), &sink).unwrap();

        assert_eq!(assignments.len(), 1);
        assert_eq!(assignments[0].key, "boss");
        assert!(sink.contains("environmentalmusic:music_7"));
    }

    #[test]
    fn gaps_fail_in_strict_mode() {
        let dir = source_with(&["Music_1.mp3"]);
        let err = TerrariaFolder::new(dir.path(), true)
            .enumerate(&manifest(), &MemorySink::new())
            .unwrap_err();
        assert!(matches!(err, PackError::LookupGap(name) if name == "environmentalmusic:music_4"));
    }

    #[test]
    fn shared_sound_is_scheduled_once() {
        let dir = source_with(&["Music_1.mp3", "Music_5.mp3"]);
        let assignments = TerrariaFolder::new(dir.path(), false)
            .enumerate(&manifest(), &MemorySink::new())
            .unwrap();
        assert_eq!(assignments.len(), 2);
    }

    #[test]
    fn descriptor_requires_name() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(TerrariaDescriptor::load(dir.path()), Err(PackError::Descriptor { .. })));

        std::fs::write(dir.path().join(DESCRIPTOR_FILE), r#"{"Author":"Re-Logic"}"#).unwrap();
        assert!(matches!(TerrariaDescriptor::load(dir.path()), Err(PackError::Descriptor { .. })));

        std::fs::write(dir.path().join(DESCRIPTOR_FILE), r#"{"Name":"Calm Remix","Author":"Re-Logic","Version":{"major":1}}"#).unwrap();
        let descriptor = TerrariaDescriptor::load(dir.path()).unwrap();
        assert_eq!(descriptor.name, "Calm Remix");
        assert_eq!(descriptor.author.as_deref(), Some("Re-Logic"));
    }
}
