//! The `sounds.json` document: event key → `{ "sounds": [ { "name": .. } ] }`.
//!
//! The schema is checked on load so a broken template fails before any audio
//! work starts. Unknown fields on events and sounds (`stream`, `volume`, ...)
//! are carried through untouched, and key order is preserved on write.

use std::path::Path;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{PackError, PackResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoundRef {
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SoundRef {
    pub fn new(name: impl Into<String>) -> Self {
        let mut extra = Map::new();
        extra.insert("stream".to_string(), Value::Bool(true));
        Self { name: name.into(), extra }
    }

    /// The part after `<namespace>:`.
    pub fn identifier(&self) -> &str {
        self.name.split_once(':').map_or(self.name.as_str(), |(_, id)| id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoundEvent {
    pub sounds: Vec<SoundRef>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SoundsManifest {
    events: Vec<(String, SoundEvent)>,
}

impl SoundsManifest {
    pub fn load(path: &Path) -> PackResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| PackError::io(path, e))?;
        Self::parse(&text)
            .map_err(|e| PackError::InvalidManifest(format!("{}: {}", path.display(), e)))
    }

    pub fn parse(text: &str) -> PackResult<Self> {
        let root: Value = serde_json::from_str(text)?;
        let Value::Object(map) = root else {
            return Err(PackError::InvalidManifest("top level must be an object".to_string()));
        };

        let mut events = Vec::with_capacity(map.len());
        for (key, value) in map {
            if key.is_empty() {
                return Err(PackError::InvalidManifest("empty event key".to_string()));
            }
            let event: SoundEvent = serde_json::from_value(value)
                .map_err(|e| PackError::InvalidManifest(format!("event \"{}\": {}", key, e)))?;
            for sound in &event.sounds {
                validate_sound_name(&key, &sound.name)?;
            }
            events.push((key, event));
        }

        Ok(Self { events })
    }

    pub fn to_json(&self) -> PackResult<String> {
        let mut map = Map::with_capacity(self.events.len());
        for (key, event) in &self.events {
            map.insert(key.clone(), serde_json::to_value(event)?);
        }
        Ok(serde_json::to_string_pretty(&Value::Object(map))?)
    }

    /// Rewrites the whole file.
    pub fn save(&self, path: &Path) -> PackResult<()> {
        let json = self.to_json()?;
        std::fs::write(path, json).map_err(|e| PackError::io(path, e))
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.events.iter().map(|(k, _)| k.as_str())
    }

    pub fn get(&self, key: &str) -> Option<&SoundEvent> {
        self.events.iter().find(|(k, _)| k == key).map(|(_, e)| e)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn events(&self) -> impl Iterator<Item = (&str, &SoundEvent)> {
        self.events.iter().map(|(k, e)| (k.as_str(), e))
    }

    pub fn remove(&mut self, key: &str) -> bool {
        let before = self.events.len();
        self.events.retain(|(k, _)| k != key);
        self.events.len() != before
    }

    /// Points `key` at a single sound called `name`, keeping the attributes of
    /// the event's first sound. A missing key is appended.
    pub fn set_sound(&mut self, key: &str, name: &str) {
        match self.events.iter_mut().find(|(k, _)| k == key) {
            Some((_, event)) => {
                let mut sound = event.sounds.first().cloned().unwrap_or_else(|| SoundRef::new(name));
                sound.name = name.to_string();
                event.sounds = vec![sound];
            }
            None => self.events.push((
                key.to_string(),
                SoundEvent {
                    sounds: vec![SoundRef::new(name)],
                    extra: Map::new(),
                },
            )),
        }
    }
}

fn validate_sound_name(key: &str, name: &str) -> PackResult<()> {
    match name.split_once(':') {
        Some((ns, id)) if !ns.is_empty() && !id.is_empty() => Ok(()),
        _ => Err(PackError::InvalidManifest(format!(
            "event \"{}\": sound name \"{}\" is not of the form <namespace>:<identifier>",
            key, name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"{
        "overworld_day": { "sounds": [ { "name": "environmentalmusic:day", "stream": true } ] },
        "cave": { "sounds": [ { "name": "environmentalmusic:cave", "volume": 0.8 }, { "name": "environmentalmusic:cave_2" } ], "subtitle": "Cave" },
        "boss": { "sounds": [] }
    }"#;

    #[test]
    fn preserves_key_order() {
        let manifest = SoundsManifest::parse(SAMPLE).unwrap();
        assert_eq!(manifest.keys().collect::<Vec<_>>(), vec!["overworld_day", "cave", "boss"]);
    }

    #[test]
    fn set_sound_keeps_attributes_of_first_sound() {
        let mut manifest = SoundsManifest::parse(SAMPLE).unwrap();
        manifest.set_sound("cave", "environmentalmusic:deep_caves");

        let cave = manifest.get("cave").unwrap();
        assert_eq!(cave.sounds.len(), 1);
        assert_eq!(cave.sounds[0].name, "environmentalmusic:deep_caves");
        assert_eq!(cave.sounds[0].extra.get("volume"), Some(&serde_json::json!(0.8)));
        assert_eq!(cave.extra.get("subtitle"), Some(&serde_json::json!("Cave")));
    }

    #[test]
    fn set_sound_appends_unknown_key() {
        let mut manifest = SoundsManifest::parse(SAMPLE).unwrap();
        manifest.set_sound("new_track", "environmentalmusic:new_track");
        assert_eq!(manifest.keys().last(), Some("new_track"));
        assert_eq!(manifest.get("new_track").unwrap().sounds[0].extra.get("stream"), Some(&Value::Bool(true)));
    }

    #[test]
    fn remove_drops_key() {
        let mut manifest = SoundsManifest::parse(SAMPLE).unwrap();
        assert!(manifest.remove("cave"));
        assert!(!manifest.remove("cave"));
        assert_eq!(manifest.len(), 2);
    }

    #[test]
    fn json_round_trip_keeps_extras_and_order() {
        let manifest = SoundsManifest::parse(SAMPLE).unwrap();
        let again = SoundsManifest::parse(&manifest.to_json().unwrap()).unwrap();
        assert_eq!(again, manifest);
    }

    #[test]
    fn rejects_non_conforming_documents() {
        assert!(SoundsManifest::parse("[]").is_err());
        assert!(SoundsManifest::parse(r#"{"a": {"no_sounds": []}}"#).is_err());
        assert!(SoundsManifest::parse(r#"{"a": {"sounds": [{"volume": 1}]}}"#).is_err());
        assert!(SoundsManifest::parse(r#"{"a": {"sounds": [{"name": "plain"}]}}"#).is_err());
        assert!(SoundsManifest::parse(r#"{"a": {"sounds": ["ns:x"]}}"#).is_err());
    }

    #[test]
    fn identifier_strips_namespace() {
        assert_eq!(SoundRef::new("environmentalmusic:music_1").identifier(), "music_1");
        assert_eq!(SoundRef::new("bare").identifier(), "bare");
    }
}
