#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use hound::{SampleFormat, WavSpec, WavWriter};

use music_pack_service::convert::{Converter, TargetFormat};
use music_pack_service::errors::ConversionError;
use music_pack_service::logging::MemorySink;
use music_pack_service::sources::youtube::FetchError;
use music_pack_service::sources::{PlaylistListing, PlaylistService, VideoEntry};
use music_pack_service::{PackAssembler, Settings};

pub const NAMESPACE: &str = "environmentalmusic";

/// Stands in for ffmpeg: copies bytes, so WAV fixtures stay decodable under
/// any extension.
#[derive(Default)]
pub struct CopyConverter {
    pub calls: Mutex<Vec<(PathBuf, PathBuf, TargetFormat)>>,
    pub fail_on: Option<String>,
}

impl CopyConverter {
    pub fn failing_on(name: &str) -> Self {
        Self {
            fail_on: Some(name.to_string()),
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn sources(&self) -> Vec<PathBuf> {
        self.calls.lock().unwrap().iter().map(|(s, _, _)| s.clone()).collect()
    }
}

impl Converter for CopyConverter {
    fn convert(&self, source: &Path, dest: &Path, format: TargetFormat) -> Result<(), ConversionError> {
        self.calls
            .lock()
            .unwrap()
            .push((source.to_path_buf(), dest.to_path_buf(), format));

        if let Some(name) = &self.fail_on {
            if source.to_string_lossy().contains(name.as_str()) {
                return Err(ConversionError::new(source, "unsupported codec"));
            }
        }
        std::fs::copy(source, dest)
            .map(|_| ())
            .map_err(|e| ConversionError::new(source, e.to_string()))
    }
}

/// A canned playlist whose downloads are WAV files.
pub struct FakePlaylist {
    pub listing: PlaylistListing,
    pub downloads: Mutex<Vec<String>>,
    /// Transient failures to report before each download succeeds.
    pub flaky_downloads: Mutex<u32>,
}

impl FakePlaylist {
    pub fn new(title: &str, video_titles: &[&str]) -> Self {
        let videos = video_titles
            .iter()
            .enumerate()
            .map(|(i, t)| VideoEntry {
                id: format!("vid{}", i),
                title: t.to_string(),
                url: format!("https://www.youtube.com/watch?v=vid{}", i),
            })
            .collect();
        Self {
            listing: PlaylistListing {
                title: title.to_string(),
                videos,
            },
            downloads: Mutex::new(Vec::new()),
            flaky_downloads: Mutex::new(0),
        }
    }

    pub fn downloaded(&self) -> Vec<String> {
        self.downloads.lock().unwrap().clone()
    }
}

impl PlaylistService for FakePlaylist {
    fn list(&self, _reference: &str) -> Result<PlaylistListing, FetchError> {
        Ok(self.listing.clone())
    }

    fn download_audio(&self, video: &VideoEntry, dir: &Path) -> Result<PathBuf, FetchError> {
        {
            let mut flaky = self.flaky_downloads.lock().unwrap();
            if *flaky > 0 {
                *flaky -= 1;
                return Err(FetchError::Transient("Connection reset by peer".to_string()));
            }
        }
        self.downloads.lock().unwrap().push(video.title.clone());
        let path = dir.join(format!("{}.webm", video.id));
        write_wav(&path, &padded_tone());
        Ok(path)
    }
}

/// Half a second of silence, a short tone, half a second of silence.
pub fn padded_tone() -> Vec<i16> {
    let mut samples = vec![0i16; 4_000];
    samples.extend((0..800).map(|i| if i % 2 == 0 { 9_000 } else { -9_000 }));
    samples.extend(vec![0i16; 4_000]);
    samples
}

pub fn write_wav(path: &Path, samples: &[i16]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let spec = WavSpec {
        channels: 1,
        sample_rate: 8_000,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec).unwrap();
    for &s in samples {
        writer.write_sample(s).unwrap();
    }
    writer.finalize().unwrap();
}

pub const GENERIC_KEYS: [&str; 4] = ["overworld_day", "overworld_night", "underground", "boss"];
pub const TERRARIA_TRACKS: [(&str, &str); 4] = [
    ("overworld_day", "music_1"),
    ("overworld_night", "music_3"),
    ("underground", "music_4"),
    ("boss", "music_5"),
];

fn manifest_json(entries: &[(&str, &str)]) -> String {
    let body: Vec<String> = entries
        .iter()
        .map(|(key, id)| {
            format!(
                r#""{}": {{"sounds": [{{"name": "{}:{}", "stream": true}}]}}"#,
                key, NAMESPACE, id
            )
        })
        .collect();
    format!("{{{}}}", body.join(","))
}

/// Writes generic and Terraria templates with four slots each.
pub fn write_templates(root: &Path) {
    let generic: Vec<(&str, &str)> = GENERIC_KEYS.iter().map(|k| (*k, *k)).collect();
    for (kind, manifest) in [("generic", manifest_json(&generic)), ("terraria", manifest_json(&TERRARIA_TRACKS))] {
        let dir = root.join(kind);
        let assets = dir.join("assets").join(NAMESPACE);
        std::fs::create_dir_all(&assets).unwrap();
        std::fs::write(dir.join("pack.mcmeta"), format!(r#"{{"pack":{{"pack_format":15,"description":"{}"}}}}"#, kind)).unwrap();
        std::fs::write(assets.join("sounds.json"), manifest).unwrap();
    }
}

pub fn test_settings(templates: &Path) -> Settings {
    let mut settings = Settings::default();
    settings.templates_dir = templates.to_path_buf();
    settings.retry.initial_delay_ms = 0;
    settings.retry.max_delay_ms = 0;
    settings
}

pub struct Harness {
    pub templates: tempfile::TempDir,
    pub target: tempfile::TempDir,
    pub converter: Arc<CopyConverter>,
    pub playlist: Arc<FakePlaylist>,
    pub sink: Arc<MemorySink>,
    pub assembler: PackAssembler,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(CopyConverter::default(), FakePlaylist::new("Test Mix", &[]), |_| {})
    }

    pub fn with(converter: CopyConverter, playlist: FakePlaylist, tweak: impl FnOnce(&mut Settings)) -> Self {
        let templates = tempfile::tempdir().unwrap();
        write_templates(templates.path());
        let mut settings = test_settings(templates.path());
        tweak(&mut settings);

        let converter = Arc::new(converter);
        let playlist = Arc::new(playlist);
        let sink = Arc::new(MemorySink::new());
        let assembler = PackAssembler::new(settings, converter.clone(), playlist.clone(), sink.clone());

        Self {
            templates,
            target: tempfile::tempdir().unwrap(),
            converter,
            playlist,
            sink,
            assembler,
        }
    }

    pub fn sounds_dir(&self, pack: &str) -> PathBuf {
        self.target.path().join(pack).join("assets").join(NAMESPACE).join("sounds")
    }

    pub fn manifest_path(&self, pack: &str) -> PathBuf {
        self.target.path().join(pack).join("assets").join(NAMESPACE).join("sounds.json")
    }
}

pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}
