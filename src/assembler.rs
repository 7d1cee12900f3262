//! The pack assembly run.
//!
//! A run walks `Initializing → ResolvingTemplate → Enumerating → Processing →
//! Persisting → Done`, or ends in `Failed`. Everything inside a run is
//! sequential; the manifest is read once after the template reset, mutated in
//! memory, and written back in full at the end, so a failed run never leaves a
//! half-updated manifest behind.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

use crate::config::Settings;
use crate::convert::{Converter, FfmpegConverter, TargetFormat};
use crate::errors::{PackError, PackResult};
use crate::logging::{FacadeSink, LogSink};
use crate::manifest::SoundsManifest;
use crate::naming::{confine_relative, normalize, sanitize_dir_name};
use crate::processors::silence::SilenceProcessor;
use crate::processors::{ensure_parent, AudioProcessor};
use crate::sources::terraria::{TerrariaDescriptor, ICON_FILE};
use crate::sources::youtube::with_retry;
use crate::sources::{
    Assignment, LocalFiles, PlaylistService, RemotePlaylist, RemoteSlots, SourceEnumerator, SourceRef, TerrariaFolder,
    VideoEntry, YtDlp,
};
use crate::template::{copy_file, TargetPaths, TemplateKind, TemplateResolver};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunPhase {
    Initializing,
    ResolvingTemplate,
    Enumerating,
    Processing { current: usize, total: usize },
    Persisting,
    Done,
    Failed { reason: String },
}

/// Cooperative cancellation, checked between assignments.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> PackResult<()> {
        if self.is_cancelled() {
            Err(PackError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// What to build and where.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BuildSource {
    /// One path per generic template slot; `null` drops the slot.
    Local {
        name: String,
        slots: Vec<Option<PathBuf>>,
        #[serde(default)]
        icon: Option<PathBuf>,
    },
    /// Without `slots` every video becomes its own event.
    Youtube {
        url: String,
        #[serde(default)]
        slots: Option<Vec<Option<usize>>>,
        #[serde(default)]
        template: Option<TemplateKind>,
    },
    Terraria {
        source: PathBuf,
        #[serde(default)]
        strict: Option<bool>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildCommand {
    pub source: BuildSource,
    /// Directory the pack folder is created in, e.g. `.minecraft/resourcepacks`.
    pub target: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub title: String,
    pub pack_dir: PathBuf,
    pub manifest_path: PathBuf,
    pub written: Vec<PathBuf>,
    pub already_present: Vec<PathBuf>,
    pub removed_keys: Vec<String>,
    pub event_count: usize,
    pub elapsed_ms: u64,
}

struct Prepared {
    title: String,
    kind: TemplateKind,
    enumerator: Box<dyn SourceEnumerator>,
    icon: Option<PathBuf>,
}

struct RunContext<'a> {
    sink: &'a dyn LogSink,
    cancel: &'a CancelToken,
    paths: TargetPaths,
    workdir: TempDir,
    used_names: HashSet<String>,
    report: BuildReport,
}

/// Releases the target directory when the run ends.
struct TargetGuard<'a> {
    active: &'a Mutex<HashSet<PathBuf>>,
    path: PathBuf,
}

impl Drop for TargetGuard<'_> {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.path);
    }
}

pub struct PackAssembler {
    settings: Settings,
    resolver: TemplateResolver,
    converter: Arc<dyn Converter>,
    playlists: Arc<dyn PlaylistService>,
    silence: SilenceProcessor,
    sink: Arc<dyn LogSink>,
    active: Mutex<HashSet<PathBuf>>,
}

impl PackAssembler {
    pub fn new(
        settings: Settings,
        converter: Arc<dyn Converter>,
        playlists: Arc<dyn PlaylistService>,
        sink: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            resolver: TemplateResolver::new(&settings.templates_dir, &settings.namespace),
            silence: SilenceProcessor::new(settings.silence.threshold_dbfs),
            settings,
            converter,
            playlists,
            sink,
            active: Mutex::new(HashSet::new()),
        }
    }

    /// Wires up ffmpeg, yt-dlp and the `log` facade from settings.
    pub fn from_settings(settings: Settings) -> Self {
        let converter = Arc::new(FfmpegConverter::new(&settings.ffmpeg));
        let playlists = Arc::new(YtDlp::new(&settings.yt_dlp));
        Self::new(settings, converter, playlists, Arc::new(FacadeSink))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn resolver(&self) -> &TemplateResolver {
        &self.resolver
    }

    pub fn assemble(&self, command: &BuildCommand, cancel: &CancelToken) -> PackResult<BuildReport> {
        self.assemble_with(command, cancel, self.sink.as_ref())
    }

    /// Runs one assembly, reporting to `sink` instead of the default sink.
    pub fn assemble_with(
        &self,
        command: &BuildCommand,
        cancel: &CancelToken,
        sink: &dyn LogSink,
    ) -> PackResult<BuildReport> {
        let started = Instant::now();
        match self.run(command, cancel, sink) {
            Ok(mut report) => {
                report.elapsed_ms = started.elapsed().as_millis() as u64;
                sink.phase(RunPhase::Done);
                sink.log("Music pack creation successful!");
                info!("Built \"{}\" in {} ms", report.title, report.elapsed_ms);
                Ok(report)
            }
            Err(e) => {
                error!("Pack assembly failed: {}", e);
                sink.phase(RunPhase::Failed { reason: e.to_string() });
                sink.log(&format!("Music pack creation failed: {}", e));
                Err(e)
            }
        }
    }

    fn run(&self, command: &BuildCommand, cancel: &CancelToken, sink: &dyn LogSink) -> PackResult<BuildReport> {
        sink.phase(RunPhase::Initializing);
        let prepared = self.prepare(command, cancel, sink)?;
        std::fs::create_dir_all(&command.target).map_err(|e| PackError::io(&command.target, e))?;
        let pack_dir = command.target.join(sanitize_dir_name(&prepared.title));
        let _guard = self.lock_target(&pack_dir)?;

        sink.phase(RunPhase::ResolvingTemplate);
        sink.log("Copying template files...");
        let paths = self.resolver.init_target(&pack_dir, prepared.kind)?;
        if let Some(icon) = prepared.icon.as_deref().filter(|p| p.is_file()) {
            copy_file(icon, &paths.icon_path)?;
        }
        let mut manifest = SoundsManifest::load(&paths.manifest_path)?;

        sink.phase(RunPhase::Enumerating);
        let assignments = prepared.enumerator.enumerate(&manifest, sink)?;

        let workdir = tempfile::tempdir().map_err(|e| PackError::io(std::env::temp_dir(), e))?;
        let mut ctx = RunContext {
            sink,
            cancel,
            report: BuildReport {
                title: prepared.title.clone(),
                pack_dir: paths.root.clone(),
                manifest_path: paths.manifest_path.clone(),
                written: Vec::new(),
                already_present: Vec::new(),
                removed_keys: Vec::new(),
                event_count: 0,
                elapsed_ms: 0,
            },
            paths,
            workdir,
            used_names: HashSet::new(),
        };

        let total = assignments.len();
        for (i, assignment) in assignments.iter().enumerate() {
            cancel.check()?;
            sink.phase(RunPhase::Processing { current: i + 1, total });
            self.process(assignment, &mut manifest, &mut ctx)?;
        }

        sink.phase(RunPhase::Persisting);
        manifest.save(&ctx.paths.manifest_path)?;
        ctx.report.event_count = manifest.len();
        Ok(ctx.report)
    }

    /// Validates the command and resolves the pack title and enumerator.
    fn prepare(&self, command: &BuildCommand, cancel: &CancelToken, sink: &dyn LogSink) -> PackResult<Prepared> {
        match &command.source {
            BuildSource::Local { name, slots, icon } => {
                if name.trim().is_empty() {
                    return Err(PackError::InvalidCommand("pack name is required".to_string()));
                }
                sink.log("Creating music pack from local files...");
                Ok(Prepared {
                    title: name.clone(),
                    kind: TemplateKind::Generic,
                    enumerator: Box::new(LocalFiles::new(slots.clone())),
                    icon: icon.clone(),
                })
            }
            BuildSource::Youtube { url, slots, template } => {
                sink.log("Creating music pack from URL...");
                let listing = with_retry(&self.settings.retry, cancel, sink, "listing the playlist", || {
                    self.playlists.list(url)
                })?;
                let slots = match slots {
                    Some(indices) => RemoteSlots::Indexed(indices.clone()),
                    None => RemoteSlots::Dynamic,
                };
                let source = RemotePlaylist::new(listing, slots);
                Ok(Prepared {
                    title: source.title().to_string(),
                    kind: template.unwrap_or(TemplateKind::Generic),
                    enumerator: Box::new(source),
                    icon: None,
                })
            }
            BuildSource::Terraria { source, strict } => {
                let descriptor = TerrariaDescriptor::load(source)?;
                sink.log(&format!("Creating music pack from Terraria pack \"{}\"...", descriptor.name));
                let strict = strict.unwrap_or(self.settings.terraria.strict);
                Ok(Prepared {
                    title: descriptor.name,
                    kind: TemplateKind::Terraria,
                    enumerator: Box::new(TerrariaFolder::new(source, strict)),
                    icon: Some(source.join(ICON_FILE)),
                })
            }
        }
    }

    /// Locks on the canonical form of `pack_dir`, so `target/./X` and
    /// `target/X` contend for the same entry. The parent must exist.
    fn lock_target(&self, pack_dir: &Path) -> PackResult<TargetGuard<'_>> {
        let key = match (pack_dir.parent(), pack_dir.file_name()) {
            (Some(parent), Some(name)) => parent
                .canonicalize()
                .map_err(|e| PackError::io(parent, e))?
                .join(name),
            _ => pack_dir.to_path_buf(),
        };

        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if !active.insert(key.clone()) {
            return Err(PackError::TargetBusy(pack_dir.to_path_buf()));
        }
        Ok(TargetGuard {
            active: &self.active,
            path: key,
        })
    }

    fn process(&self, assignment: &Assignment, manifest: &mut SoundsManifest, ctx: &mut RunContext<'_>) -> PackResult<()> {
        let key = assignment.key.as_str();
        match &assignment.source {
            SourceRef::Skip => {
                if manifest.remove(key) {
                    ctx.sink.log(&format!("Skipping \"{}\"", key));
                    ctx.report.removed_keys.push(key.to_string());
                }
            }
            SourceRef::Local(path) => {
                let stem = path.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
                let name = unique_name(&mut ctx.used_names, &stem, key);
                let dest = ctx.paths.sounds_dir.join(format!("{}.ogg", name));
                ensure_parent(&dest)?;

                if TargetFormat::Ogg.matches(path) {
                    ctx.sink.log(&format!("Copying \"{}\"...", path.display()));
                    copy_file(path, &dest)?;
                } else {
                    self.transcode(path, &dest, ctx)?;
                }
                ctx.report.written.push(dest);
                manifest.set_sound(key, &self.sound_name(&name));
            }
            SourceRef::Remote(video) => {
                let name = unique_name(&mut ctx.used_names, &video.title, &video.id);
                let event_key = if assignment.key_follows_name { name.as_str() } else { key };
                let dest = ctx.paths.sounds_dir.join(format!("{}.ogg", name));
                ensure_parent(&dest)?;

                if dest.exists() {
                    ctx.sink.log(&format!("\"{}.ogg\" already exists", name));
                    ctx.report.already_present.push(dest);
                } else {
                    let download = self.download(video, ctx)?;
                    self.transcode(&download, &dest, ctx)?;
                    remove_temp(&download);
                    ctx.report.written.push(dest);
                }
                manifest.set_sound(event_key, &self.sound_name(&name));
            }
            SourceRef::Discovered { path, identifier } => {
                if confine_relative(identifier) != *identifier {
                    return Err(PackError::InvalidManifest(format!(
                        "sound \"{}\" points outside the sounds directory",
                        identifier
                    )));
                }
                ctx.used_names.insert(identifier.clone());
                let dest = ctx.paths.sounds_dir.join(format!("{}.ogg", identifier));
                ensure_parent(&dest)?;

                if TargetFormat::Ogg.matches(path) {
                    ctx.sink.log(&format!("Copying \"{}\"...", path.display()));
                    copy_file(path, &dest)?;
                } else {
                    self.transcode(path, &dest, ctx)?;
                }
                ctx.report.written.push(dest);
            }
        }
        Ok(())
    }

    fn sound_name(&self, identifier: &str) -> String {
        format!("{}:{}", self.settings.namespace, identifier)
    }

    fn download(&self, video: &VideoEntry, ctx: &RunContext<'_>) -> PackResult<PathBuf> {
        ctx.sink.log(&format!("Downloading \"{}\"...", video.title));
        let dir = ctx.workdir.path();
        with_retry(&self.settings.retry, ctx.cancel, ctx.sink, "downloading", || {
            self.playlists.download_audio(video, dir)
        })
    }

    /// Converts `source` into an OGG at `dest`, stripping silence on the way
    /// when enabled.
    fn transcode(&self, source: &Path, dest: &Path, ctx: &RunContext<'_>) -> PackResult<()> {
        ctx.sink.log("Converting to OGG...");

        if !self.settings.strip_silence {
            self.converter.convert(source, dest, TargetFormat::Ogg)?;
            ctx.sink.log(&format!("Exported to \"{}\"", dest.display()));
            return Ok(());
        }

        let stem = dest.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
        let decoded = ctx.workdir.path().join(format!("{}.wav", stem));
        let stripped = ctx.workdir.path().join(format!("{}.stripped.wav", stem));

        self.converter.convert(source, &decoded, TargetFormat::Wav)?;
        ctx.sink.log("Stripping silence...");
        self.silence.process(&decoded, &stripped)?;
        self.converter.convert(&stripped, dest, TargetFormat::Ogg)?;

        remove_temp(&decoded);
        remove_temp(&stripped);
        ctx.sink.log(&format!("Exported to \"{}\"", dest.display()));
        Ok(())
    }
}

/// Normalized `raw` confined to the sounds directory, falling back to
/// `fallback` when nothing survives, with `_2`, `_3`, ... appended on
/// collisions within the run.
fn unique_name(used: &mut HashSet<String>, raw: &str, fallback: &str) -> String {
    let mut base = confine_relative(&normalize(raw));
    if base.is_empty() {
        base = confine_relative(&normalize(fallback));
    }
    if base.is_empty() {
        base = "track".to_string();
    }

    let mut candidate = base.clone();
    let mut n = 2;
    while !used.insert(candidate.clone()) {
        candidate = format!("{}_{}", base, n);
        n += 1;
    }
    candidate
}

fn remove_temp(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        warn!("Failed to remove temporary file {}: {}", path.display(), e);
    }
}

/// A run executing on the blocking thread pool.
pub struct BuildTask {
    cancel: CancelToken,
    handle: tokio::task::JoinHandle<PackResult<BuildReport>>,
}

impl BuildTask {
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub async fn wait(self) -> PackResult<BuildReport> {
        self.handle.await.map_err(|e| PackError::Task(e.to_string()))?
    }
}

/// Starts `command` in the background so the caller stays responsive.
/// Must be called from within a tokio runtime.
pub fn spawn_build(assembler: Arc<PackAssembler>, command: BuildCommand, sink: Arc<dyn LogSink>) -> BuildTask {
    let cancel = CancelToken::new();
    let token = cancel.clone();
    let handle = tokio::task::spawn_blocking(move || assembler.assemble_with(&command, &token, sink.as_ref()));
    BuildTask { cancel, handle }
}
