use std::fmt;
use std::path::{Path, PathBuf};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::errors::{PackError, PackResult};
use crate::manifest::SoundsManifest;

pub const PACK_METADATA_FILE: &str = "pack.mcmeta";
pub const PACK_ICON_FILE: &str = "pack.png";
pub const MANIFEST_FILE: &str = "sounds.json";

/// Which bundled template a pack starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateKind {
    Generic,
    Terraria,
}

impl TemplateKind {
    pub fn dir_name(self) -> &'static str {
        match self {
            TemplateKind::Generic => "generic",
            TemplateKind::Terraria => "terraria",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "generic" => Some(TemplateKind::Generic),
            "terraria" => Some(TemplateKind::Terraria),
            _ => None,
        }
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Paths inside a freshly initialized target pack.
#[derive(Debug, Clone)]
pub struct TargetPaths {
    pub root: PathBuf,
    pub sounds_dir: PathBuf,
    pub manifest_path: PathBuf,
    pub metadata_path: PathBuf,
    pub icon_path: PathBuf,
}

impl TargetPaths {
    pub fn new(root: &Path, namespace: &str) -> Self {
        let assets = root.join("assets").join(namespace);
        Self {
            root: root.to_path_buf(),
            sounds_dir: assets.join("sounds"),
            manifest_path: assets.join(MANIFEST_FILE),
            metadata_path: root.join(PACK_METADATA_FILE),
            icon_path: root.join(PACK_ICON_FILE),
        }
    }
}

pub struct TemplateResolver {
    templates_dir: PathBuf,
    namespace: String,
}

impl TemplateResolver {
    pub fn new(templates_dir: impl Into<PathBuf>, namespace: impl Into<String>) -> Self {
        Self {
            templates_dir: templates_dir.into(),
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn template_paths(&self, kind: TemplateKind) -> TargetPaths {
        TargetPaths::new(&self.templates_dir.join(kind.dir_name()), &self.namespace)
    }

    /// Loads and validates the bundled manifest for `kind`.
    pub fn load_template(&self, kind: TemplateKind) -> PackResult<SoundsManifest> {
        SoundsManifest::load(&self.template_paths(kind).manifest_path)
    }

    /// Creates the pack skeleton under `target_dir` and resets its metadata
    /// and manifest to the pristine template. Existing sound files are kept.
    pub fn init_target(&self, target_dir: &Path, kind: TemplateKind) -> PackResult<TargetPaths> {
        let template = self.template_paths(kind);
        let target = TargetPaths::new(target_dir, &self.namespace);

        // Refuse a broken template before touching the target.
        self.load_template(kind)?;
        if !template.metadata_path.is_file() {
            return Err(PackError::Config(format!(
                "template {} is missing {}",
                kind,
                template.metadata_path.display()
            )));
        }

        std::fs::create_dir_all(&target.sounds_dir).map_err(|e| PackError::io(&target.sounds_dir, e))?;

        copy_file(&template.metadata_path, &target.metadata_path)?;
        copy_file(&template.manifest_path, &target.manifest_path)?;
        if template.icon_path.is_file() {
            copy_file(&template.icon_path, &target.icon_path)?;
        }

        info!("Initialized {} pack at {}", kind, target.root.display());
        Ok(target)
    }
}

pub(crate) fn copy_file(from: &Path, to: &Path) -> PackResult<()> {
    debug!("Copying {} -> {}", from.display(), to.display());
    std::fs::copy(from, to).map_err(|e| PackError::io(from, e))?;
    Ok(())
}
