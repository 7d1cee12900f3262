use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::errors::ConversionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    Ogg,
    Wav,
}

impl TargetFormat {
    pub fn extension(self) -> &'static str {
        match self {
            TargetFormat::Ogg => "ogg",
            TargetFormat::Wav => "wav",
        }
    }

    fn codec(self) -> &'static str {
        match self {
            TargetFormat::Ogg => "libvorbis",
            TargetFormat::Wav => "pcm_s16le",
        }
    }

    /// True when `path` already carries this format's extension.
    pub fn matches(self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(self.extension()))
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Transcodes one file into another container/codec, overwriting `dest`.
pub trait Converter: Send + Sync {
    fn convert(&self, source: &Path, dest: &Path, format: TargetFormat) -> Result<(), ConversionError>;
}

pub struct FfmpegConverter {
    binary: PathBuf,
}

impl FfmpegConverter {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self { binary: binary.into() }
    }
}

impl Converter for FfmpegConverter {
    fn convert(&self, source: &Path, dest: &Path, format: TargetFormat) -> Result<(), ConversionError> {
        if !source.is_file() {
            return Err(ConversionError::new(source, "source file is not readable"));
        }

        let mut command = Command::new(&self.binary);
        command
            .arg("-y")
            .arg("-loglevel")
            .arg("error")
            .arg("-i")
            .arg(source)
            .arg("-vn")
            .arg("-c:a")
            .arg(format.codec())
            .arg("-f")
            .arg(format.extension())
            .arg(dest)
            .stdin(Stdio::null());

        debug!("Running {:?}", command);

        let output = command.output().map_err(|e| {
            ConversionError::new(source, format!("failed to start {}: {}", self.binary.display(), e))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ConversionError::new(
                source,
                format!("{} exited with {}: {}", self.binary.display(), output.status, stderr.trim()),
            ));
        }

        Ok(())
    }
}
