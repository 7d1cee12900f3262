use std::path::{Path, PathBuf};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use serde::Serialize;

use crate::errors::{PackError, PackResult};

pub mod silence;

/// Interleaved 16-bit PCM, the shape the converter hands us between steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedAudio {
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl DecodedAudio {
    pub fn new(sample_rate: u32, channels: u16, samples: Vec<i16>) -> Self {
        Self { sample_rate, channels, samples }
    }

    pub fn frame_count(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frame_count() as f64 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn frames(&self) -> std::slice::ChunksExact<'_, i16> {
        self.samples.chunks_exact(self.channels.max(1) as usize)
    }

    /// Reads a WAV file, folding any integer or float sample format into i16.
    pub fn read_wav(path: &Path) -> PackResult<Self> {
        let mut reader = WavReader::open(path)?;
        let spec = reader.spec();

        let samples: Vec<i16> = match (spec.sample_format, spec.bits_per_sample) {
            (SampleFormat::Int, bits) if bits <= 16 => {
                let shift = 16 - bits;
                reader
                    .samples::<i16>()
                    .map(|s| s.map(|v| v << shift))
                    .collect::<Result<_, _>>()?
            }
            (SampleFormat::Int, bits) => {
                let shift = bits - 16;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| (v >> shift) as i16))
                    .collect::<Result<_, _>>()?
            }
            (SampleFormat::Float, _) => reader
                .samples::<f32>()
                .map(|s| s.map(|v| (v.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16))
                .collect::<Result<_, _>>()?,
        };

        Ok(Self::new(spec.sample_rate, spec.channels, samples))
    }

    pub fn write_wav(&self, path: &Path) -> PackResult<()> {
        let spec = WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec)?;
        for &sample in &self.samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct ProcessingResult {
    pub output: PathBuf,
    pub metadata: ProcessingMetadata,
}

#[derive(Debug, Serialize)]
pub struct ProcessingMetadata {
    pub processor_type: String,
    pub input_duration: f64,
    pub output_duration: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub processing_time_ms: u64,
}

/// A file-to-file transform over WAV audio.
pub trait AudioProcessor: Send + Sync {
    fn process(&self, input_path: &Path, output_path: &Path) -> PackResult<ProcessingResult>;
    fn processor_type(&self) -> &'static str;
}

pub(crate) fn ensure_parent(path: &Path) -> PackResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| PackError::io(parent, e))?;
    }
    Ok(())
}
