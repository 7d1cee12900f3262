use std::path::Path;
use std::time::Instant;
use log::info;

use crate::errors::PackResult;
use super::{ensure_parent, AudioProcessor, DecodedAudio, ProcessingMetadata, ProcessingResult};

/// Strips near-silence from the head and tail of a track.
///
/// A frame is silent when every channel stays below the threshold amplitude.
/// Detection works on single frames rather than fixed-size chunks, so the
/// trimmed buffer always starts and ends on a loud frame and a second pass is
/// a no-op.
pub struct SilenceProcessor {
    threshold: f64,
}

impl SilenceProcessor {
    pub fn new(threshold_dbfs: f64) -> Self {
        Self {
            threshold: Self::threshold_amplitude(threshold_dbfs),
        }
    }

    /// Converts a dBFS level to a linear i16 amplitude.
    fn threshold_amplitude(dbfs: f64) -> f64 {
        10f64.powf(dbfs / 20.0) * i16::MAX as f64
    }

    fn is_silent(&self, frame: &[i16]) -> bool {
        frame.iter().all(|&s| (s as f64).abs() < self.threshold)
    }

    fn leading_silent_frames<'a>(&self, frames: impl Iterator<Item = &'a [i16]>) -> usize {
        frames.take_while(|frame| self.is_silent(frame)).count()
    }

    pub fn strip_leading(&self, audio: &DecodedAudio) -> DecodedAudio {
        let skip = self.leading_silent_frames(audio.frames());
        let start = skip * audio.channels.max(1) as usize;
        DecodedAudio::new(audio.sample_rate, audio.channels, audio.samples[start..].to_vec())
    }

    /// Reverse, strip the head, reverse back.
    pub fn strip_trailing(&self, audio: &DecodedAudio) -> DecodedAudio {
        let skip = self.leading_silent_frames(audio.frames().rev());
        let channels = audio.channels.max(1) as usize;
        // A partial frame at the end is not a frame; it goes with the silence.
        let end = (audio.frame_count() - skip) * channels;
        DecodedAudio::new(audio.sample_rate, audio.channels, audio.samples[..end].to_vec())
    }

    /// An all-silent buffer comes back empty.
    pub fn strip_silence(&self, audio: &DecodedAudio) -> DecodedAudio {
        self.strip_trailing(&self.strip_leading(audio))
    }
}

impl AudioProcessor for SilenceProcessor {
    fn process(&self, input_path: &Path, output_path: &Path) -> PackResult<ProcessingResult> {
        let start_time = Instant::now();

        let audio = DecodedAudio::read_wav(input_path)?;
        let stripped = self.strip_silence(&audio);

        info!(
            "Stripped {:.2}s of silence from {}",
            audio.duration_secs() - stripped.duration_secs(),
            input_path.display()
        );

        ensure_parent(output_path)?;
        stripped.write_wav(output_path)?;

        Ok(ProcessingResult {
            output: output_path.to_path_buf(),
            metadata: ProcessingMetadata {
                processor_type: self.processor_type().to_string(),
                input_duration: audio.duration_secs(),
                output_duration: stripped.duration_secs(),
                sample_rate: audio.sample_rate,
                channels: audio.channels,
                processing_time_ms: start_time.elapsed().as_millis() as u64,
            },
        })
    }

    fn processor_type(&self) -> &'static str {
        "strip_silence"
    }
}
