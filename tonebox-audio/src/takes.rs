//! WAV files backing the take list.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tonebox_types::{TakeId, TakeResource};

use crate::CapturedAudio;

/// Writes finished captures as 32-bit float WAV files under one directory.
#[derive(Debug, Clone)]
pub struct TakeStore {
    dir: PathBuf,
}

impl TakeStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist captured audio as a playable file.
    pub fn persist(&self, id: TakeId, audio: &CapturedAudio) -> Result<TakeResource, String> {
        if audio.channels == 0 || audio.sample_rate == 0 {
            return Err("captured audio has no format".to_string());
        }
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| format!("Failed to create {}: {}", self.dir.display(), e))?;

        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let path = self.dir.join(format!("take_{}_{}.wav", stamp, id));

        let spec = hound::WavSpec {
            channels: audio.channels,
            sample_rate: audio.sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };

        let mut writer = hound::WavWriter::create(&path, spec)
            .map_err(|e| format!("Failed to create WAV writer: {}", e))?;

        for &sample in &audio.samples {
            writer
                .write_sample(sample)
                .map_err(|e| format!("Failed to write sample: {}", e))?;
        }

        writer
            .finalize()
            .map_err(|e| format!("Failed to finalize WAV: {}", e))?;

        log::debug!(target: "takes", "wrote {} ({} frames)", path.display(), audio.frames());
        Ok(TakeResource {
            path,
            frames: audio.frames(),
            sample_rate: audio.sample_rate,
            channels: audio.channels,
        })
    }

    /// Remove the file behind a take. A file that is already gone is fine.
    pub fn release(&self, resource: &TakeResource) -> Result<(), String> {
        match std::fs::remove_file(&resource.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(format!("Failed to remove {}: {}", resource.path.display(), e)),
        }
    }
}
