use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::error::Result;

/// The tiered artifact tree under the output root. Raw and lean artifacts
/// carry a Unix-timestamp suffix so reruns never clobber earlier results.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    transcripts_dir: PathBuf,
    lean_dir: PathBuf,
    translated_dir: PathBuf,
    clinical_dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(output_root: &Path) -> Result<Self> {
        let store = Self {
            transcripts_dir: output_root.join("00_transcripts"),
            lean_dir: output_root.join("01_transcripts_lean"),
            translated_dir: output_root.join("02_translated"),
            clinical_dir: output_root.join("03_clinical_extraction"),
        };
        for dir in [
            &store.transcripts_dir,
            &store.lean_dir,
            &store.translated_dir,
            &store.clinical_dir,
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(store)
    }

    pub fn write_raw<T: Serialize>(&self, stem: &str, value: &T) -> Result<PathBuf> {
        let path = self
            .transcripts_dir
            .join(format!("{}_whisperx_{}.json", stem, unix_ts()));
        write_json(&path, value)?;
        Ok(path)
    }

    pub fn write_lean<T: Serialize>(&self, stem: &str, value: &T) -> Result<PathBuf> {
        let path = self
            .lean_dir
            .join(format!("{}_lean_{}.json", stem, unix_ts()));
        write_json(&path, value)?;
        Ok(path)
    }

    pub fn write_translated<T: Serialize>(&self, stem: &str, value: &T) -> Result<PathBuf> {
        let path = self.translated_dir.join(format!("{}_translated.json", stem));
        write_json(&path, value)?;
        Ok(path)
    }

    pub fn write_clinical<T: Serialize>(&self, stem: &str, value: &T) -> Result<PathBuf> {
        let path = self.clinical_dir.join(format!("{}_clinical.json", stem));
        write_json(&path, value)?;
        Ok(path)
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = std::fs::File::create(path)?;
    serde_json::to_writer_pretty(file, value)?;
    Ok(())
}

fn unix_ts() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// File stem of an audio path, used to derive artifact names.
pub fn audio_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "audio".to_string())
}
