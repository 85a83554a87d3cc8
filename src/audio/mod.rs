use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::models::NormalizedAudio;

/// Target format required by the transcriber.
const TARGET_SAMPLE_RATE: u32 = 16_000;
const TARGET_CHANNELS: u32 = 1;

/// Probed properties of the first audio stream in a file.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioInfo {
    pub sample_rate: u32,
    pub channels: u32,
    pub duration_secs: Option<f64>,
    pub codec: String,
}

impl AudioInfo {
    /// Whether a file with these properties already satisfies the
    /// transcriber's input contract.
    pub fn is_conformant(&self, path: &Path) -> bool {
        let is_wav = path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("wav"))
            .unwrap_or(false);
        self.channels == TARGET_CHANNELS && self.sample_rate == TARGET_SAMPLE_RATE && is_wav
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    #[serde(default)]
    sample_rate: Option<String>,
    #[serde(default)]
    channels: Option<u32>,
    #[serde(default)]
    duration: Option<String>,
    #[serde(default)]
    codec_name: Option<String>,
}

/// Converts arbitrary input audio into mono 16 kHz signed 16-bit WAV.
/// Idempotent by basename: conformant inputs pass through untouched and
/// conversions land as siblings in the cache directory.
#[derive(Debug, Clone)]
pub struct AudioNormalizer {
    cache_dir: PathBuf,
}

impl AudioNormalizer {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    /// Verify the external converter exists in the host environment.
    pub async fn check_environment() -> Result<()> {
        for tool in ["ffmpeg", "ffprobe"] {
            let status = Command::new(tool)
                .arg("-version")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await;
            if !matches!(status, Ok(s) if s.success()) {
                return Err(PipelineError::Environment(format!(
                    "{} not found. Install ffmpeg (apt install ffmpeg / brew install ffmpeg)",
                    tool
                )));
            }
        }
        Ok(())
    }

    pub async fn normalize(&self, input: &Path) -> Result<NormalizedAudio> {
        if !input.exists() {
            return Err(PipelineError::AudioNotFound(input.to_path_buf()));
        }

        let info = self.probe(input).await?;
        if info.is_conformant(input) {
            debug!(path = %input.display(), "audio already conformant");
            return Ok(NormalizedAudio {
                path: input.to_path_buf(),
                duration_secs: info.duration_secs,
            });
        }

        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());
        let output = self.cache_dir.join(format!("{}_16k.wav", stem));

        info!(
            input = %input.display(),
            output = %output.display(),
            channels = info.channels,
            sample_rate = info.sample_rate,
            "converting audio to mono 16 kHz wav"
        );

        let result = Command::new("ffmpeg")
            .arg("-i")
            .arg(input)
            .args(["-ac", "1", "-ar", "16000", "-sample_fmt", "s16", "-f", "wav", "-y"])
            .arg(&output)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                PipelineError::Environment(format!("failed to launch ffmpeg: {}", e))
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(PipelineError::Environment(format!(
                "ffmpeg conversion failed: {}",
                stderr.trim()
            )));
        }
        if !output.exists() {
            return Err(PipelineError::Environment(
                "ffmpeg reported success but produced no output".to_string(),
            ));
        }

        let converted = self.probe(&output).await?;
        Ok(NormalizedAudio {
            path: output,
            duration_secs: converted.duration_secs,
        })
    }

    async fn probe(&self, path: &Path) -> Result<AudioInfo> {
        let result = Command::new("ffprobe")
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_streams",
                "-select_streams",
                "a:0",
            ])
            .arg(path)
            .output()
            .await
            .map_err(|e| {
                PipelineError::Environment(format!("failed to launch ffprobe: {}", e))
            })?;

        if !result.status.success() {
            return Err(PipelineError::Environment(format!(
                "ffprobe failed on {}",
                path.display()
            )));
        }

        parse_probe_output(&result.stdout)
    }
}

/// Parse `ffprobe -print_format json -show_streams` output.
pub fn parse_probe_output(stdout: &[u8]) -> Result<AudioInfo> {
    let parsed: FfprobeOutput = serde_json::from_slice(stdout)?;
    let stream = parsed.streams.into_iter().next().ok_or_else(|| {
        PipelineError::Environment("no audio streams found in file".to_string())
    })?;

    Ok(AudioInfo {
        sample_rate: stream
            .sample_rate
            .and_then(|s| s.parse().ok())
            .unwrap_or(0),
        channels: stream.channels.unwrap_or(0),
        duration_secs: stream.duration.and_then(|d| d.parse().ok()),
        codec: stream.codec_name.unwrap_or_else(|| "unknown".to_string()),
    })
}

/// Read a normalized WAV into f32 samples for the ASR engine, plus the raw
/// i16 samples for the diarizer.
pub fn read_wav_samples(path: &Path) -> Result<(Vec<f32>, Vec<i16>, u32)> {
    let mut reader = hound::WavReader::open(path)
        .map_err(|e| PipelineError::Environment(format!("failed to open wav: {}", e)))?;
    let spec = reader.spec();

    let pcm: Vec<i16> = reader
        .samples::<i16>()
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| PipelineError::Environment(format!("failed to decode wav: {}", e)))?;

    let float: Vec<f32> = pcm.iter().map(|&s| s as f32 / 32768.0).collect();
    Ok((float, pcm, spec.sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROBE_JSON: &str = r#"{
        "streams": [{
            "sample_rate": "44100",
            "channels": 2,
            "duration": "12.5",
            "codec_name": "aac"
        }]
    }"#;

    #[test]
    fn test_parse_probe_output() {
        let info = parse_probe_output(PROBE_JSON.as_bytes()).unwrap();
        assert_eq!(info.sample_rate, 44_100);
        assert_eq!(info.channels, 2);
        assert_eq!(info.duration_secs, Some(12.5));
        assert_eq!(info.codec, "aac");
    }

    #[test]
    fn test_parse_probe_output_no_streams() {
        assert!(parse_probe_output(br#"{"streams": []}"#).is_err());
    }

    #[test]
    fn test_conformance_requires_wav_extension() {
        let info = AudioInfo {
            sample_rate: 16_000,
            channels: 1,
            duration_secs: None,
            codec: "pcm_s16le".to_string(),
        };
        assert!(info.is_conformant(Path::new("talk.wav")));
        assert!(!info.is_conformant(Path::new("talk.m4a")));

        let stereo = AudioInfo {
            channels: 2,
            ..info.clone()
        };
        assert!(!stereo.is_conformant(Path::new("talk.wav")));
    }

    #[test]
    fn test_read_wav_samples_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for i in 0..160 {
            writer.write_sample((i * 100) as i16).unwrap();
        }
        writer.finalize().unwrap();

        let (float, pcm, rate) = read_wav_samples(&path).unwrap();
        assert_eq!(rate, 16_000);
        assert_eq!(pcm.len(), 160);
        assert_eq!(float.len(), 160);
        assert!(float.iter().all(|s| (-1.0..=1.0).contains(s)));
    }
}
