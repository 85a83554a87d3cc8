use std::path::{Path, PathBuf};

/// A user-supplied audio handle, before resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioRef {
    /// A path on the local filesystem.
    LocalPath(PathBuf),
    /// A full object-store URI. `bucket` is `None` for `s3://name.ext`
    /// forms where the host component is really a filename.
    RemoteUri {
        bucket: Option<String>,
        key: String,
    },
    /// A bare key, resolved against the default bucket.
    BareKey(String),
}

impl AudioRef {
    /// Classify a raw input string.
    ///
    /// A host component containing a dot is interpreted as a filename
    /// rather than a bucket name, matching how consultation recordings are
    /// usually addressed (`s3://consult-42.m4a`).
    pub fn parse(input: &str) -> AudioRef {
        if let Some(rest) = input.strip_prefix("s3://") {
            let (host, path) = match rest.split_once('/') {
                Some((h, p)) => (h, p.trim_start_matches('/')),
                None => (rest, ""),
            };

            if path.is_empty() {
                if host.contains('.') {
                    // s3://filename.ext -> key against the default bucket
                    return AudioRef::RemoteUri {
                        bucket: None,
                        key: host.to_string(),
                    };
                }
                return AudioRef::RemoteUri {
                    bucket: Some(host.to_string()),
                    key: String::new(),
                };
            }

            return AudioRef::RemoteUri {
                bucket: Some(host.to_string()),
                key: path.to_string(),
            };
        }

        if Path::new(input).exists() {
            return AudioRef::LocalPath(PathBuf::from(input));
        }

        AudioRef::BareKey(input.trim_start_matches('/').to_string())
    }

    /// The basename the cached file will carry, when remote.
    pub fn basename(&self) -> Option<&str> {
        let key = match self {
            AudioRef::RemoteUri { key, .. } => key.as_str(),
            AudioRef::BareKey(key) => key.as_str(),
            AudioRef::LocalPath(_) => return None,
        };
        key.rsplit('/').next().filter(|s| !s.is_empty())
    }
}

impl std::fmt::Display for AudioRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioRef::LocalPath(p) => write!(f, "{}", p.display()),
            AudioRef::RemoteUri {
                bucket: Some(b),
                key,
            } => write!(f, "s3://{}/{}", b, key),
            AudioRef::RemoteUri { bucket: None, key } => write!(f, "s3://{}", key),
            AudioRef::BareKey(key) => write!(f, "{}", key),
        }
    }
}

/// A local audio file known to conform to the transcriber's input format:
/// single channel, 16 kHz, signed 16-bit PCM in a WAV container. Produced
/// only by the normalizer.
#[derive(Debug, Clone)]
pub struct NormalizedAudio {
    pub path: PathBuf,
    /// Duration reported by the probe, when known.
    pub duration_secs: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_uri() {
        let r = AudioRef::parse("s3://audio-bucket/consults/visit-1.m4a");
        assert_eq!(
            r,
            AudioRef::RemoteUri {
                bucket: Some("audio-bucket".to_string()),
                key: "consults/visit-1.m4a".to_string(),
            }
        );
        assert_eq!(r.basename(), Some("visit-1.m4a"));
    }

    #[test]
    fn test_parse_host_as_filename() {
        // Host component with a dot is a filename, not a bucket.
        let r = AudioRef::parse("s3://consult-42.m4a");
        assert_eq!(
            r,
            AudioRef::RemoteUri {
                bucket: None,
                key: "consult-42.m4a".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_bare_key() {
        let r = AudioRef::parse("recordings/visit.mp3");
        assert_eq!(r, AudioRef::BareKey("recordings/visit.mp3".to_string()));
        assert_eq!(r.basename(), Some("visit.mp3"));
    }

    #[test]
    fn test_parse_existing_local_path() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("talk.wav");
        std::fs::write(&file, b"riff").unwrap();

        let r = AudioRef::parse(file.to_str().unwrap());
        assert_eq!(r, AudioRef::LocalPath(file));
    }
}
