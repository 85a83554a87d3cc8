use std::path::PathBuf;

use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::ProvideErrorMetadata;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, ResolveKind, Result};
use crate::models::AudioRef;

const AUDIO_EXTENSIONS: [&str; 6] = [".mp3", ".wav", ".m4a", ".flac", ".ogg", ".aac"];

/// Resolves audio references to local files, consulting the on-disk cache
/// before touching the object store.
pub struct SourceResolver {
    shared_config: aws_config::SdkConfig,
    client: Client,
    region: String,
    default_bucket: Option<String>,
    cache_dir: PathBuf,
}

impl SourceResolver {
    pub async fn new(config: &PipelineConfig) -> Result<Self> {
        let shared_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .load()
            .await;
        let client = Client::new(&shared_config);

        std::fs::create_dir_all(&config.cache_dir)?;
        info!(
            region = %config.region,
            bucket = config.default_bucket.as_deref().unwrap_or("-"),
            "object store client ready"
        );

        Ok(Self {
            shared_config,
            client,
            region: config.region.clone(),
            default_bucket: config.default_bucket.clone(),
            cache_dir: config.cache_dir.clone(),
        })
    }

    /// Resolve any `AudioRef` to an existing, readable local path.
    pub async fn resolve(&self, audio_ref: &AudioRef) -> Result<PathBuf> {
        if let AudioRef::LocalPath(path) = audio_ref {
            if path.exists() {
                return Ok(path.clone());
            }
            return Err(PipelineError::AudioNotFound(path.clone()));
        }

        let (bucket, key) = resolve_target(self.default_bucket.as_deref(), audio_ref)?;
        let uri = format!("s3://{}/{}", bucket, key);

        let filename = key
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| PipelineError::config(format!("invalid object key in {}", uri)))?;
        let local_path = self.cache_dir.join(filename);
        if local_path.exists() {
            info!(path = %local_path.display(), "using cached audio file");
            return Ok(local_path);
        }

        let client = self.client_for_bucket(&bucket).await;
        self.verify_object(&client, &bucket, &key, &uri).await?;

        info!(%uri, path = %local_path.display(), "downloading audio");
        let object = client
            .get_object()
            .bucket(&bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| {
                warn!(%uri, error = %e, "download failed");
                PipelineError::resolve(&uri, ResolveKind::Other)
            })?;
        let bytes = object
            .body
            .collect()
            .await
            .map_err(|e| {
                warn!(%uri, error = %e, "download stream failed");
                PipelineError::resolve(&uri, ResolveKind::Other)
            })?
            .into_bytes();
        std::fs::write(&local_path, &bytes)?;

        info!(%uri, size = bytes.len(), "download complete");
        Ok(local_path)
    }

    /// List audio objects under a prefix, full URIs.
    pub async fn list_audio_files(&self, prefix: &str, bucket: Option<&str>) -> Result<Vec<String>> {
        let bucket = match bucket.or(self.default_bucket.as_deref()) {
            Some(b) => b.to_string(),
            None => {
                return Err(PipelineError::config(
                    "no bucket specified and no default bucket configured",
                ));
            }
        };

        let mut uris = Vec::new();
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&bucket)
            .prefix(prefix)
            .into_paginator()
            .send();

        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| {
                warn!(bucket = %bucket, error = %e, "listing failed");
                PipelineError::resolve(format!("s3://{}/{}", bucket, prefix), ResolveKind::Other)
            })?;
            for object in page.contents() {
                if let Some(key) = object.key() {
                    if is_audio_key(key) {
                        uris.push(format!("s3://{}/{}", bucket, key));
                    }
                }
            }
        }

        Ok(uris)
    }

    /// A client bound to the object's region. The object's region wins over
    /// the configured one; only this operation's client is re-bound.
    async fn client_for_bucket(&self, bucket: &str) -> Client {
        match self.probe_bucket_region(bucket).await {
            Some(region) if region != self.region => {
                info!(bucket, %region, configured = %self.region, "re-binding to bucket region");
                let conf = aws_sdk_s3::config::Builder::from(&self.shared_config)
                    .region(Region::new(region))
                    .build();
                Client::from_conf(conf)
            }
            _ => self.client.clone(),
        }
    }

    async fn probe_bucket_region(&self, bucket: &str) -> Option<String> {
        match self
            .client
            .get_bucket_location()
            .bucket(bucket)
            .send()
            .await
        {
            Ok(out) => {
                // The classic region reports an empty constraint.
                let constraint = out
                    .location_constraint()
                    .map(|c| c.as_str().to_string())
                    .filter(|c| !c.is_empty())
                    .unwrap_or_else(|| "us-east-1".to_string());
                Some(constraint)
            }
            Err(e) => {
                warn!(bucket, error = %e, "could not determine bucket region");
                None
            }
        }
    }

    async fn verify_object(
        &self,
        client: &Client,
        bucket: &str,
        key: &str,
        uri: &str,
    ) -> Result<()> {
        match client.head_object().bucket(bucket).key(key).send().await {
            Ok(head) => {
                info!(
                    %uri,
                    size = head.content_length().unwrap_or_default(),
                    "object found"
                );
                Ok(())
            }
            Err(err) => {
                let service = err.into_service_error();
                let kind = if service.is_not_found() {
                    ResolveKind::NotFound
                } else {
                    match service.code() {
                        Some("AccessDenied") | Some("Forbidden") => ResolveKind::AccessDenied,
                        Some("NoSuchBucket") => ResolveKind::NoSuchBucket,
                        _ => ResolveKind::Other,
                    }
                };
                Err(PipelineError::resolve(uri, kind))
            }
        }
    }
}

/// Map an AudioRef onto a concrete `(bucket, key)` pair, applying the
/// default bucket to bare keys and host-as-filename URIs.
pub fn resolve_target(
    default_bucket: Option<&str>,
    audio_ref: &AudioRef,
) -> Result<(String, String)> {
    let require_default = |key: &str| -> Result<(String, String)> {
        match default_bucket {
            Some(bucket) => Ok((bucket.to_string(), key.to_string())),
            None => Err(PipelineError::config(
                "no default bucket configured. Set AUDIO_S3_BUCKET or provide a full s3:// URI",
            )),
        }
    };

    match audio_ref {
        AudioRef::LocalPath(path) => Err(PipelineError::config(format!(
            "local path {} cannot be resolved against the object store",
            path.display()
        ))),
        AudioRef::BareKey(key) => require_default(key),
        AudioRef::RemoteUri { bucket: None, key } => require_default(key),
        AudioRef::RemoteUri {
            bucket: Some(bucket),
            key,
        } => {
            if key.is_empty() {
                return Err(PipelineError::config(format!(
                    "s3://{} has no object key",
                    bucket
                )));
            }
            Ok((bucket.clone(), key.clone()))
        }
    }
}

fn is_audio_key(key: &str) -> bool {
    let lower = key.to_lowercase();
    AUDIO_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_target_full_uri() {
        let r = AudioRef::parse("s3://audio-bucket/consults/visit.m4a");
        let (bucket, key) = resolve_target(Some("other"), &r).unwrap();
        assert_eq!(bucket, "audio-bucket");
        assert_eq!(key, "consults/visit.m4a");
    }

    #[test]
    fn test_resolve_target_bare_key_uses_default() {
        let r = AudioRef::parse("visit.m4a");
        let (bucket, key) = resolve_target(Some("audio-bucket"), &r).unwrap();
        assert_eq!(bucket, "audio-bucket");
        assert_eq!(key, "visit.m4a");
    }

    #[test]
    fn test_resolve_target_bare_key_without_default_fails() {
        let r = AudioRef::parse("visit.m4a");
        let err = resolve_target(None, &r).unwrap_err();
        assert!(err.to_string().contains("AUDIO_S3_BUCKET"));
    }

    #[test]
    fn test_resolve_target_host_as_filename() {
        let r = AudioRef::parse("s3://consult-42.m4a");
        let (bucket, key) = resolve_target(Some("audio-bucket"), &r).unwrap();
        assert_eq!(bucket, "audio-bucket");
        assert_eq!(key, "consult-42.m4a");
    }

    #[test]
    fn test_is_audio_key() {
        assert!(is_audio_key("consults/visit.M4A"));
        assert!(is_audio_key("a.wav"));
        assert!(!is_audio_key("notes.txt"));
    }
}
