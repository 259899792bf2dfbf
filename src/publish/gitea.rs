use std::path::Path;

use reqwest::blocking::multipart;
use serde_json::json;

use crate::domain::{PublishFailure, PublishStep, ReleaseRecord};
use crate::error::{Result, VermanError};
use crate::publish::{http_client, read_asset, step_failure, Publisher, PublisherOptions};

/// Publishes releases to a self-hosted Gitea instance.
///
/// Unlike the hosted platforms, Gitea needs a base URL; the factory returns
/// `None` when it is not configured.
pub struct GiteaPublisher {
    token: String,
    client: reqwest::blocking::Client,
    base_url: String,
}

impl GiteaPublisher {
    pub fn new(token: &str, base_url: &str, options: &PublisherOptions) -> Result<Self> {
        Ok(GiteaPublisher {
            token: token.to_string(),
            client: http_client(options)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn api(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    fn get_release_by_tag(
        &self,
        repo: &str,
        tag: &str,
    ) -> std::result::Result<Option<serde_json::Value>, PublishFailure> {
        let url = self.api(&format!("/repos/{}/releases/tags/{}", repo, tag));
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("token {}", self.token))
            .send()
            .map_err(|e| step_failure(PublishStep::CheckExisting, &e))?;

        match response.status().as_u16() {
            200 => {
                let release = response
                    .json()
                    .map_err(|e| step_failure(PublishStep::CheckExisting, &e))?;
                Ok(Some(release))
            }
            404 => Ok(None),
            status => Err(PublishFailure {
                step: PublishStep::CheckExisting,
                reason: format!("unexpected status {} from {}", status, url),
            }),
        }
    }

    fn create_release(
        &self,
        repo: &str,
        tag: &str,
        name: &str,
        body: &str,
    ) -> std::result::Result<serde_json::Value, PublishFailure> {
        let url = self.api(&format!("/repos/{}/releases", repo));
        let payload = json!({
            "tag_name": tag,
            "name": name,
            "body": body,
            "draft": false,
            "prerelease": false,
        });

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("token {}", self.token))
            .json(&payload)
            .send()
            .map_err(|e| step_failure(PublishStep::CreateRelease, &e))?;

        let status = response.status().as_u16();
        if status != 200 && status != 201 {
            let text = response.text().unwrap_or_default();
            return Err(PublishFailure {
                step: PublishStep::CreateRelease,
                reason: format!("status {}: {}", status, text),
            });
        }

        response
            .json()
            .map_err(|e| step_failure(PublishStep::CreateRelease, &e))
    }

    fn upload_asset(
        &self,
        repo: &str,
        release_id: u64,
        asset: &Path,
    ) -> std::result::Result<(), PublishFailure> {
        let url = self.api(&format!("/repos/{}/releases/{}/assets", repo, release_id));
        let (filename, bytes) = read_asset(asset)?;

        let part = multipart::Part::bytes(bytes)
            .file_name(filename.clone())
            .mime_str("application/zip")
            .map_err(|e| step_failure(PublishStep::UploadAsset, &e))?;
        let form = multipart::Form::new().part("attachment", part);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("token {}", self.token))
            .query(&[("name", filename.as_str())])
            .multipart(form)
            .send()
            .map_err(|e| step_failure(PublishStep::UploadAsset, &e))?;

        let status = response.status().as_u16();
        if status != 200 && status != 201 {
            let text = response.text().unwrap_or_default();
            return Err(PublishFailure {
                step: PublishStep::UploadAsset,
                reason: format!("status {}: {}", status, text),
            });
        }
        Ok(())
    }
}

impl Publisher for GiteaPublisher {
    fn platform(&self) -> &str {
        "gitea"
    }

    fn publish(
        &self,
        repo: &str,
        tag: &str,
        name: &str,
        body: &str,
        asset: Option<&Path>,
    ) -> std::result::Result<ReleaseRecord, PublishFailure> {
        if let Some(existing) = self.get_release_by_tag(repo, tag)? {
            let url = existing
                .get("html_url")
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            return Err(PublishFailure {
                step: PublishStep::CheckExisting,
                reason: format!("release {} already exists: {}", tag, url),
            });
        }

        let release = self.create_release(repo, tag, name, body)?;
        let id = release.get("id").and_then(|v| v.as_u64());
        let url = release
            .get("html_url")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("{}/{}/releases/tag/{}", self.base_url, repo, tag));

        if let Some(asset) = asset {
            let release_id = id.ok_or_else(|| PublishFailure {
                step: PublishStep::UploadAsset,
                reason: "release response has no id".to_string(),
            })?;
            self.upload_asset(repo, release_id, asset)?;
        }

        Ok(ReleaseRecord { url, id })
    }

    fn validate_config(&self, repo: &str) -> Result<()> {
        let url = self.api(&format!("/repos/{}", repo));
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("token {}", self.token))
            .send()?;

        match response.status().as_u16() {
            200 => Ok(()),
            401 | 403 => Err(VermanError::config(format!(
                "gitea token cannot access {}",
                repo
            ))),
            404 => Err(VermanError::config(format!(
                "gitea repository {} not found",
                repo
            ))),
            status => Err(VermanError::config(format!(
                "gitea returned status {} for {}",
                status, repo
            ))),
        }
    }
}

pub(crate) fn factory(
    token: &str,
    options: &PublisherOptions,
) -> Result<Option<Box<dyn Publisher>>> {
    match options.base_url.as_deref() {
        Some(base_url) if !base_url.is_empty() => Ok(Some(Box::new(GiteaPublisher::new(
            token, base_url, options,
        )?))),
        _ => Ok(None),
    }
}
