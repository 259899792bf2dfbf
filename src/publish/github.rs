use std::path::Path;

use serde_json::json;

use crate::domain::{PublishFailure, PublishStep, ReleaseRecord};
use crate::error::{Result, VermanError};
use crate::publish::{http_client, read_asset, step_failure, Publisher, PublisherOptions};

const API_BASE: &str = "https://api.github.com";
const ACCEPT: &str = "application/vnd.github.v3+json";

/// Publishes releases through the GitHub REST API v3.
pub struct GithubPublisher {
    token: String,
    client: reqwest::blocking::Client,
    api_base: String,
}

impl GithubPublisher {
    pub fn new(token: &str, options: &PublisherOptions) -> Result<Self> {
        Ok(GithubPublisher {
            token: token.to_string(),
            client: http_client(options)?,
            api_base: API_BASE.to_string(),
        })
    }

    fn get_release_by_tag(
        &self,
        repo: &str,
        tag: &str,
    ) -> std::result::Result<Option<serde_json::Value>, PublishFailure> {
        let url = format!("{}/repos/{}/releases/tags/{}", self.api_base, repo, tag);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", ACCEPT)
            .send()
            .map_err(|e| step_failure(PublishStep::CheckExisting, &e))?;

        match response.status().as_u16() {
            200 => {
                let release: serde_json::Value = response.json().map_err(|e| {
                    step_failure(PublishStep::CheckExisting, &e)
                })?;
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
        let url = format!("{}/repos/{}/releases", self.api_base, repo);
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
            .header("Accept", ACCEPT)
            .json(&payload)
            .send()
            .map_err(|e| step_failure(PublishStep::CreateRelease, &e))?;

        if response.status().as_u16() != 201 {
            let status = response.status().as_u16();
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
        upload_url: &str,
        asset: &Path,
    ) -> std::result::Result<(), PublishFailure> {
        // The API returns a URI template; everything from '{' on is the
        // template part.
        let upload_url = upload_url.split('{').next().unwrap_or(upload_url);
        let (filename, bytes) = read_asset(asset)?;
        let url = format!("{}?name={}", upload_url, filename);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", ACCEPT)
            .header("Content-Type", "application/zip")
            .body(bytes)
            .send()
            .map_err(|e| step_failure(PublishStep::UploadAsset, &e))?;

        if response.status().as_u16() != 201 {
            let status = response.status().as_u16();
            let text = response.text().unwrap_or_default();
            return Err(PublishFailure {
                step: PublishStep::UploadAsset,
                reason: format!("status {}: {}", status, text),
            });
        }
        Ok(())
    }
}

impl Publisher for GithubPublisher {
    fn platform(&self) -> &str {
        "github"
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
        let html_url = release
            .get("html_url")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let id = release.get("id").and_then(|v| v.as_u64());

        if let Some(asset) = asset {
            let upload_url = release
                .get("upload_url")
                .and_then(|v| v.as_str())
                .ok_or_else(|| PublishFailure {
                    step: PublishStep::UploadAsset,
                    reason: format!("release response has no upload_url ({})", html_url),
                })?;
            self.upload_asset(upload_url, asset)?;
        }

        Ok(ReleaseRecord { url: html_url, id })
    }

    fn validate_config(&self, repo: &str) -> Result<()> {
        let url = format!("{}/repos/{}", self.api_base, repo);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", ACCEPT)
            .send()?;

        match response.status().as_u16() {
            200 => Ok(()),
            401 | 403 => Err(VermanError::config(format!(
                "github token cannot access {}",
                repo
            ))),
            404 => Err(VermanError::config(format!(
                "github repository {} not found",
                repo
            ))),
            status => Err(VermanError::config(format!(
                "github returned status {} for {}",
                status, repo
            ))),
        }
    }
}

pub(crate) fn factory(
    token: &str,
    options: &PublisherOptions,
) -> Result<Option<Box<dyn Publisher>>> {
    Ok(Some(Box::new(GithubPublisher::new(token, options)?)))
}
