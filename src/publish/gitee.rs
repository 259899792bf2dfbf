use std::path::Path;

use reqwest::blocking::multipart;

use crate::domain::{PublishFailure, PublishStep, ReleaseRecord};
use crate::error::{Result, VermanError};
use crate::publish::{http_client, read_asset, step_failure, Publisher, PublisherOptions};

const API_BASE: &str = "https://gitee.com/api/v5";

/// Publishes releases through the Gitee API v5.
///
/// Gitee authenticates with an `access_token` form/query parameter rather
/// than a header, and has no release-by-tag endpoint, so the existing-release
/// probe scans the release list.
pub struct GiteePublisher {
    token: String,
    client: reqwest::blocking::Client,
    api_base: String,
}

impl GiteePublisher {
    pub fn new(token: &str, options: &PublisherOptions) -> Result<Self> {
        Ok(GiteePublisher {
            token: token.to_string(),
            client: http_client(options)?,
            api_base: API_BASE.to_string(),
        })
    }

    fn find_release(
        &self,
        repo: &str,
        tag: &str,
    ) -> std::result::Result<Option<serde_json::Value>, PublishFailure> {
        let url = format!("{}/repos/{}/releases", self.api_base, repo);
        let response = self
            .client
            .get(&url)
            .query(&[("access_token", self.token.as_str())])
            .send()
            .map_err(|e| step_failure(PublishStep::CheckExisting, &e))?;

        if response.status().as_u16() != 200 {
            return Err(PublishFailure {
                step: PublishStep::CheckExisting,
                reason: format!("unexpected status {} from {}", response.status().as_u16(), url),
            });
        }

        let releases: Vec<serde_json::Value> = response
            .json()
            .map_err(|e| step_failure(PublishStep::CheckExisting, &e))?;
        Ok(releases
            .into_iter()
            .find(|r| r.get("tag_name").and_then(|v| v.as_str()) == Some(tag)))
    }

    fn create_release(
        &self,
        repo: &str,
        tag: &str,
        name: &str,
        body: &str,
    ) -> std::result::Result<serde_json::Value, PublishFailure> {
        let url = format!("{}/repos/{}/releases", self.api_base, repo);
        let form = [
            ("access_token", self.token.as_str()),
            ("tag_name", tag),
            ("name", name),
            ("body", body),
            ("target_commitish", "master"),
        ];

        let response = self
            .client
            .post(&url)
            .form(&form)
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
        let url = format!(
            "{}/repos/{}/releases/{}/attach_files",
            self.api_base, repo, release_id
        );
        let (filename, bytes) = read_asset(asset)?;

        let part = multipart::Part::bytes(bytes)
            .file_name(filename)
            .mime_str("application/zip")
            .map_err(|e| step_failure(PublishStep::UploadAsset, &e))?;
        let form = multipart::Form::new()
            .text("access_token", self.token.clone())
            .part("file", part);

        let response = self
            .client
            .post(&url)
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

impl Publisher for GiteePublisher {
    fn platform(&self) -> &str {
        "gitee"
    }

    fn publish(
        &self,
        repo: &str,
        tag: &str,
        name: &str,
        body: &str,
        asset: Option<&Path>,
    ) -> std::result::Result<ReleaseRecord, PublishFailure> {
        if let Some(existing) = self.find_release(repo, tag)? {
            let url = existing
                .get("url")
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            return Err(PublishFailure {
                step: PublishStep::CheckExisting,
                reason: format!("release {} already exists: {}", tag, url),
            });
        }

        let release = self.create_release(repo, tag, name, body)?;
        let id = release.get("id").and_then(|v| v.as_u64());
        let url = format!("https://gitee.com/{}/releases/{}", repo, tag);

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
        let url = format!("{}/repos/{}", self.api_base, repo);
        let response = self
            .client
            .get(&url)
            .query(&[("access_token", self.token.as_str())])
            .send()?;

        match response.status().as_u16() {
            200 => Ok(()),
            401 | 403 => Err(VermanError::config(format!(
                "gitee token cannot access {}",
                repo
            ))),
            404 => Err(VermanError::config(format!(
                "gitee repository {} not found",
                repo
            ))),
            status => Err(VermanError::config(format!(
                "gitee returned status {} for {}",
                status, repo
            ))),
        }
    }
}

pub(crate) fn factory(
    token: &str,
    options: &PublisherOptions,
) -> Result<Option<Box<dyn Publisher>>> {
    Ok(Some(Box::new(GiteePublisher::new(token, options)?)))
}
