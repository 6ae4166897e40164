use super::{HeadCache, RemoteRepository, TreeEntry, is_supported_extension};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

/// `RemoteRepository` backed by a GitHub-shaped REST API. Works against
/// `https://api.github.com` by default, or any API-compatible base URL
/// (e.g. a GitHub Enterprise instance) configured via `AppConfig`.
#[derive(Debug)]
pub struct GitHubRemoteRepository {
    client: Client,
    api_base: String,
    head_cache: HeadCache,
}

impl GitHubRemoteRepository {
    pub fn new(api_base: String, token: Option<String>, request_timeout_ms: u64) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(std::time::Duration::from_millis(request_timeout_ms))
            .user_agent("agentlock-core");

        if let Some(token) = token {
            let mut headers = reqwest::header::HeaderMap::new();
            let mut auth = reqwest::header::HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| Error::Validation(format!("invalid token header: {e}")))?;
            auth.set_sensitive(true);
            headers.insert(reqwest::header::AUTHORIZATION, auth);
            builder = builder.default_headers(headers);
        }

        let client = builder
            .build()
            .map_err(|e| Error::Transient(format!("failed to build http client: {e}")))?;

        Ok(Self {
            client,
            api_base,
            head_cache: HeadCache::new(),
        })
    }

    async fn check_quota(&self, response: &reqwest::Response) -> Option<Error> {
        let status = response.status();
        let remaining = response
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok());
        let reset = response
            .headers()
            .get("x-ratelimit-reset")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok());
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok());

        let is_quota = status == StatusCode::TOO_MANY_REQUESTS
            || (status == StatusCode::FORBIDDEN && remaining == Some(0));

        if is_quota {
            let retry_after_ms = retry_after
                .map(|s| s * 1000)
                .or_else(|| reset.map(|epoch_s| (epoch_s * 1000) - super::now_ms_pub()));
            Some(Error::RemoteQuota { retry_after_ms })
        } else {
            None
        }
    }
}

#[derive(Deserialize)]
struct RefObject {
    object: RefObjectInner,
}

#[derive(Deserialize)]
struct RefObjectInner {
    sha: String,
}

#[derive(Deserialize)]
struct TreeResponse {
    tree: Vec<TreeItem>,
    truncated: bool,
}

#[derive(Deserialize)]
struct TreeItem {
    path: String,
    #[serde(rename = "type")]
    item_type: String,
    sha: String,
    size: Option<u64>,
}

#[async_trait]
impl RemoteRepository for GitHubRemoteRepository {
    async fn get_head(&self, owner: &str, repo: &str, branch: &str) -> Result<String> {
        let url = format!("{}/repos/{owner}/{repo}/git/ref/heads/{branch}", self.api_base);
        let response = self.client.get(&url).send().await?;
        if let Some(err) = self.check_quota(&response).await {
            return Err(err);
        }
        if !response.status().is_success() {
            return Err(Error::Transient(format!(
                "remote returned {} for {url}",
                response.status()
            )));
        }
        let parsed: RefObject = response.json().await?;
        Ok(parsed.object.sha)
    }

    /// `getHeadCached(owner, repo, branch, maxAgeMs)` per §4.3.
    async fn get_head_cached(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        max_age_ms: i64,
    ) -> Result<String> {
        self.head_cache
            .get_or_refresh(owner, repo, branch, max_age_ms, || {
                self.get_head(owner, repo, branch)
            })
            .await
    }

    async fn get_tree_recursive(&self, owner: &str, repo: &str, sha: &str) -> Result<Vec<TreeEntry>> {
        let url = format!(
            "{}/repos/{owner}/{repo}/git/trees/{sha}?recursive=1",
            self.api_base
        );
        let response = self.client.get(&url).send().await?;
        if let Some(err) = self.check_quota(&response).await {
            return Err(err);
        }
        if !response.status().is_success() {
            return Err(Error::Transient(format!(
                "remote returned {} for {url}",
                response.status()
            )));
        }
        let parsed: TreeResponse = response.json().await?;
        if parsed.truncated {
            tracing::warn!(owner, repo, sha, "remote tree response was truncated");
        }
        Ok(parsed
            .tree
            .into_iter()
            .filter(|item| item.item_type == "blob" && is_supported_extension(&item.path))
            .map(|item| TreeEntry {
                path: item.path,
                sha: item.sha,
                size: item.size,
            })
            .collect())
    }

    async fn get_file_content(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        sha: &str,
    ) -> Result<Option<String>> {
        let url = format!("{}/repos/{owner}/{repo}/git/blobs/{sha}", self.api_base);
        let response = self.client.get(&url).send().await?;
        if let Some(err) = self.check_quota(&response).await {
            return Err(err);
        }
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Error::Transient(format!(
                "remote returned {} for {url}",
                response.status()
            )));
        }

        #[derive(Deserialize)]
        struct BlobResponse {
            content: String,
            encoding: String,
        }
        let blob: BlobResponse = response.json().await?;
        if blob.encoding != "base64" {
            tracing::warn!(owner, repo, path, "unexpected blob encoding, skipping");
            return Ok(None);
        }
        let cleaned: String = blob.content.chars().filter(|c| !c.is_whitespace()).collect();
        use base64::Engine;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(cleaned)
            .map_err(|e| Error::corruption(format!("{owner}/{repo}:{path}"), e.to_string()))?;
        match String::from_utf8(bytes) {
            Ok(text) => Ok(Some(text)),
            Err(_) => {
                tracing::debug!(owner, repo, path, "binary file content, skipping");
                Ok(None)
            }
        }
    }
}
