//! GitHub-backed work tracker.
//!
//! Issues are work items; milestones map to the optional milestone query.
//! Transient network failures are retried with exponential backoff before
//! surfacing; HTTP 401/403 map to auth errors, everything else non-2xx to
//! remote errors with the server message propagated.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use super::{TrackerError, WorkItem, WorkItemFilter, WorkItemSpec, WorkTracker};

const API_ROOT: &str = "https://api.github.com";
const USER_AGENT: &str = concat!("sow/", env!("CARGO_PKG_VERSION"));

const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(200);

/// A GitHub issue (subset of fields we care about).
#[derive(Debug, Deserialize)]
struct GitHubIssue {
    number: i64,
    title: String,
    body: Option<String>,
    state: String,
    html_url: String,
    milestone: Option<GitHubMilestone>,
    /// Pull requests also come through the issues endpoint; filter them out.
    pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct GitHubMilestone {
    number: i64,
    title: String,
    #[serde(default)]
    description: Option<String>,
    state: String,
    html_url: String,
}

impl From<GitHubIssue> for WorkItem {
    fn from(issue: GitHubIssue) -> Self {
        let parent = issue.milestone.as_ref().map(|m| m.number.to_string());
        WorkItem {
            id: issue.number.to_string(),
            title: issue.title,
            body: issue.body.unwrap_or_default(),
            state: issue.state,
            url: issue.html_url,
            parent,
        }
    }
}

pub struct GitHubTracker {
    client: reqwest::Client,
    repo: String,
    token: Option<String>,
}

impl GitHubTracker {
    pub fn new(repo: &str, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            repo: repo.to_string(),
            token,
        }
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, url)
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", USER_AGENT);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    async fn send_with_retry(
        &self,
        build: impl Fn() -> reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, TrackerError> {
        let mut delay = RETRY_BASE_DELAY;
        let mut last = String::new();
        for attempt in 1..=RETRY_ATTEMPTS {
            match build().send().await {
                Ok(response) => return check_status(response).await,
                Err(e) if e.is_connect() || e.is_timeout() => {
                    tracing::warn!(attempt, error = %e, "transient tracker failure");
                    last = e.to_string();
                    if attempt < RETRY_ATTEMPTS {
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                }
                Err(e) => return Err(TrackerError::Network(e.to_string())),
            }
        }
        Err(TrackerError::Network(last))
    }

    fn issue_url(&self, id: &str) -> String {
        format!("{API_ROOT}/repos/{}/issues/{id}", self.repo)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, TrackerError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    match status.as_u16() {
        401 | 403 => Err(TrackerError::Auth(message)),
        code => Err(TrackerError::Remote {
            status: code,
            message,
        }),
    }
}

async fn decode<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T, TrackerError> {
    response
        .json::<T>()
        .await
        .map_err(|e| TrackerError::Network(format!("malformed tracker response: {e}")))
}

#[async_trait]
impl WorkTracker for GitHubTracker {
    async fn get_work_item(&self, id: &str) -> Result<WorkItem, TrackerError> {
        let url = self.issue_url(id);
        let response = self
            .send_with_retry(|| self.request(reqwest::Method::GET, &url))
            .await
            .map_err(|e| match e {
                TrackerError::Remote { status: 404, .. } => TrackerError::NotFound(id.to_string()),
                other => other,
            })?;
        let issue: GitHubIssue = decode(response).await?;
        Ok(issue.into())
    }

    async fn list_work_items(&self, filter: &WorkItemFilter) -> Result<Vec<WorkItem>, TrackerError> {
        let mut url = format!(
            "{API_ROOT}/repos/{}/issues?state={}",
            self.repo,
            filter.state.as_deref().unwrap_or("open")
        );
        if !filter.labels.is_empty() {
            url.push_str(&format!("&labels={}", filter.labels.join(",")));
        }

        let response = self
            .send_with_retry(|| self.request(reqwest::Method::GET, &url))
            .await?;
        let issues: Vec<GitHubIssue> = decode(response).await?;
        Ok(issues
            .into_iter()
            .filter(|i| i.pull_request.is_none())
            .map(WorkItem::from)
            .collect())
    }

    async fn create_work_item(&self, spec: &WorkItemSpec) -> Result<WorkItem, TrackerError> {
        let url = format!("{API_ROOT}/repos/{}/issues", self.repo);
        let body = serde_json::json!({
            "title": spec.title,
            "body": spec.body,
            "labels": spec.labels,
        });

        let response = self
            .send_with_retry(|| self.request(reqwest::Method::POST, &url).json(&body))
            .await?;
        let issue: GitHubIssue = decode(response).await?;
        Ok(issue.into())
    }

    async fn get_milestone(&self, id: &str) -> Result<Option<WorkItem>, TrackerError> {
        let url = format!("{API_ROOT}/repos/{}/milestones/{id}", self.repo);
        let result = self
            .send_with_retry(|| self.request(reqwest::Method::GET, &url))
            .await;
        let response = match result {
            Ok(r) => r,
            Err(TrackerError::Remote { status: 404, .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        let milestone: GitHubMilestone = decode(response).await?;
        Ok(Some(WorkItem {
            id: milestone.number.to_string(),
            title: milestone.title,
            body: milestone.description.unwrap_or_default(),
            state: milestone.state,
            url: milestone.html_url,
            parent: None,
        }))
    }
}
