use std::sync::Arc;
use std::thread;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::metrics::Metrics;
use crate::model::{RemoteComment, RemoteIssue};

pub const DEFAULT_BASE_URL: &str = "https://api.github.com";
const PER_PAGE: usize = 100;

/// Payload for a new issue. Optional fields are left out of the request
/// entirely when unset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewIssue {
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub milestone: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IssueUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Milestone {
    pub title: String,
    pub number: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Label {
    pub name: String,
}

/// How reconciliation should treat a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// The named resource already exists remotely.
    Duplicate,
    /// The assignee is not a collaborator on the repository.
    InvalidAssignee,
    Other,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("github request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("github returned HTTP {status}: {body}")]
    Http {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("github {resource} already exists: {body}")]
    AlreadyExists { resource: String, body: String },
    #[error("github rejected the assignee: {body}")]
    InvalidAssignee { body: String },
    #[error("failed to decode github response: {source}; body: {body}")]
    Decode {
        source: serde_json::Error,
        body: String,
    },
    #[error("invalid github base url '{0}'")]
    InvalidBaseUrl(String),
}

impl ApiError {
    pub fn kind(&self) -> ApiErrorKind {
        match self {
            Self::AlreadyExists { .. } => ApiErrorKind::Duplicate,
            Self::InvalidAssignee { .. } => ApiErrorKind::InvalidAssignee,
            _ => ApiErrorKind::Other,
        }
    }
}

/// The remote issue-tracker calls the sync engine relies on.
pub trait IssueTracker {
    fn create_issue(&self, owner: &str, repo: &str, issue: &NewIssue)
        -> Result<RemoteIssue, ApiError>;
    fn update_issue(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        update: &IssueUpdate,
    ) -> Result<RemoteIssue, ApiError>;
    fn list_milestones(&self, owner: &str, repo: &str) -> Result<Vec<Milestone>, ApiError>;
    fn create_milestone(&self, owner: &str, repo: &str, title: &str)
        -> Result<Milestone, ApiError>;
    fn list_labels(&self, owner: &str, repo: &str) -> Result<Vec<Label>, ApiError>;
    fn create_label(&self, owner: &str, repo: &str, name: &str) -> Result<Label, ApiError>;
    fn create_comment(
        &self,
        owner: &str,
        repo: &str,
        issue_number: u64,
        body: &str,
    ) -> Result<RemoteComment, ApiError>;
}

#[derive(Debug, Clone)]
pub struct GithubClient {
    pub base_url: String,
    token: String,
    http: Client,
    max_retries: usize,
    metrics: Arc<Metrics>,
}

impl GithubClient {
    pub fn new(base_url: &str, token: String) -> Result<Self, ApiError> {
        Self::new_with_metrics(base_url, token, Arc::new(Metrics::new()))
    }

    pub fn new_with_metrics(
        base_url: &str,
        token: String,
        metrics: Arc<Metrics>,
    ) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        let http = Client::builder()
            .user_agent(concat!("ticket-migrate/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()?;
        Ok(Self {
            base_url: normalize_base_url(base_url)?,
            token,
            http,
            max_retries: 3,
            metrics,
        })
    }

    fn repo_url(&self, owner: &str, repo: &str, rest: &str) -> String {
        format!("{}/repos/{}/{}/{}", self.base_url, owner, repo, rest)
    }

    /// Sends a request, retrying on rate limits. Server errors are only
    /// retried for `idempotent` calls so a create is never replayed.
    fn request_with_retry<F>(&self, idempotent: bool, mut build: F) -> Result<Response, ApiError>
    where
        F: FnMut() -> RequestBuilder,
    {
        for attempt in 0..=self.max_retries {
            self.metrics.inc_api_request();
            let response = match build().bearer_auth(&self.token).send() {
                Ok(resp) => resp,
                Err(err) => {
                    tracing::warn!(attempt = attempt + 1, error = %err, "github transport error");
                    return Err(ApiError::Request(err));
                }
            };

            let status = response.status();
            if !is_retryable(status, idempotent) || attempt == self.max_retries {
                if !status.is_success() {
                    tracing::debug!(
                        %status,
                        attempts = attempt + 1,
                        "github request completed with failure status"
                    );
                }
                return Ok(response);
            }

            let wait = retry_after_or_backoff(&response, attempt);
            tracing::debug!(%status, attempt = attempt + 1, ?wait, "github retryable status");
            self.metrics.inc_retry();
            thread::sleep(wait);
        }

        unreachable!("retry loop should always return");
    }

    fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(classify_failure(status, body));
        }
        serde_json::from_str(&body).map_err(|source| ApiError::Decode {
            source,
            body: truncate(&body),
        })
    }

    fn list_all<T: DeserializeOwned>(
        &self,
        url: &str,
        extra: &[(&str, &str)],
    ) -> Result<Vec<T>, ApiError> {
        let mut all = Vec::new();
        let mut page: usize = 1;
        loop {
            let response = self.request_with_retry(true, || {
                self.http
                    .get(url)
                    .query(extra)
                    .query(&[("per_page", PER_PAGE), ("page", page)])
            })?;
            let items: Vec<T> = Self::decode(response)?;
            let count = items.len();
            all.extend(items);
            tracing::debug!(url, page, count, "github listing page");
            if count < PER_PAGE {
                break;
            }
            page += 1;
        }
        Ok(all)
    }
}

impl IssueTracker for GithubClient {
    fn create_issue(
        &self,
        owner: &str,
        repo: &str,
        issue: &NewIssue,
    ) -> Result<RemoteIssue, ApiError> {
        let url = self.repo_url(owner, repo, "issues");
        let response = self.request_with_retry(false, || self.http.post(&url).json(issue))?;
        Self::decode(response)
    }

    fn update_issue(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        update: &IssueUpdate,
    ) -> Result<RemoteIssue, ApiError> {
        let url = self.repo_url(owner, repo, &format!("issues/{number}"));
        let response = self.request_with_retry(true, || self.http.patch(&url).json(update))?;
        Self::decode(response)
    }

    fn list_milestones(&self, owner: &str, repo: &str) -> Result<Vec<Milestone>, ApiError> {
        let url = self.repo_url(owner, repo, "milestones");
        self.list_all(&url, &[("state", "all")])
    }

    fn create_milestone(
        &self,
        owner: &str,
        repo: &str,
        title: &str,
    ) -> Result<Milestone, ApiError> {
        let url = self.repo_url(owner, repo, "milestones");
        let payload = serde_json::json!({ "title": title });
        let response = self.request_with_retry(false, || self.http.post(&url).json(&payload))?;
        Self::decode(response)
    }

    fn list_labels(&self, owner: &str, repo: &str) -> Result<Vec<Label>, ApiError> {
        let url = self.repo_url(owner, repo, "labels");
        self.list_all(&url, &[])
    }

    fn create_label(&self, owner: &str, repo: &str, name: &str) -> Result<Label, ApiError> {
        let url = self.repo_url(owner, repo, "labels");
        let payload = serde_json::json!({ "name": name });
        let response = self.request_with_retry(false, || self.http.post(&url).json(&payload))?;
        Self::decode(response)
    }

    fn create_comment(
        &self,
        owner: &str,
        repo: &str,
        issue_number: u64,
        body: &str,
    ) -> Result<RemoteComment, ApiError> {
        let url = self.repo_url(owner, repo, &format!("issues/{issue_number}/comments"));
        let payload = serde_json::json!({ "body": body });
        let response = self.request_with_retry(false, || self.http.post(&url).json(&payload))?;
        Self::decode(response)
    }
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    errors: Vec<ErrorDetail>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    resource: Option<String>,
    #[serde(default)]
    field: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Maps a failed response onto the closed set of conditions the sync engine
/// knows how to recover from.
fn classify_failure(status: reqwest::StatusCode, body: String) -> ApiError {
    if status != reqwest::StatusCode::UNPROCESSABLE_ENTITY {
        return ApiError::Http { status, body };
    }

    let parsed: ErrorBody = serde_json::from_str(&body).unwrap_or_default();

    if let Some(detail) = parsed.errors.iter().find(|detail| {
        detail.code.as_deref() == Some("already_exists")
            || detail
                .message
                .as_deref()
                .is_some_and(|msg| msg.contains("already exists"))
    }) {
        return ApiError::AlreadyExists {
            resource: detail.resource.clone().unwrap_or_default(),
            body,
        };
    }

    if parsed.errors.iter().any(|detail| {
        detail.field.as_deref() == Some("assignee") && detail.code.as_deref() == Some("invalid")
    }) {
        return ApiError::InvalidAssignee { body };
    }

    if parsed
        .message
        .as_deref()
        .is_some_and(|msg| msg.contains("already exists"))
    {
        return ApiError::AlreadyExists {
            resource: String::new(),
            body,
        };
    }

    ApiError::Http { status, body }
}

fn truncate(body: &str) -> String {
    if body.len() > 1000 {
        let mut end = 1000;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    } else {
        body.to_string()
    }
}

fn normalize_base_url(raw: &str) -> Result<String, ApiError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(DEFAULT_BASE_URL.to_string());
    }

    let candidate = if trimmed.starts_with("https://") || trimmed.starts_with("http://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let parsed =
        reqwest::Url::parse(&candidate).map_err(|_| ApiError::InvalidBaseUrl(raw.to_string()))?;
    Ok(parsed.as_str().trim_end_matches('/').to_string())
}

fn is_retryable(status: reqwest::StatusCode, idempotent: bool) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS || (idempotent && status.is_server_error())
}

fn retry_after_or_backoff(response: &Response, attempt: usize) -> Duration {
    if let Some(header) = response.headers().get("Retry-After") {
        if let Ok(value) = header.to_str() {
            if let Ok(seconds) = value.parse::<u64>() {
                return Duration::from_secs(seconds.min(60));
            }
        }
    }

    let seconds = 1_u64 << attempt.min(4);
    Duration::from_secs(seconds)
}
