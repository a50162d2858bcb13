use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Metrics {
    api_requests: AtomicU64,
    retries: AtomicU64,
    issues_created: AtomicU64,
    comments_created: AtomicU64,
    milestones_created: AtomicU64,
    labels_created: AtomicU64,
    tickets_skipped: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub api_requests: u64,
    pub retries: u64,
    pub issues_created: u64,
    pub comments_created: u64,
    pub milestones_created: u64,
    pub labels_created: u64,
    pub tickets_skipped: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_api_request(&self) {
        self.api_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_issue_created(&self) {
        self.issues_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_comment_created(&self) {
        self.comments_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_milestone_created(&self) {
        self.milestones_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_label_created(&self) {
        self.labels_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_ticket_skipped(&self) {
        self.tickets_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            api_requests: self.api_requests.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            issues_created: self.issues_created.load(Ordering::Relaxed),
            comments_created: self.comments_created.load(Ordering::Relaxed),
            milestones_created: self.milestones_created.load(Ordering::Relaxed),
            labels_created: self.labels_created.load(Ordering::Relaxed),
            tickets_skipped: self.tickets_skipped.load(Ordering::Relaxed),
        }
    }

    pub fn log_snapshot(&self, project: &str) {
        let s = self.snapshot();
        tracing::info!(
            project,
            api_requests = s.api_requests,
            retries = s.retries,
            issues_created = s.issues_created,
            comments_created = s.comments_created,
            milestones_created = s.milestones_created,
            labels_created = s.labels_created,
            tickets_skipped = s.tickets_skipped,
            "import metrics"
        );
    }
}
