//! Reconciliation of local ticket records with the remote tracker.
//!
//! A project run walks every ticket in the record store, creates the remote
//! issue when the record has no remote reference yet, then mirrors any
//! comments that have not been mirrored. Every remote reference is written
//! back to the store as soon as it exists, so a run that dies halfway can
//! simply be started again.

pub mod comments;
pub mod ticket;

use crate::cache::ReferenceCache;
use crate::clock::Clock;
use crate::config::{ConfigStore, ImportConfig, ProjectConfig};
use crate::error::SyncError;
use crate::github::IssueTracker;
use crate::metrics::Metrics;
use crate::render::HeaderStyle;
use crate::store::RecordStore;

pub use ticket::UpsertOutcome;

#[derive(Debug, Clone)]
pub struct ImportSettings {
    /// Source states that map to a closed remote issue.
    pub closed_states: Vec<String>,
    pub header: HeaderStyle,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            closed_states: vec!["closed".to_string()],
            header: HeaderStyle::default(),
        }
    }
}

impl From<&ImportConfig> for ImportSettings {
    fn from(config: &ImportConfig) -> Self {
        Self {
            closed_states: config.closed_states.clone(),
            header: config.header_style(),
        }
    }
}

impl ImportSettings {
    pub fn is_closed(&self, state: &str) -> bool {
        self.closed_states
            .iter()
            .any(|closed| closed.eq_ignore_ascii_case(state.trim()))
    }
}

/// Collaborators shared by every project run.
#[derive(Clone, Copy)]
pub struct SyncDeps<'a> {
    pub tracker: &'a dyn IssueTracker,
    pub records: &'a dyn RecordStore,
    pub clock: &'a dyn Clock,
    pub settings: &'a ImportSettings,
    pub metrics: &'a Metrics,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectReport {
    pub tickets_seen: usize,
    pub tickets_skipped: usize,
    pub issues_created: usize,
    pub comments_created: usize,
}

pub struct ProjectRun<'a> {
    cache: ReferenceCache<'a>,
    tracker: &'a dyn IssueTracker,
    records: &'a dyn RecordStore,
    clock: &'a dyn Clock,
    settings: &'a ImportSettings,
    metrics: &'a Metrics,
    key: String,
    account: String,
    project: String,
}

impl<'a> ProjectRun<'a> {
    pub fn new(
        config: &'a mut ProjectConfig,
        config_store: &'a mut dyn ConfigStore,
        deps: SyncDeps<'a>,
    ) -> Self {
        let key = config.key.clone();
        let account = config.account.clone();
        let project = config.project.clone();
        Self {
            cache: ReferenceCache::new(config, config_store, deps.metrics),
            tracker: deps.tracker,
            records: deps.records,
            clock: deps.clock,
            settings: deps.settings,
            metrics: deps.metrics,
            key,
            account,
            project,
        }
    }

    /// Imports every ticket of the project. Unreadable records are skipped;
    /// any other failure aborts the run.
    pub fn run(&mut self) -> Result<ProjectReport, SyncError> {
        let mut report = ProjectReport::default();
        tracing::info!(project = %self.key, repo = %format!("{}/{}", self.account, self.project), "importing project");

        for ticket_id in self.records.list(&self.key)? {
            report.tickets_seen += 1;
            let mut record = match self.records.read(&self.key, &ticket_id) {
                Ok(Some(record)) => record,
                Ok(None) => {
                    tracing::warn!(project = %self.key, ticket = %ticket_id, "skipping missing ticket");
                    self.metrics.inc_ticket_skipped();
                    report.tickets_skipped += 1;
                    continue;
                }
                Err(err) => {
                    tracing::warn!(project = %self.key, ticket = %ticket_id, error = %err, "skipping invalid ticket");
                    self.metrics.inc_ticket_skipped();
                    report.tickets_skipped += 1;
                    continue;
                }
            };

            if let UpsertOutcome::Created { .. } = self.upsert_ticket(&ticket_id, &mut record)? {
                report.issues_created += 1;
            }
            report.comments_created += self.sync_comments(&ticket_id, &mut record)?;
        }

        tracing::info!(
            project = %self.key,
            tickets = report.tickets_seen,
            skipped = report.tickets_skipped,
            issues_created = report.issues_created,
            comments_created = report.comments_created,
            "project import finished"
        );
        Ok(report)
    }
}

pub fn import_project<'a>(
    config: &'a mut ProjectConfig,
    config_store: &'a mut dyn ConfigStore,
    deps: SyncDeps<'a>,
) -> Result<ProjectReport, SyncError> {
    ProjectRun::new(config, config_store, deps).run()
}
