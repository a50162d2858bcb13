use crate::error::SyncError;
use crate::github::{ApiErrorKind, IssueUpdate, NewIssue};
use crate::model::TicketRecord;
use crate::render::{escape_mentions, prepare_ticket_body};
use crate::tags::derive_tags;

use super::ProjectRun;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    AlreadySynced { number: u64 },
    Created { number: u64 },
}

impl ProjectRun<'_> {
    /// Creates the remote issue for `record` unless it already has one.
    ///
    /// The remote reference is stored before the follow-up state and
    /// assignee updates, so a failure there never leads to a second issue.
    pub fn upsert_ticket(
        &mut self,
        ticket_id: &str,
        record: &mut TicketRecord,
    ) -> Result<UpsertOutcome, SyncError> {
        if let Some(existing) = &record.github {
            return Ok(UpsertOutcome::AlreadySynced {
                number: existing.number,
            });
        }

        let issue = self.build_issue(record)?;
        let remote = self
            .tracker
            .create_issue(&self.account, &self.project, &issue)?;
        let number = remote.number;
        self.metrics.inc_issue_created();
        tracing::info!(
            repo = %format!("{}/{}", self.account, self.project),
            number,
            title = %record.ticket.title,
            "issue created for ticket"
        );

        record.github = Some(remote);
        self.records.write(&self.key, ticket_id, record)?;

        if self.settings.is_closed(&record.ticket.state) {
            let update = IssueUpdate {
                state: Some("closed".to_string()),
                ..IssueUpdate::default()
            };
            self.tracker
                .update_issue(&self.account, &self.project, number, &update)?;
        }

        self.assign(number, record)?;

        Ok(UpsertOutcome::Created { number })
    }

    fn build_issue(&mut self, record: &TicketRecord) -> Result<NewIssue, SyncError> {
        let ticket = &record.ticket;

        let milestone = match ticket
            .milestone
            .as_deref()
            .map(str::trim)
            .filter(|title| !title.is_empty())
        {
            Some(title) => Some(self.cache.resolve_milestone(self.tracker, title)?),
            None => None,
        };

        let tags = derive_tags(ticket.tag.as_deref().unwrap_or_default());
        let labels = self.cache.ensure_labels(self.tracker, &tags)?;

        Ok(NewIssue {
            title: escape_mentions(&ticket.title),
            body: prepare_ticket_body(ticket, &self.cache.config().users, &self.settings.header),
            milestone,
            labels,
        })
    }

    fn assign(&mut self, number: u64, record: &TicketRecord) -> Result<(), SyncError> {
        let Some(local) = record
            .ticket
            .assigned_to
            .as_deref()
            .filter(|user| !user.is_empty())
        else {
            return Ok(());
        };
        let Some(remote) = self.cache.config().users.get(local).cloned() else {
            tracing::debug!(number, user = local, "no remote alias for assignee");
            return Ok(());
        };

        let update = IssueUpdate {
            assignee: Some(remote.clone()),
            ..IssueUpdate::default()
        };
        match self
            .tracker
            .update_issue(&self.account, &self.project, number, &update)
        {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == ApiErrorKind::InvalidAssignee => {
                tracing::warn!(
                    number,
                    user = %remote,
                    "unable to assign issue, user must be a repository collaborator"
                );
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}
