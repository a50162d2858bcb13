use crate::clock::until_next_second;
use crate::error::SyncError;
use crate::model::TicketRecord;
use crate::render::prepare_comment_body;

use super::ProjectRun;

impl ProjectRun<'_> {
    /// Mirrors the comments of an already imported ticket, oldest first.
    ///
    /// The tracker orders comments by a creation timestamp with one-second
    /// resolution, so two creations never share a second. The record is
    /// written once at the end, or before the error is returned if a create
    /// fails partway.
    pub fn sync_comments(
        &mut self,
        ticket_id: &str,
        record: &mut TicketRecord,
    ) -> Result<usize, SyncError> {
        let number = record
            .github
            .as_ref()
            .map(|issue| issue.number)
            .ok_or_else(|| SyncError::MissingRemoteReference {
                ticket_id: ticket_id.to_string(),
            })?;

        let ticket_body = record.ticket.body.clone();
        let mut last_second: Option<i64> = None;
        let mut created = 0;
        let mut failure = None;

        for comment in record.comments.iter_mut() {
            if comment.should_skip(&ticket_body) {
                continue;
            }

            let mut now = self.clock.now();
            if last_second == Some(now.timestamp()) {
                let wait = until_next_second(now);
                tracing::debug!(number, ?wait, "pacing comment creation");
                self.clock.sleep(wait);
                now = self.clock.now();
            }
            last_second = Some(now.timestamp());

            let body =
                prepare_comment_body(comment, &self.cache.config().users, &self.settings.header);
            match self
                .tracker
                .create_comment(&self.account, &self.project, number, &body)
            {
                Ok(remote) => {
                    comment.github = Some(remote);
                    created += 1;
                    self.metrics.inc_comment_created();
                }
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }

        if created > 0 {
            if let Err(write_err) = self.records.write(&self.key, ticket_id, record) {
                let Some(err) = failure else {
                    return Err(write_err.into());
                };
                tracing::error!(
                    number,
                    created,
                    error = %write_err,
                    "failed to record mirrored comments after a create failed"
                );
                return Err(err.into());
            }
            tracing::debug!(number, created, "comments mirrored");
        }

        match failure {
            Some(err) => Err(err.into()),
            None => Ok(created),
        }
    }
}
