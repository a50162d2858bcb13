use crate::config::ConfigError;
use crate::github::ApiError;
use crate::store::StoreError;

/// Anything that aborts an import run.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The tracker refused to create a milestone because it exists, yet a
    /// fresh listing does not contain it.
    #[error("milestone '{title}' reported as existing in {owner}/{repo} but missing from its milestone listing")]
    MilestoneInconsistent {
        owner: String,
        repo: String,
        title: String,
    },
    #[error("ticket {ticket_id} has no remote issue to attach comments to")]
    MissingRemoteReference { ticket_id: String },
}
