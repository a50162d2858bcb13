use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A locally stored ticket plus its comment thread and, once migrated, the
/// remote issue it was mirrored to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketRecord {
    pub ticket: TicketSource,
    #[serde(default)]
    pub comments: Vec<CommentRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github: Option<RemoteIssue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketSource {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub milestone: Option<String>,
    pub state: String,
    #[serde(default)]
    pub assigned_to: Option<String>,
    pub user_name: String,
    pub created_at: DateTime<FixedOffset>,
    pub link: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentRecord {
    #[serde(default)]
    pub body: String,
    pub user_name: String,
    pub created_at: DateTime<FixedOffset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github: Option<RemoteComment>,
}

/// Remote issue reference; keeps the whole creation response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteIssue {
    pub number: u64,
    #[serde(flatten)]
    pub response: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteComment {
    pub id: u64,
    #[serde(flatten)]
    pub response: Map<String, Value>,
}

impl CommentRecord {
    /// Comments already mirrored, empty, or echoing the ticket description
    /// are never sent.
    pub fn should_skip(&self, ticket_body: &str) -> bool {
        self.github.is_some() || self.body.is_empty() || self.body == ticket_body
    }
}

/// A record as it appears in a load file: the store key plus the record.
#[derive(Debug, Clone, Deserialize)]
pub struct KeyedTicketRecord {
    pub id: String,
    #[serde(flatten)]
    pub record: TicketRecord,
}
