//! In-memory stand-ins for the tracker, stores and clock.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Map, Value};

use crate::clock::Clock;
use crate::config::{ConfigError, ConfigStore, ProjectConfig};
use crate::github::{ApiError, IssueTracker, IssueUpdate, Label, Milestone, NewIssue};
use crate::model::{RemoteComment, RemoteIssue, TicketRecord};
use crate::store::{RecordStore, StoreError};

#[derive(Debug, Default)]
struct TrackerState {
    issues: Vec<NewIssue>,
    updates: Vec<(u64, IssueUpdate)>,
    milestones: Vec<Milestone>,
    labels: Vec<String>,
    comments: Vec<(u64, String)>,
    calls: Vec<&'static str>,
    failures: HashMap<&'static str, VecDeque<Option<ApiError>>>,
}

/// Remote tracker that keeps its state across runs and detects duplicate
/// milestone and label names the way the real one does.
#[derive(Debug, Default)]
pub struct FakeTracker {
    state: RefCell<TrackerState>,
}

fn as_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

impl FakeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unauthorized() -> ApiError {
        ApiError::Http {
            status: reqwest::StatusCode::UNAUTHORIZED,
            body: r#"{"message":"Bad credentials"}"#.to_string(),
        }
    }

    pub fn seed_milestone(&self, title: &str, number: u64) {
        self.state.borrow_mut().milestones.push(Milestone {
            title: title.to_string(),
            number,
        });
    }

    pub fn seed_label(&self, name: &str) {
        self.state.borrow_mut().labels.push(name.to_string());
    }

    /// Makes the next call to `call` fail with `err`.
    pub fn fail_next(&self, call: &'static str, err: ApiError) {
        self.state
            .borrow_mut()
            .failures
            .entry(call)
            .or_default()
            .push_back(Some(err));
    }

    /// Lets the next call to `call` through; pairs with `fail_next` to fail
    /// a later call.
    pub fn pass_next(&self, call: &'static str) {
        self.state
            .borrow_mut()
            .failures
            .entry(call)
            .or_default()
            .push_back(None);
    }

    pub fn calls(&self, call: &str) -> usize {
        self.state
            .borrow()
            .calls
            .iter()
            .filter(|name| **name == call)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.state.borrow().calls.len()
    }

    pub fn issues(&self) -> Vec<NewIssue> {
        self.state.borrow().issues.clone()
    }

    pub fn updates(&self) -> Vec<(u64, IssueUpdate)> {
        self.state.borrow().updates.clone()
    }

    pub fn comments(&self) -> Vec<(u64, String)> {
        self.state.borrow().comments.clone()
    }

    pub fn milestone_titles(&self) -> Vec<String> {
        self.state
            .borrow()
            .milestones
            .iter()
            .map(|m| m.title.clone())
            .collect()
    }

    pub fn label_names(&self) -> Vec<String> {
        self.state.borrow().labels.clone()
    }

    fn enter(&self, call: &'static str) -> Result<(), ApiError> {
        let mut state = self.state.borrow_mut();
        state.calls.push(call);
        match state.failures.get_mut(call).and_then(VecDeque::pop_front) {
            Some(Some(err)) => Err(err),
            _ => Ok(()),
        }
    }
}

impl IssueTracker for FakeTracker {
    fn create_issue(
        &self,
        _owner: &str,
        _repo: &str,
        issue: &NewIssue,
    ) -> Result<RemoteIssue, ApiError> {
        self.enter("create_issue")?;
        let mut state = self.state.borrow_mut();
        state.issues.push(issue.clone());
        let number = state.issues.len() as u64;
        Ok(RemoteIssue {
            number,
            response: as_map(json!({ "title": issue.title, "state": "open" })),
        })
    }

    fn update_issue(
        &self,
        _owner: &str,
        _repo: &str,
        number: u64,
        update: &IssueUpdate,
    ) -> Result<RemoteIssue, ApiError> {
        self.enter("update_issue")?;
        self.state
            .borrow_mut()
            .updates
            .push((number, update.clone()));
        Ok(RemoteIssue {
            number,
            response: Map::new(),
        })
    }

    fn list_milestones(&self, _owner: &str, _repo: &str) -> Result<Vec<Milestone>, ApiError> {
        self.enter("list_milestones")?;
        Ok(self.state.borrow().milestones.clone())
    }

    fn create_milestone(
        &self,
        _owner: &str,
        _repo: &str,
        title: &str,
    ) -> Result<Milestone, ApiError> {
        self.enter("create_milestone")?;
        let mut state = self.state.borrow_mut();
        if state.milestones.iter().any(|m| m.title == title) {
            return Err(ApiError::AlreadyExists {
                resource: "Milestone".to_string(),
                body: String::new(),
            });
        }
        let number = state.milestones.iter().map(|m| m.number).max().unwrap_or(0) + 1;
        let milestone = Milestone {
            title: title.to_string(),
            number,
        };
        state.milestones.push(milestone.clone());
        Ok(milestone)
    }

    fn list_labels(&self, _owner: &str, _repo: &str) -> Result<Vec<Label>, ApiError> {
        self.enter("list_labels")?;
        Ok(self
            .state
            .borrow()
            .labels
            .iter()
            .map(|name| Label { name: name.clone() })
            .collect())
    }

    fn create_label(&self, _owner: &str, _repo: &str, name: &str) -> Result<Label, ApiError> {
        self.enter("create_label")?;
        let mut state = self.state.borrow_mut();
        if state.labels.iter().any(|label| label == name) {
            return Err(ApiError::AlreadyExists {
                resource: "Label".to_string(),
                body: String::new(),
            });
        }
        state.labels.push(name.to_string());
        Ok(Label {
            name: name.to_string(),
        })
    }

    fn create_comment(
        &self,
        _owner: &str,
        _repo: &str,
        issue_number: u64,
        body: &str,
    ) -> Result<RemoteComment, ApiError> {
        self.enter("create_comment")?;
        let mut state = self.state.borrow_mut();
        state.comments.push((issue_number, body.to_string()));
        Ok(RemoteComment {
            id: 1000 + state.comments.len() as u64,
            response: Map::new(),
        })
    }
}

#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    pub persisted: Vec<ProjectConfig>,
}

impl ConfigStore for MemoryConfigStore {
    fn persist(&mut self, project: &ProjectConfig) -> Result<(), ConfigError> {
        self.persisted.push(project.clone());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: RefCell<BTreeMap<(String, String), TicketRecord>>,
    corrupt: RefCell<Vec<(String, String)>>,
    writes: Cell<usize>,
    fail_writes: Cell<bool>,
}

impl MemoryRecordStore {
    pub fn insert(&self, project: &str, ticket_id: &str, record: TicketRecord) {
        self.records
            .borrow_mut()
            .insert((project.to_string(), ticket_id.to_string()), record);
    }

    /// Lists `ticket_id` but fails to decode it.
    pub fn insert_corrupt(&self, project: &str, ticket_id: &str) {
        self.corrupt
            .borrow_mut()
            .push((project.to_string(), ticket_id.to_string()));
    }

    pub fn get(&self, project: &str, ticket_id: &str) -> Option<TicketRecord> {
        self.records
            .borrow()
            .get(&(project.to_string(), ticket_id.to_string()))
            .cloned()
    }

    pub fn writes(&self) -> usize {
        self.writes.get()
    }

    /// Makes every later write fail.
    pub fn fail_writes(&self) {
        self.fail_writes.set(true);
    }
}

impl RecordStore for MemoryRecordStore {
    fn list(&self, project: &str) -> Result<Vec<String>, StoreError> {
        let mut ids: Vec<String> = self
            .records
            .borrow()
            .keys()
            .chain(self.corrupt.borrow().iter())
            .filter(|(p, _)| p == project)
            .map(|(_, id)| id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn read(&self, project: &str, ticket_id: &str) -> Result<Option<TicketRecord>, StoreError> {
        let key = (project.to_string(), ticket_id.to_string());
        if self.corrupt.borrow().contains(&key) {
            let source = serde_json::from_str::<TicketRecord>("{}")
                .expect_err("empty object is not a record");
            return Err(StoreError::InvalidRecord {
                project: key.0,
                ticket_id: key.1,
                source,
            });
        }
        Ok(self.records.borrow().get(&key).cloned())
    }

    fn write(
        &self,
        project: &str,
        ticket_id: &str,
        record: &TicketRecord,
    ) -> Result<(), StoreError> {
        if self.fail_writes.get() {
            return Err(StoreError::Database(rusqlite::Error::QueryReturnedNoRows));
        }
        self.writes.set(self.writes.get() + 1);
        self.insert(project, ticket_id, record.clone());
        Ok(())
    }
}

/// Clock that only moves when asked: by `step` on every read and by the
/// requested amount on every sleep.
#[derive(Debug)]
pub struct FakeClock {
    now: Cell<DateTime<Utc>>,
    step: Duration,
    sleeps: RefCell<Vec<Duration>>,
}

impl FakeClock {
    pub fn at(secs: i64, millis: u32) -> Self {
        let start = Utc
            .timestamp_opt(secs, millis * 1_000_000)
            .single()
            .expect("valid timestamp");
        Self {
            now: Cell::new(start),
            step: Duration::ZERO,
            sleeps: RefCell::new(Vec::new()),
        }
    }

    pub fn with_step(mut self, step: Duration) -> Self {
        self.step = step;
        self
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.borrow().clone()
    }

    fn advance(&self, by: Duration) {
        let delta = chrono::Duration::from_std(by).expect("duration in range");
        self.now.set(self.now.get() + delta);
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        let current = self.now.get();
        self.advance(self.step);
        current
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps.borrow_mut().push(duration);
        self.advance(duration);
    }
}
