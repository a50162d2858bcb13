use crate::config::{ConfigStore, ProjectConfig};
use crate::error::SyncError;
use crate::github::{ApiErrorKind, IssueTracker};
use crate::metrics::Metrics;

/// Lazily filled milestone and label lookups for one project run.
///
/// An empty map means "not listed yet": the first lookup lists everything the
/// tracker has and stores it. Every change is written through the
/// [`ConfigStore`] straight away so an aborted run loses at most the call in
/// flight.
pub struct ReferenceCache<'a> {
    config: &'a mut ProjectConfig,
    store: &'a mut dyn ConfigStore,
    metrics: &'a Metrics,
}

impl<'a> ReferenceCache<'a> {
    pub fn new(
        config: &'a mut ProjectConfig,
        store: &'a mut dyn ConfigStore,
        metrics: &'a Metrics,
    ) -> Self {
        Self {
            config,
            store,
            metrics,
        }
    }

    pub fn config(&self) -> &ProjectConfig {
        &*self.config
    }

    fn persist(&mut self) -> Result<(), SyncError> {
        self.store.persist(&*self.config)?;
        Ok(())
    }

    fn refresh_milestones(&mut self, tracker: &dyn IssueTracker) -> Result<(), SyncError> {
        let listed = tracker.list_milestones(&self.config.account, &self.config.project)?;
        self.config.milestones = listed
            .into_iter()
            .map(|milestone| (milestone.title, milestone.number))
            .collect();
        tracing::debug!(
            project = %self.config.key,
            count = self.config.milestones.len(),
            "milestone cache filled"
        );
        self.persist()
    }

    /// Returns the remote number for the milestone `title`, creating it if
    /// the tracker does not have it yet.
    pub fn resolve_milestone(
        &mut self,
        tracker: &dyn IssueTracker,
        title: &str,
    ) -> Result<u64, SyncError> {
        if self.config.milestones.is_empty() {
            self.refresh_milestones(tracker)?;
        }

        if let Some(number) = self.config.milestones.get(title) {
            return Ok(*number);
        }

        match tracker.create_milestone(&self.config.account, &self.config.project, title) {
            Ok(created) => {
                self.metrics.inc_milestone_created();
                tracing::info!(project = %self.config.key, title, number = created.number, "milestone created");
                self.config.milestones.insert(title.to_string(), created.number);
                self.persist()?;
                Ok(created.number)
            }
            Err(err) if err.kind() == ApiErrorKind::Duplicate => {
                tracing::debug!(project = %self.config.key, title, "milestone already exists, relisting");
                self.refresh_milestones(tracker)?;
                self.config.milestones.get(title).copied().ok_or_else(|| {
                    SyncError::MilestoneInconsistent {
                        owner: self.config.account.clone(),
                        repo: self.config.project.clone(),
                        title: title.to_string(),
                    }
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Makes sure every label in `tags` exists remotely and returns the
    /// canonical names to attach, or `None` when there is nothing to attach.
    pub fn ensure_labels(
        &mut self,
        tracker: &dyn IssueTracker,
        tags: &[String],
    ) -> Result<Option<Vec<String>>, SyncError> {
        let wanted: Vec<&String> = tags.iter().filter(|tag| !tag.is_empty()).collect();
        if wanted.is_empty() {
            return Ok(None);
        }

        if self.config.labels.is_empty() {
            let listed = tracker.list_labels(&self.config.account, &self.config.project)?;
            self.config.labels = listed
                .into_iter()
                .map(|label| (label.name.clone(), label.name))
                .collect();
            tracing::debug!(
                project = %self.config.key,
                count = self.config.labels.len(),
                "label cache filled"
            );
            self.persist()?;
        }

        let mut names = Vec::with_capacity(wanted.len());
        for tag in wanted {
            if !self.config.labels.contains_key(tag.as_str()) {
                match tracker.create_label(&self.config.account, &self.config.project, tag) {
                    Ok(_) => {
                        self.metrics.inc_label_created();
                        tracing::info!(project = %self.config.key, label = %tag, "label created");
                    }
                    Err(err) if err.kind() == ApiErrorKind::Duplicate => {
                        tracing::debug!(project = %self.config.key, label = %tag, "label already exists");
                    }
                    Err(err) => return Err(err.into()),
                }
                self.config.labels.insert(tag.clone(), tag.clone());
                self.persist()?;
            }
            let canonical = self
                .config
                .labels
                .get(tag.as_str())
                .cloned()
                .unwrap_or_else(|| tag.clone());
            names.push(canonical);
        }

        Ok(Some(names))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::ApiError;
    use crate::test_support::{FakeTracker, MemoryConfigStore};

    fn project() -> ProjectConfig {
        ProjectConfig {
            key: "acme/1-widgets".into(),
            account: "acme".into(),
            project: "widgets".into(),
            ..ProjectConfig::default()
        }
    }

    #[test]
    fn lists_once_then_resolves_from_cache() {
        let tracker = FakeTracker::new();
        tracker.seed_milestone("1.0", 3);
        let mut config = project();
        let mut store = MemoryConfigStore::default();
        let metrics = Metrics::new();
        let mut cache = ReferenceCache::new(&mut config, &mut store, &metrics);

        assert_eq!(cache.resolve_milestone(&tracker, "1.0").expect("resolve"), 3);
        assert_eq!(cache.resolve_milestone(&tracker, "1.0").expect("resolve"), 3);

        assert_eq!(tracker.calls("list_milestones"), 1);
        assert_eq!(tracker.calls("create_milestone"), 0);
        assert_eq!(store.persisted.len(), 1);
    }

    #[test]
    fn creates_missing_milestone_and_persists_number() {
        let tracker = FakeTracker::new();
        tracker.seed_milestone("1.0", 1);
        let mut config = project();
        let mut store = MemoryConfigStore::default();
        let metrics = Metrics::new();
        let number = ReferenceCache::new(&mut config, &mut store, &metrics)
            .resolve_milestone(&tracker, "2.0")
            .expect("created");

        assert_eq!(tracker.calls("create_milestone"), 1);
        assert_eq!(config.milestones.get("2.0"), Some(&number));
        let last = store.persisted.last().expect("persisted");
        assert_eq!(last.milestones.get("2.0"), Some(&number));
        assert_eq!(metrics.snapshot().milestones_created, 1);
    }

    #[test]
    fn duplicate_milestone_is_recovered_from_fresh_listing() {
        let tracker = FakeTracker::new();
        tracker.seed_milestone("1.0", 1);
        let mut config = project();
        // A stale cache that predates another process creating "2.0".
        config.milestones.insert("1.0".into(), 1);
        tracker.seed_milestone("2.0", 8);
        tracker.fail_next(
            "create_milestone",
            ApiError::AlreadyExists {
                resource: "Milestone".into(),
                body: "{}".into(),
            },
        );

        let mut store = MemoryConfigStore::default();
        let metrics = Metrics::new();
        let number = ReferenceCache::new(&mut config, &mut store, &metrics)
            .resolve_milestone(&tracker, "2.0")
            .expect("recovered");

        assert_eq!(number, 8);
        assert_eq!(tracker.calls("list_milestones"), 1);
        assert_eq!(config.milestones.get("2.0"), Some(&8));
    }

    #[test]
    fn duplicate_missing_from_listing_is_a_consistency_fault() {
        let tracker = FakeTracker::new();
        tracker.seed_milestone("1.0", 1);
        tracker.fail_next(
            "create_milestone",
            ApiError::AlreadyExists {
                resource: "Milestone".into(),
                body: "{}".into(),
            },
        );
        let mut config = project();
        let mut store = MemoryConfigStore::default();
        let metrics = Metrics::new();

        let err = ReferenceCache::new(&mut config, &mut store, &metrics)
            .resolve_milestone(&tracker, "ghost")
            .expect_err("inconsistent");
        assert!(matches!(err, SyncError::MilestoneInconsistent { ref title, .. } if title == "ghost"));
    }

    #[test]
    fn other_milestone_failures_propagate() {
        let tracker = FakeTracker::new();
        tracker.seed_milestone("1.0", 1);
        tracker.fail_next("create_milestone", FakeTracker::unauthorized());
        let mut config = project();
        let mut store = MemoryConfigStore::default();
        let metrics = Metrics::new();

        let err = ReferenceCache::new(&mut config, &mut store, &metrics)
            .resolve_milestone(&tracker, "2.0")
            .expect_err("fatal");
        assert!(matches!(err, SyncError::Api(ApiError::Http { .. })));
        assert_eq!(tracker.calls("list_milestones"), 1);
    }

    #[test]
    fn labels_are_created_or_accepted_as_duplicates() {
        let tracker = FakeTracker::new();
        tracker.seed_label("bug");
        tracker.fail_next(
            "create_label",
            ApiError::AlreadyExists {
                resource: "Label".into(),
                body: "{}".into(),
            },
        );
        let mut config = project();
        let mut store = MemoryConfigStore::default();
        let metrics = Metrics::new();
        let tags = vec!["bug".to_string(), "raced".to_string(), "ui".to_string()];

        let names = ReferenceCache::new(&mut config, &mut store, &metrics)
            .ensure_labels(&tracker, &tags)
            .expect("labels ensured")
            .expect("labels attached");

        assert_eq!(names, tags);
        assert_eq!(tracker.calls("list_labels"), 1);
        assert_eq!(tracker.calls("create_label"), 2);
        assert_eq!(metrics.snapshot().labels_created, 1);
        assert_eq!(config.labels.len(), 3);
        let last = store.persisted.last().expect("persisted");
        assert!(last.labels.contains_key("raced"));
    }

    #[test]
    fn empty_tags_skip_the_tracker() {
        let tracker = FakeTracker::new();
        let mut config = project();
        let mut store = MemoryConfigStore::default();
        let metrics = Metrics::new();

        let names = ReferenceCache::new(&mut config, &mut store, &metrics)
            .ensure_labels(&tracker, &[String::new()])
            .expect("no-op");
        assert!(names.is_none());
        assert_eq!(tracker.total_calls(), 0);
    }

    #[test]
    fn other_label_failures_propagate() {
        let tracker = FakeTracker::new();
        tracker.seed_label("bug");
        tracker.fail_next("create_label", FakeTracker::unauthorized());
        let mut config = project();
        let mut store = MemoryConfigStore::default();
        let metrics = Metrics::new();

        let err = ReferenceCache::new(&mut config, &mut store, &metrics)
            .ensure_labels(&tracker, &["new".to_string()])
            .expect_err("fatal");
        assert!(matches!(err, SyncError::Api(_)));
        assert!(!config.labels.contains_key("new"));
    }
}
