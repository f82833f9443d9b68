//! The immutable aggregate published after each successful refresh.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::categorize::{categorize, CategoryIndex};
use crate::model::{Challenge, Id, Party, RawTask, Stats, Tag, Task, TaskStatus, TaskType, User};

/// Everything fetched and derived by one successful refresh.
///
/// Built in one go by [`Snapshot::assemble`]; never partially constructed.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// The authenticated user.
    pub user: User,
    /// Copy of `user.stats`.
    pub stats: Stats,
    /// All tags, in upstream order.
    pub tags: Vec<Tag>,
    /// Categorized tasks by id.
    pub tasks: HashMap<Id, Task>,
    /// Buckets built from `tasks`.
    pub category_index: CategoryIndex,
    /// Challenges the user is a member of.
    pub challenges: Vec<Challenge>,
    /// `None` when the user has no party.
    pub party: Option<Party>,
    /// Game content (items, spells, quests), kept as raw JSON.
    pub content: Value,
    /// Reference instant used for task status.
    pub fetched_at: DateTime<Utc>,
}

/// Fetched inputs for [`Snapshot::assemble`].
#[derive(Debug, Clone)]
pub struct SnapshotParts {
    /// User document.
    pub user: User,
    /// Raw game content.
    pub content: Value,
    /// Tags, or empty when unavailable.
    pub tags: Vec<Tag>,
    /// Party, if any.
    pub party: Option<Party>,
    /// Challenges, or empty when unavailable.
    pub challenges: Vec<Challenge>,
    /// Upstream tasks before categorization.
    pub tasks: Vec<RawTask>,
}

impl Snapshot {
    /// Runs the categorizer and builds a complete snapshot.
    pub fn assemble(parts: SnapshotParts, now: DateTime<Utc>) -> Self {
        let categorized = categorize(&parts.tasks, &parts.tags, now);
        Self {
            stats: parts.user.stats.clone(),
            user: parts.user,
            tags: parts.tags,
            tasks: categorized.tasks,
            category_index: categorized.index,
            challenges: parts.challenges,
            party: parts.party,
            content: parts.content,
            fetched_at: now,
        }
    }

    /// Task by id.
    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.get(id)
    }

    /// Tasks in one (type, status) bucket, ordered by id.
    pub fn tasks_in(&self, kind: TaskType, status: Option<TaskStatus>) -> Vec<&Task> {
        self.category_index
            .ids(kind, status)
            .into_iter()
            .flatten()
            .filter_map(|id| self.tasks.get(id))
            .collect()
    }

    /// Tasks of one type, ordered by id.
    pub fn tasks_of_kind(&self, kind: TaskType) -> Vec<&Task> {
        let mut out: Vec<&Task> = self.tasks.values().filter(|t| t.kind == kind).collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    /// Tags no task references.
    pub fn unused_tags(&self) -> Vec<&Tag> {
        self.category_index.unused_tags(&self.tags)
    }

    /// Tasks whose challenge link is broken.
    pub fn broken_tasks(&self) -> Vec<&Task> {
        self.category_index
            .broken
            .iter()
            .filter_map(|id| self.tasks.get(id))
            .collect()
    }

    /// Tasks owned by a challenge.
    pub fn challenge_tasks(&self) -> Vec<&Task> {
        self.category_index
            .challenge_linked
            .iter()
            .filter_map(|id| self.tasks.get(id))
            .collect()
    }

    /// Tag by id.
    pub fn tag(&self, id: &str) -> Option<&Tag> {
        self.tags.iter().find(|t| t.id == id)
    }

    /// Challenge by id.
    pub fn challenge(&self, id: &str) -> Option<&Challenge> {
        self.challenges.iter().find(|c| c.id == id)
    }
}
