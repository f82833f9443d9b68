//! Single pass from raw tasks + tags to the task lookup and category index.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, NaiveDate, Utc};

use crate::model::{ChallengeLink, Id, RawTask, Tag, Task, TaskStatus, TaskType};

/// A (type, status) bucket of the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Category {
    /// Task type.
    pub kind: TaskType,
    /// Derived status; `None` for habits and rewards.
    pub status: Option<TaskStatus>,
}

impl Category {
    /// Bucket for `kind` and `status`.
    pub fn new(kind: TaskType, status: Option<TaskStatus>) -> Self {
        Self { kind, status }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "{}.{}", self.kind, status),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// Derived grouping of task ids. Rebuilt from scratch on every refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryIndex {
    by_category: BTreeMap<Category, BTreeSet<Id>>,
    /// Tasks whose challenge link is broken.
    pub broken: BTreeSet<Id>,
    /// Tasks with any challenge link, broken or not.
    pub challenge_linked: BTreeSet<Id>,
    /// Union of every task's tag ids.
    pub used_tag_ids: BTreeSet<Id>,
}

impl CategoryIndex {
    /// Ids in one bucket; `None` when the bucket is empty.
    pub fn ids(&self, kind: TaskType, status: Option<TaskStatus>) -> Option<&BTreeSet<Id>> {
        self.by_category.get(&Category::new(kind, status))
    }

    /// Size of one bucket.
    pub fn count(&self, kind: TaskType, status: Option<TaskStatus>) -> usize {
        self.ids(kind, status).map_or(0, BTreeSet::len)
    }

    /// Number of tasks of `kind` across all statuses.
    pub fn count_kind(&self, kind: TaskType) -> usize {
        self.by_category
            .iter()
            .filter(|(c, _)| c.kind == kind)
            .map(|(_, ids)| ids.len())
            .sum()
    }

    /// Non-empty buckets in (type, status) order.
    pub fn categories(&self) -> impl Iterator<Item = (Category, &BTreeSet<Id>)> {
        self.by_category.iter().map(|(c, ids)| (*c, ids))
    }

    /// Tags from `all` that no task references.
    pub fn unused_tags<'a>(&self, all: &'a [Tag]) -> Vec<&'a Tag> {
        all.iter()
            .filter(|t| !self.used_tag_ids.contains(&t.id))
            .collect()
    }

    fn insert(&mut self, task: &Task) {
        self.by_category
            .entry(Category::new(task.kind, task.status))
            .or_default()
            .insert(task.id.clone());
        if let Some(link) = &task.challenge {
            self.challenge_linked.insert(task.id.clone());
            if link.is_broken() {
                self.broken.insert(task.id.clone());
            }
        }
        self.used_tag_ids.extend(task.tag_ids.iter().cloned());
    }
}

/// Output of [`categorize`].
#[derive(Debug, Clone, Default)]
pub struct Categorized {
    /// Tasks by id.
    pub tasks: HashMap<Id, Task>,
    /// Buckets and link sets over `tasks`.
    pub index: CategoryIndex,
}

/// Builds the task lookup and index. `now` is the reference instant for
/// "past due"; the pass reads no clock and has no other effects.
pub fn categorize(raw: &[RawTask], tags: &[Tag], now: DateTime<Utc>) -> Categorized {
    let names: HashMap<&str, &str> = tags
        .iter()
        .map(|t| (t.id.as_str(), t.name.as_str()))
        .collect();

    let mut out = Categorized {
        tasks: HashMap::with_capacity(raw.len()),
        index: CategoryIndex::default(),
    };

    for r in raw {
        let task = build_task(r, &names, now);
        out.index.insert(&task);
        if out.tasks.insert(task.id.clone(), task).is_some() {
            tracing::warn!(task_id = %r.id, "duplicate task id in upstream list");
        }
    }

    out
}

fn build_task(r: &RawTask, names: &HashMap<&str, &str>, now: DateTime<Utc>) -> Task {
    let due_date = r.date.as_deref().and_then(parse_due_date);
    let is_due = r.is_due.unwrap_or(false);
    let status = derive_status(r.kind, due_date, is_due, r.completed, now);

    let tag_names = r
        .tags
        .iter()
        .filter_map(|id| names.get(id.as_str()).map(|n| n.to_string()))
        .collect();

    let challenge = r.challenge.as_ref().and_then(|c| {
        c.id.as_ref().map(|id| ChallengeLink {
            challenge_id: id.clone(),
            short_name: c.short_name.clone(),
            broken: c.broken.clone().filter(|b| !b.is_empty()),
        })
    });

    Task {
        id: r.id.clone(),
        kind: r.kind,
        status,
        text: r.text.clone(),
        notes: r.notes.clone(),
        tag_ids: r.tags.clone(),
        tag_names,
        challenge,
        completed: r.completed,
        is_due,
        due_date,
        value: r.value,
        priority: r.priority,
        checklist: r.checklist.clone(),
        up: r.up.unwrap_or(false),
        down: r.down.unwrap_or(false),
        streak: r.streak,
        counter_up: r.counter_up,
        counter_down: r.counter_down,
    }
}

/// Status rules:
/// - todo: due day (UTC) before today → red, today or later → due,
///   none → grey
/// - daily: not due today → grey, else done/due by completion
/// - habit, reward: none
pub fn derive_status(
    kind: TaskType,
    due_date: Option<DateTime<Utc>>,
    is_due: bool,
    completed: bool,
    now: DateTime<Utc>,
) -> Option<TaskStatus> {
    match kind {
        TaskType::Todo => Some(match due_date {
            Some(d) if d.date_naive() < now.date_naive() => TaskStatus::Red,
            Some(_) => TaskStatus::Due,
            None => TaskStatus::Grey,
        }),
        TaskType::Daily => Some(match (is_due, completed) {
            (false, _) => TaskStatus::Grey,
            (true, true) => TaskStatus::Done,
            (true, false) => TaskStatus::Due,
        }),
        TaskType::Habit | TaskType::Reward => None,
    }
}

/// Parses an upstream due date. Bare dates are midnight UTC; empty or
/// malformed values are treated as no due date.
pub fn parse_due_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    match NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        Ok(d) => d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc()),
        Err(_) => {
            tracing::debug!(value = s, "ignoring unparsable due date");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn todo_status_follows_due_date() {
        let n = now();
        assert_eq!(
            derive_status(TaskType::Todo, Some(n - Duration::days(1)), false, false, n),
            Some(TaskStatus::Red)
        );
        assert_eq!(
            derive_status(TaskType::Todo, Some(n + Duration::days(1)), false, false, n),
            Some(TaskStatus::Due)
        );
        assert_eq!(
            derive_status(TaskType::Todo, None, false, false, n),
            Some(TaskStatus::Grey)
        );
    }

    #[test]
    fn todo_due_today_is_not_red() {
        let n = now();
        let due = |s: &str| derive_status(TaskType::Todo, parse_due_date(s), false, false, n);
        assert_eq!(due("2024-05-10"), Some(TaskStatus::Due));
        assert_eq!(due("2024-05-10T01:00:00Z"), Some(TaskStatus::Due));
        assert_eq!(due("2024-05-09"), Some(TaskStatus::Red));
        assert_eq!(due("2024-05-09T23:59:59Z"), Some(TaskStatus::Red));
    }

    #[test]
    fn daily_not_due_is_grey_regardless_of_completion() {
        let n = now();
        assert_eq!(
            derive_status(TaskType::Daily, None, false, true, n),
            Some(TaskStatus::Grey)
        );
        assert_eq!(
            derive_status(TaskType::Daily, None, false, false, n),
            Some(TaskStatus::Grey)
        );
        assert_eq!(
            derive_status(TaskType::Daily, None, true, true, n),
            Some(TaskStatus::Done)
        );
        assert_eq!(
            derive_status(TaskType::Daily, None, true, false, n),
            Some(TaskStatus::Due)
        );
    }

    #[test]
    fn habits_and_rewards_have_no_status() {
        assert_eq!(derive_status(TaskType::Habit, None, true, true, now()), None);
        assert_eq!(derive_status(TaskType::Reward, None, true, true, now()), None);
    }

    #[test]
    fn parses_rfc3339_and_bare_dates() {
        assert_eq!(
            parse_due_date("2024-05-09T22:00:00.000Z"),
            Some(Utc.with_ymd_and_hms(2024, 5, 9, 22, 0, 0).unwrap())
        );
        assert_eq!(
            parse_due_date("2024-05-09"),
            Some(Utc.with_ymd_and_hms(2024, 5, 9, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_due_date(""), None);
        assert_eq!(parse_due_date("next tuesday"), None);
    }

    #[test]
    fn category_display() {
        assert_eq!(
            Category::new(TaskType::Todo, Some(TaskStatus::Red)).to_string(),
            "todo.red"
        );
        assert_eq!(Category::new(TaskType::Habit, None).to_string(), "habit");
    }
}
