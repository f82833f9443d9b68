//! Typed upstream records and the derived [`Task`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Upstream identifier (UUID string by convention).
pub type Id = String;

/// Character stats as reported on the user document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Stats {
    /// Health.
    #[serde(default)]
    pub hp: f64,
    /// Health ceiling.
    #[serde(default, rename = "maxHealth")]
    pub max_hp: f64,
    /// Mana.
    #[serde(default)]
    pub mp: f64,
    /// Mana ceiling.
    #[serde(default, rename = "maxMP")]
    pub max_mp: f64,
    /// Experience in the current level.
    #[serde(default)]
    pub exp: f64,
    /// Experience needed for the next level.
    #[serde(default, rename = "toNextLevel")]
    pub to_next_level: f64,
    /// Character level.
    #[serde(default, rename = "lvl")]
    pub level: u32,
    /// Gold.
    #[serde(default)]
    pub gp: f64,
    /// Class key (`warrior`, `wizard`, ...), once chosen.
    #[serde(default)]
    pub class: Option<String>,
}

/// The authenticated user, flattened from the nested upstream document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(from = "UserRecord")]
pub struct User {
    /// User id.
    pub id: Id,
    /// Login name (`auth.local.username`).
    pub username: Option<String>,
    /// Profile name.
    pub display_name: Option<String>,
    /// Resting in the inn: dailies do not damage while set.
    pub sleeping: bool,
    /// Party the user belongs to.
    pub party_id: Option<Id>,
    /// Character stats.
    pub stats: Stats,
}

#[derive(Deserialize)]
struct UserRecord {
    #[serde(rename = "_id")]
    id: Id,
    #[serde(default)]
    auth: UserAuth,
    #[serde(default)]
    profile: UserProfile,
    #[serde(default)]
    preferences: UserPreferences,
    #[serde(default)]
    party: UserParty,
    #[serde(default)]
    stats: Stats,
}

#[derive(Deserialize, Default)]
struct UserAuth {
    #[serde(default)]
    local: UserLocalAuth,
}

#[derive(Deserialize, Default)]
struct UserLocalAuth {
    #[serde(default)]
    username: Option<String>,
}

#[derive(Deserialize, Default)]
struct UserProfile {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize, Default)]
struct UserPreferences {
    #[serde(default)]
    sleep: bool,
}

#[derive(Deserialize, Default)]
struct UserParty {
    #[serde(default, rename = "_id")]
    id: Option<Id>,
}

impl From<UserRecord> for User {
    fn from(r: UserRecord) -> Self {
        Self {
            id: r.id,
            username: r.auth.local.username,
            display_name: r.profile.name,
            sleeping: r.preferences.sleep,
            party_id: r.party.id,
            stats: r.stats,
        }
    }
}

/// User-defined tag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tag {
    /// Tag id.
    pub id: Id,
    /// Display name.
    pub name: String,
    /// Tag created by a joined challenge.
    #[serde(default)]
    pub challenge: bool,
}

/// A challenge the user is a member of.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(from = "ChallengeRecord")]
pub struct Challenge {
    /// Challenge id.
    pub id: Id,
    /// Full name.
    pub name: String,
    /// Short name, also used as its tag name.
    pub short_name: Option<String>,
    /// One-line summary.
    pub summary: Option<String>,
    /// Number of participants.
    pub member_count: u32,
    /// Prize in gems.
    pub prize: u32,
    /// Leader profile name, when populated.
    pub leader_name: Option<String>,
    /// Owning group name, when populated.
    pub group_name: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChallengeRecord {
    #[serde(rename = "_id")]
    id: Id,
    #[serde(default)]
    name: String,
    #[serde(default)]
    short_name: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    member_count: u32,
    #[serde(default)]
    prize: u32,
    #[serde(default)]
    leader: Value,
    #[serde(default)]
    group: Value,
}

impl From<ChallengeRecord> for Challenge {
    fn from(r: ChallengeRecord) -> Self {
        Self {
            id: r.id,
            name: r.name,
            short_name: r.short_name,
            summary: r.summary,
            member_count: r.member_count,
            prize: r.prize,
            leader_name: str_at(&r.leader, "/profile/name"),
            group_name: str_at(&r.group, "/name"),
        }
    }
}

/// The user's party, if any.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(from = "PartyRecord")]
pub struct Party {
    /// Party id.
    pub id: Id,
    /// Party name.
    pub name: String,
    /// Number of members.
    pub member_count: u32,
    /// Leader user id.
    pub leader_id: Option<Id>,
    /// Current quest, if one is set.
    pub quest: Option<PartyQuest>,
}

/// Quest state of a party.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PartyQuest {
    /// Quest key in game content.
    pub key: String,
    /// Started, as opposed to awaiting invitations.
    pub active: bool,
    /// Remaining boss HP for boss quests.
    pub progress_hp: Option<f64>,
    /// Collected items per item key for collection quests.
    pub progress_collect: BTreeMap<String, f64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PartyRecord {
    #[serde(rename = "_id")]
    id: Id,
    #[serde(default)]
    name: String,
    #[serde(default)]
    member_count: u32,
    #[serde(default)]
    leader: Value,
    #[serde(default)]
    quest: Option<QuestRecord>,
}

#[derive(Deserialize)]
struct QuestRecord {
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    active: bool,
    #[serde(default)]
    progress: QuestProgressRecord,
}

#[derive(Deserialize, Default)]
struct QuestProgressRecord {
    #[serde(default)]
    hp: Option<f64>,
    #[serde(default)]
    collect: BTreeMap<String, f64>,
}

impl From<PartyRecord> for Party {
    fn from(r: PartyRecord) -> Self {
        // Leader is an id string, or a populated member object.
        let leader_id = match &r.leader {
            Value::String(s) => Some(s.clone()),
            other => str_at(other, "/_id"),
        };
        let quest = r.quest.and_then(|q| {
            q.key.map(|key| PartyQuest {
                key,
                active: q.active,
                progress_hp: q.progress.hp,
                progress_collect: q.progress.collect,
            })
        });
        Self {
            id: r.id,
            name: r.name,
            member_count: r.member_count,
            leader_id,
            quest,
        }
    }
}

fn str_at(v: &Value, pointer: &str) -> Option<String> {
    v.pointer(pointer).and_then(Value::as_str).map(str::to_string)
}

/// Task type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Scored up or down any number of times.
    Habit,
    /// Recurs on a schedule.
    Daily,
    /// One-off, optionally with a due date.
    Todo,
    /// Bought with gold.
    Reward,
}

impl TaskType {
    /// Every type, in display order.
    pub const ALL: [TaskType; 4] = [Self::Habit, Self::Daily, Self::Todo, Self::Reward];

    /// Upstream spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Habit => "habit",
            Self::Daily => "daily",
            Self::Todo => "todo",
            Self::Reward => "reward",
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "habit" => Ok(Self::Habit),
            "daily" => Ok(Self::Daily),
            "todo" => Ok(Self::Todo),
            "reward" => Ok(Self::Reward),
            other => Err(format!("unknown task type: {other}")),
        }
    }
}

/// Derived display status for dailies and todos.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Todo whose due day is before today.
    Red,
    /// Todo due today or later, or daily due today and not completed.
    Due,
    /// Todo with no due date, or daily not due today.
    Grey,
    /// Daily due today and completed.
    Done,
}

impl TaskStatus {
    /// Lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Red => "red",
            Self::Due => "due",
            Self::Grey => "grey",
            Self::Done => "done",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "red" => Ok(Self::Red),
            "due" => Ok(Self::Due),
            "grey" | "gray" => Ok(Self::Grey),
            "done" => Ok(Self::Done),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

/// Checklist entry on a daily or todo.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChecklistItem {
    /// Item id.
    pub id: Id,
    /// Item text.
    #[serde(default)]
    pub text: String,
    /// Ticked off.
    #[serde(default)]
    pub completed: bool,
}

/// Challenge reference embedded in an upstream task. Empty (`{}`) for
/// tasks not owned by a challenge.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RawChallengeRef {
    /// Owning challenge id.
    #[serde(default)]
    pub id: Option<Id>,
    /// Id of the task in the challenge template.
    #[serde(default)]
    pub task_id: Option<Id>,
    /// Challenge short name.
    #[serde(default)]
    pub short_name: Option<String>,
    /// Reason the link broke (`CHALLENGE_DELETED`, `TASK_DELETED`, ...).
    #[serde(default)]
    pub broken: Option<String>,
}

/// Task exactly as the upstream returns it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawTask {
    /// Task id.
    #[serde(rename = "_id")]
    pub id: Id,
    /// Task type.
    #[serde(rename = "type")]
    pub kind: TaskType,
    /// Title.
    #[serde(default)]
    pub text: String,
    /// Free-form notes.
    #[serde(default)]
    pub notes: String,
    /// Tag ids.
    #[serde(default)]
    pub tags: Vec<Id>,
    /// Challenge reference, if any.
    #[serde(default)]
    pub challenge: Option<RawChallengeRef>,
    /// Completion flag for dailies and todos.
    #[serde(default)]
    pub completed: bool,
    /// Whether a daily is due today.
    #[serde(default)]
    pub is_due: Option<bool>,
    /// Todo due date: RFC 3339, `YYYY-MM-DD`, empty, or null.
    #[serde(default)]
    pub date: Option<String>,
    /// Task value; drives colour and reward size.
    #[serde(default)]
    pub value: f64,
    /// Difficulty multiplier.
    #[serde(default = "default_priority")]
    pub priority: f64,
    /// Checklist entries.
    #[serde(default)]
    pub checklist: Vec<ChecklistItem>,
    /// Habit has a positive button.
    #[serde(default)]
    pub up: Option<bool>,
    /// Habit has a negative button.
    #[serde(default)]
    pub down: Option<bool>,
    /// Consecutive completions of a daily.
    #[serde(default)]
    pub streak: u32,
    /// Habit positive score count.
    #[serde(default)]
    pub counter_up: u32,
    /// Habit negative score count.
    #[serde(default)]
    pub counter_down: u32,
}

fn default_priority() -> f64 {
    1.0
}

/// Link from a task to the challenge that owns it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChallengeLink {
    /// Owning challenge id.
    pub challenge_id: Id,
    /// Challenge short name.
    pub short_name: Option<String>,
    /// Set when the challenge or its task went away upstream.
    pub broken: Option<String>,
}

impl ChallengeLink {
    /// True when the link carries a non-empty broken reason.
    pub fn is_broken(&self) -> bool {
        self.broken.as_deref().is_some_and(|b| !b.is_empty())
    }
}

/// Task as published in a snapshot: upstream fields plus derived status and
/// resolved tag names.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    /// Task id.
    pub id: Id,
    /// Task type.
    pub kind: TaskType,
    /// `None` for habits and rewards.
    pub status: Option<TaskStatus>,
    /// Title.
    pub text: String,
    /// Free-form notes.
    pub notes: String,
    /// Raw tag ids, including ids with no matching tag.
    pub tag_ids: Vec<Id>,
    /// Names of the tags that resolved.
    pub tag_names: Vec<String>,
    /// Challenge link, if any.
    pub challenge: Option<ChallengeLink>,
    /// Completion flag for dailies and todos.
    pub completed: bool,
    /// Daily is due today.
    pub is_due: bool,
    /// Parsed todo due date.
    pub due_date: Option<DateTime<Utc>>,
    /// Task value.
    pub value: f64,
    /// Difficulty multiplier.
    pub priority: f64,
    /// Checklist entries.
    pub checklist: Vec<ChecklistItem>,
    /// Habit has a positive button.
    pub up: bool,
    /// Habit has a negative button.
    pub down: bool,
    /// Consecutive completions of a daily.
    pub streak: u32,
    /// Habit positive score count.
    pub counter_up: u32,
    /// Habit negative score count.
    pub counter_down: u32,
}

impl Task {
    /// Owning challenge id, broken or not.
    pub fn challenge_id(&self) -> Option<&str> {
        self.challenge.as_ref().map(|c| c.challenge_id.as_str())
    }
}

/// Direction of a score action.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScoreDirection {
    /// Positive score; completes dailies and todos.
    Up,
    /// Negative score; uncompletes dailies and todos.
    Down,
}

impl ScoreDirection {
    /// Path segment used by the score route.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}

/// What happens to challenge tasks when leaving or unlinking.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum KeepTasks {
    /// Keep the tasks as personal tasks.
    Keep,
    /// Delete them.
    Remove,
}

/// A mutating request against the upstream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionRequest {
    /// Score a task up or down.
    ScoreTask {
        /// Task to score.
        task_id: Id,
        /// Up or down.
        direction: ScoreDirection,
    },
    /// Toggle one checklist item.
    ScoreChecklistItem {
        /// Task owning the checklist.
        task_id: Id,
        /// Checklist item id.
        item_id: Id,
    },
    /// Enter or leave the inn.
    ToggleSleep,
    /// Leave a challenge.
    LeaveChallenge {
        /// Challenge to leave.
        challenge_id: Id,
        /// Fate of the challenge's tasks.
        keep: KeepTasks,
    },
    /// Delete a tag.
    DeleteTag {
        /// Tag to delete.
        tag_id: Id,
    },
    /// Detach a task from its broken challenge.
    UnlinkTask {
        /// Task to unlink.
        task_id: Id,
        /// Keep it as a personal task or delete it.
        keep: KeepTasks,
    },
    /// Cast a class skill.
    CastSkill {
        /// Spell key in game content.
        spell_id: String,
        /// Task or party member targeted, when the spell needs one.
        target_id: Option<Id>,
    },
    /// Buy one health potion.
    BuyHealthPotion,
}

impl ActionRequest {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ScoreTask { .. } => "score_task",
            Self::ScoreChecklistItem { .. } => "score_checklist_item",
            Self::ToggleSleep => "toggle_sleep",
            Self::LeaveChallenge { .. } => "leave_challenge",
            Self::DeleteTag { .. } => "delete_tag",
            Self::UnlinkTask { .. } => "unlink_task",
            Self::CastSkill { .. } => "cast_skill",
            Self::BuyHealthPotion => "buy_health_potion",
        }
    }
}
