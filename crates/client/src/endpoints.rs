//! Upstream paths for resources and actions.

use habitkit_core::{ActionRequest, KeepTasks};
use reqwest::Method;
use serde_json::{json, Value};

pub const USER: &str = "user";
pub const CONTENT: &str = "content";
pub const TAGS: &str = "tags";
pub const PARTY: &str = "groups/party";
pub const USER_CHALLENGES: &str = "challenges/user";
pub const USER_TASKS: &str = "tasks/user";

/// One concrete call. Path segments are kept unescaped and encoded one by
/// one when the URL is built, so ids cannot change the route.
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    pub method: Method,
    pub segments: Vec<String>,
    pub query: Vec<(&'static str, String)>,
    pub body: Option<Value>,
}

impl Endpoint {
    fn post(segments: &[&str]) -> Self {
        Self {
            method: Method::POST,
            segments: segments.iter().map(|s| s.to_string()).collect(),
            query: Vec::new(),
            body: None,
        }
    }

    fn delete(segments: &[&str]) -> Self {
        Self {
            method: Method::DELETE,
            segments: segments.iter().map(|s| s.to_string()).collect(),
            query: Vec::new(),
            body: None,
        }
    }

    fn with_query(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.query.push((key, value.into()));
        self
    }

    fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Unescaped path, for logs.
    pub fn path(&self) -> String {
        self.segments.join("/")
    }

    /// Segments borrowed for [`RateLimitedClient::send_segments`](crate::RateLimitedClient::send_segments).
    pub fn segment_refs(&self) -> Vec<&str> {
        self.segments.iter().map(String::as_str).collect()
    }

    /// Query parameters borrowed for sending.
    pub fn query_pairs(&self) -> Vec<(&str, &str)> {
        self.query.iter().map(|(k, v)| (*k, v.as_str())).collect()
    }
}

/// Maps an action to its upstream call.
pub fn action_endpoint(action: &ActionRequest) -> Endpoint {
    match action {
        ActionRequest::ScoreTask { task_id, direction } => {
            Endpoint::post(&["tasks", task_id.as_str(), "score", direction.as_str()])
        }
        ActionRequest::ScoreChecklistItem { task_id, item_id } => {
            Endpoint::post(&["tasks", task_id.as_str(), "checklist", item_id.as_str(), "score"])
        }
        ActionRequest::ToggleSleep => Endpoint::post(&["user", "sleep"]),
        ActionRequest::LeaveChallenge { challenge_id, keep } => {
            let keep = match keep {
                KeepTasks::Keep => "keep-all",
                KeepTasks::Remove => "remove-all",
            };
            Endpoint::post(&["challenges", challenge_id.as_str(), "leave"])
                .with_body(json!({ "keep": keep }))
        }
        ActionRequest::DeleteTag { tag_id } => Endpoint::delete(&["tags", tag_id.as_str()]),
        ActionRequest::UnlinkTask { task_id, keep } => {
            let keep = match keep {
                KeepTasks::Keep => "keep",
                KeepTasks::Remove => "remove",
            };
            Endpoint::post(&["tasks", "unlink-one", task_id.as_str()]).with_query("keep", keep)
        }
        ActionRequest::CastSkill {
            spell_id,
            target_id,
        } => {
            let ep = Endpoint::post(&["user", "class", "cast", spell_id.as_str()]);
            match target_id {
                Some(target) => ep.with_query("targetId", target.clone()),
                None => ep,
            }
        }
        ActionRequest::BuyHealthPotion => Endpoint::post(&["user", "buy-health-potion"]),
    }
}
