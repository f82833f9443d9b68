use habitkit_core::ApiError;

/// Upstream resources fetched by a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    User,
    Content,
    Tags,
    Party,
    Challenges,
    Tasks,
}

impl Resource {
    pub const ALL: [Resource; 6] = [
        Self::User,
        Self::Content,
        Self::Tags,
        Self::Party,
        Self::Challenges,
        Self::Tasks,
    ];

    /// A failure on a critical resource aborts the refresh.
    pub fn is_critical(&self) -> bool {
        matches!(self, Self::User | Self::Content | Self::Tasks)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Content => "content",
            Self::Tags => "tags",
            Self::Party => "party",
            Self::Challenges => "challenges",
            Self::Tasks => "tasks",
        }
    }
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A non-critical resource that failed and was replaced by its default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshWarning {
    pub resource: Resource,
    pub error: ApiError,
}

impl std::fmt::Display for RefreshWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} unavailable: {}", self.resource, self.error)
    }
}

/// Critical resource failure that aborted a refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshFailure {
    pub resource: Resource,
    pub error: ApiError,
}

impl std::fmt::Display for RefreshFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} fetch failed: {}", self.resource, self.error)
    }
}

/// How a refresh attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshStatus {
    /// A new snapshot was published.
    Published,
    /// A critical fetch failed; the previous snapshot is untouched.
    Failed,
    /// Another refresh held the gate; nothing was fetched.
    AlreadyInProgress,
}

/// Result of one refresh attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshOutcome {
    pub status: RefreshStatus,
    pub warnings: Vec<RefreshWarning>,
    pub failure: Option<RefreshFailure>,
}

impl RefreshOutcome {
    pub fn published(warnings: Vec<RefreshWarning>) -> Self {
        Self {
            status: RefreshStatus::Published,
            warnings,
            failure: None,
        }
    }

    pub fn failed(failure: RefreshFailure, warnings: Vec<RefreshWarning>) -> Self {
        Self {
            status: RefreshStatus::Failed,
            warnings,
            failure: Some(failure),
        }
    }

    pub fn already_in_progress() -> Self {
        Self {
            status: RefreshStatus::AlreadyInProgress,
            warnings: Vec::new(),
            failure: None,
        }
    }

    pub fn is_published(&self) -> bool {
        self.status == RefreshStatus::Published
    }

    /// Published with no degraded resources.
    pub fn is_clean(&self) -> bool {
        self.is_published() && self.warnings.is_empty()
    }

    /// The data readers see may be out of date.
    pub fn is_stale(&self) -> bool {
        self.status == RefreshStatus::Failed
    }
}
