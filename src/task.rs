//! Task and subtask data structures.
//!
//! This module defines the `Task` aggregate as the task service returns it (with an embedded
//! snapshot of its subtasks), the identifiers used to address tasks and subtasks, and the
//! request shapes sent when creating or patching them.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::StoreError;
use crate::fields::*;

/// Identifier the task service assigned to a task.
///
/// The service may send ids as JSON numbers or strings; both become the same string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        TaskId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TaskId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(StoreError::Validation("task id cannot be empty".into()));
        }
        Ok(TaskId(s.to_string()))
    }
}

impl<'de> Deserialize<'de> for TaskId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        WireId::deserialize(deserializer).map(|id| TaskId(id.into()))
    }
}

/// Identifier of a subtask.
///
/// Subtasks added to a draft task get a `Local` id until the parent is created, at which
/// point the service assigns a `Persisted` id. The two spaces never compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubtaskId {
    Local(u64),
    Persisted(String),
}

impl SubtaskId {
    pub fn is_local(&self) -> bool {
        matches!(self, SubtaskId::Local(_))
    }
}

const LOCAL_PREFIX: &str = "local-";

impl fmt::Display for SubtaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubtaskId::Local(n) => write!(f, "{LOCAL_PREFIX}{n}"),
            SubtaskId::Persisted(id) => f.write_str(id),
        }
    }
}

impl FromStr for SubtaskId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(StoreError::Validation("subtask id cannot be empty".into()));
        }
        if let Some(n) = s.strip_prefix(LOCAL_PREFIX) {
            if let Ok(n) = n.parse::<u64>() {
                return Ok(SubtaskId::Local(n));
            }
        }
        Ok(SubtaskId::Persisted(s.to_string()))
    }
}

impl Serialize for SubtaskId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SubtaskId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        WireId::deserialize(deserializer).map(|id| SubtaskId::Persisted(id.into()))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum WireId {
    Number(i64),
    Text(String),
}

impl From<WireId> for String {
    fn from(id: WireId) -> Self {
        match id {
            WireId::Number(n) => n.to_string(),
            WireId::Text(s) => s,
        }
    }
}

/// A top-level to-do item owned by the signed-in user.
///
/// `subtasks` is the embedded snapshot the service returns with the task; the local store
/// keeps it as the single copy of the task's subtasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub status: Status,
    #[serde(default, with = "wire::date")]
    pub due_date: Option<NaiveDate>,
    #[serde(default, with = "wire::timestamp")]
    pub created_at: Option<NaiveDateTime>,
    #[serde(default, with = "wire::timestamp")]
    pub updated_at: Option<NaiveDateTime>,
    #[serde(default, deserialize_with = "wire::nullable_vec")]
    pub subtasks: Vec<Subtask>,
}

impl Task {
    pub fn is_completed(&self) -> bool {
        self.status == Status::Completed
    }

    pub fn subtask(&self, id: &SubtaskId) -> Option<&Subtask> {
        self.subtasks.iter().find(|s| &s.id == id)
    }
}

/// A checklist item owned by exactly one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subtask {
    pub id: SubtaskId,
    pub title: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, with = "wire::timestamp")]
    pub created_at: Option<NaiveDateTime>,
    #[serde(default, with = "wire::timestamp")]
    pub updated_at: Option<NaiveDateTime>,
}

impl Subtask {
    /// A subtask that exists only on the client, attached to a draft task.
    pub fn local(n: u64, title: impl Into<String>) -> Self {
        let now = Utc::now().naive_utc();
        Subtask {
            id: SubtaskId::Local(n),
            title: title.into(),
            completed: false,
            created_at: Some(now),
            updated_at: Some(now),
        }
    }
}

/// A task that has not been confirmed by the service yet.
///
/// The default value is the placeholder a new-task form starts from: empty title,
/// medium priority, pending status.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskDraft {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub priority: Priority,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none", with = "wire::date")]
    pub due_date: Option<NaiveDate>,
    /// Subtasks with `Local` ids; sent one by one after the task itself is created.
    #[serde(skip)]
    pub subtasks: Vec<Subtask>,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>) -> Self {
        TaskDraft {
            title: title.into(),
            ..TaskDraft::default()
        }
    }

    /// Check the draft can be sent: the title must have visible characters.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.title.trim().is_empty() {
            return Err(StoreError::Validation("task title cannot be empty".into()));
        }
        Ok(())
    }
}

/// Partial update of a task. Absent fields are left unchanged by the service.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(skip_serializing_if = "Option::is_none", with = "wire::date")]
    pub due_date: Option<NaiveDate>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        *self == TaskPatch::default()
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        if let Some(title) = &self.title {
            if title.trim().is_empty() {
                return Err(StoreError::Validation("task title cannot be empty".into()));
            }
        }
        Ok(())
    }
}

/// Partial update of a subtask.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SubtaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}

impl SubtaskPatch {
    pub fn completed(completed: bool) -> Self {
        SubtaskPatch {
            title: None,
            completed: Some(completed),
        }
    }
}

/// Serde adapters for the task service's JSON conventions.
pub(crate) mod wire {
    use chrono::{DateTime, NaiveDate, NaiveDateTime};
    use serde::{Deserialize, Deserializer, Serializer};

    fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.naive_utc())
            .ok()
            .or_else(|| s.parse::<NaiveDateTime>().ok())
    }

    /// Timestamps arrive as ISO-8601 with or without an offset; offsets are folded to UTC.
    pub mod timestamp {
        use super::*;

        pub fn serialize<S: Serializer>(
            value: &Option<NaiveDateTime>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(ts) => serializer.collect_str(&ts.format("%Y-%m-%dT%H:%M:%S%.f")),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<NaiveDateTime>, D::Error> {
            let raw = Option::<String>::deserialize(deserializer)?;
            match raw.as_deref().map(str::trim) {
                None | Some("") => Ok(None),
                Some(s) => parse_timestamp(s)
                    .map(Some)
                    .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{s}'"))),
            }
        }
    }

    /// Due dates are sent as `YYYY-MM-DD`; the service may answer with a full timestamp.
    pub mod date {
        use super::*;

        pub fn serialize<S: Serializer>(
            value: &Option<NaiveDate>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(d) => serializer.collect_str(&d.format("%Y-%m-%d")),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<NaiveDate>, D::Error> {
            let raw = Option::<String>::deserialize(deserializer)?;
            match raw.as_deref().map(str::trim) {
                None | Some("") => Ok(None),
                Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .ok()
                    .or_else(|| parse_timestamp(s).map(|ts| ts.date()))
                    .map(Some)
                    .ok_or_else(|| serde::de::Error::custom(format!("invalid date '{s}'"))),
            }
        }
    }

    /// Ids that may be sent as numbers or strings, kept as strings.
    pub fn id_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        super::WireId::deserialize(deserializer).map(String::from)
    }

    pub fn nullable_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
    }
}
