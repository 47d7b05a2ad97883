//! Enumerations and field types for task management.
//!
//! This module defines the structured values a task or subtask carries (priority and
//! status), the filter selectors used by list views, and the transient marker for
//! operations still in flight against the task service.

use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Priority classification for task importance.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, ValueEnum, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

/// Task completion status.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, ValueEnum, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Pending,
    #[serde(alias = "in-progress")]
    #[value(alias = "in_progress")]
    InProgress,
    Completed,
}

impl Status {
    /// The status a completion toggle moves to: `completed` flips back to `pending`,
    /// anything else becomes `completed`.
    pub fn toggled(self) -> Self {
        match self {
            Status::Completed => Status::Pending,
            Status::Pending | Status::InProgress => Status::Completed,
        }
    }
}

/// Status selector for task and subtask list views.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, ValueEnum, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StatusFilter {
    /// Everything not yet completed.
    #[default]
    Ongoing,
    Completed,
    All,
}

impl StatusFilter {
    /// Next selector in display order, wrapping around.
    pub fn cycle(self) -> Self {
        match self {
            StatusFilter::Ongoing => StatusFilter::Completed,
            StatusFilter::Completed => StatusFilter::All,
            StatusFilter::All => StatusFilter::Ongoing,
        }
    }
}

/// Priority selector for task list views.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, ValueEnum, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PriorityFilter {
    Low,
    Medium,
    High,
    #[default]
    All,
}

impl PriorityFilter {
    /// Whether a task with `priority` passes this selector.
    pub fn admits(self, priority: Priority) -> bool {
        match self {
            PriorityFilter::All => true,
            PriorityFilter::Low => priority == Priority::Low,
            PriorityFilter::Medium => priority == Priority::Medium,
            PriorityFilter::High => priority == Priority::High,
        }
    }

    pub fn cycle(self) -> Self {
        match self {
            PriorityFilter::All => PriorityFilter::High,
            PriorityFilter::High => PriorityFilter::Medium,
            PriorityFilter::Medium => PriorityFilter::Low,
            PriorityFilter::Low => PriorityFilter::All,
        }
    }
}

/// Remote operation currently in flight for a task entry.
///
/// Set when a mutation is sent and cleared when it resolves, whether it succeeded or not.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PendingOperation {
    #[default]
    None,
    Deleting,
    Saving,
}

impl PendingOperation {
    pub fn is_idle(self) -> bool {
        self == PendingOperation::None
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        })
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Status::Pending => "pending",
            Status::InProgress => "in_progress",
            Status::Completed => "completed",
        })
    }
}

impl fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StatusFilter::Ongoing => "ongoing",
            StatusFilter::Completed => "completed",
            StatusFilter::All => "all",
        })
    }
}

impl fmt::Display for PriorityFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PriorityFilter::Low => "low",
            PriorityFilter::Medium => "medium",
            PriorityFilter::High => "high",
            PriorityFilter::All => "all",
        })
    }
}
