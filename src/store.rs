//! In-memory state shared by the task and subtask repositories.
//!
//! `TaskStore` keeps one ordered list of task entries. Each entry owns its task, including
//! the task's subtasks, so there is exactly one copy of every subtask; the "active task"
//! subtask list is a view computed from the entry it points at. The store also holds the
//! single open draft (a task not yet sent to the service) and the transient
//! `PendingOperation` marker of every entry.
//!
//! The store itself never talks to the service. Repositories lock it briefly before and
//! after each remote call, never across one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::StoreError;
use crate::fields::*;
use crate::filter::compute_progress;
use crate::task::{Subtask, SubtaskId, Task, TaskDraft, TaskId};

pub type SharedStore = Arc<Mutex<TaskStore>>;

/// The task a subtask operation addresses.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParentRef {
    /// The open draft, which has no service id yet.
    Draft,
    Task(TaskId),
}

impl From<TaskId> for ParentRef {
    fn from(id: TaskId) -> Self {
        ParentRef::Task(id)
    }
}

/// A task as held locally, with the marker of any remote operation in flight for it.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskEntry {
    pub task: Task,
    pub pending: PendingOperation,
}

#[derive(Debug, Default)]
pub struct TaskStore {
    entries: Vec<TaskEntry>,
    draft: Option<TaskDraft>,
    active: Option<ParentRef>,
    /// Bumped every time the active task changes.
    generation: u64,
    next_local_id: u64,
}

impl TaskStore {
    pub fn shared() -> SharedStore {
        Arc::new(Mutex::new(TaskStore::default()))
    }

    // ── Tasks ───────────────────────────────────────────────────────

    pub fn entries(&self) -> &[TaskEntry] {
        &self.entries
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.entries.iter().map(|e| &e.task)
    }

    /// Owned copy of the task list, in display order.
    pub fn snapshot(&self) -> Vec<Task> {
        self.tasks().cloned().collect()
    }

    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.entry(id).map(|e| &e.task)
    }

    pub fn entry(&self, id: &TaskId) -> Option<&TaskEntry> {
        self.entries.iter().find(|e| &e.task.id == id)
    }

    fn entry_mut(&mut self, id: &TaskId) -> Option<&mut TaskEntry> {
        self.entries.iter_mut().find(|e| &e.task.id == id)
    }

    pub fn pending(&self, id: &TaskId) -> Option<PendingOperation> {
        self.entry(id).map(|e| e.pending)
    }

    /// Replace the whole list with a fresh one from the service. Markers of operations
    /// still in flight survive for tasks that are still present.
    pub fn replace_all(&mut self, tasks: Vec<Task>) {
        let pending: HashMap<TaskId, PendingOperation> = self
            .entries
            .iter()
            .filter(|e| !e.pending.is_idle())
            .map(|e| (e.task.id.clone(), e.pending))
            .collect();
        self.entries = tasks
            .into_iter()
            .map(|task| TaskEntry {
                pending: pending.get(&task.id).copied().unwrap_or_default(),
                task,
            })
            .collect();
        let active_gone =
            matches!(&self.active, Some(ParentRef::Task(id)) if self.entry(id).is_none());
        if active_gone {
            self.deactivate();
        }
    }

    pub fn append(&mut self, task: Task) {
        self.entries.push(TaskEntry {
            task,
            pending: PendingOperation::None,
        });
    }

    /// Swap in a newer version of a task, keeping its position. Returns `false` when the
    /// task is no longer held.
    pub fn replace(&mut self, task: Task) -> bool {
        match self.entry_mut(&task.id) {
            Some(entry) => {
                entry.task = task;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: &TaskId) -> Option<Task> {
        let idx = self.entries.iter().position(|e| &e.task.id == id)?;
        let entry = self.entries.remove(idx);
        if self.active.as_ref() == Some(&ParentRef::Task(id.clone())) {
            self.deactivate();
        }
        Some(entry.task)
    }

    /// Mark `op` as in flight for `id`. Fails if the task is unknown or another operation
    /// is already in flight for it.
    pub fn begin(&mut self, id: &TaskId, op: PendingOperation) -> Result<(), StoreError> {
        let entry = self
            .entry_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("task {id}")))?;
        match entry.pending {
            PendingOperation::None => {
                entry.pending = op;
                Ok(())
            }
            PendingOperation::Deleting => {
                Err(StoreError::Validation(format!("task {id} is being deleted")))
            }
            PendingOperation::Saving => {
                Err(StoreError::Validation(format!("task {id} is being saved")))
            }
        }
    }

    /// Clear the in-flight marker for `id`, if the task is still held.
    pub fn finish(&mut self, id: &TaskId) {
        if let Some(entry) = self.entry_mut(id) {
            entry.pending = PendingOperation::None;
        }
    }

    pub fn progress(&self, id: &TaskId) -> Option<u8> {
        self.get(id).map(|t| compute_progress(&t.subtasks))
    }

    // ── Active task ─────────────────────────────────────────────────

    pub fn active(&self) -> Option<&ParentRef> {
        self.active.as_ref()
    }

    /// Make `parent` the active task and return the new generation.
    pub fn activate(&mut self, parent: ParentRef) -> u64 {
        self.active = Some(parent);
        self.generation += 1;
        self.generation
    }

    pub fn deactivate(&mut self) {
        if self.active.take().is_some() {
            self.generation += 1;
        }
    }

    /// Whether `parent` is still the active task as of `generation`.
    pub fn is_current(&self, parent: &ParentRef, generation: u64) -> bool {
        self.generation == generation && self.active.as_ref() == Some(parent)
    }

    /// Subtasks of the active task (empty when nothing is active).
    pub fn active_subtasks(&self) -> &[Subtask] {
        self.active
            .as_ref()
            .and_then(|p| self.subtasks_of(p))
            .unwrap_or_default()
    }

    // ── Subtasks ────────────────────────────────────────────────────

    pub fn subtasks_of(&self, parent: &ParentRef) -> Option<&[Subtask]> {
        match parent {
            ParentRef::Draft => self.draft.as_ref().map(|d| d.subtasks.as_slice()),
            ParentRef::Task(id) => self.get(id).map(|t| t.subtasks.as_slice()),
        }
    }

    fn subtasks_mut(&mut self, parent: &ParentRef) -> Option<&mut Vec<Subtask>> {
        match parent {
            ParentRef::Draft => self.draft.as_mut().map(|d| &mut d.subtasks),
            ParentRef::Task(id) => self.entry_mut(id).map(|e| &mut e.task.subtasks),
        }
    }

    pub fn set_subtasks(&mut self, parent: &ParentRef, subtasks: Vec<Subtask>) -> bool {
        match self.subtasks_mut(parent) {
            Some(slot) => {
                *slot = subtasks;
                true
            }
            None => false,
        }
    }

    pub fn push_subtask(&mut self, parent: &ParentRef, subtask: Subtask) -> bool {
        match self.subtasks_mut(parent) {
            Some(list) => {
                list.push(subtask);
                true
            }
            None => false,
        }
    }

    /// Replace the subtask with the same id, in place.
    pub fn replace_subtask(&mut self, parent: &ParentRef, subtask: Subtask) -> bool {
        let Some(list) = self.subtasks_mut(parent) else {
            return false;
        };
        match list.iter_mut().find(|s| s.id == subtask.id) {
            Some(slot) => {
                *slot = subtask;
                true
            }
            None => false,
        }
    }

    pub fn remove_subtask(&mut self, parent: &ParentRef, id: &SubtaskId) -> Option<Subtask> {
        let list = self.subtasks_mut(parent)?;
        let idx = list.iter().position(|s| &s.id == id)?;
        Some(list.remove(idx))
    }

    // ── Draft ───────────────────────────────────────────────────────

    /// Start a new placeholder draft and make it the active task. Any previous draft is
    /// discarded.
    pub fn open_draft(&mut self) -> u64 {
        self.draft = Some(TaskDraft::default());
        self.activate(ParentRef::Draft)
    }

    pub fn draft(&self) -> Option<&TaskDraft> {
        self.draft.as_ref()
    }

    pub fn draft_mut(&mut self) -> Option<&mut TaskDraft> {
        self.draft.as_mut()
    }

    /// Drop the draft. If it was active, nothing is active afterwards.
    pub fn discard_draft(&mut self) -> Option<TaskDraft> {
        if self.active == Some(ParentRef::Draft) {
            self.deactivate();
        }
        self.draft.take()
    }

    /// Next client-local subtask id. Never reused within a store.
    pub fn next_local_id(&mut self) -> u64 {
        self.next_local_id += 1;
        self.next_local_id
    }
}
