//! In-memory task service used by the repository tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::Notify;

use crate::error::StoreError;
use crate::fields::*;
use crate::gateway::RemoteGateway;
use crate::task::{Subtask, SubtaskId, SubtaskPatch, Task, TaskDraft, TaskId, TaskPatch};

#[derive(Default)]
struct MockState {
    tasks: Vec<Task>,
    next_id: u64,
    calls: Vec<String>,
    failures: HashMap<&'static str, StoreError>,
    gates: HashMap<&'static str, Arc<Notify>>,
}

impl MockState {
    fn next_id(&mut self) -> String {
        self.next_id += 1;
        (100 + self.next_id).to_string()
    }

    fn task_mut(&mut self, id: &TaskId) -> Result<&mut Task, StoreError> {
        self.tasks
            .iter_mut()
            .find(|t| &t.id == id)
            .ok_or_else(|| StoreError::NotFound("Task not found".into()))
    }
}

/// Records every call and answers like the real service would. Individual operations can
/// be made to fail once (`fail_next`) or to wait for a signal before answering (`pause`).
#[derive(Default)]
pub struct MockGateway {
    state: Mutex<MockState>,
}

impl MockGateway {
    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        let gateway = MockGateway::default();
        gateway.state.lock().unwrap().tasks = tasks;
        gateway
    }

    pub fn fail_next(&self, op: &'static str, error: StoreError) {
        self.state.lock().unwrap().failures.insert(op, error);
    }

    /// Make the next `op` call wait until the returned handle is notified.
    pub fn pause(&self, op: &'static str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.state.lock().unwrap().gates.insert(op, gate.clone());
        gate
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn server_task(&self, id: &TaskId) -> Option<Task> {
        let state = self.state.lock().unwrap();
        state.tasks.iter().find(|t| &t.id == id).cloned()
    }

    /// Record the call, then wait on its gate and return its injected failure, if any.
    async fn enter(&self, op: &'static str) -> Result<(), StoreError> {
        let gate = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(op.to_string());
            state.gates.remove(op)
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }
        match self.state.lock().unwrap().failures.remove(op) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

pub fn task(id: &str, title: &str) -> Task {
    Task {
        id: TaskId::new(id),
        title: title.to_string(),
        description: None,
        priority: Priority::Medium,
        status: Status::Pending,
        due_date: None,
        created_at: None,
        updated_at: None,
        subtasks: Vec::new(),
    }
}

pub fn subtask(id: &str, title: &str, completed: bool) -> Subtask {
    Subtask {
        id: SubtaskId::Persisted(id.to_string()),
        title: title.to_string(),
        completed,
        created_at: None,
        updated_at: None,
    }
}

impl RemoteGateway for MockGateway {
    async fn list_tasks(&self) -> Result<Vec<Task>, StoreError> {
        self.enter("list_tasks").await?;
        Ok(self.state.lock().unwrap().tasks.clone())
    }

    async fn create_task(&self, draft: &TaskDraft) -> Result<Task, StoreError> {
        self.enter("create_task").await?;
        let mut state = self.state.lock().unwrap();
        let now = Utc::now().naive_utc();
        let task = Task {
            id: TaskId::new(state.next_id()),
            title: draft.title.clone(),
            description: draft.description.clone(),
            priority: draft.priority,
            status: draft.status,
            due_date: draft.due_date,
            created_at: Some(now),
            updated_at: Some(now),
            subtasks: Vec::new(),
        };
        state.tasks.push(task.clone());
        Ok(task)
    }

    async fn update_task(&self, id: &TaskId, patch: &TaskPatch) -> Result<Task, StoreError> {
        self.enter("update_task").await?;
        let mut state = self.state.lock().unwrap();
        let task = state.task_mut(id)?;
        if let Some(title) = &patch.title {
            task.title = title.clone();
        }
        if let Some(description) = &patch.description {
            task.description = Some(description.clone());
        }
        if let Some(priority) = patch.priority {
            task.priority = priority;
        }
        if let Some(status) = patch.status {
            task.status = status;
        }
        if let Some(due) = patch.due_date {
            task.due_date = Some(due);
        }
        task.updated_at = Some(Utc::now().naive_utc());
        Ok(task.clone())
    }

    async fn patch_status(&self, id: &TaskId, status: Status) -> Result<Task, StoreError> {
        self.enter("patch_status").await?;
        let mut state = self.state.lock().unwrap();
        let task = state.task_mut(id)?;
        task.status = status;
        Ok(task.clone())
    }

    async fn delete_task(&self, id: &TaskId) -> Result<(), StoreError> {
        self.enter("delete_task").await?;
        let mut state = self.state.lock().unwrap();
        state.task_mut(id)?;
        state.tasks.retain(|t| &t.id != id);
        Ok(())
    }

    async fn list_subtasks(&self, task: &TaskId) -> Result<Vec<Subtask>, StoreError> {
        self.enter("list_subtasks").await?;
        let mut state = self.state.lock().unwrap();
        Ok(state.task_mut(task)?.subtasks.clone())
    }

    async fn add_subtask(&self, task: &TaskId, title: &str) -> Result<Subtask, StoreError> {
        self.enter("add_subtask").await?;
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        let sub = subtask(&id, title, false);
        state.task_mut(task)?.subtasks.push(sub.clone());
        Ok(sub)
    }

    async fn update_subtask(
        &self,
        task: &TaskId,
        subtask: &SubtaskId,
        patch: &SubtaskPatch,
    ) -> Result<Subtask, StoreError> {
        self.enter("update_subtask").await?;
        let mut state = self.state.lock().unwrap();
        let sub = state
            .task_mut(task)?
            .subtasks
            .iter_mut()
            .find(|s| &s.id == subtask)
            .ok_or_else(|| StoreError::NotFound("Subtask not found".into()))?;
        if let Some(title) = &patch.title {
            sub.title = title.clone();
        }
        if let Some(completed) = patch.completed {
            sub.completed = completed;
        }
        Ok(sub.clone())
    }

    async fn delete_subtask(&self, task: &TaskId, subtask: &SubtaskId) -> Result<(), StoreError> {
        self.enter("delete_subtask").await?;
        let mut state = self.state.lock().unwrap();
        let subs = &mut state.task_mut(task)?.subtasks;
        let before = subs.len();
        subs.retain(|s| &s.id != subtask);
        if subs.len() == before {
            return Err(StoreError::NotFound("Subtask not found".into()));
        }
        Ok(())
    }
}
