//! The session's authoritative task list.
//!
//! `TaskRepository` mediates every task-level operation. Each mutation goes to the service
//! first and is applied locally only once the service confirms it, using the service's
//! answer as the new local state. A failed call leaves the list exactly as it was.

use std::sync::{Arc, MutexGuard};

use crate::error::StoreError;
use crate::fields::*;
use crate::filter::filter_tasks;
use crate::gateway::RemoteGateway;
use crate::store::{ParentRef, SharedStore, TaskStore};
use crate::task::{Subtask, SubtaskPatch, Task, TaskDraft, TaskId, TaskPatch};

pub struct TaskRepository<G> {
    gateway: Arc<G>,
    store: SharedStore,
}

impl<G> Clone for TaskRepository<G> {
    fn clone(&self) -> Self {
        Self {
            gateway: self.gateway.clone(),
            store: self.store.clone(),
        }
    }
}

impl<G: RemoteGateway> TaskRepository<G> {
    pub fn new(gateway: Arc<G>, store: SharedStore) -> Self {
        Self { gateway, store }
    }

    fn lock(&self) -> MutexGuard<'_, TaskStore> {
        self.store.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ── Reads ───────────────────────────────────────────────────────

    /// Current task list, in service order.
    pub fn tasks(&self) -> Vec<Task> {
        self.lock().snapshot()
    }

    pub fn get(&self, id: &TaskId) -> Option<Task> {
        self.lock().get(id).cloned()
    }

    /// Marker of the operation in flight for `id`, `None` when idle or unknown.
    pub fn pending(&self, id: &TaskId) -> PendingOperation {
        self.lock().pending(id).unwrap_or_default()
    }

    /// Tasks passing both selectors, in list order.
    pub fn visible(&self, status: StatusFilter, priority: PriorityFilter) -> Vec<Task> {
        let store = self.lock();
        filter_tasks(store.tasks(), status, priority)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn progress(&self, id: &TaskId) -> Option<u8> {
        self.lock().progress(id)
    }

    // ── Remote operations ───────────────────────────────────────────

    /// Fetch every task of the signed-in user and make it the local list.
    pub async fn load(&self) -> Result<Vec<Task>, StoreError> {
        let tasks = self.gateway.list_tasks().await?;
        self.lock().replace_all(tasks.clone());
        tracing::info!(count = tasks.len(), "loaded tasks");
        Ok(tasks)
    }

    /// Create a task from `draft` and append the service's version to the list.
    ///
    /// Local subtasks carried by the draft are created after the task, in order; the
    /// appended task holds the subtasks the service confirmed. One that fails is logged
    /// and left out.
    pub async fn create(&self, draft: TaskDraft) -> Result<Task, StoreError> {
        draft.validate()?;
        let mut task = self.gateway.create_task(&draft).await?;

        for local in &draft.subtasks {
            match self.persist_subtask(&task.id, local).await {
                Ok(saved) => task.subtasks.push(saved),
                Err(error) => {
                    tracing::warn!(task = %task.id, subtask = %local.title, %error,
                        "subtask of new task was not saved");
                    if error.is_auth() {
                        break;
                    }
                }
            }
        }

        self.lock().append(task.clone());
        tracing::info!(id = %task.id, "created task");
        Ok(task)
    }

    async fn persist_subtask(&self, task: &TaskId, local: &Subtask) -> Result<Subtask, StoreError> {
        let saved = self.gateway.add_subtask(task, local.title.trim()).await?;
        if !local.completed {
            return Ok(saved);
        }
        match self
            .gateway
            .update_subtask(task, &saved.id, &SubtaskPatch::completed(true))
            .await
        {
            Ok(updated) => Ok(updated),
            Err(error) => {
                tracing::warn!(%task, subtask = %saved.id, %error, "subtask saved as not completed");
                Ok(saved)
            }
        }
    }

    /// Start a placeholder draft (empty title, medium priority, pending) and make it the
    /// active task. Replaces any draft already open.
    pub fn open_draft(&self) {
        self.lock().open_draft();
    }

    pub fn draft(&self) -> Option<TaskDraft> {
        self.lock().draft().cloned()
    }

    /// Edit the open draft in place.
    pub fn edit_draft(&self, edit: impl FnOnce(&mut TaskDraft)) -> Result<(), StoreError> {
        let mut store = self.lock();
        let draft = store
            .draft_mut()
            .ok_or_else(|| StoreError::NotFound("no draft task is open".into()))?;
        edit(draft);
        Ok(())
    }

    pub fn discard_draft(&self) -> Option<TaskDraft> {
        self.lock().discard_draft()
    }

    /// Create the open draft. On success the draft is closed and, if it was the active
    /// task, the new task becomes active; on failure the draft stays open as it was.
    pub async fn submit_draft(&self) -> Result<Task, StoreError> {
        let draft = self
            .draft()
            .ok_or_else(|| StoreError::NotFound("no draft task is open".into()))?;
        let task = self.create(draft).await?;

        let mut store = self.lock();
        let was_active = store.active() == Some(&ParentRef::Draft);
        store.discard_draft();
        if was_active {
            store.activate(ParentRef::Task(task.id.clone()));
        }
        Ok(task)
    }

    /// Apply `patch` to a task and replace the local entry with the service's answer.
    pub async fn update(&self, id: &TaskId, patch: TaskPatch) -> Result<Task, StoreError> {
        patch.validate()?;
        self.lock().begin(id, PendingOperation::Saving)?;
        let result = self.gateway.update_task(id, &patch).await;
        self.settle(id, result)
    }

    /// Change only the status of a task.
    pub async fn set_status(&self, id: &TaskId, status: Status) -> Result<(), StoreError> {
        self.lock().begin(id, PendingOperation::Saving)?;
        let result = self.gateway.patch_status(id, status).await;
        self.settle(id, result).map(|_| ())
    }

    /// Flip a task between `completed` and `pending`. Returns the new status.
    pub async fn toggle_completed(&self, id: &TaskId) -> Result<Status, StoreError> {
        let current = self
            .get(id)
            .ok_or_else(|| StoreError::NotFound(format!("task {id}")))?
            .status;
        let next = current.toggled();
        self.set_status(id, next).await?;
        Ok(next)
    }

    /// Delete a task. The entry is marked `Deleting` while the call is in flight and only
    /// leaves the list once the service confirms.
    pub async fn remove(&self, id: &TaskId) -> Result<(), StoreError> {
        self.lock().begin(id, PendingOperation::Deleting)?;
        let result = self.gateway.delete_task(id).await;

        let mut store = self.lock();
        match result {
            Ok(()) => {
                store.remove(id);
                tracing::info!(%id, "deleted task");
                Ok(())
            }
            Err(error) => {
                store.finish(id);
                Err(error)
            }
        }
    }

    /// Clear the in-flight marker and, on success, adopt the service's version of the task.
    fn settle(&self, id: &TaskId, result: Result<Task, StoreError>) -> Result<Task, StoreError> {
        let mut store = self.lock();
        store.finish(id);
        let task = result?;
        if store.replace(task.clone()) {
            tracing::info!(%id, status = %task.status, "updated task");
        } else {
            tracing::warn!(%id, "task left the list while it was being saved; update dropped");
        }
        Ok(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::TaskStore;
    use crate::testing::{subtask, task, MockGateway};
    use pretty_assertions::assert_eq;

    fn repo_with(tasks: Vec<Task>) -> (Arc<MockGateway>, TaskRepository<MockGateway>) {
        let gateway = Arc::new(MockGateway::with_tasks(tasks));
        let repo = TaskRepository::new(gateway.clone(), TaskStore::shared());
        (gateway, repo)
    }

    async fn loaded(tasks: Vec<Task>) -> (Arc<MockGateway>, TaskRepository<MockGateway>) {
        let (gateway, repo) = repo_with(tasks);
        repo.load().await.unwrap();
        (gateway, repo)
    }

    fn server_error() -> StoreError {
        StoreError::Remote {
            status: 500,
            message: "boom".into(),
        }
    }

    #[tokio::test]
    async fn load_replaces_list_in_service_order() {
        let (_, repo) = loaded(vec![task("2", "b"), task("1", "a")]).await;
        let ids: Vec<String> = repo.tasks().iter().map(|t| t.id.to_string()).collect();
        assert_eq!(ids, vec!["2", "1"]);
    }

    #[tokio::test]
    async fn load_failure_keeps_previous_list() {
        let (gateway, repo) = loaded(vec![task("1", "a")]).await;
        gateway.fail_next("list_tasks", StoreError::Network("timed out".into()));
        assert!(matches!(repo.load().await, Err(StoreError::Network(_))));
        assert_eq!(repo.tasks().len(), 1);
    }

    #[tokio::test]
    async fn create_appends_service_task_with_defaults() {
        let (_, repo) = loaded(vec![task("1", "existing")]).await;

        let created = repo.create(TaskDraft::new("X")).await.unwrap();

        let tasks = repo.tasks();
        assert_eq!(tasks.len(), 2);
        let new: Vec<&Task> = tasks.iter().filter(|t| t.title == "X").collect();
        assert_eq!(new.len(), 1);
        assert_eq!(new[0].status, Status::Pending);
        assert_eq!(new[0].priority, Priority::Medium);
        assert_eq!(new[0].id, created.id);
        assert_eq!(tasks.last().unwrap().id, created.id);
        assert!(created.created_at.is_some());
    }

    #[tokio::test]
    async fn create_with_blank_title_never_calls_service() {
        let (gateway, repo) = repo_with(Vec::new());
        let err = repo.create(TaskDraft::new("  ")).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert!(gateway.calls().is_empty());
        assert!(repo.tasks().is_empty());
    }

    #[tokio::test]
    async fn create_failure_leaves_list_unchanged() {
        let (gateway, repo) = loaded(vec![task("1", "a")]).await;
        let before = repo.tasks();
        gateway.fail_next("create_task", server_error());
        assert!(repo.create(TaskDraft::new("X")).await.is_err());
        assert_eq!(repo.tasks(), before);
    }

    #[tokio::test]
    async fn submit_draft_persists_local_subtasks_in_order() {
        let (gateway, repo) = repo_with(Vec::new());
        repo.open_draft();
        {
            let mut store = repo.store.lock().unwrap();
            for title in ["first", "second"] {
                let n = store.next_local_id();
                let mut local = Subtask::local(n, title);
                local.completed = title == "second";
                store.push_subtask(&ParentRef::Draft, local);
            }
        }
        repo.edit_draft(|d| d.title = "with children".into()).unwrap();

        let task = repo.submit_draft().await.unwrap();

        let titles: Vec<&str> = task.subtasks.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["first", "second"]);
        assert!(task.subtasks.iter().all(|s| !s.id.is_local()));
        assert_eq!(
            task.subtasks.iter().map(|s| s.completed).collect::<Vec<_>>(),
            vec![false, true]
        );
        assert_eq!(repo.draft(), None);
        assert_eq!(
            repo.store.lock().unwrap().active(),
            Some(&ParentRef::Task(task.id.clone()))
        );
        assert_eq!(gateway.server_task(&task.id).unwrap().subtasks, task.subtasks);
    }

    #[tokio::test]
    async fn submit_draft_failure_keeps_draft_open() {
        let (gateway, repo) = repo_with(Vec::new());
        repo.open_draft();
        repo.edit_draft(|d| d.title = "keep me".into()).unwrap();
        gateway.fail_next("create_task", server_error());

        assert!(repo.submit_draft().await.is_err());
        assert_eq!(repo.draft().unwrap().title, "keep me");
        assert!(repo.tasks().is_empty());
    }

    #[tokio::test]
    async fn failed_child_is_left_out_of_new_task() {
        let (gateway, repo) = repo_with(Vec::new());
        let mut draft = TaskDraft::new("parent");
        draft.subtasks.push(Subtask::local(1, "lost"));
        draft.subtasks.push(Subtask::local(2, "kept"));
        gateway.fail_next("add_subtask", server_error());

        let task = repo.create(draft).await.unwrap();
        assert_eq!(task.subtasks.len(), 1);
        assert_eq!(task.subtasks[0].title, "kept");
        assert_eq!(repo.get(&task.id).unwrap(), task);
    }

    #[tokio::test]
    async fn update_replaces_entry_with_service_answer() {
        let (_, repo) = loaded(vec![task("1", "a"), task("2", "b")]).await;
        let patch = TaskPatch {
            title: Some("renamed".into()),
            priority: Some(Priority::High),
            ..TaskPatch::default()
        };

        let updated = repo.update(&TaskId::new("2"), patch).await.unwrap();

        assert_eq!(updated.title, "renamed");
        let tasks = repo.tasks();
        assert_eq!(tasks[1], updated);
        assert_eq!(tasks[0].title, "a");
        assert_eq!(repo.pending(&TaskId::new("2")), PendingOperation::None);
    }

    #[tokio::test]
    async fn update_unknown_id_is_not_found_locally() {
        let (gateway, repo) = loaded(vec![task("1", "a")]).await;
        let err = repo
            .update(&TaskId::new("9"), TaskPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert_eq!(gateway.calls(), vec!["list_tasks"]);
    }

    #[tokio::test]
    async fn update_failure_clears_marker_and_keeps_entry() {
        let (gateway, repo) = loaded(vec![task("1", "a")]).await;
        let before = repo.tasks();
        gateway.fail_next("update_task", server_error());
        let patch = TaskPatch {
            title: Some("b".into()),
            ..TaskPatch::default()
        };
        assert!(repo.update(&TaskId::new("1"), patch).await.is_err());
        assert_eq!(repo.tasks(), before);
        assert_eq!(repo.pending(&TaskId::new("1")), PendingOperation::None);
    }

    #[tokio::test]
    async fn set_status_applies_after_confirmation() {
        let (_, repo) = loaded(vec![task("1", "a")]).await;
        repo.set_status(&TaskId::new("1"), Status::InProgress)
            .await
            .unwrap();
        assert_eq!(repo.get(&TaskId::new("1")).unwrap().status, Status::InProgress);
    }

    #[tokio::test]
    async fn toggle_flips_completed_and_pending() {
        let (_, repo) = loaded(vec![task("1", "a")]).await;
        let id = TaskId::new("1");
        assert_eq!(repo.toggle_completed(&id).await.unwrap(), Status::Completed);
        assert_eq!(repo.toggle_completed(&id).await.unwrap(), Status::Pending);
        assert_eq!(repo.get(&id).unwrap().status, Status::Pending);
    }

    #[tokio::test]
    async fn completing_a_task_does_not_touch_subtasks() {
        let mut parent = task("1", "a");
        parent.subtasks = vec![subtask("10", "x", false)];
        let (_, repo) = loaded(vec![parent]).await;
        let id = TaskId::new("1");

        repo.set_status(&id, Status::Completed).await.unwrap();
        let after = repo.get(&id).unwrap();
        assert!(after.is_completed());
        assert!(!after.subtasks[0].completed);
        assert_eq!(repo.progress(&id), Some(0));
    }

    #[tokio::test]
    async fn set_status_failure_leaves_status() {
        let (gateway, repo) = loaded(vec![task("1", "a")]).await;
        gateway.fail_next("patch_status", StoreError::Network("reset".into()));
        assert!(repo
            .set_status(&TaskId::new("1"), Status::Completed)
            .await
            .is_err());
        assert_eq!(repo.get(&TaskId::new("1")).unwrap().status, Status::Pending);
    }

    #[tokio::test]
    async fn remove_drops_entry_after_confirmation() {
        let (gateway, repo) = loaded(vec![task("1", "a"), task("2", "b")]).await;
        repo.remove(&TaskId::new("1")).await.unwrap();
        let ids: Vec<String> = repo.tasks().iter().map(|t| t.id.to_string()).collect();
        assert_eq!(ids, vec!["2"]);
        assert!(gateway.server_task(&TaskId::new("1")).is_none());
    }

    #[tokio::test]
    async fn failed_remove_leaves_list_identical() {
        let mut first = task("1", "a");
        first.subtasks = vec![subtask("10", "x", true)];
        let (gateway, repo) = loaded(vec![first, task("2", "b")]).await;
        let before = repo.tasks();
        let entries_before = repo.store.lock().unwrap().entries().to_vec();

        gateway.fail_next("delete_task", server_error());
        let err = repo.remove(&TaskId::new("1")).await.unwrap_err();

        assert_eq!(err, server_error());
        assert_eq!(repo.tasks(), before);
        assert_eq!(repo.store.lock().unwrap().entries().to_vec(), entries_before);
    }

    #[tokio::test]
    async fn entry_is_marked_deleting_while_in_flight() {
        let (gateway, repo) = loaded(vec![task("1", "a")]).await;
        let id = TaskId::new("1");
        let gate = gateway.pause("delete_task");

        let removing = repo.remove(&id);
        let observe = async {
            tokio::task::yield_now().await;
            let seen = repo.pending(&id);
            let second = repo.remove(&id).await;
            gate.notify_one();
            (seen, second)
        };
        let (first, (seen, second)) = tokio::join!(removing, observe);

        assert_eq!(seen, PendingOperation::Deleting);
        assert!(matches!(second, Err(StoreError::Validation(_))));
        assert!(first.is_ok());
        assert!(repo.get(&id).is_none());
        assert_eq!(
            gateway.calls().iter().filter(|c| *c == "delete_task").count(),
            1
        );
    }

    #[tokio::test]
    async fn auth_failure_propagates_and_keeps_state() {
        let (gateway, repo) = loaded(vec![task("1", "a")]).await;
        gateway.fail_next("delete_task", StoreError::Auth("Token has expired".into()));
        let err = repo.remove(&TaskId::new("1")).await.unwrap_err();
        assert!(err.is_auth());
        assert_eq!(repo.tasks().len(), 1);
    }

    #[tokio::test]
    async fn visible_applies_both_filters() {
        let mut high = task("1", "a");
        high.priority = Priority::High;
        let mut done_high = task("2", "b");
        done_high.priority = Priority::High;
        done_high.status = Status::Completed;
        let (_, repo) = loaded(vec![high, done_high, task("3", "c")]).await;

        let ids = |tasks: Vec<Task>| -> Vec<String> {
            tasks.iter().map(|t| t.id.to_string()).collect()
        };
        assert_eq!(
            ids(repo.visible(StatusFilter::All, PriorityFilter::High)),
            vec!["1", "2"]
        );
        assert_eq!(
            ids(repo.visible(StatusFilter::Ongoing, PriorityFilter::All)),
            vec!["1", "3"]
        );
    }
}
