//! Subtasks of the active task.
//!
//! A task's subtasks live inside its entry in the shared store, so the "active subtask
//! list" is only a view of whichever task is expanded or being edited; every write lands in
//! that one place. Subtasks of the open draft are kept locally with `Local` ids until the
//! draft is submitted.

use std::sync::{Arc, MutexGuard};

use crate::error::StoreError;
use crate::fields::StatusFilter;
use crate::filter::{compute_progress, filter_subtasks};
use crate::gateway::RemoteGateway;
use crate::store::{ParentRef, SharedStore, TaskStore};
use crate::task::{Subtask, SubtaskId, SubtaskPatch, TaskId};

pub struct SubtaskRepository<G> {
    gateway: Arc<G>,
    store: SharedStore,
}

impl<G> Clone for SubtaskRepository<G> {
    fn clone(&self) -> Self {
        Self {
            gateway: self.gateway.clone(),
            store: self.store.clone(),
        }
    }
}

impl<G: RemoteGateway> SubtaskRepository<G> {
    pub fn new(gateway: Arc<G>, store: SharedStore) -> Self {
        Self { gateway, store }
    }

    fn lock(&self) -> MutexGuard<'_, TaskStore> {
        self.store.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ── Active task ─────────────────────────────────────────────────

    pub fn active(&self) -> Option<ParentRef> {
        self.lock().active().cloned()
    }

    /// Make `parent` the active task without fetching anything.
    pub fn activate(&self, parent: ParentRef) {
        self.lock().activate(parent);
    }

    pub fn deactivate(&self) {
        self.lock().deactivate();
    }

    pub fn active_subtasks(&self) -> Vec<Subtask> {
        self.lock().active_subtasks().to_vec()
    }

    /// Active subtasks passing `filter`, in creation order.
    pub fn visible(&self, filter: StatusFilter) -> Vec<Subtask> {
        let store = self.lock();
        filter_subtasks(store.active_subtasks(), filter)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn active_progress(&self) -> u8 {
        compute_progress(self.lock().active_subtasks())
    }

    pub fn subtasks_of(&self, parent: &ParentRef) -> Option<Vec<Subtask>> {
        self.lock().subtasks_of(parent).map(<[Subtask]>::to_vec)
    }

    // ── Operations ──────────────────────────────────────────────────

    /// Make `id` the active task and refresh its subtasks from the service.
    ///
    /// If another task is activated before the answer arrives, the answer is dropped and
    /// the subtasks of the task that is active now are returned instead.
    pub async fn load_for_task(&self, id: &TaskId) -> Result<Vec<Subtask>, StoreError> {
        let parent = ParentRef::Task(id.clone());
        let generation = {
            let mut store = self.lock();
            if store.get(id).is_none() {
                return Err(StoreError::NotFound(format!("task {id}")));
            }
            store.activate(parent.clone())
        };

        let subtasks = self.gateway.list_subtasks(id).await?;

        let mut store = self.lock();
        if store.is_current(&parent, generation) {
            store.set_subtasks(&parent, subtasks.clone());
            tracing::debug!(task = %id, count = subtasks.len(), "loaded subtasks");
            Ok(subtasks)
        } else {
            tracing::warn!(task = %id, "active task changed while loading subtasks; result dropped");
            Ok(store.active_subtasks().to_vec())
        }
    }

    /// Append a subtask titled `title` (trimmed) to `parent`.
    pub async fn add(&self, parent: &ParentRef, title: &str) -> Result<Subtask, StoreError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(StoreError::Validation("subtask title is required".into()));
        }

        let id = match parent {
            ParentRef::Draft => {
                let mut store = self.lock();
                if store.draft().is_none() {
                    return Err(StoreError::NotFound("no draft task is open".into()));
                }
                let n = store.next_local_id();
                let subtask = Subtask::local(n, title);
                store.push_subtask(parent, subtask.clone());
                return Ok(subtask);
            }
            ParentRef::Task(id) => id,
        };

        self.ensure_task(id)?;
        let subtask = self.gateway.add_subtask(id, title).await?;
        if self.lock().push_subtask(parent, subtask.clone()) {
            tracing::info!(task = %id, subtask = %subtask.id, "added subtask");
        } else {
            tracing::warn!(task = %id, "task left the list before its new subtask arrived");
        }
        Ok(subtask)
    }

    /// Flip `completed` on a subtask. The service is sent the new value.
    pub async fn toggle(&self, parent: &ParentRef, id: &SubtaskId) -> Result<Subtask, StoreError> {
        let current = self.find(parent, id)?;
        let patch = SubtaskPatch::completed(!current.completed);
        self.apply(parent, current, patch).await
    }

    pub async fn rename(
        &self,
        parent: &ParentRef,
        id: &SubtaskId,
        title: &str,
    ) -> Result<Subtask, StoreError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(StoreError::Validation("subtask title is required".into()));
        }
        let current = self.find(parent, id)?;
        let patch = SubtaskPatch {
            title: Some(title.to_string()),
            completed: None,
        };
        self.apply(parent, current, patch).await
    }

    pub async fn remove(&self, parent: &ParentRef, id: &SubtaskId) -> Result<(), StoreError> {
        self.find(parent, id)?;
        if let ParentRef::Task(task) = parent {
            self.gateway.delete_subtask(task, id).await?;
        }
        if self.lock().remove_subtask(parent, id).is_some() {
            tracing::info!(subtask = %id, "removed subtask");
        }
        Ok(())
    }

    fn ensure_task(&self, id: &TaskId) -> Result<(), StoreError> {
        match self.lock().get(id) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(format!("task {id}"))),
        }
    }

    fn find(&self, parent: &ParentRef, id: &SubtaskId) -> Result<Subtask, StoreError> {
        let store = self.lock();
        let subtasks = store.subtasks_of(parent).ok_or_else(|| match parent {
            ParentRef::Draft => StoreError::NotFound("no draft task is open".into()),
            ParentRef::Task(task) => StoreError::NotFound(format!("task {task}")),
        })?;
        subtasks
            .iter()
            .find(|s| &s.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("subtask {id}")))
    }

    /// Apply `patch` to `current`: locally for draft subtasks, through the service otherwise.
    async fn apply(
        &self,
        parent: &ParentRef,
        current: Subtask,
        patch: SubtaskPatch,
    ) -> Result<Subtask, StoreError> {
        let updated = match parent {
            ParentRef::Draft => Subtask {
                title: patch.title.unwrap_or(current.title),
                completed: patch.completed.unwrap_or(current.completed),
                ..current
            },
            ParentRef::Task(task) => {
                self.gateway
                    .update_subtask(task, &current.id, &patch)
                    .await?
            }
        };

        if self.lock().replace_subtask(parent, updated.clone()) {
            tracing::info!(subtask = %updated.id, completed = updated.completed, "updated subtask");
        } else {
            tracing::warn!(subtask = %updated.id, "subtask left the list while it was being saved");
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Task;
    use crate::task_repo::TaskRepository;
    use crate::testing::{subtask, task, MockGateway};
    use pretty_assertions::assert_eq;

    struct Fixture {
        gateway: Arc<MockGateway>,
        tasks: TaskRepository<MockGateway>,
        subtasks: SubtaskRepository<MockGateway>,
    }

    async fn fixture(tasks: Vec<Task>) -> Fixture {
        let gateway = Arc::new(MockGateway::with_tasks(tasks));
        let store = TaskStore::shared();
        let fixture = Fixture {
            tasks: TaskRepository::new(gateway.clone(), store.clone()),
            subtasks: SubtaskRepository::new(gateway.clone(), store),
            gateway,
        };
        fixture.tasks.load().await.unwrap();
        fixture
    }

    fn with_children(id: &str, children: Vec<Subtask>) -> Task {
        let mut parent = task(id, "parent");
        parent.subtasks = children;
        parent
    }

    fn persisted(id: &str) -> SubtaskId {
        SubtaskId::Persisted(id.to_string())
    }

    #[tokio::test]
    async fn load_for_task_activates_and_returns_subtasks() {
        let f = fixture(vec![with_children("1", vec![subtask("10", "a", false)])]).await;
        let id = TaskId::new("1");

        let loaded = f.subtasks.load_for_task(&id).await.unwrap();

        assert_eq!(loaded.len(), 1);
        assert_eq!(f.subtasks.active(), Some(ParentRef::Task(id)));
        assert_eq!(f.subtasks.active_subtasks(), loaded);
    }

    #[tokio::test]
    async fn load_for_unknown_task_is_not_found() {
        let f = fixture(Vec::new()).await;
        let err = f.subtasks.load_for_task(&TaskId::new("7")).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert_eq!(f.gateway.calls(), vec!["list_tasks"]);
    }

    #[tokio::test]
    async fn stale_load_is_dropped_after_switching_tasks() {
        let f = fixture(vec![
            with_children("1", vec![subtask("10", "from a", false)]),
            with_children("2", vec![subtask("20", "from b", true)]),
        ])
        .await;
        let a = TaskId::new("1");
        let b = TaskId::new("2");
        let gate = f.gateway.pause("list_subtasks");

        let slow = f.subtasks.load_for_task(&a);
        let switch = async {
            tokio::task::yield_now().await;
            let loaded = f.subtasks.load_for_task(&b).await;
            gate.notify_one();
            loaded
        };
        let (stale, fresh) = tokio::join!(slow, switch);

        let fresh = fresh.unwrap();
        assert_eq!(fresh[0].title, "from b");
        assert_eq!(stale.unwrap(), fresh);
        assert_eq!(f.subtasks.active(), Some(ParentRef::Task(b)));
        assert_eq!(f.subtasks.active_subtasks()[0].title, "from b");
    }

    #[tokio::test]
    async fn blank_title_never_reaches_the_service() {
        let f = fixture(vec![task("1", "a")]).await;
        let parent = ParentRef::Task(TaskId::new("1"));

        let err = f.subtasks.add(&parent, "  ").await.unwrap_err();

        assert!(matches!(err, StoreError::Validation(_)));
        assert_eq!(f.gateway.calls(), vec!["list_tasks"]);
        assert!(f.tasks.get(&TaskId::new("1")).unwrap().subtasks.is_empty());
    }

    #[tokio::test]
    async fn draft_adds_get_distinct_local_ids_in_order() {
        let f = fixture(Vec::new()).await;
        f.tasks.open_draft();

        let first = f.subtasks.add(&ParentRef::Draft, "first").await.unwrap();
        let second = f.subtasks.add(&ParentRef::Draft, " second ").await.unwrap();

        assert!(first.id.is_local() && second.id.is_local());
        assert_ne!(first.id, second.id);
        let titles: Vec<String> = f
            .subtasks
            .active_subtasks()
            .into_iter()
            .map(|s| s.title)
            .collect();
        assert_eq!(titles, vec!["first", "second"]);
        assert_eq!(f.gateway.calls(), vec!["list_tasks"]);
    }

    #[tokio::test]
    async fn add_without_open_draft_fails() {
        let f = fixture(Vec::new()).await;
        let err = f.subtasks.add(&ParentRef::Draft, "x").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn add_to_persisted_task_appends_server_subtask() {
        let f = fixture(vec![with_children("1", vec![subtask("10", "a", true)])]).await;
        let id = TaskId::new("1");
        f.subtasks.load_for_task(&id).await.unwrap();

        let added = f.subtasks.add(&ParentRef::Task(id.clone()), "b").await.unwrap();

        assert!(!added.id.is_local());
        assert!(!added.completed);
        let parent = f.tasks.get(&id).unwrap();
        assert_eq!(parent.subtasks.last(), Some(&added));
        assert_eq!(f.subtasks.active_subtasks(), parent.subtasks);
        assert_eq!(f.subtasks.active_progress(), 50);
    }

    #[tokio::test]
    async fn toggle_writes_through_to_the_task() {
        let f = fixture(vec![with_children(
            "1",
            vec![subtask("10", "a", false), subtask("11", "b", false)],
        )])
        .await;
        let id = TaskId::new("1");
        let parent = ParentRef::Task(id.clone());
        f.subtasks.load_for_task(&id).await.unwrap();

        let toggled = f.subtasks.toggle(&parent, &persisted("11")).await.unwrap();

        assert!(toggled.completed);
        let embedded = f.tasks.get(&id).unwrap().subtasks;
        assert_eq!(embedded, f.subtasks.active_subtasks());
        assert!(!embedded[0].completed);
        assert!(embedded[1].completed);
        assert_eq!(f.tasks.progress(&id), Some(50));
        assert!(f
            .gateway
            .server_task(&id)
            .unwrap()
            .subtask(&persisted("11"))
            .unwrap()
            .completed);
    }

    #[tokio::test]
    async fn failed_toggle_leaves_subtask_unchanged() {
        let f = fixture(vec![with_children("1", vec![subtask("10", "a", false)])]).await;
        let id = TaskId::new("1");
        let parent = ParentRef::Task(id.clone());
        f.subtasks.load_for_task(&id).await.unwrap();
        f.gateway.fail_next(
            "update_subtask",
            StoreError::Remote {
                status: 500,
                message: "boom".into(),
            },
        );

        assert!(f.subtasks.toggle(&parent, &persisted("10")).await.is_err());
        assert!(!f.subtasks.active_subtasks()[0].completed);
        assert_eq!(f.subtasks.active_progress(), 0);
    }

    #[tokio::test]
    async fn draft_toggle_and_remove_stay_local() {
        let f = fixture(Vec::new()).await;
        f.tasks.open_draft();
        let a = f.subtasks.add(&ParentRef::Draft, "a").await.unwrap();
        let b = f.subtasks.add(&ParentRef::Draft, "b").await.unwrap();

        let toggled = f.subtasks.toggle(&ParentRef::Draft, &a.id).await.unwrap();
        assert!(toggled.completed);
        f.subtasks.remove(&ParentRef::Draft, &b.id).await.unwrap();

        let left = f.subtasks.subtasks_of(&ParentRef::Draft).unwrap();
        assert_eq!(left, vec![toggled]);
        assert_eq!(f.gateway.calls(), vec!["list_tasks"]);
    }

    #[tokio::test]
    async fn rename_trims_and_replaces() {
        let f = fixture(vec![with_children("1", vec![subtask("10", "a", true)])]).await;
        let parent = ParentRef::Task(TaskId::new("1"));

        let renamed = f
            .subtasks
            .rename(&parent, &persisted("10"), "  renamed ")
            .await
            .unwrap();

        assert_eq!(renamed.title, "renamed");
        assert!(renamed.completed);
        assert_eq!(f.tasks.get(&TaskId::new("1")).unwrap().subtasks, vec![renamed]);
    }

    #[tokio::test]
    async fn remove_deletes_remotely_then_locally() {
        let f = fixture(vec![with_children(
            "1",
            vec![subtask("10", "a", false), subtask("11", "b", true)],
        )])
        .await;
        let id = TaskId::new("1");
        f.subtasks.load_for_task(&id).await.unwrap();

        f.subtasks
            .remove(&ParentRef::Task(id.clone()), &persisted("10"))
            .await
            .unwrap();

        let ids: Vec<String> = f
            .subtasks
            .active_subtasks()
            .iter()
            .map(|s| s.id.to_string())
            .collect();
        assert_eq!(ids, vec!["11"]);
        assert_eq!(f.tasks.progress(&id), Some(100));
        assert_eq!(f.gateway.server_task(&id).unwrap().subtasks.len(), 1);
    }

    #[tokio::test]
    async fn failed_remove_keeps_subtask() {
        let f = fixture(vec![with_children("1", vec![subtask("10", "a", false)])]).await;
        let parent = ParentRef::Task(TaskId::new("1"));
        f.gateway
            .fail_next("delete_subtask", StoreError::Network("reset".into()));

        assert!(f.subtasks.remove(&parent, &persisted("10")).await.is_err());
        assert_eq!(f.subtasks.subtasks_of(&parent).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_subtask_is_not_found_without_remote_call() {
        let f = fixture(vec![task("1", "a")]).await;
        let err = f
            .subtasks
            .toggle(&ParentRef::Task(TaskId::new("1")), &persisted("99"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert_eq!(f.gateway.calls(), vec!["list_tasks"]);
    }

    #[tokio::test]
    async fn visible_filters_active_subtasks() {
        let f = fixture(vec![with_children(
            "1",
            vec![subtask("10", "a", false), subtask("11", "b", true)],
        )])
        .await;
        f.subtasks.load_for_task(&TaskId::new("1")).await.unwrap();

        let done = f.subtasks.visible(StatusFilter::Completed);
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].title, "b");
        assert_eq!(f.subtasks.visible(StatusFilter::All).len(), 2);
    }

    #[tokio::test]
    async fn submitted_draft_becomes_active_with_persisted_children() {
        let f = fixture(Vec::new()).await;
        f.tasks.open_draft();
        f.tasks.edit_draft(|d| d.title = "trip".into()).unwrap();
        let local = f.subtasks.add(&ParentRef::Draft, "pack").await.unwrap();
        f.subtasks.toggle(&ParentRef::Draft, &local.id).await.unwrap();

        let created = f.tasks.submit_draft().await.unwrap();

        assert_eq!(f.subtasks.active(), Some(ParentRef::Task(created.id.clone())));
        let active = f.subtasks.active_subtasks();
        assert_eq!(active.len(), 1);
        assert!(!active[0].id.is_local());
        assert!(active[0].completed);
        assert_eq!(f.subtasks.active_progress(), 100);
    }
}
