//! Derived views over tasks and subtasks.
//!
//! Everything here borrows its input and returns a new selection; stored entities are never
//! touched. Filters are stable: surviving items keep their input order.

use crate::fields::*;
use crate::task::{Subtask, Task};

/// Tasks passing both the status and the priority selector, in input order.
pub fn filter_tasks<'a>(
    tasks: impl IntoIterator<Item = &'a Task>,
    status: StatusFilter,
    priority: PriorityFilter,
) -> Vec<&'a Task> {
    tasks
        .into_iter()
        .filter(|t| status_admits(status, t.is_completed()))
        .filter(|t| priority.admits(t.priority))
        .collect()
}

/// Subtasks passing the status selector, keyed on their `completed` flag.
pub fn filter_subtasks<'a>(
    subtasks: impl IntoIterator<Item = &'a Subtask>,
    status: StatusFilter,
) -> Vec<&'a Subtask> {
    subtasks
        .into_iter()
        .filter(|s| status_admits(status, s.completed))
        .collect()
}

/// Percentage of completed subtasks, rounded to the nearest integer (halves round up).
/// Zero when there are no subtasks.
pub fn compute_progress(subtasks: &[Subtask]) -> u8 {
    let total = subtasks.len();
    if total == 0 {
        return 0;
    }
    let done = subtasks.iter().filter(|s| s.completed).count();
    ((200 * done + total) / (2 * total)) as u8
}

fn status_admits(filter: StatusFilter, completed: bool) -> bool {
    match filter {
        StatusFilter::Ongoing => !completed,
        StatusFilter::Completed => completed,
        StatusFilter::All => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskId;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn task(id: &str, status: Status, priority: Priority) -> Task {
        Task {
            id: TaskId::new(id),
            title: format!("task {id}"),
            description: None,
            priority,
            status,
            due_date: None,
            created_at: None,
            updated_at: None,
            subtasks: Vec::new(),
        }
    }

    fn subtasks(flags: &[bool]) -> Vec<Subtask> {
        flags
            .iter()
            .enumerate()
            .map(|(i, &done)| {
                let mut s = Subtask::local(i as u64, format!("sub {i}"));
                s.completed = done;
                s
            })
            .collect()
    }

    fn sample() -> Vec<Task> {
        vec![
            task("1", Status::Pending, Priority::High),
            task("2", Status::Completed, Priority::High),
            task("3", Status::InProgress, Priority::Low),
            task("4", Status::Completed, Priority::Medium),
            task("5", Status::Pending, Priority::Medium),
        ]
    }

    fn ids(tasks: &[&Task]) -> Vec<String> {
        tasks.iter().map(|t| t.id.to_string()).collect()
    }

    #[rstest]
    #[case(&[], 0)]
    #[case(&[true, false], 50)]
    #[case(&[true], 100)]
    #[case(&[false, false], 0)]
    #[case(&[true, false, false], 33)]
    #[case(&[true, true, false], 67)]
    #[case(&[true, false, false, false, false, false, false, false], 13)]
    fn progress_rounds_to_nearest(#[case] flags: &[bool], #[case] expected: u8) {
        assert_eq!(compute_progress(&subtasks(flags)), expected);
    }

    #[test]
    fn ongoing_excludes_completed_and_keeps_order() {
        let tasks = sample();
        let visible = filter_tasks(&tasks, StatusFilter::Ongoing, PriorityFilter::All);
        assert_eq!(ids(&visible), vec!["1", "3", "5"]);
    }

    #[test]
    fn completed_keeps_only_completed() {
        let tasks = sample();
        let visible = filter_tasks(&tasks, StatusFilter::Completed, PriorityFilter::All);
        assert_eq!(ids(&visible), vec!["2", "4"]);
    }

    #[test]
    fn priority_filter_ignores_status_when_all() {
        let tasks = sample();
        let visible = filter_tasks(&tasks, StatusFilter::All, PriorityFilter::High);
        assert_eq!(ids(&visible), vec!["1", "2"]);
    }

    #[test]
    fn filters_compose_with_and() {
        let tasks = sample();
        let visible = filter_tasks(&tasks, StatusFilter::Ongoing, PriorityFilter::Medium);
        assert_eq!(ids(&visible), vec!["5"]);
    }

    #[test]
    fn filtering_does_not_touch_input() {
        let tasks = sample();
        let before = tasks.clone();
        let _ = filter_tasks(&tasks, StatusFilter::Completed, PriorityFilter::Low);
        assert_eq!(tasks, before);
    }

    #[rstest]
    #[case(StatusFilter::Ongoing, vec![1, 3])]
    #[case(StatusFilter::Completed, vec![0, 2])]
    #[case(StatusFilter::All, vec![0, 1, 2, 3])]
    fn subtask_filter_keys_on_completed(#[case] filter: StatusFilter, #[case] expected: Vec<u64>) {
        let subs = subtasks(&[true, false, true, false]);
        let visible: Vec<u64> = filter_subtasks(&subs, filter)
            .iter()
            .map(|s| match s.id {
                crate::task::SubtaskId::Local(n) => n,
                crate::task::SubtaskId::Persisted(_) => unreachable!(),
            })
            .collect();
        assert_eq!(visible, expected);
    }
}
