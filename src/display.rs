//! Formatting and parsing helpers shared by the CLI commands and the board.

use chrono::{Datelike, Duration, Local, NaiveDate};

use crate::fields::*;
use crate::filter::{compute_progress, filter_subtasks};
use crate::task::{Subtask, Task};

/// Parse a due date from natural language input, relative to `today`.
///
/// Supports:
/// - "today", "tomorrow", "yesterday"
/// - "monday" .. "sunday" (and "mon" .. "sun"), optionally prefixed with "next" or "this"
/// - "end of week"/"eow", "end of month"/"eom"
/// - "in 3d", "in 2w", "in 1m"
/// - "YYYY-MM-DD"
pub fn parse_due_input(s: &str, today: NaiveDate) -> Option<NaiveDate> {
    let s = s.trim().to_lowercase();

    match s.as_str() {
        "today" => return Some(today),
        "tomorrow" => return Some(today + Duration::days(1)),
        "yesterday" => return Some(today - Duration::days(1)),
        "end of week" | "eow" => {
            let from_monday = today.weekday().num_days_from_monday() as i64;
            return Some(today + Duration::days(6 - from_monday));
        }
        "end of month" | "eom" => {
            let (year, month) = if today.month() == 12 {
                (today.year() + 1, 1)
            } else {
                (today.year(), today.month() + 1)
            };
            let first_of_next = NaiveDate::from_ymd_opt(year, month, 1)?;
            return Some(first_of_next - Duration::days(1));
        }
        _ => {}
    }

    if let Some(rest) = s.strip_prefix("in ") {
        let rest = rest.trim();
        if let Some((idx, _)) = rest.char_indices().last() {
            let (count, unit) = rest.split_at(idx);
            if let Ok(n) = count.trim().parse::<i64>() {
                let offset = match unit {
                    "d" => Duration::try_days(n),
                    "w" => Duration::try_weeks(n),
                    // Approximate: 30 days per month
                    "m" => n.checked_mul(30).and_then(Duration::try_days),
                    _ => None,
                };
                return offset.and_then(|offset| today.checked_add_signed(offset));
            }
        }
    }

    let (next_week, day) = match s.strip_prefix("next ") {
        Some(day) => (true, day),
        None => (false, s.strip_prefix("this ").unwrap_or(&s)),
    };
    if let Some(target) = weekday_index(day) {
        let current = today.weekday().num_days_from_monday() as i64;
        let mut ahead = (target - current).rem_euclid(7);
        if next_week {
            ahead += 7;
        }
        return Some(today + Duration::days(ahead));
    }

    NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()
}

fn weekday_index(name: &str) -> Option<i64> {
    const DAYS: [&str; 7] = [
        "monday",
        "tuesday",
        "wednesday",
        "thursday",
        "friday",
        "saturday",
        "sunday",
    ];
    DAYS.iter()
        .position(|d| *d == name || (name.len() == 3 && d.starts_with(name)))
        .map(|i| i as i64)
}

/// Format a due date relative to today ("today", "tomorrow", "in 3d", "2d late").
pub fn format_due_relative(due: Option<NaiveDate>, today: NaiveDate) -> String {
    match due {
        None => "-".into(),
        Some(d) => {
            let days = (d - today).num_days();
            match days {
                0 => "today".into(),
                1 => "tomorrow".into(),
                n if n > 1 => format!("in {n}d"),
                n => format!("{}d late", -n),
            }
        }
    }
}

/// Short status label for tables.
pub fn format_status(s: Status) -> &'static str {
    match s {
        Status::Pending => "Pending",
        Status::InProgress => "InProgress",
        Status::Completed => "Completed",
    }
}

/// Progress column text; empty for tasks without subtasks.
pub fn format_progress(task: &Task) -> String {
    if task.subtasks.is_empty() {
        "-".into()
    } else {
        let done = task.subtasks.iter().filter(|s| s.completed).count();
        format!(
            "{}% ({done}/{})",
            compute_progress(&task.subtasks),
            task.subtasks.len()
        )
    }
}

pub fn checkbox(completed: bool) -> &'static str {
    if completed {
        "[x]"
    } else {
        "[ ]"
    }
}

/// Print tasks in a formatted table.
pub fn print_table(tasks: &[Task]) {
    println!(
        "{:<8} {:<11} {:<7} {:<10} {:<13} Title",
        "ID", "Status", "Pri", "Due", "Progress"
    );
    let today = Local::now().date_naive();
    for t in tasks {
        println!(
            "{:<8} {:<11} {:<7} {:<10} {:<13} {}",
            truncate(t.id.as_str(), 8),
            format_status(t.status),
            t.priority.to_string(),
            format_due_relative(t.due_date, today),
            format_progress(t),
            t.title
        );
    }
}

/// Print one task with its subtasks, showing only those `filter` admits.
pub fn print_task_detail(task: &Task, filter: StatusFilter) {
    let today = Local::now().date_naive();
    println!("#{} {}", task.id, task.title);
    println!("  Status:    {}", task.status);
    println!("  Priority:  {}", task.priority);
    match task.due_date {
        Some(d) => println!("  Due:       {d} ({})", format_due_relative(Some(d), today)),
        None => println!("  Due:       -"),
    }
    if let Some(created) = task.created_at {
        println!("  Created:   {}", created.format("%Y-%m-%d %H:%M"));
    }
    if let Some(updated) = task.updated_at {
        println!("  Updated:   {}", updated.format("%Y-%m-%d %H:%M"));
    }
    if let Some(desc) = task.description.as_deref().filter(|d| !d.trim().is_empty()) {
        println!();
        for line in desc.lines() {
            println!("  {line}");
        }
    }

    println!();
    println!("  Progress:  {}", format_progress(task));
    print_subtasks(&filter_subtasks(&task.subtasks, filter));
}

pub fn print_subtasks(subtasks: &[&Subtask]) {
    if subtasks.is_empty() {
        println!("  (no subtasks)");
        return;
    }
    for s in subtasks {
        println!("  {} {:<10} {}", checkbox(s.completed), s.id, s.title);
    }
}

/// Truncate a string to a maximum width, adding ellipsis if needed.
pub fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(width.saturating_sub(1)).collect();
        out.push('…');
        out
    }
}
