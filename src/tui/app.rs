//! Main application logic for the terminal user interface.
//!
//! `App` shows the filtered task list and, when a task is expanded, its subtasks with a
//! progress gauge. Remote operations are spawned on the tokio runtime so the board keeps
//! drawing while they are in flight; each one reports back over a channel and the view is
//! rebuilt from the repositories, which only ever hold confirmed state.

use std::future::Future;
use std::io;
use std::time::Duration;

use chrono::Local;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use ratatui::{
    backend::Backend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, Gauge, Paragraph, Row, Table, TableState, Wrap},
    Frame, Terminal,
};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::config::DisplayConfig;
use crate::display::{format_due_relative, format_progress, format_status, truncate};
use crate::error::StoreError;
use crate::fields::*;
use crate::gateway::RemoteGateway;
use crate::store::ParentRef;
use crate::subtask_repo::SubtaskRepository;
use crate::task::{Subtask, SubtaskId, Task, TaskId};
use crate::task_repo::TaskRepository;
use crate::tui::{
    colors::{priority_color, DARK_GREEN, DARK_PURPLE, DARK_RED},
    enums::{AppState, Focus, InputPurpose},
    input::InputField,
    utils::centered_rect,
};

/// Result of a spawned remote operation.
struct Outcome {
    done: String,
    result: Result<(), StoreError>,
}

/// Main application state for the terminal user interface.
pub struct App<G> {
    tasks: TaskRepository<G>,
    subtasks: SubtaskRepository<G>,
    runtime: Handle,
    tx: UnboundedSender<Outcome>,
    rx: UnboundedReceiver<Outcome>,
    in_flight: usize,

    state: AppState,
    focus: Focus,
    status_filter: StatusFilter,
    priority_filter: PriorityFilter,
    subtask_filter: StatusFilter,
    visible: Vec<Task>,
    task_list_state: TableState,
    subtask_list_state: TableState,
    expanded: Option<TaskId>,
    input: InputField,
    renaming: Option<SubtaskId>,
    confirm: Option<TaskId>,

    status_message: String,
    error: Option<String>,
    signed_out: Option<StoreError>,
    quit: bool,
}

impl<G: RemoteGateway + 'static> App<G> {
    /// Create the board and start fetching the task list.
    pub fn new(
        tasks: TaskRepository<G>,
        subtasks: SubtaskRepository<G>,
        display: &DisplayConfig,
        runtime: Handle,
    ) -> Self {
        let (tx, rx) = unbounded_channel();
        let mut app = App {
            tasks,
            subtasks,
            runtime,
            tx,
            rx,
            in_flight: 0,
            state: AppState::Board,
            focus: Focus::Tasks,
            status_filter: display.status_filter,
            priority_filter: display.priority_filter,
            subtask_filter: StatusFilter::All,
            visible: Vec::new(),
            task_list_state: TableState::default(),
            subtask_list_state: TableState::default(),
            expanded: None,
            input: InputField::new(),
            renaming: None,
            confirm: None,
            status_message: String::new(),
            error: None,
            signed_out: None,
            quit: false,
        };
        app.refresh();
        app
    }

    /// The authentication failure that ended the board, if any.
    pub fn take_signed_out(&mut self) -> Option<StoreError> {
        self.signed_out.take()
    }

    // ── Remote operations ───────────────────────────────────────────

    fn spawn<F>(&mut self, done: String, op: F)
    where
        F: Future<Output = Result<(), StoreError>> + Send + 'static,
    {
        self.in_flight += 1;
        let tx = self.tx.clone();
        self.runtime.spawn(async move {
            let result = op.await;
            let _ = tx.send(Outcome { done, result });
        });
    }

    fn drain_outcomes(&mut self) {
        while let Ok(outcome) = self.rx.try_recv() {
            self.apply(outcome);
        }
    }

    fn apply(&mut self, outcome: Outcome) {
        self.in_flight = self.in_flight.saturating_sub(1);
        match outcome.result {
            Ok(()) => self.status_message = outcome.done,
            Err(error) if error.is_auth() => {
                self.signed_out = Some(error);
                self.quit = true;
            }
            Err(error) => self.error = Some(error.to_string()),
        }
        self.rebuild();
    }

    fn refresh(&mut self) {
        let repo = self.tasks.clone();
        self.spawn("Refreshed".into(), async move { repo.load().await.map(|_| ()) });
    }

    fn toggle_selected_task(&mut self) {
        let Some(task) = self.selected_task() else {
            return;
        };
        let id = task.id.clone();
        let done = format!("Toggled '{}'", task.title);
        let repo = self.tasks.clone();
        self.spawn(done, async move { repo.toggle_completed(&id).await.map(|_| ()) });
    }

    fn delete_confirmed(&mut self) {
        let Some(id) = self.confirm.take() else {
            return;
        };
        let repo = self.tasks.clone();
        self.spawn(format!("Deleted task {id}"), async move {
            repo.remove(&id).await
        });
    }

    fn create_task(&mut self, title: String) {
        self.collapse();
        self.tasks.open_draft();
        let title = title.trim().to_string();
        if let Err(error) = self.tasks.edit_draft(|draft| draft.title = title.clone()) {
            self.error = Some(error.to_string());
            return;
        }
        let repo = self.tasks.clone();
        self.spawn(format!("Created '{title}'"), async move {
            repo.submit_draft().await.map(|_| ())
        });
    }

    fn expand_selected(&mut self) {
        let Some(id) = self.selected_task().map(|t| t.id.clone()) else {
            return;
        };
        self.subtasks.activate(ParentRef::Task(id.clone()));
        self.expanded = Some(id.clone());
        self.focus = Focus::Subtasks;
        self.subtask_list_state.select(None);
        let repo = self.subtasks.clone();
        self.spawn("Subtasks loaded".into(), async move {
            repo.load_for_task(&id).await.map(|_| ())
        });
    }

    fn collapse(&mut self) {
        if self.expanded.take().is_some() {
            self.subtasks.deactivate();
        }
        self.focus = Focus::Tasks;
        self.subtask_list_state.select(None);
    }

    fn add_subtask(&mut self, title: String) {
        let Some(id) = self.expanded.clone() else {
            return;
        };
        let repo = self.subtasks.clone();
        self.spawn(format!("Added '{}'", title.trim()), async move {
            repo.add(&ParentRef::Task(id), &title).await.map(|_| ())
        });
    }

    fn toggle_selected_subtask(&mut self) {
        let (Some(task), Some(sub)) = (self.expanded.clone(), self.selected_subtask()) else {
            return;
        };
        let repo = self.subtasks.clone();
        self.spawn(format!("Toggled '{}'", sub.title), async move {
            repo.toggle(&ParentRef::Task(task), &sub.id).await.map(|_| ())
        });
    }

    fn begin_rename(&mut self) {
        let Some(sub) = self.selected_subtask() else {
            return;
        };
        self.input = InputField::with_value(&sub.title);
        self.renaming = Some(sub.id);
        self.state = AppState::Input(InputPurpose::RenameSubtask);
    }

    fn rename_subtask(&mut self, title: String) {
        let (Some(task), Some(id)) = (self.expanded.clone(), self.renaming.take()) else {
            return;
        };
        let repo = self.subtasks.clone();
        self.spawn(format!("Renamed to '{}'", title.trim()), async move {
            repo.rename(&ParentRef::Task(task), &id, &title).await.map(|_| ())
        });
    }

    fn remove_selected_subtask(&mut self) {
        let (Some(task), Some(sub)) = (self.expanded.clone(), self.selected_subtask()) else {
            return;
        };
        let repo = self.subtasks.clone();
        self.spawn(format!("Removed '{}'", sub.title), async move {
            repo.remove(&ParentRef::Task(task), &sub.id).await
        });
    }

    // ── View state ──────────────────────────────────────────────────

    /// Re-read the filtered list from the repositories and keep selections in range.
    fn rebuild(&mut self) {
        self.visible = self.tasks.visible(self.status_filter, self.priority_filter);
        self.task_list_state
            .select(clamp_selection(self.task_list_state.selected(), self.visible.len()));

        let expanded_gone = matches!(&self.expanded, Some(id) if self.tasks.get(id).is_none());
        if expanded_gone {
            self.collapse();
        }
        let subtask_count = self.visible_subtasks().len();
        if self.focus == Focus::Subtasks || self.subtask_list_state.selected().is_some() {
            self.subtask_list_state
                .select(clamp_selection(self.subtask_list_state.selected(), subtask_count));
        }
    }

    fn selected_task(&self) -> Option<&Task> {
        self.task_list_state
            .selected()
            .and_then(|i| self.visible.get(i))
    }

    fn visible_subtasks(&self) -> Vec<Subtask> {
        if self.expanded.is_none() {
            return Vec::new();
        }
        self.subtasks.visible(self.subtask_filter)
    }

    fn selected_subtask(&self) -> Option<Subtask> {
        let i = self.subtask_list_state.selected()?;
        self.visible_subtasks().into_iter().nth(i)
    }

    fn move_selection(&mut self, delta: isize) {
        let len = match self.focus {
            Focus::Tasks => self.visible.len(),
            Focus::Subtasks => self.visible_subtasks().len(),
        };
        let state = match self.focus {
            Focus::Tasks => &mut self.task_list_state,
            Focus::Subtasks => &mut self.subtask_list_state,
        };
        state.select(step_selection(state.selected(), delta, len));
    }

    // ── Input ───────────────────────────────────────────────────────

    fn handle_key(&mut self, key: KeyCode, modifiers: KeyModifiers) {
        if key == KeyCode::Char('c') && modifiers.contains(KeyModifiers::CONTROL) {
            self.quit = true;
            return;
        }
        match self.state {
            AppState::Board => self.handle_board_key(key),
            AppState::Input(purpose) => self.handle_input_key(key, purpose),
            AppState::Confirm => self.handle_confirm_key(key),
            AppState::Help => self.state = AppState::Board,
        }
    }

    fn handle_board_key(&mut self, key: KeyCode) {
        self.status_message.clear();
        match key {
            KeyCode::Char('q') => self.quit = true,
            KeyCode::Esc => {
                if self.expanded.is_some() {
                    self.collapse();
                } else {
                    self.quit = true;
                }
            }
            KeyCode::Char('?') | KeyCode::Char('h') => self.state = AppState::Help,
            KeyCode::Char('x') => self.error = None,
            KeyCode::Char('r') => self.refresh(),
            KeyCode::Char('s') => {
                self.status_filter = self.status_filter.cycle();
                self.rebuild();
            }
            KeyCode::Char('p') => {
                self.priority_filter = self.priority_filter.cycle();
                self.rebuild();
            }
            KeyCode::Char('f') => {
                self.subtask_filter = self.subtask_filter.cycle();
                self.rebuild();
            }
            KeyCode::Tab if self.expanded.is_some() => {
                self.focus = match self.focus {
                    Focus::Tasks => Focus::Subtasks,
                    Focus::Subtasks => Focus::Tasks,
                };
            }
            KeyCode::Char('n') => {
                self.input = InputField::new();
                self.state = AppState::Input(InputPurpose::NewTask);
            }
            KeyCode::Char('a') if self.expanded.is_some() => {
                self.input = InputField::new();
                self.state = AppState::Input(InputPurpose::NewSubtask);
            }
            KeyCode::Char('e') if self.focus == Focus::Subtasks => self.begin_rename(),
            KeyCode::Up | KeyCode::Char('k') => self.move_selection(-1),
            KeyCode::Down | KeyCode::Char('j') => self.move_selection(1),
            KeyCode::Enter if self.focus == Focus::Tasks => self.expand_selected(),
            KeyCode::Char(' ') | KeyCode::Char('c') => match self.focus {
                Focus::Tasks => self.toggle_selected_task(),
                Focus::Subtasks => self.toggle_selected_subtask(),
            },
            KeyCode::Char('d') => match self.focus {
                Focus::Tasks => {
                    if let Some(id) = self.selected_task().map(|t| t.id.clone()) {
                        self.confirm = Some(id);
                        self.state = AppState::Confirm;
                    }
                }
                Focus::Subtasks => self.remove_selected_subtask(),
            },
            _ => {}
        }
    }

    fn handle_input_key(&mut self, key: KeyCode, purpose: InputPurpose) {
        match key {
            KeyCode::Esc => {
                self.renaming = None;
                self.state = AppState::Board;
            }
            KeyCode::Enter => {
                let text = self.input.take();
                self.state = AppState::Board;
                match purpose {
                    InputPurpose::NewTask => self.create_task(text),
                    InputPurpose::NewSubtask => self.add_subtask(text),
                    InputPurpose::RenameSubtask => self.rename_subtask(text),
                }
            }
            KeyCode::Char(c) => self.input.handle_char(c),
            KeyCode::Backspace => self.input.handle_backspace(),
            KeyCode::Delete => self.input.handle_delete(),
            KeyCode::Left => self.input.move_cursor_left(),
            KeyCode::Right => self.input.move_cursor_right(),
            KeyCode::Home => self.input.move_cursor_home(),
            KeyCode::End => self.input.move_cursor_end(),
            _ => {}
        }
    }

    fn handle_confirm_key(&mut self, key: KeyCode) {
        match key {
            KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => {
                self.delete_confirmed();
                self.state = AppState::Board;
            }
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                self.confirm = None;
                self.state = AppState::Board;
            }
            _ => {}
        }
    }

    fn handle_events(&mut self) -> io::Result<()> {
        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    self.handle_key(key.code, key.modifiers);
                }
            }
        }
        Ok(())
    }

    // ── Rendering ───────────────────────────────────────────────────

    fn render_header(&self, f: &mut Frame, area: Rect) {
        let mut spans = vec![
            Span::styled("TASK TRACKER", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw("  "),
            Span::styled(
                format!(
                    "Status: {}  Priority: {}",
                    self.status_filter, self.priority_filter
                ),
                Style::default().fg(Color::Cyan).add_modifier(Modifier::ITALIC),
            ),
        ];
        if self.in_flight > 0 {
            spans.push(Span::styled("  syncing…", Style::default().fg(Color::Yellow)));
        }
        let header = Paragraph::new(Line::from(spans))
            .block(Block::default().borders(Borders::ALL))
            .alignment(Alignment::Center);
        f.render_widget(header, area);
    }

    fn render_task_list(&mut self, f: &mut Frame, area: Rect) {
        let today = Local::now().date_naive();
        let header = Row::new(
            ["ID", "Status", "Pri", "Due", "Progress", "Title"]
                .iter()
                .map(|h| Cell::from(*h).style(Style::default().add_modifier(Modifier::BOLD))),
        )
        .style(Style::default().bg(DARK_PURPLE).fg(Color::White))
        .height(1);

        let rows: Vec<Row> = self
            .visible
            .iter()
            .map(|task| {
                let pending = self.tasks.pending(&task.id);
                let status = match pending {
                    PendingOperation::Deleting => "deleting…".to_string(),
                    PendingOperation::Saving => "saving…".to_string(),
                    PendingOperation::None => format_status(task.status).to_string(),
                };
                let style = match (pending, task.status) {
                    (PendingOperation::Deleting, _) => Style::default()
                        .fg(Color::DarkGray)
                        .add_modifier(Modifier::CROSSED_OUT),
                    (_, Status::Completed) => Style::default().fg(Color::DarkGray),
                    (_, Status::InProgress) => Style::default().add_modifier(Modifier::BOLD),
                    _ => Style::default().fg(Color::White),
                };
                Row::new(vec![
                    Cell::from(truncate(task.id.as_str(), 8)),
                    Cell::from(status),
                    Cell::from(task.priority.to_string())
                        .style(Style::default().fg(priority_color(task.priority))),
                    Cell::from(format_due_relative(task.due_date, today)),
                    Cell::from(format_progress(task)),
                    Cell::from(task.title.clone()),
                ])
                .style(style)
            })
            .collect();

        let widths = [
            Constraint::Length(8),  // ID
            Constraint::Length(11), // Status
            Constraint::Length(7),  // Priority
            Constraint::Length(10), // Due
            Constraint::Length(13), // Progress
            Constraint::Min(20),    // Title
        ];

        let border = if self.focus == Focus::Tasks {
            Style::default().fg(Color::Cyan)
        } else {
            Style::default()
        };
        let table = Table::new(rows, widths)
            .header(header)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(border)
                    .title(format!("Tasks ({}) - Press 'h' for help", self.visible.len())),
            )
            .row_highlight_style(Style::default().bg(Color::Gray).fg(Color::Black))
            .highlight_symbol(">> ");

        f.render_stateful_widget(table, area, &mut self.task_list_state);
    }

    fn render_subtasks(&mut self, f: &mut Frame, area: Rect) {
        let Some(task) = self.expanded.as_ref().and_then(|id| self.tasks.get(id)) else {
            return;
        };
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(3), Constraint::Min(0)])
            .split(area);

        let all = self.subtasks.active_subtasks();
        let done = all.iter().filter(|s| s.completed).count();
        let progress = self.subtasks.active_progress();
        let gauge = Gauge::default()
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(format!("Progress of '{}'", truncate(&task.title, 40))),
            )
            .gauge_style(Style::default().fg(DARK_GREEN).bg(Color::Black))
            .percent(u16::from(progress))
            .label(format!("{progress}% ({done}/{})", all.len()));
        f.render_widget(gauge, chunks[0]);

        let rows: Vec<Row> = self
            .visible_subtasks()
            .into_iter()
            .map(|s| {
                let style = if s.completed {
                    Style::default().fg(Color::DarkGray)
                } else {
                    Style::default()
                };
                Row::new(vec![
                    Cell::from(if s.completed { "[x]" } else { "[ ]" }),
                    Cell::from(s.title),
                ])
                .style(style)
            })
            .collect();

        let border = if self.focus == Focus::Subtasks {
            Style::default().fg(Color::Cyan)
        } else {
            Style::default()
        };
        let table = Table::new(rows, [Constraint::Length(4), Constraint::Min(10)])
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(border)
                    .title(format!("Subtasks [{}] - a add, e rename, d remove, f filter", self.subtask_filter)),
            )
            .row_highlight_style(Style::default().bg(Color::Gray).fg(Color::Black))
            .highlight_symbol(">> ");
        f.render_stateful_widget(table, chunks[1], &mut self.subtask_list_state);
    }

    fn render_input(&self, f: &mut Frame, area: Rect, purpose: InputPurpose) {
        let area = centered_rect(60, 20, area);
        f.render_widget(Clear, area);
        let block = Block::default()
            .borders(Borders::ALL)
            .title(format!("{} (Enter to save, Esc to cancel)", purpose.prompt()));
        let inner = block.inner(area);
        f.render_widget(Paragraph::new(self.input.value.as_str()).block(block), area);
        let x = inner.x + (self.input.cursor as u16).min(inner.width.saturating_sub(1));
        f.set_cursor_position((x, inner.y));
    }

    fn render_confirm(&self, f: &mut Frame, area: Rect) {
        let block = Block::default()
            .title("Confirm Action")
            .borders(Borders::ALL)
            .style(Style::default().bg(DARK_RED));

        let area = centered_rect(50, 20, area);
        f.render_widget(Clear, area);

        let title = self
            .confirm
            .as_ref()
            .and_then(|id| self.tasks.get(id))
            .map(|t| t.title)
            .unwrap_or_default();
        let text = vec![
            Line::from(""),
            Line::from(Span::styled(
                "Delete this task and all its subtasks?",
                Style::default().add_modifier(Modifier::BOLD),
            )),
            Line::from(title),
            Line::from(""),
            Line::from("Press 'y' to confirm, 'n' to cancel"),
        ];

        let paragraph = Paragraph::new(text)
            .block(block)
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true });
        f.render_widget(paragraph, area);
    }

    fn render_help(&self, f: &mut Frame, area: Rect) {
        let area = centered_rect(60, 70, area);
        f.render_widget(Clear, area);
        let lines: Vec<Line> = [
            ("↑/↓ j/k", "move selection"),
            ("Enter", "expand task"),
            ("Tab", "switch between tasks and subtasks"),
            ("Space/c", "toggle completed"),
            ("n", "new task"),
            ("a", "add subtask to expanded task"),
            ("e", "rename selected subtask"),
            ("d", "delete task / remove subtask"),
            ("s", "cycle status filter"),
            ("p", "cycle priority filter"),
            ("f", "cycle subtask filter"),
            ("r", "refresh from server"),
            ("x", "dismiss error"),
            ("Esc", "collapse / quit"),
            ("q", "quit"),
        ]
        .into_iter()
        .map(|(key, what)| {
            Line::from(vec![
                Span::styled(format!("{key:<10}"), Style::default().add_modifier(Modifier::BOLD)),
                Span::raw(what),
            ])
        })
        .collect();
        let help = Paragraph::new(lines).block(
            Block::default()
                .borders(Borders::ALL)
                .title("Help - any key to close"),
        );
        f.render_widget(help, area);
    }

    fn render_status_bar(&self, f: &mut Frame, area: Rect) {
        let (text, bg) = match &self.error {
            Some(error) => (format!("Error: {error}  (x to dismiss)"), DARK_RED),
            None if !self.status_message.is_empty() => (self.status_message.clone(), DARK_PURPLE),
            None => {
                let hint = match self.focus {
                    Focus::Tasks => "Enter expand | Space toggle | d delete | n new | h help",
                    Focus::Subtasks => "Space toggle | a add | e rename | d remove | Tab tasks | Esc close",
                };
                (format!("Tasks: {} | {hint}", self.visible.len()), DARK_PURPLE)
            }
        };
        let status = Paragraph::new(text)
            .style(Style::default().bg(bg).fg(Color::White))
            .alignment(Alignment::Left);
        f.render_widget(status, area);
    }

    fn render(&mut self, f: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(0),
                Constraint::Length(1),
            ])
            .split(f.area());

        self.render_header(f, chunks[0]);
        if self.expanded.is_some() {
            let body = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
                .split(chunks[1]);
            self.render_task_list(f, body[0]);
            self.render_subtasks(f, body[1]);
        } else {
            self.render_task_list(f, chunks[1]);
        }
        self.render_status_bar(f, chunks[2]);

        match self.state {
            AppState::Board => {}
            AppState::Input(purpose) => self.render_input(f, chunks[1], purpose),
            AppState::Confirm => self.render_confirm(f, chunks[1]),
            AppState::Help => self.render_help(f, chunks[1]),
        }
    }

    /// Main event loop for the TUI application.
    ///
    /// Handles rendering, finished remote operations and input until the user exits or the
    /// session is rejected.
    pub fn run<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> io::Result<()> {
        while !self.quit {
            self.drain_outcomes();
            terminal.draw(|f| self.render(f))?;
            self.handle_events()?;
        }
        Ok(())
    }
}

fn clamp_selection(selected: Option<usize>, len: usize) -> Option<usize> {
    if len == 0 {
        None
    } else {
        Some(selected.unwrap_or(0).min(len - 1))
    }
}

fn step_selection(selected: Option<usize>, delta: isize, len: usize) -> Option<usize> {
    if len == 0 {
        return None;
    }
    match selected {
        None => Some(0),
        Some(i) => Some(i.saturating_add_signed(delta).min(len - 1)),
    }
}
