//! Board entry point and terminal setup.

use std::io;

use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{prelude::CrosstermBackend, Terminal};
use tokio::runtime::Handle;

use crate::config::DisplayConfig;
use crate::gateway::RemoteGateway;
use crate::subtask_repo::SubtaskRepository;
use crate::task_repo::TaskRepository;
use crate::tui::app::App;

/// Initialise and run the interactive board.
///
/// Must be called from a thread that may block inside the tokio runtime. Fails with the
/// service's authentication error when the session was rejected while the board was open.
pub fn run_board<G: RemoteGateway + 'static>(
    tasks: TaskRepository<G>,
    subtasks: SubtaskRepository<G>,
    display: &DisplayConfig,
) -> anyhow::Result<()> {
    let runtime = Handle::current();

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(tasks, subtasks, display, runtime);
    let result = app.run(&mut terminal);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    result?;
    match app.take_signed_out() {
        Some(error) => Err(error.into()),
        None => Ok(()),
    }
}
