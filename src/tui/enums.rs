//! Enumerations for TUI state management.

/// Screen the board is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Board,
    Input(InputPurpose),
    Confirm,
    Help,
}

/// What the text prompt is collecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputPurpose {
    NewTask,
    NewSubtask,
    RenameSubtask,
}

impl InputPurpose {
    pub fn prompt(self) -> &'static str {
        match self {
            InputPurpose::NewTask => "New task title",
            InputPurpose::NewSubtask => "New subtask title",
            InputPurpose::RenameSubtask => "Rename subtask",
        }
    }
}

/// Which pane receives navigation keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Tasks,
    Subtasks,
}
