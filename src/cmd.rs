//! Command implementations for the CLI interface.
//!
//! Every handler works on a fresh `Context`: the task list is fetched from the service,
//! the repositories apply the requested change, and the confirmed result is printed.

use std::io::{self, BufRead, IsTerminal, Write};
use std::sync::Arc;

use anyhow::{bail, Context as _};
use chrono::Local;
use clap::Subcommand;
use clap_complete::{generate, Shell};

use crate::config::{AppConfig, DisplayConfig};
use crate::display::*;
use crate::error::StoreError;
use crate::fields::*;
use crate::filter::filter_subtasks;
use crate::gateway::HttpGateway;
use crate::session::{Session, User};
use crate::store::{ParentRef, TaskStore};
use crate::subtask_repo::SubtaskRepository;
use crate::task::{SubtaskId, TaskId, TaskPatch};
use crate::task_repo::TaskRepository;

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in and remember the credential.
    Login {
        #[arg(long)]
        email: String,
        /// Read from TT_PASSWORD or stdin when omitted.
        #[arg(long)]
        password: Option<String>,
    },

    /// Create an account. The service emails a verification link.
    Signup {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        /// Read from TT_PASSWORD or stdin when omitted.
        #[arg(long)]
        password: Option<String>,
    },

    /// Ask the service for a new email verification link.
    ResendVerification {
        #[arg(long)]
        email: String,
    },

    /// Change the display name of the signed-in account.
    Profile {
        #[arg(long)]
        name: String,
    },

    /// Forget the stored credential.
    Logout,

    /// Show the signed-in account.
    Whoami,

    /// Launch the interactive task board.
    Ui,

    /// List tasks with optional filters.
    List {
        /// Status filter: ongoing | completed | all.
        #[arg(long, value_enum)]
        status: Option<StatusFilter>,
        /// Priority filter: low | medium | high | all.
        #[arg(long, value_enum)]
        priority: Option<PriorityFilter>,
        /// Limit number of rows printed.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// View a task with its subtasks.
    View {
        id: TaskId,
        /// Which subtasks to show.
        #[arg(long, value_enum, default_value_t = StatusFilter::All)]
        subtasks: StatusFilter,
    },

    /// Add a new task.
    Add {
        /// Short title for the task.
        title: String,
        /// Optional longer description.
        #[arg(long)]
        desc: Option<String>,
        #[arg(long, value_enum, default_value_t = Priority::Medium)]
        priority: Priority,
        #[arg(long, value_enum, default_value_t = Status::Pending)]
        status: Status,
        /// Due date: YYYY-MM-DD, "today", "tomorrow", "friday", "next monday" or "in Nd".
        #[arg(long)]
        due: Option<String>,
        /// Subtask title. May be repeated; subtasks are created in the given order.
        #[arg(long = "subtask")]
        subtasks: Vec<String>,
    },

    /// Update fields of a task.
    Update {
        id: TaskId,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        desc: Option<String>,
        #[arg(long, value_enum)]
        priority: Option<Priority>,
        #[arg(long, value_enum)]
        status: Option<Status>,
        #[arg(long)]
        due: Option<String>,
    },

    /// Set the status of a task.
    Status {
        id: TaskId,
        #[arg(value_enum)]
        status: Status,
    },

    /// Mark a task as completed.
    Complete { id: TaskId },

    /// Set a task back to pending.
    Reopen { id: TaskId },

    /// Flip a task between completed and pending.
    Toggle { id: TaskId },

    /// Delete a task and its subtasks.
    Delete { id: TaskId },

    /// Manage the subtasks of a task.
    Subtask {
        #[command(subcommand)]
        action: SubtaskAction,
    },

    /// Generate shell completion scripts.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum SubtaskAction {
    /// List the subtasks of a task.
    List {
        task: TaskId,
        #[arg(long, value_enum, default_value_t = StatusFilter::All)]
        filter: StatusFilter,
    },
    /// Append a subtask.
    Add { task: TaskId, title: String },
    /// Flip a subtask between done and not done.
    Toggle { task: TaskId, id: SubtaskId },
    /// Change the title of a subtask.
    Rename {
        task: TaskId,
        id: SubtaskId,
        title: String,
    },
    /// Delete a subtask.
    Rm { task: TaskId, id: SubtaskId },
}

/// Everything a command needs to reach the service.
pub struct Context {
    pub gateway: Arc<HttpGateway>,
    pub tasks: TaskRepository<HttpGateway>,
    pub subtasks: SubtaskRepository<HttpGateway>,
    pub display: DisplayConfig,
}

impl Context {
    pub fn new(config: &AppConfig, session: Arc<Session>) -> Result<Self, StoreError> {
        let gateway = Arc::new(HttpGateway::new(
            &config.server.base_url,
            config.server.timeout(),
            session,
        )?);
        let store = TaskStore::shared();
        Ok(Context {
            tasks: TaskRepository::new(gateway.clone(), store.clone()),
            subtasks: SubtaskRepository::new(gateway.clone(), store),
            gateway,
            display: config.display.clone(),
        })
    }

    /// Fetch the task list and make sure `id` is on it.
    async fn load_task(&self, id: &TaskId) -> Result<(), StoreError> {
        self.tasks.load().await?;
        match self.tasks.get(id) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(format!("task {id}"))),
        }
    }
}

fn parse_due(input: Option<&str>) -> anyhow::Result<Option<chrono::NaiveDate>> {
    match input {
        None => Ok(None),
        Some(s) => match parse_due_input(s, Local::now().date_naive()) {
            Some(d) => Ok(Some(d)),
            None => bail!("could not understand due date '{s}'"),
        },
    }
}

// ── Account ─────────────────────────────────────────────────────────

/// Pick the password from the flag, then `TT_PASSWORD`, then the first line of `input`.
fn resolve_password(
    flag: Option<String>,
    env: Option<String>,
    input: &mut impl BufRead,
) -> anyhow::Result<String> {
    if let Some(password) = flag.or(env).filter(|p| !p.is_empty()) {
        return Ok(password);
    }
    let mut line = String::new();
    input
        .read_line(&mut line)
        .context("failed to read password")?;
    let password = line.trim_end_matches(['\r', '\n']);
    if password.is_empty() {
        bail!("a password is required (--password, TT_PASSWORD or stdin)");
    }
    Ok(password.to_string())
}

fn read_password(flag: Option<String>) -> anyhow::Result<String> {
    let stdin = io::stdin();
    if flag.is_none() && stdin.is_terminal() {
        eprint!("Password: ");
        io::stderr().flush()?;
    }
    resolve_password(flag, std::env::var("TT_PASSWORD").ok(), &mut stdin.lock())
}

pub async fn cmd_login(
    ctx: &Context,
    email: String,
    password: Option<String>,
) -> anyhow::Result<()> {
    let password = read_password(password)?;
    let resp = ctx.gateway.login(email.trim(), &password).await?;
    let user = resp.user.clone();
    ctx.gateway
        .session()
        .establish(resp.access_token, Some(resp.user))
        .context("failed to save credentials")?;
    if !user.is_verified {
        println!("Note: {} has not been verified yet.", user.email);
    }
    println!("Signed in as {}", display_name(&user.name, &user.email));
    Ok(())
}

pub async fn cmd_signup(
    ctx: &Context,
    name: String,
    email: String,
    password: Option<String>,
) -> anyhow::Result<()> {
    if name.trim().is_empty() || email.trim().is_empty() {
        bail!("name and email are required");
    }
    let password = read_password(password)?;
    let resp = ctx
        .gateway
        .signup(name.trim(), email.trim(), &password)
        .await?;
    println!(
        "{}",
        resp.message
            .unwrap_or_else(|| format!("Created account for {}", resp.user.email))
    );
    println!("Verify your email, then run `tt login`.");
    println!("No email? Run `tt resend-verification --email {}`.", email.trim());
    Ok(())
}

pub async fn cmd_resend_verification(ctx: &Context, email: String) -> anyhow::Result<()> {
    let email = email.trim();
    if email.is_empty() {
        bail!("an email address is required");
    }
    let resp = ctx.gateway.resend_verification(email).await?;
    println!(
        "{}",
        resp.message
            .unwrap_or_else(|| format!("Verification email sent to {email}"))
    );
    Ok(())
}

pub async fn cmd_profile(ctx: &Context, name: String) -> anyhow::Result<()> {
    let name = name.trim();
    if name.is_empty() {
        bail!("name cannot be empty");
    }
    let resp = ctx.gateway.update_profile(name).await?;
    if let Err(error) = ctx.gateway.session().remember_user(resp.user.clone()) {
        tracing::warn!(%error, "profile updated but the stored account was not refreshed");
    }
    println!(
        "{}",
        resp.message
            .unwrap_or_else(|| format!("Name changed to {}", resp.user.name))
    );
    Ok(())
}

pub fn cmd_logout(ctx: &Context) {
    ctx.gateway.session().clear();
    println!("Signed out.");
}

/// The signed-in account, from the service or, when it cannot be reached, as remembered at
/// login. The flag is true for the remembered copy.
async fn signed_in_user(ctx: &Context) -> Result<(User, bool), StoreError> {
    let session = ctx.gateway.session();
    if !session.is_authenticated() {
        return Err(StoreError::Auth("not signed in".into()));
    }
    match ctx.gateway.current_user().await {
        Ok(user) => Ok((user, false)),
        Err(StoreError::Network(reason)) => match session.user() {
            Some(user) => {
                tracing::debug!(%reason, "service unreachable; using stored account");
                Ok((user, true))
            }
            None => Err(StoreError::Network(reason)),
        },
        Err(error) => Err(error),
    }
}

pub async fn cmd_whoami(ctx: &Context) -> anyhow::Result<()> {
    let (user, cached) = signed_in_user(ctx).await?;
    println!("{} <{}>", display_name(&user.name, &user.email), user.email);
    if cached {
        println!("(service unreachable; showing the account stored at login)");
    }
    if !user.is_verified {
        println!("(email not verified)");
    }
    Ok(())
}

fn display_name<'a>(name: &'a str, email: &'a str) -> &'a str {
    if name.trim().is_empty() {
        email
    } else {
        name
    }
}

// ── Tasks ───────────────────────────────────────────────────────────

/// Open the interactive board.
pub fn cmd_ui(ctx: &Context) -> anyhow::Result<()> {
    tokio::task::block_in_place(|| {
        crate::tui::run::run_board(ctx.tasks.clone(), ctx.subtasks.clone(), &ctx.display)
    })
}

/// List tasks, newest first as returned by the service.
pub async fn cmd_list(
    ctx: &Context,
    status: Option<StatusFilter>,
    priority: Option<PriorityFilter>,
    limit: Option<usize>,
) -> anyhow::Result<()> {
    ctx.tasks.load().await?;
    let mut tasks = ctx.tasks.visible(
        status.unwrap_or(ctx.display.status_filter),
        priority.unwrap_or(ctx.display.priority_filter),
    );
    if let Some(n) = limit {
        tasks.truncate(n);
    }
    if tasks.is_empty() {
        println!("No tasks.");
        return Ok(());
    }
    print_table(&tasks);
    Ok(())
}

pub async fn cmd_view(ctx: &Context, id: TaskId, filter: StatusFilter) -> anyhow::Result<()> {
    ctx.load_task(&id).await?;
    ctx.subtasks.load_for_task(&id).await?;
    let task = ctx
        .tasks
        .get(&id)
        .ok_or_else(|| StoreError::NotFound(format!("task {id}")))?;
    print_task_detail(&task, filter);
    Ok(())
}

/// Create a task through the draft flow so subtasks are sent after their parent.
pub async fn cmd_add(
    ctx: &Context,
    title: String,
    desc: Option<String>,
    priority: Priority,
    status: Status,
    due: Option<String>,
    subtasks: Vec<String>,
) -> anyhow::Result<()> {
    let due_date = parse_due(due.as_deref())?;

    ctx.tasks.open_draft();
    ctx.tasks.edit_draft(|draft| {
        draft.title = title.trim().to_string();
        draft.description = desc.filter(|d| !d.trim().is_empty());
        draft.priority = priority;
        draft.status = status;
        draft.due_date = due_date;
    })?;
    for sub in &subtasks {
        ctx.subtasks.add(&ParentRef::Draft, sub).await?;
    }

    let task = ctx.tasks.submit_draft().await?;
    println!("Added task {}", task.id);
    if task.subtasks.len() < subtasks.len() {
        println!(
            "Warning: only {} of {} subtasks were saved.",
            task.subtasks.len(),
            subtasks.len()
        );
    }
    Ok(())
}

pub async fn cmd_update(
    ctx: &Context,
    id: TaskId,
    title: Option<String>,
    desc: Option<String>,
    priority: Option<Priority>,
    status: Option<Status>,
    due: Option<String>,
) -> anyhow::Result<()> {
    let patch = TaskPatch {
        title,
        description: desc,
        priority,
        status,
        due_date: parse_due(due.as_deref())?,
    };
    if patch.is_empty() {
        bail!("nothing to update; pass at least one of --title, --desc, --priority, --status, --due");
    }
    ctx.load_task(&id).await?;
    let task = ctx.tasks.update(&id, patch).await?;
    println!("Updated task {}", task.id);
    Ok(())
}

pub async fn cmd_status(ctx: &Context, id: TaskId, status: Status) -> anyhow::Result<()> {
    ctx.load_task(&id).await?;
    ctx.tasks.set_status(&id, status).await?;
    println!("Task {id} is now {status}");
    Ok(())
}

pub async fn cmd_toggle(ctx: &Context, id: TaskId) -> anyhow::Result<()> {
    ctx.load_task(&id).await?;
    let status = ctx.tasks.toggle_completed(&id).await?;
    println!("Task {id} is now {status}");
    Ok(())
}

pub async fn cmd_delete(ctx: &Context, id: TaskId) -> anyhow::Result<()> {
    ctx.load_task(&id).await?;
    ctx.tasks.remove(&id).await?;
    println!("Deleted task {id}");
    Ok(())
}

// ── Subtasks ────────────────────────────────────────────────────────

pub async fn cmd_subtask(ctx: &Context, action: SubtaskAction) -> anyhow::Result<()> {
    match action {
        SubtaskAction::List { task, filter } => {
            ctx.load_task(&task).await?;
            let subtasks = ctx.subtasks.load_for_task(&task).await?;
            println!("Progress: {}%", ctx.subtasks.active_progress());
            print_subtasks(&filter_subtasks(&subtasks, filter));
        }
        SubtaskAction::Add { task, title } => {
            ctx.load_task(&task).await?;
            let sub = ctx.subtasks.add(&ParentRef::Task(task.clone()), &title).await?;
            println!("Added subtask {} to task {task}", sub.id);
        }
        SubtaskAction::Toggle { task, id } => {
            ctx.load_task(&task).await?;
            let sub = ctx.subtasks.toggle(&ParentRef::Task(task), &id).await?;
            println!("{} {}", checkbox(sub.completed), sub.title);
        }
        SubtaskAction::Rename { task, id, title } => {
            ctx.load_task(&task).await?;
            let sub = ctx
                .subtasks
                .rename(&ParentRef::Task(task), &id, &title)
                .await?;
            println!("Renamed subtask {} to '{}'", sub.id, sub.title);
        }
        SubtaskAction::Rm { task, id } => {
            ctx.load_task(&task).await?;
            ctx.subtasks.remove(&ParentRef::Task(task.clone()), &id).await?;
            println!("Deleted subtask {id} from task {task}");
        }
    }
    Ok(())
}

/// Generate shell completion scripts.
pub fn cmd_completions(shell: Shell) {
    use crate::cli::Cli;
    use clap::CommandFactory;

    let mut app = Cli::command();
    let app_name = app.get_name().to_string();
    generate(shell, &mut app, app_name, &mut std::io::stdout());
}
