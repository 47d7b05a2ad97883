//! Client side of the task service's REST API.
//!
//! `RemoteGateway` is the seam the repositories depend on: one method per task/subtask
//! endpoint, each resolving to the service's confirmed result. `HttpGateway` implements it
//! over reqwest and additionally exposes the account endpoints (login, signup, current
//! user) used by the authentication commands.
//!
//! Every task/subtask request carries the session's bearer credential. A 401 answer clears
//! the session before the error is returned, so the next invocation starts signed out.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::fields::Status;
use crate::session::{Session, User};
use crate::task::{Subtask, SubtaskId, SubtaskPatch, Task, TaskDraft, TaskId, TaskPatch};

/// Task and subtask endpoints of the task service.
pub trait RemoteGateway: Send + Sync {
    /// `GET /tasks`
    fn list_tasks(&self) -> impl Future<Output = Result<Vec<Task>, StoreError>> + Send;

    /// `POST /tasks`
    fn create_task(
        &self,
        draft: &TaskDraft,
    ) -> impl Future<Output = Result<Task, StoreError>> + Send;

    /// `PUT /tasks/{id}`
    fn update_task(
        &self,
        id: &TaskId,
        patch: &TaskPatch,
    ) -> impl Future<Output = Result<Task, StoreError>> + Send;

    /// `PATCH /tasks/{id}/status`
    fn patch_status(
        &self,
        id: &TaskId,
        status: Status,
    ) -> impl Future<Output = Result<Task, StoreError>> + Send;

    /// `DELETE /tasks/{id}`
    fn delete_task(&self, id: &TaskId) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// `GET /tasks/{id}/subtasks`
    fn list_subtasks(
        &self,
        task: &TaskId,
    ) -> impl Future<Output = Result<Vec<Subtask>, StoreError>> + Send;

    /// `POST /tasks/{id}/subtasks`
    fn add_subtask(
        &self,
        task: &TaskId,
        title: &str,
    ) -> impl Future<Output = Result<Subtask, StoreError>> + Send;

    /// `PUT /tasks/{id}/subtasks/{sid}`
    fn update_subtask(
        &self,
        task: &TaskId,
        subtask: &SubtaskId,
        patch: &SubtaskPatch,
    ) -> impl Future<Output = Result<Subtask, StoreError>> + Send;

    /// `DELETE /tasks/{id}/subtasks/{sid}`
    fn delete_subtask(
        &self,
        task: &TaskId,
        subtask: &SubtaskId,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

#[derive(Serialize)]
struct StatusBody {
    status: Status,
}

#[derive(Serialize)]
struct NewSubtask<'a> {
    title: &'a str,
}

#[derive(Serialize)]
struct LoginBody<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct SignupBody<'a> {
    name: &'a str,
    email: &'a str,
    password: &'a str,
}

/// Answer to a successful login.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub user: User,
    #[serde(default)]
    pub message: Option<String>,
}

/// Answer to a successful signup. The account still needs its email verified.
#[derive(Debug, Clone, Deserialize)]
pub struct SignupResponse {
    #[serde(default)]
    pub message: Option<String>,
    pub user: User,
}

#[derive(Serialize)]
struct EmailBody<'a> {
    email: &'a str,
}

#[derive(Serialize)]
struct ProfileBody<'a> {
    name: &'a str,
}

/// Answer to an account request that only carries a message.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub message: Option<String>,
}

/// Answer to a profile update.
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileResponse {
    #[serde(default)]
    pub message: Option<String>,
    pub user: User,
}

/// Body of a service error response. Token failures use `msg`.
#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    msg: Option<String>,
}

/// reqwest-backed gateway to the task service.
pub struct HttpGateway {
    http: reqwest::Client,
    base_url: String,
    session: Arc<Session>,
}

impl HttpGateway {
    /// Build a gateway for the service rooted at `base_url` (e.g. `http://localhost:5000/api`).
    pub fn new(
        base_url: &str,
        timeout: Duration,
        session: Arc<Session>,
    ) -> Result<Self, StoreError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("task_tracker/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            session,
        })
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn task_url(&self, id: &TaskId) -> String {
        self.url(&format!("/tasks/{id}"))
    }

    fn subtask_url(&self, task: &TaskId, subtask: &SubtaskId) -> Result<String, StoreError> {
        match subtask {
            SubtaskId::Persisted(sid) => Ok(self.url(&format!("/tasks/{task}/subtasks/{sid}"))),
            SubtaskId::Local(_) => Err(StoreError::Validation(format!(
                "subtask {subtask} has not been saved yet"
            ))),
        }
    }

    /// Attach the bearer credential, or fail without sending when signed out.
    fn authorized(&self, req: RequestBuilder) -> Result<RequestBuilder, StoreError> {
        let bearer = self
            .session
            .bearer()
            .ok_or_else(|| StoreError::Auth("no active session".into()))?;
        Ok(req.header(reqwest::header::AUTHORIZATION, bearer))
    }

    /// Send an authorized request and check its status. A rejected credential ends the
    /// session.
    async fn execute(&self, req: RequestBuilder) -> Result<Response, StoreError> {
        let req = self.authorized(req)?;
        let result = check_response(req.send().await?).await;
        if let Err(StoreError::Auth(reason)) = &result {
            tracing::warn!(%reason, "credential rejected; clearing session");
            self.session.clear();
        }
        result
    }

    /// `POST /login`. Does not touch the session; the caller establishes it.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, StoreError> {
        tracing::debug!(email, "POST /login");
        let req = self.http.post(self.url("/login")).json(&LoginBody { email, password });
        let resp = check_response(req.send().await?).await?;
        Ok(resp.json().await?)
    }

    /// `POST /signup`
    pub async fn signup(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<SignupResponse, StoreError> {
        tracing::debug!(email, "POST /signup");
        let req = self.http.post(self.url("/signup")).json(&SignupBody {
            name,
            email,
            password,
        });
        let resp = check_response(req.send().await?).await?;
        Ok(resp.json().await?)
    }

    /// `POST /resend-verification`. Asks the service to email a new verification link.
    pub async fn resend_verification(&self, email: &str) -> Result<MessageResponse, StoreError> {
        tracing::debug!(email, "POST /resend-verification");
        let req = self
            .http
            .post(self.url("/resend-verification"))
            .json(&EmailBody { email });
        let resp = check_response(req.send().await?).await?;
        Ok(resp.json().await?)
    }

    /// `GET /user`
    pub async fn current_user(&self) -> Result<User, StoreError> {
        tracing::debug!("GET /user");
        let resp = self.execute(self.http.get(self.url("/user"))).await?;
        Ok(resp.json().await?)
    }

    /// `PUT /user`. Only the display name is editable here.
    pub async fn update_profile(&self, name: &str) -> Result<ProfileResponse, StoreError> {
        tracing::debug!("PUT /user");
        let req = self.http.put(self.url("/user")).json(&ProfileBody { name });
        let resp = self.execute(req).await?;
        Ok(resp.json().await?)
    }
}

impl RemoteGateway for HttpGateway {
    async fn list_tasks(&self) -> Result<Vec<Task>, StoreError> {
        tracing::debug!("GET /tasks");
        let resp = self.execute(self.http.get(self.url("/tasks"))).await?;
        Ok(resp.json().await?)
    }

    async fn create_task(&self, draft: &TaskDraft) -> Result<Task, StoreError> {
        tracing::debug!(title = %draft.title, "POST /tasks");
        let resp = self
            .execute(self.http.post(self.url("/tasks")).json(draft))
            .await?;
        Ok(resp.json().await?)
    }

    async fn update_task(&self, id: &TaskId, patch: &TaskPatch) -> Result<Task, StoreError> {
        tracing::debug!(%id, "PUT /tasks/{{id}}");
        let resp = self
            .execute(self.http.put(self.task_url(id)).json(patch))
            .await?;
        Ok(resp.json().await?)
    }

    async fn patch_status(&self, id: &TaskId, status: Status) -> Result<Task, StoreError> {
        tracing::debug!(%id, %status, "PATCH /tasks/{{id}}/status");
        let url = self.url(&format!("/tasks/{id}/status"));
        let resp = self
            .execute(self.http.patch(url).json(&StatusBody { status }))
            .await?;
        Ok(resp.json().await?)
    }

    async fn delete_task(&self, id: &TaskId) -> Result<(), StoreError> {
        tracing::debug!(%id, "DELETE /tasks/{{id}}");
        self.execute(self.http.delete(self.task_url(id))).await?;
        Ok(())
    }

    async fn list_subtasks(&self, task: &TaskId) -> Result<Vec<Subtask>, StoreError> {
        tracing::debug!(%task, "GET /tasks/{{id}}/subtasks");
        let url = self.url(&format!("/tasks/{task}/subtasks"));
        let resp = self.execute(self.http.get(url)).await?;
        Ok(resp.json().await?)
    }

    async fn add_subtask(&self, task: &TaskId, title: &str) -> Result<Subtask, StoreError> {
        tracing::debug!(%task, "POST /tasks/{{id}}/subtasks");
        let url = self.url(&format!("/tasks/{task}/subtasks"));
        let resp = self
            .execute(self.http.post(url).json(&NewSubtask { title }))
            .await?;
        Ok(resp.json().await?)
    }

    async fn update_subtask(
        &self,
        task: &TaskId,
        subtask: &SubtaskId,
        patch: &SubtaskPatch,
    ) -> Result<Subtask, StoreError> {
        tracing::debug!(%task, %subtask, "PUT /tasks/{{id}}/subtasks/{{sid}}");
        let url = self.subtask_url(task, subtask)?;
        let resp = self.execute(self.http.put(url).json(patch)).await?;
        Ok(resp.json().await?)
    }

    async fn delete_subtask(&self, task: &TaskId, subtask: &SubtaskId) -> Result<(), StoreError> {
        tracing::debug!(%task, %subtask, "DELETE /tasks/{{id}}/subtasks/{{sid}}");
        let url = self.subtask_url(task, subtask)?;
        self.execute(self.http.delete(url)).await?;
        Ok(())
    }
}

/// Map a service response onto the error taxonomy.
///
/// Returns the response unchanged on success. Handles:
/// - **401** → [`StoreError::Auth`]
/// - **404** → [`StoreError::NotFound`]
/// - **other non-success** → [`StoreError::Remote`] with the status code
///
/// The message is the body's `error`, `message` or `msg` field when it is JSON, else the
/// raw body, else the status reason.
pub async fn check_response(resp: Response) -> Result<Response, StoreError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let message = error_message(status, &body);
    Err(match status {
        StatusCode::UNAUTHORIZED => StoreError::Auth(message),
        StatusCode::NOT_FOUND => StoreError::NotFound(message),
        _ => StoreError::Remote {
            status: status.as_u16(),
            message,
        },
    })
}

fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        if let Some(msg) = parsed.error.or(parsed.message).or(parsed.msg) {
            return msg;
        }
    }
    let body = body.trim();
    if body.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        body.to_string()
    }
}
