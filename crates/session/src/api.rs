//! HTTP API client for history and action commits.
//!
//! The `EchoApi` trait is the seam the session coordinator talks through;
//! `ApiClient` is the reqwest-backed production implementation.

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use echo_protocol::HistoryEntry;

use crate::error::ApiError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Backend operations the session coordinator depends on
pub trait EchoApi: Send + Sync + 'static {
    /// Full message history for one conversation, oldest first.
    fn fetch_chat_history(
        &self,
        chat_id: &str,
    ) -> impl Future<Output = Result<Vec<HistoryEntry>, ApiError>> + Send;

    /// Persist an accepted todo proposal.
    fn save_todo(&self, todo_id: &str) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// Remove a previously saved todo.
    fn remove_todo(&self, todo_id: &str) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// Push a reminder message about a todo into its group channel.
    fn send_reminder(
        &self,
        todo_id: &str,
        group_id: &str,
        message: &str,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplyToGroupRequest<'a> {
    todo_id: &'a str,
    to_group_id: &'a str,
    send_msg: &'a str,
    user_info_list: Vec<UserInfo<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UserInfo<'a> {
    user_id: &'a str,
    username: &'a str,
}

/// Production client; all calls share one pooled reqwest client with a
/// 10s timeout.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    user_id: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, user_id: impl Into<String>) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            user_id: user_id.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let mapped = match status.as_u16() {
            401 => ApiError::Unauthorized,
            404 => ApiError::NotFound,
            code => {
                let message = response.text().await.unwrap_or_default();
                ApiError::Status {
                    status: code,
                    message,
                }
            }
        };
        warn!(
            component = "api",
            event = "api.request.failed",
            status = status.as_u16(),
            error = %mapped,
        );
        Err(mapped)
    }
}

impl EchoApi for ApiClient {
    async fn fetch_chat_history(&self, chat_id: &str) -> Result<Vec<HistoryEntry>, ApiError> {
        let url = self.url(&format!(
            "/echo/history/{}",
            urlencoding::encode(chat_id)
        ));
        let response = Self::check_status(self.http.get(&url).send().await?).await?;
        let entries: Vec<HistoryEntry> = response
            .json()
            .await
            .map_err(|e| ApiError::Body(e.to_string()))?;
        debug!(
            component = "api",
            event = "api.history.fetched",
            chat_id = %chat_id,
            entries = entries.len(),
        );
        Ok(entries)
    }

    async fn save_todo(&self, todo_id: &str) -> Result<(), ApiError> {
        let url = self.url("/todo/save");
        let response = self
            .http
            .get(&url)
            .query(&[("todoId", todo_id)])
            .send()
            .await?;
        Self::check_status(response).await?;
        debug!(
            component = "api",
            event = "api.todo.saved",
            todo_id = %todo_id,
        );
        Ok(())
    }

    async fn remove_todo(&self, todo_id: &str) -> Result<(), ApiError> {
        let url = self.url("/todo/remove");
        let response = self
            .http
            .get(&url)
            .query(&[("todoId", todo_id)])
            .send()
            .await?;
        Self::check_status(response).await?;
        debug!(
            component = "api",
            event = "api.todo.removed",
            todo_id = %todo_id,
        );
        Ok(())
    }

    async fn send_reminder(
        &self,
        todo_id: &str,
        group_id: &str,
        message: &str,
    ) -> Result<(), ApiError> {
        let url = self.url("/qt/replyToGroup");
        let response = self
            .http
            .post(&url)
            .json(&ReplyToGroupRequest {
                todo_id,
                to_group_id: group_id,
                send_msg: message,
                user_info_list: vec![UserInfo {
                    user_id: &self.user_id,
                    username: &self.user_id,
                }],
            })
            .send()
            .await?;
        Self::check_status(response).await?;
        debug!(
            component = "api",
            event = "api.reminder.sent",
            todo_id = %todo_id,
            group_id = %group_id,
        );
        Ok(())
    }
}
