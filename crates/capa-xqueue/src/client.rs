//! HTTP client for an XQueue grading service.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use capa_core::{QueueError, QueueHeader, QueueReply, XQueue};

const DEFAULT_TIMEOUT_SECS: u64 = 10;
const LOGIN_REQUIRED: &str = "login_required";

/// Queue client speaking the XQueue form protocol.
///
/// Submissions go to `{url}/xqueue/submit/`. The service keeps a session
/// cookie; when it answers `login_required` the client logs in at
/// `{url}/xqueue/login/` and resubmits once.
pub struct XQueueClient {
    base_url: String,
    username: String,
    password: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl XQueueClient {
    pub fn new(base_url: &str, username: &str, password: &str) -> Result<Self, QueueError> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .map_err(|e| QueueError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            client,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post_form<T: Serialize + ?Sized>(&self, endpoint: &str, form: &T) -> Result<QueueReply, QueueError> {
        let url = format!("{}/xqueue/{endpoint}/", self.base_url);
        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .form(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    QueueError::Timeout(self.timeout.as_secs())
                } else {
                    QueueError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if status == 401 || status == 403 {
            let body = response.text().await.unwrap_or_default();
            return Err(QueueError::AuthenticationFailed(body));
        }
        if status >= 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(QueueError::Http {
                status,
                message: body,
            });
        }

        response.json::<QueueReply>().await.map_err(|e| QueueError::Http {
            status,
            message: format!("failed to parse queue reply: {e}"),
        })
    }

    /// Establish a session with the queue.
    #[instrument(skip(self), fields(url = %self.base_url))]
    pub async fn login(&self) -> Result<(), QueueError> {
        let reply = self
            .post_form(
                "login",
                &[("username", self.username.as_str()), ("password", self.password.as_str())],
            )
            .await?;
        if !reply.is_success() {
            return Err(QueueError::AuthenticationFailed(reply.content));
        }
        debug!("logged in to queue");
        Ok(())
    }

    async fn submit(&self, header: &str, body: &str) -> Result<QueueReply, QueueError> {
        self.post_form("submit", &[("xqueue_header", header), ("xqueue_body", body)])
            .await
    }
}

#[async_trait]
impl XQueue for XQueueClient {
    fn name(&self) -> &str {
        "http"
    }

    #[instrument(skip(self, header, body), fields(queue = %header.queue_name))]
    async fn send_to_queue(&self, header: &QueueHeader, body: &str) -> Result<QueueReply, QueueError> {
        let header = serde_json::to_string(header).map_err(|e| QueueError::Network(e.to_string()))?;
        let reply = self.submit(&header, body).await?;
        if reply.is_success() || reply.content != LOGIN_REQUIRED {
            return Ok(reply);
        }

        warn!("queue session expired, logging in again");
        self.login().await?;
        self.submit(&header, body).await
    }
}
