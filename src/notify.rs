use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tokio::{
    sync::{Semaphore, mpsc},
    task::{JoinHandle, JoinSet},
};

const FCM_ENDPOINT: &str = "https://fcm.googleapis.com/v1/projects";

/// The title/body pair shown on the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum PushError {
    #[error("push transport error: {0}")]
    Transport(String),
    #[error("push rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("simulated push failure")]
    Simulated,
}

// 1. PushSender Contract
/// PushSender
///
/// Delivers one message to one device token. The dispatcher decides concurrency;
/// implementations only send.
#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send(&self, token: &str, message: &PushMessage) -> Result<(), PushError>;

    /// A disabled sender is skipped entirely by the dispatcher.
    fn is_enabled(&self) -> bool {
        true
    }
}

/// PushState
///
/// The shared handle used by the dispatcher.
pub type PushState = Arc<dyn PushSender>;

// 2. The Real Implementation (FCM HTTP v1)
/// FcmPushClient
///
/// Sends through `POST /v1/projects/{project}/messages:send` with an OAuth2 bearer
/// access token.
#[derive(Clone)]
pub struct FcmPushClient {
    http: reqwest::Client,
    url: String,
    access_token: String,
}

impl FcmPushClient {
    pub fn new(project_id: &str, access_token: &str) -> Result<Self, PushError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| PushError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            url: format!("{FCM_ENDPOINT}/{project_id}/messages:send"),
            access_token: access_token.to_string(),
        })
    }
}

#[async_trait]
impl PushSender for FcmPushClient {
    async fn send(&self, token: &str, message: &PushMessage) -> Result<(), PushError> {
        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.access_token)
            .json(&json!({
                "message": {
                    "token": token,
                    "notification": { "title": message.title, "body": message.body },
                }
            }))
            .send()
            .await
            .map_err(|e| PushError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(PushError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

/// Used when FCM credentials are not configured.
#[derive(Clone, Default)]
pub struct DisabledPushSender;

#[async_trait]
impl PushSender for DisabledPushSender {
    async fn send(&self, _token: &str, _message: &PushMessage) -> Result<(), PushError> {
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

// 3. The Mock Implementation (For Tests)
/// MockPushSender
///
/// Records every delivered token and the peak number of concurrent sends.
#[derive(Default)]
pub struct MockPushSender {
    /// When true, every send fails.
    pub should_fail: bool,
    /// Artificial latency per send.
    pub delay: Option<Duration>,
    sent: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl MockPushSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PushSender for MockPushSender {
    async fn send(&self, token: &str, _message: &PushMessage) -> Result<(), PushError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.should_fail {
            return Err(PushError::Simulated);
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(token.to_string());
        }
        Ok(())
    }
}

/// Outcome of one fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchReport {
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
}

/// PushDispatcher
///
/// Fans a message out to every device token of a user. At most `max_in_flight` sends
/// run at once across all fan-outs. Each fan-out runs on its own task; the caller may
/// await the returned handle or drop it.
#[derive(Clone)]
pub struct PushDispatcher {
    sender: PushState,
    limit: Arc<Semaphore>,
    reports: Option<mpsc::UnboundedSender<DispatchReport>>,
}

impl PushDispatcher {
    pub fn new(sender: PushState, max_in_flight: usize) -> Self {
        Self {
            sender,
            limit: Arc::new(Semaphore::new(max_in_flight.max(1))),
            reports: None,
        }
    }

    /// Publishes every finished fan-out's report on `tx`.
    pub fn with_reports(mut self, tx: mpsc::UnboundedSender<DispatchReport>) -> Self {
        self.reports = Some(tx);
        self
    }

    pub fn dispatch(&self, tokens: Vec<String>, message: PushMessage) -> JoinHandle<DispatchReport> {
        let sender = self.sender.clone();
        let limit = self.limit.clone();
        let reports = self.reports.clone();
        let message = Arc::new(message);

        tokio::spawn(async move {
            let mut report = DispatchReport::default();
            if sender.is_enabled() {
                let mut set = JoinSet::new();
                for token in tokens {
                    let Ok(permit) = limit.clone().acquire_owned().await else {
                        break;
                    };
                    report.attempted += 1;
                    let sender = sender.clone();
                    let message = message.clone();
                    set.spawn(async move {
                        let _permit = permit;
                        let result = sender.send(&token, &message).await;
                        (token, result)
                    });
                }

                while let Some(joined) = set.join_next().await {
                    match joined {
                        Ok((_, Ok(()))) => report.delivered += 1,
                        Ok((token, Err(err))) => {
                            tracing::warn!(token = %token, error = %err, "push delivery failed");
                            report.failed += 1;
                        }
                        Err(err) => {
                            tracing::error!(error = ?err, "push task failed");
                            report.failed += 1;
                        }
                    }
                }
            } else {
                tracing::debug!(tokens = tokens.len(), "push disabled, skipping fan-out");
            }

            if let Some(tx) = reports {
                let _ = tx.send(report);
            }
            report
        })
    }
}
