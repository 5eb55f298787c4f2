//! Slack incoming-webhook notifications for sync runs.
//!
//! Delivery is best effort: every failure is logged and reported as `false`,
//! never propagated into the sync.

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use tracing::{debug, error, info};

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct Field<'a> {
    title: &'a str,
    value: String,
    short: bool,
}

#[derive(Debug, Serialize)]
struct Attachment<'a> {
    color: &'a str,
    fields: Vec<Field<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    text: String,
    attachments: Vec<Attachment<'a>>,
}

/// Per-source figures included in an update notification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateCounts {
    pub updated: usize,
    pub created: usize,
    /// Records the model extracted.
    pub total: usize,
    pub cost_usd: f64,
}

impl UpdateCounts {
    fn has_changes(&self) -> bool {
        self.updated > 0 || self.created > 0
    }
}

/// Posts run results to a webhook. Disabled when no URL is configured.
#[derive(Debug, Clone)]
pub struct Notifier {
    client: Client,
    webhook_url: Option<String>,
}

impl Notifier {
    pub fn new(webhook_url: Option<String>) -> Self {
        let webhook_url = webhook_url.filter(|url| !url.trim().is_empty());
        let client = Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            webhook_url,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.webhook_url.is_some()
    }

    /// Report the outcome of a source that was extracted and committed.
    pub async fn notify_update(&self, source_name: &str, counts: UpdateCounts) -> bool {
        if !self.is_enabled() {
            debug!("No webhook configured, skipping notification");
            return false;
        }
        let sent = self.post(&update_message(source_name, counts)).await;
        if sent {
            info!("Sent update notification for {}", source_name);
        }
        sent
    }

    /// Report a source that failed during the run.
    pub async fn notify_error(&self, source_name: &str, message: &str) -> bool {
        if !self.is_enabled() {
            return false;
        }
        let sent = self.post(&error_message(source_name, message)).await;
        if sent {
            info!("Sent error notification for {}", source_name);
        }
        sent
    }

    async fn post(&self, message: &Message<'_>) -> bool {
        let Some(url) = self.webhook_url.as_deref() else {
            return false;
        };
        let result = self
            .client
            .post(url)
            .json(message)
            .send()
            .await
            .and_then(|resp| resp.error_for_status());
        match result {
            Ok(_) => true,
            Err(e) => {
                error!("Webhook notification failed: {}", e);
                false
            }
        }
    }
}

fn update_message(source_name: &str, counts: UpdateCounts) -> Message<'static> {
    let (emoji, color) = if counts.has_changes() {
        ("🔔", "warning")
    } else {
        ("📝", "good")
    };
    Message {
        text: format!("{} 登山道情報の更新: {}", emoji, source_name),
        attachments: vec![Attachment {
            color,
            fields: vec![
                Field {
                    title: "情報源",
                    value: source_name.to_string(),
                    short: true,
                },
                Field {
                    title: "更新",
                    value: counts.updated.to_string(),
                    short: true,
                },
                Field {
                    title: "新規作成",
                    value: counts.created.to_string(),
                    short: true,
                },
                Field {
                    title: "総計",
                    value: counts.total.to_string(),
                    short: true,
                },
                Field {
                    title: "AI処理コスト",
                    value: format!("${:.4}", counts.cost_usd),
                    short: true,
                },
            ],
        }],
    }
}

fn error_message(source_name: &str, message: &str) -> Message<'static> {
    Message {
        text: format!("❌ 登山道情報同期エラー: {}", source_name),
        attachments: vec![Attachment {
            color: "danger",
            fields: vec![
                Field {
                    title: "情報源",
                    value: source_name.to_string(),
                    short: true,
                },
                Field {
                    title: "エラー内容",
                    value: message.to_string(),
                    short: false,
                },
            ],
        }],
    }
}
