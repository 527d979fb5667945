//! Shares an answer to a Slack channel through an incoming webhook.

use std::time::Duration;

use chrono::{DateTime, Local};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tarifftok_core::config::SlackConfig;
use thiserror::Error;
use tracing::{info, warn};

pub const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Slack rejects section fields longer than this.
const MAX_ANALYSIS_CHARS: usize = 1000;
const TITLE: &str = "🏭 TariffTok AI Analysis";

#[derive(Debug, Error)]
pub enum SlackError {
    #[error("Slack webhook URL not configured. Set TARIFFTOK_SLACK_WEBHOOK_URL or slack.webhook_url.")]
    NotConfigured,
    #[error("Timeout sending to Slack")]
    Timeout,
    #[error("network error: {0}")]
    Http(#[source] reqwest::Error),
    #[error("Slack API returned status {status}: {body}")]
    Status { status: u16, body: String },
}

impl From<reqwest::Error> for SlackError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else {
            Self::Http(error)
        }
    }
}

pub struct SlackNotifier {
    client: reqwest::Client,
    webhook_url: Option<SecretString>,
}

impl SlackNotifier {
    pub fn new(webhook_url: Option<SecretString>) -> Result<Self, SlackError> {
        let client = reqwest::Client::builder().timeout(WEBHOOK_TIMEOUT).build().map_err(SlackError::Http)?;
        Ok(Self { client, webhook_url })
    }

    pub fn from_config(config: &SlackConfig) -> Result<Self, SlackError> {
        Self::new(config.webhook_url.clone())
    }

    pub fn is_configured(&self) -> bool {
        self.webhook_url.is_some()
    }

    pub async fn share(&self, query: &str, analysis: &str) -> Result<(), SlackError> {
        let webhook_url = self.webhook_url.as_ref().ok_or(SlackError::NotConfigured)?;
        let payload = share_payload(query, analysis, Local::now());

        let response = self.client.post(webhook_url.expose_secret()).json(&payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                event_name = "slack.share.rejected",
                status = status.as_u16(),
                "slack webhook rejected the message"
            );
            return Err(SlackError::Status { status: status.as_u16(), body });
        }

        info!(event_name = "slack.share.sent", "analysis shared to slack");
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextObject {
    #[serde(rename = "plain_text")]
    Plain { text: String },
    Mrkdwn { text: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Header { text: TextObject },
    Section { fields: Vec<TextObject> },
    Context { elements: Vec<TextObject> },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WebhookMessage {
    /// Notification fallback for clients that cannot render blocks.
    pub text: String,
    pub blocks: Vec<Block>,
}

/// Header, query and analysis fields, and a timestamp context line.
pub fn share_payload(query: &str, analysis: &str, sent_at: DateTime<Local>) -> WebhookMessage {
    WebhookMessage {
        text: format!("*{TITLE}*"),
        blocks: vec![
            Block::Header { text: TextObject::Plain { text: TITLE.to_string() } },
            Block::Section {
                fields: vec![
                    TextObject::Mrkdwn { text: format!("*Query:*\n{query}") },
                    TextObject::Mrkdwn { text: format!("*Analysis:*\n{}", truncated(analysis)) },
                ],
            },
            Block::Context {
                elements: vec![TextObject::Mrkdwn {
                    text: format!("Generated by TariffTok AI at {}", sent_at.format("%Y-%m-%d %H:%M:%S")),
                }],
            },
        ],
    }
}

fn truncated(text: &str) -> String {
    match text.char_indices().nth(MAX_ANALYSIS_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
