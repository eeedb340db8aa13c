use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::SecondsFormat;
use reqwest::Client;
use serde_json::json;
use url::Url;

use crate::dispatcher::{AlertEvent, AlertSink};

const DISCORD_CONTENT_LIMIT: usize = 2000;
const TRUNCATED_SUFFIX: &str = "\n… (truncated)";

pub(crate) struct DiscordAlertSink {
    webhook_url: Url,
    client: Client,
}

impl DiscordAlertSink {
    pub(crate) fn new(webhook_url: Url) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(3)).build()?;

        Ok(Self {
            webhook_url,
            client,
        })
    }
}

#[async_trait]
impl AlertSink for DiscordAlertSink {
    async fn deliver(&self, event: &AlertEvent) -> Result<()> {
        let response = self
            .client
            .post(self.webhook_url.clone())
            .json(&json!({ "content": render(event) }))
            .send()
            .await
            .map_err(describe_transport_error)?;

        if response.status().is_success() {
            return Ok(());
        }

        Err(anyhow!("discord webhook answered {}", response.status()))
    }

    fn name(&self) -> &'static str {
        "discord"
    }
}

/// Message body for one alert, capped at Discord's content limit.
pub(crate) fn render(event: &AlertEvent) -> String {
    let mut lines = vec![
        format!(
            "**{}** `{}` `{}` `{}`",
            event.service_name,
            event.stage,
            event.component,
            event.level.as_str()
        ),
        format!(
            "`{}` `{}`{}",
            event.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            event.target,
            event
                .location
                .as_deref()
                .map(|location| format!(" `{location}`"))
                .unwrap_or_default()
        ),
    ];

    if let Some(message) = event.message.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
        lines.push(format!("> {message}"));
    }

    for (key, value) in &event.fields {
        lines.push(format!("- `{key}` = `{value}`"));
    }

    for span in event.spans.iter().filter(|span| !span.fields.is_empty()) {
        lines.push(format!("span `{}`:", span.name));
        for (key, value) in &span.fields {
            lines.push(format!("- `{key}` = `{value}`"));
        }
    }

    truncate(lines.join("\n"))
}

fn truncate(content: String) -> String {
    if content.chars().count() <= DISCORD_CONTENT_LIMIT {
        return content;
    }

    let keep = DISCORD_CONTENT_LIMIT - TRUNCATED_SUFFIX.chars().count();
    let mut truncated: String = content.chars().take(keep).collect();
    truncated.push_str(TRUNCATED_SUFFIX);
    truncated
}

// reqwest errors can echo the request url, which embeds the webhook token.
fn describe_transport_error(err: reqwest::Error) -> anyhow::Error {
    if err.is_timeout() {
        anyhow!("discord webhook request timed out")
    } else if err.is_connect() {
        anyhow!("discord webhook connection failed")
    } else {
        anyhow!("discord webhook request failed")
    }
}
