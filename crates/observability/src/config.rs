use std::env;

use tracing::Level;
use url::Url;

/// Identifies the process an alert came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ServiceIdentity {
    pub(crate) service_name: String,
    pub(crate) stage: String,
    pub(crate) component: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DiscordAlertConfig {
    pub(crate) webhook_url: Url,
    pub(crate) min_level: Level,
}

#[derive(Debug, Clone)]
pub(crate) struct ObservabilityConfig {
    pub(crate) identity: ServiceIdentity,
    pub(crate) discord: Option<DiscordAlertConfig>,
    /// Problems found while reading the environment. Logged once tracing is up.
    pub(crate) warnings: Vec<String>,
}

impl ObservabilityConfig {
    pub(crate) fn from_env(component: &str) -> Self {
        Self::from_lookup(component, |key| env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(component: &str, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let component = component.trim().to_string();
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let identity = ServiceIdentity {
            service_name: non_empty("SERVICE_NAME").unwrap_or_else(|| component.clone()),
            stage: non_empty("STAGE").unwrap_or_else(|| "unknown".to_string()),
            component,
        };

        let mut warnings = Vec::new();
        let discord = discord_alerts(&non_empty, &mut warnings);

        Self {
            identity,
            discord,
            warnings,
        }
    }
}

fn discord_alerts<F>(lookup: &F, warnings: &mut Vec<String>) -> Option<DiscordAlertConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let enabled = lookup("DISCORD_NOTIFY_ENABLED")
        .and_then(|raw| parse_bool(&raw))
        .unwrap_or(true);
    if !enabled {
        return None;
    }

    let raw_url = lookup("DISCORD_WEBHOOK_URL")?;
    let webhook_url = match Url::parse(raw_url.trim()) {
        Ok(url) => url,
        Err(err) => {
            // The url itself carries the webhook token, so only the parse error is reported.
            warnings.push(format!(
                "DISCORD_WEBHOOK_URL is invalid, Discord alerts disabled (parse error: {err})"
            ));
            return None;
        }
    };

    let min_level = match lookup("DISCORD_NOTIFY_LEVEL") {
        Some(raw) => parse_level(&raw).unwrap_or_else(|| {
            warnings.push(format!(
                "DISCORD_NOTIFY_LEVEL is invalid (value: {raw}), falling back to ERROR"
            ));
            Level::ERROR
        }),
        None => Level::ERROR,
    };

    Some(DiscordAlertConfig {
        webhook_url,
        min_level,
    })
}

fn parse_level(input: &str) -> Option<Level> {
    match input.trim().to_ascii_lowercase().as_str() {
        "error" => Some(Level::ERROR),
        "warn" | "warning" => Some(Level::WARN),
        "info" => Some(Level::INFO),
        "debug" => Some(Level::DEBUG),
        "trace" => Some(Level::TRACE),
        _ => None,
    }
}

fn parse_bool(input: &str) -> Option<bool> {
    match input.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
