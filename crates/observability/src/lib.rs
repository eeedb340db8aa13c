mod config;
mod discord;
mod dispatcher;
mod layer;

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer, filter::LevelFilter, fmt::time::ChronoLocal, layer::SubscriberExt,
    util::SubscriberInitExt,
};

use config::ObservabilityConfig;
use discord::DiscordAlertSink;
use dispatcher::{AlertDispatcher, AlertSink};
use layer::ErrorAlertLayer;

/// Installs the global subscriber: `RUST_LOG` filtering (default `info`), local
/// time stamps, and Discord alerts when `DISCORD_WEBHOOK_URL` is configured.
///
/// Must run inside a tokio runtime; the alert dispatcher spawns its worker task.
pub fn init_observability(component: &str) -> Result<()> {
    let mut config = ObservabilityConfig::from_env(component);

    let alert_layer = match config.discord.as_ref() {
        Some(discord) => match DiscordAlertSink::new(discord.webhook_url.clone()) {
            Ok(sink) => {
                let sinks: Vec<Arc<dyn AlertSink>> = vec![Arc::new(sink)];
                Some(
                    ErrorAlertLayer::new(
                        AlertDispatcher::spawn(sinks),
                        config.identity.clone(),
                        discord.min_level,
                    )
                    .with_filter(LevelFilter::from_level(discord.min_level)),
                )
            }
            Err(err) => {
                config
                    .warnings
                    .push(format!("Discord alert client could not be built: {err}"));
                None
            }
        },
        None => None,
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_timer(ChronoLocal::rfc_3339());

    let alerts_enabled = alert_layer.is_some();

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(alert_layer)
        .with(env_filter)
        .try_init()?;

    let identity = &config.identity;
    for warning in &config.warnings {
        warn!(
            service = %identity.service_name,
            stage = %identity.stage,
            component = %identity.component,
            warning = %warning,
            "observability: config warning"
        );
    }

    info!(
        service = %identity.service_name,
        stage = %identity.stage,
        component = %identity.component,
        alerts_enabled,
        "observability: tracing initialised"
    );

    Ok(())
}
