use anyhow::{Context, Result};

use crate::config::{
    config_model::{App, BackendServer, Database, Doku, DotEnvyConfig, Supabase},
    stage::Stage,
};

const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;

pub fn load() -> Result<DotEnvyConfig> {
    dotenvy::dotenv().ok();

    let stage = get_stage();

    let backend_server = BackendServer {
        port: required("SERVER_PORT_BACKEND")?
            .parse()
            .context("SERVER_PORT_BACKEND is invalid")?,
        body_limit: required("SERVER_BODY_LIMIT")?
            .parse()
            .context("SERVER_BODY_LIMIT is invalid")?,
        timeout: required("SERVER_TIMEOUT")?
            .parse()
            .context("SERVER_TIMEOUT is invalid")?,
    };

    let database = Database {
        url: required("DATABASE_URL")?,
        max_connections: optional("DATABASE_MAX_CONNECTIONS")
            .map(|raw| raw.parse())
            .transpose()
            .context("DATABASE_MAX_CONNECTIONS is invalid")?
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS),
    };

    let supabase = Supabase {
        jwt_secret: required("SUPABASE_JWT_SECRET")?,
    };

    let doku = Doku {
        client_id: required("DOKU_CLIENT_ID")?,
        secret_key: required("DOKU_SECRET_KEY")?,
        base_url: optional("DOKU_BASE_URL")
            .unwrap_or_else(|| stage.default_doku_base_url().to_string())
            .trim_end_matches('/')
            .to_string(),
        verify_notifications: optional("DOKU_VERIFY_NOTIFICATIONS")
            .map(|raw| parse_flag(&raw))
            .transpose()?
            .unwrap_or(true),
    };

    let app = App {
        base_url: required("APP_BASE_URL")?.trim_end_matches('/').to_string(),
    };

    Ok(DotEnvyConfig {
        stage,
        backend_server,
        database,
        supabase,
        doku,
        app,
    })
}

pub fn get_stage() -> Stage {
    dotenvy::dotenv().ok();

    let stage_str = std::env::var("STAGE").unwrap_or_default();
    Stage::try_from(&stage_str).unwrap_or_default()
}

pub fn get_supabase_jwt_secret() -> Result<String> {
    dotenvy::dotenv().ok();

    required("SUPABASE_JWT_SECRET")
}

fn required(key: &str) -> Result<String> {
    optional(key).with_context(|| format!("{key} is invalid"))
}

fn optional(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_flag(raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("DOKU_VERIFY_NOTIFICATIONS is invalid: {other}"),
    }
}
