use crate::config::stage::Stage;

#[derive(Debug, Clone)]
pub struct DotEnvyConfig {
    pub stage: Stage,
    pub backend_server: BackendServer,
    pub database: Database,
    pub supabase: Supabase,
    pub doku: Doku,
    pub app: App,
}

#[derive(Debug, Clone)]
pub struct BackendServer {
    pub port: u16,
    /// Megabytes.
    pub body_limit: u64,
    /// Seconds.
    pub timeout: u64,
}

#[derive(Debug, Clone)]
pub struct Database {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct Supabase {
    pub jwt_secret: String,
}

#[derive(Debug, Clone)]
pub struct Doku {
    pub client_id: String,
    pub secret_key: String,
    pub base_url: String,
    pub verify_notifications: bool,
}

#[derive(Debug, Clone)]
pub struct App {
    /// Public storefront origin used for checkout redirect urls.
    pub base_url: String,
}
