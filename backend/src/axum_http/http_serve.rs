use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Result;
use axum::{
    Extension, Router,
    http::{
        Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::get,
};
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info};

use crate::{
    auth::SupabaseJwtSecret,
    axum_http::{default_routers, routers},
    config::config_model::DotEnvyConfig,
};
use application::{
    interfaces::payment_gateway::PaymentGateway,
    usecases::{
        enrollment_payments::EnrollmentPaymentUseCase, notifications::NotificationUseCase,
    },
};
use domain::repositories::{
    courses::CourseCatalogRepository, enrollments::EnrollmentRepository,
    notifications::NotificationRepository,
};
use infra::postgres::{
    postgres_connection::PgPoolSquad,
    repositories::{
        courses::CourseCatalogPostgres, enrollments::EnrollmentPostgres,
        notifications::NotificationPostgres,
    },
};
use payments::doku_client::{DokuClient, DokuConfig};

pub const NOTIFICATION_PATH: &str = "/api/v1/payments/notification";

pub async fn start(config: Arc<DotEnvyConfig>, db_pool: Arc<PgPoolSquad>) -> Result<()> {
    let doku_client = DokuClient::new(doku_config(&config))?;
    info!(
        base_url = %config.doku.base_url,
        verify_notifications = config.doku.verify_notifications,
        "DOKU client has been configured"
    );

    let enrollment_repository = Arc::new(EnrollmentPostgres::new(Arc::clone(&db_pool)));
    let course_repository = Arc::new(CourseCatalogPostgres::new(Arc::clone(&db_pool)));
    let notification_repository = Arc::new(NotificationPostgres::new(Arc::clone(&db_pool)));

    let payment_usecase = Arc::new(EnrollmentPaymentUseCase::new(
        enrollment_repository,
        course_repository,
        Arc::clone(&notification_repository),
        Arc::new(doku_client),
        config.doku.verify_notifications,
    ));
    let notification_usecase = Arc::new(NotificationUseCase::new(notification_repository));

    let app = build_router(&config, payment_usecase, notification_usecase)?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.backend_server.port));
    let listener = TcpListener::bind(addr).await?;

    info!(
        stage = %config.stage,
        "Server is running on port {}", config.backend_server.port
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

pub fn build_router<E, C, N, G>(
    config: &DotEnvyConfig,
    payment_usecase: Arc<EnrollmentPaymentUseCase<E, C, N, G>>,
    notification_usecase: Arc<NotificationUseCase<N>>,
) -> Result<Router>
where
    E: EnrollmentRepository + Send + Sync + 'static,
    C: CourseCatalogRepository + Send + Sync + 'static,
    N: NotificationRepository + Send + Sync + 'static,
    G: PaymentGateway + Send + Sync + 'static,
{
    // Merged after the timeout and body limit: the gateway must always get a 200 ack.
    let gateway_notifications = routers::payments::notification_route(
        NOTIFICATION_PATH,
        Arc::clone(&payment_usecase),
    );

    let app = Router::new()
        .fallback(default_routers::not_found)
        .nest(
            "/api/v1/payments",
            routers::payments::routes(Arc::clone(&payment_usecase)),
        )
        .nest(
            "/api/v1/enrollments",
            routers::enrollments::routes(payment_usecase),
        )
        .nest(
            "/api/v1/notifications",
            routers::notifications::routes(notification_usecase),
        )
        .route("/api/v1/health-check", get(default_routers::health_check))
        .layer(Extension(SupabaseJwtSecret(
            config.supabase.jwt_secret.clone(),
        )))
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.backend_server.timeout,
        )))
        .layer(RequestBodyLimitLayer::new(
            (config.backend_server.body_limit * 1024 * 1024).try_into()?,
        ))
        .merge(gateway_notifications)
        .layer(
            CorsLayer::new()
                .allow_methods([Method::GET, Method::POST, Method::PATCH])
                .allow_headers([AUTHORIZATION, CONTENT_TYPE])
                .allow_origin(Any),
        )
        .layer(TraceLayer::new_for_http());

    Ok(app)
}

fn doku_config(config: &DotEnvyConfig) -> DokuConfig {
    let app_base_url = &config.app.base_url;

    DokuConfig {
        client_id: config.doku.client_id.clone(),
        secret_key: config.doku.secret_key.clone(),
        base_url: config.doku.base_url.clone(),
        success_url: format!("{app_base_url}/payment/success"),
        cancel_url: format!("{app_base_url}/payment/failed"),
        result_url: format!("{app_base_url}/courses"),
        notification_path: NOTIFICATION_PATH.to_string(),
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received ctrl+C signal"),
        Err(err) => error!(error = %err, "Failed to install CTRL+C signal handler"),
    }
}
