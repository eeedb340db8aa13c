use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
};
use serde_json::json;
use uuid::Uuid;

use crate::{auth::AuthUser, axum_http::error_responses::AppError};
use application::usecases::notifications::NotificationUseCase;
use domain::{
    repositories::notifications::NotificationRepository,
    value_objects::notifications::ListNotificationsFilter,
};

pub fn routes<N>(usecase: Arc<NotificationUseCase<N>>) -> Router
where
    N: NotificationRepository + Send + Sync + 'static,
{
    Router::new()
        .route("/", get(list))
        .route("/read-all", post(mark_all_read))
        .route("/:notification_id/read", patch(mark_read))
        .with_state(usecase)
}

pub async fn list<N>(
    State(usecase): State<Arc<NotificationUseCase<N>>>,
    auth: AuthUser,
    Query(filter): Query<ListNotificationsFilter>,
) -> Result<impl IntoResponse, AppError>
where
    N: NotificationRepository + Send + Sync + 'static,
{
    let notifications = usecase.list(auth.user_id, &filter).await?;
    Ok(Json(notifications))
}

pub async fn mark_read<N>(
    State(usecase): State<Arc<NotificationUseCase<N>>>,
    auth: AuthUser,
    Path(notification_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError>
where
    N: NotificationRepository + Send + Sync + 'static,
{
    usecase.mark_read(auth.user_id, notification_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn mark_all_read<N>(
    State(usecase): State<Arc<NotificationUseCase<N>>>,
    auth: AuthUser,
) -> Result<impl IntoResponse, AppError>
where
    N: NotificationRepository + Send + Sync + 'static,
{
    let updated = usecase.mark_all_read(auth.user_id).await?;
    Ok(Json(json!({ "updated": updated })))
}
