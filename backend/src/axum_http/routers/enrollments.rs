use std::sync::Arc;

use axum::{Json, Router, extract::State, routing::get};

use crate::{auth::AuthUser, axum_http::error_responses::AppError};
use application::{
    interfaces::payment_gateway::PaymentGateway,
    usecases::enrollment_payments::EnrollmentPaymentUseCase,
};
use domain::{
    repositories::{
        courses::CourseCatalogRepository, enrollments::EnrollmentRepository,
        notifications::NotificationRepository,
    },
    value_objects::enrollments::EnrollmentDto,
};

pub fn routes<E, C, N, G>(usecase: Arc<EnrollmentPaymentUseCase<E, C, N, G>>) -> Router
where
    E: EnrollmentRepository + Send + Sync + 'static,
    C: CourseCatalogRepository + Send + Sync + 'static,
    N: NotificationRepository + Send + Sync + 'static,
    G: PaymentGateway + Send + Sync + 'static,
{
    Router::new()
        .route("/", get(list_enrollments))
        .with_state(usecase)
}

pub async fn list_enrollments<E, C, N, G>(
    State(usecase): State<Arc<EnrollmentPaymentUseCase<E, C, N, G>>>,
    auth: AuthUser,
) -> Result<Json<Vec<EnrollmentDto>>, AppError>
where
    E: EnrollmentRepository + Send + Sync + 'static,
    C: CourseCatalogRepository + Send + Sync + 'static,
    N: NotificationRepository + Send + Sync + 'static,
    G: PaymentGateway + Send + Sync + 'static,
{
    let enrollments = usecase.list_enrollments(auth.user_id).await?;
    Ok(Json(enrollments))
}
