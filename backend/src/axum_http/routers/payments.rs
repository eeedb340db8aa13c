use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{State, rejection::BytesRejection},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
};
use tracing::{info, warn};

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
    value_objects::{
        enrollments::{CreatePaymentModel, CreatedPaymentDto},
        payments::{NotificationHeaders, VerifyPaymentDto, VerifyPaymentModel, WebhookAck},
    },
};

pub fn routes<E, C, N, G>(usecase: Arc<EnrollmentPaymentUseCase<E, C, N, G>>) -> Router
where
    E: EnrollmentRepository + Send + Sync + 'static,
    C: CourseCatalogRepository + Send + Sync + 'static,
    N: NotificationRepository + Send + Sync + 'static,
    G: PaymentGateway + Send + Sync + 'static,
{
    Router::new()
        .route("/create", post(create_payment))
        .route("/verify", post(verify_payment))
        .with_state(usecase)
}

/// Gateway notification endpoint. Mounted on its own so the server can keep it
/// outside the request timeout and body limit.
pub fn notification_route<E, C, N, G>(
    path: &str,
    usecase: Arc<EnrollmentPaymentUseCase<E, C, N, G>>,
) -> Router
where
    E: EnrollmentRepository + Send + Sync + 'static,
    C: CourseCatalogRepository + Send + Sync + 'static,
    N: NotificationRepository + Send + Sync + 'static,
    G: PaymentGateway + Send + Sync + 'static,
{
    Router::new()
        .route(path, post(handle_notification))
        .with_state(usecase)
}

pub async fn create_payment<E, C, N, G>(
    State(usecase): State<Arc<EnrollmentPaymentUseCase<E, C, N, G>>>,
    auth: AuthUser,
    Json(create_payment_model): Json<CreatePaymentModel>,
) -> Result<Json<CreatedPaymentDto>, AppError>
where
    E: EnrollmentRepository + Send + Sync + 'static,
    C: CourseCatalogRepository + Send + Sync + 'static,
    N: NotificationRepository + Send + Sync + 'static,
    G: PaymentGateway + Send + Sync + 'static,
{
    let selection = create_payment_model
        .into_selection()
        .map_err(AppError::BadRequest)?;

    let created = usecase.create_payment(&auth.purchaser(), selection).await?;
    Ok(Json(created))
}

/// Public endpoint the gateway posts to. Always answers 200 so the gateway
/// does not retry on our own failures.
pub async fn handle_notification<E, C, N, G>(
    State(usecase): State<Arc<EnrollmentPaymentUseCase<E, C, N, G>>>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> (StatusCode, Json<WebhookAck>)
where
    E: EnrollmentRepository + Send + Sync + 'static,
    C: CourseCatalogRepository + Send + Sync + 'static,
    N: NotificationRepository + Send + Sync + 'static,
    G: PaymentGateway + Send + Sync + 'static,
{
    let notification_headers = notification_headers(&headers);
    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            warn!(
                request_id = ?notification_headers.request_id,
                rejection = %rejection,
                "payments router: unreadable gateway notification body"
            );
            return (
                StatusCode::OK,
                Json(WebhookAck::new("ignored", "unreadable notification body")),
            );
        }
    };

    info!(
        request_id = ?notification_headers.request_id,
        body_bytes = body.len(),
        "payments router: gateway notification received"
    );

    let ack = usecase
        .handle_notification(&notification_headers, &body)
        .await;

    (StatusCode::OK, Json(ack))
}

pub async fn verify_payment<E, C, N, G>(
    State(usecase): State<Arc<EnrollmentPaymentUseCase<E, C, N, G>>>,
    auth: AuthUser,
    Json(verify_payment_model): Json<VerifyPaymentModel>,
) -> Result<impl IntoResponse, AppError>
where
    E: EnrollmentRepository + Send + Sync + 'static,
    C: CourseCatalogRepository + Send + Sync + 'static,
    N: NotificationRepository + Send + Sync + 'static,
    G: PaymentGateway + Send + Sync + 'static,
{
    let target = verify_payment_model
        .into_target()
        .map_err(AppError::BadRequest)?;

    let result = usecase.verify_payment(auth.user_id, target).await?;
    Ok(Json(VerifyPaymentDto::from(result)))
}

fn notification_headers(headers: &HeaderMap) -> NotificationHeaders {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.trim().to_string())
    };

    NotificationHeaders {
        client_id: header("client-id"),
        request_id: header("request-id"),
        request_timestamp: header("request-timestamp"),
        signature: header("signature"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::SupabaseJwtSecret;
    use application::interfaces::payment_gateway::MockPaymentGateway;
    use axum::{Extension, body::Body, http::Request};
    use domain::{
        repositories::{
            courses::MockCourseCatalogRepository, enrollments::MockEnrollmentRepository,
            notifications::MockNotificationRepository,
        },
        value_objects::payments::{GatewayStatus, GatewayTransaction},
    };
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    const SECRET: &str = "router-test-secret";

    fn app(
        enrollments: MockEnrollmentRepository,
        gateway: MockPaymentGateway,
        verify_notifications: bool,
    ) -> Router {
        let usecase = EnrollmentPaymentUseCase::new(
            Arc::new(enrollments),
            Arc::new(MockCourseCatalogRepository::new()),
            Arc::new(MockNotificationRepository::new()),
            Arc::new(gateway),
            verify_notifications,
        );

        let usecase = Arc::new(usecase);
        routes(Arc::clone(&usecase))
            .merge(notification_route("/notification", usecase))
            .layer(Extension(SupabaseJwtSecret(SECRET.to_string())))
    }

    fn bearer() -> String {
        let claims = json!({
            "sub": "123e4567-e89b-12d3-a456-426614174000",
            "aud": "authenticated",
            "role": "authenticated",
            "email": "budi@example.com",
            "exp": 9999999999_u64,
        });
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        format!("Bearer {token}")
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn notification_with_bad_signature_is_acknowledged_with_200() {
        let mut gateway = MockPaymentGateway::new();
        gateway.expect_verify_notification().returning(|_, _| false);

        let mut enrollments = MockEnrollmentRepository::new();
        enrollments.expect_find_by_payment_reference().times(0);
        enrollments.expect_mark_paid_by_reference().times(0);

        let response = app(enrollments, gateway, true)
            .oneshot(
                Request::post("/notification")
                    .header("Client-Id", "BRN-0001")
                    .header("Signature", "HMACSHA256=forged")
                    .body(Body::from(r#"{"order":{"invoice_number":"INV-1-a"}}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ignored");
    }

    #[tokio::test]
    async fn notification_store_failure_still_answers_200() {
        let mut gateway = MockPaymentGateway::new();
        gateway.expect_parse_notification().returning(|_| {
            Ok(GatewayTransaction {
                invoice_number: "INV-1-abcdef12".to_string(),
                status: GatewayStatus::Success,
                channel: Some("QRIS".to_string()),
                amount: 150_000,
            })
        });

        let mut enrollments = MockEnrollmentRepository::new();
        enrollments
            .expect_find_by_payment_reference()
            .returning(|_| Err(anyhow::anyhow!("connection refused")));

        let response = app(enrollments, gateway, false)
            .oneshot(
                Request::post("/notification")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["invoiceNumber"], "INV-1-abcdef12");
    }

    #[tokio::test]
    async fn create_requires_authentication() {
        let response = app(MockEnrollmentRepository::new(), MockPaymentGateway::new(), true)
            .oneshot(
                Request::post("/create")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"isBundle":true,"bundlePrice":100000}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn create_rejects_incomplete_selection() {
        let response = app(MockEnrollmentRepository::new(), MockPaymentGateway::new(), true)
            .oneshot(
                Request::post("/create")
                    .header("authorization", bearer())
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"isBundle":false}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "courseId is required");
    }

    #[tokio::test]
    async fn verify_without_enrollment_is_404() {
        let mut enrollments = MockEnrollmentRepository::new();
        enrollments
            .expect_find_by_user_and_course()
            .returning(|_, _| Ok(None));

        let response = app(enrollments, MockPaymentGateway::new(), true)
            .oneshot(
                Request::post("/verify")
                    .header("authorization", bearer())
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"courseId":"3f2a9c1b-0000-4000-8000-000000000001"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn oversized_notification_is_acknowledged_with_200() {
        let mut enrollments = MockEnrollmentRepository::new();
        enrollments.expect_find_by_payment_reference().times(0);

        let oversized = vec![b' '; 3 * 1024 * 1024];
        let response = app(enrollments, MockPaymentGateway::new(), true)
            .oneshot(
                Request::post("/notification")
                    .body(Body::from(oversized))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ignored");
    }
}
