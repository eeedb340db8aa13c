use std::{collections::HashSet, sync::Arc};

use chrono::{Duration, Utc};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use domain::{
    entities::{
        courses::CourseEntity,
        enrollments::{EnrollmentEntity, MarkPaidEnrollmentChangeset, UpsertPendingEnrollmentEntity},
        notifications::InsertNotificationEntity,
    },
    repositories::{
        courses::CourseCatalogRepository, enrollments::EnrollmentRepository,
        notifications::NotificationRepository,
    },
    value_objects::{
        enrollments::{
            CourseSelector, CreatedPaymentDto, EnrollmentDto, PurchaseSelection, Purchaser,
        },
        enums::{
            notification_types::NotificationType, payment_intents::PaymentIntent,
            payment_methods::PaymentMethod, payment_statuses::PaymentStatus,
        },
        invoices::{bundle_invoice_number, single_course_invoice_number},
        payments::{
            CheckoutCustomer, CheckoutLineItem, CheckoutRequest, CheckoutSession, GatewayTransaction,
            NotificationHeaders, ReconcileTrigger, ReconciliationOutcome, VerifyPaymentResult,
            VerifyTarget, WebhookAck,
        },
    },
};

use crate::{
    interfaces::payment_gateway::{GatewayError, PaymentGateway},
    usecases::notifications::NotificationEmitter,
};

pub const PAYMENT_EXPIRY_MINUTES: i64 = 60;

const COURSES_LINK: &str = "/courses";

const TITLE_PENDING: &str = "Menunggu Pembayaran";
const TITLE_PAID: &str = "Pembayaran Berhasil";
const TITLE_FAILED: &str = "Pembayaran Gagal";
const TITLE_EXPIRED: &str = "Pembayaran Kedaluwarsa";

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("authentication required")]
    Unauthenticated,
    #[error("{0}")]
    Validation(String),
    #[error("you are already enrolled in this course")]
    AlreadyEnrolled,
    #[error("you already own every course in the bundle")]
    AllCoursesOwned,
    #[error("course not found")]
    CourseNotFound,
    #[error("enrollment not found")]
    EnrollmentNotFound,
    #[error("payment reference not found")]
    ReferenceUnknown,
    #[error("{0}")]
    Gateway(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl PaymentError {
    pub fn status_code(&self) -> u16 {
        match self {
            PaymentError::Unauthenticated => 401,
            PaymentError::Validation(_)
            | PaymentError::AlreadyEnrolled
            | PaymentError::AllCoursesOwned => 400,
            PaymentError::CourseNotFound
            | PaymentError::EnrollmentNotFound
            | PaymentError::ReferenceUnknown => 404,
            PaymentError::Gateway(_) | PaymentError::Internal(_) => 500,
        }
    }
}

impl From<GatewayError> for PaymentError {
    fn from(err: GatewayError) -> Self {
        PaymentError::Gateway(err.user_message())
    }
}

pub type UseCaseResult<T> = std::result::Result<T, PaymentError>;

/// Creates checkout sessions and reconciles enrollments with what the gateway
/// reports. The webhook and the verify poll both end in [`Self::reconcile`].
pub struct EnrollmentPaymentUseCase<E, C, N, G>
where
    E: EnrollmentRepository + Send + Sync + 'static,
    C: CourseCatalogRepository + Send + Sync + 'static,
    N: NotificationRepository + Send + Sync + 'static,
    G: PaymentGateway + Send + Sync + 'static,
{
    enrollment_repo: Arc<E>,
    course_repo: Arc<C>,
    notifier: NotificationEmitter<N>,
    gateway: Arc<G>,
    verify_notifications: bool,
}

impl<E, C, N, G> EnrollmentPaymentUseCase<E, C, N, G>
where
    E: EnrollmentRepository + Send + Sync + 'static,
    C: CourseCatalogRepository + Send + Sync + 'static,
    N: NotificationRepository + Send + Sync + 'static,
    G: PaymentGateway + Send + Sync + 'static,
{
    pub fn new(
        enrollment_repo: Arc<E>,
        course_repo: Arc<C>,
        notification_repo: Arc<N>,
        gateway: Arc<G>,
        verify_notifications: bool,
    ) -> Self {
        Self {
            enrollment_repo,
            course_repo,
            notifier: NotificationEmitter::new(notification_repo),
            gateway,
            verify_notifications,
        }
    }

    pub async fn create_payment(
        &self,
        purchaser: &Purchaser,
        selection: PurchaseSelection,
    ) -> UseCaseResult<CreatedPaymentDto> {
        match selection {
            PurchaseSelection::Single {
                course,
                course_name,
                price,
            } => {
                self.create_single_payment(purchaser, course, course_name, price)
                    .await
            }
            PurchaseSelection::Bundle {
                bundle_price,
                bundle_name,
            } => {
                self.create_bundle_payment(purchaser, bundle_price, bundle_name)
                    .await
            }
        }
    }

    async fn create_single_payment(
        &self,
        purchaser: &Purchaser,
        selector: CourseSelector,
        course_name: Option<String>,
        client_price: Option<i64>,
    ) -> UseCaseResult<CreatedPaymentDto> {
        let user_id = purchaser.user_id;
        info!(%user_id, selector = ?selector, "payments: single course checkout requested");

        let course = self.resolve_course(user_id, selector).await?;

        let existing = self
            .enrollment_repo
            .find_by_user_and_course(user_id, course.id)
            .await
            .map_err(|err| {
                error!(
                    %user_id,
                    course_id = %course.id,
                    db_error = ?err,
                    "payments: failed to load existing enrollment"
                );
                PaymentError::Internal(err)
            })?;

        if existing.is_some_and(|row| row.payment_status == PaymentStatus::Paid.as_str()) {
            let err = PaymentError::AlreadyEnrolled;
            warn!(
                %user_id,
                course_id = %course.id,
                status = err.status_code(),
                "payments: course already paid"
            );
            return Err(err);
        }

        let price = if course.price > 0 {
            if let Some(client_price) = client_price.filter(|price| *price != course.price) {
                warn!(
                    %user_id,
                    course_id = %course.id,
                    client_price,
                    catalog_price = course.price,
                    "payments: client price differs from catalog, using catalog price"
                );
            }
            course.price
        } else {
            client_price.ok_or_else(|| {
                PaymentError::Validation("course price is not available".to_string())
            })?
        };

        let now = Utc::now();
        let invoice_number = single_course_invoice_number(now, course.id);
        let expires_at = now + Duration::minutes(PAYMENT_EXPIRY_MINUTES);

        self.store_pending(
            user_id,
            vec![UpsertPendingEnrollmentEntity {
                user_id,
                course_id: course.id,
                payment_status: PaymentStatus::Pending.to_string(),
                payment_reference: Some(invoice_number.clone()),
                payment_intent: Some(PaymentIntent::Single.to_string()),
                amount_paid: price,
                expires_at: Some(expires_at),
                updated_at: now,
            }],
        )
        .await?;

        let title = if course.title.trim().is_empty() {
            course_name.unwrap_or_else(|| course.slug.clone())
        } else {
            course.title.clone()
        };

        let session = self
            .open_session(
                purchaser,
                CheckoutRequest {
                    invoice_number: invoice_number.clone(),
                    amount: price,
                    line_items: vec![CheckoutLineItem {
                        id: course.id.to_string(),
                        name: title.clone(),
                        price,
                        quantity: 1,
                    }],
                    customer: checkout_customer(purchaser),
                    due_minutes: PAYMENT_EXPIRY_MINUTES,
                },
            )
            .await?;

        self.notifier
            .emit(payment_notification(
                user_id,
                TITLE_PENDING,
                format!(
                    "Selesaikan pembayaran untuk {title} sebelum batas waktu. Invoice: {invoice_number}."
                ),
                course_link(Some(&course)),
                json!({
                    "invoice_number": invoice_number,
                    "status": PaymentStatus::Pending.as_str(),
                    "payment_intent": PaymentIntent::Single.as_str(),
                    "courses_count": 1,
                    "amount": price,
                    "payment_url": session.checkout_url,
                }),
            ))
            .await;

        info!(
            %user_id,
            course_id = %course.id,
            invoice_number = %invoice_number,
            amount = price,
            "payments: single course checkout created"
        );

        Ok(CreatedPaymentDto {
            success: true,
            payment_url: session.checkout_url,
            invoice_number,
            expires_at: session.expires_at,
            is_bundle: None,
            courses_count: None,
        })
    }

    async fn create_bundle_payment(
        &self,
        purchaser: &Purchaser,
        bundle_price: i64,
        bundle_name: Option<String>,
    ) -> UseCaseResult<CreatedPaymentDto> {
        let user_id = purchaser.user_id;
        info!(%user_id, bundle_price, "payments: bundle checkout requested");

        let published = self.course_repo.list_published().await.map_err(|err| {
            error!(%user_id, db_error = ?err, "payments: failed to list published courses");
            PaymentError::CourseNotFound
        })?;

        let owned: HashSet<Uuid> = self
            .enrollment_repo
            .list_paid_course_ids(user_id)
            .await
            .map_err(|err| {
                error!(%user_id, db_error = ?err, "payments: failed to list paid courses");
                PaymentError::Internal(err)
            })?
            .into_iter()
            .collect();

        let remaining: Vec<CourseEntity> = published
            .into_iter()
            .filter(|course| !owned.contains(&course.id))
            .collect();

        if remaining.is_empty() {
            let err = PaymentError::AllCoursesOwned;
            warn!(%user_id, status = err.status_code(), "payments: bundle has nothing left to buy");
            return Err(err);
        }

        let courses_count = remaining.len();
        let now = Utc::now();
        let invoice_number = bundle_invoice_number(now);
        let expires_at = now + Duration::minutes(PAYMENT_EXPIRY_MINUTES);
        // Reporting only; the gateway charges `bundle_price` once.
        let per_course_amount = bundle_price / courses_count as i64;

        let rows = remaining
            .iter()
            .map(|course| UpsertPendingEnrollmentEntity {
                user_id,
                course_id: course.id,
                payment_status: PaymentStatus::Pending.to_string(),
                payment_reference: Some(invoice_number.clone()),
                payment_intent: Some(PaymentIntent::Bundle.to_string()),
                amount_paid: per_course_amount,
                expires_at: Some(expires_at),
                updated_at: now,
            })
            .collect();
        self.store_pending(user_id, rows).await?;

        let bundle_name = bundle_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| format!("Paket {courses_count} Kursus"));

        let session = self
            .open_session(
                purchaser,
                CheckoutRequest {
                    invoice_number: invoice_number.clone(),
                    amount: bundle_price,
                    line_items: vec![CheckoutLineItem {
                        id: invoice_number.clone(),
                        name: bundle_name.clone(),
                        price: bundle_price,
                        quantity: 1,
                    }],
                    customer: checkout_customer(purchaser),
                    due_minutes: PAYMENT_EXPIRY_MINUTES,
                },
            )
            .await?;

        self.notifier
            .emit(payment_notification(
                user_id,
                TITLE_PENDING,
                format!(
                    "Selesaikan pembayaran untuk {bundle_name} ({courses_count} kursus) sebelum batas waktu. Invoice: {invoice_number}."
                ),
                COURSES_LINK.to_string(),
                json!({
                    "invoice_number": invoice_number,
                    "status": PaymentStatus::Pending.as_str(),
                    "payment_intent": PaymentIntent::Bundle.as_str(),
                    "courses_count": courses_count,
                    "amount": bundle_price,
                    "payment_url": session.checkout_url,
                }),
            ))
            .await;

        info!(
            %user_id,
            invoice_number = %invoice_number,
            courses_count,
            amount = bundle_price,
            "payments: bundle checkout created"
        );

        Ok(CreatedPaymentDto {
            success: true,
            payment_url: session.checkout_url,
            invoice_number,
            expires_at: session.expires_at,
            is_bundle: Some(true),
            courses_count: Some(courses_count),
        })
    }

    async fn resolve_course(
        &self,
        user_id: Uuid,
        selector: CourseSelector,
    ) -> UseCaseResult<CourseEntity> {
        let lookup = match selector {
            CourseSelector::Id(course_id) => self.course_repo.find_by_id(course_id).await,
            CourseSelector::LocalId(local_id) => self.course_repo.find_by_local_id(local_id).await,
        };

        match lookup {
            Ok(Some(course)) => Ok(course),
            Ok(None) => {
                warn!(%user_id, selector = ?selector, "payments: course not in catalog");
                Err(PaymentError::CourseNotFound)
            }
            Err(err) => {
                error!(
                    %user_id,
                    selector = ?selector,
                    db_error = ?err,
                    "payments: catalog lookup failed"
                );
                Err(PaymentError::CourseNotFound)
            }
        }
    }

    async fn store_pending(
        &self,
        user_id: Uuid,
        rows: Vec<UpsertPendingEnrollmentEntity>,
    ) -> UseCaseResult<usize> {
        let expected = rows.len();
        let written = self
            .enrollment_repo
            .upsert_pending(rows)
            .await
            .map_err(|err| {
                error!(%user_id, db_error = ?err, "payments: failed to store pending enrollments");
                PaymentError::Internal(err)
            })?;

        if written < expected {
            // A row settled as paid after the ownership check; the upsert skipped it.
            let err = PaymentError::AlreadyEnrolled;
            warn!(
                %user_id,
                expected,
                written,
                status = err.status_code(),
                "payments: enrollment was paid while the checkout was being created"
            );
            return Err(err);
        }

        debug!(%user_id, expected, written, "payments: pending enrollments stored");
        Ok(written)
    }

    async fn open_session(
        &self,
        purchaser: &Purchaser,
        request: CheckoutRequest,
    ) -> UseCaseResult<CheckoutSession> {
        let user_id = purchaser.user_id;
        let invoice_number = request.invoice_number.clone();

        self.gateway.create_session(request).await.map_err(|err| {
            error!(
                %user_id,
                invoice_number = %invoice_number,
                error = ?err,
                "payments: gateway refused checkout session"
            );
            PaymentError::from(err)
        })
    }

    /// Applies one gateway observation to every enrollment sharing the invoice.
    ///
    /// Each write is a single UPDATE filtered by `payment_reference` and a status
    /// predicate, so racing callers cannot both move the same rows; the one that
    /// gets a non-zero row count is the one that notifies.
    pub async fn reconcile(
        &self,
        transaction: &GatewayTransaction,
        trigger: ReconcileTrigger,
    ) -> UseCaseResult<ReconciliationOutcome> {
        let invoice_number = transaction.invoice_number.as_str();
        let trigger_name = trigger.as_str();

        let rows = self
            .enrollment_repo
            .find_by_payment_reference(invoice_number)
            .await
            .map_err(|err| {
                error!(
                    %invoice_number,
                    trigger = trigger_name,
                    db_error = ?err,
                    "payments: failed to load enrollments by reference"
                );
                PaymentError::Internal(err)
            })?;

        if rows.is_empty() {
            warn!(%invoice_number, trigger = trigger_name, "payments: unknown payment reference");
            return Ok(ReconciliationOutcome::ReferenceUnknown);
        }

        let intent = PaymentIntent::resolve(
            invoice_number,
            rows.iter().map(|row| row.payment_intent.as_deref()),
        );

        if rows.iter().all(is_paid) {
            debug!(%invoice_number, trigger = trigger_name, "payments: reference already paid");
            return Ok(ReconciliationOutcome::AlreadyPaid);
        }

        let had_pending = rows
            .iter()
            .any(|row| row.payment_status == PaymentStatus::Pending.as_str());
        let target = transaction.status.target_status();

        info!(
            %invoice_number,
            trigger = trigger_name,
            payment_intent = %intent,
            gateway_status = ?transaction.status,
            rows = rows.len(),
            "payments: reconciling reference"
        );

        match target {
            PaymentStatus::Paid => {
                let only_pending = trigger == ReconcileTrigger::Poll;
                if only_pending && !had_pending {
                    return Ok(settled_outcome(&rows));
                }

                let now = Utc::now();
                let changes = MarkPaidEnrollmentChangeset {
                    payment_status: PaymentStatus::Paid.to_string(),
                    payment_method: transaction
                        .channel
                        .as_deref()
                        .map(PaymentMethod::from_channel)
                        .unwrap_or(PaymentMethod::BankTransfer)
                        .to_string(),
                    amount_paid: paid_amount(transaction.amount, intent, &rows),
                    purchased_at: now,
                    updated_at: now,
                };

                let rows_updated = self
                    .enrollment_repo
                    .mark_paid_by_reference(invoice_number, changes, only_pending)
                    .await
                    .map_err(|err| {
                        error!(
                            %invoice_number,
                            trigger = trigger_name,
                            db_error = ?err,
                            "payments: failed to mark enrollments paid"
                        );
                        PaymentError::Internal(err)
                    })?;

                if rows_updated == 0 {
                    // Another trigger settled the reference between our read and write.
                    let latest = self
                        .enrollment_repo
                        .find_by_payment_reference(invoice_number)
                        .await
                        .map_err(PaymentError::Internal)?;
                    let outcome = settled_outcome(&latest);
                    info!(
                        %invoice_number,
                        trigger = trigger_name,
                        outcome = outcome.as_str(),
                        "payments: paid write lost the race"
                    );
                    return Ok(outcome);
                }

                info!(
                    %invoice_number,
                    trigger = trigger_name,
                    rows_updated,
                    "payments: enrollments marked paid"
                );
                self.notify_settled(&rows, intent, PaymentStatus::Paid, transaction, trigger)
                    .await;

                Ok(ReconciliationOutcome::Paid { rows_updated })
            }
            PaymentStatus::Failed | PaymentStatus::Expired => {
                let rows_updated = self
                    .enrollment_repo
                    .mark_unpaid_status_by_reference(invoice_number, target)
                    .await
                    .map_err(|err| {
                        error!(
                            %invoice_number,
                            trigger = trigger_name,
                            status = %target,
                            db_error = ?err,
                            "payments: failed to mark enrollments unpaid"
                        );
                        PaymentError::Internal(err)
                    })?;

                info!(
                    %invoice_number,
                    trigger = trigger_name,
                    status = %target,
                    rows_updated,
                    "payments: enrollments marked unpaid"
                );

                if had_pending && rows_updated > 0 {
                    self.notify_settled(&rows, intent, target, transaction, trigger)
                        .await;
                }

                Ok(if target == PaymentStatus::Failed {
                    ReconciliationOutcome::Failed { rows_updated }
                } else {
                    ReconciliationOutcome::Expired { rows_updated }
                })
            }
            _ => Ok(ReconciliationOutcome::StillPending),
        }
    }

    async fn notify_settled(
        &self,
        rows: &[EnrollmentEntity],
        intent: PaymentIntent,
        status: PaymentStatus,
        transaction: &GatewayTransaction,
        trigger: ReconcileTrigger,
    ) {
        let Some(first) = rows.first() else {
            return;
        };

        let (label, link) = match intent {
            PaymentIntent::Bundle => (
                format!("paket {} kursus", rows.len()),
                COURSES_LINK.to_string(),
            ),
            PaymentIntent::Single => {
                let course = match self.course_repo.find_by_id(first.course_id).await {
                    Ok(course) => course,
                    Err(err) => {
                        warn!(
                            course_id = %first.course_id,
                            db_error = ?err,
                            "payments: catalog lookup for notification link failed"
                        );
                        None
                    }
                };
                let label = course
                    .as_ref()
                    .map(|course| course.title.clone())
                    .unwrap_or_else(|| "kursus Anda".to_string());
                (label, course_link(course.as_ref()))
            }
        };

        let (title, message) = match status {
            PaymentStatus::Paid => (
                TITLE_PAID,
                format!("Pembayaran untuk {label} berhasil. Selamat belajar!"),
            ),
            PaymentStatus::Failed => (
                TITLE_FAILED,
                format!("Pembayaran untuk {label} gagal. Silakan coba lagi."),
            ),
            _ => (
                TITLE_EXPIRED,
                format!("Waktu pembayaran untuk {label} telah habis. Silakan buat pesanan baru."),
            ),
        };

        self.notifier
            .emit(payment_notification(
                first.user_id,
                title,
                message,
                link,
                json!({
                    "invoice_number": transaction.invoice_number,
                    "status": status.as_str(),
                    "payment_intent": intent.as_str(),
                    "courses_count": rows.len(),
                    "amount": transaction.amount,
                    "trigger": trigger.as_str(),
                }),
            ))
            .await;
    }

    /// Gateway push. Always yields an acknowledgement; nothing here is surfaced
    /// to the gateway as an HTTP error.
    pub async fn handle_notification(
        &self,
        headers: &NotificationHeaders,
        body: &[u8],
    ) -> WebhookAck {
        if self.verify_notifications && !self.gateway.verify_notification(headers, body) {
            warn!(
                request_id = ?headers.request_id,
                "payments: notification signature rejected"
            );
            return WebhookAck::new("ignored", "invalid notification signature");
        }

        let transaction = match self.gateway.parse_notification(body) {
            Ok(transaction) => transaction,
            Err(err) => {
                warn!(error = ?err, "payments: malformed notification body");
                return WebhookAck::new("ignored", "malformed notification");
            }
        };

        let invoice_number = transaction.invoice_number.clone();
        match self.reconcile(&transaction, ReconcileTrigger::Webhook).await {
            Ok(ReconciliationOutcome::ReferenceUnknown) => {
                WebhookAck::new("ignored", "unknown invoice").with_invoice(invoice_number)
            }
            Ok(outcome) => WebhookAck::new("ok", outcome.as_str()).with_invoice(invoice_number),
            Err(err) => {
                error!(
                    %invoice_number,
                    error = ?err,
                    "payments: notification could not be reconciled"
                );
                WebhookAck::new("error", "failed to process notification")
                    .with_invoice(invoice_number)
            }
        }
    }

    /// Storefront poll after the user returns from checkout.
    pub async fn verify_payment(
        &self,
        user_id: Uuid,
        target: VerifyTarget,
    ) -> UseCaseResult<VerifyPaymentResult> {
        info!(%user_id, target = ?target, "payments: verify requested");

        let enrollment = match target {
            VerifyTarget::Course(course_id) => self
                .enrollment_repo
                .find_by_user_and_course(user_id, course_id)
                .await,
            VerifyTarget::Bundle => self.enrollment_repo.find_latest_bundle_enrollment(user_id).await,
        }
        .map_err(|err| {
            error!(%user_id, db_error = ?err, "payments: failed to load enrollment for verify");
            PaymentError::Internal(err)
        })?
        .ok_or(PaymentError::EnrollmentNotFound)?;

        let reference = enrollment.payment_reference.clone();

        if target != VerifyTarget::Bundle && is_paid(&enrollment) {
            return Ok(VerifyPaymentResult {
                status: ReconciliationOutcome::AlreadyPaid.as_str(),
                invoice_number: reference,
            });
        }

        let Some(reference) = reference.filter(|reference| !reference.is_empty()) else {
            warn!(%user_id, enrollment_id = %enrollment.id, "payments: enrollment has no reference");
            return Err(PaymentError::ReferenceUnknown);
        };

        if target == VerifyTarget::Bundle {
            let rows = self
                .enrollment_repo
                .find_by_payment_reference(&reference)
                .await
                .map_err(|err| {
                    error!(
                        %user_id,
                        invoice_number = %reference,
                        db_error = ?err,
                        "payments: failed to load bundle enrollments"
                    );
                    PaymentError::Internal(err)
                })?;

            if !rows.is_empty() && rows.iter().all(is_paid) {
                return Ok(VerifyPaymentResult {
                    status: ReconciliationOutcome::AlreadyPaid.as_str(),
                    invoice_number: Some(reference),
                });
            }
        }

        let mut transaction = self.gateway.check_status(&reference).await.map_err(|err| {
            error!(
                %user_id,
                invoice_number = %reference,
                error = ?err,
                "payments: gateway status check failed"
            );
            PaymentError::from(err)
        })?;
        transaction.invoice_number = reference.clone();

        match self.reconcile(&transaction, ReconcileTrigger::Poll).await? {
            ReconciliationOutcome::ReferenceUnknown => Err(PaymentError::ReferenceUnknown),
            outcome => Ok(VerifyPaymentResult {
                status: outcome.as_str(),
                invoice_number: Some(reference),
            }),
        }
    }

    pub async fn list_enrollments(&self, user_id: Uuid) -> UseCaseResult<Vec<EnrollmentDto>> {
        let rows = self
            .enrollment_repo
            .list_by_user(user_id)
            .await
            .map_err(|err| {
                error!(%user_id, db_error = ?err, "payments: failed to list enrollments");
                PaymentError::Internal(err)
            })?;

        Ok(rows.into_iter().map(EnrollmentDto::from).collect())
    }
}

fn is_paid(row: &EnrollmentEntity) -> bool {
    row.payment_status == PaymentStatus::Paid.as_str()
}

/// Outcome for a reference that this call did not move.
fn settled_outcome(rows: &[EnrollmentEntity]) -> ReconciliationOutcome {
    let has = |status: PaymentStatus| rows.iter().any(|row| row.payment_status == status.as_str());

    if rows.is_empty() {
        ReconciliationOutcome::ReferenceUnknown
    } else if has(PaymentStatus::Paid) {
        ReconciliationOutcome::AlreadyPaid
    } else if has(PaymentStatus::Failed) {
        ReconciliationOutcome::Failed { rows_updated: 0 }
    } else if has(PaymentStatus::Expired) {
        ReconciliationOutcome::Expired { rows_updated: 0 }
    } else {
        ReconciliationOutcome::StillPending
    }
}

fn paid_amount(gateway_amount: i64, intent: PaymentIntent, rows: &[EnrollmentEntity]) -> i64 {
    if gateway_amount <= 0 {
        return rows.first().map(|row| row.amount_paid).unwrap_or_default();
    }

    match intent {
        PaymentIntent::Bundle => gateway_amount / rows.len().max(1) as i64,
        PaymentIntent::Single => gateway_amount,
    }
}

fn course_link(course: Option<&CourseEntity>) -> String {
    match course {
        Some(course) if !course.slug.is_empty() => format!("{COURSES_LINK}/{}", course.slug),
        _ => COURSES_LINK.to_string(),
    }
}

fn checkout_customer(purchaser: &Purchaser) -> CheckoutCustomer {
    CheckoutCustomer {
        id: purchaser.user_id.to_string(),
        email: purchaser.email.clone(),
        name: purchaser.checkout_name(),
    }
}

fn payment_notification(
    user_id: Uuid,
    title: &str,
    message: String,
    link: String,
    metadata: serde_json::Value,
) -> InsertNotificationEntity {
    InsertNotificationEntity {
        user_id,
        type_: NotificationType::Payment.to_string(),
        title: title.to_string(),
        message,
        link: Some(link),
        metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        interfaces::payment_gateway::MockPaymentGateway,
        usecases::test_support::{
            InMemoryEnrollments, RecordingNotifications, course, enrollment,
        },
    };
    use domain::{
        repositories::courses::MockCourseCatalogRepository,
        value_objects::{invoices::BUNDLE_INVOICE_PREFIX, payments::GatewayStatus},
    };

    type TestUseCase = EnrollmentPaymentUseCase<
        InMemoryEnrollments,
        MockCourseCatalogRepository,
        RecordingNotifications,
        MockPaymentGateway,
    >;

    struct Harness {
        usecase: Arc<TestUseCase>,
        enrollments: Arc<InMemoryEnrollments>,
        notifications: Arc<RecordingNotifications>,
    }

    fn harness(
        rows: Vec<EnrollmentEntity>,
        catalog: MockCourseCatalogRepository,
        gateway: MockPaymentGateway,
    ) -> Harness {
        harness_with(rows, catalog, gateway, RecordingNotifications::default(), true)
    }

    fn harness_with(
        rows: Vec<EnrollmentEntity>,
        catalog: MockCourseCatalogRepository,
        gateway: MockPaymentGateway,
        notifications: RecordingNotifications,
        verify_notifications: bool,
    ) -> Harness {
        let enrollments = Arc::new(InMemoryEnrollments::with_rows(rows));
        let notifications = Arc::new(notifications);
        let usecase = Arc::new(EnrollmentPaymentUseCase::new(
            Arc::clone(&enrollments),
            Arc::new(catalog),
            Arc::clone(&notifications),
            Arc::new(gateway),
            verify_notifications,
        ));

        Harness {
            usecase,
            enrollments,
            notifications,
        }
    }

    fn catalog_with(courses: Vec<CourseEntity>) -> MockCourseCatalogRepository {
        let mut catalog = MockCourseCatalogRepository::new();
        let by_id = courses.clone();
        catalog
            .expect_find_by_id()
            .returning(move |id| Ok(by_id.iter().find(|course| course.id == id).cloned()));
        let by_local_id = courses.clone();
        catalog.expect_find_by_local_id().returning(move |local_id| {
            Ok(by_local_id
                .iter()
                .find(|course| course.local_id == local_id)
                .cloned())
        });
        catalog
            .expect_list_published()
            .returning(move || Ok(courses.clone()));
        catalog
    }

    fn purchaser(user_id: Uuid) -> Purchaser {
        Purchaser {
            user_id,
            email: Some("budi@example.com".to_string()),
            display_name: None,
        }
    }

    fn observed(invoice_number: &str, status: &str, channel: &str) -> GatewayTransaction {
        GatewayTransaction {
            invoice_number: invoice_number.to_string(),
            status: GatewayStatus::parse(status),
            channel: Some(channel.to_string()),
            amount: 150_000,
        }
    }

    fn session_for(request: &CheckoutRequest) -> CheckoutSession {
        CheckoutSession {
            checkout_url: format!("https://checkout.example/{}", request.invoice_number),
            invoice_number: request.invoice_number.clone(),
            expires_at: Utc::now() + Duration::minutes(request.due_minutes),
        }
    }

    #[tokio::test]
    async fn create_rejects_course_already_paid_without_writes() {
        let user_id = Uuid::new_v4();
        let paid_course = course(3, "rust-dasar", 150_000);
        let rows = vec![enrollment(
            user_id,
            paid_course.id,
            "paid",
            "INV-1-aaaaaaaa",
            Some("single"),
            Utc::now(),
        )];

        let h = harness(rows, catalog_with(vec![paid_course.clone()]), MockPaymentGateway::new());
        let err = h
            .usecase
            .create_payment(
                &purchaser(user_id),
                PurchaseSelection::Single {
                    course: CourseSelector::Id(paid_course.id),
                    course_name: None,
                    price: Some(150_000),
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, PaymentError::AlreadyEnrolled));
        assert_eq!(err.status_code(), 400);
        assert_eq!(h.enrollments.write_count(), 0);
        assert!(h.notifications.stored().is_empty());
    }

    #[tokio::test]
    async fn create_single_charges_catalog_price() {
        let user_id = Uuid::new_v4();
        let target = course(7, "axum-lanjutan", 250_000);
        let course_id = target.id;

        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_create_session()
            .withf(move |request| {
                request.amount == 250_000
                    && request.line_items.len() == 1
                    && request.line_items[0].id == course_id.to_string()
                    && request.due_minutes == PAYMENT_EXPIRY_MINUTES
                    && request.customer.name == "budi"
            })
            .times(1)
            .returning(|request| Ok(session_for(&request)));

        let h = harness(Vec::new(), catalog_with(vec![target]), gateway);
        let created = h
            .usecase
            .create_payment(
                &purchaser(user_id),
                PurchaseSelection::Single {
                    course: CourseSelector::LocalId(7),
                    course_name: Some("Axum".to_string()),
                    price: Some(1_000),
                },
            )
            .await
            .unwrap();

        assert!(created.success);
        assert!(created.invoice_number.starts_with("INV-"));
        assert!(created.invoice_number.ends_with(&course_id.to_string()[..8]));
        assert_eq!(created.is_bundle, None);

        let rows = h.enrollments.rows_by_reference(&created.invoice_number);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].payment_status, "pending");
        assert_eq!(rows[0].payment_intent.as_deref(), Some("single"));
        assert_eq!(rows[0].amount_paid, 250_000);

        let stored = h.notifications.stored();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].title, TITLE_PENDING);
        assert_eq!(stored[0].link.as_deref(), Some("/courses/axum-lanjutan"));
    }

    #[tokio::test]
    async fn bundle_covers_only_courses_not_yet_owned() {
        let user_id = Uuid::new_v4();
        let published: Vec<CourseEntity> = (1..=9)
            .map(|local_id| course(local_id, &format!("kursus-{local_id}"), 100_000))
            .collect();
        let owned: Vec<EnrollmentEntity> = published
            .iter()
            .take(3)
            .map(|c| enrollment(user_id, c.id, "paid", "INV-1-old", Some("single"), Utc::now()))
            .collect();

        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_create_session()
            .withf(|request| {
                request.amount == 540_000
                    && request.line_items.len() == 1
                    && request.line_items[0].id == request.invoice_number
                    && request.line_items[0].price == 540_000
            })
            .times(1)
            .returning(|request| Ok(session_for(&request)));

        let h = harness(owned, catalog_with(published), gateway);
        let created = h
            .usecase
            .create_payment(
                &purchaser(user_id),
                PurchaseSelection::Bundle {
                    bundle_price: 540_000,
                    bundle_name: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(created.is_bundle, Some(true));
        assert_eq!(created.courses_count, Some(6));

        let digits = created
            .invoice_number
            .strip_prefix(BUNDLE_INVOICE_PREFIX)
            .unwrap();
        assert!(!digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()));

        let rows = h.enrollments.rows_by_reference(&created.invoice_number);
        assert_eq!(rows.len(), 6);
        assert!(rows.iter().all(|row| row.payment_status == "pending"
            && row.payment_intent.as_deref() == Some("bundle")
            && row.amount_paid == 90_000));
        assert_eq!(h.notifications.titled(TITLE_PENDING), 1);
    }

    #[tokio::test]
    async fn bundle_with_every_course_owned_is_rejected() {
        let user_id = Uuid::new_v4();
        let published = vec![course(1, "a", 100_000), course(2, "b", 100_000)];
        let owned = published
            .iter()
            .map(|c| enrollment(user_id, c.id, "paid", "INV-1-old", None, Utc::now()))
            .collect();

        let h = harness(owned, catalog_with(published), MockPaymentGateway::new());
        let err = h
            .usecase
            .create_payment(
                &purchaser(user_id),
                PurchaseSelection::Bundle {
                    bundle_price: 200_000,
                    bundle_name: Some("Semua".to_string()),
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, PaymentError::AllCoursesOwned));
        assert_eq!(h.enrollments.write_count(), 0);
    }

    #[tokio::test]
    async fn gateway_rejection_carries_gateway_message() {
        let target = course(1, "a", 100_000);

        let mut gateway = MockPaymentGateway::new();
        gateway.expect_create_session().returning(|_| {
            Err(GatewayError::Rejected {
                status: 400,
                message: Some("Invalid customer email".to_string()),
            })
        });

        let h = harness(Vec::new(), catalog_with(vec![target.clone()]), gateway);
        let err = h
            .usecase
            .create_payment(
                &purchaser(Uuid::new_v4()),
                PurchaseSelection::Single {
                    course: CourseSelector::Id(target.id),
                    course_name: None,
                    price: None,
                },
            )
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), 500);
        assert_eq!(err.to_string(), "Invalid customer email");
        assert!(h.notifications.stored().is_empty());
    }

    #[tokio::test]
    async fn unknown_course_is_not_found() {
        let h = harness(Vec::new(), catalog_with(Vec::new()), MockPaymentGateway::new());
        let err = h
            .usecase
            .create_payment(
                &purchaser(Uuid::new_v4()),
                PurchaseSelection::Single {
                    course: CourseSelector::LocalId(99),
                    course_name: None,
                    price: Some(100_000),
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, PaymentError::CourseNotFound));
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn repeated_success_settles_once() {
        let user_id = Uuid::new_v4();
        let target = course(1, "rust-dasar", 150_000);
        let invoice = "INV-1717000000000-aaaaaaaa";
        let rows = vec![enrollment(user_id, target.id, "pending", invoice, Some("single"), Utc::now())];

        let h = harness(rows, catalog_with(vec![target]), MockPaymentGateway::new());
        let tx = observed(invoice, "SUCCESS", "EMONEY_OVO");

        let first = h.usecase.reconcile(&tx, ReconcileTrigger::Webhook).await.unwrap();
        let second = h.usecase.reconcile(&tx, ReconcileTrigger::Webhook).await.unwrap();
        let third = h.usecase.reconcile(&tx, ReconcileTrigger::Poll).await.unwrap();

        assert_eq!(first, ReconciliationOutcome::Paid { rows_updated: 1 });
        assert_eq!(second, ReconciliationOutcome::AlreadyPaid);
        assert_eq!(third, ReconciliationOutcome::AlreadyPaid);
        assert_eq!(h.enrollments.write_count(), 1);

        let row = &h.enrollments.rows_by_reference(invoice)[0];
        assert_eq!(row.payment_status, "paid");
        assert_eq!(row.payment_method.as_deref(), Some("e_wallet"));
        assert!(row.purchased_at.is_some());

        let stored = h.notifications.stored();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].title, TITLE_PAID);
        assert_eq!(stored[0].user_id, user_id);
        assert_eq!(stored[0].link.as_deref(), Some("/courses/rust-dasar"));
        assert_eq!(stored[0].metadata["trigger"], "webhook");
    }

    #[tokio::test]
    async fn bundle_success_moves_every_row_together() {
        let user_id = Uuid::new_v4();
        let invoice = "INV-BUNDLE-1717000000000";
        let rows: Vec<EnrollmentEntity> = (0..3)
            .map(|_| enrollment(user_id, Uuid::new_v4(), "pending", invoice, None, Utc::now()))
            .collect();

        let h = harness(rows, catalog_with(Vec::new()), MockPaymentGateway::new());
        let mut tx = observed(invoice, "success", "VIRTUAL_ACCOUNT_BCA");
        tx.amount = 300_000;

        let outcome = h.usecase.reconcile(&tx, ReconcileTrigger::Webhook).await.unwrap();

        assert_eq!(outcome, ReconciliationOutcome::Paid { rows_updated: 3 });
        assert_eq!(h.enrollments.write_count(), 1);
        let rows = h.enrollments.rows_by_reference(invoice);
        assert!(rows.iter().all(|row| row.payment_status == "paid"
            && row.amount_paid == 100_000
            && row.payment_method.as_deref() == Some("bank_transfer")));

        let stored = h.notifications.stored();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].link.as_deref(), Some("/courses"));
        assert_eq!(stored[0].metadata["payment_intent"], "bundle");
        assert_eq!(stored[0].metadata["courses_count"], 3);
    }

    #[tokio::test]
    async fn unknown_reference_writes_nothing() {
        let h = harness(Vec::new(), catalog_with(Vec::new()), MockPaymentGateway::new());

        let outcome = h
            .usecase
            .reconcile(&observed("INV-404", "SUCCESS", "QRIS"), ReconcileTrigger::Webhook)
            .await
            .unwrap();

        assert_eq!(outcome, ReconciliationOutcome::ReferenceUnknown);
        assert_eq!(h.enrollments.write_count(), 0);
        assert!(h.notifications.stored().is_empty());
    }

    #[tokio::test]
    async fn failure_never_overwrites_paid() {
        let user_id = Uuid::new_v4();
        let invoice = "INV-1-bbbbbbbb";
        let rows = vec![enrollment(user_id, Uuid::new_v4(), "paid", invoice, Some("single"), Utc::now())];

        let h = harness(rows, catalog_with(Vec::new()), MockPaymentGateway::new());

        for status in ["FAILED", "EXPIRED"] {
            let outcome = h
                .usecase
                .reconcile(&observed(invoice, status, "QRIS"), ReconcileTrigger::Webhook)
                .await
                .unwrap();
            assert_eq!(outcome, ReconciliationOutcome::AlreadyPaid);
        }

        assert_eq!(h.enrollments.rows_by_reference(invoice)[0].payment_status, "paid");
        assert_eq!(h.enrollments.write_count(), 0);
    }

    #[tokio::test]
    async fn repeated_failure_notifies_once() {
        let invoice = "INV-1-cccccccc";
        let rows = vec![enrollment(Uuid::new_v4(), Uuid::new_v4(), "pending", invoice, None, Utc::now())];

        let h = harness(rows, catalog_with(Vec::new()), MockPaymentGateway::new());
        let tx = observed(invoice, "FAILED", "CREDIT_CARD");

        let first = h.usecase.reconcile(&tx, ReconcileTrigger::Webhook).await.unwrap();
        let second = h.usecase.reconcile(&tx, ReconcileTrigger::Poll).await.unwrap();

        assert_eq!(first, ReconciliationOutcome::Failed { rows_updated: 1 });
        assert!(matches!(second, ReconciliationOutcome::Failed { .. }));
        assert_eq!(h.enrollments.rows_by_reference(invoice)[0].payment_status, "failed");
        assert_eq!(h.notifications.titled(TITLE_FAILED), 1);
        // Catalog lookup missed, so the link falls back to the listing.
        assert_eq!(h.notifications.stored()[0].link.as_deref(), Some("/courses"));
    }

    #[tokio::test]
    async fn pending_status_is_left_alone() {
        let invoice = "INV-1-dddddddd";
        let rows = vec![enrollment(Uuid::new_v4(), Uuid::new_v4(), "pending", invoice, None, Utc::now())];

        let h = harness(rows, catalog_with(Vec::new()), MockPaymentGateway::new());
        let outcome = h
            .usecase
            .reconcile(&observed(invoice, "PENDING", "QRIS"), ReconcileTrigger::Poll)
            .await
            .unwrap();

        assert_eq!(outcome, ReconciliationOutcome::StillPending);
        assert_eq!(h.enrollments.write_count(), 0);
        assert!(h.notifications.stored().is_empty());
    }

    #[tokio::test]
    async fn late_success_after_expiry_only_lands_from_webhook() {
        let invoice = "INV-1-eeeeeeee";
        let rows = vec![enrollment(Uuid::new_v4(), Uuid::new_v4(), "expired", invoice, None, Utc::now())];

        let h = harness(rows, catalog_with(Vec::new()), MockPaymentGateway::new());
        let tx = observed(invoice, "SUCCESS", "QRIS");

        let polled = h.usecase.reconcile(&tx, ReconcileTrigger::Poll).await.unwrap();
        assert_eq!(polled, ReconciliationOutcome::Expired { rows_updated: 0 });
        assert_eq!(h.enrollments.write_count(), 0);

        let pushed = h.usecase.reconcile(&tx, ReconcileTrigger::Webhook).await.unwrap();
        assert_eq!(pushed, ReconciliationOutcome::Paid { rows_updated: 1 });
        assert_eq!(h.enrollments.rows_by_reference(invoice)[0].payment_status, "paid");
        assert_eq!(h.notifications.titled(TITLE_PAID), 1);
    }

    #[tokio::test]
    async fn notification_failure_does_not_fail_reconciliation() {
        let invoice = "INV-1-ffffffff";
        let rows = vec![enrollment(Uuid::new_v4(), Uuid::new_v4(), "pending", invoice, None, Utc::now())];

        let h = harness_with(
            rows,
            catalog_with(Vec::new()),
            MockPaymentGateway::new(),
            RecordingNotifications::failing(),
            true,
        );

        let outcome = h
            .usecase
            .reconcile(&observed(invoice, "SUCCESS", "QRIS"), ReconcileTrigger::Webhook)
            .await
            .unwrap();

        assert_eq!(outcome, ReconciliationOutcome::Paid { rows_updated: 1 });
        assert_eq!(h.enrollments.rows_by_reference(invoice)[0].payment_status, "paid");
    }

    #[tokio::test]
    async fn racing_webhook_and_poll_settle_once() {
        let user_id = Uuid::new_v4();
        let invoice = "INV-BUNDLE-1717000000001";
        let rows: Vec<EnrollmentEntity> = (0..4)
            .map(|_| enrollment(user_id, Uuid::new_v4(), "pending", invoice, Some("bundle"), Utc::now()))
            .collect();

        let h = harness(rows, catalog_with(Vec::new()), MockPaymentGateway::new());
        let tx = observed(invoice, "SUCCESS", "QRIS");

        let (webhook, poll) = tokio::join!(
            h.usecase.reconcile(&tx, ReconcileTrigger::Webhook),
            h.usecase.reconcile(&tx, ReconcileTrigger::Poll),
        );
        let outcomes = [webhook.unwrap(), poll.unwrap()];

        let paid = outcomes
            .iter()
            .filter(|outcome| matches!(outcome, ReconciliationOutcome::Paid { rows_updated: 4 }))
            .count();
        assert_eq!(paid, 1);
        assert!(outcomes.contains(&ReconciliationOutcome::AlreadyPaid));
        assert_eq!(h.notifications.titled(TITLE_PAID), 1);
        assert!(h
            .enrollments
            .rows_by_reference(invoice)
            .iter()
            .all(|row| row.payment_status == "paid"));
    }

    #[tokio::test]
    async fn webhook_with_bad_signature_writes_nothing() {
        let invoice = "INV-1-11111111";
        let rows = vec![enrollment(Uuid::new_v4(), Uuid::new_v4(), "pending", invoice, None, Utc::now())];

        let mut gateway = MockPaymentGateway::new();
        gateway.expect_verify_notification().returning(|_, _| false);
        gateway.expect_parse_notification().times(0);

        let h = harness(rows, catalog_with(Vec::new()), gateway);
        let ack = h
            .usecase
            .handle_notification(&NotificationHeaders::default(), br#"{"order":{}}"#)
            .await;

        assert_eq!(ack.status, "ignored");
        assert_eq!(h.enrollments.write_count(), 0);
        assert_eq!(h.enrollments.rows_by_reference(invoice)[0].payment_status, "pending");
    }

    #[tokio::test]
    async fn webhook_acknowledges_reconciled_invoice() {
        let invoice = "INV-1-22222222";
        let rows = vec![enrollment(Uuid::new_v4(), Uuid::new_v4(), "pending", invoice, None, Utc::now())];

        let mut gateway = MockPaymentGateway::new();
        gateway.expect_verify_notification().returning(|_, _| true);
        gateway
            .expect_parse_notification()
            .returning(move |_| Ok(observed(invoice, "SUCCESS", "QRIS")));

        let h = harness(rows, catalog_with(Vec::new()), gateway);
        let ack = h
            .usecase
            .handle_notification(&NotificationHeaders::default(), b"{}")
            .await;

        assert_eq!(ack.status, "ok");
        assert_eq!(ack.message, "paid");
        assert_eq!(ack.invoice_number.as_deref(), Some(invoice));
    }

    #[tokio::test]
    async fn malformed_webhook_is_ignored() {
        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_parse_notification()
            .returning(|_| Err(GatewayError::InvalidResponse("missing order".to_string())));

        let h = harness_with(
            Vec::new(),
            catalog_with(Vec::new()),
            gateway,
            RecordingNotifications::default(),
            false,
        );
        let ack = h
            .usecase
            .handle_notification(&NotificationHeaders::default(), b"not json")
            .await;

        assert_eq!(ack.status, "ignored");
        assert_eq!(ack.invoice_number, None);
    }

    #[tokio::test]
    async fn verify_after_webhook_skips_the_gateway() {
        let user_id = Uuid::new_v4();
        let course_id = Uuid::new_v4();
        let invoice = "INV-1-33333333";
        let rows = vec![enrollment(user_id, course_id, "pending", invoice, Some("single"), Utc::now())];

        let mut gateway = MockPaymentGateway::new();
        gateway.expect_check_status().times(0);

        let h = harness(rows, catalog_with(Vec::new()), gateway);
        h.usecase
            .reconcile(&observed(invoice, "SUCCESS", "QRIS"), ReconcileTrigger::Webhook)
            .await
            .unwrap();
        let writes = h.enrollments.write_count();

        let result = h
            .usecase
            .verify_payment(user_id, VerifyTarget::Course(course_id))
            .await
            .unwrap();

        assert_eq!(result.status, "already_paid");
        assert_eq!(result.invoice_number.as_deref(), Some(invoice));
        assert_eq!(h.enrollments.write_count(), writes);
        assert_eq!(h.notifications.titled(TITLE_PAID), 1);
    }

    #[tokio::test]
    async fn verify_bundle_polls_latest_bundle_reference() {
        let user_id = Uuid::new_v4();
        let old = "INV-BUNDLE-1000";
        let latest = "INV-BUNDLE-2000";
        let earlier = Utc::now() - Duration::hours(3);
        let mut rows = vec![enrollment(user_id, Uuid::new_v4(), "expired", old, Some("bundle"), earlier)];
        rows.extend(
            (0..2).map(|_| enrollment(user_id, Uuid::new_v4(), "pending", latest, Some("bundle"), Utc::now())),
        );

        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_check_status()
            .withf(move |invoice| invoice == latest)
            .times(1)
            .returning(|invoice| {
                Ok(GatewayTransaction {
                    invoice_number: invoice.to_string(),
                    status: GatewayStatus::Success,
                    channel: Some("VIRTUAL_ACCOUNT_MANDIRI".to_string()),
                    amount: 400_000,
                })
            });

        let h = harness(rows, catalog_with(Vec::new()), gateway);
        let result = h
            .usecase
            .verify_payment(user_id, VerifyTarget::Bundle)
            .await
            .unwrap();

        assert_eq!(result.status, "paid");
        assert_eq!(result.invoice_number.as_deref(), Some(latest));
        assert!(h
            .enrollments
            .rows_by_reference(latest)
            .iter()
            .all(|row| row.payment_status == "paid" && row.amount_paid == 200_000));
        assert_eq!(h.enrollments.rows_by_reference(old)[0].payment_status, "expired");
        assert_eq!(h.notifications.stored()[0].metadata["trigger"], "poll");
    }

    #[tokio::test]
    async fn verify_without_enrollment_is_not_found() {
        let h = harness(Vec::new(), catalog_with(Vec::new()), MockPaymentGateway::new());

        let err = h
            .usecase
            .verify_payment(Uuid::new_v4(), VerifyTarget::Course(Uuid::new_v4()))
            .await
            .unwrap_err();

        assert!(matches!(err, PaymentError::EnrollmentNotFound));
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn verify_surfaces_gateway_failure() {
        let user_id = Uuid::new_v4();
        let course_id = Uuid::new_v4();
        let rows = vec![enrollment(user_id, course_id, "pending", "INV-1-44444444", None, Utc::now())];

        let mut gateway = MockPaymentGateway::new();
        gateway.expect_check_status().returning(|_| {
            Err(GatewayError::Rejected {
                status: 404,
                message: None,
            })
        });

        let h = harness(rows, catalog_with(Vec::new()), gateway);
        let err = h
            .usecase
            .verify_payment(user_id, VerifyTarget::Course(course_id))
            .await
            .unwrap_err();

        assert!(matches!(err, PaymentError::Gateway(_)));
        assert_eq!(h.enrollments.write_count(), 0);
    }

    #[tokio::test]
    async fn create_single_does_not_reset_a_row_paid_mid_checkout() {
        let user_id = Uuid::new_v4();
        let target = course(4, "diesel-praktis", 150_000);
        let rows = vec![enrollment(
            user_id,
            target.id,
            "pending",
            "INV-OLD",
            Some("single"),
            Utc::now(),
        )];

        let h = harness(rows, catalog_with(vec![target.clone()]), MockPaymentGateway::new());
        h.enrollments.settle_after_next_read("INV-OLD");

        let err = h
            .usecase
            .create_payment(
                &purchaser(user_id),
                PurchaseSelection::Single {
                    course: CourseSelector::Id(target.id),
                    course_name: None,
                    price: None,
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, PaymentError::AlreadyEnrolled));
        let row = &h.enrollments.rows_by_reference("INV-OLD")[0];
        assert_eq!(row.payment_status, "paid");
        assert!(row.purchased_at.is_some());
        assert_eq!(row.payment_method.as_deref(), Some("e_wallet"));
        assert!(h.notifications.stored().is_empty());
    }

    #[tokio::test]
    async fn create_bundle_stops_when_a_course_is_paid_mid_checkout() {
        let user_id = Uuid::new_v4();
        let published: Vec<CourseEntity> = (1..=3)
            .map(|local_id| course(local_id, &format!("kursus-{local_id}"), 100_000))
            .collect();
        let rows = vec![enrollment(
            user_id,
            published[0].id,
            "pending",
            "INV-OLD",
            Some("single"),
            Utc::now(),
        )];

        let h = harness(rows, catalog_with(published.clone()), MockPaymentGateway::new());
        h.enrollments.settle_after_next_read("INV-OLD");

        let err = h
            .usecase
            .create_payment(
                &purchaser(user_id),
                PurchaseSelection::Bundle {
                    bundle_price: 270_000,
                    bundle_name: None,
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, PaymentError::AlreadyEnrolled));
        let settled = &h.enrollments.rows_by_reference("INV-OLD")[0];
        assert_eq!(settled.course_id, published[0].id);
        assert_eq!(settled.payment_status, "paid");
        assert!(settled.purchased_at.is_some());
    }

    #[tokio::test]
    async fn bundle_catalog_failure_reads_as_course_not_found() {
        let mut catalog = MockCourseCatalogRepository::new();
        catalog
            .expect_list_published()
            .returning(|| Err(anyhow::anyhow!("catalog unavailable")));

        let h = harness(Vec::new(), catalog, MockPaymentGateway::new());
        let err = h
            .usecase
            .create_payment(
                &purchaser(Uuid::new_v4()),
                PurchaseSelection::Bundle {
                    bundle_price: 270_000,
                    bundle_name: None,
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, PaymentError::CourseNotFound));
        assert_eq!(err.status_code(), 404);
        assert_eq!(h.enrollments.write_count(), 0);
    }
}
