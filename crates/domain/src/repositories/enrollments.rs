use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::entities::enrollments::{
    EnrollmentEntity, MarkPaidEnrollmentChangeset, UpsertPendingEnrollmentEntity,
};
use crate::value_objects::enums::payment_statuses::PaymentStatus;

/// Every write is a single statement scoped by a key or by `payment_reference`.
/// Nothing here opens a multi-statement transaction.
#[automock]
#[async_trait]
pub trait EnrollmentRepository {
    async fn find_by_user_and_course(
        &self,
        user_id: Uuid,
        course_id: Uuid,
    ) -> Result<Option<EnrollmentEntity>>;

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<EnrollmentEntity>>;

    async fn list_paid_course_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>>;

    /// Upserts on `(user_id, course_id)`, replacing reference, intent, amount and expiry
    /// and clearing method/purchase time. Returns the number of rows written.
    async fn upsert_pending(&self, rows: Vec<UpsertPendingEnrollmentEntity>) -> Result<usize>;

    async fn find_by_payment_reference(
        &self,
        payment_reference: &str,
    ) -> Result<Vec<EnrollmentEntity>>;

    /// Most recently touched enrollment of the user that belongs to a bundle purchase.
    async fn find_latest_bundle_enrollment(&self, user_id: Uuid)
    -> Result<Option<EnrollmentEntity>>;

    /// `UPDATE … SET paid … WHERE payment_reference = $1 AND payment_status <> 'paid'`,
    /// narrowed to `payment_status = 'pending'` when `only_pending` is set.
    async fn mark_paid_by_reference(
        &self,
        payment_reference: &str,
        changes: MarkPaidEnrollmentChangeset,
        only_pending: bool,
    ) -> Result<usize>;

    /// `UPDATE … SET payment_status = $2 WHERE payment_reference = $1 AND payment_status <> 'paid'`.
    async fn mark_unpaid_status_by_reference(
        &self,
        payment_reference: &str,
        status: PaymentStatus,
    ) -> Result<usize>;
}
