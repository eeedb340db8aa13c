use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use diesel::{
    RunQueryDsl, insert_into,
    pg::{Pg, PgConnection},
    prelude::*,
    query_builder::{QueryFragment, QueryId},
    update,
    upsert::excluded,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::postgres::postgres_connection::PgPoolSquad;
use domain::{
    entities::enrollments::{
        EnrollmentEntity, MarkPaidEnrollmentChangeset, UpsertPendingEnrollmentEntity,
    },
    repositories::enrollments::EnrollmentRepository,
    schema::enrollments,
    value_objects::{
        enums::{payment_intents::PaymentIntent, payment_statuses::PaymentStatus},
        invoices::BUNDLE_INVOICE_PREFIX,
    },
};

pub struct EnrollmentPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl EnrollmentPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

/// Rows that are already paid keep their purchase; only the others are
/// inserted or reset to pending.
fn pending_upsert(
    rows: &[UpsertPendingEnrollmentEntity],
) -> impl RunQueryDsl<PgConnection> + QueryFragment<Pg> + QueryId + '_ {
    use diesel::query_dsl::methods::FilterDsl;

    insert_into(enrollments::table)
        .values(rows)
        .on_conflict((enrollments::user_id, enrollments::course_id))
        .do_update()
        .set((
            enrollments::payment_status.eq(excluded(enrollments::payment_status)),
            enrollments::payment_reference.eq(excluded(enrollments::payment_reference)),
            enrollments::payment_intent.eq(excluded(enrollments::payment_intent)),
            enrollments::amount_paid.eq(excluded(enrollments::amount_paid)),
            enrollments::expires_at.eq(excluded(enrollments::expires_at)),
            enrollments::payment_method.eq(None::<String>),
            enrollments::purchased_at.eq(None::<chrono::DateTime<Utc>>),
            enrollments::updated_at.eq(excluded(enrollments::updated_at)),
        ))
        .filter(enrollments::payment_status.ne(PaymentStatus::Paid.as_str()))
}

#[async_trait]
impl EnrollmentRepository for EnrollmentPostgres {
    async fn find_by_user_and_course(
        &self,
        user_id: Uuid,
        course_id: Uuid,
    ) -> Result<Option<EnrollmentEntity>> {
        let mut conn = Arc::clone(&self.db_pool)
            .get()
            .context("failed to get connection from pool")?;

        let enrollment = enrollments::table
            .filter(enrollments::user_id.eq(user_id))
            .filter(enrollments::course_id.eq(course_id))
            .select(EnrollmentEntity::as_select())
            .first::<EnrollmentEntity>(&mut conn)
            .optional()
            .context("failed to load enrollment by user and course")?;

        Ok(enrollment)
    }

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<EnrollmentEntity>> {
        let mut conn = Arc::clone(&self.db_pool)
            .get()
            .context("failed to get connection from pool")?;

        let results = enrollments::table
            .filter(enrollments::user_id.eq(user_id))
            .order(enrollments::updated_at.desc())
            .select(EnrollmentEntity::as_select())
            .load::<EnrollmentEntity>(&mut conn)
            .context("failed to list enrollments for user")?;

        Ok(results)
    }

    async fn list_paid_course_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        let mut conn = Arc::clone(&self.db_pool)
            .get()
            .context("failed to get connection from pool")?;

        let results = enrollments::table
            .filter(enrollments::user_id.eq(user_id))
            .filter(enrollments::payment_status.eq(PaymentStatus::Paid.as_str()))
            .select(enrollments::course_id)
            .load::<Uuid>(&mut conn)
            .context("failed to list paid course ids")?;

        Ok(results)
    }

    async fn upsert_pending(&self, rows: Vec<UpsertPendingEnrollmentEntity>) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut conn = Arc::clone(&self.db_pool)
            .get()
            .context("failed to get connection from pool")?;

        let written = pending_upsert(&rows)
            .execute(&mut conn)
            .context("failed to upsert pending enrollments")?;

        Ok(written)
    }

    async fn find_by_payment_reference(
        &self,
        payment_reference: &str,
    ) -> Result<Vec<EnrollmentEntity>> {
        let mut conn = Arc::clone(&self.db_pool)
            .get()
            .context("failed to get connection from pool")?;

        let results = enrollments::table
            .filter(enrollments::payment_reference.eq(payment_reference))
            .order(enrollments::created_at.asc())
            .select(EnrollmentEntity::as_select())
            .load::<EnrollmentEntity>(&mut conn)
            .context("failed to load enrollments by payment reference")?;

        Ok(results)
    }

    async fn find_latest_bundle_enrollment(
        &self,
        user_id: Uuid,
    ) -> Result<Option<EnrollmentEntity>> {
        let mut conn = Arc::clone(&self.db_pool)
            .get()
            .context("failed to get connection from pool")?;

        let bundle_pattern = format!("{BUNDLE_INVOICE_PREFIX}%");
        let enrollment = enrollments::table
            .filter(enrollments::user_id.eq(user_id))
            .filter(
                enrollments::payment_intent
                    .eq(PaymentIntent::Bundle.as_str())
                    .or(enrollments::payment_reference.like(bundle_pattern)),
            )
            .order(enrollments::updated_at.desc())
            .select(EnrollmentEntity::as_select())
            .first::<EnrollmentEntity>(&mut conn)
            .optional()
            .context("failed to load latest bundle enrollment")?;

        Ok(enrollment)
    }

    async fn mark_paid_by_reference(
        &self,
        payment_reference: &str,
        changes: MarkPaidEnrollmentChangeset,
        only_pending: bool,
    ) -> Result<usize> {
        let mut conn = Arc::clone(&self.db_pool)
            .get()
            .context("failed to get connection from pool")?;

        let updated = if only_pending {
            update(enrollments::table)
                .filter(enrollments::payment_reference.eq(payment_reference))
                .filter(enrollments::payment_status.eq(PaymentStatus::Pending.as_str()))
                .set(&changes)
                .execute(&mut conn)
        } else {
            update(enrollments::table)
                .filter(enrollments::payment_reference.eq(payment_reference))
                .filter(enrollments::payment_status.ne(PaymentStatus::Paid.as_str()))
                .set(&changes)
                .execute(&mut conn)
        }
        .context("failed to mark enrollments paid")?;

        Ok(updated)
    }

    async fn mark_unpaid_status_by_reference(
        &self,
        payment_reference: &str,
        status: PaymentStatus,
    ) -> Result<usize> {
        let mut conn = Arc::clone(&self.db_pool)
            .get()
            .context("failed to get connection from pool")?;

        let updated = update(enrollments::table)
            .filter(enrollments::payment_reference.eq(payment_reference))
            .filter(enrollments::payment_status.ne(PaymentStatus::Paid.as_str()))
            .set((
                enrollments::payment_status.eq(status.as_str()),
                enrollments::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)
            .with_context(|| format!("failed to mark enrollments {status}"))?;

        Ok(updated)
    }
}
