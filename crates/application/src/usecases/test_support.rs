use std::sync::{
    Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use domain::{
    entities::{
        courses::CourseEntity,
        enrollments::{EnrollmentEntity, MarkPaidEnrollmentChangeset, UpsertPendingEnrollmentEntity},
        notifications::{InsertNotificationEntity, NotificationEntity},
    },
    repositories::{enrollments::EnrollmentRepository, notifications::NotificationRepository},
    value_objects::enums::payment_statuses::PaymentStatus,
};

/// Enrollment table kept in memory. Every write takes the lock once and applies
/// its predicate to all matching rows, the same shape as a filtered UPDATE.
#[derive(Default)]
pub struct InMemoryEnrollments {
    rows: Mutex<Vec<EnrollmentEntity>>,
    writes: AtomicUsize,
    settle_after_read: Mutex<Option<String>>,
}

impl InMemoryEnrollments {
    pub fn with_rows(rows: Vec<EnrollmentEntity>) -> Self {
        Self {
            rows: Mutex::new(rows),
            writes: AtomicUsize::new(0),
            settle_after_read: Mutex::new(None),
        }
    }

    /// Marks every row of `reference` paid as soon as the next ownership read
    /// returns, as a webhook landing between a read and a write would.
    pub fn settle_after_next_read(&self, reference: &str) {
        *self.settle_after_read.lock().unwrap() = Some(reference.to_string());
    }

    fn after_ownership_read(&self) {
        let Some(reference) = self.settle_after_read.lock().unwrap().take() else {
            return;
        };

        let mut rows = self.rows.lock().unwrap();
        for row in rows
            .iter_mut()
            .filter(|row| row.payment_reference.as_deref() == Some(reference.as_str()))
        {
            row.payment_status = PaymentStatus::Paid.to_string();
            row.payment_method = Some("e_wallet".to_string());
            row.purchased_at = Some(Utc::now());
        }
    }

    pub fn rows(&self) -> Vec<EnrollmentEntity> {
        self.rows.lock().unwrap().clone()
    }

    pub fn rows_by_reference(&self, reference: &str) -> Vec<EnrollmentEntity> {
        self.rows()
            .into_iter()
            .filter(|row| row.payment_reference.as_deref() == Some(reference))
            .collect()
    }

    /// Statements that changed at least one row.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn record_write(&self, affected: usize) {
        if affected > 0 {
            self.writes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl EnrollmentRepository for InMemoryEnrollments {
    async fn find_by_user_and_course(
        &self,
        user_id: Uuid,
        course_id: Uuid,
    ) -> Result<Option<EnrollmentEntity>> {
        let found = self
            .rows()
            .into_iter()
            .find(|row| row.user_id == user_id && row.course_id == course_id);
        self.after_ownership_read();
        Ok(found)
    }

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<EnrollmentEntity>> {
        Ok(self
            .rows()
            .into_iter()
            .filter(|row| row.user_id == user_id)
            .collect())
    }

    async fn list_paid_course_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        let paid = self
            .rows()
            .into_iter()
            .filter(|row| row.user_id == user_id && row.payment_status == "paid")
            .map(|row| row.course_id)
            .collect();
        self.after_ownership_read();
        Ok(paid)
    }

    async fn upsert_pending(&self, new_rows: Vec<UpsertPendingEnrollmentEntity>) -> Result<usize> {
        let mut rows = self.rows.lock().unwrap();
        let mut written = 0;

        for new_row in new_rows {
            match rows
                .iter_mut()
                .find(|row| row.user_id == new_row.user_id && row.course_id == new_row.course_id)
            {
                Some(existing) if existing.payment_status == "paid" => continue,
                Some(existing) => {
                    existing.payment_status = new_row.payment_status;
                    existing.payment_reference = new_row.payment_reference;
                    existing.payment_intent = new_row.payment_intent;
                    existing.amount_paid = new_row.amount_paid;
                    existing.expires_at = new_row.expires_at;
                    existing.payment_method = None;
                    existing.purchased_at = None;
                    existing.updated_at = new_row.updated_at;
                }
                None => rows.push(EnrollmentEntity {
                    id: Uuid::new_v4(),
                    user_id: new_row.user_id,
                    course_id: new_row.course_id,
                    payment_status: new_row.payment_status,
                    payment_method: None,
                    payment_reference: new_row.payment_reference,
                    payment_intent: new_row.payment_intent,
                    amount_paid: new_row.amount_paid,
                    purchased_at: None,
                    expires_at: new_row.expires_at,
                    created_at: new_row.updated_at,
                    updated_at: new_row.updated_at,
                }),
            }
            written += 1;
        }

        drop(rows);
        self.record_write(written);
        Ok(written)
    }

    async fn find_by_payment_reference(
        &self,
        payment_reference: &str,
    ) -> Result<Vec<EnrollmentEntity>> {
        Ok(self.rows_by_reference(payment_reference))
    }

    async fn find_latest_bundle_enrollment(
        &self,
        user_id: Uuid,
    ) -> Result<Option<EnrollmentEntity>> {
        Ok(self
            .rows()
            .into_iter()
            .filter(|row| {
                row.user_id == user_id
                    && (row.payment_intent.as_deref() == Some("bundle")
                        || row
                            .payment_reference
                            .as_deref()
                            .is_some_and(|reference| reference.starts_with("INV-BUNDLE-")))
            })
            .max_by_key(|row| row.updated_at))
    }

    async fn mark_paid_by_reference(
        &self,
        payment_reference: &str,
        changes: MarkPaidEnrollmentChangeset,
        only_pending: bool,
    ) -> Result<usize> {
        let mut rows = self.rows.lock().unwrap();
        let mut affected = 0;

        for row in rows.iter_mut().filter(|row| {
            row.payment_reference.as_deref() == Some(payment_reference)
                && row.payment_status != "paid"
                && (!only_pending || row.payment_status == "pending")
        }) {
            row.payment_status = changes.payment_status.clone();
            row.payment_method = Some(changes.payment_method.clone());
            row.amount_paid = changes.amount_paid;
            row.purchased_at = Some(changes.purchased_at);
            row.updated_at = changes.updated_at;
            affected += 1;
        }

        drop(rows);
        self.record_write(affected);
        Ok(affected)
    }

    async fn mark_unpaid_status_by_reference(
        &self,
        payment_reference: &str,
        status: PaymentStatus,
    ) -> Result<usize> {
        let mut rows = self.rows.lock().unwrap();
        let mut affected = 0;

        for row in rows.iter_mut().filter(|row| {
            row.payment_reference.as_deref() == Some(payment_reference)
                && row.payment_status != "paid"
        }) {
            row.payment_status = status.to_string();
            row.updated_at = Utc::now();
            affected += 1;
        }

        drop(rows);
        self.record_write(affected);
        Ok(affected)
    }
}

/// Keeps every inserted notification; can be switched to fail all inserts.
#[derive(Default)]
pub struct RecordingNotifications {
    stored: Mutex<Vec<InsertNotificationEntity>>,
    failing: AtomicBool,
}

impl RecordingNotifications {
    pub fn failing() -> Self {
        Self {
            stored: Mutex::new(Vec::new()),
            failing: AtomicBool::new(true),
        }
    }

    pub fn stored(&self) -> Vec<InsertNotificationEntity> {
        self.stored.lock().unwrap().clone()
    }

    pub fn titled(&self, title: &str) -> usize {
        self.stored()
            .iter()
            .filter(|notification| notification.title == title)
            .count()
    }
}

#[async_trait]
impl NotificationRepository for RecordingNotifications {
    async fn insert(&self, notification: InsertNotificationEntity) -> Result<Uuid> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow!("notifications table unavailable"));
        }
        self.stored.lock().unwrap().push(notification);
        Ok(Uuid::new_v4())
    }

    async fn list_by_user(
        &self,
        _user_id: Uuid,
        _unread_only: bool,
        _limit: i64,
    ) -> Result<Vec<NotificationEntity>> {
        Ok(Vec::new())
    }

    async fn mark_read(&self, _user_id: Uuid, _notification_id: Uuid) -> Result<bool> {
        Ok(false)
    }

    async fn mark_all_read(&self, _user_id: Uuid) -> Result<usize> {
        Ok(0)
    }
}

pub fn course(local_id: i32, slug: &str, price: i64) -> CourseEntity {
    let now = Utc::now();
    CourseEntity {
        id: Uuid::new_v4(),
        local_id,
        slug: slug.to_string(),
        title: format!("Kursus {slug}"),
        price,
        total_lessons: 12,
        is_published: true,
        created_at: now,
        updated_at: now,
    }
}

pub fn enrollment(
    user_id: Uuid,
    course_id: Uuid,
    status: &str,
    reference: &str,
    intent: Option<&str>,
    updated_at: DateTime<Utc>,
) -> EnrollmentEntity {
    EnrollmentEntity {
        id: Uuid::new_v4(),
        user_id,
        course_id,
        payment_status: status.to_string(),
        payment_method: None,
        payment_reference: Some(reference.to_string()),
        payment_intent: intent.map(str::to_string),
        amount_paid: 150_000,
        purchased_at: None,
        expires_at: Some(updated_at + Duration::minutes(60)),
        created_at: updated_at,
        updated_at,
    }
}
