use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::schema::enrollments;

#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = enrollments)]
pub struct EnrollmentEntity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub payment_status: String,
    pub payment_method: Option<String>,
    pub payment_reference: Option<String>,
    pub payment_intent: Option<String>,
    pub amount_paid: i64,
    pub purchased_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row written by the create-payment flow. Upserted on `(user_id, course_id)`.
#[derive(Debug, Clone, PartialEq, Insertable)]
#[diesel(table_name = enrollments)]
pub struct UpsertPendingEnrollmentEntity {
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub payment_status: String,
    pub payment_reference: Option<String>,
    pub payment_intent: Option<String>,
    pub amount_paid: i64,
    pub expires_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, AsChangeset)]
#[diesel(table_name = enrollments)]
pub struct MarkPaidEnrollmentChangeset {
    pub payment_status: String,
    pub payment_method: String,
    pub amount_paid: i64,
    pub purchased_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
