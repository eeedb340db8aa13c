use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::schema::courses;

#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = courses)]
pub struct CourseEntity {
    pub id: Uuid,
    /// Numeric id the storefront exposes in its URLs and static catalog.
    pub local_id: i32,
    pub slug: String,
    pub title: String,
    pub price: i64,
    pub total_lessons: i32,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
