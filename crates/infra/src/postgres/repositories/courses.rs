use anyhow::{Context, Result};
use async_trait::async_trait;
use diesel::{RunQueryDsl, prelude::*};
use std::sync::Arc;
use uuid::Uuid;

use crate::postgres::postgres_connection::PgPoolSquad;
use domain::{
    entities::courses::CourseEntity, repositories::courses::CourseCatalogRepository,
    schema::courses,
};

pub struct CourseCatalogPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl CourseCatalogPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl CourseCatalogRepository for CourseCatalogPostgres {
    async fn find_by_id(&self, course_id: Uuid) -> Result<Option<CourseEntity>> {
        let mut conn = Arc::clone(&self.db_pool)
            .get()
            .context("failed to get connection from pool")?;

        let course = courses::table
            .filter(courses::id.eq(course_id))
            .select(CourseEntity::as_select())
            .first::<CourseEntity>(&mut conn)
            .optional()
            .context("failed to load course by id")?;

        Ok(course)
    }

    async fn find_by_local_id(&self, local_id: i32) -> Result<Option<CourseEntity>> {
        let mut conn = Arc::clone(&self.db_pool)
            .get()
            .context("failed to get connection from pool")?;

        let course = courses::table
            .filter(courses::local_id.eq(local_id))
            .select(CourseEntity::as_select())
            .first::<CourseEntity>(&mut conn)
            .optional()
            .context("failed to load course by local id")?;

        Ok(course)
    }

    async fn list_published(&self) -> Result<Vec<CourseEntity>> {
        let mut conn = Arc::clone(&self.db_pool)
            .get()
            .context("failed to get connection from pool")?;

        let results = courses::table
            .filter(courses::is_published.eq(true))
            .order(courses::local_id.asc())
            .select(CourseEntity::as_select())
            .load::<CourseEntity>(&mut conn)
            .context("failed to list published courses")?;

        Ok(results)
    }
}
