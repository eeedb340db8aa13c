use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::entities::courses::CourseEntity;

#[automock]
#[async_trait]
pub trait CourseCatalogRepository {
    async fn find_by_id(&self, course_id: Uuid) -> Result<Option<CourseEntity>>;
    async fn find_by_local_id(&self, local_id: i32) -> Result<Option<CourseEntity>>;
    async fn list_published(&self) -> Result<Vec<CourseEntity>>;
}
