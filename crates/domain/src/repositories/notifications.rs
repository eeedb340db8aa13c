use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::entities::notifications::{InsertNotificationEntity, NotificationEntity};

#[automock]
#[async_trait]
pub trait NotificationRepository {
    async fn insert(&self, notification: InsertNotificationEntity) -> Result<Uuid>;

    async fn list_by_user(
        &self,
        user_id: Uuid,
        unread_only: bool,
        limit: i64,
    ) -> Result<Vec<NotificationEntity>>;

    /// Returns false when the notification does not exist or belongs to another user.
    async fn mark_read(&self, user_id: Uuid, notification_id: Uuid) -> Result<bool>;

    async fn mark_all_read(&self, user_id: Uuid) -> Result<usize>;
}
