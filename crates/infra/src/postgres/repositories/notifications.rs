use anyhow::{Context, Result};
use async_trait::async_trait;
use diesel::{RunQueryDsl, insert_into, prelude::*, update};
use std::sync::Arc;
use uuid::Uuid;

use crate::postgres::postgres_connection::PgPoolSquad;
use domain::{
    entities::notifications::{InsertNotificationEntity, NotificationEntity},
    repositories::notifications::NotificationRepository,
    schema::notifications,
};

pub struct NotificationPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl NotificationPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl NotificationRepository for NotificationPostgres {
    async fn insert(&self, notification: InsertNotificationEntity) -> Result<Uuid> {
        let mut conn = Arc::clone(&self.db_pool)
            .get()
            .context("failed to get connection from pool")?;

        let notification_id = insert_into(notifications::table)
            .values(&notification)
            .returning(notifications::id)
            .get_result::<Uuid>(&mut conn)
            .context("failed to insert notification")?;

        Ok(notification_id)
    }

    async fn list_by_user(
        &self,
        user_id: Uuid,
        unread_only: bool,
        limit: i64,
    ) -> Result<Vec<NotificationEntity>> {
        let mut conn = Arc::clone(&self.db_pool)
            .get()
            .context("failed to get connection from pool")?;

        let mut query = notifications::table
            .filter(notifications::user_id.eq(user_id))
            .into_boxed();
        if unread_only {
            query = query.filter(notifications::is_read.eq(false));
        }

        let results = query
            .order(notifications::created_at.desc())
            .limit(limit)
            .select(NotificationEntity::as_select())
            .load::<NotificationEntity>(&mut conn)
            .context("failed to list notifications for user")?;

        Ok(results)
    }

    async fn mark_read(&self, user_id: Uuid, notification_id: Uuid) -> Result<bool> {
        let mut conn = Arc::clone(&self.db_pool)
            .get()
            .context("failed to get connection from pool")?;

        let updated = update(notifications::table)
            .filter(notifications::id.eq(notification_id))
            .filter(notifications::user_id.eq(user_id))
            .set(notifications::is_read.eq(true))
            .execute(&mut conn)
            .context("failed to mark notification read")?;

        Ok(updated > 0)
    }

    async fn mark_all_read(&self, user_id: Uuid) -> Result<usize> {
        let mut conn = Arc::clone(&self.db_pool)
            .get()
            .context("failed to get connection from pool")?;

        let updated = update(notifications::table)
            .filter(notifications::user_id.eq(user_id))
            .filter(notifications::is_read.eq(false))
            .set(notifications::is_read.eq(true))
            .execute(&mut conn)
            .context("failed to mark all notifications read")?;

        Ok(updated)
    }
}
