use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use domain::{
    entities::notifications::{InsertNotificationEntity, NotificationEntity},
    repositories::notifications::NotificationRepository,
    value_objects::notifications::ListNotificationsFilter,
};

/// Best-effort writer for user-facing notifications. A failed insert is logged
/// at error level and otherwise ignored; callers never see it.
pub struct NotificationEmitter<N>
where
    N: NotificationRepository + Send + Sync + 'static,
{
    notification_repo: Arc<N>,
}

impl<N> Clone for NotificationEmitter<N>
where
    N: NotificationRepository + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            notification_repo: Arc::clone(&self.notification_repo),
        }
    }
}

impl<N> NotificationEmitter<N>
where
    N: NotificationRepository + Send + Sync + 'static,
{
    pub fn new(notification_repo: Arc<N>) -> Self {
        Self { notification_repo }
    }

    /// Returns whether the notification was stored.
    pub async fn emit(&self, notification: InsertNotificationEntity) -> bool {
        let user_id = notification.user_id;
        let notification_type = notification.type_.clone();

        match self.notification_repo.insert(notification).await {
            Ok(notification_id) => {
                info!(
                    %user_id,
                    %notification_id,
                    notification_type = %notification_type,
                    "notifications: notification stored"
                );
                true
            }
            Err(err) => {
                error!(
                    %user_id,
                    notification_type = %notification_type,
                    db_error = ?err,
                    "notifications: failed to store notification"
                );
                false
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("notification not found")]
    NotFound,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl NotificationError {
    pub fn status_code(&self) -> u16 {
        match self {
            NotificationError::NotFound => 404,
            NotificationError::Internal(_) => 500,
        }
    }
}

pub struct NotificationUseCase<N>
where
    N: NotificationRepository + Send + Sync + 'static,
{
    notification_repo: Arc<N>,
}

impl<N> NotificationUseCase<N>
where
    N: NotificationRepository + Send + Sync + 'static,
{
    pub fn new(notification_repo: Arc<N>) -> Self {
        Self { notification_repo }
    }

    pub async fn list(
        &self,
        user_id: Uuid,
        filter: &ListNotificationsFilter,
    ) -> Result<Vec<NotificationEntity>, NotificationError> {
        self.notification_repo
            .list_by_user(
                user_id,
                filter.unread_only.unwrap_or(false),
                filter.effective_limit(),
            )
            .await
            .map_err(|err| {
                error!(%user_id, db_error = ?err, "notifications: failed to list notifications");
                NotificationError::Internal(err)
            })
    }

    pub async fn mark_read(
        &self,
        user_id: Uuid,
        notification_id: Uuid,
    ) -> Result<(), NotificationError> {
        let updated = self
            .notification_repo
            .mark_read(user_id, notification_id)
            .await
            .map_err(|err| {
                error!(
                    %user_id,
                    %notification_id,
                    db_error = ?err,
                    "notifications: failed to mark notification read"
                );
                NotificationError::Internal(err)
            })?;

        if !updated {
            warn!(%user_id, %notification_id, "notifications: notification not found for user");
            return Err(NotificationError::NotFound);
        }

        Ok(())
    }

    pub async fn mark_all_read(&self, user_id: Uuid) -> Result<usize, NotificationError> {
        self.notification_repo
            .mark_all_read(user_id)
            .await
            .map_err(|err| {
                error!(%user_id, db_error = ?err, "notifications: failed to mark all read");
                NotificationError::Internal(err)
            })
    }
}
