use serde::Deserialize;

pub const DEFAULT_NOTIFICATION_LIMIT: i64 = 50;
pub const MAX_NOTIFICATION_LIMIT: i64 = 200;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListNotificationsFilter {
    pub limit: Option<i64>,
    pub unread_only: Option<bool>,
}

impl ListNotificationsFilter {
    pub fn effective_limit(&self) -> i64 {
        self.limit
            .unwrap_or(DEFAULT_NOTIFICATION_LIMIT)
            .clamp(1, MAX_NOTIFICATION_LIMIT)
    }
}
