pub mod notification_types;
pub mod payment_intents;
pub mod payment_methods;
pub mod payment_statuses;
