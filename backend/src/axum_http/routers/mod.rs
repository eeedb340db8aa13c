pub mod enrollments;
pub mod notifications;
pub mod payments;
