pub mod enrollments;
pub mod enums;
pub mod invoices;
pub mod notifications;
pub mod payments;
