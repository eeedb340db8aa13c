pub mod enrollment_payments;
pub mod notifications;

#[cfg(test)]
pub(crate) mod test_support;
