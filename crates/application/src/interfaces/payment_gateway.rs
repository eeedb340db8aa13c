use async_trait::async_trait;
use mockall::automock;
use thiserror::Error;

use domain::value_objects::payments::{
    CheckoutRequest, CheckoutSession, GatewayTransaction, NotificationHeaders,
};

pub const GENERIC_GATEWAY_FAILURE: &str = "Failed to create payment with the payment gateway";

#[derive(Debug, Error)]
pub enum GatewayError {
    /// The gateway answered with a non-2xx status.
    #[error("gateway rejected request (status {status}): {message:?}")]
    Rejected { status: u16, message: Option<String> },
    #[error("gateway response could not be understood: {0}")]
    InvalidResponse(String),
    #[error("gateway request failed: {0}")]
    Transport(#[source] anyhow::Error),
}

impl GatewayError {
    /// Message that is safe to hand back to the storefront.
    pub fn user_message(&self) -> String {
        match self {
            GatewayError::Rejected {
                message: Some(message),
                ..
            } if !message.trim().is_empty() => message.clone(),
            _ => GENERIC_GATEWAY_FAILURE.to_string(),
        }
    }
}

/// Checkout gateway as seen by the enrollment reconciler.
#[automock]
#[async_trait]
pub trait PaymentGateway {
    async fn create_session(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError>;

    /// Authoritative status of a previously created session.
    async fn check_status(&self, invoice_number: &str)
    -> Result<GatewayTransaction, GatewayError>;

    fn verify_notification(&self, headers: &NotificationHeaders, body: &[u8]) -> bool;

    fn parse_notification(&self, body: &[u8]) -> Result<GatewayTransaction, GatewayError>;
}
