use async_trait::async_trait;

use crate::doku_client::DokuClient;
use application::interfaces::payment_gateway::{GatewayError, PaymentGateway};
use domain::value_objects::payments::{
    CheckoutRequest, CheckoutSession, GatewayTransaction, NotificationHeaders,
};

#[async_trait]
impl PaymentGateway for DokuClient {
    async fn create_session(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        DokuClient::create_session(self, &request).await
    }

    async fn check_status(
        &self,
        invoice_number: &str,
    ) -> Result<GatewayTransaction, GatewayError> {
        DokuClient::check_status(self, invoice_number).await
    }

    fn verify_notification(&self, headers: &NotificationHeaders, body: &[u8]) -> bool {
        DokuClient::verify_notification(self, headers, body)
    }

    fn parse_notification(&self, body: &[u8]) -> Result<GatewayTransaction, GatewayError> {
        DokuClient::parse_notification(self, body)
    }
}
