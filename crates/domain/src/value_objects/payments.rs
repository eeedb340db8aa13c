use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value_objects::enums::payment_statuses::PaymentStatus;

/// Transaction status as reported by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayStatus {
    Success,
    Failed,
    Expired,
    Pending,
    Other(String),
}

impl GatewayStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "SUCCESS" => GatewayStatus::Success,
            "FAILED" => GatewayStatus::Failed,
            "EXPIRED" => GatewayStatus::Expired,
            "PENDING" => GatewayStatus::Pending,
            other => GatewayStatus::Other(other.to_string()),
        }
    }

    /// Internal status the gateway status reconciles to. `Pending` means no write.
    pub fn target_status(&self) -> PaymentStatus {
        match self {
            GatewayStatus::Success => PaymentStatus::Paid,
            GatewayStatus::Failed => PaymentStatus::Failed,
            GatewayStatus::Expired => PaymentStatus::Expired,
            GatewayStatus::Pending | GatewayStatus::Other(_) => PaymentStatus::Pending,
        }
    }
}

/// What one of the two reconciliation triggers observed at the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayTransaction {
    pub invoice_number: String,
    pub status: GatewayStatus,
    pub channel: Option<String>,
    pub amount: i64,
}

/// Which path delivered a gateway observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileTrigger {
    Webhook,
    Poll,
}

impl ReconcileTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileTrigger::Webhook => "webhook",
            ReconcileTrigger::Poll => "poll",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconciliationOutcome {
    AlreadyPaid,
    Paid { rows_updated: usize },
    Failed { rows_updated: usize },
    Expired { rows_updated: usize },
    StillPending,
    ReferenceUnknown,
}

impl ReconciliationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconciliationOutcome::AlreadyPaid => "already_paid",
            ReconciliationOutcome::Paid { .. } => "paid",
            ReconciliationOutcome::Failed { .. } => "failed",
            ReconciliationOutcome::Expired { .. } => "expired",
            ReconciliationOutcome::StillPending => "pending",
            ReconciliationOutcome::ReferenceUnknown => "reference_unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutLineItem {
    pub id: String,
    pub name: String,
    pub price: i64,
    pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutCustomer {
    pub id: String,
    pub email: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    pub invoice_number: String,
    pub amount: i64,
    pub line_items: Vec<CheckoutLineItem>,
    pub customer: CheckoutCustomer,
    pub due_minutes: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub checkout_url: String,
    pub invoice_number: String,
    pub expires_at: DateTime<Utc>,
}

/// Headers DOKU signs its notifications with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationHeaders {
    pub client_id: Option<String>,
    pub request_id: Option<String>,
    pub request_timestamp: Option<String>,
    pub signature: Option<String>,
}

/// Body of the acknowledgement returned to the gateway. Always sent with HTTP 200.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAck {
    pub status: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_number: Option<String>,
}

impl WebhookAck {
    pub fn new(status: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            invoice_number: None,
        }
    }

    pub fn with_invoice(mut self, invoice_number: impl Into<String>) -> Self {
        self.invoice_number = Some(invoice_number.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyTarget {
    Course(Uuid),
    Bundle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyPaymentResult {
    pub status: &'static str,
    pub invoice_number: Option<String>,
}

/// Body of the verify endpoint: either `{courseId}` or `{isBundle: true}`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentModel {
    pub course_id: Option<String>,
    pub is_bundle: Option<bool>,
}

impl VerifyPaymentModel {
    pub fn into_target(self) -> Result<VerifyTarget, String> {
        if self.is_bundle.unwrap_or(false) {
            return Ok(VerifyTarget::Bundle);
        }

        let raw = self
            .course_id
            .ok_or_else(|| "courseId or isBundle is required".to_string())?;
        Uuid::parse_str(raw.trim())
            .map(VerifyTarget::Course)
            .map_err(|_| "courseId is not a valid course identifier".to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentDto {
    pub success: bool,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_number: Option<String>,
    pub message: &'static str,
}

impl From<VerifyPaymentResult> for VerifyPaymentDto {
    fn from(result: VerifyPaymentResult) -> Self {
        let message = match result.status {
            "paid" => "Payment confirmed",
            "already_paid" => "Payment was already confirmed",
            "failed" => "Payment failed",
            "expired" => "Payment expired",
            _ => "Payment is still pending",
        };

        Self {
            success: true,
            status: result.status,
            invoice_number: result.invoice_number,
            message,
        }
    }
}
