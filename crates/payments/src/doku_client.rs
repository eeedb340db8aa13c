use std::time::Duration as StdDuration;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, TimeZone, Utc};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    models::{
        DokuCheckoutBody, DokuCheckoutResponse, DokuCustomer, DokuLineItem, DokuOrder,
        DokuPayment, DokuTransactionPayload, extract_error_message,
    },
    sanitize::{sanitize_line_item_id, sanitize_name},
    signature::{
        SignatureComponents, generate_digest, generate_signature, request_timestamp,
        verify_signature,
    },
};
use application::interfaces::payment_gateway::GatewayError;
use domain::value_objects::payments::{
    CheckoutRequest, CheckoutSession, GatewayTransaction, NotificationHeaders,
};

pub const CHECKOUT_PATH: &str = "/checkout/v1/payment";
pub const ORDER_STATUS_PATH: &str = "/orders/v1/status";
pub const CURRENCY: &str = "IDR";

/// Every channel the checkout page offers.
pub const PAYMENT_METHOD_TYPES: [&str; 25] = [
    "VIRTUAL_ACCOUNT_BCA",
    "VIRTUAL_ACCOUNT_BANK_MANDIRI",
    "VIRTUAL_ACCOUNT_BANK_SYARIAH_MANDIRI",
    "VIRTUAL_ACCOUNT_DOKU",
    "VIRTUAL_ACCOUNT_BRI",
    "VIRTUAL_ACCOUNT_BNI",
    "VIRTUAL_ACCOUNT_BANK_PERMATA",
    "VIRTUAL_ACCOUNT_BANK_CIMB",
    "VIRTUAL_ACCOUNT_BANK_DANAMON",
    "VIRTUAL_ACCOUNT_BTN",
    "VIRTUAL_ACCOUNT_BNC",
    "ONLINE_TO_OFFLINE_ALFA",
    "ONLINE_TO_OFFLINE_INDOMARET",
    "CREDIT_CARD",
    "DIRECT_DEBIT_BRI",
    "EMONEY_SHOPEE_PAY",
    "EMONEY_OVO",
    "EMONEY_DANA",
    "EMONEY_DOKU",
    "EMONEY_LINKAJA",
    "QRIS",
    "PEER_TO_PEER_AKULAKU",
    "PEER_TO_PEER_KREDIVO",
    "PEER_TO_PEER_INDODANA",
    "PEER_TO_PEER_ATOME",
];

/// DOKU reports `expired_date` in Jakarta time (UTC+7).
const DOKU_UTC_OFFSET_SECS: i32 = 7 * 3600;

#[derive(Debug, Clone)]
pub struct DokuConfig {
    pub client_id: String,
    pub secret_key: String,
    pub base_url: String,
    /// Where the customer lands after paying.
    pub success_url: String,
    pub cancel_url: String,
    /// Generic "back to merchant" link shown on the result page.
    pub result_url: String,
    /// Path DOKU posts notifications to; part of the signature it sends.
    pub notification_path: String,
}

/// DOKU Checkout client. Holds its own credentials; nothing is read from the
/// environment after construction.
pub struct DokuClient {
    http: reqwest::Client,
    config: DokuConfig,
}

impl DokuClient {
    pub fn new(config: DokuConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(StdDuration::from_secs(20))
            .build()
            .context("failed to build DOKU http client")?;

        Ok(Self { http, config })
    }

    pub fn config(&self) -> &DokuConfig {
        &self.config
    }

    fn url(&self, target: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), target)
    }

    fn signed_headers(&self, request_target: &str, body: Option<&[u8]>) -> Result<HeaderMap> {
        let request_id = Uuid::new_v4().to_string();
        let timestamp = request_timestamp(Utc::now());
        let digest = body.map(generate_digest);

        let signature = generate_signature(
            &self.config.secret_key,
            &SignatureComponents {
                client_id: &self.config.client_id,
                request_id: &request_id,
                request_timestamp: &timestamp,
                request_target,
                digest: digest.as_deref(),
            },
        )?;

        let mut headers = HeaderMap::new();
        headers.insert("Client-Id", HeaderValue::from_str(&self.config.client_id)?);
        headers.insert("Request-Id", HeaderValue::from_str(&request_id)?);
        headers.insert("Request-Timestamp", HeaderValue::from_str(&timestamp)?);
        headers.insert("Signature", HeaderValue::from_str(&signature)?);
        if body.is_some() {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }

        Ok(headers)
    }

    async fn ensure_success(
        resp: reqwest::Response,
        context: &str,
    ) -> std::result::Result<reqwest::Response, GatewayError> {
        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status();
        let body = match resp.text().await {
            Ok(text) if !text.is_empty() => text,
            Ok(_) => "<empty response body>".to_string(),
            Err(err) => format!("<failed to read response body: {err}>"),
        };
        let message = extract_error_message(&body);

        error!(
            status = %status,
            doku_message = ?message,
            response_body = %body,
            context = %context,
            "doku api request failed"
        );

        Err(GatewayError::Rejected {
            status: status.as_u16(),
            message,
        })
    }

    /// Request body for a checkout session, with every free-text field sanitized.
    pub fn build_checkout_body(&self, request: &CheckoutRequest) -> DokuCheckoutBody {
        DokuCheckoutBody {
            order: DokuOrder {
                amount: request.amount,
                invoice_number: request.invoice_number.clone(),
                currency: CURRENCY,
                callback_url: self.config.success_url.clone(),
                callback_url_cancel: self.config.cancel_url.clone(),
                callback_url_result: self.config.result_url.clone(),
                line_items: request
                    .line_items
                    .iter()
                    .map(|item| DokuLineItem {
                        id: sanitize_line_item_id(&item.id),
                        name: sanitize_name(&item.name),
                        price: item.price,
                        quantity: item.quantity,
                    })
                    .collect(),
            },
            payment: DokuPayment {
                payment_due_date: request.due_minutes,
                payment_method_types: PAYMENT_METHOD_TYPES.to_vec(),
            },
            customer: DokuCustomer {
                id: request.customer.id.clone(),
                name: sanitize_name(&request.customer.name),
                email: request.customer.email.clone(),
            },
        }
    }

    /// Opens a DOKU Checkout session and returns the hosted payment page URL.
    pub async fn create_session(
        &self,
        request: &CheckoutRequest,
    ) -> std::result::Result<CheckoutSession, GatewayError> {
        let body = serde_json::to_vec(&self.build_checkout_body(request))
            .map_err(|err| GatewayError::Transport(err.into()))?;
        let headers = self
            .signed_headers(CHECKOUT_PATH, Some(&body))
            .map_err(GatewayError::Transport)?;

        info!(
            invoice_number = %request.invoice_number,
            amount = request.amount,
            line_items = request.line_items.len(),
            "doku: creating checkout session"
        );

        let requested_at = Utc::now();
        let resp = self
            .http
            .post(self.url(CHECKOUT_PATH))
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|err| GatewayError::Transport(err.into()))?;
        let resp = Self::ensure_success(resp, "create checkout session").await?;

        let parsed: DokuCheckoutResponse = resp
            .json()
            .await
            .map_err(|err| GatewayError::InvalidResponse(err.to_string()))?;
        let payment = parsed
            .response
            .and_then(|response| response.payment)
            .ok_or_else(|| GatewayError::InvalidResponse("missing response.payment".into()))?;
        let checkout_url = payment
            .url
            .filter(|url| !url.is_empty())
            .ok_or_else(|| GatewayError::InvalidResponse("missing payment url".into()))?;

        let expires_at = payment
            .expired_date
            .as_deref()
            .and_then(parse_expired_date)
            .unwrap_or_else(|| requested_at + Duration::minutes(request.due_minutes));

        Ok(CheckoutSession {
            checkout_url,
            invoice_number: request.invoice_number.clone(),
            expires_at,
        })
    }

    /// Asks DOKU for the current status of an order.
    pub async fn check_status(
        &self,
        invoice_number: &str,
    ) -> std::result::Result<GatewayTransaction, GatewayError> {
        let target = format!("{ORDER_STATUS_PATH}/{invoice_number}");
        let headers = self
            .signed_headers(&target, None)
            .map_err(GatewayError::Transport)?;

        let resp = self
            .http
            .get(self.url(&target))
            .headers(headers)
            .send()
            .await
            .map_err(|err| GatewayError::Transport(err.into()))?;
        let resp = Self::ensure_success(resp, "check order status").await?;

        let payload: DokuTransactionPayload = resp
            .json()
            .await
            .map_err(|err| GatewayError::InvalidResponse(err.to_string()))?;

        let mut transaction = payload.into_transaction().unwrap_or(GatewayTransaction {
            invoice_number: invoice_number.to_string(),
            status: domain::value_objects::payments::GatewayStatus::Pending,
            channel: None,
            amount: 0,
        });
        if transaction.invoice_number != invoice_number {
            warn!(
                requested = invoice_number,
                returned = %transaction.invoice_number,
                "doku: status response carried a different invoice number"
            );
            transaction.invoice_number = invoice_number.to_string();
        }

        Ok(transaction)
    }

    /// Checks the `Signature` header DOKU attaches to HTTP notifications.
    pub fn verify_notification(&self, headers: &NotificationHeaders, body: &[u8]) -> bool {
        let (Some(client_id), Some(request_id), Some(timestamp), Some(signature)) = (
            headers.client_id.as_deref(),
            headers.request_id.as_deref(),
            headers.request_timestamp.as_deref(),
            headers.signature.as_deref(),
        ) else {
            return false;
        };

        if client_id != self.config.client_id {
            return false;
        }

        let digest = generate_digest(body);
        verify_signature(
            &self.config.secret_key,
            &SignatureComponents {
                client_id,
                request_id,
                request_timestamp: timestamp,
                request_target: &self.config.notification_path,
                digest: Some(&digest),
            },
            signature,
        )
    }

    pub fn parse_notification(
        &self,
        body: &[u8],
    ) -> std::result::Result<GatewayTransaction, GatewayError> {
        let payload: DokuTransactionPayload = serde_json::from_slice(body)
            .map_err(|err| GatewayError::InvalidResponse(err.to_string()))?;

        payload
            .into_transaction()
            .ok_or_else(|| GatewayError::InvalidResponse("missing order.invoice_number".into()))
    }
}

fn parse_expired_date(raw: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(raw.trim(), "%Y%m%d%H%M%S").ok()?;
    let offset = FixedOffset::east_opt(DOKU_UTC_OFFSET_SECS)?;
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|local| local.with_timezone(&Utc))
}
