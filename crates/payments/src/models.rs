use serde::{Deserialize, Serialize};
use serde_json::Value;

use domain::value_objects::payments::{GatewayStatus, GatewayTransaction};

#[derive(Debug, Clone, Serialize)]
pub struct DokuCheckoutBody {
    pub order: DokuOrder,
    pub payment: DokuPayment,
    pub customer: DokuCustomer,
}

#[derive(Debug, Clone, Serialize)]
pub struct DokuOrder {
    pub amount: i64,
    pub invoice_number: String,
    pub currency: &'static str,
    pub callback_url: String,
    pub callback_url_cancel: String,
    pub callback_url_result: String,
    pub line_items: Vec<DokuLineItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DokuLineItem {
    pub id: String,
    pub name: String,
    pub price: i64,
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct DokuPayment {
    pub payment_due_date: i64,
    pub payment_method_types: Vec<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DokuCustomer {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DokuCheckoutResponse {
    pub response: Option<DokuCheckoutResponseBody>,
}

#[derive(Debug, Deserialize)]
pub struct DokuCheckoutResponseBody {
    pub payment: Option<DokuPaymentResponse>,
}

#[derive(Debug, Deserialize)]
pub struct DokuPaymentResponse {
    pub url: Option<String>,
    pub token_id: Option<String>,
    /// `yyyyMMddHHmmss`, Jakarta time.
    pub expired_date: Option<String>,
}

/// Shape shared by the HTTP notification DOKU pushes and the order status query.
#[derive(Debug, Default, Deserialize)]
pub struct DokuTransactionPayload {
    pub order: Option<DokuOrderInfo>,
    pub transaction: Option<DokuTransactionInfo>,
    pub channel: Option<DokuIdRef>,
    pub service: Option<DokuIdRef>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DokuOrderInfo {
    pub invoice_number: Option<String>,
    pub amount: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DokuTransactionInfo {
    pub status: Option<String>,
    pub date: Option<String>,
    pub original_request_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DokuIdRef {
    pub id: Option<String>,
}

impl DokuTransactionPayload {
    pub fn into_transaction(self) -> Option<GatewayTransaction> {
        let order = self.order?;
        let invoice_number = order
            .invoice_number
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())?;

        let status = self
            .transaction
            .and_then(|transaction| transaction.status)
            .map(|status| GatewayStatus::parse(&status))
            .unwrap_or(GatewayStatus::Pending);

        Some(GatewayTransaction {
            invoice_number,
            status,
            channel: self.channel.and_then(|channel| channel.id),
            amount: order.amount.as_ref().map(amount_from_value).unwrap_or(0),
        })
    }
}

/// DOKU sends amounts as numbers, occasionally as numeric strings.
fn amount_from_value(value: &Value) -> i64 {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|v| v.round() as i64))
            .unwrap_or(0),
        Value::String(raw) => raw
            .trim()
            .parse::<f64>()
            .map(|v| v.round() as i64)
            .unwrap_or(0),
        _ => 0,
    }
}

/// Pulls a readable message out of a DOKU error body: the `message` array joined,
/// a plain `message` string, or `error.message`.
pub fn extract_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;

    let joined = match value.get("message") {
        Some(Value::Array(items)) => {
            let parts: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
            (!parts.is_empty()).then(|| parts.join(", "))
        }
        Some(Value::String(message)) if !message.trim().is_empty() => Some(message.clone()),
        _ => None,
    };

    joined.or_else(|| {
        value
            .get("error")
            .and_then(|error| error.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
    })
}
