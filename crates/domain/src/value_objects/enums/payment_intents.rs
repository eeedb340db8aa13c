use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::value_objects::invoices::BUNDLE_INVOICE_PREFIX;

/// Whether a payment reference covers one course or a bundle of courses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentIntent {
    Single,
    Bundle,
}

impl PaymentIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentIntent::Single => "single",
            PaymentIntent::Bundle => "bundle",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "single" => Some(PaymentIntent::Single),
            "bundle" => Some(PaymentIntent::Bundle),
            _ => None,
        }
    }

    pub fn from_invoice_number(invoice_number: &str) -> Self {
        if invoice_number.starts_with(BUNDLE_INVOICE_PREFIX) {
            PaymentIntent::Bundle
        } else {
            PaymentIntent::Single
        }
    }

    /// Prefers the intent persisted on the enrollment rows and falls back to the
    /// invoice prefix for rows written without one.
    pub fn resolve<'a, I>(invoice_number: &str, stored: I) -> Self
    where
        I: IntoIterator<Item = Option<&'a str>>,
    {
        let mut resolved = None;
        for intent in stored.into_iter().flatten().filter_map(PaymentIntent::from_str) {
            if intent == PaymentIntent::Bundle {
                return PaymentIntent::Bundle;
            }
            resolved = Some(intent);
        }

        resolved.unwrap_or_else(|| PaymentIntent::from_invoice_number(invoice_number))
    }
}

impl Display for PaymentIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
