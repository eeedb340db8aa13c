use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    BankTransfer,
    CreditCard,
    EWallet,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::CreditCard => "credit_card",
            PaymentMethod::EWallet => "e_wallet",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "bank_transfer" => Some(PaymentMethod::BankTransfer),
            "credit_card" => Some(PaymentMethod::CreditCard),
            "e_wallet" => Some(PaymentMethod::EWallet),
            _ => None,
        }
    }

    /// Maps a DOKU channel id (e.g. `VIRTUAL_ACCOUNT_BCA`, `EMONEY_OVO`) to the
    /// method stored on the enrollment. Unknown channels count as bank transfer.
    pub fn from_channel(channel: &str) -> Self {
        let channel = channel.trim().to_ascii_uppercase();

        if channel == "CREDIT_CARD" || channel.starts_with("PEER_TO_PEER_") {
            PaymentMethod::CreditCard
        } else if channel == "QRIS" || channel.starts_with("EMONEY_") {
            PaymentMethod::EWallet
        } else {
            // VIRTUAL_ACCOUNT_*, ONLINE_TO_OFFLINE_*, DIRECT_DEBIT_* and anything unrecognised
            PaymentMethod::BankTransfer
        }
    }
}

impl Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
