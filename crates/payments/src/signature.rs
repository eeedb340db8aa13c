use anyhow::Result;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_PREFIX: &str = "HMACSHA256=";

/// Inputs of a DOKU request signature. `digest` is `None` for bodiless GET requests.
#[derive(Debug, Clone, Copy)]
pub struct SignatureComponents<'a> {
    pub client_id: &'a str,
    pub request_id: &'a str,
    pub request_timestamp: &'a str,
    pub request_target: &'a str,
    pub digest: Option<&'a str>,
}

impl SignatureComponents<'_> {
    pub fn to_component_string(&self) -> String {
        let mut components = format!(
            "Client-Id:{}\nRequest-Id:{}\nRequest-Timestamp:{}\nRequest-Target:{}",
            self.client_id, self.request_id, self.request_timestamp, self.request_target
        );
        if let Some(digest) = self.digest {
            components.push_str("\nDigest:");
            components.push_str(digest);
        }
        components
    }
}

/// `base64(sha256(body))`
pub fn generate_digest(body: &[u8]) -> String {
    STANDARD.encode(Sha256::digest(body))
}

/// ISO-8601 in UTC without fractional seconds, e.g. `2024-06-01T08:30:00Z`.
pub fn request_timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn mac_for(secret_key: &str, components: &SignatureComponents<'_>) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret_key.as_bytes())?;
    mac.update(components.to_component_string().as_bytes());
    Ok(mac)
}

/// `HMACSHA256=` + `base64(hmac_sha256(secret_key, component string))`
pub fn generate_signature(secret_key: &str, components: &SignatureComponents<'_>) -> Result<String> {
    let mac = mac_for(secret_key, components)?;
    Ok(format!(
        "{SIGNATURE_PREFIX}{}",
        STANDARD.encode(mac.finalize().into_bytes())
    ))
}

/// Constant-time check of a signature header against the expected components.
pub fn verify_signature(
    secret_key: &str,
    components: &SignatureComponents<'_>,
    provided: &str,
) -> bool {
    let Some(encoded) = provided.trim().strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };
    let Ok(provided) = STANDARD.decode(encoded) else {
        return false;
    };

    match mac_for(secret_key, components) {
        Ok(mac) => mac.verify_slice(&provided).is_ok(),
        Err(_) => false,
    }
}
