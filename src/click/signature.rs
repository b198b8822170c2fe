//! Keyed-digest signature verification for Click webhook requests.
//!
//! The gateway signs every PREPARE/COMPLETE call with a hex digest over the
//! raw concatenation of request fields and the shared secret. There is no
//! delimiter and no normalization: the amount must be fed to the digest as
//! the exact string the gateway sent (`"1111"` and `"1111.00"` sign
//! differently).

use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use sha2::Sha256;

/// Digest algorithm used for request/response signatures.
///
/// `Md5` is what the gateway speaks today. `HmacSha256` keeps the upgrade
/// path open without touching any caller: the signed field order stays the
/// same, only the digest changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureScheme {
    Md5,
    HmacSha256,
}

impl SignatureScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureScheme::Md5 => "md5",
            SignatureScheme::HmacSha256 => "hmac-sha256",
        }
    }
}

impl std::str::FromStr for SignatureScheme {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "md5" => Ok(SignatureScheme::Md5),
            "hmac-sha256" | "hmac_sha256" => Ok(SignatureScheme::HmacSha256),
            other => Err(format!("unsupported signature scheme: {}", other)),
        }
    }
}

/// Ordered fields covered by a signature.
///
/// `merchant_prepare_id` is `None` for the PREPARE profile and present for
/// the COMPLETE profile, inserted immediately after `merchant_trans_id`.
#[derive(Debug, Clone)]
pub struct SignedFields<'a> {
    pub click_trans_id: i64,
    pub service_id: &'a str,
    pub merchant_trans_id: &'a str,
    pub merchant_prepare_id: Option<i64>,
    pub amount: &'a str,
    pub action: i32,
    pub sign_time: &'a str,
}

impl SignedFields<'_> {
    /// Concatenation fed to the digest, secret spliced in after service_id.
    fn concat_with_secret(&self, secret: &str) -> String {
        let mut input = String::with_capacity(96);
        input.push_str(&self.click_trans_id.to_string());
        input.push_str(self.service_id);
        input.push_str(secret);
        input.push_str(self.merchant_trans_id);
        if let Some(prepare_id) = self.merchant_prepare_id {
            input.push_str(&prepare_id.to_string());
        }
        input.push_str(self.amount);
        input.push_str(&self.action.to_string());
        input.push_str(self.sign_time);
        input
    }

    /// Same concatenation without the inline secret, for keyed schemes.
    fn concat_without_secret(&self) -> String {
        let mut input = String::with_capacity(64);
        input.push_str(&self.click_trans_id.to_string());
        input.push_str(self.service_id);
        input.push_str(self.merchant_trans_id);
        if let Some(prepare_id) = self.merchant_prepare_id {
            input.push_str(&prepare_id.to_string());
        }
        input.push_str(self.amount);
        input.push_str(&self.action.to_string());
        input.push_str(self.sign_time);
        input
    }
}

/// Compute the hex signature for the given fields.
pub fn compute_signature(scheme: SignatureScheme, secret: &str, fields: &SignedFields<'_>) -> String {
    match scheme {
        SignatureScheme::Md5 => {
            let mut hasher = Md5::new();
            hasher.update(fields.concat_with_secret(secret).as_bytes());
            hex::encode(hasher.finalize())
        }
        SignatureScheme::HmacSha256 => {
            type HmacSha256 = Hmac<Sha256>;
            let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
                Ok(mac) => mac,
                // HMAC accepts keys of any length; unreachable in practice.
                Err(_) => return String::new(),
            };
            mac.update(fields.concat_without_secret().as_bytes());
            hex::encode(mac.finalize().into_bytes())
        }
    }
}

/// Check a received signature. Any mismatch is `false`, never an error.
pub fn verify_signature(
    scheme: SignatureScheme,
    secret: &str,
    fields: &SignedFields<'_>,
    received: &str,
) -> bool {
    let computed = compute_signature(scheme, secret, fields);
    secure_eq(computed.as_bytes(), received.trim().as_bytes())
}

pub fn secure_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter()
        .zip(b.iter())
        .fold(0_u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}
