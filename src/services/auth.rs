//! Telegram WebApp `initData` verification.
//!
//! The front-end forwards the raw `initData` query string it received from
//! Telegram. Its `hash` field is an HMAC over the remaining fields, keyed by a
//! secret derived from the bot token:
//!
//! ```text
//! secret_key = HMAC_SHA256(key = "WebAppData", msg = bot_token)
//! hash       = hex(HMAC_SHA256(key = secret_key, msg = data_check_string))
//! ```

use std::collections::BTreeMap;

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

const WEB_APP_DATA_KEY: &[u8] = b"WebAppData";
const HASH_FIELD: &str = "hash";
const USER_FIELD: &str = "user";

/// Outcome of checking a signed payload. `fields` is empty unless `valid`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitDataVerification {
    pub valid: bool,
    pub fields: BTreeMap<String, String>,
}

impl InitDataVerification {
    fn rejected() -> Self {
        Self::default()
    }
}

/// Verify `init_data` against the bot token. Fails closed on any malformed input.
pub fn verify_init_data(init_data: &str, secret: &str) -> InitDataVerification {
    if init_data.is_empty() || secret.is_empty() {
        return InitDataVerification::rejected();
    }

    let mut fields: BTreeMap<String, String> = url::form_urlencoded::parse(init_data.as_bytes())
        .into_owned()
        .collect();

    let received = match fields.remove(HASH_FIELD) {
        Some(hash) if !hash.is_empty() => hash,
        _ => return InitDataVerification::rejected(),
    };

    let calculated = match compute_signature(secret, &data_check_string(&fields)) {
        Some(sig) => sig,
        None => return InitDataVerification::rejected(),
    };

    if !constant_time_str_eq(&calculated, &received) {
        return InitDataVerification::rejected();
    }

    InitDataVerification {
        valid: true,
        fields,
    }
}

/// Canonical `key=value` lines, sorted by key, joined with `\n`.
pub fn data_check_string(fields: &BTreeMap<String, String>) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Lowercase hex HMAC of `check_string` under the key derived from `secret`.
pub fn compute_signature(secret: &str, check_string: &str) -> Option<String> {
    let mut key_mac = HmacSha256::new_from_slice(WEB_APP_DATA_KEY).ok()?;
    key_mac.update(secret.as_bytes());
    let signing_key = key_mac.finalize().into_bytes();

    let mut mac = HmacSha256::new_from_slice(&signing_key).ok()?;
    mac.update(check_string.as_bytes());
    Some(hex::encode(mac.finalize().into_bytes()))
}

fn constant_time_str_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    bool::from(a.as_bytes().ct_eq(b.as_bytes()))
}

/// The Telegram user a verified payload was issued for.
#[derive(Debug, Clone)]
pub struct AuthenticatedPrincipal {
    /// Telegram user id; also the chat id the result is delivered to.
    pub recipient_id: i64,
    pub fields: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct TelegramUser {
    id: i64,
}

impl AuthenticatedPrincipal {
    /// Build a principal from verified fields by parsing the JSON `user` field.
    pub fn from_fields(fields: BTreeMap<String, String>) -> Result<Self, PrincipalError> {
        let user_json = fields
            .get(USER_FIELD)
            .filter(|v| !v.is_empty())
            .ok_or(PrincipalError::MissingUser)?;
        let user: TelegramUser =
            serde_json::from_str(user_json).map_err(PrincipalError::InvalidUser)?;

        Ok(Self {
            recipient_id: user.id,
            fields,
        })
    }
}

/// Verify `init_data` and extract the principal in one step.
pub fn authenticate(init_data: &str, secret: &str) -> Result<AuthenticatedPrincipal, AuthError> {
    let verification = verify_init_data(init_data, secret);
    if !verification.valid {
        return Err(AuthError::BadSignature);
    }
    AuthenticatedPrincipal::from_fields(verification.fields).map_err(AuthError::Principal)
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Bad initData signature")]
    BadSignature,

    #[error(transparent)]
    Principal(#[from] PrincipalError),
}

#[derive(Debug, thiserror::Error)]
pub enum PrincipalError {
    #[error("No user in init data")]
    MissingUser,

    #[error("Invalid user json in init data: {0}")]
    InvalidUser(serde_json::Error),
}
