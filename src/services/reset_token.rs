//! Password-reset tokens bound to mutable account state.
//!
//! A token proves the holder requested a reset for one specific user while
//! that user's password hash had a specific value. Validity is recomputed
//! from current state instead of being stored, so overwriting the hash
//! retires every outstanding token for that user at once.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use sha2::Sha256;

/// HMAC key length in bytes when generated locally.
const HMAC_KEY_LENGTH: usize = 32;

/// Signature length in hex characters (20 bytes of the MAC, truncated).
const SIGNATURE_LENGTH: usize = 40;

/// Issues and validates time-bound, single-use reset tokens.
///
/// Token layout: `<base36 unix timestamp>-<truncated hex HMAC-SHA256>`,
/// where the MAC covers `(user_id, password_hash, timestamp)`.
pub struct ResetTokenService {
    key: Vec<u8>,
    max_age_secs: i64,
}

impl ResetTokenService {
    #[must_use]
    pub fn new(key: impl Into<Vec<u8>>, max_age_hours: i64) -> Self {
        Self {
            key: key.into(),
            max_age_secs: max_age_hours * 3600,
        }
    }

    /// Create a service with a random key.
    ///
    /// Tokens issued against a random key do not survive a process restart.
    #[must_use]
    pub fn with_random_key(max_age_hours: i64) -> Self {
        use rand::RngCore;
        let mut key = [0u8; HMAC_KEY_LENGTH];
        rand::rng().fill_bytes(&mut key);
        Self::new(key.to_vec(), max_age_hours)
    }

    /// Issue a token for the user's current password hash.
    #[must_use]
    pub fn issue(&self, user_id: i32, password_hash: &str) -> String {
        self.issue_at(user_id, password_hash, chrono::Utc::now().timestamp())
    }

    fn issue_at(&self, user_id: i32, password_hash: &str, timestamp: i64) -> String {
        let signature = self.sign(user_id, password_hash, timestamp);
        format!("{}-{}", to_base36(timestamp), signature)
    }

    /// Validate a token against the user's current password hash.
    ///
    /// Rejects tokens that are malformed, tampered with, outside the validity
    /// window, or issued before the password hash last changed.
    #[must_use]
    pub fn validate(&self, token: &str, user_id: i32, password_hash: &str) -> bool {
        let Some((ts_part, sig_part)) = token.split_once('-') else {
            return false;
        };

        let Some(timestamp) = from_base36(ts_part) else {
            return false;
        };

        let age = chrono::Utc::now().timestamp() - timestamp;
        if age < 0 || age > self.max_age_secs {
            return false;
        }

        let Ok(provided) = hex::decode(sig_part) else {
            return false;
        };
        if provided.len() != SIGNATURE_LENGTH / 2 {
            return false;
        }

        // verify_truncated_left is constant-time over the MAC bytes.
        self.mac(user_id, password_hash, timestamp)
            .verify_truncated_left(&provided)
            .is_ok()
    }

    fn sign(&self, user_id: i32, password_hash: &str, timestamp: i64) -> String {
        let digest = self.mac(user_id, password_hash, timestamp).finalize();
        let mut signature = hex::encode(digest.into_bytes());
        signature.truncate(SIGNATURE_LENGTH);
        signature
    }

    fn mac(&self, user_id: i32, password_hash: &str, timestamp: i64) -> Hmac<Sha256> {
        // new_from_slice accepts any key length for SHA256
        let mut mac = <Hmac<Sha256>>::new_from_slice(&self.key)
            .unwrap_or_else(|_| unreachable!("HMAC-SHA256 accepts any key length"));
        mac.update(user_id.to_string().as_bytes());
        mac.update(b"\x00");
        mac.update(password_hash.as_bytes());
        mac.update(b"\x00");
        mac.update(timestamp.to_string().as_bytes());
        mac
    }
}

/// Encode a user id as the URL-safe base64 component of reset links.
#[must_use]
pub fn encode_uid(user_id: i32) -> String {
    URL_SAFE_NO_PAD.encode(user_id.to_string())
}

/// Decode the user-id component of a reset link.
#[must_use]
pub fn decode_uid(encoded: &str) -> Option<i32> {
    let bytes = URL_SAFE_NO_PAD.decode(encoded).ok()?;
    String::from_utf8(bytes).ok()?.parse().ok()
}

fn to_base36(value: i64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    if value <= 0 {
        return "0".to_string();
    }

    let mut value = value as u64;
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

fn from_base36(s: &str) -> Option<i64> {
    if s.is_empty() || s.len() > 13 {
        return None;
    }
    i64::from_str_radix(s, 36).ok()
}
