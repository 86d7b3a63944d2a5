//! Signed admin test-mode cookie.
//!
//! Value format: `<mode>.<sig>` where `sig` is the unpadded base64url
//! HMAC-SHA256 of `grid_aware_test_mode:<mode>` under the site secret.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::types::GridMode;

type HmacSha256 = Hmac<Sha256>;

pub const COOKIE_NAME: &str = "grid_aware_test_mode";
const SIGNING_CONTEXT: &str = "grid_aware_test_mode:";
const MAX_COOKIE_LEN: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CookieError {
    #[error("test cookie secret is not configured")]
    MissingSecret,
    #[error("malformed test cookie")]
    InvalidFormat,
    #[error("test cookie signature mismatch")]
    InvalidSignature,
    #[error("unknown test mode: {0}")]
    UnknownMode(String),
}

fn mac_for(mode: &str, secret: &[u8]) -> Result<HmacSha256, CookieError> {
    if secret.is_empty() {
        return Err(CookieError::MissingSecret);
    }
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| CookieError::MissingSecret)?;
    mac.update(SIGNING_CONTEXT.as_bytes());
    mac.update(mode.as_bytes());
    Ok(mac)
}

/// Produce a cookie value pinning `mode` for the holder.
pub fn sign(mode: GridMode, secret: &[u8]) -> Result<String, CookieError> {
    let sig = mac_for(mode.as_str(), secret)?.finalize().into_bytes();
    Ok(format!("{}.{}", mode.as_str(), URL_SAFE_NO_PAD.encode(sig)))
}

/// Check a cookie value and return the mode it names.
pub fn verify(value: &str, secret: &[u8]) -> Result<GridMode, CookieError> {
    if secret.is_empty() {
        return Err(CookieError::MissingSecret);
    }
    if value.len() > MAX_COOKIE_LEN {
        return Err(CookieError::InvalidFormat);
    }
    let (mode_part, sig_part) = value.rsplit_once('.').ok_or(CookieError::InvalidFormat)?;
    if mode_part.is_empty() || sig_part.is_empty() {
        return Err(CookieError::InvalidFormat);
    }

    let expected = URL_SAFE_NO_PAD
        .decode(sig_part)
        .map_err(|_| CookieError::InvalidFormat)?;
    mac_for(mode_part, secret)?
        .verify_slice(&expected)
        .map_err(|_| CookieError::InvalidSignature)?;

    GridMode::parse(mode_part).ok_or_else(|| CookieError::UnknownMode(mode_part.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"site-secret";

    #[test]
    fn sign_then_verify() {
        for mode in GridMode::ALL {
            let cookie = sign(mode, SECRET).unwrap();
            assert!(cookie.starts_with(mode.as_str()));
            assert_eq!(verify(&cookie, SECRET), Ok(mode));
        }
    }

    #[test]
    fn wrong_secret_rejected() {
        let cookie = sign(GridMode::Eco, SECRET).unwrap();
        assert_eq!(verify(&cookie, b"other"), Err(CookieError::InvalidSignature));
    }

    #[test]
    fn tampered_mode_rejected() {
        let cookie = sign(GridMode::Standard, SECRET).unwrap();
        let sig = cookie.rsplit_once('.').unwrap().1;
        let forged = format!("super-eco.{sig}");
        assert_eq!(verify(&forged, SECRET), Err(CookieError::InvalidSignature));
    }

    #[test]
    fn bare_mode_name_is_malformed() {
        assert_eq!(verify("eco", SECRET), Err(CookieError::InvalidFormat));
        assert_eq!(verify("eco.", SECRET), Err(CookieError::InvalidFormat));
        assert_eq!(verify("eco.!!!", SECRET), Err(CookieError::InvalidFormat));
    }

    #[test]
    fn empty_secret_disables_cookie() {
        assert_eq!(sign(GridMode::Eco, b""), Err(CookieError::MissingSecret));
        assert_eq!(verify("eco.abc", b""), Err(CookieError::MissingSecret));
    }

    #[test]
    fn signed_unknown_mode_rejected() {
        let sig = mac_for("turbo", SECRET).unwrap().finalize().into_bytes();
        let cookie = format!("turbo.{}", URL_SAFE_NO_PAD.encode(sig));
        assert_eq!(verify(&cookie, SECRET), Err(CookieError::UnknownMode("turbo".into())));
    }

    #[test]
    fn oversized_value_rejected() {
        let long = "a".repeat(MAX_COOKIE_LEN + 1);
        assert_eq!(verify(&long, SECRET), Err(CookieError::InvalidFormat));
    }
}
