//! HMAC-SHA-256 used for transcript authentication.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::CryptoError;

pub type HmacSha256 = Hmac<Sha256>;

/// Tag length of HMAC-SHA-256 in bytes.
pub const TAG_LEN: usize = 32;

pub fn hmac_sha256(key: &[u8], message: &[u8]) -> Result<[u8; TAG_LEN], CryptoError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| CryptoError::InvalidMacKey)?;
    mac.update(message);
    Ok(mac.finalize().into_bytes().into())
}

/// Recompute the tag under `key` and compare it with `tag` in constant time.
pub fn verify_hmac_sha256(key: &[u8], message: &[u8], tag: &[u8]) -> Result<bool, CryptoError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| CryptoError::InvalidMacKey)?;
    mac.update(message);
    Ok(mac.verify_slice(tag).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 4231 test case 2.
    #[test]
    fn rfc4231_case_2() {
        let tag = hmac_sha256(b"Jefe", b"what do ya want for nothing?").unwrap();
        assert_eq!(
            hex::encode(tag),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn verify_detects_wrong_key() {
        let tag = hmac_sha256(&[7u8; 32], b"AUTH_CHECK").unwrap();
        assert!(verify_hmac_sha256(&[7u8; 32], b"AUTH_CHECK", &tag).unwrap());
        assert!(!verify_hmac_sha256(&[8u8; 32], b"AUTH_CHECK", &tag).unwrap());
    }

    #[test]
    fn verify_rejects_truncated_tag() {
        let tag = hmac_sha256(b"key", b"msg").unwrap();
        assert!(!verify_hmac_sha256(b"key", b"msg", &tag[..16]).unwrap());
    }
}
