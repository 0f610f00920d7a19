use base64ct::{Base64Unpadded, Encoding};
use hmac::{Hmac, Mac};
use sha2::Sha256;

pub const CSRF_HEADER: &str = "X-CSRF-Token";

const MIN_SECRET_LEN: usize = 32;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error)]
pub enum CsrfError {
    #[error("csrf secret must be at least {MIN_SECRET_LEN} bytes, got {0}")]
    WeakSecret(usize),
    #[error("invalid csrf secret")]
    InvalidKey,
}

/// Derives CSRF tokens from session ids. Tokens are never stored: the same
/// session id always yields the same token under the same secret.
#[derive(Clone)]
pub struct CsrfKeys {
    mac: HmacSha256,
}

impl CsrfKeys {
    pub fn new(secret: &[u8]) -> Result<Self, CsrfError> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(CsrfError::WeakSecret(secret.len()));
        }
        let mac = HmacSha256::new_from_slice(secret).map_err(|_| CsrfError::InvalidKey)?;
        Ok(Self { mac })
    }

    fn keyed(&self, session_id: &str) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(session_id.as_bytes());
        mac
    }

    pub fn make_token(&self, session_id: &str) -> String {
        let tag = self.keyed(session_id).finalize().into_bytes();
        Base64Unpadded::encode_string(&tag)
    }

    /// Constant-time check of `token` against the one derived from `session_id`.
    pub fn verify_token(&self, session_id: &str, token: &str) -> bool {
        let Ok(raw) = Base64Unpadded::decode_vec(token.trim()) else {
            return false;
        };
        self.keyed(session_id).verify_slice(&raw).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

    #[test]
    fn same_session_same_token() {
        let keys = CsrfKeys::new(SECRET).unwrap();
        assert_eq!(keys.make_token("sid-1"), keys.make_token("sid-1"));

        let again = CsrfKeys::new(SECRET).unwrap();
        assert_eq!(keys.make_token("sid-1"), again.make_token("sid-1"));
    }

    #[test]
    fn different_sessions_differ() {
        let keys = CsrfKeys::new(SECRET).unwrap();
        assert_ne!(keys.make_token("sid-1"), keys.make_token("sid-2"));
    }

    #[test]
    fn different_secret_differs() {
        let a = CsrfKeys::new(SECRET).unwrap();
        let b = CsrfKeys::new(b"fedcba9876543210fedcba9876543210").unwrap();
        assert_ne!(a.make_token("sid"), b.make_token("sid"));
    }

    #[test]
    fn verify_accepts_own_token_only() {
        let keys = CsrfKeys::new(SECRET).unwrap();
        let token = keys.make_token("sid-1");
        assert!(keys.verify_token("sid-1", &token));
        assert!(!keys.verify_token("sid-2", &token));
        assert!(!keys.verify_token("sid-1", "not base64 !!"));
        assert!(!keys.verify_token("sid-1", ""));
    }

    #[test]
    fn short_secret_rejected() {
        assert!(matches!(CsrfKeys::new(b"short"), Err(CsrfError::WeakSecret(5))));
    }
}
