//! X25519 Diffie-Hellman backend.

use rand::rngs::OsRng;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::error::CryptoError;
use crate::secret::{PrivateKey, PrivateState, SharedSecret};
use crate::traits::{ExchangeKind, KeyExchangeBackend};

pub const BACKEND_NAME: &str = "X25519";

pub const X25519_PUBLIC_KEY_LEN: usize = 32;
pub const X25519_SHARED_SECRET_LEN: usize = 32;

#[derive(Clone, Copy, Debug, Default)]
pub struct X25519Backend;

impl X25519Backend {
    pub fn new() -> Self {
        Self
    }
}

impl KeyExchangeBackend for X25519Backend {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    fn kind(&self) -> ExchangeKind {
        ExchangeKind::DiffieHellman
    }

    fn secret_len(&self) -> usize {
        X25519_SHARED_SECRET_LEN
    }

    fn generate_keypair(&self) -> Result<(Vec<u8>, PrivateState), CryptoError> {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Ok((
            public.as_bytes().to_vec(),
            PrivateState::new(PrivateKey::X25519(secret)),
        ))
    }

    fn compute_shared(
        &self,
        private: &PrivateState,
        peer_public: &[u8],
    ) -> Result<SharedSecret, CryptoError> {
        let PrivateKey::X25519(secret) = &private.key else {
            return Err(CryptoError::ForeignPrivateState(BACKEND_NAME));
        };
        let bytes: [u8; X25519_PUBLIC_KEY_LEN] =
            peer_public
                .try_into()
                .map_err(|_| CryptoError::InvalidLength {
                    expected: X25519_PUBLIC_KEY_LEN,
                    actual: peer_public.len(),
                })?;
        let shared = secret.diffie_hellman(&PublicKey::from(bytes));
        // Low-order peer points collapse the secret to all zeroes.
        if !shared.was_contributory() {
            return Err(CryptoError::InvalidArtifact(
                "non-contributory X25519 public key".into(),
            ));
        }
        Ok(SharedSecret::from_slice(shared.as_bytes()))
    }
}
