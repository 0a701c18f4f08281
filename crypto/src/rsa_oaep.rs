//! RSA-OAEP key transport backend.
//!
//! The initiator draws a random 32-byte secret and encrypts it to the
//! responder's RSA public key (OAEP, SHA-256, MGF1-SHA-256, empty label). The
//! responder recovers it with its private key. Public keys travel as
//! SubjectPublicKeyInfo DER.

use rand::rngs::OsRng;
use rand::RngCore;
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use crate::error::CryptoError;
use crate::secret::{PrivateKey, PrivateState, SharedSecret};
use crate::traits::{ExchangeKind, KeyExchangeBackend};

pub const BACKEND_NAME: &str = "RSA-OAEP";

pub const RSA_DEFAULT_BITS: usize = 2048;
pub const RSA_MIN_BITS: usize = 1024;
pub const RSA_PUBLIC_EXPONENT: u64 = 65537;
pub const RSA_TRANSPORTED_SECRET_LEN: usize = 32;

#[derive(Clone, Copy, Debug)]
pub struct RsaOaepBackend {
    bits: usize,
}

impl Default for RsaOaepBackend {
    fn default() -> Self {
        Self {
            bits: RSA_DEFAULT_BITS,
        }
    }
}

impl RsaOaepBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different modulus size. Sizes below [`RSA_MIN_BITS`] cannot
    /// carry a 32-byte secret under OAEP-SHA-256 and are rejected.
    pub fn with_bits(bits: usize) -> Result<Self, CryptoError> {
        if bits < RSA_MIN_BITS {
            return Err(CryptoError::KeyGeneration(format!(
                "modulus of {bits} bits is below the {RSA_MIN_BITS}-bit minimum"
            )));
        }
        Ok(Self { bits })
    }

    pub fn bits(&self) -> usize {
        self.bits
    }
}

impl KeyExchangeBackend for RsaOaepBackend {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    fn kind(&self) -> ExchangeKind {
        ExchangeKind::KeyTransport
    }

    fn secret_len(&self) -> usize {
        RSA_TRANSPORTED_SECRET_LEN
    }

    fn generate_keypair(&self) -> Result<(Vec<u8>, PrivateState), CryptoError> {
        let exponent = rsa::BigUint::from(RSA_PUBLIC_EXPONENT);
        let private = RsaPrivateKey::new_with_exp(&mut OsRng, self.bits, &exponent)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        let der = private
            .to_public_key()
            .to_public_key_der()
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        Ok((
            der.as_bytes().to_vec(),
            PrivateState::new(PrivateKey::Rsa(Box::new(private))),
        ))
    }

    fn encapsulate(&self, public: &[u8]) -> Result<(Vec<u8>, SharedSecret), CryptoError> {
        let public = RsaPublicKey::from_public_key_der(public)
            .map_err(|e| CryptoError::InvalidArtifact(format!("RSA public key: {e}")))?;

        let mut secret = [0u8; RSA_TRANSPORTED_SECRET_LEN];
        OsRng.fill_bytes(&mut secret);
        let ciphertext = public
            .encrypt(&mut OsRng, Oaep::new::<Sha256>(), &secret)
            .map_err(|_| CryptoError::EncryptionFailed)?;
        let shared = SharedSecret::from_slice(&secret);
        secret.fill(0);
        Ok((ciphertext, shared))
    }

    fn decapsulate(
        &self,
        ciphertext: &[u8],
        private: &PrivateState,
    ) -> Result<SharedSecret, CryptoError> {
        let PrivateKey::Rsa(key) = &private.key else {
            return Err(CryptoError::ForeignPrivateState(BACKEND_NAME));
        };
        if ciphertext.len() != key.size() {
            return Err(CryptoError::InvalidLength {
                expected: key.size(),
                actual: ciphertext.len(),
            });
        }
        let secret = key
            .decrypt(Oaep::new::<Sha256>(), ciphertext)
            .map_err(|_| CryptoError::DecapsulationFailed)?;
        Ok(SharedSecret::new(secret))
    }
}
